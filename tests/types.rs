// ABOUTME: Integration tests for validated identifiers.
// ABOUTME: Covers image references, application names and release tags.

use skiff::types::*;

mod image_ref_tests {
    use super::*;

    #[test]
    fn parse_simple_name() {
        let img = ImageRef::parse("nginx").unwrap();
        assert_eq!(img.name(), "nginx");
        assert_eq!(img.tag(), Some("latest"));
        assert!(img.registry().is_none());
        assert!(img.digest().is_none());
    }

    #[test]
    fn parse_with_registry_and_org() {
        let img = ImageRef::parse("ghcr.io/acme/shop:v1.2.3").unwrap();
        assert_eq!(img.registry(), Some("ghcr.io"));
        assert_eq!(img.name(), "acme/shop");
        assert_eq!(img.tag(), Some("v1.2.3"));
        assert_eq!(img.repository(), "ghcr.io/acme/shop");
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        let img = ImageRef::parse("registry.local:5000/shop").unwrap();
        assert_eq!(img.registry(), Some("registry.local:5000"));
        assert_eq!(img.name(), "shop");
        assert_eq!(img.tag(), Some("latest"));
    }

    #[test]
    fn docker_hub_org_is_not_a_registry() {
        let img = ImageRef::parse("acme/shop:2").unwrap();
        assert!(img.registry().is_none());
        assert_eq!(img.name(), "acme/shop");
    }

    #[test]
    fn parse_with_digest() {
        let digest = "sha256:abc123def456";
        let img = ImageRef::parse(&format!("nginx@{}", digest)).unwrap();
        assert_eq!(img.digest(), Some(digest));
        assert!(img.tag().is_none());
    }

    #[test]
    fn parse_tag_and_digest() {
        let img = ImageRef::parse("ghcr.io/org/repo:v1@sha256:abc123").unwrap();
        assert_eq!(img.tag(), Some("v1"));
        assert_eq!(img.digest(), Some("sha256:abc123"));
        assert_eq!(img.to_string(), "ghcr.io/org/repo:v1@sha256:abc123");
    }

    #[test]
    fn rejects_malformed_references() {
        assert!(matches!(ImageRef::parse(""), Err(ParseImageRefError::Empty)));
        assert!(matches!(
            ImageRef::parse("shop;id"),
            Err(ParseImageRefError::InvalidChar(';'))
        ));
        assert!(ImageRef::parse("invalid image").is_err());
        assert!(ImageRef::parse("-shop").is_err());
        assert!(ImageRef::parse("shop:").is_err());
        assert!(ImageRef::parse("shop@").is_err());
        assert!(ImageRef::parse("org//shop").is_err());
    }

    #[test]
    fn with_tag_replaces_tag_and_drops_digest() {
        let img = ImageRef::parse("ghcr.io/acme/shop:old@sha256:abc").unwrap();
        let retagged = img.with_tag("20260101120000");
        assert_eq!(retagged.to_string(), "ghcr.io/acme/shop:20260101120000");
        assert!(retagged.digest().is_none());
    }

    #[test]
    fn deserializes_from_yaml_string() {
        let img: ImageRef = serde_yaml::from_str("registry.example.com/shop:v2").unwrap();
        assert_eq!(img.tag(), Some("v2"));
        assert!(serde_yaml::from_str::<ImageRef>("shop$(id)").is_err());
    }
}

mod app_name_tests {
    use super::*;

    #[test]
    fn valid_name() {
        let name = AppName::new("shop-api").unwrap();
        assert_eq!(name.as_str(), "shop-api");
        assert_eq!(name.temp_container(), "shop-api-new");
    }

    #[test]
    fn rejects_non_dns_names() {
        assert!(AppName::new("").is_err());
        assert!(AppName::new("Shop").is_err());
        assert!(AppName::new("shop_api").is_err());
        assert!(AppName::new("-shop").is_err());
        assert!(AppName::new("shop-").is_err());
        assert!(AppName::new(&"a".repeat(64)).is_err());
        assert!(AppName::new("shop;reboot").is_err());
    }

    #[test]
    fn deserialize_validates() {
        assert!(serde_yaml::from_str::<AppName>("shop").is_ok());
        assert!(serde_yaml::from_str::<AppName>("'shop $(id)'").is_err());
    }
}

mod release_tag_tests {
    use super::*;

    #[test]
    fn accepts_timestamps_and_versions() {
        assert!(ReleaseTag::new("20260101120000").is_ok());
        assert!(ReleaseTag::new("v1.2.3").is_ok());
    }

    #[test]
    fn rejects_traversal_and_metacharacters() {
        assert!(ReleaseTag::new("").is_err());
        assert!(ReleaseTag::new("..").is_err());
        assert!(ReleaseTag::new("a/b").is_err());
        assert!(ReleaseTag::new("v1 && id").is_err());
    }

    #[test]
    fn now_is_a_valid_fourteen_digit_tag() {
        let tag = ReleaseTag::now();
        assert_eq!(tag.as_str().len(), 14);
        assert!(tag.as_str().chars().all(|c| c.is_ascii_digit()));
        assert!(ReleaseTag::new(tag.as_str()).is_ok());
    }
}
