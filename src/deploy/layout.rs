// ABOUTME: Remote directory layout and container naming for one application.
// ABOUTME: All paths are derived from the validated base dir and app name.

use crate::preflight::MIGRATION_WARNING_MARKER;
use crate::types::{AppName, ReleaseTag};

pub const RELEASE_MARKER: &str = ".skiff-release.json";
pub const LOCK_FILE: &str = ".deploy.lock";

/// `<base>/apps/<app>/{releases/<tag>/, current, shared/...}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    app_dir: String,
}

impl RemoteLayout {
    pub fn new(base_dir: &str, app: &AppName) -> Self {
        Self {
            app_dir: format!("{}/apps/{}", base_dir.trim_end_matches('/'), app),
        }
    }

    pub fn app_dir(&self) -> &str {
        &self.app_dir
    }

    pub fn releases_dir(&self) -> String {
        format!("{}/releases", self.app_dir)
    }

    pub fn release_dir(&self, release: &ReleaseTag) -> String {
        format!("{}/{}", self.releases_dir(), release)
    }

    pub fn release_marker(&self, release: &ReleaseTag) -> String {
        format!("{}/{}", self.release_dir(release), RELEASE_MARKER)
    }

    /// Symlink to the live release directory.
    pub fn current_link(&self) -> String {
        format!("{}/current", self.app_dir)
    }

    pub fn shared_dir(&self) -> String {
        format!("{}/shared", self.app_dir)
    }

    /// `relative` must already have passed `validate_relative_path`.
    pub fn shared_path(&self, relative: &str) -> String {
        format!("{}/{}", self.shared_dir(), relative.trim_end_matches('/'))
    }

    pub fn env_file(&self, env_file: &str) -> String {
        self.shared_path(env_file)
    }

    pub fn lock_file(&self) -> String {
        format!("{}/{}", self.app_dir, LOCK_FILE)
    }

    pub fn migration_marker(&self) -> String {
        format!("{}/{}", self.app_dir, MIGRATION_WARNING_MARKER)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNames {
    pub production: String,
    pub temp: String,
    pub database: String,
    pub worker: String,
}

impl ContainerNames {
    pub fn new(app: &AppName) -> Self {
        Self {
            production: app.to_string(),
            temp: app.temp_container(),
            database: format!("{}-db", app),
            worker: format!("{}-worker", app),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let app = AppName::new("shop").unwrap();
        let layout = RemoteLayout::new("/opt/skiff/", &app);
        let tag = ReleaseTag::new("20240102030405").unwrap();

        assert_eq!(layout.app_dir(), "/opt/skiff/apps/shop");
        assert_eq!(layout.release_dir(&tag), "/opt/skiff/apps/shop/releases/20240102030405");
        assert_eq!(layout.current_link(), "/opt/skiff/apps/shop/current");
        assert_eq!(layout.shared_path("var/log/"), "/opt/skiff/apps/shop/shared/var/log");
        assert_eq!(layout.env_file(".env"), "/opt/skiff/apps/shop/shared/.env");
        assert_eq!(layout.lock_file(), "/opt/skiff/apps/shop/.deploy.lock");
        assert_eq!(
            layout.release_marker(&tag),
            "/opt/skiff/apps/shop/releases/20240102030405/.skiff-release.json"
        );
    }

    #[test]
    fn container_names() {
        let names = ContainerNames::new(&AppName::new("shop").unwrap());
        assert_eq!(names.production, "shop");
        assert_eq!(names.temp, "shop-new");
        assert_eq!(names.database, "shop-db");
        assert_eq!(names.worker, "shop-worker");
    }
}
