// ABOUTME: Deserializer for the `servers` list of skiff.yml.
// ABOUTME: Entries are "user@host:port" strings or maps; duplicates are rejected.

use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::BTreeSet;

use super::ServerConfig;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServerSpec {
    Address(String),
    Table(ServerConfig),
}

impl ServerSpec {
    fn resolve(self) -> Result<ServerConfig, String> {
        match self {
            ServerSpec::Address(address) => ServerConfig::parse(&address),
            ServerSpec::Table(server) => Ok(server),
        }
    }
}

pub fn deserialize_servers<'de, D>(deserializer: D) -> Result<NonEmpty<ServerConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let specs: Vec<ServerSpec> = Vec::deserialize(deserializer)?;

    let mut seen = BTreeSet::new();
    let mut servers = Vec::with_capacity(specs.len());
    for spec in specs {
        let server = spec.resolve().map_err(serde::de::Error::custom)?;
        // Keyed by host and port.
        if !seen.insert((server.host.clone(), server.port)) {
            return Err(serde::de::Error::custom(format!(
                "server {}:{} is listed more than once",
                server.host, server.port
            )));
        }
        servers.push(server);
    }

    NonEmpty::from_vec(servers)
        .ok_or_else(|| serde::de::Error::custom("at least one server is required"))
}
