use serde::{Deserialize, Serialize};
use svcbus_capabilities_directory::LcdConfig;
use svcbus_router::RouterConfig;

/// The on-disk configuration document: CLI flags in `main` override
/// individual fields after this is loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterControllerConfig {
    pub cluster_controller_id: String,
    pub known_gbids: Vec<String>,
    pub default_gbid: String,
    pub router: RouterConfig,
    pub lcd: LcdConfig,
}

impl Default for ClusterControllerConfig {
    fn default() -> Self {
        Self {
            cluster_controller_id: "cluster-controller-1".to_string(),
            known_gbids: vec!["joynrdefaultgbid".to_string()],
            default_gbid: "joynrdefaultgbid".to_string(),
            router: RouterConfig::default(),
            lcd: LcdConfig::default(),
        }
    }
}

impl ClusterControllerConfig {
    pub fn load(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(err) => {
                    log::error!("failed to parse config at {}: {err}; using defaults", path.display());
                    Self::default()
                }
            },
            Err(err) => {
                log::info!("no config file at {} ({err}); using defaults", path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = ClusterControllerConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: ClusterControllerConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.cluster_controller_id, parsed.cluster_controller_id);
        assert_eq!(config.known_gbids, parsed.known_gbids);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ClusterControllerConfig::load(std::path::Path::new("/nonexistent/cluster-controller.toml"));
        assert_eq!(config.cluster_controller_id, ClusterControllerConfig::default().cluster_controller_id);
    }
}
