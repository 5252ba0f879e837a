use crate::error::{NestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Endpoint used when a peer name has no mapping and no template applies.
pub const UNKNOWN_ENDPOINT: &str = "http://unknown/";

const ENV_PREFIX: &str = "NESTCALL_";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Bounds applied to every inbound envelope before it is processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_actions")]
    pub max_actions: usize,
}

fn default_max_depth() -> usize {
    8
}

fn default_max_actions() -> usize {
    256
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_actions: default_max_actions(),
        }
    }
}

// ---------------------------------------------------------------------------
// BackendConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Memory,
    Redb {
        path: PathBuf,
    },
    Mysql {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
    Mongodb {
        url: String,
        #[serde(default = "default_database")]
        database: String,
    },
}

fn default_max_connections() -> u32 {
    5
}

fn default_database() -> String {
    "nested".to_string()
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Memory => "memory",
            BackendConfig::Redb { .. } => "redb",
            BackendConfig::Mysql { .. } => "mysql",
            BackendConfig::Mongodb { .. } => "mongodb",
        }
    }
}

// ---------------------------------------------------------------------------
// PeerDirectory
// ---------------------------------------------------------------------------

/// Maps logical peer service names to base URLs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerDirectory {
    endpoints: BTreeMap<String, String>,
    template: Option<String>,
}

impl PeerDirectory {
    pub fn new(endpoints: BTreeMap<String, String>, template: Option<String>) -> Self {
        Self {
            endpoints,
            template,
        }
    }

    /// Explicit mapping first, then the `{name}` template, then
    /// [`UNKNOWN_ENDPOINT`]. Resolution never fails; a bad endpoint
    /// surfaces as a transport error.
    pub fn resolve(&self, service: &str) -> String {
        if let Some(url) = self.endpoints.get(service) {
            return url.clone();
        }
        match &self.template {
            Some(t) if t.contains("{name}") => t.replace("{name}", service),
            _ => UNKNOWN_ENDPOINT.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Identity stamped on every action this instance executes.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub peers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_url_template: Option<String>,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default = "default_backends")]
    pub backends: BTreeMap<String, BackendConfig>,
}

fn default_service_name() -> String {
    "nestcall".to_string()
}

fn default_call_timeout() -> u64 {
    30
}

fn default_backends() -> BTreeMap<String, BackendConfig> {
    BTreeMap::from([
        ("mysql".to_string(), BackendConfig::Memory),
        ("mongodb".to_string(), BackendConfig::Memory),
    ])
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            peers: BTreeMap::new(),
            peer_url_template: None,
            call_timeout_secs: default_call_timeout(),
            limits: Limits::default(),
            backends: default_backends(),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NestError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: ServiceConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Overlay `NESTCALL_*` variables onto this config.
    ///
    /// `NESTCALL_PEER_<NAME>` maps peer `<name>` (lowercased, `_` → `-`).
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "SERVICE_NAME" => self.service_name = value,
                "PEER_URL_TEMPLATE" => self.peer_url_template = Some(value),
                "CALL_TIMEOUT_SECS" => {
                    self.call_timeout_secs = value.parse().map_err(|_| {
                        NestError::Config(format!("{key} must be a whole number, got '{value}'"))
                    })?;
                }
                "MYSQL_URL" => {
                    let max_connections = match self.backends.get("mysql") {
                        Some(BackendConfig::Mysql {
                            max_connections, ..
                        }) => *max_connections,
                        _ => default_max_connections(),
                    };
                    self.backends.insert(
                        "mysql".to_string(),
                        BackendConfig::Mysql {
                            url: value,
                            max_connections,
                        },
                    );
                }
                "MONGODB_URL" => {
                    let database = match self.backends.get("mongodb") {
                        Some(BackendConfig::Mongodb { database, .. }) => database.clone(),
                        _ => default_database(),
                    };
                    self.backends.insert(
                        "mongodb".to_string(),
                        BackendConfig::Mongodb {
                            url: value,
                            database,
                        },
                    );
                }
                other => {
                    if let Some(peer) = other.strip_prefix("PEER_") {
                        let peer = peer.to_ascii_lowercase().replace('_', "-");
                        self.peers.insert(peer, value);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn peer_directory(&self) -> PeerDirectory {
        PeerDirectory::new(self.peers.clone(), self.peer_url_template.clone())
    }

    /// Validate the configuration and return a list of warnings/errors.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if self.service_name.trim().is_empty() {
            error("service_name must not be empty".to_string());
        }
        if self.call_timeout_secs == 0 {
            error("call_timeout_secs must be greater than zero".to_string());
        }
        if self.limits.max_depth == 0 {
            error("limits.max_depth must be greater than zero".to_string());
        }
        if self.limits.max_actions == 0 {
            error("limits.max_actions must be greater than zero".to_string());
        }
        for (name, backend) in &self.backends {
            let empty = match backend {
                BackendConfig::Mysql { url, .. } | BackendConfig::Mongodb { url, .. } => {
                    url.trim().is_empty()
                }
                BackendConfig::Redb { path } => path.as_os_str().is_empty(),
                BackendConfig::Memory => false,
            };
            if empty {
                error(format!(
                    "backend '{name}' ({}) has no connection target",
                    backend.kind()
                ));
            }
        }
        for (name, url) in &self.peers {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                error(format!("peer '{name}' url '{url}' must start with http:// or https://"));
            }
        }

        for (name, url) in &self.peers {
            if url.starts_with("http://") {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("peer '{name}' is reached over plain http"),
                });
            }
        }
        if let Some(t) = &self.peer_url_template {
            if !t.contains("{name}") {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "peer_url_template '{t}' has no {{name}} placeholder and will be ignored"
                    ),
                });
            } else if t.starts_with("http://") {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: "peer_url_template reaches peers over plain http".to_string(),
                });
            }
        }
        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn default_config_uses_memory_backends() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.service_name, "nestcall");
        assert_eq!(cfg.backends["mysql"], BackendConfig::Memory);
        assert_eq!(cfg.backends["mongodb"], BackendConfig::Memory);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn load_parses_yaml_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nestcall.yaml");
        std::fs::write(
            &path,
            r#"
service_name: rust-svc
peers:
  ruby: https://ruby.internal:3000/
backends:
  mysql: { kind: mysql, url: "mysql://root@db/nested" }
  docs: { kind: redb, path: /var/lib/nestcall/docs.redb }
"#,
        )
        .unwrap();

        let cfg = ServiceConfig::load(&path).unwrap();
        assert_eq!(cfg.service_name, "rust-svc");
        assert_eq!(cfg.call_timeout_secs, 30);
        assert_eq!(cfg.limits, Limits::default());
        assert_eq!(
            cfg.backends["mysql"],
            BackendConfig::Mysql {
                url: "mysql://root@db/nested".into(),
                max_connections: 5
            }
        );
        assert_eq!(cfg.backends["docs"].kind(), "redb");
        assert!(!cfg.backends.contains_key("mongodb"));
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = ServiceConfig::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, NestError::Config(_)));
    }

    #[test]
    fn resolve_prefers_explicit_then_template_then_unknown() {
        let mut peers = BTreeMap::new();
        peers.insert("ruby".to_string(), "https://ruby:3000/".to_string());
        let dir = PeerDirectory::new(peers.clone(), Some("https://{name}.svc/".into()));
        assert_eq!(dir.resolve("ruby"), "https://ruby:3000/");
        assert_eq!(dir.resolve("go"), "https://go.svc/");

        let bare = PeerDirectory::new(peers, None);
        assert_eq!(bare.resolve("go"), UNKNOWN_ENDPOINT);
    }

    #[test]
    fn apply_env_overrides_fields_and_peers() {
        let mut cfg = ServiceConfig::default();
        cfg.apply_env(env(&[
            ("NESTCALL_SERVICE_NAME", "edge"),
            ("NESTCALL_PEER_URL_TEMPLATE", "https://{name}.mesh/"),
            ("NESTCALL_PEER_NODE_JS", "https://node:8080/"),
            ("NESTCALL_CALL_TIMEOUT_SECS", "5"),
            ("NESTCALL_MONGODB_URL", "mongodb://mongo:27017"),
            ("HOME", "/root"),
        ]))
        .unwrap();

        assert_eq!(cfg.service_name, "edge");
        assert_eq!(cfg.peer_url_template.as_deref(), Some("https://{name}.mesh/"));
        assert_eq!(cfg.peers["node-js"], "https://node:8080/");
        assert_eq!(cfg.call_timeout_secs, 5);
        assert_eq!(
            cfg.backends["mongodb"],
            BackendConfig::Mongodb {
                url: "mongodb://mongo:27017".into(),
                database: "nested".into()
            }
        );
        assert_eq!(cfg.backends["mysql"], BackendConfig::Memory);
    }

    #[test]
    fn apply_env_rejects_bad_timeout() {
        let mut cfg = ServiceConfig::default();
        let err = cfg
            .apply_env(env(&[("NESTCALL_CALL_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("NESTCALL_CALL_TIMEOUT_SECS"));
    }

    #[test]
    fn validate_flags_errors_and_plain_http() {
        let mut cfg = ServiceConfig::default();
        cfg.service_name = " ".into();
        cfg.limits.max_depth = 0;
        cfg.peers.insert("go".into(), "go:8080".into());
        cfg.peers.insert("py".into(), "http://py:8000/".into());
        cfg.backends.insert(
            "mysql".into(),
            BackendConfig::Mysql {
                url: String::new(),
                max_connections: 1,
            },
        );

        let warnings = cfg.validate();
        let errors: Vec<_> = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .collect();
        assert_eq!(errors.len(), 4, "{warnings:?}");
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("'py'")));
    }

    #[test]
    fn validate_warns_on_template_without_placeholder() {
        let mut cfg = ServiceConfig::default();
        cfg.peer_url_template = Some("https://static.svc/".into());
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Warning);
    }
}
