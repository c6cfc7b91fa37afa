//! ---
//! docqa_section: "01-core-functionality"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Shared primitives and utilities for the service runtime."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

/// Role name that is always present and can never be deleted.
pub const ADMIN_ROLE: &str = "admin";
/// Role applied to non-admin actors without any explicit assignment.
pub const DEFAULT_ROLE: &str = "user";

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_token_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_query_results() -> usize {
    5
}

fn default_max_document_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["pdf".to_owned()]
}

fn default_role_name() -> String {
    DEFAULT_ROLE.to_owned()
}

fn default_protected_roles() -> Vec<String> {
    vec![ADMIN_ROLE.to_owned(), DEFAULT_ROLE.to_owned()]
}

fn grant(action: &str, resource: &str) -> GrantConfig {
    GrantConfig {
        action: action.to_owned(),
        resource: resource.to_owned(),
    }
}

fn default_policy_roles() -> IndexMap<String, RoleConfig> {
    let mut roles = IndexMap::new();
    roles.insert(
        ADMIN_ROLE.to_owned(),
        RoleConfig {
            grants: vec![
                grant("manage_roles", "Role"),
                grant("manage_users", "User"),
                grant("read", "Document"),
                grant("write", "Document"),
                grant("delete", "Document"),
            ],
        },
    );
    roles.insert(
        DEFAULT_ROLE.to_owned(),
        RoleConfig {
            grants: vec![grant("read", "Document"), grant("write", "Document")],
        },
    );
    roles
}

/// Primary configuration object for the DocQA runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "DOCQA_CONFIG";

    /// Load configuration from disk, respecting the `DOCQA_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path.
    ///
    /// Falls back to built-in defaults when no candidate exists.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!("no configuration file found; using built-in defaults");
        Ok(LoadedAppConfig {
            config: Self::default(),
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        self.documents.validate()?;
        for admin in &self.bootstrap.admins {
            if admin.email.trim().is_empty() {
                return Err(anyhow!("bootstrap admin entries require an email"));
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
    /// Lifetime of bearer tokens issued by `/users/token`.
    #[serde(default = "default_token_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub token_ttl: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
            token_ttl: default_token_ttl(),
        }
    }
}

/// Chunking and retrieval parameters for the document index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_query_results")]
    pub query_results: usize,
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            query_results: default_query_results(),
            max_document_bytes: default_max_document_bytes(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl DocumentsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(anyhow!("documents.chunk_size must be positive"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(anyhow!(
                "documents.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            ));
        }
        Ok(())
    }
}

/// Location of the hash-chained audit log. Auditing is disabled when unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// A single `(action, resource-type)` grant as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantConfig {
    pub action: String,
    pub resource: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    #[serde(default)]
    pub grants: Vec<GrantConfig>,
}

/// Role catalog seed applied at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_role_name")]
    pub default_role: String,
    /// Roles that role-management operations refuse to delete. `admin` is
    /// protected whether or not it is listed here.
    #[serde(default = "default_protected_roles")]
    pub protected_roles: Vec<String>,
    #[serde(default = "default_policy_roles")]
    pub roles: IndexMap<String, RoleConfig>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_role: default_role_name(),
            protected_roles: default_protected_roles(),
            roles: default_policy_roles(),
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.roles.contains_key(ADMIN_ROLE) {
            return Err(anyhow!("policy must define the '{}' role", ADMIN_ROLE));
        }
        if !self.roles.contains_key(&self.default_role) {
            return Err(anyhow!(
                "policy default_role '{}' is not a defined role",
                self.default_role
            ));
        }
        for name in self.roles.keys() {
            if name.trim().is_empty() {
                return Err(anyhow!("policy role names cannot be empty"));
            }
        }
        Ok(())
    }
}

/// Administrator accounts created on startup when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub admins: Vec<BootstrapAdmin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_seed_admin_and_user_roles() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.policy.default_role, "user");
        assert_eq!(config.policy.roles.len(), 2);
        assert_eq!(config.policy.roles[ADMIN_ROLE].grants.len(), 5);
        assert!(config.policy.protected_roles.contains(&"user".to_string()));
    }

    #[test]
    fn parses_policy_overrides() {
        let raw = r#"
            [api]
            listen = "0.0.0.0:9000"
            token_ttl = 60

            [policy]
            default_role = "reader"

            [policy.roles.admin]
            grants = [{ action = "manage_roles", resource = "Role" }]

            [policy.roles.reader]
            grants = [{ action = "read", resource = "Document" }]
        "#;
        let config: AppConfig = raw.parse().unwrap();
        assert_eq!(config.api.token_ttl, Duration::from_secs(60));
        assert_eq!(config.policy.default_role, "reader");
        let names: Vec<_> = config.policy.roles.keys().cloned().collect();
        assert_eq!(names, vec!["admin", "reader"]);
    }

    #[test]
    fn rejects_policy_without_admin_role() {
        let raw = r#"
            [policy.roles.user]
            grants = []
        "#;
        let err = raw.parse::<AppConfig>().unwrap_err();
        assert!(format!("{err:#}").contains("'admin'"));
    }

    #[test]
    fn rejects_undefined_default_role() {
        let raw = r#"
            [policy]
            default_role = "guest"
        "#;
        assert!(raw.parse::<AppConfig>().is_err());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk() {
        let raw = r#"
            [documents]
            chunk_size = 100
            chunk_overlap = 100
        "#;
        assert!(raw.parse::<AppConfig>().is_err());
    }

    #[test]
    fn loads_from_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docqa.toml");
        fs::write(&path, "[audit]\npath = \"audit.log\"\n").unwrap();
        let missing = dir.path().join("missing.toml");
        let loaded = AppConfig::load_with_source(&[missing, path.clone()]).unwrap();
        assert_eq!(loaded.source.as_deref(), Some(path.as_path()));
        assert_eq!(
            loaded.config.audit.path.as_deref(),
            Some(Path::new("audit.log"))
        );
    }

    #[test]
    fn example_config_is_valid() {
        let config: AppConfig = include_str!("../../../configs/docqa.example.toml")
            .parse()
            .unwrap();
        assert_eq!(config.bootstrap.admins.len(), 1);
        assert_eq!(config.policy.roles.len(), 2);
        assert_eq!(config.api.token_ttl, Duration::from_secs(3600));
    }
}
