//! ---
//! docqa_section: "01-core-functionality"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Shared primitives and utilities for the service runtime."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
//! Shared primitives for the DocQA workspace: configuration loading and
//! tracing setup consumed by the API and daemon crates.

pub mod config;
pub mod logging;

pub use config::{
    ApiConfig, AppConfig, AuditConfig, BootstrapAdmin, BootstrapConfig, DocumentsConfig,
    GrantConfig, LoggingConfig, PolicyConfig, RoleConfig, ADMIN_ROLE, DEFAULT_ROLE,
};
pub use logging::{init_cli_tracing, init_tracing, LogFormat};
