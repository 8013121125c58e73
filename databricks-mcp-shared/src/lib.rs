//! Shared types, configuration and errors for the Databricks MCP connector

pub mod config;
pub mod error;
pub mod jwt;
pub mod redact;
pub mod types;

pub use config::{DatabricksConfig, HttpConfig, LoggingConfig, ServerConfig, WorkspaceConfig};
pub use error::{ApiError, AuthError, DatabricksError, Result};
pub use types::*;
