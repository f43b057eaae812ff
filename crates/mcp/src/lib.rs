//! Feishu MCP (Model Context Protocol) Server
//!
//! Exposes the platform client to AI agents as MCP tools over stdio:
//! messaging, group calendars, tasks, drive uploads, document authoring
//! (markdown is compiled to docx blocks and written in paced batches) and
//! document permissions.
//!
//! ## Architecture
//!
//! - `FeishuMcpServer`: rmcp handler; one `#[tool]` method per tool
//! - `tools`: [`ToolName`] enum and category lookup table
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use feishu_core::config::{AppConfig, LoadOptions};
//! use feishu_mcp::FeishuMcpServer;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = AppConfig::load(LoadOptions::default())?;
//! let server = FeishuMcpServer::from_config(&config)?;
//! # let _ = server;
//! # Ok(())
//! # }
//! ```

mod server;
mod tools;

pub use server::FeishuMcpServer;
pub use tools::*;

use feishu_core::errors::{FailureClass, PlatformError, SubmissionError};
use thiserror::Error;

/// Errors specific to tool execution
#[derive(Error, Debug)]
pub enum McpError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("invalid argument `{field}`: {message}")]
    InvalidArgument { field: &'static str, message: String },
}

impl McpError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument { field, message: message.into() }
    }

    /// Convert to JSON-RPC error code
    pub fn error_code(&self) -> i32 {
        match self {
            McpError::InvalidArgument { .. } => -32602, // Invalid params
            McpError::Platform(PlatformError::LocalFile { .. }) => -32602,
            McpError::Platform(_) | McpError::Submission(_) => -32603, // Internal error
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            McpError::Platform(error) => error.class(),
            McpError::Submission(error) => error.class(),
            McpError::InvalidArgument { .. } => FailureClass::MalformedInput,
        }
    }
}

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;
