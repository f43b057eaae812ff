//! Feishu MCP Server Binary
//!
//! Speaks MCP over stdin/stdout; logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! FEISHU_APP_ID=cli_a1b2c3 FEISHU_APP_SECRET=... feishu-mcp
//!
//! # Smaller batches and slower pacing for busy documents
//! FEISHU_DOCS_BATCH_SIZE=20 FEISHU_DOCS_PACING_MS=1000 feishu-mcp
//! ```

use anyhow::Result;
use feishu_core::config::{AppConfig, LoadOptions, LogFormat};
use feishu_mcp::FeishuMcpServer;
use rmcp::{transport::stdio, ServiceExt};
use tracing::info;

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_max_level(log_level);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let server = FeishuMcpServer::from_config(&config)?;
    info!(
        event_name = "system.mcp.started",
        correlation_id = "bootstrap",
        platform_base_url = %config.feishu.base_url,
        batch_size = config.docs.batch_size,
        tool_count = server.list_tool_names().len(),
        "feishu-mcp serving on stdio"
    );

    let service = server.serve(stdio()).await?;
    let reason = service.waiting().await?;
    info!(event_name = "system.mcp.stopped", correlation_id = "shutdown", ?reason, "feishu-mcp stopped");

    Ok(())
}
