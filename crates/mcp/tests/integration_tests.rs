//! Integration tests for the Feishu MCP server
//!
//! Exercise the public surface: server construction from configuration,
//! advertised capabilities and the tool table against the routed tools.

use feishu_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use feishu_mcp::{FeishuMcpServer, ToolCategory, ToolName, ALL_TOOLS, TOTAL_TOOLS};
use rmcp::ServerHandler;

fn test_config() -> AppConfig {
    AppConfig::load(LoadOptions {
        overrides: ConfigOverrides {
            app_id: Some("cli_a1b2c3".to_string()),
            app_secret: Some("app-secret".to_string()),
            base_url: Some("http://127.0.0.1:9".to_string()),
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    })
    .expect("config should load")
}

#[test]
fn test_server_info() {
    let server = FeishuMcpServer::from_config(&test_config()).expect("server should build");
    let info = server.get_info();

    assert_eq!(info.server_info.name, "feishu-mcp");
    assert_eq!(info.server_info.version, env!("CARGO_PKG_VERSION"));
    assert!(info.capabilities.tools.is_some());
}

#[test]
fn test_tool_table_matches_the_router_listing() {
    let listed: Vec<String> = FeishuMcpServer::from_config(&test_config())
        .expect("server should build")
        .list_tool_names();

    assert_eq!(listed.len(), TOTAL_TOOLS);
    for tool in ALL_TOOLS {
        assert!(listed.iter().any(|name| name == tool.as_str()), "{tool} is not routed");
    }
    assert_eq!(ToolName::UploadFileAndShare.to_string(), "upload_file_and_share");
}

#[test]
fn test_every_tool_has_a_category() {
    let counted: usize = ToolCategory::ALL.iter().map(|category| category.tools().count()).sum();

    assert_eq!(counted, TOTAL_TOOLS);
}
