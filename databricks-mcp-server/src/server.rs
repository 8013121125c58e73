//! Main MCP server implementation using PulseEngine MCP framework

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use pulseengine_mcp_protocol::*;
use pulseengine_mcp_server::{McpBackend, McpServer, ServerConfig as McpServerConfig};

use databricks_api_client::DatabricksClient;
use databricks_mcp_shared::{DatabricksConfig, DatabricksError, Result};

use crate::resources::ResourceProvider;
use crate::tools::ToolProvider;

const INSTRUCTIONS: &str = "Databricks workspace access: list, inspect, start and terminate \
clusters, list and run jobs, and execute SQL statements on SQL warehouses. Cluster and job \
listings are also available as the databricks://clusters and databricks://jobs resources.";

pub struct DatabricksMcpServer {
    config: DatabricksConfig,
    resource_provider: Arc<ResourceProvider>,
    tool_provider: Arc<ToolProvider>,
}

impl DatabricksMcpServer {
    pub fn new(config: DatabricksConfig) -> Result<Self> {
        info!("Initializing Databricks MCP Server with PulseEngine framework");

        let client = Arc::new(DatabricksClient::new(&config)?);

        Ok(Self {
            resource_provider: Arc::new(ResourceProvider::new(client.clone())),
            tool_provider: Arc::new(ToolProvider::new(client)),
            config,
        })
    }

    pub async fn run(self) -> Result<()> {
        let backend = DatabricksMcpBackend {
            inner: Arc::new(self),
        };

        // Default server config serves over stdio
        let mut server = McpServer::new(backend, McpServerConfig::default())
            .await
            .map_err(|e| DatabricksError::Mcp(format!("Failed to create server: {}", e)))?;

        info!("Starting PulseEngine MCP server with stdio transport");

        server
            .run()
            .await
            .map_err(|e| DatabricksError::Mcp(format!("Server run error: {}", e)))
    }
}

#[derive(Clone)]
struct DatabricksMcpBackend {
    inner: Arc<DatabricksMcpServer>,
}

#[async_trait]
impl McpBackend for DatabricksMcpBackend {
    type Config = DatabricksConfig;
    type Error = DatabricksError;

    async fn initialize(config: Self::Config) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            inner: Arc::new(DatabricksMcpServer::new(config)?),
        })
    }

    fn get_server_info(&self) -> ServerInfo {
        let server = &self.inner.config.server;

        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: server.name.clone(),
                version: server.version.clone(),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    async fn health_check(&self) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    async fn list_tools(
        &self,
        _params: PaginatedRequestParam,
    ) -> std::result::Result<ListToolsResult, Self::Error> {
        let tools = self.inner.tool_provider.list_tools();
        debug!("Found {} tools", tools.len());

        Ok(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParam,
    ) -> std::result::Result<CallToolResult, Self::Error> {
        debug!("Calling tool: {}", params.name);

        let output = self
            .inner
            .tool_provider
            .call_tool(&params.name, params.arguments)
            .await?;

        output.into_call_result()
    }

    async fn list_resources(
        &self,
        _params: PaginatedRequestParam,
    ) -> std::result::Result<ListResourcesResult, Self::Error> {
        let resources = self.inner.resource_provider.list_resources();
        debug!("Found {} resources", resources.len());

        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        params: ReadResourceRequestParam,
    ) -> std::result::Result<ReadResourceResult, Self::Error> {
        let contents = self.inner.resource_provider.read_resource(&params.uri).await?;

        Ok(ReadResourceResult { contents })
    }

    async fn list_prompts(
        &self,
        _params: PaginatedRequestParam,
    ) -> std::result::Result<ListPromptsResult, Self::Error> {
        Ok(ListPromptsResult {
            prompts: vec![],
            next_cursor: None,
        })
    }

    async fn get_prompt(
        &self,
        params: GetPromptRequestParam,
    ) -> std::result::Result<GetPromptResult, Self::Error> {
        Err(DatabricksError::InvalidParams(format!(
            "Prompt '{}' not found",
            params.name
        )))
    }
}
