//! MCP tool definitions for the comharvest server.

use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::harvest::{finalize, ComponentUnit, HarvestFile, HarvestedComponent, NativeEngine};
use crate::server::session::HarvestStore;
use crate::server::types::*;
use parking_lot::Mutex;
use rmcp::handler::server::{router::tool::ToolRouter, wrapper::Parameters};
use rmcp::model::*;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Available tools.
const TOOLS: &[&str] = &[
    "com_harvest_file",
    "com_classify_entries",
    "com_list_harvests",
    "com_get_harvest",
    "com_get_status",
];

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("serialization error: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn harvest_error(err: HarvestError) -> McpError {
    match err {
        HarvestError::InvalidParameter(_) | HarvestError::UnsupportedPlatform => {
            McpError::invalid_params(err.to_string(), None)
        }
        other => McpError::internal_error(format!("harvest failed: {}", other), None),
    }
}

/// The comharvest MCP server.
#[derive(Clone)]
pub struct ComHarvestServer {
    harvests: HarvestStore,
    /// Hive overrides are process-wide, so native harvests run one at a time.
    engine: Arc<Mutex<NativeEngine>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ComHarvestServer {
    pub fn new() -> Self {
        ComHarvestServer {
            harvests: HarvestStore::new(),
            engine: Arc::new(Mutex::new(NativeEngine::new())),
            tool_router: Self::tool_router(),
        }
    }

    async fn store(
        &self,
        source: String,
        component: HarvestedComponent,
    ) -> Result<CallToolResult, McpError> {
        let id = self.harvests.insert(source, component).await;
        let record = self
            .harvests
            .get(&id)
            .await
            .ok_or_else(|| McpError::internal_error("harvest vanished after insert", None))?;
        info!(
            "Stored harvest {} ({} entities)",
            id,
            record.component.entity_count()
        );
        json_result(&json!({
            "harvest_id": id,
            "summary": record.summary(),
            "component": record.component,
        }))
    }

    /// Capture and reconstruct the COM registration of one file.
    #[tool(description = "Harvest COM registration from a file. Loads the module inside a redirected registry, calls its registration entry point (or registers it as a type library), and returns classified COM entities (CLSIDs, ProgIDs, AppIDs, interfaces, type libraries) plus leftover raw registry entries with paths replaced by file/directory tokens. Fields: path, file_id, kind (dynamic_link|type_library|plain), component_id, files/directories (declared ids for path tokenization), config. Windows only.")]
    async fn com_harvest_file(
        &self,
        Parameters(req): Parameters<HarvestFileRequest>,
    ) -> Result<CallToolResult, McpError> {
        info!("Harvesting file: {}", req.path);
        if req.file_id.trim().is_empty() {
            return Err(harvest_error(HarvestError::InvalidParameter(
                "'file_id' must not be empty".to_string(),
            )));
        }
        req.config.validate().map_err(harvest_error)?;

        let mut index = build_index(&req.files, &req.directories);
        if index.file_for_path(&req.path).is_none() {
            index.register_file(&req.path, &req.file_id);
        }

        let file = HarvestFile {
            path: PathBuf::from(&req.path),
            file_id: req.file_id.clone(),
            kind: req.kind,
        };
        let component_id = req.component_id.clone().unwrap_or_else(|| req.file_id.clone());
        let config = req.config;
        let engine = Arc::clone(&self.engine);

        let component = tokio::task::spawn_blocking(move || {
            let engine = engine.lock();
            engine.harvest(&file, &component_id, &config, &index)
        })
        .await
        .map_err(|e| McpError::internal_error(format!("harvest task failed: {}", e), None))?
        .map_err(harvest_error)?;

        self.store(req.path, component).await
    }

    /// Classify raw entries supplied by the caller.
    #[tool(description = "Classify caller-supplied registry entries into COM entities without loading any module. Useful for entries captured elsewhere. Fields: component_id, entries (root, key, name, kind, value, remove), files/directories (declared ids for path tokenization), config.")]
    async fn com_classify_entries(
        &self,
        Parameters(req): Parameters<ClassifyEntriesRequest>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            "Classifying {} entries for component {}",
            req.entries.len(),
            req.component_id
        );
        req.config.validate().map_err(harvest_error)?;
        let entries = req
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                e.to_entry()
                    .map_err(|msg| McpError::invalid_params(format!("entries[{}]: {}", i, msg), None))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let index = build_index(&req.files, &req.directories);
        let unit = ComponentUnit::with_entries(req.component_id, entries);
        let component = finalize(unit, &req.config, &index);
        self.store("entries".to_string(), component).await
    }

    /// List stored harvests.
    #[tool(description = "List all stored harvests with their IDs, components, sources and entity/entry/warning counts.")]
    async fn com_list_harvests(&self) -> Result<CallToolResult, McpError> {
        let summaries = self.harvests.list().await;
        json_result(&summaries)
    }

    /// Fetch one stored harvest.
    #[tool(description = "Get the full result of a stored harvest: entity trees, leftover raw entries and diagnostics. Fields: harvest_id.")]
    async fn com_get_harvest(
        &self,
        Parameters(req): Parameters<GetHarvestRequest>,
    ) -> Result<CallToolResult, McpError> {
        let record = self.harvests.get(&req.harvest_id).await.ok_or_else(|| {
            McpError::invalid_params(format!("Harvest not found: {}", req.harvest_id), None)
        })?;
        json_result(&json!({
            "summary": record.summary(),
            "component": record.component,
        }))
    }

    /// Get server status.
    #[tool(description = "Get comharvest server status including version, stored harvest count, whether native harvesting is available on this platform, and the registry root that would be overridden.")]
    async fn com_get_status(&self) -> Result<CallToolResult, McpError> {
        let status = ServerStatus {
            version: VERSION.to_string(),
            stored_harvests: self.harvests.count().await,
            native_harvesting: NativeEngine::is_supported(),
            override_root: HarvestConfig::default().override_root.resolve().hive_name().to_string(),
            tools: TOOLS.iter().map(|t| t.to_string()).collect(),
        };
        json_result(&status)
    }
}

impl Default for ComHarvestServer {
    fn default() -> Self {
        ComHarvestServer::new()
    }
}

#[tool_handler]
impl ServerHandler for ComHarvestServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "comharvest: COM registration capture and reconstruction MCP server. \
                 Call com_harvest_file with a DLL/OCX path and a file_id to capture what its \
                 registration entry point writes and get back CLSIDs, ProgIDs, AppIDs, interfaces \
                 and type libraries. Declare files and directories to have absolute paths \
                 replaced with [#file], [!file] and [dir] tokens.\n\
                 For entries captured elsewhere: call com_classify_entries.\n\
                 Results are stored; use com_list_harvests and com_get_harvest to revisit them."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
