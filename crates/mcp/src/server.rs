//! MCP Server implementation for the Feishu bridge
//!
//! Each `#[tool]` method parses its arguments, calls the platform client and
//! hands the outcome to [`respond`]. Platform and argument failures come back
//! as tool error results carrying `{"error": ...}`; only serialization faults
//! surface as protocol errors.

use std::path::Path;
use std::sync::Arc;

use feishu_client::{
    unix_millis, unix_seconds, CalendarEventDraft, FeishuClient, PublicAccess, TaskDraft,
    TaskFilter,
};
use feishu_core::config::AppConfig;
use feishu_core::docx::{write_markdown, BatchPolicy};
use feishu_core::errors::PlatformError;
use feishu_core::platform::{
    MessageTarget, MessageType, OutgoingMessage, PermissionLevel, PermissionMember,
};
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    tool, tool_handler, tool_router, ErrorData, ServerHandler,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::{McpError, McpResult, ToolName};

const SERVER_NAME: &str = "feishu-mcp";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SendMessageParams {
    /// Receiver ID type: chat_id | open_id | user_id | union_id | email
    pub receive_id_type: String,
    /// Receiver ID
    pub receive_id: String,
    /// Message content as a JSON string, e.g. `{"text": "Hello"}`
    pub content: String,
    /// text | post | interactive | image (default text)
    #[serde(default)]
    pub msg_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReplyMessageParams {
    /// ID of the message to reply to (starts with om_)
    pub message_id: String,
    /// Reply content (JSON string)
    pub content: String,
    #[serde(default)]
    pub msg_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SendCardMessageParams {
    /// Receiver ID type: chat_id | open_id | user_id | union_id | email
    pub receive_id_type: String,
    pub receive_id: String,
    /// Card JSON, as an object or an already serialized string
    pub card: Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ChatParams {
    /// Group ID (starts with oc_)
    pub chat_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateCalendarEventParams {
    pub calendar_id: String,
    /// Event title
    pub summary: String,
    /// Start time in RFC3339 format, e.g. 2026-03-26T10:00:00+08:00
    pub start_time: String,
    /// End time in RFC3339 format
    pub end_time: String,
    #[serde(default)]
    pub description: String,
    /// Attach an online video meeting (default false)
    #[serde(default)]
    pub is_online: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddEventAttendeesParams {
    pub calendar_id: String,
    pub event_id: String,
    /// Attendee open_ids
    pub attendee_open_ids: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListCalendarEventsParams {
    pub calendar_id: String,
    /// Filter start time (RFC3339)
    pub start_time: Option<String>,
    /// Filter end time (RFC3339)
    pub end_time: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTaskParams {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Start time in RFC3339 format or a unix timestamp
    pub start_time: Option<String>,
    /// Due time in RFC3339 format or a unix timestamp
    pub due_time: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AssignTaskParams {
    /// Task GUID returned by create_task
    pub task_guid: String,
    pub assignee_open_ids: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddTaskToListParams {
    pub task_guid: String,
    pub tasklist_guid: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListTasksParams {
    pub tasklist_guid: Option<String>,
    pub assignee_open_id: Option<String>,
    /// true = completed, false = incomplete, omit for all
    pub completed: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UploadFileParams {
    /// Absolute path to the local file (at most 20 MiB)
    pub file_path: String,
    /// Display name in Drive; defaults to the local file name
    pub file_name: Option<String>,
    /// Target folder token
    pub parent_token: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateFolderParams {
    /// Folder name (1-256 bytes)
    pub name: String,
    /// Parent folder token; empty creates the folder in the root directory
    #[serde(default)]
    pub folder_token: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateDocumentParams {
    pub title: String,
    /// Target folder token; omit to place the document in the root folder
    pub folder_token: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteDocumentMarkdownParams {
    pub document_id: String,
    /// Content in Markdown format
    pub markdown_content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InsertFileBlockParams {
    pub document_id: String,
    /// Token of an uploaded drive file
    pub file_token: String,
    /// Display name of the file
    pub file_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetDocPermissionParams {
    pub file_token: String,
    /// doc | docx | file | bitable | sheet
    pub file_type: String,
    /// User open_ids to grant
    #[serde(default)]
    pub member_open_ids: Vec<String>,
    /// Group chat_ids to grant (the bot must already be in the group)
    #[serde(default)]
    pub chat_ids: Vec<String>,
    /// view | edit | full_access (default view)
    #[serde(default)]
    pub perm_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetDocPublicAccessParams {
    pub file_token: String,
    pub file_type: String,
    /// off | tenant_readable | tenant_editable | anyone_readable | anyone_editable
    #[serde(default)]
    pub access_level: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetShareLinkParams {
    pub file_token: String,
    pub file_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GrantPermissionRequestParams {
    pub file_token: String,
    pub file_type: String,
    /// open_id of the requester
    pub user_open_id: String,
    #[serde(default)]
    pub perm_type: String,
}

/// Tool server over the platform client
#[derive(Clone)]
pub struct FeishuMcpServer {
    client: Arc<FeishuClient>,
    policy: BatchPolicy,
    tool_router: ToolRouter<Self>,
}

fn respond(tool: ToolName, outcome: McpResult<Value>) -> Result<CallToolResult, ErrorData> {
    match outcome {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value)
                .map_err(|error| ErrorData::internal_error(error.to_string(), None))?;
            info!(event_name = "mcp.tool.completed", tool = %tool, "tool call completed");
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
        Err(failure) => {
            error!(
                event_name = "mcp.tool.failed",
                tool = %tool,
                category = tool.category().as_str(),
                failure_class = failure.class().as_str(),
                error_code = failure.error_code(),
                error = %failure,
                "tool call failed"
            );
            let body = json!({ "error": failure.to_string() });
            Ok(CallToolResult::error(vec![Content::text(body.to_string())]))
        }
    }
}

fn message_type(value: &str) -> McpResult<MessageType> {
    value.parse().map_err(|message| McpError::invalid("msg_type", message))
}

fn permission_level(value: &str) -> McpResult<PermissionLevel> {
    value.parse().map_err(|message| McpError::invalid("perm_type", message))
}

fn seconds(field: &'static str, value: &str) -> McpResult<i64> {
    unix_seconds(value).map_err(|message| McpError::invalid(field, message))
}

fn millis(field: &'static str, value: Option<&str>) -> McpResult<Option<i64>> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => {
            unix_millis(value).map(Some).map_err(|message| McpError::invalid(field, message))
        }
        None => Ok(None),
    }
}

fn optional_seconds(field: &'static str, value: Option<&str>) -> McpResult<Option<i64>> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => seconds(field, value).map(Some),
        None => Ok(None),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[tool_router]
impl FeishuMcpServer {
    pub fn new(client: Arc<FeishuClient>, policy: BatchPolicy) -> Self {
        Self { client, policy, tool_router: Self::tool_router() }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, PlatformError> {
        let client = FeishuClient::from_config(&config.feishu)?;
        Ok(Self::new(Arc::new(client), config.docs.batch_policy()))
    }

    #[tool(description = "Send a message to a Feishu group or user (text, rich text or card).")]
    async fn send_message(
        &self,
        Parameters(params): Parameters<SendMessageParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(ToolName::SendMessage, self.send(params).await)
    }

    #[tool(description = "Reply to a specific Feishu message.")]
    async fn reply_message(
        &self,
        Parameters(params): Parameters<ReplyMessageParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(ToolName::ReplyMessage, self.reply(params).await)
    }

    #[tool(description = "Send an interactive card message to a Feishu group or user.")]
    async fn send_card_message(
        &self,
        Parameters(params): Parameters<SendCardMessageParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(ToolName::SendCardMessage, self.send_card(params).await)
    }

    #[tool(description = "List the members of a Feishu group (name, open_id, user_id).")]
    async fn get_chat_members(
        &self,
        Parameters(params): Parameters<ChatParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let outcome =
            self.client.chat_members(&params.chat_id).await.map(Value::Array).map_err(Into::into);
        respond(ToolName::GetChatMembers, outcome)
    }

    #[tool(
        description = "Get a group's shared calendar, creating it when the group has none. Returns calendar_id."
    )]
    async fn get_or_create_group_calendar(
        &self,
        Parameters(params): Parameters<ChatParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let outcome =
            self.client.group_calendar(&params.chat_id).await.map(Value::String).map_err(Into::into);
        respond(ToolName::GetOrCreateGroupCalendar, outcome)
    }

    #[tool(
        description = "Create a Feishu calendar event, optionally with a video meeting. Add participants with add_event_attendees."
    )]
    async fn create_calendar_event(
        &self,
        Parameters(params): Parameters<CreateCalendarEventParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(ToolName::CreateCalendarEvent, self.create_event(params).await)
    }

    #[tool(description = "Add attendees to a Feishu calendar event; each receives an invitation.")]
    async fn add_event_attendees(
        &self,
        Parameters(params): Parameters<AddEventAttendeesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let outcome = self
            .client
            .add_event_attendees(&params.calendar_id, &params.event_id, &params.attendee_open_ids)
            .await
            .map_err(Into::into);
        respond(ToolName::AddEventAttendees, outcome)
    }

    #[tool(description = "List events in a Feishu calendar.")]
    async fn list_calendar_events(
        &self,
        Parameters(params): Parameters<ListCalendarEventsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(ToolName::ListCalendarEvents, self.list_events(params).await)
    }

    #[tool(description = "Create a Feishu task. Assign it afterwards with assign_task.")]
    async fn create_task(
        &self,
        Parameters(params): Parameters<CreateTaskParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(ToolName::CreateTask, self.new_task(params).await)
    }

    #[tool(description = "Assign a Feishu task to one or more members.")]
    async fn assign_task(
        &self,
        Parameters(params): Parameters<AssignTaskParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let outcome = self
            .client
            .assign_task(&params.task_guid, &params.assignee_open_ids)
            .await
            .map_err(Into::into);
        respond(ToolName::AssignTask, outcome)
    }

    #[tool(description = "Add a task to a task list.")]
    async fn add_task_to_list(
        &self,
        Parameters(params): Parameters<AddTaskToListParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let outcome = self
            .client
            .add_task_to_list(&params.task_guid, &params.tasklist_guid)
            .await
            .map_err(Into::into);
        respond(ToolName::AddTaskToList, outcome)
    }

    #[tool(description = "List Feishu tasks, optionally by task list, assignee or completion.")]
    async fn list_tasks(
        &self,
        Parameters(params): Parameters<ListTasksParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let filter = TaskFilter {
            tasklist_guid: non_blank(params.tasklist_guid),
            assignee_open_id: non_blank(params.assignee_open_id),
            completed: params.completed,
        };
        let outcome = self.client.list_tasks(&filter).await.map(Value::Array).map_err(Into::into);
        respond(ToolName::ListTasks, outcome)
    }

    #[tool(
        description = "Create a folder in Feishu Drive. An empty folder_token creates it in the root directory."
    )]
    async fn create_folder(
        &self,
        Parameters(params): Parameters<CreateFolderParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let outcome =
            self.client.create_folder(&params.name, &params.folder_token).await.map_err(Into::into);
        respond(ToolName::CreateFolder, outcome)
    }

    #[tool(description = "Create a new document in Feishu Drive.")]
    async fn create_document(
        &self,
        Parameters(params): Parameters<CreateDocumentParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let outcome = self
            .client
            .create_document(&params.title, params.folder_token.as_deref())
            .await
            .map_err(Into::into);
        respond(ToolName::CreateDocument, outcome)
    }

    #[tool(
        description = "Write Markdown into a Feishu document: headings, paragraphs, lists, links, code blocks, bold, dividers."
    )]
    async fn write_document_markdown(
        &self,
        Parameters(params): Parameters<WriteDocumentMarkdownParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(ToolName::WriteDocumentMarkdown, self.write(params).await)
    }

    #[tool(
        description = "Upload a local file (at most 20 MiB) to Feishu Drive and return its file_token."
    )]
    async fn upload_file(
        &self,
        Parameters(params): Parameters<UploadFileParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let outcome = self
            .client
            .upload_file(
                Path::new(&params.file_path),
                params.file_name.as_deref(),
                params.parent_token.as_deref(),
            )
            .await
            .map_err(Into::into);
        respond(ToolName::UploadFile, outcome)
    }

    #[tool(
        description = "Upload a local file, open it to the whole organization and return a share URL in one step."
    )]
    async fn upload_file_and_share(
        &self,
        Parameters(params): Parameters<UploadFileParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let outcome = self
            .client
            .upload_and_share(
                Path::new(&params.file_path),
                params.file_name.as_deref(),
                params.parent_token.as_deref(),
            )
            .await
            .map_err(Into::into);
        respond(ToolName::UploadFileAndShare, outcome)
    }

    #[tool(description = "Append a downloadable file block to the end of a Feishu document.")]
    async fn insert_file_block(
        &self,
        Parameters(params): Parameters<InsertFileBlockParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let outcome = self
            .client
            .insert_file_block(&params.document_id, &params.file_token, &params.file_name)
            .await
            .map_err(Into::into);
        respond(ToolName::InsertFileBlock, outcome)
    }

    #[tool(
        description = "Grant view/edit/full_access on a document to users (open_id) and groups (chat_id)."
    )]
    async fn set_doc_permission(
        &self,
        Parameters(params): Parameters<SetDocPermissionParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(ToolName::SetDocPermission, self.grant_members(params).await)
    }

    #[tool(description = "Set the link-sharing access level of a Feishu document.")]
    async fn set_doc_public_access(
        &self,
        Parameters(params): Parameters<SetDocPublicAccessParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(ToolName::SetDocPublicAccess, self.public_access(params).await)
    }

    #[tool(description = "Get the share link of a Feishu document.")]
    async fn get_share_link(
        &self,
        Parameters(params): Parameters<GetShareLinkParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let url = self.client.share_link(&params.file_token, &params.file_type).await;
        respond(ToolName::GetShareLink, Ok(Value::String(url)))
    }

    #[tool(description = "Handle a document permission request by granting the requester access.")]
    async fn grant_permission_request(
        &self,
        Parameters(params): Parameters<GrantPermissionRequestParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(ToolName::GrantPermissionRequest, self.grant_request(params).await)
    }
}

impl FeishuMcpServer {
    /// Names of the routed tools, in router order.
    pub fn list_tool_names(&self) -> Vec<String> {
        self.tool_router.list_all().into_iter().map(|tool| tool.name.to_string()).collect()
    }

    async fn send(&self, params: SendMessageParams) -> McpResult<Value> {
        let id_type = params
            .receive_id_type
            .parse()
            .map_err(|message| McpError::invalid("receive_id_type", message))?;
        let target = MessageTarget { id_type, id: params.receive_id };
        let message =
            OutgoingMessage { msg_type: message_type(&params.msg_type)?, content: params.content };
        Ok(self.client.post_message(&target, &message).await?)
    }

    async fn send_card(&self, params: SendCardMessageParams) -> McpResult<Value> {
        let id_type = params
            .receive_id_type
            .parse()
            .map_err(|message| McpError::invalid("receive_id_type", message))?;
        let target = MessageTarget { id_type, id: params.receive_id };
        Ok(self.client.send_card_message(&target, &params.card).await?)
    }

    async fn create_event(&self, params: CreateCalendarEventParams) -> McpResult<Value> {
        let draft = CalendarEventDraft {
            start: seconds("start_time", &params.start_time)?,
            end: seconds("end_time", &params.end_time)?,
            summary: params.summary,
            description: params.description,
            online: params.is_online,
        };
        if draft.end < draft.start {
            return Err(McpError::invalid("end_time", "end_time is before start_time"));
        }
        Ok(self.client.create_calendar_event(&params.calendar_id, &draft).await?)
    }

    async fn list_events(&self, params: ListCalendarEventsParams) -> McpResult<Value> {
        let start = optional_seconds("start_time", params.start_time.as_deref())?;
        let end = optional_seconds("end_time", params.end_time.as_deref())?;
        let events = self.client.list_calendar_events(&params.calendar_id, start, end).await?;
        Ok(Value::Array(events))
    }

    async fn new_task(&self, params: CreateTaskParams) -> McpResult<Value> {
        let draft = TaskDraft {
            start: millis("start_time", params.start_time.as_deref())?,
            due: millis("due_time", params.due_time.as_deref())?,
            title: params.title,
            description: params.description,
        };
        Ok(self.client.create_task(&draft).await?)
    }

    async fn reply(&self, params: ReplyMessageParams) -> McpResult<Value> {
        let message =
            OutgoingMessage { msg_type: message_type(&params.msg_type)?, content: params.content };
        Ok(self.client.reply_message(&params.message_id, &message).await?)
    }

    async fn write(&self, params: WriteDocumentMarkdownParams) -> McpResult<Value> {
        let result = write_markdown(
            self.client.as_ref(),
            &params.document_id,
            &params.markdown_content,
            &self.policy,
        )
        .await?;
        if result.is_empty() {
            return Ok(json!({}));
        }

        let mut body = Map::new();
        body.insert("blocks_created".to_string(), json!(result.blocks_written));
        if let Value::Object(data) = result.last_response {
            body.extend(data);
        }
        Ok(Value::Object(body))
    }

    async fn grant_members(&self, params: SetDocPermissionParams) -> McpResult<Value> {
        let level = permission_level(&params.perm_type)?;
        let members = params
            .member_open_ids
            .into_iter()
            .map(PermissionMember::User)
            .chain(params.chat_ids.into_iter().map(PermissionMember::Chat));

        let mut granted = Vec::new();
        for member in members {
            let data = self
                .client
                .add_permission_member(&params.file_token, &params.file_type, &member, level)
                .await?;
            granted.push(data);
        }
        Ok(Value::Array(granted))
    }

    async fn public_access(&self, params: SetDocPublicAccessParams) -> McpResult<Value> {
        let access: PublicAccess = params
            .access_level
            .parse()
            .map_err(|message| McpError::invalid("access_level", message))?;
        Ok(self.client.set_public_access(&params.file_token, &params.file_type, access).await?)
    }

    async fn grant_request(&self, params: GrantPermissionRequestParams) -> McpResult<Value> {
        let level = permission_level(&params.perm_type)?;
        let member = PermissionMember::User(params.user_open_id);
        Ok(self
            .client
            .add_permission_member(&params.file_token, &params.file_type, &member, level)
            .await?)
    }
}

#[tool_handler]
impl ServerHandler for FeishuMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Feishu Bridge".to_string()),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Feishu/Lark tools: send messages and cards, look up chat members, manage \
                 group calendars and tasks, create documents and write markdown into them, \
                 upload files, and manage document permissions and share links."
                    .to_string(),
            ),
        }
    }
}
