//! MCP tool names for the Feishu bridge
//!
//! Tools are grouped into categories:
//! - Messaging: sending, replying, cards, chat membership
//! - Calendar: group calendars, events, attendees
//! - Tasks: creating, assigning, filing and listing tasks
//! - Documents: folders, documents, markdown content, uploads, attachments
//! - Permissions: member grants, link sharing, permission requests

use std::fmt;

/// Tool category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolCategory {
    Messaging,
    Calendar,
    Tasks,
    Documents,
    Permissions,
}

impl ToolCategory {
    pub const ALL: [ToolCategory; 5] =
        [Self::Messaging, Self::Calendar, Self::Tasks, Self::Documents, Self::Permissions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Messaging => "messaging",
            Self::Calendar => "calendar",
            Self::Tasks => "tasks",
            Self::Documents => "documents",
            Self::Permissions => "permissions",
        }
    }

    /// Tools in this category, in table order
    pub fn tools(&self) -> impl Iterator<Item = ToolName> + '_ {
        ALL_TOOLS.into_iter().filter(move |tool| tool.category() == *self)
    }
}

/// Every tool the server exposes. Used to label log lines and to check the
/// rmcp router against a closed list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolName {
    SendMessage,
    ReplyMessage,
    SendCardMessage,
    GetChatMembers,
    GetOrCreateGroupCalendar,
    CreateCalendarEvent,
    AddEventAttendees,
    ListCalendarEvents,
    CreateTask,
    AssignTask,
    AddTaskToList,
    ListTasks,
    CreateFolder,
    CreateDocument,
    WriteDocumentMarkdown,
    UploadFile,
    UploadFileAndShare,
    InsertFileBlock,
    SetDocPermission,
    SetDocPublicAccess,
    GetShareLink,
    GrantPermissionRequest,
}

/// Lookup table, in listing order
pub const ALL_TOOLS: [ToolName; 22] = [
    ToolName::SendMessage,
    ToolName::ReplyMessage,
    ToolName::SendCardMessage,
    ToolName::GetChatMembers,
    ToolName::GetOrCreateGroupCalendar,
    ToolName::CreateCalendarEvent,
    ToolName::AddEventAttendees,
    ToolName::ListCalendarEvents,
    ToolName::CreateTask,
    ToolName::AssignTask,
    ToolName::AddTaskToList,
    ToolName::ListTasks,
    ToolName::CreateFolder,
    ToolName::CreateDocument,
    ToolName::WriteDocumentMarkdown,
    ToolName::UploadFile,
    ToolName::UploadFileAndShare,
    ToolName::InsertFileBlock,
    ToolName::SetDocPermission,
    ToolName::SetDocPublicAccess,
    ToolName::GetShareLink,
    ToolName::GrantPermissionRequest,
];

/// Total number of tools
pub const TOTAL_TOOLS: usize = ALL_TOOLS.len();

impl ToolName {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SendMessage => "send_message",
            Self::ReplyMessage => "reply_message",
            Self::SendCardMessage => "send_card_message",
            Self::GetChatMembers => "get_chat_members",
            Self::GetOrCreateGroupCalendar => "get_or_create_group_calendar",
            Self::CreateCalendarEvent => "create_calendar_event",
            Self::AddEventAttendees => "add_event_attendees",
            Self::ListCalendarEvents => "list_calendar_events",
            Self::CreateTask => "create_task",
            Self::AssignTask => "assign_task",
            Self::AddTaskToList => "add_task_to_list",
            Self::ListTasks => "list_tasks",
            Self::CreateFolder => "create_folder",
            Self::CreateDocument => "create_document",
            Self::WriteDocumentMarkdown => "write_document_markdown",
            Self::UploadFile => "upload_file",
            Self::UploadFileAndShare => "upload_file_and_share",
            Self::InsertFileBlock => "insert_file_block",
            Self::SetDocPermission => "set_doc_permission",
            Self::SetDocPublicAccess => "set_doc_public_access",
            Self::GetShareLink => "get_share_link",
            Self::GrantPermissionRequest => "grant_permission_request",
        }
    }

    pub const fn category(&self) -> ToolCategory {
        match self {
            Self::SendMessage | Self::ReplyMessage | Self::SendCardMessage | Self::GetChatMembers => {
                ToolCategory::Messaging
            }
            Self::GetOrCreateGroupCalendar
            | Self::CreateCalendarEvent
            | Self::AddEventAttendees
            | Self::ListCalendarEvents => ToolCategory::Calendar,
            Self::CreateTask | Self::AssignTask | Self::AddTaskToList | Self::ListTasks => {
                ToolCategory::Tasks
            }
            Self::CreateFolder
            | Self::CreateDocument
            | Self::WriteDocumentMarkdown
            | Self::UploadFile
            | Self::UploadFileAndShare
            | Self::InsertFileBlock => ToolCategory::Documents,
            Self::SetDocPermission
            | Self::SetDocPublicAccess
            | Self::GetShareLink
            | Self::GrantPermissionRequest => ToolCategory::Permissions,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
