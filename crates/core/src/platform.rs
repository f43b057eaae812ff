//! Narrow interfaces to the platform's REST API.
//!
//! The document pipeline and the webhook handlers only ever talk to the
//! platform through these traits; `feishu-client` provides the HTTP
//! implementation and tests provide in-memory fakes.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::docx::Block;
use crate::errors::PlatformError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveIdType {
    ChatId,
    OpenId,
    UserId,
    UnionId,
    Email,
}

impl ReceiveIdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatId => "chat_id",
            Self::OpenId => "open_id",
            Self::UserId => "user_id",
            Self::UnionId => "union_id",
            Self::Email => "email",
        }
    }
}

impl FromStr for ReceiveIdType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "chat_id" => Ok(Self::ChatId),
            "open_id" => Ok(Self::OpenId),
            "user_id" => Ok(Self::UserId),
            "union_id" => Ok(Self::UnionId),
            "email" => Ok(Self::Email),
            other => Err(format!(
                "unsupported receive_id_type `{other}` (expected chat_id|open_id|user_id|union_id|email)"
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageTarget {
    pub id_type: ReceiveIdType,
    pub id: String,
}

impl MessageTarget {
    pub fn open_id(id: impl Into<String>) -> Self {
        Self { id_type: ReceiveIdType::OpenId, id: id.into() }
    }

    pub fn chat(id: impl Into<String>) -> Self {
        Self { id_type: ReceiveIdType::ChatId, id: id.into() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Post,
    Interactive,
    Image,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Post => "post",
            Self::Interactive => "interactive",
            Self::Image => "image",
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" | "text" => Ok(Self::Text),
            "post" => Ok(Self::Post),
            "interactive" => Ok(Self::Interactive),
            "image" => Ok(Self::Image),
            other => Err(format!(
                "unsupported msg_type `{other}` (expected text|post|interactive|image)"
            )),
        }
    }
}

/// `content` is the JSON string the messaging API expects, e.g.
/// `{"text":"hello"}` for text messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub msg_type: MessageType,
    pub content: String,
}

impl OutgoingMessage {
    pub fn text(text: &str) -> Self {
        Self { msg_type: MessageType::Text, content: text_content(text, &[]) }
    }

    /// Interactive card. A JSON string is taken as an already serialized card.
    pub fn card(card: &Value) -> Self {
        let content = match card {
            Value::String(serialized) => serialized.clone(),
            other => other.to_string(),
        };
        Self { msg_type: MessageType::Interactive, content }
    }
}

/// Builds text message content, prefixing `<at>` mentions. Pass `"all"` to
/// mention everyone.
pub fn text_content(text: &str, mention_open_ids: &[&str]) -> String {
    let mentions: String =
        mention_open_ids.iter().map(|open_id| format!("<at id=\"{open_id}\"></at> ")).collect();
    json!({ "text": format!("{mentions}{text}") }).to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    View,
    Edit,
    FullAccess,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::FullAccess => "full_access",
        }
    }
}

impl FromStr for PermissionLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" | "view" => Ok(Self::View),
            "edit" => Ok(Self::Edit),
            "full_access" => Ok(Self::FullAccess),
            other => {
                Err(format!("unsupported perm_type `{other}` (expected view|edit|full_access)"))
            }
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who receives a document permission: a user (`openid`) or a group chat
/// (`openchat`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PermissionMember {
    User(String),
    Chat(String),
}

impl PermissionMember {
    pub fn member_type(&self) -> &'static str {
        match self {
            Self::User(_) => "openid",
            Self::Chat(_) => "openchat",
        }
    }

    pub fn member_id(&self) -> &str {
        match self {
            Self::User(id) | Self::Chat(id) => id,
        }
    }
}

#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<SecretString, PlatformError>;
}

#[async_trait]
pub trait DocumentWriter: Send + Sync {
    /// Appends `children` at the end of the document. Not idempotent: a
    /// resend after a timeout may duplicate content.
    async fn append_children(
        &self,
        document_id: &str,
        children: &[Block],
    ) -> Result<Value, PlatformError>;
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Returns the platform `message_id`.
    async fn send_message(
        &self,
        target: &MessageTarget,
        message: &OutgoingMessage,
    ) -> Result<String, PlatformError>;
}

#[async_trait]
pub trait PermissionGranter: Send + Sync {
    async fn grant_permission(
        &self,
        file_token: &str,
        file_type: &str,
        member: &PermissionMember,
        level: PermissionLevel,
    ) -> Result<Value, PlatformError>;
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{text_content, MessageType, OutgoingMessage, PermissionLevel, ReceiveIdType};

    #[test]
    fn text_content_prefixes_mentions() {
        let content = text_content("standup in 5", &["ou_1", "all"]);
        let parsed: Value = serde_json::from_str(&content).expect("valid json");

        assert_eq!(parsed["text"], "<at id=\"ou_1\"></at> <at id=\"all\"></at> standup in 5");
    }

    #[test]
    fn plain_text_message_has_no_mentions() {
        let message = OutgoingMessage::text("hi");
        assert_eq!(message.msg_type, MessageType::Text);
        assert_eq!(message.content, r#"{"text":"hi"}"#);
    }

    #[test]
    fn cards_are_serialized_once() {
        let card = serde_json::json!({ "header": { "title": { "content": "Deploy" } } });
        let message = OutgoingMessage::card(&card);
        assert_eq!(message.msg_type, MessageType::Interactive);
        assert_eq!(message.content, card.to_string());

        let raw = OutgoingMessage::card(&Value::String(r#"{"elements":[]}"#.to_string()));
        assert_eq!(raw.content, r#"{"elements":[]}"#);
    }

    #[test]
    fn wire_names_parse_back() {
        assert_eq!("open_id".parse::<ReceiveIdType>(), Ok(ReceiveIdType::OpenId));
        assert_eq!("".parse::<PermissionLevel>(), Ok(PermissionLevel::View));
        assert_eq!("full_access".parse::<PermissionLevel>(), Ok(PermissionLevel::FullAccess));
        assert!("owner".parse::<PermissionLevel>().is_err());
        assert!("sms".parse::<ReceiveIdType>().is_err());
    }
}
