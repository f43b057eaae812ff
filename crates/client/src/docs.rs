//! Drive and docx calls: folders, documents, blocks, permissions, sharing.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use feishu_core::docx::{encode_children, Block};
use feishu_core::errors::PlatformError;
use feishu_core::platform::{DocumentWriter, PermissionGranter, PermissionLevel, PermissionMember};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::http::{data_of, FeishuClient};

/// `block_type` of an attachment block.
pub const FILE_BLOCK_TYPE: u8 = 23;
/// Appending at `-1` places children after the last existing block.
const APPEND_INDEX: i64 = -1;

/// Link-sharing level of a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublicAccess {
    Off,
    TenantReadable,
    TenantEditable,
    AnyoneReadable,
    AnyoneEditable,
}

impl PublicAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::TenantReadable => "tenant_readable",
            Self::TenantEditable => "tenant_editable",
            Self::AnyoneReadable => "anyone_readable",
            Self::AnyoneEditable => "anyone_editable",
        }
    }

    /// Only `anyone_*` levels open the document to users outside the tenant.
    pub fn external_access(&self) -> &'static str {
        match self {
            Self::AnyoneReadable | Self::AnyoneEditable => "open",
            Self::Off | Self::TenantReadable | Self::TenantEditable => "closed",
        }
    }
}

impl FromStr for PublicAccess {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "off" => Ok(Self::Off),
            "" | "tenant_readable" => Ok(Self::TenantReadable),
            "tenant_editable" => Ok(Self::TenantEditable),
            "anyone_readable" => Ok(Self::AnyoneReadable),
            "anyone_editable" => Ok(Self::AnyoneEditable),
            other => Err(format!(
                "unsupported access_level `{other}` (expected off|tenant_readable|tenant_editable|anyone_readable|anyone_editable)"
            )),
        }
    }
}

impl fmt::Display for PublicAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Share URL built from the token when the platform does not return one.
pub fn fallback_share_url(file_token: &str, file_type: &str) -> String {
    let segment = match file_type {
        "doc" => "docs",
        "sheet" => "sheets",
        "bitable" => "base",
        "file" => "file",
        _ => "docx",
    };
    format!("https://feishu.cn/{segment}/{file_token}")
}

fn children_path(document_id: &str) -> String {
    format!("/open-apis/docx/v1/documents/{document_id}/blocks/{document_id}/children")
}

impl FeishuClient {
    /// An empty `parent_folder_token` creates the folder in the root folder.
    pub async fn create_folder(
        &self,
        name: &str,
        parent_folder_token: &str,
    ) -> Result<Value, PlatformError> {
        let body = json!({ "name": name, "folder_token": parent_folder_token });
        let data = data_of(self.post("/open-apis/drive/v1/files/create_folder", &[], &body).await?);
        info!(folder_name = name, token = ?data.get("token"), "folder created");
        Ok(data)
    }

    /// Returns the `document` object (`document_id`, `revision_id`, `title`).
    pub async fn create_document(
        &self,
        title: &str,
        folder_token: Option<&str>,
    ) -> Result<Value, PlatformError> {
        let mut body = json!({ "title": title });
        if let Some(folder_token) = folder_token.filter(|token| !token.is_empty()) {
            body["folder_token"] = json!(folder_token);
        }

        let data = data_of(self.post("/open-apis/docx/v1/documents", &[], &body).await?);
        let document = data.get("document").cloned().unwrap_or_else(|| json!({}));
        info!(title, document_id = ?document.get("document_id"), "document created");
        Ok(document)
    }

    pub async fn append_block_payloads(
        &self,
        document_id: &str,
        children: Vec<Value>,
    ) -> Result<Value, PlatformError> {
        let body = json!({ "children": children, "index": APPEND_INDEX });
        Ok(data_of(self.post(&children_path(document_id), &[], &body).await?))
    }

    pub async fn insert_file_block(
        &self,
        document_id: &str,
        file_token: &str,
        file_name: &str,
    ) -> Result<Value, PlatformError> {
        let child = json!({
            "block_type": FILE_BLOCK_TYPE,
            "file": { "token": file_token, "name": file_name }
        });
        let data = self.append_block_payloads(document_id, vec![child]).await?;
        info!(document_id, file_name, "file block inserted");
        Ok(data)
    }

    pub async fn add_permission_member(
        &self,
        file_token: &str,
        file_type: &str,
        member: &PermissionMember,
        level: PermissionLevel,
    ) -> Result<Value, PlatformError> {
        let path = format!("/open-apis/drive/v1/permissions/{file_token}/members");
        let body = json!({
            "member_type": member.member_type(),
            "member_id": member.member_id(),
            "perm": level.as_str()
        });
        let data = data_of(self.post(&path, &[("type", file_type)], &body).await?);
        info!(
            file_token,
            member_type = member.member_type(),
            perm = %level,
            "document permission granted"
        );
        Ok(data)
    }

    pub async fn set_public_access(
        &self,
        file_token: &str,
        file_type: &str,
        access: PublicAccess,
    ) -> Result<Value, PlatformError> {
        let path = format!("/open-apis/drive/v1/permissions/{file_token}/public");
        let body = json!({
            "link_share_entity": access.as_str(),
            "external_access_entity": access.external_access()
        });
        let data = data_of(self.patch(&path, &[("type", file_type)], &body).await?);
        info!(file_token, access_level = %access, "document public access updated");
        Ok(data)
    }

    /// Never fails: platform errors and empty URLs fall back to
    /// [`fallback_share_url`].
    pub async fn share_link(&self, file_token: &str, file_type: &str) -> String {
        let path = format!("/open-apis/drive/v1/permissions/{file_token}/public_permission_meta");
        match self.post(&path, &[("type", file_type)], &json!({})).await {
            Ok(envelope) => {
                let url = data_of(envelope)
                    .get("url")
                    .and_then(Value::as_str)
                    .filter(|url| !url.is_empty())
                    .map(str::to_string);
                if let Some(url) = url {
                    return url;
                }
            }
            Err(error) => {
                warn!(file_token, error = %error, "share link lookup failed; constructing link");
            }
        }

        fallback_share_url(file_token, file_type)
    }
}

#[async_trait]
impl DocumentWriter for FeishuClient {
    async fn append_children(
        &self,
        document_id: &str,
        children: &[Block],
    ) -> Result<Value, PlatformError> {
        self.append_block_payloads(document_id, encode_children(children)).await
    }
}

#[async_trait]
impl PermissionGranter for FeishuClient {
    async fn grant_permission(
        &self,
        file_token: &str,
        file_type: &str,
        member: &PermissionMember,
        level: PermissionLevel,
    ) -> Result<Value, PlatformError> {
        self.add_permission_member(file_token, file_type, member, level).await
    }
}
