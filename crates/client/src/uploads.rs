//! Single-request drive uploads.
//!
//! Files above [`SIMPLE_UPLOAD_LIMIT`] are refused; the prepare/part/finish
//! chunked protocol is not implemented.

use std::path::Path;

use feishu_core::errors::PlatformError;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tracing::info;

use crate::docs::PublicAccess;
use crate::http::{data_of, transport, FeishuClient};

const UPLOAD_PATH: &str = "/open-apis/drive/v1/files/upload_all";
/// Largest file the platform accepts in one `upload_all` request.
pub const SIMPLE_UPLOAD_LIMIT: u64 = 20 * 1024 * 1024;
const PARENT_TYPE: &str = "explorer";

fn local_file(path: &Path, message: impl Into<String>) -> PlatformError {
    PlatformError::LocalFile { path: path.display().to_string(), message: message.into() }
}

/// `file_name` when given, else the final path component.
pub fn display_name(path: &Path, file_name: Option<&str>) -> Result<String, PlatformError> {
    if let Some(name) = file_name.map(str::trim).filter(|name| !name.is_empty()) {
        return Ok(name.to_string());
    }
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| local_file(path, "path has no file name"))
}

impl FeishuClient {
    /// Returns the upload `data` object, which carries `file_token`. Without a
    /// `parent_token` the file lands in the app's root folder.
    pub async fn upload_file(
        &self,
        path: &Path,
        file_name: Option<&str>,
        parent_token: Option<&str>,
    ) -> Result<Value, PlatformError> {
        let name = display_name(path, file_name)?;
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|error| local_file(path, format!("cannot stat: {error}")))?;
        if !metadata.is_file() {
            return Err(local_file(path, "not a regular file"));
        }
        let size = metadata.len();
        if size > SIMPLE_UPLOAD_LIMIT {
            return Err(local_file(
                path,
                format!("{size} bytes exceeds the {SIMPLE_UPLOAD_LIMIT} byte single-request limit"),
            ));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|error| local_file(path, format!("cannot read: {error}")))?;
        let mime = mime_guess::from_path(&name).first_or_octet_stream();
        let part = Part::bytes(bytes)
            .file_name(name.clone())
            .mime_str(mime.essence_str())
            .map_err(|error| transport(UPLOAD_PATH, &error))?;

        let mut form = Form::new()
            .text("file_name", name.clone())
            .text("parent_type", PARENT_TYPE)
            .text("size", size.to_string());
        if let Some(parent_token) = parent_token.filter(|token| !token.is_empty()) {
            form = form.text("parent_node", parent_token.to_string());
        }
        form = form.part("file", part);

        let data = data_of(self.post_form(UPLOAD_PATH, form).await?);
        if data.get("file_token").and_then(Value::as_str).is_none() {
            return Err(PlatformError::Decode {
                path: UPLOAD_PATH.to_string(),
                message: "response data has no `file_token`".to_string(),
            });
        }
        info!(file_name = %name, size, file_token = ?data.get("file_token"), "file uploaded");
        Ok(data)
    }

    /// Uploads, opens the file to the whole tenant and returns
    /// `{"file_token", "file_name", "share_url"}`.
    pub async fn upload_and_share(
        &self,
        path: &Path,
        file_name: Option<&str>,
        parent_token: Option<&str>,
    ) -> Result<Value, PlatformError> {
        let name = display_name(path, file_name)?;
        let uploaded = self.upload_file(path, Some(&name), parent_token).await?;
        let file_token = uploaded.get("file_token").and_then(Value::as_str).unwrap_or_default();

        self.set_public_access(file_token, "file", PublicAccess::TenantReadable).await?;
        let share_url = self.share_link(file_token, "file").await;

        info!(file_name = %name, file_token, share_url = %share_url, "file uploaded and shared");
        Ok(json!({ "file_token": file_token, "file_name": name, "share_url": share_url }))
    }
}
