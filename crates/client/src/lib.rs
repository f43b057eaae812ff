//! HTTP implementation of the platform collaborator traits.
//!
//! [`FeishuClient`] carries an injected [`AccessTokenSource`] and decodes the
//! platform's `{"code", "msg", "data"}` envelope for every call.
//!
//! [`AccessTokenSource`]: feishu_core::platform::AccessTokenSource

pub mod calendar;
pub mod docs;
pub mod http;
pub mod messages;
pub mod tasks;
pub mod timestamps;
pub mod token;
pub mod uploads;
pub mod users;

pub use calendar::CalendarEventDraft;
pub use docs::{fallback_share_url, PublicAccess};
pub use http::{decode_envelope, FeishuClient};
pub use tasks::{TaskDraft, TaskFilter};
pub use timestamps::{unix_millis, unix_seconds};
pub use token::{StaticToken, TenantTokenCache};
pub use uploads::SIMPLE_UPLOAD_LIMIT;
