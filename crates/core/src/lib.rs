pub mod config;
pub mod docx;
pub mod errors;
pub mod platform;

pub use config::{AppConfig, ConfigError, LoadOptions, LogFormat};
pub use docx::{parse, submit_blocks, write_markdown, BatchPolicy, Block, Span, SubmissionResult};
pub use errors::{FailureClass, PlatformError, SubmissionError};
pub use platform::{
    AccessTokenSource, DocumentWriter, MessageSender, MessageTarget, MessageType,
    OutgoingMessage, PermissionGranter, PermissionLevel, PermissionMember, ReceiveIdType,
};
