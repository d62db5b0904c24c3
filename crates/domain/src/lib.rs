//! 社交网络与匿名论坛后端的核心领域模型
//!
//! 包含会话、私信、用户资料、论坛帖子等实体，以及短ID和引用解析规则。

pub mod conversation;
pub mod errors;
pub mod forum;
pub mod message;
pub mod user;
pub mod value_objects;

pub use conversation::Conversation;
pub use errors::{DomainError, RepositoryError};
pub use forum::{extract_quotes, Reply, Thread};
pub use message::{Message, MessageContent, DEFAULT_MAX_MESSAGE_LENGTH};
pub use user::UserProfile;
pub use value_objects::*;
