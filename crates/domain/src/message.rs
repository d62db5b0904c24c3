use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ConversationId, MessageId, Timestamp, UserId};

pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4000;

/// 消息正文内容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageContent(String);

impl MessageContent {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        Self::with_limit(value, DEFAULT_MAX_MESSAGE_LENGTH)
    }

    /// 去掉首尾空白后不能为空，按字符计数不能超过 `max_chars`
    pub fn with_limit(value: impl Into<String>, max_chars: usize) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_argument(
                "content",
                "Message content is required",
            ));
        }
        if trimmed.chars().count() > max_chars {
            return Err(DomainError::invalid_argument(
                "content",
                format!("Message is too long (max {max_chars} characters)"),
            ));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// 从存储恢复，不再校验
    pub fn restore(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: MessageContent,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender_id,
            content,
            is_read: false,
            created_at,
        }
    }

    /// 标记已读。发送者本人不能标记自己的消息，已读消息保持不变。
    /// 返回是否发生了状态变化
    pub fn mark_read(&mut self, reader: UserId) -> bool {
        if reader == self.sender_id || self.is_read {
            return false;
        }
        self.is_read = true;
        true
    }
}
