use domain::{Conversation, ConversationId, Timestamp, UserId, UserProfile};
use serde::{Deserialize, Serialize};

use crate::events::MessageView;

/// 每页消息数的默认值和上限
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// 会话列表项：对方资料、未读数和在线状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub participants: Vec<UserId>,
    pub other_user: Option<UserProfile>,
    pub last_message: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<Timestamp>,
    pub unread_count: u64,
    pub is_online: bool,
}

impl ConversationSummary {
    pub fn new(
        conversation: &Conversation,
        other_user: Option<UserProfile>,
        unread_count: u64,
        is_online: bool,
    ) -> Self {
        Self {
            id: conversation.id,
            participants: conversation.participants().to_vec(),
            other_user,
            last_message: conversation.last_message.clone(),
            last_message_at: conversation.last_message_at,
            unread_count,
            is_online,
        }
    }
}

/// 打开会话时返回会话本身和最近一页消息
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<MessageView>,
}

/// 历史消息分页，`page` 从 1 开始
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }.normalized()
    }

    /// 页码至少为 1，每页条数限制在 1..=MAX_PAGE_SIZE
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

/// 一页历史消息，从旧到新
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagePage {
    pub messages: Vec<MessageView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateThreadRequest {
    pub board: String,
    pub subject: Option<String>,
    pub content: String,
    pub author_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReplyRequest {
    pub content: String,
    pub author_name: Option<String>,
    /// 显式引用的帖子：主题本身或同一主题下的回复
    pub reply_to_id: Option<uuid::Uuid>,
}
