//! 实时通道的线上格式：`{"event": "<name>", "data": {...}}`，载荷字段为 camelCase。

use domain::{ConversationId, Message, MessageId, Timestamp, UserId, UserProfile};
use serde::{Deserialize, Serialize};

/// 客户端发往服务端的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinChat(ConversationRef),
    SendMessage(SendMessagePayload),
    MarkAsRead(MarkAsReadPayload),
    TypingStart(ConversationRef),
    TypingStop(ConversationRef),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinChat(_) => "join_chat",
            ClientEvent::SendMessage(_) => "send_message",
            ClientEvent::MarkAsRead(_) => "mark_as_read",
            ClientEvent::TypingStart(_) => "typing_start",
            ClientEvent::TypingStop(_) => "typing_stop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRef {
    #[serde(alias = "chatId")]
    pub conversation_id: ConversationId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    #[serde(alias = "chatId")]
    pub conversation_id: ConversationId,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAsReadPayload {
    pub message_ids: Vec<MessageId>,
}

/// 服务端推送给客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    JoinedChat(ConversationRef),
    NewMessage(MessageView),
    MessageRead(MessageReadPayload),
    UserTypingStart(TypingPayload),
    UserTypingStop(TypingPayload),
    UserStatusChange(StatusChangePayload),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::JoinedChat(_) => "joined_chat",
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::MessageRead(_) => "message_read",
            ServerEvent::UserTypingStart(_) => "user_typing_start",
            ServerEvent::UserTypingStop(_) => "user_typing_stop",
            ServerEvent::UserStatusChange(_) => "user_status_change",
            ServerEvent::Error(_) => "error",
        }
    }
}

/// 消息记录加上发送者的展示信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
    pub sender: SenderView,
}

impl MessageView {
    pub fn new(message: &Message, sender: &UserProfile) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content.as_str().to_owned(),
            is_read: message.is_read,
            created_at: message.created_at,
            sender: SenderView::from(sender),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderView {
    pub id: UserId,
    pub name: String,
    pub avatar_url: Option<String>,
}

impl From<&UserProfile> for SenderView {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name.clone(),
            avatar_url: profile.avatar_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadPayload {
    pub message_id: MessageId,
    pub read_by: UserId,
    pub conversation_id: ConversationId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub user_id: UserId,
    pub user_name: String,
    pub conversation_id: ConversationId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangePayload {
    pub user_id: UserId,
    pub is_online: bool,
    pub conversation_id: ConversationId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}
