use std::sync::Arc;

use domain::{ConversationId, DomainError, MessageId, UserId};

use crate::{
    connection::Session,
    error::ApplicationError,
    events::{MessageReadPayload, ServerEvent, TypingPayload},
    presence::PresenceRegistry,
    repository::{ConversationRepository, MessageRepository},
    rooms::RoomRegistry,
};

pub struct ReceiptServiceDependencies {
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub presence: Arc<PresenceRegistry>,
    pub rooms: Arc<RoomRegistry>,
}

/// 已读回执与输入状态
pub struct ReceiptService {
    deps: ReceiptServiceDependencies,
}

impl ReceiptService {
    pub fn new(deps: ReceiptServiceDependencies) -> Self {
        Self { deps }
    }

    /// 批量标记已读并通知在线的发送者，返回实际被标记的消息
    pub async fn mark_as_read(
        &self,
        session: &Session,
        message_ids: &[MessageId],
    ) -> Result<Vec<MessageId>, ApplicationError> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let reader = session.user_id();
        let flipped = self
            .deps
            .message_repository
            .mark_read_by_ids(message_ids, reader)
            .await?;

        for message in &flipped {
            let notified = self
                .deps
                .presence
                .send(
                    message.sender_id,
                    ServerEvent::MessageRead(MessageReadPayload {
                        message_id: message.id,
                        read_by: reader,
                        conversation_id: message.conversation_id,
                    }),
                )
                .await;
            if !notified {
                tracing::debug!(message_id = %message.id, sender_id = %message.sender_id, "发送者不在线，跳过已读通知");
            }
        }

        tracing::info!(
            user_id = %reader,
            requested = message_ids.len(),
            marked = flipped.len(),
            "消息已标记为已读"
        );
        Ok(flipped.into_iter().map(|m| m.id).collect())
    }

    /// HTTP 拉取路径：整段会话标记已读，不推送回执
    pub async fn mark_conversation_read(
        &self,
        reader: UserId,
        conversation_id: ConversationId,
    ) -> Result<u64, ApplicationError> {
        self.deps
            .conversation_repository
            .find_for_participant(conversation_id, reader)
            .await?
            .ok_or(DomainError::ConversationNotFound)?;

        let count = self
            .deps
            .message_repository
            .mark_conversation_read(conversation_id, reader)
            .await?;
        Ok(count)
    }

    /// 转发输入状态给房间内的其他连接，返回送达数量。
    /// 未加入该房间的连接发来的事件直接丢弃
    pub async fn relay_typing(
        &self,
        session: &Session,
        conversation_id: ConversationId,
        started: bool,
    ) -> usize {
        if !self
            .deps
            .rooms
            .is_joined(session.connection_id(), conversation_id)
            .await
        {
            tracing::debug!(
                user_id = %session.user_id(),
                conversation_id = %conversation_id,
                "连接未加入该房间，丢弃输入状态"
            );
            return 0;
        }

        let payload = TypingPayload {
            user_id: session.user_id(),
            user_name: session.user.name.clone(),
            conversation_id,
        };
        let event = if started {
            ServerEvent::UserTypingStart(payload)
        } else {
            ServerEvent::UserTypingStop(payload)
        };

        self.deps
            .rooms
            .broadcast_except(conversation_id, session.connection_id(), &event)
            .await
    }
}
