//! 私信发送流水线
//!
//! `接收 -> 授权 -> 持久化 -> 投递 -> 会话摘要更新（尽力而为）`

use std::sync::Arc;

use config::SendPolicy;
use domain::{DomainError, Message, MessageContent, MessageId};

use crate::{
    clock::Clock,
    connection::Session,
    error::ApplicationError,
    events::{MessageView, SendMessagePayload, ServerEvent},
    repository::{ConversationRepository, MessageRepository, UserRepository},
    rooms::RoomRegistry,
    tasks::spawn_detached,
};

pub struct ChatServiceDependencies {
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub rooms: Arc<RoomRegistry>,
    pub clock: Arc<dyn Clock>,
    pub send_policy: SendPolicy,
    pub max_message_length: usize,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn send_message(
        &self,
        session: &Session,
        payload: SendMessagePayload,
    ) -> Result<MessageView, ApplicationError> {
        let conversation_id = payload.conversation_id;
        let sender_id = session.user_id();
        let content = MessageContent::with_limit(payload.content, self.deps.max_message_length)?;
        let message = Message::new(
            MessageId::random(),
            conversation_id,
            sender_id,
            content,
            self.deps.clock.now(),
        );

        let stored = match self.deps.send_policy {
            SendPolicy::AuthorizeFirst => {
                self.authorize(session, conversation_id).await?;
                self.deps.message_repository.create(message).await?
            }
            SendPolicy::Concurrent => {
                let message_id = message.id;
                let (authorized, inserted) = tokio::join!(
                    self.authorize(session, conversation_id),
                    self.deps.message_repository.create(message)
                );
                if let Err(err) = authorized {
                    if inserted.is_ok() {
                        self.compensate(message_id);
                    }
                    return Err(err);
                }
                inserted?
            }
        };

        let view = MessageView::new(&stored, &session.user);
        let delivered = self
            .deps
            .rooms
            .broadcast(conversation_id, &ServerEvent::NewMessage(view.clone()))
            .await;

        tracing::info!(
            message_id = %stored.id,
            conversation_id = %conversation_id,
            sender_id = %sender_id,
            delivered,
            "消息已投递"
        );

        let conversations = Arc::clone(&self.deps.conversation_repository);
        let summary = stored.content.as_str().to_owned();
        let created_at = stored.created_at;
        spawn_detached("conversation_summary", async move {
            conversations
                .update_summary(conversation_id, &summary, created_at)
                .await?;
            Ok(())
        });

        let users = Arc::clone(&self.deps.user_repository);
        let now = self.deps.clock.now();
        spawn_detached("touch_last_seen", async move {
            users.touch_last_seen(sender_id, now).await?;
            Ok(())
        });

        Ok(view)
    }

    async fn authorize(
        &self,
        session: &Session,
        conversation_id: domain::ConversationId,
    ) -> Result<(), ApplicationError> {
        self.deps
            .conversation_repository
            .find_for_participant(conversation_id, session.user_id())
            .await?
            .ok_or(DomainError::ConversationNotFound)?;
        Ok(())
    }

    /// 授权失败但消息已写入时，后台删除这条孤立消息
    fn compensate(&self, message_id: MessageId) {
        tracing::warn!(message_id = %message_id, "未授权的消息已写入，执行补偿删除");
        let messages = Arc::clone(&self.deps.message_repository);
        spawn_detached("compensating_delete", async move {
            messages.delete(message_id).await?;
            Ok(())
        });
    }
}
