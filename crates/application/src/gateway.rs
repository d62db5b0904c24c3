//! 实时事件分发
//!
//! 每个入站事件在独立任务中处理，一个事件失败不影响同一连接上的其他事件，
//! 也不影响其他连接。

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    connection::Session,
    error::ApplicationError,
    events::{ClientEvent, ServerEvent},
    services::{ChatService, MembershipService, ReceiptService},
};

const INVALID_EVENT: &str = "Invalid event payload";
const JOIN_FAILED: &str = "Failed to join chat";
const SEND_FAILED: &str = "Failed to send message";
const MARK_READ_FAILED: &str = "Failed to mark messages as read";

pub struct RealtimeGateway {
    membership: Arc<MembershipService>,
    chat: Arc<ChatService>,
    receipts: Arc<ReceiptService>,
}

impl RealtimeGateway {
    pub fn new(
        membership: Arc<MembershipService>,
        chat: Arc<ChatService>,
        receipts: Arc<ReceiptService>,
    ) -> Self {
        Self {
            membership,
            chat,
            receipts,
        }
    }

    /// 解析文本帧并分发。无法解析的帧回复 `error`，连接保持可用
    pub fn handle_text(self: &Arc<Self>, session: &Session, text: &str) -> Option<JoinHandle<()>> {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => Some(self.dispatch(session.clone(), event)),
            Err(err) => {
                tracing::debug!(user_id = %session.user_id(), error = %err, "无法解析的实时事件");
                session.handle.send(ServerEvent::error(INVALID_EVENT));
                None
            }
        }
    }

    pub fn dispatch(self: &Arc<Self>, session: Session, event: ClientEvent) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move { gateway.handle(&session, event).await })
    }

    pub async fn handle(&self, session: &Session, event: ClientEvent) {
        let name = event.name();
        let outcome: Result<(), (ApplicationError, &str)> = match event {
            ClientEvent::JoinChat(payload) => self
                .membership
                .join_room(session, payload.conversation_id)
                .await
                .map_err(|err| (err, JOIN_FAILED)),
            ClientEvent::SendMessage(payload) => self
                .chat
                .send_message(session, payload)
                .await
                .map(|_| ())
                .map_err(|err| (err, SEND_FAILED)),
            ClientEvent::MarkAsRead(payload) => self
                .receipts
                .mark_as_read(session, &payload.message_ids)
                .await
                .map(|_| ())
                .map_err(|err| (err, MARK_READ_FAILED)),
            ClientEvent::TypingStart(payload) => {
                self.receipts
                    .relay_typing(session, payload.conversation_id, true)
                    .await;
                Ok(())
            }
            ClientEvent::TypingStop(payload) => {
                self.receipts
                    .relay_typing(session, payload.conversation_id, false)
                    .await;
                Ok(())
            }
        };

        if let Err((err, fallback)) = outcome {
            match &err {
                ApplicationError::Domain(_) => {
                    tracing::debug!(user_id = %session.user_id(), event = name, error = %err, "事件被拒绝");
                }
                _ => {
                    tracing::error!(user_id = %session.user_id(), event = name, error = %err, "事件处理失败");
                }
            }
            session.handle.send(ServerEvent::error(err.client_message(fallback)));
        }
    }
}
