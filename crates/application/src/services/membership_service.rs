use std::sync::Arc;

use domain::{Conversation, ConversationId, DomainError};

use crate::{
    connection::Session,
    error::ApplicationError,
    events::{ConversationRef, ServerEvent},
    repository::ConversationRepository,
    rooms::RoomRegistry,
};

pub struct MembershipServiceDependencies {
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub rooms: Arc<RoomRegistry>,
}

/// 连接与会话房间的绑定
pub struct MembershipService {
    deps: MembershipServiceDependencies,
}

impl MembershipService {
    pub fn new(deps: MembershipServiceDependencies) -> Self {
        Self { deps }
    }

    /// 连接建立后加入用户参与的全部会话房间，返回这些会话
    pub async fn join_user_rooms(
        &self,
        session: &Session,
    ) -> Result<Vec<Conversation>, ApplicationError> {
        let conversations = self
            .deps
            .conversation_repository
            .list_for_participant(session.user_id())
            .await?;

        let joined = self
            .deps
            .rooms
            .join_many(conversations.iter().map(|c| c.id), &session.handle)
            .await;
        if self.retract_if_disconnected(session).await {
            return Ok(Vec::new());
        }

        tracing::info!(
            user_id = %session.user_id(),
            connection_id = %session.connection_id(),
            rooms = joined,
            "加入会话房间"
        );
        Ok(conversations)
    }

    /// 按需加入单个房间，只有参与者可以加入
    pub async fn join_room(
        &self,
        session: &Session,
        conversation_id: ConversationId,
    ) -> Result<(), ApplicationError> {
        self.deps
            .conversation_repository
            .find_for_participant(conversation_id, session.user_id())
            .await?
            .ok_or(DomainError::ConversationNotFound)?;

        self.deps.rooms.join(conversation_id, &session.handle).await;
        if self.retract_if_disconnected(session).await {
            return Ok(());
        }
        session
            .handle
            .send(ServerEvent::JoinedChat(ConversationRef { conversation_id }));

        tracing::debug!(
            user_id = %session.user_id(),
            conversation_id = %conversation_id,
            "加入会话房间"
        );
        Ok(())
    }

    /// 加入房间与断开清理可能并发：先加入再检查断开标记。
    /// 断开清理先置标记再 `leave_all`，因此两者之一一定会移除这条成员记录
    async fn retract_if_disconnected(&self, session: &Session) -> bool {
        if !session.is_disconnected() {
            return false;
        }
        let left = self.deps.rooms.leave_all(session.connection_id()).await;
        tracing::debug!(
            user_id = %session.user_id(),
            connection_id = %session.connection_id(),
            rooms = left.len(),
            "连接已断开，撤销房间加入"
        );
        true
    }
}
