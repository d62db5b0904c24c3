//! 连接生命周期
//!
//! `连接中 -> 认证中 -> 已认证(已入房) -> 活跃 -> 已断开`

use std::sync::Arc;

use domain::{Conversation, UserId, UserProfile};

use crate::{
    auth::TokenVerifier,
    clock::Clock,
    connection::Session,
    error::ApplicationError,
    events::{ServerEvent, StatusChangePayload},
    presence::PresenceRegistry,
    repository::{ConversationRepository, UserRepository},
    rooms::RoomRegistry,
    services::MembershipService,
    tasks::spawn_detached,
};

pub struct LifecycleServiceDependencies {
    pub token_verifier: Arc<dyn TokenVerifier>,
    pub user_repository: Arc<dyn UserRepository>,
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub presence: Arc<PresenceRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub membership: Arc<MembershipService>,
    pub clock: Arc<dyn Clock>,
}

pub struct LifecycleService {
    deps: LifecycleServiceDependencies,
}

impl LifecycleService {
    pub fn new(deps: LifecycleServiceDependencies) -> Self {
        Self { deps }
    }

    /// 握手认证：令牌有效且用户仍然存在
    pub async fn authenticate(&self, token: &str) -> Result<UserProfile, ApplicationError> {
        let user_id = self.deps.token_verifier.verify(token)?;
        let profile = self
            .deps
            .user_repository
            .find_profile(user_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(user_id = %user_id, "令牌有效但用户不存在");
                ApplicationError::Authentication
            })?;
        Ok(profile)
    }

    /// 认证成功后：登记在线、加入房间、通知会话对端上线
    pub async fn connect(&self, session: &Session) -> Result<(), ApplicationError> {
        let user_id = session.user_id();
        self.deps.presence.register(session.handle.clone()).await;
        self.touch_last_seen(user_id);

        let conversations = self.deps.membership.join_user_rooms(session).await?;
        let notified = self.notify_status_change(user_id, true, &conversations).await;

        tracing::info!(
            user_id = %user_id,
            connection_id = %session.connection_id(),
            conversations = conversations.len(),
            notified,
            "用户连接已建立"
        );
        Ok(())
    }

    /// 断开清理，每个连接只执行一次
    pub async fn disconnect(&self, session: &Session) {
        if !session.mark_disconnected() {
            return;
        }

        let user_id = session.user_id();
        let connection_id = session.connection_id();
        self.deps.rooms.leave_all(connection_id).await;
        let went_offline = self.deps.presence.unregister(connection_id).await.is_some()
            && !self.deps.presence.is_online(user_id).await;
        self.touch_last_seen(user_id);

        if went_offline {
            match self
                .deps
                .conversation_repository
                .list_for_participant(user_id)
                .await
            {
                Ok(conversations) => {
                    self.notify_status_change(user_id, false, &conversations)
                        .await;
                }
                Err(err) => {
                    tracing::error!(user_id = %user_id, error = %err, "加载会话失败，无法广播离线状态");
                }
            }
        }

        tracing::info!(
            user_id = %user_id,
            connection_id = %connection_id,
            went_offline,
            "用户连接已断开"
        );
    }

    /// 逐个通知每个会话里的其他在线参与者，返回送达次数
    async fn notify_status_change(
        &self,
        user_id: UserId,
        is_online: bool,
        conversations: &[Conversation],
    ) -> usize {
        let mut delivered = 0;
        for conversation in conversations {
            for peer in conversation.peers_of(user_id) {
                let event = ServerEvent::UserStatusChange(StatusChangePayload {
                    user_id,
                    is_online,
                    conversation_id: conversation.id,
                });
                if self.deps.presence.send(peer, event).await {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    fn touch_last_seen(&self, user_id: UserId) {
        let users = Arc::clone(&self.deps.user_repository);
        let now = self.deps.clock.now();
        spawn_detached("touch_last_seen", async move {
            users.touch_last_seen(user_id, now).await?;
            Ok(())
        });
    }
}
