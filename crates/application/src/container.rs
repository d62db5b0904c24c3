//! 依赖注入容器
//!
//! 在启动时一次性创建在线表、房间表和各个服务，之后只通过 `Arc` 共享。

use std::sync::Arc;

use config::{ChatConfig, ForumConfig};

use crate::{
    auth::TokenVerifier,
    clock::Clock,
    gateway::RealtimeGateway,
    presence::PresenceRegistry,
    repository::{ConversationRepository, MessageRepository, PostRepository, UserRepository},
    rooms::RoomRegistry,
    services::{
        ChatService, ChatServiceDependencies, ConversationService,
        ConversationServiceDependencies, ForumService, ForumServiceDependencies,
        LifecycleService, LifecycleServiceDependencies, MembershipService,
        MembershipServiceDependencies, ReceiptService, ReceiptServiceDependencies,
    },
    short_id::ShortIdAllocator,
};

/// 外部适配器
pub struct ContainerDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub post_repository: Arc<dyn PostRepository>,
    pub token_verifier: Arc<dyn TokenVerifier>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct RealtimeServices {
    pub presence: Arc<PresenceRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub lifecycle: Arc<LifecycleService>,
    pub gateway: Arc<RealtimeGateway>,
    pub chat: Arc<ChatService>,
    pub receipts: Arc<ReceiptService>,
    pub conversations: Arc<ConversationService>,
    pub forum: Arc<ForumService>,
}

impl RealtimeServices {
    pub fn build(deps: ContainerDependencies, chat: &ChatConfig, forum: &ForumConfig) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());

        let membership = Arc::new(MembershipService::new(MembershipServiceDependencies {
            conversation_repository: Arc::clone(&deps.conversation_repository),
            rooms: Arc::clone(&rooms),
        }));

        let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
            conversation_repository: Arc::clone(&deps.conversation_repository),
            message_repository: Arc::clone(&deps.message_repository),
            user_repository: Arc::clone(&deps.user_repository),
            rooms: Arc::clone(&rooms),
            clock: Arc::clone(&deps.clock),
            send_policy: chat.send_policy,
            max_message_length: chat.max_message_length,
        }));

        let receipts = Arc::new(ReceiptService::new(ReceiptServiceDependencies {
            conversation_repository: Arc::clone(&deps.conversation_repository),
            message_repository: Arc::clone(&deps.message_repository),
            presence: Arc::clone(&presence),
            rooms: Arc::clone(&rooms),
        }));

        let lifecycle = Arc::new(LifecycleService::new(LifecycleServiceDependencies {
            token_verifier: Arc::clone(&deps.token_verifier),
            user_repository: Arc::clone(&deps.user_repository),
            conversation_repository: Arc::clone(&deps.conversation_repository),
            presence: Arc::clone(&presence),
            rooms: Arc::clone(&rooms),
            membership: Arc::clone(&membership),
            clock: Arc::clone(&deps.clock),
        }));

        let conversations = Arc::new(ConversationService::new(ConversationServiceDependencies {
            conversation_repository: Arc::clone(&deps.conversation_repository),
            message_repository: Arc::clone(&deps.message_repository),
            user_repository: Arc::clone(&deps.user_repository),
            presence: Arc::clone(&presence),
            rooms: Arc::clone(&rooms),
            clock: Arc::clone(&deps.clock),
        }));

        let short_ids = Arc::new(ShortIdAllocator::new(
            Arc::clone(&deps.post_repository),
            forum.short_id_max_attempts,
        ));
        let forum_service = Arc::new(ForumService::new(ForumServiceDependencies {
            post_repository: Arc::clone(&deps.post_repository),
            short_ids,
            clock: Arc::clone(&deps.clock),
        }));

        let gateway = Arc::new(RealtimeGateway::new(
            membership,
            Arc::clone(&chat_service),
            Arc::clone(&receipts),
        ));

        tracing::info!(
            send_policy = %chat.send_policy,
            max_message_length = chat.max_message_length,
            short_id_attempts = forum.short_id_max_attempts,
            "实时服务已初始化"
        );

        Self {
            presence,
            rooms,
            lifecycle,
            gateway,
            chat: chat_service,
            receipts,
            conversations,
            forum: forum_service,
        }
    }
}
