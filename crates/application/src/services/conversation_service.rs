use std::sync::Arc;

use std::collections::HashMap;

use domain::{Conversation, ConversationId, DomainError, UserId, UserProfile};

use crate::{
    clock::Clock,
    dto::{ConversationDetail, ConversationSummary, MessagePage, PageRequest, Pagination},
    error::ApplicationError,
    events::MessageView,
    presence::PresenceRegistry,
    repository::{ConversationRepository, MessageRepository, UserRepository},
    rooms::RoomRegistry,
};

pub struct ConversationServiceDependencies {
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub presence: Arc<PresenceRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub clock: Arc<dyn Clock>,
}

pub struct ConversationService {
    deps: ConversationServiceDependencies,
}

impl ConversationService {
    pub fn new(deps: ConversationServiceDependencies) -> Self {
        Self { deps }
    }

    /// 按无序参与者对查找会话，不存在时创建
    pub async fn get_or_create(
        &self,
        me: UserId,
        other: UserId,
    ) -> Result<Conversation, ApplicationError> {
        if me == other {
            return Err(DomainError::SelfConversation.into());
        }

        self.deps
            .user_repository
            .find_profile(other)
            .await?
            .ok_or(DomainError::UserNotFound)?;

        if let Some(existing) = self
            .deps
            .conversation_repository
            .find_between(me, other)
            .await?
        {
            return Ok(existing);
        }

        let conversation =
            Conversation::direct(ConversationId::random(), me, other, self.deps.clock.now())?;
        let created = self.deps.conversation_repository.create(conversation).await?;
        tracing::info!(conversation_id = %created.id, user_id = %me, peer_id = %other, "创建私信会话");
        Ok(created)
    }

    /// 获取或创建会话，并带上最近一页消息
    pub async fn open(
        &self,
        me: UserId,
        other: UserId,
    ) -> Result<ConversationDetail, ApplicationError> {
        let conversation = self.get_or_create(me, other).await?;
        let page = self.load_page(conversation.id, PageRequest::default()).await?;
        Ok(ConversationDetail {
            conversation,
            messages: page.messages,
        })
    }

    /// 参与者读取历史消息，非参与者与会话不存在同样处理
    pub async fn messages(
        &self,
        me: UserId,
        conversation_id: ConversationId,
        page: PageRequest,
    ) -> Result<MessagePage, ApplicationError> {
        self.deps
            .conversation_repository
            .find_for_participant(conversation_id, me)
            .await?
            .ok_or(DomainError::ConversationNotFound)?;

        self.load_page(conversation_id, page.normalized()).await
    }

    async fn load_page(
        &self,
        conversation_id: ConversationId,
        page: PageRequest,
    ) -> Result<MessagePage, ApplicationError> {
        let mut messages = self
            .deps
            .message_repository
            .list_for_conversation(conversation_id, page.limit, page.offset())
            .await?;
        let has_more = messages.len() == page.limit as usize;
        messages.reverse();

        let mut senders: HashMap<UserId, Option<UserProfile>> = HashMap::new();
        let mut views = Vec::with_capacity(messages.len());
        for message in &messages {
            if !senders.contains_key(&message.sender_id) {
                let profile = self
                    .deps
                    .user_repository
                    .find_profile(message.sender_id)
                    .await?;
                senders.insert(message.sender_id, profile);
            }
            match senders.get(&message.sender_id).and_then(Option::as_ref) {
                Some(sender) => views.push(MessageView::new(message, sender)),
                None => {
                    tracing::warn!(message_id = %message.id, sender_id = %message.sender_id, "消息发送者不存在，跳过");
                }
            }
        }

        Ok(MessagePage {
            messages: views,
            pagination: Pagination {
                page: page.page,
                limit: page.limit,
                has_more,
            },
        })
    }

    pub async fn list_for_user(
        &self,
        me: UserId,
    ) -> Result<Vec<ConversationSummary>, ApplicationError> {
        let conversations = self
            .deps
            .conversation_repository
            .list_for_participant(me)
            .await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in &conversations {
            let other_user = match conversation.other_participant(me) {
                Some(other) => self.deps.user_repository.find_profile(other).await?,
                None => None,
            };
            let is_online = match &other_user {
                Some(profile) => self.deps.presence.is_online(profile.id).await,
                None => false,
            };
            let unread = self
                .deps
                .message_repository
                .count_unread(conversation.id, me)
                .await?;
            summaries.push(ConversationSummary::new(
                conversation,
                other_user,
                unread,
                is_online,
            ));
        }
        Ok(summaries)
    }

    /// 参与者删除会话，消息随之删除，已加入该房间的连接被移出
    pub async fn delete(
        &self,
        me: UserId,
        conversation_id: ConversationId,
    ) -> Result<(), ApplicationError> {
        self.deps
            .conversation_repository
            .find_for_participant(conversation_id, me)
            .await?
            .ok_or(DomainError::ConversationNotFound)?;

        self.deps
            .conversation_repository
            .delete(conversation_id)
            .await?;
        let detached = self.deps.rooms.close_room(conversation_id).await;

        tracing::info!(
            conversation_id = %conversation_id,
            user_id = %me,
            detached,
            "会话已删除"
        );
        Ok(())
    }
}
