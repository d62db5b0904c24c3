//! 进程内存储，实现全部仓储接口。
//!
//! 用于测试和 `STORAGE_BACKEND=memory` 的开发模式，重启后数据丢失。

use std::collections::HashMap;

use async_trait::async_trait;
use domain::{
    Conversation, ConversationId, Message, MessageId, Reply, ReplyId, RepositoryError, ShortId,
    Thread, ThreadId, Timestamp, UserId, UserProfile,
};
use tokio::sync::RwLock;

use crate::repository::{
    ConversationRepository, MessageRepository, PostRepository, UserRepository,
};

#[derive(Default)]
struct StoreState {
    users: HashMap<UserId, UserProfile>,
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<MessageId, Message>,
    threads: HashMap<ThreadId, Thread>,
    replies: HashMap<ReplyId, Reply>,
}

impl StoreState {
    fn short_id_taken(&self, short_id: &ShortId) -> bool {
        self.threads.values().any(|t| &t.short_id == short_id)
            || self.replies.values().any(|r| &r.short_id == short_id)
    }

    fn is_participant(&self, conversation: ConversationId, user: UserId) -> bool {
        self.conversations
            .get(&conversation)
            .is_some_and(|c| c.has_participant(user))
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入用户资料。账号管理不属于实时子系统，这里直接落表
    pub async fn insert_user(&self, profile: UserProfile) {
        self.state.write().await.users.insert(profile.id, profile);
    }

    pub async fn user(&self, id: UserId) -> Option<UserProfile> {
        self.state.read().await.users.get(&id).cloned()
    }

    pub async fn messages_in(&self, conversation: ConversationId) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .state
            .read()
            .await
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        messages
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_profile(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
        Ok(self.user(id).await)
    }

    async fn touch_last_seen(&self, id: UserId, at: Timestamp) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let profile = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        profile.last_seen = Some(at);
        Ok(())
    }
}

#[async_trait]
impl ConversationRepository for InMemoryStore {
    async fn create(&self, conversation: Conversation) -> Result<Conversation, RepositoryError> {
        let mut state = self.state.write().await;
        if state.conversations.contains_key(&conversation.id) {
            return Err(RepositoryError::conflict("conversation id"));
        }
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.state.read().await.conversations.get(&id).cloned())
    }

    async fn find_for_participant(
        &self,
        id: ConversationId,
        user: UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .conversations
            .get(&id)
            .filter(|c| c.has_participant(user))
            .cloned())
    }

    async fn list_for_participant(
        &self,
        user: UserId,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let state = self.state.read().await;
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.has_participant(user))
            .cloned()
            .collect();
        // 最近有消息的排在前面
        conversations.sort_by(|a, b| {
            b.last_message_at
                .unwrap_or(b.created_at)
                .cmp(&a.last_message_at.unwrap_or(a.created_at))
        });
        Ok(conversations)
    }

    async fn find_between(
        &self,
        first: UserId,
        second: UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .conversations
            .values()
            .filter(|c| c.is_between(first, second))
            .min_by_key(|c| c.created_at)
            .cloned())
    }

    async fn update_summary(
        &self,
        id: ConversationId,
        last_message: &str,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let conversation = state
            .conversations
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        conversation.record_last_message(last_message, at);
        Ok(())
    }

    async fn delete(&self, id: ConversationId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if state.conversations.remove(&id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        state.messages.retain(|_, m| m.conversation_id != id);
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(&message.conversation_id) {
            // 与外键约束一致
            return Err(RepositoryError::storage("conversation does not exist"));
        }
        state.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn delete(&self, id: MessageId) -> Result<(), RepositoryError> {
        self.state.write().await.messages.remove(&id);
        Ok(())
    }

    async fn find_by_ids(&self, ids: &[MessageId]) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.messages.get(id).cloned())
            .collect())
    }

    async fn list_for_conversation(
        &self,
        conversation: ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        let mut messages: Vec<Message> = state
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation)
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn mark_read_by_ids(
        &self,
        ids: &[MessageId],
        reader: UserId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let mut state = self.state.write().await;
        let visible: Vec<MessageId> = ids
            .iter()
            .filter(|id| {
                state
                    .messages
                    .get(*id)
                    .is_some_and(|m| state.is_participant(m.conversation_id, reader))
            })
            .copied()
            .collect();

        let mut flipped = Vec::new();
        for id in visible {
            if let Some(message) = state.messages.get_mut(&id) {
                if message.mark_read(reader) {
                    flipped.push(message.clone());
                }
            }
        }
        Ok(flipped)
    }

    async fn mark_conversation_read(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let count = state
            .messages
            .values_mut()
            .filter(|m| m.conversation_id == conversation)
            .map(|m| m.mark_read(reader))
            .filter(|flipped| *flipped)
            .count();
        Ok(count as u64)
    }

    async fn count_unread(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<u64, RepositoryError> {
        let state = self.state.read().await;
        let count = state
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation && m.sender_id != reader && !m.is_read)
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl PostRepository for InMemoryStore {
    async fn short_id_exists(&self, short_id: &ShortId) -> Result<bool, RepositoryError> {
        Ok(self.state.read().await.short_id_taken(short_id))
    }

    async fn create_thread(&self, thread: Thread) -> Result<Thread, RepositoryError> {
        let mut state = self.state.write().await;
        if state.short_id_taken(&thread.short_id) {
            return Err(RepositoryError::conflict(format!(
                "short id {}",
                thread.short_id
            )));
        }
        state.threads.insert(thread.id, thread.clone());
        Ok(thread)
    }

    async fn create_reply(&self, reply: Reply) -> Result<Reply, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.threads.contains_key(&reply.thread_id) {
            return Err(RepositoryError::storage("thread does not exist"));
        }
        if state.short_id_taken(&reply.short_id) {
            return Err(RepositoryError::conflict(format!(
                "short id {}",
                reply.short_id
            )));
        }
        state.replies.insert(reply.id, reply.clone());
        Ok(reply)
    }

    async fn find_thread(&self, id: ThreadId) -> Result<Option<Thread>, RepositoryError> {
        Ok(self.state.read().await.threads.get(&id).cloned())
    }

    async fn find_reply(&self, id: ReplyId) -> Result<Option<Reply>, RepositoryError> {
        Ok(self.state.read().await.replies.get(&id).cloned())
    }
}
