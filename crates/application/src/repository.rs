use async_trait::async_trait;
use domain::{
    Conversation, ConversationId, Message, MessageId, Reply, ReplyId, RepositoryError, ShortId,
    Thread, ThreadId, Timestamp, UserId, UserProfile,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_profile(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError>;
    async fn touch_last_seen(&self, id: UserId, at: Timestamp) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create(&self, conversation: Conversation) -> Result<Conversation, RepositoryError>;
    async fn find_by_id(&self, id: ConversationId)
        -> Result<Option<Conversation>, RepositoryError>;

    /// 会话存在且 `user` 是参与者时才返回，授权检查只走这一次查询
    async fn find_for_participant(
        &self,
        id: ConversationId,
        user: UserId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    async fn list_for_participant(&self, user: UserId)
        -> Result<Vec<Conversation>, RepositoryError>;

    /// 按无序参与者对查找两人会话
    async fn find_between(
        &self,
        first: UserId,
        second: UserId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    async fn update_summary(
        &self,
        id: ConversationId,
        last_message: &str,
        at: Timestamp,
    ) -> Result<(), RepositoryError>;

    /// 删除会话，级联删除其中的消息
    async fn delete(&self, id: ConversationId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError>;
    async fn delete(&self, id: MessageId) -> Result<(), RepositoryError>;
    async fn find_by_ids(&self, ids: &[MessageId]) -> Result<Vec<Message>, RepositoryError>;

    /// 会话中的一页消息，按创建时间从新到旧
    async fn list_for_conversation(
        &self,
        conversation: ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// 批量标记已读：跳过 `reader` 自己发送的、已读的、以及 `reader`
    /// 不参与的会话中的消息。返回本次实际被翻转的消息
    async fn mark_read_by_ids(
        &self,
        ids: &[MessageId],
        reader: UserId,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// 把会话中所有非 `reader` 发送的未读消息标记为已读，返回数量
    async fn mark_conversation_read(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<u64, RepositoryError>;

    async fn count_unread(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    /// 主题和回复共享一个短ID命名空间
    async fn short_id_exists(&self, short_id: &ShortId) -> Result<bool, RepositoryError>;

    /// 短ID已被占用时返回 `RepositoryError::Conflict`
    async fn create_thread(&self, thread: Thread) -> Result<Thread, RepositoryError>;
    async fn create_reply(&self, reply: Reply) -> Result<Reply, RepositoryError>;

    async fn find_thread(&self, id: ThreadId) -> Result<Option<Thread>, RepositoryError>;
    async fn find_reply(&self, id: ReplyId) -> Result<Option<Reply>, RepositoryError>;
}
