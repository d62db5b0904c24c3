use std::sync::Arc;

use application::repository::{
    ConversationRepository, MessageRepository, PostRepository, UserRepository,
};
use async_trait::async_trait;
use domain::{
    Conversation, ConversationId, Message, MessageContent, MessageId, Reply, ReplyId,
    RepositoryError, ShortId, Thread, ThreadId, Timestamp, UserId, UserProfile,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

/// 唯一约束冲突映射为 `Conflict`，调用方据此重试
fn map_insert_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::conflict(db.constraint().unwrap_or("unique").to_string())
        }
        _ => map_sqlx_err(err),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn expect_affected(rows: u64) -> Result<(), RepositoryError> {
    if rows == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    avatar_url: Option<String>,
    last_seen: Option<OffsetDateTime>,
}

impl From<UserRecord> for UserProfile {
    fn from(value: UserRecord) -> Self {
        UserProfile {
            id: UserId::from(value.id),
            name: value.name,
            email: value.email,
            avatar_url: value.avatar_url,
            last_seen: value.last_seen,
        }
    }
}

#[derive(Debug, FromRow)]
struct ConversationRecord {
    id: Uuid,
    participants: Vec<Uuid>,
    last_message: Option<String>,
    last_message_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl From<ConversationRecord> for Conversation {
    fn from(value: ConversationRecord) -> Self {
        Conversation::restore(
            ConversationId::from(value.id),
            value.participants.into_iter().map(UserId::from).collect(),
            value.last_message,
            value.last_message_at,
            value.created_at,
        )
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: String,
    is_read: bool,
    created_at: OffsetDateTime,
}

impl From<MessageRecord> for Message {
    fn from(value: MessageRecord) -> Self {
        let mut message = Message::new(
            MessageId::from(value.id),
            ConversationId::from(value.conversation_id),
            UserId::from(value.sender_id),
            MessageContent::restore(value.content),
            value.created_at,
        );
        message.is_read = value.is_read;
        message
    }
}

#[derive(Debug, FromRow)]
struct ThreadRecord {
    id: Uuid,
    board: String,
    short_id: String,
    subject: Option<String>,
    content: String,
    author_name: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<ThreadRecord> for Thread {
    type Error = RepositoryError;

    fn try_from(value: ThreadRecord) -> Result<Self, Self::Error> {
        let short_id = ShortId::parse(value.short_id).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Thread {
            id: ThreadId::from(value.id),
            board: value.board,
            short_id,
            subject: value.subject,
            content: value.content,
            author_name: value.author_name,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReplyRecord {
    id: Uuid,
    thread_id: Uuid,
    short_id: String,
    content: String,
    author_name: Option<String>,
    reply_to: Vec<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<ReplyRecord> for Reply {
    type Error = RepositoryError;

    fn try_from(value: ReplyRecord) -> Result<Self, Self::Error> {
        let short_id = ShortId::parse(value.short_id).map_err(|err| invalid_data(err.to_string()))?;
        let reply_to = value
            .reply_to
            .into_iter()
            .map(ShortId::parse)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| invalid_data(err.to_string()))?;
        Ok(Reply {
            id: ReplyId::from(value.id),
            thread_id: ThreadId::from(value.thread_id),
            short_id,
            content: value.content,
            author_name: value.author_name,
            reply_to,
            created_at: value.created_at,
        })
    }
}

const CONVERSATION_COLUMNS: &str =
    "id, participants, last_message, last_message_at, created_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, is_read, created_at";

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_profile(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, name, email, avatar_url, last_seen FROM users WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(UserProfile::from))
    }

    async fn touch_last_seen(&self, id: UserId, at: Timestamp) -> Result<(), RepositoryError> {
        let result = sqlx::query(r#"UPDATE users SET last_seen = $2 WHERE id = $1"#)
            .bind(Uuid::from(id))
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        expect_affected(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn create(&self, conversation: Conversation) -> Result<Conversation, RepositoryError> {
        let record = sqlx::query_as::<_, ConversationRecord>(&format!(
            "INSERT INTO conversations (id, participants, last_message, last_message_at, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(Uuid::from(conversation.id))
        .bind(uuids(conversation.participants()))
        .bind(conversation.last_message.as_deref())
        .bind(conversation.last_message_at)
        .bind(conversation.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_err)?;
        Ok(record.into())
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let record = sqlx::query_as::<_, ConversationRecord>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(Conversation::from))
    }

    async fn find_for_participant(
        &self,
        id: ConversationId,
        user: UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let record = sqlx::query_as::<_, ConversationRecord>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE id = $1 AND $2 = ANY(participants)"
        ))
        .bind(Uuid::from(id))
        .bind(Uuid::from(user))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(Conversation::from))
    }

    async fn list_for_participant(
        &self,
        user: UserId,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let records = sqlx::query_as::<_, ConversationRecord>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE participants @> ARRAY[$1]::uuid[]
             ORDER BY COALESCE(last_message_at, created_at) DESC"
        ))
        .bind(Uuid::from(user))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(Conversation::from).collect())
    }

    async fn find_between(
        &self,
        first: UserId,
        second: UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let record = sqlx::query_as::<_, ConversationRecord>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE participants @> ARRAY[$1, $2]::uuid[] AND cardinality(participants) = 2
             ORDER BY created_at
             LIMIT 1"
        ))
        .bind(Uuid::from(first))
        .bind(Uuid::from(second))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(Conversation::from))
    }

    async fn update_summary(
        &self,
        id: ConversationId,
        last_message: &str,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE conversations SET last_message = $2, last_message_at = $3 WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .bind(last_message)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        expect_affected(result.rows_affected())
    }

    async fn delete(&self, id: ConversationId) -> Result<(), RepositoryError> {
        let result = sqlx::query(r#"DELETE FROM conversations WHERE id = $1"#)
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        expect_affected(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "INSERT INTO messages (id, conversation_id, sender_id, content, is_read, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.conversation_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.content.as_str())
        .bind(message.is_read)
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_err)?;
        Ok(record.into())
    }

    async fn delete(&self, id: MessageId) -> Result<(), RepositoryError> {
        sqlx::query(r#"DELETE FROM messages WHERE id = $1"#)
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find_by_ids(&self, ids: &[MessageId]) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ANY($1) ORDER BY created_at"
        ))
        .bind(uuids(ids))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(Message::from).collect())
    }

    async fn list_for_conversation(
        &self,
        conversation: ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(Uuid::from(conversation))
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(Message::from).collect())
    }

    async fn mark_read_by_ids(
        &self,
        ids: &[MessageId],
        reader: UserId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            UPDATE messages AS m
            SET is_read = TRUE
            FROM conversations AS c
            WHERE m.id = ANY($1)
              AND m.sender_id <> $2
              AND m.is_read = FALSE
              AND c.id = m.conversation_id
              AND $2 = ANY(c.participants)
            RETURNING m.id, m.conversation_id, m.sender_id, m.content, m.is_read, m.created_at
            "#,
        )
        .bind(uuids(ids))
        .bind(Uuid::from(reader))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(Message::from).collect())
    }

    async fn mark_conversation_read(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET is_read = TRUE
            WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE
            "#,
        )
        .bind(Uuid::from(conversation))
        .bind(Uuid::from(reader))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }

    async fn count_unread(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE
            "#,
        )
        .bind(Uuid::from(conversation))
        .bind(Uuid::from(reader))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(count.max(0) as u64)
    }
}

#[derive(Clone)]
pub struct PgPostRepository {
    pool: PgPool,
}

impl PgPostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 先占用共享命名空间里的短ID，与帖子写入放在同一事务中
    async fn claim_short_id(
        tx: &mut Transaction<'_, Postgres>,
        short_id: &ShortId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(r#"INSERT INTO post_short_ids (short_id) VALUES ($1)"#)
            .bind(short_id.as_str())
            .execute(&mut **tx)
            .await
            .map_err(map_insert_err)?;
        Ok(())
    }
}

#[async_trait]
impl PostRepository for PgPostRepository {
    async fn short_id_exists(&self, short_id: &ShortId) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS (SELECT 1 FROM post_short_ids WHERE short_id = $1)"#,
        )
        .bind(short_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)
    }

    async fn create_thread(&self, thread: Thread) -> Result<Thread, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        Self::claim_short_id(&mut tx, &thread.short_id).await?;

        let record = sqlx::query_as::<_, ThreadRecord>(
            r#"
            INSERT INTO threads (id, board, short_id, subject, content, author_name, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, board, short_id, subject, content, author_name, created_at
            "#,
        )
        .bind(Uuid::from(thread.id))
        .bind(&thread.board)
        .bind(thread.short_id.as_str())
        .bind(thread.subject.as_deref())
        .bind(&thread.content)
        .bind(thread.author_name.as_deref())
        .bind(thread.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        record.try_into()
    }

    async fn create_reply(&self, reply: Reply) -> Result<Reply, RepositoryError> {
        let reply_to: Vec<String> = reply.reply_to.iter().map(|id| id.to_string()).collect();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        Self::claim_short_id(&mut tx, &reply.short_id).await?;

        let record = sqlx::query_as::<_, ReplyRecord>(
            r#"
            INSERT INTO replies (id, thread_id, short_id, content, author_name, reply_to, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, thread_id, short_id, content, author_name, reply_to, created_at
            "#,
        )
        .bind(Uuid::from(reply.id))
        .bind(Uuid::from(reply.thread_id))
        .bind(reply.short_id.as_str())
        .bind(&reply.content)
        .bind(reply.author_name.as_deref())
        .bind(reply_to)
        .bind(reply.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        record.try_into()
    }

    async fn find_thread(&self, id: ThreadId) -> Result<Option<Thread>, RepositoryError> {
        let record = sqlx::query_as::<_, ThreadRecord>(
            r#"
            SELECT id, board, short_id, subject, content, author_name, created_at
            FROM threads WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(Thread::try_from).transpose()
    }

    async fn find_reply(&self, id: ReplyId) -> Result<Option<Reply>, RepositoryError> {
        let record = sqlx::query_as::<_, ReplyRecord>(
            r#"
            SELECT id, thread_id, short_id, content, author_name, reply_to, created_at
            FROM replies WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(Reply::try_from).transpose()
    }
}

pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub conversation_repository: Arc<PgConversationRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub post_repository: Arc<PgPostRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            conversation_repository: Arc::new(PgConversationRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            post_repository: Arc::new(PgPostRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
