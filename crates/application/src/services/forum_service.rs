use std::future::Future;
use std::sync::Arc;

use domain::{
    extract_quotes, DomainError, Reply, ReplyId, RepositoryError, ShortId, Thread, ThreadId,
};

use crate::{
    clock::Clock,
    dto::{CreateReplyRequest, CreateThreadRequest},
    error::ApplicationError,
    repository::PostRepository,
    short_id::ShortIdAllocator,
};

pub struct ForumServiceDependencies {
    pub post_repository: Arc<dyn PostRepository>,
    pub short_ids: Arc<ShortIdAllocator>,
    pub clock: Arc<dyn Clock>,
}

/// 论坛发帖：分配短ID并解析引用
pub struct ForumService {
    deps: ForumServiceDependencies,
}

impl ForumService {
    pub fn new(deps: ForumServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn create_thread(
        &self,
        request: CreateThreadRequest,
    ) -> Result<Thread, ApplicationError> {
        let board = request.board.trim().to_owned();
        if board.is_empty() {
            return Err(DomainError::invalid_argument("board", "Board is required").into());
        }
        let content = required_content(&request.content)?;
        let subject = non_blank(request.subject);
        let author_name = non_blank(request.author_name);
        let created_at = self.deps.clock.now();
        let posts = Arc::clone(&self.deps.post_repository);

        let thread = self
            .insert_with_short_id(|short_id| {
                let posts = Arc::clone(&posts);
                let thread = Thread {
                    id: ThreadId::random(),
                    board: board.clone(),
                    short_id,
                    subject: subject.clone(),
                    content: content.clone(),
                    author_name: author_name.clone(),
                    created_at,
                };
                async move { posts.create_thread(thread).await }
            })
            .await?;

        tracing::info!(thread_id = %thread.id, short_id = %thread.short_id, board = %thread.board, "创建主题");
        Ok(thread)
    }

    pub async fn create_reply(
        &self,
        thread_id: ThreadId,
        request: CreateReplyRequest,
    ) -> Result<Reply, ApplicationError> {
        let content = required_content(&request.content)?;
        let thread = self
            .deps
            .post_repository
            .find_thread(thread_id)
            .await?
            .ok_or(DomainError::ThreadNotFound)?;

        let mut reply_to = extract_quotes(&content);
        if let Some(explicit) = request.reply_to_id {
            if let Some(quoted) = self.resolve_explicit_quote(&thread, explicit).await? {
                if !reply_to.contains(&quoted) {
                    reply_to.push(quoted);
                }
            }
        }

        let author_name = non_blank(request.author_name);
        let created_at = self.deps.clock.now();
        let posts = Arc::clone(&self.deps.post_repository);

        let reply = self
            .insert_with_short_id(|short_id| {
                let posts = Arc::clone(&posts);
                let reply = Reply {
                    id: ReplyId::random(),
                    thread_id,
                    short_id,
                    content: content.clone(),
                    author_name: author_name.clone(),
                    reply_to: reply_to.clone(),
                    created_at,
                };
                async move { posts.create_reply(reply).await }
            })
            .await?;

        tracing::info!(
            reply_id = %reply.id,
            thread_id = %thread_id,
            short_id = %reply.short_id,
            quotes = reply.reply_to.len(),
            "创建回复"
        );
        Ok(reply)
    }

    /// 显式引用只接受主题本身或同一主题下的回复，其他情况忽略
    async fn resolve_explicit_quote(
        &self,
        thread: &Thread,
        post_id: uuid::Uuid,
    ) -> Result<Option<ShortId>, ApplicationError> {
        if post_id == thread.id.as_uuid() {
            return Ok(Some(thread.short_id.clone()));
        }
        let reply = self
            .deps
            .post_repository
            .find_reply(ReplyId::new(post_id))
            .await?;
        Ok(reply
            .filter(|r| r.thread_id == thread.id)
            .map(|r| r.short_id))
    }

    /// 分配短ID后写入；检查与写入之间被抢占时重新分配
    async fn insert_with_short_id<T, F, Fut>(&self, mut insert: F) -> Result<T, ApplicationError>
    where
        F: FnMut(ShortId) -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let attempts = self.deps.short_ids.max_attempts();
        for _ in 0..attempts {
            let short_id = self.deps.short_ids.allocate().await?;
            match insert(short_id.clone()).await {
                Ok(post) => return Ok(post),
                Err(RepositoryError::Conflict(what)) => {
                    tracing::debug!(short_id = %short_id, conflict = %what, "写入时短ID冲突");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ApplicationError::ShortIdExhausted { attempts })
    }
}

fn required_content(content: &str) -> Result<String, ApplicationError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(DomainError::invalid_argument("content", "Content is required").into());
    }
    Ok(trimmed.to_owned())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
