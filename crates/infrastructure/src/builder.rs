use std::sync::Arc;

use application::{
    ConversationRepository, InMemoryStore, MessageRepository, PostRepository, UserRepository,
};
use config::{DatabaseConfig, StorageBackend};
use thiserror::Error;

use crate::{
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Clone)]
pub struct InfrastructureConfig {
    pub backend: StorageBackend,
    pub database_url: String,
    pub max_connections: u32,
}

impl From<&DatabaseConfig> for InfrastructureConfig {
    fn from(value: &DatabaseConfig) -> Self {
        Self {
            backend: value.backend,
            database_url: value.url.clone(),
            max_connections: value.max_connections,
        }
    }
}

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 按存储后端装配好的仓储集合
#[derive(Clone)]
pub struct Infrastructure {
    pub user_repository: Arc<dyn UserRepository>,
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub post_repository: Arc<dyn PostRepository>,
    /// 内存后端时可用于写入种子数据
    pub memory: Option<Arc<InMemoryStore>>,
}

impl Infrastructure {
    pub async fn connect(config: InfrastructureConfig) -> Result<Self, InfrastructureError> {
        match config.backend {
            StorageBackend::Postgres => {
                let pool = create_pg_pool(&config.database_url, config.max_connections).await?;
                MIGRATOR.run(&pool).await?;
                tracing::info!(max_connections = config.max_connections, "数据库连接池已就绪，迁移完成");
                Ok(Self::postgres(PgStorage::new(pool)))
            }
            StorageBackend::Memory => {
                tracing::warn!("使用内存存储，进程退出后数据丢失");
                Ok(Self::in_memory(Arc::new(InMemoryStore::new())))
            }
        }
    }

    pub fn postgres(storage: PgStorage) -> Self {
        Self {
            user_repository: storage.user_repository,
            conversation_repository: storage.conversation_repository,
            message_repository: storage.message_repository,
            post_repository: storage.post_repository,
            memory: None,
        }
    }

    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            user_repository: store.clone(),
            conversation_repository: store.clone(),
            message_repository: store.clone(),
            post_repository: store.clone(),
            memory: Some(store),
        }
    }
}
