//! 主应用程序入口
//!
//! 加载配置、准备存储、装配实时服务并启动 Axum 服务。
//! `--memory` 使用进程内存储并写入两个演示用户，便于本地调试。

use std::sync::Arc;

use application::{ContainerDependencies, RealtimeServices, SystemClock};
use config::{AppConfig, StorageBackend};
use domain::{UserId, UserProfile};
use infrastructure::{Infrastructure, InfrastructureConfig};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let memory_mode = std::env::args().any(|arg| arg == "--memory");
    let config = if memory_mode {
        let mut config = AppConfig::from_env_with_defaults()?;
        config.database.backend = StorageBackend::Memory;
        config
    } else {
        AppConfig::from_env()?
    };
    config.validate()?;
    if config.uses_dev_secret() {
        tracing::warn!("正在使用开发用 JWT 密钥，请勿用于生产环境");
    }

    let infrastructure = Infrastructure::connect(InfrastructureConfig::from(&config.database)).await?;
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    if let Some(store) = infrastructure.memory.clone() {
        for name in ["alice", "bob"] {
            let profile = UserProfile::new(UserId::random(), name, format!("{name}@example.com"));
            store.insert_user(profile.clone()).await;
            let token = jwt_service.generate_token(profile.id).map_err(|err| {
                anyhow::anyhow!("failed to issue demo token: {err:?}")
            })?;
            tracing::info!(user = name, user_id = %profile.id, token = %token, "演示用户");
        }
    }

    let services = RealtimeServices::build(
        ContainerDependencies {
            user_repository: infrastructure.user_repository,
            conversation_repository: infrastructure.conversation_repository,
            message_repository: infrastructure.message_repository,
            post_repository: infrastructure.post_repository,
            token_verifier: jwt_service.clone(),
            clock: Arc::new(SystemClock),
        },
        &config.chat,
        &config.forum,
    );

    let app = router(AppState::new(services, jwt_service));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(backend = ?config.database.backend, "mirchan 服务启动在 http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
