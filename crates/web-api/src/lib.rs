//! Web API 层。
//!
//! 提供 Axum 路由：WebSocket 实时通道和少量 HTTP 接口，全部委托给应用层服务。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{Claims, JwtService};
pub use config::JwtConfig;
pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
