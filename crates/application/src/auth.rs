use domain::UserId;

use crate::error::ApplicationError;

/// 握手阶段的令牌校验。令牌的签发不在实时子系统内
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserId, ApplicationError>;
}
