use domain::{DomainError, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("authentication failed")]
    Authentication,
    /// 短ID在限定次数内始终冲突
    #[error("failed to allocate short id after {attempts} attempts")]
    ShortIdExhausted { attempts: u32 },
}

impl ApplicationError {
    /// 返回给实时客户端的错误文本。
    ///
    /// 校验失败原样告知；存储等内部故障只给出 `fallback`，不泄露细节。
    pub fn client_message(&self, fallback: &str) -> String {
        match self {
            ApplicationError::Domain(DomainError::InvalidArgument { reason, .. }) => reason.clone(),
            ApplicationError::Domain(err) => err.to_string(),
            ApplicationError::Authentication => "Authentication error".to_string(),
            ApplicationError::Repository(_) | ApplicationError::ShortIdExhausted { .. } => {
                fallback.to_string()
            }
        }
    }
}
