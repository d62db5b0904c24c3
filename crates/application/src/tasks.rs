use std::future::Future;

use crate::error::ApplicationError;

/// 启动一个不等待结果的后台任务，失败只记录日志，不重试
pub fn spawn_detached<F>(label: &'static str, task: F)
where
    F: Future<Output = Result<(), ApplicationError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = task.await {
            tracing::warn!(task = label, error = %err, "后台任务失败");
        }
    });
}
