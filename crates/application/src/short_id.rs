use std::sync::{Arc, Mutex};

use domain::ShortId;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::error::ApplicationError;
use crate::repository::PostRepository;

/// 在主题和回复的共享命名空间里分配未被占用的短ID
pub struct ShortIdAllocator {
    posts: Arc<dyn PostRepository>,
    max_attempts: u32,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl ShortIdAllocator {
    pub fn new(posts: Arc<dyn PostRepository>, max_attempts: u32) -> Self {
        Self::with_rng(posts, max_attempts, StdRng::from_os_rng())
    }

    /// 注入随机源，测试里用固定种子制造冲突
    pub fn with_rng<R>(posts: Arc<dyn PostRepository>, max_attempts: u32, rng: R) -> Self
    where
        R: RngCore + Send + 'static,
    {
        Self {
            posts,
            max_attempts: max_attempts.max(1),
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn candidate(&self) -> ShortId {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        ShortId::generate(&mut **rng)
    }

    pub async fn allocate(&self) -> Result<ShortId, ApplicationError> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.candidate();
            if !self.posts.short_id_exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::debug!(short_id = %candidate, attempt, "短ID冲突，重新生成");
        }

        tracing::warn!(attempts = self.max_attempts, "短ID分配失败");
        Err(ApplicationError::ShortIdExhausted {
            attempts: self.max_attempts,
        })
    }
}
