use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use domain::{UserId, UserProfile};
use tokio::sync::mpsc;

use crate::events::ServerEvent;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// 进程内唯一的连接标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

/// 一条已认证连接的发送端
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: UserId,
    outbox: Outbox,
}

impl ConnectionHandle {
    pub fn new(user_id: UserId, outbox: Outbox) -> Self {
        Self {
            id: ConnectionId::next(),
            user_id,
            outbox,
        }
    }

    /// 尽力投递，连接已关闭时返回 false
    pub fn send(&self, event: ServerEvent) -> bool {
        self.outbox.send(event).is_ok()
    }
}

/// 连接生命周期内的会话状态
#[derive(Debug, Clone)]
pub struct Session {
    pub handle: ConnectionHandle,
    pub user: UserProfile,
    disconnected: Arc<AtomicBool>,
}

impl Session {
    pub fn new(user: UserProfile, outbox: Outbox) -> Self {
        Self {
            handle: ConnectionHandle::new(user.id, outbox),
            user,
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.handle.id
    }

    /// 首次调用返回 true，之后都返回 false
    pub fn mark_disconnected(&self) -> bool {
        !self.disconnected.swap(true, Ordering::AcqRel)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }
}
