//! 在线状态登记表
//!
//! 用户到连接、连接到用户两张表放在同一把读写锁下，任何修改同时更新两边。
//! 同一用户重连时后写者覆盖，旧连接不会被主动关闭。

use std::collections::HashMap;

use domain::UserId;
use tokio::sync::RwLock;

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::events::ServerEvent;

#[derive(Default)]
struct PresenceMaps {
    by_user: HashMap<UserId, ConnectionHandle>,
    by_connection: HashMap<ConnectionId, UserId>,
}

#[derive(Default)]
pub struct PresenceRegistry {
    inner: RwLock<PresenceMaps>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记连接，返回被覆盖的旧连接
    pub async fn register(&self, handle: ConnectionHandle) -> Option<ConnectionId> {
        let mut maps = self.inner.write().await;
        let user_id = handle.user_id;
        let connection_id = handle.id;

        let replaced = maps.by_user.insert(user_id, handle).map(|old| old.id);
        if let Some(old) = replaced {
            maps.by_connection.remove(&old);
        }
        maps.by_connection.insert(connection_id, user_id);

        tracing::info!(
            user_id = %user_id,
            connection_id = %connection_id,
            replaced = replaced.is_some(),
            "用户上线"
        );
        replaced
    }

    /// 注销连接，用户因此离线时返回其ID。
    ///
    /// 未登记或已被新连接覆盖的连接返回 None，重复断开因此是空操作，
    /// 也不会把已经重连的用户标记为离线
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<UserId> {
        let mut maps = self.inner.write().await;
        let user_id = maps.by_connection.remove(&connection_id)?;
        if maps.by_user.get(&user_id).map(|handle| handle.id) == Some(connection_id) {
            maps.by_user.remove(&user_id);
        }
        tracing::info!(user_id = %user_id, connection_id = %connection_id, "用户离线");
        Some(user_id)
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.inner.read().await.by_user.contains_key(&user_id)
    }

    /// 单播给用户当前的连接。不在线或连接已关闭时返回 false
    pub async fn send(&self, user_id: UserId, event: ServerEvent) -> bool {
        let handle = self.inner.read().await.by_user.get(&user_id).cloned();
        match handle {
            Some(handle) => handle.send(event),
            None => false,
        }
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.inner.read().await.by_user.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle(user_id: UserId) -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(user_id, tx), rx)
    }

    #[tokio::test]
    async fn register_then_unregister() {
        let registry = PresenceRegistry::new();
        let user = UserId::random();
        let (conn, _rx) = handle(user);
        let conn_id = conn.id;

        assert_eq!(registry.register(conn).await, None);
        assert!(registry.is_online(user).await);

        assert_eq!(registry.unregister(conn_id).await, Some(user));
        assert!(!registry.is_online(user).await);
        // 重复断开是空操作
        assert_eq!(registry.unregister(conn_id).await, None);
        assert!(registry.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn reconnect_overwrites_and_stale_disconnect_keeps_user_online() {
        let registry = PresenceRegistry::new();
        let user = UserId::random();
        let (first, mut first_rx) = handle(user);
        let (second, mut second_rx) = handle(user);
        let (first_id, second_id) = (first.id, second.id);

        registry.register(first).await;
        assert_eq!(registry.register(second).await, Some(first_id));

        assert!(registry.send(user, ServerEvent::error("ping")).await);
        assert!(second_rx.try_recv().is_ok());
        assert!(first_rx.try_recv().is_err());

        assert_eq!(registry.unregister(first_id).await, None);
        assert!(registry.is_online(user).await);
        assert!(registry.send(user, ServerEvent::error("still here")).await);
        assert!(second_rx.try_recv().is_ok());

        assert_eq!(registry.unregister(second_id).await, Some(user));
        assert!(registry.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn send_to_offline_user_is_false() {
        let registry = PresenceRegistry::new();
        assert!(!registry.send(UserId::random(), ServerEvent::error("x")).await);
    }
}
