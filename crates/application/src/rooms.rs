//! 会话房间成员表
//!
//! 房间只决定扇出范围，不代表任何授权。每个连接对每个会话最多加入一次。

use std::collections::{HashMap, HashSet};

use domain::ConversationId;
use tokio::sync::RwLock;

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::events::ServerEvent;

/// 房间名，沿用 `chat_<id>` 的命名
pub fn room_name(conversation_id: ConversationId) -> String {
    format!("chat_{conversation_id}")
}

#[derive(Default)]
struct RoomMaps {
    members: HashMap<ConversationId, HashMap<ConnectionId, ConnectionHandle>>,
    joined: HashMap<ConnectionId, HashSet<ConversationId>>,
}

impl RoomMaps {
    fn insert(&mut self, conversation_id: ConversationId, handle: &ConnectionHandle) -> bool {
        let newly_joined = self
            .joined
            .entry(handle.id)
            .or_default()
            .insert(conversation_id);
        if newly_joined {
            self.members
                .entry(conversation_id)
                .or_default()
                .insert(handle.id, handle.clone());
        }
        newly_joined
    }
}

#[derive(Default)]
pub struct RoomRegistry {
    inner: RwLock<RoomMaps>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入房间，已在房间中时返回 false
    pub async fn join(&self, conversation_id: ConversationId, handle: &ConnectionHandle) -> bool {
        self.inner.write().await.insert(conversation_id, handle)
    }

    /// 批量加入，返回新加入的数量
    pub async fn join_many<I>(&self, conversations: I, handle: &ConnectionHandle) -> usize
    where
        I: IntoIterator<Item = ConversationId>,
    {
        let mut maps = self.inner.write().await;
        conversations
            .into_iter()
            .filter(|id| maps.insert(*id, handle))
            .count()
    }

    /// 离开全部房间，返回离开前所在的会话
    pub async fn leave_all(&self, connection_id: ConnectionId) -> Vec<ConversationId> {
        let mut maps = self.inner.write().await;
        let Some(rooms) = maps.joined.remove(&connection_id) else {
            return Vec::new();
        };

        for conversation_id in &rooms {
            if let Some(members) = maps.members.get_mut(conversation_id) {
                members.remove(&connection_id);
                if members.is_empty() {
                    maps.members.remove(conversation_id);
                }
            }
        }
        rooms.into_iter().collect()
    }

    /// 关闭房间，会话被删除时调用
    pub async fn close_room(&self, conversation_id: ConversationId) -> usize {
        let mut maps = self.inner.write().await;
        let Some(members) = maps.members.remove(&conversation_id) else {
            return 0;
        };
        for connection_id in members.keys() {
            if let Some(rooms) = maps.joined.get_mut(connection_id) {
                rooms.remove(&conversation_id);
            }
        }
        members.len()
    }

    pub async fn is_joined(&self, connection_id: ConnectionId, conversation_id: ConversationId) -> bool {
        self.inner
            .read()
            .await
            .joined
            .get(&connection_id)
            .is_some_and(|rooms| rooms.contains(&conversation_id))
    }

    pub async fn rooms_of(&self, connection_id: ConnectionId) -> Vec<ConversationId> {
        self.inner
            .read()
            .await
            .joined
            .get(&connection_id)
            .map(|rooms| rooms.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn member_count(&self, conversation_id: ConversationId) -> usize {
        self.inner
            .read()
            .await
            .members
            .get(&conversation_id)
            .map_or(0, HashMap::len)
    }

    /// 发给房间内的所有连接，返回成功投递的数量
    pub async fn broadcast(&self, conversation_id: ConversationId, event: &ServerEvent) -> usize {
        self.fan_out(conversation_id, None, event).await
    }

    /// 发给房间内除 `except` 以外的连接
    pub async fn broadcast_except(
        &self,
        conversation_id: ConversationId,
        except: ConnectionId,
        event: &ServerEvent,
    ) -> usize {
        self.fan_out(conversation_id, Some(except), event).await
    }

    async fn fan_out(
        &self,
        conversation_id: ConversationId,
        except: Option<ConnectionId>,
        event: &ServerEvent,
    ) -> usize {
        // 先拷出句柄再投递，不在持锁期间发送
        let targets: Vec<ConnectionHandle> = {
            let maps = self.inner.read().await;
            maps.members
                .get(&conversation_id)
                .map(|members| {
                    members
                        .values()
                        .filter(|handle| Some(handle.id) != except)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        let delivered = targets
            .iter()
            .filter(|handle| handle.send(event.clone()))
            .count();

        tracing::debug!(
            room = %room_name(conversation_id),
            event = event.name(),
            delivered,
            "房间广播"
        );
        delivered
    }
}
