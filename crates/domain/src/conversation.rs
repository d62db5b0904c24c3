use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ConversationId, Timestamp, UserId};

/// 私信会话。参与者集合在创建后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    participants: Vec<UserId>,
    pub last_message: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<Timestamp>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

impl Conversation {
    /// 两人私信会话
    pub fn direct(
        id: ConversationId,
        first: UserId,
        second: UserId,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        if first == second {
            return Err(DomainError::SelfConversation);
        }
        Ok(Self {
            id,
            participants: vec![first, second],
            last_message: None,
            last_message_at: None,
            created_at: now,
        })
    }

    /// 从持久化数据恢复，参与者去重后保持原顺序
    pub fn restore(
        id: ConversationId,
        participants: Vec<UserId>,
        last_message: Option<String>,
        last_message_at: Option<Timestamp>,
        created_at: Timestamp,
    ) -> Self {
        let mut unique = Vec::with_capacity(participants.len());
        for user in participants {
            if !unique.contains(&user) {
                unique.push(user);
            }
        }
        Self {
            id,
            participants: unique,
            last_message,
            last_message_at,
            created_at,
        }
    }

    pub fn participants(&self) -> &[UserId] {
        &self.participants
    }

    pub fn has_participant(&self, user: UserId) -> bool {
        self.participants.contains(&user)
    }

    /// 除指定用户外的其他参与者
    pub fn peers_of(&self, user: UserId) -> impl Iterator<Item = UserId> + '_ {
        self.participants.iter().copied().filter(move |p| *p != user)
    }

    pub fn other_participant(&self, user: UserId) -> Option<UserId> {
        self.peers_of(user).next()
    }

    /// 无序对比较：`(a, b)` 与 `(b, a)` 指向同一个会话
    pub fn is_between(&self, first: UserId, second: UserId) -> bool {
        self.participants.len() == 2 && self.has_participant(first) && self.has_participant(second)
    }

    pub fn record_last_message(&mut self, text: impl Into<String>, at: Timestamp) {
        self.last_message = Some(text.into());
        self.last_message_at = Some(at);
    }
}
