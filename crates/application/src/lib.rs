//! 应用层实现。
//!
//! 实时私信与在线状态子系统：连接生命周期、会话房间、消息投递、
//! 已读回执与输入状态，以及论坛短ID分配。存储和令牌校验通过 trait 注入。

pub mod auth;
pub mod clock;
pub mod connection;
pub mod container;
pub mod dto;
pub mod error;
pub mod events;
pub mod gateway;
pub mod memory;
pub mod presence;
pub mod repository;
pub mod rooms;
pub mod services;
pub mod short_id;
pub mod tasks;

pub use auth::TokenVerifier;
pub use clock::{Clock, SystemClock};
pub use connection::{ConnectionHandle, ConnectionId, Session};
pub use container::{ContainerDependencies, RealtimeServices};
pub use dto::{
    ConversationDetail, ConversationSummary, CreateReplyRequest, CreateThreadRequest, MessagePage,
    PageRequest, Pagination,
};
pub use error::ApplicationError;
pub use events::{ClientEvent, ServerEvent};
pub use gateway::RealtimeGateway;
pub use memory::InMemoryStore;
pub use presence::PresenceRegistry;
pub use repository::{ConversationRepository, MessageRepository, PostRepository, UserRepository};
pub use rooms::{room_name, RoomRegistry};
pub use services::{
    ChatService, ChatServiceDependencies, ConversationService, ConversationServiceDependencies,
    ForumService, ForumServiceDependencies, LifecycleService, LifecycleServiceDependencies,
    MembershipService, MembershipServiceDependencies, ReceiptService, ReceiptServiceDependencies,
};
pub use short_id::ShortIdAllocator;
