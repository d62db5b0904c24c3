mod chat_service;
mod conversation_service;
mod forum_service;
mod lifecycle_service;
mod membership_service;
mod receipt_service;

pub use chat_service::{ChatService, ChatServiceDependencies};
pub use conversation_service::{ConversationService, ConversationServiceDependencies};
pub use forum_service::{ForumService, ForumServiceDependencies};
pub use lifecycle_service::{LifecycleService, LifecycleServiceDependencies};
pub use membership_service::{MembershipService, MembershipServiceDependencies};
pub use receipt_service::{ReceiptService, ReceiptServiceDependencies};
