//! 实时子系统端到端流程（内存存储）

use std::sync::Arc;
use std::time::Duration;

use application::{
    events::{ConversationRef, MarkAsReadPayload, SendMessagePayload},
    ApplicationError, ClientEvent, ContainerDependencies, ConversationRepository, InMemoryStore,
    RealtimeServices, ServerEvent, Session, SystemClock, TokenVerifier,
};
use config::{ChatConfig, ForumConfig, SendPolicy};
use domain::{ConversationId, MessageId, UserId, UserProfile};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

/// 令牌即用户ID
struct UuidTokenVerifier;

impl TokenVerifier for UuidTokenVerifier {
    fn verify(&self, token: &str) -> Result<UserId, ApplicationError> {
        token
            .parse::<Uuid>()
            .map(UserId::from)
            .map_err(|_| ApplicationError::Authentication)
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    services: RealtimeServices,
}

struct Client {
    session: Session,
    events: UnboundedReceiver<ServerEvent>,
}

impl Client {
    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    fn count(&mut self, name: &str) -> usize {
        self.drain().iter().filter(|e| e.name() == name).count()
    }
}

impl Harness {
    fn new(send_policy: SendPolicy) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let services = RealtimeServices::build(
            ContainerDependencies {
                user_repository: store.clone(),
                conversation_repository: store.clone(),
                message_repository: store.clone(),
                post_repository: store.clone(),
                token_verifier: Arc::new(UuidTokenVerifier),
                clock: Arc::new(SystemClock),
            },
            &ChatConfig {
                send_policy,
                ..ChatConfig::default()
            },
            &ForumConfig::default(),
        );
        Self { store, services }
    }

    async fn user(&self, name: &str) -> UserProfile {
        let profile = UserProfile::new(UserId::random(), name, format!("{name}@example.com"));
        self.store.insert_user(profile.clone()).await;
        profile
    }

    async fn conversation(&self, a: &UserProfile, b: &UserProfile) -> ConversationId {
        self.services
            .conversations
            .get_or_create(a.id, b.id)
            .await
            .unwrap()
            .id
    }

    async fn connect(&self, profile: &UserProfile) -> Client {
        let user = self
            .services
            .lifecycle
            .authenticate(&profile.id.to_string())
            .await
            .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(user, tx);
        self.services.lifecycle.connect(&session).await.unwrap();
        Client {
            session,
            events: rx,
        }
    }

    async fn send(&self, client: &Client, conversation_id: ConversationId, content: &str) {
        self.services
            .gateway
            .handle(
                &client.session,
                ClientEvent::SendMessage(SendMessagePayload {
                    conversation_id,
                    content: content.to_string(),
                }),
            )
            .await;
    }
}

async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn message_reaches_both_participants_and_updates_summary() {
    let harness = Harness::new(SendPolicy::Concurrent);
    let alice = harness.user("alice").await;
    let bob = harness.user("bob").await;
    let c1 = harness.conversation(&alice, &bob).await;

    let mut a = harness.connect(&alice).await;
    let mut b = harness.connect(&bob).await;
    a.drain();
    b.drain();

    harness.send(&a, c1, "hi").await;

    let a_events = a.drain();
    let b_events = b.drain();
    assert_eq!(a_events.len(), 1, "发送者自己也应收到一次 new_message");
    assert_eq!(b_events.len(), 1, "对端应恰好收到一次 new_message");

    match &b_events[0] {
        ServerEvent::NewMessage(view) => {
            assert_eq!(view.content, "hi");
            assert_eq!(view.conversation_id, c1);
            assert_eq!(view.sender_id, alice.id);
            assert_eq!(view.sender.name, "alice");
            assert!(!view.is_read);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let store = harness.store.clone();
    let updated = eventually(|| {
        let store = store.clone();
        async move {
            store
                .find_by_id(c1)
                .await
                .unwrap()
                .is_some_and(|c| c.last_message.as_deref() == Some("hi"))
        }
    })
    .await;
    assert!(updated, "会话摘要应最终更新为最新消息");
}

#[tokio::test]
async fn unauthorized_join_and_send_yield_errors_without_broadcast() {
    for policy in [SendPolicy::Concurrent, SendPolicy::AuthorizeFirst] {
        let harness = Harness::new(policy);
        let alice = harness.user("alice").await;
        let bob = harness.user("bob").await;
        let mallory = harness.user("mallory").await;
        let c1 = harness.conversation(&alice, &bob).await;

        let mut a = harness.connect(&alice).await;
        let mut b = harness.connect(&bob).await;
        let mut m = harness.connect(&mallory).await;
        a.drain();
        b.drain();
        m.drain();

        harness
            .services
            .gateway
            .handle(
                &m.session,
                ClientEvent::JoinChat(ConversationRef { conversation_id: c1 }),
            )
            .await;
        harness.send(&m, c1, "let me in").await;

        let errors: Vec<_> = m
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::Error(payload) => Some(payload.message),
                _ => None,
            })
            .collect();
        assert_eq!(
            errors,
            vec![
                "Chat not found or access denied".to_string(),
                "Chat not found or access denied".to_string()
            ]
        );
        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());

        let store = harness.store.clone();
        let clean = eventually(|| {
            let store = store.clone();
            async move { store.messages_in(c1).await.is_empty() }
        })
        .await;
        assert!(clean, "{policy}: 未授权的消息不应留在存储中");
    }
}

#[tokio::test]
async fn join_chat_acknowledges_participant() {
    let harness = Harness::new(SendPolicy::Concurrent);
    let alice = harness.user("alice").await;
    let bob = harness.user("bob").await;
    let mut a = harness.connect(&alice).await;

    // 连接之后才创建的会话需要显式加入
    let c1 = harness.conversation(&alice, &bob).await;
    harness
        .services
        .gateway
        .handle(
            &a.session,
            ClientEvent::JoinChat(ConversationRef { conversation_id: c1 }),
        )
        .await;

    assert_eq!(
        a.drain(),
        vec![ServerEvent::JoinedChat(ConversationRef { conversation_id: c1 })]
    );
    assert!(harness.services.rooms.is_joined(a.session.connection_id(), c1).await);
}

#[tokio::test]
async fn presence_flips_and_disconnect_is_idempotent() {
    let harness = Harness::new(SendPolicy::Concurrent);
    let alice = harness.user("alice").await;
    let bob = harness.user("bob").await;
    let c1 = harness.conversation(&alice, &bob).await;

    let mut b = harness.connect(&bob).await;
    let a = harness.connect(&alice).await;
    assert!(harness.services.presence.is_online(alice.id).await);

    let online: Vec<_> = b.drain();
    assert!(online.contains(&ServerEvent::UserStatusChange(
        application::events::StatusChangePayload {
            user_id: alice.id,
            is_online: true,
            conversation_id: c1,
        }
    )));

    harness.services.lifecycle.disconnect(&a.session).await;
    harness.services.lifecycle.disconnect(&a.session).await;
    assert!(!harness.services.presence.is_online(alice.id).await);
    assert!(harness.services.rooms.rooms_of(a.session.connection_id()).await.is_empty());
    assert_eq!(b.count("user_status_change"), 1, "离线通知只发送一次");
}

#[tokio::test]
async fn join_after_disconnect_leaves_no_room_entry() {
    let harness = Harness::new(SendPolicy::Concurrent);
    let alice = harness.user("alice").await;
    let bob = harness.user("bob").await;
    let c1 = harness.conversation(&alice, &bob).await;

    let mut a = harness.connect(&alice).await;
    a.drain();
    harness.services.lifecycle.disconnect(&a.session).await;

    // 断开后才执行完的 join_chat
    harness
        .services
        .gateway
        .handle(
            &a.session,
            ClientEvent::JoinChat(ConversationRef { conversation_id: c1 }),
        )
        .await;

    let connection_id = a.session.connection_id();
    assert!(!harness.services.rooms.is_joined(connection_id, c1).await);
    assert!(harness.services.rooms.rooms_of(connection_id).await.is_empty());
    assert_eq!(harness.services.rooms.member_count(c1).await, 0);
    assert_eq!(a.count("joined_chat"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn joins_racing_disconnect_never_leak() {
    let harness = Harness::new(SendPolicy::Concurrent);
    let alice = harness.user("alice").await;
    let bob = harness.user("bob").await;
    let c1 = harness.conversation(&alice, &bob).await;

    for _ in 0..20 {
        let a = harness.connect(&alice).await;
        let joins: Vec<_> = (0..8)
            .map(|_| {
                harness.services.gateway.dispatch(
                    a.session.clone(),
                    ClientEvent::JoinChat(ConversationRef { conversation_id: c1 }),
                )
            })
            .collect();
        harness.services.lifecycle.disconnect(&a.session).await;
        futures::future::join_all(joins).await;

        assert!(harness
            .services
            .rooms
            .rooms_of(a.session.connection_id())
            .await
            .is_empty());
    }
    assert_eq!(harness.services.rooms.member_count(c1).await, 0);
}

#[tokio::test]
async fn reconnect_keeps_user_online_when_stale_connection_drops() {
    let harness = Harness::new(SendPolicy::Concurrent);
    let alice = harness.user("alice").await;
    let bob = harness.user("bob").await;
    harness.conversation(&alice, &bob).await;

    let mut b = harness.connect(&bob).await;
    let first = harness.connect(&alice).await;
    let second = harness.connect(&alice).await;
    b.drain();

    harness.services.lifecycle.disconnect(&first.session).await;
    assert!(harness.services.presence.is_online(alice.id).await);
    assert_eq!(b.count("user_status_change"), 0);

    harness.services.lifecycle.disconnect(&second.session).await;
    assert!(!harness.services.presence.is_online(alice.id).await);
    assert_eq!(b.count("user_status_change"), 1);
}

#[tokio::test]
async fn mark_as_read_flips_only_foreign_messages_and_notifies_sender() {
    let harness = Harness::new(SendPolicy::AuthorizeFirst);
    let alice = harness.user("alice").await;
    let bob = harness.user("bob").await;
    let carol = harness.user("carol").await;
    let c1 = harness.conversation(&alice, &bob).await;
    let c2 = harness.conversation(&carol, &alice).await;

    let mut a = harness.connect(&alice).await;
    let mut b = harness.connect(&bob).await;
    let c = harness.connect(&carol).await;

    harness.send(&a, c1, "from alice").await;
    harness.send(&b, c1, "from bob").await;
    harness.send(&c, c2, "from carol").await;
    a.drain();
    b.drain();

    let ids: Vec<MessageId> = harness
        .store
        .messages_in(c1)
        .await
        .into_iter()
        .chain(harness.store.messages_in(c2).await)
        .map(|m| m.id)
        .collect();

    // bob 不参与 c2，也不能标记自己的消息
    harness
        .services
        .gateway
        .handle(
            &b.session,
            ClientEvent::MarkAsRead(MarkAsReadPayload { message_ids: ids }),
        )
        .await;

    for message in harness.store.messages_in(c1).await {
        assert_eq!(message.is_read, message.sender_id == alice.id, "{}", message.content.as_str());
    }
    assert!(harness.store.messages_in(c2).await.iter().all(|m| !m.is_read));

    let receipts: Vec<_> = a
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            ServerEvent::MessageRead(payload) => Some(payload),
            _ => None,
        })
        .collect();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].read_by, bob.id);
    assert_eq!(receipts[0].conversation_id, c1);
    assert!(b.drain().is_empty());
}

#[tokio::test]
async fn typing_is_relayed_to_other_members_only() {
    let harness = Harness::new(SendPolicy::Concurrent);
    let alice = harness.user("alice").await;
    let bob = harness.user("bob").await;
    let mallory = harness.user("mallory").await;
    let c1 = harness.conversation(&alice, &bob).await;

    let mut a = harness.connect(&alice).await;
    let mut b = harness.connect(&bob).await;
    let m = harness.connect(&mallory).await;
    a.drain();
    b.drain();

    harness
        .services
        .gateway
        .handle(
            &a.session,
            ClientEvent::TypingStart(ConversationRef { conversation_id: c1 }),
        )
        .await;
    harness
        .services
        .gateway
        .handle(
            &m.session,
            ClientEvent::TypingStart(ConversationRef { conversation_id: c1 }),
        )
        .await;

    assert!(a.drain().is_empty());
    let relayed = b.drain();
    assert_eq!(relayed.len(), 1);
    match &relayed[0] {
        ServerEvent::UserTypingStart(payload) => {
            assert_eq!(payload.user_id, alice.id);
            assert_eq!(payload.user_name, "alice");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_sends_are_each_delivered_once() {
    let harness = Harness::new(SendPolicy::Concurrent);
    let alice = harness.user("alice").await;
    let bob = harness.user("bob").await;
    let c1 = harness.conversation(&alice, &bob).await;
    let a = harness.connect(&alice).await;
    let mut b = harness.connect(&bob).await;
    b.drain();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            harness.services.gateway.dispatch(
                a.session.clone(),
                ClientEvent::SendMessage(SendMessagePayload {
                    conversation_id: c1,
                    content: format!("message {i}"),
                }),
            )
        })
        .collect();
    for result in futures::future::join_all(handles).await {
        result.unwrap();
    }

    assert_eq!(b.count("new_message"), 20);
    assert_eq!(harness.store.messages_in(c1).await.len(), 20);
}

#[tokio::test]
async fn invalid_frames_and_content_produce_errors() {
    let harness = Harness::new(SendPolicy::Concurrent);
    let alice = harness.user("alice").await;
    let bob = harness.user("bob").await;
    let c1 = harness.conversation(&alice, &bob).await;
    let mut a = harness.connect(&alice).await;
    a.drain();

    assert!(harness
        .services
        .gateway
        .handle_text(&a.session, "{not json")
        .is_none());
    harness.send(&a, c1, "   ").await;
    harness.send(&a, c1, &"x".repeat(4001)).await;

    let messages: Vec<_> = a
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            ServerEvent::Error(payload) => Some(payload.message),
            _ => None,
        })
        .collect();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0], "Invalid event payload");
    assert_eq!(messages[1], "Message content is required");
    assert!(messages[2].contains("too long"));
    assert!(harness.store.messages_in(c1).await.is_empty());
}

#[tokio::test]
async fn handshake_rejects_unknown_user() {
    let harness = Harness::new(SendPolicy::Concurrent);
    let result = harness
        .services
        .lifecycle
        .authenticate(&Uuid::new_v4().to_string())
        .await;
    assert!(matches!(result, Err(ApplicationError::Authentication)));

    let result = harness.services.lifecycle.authenticate("garbage").await;
    assert!(matches!(result, Err(ApplicationError::Authentication)));
}

#[tokio::test]
async fn conversation_list_and_deletion() {
    let harness = Harness::new(SendPolicy::Concurrent);
    let alice = harness.user("alice").await;
    let bob = harness.user("bob").await;
    let c1 = harness.conversation(&alice, &bob).await;
    assert_eq!(harness.conversation(&bob, &alice).await, c1, "无序参与者对应指向同一会话");

    let a = harness.connect(&alice).await;
    let _b = harness.connect(&bob).await;
    harness.send(&a, c1, "one").await;
    harness.send(&a, c1, "two").await;

    let listed = harness.services.conversations.list_for_user(bob.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].unread_count, 2);
    assert!(listed[0].is_online);
    assert_eq!(listed[0].other_user.as_ref().map(|u| u.id), Some(alice.id));

    let marked = harness
        .services
        .receipts
        .mark_conversation_read(bob.id, c1)
        .await
        .unwrap();
    assert_eq!(marked, 2);

    let self_chat = harness.services.conversations.get_or_create(alice.id, alice.id).await;
    assert!(self_chat.is_err());

    harness.services.conversations.delete(bob.id, c1).await.unwrap();
    assert!(harness.store.messages_in(c1).await.is_empty());
    assert!(!harness.services.rooms.is_joined(a.session.connection_id(), c1).await);
}
