#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{ContainerDependencies, InMemoryStore, RealtimeServices, SystemClock};
use axum::Router;
use config::{ChatConfig, ForumConfig, JwtConfig};
use domain::{Conversation, ConversationId, UserId, UserProfile};
use futures_util::{SinkExt, StreamExt};
use infrastructure::Infrastructure;
use serde_json::Value;
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub jwt: Arc<JwtService>,
    pub state: AppState,
}

impl TestApp {
    /// 使用内存存储构建完整的应用
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let infrastructure = Infrastructure::in_memory(store.clone());
        let jwt = Arc::new(JwtService::new(JwtConfig {
            secret: "test-secret-key".to_string(),
            expiration_hours: 1,
        }));

        let services = RealtimeServices::build(
            ContainerDependencies {
                user_repository: infrastructure.user_repository,
                conversation_repository: infrastructure.conversation_repository,
                message_repository: infrastructure.message_repository,
                post_repository: infrastructure.post_repository,
                token_verifier: jwt.clone(),
                clock: Arc::new(SystemClock),
            },
            &ChatConfig::default(),
            &ForumConfig::default(),
        );

        let state = AppState::new(services, jwt.clone());
        Self { store, jwt, state }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub async fn user(&self, name: &str) -> (UserProfile, String) {
        let profile = UserProfile::new(UserId::random(), name, format!("{name}@example.com"));
        self.store.insert_user(profile.clone()).await;
        let token = self.jwt.generate_token(profile.id).expect("token");
        (profile, token)
    }

    pub async fn conversation(&self, a: UserId, b: UserId) -> Conversation {
        use application::ConversationRepository;

        let conversation = Conversation::direct(
            ConversationId::random(),
            a,
            b,
            time::OffsetDateTime::now_utc(),
        )
        .expect("direct conversation");
        ConversationRepository::create(self.store.as_ref(), conversation)
            .await
            .expect("create conversation")
    }

    /// 在随机端口上启动服务
    pub async fn spawn(&self) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = self.router();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        TestServer {
            addr,
            _shutdown: shutdown_tx,
        }
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/api/v1/ws?token={}", self.addr, token)
    }

    pub async fn connect(&self, token: &str) -> WsClient {
        let (socket, _) = connect_async(self.ws_url(token)).await.expect("ws connect");
        socket
    }

    pub async fn connect_with_header(&self, token: &str) -> WsClient {
        let mut request = format!("ws://{}/api/v1/ws", self.addr)
            .into_client_request()
            .expect("request");
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {token}").parse().expect("header"),
        );
        let (socket, _) = connect_async(request).await.expect("ws connect");
        socket
    }

    /// 握手失败时返回 HTTP 状态码
    pub async fn reject_status(&self, url: String) -> u16 {
        match connect_async(url).await {
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                response.status().as_u16()
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("handshake should have been rejected"),
        }
    }
}

pub async fn send_event(socket: &mut WsClient, event: &str, data: Value) {
    let frame = serde_json::json!({ "event": event, "data": data }).to_string();
    socket.send(Message::text(frame)).await.expect("send frame");
}

/// 读取下一个 JSON 事件，跳过控制帧
pub async fn next_event(socket: &mut WsClient) -> Value {
    loop {
        let message = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("json event");
        }
    }
}

/// 等待指定名称的事件，其他事件被丢弃
pub async fn expect_event(socket: &mut WsClient, name: &str) -> Value {
    loop {
        let event = next_event(socket).await;
        if event["event"] == name {
            return event["data"].clone();
        }
    }
}

/// 在短时间内没有指定名称的事件
pub async fn assert_no_event(socket: &mut WsClient, name: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return;
        }
        match timeout(remaining, socket.next()).await {
            Err(_) | Ok(None) => return,
            Ok(Some(Ok(Message::Text(text)))) => {
                let event: Value = serde_json::from_str(text.as_str()).expect("json event");
                assert_ne!(event["event"], name, "unexpected event: {event}");
            }
            Ok(Some(_)) => {}
        }
    }
}
