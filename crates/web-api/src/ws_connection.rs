use application::{ServerEvent, Session};
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::UserProfile;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// WebSocket 连接驱动
///
/// 握手认证已在升级前完成，这里负责：
/// - 登记在线并加入会话房间
/// - 把出站事件写成文本帧
/// - 把入站文本帧交给网关分发
/// - 断开时的清理
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    session: Session,
    outbox: mpsc::UnboundedReceiver<ServerEvent>,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState, user: UserProfile) -> Self {
        let (outbox_tx, outbox) = mpsc::unbounded_channel();
        let session = Session::new(user, outbox_tx);

        tracing::info!(
            user_id = %session.user_id(),
            connection_id = %session.connection_id(),
            "WebSocket 连接已建立"
        );

        Self {
            socket,
            state,
            session,
            outbox,
        }
    }

    /// 连接主循环，任一方向结束即进入清理
    pub async fn run(self) {
        let Self {
            socket,
            state,
            session,
            mut outbox,
        } = self;

        let lifecycle = state.services.lifecycle.clone();
        if let Err(err) = lifecycle.connect(&session).await {
            tracing::error!(user_id = %session.user_id(), error = %err, "连接初始化失败");
        }

        let (mut sender, mut incoming) = socket.split();

        // 控制帧走单独的通道，写 socket 只在发送任务里进行
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        let mut send_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => WsMessage::Pong(data),
                    },
                    Some(event) = outbox.recv() => match serde_json::to_string(&event) {
                        Ok(json) => WsMessage::Text(json.into()),
                        Err(err) => {
                            tracing::warn!(event = event.name(), error = %err, "事件序列化失败");
                            continue;
                        }
                    },
                    else => break,
                };
                if sender.send(frame).await.is_err() {
                    tracing::debug!("写入 WebSocket 失败");
                    break;
                }
            }
            tracing::debug!("WebSocket发送任务结束");
        });

        let mut recv_task = {
            let gateway = state.services.gateway.clone();
            let session = session.clone();
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    match message {
                        WsMessage::Text(text) => {
                            gateway.handle_text(&session, text.as_str());
                        }
                        WsMessage::Ping(data) => {
                            if cmd_tx.send(WsCommand::SendPong(data)).await.is_err() {
                                break;
                            }
                        }
                        WsMessage::Pong(_) => {
                            tracing::debug!("收到pong消息");
                        }
                        WsMessage::Binary(_) => {
                            tracing::debug!(user_id = %session.user_id(), "忽略二进制帧");
                        }
                        WsMessage::Close(_) => {
                            tracing::debug!(user_id = %session.user_id(), "WebSocket收到关闭消息");
                            break;
                        }
                    }
                }
                tracing::debug!("WebSocket接收任务结束");
            })
        };

        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        // 已分发的事件任务不受影响，各自持有会话
        lifecycle.disconnect(&session).await;
    }
}

#[derive(Debug)]
enum WsCommand {
    SendPong(Bytes),
}
