// ── Observer endpoint ──
//
// Plain WebSocket on `/ws`. Each connection subscribes to the engine's
// event stream, gets a `connected` greeting, then every event published
// after it subscribed, one JSON text frame per event. Inbound frames go
// through `handle_inbound`; only `{"type":"ping"}` gets an answer.

use std::net::SocketAddr;

use futures_util::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::{
    self, Message,
    handshake::server::{ErrorResponse, Request, Response},
    http::StatusCode,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use netwarden_core::{Engine, ObserverReply, handle_inbound};

use crate::error::CliError;

pub const OBSERVER_PATH: &str = "/ws";

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, CliError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| CliError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Accept observers until `cancel` fires, then wait for every open
/// connection to close.
pub async fn serve(listener: TcpListener, engine: Engine, cancel: CancellationToken) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(observe(stream, peer, engine.clone(), cancel.clone()));
                }
                Err(e) => warn!(error = %e, "observer accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    while connections.join_next().await.is_some() {}
    debug!("observer endpoint closed");
}

fn check_path(req: &Request, resp: Response) -> Result<Response, ErrorResponse> {
    if req.uri().path() == OBSERVER_PATH {
        return Ok(resp);
    }
    let mut reject = ErrorResponse::new(Some(format!(
        "no observer endpoint at {}",
        req.uri().path()
    )));
    *reject.status_mut() = StatusCode::NOT_FOUND;
    Err(reject)
}

async fn observe(stream: TcpStream, peer: SocketAddr, engine: Engine, cancel: CancellationToken) {
    let ws = match tokio_tungstenite::accept_hdr_async(stream, check_path).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "observer handshake rejected");
            return;
        }
    };

    // Subscribe before greeting so nothing published after `connected`
    // can slip past this observer.
    let mut events = engine.events();
    let (mut write, mut read) = ws.split();
    info!(%peer, observers = engine.observer_count(), "observer connected");

    if send_json(&mut write, &ObserverReply::connected()).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if send_json(&mut write, event.as_ref()).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%peer, skipped, "observer fell behind; events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_inbound(text.as_str()) {
                        if send_json(&mut write, &reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(%peer, error = %e, "observer read failed");
                    break;
                }
                // Binary, Ping, Pong: tungstenite answers pings itself
                Some(Ok(_)) => {}
            },
        }
    }

    info!(%peer, "observer disconnected");
}

async fn send_json<S, T>(sink: &mut S, value: &T) -> Result<(), tungstenite::Error>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
    T: Serialize + ?Sized,
{
    match serde_json::to_string(value) {
        Ok(text) => sink.send(Message::text(text)).await,
        Err(e) => {
            warn!(error = %e, "dropping unserializable observer frame");
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use netwarden_core::{Command, EngineConfig};
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    use super::*;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn next_json(ws: &mut Client) -> serde_json::Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn spawn_server() -> (Engine, SocketAddr, CancellationToken, tokio::task::JoinHandle<()>) {
        let engine = Engine::new(EngineConfig::default().oneshot()).unwrap();
        engine.start().await.unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(serve(listener, engine.clone(), cancel.clone()));
        (engine, addr, cancel, handle)
    }

    #[tokio::test]
    async fn observer_gets_greeting_pong_and_events() {
        let (engine, addr, cancel, handle) = spawn_server().await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        let greeting = next_json(&mut ws).await;
        assert_eq!(greeting["type"], "connected");
        assert_eq!(greeting["version"], env!("CARGO_PKG_VERSION"));

        ws.send(Message::text(r#"{"type":"ping"}"#)).await.unwrap();
        assert_eq!(next_json(&mut ws).await["type"], "pong");

        // Garbage is dropped without closing the connection.
        ws.send(Message::text("not json")).await.unwrap();

        engine.execute(Command::ResetAllQuotas).await.unwrap();
        let event = next_json(&mut ws).await;
        assert_eq!(event["type"], "quotas_reset");
        assert_eq!(event["device_count"], 0);

        cancel.cancel();
        handle.await.unwrap();
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn other_paths_are_rejected() {
        let (engine, addr, cancel, handle) = spawn_server().await;

        let result = tokio_tungstenite::connect_async(format!("ws://{addr}/events")).await;
        assert!(result.is_err());

        cancel.cancel();
        handle.await.unwrap();
        engine.shutdown().await;
    }
}
