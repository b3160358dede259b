//! In-process WebSocket server used by the connection and engine tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use url::Url;

#[derive(Clone)]
struct ServerState {
    live: Arc<AtomicUsize>,
    opened: Arc<Mutex<Vec<String>>>,
    inbound: mpsc::UnboundedSender<(String, String)>,
    push: broadcast::Sender<(String, String)>,
}

/// Accepts sockets on any path under `/app/`, counts live ones, records
/// client frames and pushes frames to sockets whose path contains a target.
pub(crate) struct TestServer {
    addr: SocketAddr,
    state: ServerState,
    inbound: mpsc::UnboundedReceiver<(String, String)>,
}

impl TestServer {
    pub(crate) async fn spawn() -> Self {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (push, _) = broadcast::channel(64);
        let state = ServerState {
            live: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(Mutex::new(Vec::new())),
            inbound: inbound_tx,
            push,
        };
        let app = Router::new()
            .route("/app/{*path}", get(ws_handler))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            addr,
            state,
            inbound,
        }
    }

    /// Host string for a client config, `<addr>/app`.
    pub(crate) fn host(&self) -> String {
        format!("{}/app", self.addr)
    }

    /// Socket base URL, `ws://<addr>/app/`.
    pub(crate) fn base(&self) -> Url {
        Url::parse(&format!("ws://{}/app/", self.addr)).unwrap()
    }

    pub(crate) fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    /// Paths of every socket opened so far, in order.
    pub(crate) fn opened(&self) -> Vec<String> {
        self.state.opened.lock().unwrap().clone()
    }

    /// Push `text` to every live socket whose path contains `target`.
    pub(crate) fn push(&self, target: &str, text: impl Into<String>) {
        let _ = self.state.push.send((target.to_string(), text.into()));
    }

    /// Next frame a client sent, with the path of its socket.
    pub(crate) async fn next_inbound(&mut self) -> (String, String) {
        tokio::time::timeout(Duration::from_secs(5), self.inbound.recv())
            .await
            .expect("no inbound frame within 5s")
            .expect("server stopped")
    }

    /// Wait until exactly `n` sockets are live.
    pub(crate) async fn wait_live(&self, n: usize) {
        self.wait_until(|s| s.live() == n, "live sockets").await;
    }

    /// Wait until `n` sockets have been opened in total.
    pub(crate) async fn wait_opened(&self, n: usize) {
        self.wait_until(|s| s.opened().len() == n, "opened sockets").await;
    }

    async fn wait_until(&self, cond: impl Fn(&Self) -> bool, what: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !cond(self) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {what} (live {}, opened {:?})",
                self.live(),
                self.opened()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(path): Path<String>,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    // Subscribe before the upgrade completes so no push is missed once the
    // client sees the socket open.
    let push = state.push.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, path, state, push))
}

async fn handle_socket(
    socket: WebSocket,
    path: String,
    state: ServerState,
    mut push: broadcast::Receiver<(String, String)>,
) {
    state.opened.lock().unwrap().push(path.clone());
    state.live.fetch_add(1, Ordering::SeqCst);
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            pushed = push.recv() => match pushed {
                Ok((target, text)) if path.contains(&target) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = state.inbound.send((path.clone(), text.to_string()));
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.live.fetch_sub(1, Ordering::SeqCst);
}
