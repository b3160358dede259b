//! Connection Manager: the lifecycle of one channel's socket.
//!
//! A manager owns at most one live socket. Activating it with a new URL
//! closes the previous socket first. Frames are parsed and routed on the
//! socket task and delivered as typed [`ChannelEvent`]s through
//! [`ConnectionManager::next_event`]. There is no reconnect: a closed socket
//! stays closed until the owner activates the manager again.

use std::marker::PhantomData;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use taskboard_core::protocol::{ChannelKind, Vocabulary};
use taskboard_core::{SyncError, SyncResult};

use crate::endpoint::redacted;
use crate::router::{route, Routed};

/// Lifecycle phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// What a channel delivers to its owner.
#[derive(Debug)]
pub enum ChannelEvent<V> {
    /// The socket is open and `send` is accepted.
    Opened,
    Event(V),
    /// The server ended the session. Delivered on whichever channel carried it.
    ForcedLogout,
    /// The socket closed on its own (server close, network error or failed
    /// connect). Not delivered after a deliberate deactivation.
    Closed,
}

type SendFailureHook = Box<dyn FnMut(&SyncError) + Send>;

struct Envelope<V> {
    generation: u64,
    event: ChannelEvent<V>,
}

struct ActiveConnection {
    id: Uuid,
    url: Url,
    phase: watch::Receiver<Phase>,
    outbound: mpsc::UnboundedSender<String>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Manages the socket of one channel kind.
pub struct ConnectionManager<V: Vocabulary> {
    generation: u64,
    active: Option<ActiveConnection>,
    /// Phase reported when no connection is active.
    resting: Phase,
    events_tx: mpsc::UnboundedSender<Envelope<V>>,
    events_rx: mpsc::UnboundedReceiver<Envelope<V>>,
    on_send_failure: Option<SendFailureHook>,
    _vocabulary: PhantomData<fn() -> V>,
}

impl<V: Vocabulary> Default for ConnectionManager<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Vocabulary> ConnectionManager<V> {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            generation: 0,
            active: None,
            resting: Phase::Idle,
            events_tx,
            events_rx,
            on_send_failure: None,
            _vocabulary: PhantomData,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        V::CHANNEL
    }

    /// Register the callback invoked whenever `send` is rejected.
    pub fn on_send_failure(&mut self, hook: impl FnMut(&SyncError) + Send + 'static) {
        self.on_send_failure = Some(Box::new(hook));
    }

    pub fn phase(&self) -> Phase {
        match &self.active {
            Some(active) => *active.phase.borrow(),
            None => self.resting,
        }
    }

    /// URL of the active connection, if any.
    pub fn url(&self) -> Option<&Url> {
        self.active.as_ref().map(|a| &a.url)
    }

    /// Bring the manager in line with its owner's inputs. With no URL, or
    /// when `should_connect` is false, the manager is deactivated. A URL equal
    /// to the active one keeps the existing connection; any other URL
    /// replaces it.
    pub fn sync(&mut self, url: Option<Url>, should_connect: bool) {
        match url.filter(|_| should_connect) {
            Some(url) => {
                let reusable = self.active.as_ref().is_some_and(|a| {
                    a.url == url && matches!(*a.phase.borrow(), Phase::Connecting | Phase::Open)
                });
                if !reusable {
                    self.activate(url);
                }
            }
            None => self.deactivate(),
        }
    }

    /// Open a connection to `url`, closing any previous one first.
    pub fn activate(&mut self, url: Url) {
        self.deactivate();
        self.generation += 1;

        let id = Uuid::new_v4();
        let (phase_tx, phase_rx) = watch::channel(Phase::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        info!(
            channel = %V::CHANNEL,
            connection_id = %id,
            url = %redacted(&url),
            "Opening channel"
        );
        let socket = SocketTask::<V> {
            id,
            generation: self.generation,
            url: url.clone(),
            events: self.events_tx.clone(),
            phase: phase_tx,
        };
        let task = tokio::spawn(socket.run(outbound_rx, shutdown_rx));

        self.active = Some(ActiveConnection {
            id,
            url,
            phase: phase_rx,
            outbound: outbound_tx,
            shutdown: Some(shutdown_tx),
            task,
        });
    }

    /// Close the active connection, if any. Events it already queued are
    /// discarded.
    pub fn deactivate(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        self.generation += 1;
        self.resting = Phase::Closed;
        debug!(channel = %V::CHANNEL, connection_id = %active.id, "Closing channel");
        if !active
            .shutdown
            .take()
            .is_some_and(|shutdown| shutdown.send(()).is_ok())
        {
            // The task already finished or stopped listening.
            active.task.abort();
        }
    }

    /// Serialize and send a command. Rejected unless the connection is open;
    /// every rejection also invokes the send-failure callback.
    pub fn send(&mut self, command: &V::Command) -> SyncResult<()> {
        let result = self.try_send(command);
        if let Err(e) = &result {
            warn!(channel = %V::CHANNEL, error = %e, "Send rejected");
            if let Some(hook) = self.on_send_failure.as_mut() {
                hook(e);
            }
        }
        result
    }

    fn try_send(&self, command: &V::Command) -> SyncResult<()> {
        let active = match &self.active {
            Some(active) if *active.phase.borrow() == Phase::Open => active,
            _ => return Err(SyncError::ChannelNotOpen(V::CHANNEL)),
        };
        let text = serde_json::to_string(command)?;
        debug!(channel = %V::CHANNEL, connection_id = %active.id, frame = %text, "Sending frame");
        active
            .outbound
            .send(text)
            .map_err(|_| SyncError::ChannelNotOpen(V::CHANNEL))
    }

    /// Wait for the next event of the active connection. Pends forever while
    /// the manager is inactive, which makes it usable as a `select!` arm.
    pub async fn next_event(&mut self) -> ChannelEvent<V> {
        loop {
            match self.events_rx.recv().await {
                Some(envelope) if envelope.generation == self.generation => {
                    return envelope.event;
                }
                Some(_) => continue,
                None => std::future::pending::<()>().await,
            }
        }
    }
}

impl<V: Vocabulary> Drop for ConnectionManager<V> {
    fn drop(&mut self) {
        self.deactivate();
    }
}

struct SocketTask<V> {
    id: Uuid,
    generation: u64,
    url: Url,
    events: mpsc::UnboundedSender<Envelope<V>>,
    phase: watch::Sender<Phase>,
}

impl<V: Vocabulary> SocketTask<V> {
    fn emit(&self, event: ChannelEvent<V>) {
        let _ = self.events.send(Envelope {
            generation: self.generation,
            event,
        });
    }

    fn close(&self, notify: bool) {
        let _ = self.phase.send(Phase::Closed);
        if notify {
            self.emit(ChannelEvent::Closed);
        }
    }

    async fn run(
        self,
        mut outbound: mpsc::UnboundedReceiver<String>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let channel = V::CHANNEL;
        let connection_id = self.id;

        let connected = tokio::select! {
            result = connect_async(self.url.as_str()) => result,
            _ = &mut shutdown => {
                debug!(%channel, %connection_id, "Deactivated while connecting");
                self.close(false);
                return;
            }
        };
        let stream = match connected {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!(%channel, %connection_id, error = %e, "Failed to connect");
                self.close(true);
                return;
            }
        };

        let _ = self.phase.send(Phase::Open);
        info!(%channel, %connection_id, "Channel open");
        self.emit(ChannelEvent::Opened);

        let (mut write, mut read) = stream.split();
        let notify = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    let _ = write.send(Message::Close(None)).await;
                    break false;
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => match route::<V>(text.as_str()) {
                        Routed::Event(event) => self.emit(ChannelEvent::Event(event)),
                        Routed::ForcedLogout => self.emit(ChannelEvent::ForcedLogout),
                        Routed::Ignored => {}
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!(%channel, %connection_id, ?frame, "Server closed channel");
                        break true;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(%channel, %connection_id, error = %e, "Transport error");
                        break true;
                    }
                    None => {
                        warn!(%channel, %connection_id, "Stream ended");
                        break true;
                    }
                },
                command = outbound.recv() => match command {
                    Some(text) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            error!(%channel, %connection_id, error = %e, "Failed to send frame");
                            break true;
                        }
                    }
                    None => break false,
                },
            }
        };

        self.close(notify);
        debug!(%channel, %connection_id, "Channel task finished");
    }
}
