//! The sync engine.
//!
//! One event loop owns every local collection. UI commands, pushed frames
//! from the five channels and REST completions are handled one at a time,
//! each to completion, so no locking is needed between them. REST calls run
//! on spawned tasks and come back as completions tagged with the mount epoch
//! of the view that started them; answers for a view that has since been
//! unmounted or remounted are dropped.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use taskboard_core::api::{ApiResult, BoardApi};
use taskboard_core::chat::{ChatView, Message};
use taskboard_core::config::ClientConfig;
use taskboard_core::notification::{Notification, NotificationMap};
use taskboard_core::protocol::{
    ChannelKind, ChatCommand, ChatEvent, DashboardEvent, GlobalEvent, NotificationEvent, TaskEvent,
};
use taskboard_core::session::SessionContext;
use taskboard_core::signal::UiSignal;
use taskboard_core::statistics::{DashboardStatistics, StatisticsSnapshot};
use taskboard_core::task::optimistic::{Coordinator, MutationId, MutationKind, Settlement, Ticket};
use taskboard_core::task::reconcile::{apply_task_event, Change};
use taskboard_core::task::{DeletedBoard, Task, TaskBoard, TaskFilter, TaskPatch, TaskStatus};
use taskboard_core::{SyncError, SyncResult};

use crate::command::{Step, UiCommand};
use crate::connection::{ChannelEvent, ConnectionManager, Phase};
use crate::endpoint::Endpoints;

#[derive(Debug, Clone, Copy)]
enum TrashAction {
    Recycle,
    Purge,
}

/// A REST call that finished.
enum Completion {
    TasksLoaded {
        epoch: u64,
        filter: TaskFilter,
        result: ApiResult<Vec<Task>>,
    },
    TrashLoaded {
        epoch: u64,
        result: ApiResult<Vec<Task>>,
    },
    Mutation {
        id: MutationId,
        result: ApiResult<()>,
    },
    Trash {
        action: TrashAction,
        title: String,
        result: ApiResult<()>,
    },
    HistoryLoaded {
        epoch: u64,
        result: ApiResult<Vec<Message>>,
    },
    NotificationsLoaded(ApiResult<BTreeMap<String, Vec<Notification>>>),
    NotificationsRead {
        counterpart: String,
        result: ApiResult<()>,
    },
    StatisticsLoaded {
        epoch: u64,
        result: ApiResult<StatisticsSnapshot>,
    },
}

struct OpenChat {
    view: ChatView,
    epoch: u64,
    /// Read receipts waiting for the chat socket to open.
    pending_receipts: Vec<i64>,
}

struct MountedDashboard {
    stats: DashboardStatistics,
    epoch: u64,
}

/// Owns the channels and local state of one session.
pub struct SyncEngine {
    ws_base: Url,
    session: Arc<dyn SessionContext>,
    api: Arc<dyn BoardApi>,
    signals: mpsc::UnboundedSender<UiSignal>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,

    task_channel: ConnectionManager<TaskEvent>,
    chat_channel: ConnectionManager<ChatEvent>,
    notification_channel: ConnectionManager<NotificationEvent>,
    global_channel: ConnectionManager<GlobalEvent>,
    dashboard_channel: ConnectionManager<DashboardEvent>,

    board: Option<TaskBoard>,
    trash: Option<DeletedBoard>,
    chat: Option<OpenChat>,
    notifications: NotificationMap,
    dashboard: Option<MountedDashboard>,
    coordinator: Coordinator,

    epochs: u64,
    terminated: bool,
}

impl SyncEngine {
    /// Create an engine and the receiver of the signals it emits.
    pub fn new(
        config: &ClientConfig,
        session: Arc<dyn SessionContext>,
        api: Arc<dyn BoardApi>,
    ) -> SyncResult<(Self, mpsc::UnboundedReceiver<UiSignal>)> {
        let ws_base = config.ws_base()?;
        let (signals, signals_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let mut chat_channel = ConnectionManager::new();
        let on_chat_failure = signals.clone();
        chat_channel.on_send_failure(move |e: &SyncError| {
            let _ = on_chat_failure.send(UiSignal::CloseChat);
            let _ = on_chat_failure.send(UiSignal::error(format!("Chat unavailable: {e}")));
        });

        let engine = Self {
            ws_base,
            session,
            api,
            signals,
            completions_tx,
            completions_rx,
            task_channel: ConnectionManager::new(),
            chat_channel,
            notification_channel: ConnectionManager::new(),
            global_channel: ConnectionManager::new(),
            dashboard_channel: ConnectionManager::new(),
            board: None,
            trash: None,
            chat: None,
            notifications: NotificationMap::new(),
            dashboard: None,
            coordinator: Coordinator::new(),
            epochs: 0,
            terminated: false,
        };
        Ok((engine, signals_rx))
    }

    // --- accessors -------------------------------------------------------

    pub fn board(&self) -> Option<&TaskBoard> {
        self.board.as_ref()
    }

    pub fn trash(&self) -> Option<&DeletedBoard> {
        self.trash.as_ref()
    }

    pub fn chat(&self) -> Option<&ChatView> {
        self.chat.as_ref().map(|c| &c.view)
    }

    pub fn notifications(&self) -> &NotificationMap {
        &self.notifications
    }

    pub fn dashboard(&self) -> Option<&DashboardStatistics> {
        self.dashboard.as_ref().map(|d| &d.stats)
    }

    pub fn pending_mutations(&self) -> usize {
        self.coordinator.pending()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn phase(&self, channel: ChannelKind) -> Phase {
        match channel {
            ChannelKind::Task => self.task_channel.phase(),
            ChannelKind::Chat => self.chat_channel.phase(),
            ChannelKind::Notification => self.notification_channel.phase(),
            ChannelKind::Global => self.global_channel.phase(),
            ChannelKind::Dashboard => self.dashboard_channel.phase(),
        }
    }

    // --- plumbing --------------------------------------------------------

    fn signal(&self, signal: UiSignal) {
        let _ = self.signals.send(signal);
    }

    fn ensure_alive(&self) -> SyncResult<()> {
        if self.terminated {
            Err(SyncError::SessionTerminated)
        } else {
            Ok(())
        }
    }

    fn endpoints(&self) -> SyncResult<Endpoints> {
        let (_, token) = self.session.credentials()?;
        Ok(Endpoints::new(self.ws_base.clone(), token))
    }

    fn me(&self) -> SyncResult<String> {
        self.session
            .current_user_id()
            .ok_or(SyncError::NotAuthenticated)
    }

    fn next_epoch(&mut self) -> u64 {
        self.epochs += 1;
        self.epochs
    }

    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let _ = completions.send(work.await);
        });
    }

    // --- lifecycle -------------------------------------------------------

    /// Connect the session-wide channels (global and notification) and load
    /// pending notifications.
    pub fn start(&mut self) -> SyncResult<()> {
        self.ensure_alive()?;
        let endpoints = self.endpoints()?;
        self.global_channel
            .sync(Some(endpoints.channel(ChannelKind::Global)?), true);
        self.notification_channel
            .sync(Some(endpoints.channel(ChannelKind::Notification)?), true);
        info!(user = ?self.session.current_user_id(), "Sync engine started");
        self.fetch_notifications();
        Ok(())
    }

    /// Close every channel. Local state is kept.
    pub fn shutdown(&mut self) {
        self.task_channel.deactivate();
        self.chat_channel.deactivate();
        self.notification_channel.deactivate();
        self.global_channel.deactivate();
        self.dashboard_channel.deactivate();
        info!("Sync engine stopped");
    }

    /// Wait for the next pushed frame or REST completion and handle it.
    /// Returns false once the session has been terminated.
    pub async fn process_next(&mut self) -> bool {
        if self.terminated {
            return false;
        }
        tokio::select! {
            Some(done) = self.completions_rx.recv() => self.on_completion(done),
            event = self.task_channel.next_event() => self.on_task_event(event),
            event = self.chat_channel.next_event() => self.on_chat_event(event),
            event = self.notification_channel.next_event() => self.on_notification_event(event),
            event = self.global_channel.next_event() => self.on_global_event(event),
            event = self.dashboard_channel.next_event() => self.on_dashboard_event(event),
        }
        !self.terminated
    }

    /// Apply a UI command.
    pub fn execute(&mut self, command: UiCommand) -> SyncResult<()> {
        self.ensure_alive()?;
        debug!(?command, "Executing command");
        match command {
            UiCommand::MountBoard(filter) => self.mount_board(filter),
            UiCommand::UnmountBoard => {
                self.board = None;
                self.sync_task_channel()
            }
            UiCommand::SetFilter(filter) => self.set_filter(filter),
            UiCommand::SetSearch(term) => {
                if let Some(board) = self.board.as_mut() {
                    board.set_search(term.clone());
                    self.signal(UiSignal::BoardChanged);
                }
                if let Some(trash) = self.trash.as_mut() {
                    trash.set_search(term);
                    self.signal(UiSignal::TrashChanged);
                }
                Ok(())
            }
            UiCommand::MoveTask { id, status } => self.move_task(id, status),
            UiCommand::StepTask { id, step } => self.step_task(id, step),
            UiCommand::EditTask(task) => self.edit_task(&task),
            UiCommand::DeleteTask(id) => self.delete_task(id),
            UiCommand::MountTrash => self.mount_trash(),
            UiCommand::UnmountTrash => {
                self.trash = None;
                self.sync_task_channel()
            }
            UiCommand::RecycleTask(id) => self.trash_action(id, TrashAction::Recycle),
            UiCommand::PurgeTask(id) => self.trash_action(id, TrashAction::Purge),
            UiCommand::OpenChat(counterpart) => self.open_chat(&counterpart),
            UiCommand::CloseChat => {
                self.close_chat();
                self.signal(UiSignal::ChatChanged);
                Ok(())
            }
            UiCommand::SendMessage(content) => self.send_message(&content),
            UiCommand::OpenNotifications(counterpart) => self.open_notifications(&counterpart),
            UiCommand::RefreshNotifications => {
                self.fetch_notifications();
                Ok(())
            }
            UiCommand::MountDashboard => self.mount_dashboard(),
            UiCommand::UnmountDashboard => {
                self.dashboard = None;
                self.dashboard_channel.deactivate();
                Ok(())
            }
        }
    }

    /// Handle the lifecycle events every channel shares. Returns the payload
    /// of a vocabulary event.
    fn lifecycle<V>(&mut self, channel: ChannelKind, event: ChannelEvent<V>) -> Option<V> {
        match event {
            ChannelEvent::Event(event) => Some(event),
            ChannelEvent::Opened => {
                debug!(%channel, "Channel ready");
                None
            }
            ChannelEvent::ForcedLogout => {
                self.terminate(channel);
                None
            }
            ChannelEvent::Closed => {
                warn!(%channel, "Channel closed");
                self.signal(UiSignal::ChannelClosed { channel });
                None
            }
        }
    }

    /// End the session after a `forcedLogout`. Nothing else is handled
    /// afterwards.
    fn terminate(&mut self, channel: ChannelKind) {
        if self.terminated {
            return;
        }
        warn!(%channel, "Session terminated by server");
        self.terminated = true;
        self.session.clear();

        let chat_was_open = self.chat.take().is_some();
        self.shutdown();
        self.board = None;
        self.trash = None;
        self.dashboard = None;
        self.notifications.clear();
        self.coordinator.clear();

        if chat_was_open {
            self.signal(UiSignal::CloseChat);
        }
        self.signal(UiSignal::session_terminated());
    }

    // --- task board ------------------------------------------------------

    fn sync_task_channel(&mut self) -> SyncResult<()> {
        let wanted = self.board.is_some() || self.trash.is_some();
        let url = if wanted {
            Some(self.endpoints()?.channel(ChannelKind::Task)?)
        } else {
            None
        };
        self.task_channel.sync(url, wanted);
        Ok(())
    }

    fn mount_board(&mut self, filter: TaskFilter) -> SyncResult<()> {
        let epoch = self.next_epoch();
        self.board = Some(TaskBoard::new(filter.clone(), epoch));
        self.sync_task_channel()?;
        self.fetch_tasks(epoch, filter);
        Ok(())
    }

    fn set_filter(&mut self, filter: TaskFilter) -> SyncResult<()> {
        let board = self
            .board
            .as_mut()
            .ok_or_else(|| SyncError::NoActiveView("board".into()))?;
        if board.set_filter(filter.clone()) {
            let epoch = board.epoch();
            info!(?filter, "Filter changed, refetching tasks");
            self.fetch_tasks(epoch, filter);
        }
        Ok(())
    }

    fn fetch_tasks(&self, epoch: u64, filter: TaskFilter) {
        let api = self.api.clone();
        self.spawn(async move {
            let result = api.list_tasks(&filter).await;
            Completion::TasksLoaded {
                epoch,
                filter,
                result,
            }
        });
    }

    fn board_mut(&mut self) -> SyncResult<&mut TaskBoard> {
        self.board
            .as_mut()
            .ok_or_else(|| SyncError::NoActiveView("board".into()))
    }

    fn move_task(&mut self, id: i64, status: TaskStatus) -> SyncResult<()> {
        let board = self
            .board
            .as_mut()
            .ok_or_else(|| SyncError::NoActiveView("board".into()))?;
        let ticket = self.coordinator.begin_move(board, id, status)?;
        self.submit(ticket);
        Ok(())
    }

    fn step_task(&mut self, id: i64, step: Step) -> SyncResult<()> {
        let current = self
            .board_mut()?
            .get(id)
            .map(|t| t.status)
            .ok_or(SyncError::TaskNotFound(id))?;
        match step.apply(current) {
            Some(status) => self.move_task(id, status),
            None => {
                debug!(task_id = id, ?step, status = current.as_str(), "Task already at the edge");
                Ok(())
            }
        }
    }

    fn edit_task(&mut self, edited: &Task) -> SyncResult<()> {
        let board = self
            .board
            .as_mut()
            .ok_or_else(|| SyncError::NoActiveView("board".into()))?;
        let ticket = self.coordinator.begin_edit(board, edited)?;
        self.submit(ticket);
        Ok(())
    }

    fn delete_task(&mut self, id: i64) -> SyncResult<()> {
        let author = self
            .board_mut()?
            .get(id)
            .map(|t| t.username_author.clone())
            .ok_or(SyncError::TaskNotFound(id))?;
        if let (Some(role), Some(me)) = (self.session.role(), self.session.current_user_id()) {
            if !role.can_delete(&me, &author) {
                return Err(SyncError::permission(format!(
                    "task {id} belongs to {author}; developers may only delete their own tasks"
                )));
            }
        }
        let board = self
            .board
            .as_mut()
            .ok_or_else(|| SyncError::NoActiveView("board".into()))?;
        let ticket = self.coordinator.begin_delete(board, id)?;
        self.submit(ticket);
        Ok(())
    }

    /// Send an optimistic mutation to the server.
    fn submit(&self, ticket: Ticket) {
        debug!(mutation_id = ticket.id, kind = ?ticket.kind, task_id = ticket.patch.id, "Mutation applied locally");
        self.signal(UiSignal::BoardChanged);
        let api = self.api.clone();
        self.spawn(async move {
            let result = api.patch_task(&ticket.patch).await;
            Completion::Mutation {
                id: ticket.id,
                result,
            }
        });
    }

    fn on_mutation_settled(&mut self, id: MutationId, result: ApiResult<()>) {
        if let Err(e) = &result {
            warn!(mutation_id = id, error = %e, "Task mutation failed");
        }
        match self.coordinator.settle(self.board.as_mut(), id, result.is_ok()) {
            Settlement::Committed {
                kind: MutationKind::Delete,
                title,
                ..
            } => self.signal(UiSignal::success(format!("Task \"{title}\" moved to the trash"))),
            Settlement::Committed {
                kind: MutationKind::Edit,
                title,
                ..
            } => self.signal(UiSignal::success(format!("Task \"{title}\" updated"))),
            Settlement::Committed { task_id, .. } => {
                debug!(task_id, "Move confirmed");
            }
            Settlement::RolledBack { task_id, title } => {
                info!(task_id, "Rolled back rejected mutation");
                self.signal(UiSignal::BoardChanged);
                self.signal(UiSignal::error(format!("Could not update task \"{title}\"")));
            }
            Settlement::DeleteFailed { task_id, title } => {
                warn!(task_id, "Delete failed; task stays off the board until the next fetch");
                self.signal(UiSignal::error(format!("Could not delete task \"{title}\"")));
            }
            Settlement::Stale { task_id } => {
                debug!(task_id, "Dropping answer for an unmounted board");
            }
            Settlement::Unknown => {
                debug!(mutation_id = id, "Dropping answer for an unknown mutation");
            }
        }
    }

    fn on_task_event(&mut self, event: ChannelEvent<TaskEvent>) {
        let Some(event) = self.lifecycle(ChannelKind::Task, event) else {
            return;
        };
        let task_id = event.task().id;
        let report = apply_task_event(self.board.as_mut(), self.trash.as_mut(), event);
        debug!(task_id, live = ?report.live, trash = ?report.trash, "Merged task frame");
        if report.live != Change::Unchanged {
            self.signal(UiSignal::BoardChanged);
        }
        if report.trash != Change::Unchanged {
            self.signal(UiSignal::TrashChanged);
        }
    }

    // --- trash board -----------------------------------------------------

    fn mount_trash(&mut self) -> SyncResult<()> {
        let epoch = self.next_epoch();
        self.trash = Some(DeletedBoard::new(epoch));
        self.sync_task_channel()?;
        let api = self.api.clone();
        self.spawn(async move {
            let result = api.list_deleted_tasks().await;
            Completion::TrashLoaded { epoch, result }
        });
        Ok(())
    }

    /// Recycle or purge a trashed task. Local state changes only when the
    /// server pushes the matching frame.
    fn trash_action(&mut self, id: i64, action: TrashAction) -> SyncResult<()> {
        let title = self
            .trash
            .as_ref()
            .ok_or_else(|| SyncError::NoActiveView("trash".into()))?
            .get(id)
            .map(|t| t.title.clone())
            .ok_or(SyncError::TaskNotFound(id))?;
        let api = self.api.clone();
        self.spawn(async move {
            let result = match action {
                TrashAction::Recycle => api.patch_task(&TaskPatch::deleted(id, false)).await,
                TrashAction::Purge => api.delete_task_permanently(id).await,
            };
            Completion::Trash {
                action,
                title,
                result,
            }
        });
        Ok(())
    }

    // --- chat ------------------------------------------------------------

    fn open_chat(&mut self, counterpart: &str) -> SyncResult<()> {
        let counterpart = counterpart.trim();
        if counterpart.is_empty() {
            return Err(SyncError::InvalidEndpoint("chat counterpart is empty".into()));
        }
        let live = matches!(self.chat_channel.phase(), Phase::Connecting | Phase::Open);
        if live
            && self
                .chat
                .as_ref()
                .is_some_and(|c| c.view.counterpart() == counterpart)
        {
            return Ok(());
        }

        let me = self.me()?;
        let url = self.endpoints()?.chat(Some(counterpart))?;
        let epoch = self.next_epoch();
        self.chat_channel.sync(Some(url), true);
        self.chat = Some(OpenChat {
            view: ChatView::new(me.clone(), counterpart),
            epoch,
            pending_receipts: Vec::new(),
        });
        self.signal(UiSignal::ChatChanged);

        let api = self.api.clone();
        let counterpart = counterpart.to_string();
        self.spawn(async move {
            let result = api.messages_between(&me, &counterpart).await;
            Completion::HistoryLoaded { epoch, result }
        });
        Ok(())
    }

    fn close_chat(&mut self) {
        self.chat = None;
        self.chat_channel.sync(None, false);
    }

    /// Send on the chat socket. A rejected send closes the chat; the
    /// channel's failure callback has already told the UI.
    fn chat_send(&mut self, command: ChatCommand) -> SyncResult<()> {
        let result = self.chat_channel.send(&command);
        if result.is_err() {
            self.close_chat();
        }
        result
    }

    fn send_message(&mut self, content: &str) -> SyncResult<()> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| SyncError::NoActiveView("chat".into()))?;
        let Some(outgoing) = chat.view.compose(content, Utc::now()) else {
            debug!("Ignoring blank message");
            return Ok(());
        };
        self.chat_send(ChatCommand::SendMessage(outgoing))
    }

    /// Mark messages read on the server. While the chat socket is still
    /// connecting the ids are queued; in any other phase the send goes
    /// through the channel, so a dead socket triggers its failure callback.
    fn send_receipts(&mut self, ids: Vec<i64>) {
        if ids.is_empty() {
            return;
        }
        let Some(chat) = self.chat.as_mut() else {
            return;
        };
        if self.chat_channel.phase() == Phase::Connecting {
            chat.pending_receipts.extend(ids);
            return;
        }
        debug!(?ids, "Sending read receipts");
        if let Err(e) = self.chat_send(ChatCommand::MarkAsRead(ids)) {
            warn!(error = %e, "Read receipts not sent");
        }
    }

    fn on_chat_event(&mut self, event: ChannelEvent<ChatEvent>) {
        if matches!(event, ChannelEvent::Opened | ChannelEvent::Closed) {
            // Flush queued receipts either way: an open socket sends them, a
            // closed one rejects them and closes the chat.
            let queued = self
                .chat
                .as_mut()
                .map(|c| std::mem::take(&mut c.pending_receipts))
                .unwrap_or_default();
            self.lifecycle(ChannelKind::Chat, event);
            self.send_receipts(queued);
            return;
        }
        let Some(event) = self.lifecycle(ChannelKind::Chat, event) else {
            return;
        };
        let Some(chat) = self.chat.as_mut() else {
            return;
        };
        match event {
            ChatEvent::Received(message) => {
                let receipt = chat.view.receive(message);
                self.signal(UiSignal::ChatChanged);
                if let Some(id) = receipt {
                    self.send_receipts(vec![id]);
                }
            }
            ChatEvent::MarkedAsRead(ids) => {
                if chat.view.mark_read(&ids) > 0 {
                    self.signal(UiSignal::ChatChanged);
                }
            }
        }
    }

    // --- notifications ---------------------------------------------------

    fn fetch_notifications(&self) {
        let api = self.api.clone();
        self.spawn(async move { Completion::NotificationsLoaded(api.notifications().await) });
    }

    fn open_notifications(&mut self, counterpart: &str) -> SyncResult<()> {
        let counterpart = counterpart.trim().to_string();
        let api = self.api.clone();
        let who = counterpart.clone();
        self.spawn(async move {
            let result = api.mark_notifications_read(&who).await;
            Completion::NotificationsRead {
                counterpart: who,
                result,
            }
        });
        self.open_chat(&counterpart)
    }

    fn add_notification(&mut self, notification: Notification) {
        if self.notifications.push(notification) {
            self.signal(UiSignal::NotificationsChanged {
                total: self.notifications.total(),
            });
        }
    }

    fn on_notification_event(&mut self, event: ChannelEvent<NotificationEvent>) {
        if let Some(NotificationEvent::Received(n)) = self.lifecycle(ChannelKind::Notification, event)
        {
            self.add_notification(n);
        }
    }

    fn on_global_event(&mut self, event: ChannelEvent<GlobalEvent>) {
        if let Some(GlobalEvent::Notification(n)) = self.lifecycle(ChannelKind::Global, event) {
            self.add_notification(n);
        }
    }

    // --- dashboard -------------------------------------------------------

    fn mount_dashboard(&mut self) -> SyncResult<()> {
        let url = self.endpoints()?.channel(ChannelKind::Dashboard)?;
        let epoch = self.next_epoch();
        self.dashboard = Some(MountedDashboard {
            stats: DashboardStatistics::default(),
            epoch,
        });
        self.dashboard_channel.sync(Some(url), true);
        let api = self.api.clone();
        self.spawn(async move {
            let result = api.statistics().await;
            Completion::StatisticsLoaded { epoch, result }
        });
        Ok(())
    }

    fn on_dashboard_event(&mut self, event: ChannelEvent<DashboardEvent>) {
        let Some(event) = self.lifecycle(ChannelKind::Dashboard, event) else {
            return;
        };
        if let Some(dashboard) = self.dashboard.as_mut() {
            dashboard.stats.apply(event);
            self.signal(UiSignal::DashboardChanged);
        }
    }

    // --- REST completions ------------------------------------------------

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::TasksLoaded {
                epoch,
                filter,
                result,
            } => {
                let Some(board) = self
                    .board
                    .as_mut()
                    .filter(|b| b.epoch() == epoch && *b.filter() == filter)
                else {
                    debug!(epoch, "Dropping task fetch for a superseded board");
                    return;
                };
                match result {
                    Ok(tasks) => {
                        board.replace_all(tasks);
                        info!(count = board.len(), "Board loaded");
                        self.signal(UiSignal::BoardChanged);
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to load tasks");
                        self.signal(UiSignal::error(format!("Could not load tasks: {e}")));
                    }
                }
            }
            Completion::TrashLoaded { epoch, result } => {
                let Some(trash) = self.trash.as_mut().filter(|t| t.epoch() == epoch) else {
                    debug!(epoch, "Dropping trash fetch for a superseded view");
                    return;
                };
                match result {
                    Ok(tasks) => {
                        trash.replace_all(tasks);
                        self.signal(UiSignal::TrashChanged);
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to load deleted tasks");
                        self.signal(UiSignal::error(format!("Could not load deleted tasks: {e}")));
                    }
                }
            }
            Completion::Mutation { id, result } => self.on_mutation_settled(id, result),
            Completion::Trash {
                action,
                title,
                result,
            } => match (action, result) {
                (TrashAction::Recycle, Ok(())) => {
                    self.signal(UiSignal::success(format!("Task \"{title}\" restored")))
                }
                (TrashAction::Purge, Ok(())) => {
                    self.signal(UiSignal::success(format!("Task \"{title}\" deleted permanently")))
                }
                (action, Err(e)) => {
                    warn!(?action, error = %e, "Trash action failed");
                    self.signal(UiSignal::error(format!("Could not update task \"{title}\"")));
                }
            },
            Completion::HistoryLoaded { epoch, result } => {
                let Some(chat) = self.chat.as_mut().filter(|c| c.epoch == epoch) else {
                    debug!(epoch, "Dropping history for a closed chat");
                    return;
                };
                match result {
                    Ok(history) => {
                        let unread = chat.view.load_history(history);
                        self.signal(UiSignal::ChatChanged);
                        self.send_receipts(unread);
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to load chat history");
                        self.signal(UiSignal::error("Could not load messages"));
                    }
                }
            }
            Completion::NotificationsLoaded(Ok(entries)) => {
                self.notifications.replace_all(entries);
                self.signal(UiSignal::NotificationsChanged {
                    total: self.notifications.total(),
                });
            }
            Completion::NotificationsLoaded(Err(e)) => {
                warn!(error = %e, "Failed to load notifications");
            }
            Completion::NotificationsRead {
                counterpart,
                result: Ok(()),
            } => {
                let cleared = self.notifications.confirm_read(&counterpart);
                debug!(%counterpart, cleared, "Notifications marked read");
                self.signal(UiSignal::NotificationsChanged {
                    total: self.notifications.total(),
                });
            }
            Completion::NotificationsRead {
                counterpart,
                result: Err(e),
            } => {
                warn!(%counterpart, error = %e, "Failed to mark notifications read");
                self.signal(UiSignal::error("Could not mark notifications as read"));
            }
            Completion::StatisticsLoaded { epoch, result } => {
                let Some(dashboard) = self.dashboard.as_mut().filter(|d| d.epoch == epoch) else {
                    return;
                };
                match result {
                    Ok(snapshot) => {
                        dashboard.stats.load(snapshot);
                        self.signal(UiSignal::DashboardChanged);
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to load statistics");
                        self.signal(UiSignal::error("Could not load statistics"));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use taskboard_core::api::ApiError;
    use taskboard_core::chat::Side;
    use taskboard_core::session::{MemorySession, Role};
    use taskboard_core::signal::FORCED_LOGOUT_NOTICE;

    use crate::testing::TestServer;

    #[derive(Default)]
    struct FakeApi {
        tasks: Mutex<Vec<Task>>,
        failing: Mutex<HashSet<i64>>,
        patches: Mutex<Vec<TaskPatch>>,
        history: Mutex<Vec<Message>>,
        notifications: Mutex<BTreeMap<String, Vec<Notification>>>,
    }

    #[async_trait]
    impl BoardApi for FakeApi {
        async fn list_tasks(&self, filter: &TaskFilter) -> ApiResult<Vec<Task>> {
            let tasks = self.tasks.lock().unwrap();
            Ok(tasks.iter().filter(|t| filter.matches(t)).cloned().collect())
        }

        async fn list_deleted_tasks(&self) -> ApiResult<Vec<Task>> {
            Ok(Vec::new())
        }

        async fn patch_task(&self, patch: &TaskPatch) -> ApiResult<()> {
            self.patches.lock().unwrap().push(patch.clone());
            if self.failing.lock().unwrap().contains(&patch.id) {
                Err(ApiError::rejected(500, "nope"))
            } else {
                Ok(())
            }
        }

        async fn delete_task_permanently(&self, _id: i64) -> ApiResult<()> {
            Ok(())
        }

        async fn messages_between(&self, _me: &str, _counterpart: &str) -> ApiResult<Vec<Message>> {
            Ok(self.history.lock().unwrap().clone())
        }

        async fn notifications(&self) -> ApiResult<BTreeMap<String, Vec<Notification>>> {
            Ok(self.notifications.lock().unwrap().clone())
        }

        async fn mark_notifications_read(&self, _counterpart: &str) -> ApiResult<()> {
            Ok(())
        }

        async fn statistics(&self) -> ApiResult<StatisticsSnapshot> {
            Ok(StatisticsSnapshot::default())
        }
    }

    fn task(id: i64, status: TaskStatus, author: &str) -> Task {
        Task {
            id,
            title: format!("Task {id}"),
            description: String::new(),
            status,
            priority: 2,
            start_date: None,
            end_date: None,
            category_type: "work".into(),
            username_author: author.into(),
            deleted: false,
        }
    }

    fn unread_from_bob(id: i64) -> Message {
        Message {
            id,
            sender_username: "bob".into(),
            receiver_username: "alice".into(),
            content: "earlier".into(),
            sent_at: "2024-01-01T09:00:00".into(),
            read: false,
        }
    }

    struct Harness {
        server: TestServer,
        api: Arc<FakeApi>,
        session: Arc<MemorySession>,
        engine: SyncEngine,
        signals: mpsc::UnboundedReceiver<UiSignal>,
    }

    async fn harness(api: FakeApi, role: Option<Role>) -> Harness {
        let server = TestServer::spawn().await;
        let api = Arc::new(api);
        let session = Arc::new(MemorySession::new("alice", "t0k", role));
        let config = ClientConfig::new(server.host(), false);
        let (engine, signals) = SyncEngine::new(&config, session.clone(), api.clone()).unwrap();
        Harness {
            server,
            api,
            session,
            engine,
            signals,
        }
    }

    impl Harness {
        async fn pump_until(&mut self, done: impl Fn(&SyncEngine) -> bool) {
            while !done(&self.engine) {
                let alive = tokio::time::timeout(Duration::from_secs(5), self.engine.process_next())
                    .await
                    .expect("engine stalled");
                if !alive {
                    break;
                }
            }
        }

        /// Next client frame, pumping the engine while waiting for it.
        async fn inbound(&mut self) -> (String, String) {
            loop {
                tokio::select! {
                    frame = self.server.next_inbound() => return frame,
                    _ = self.engine.process_next() => {}
                }
            }
        }

        fn drain(&mut self) -> Vec<UiSignal> {
            let mut out = Vec::new();
            while let Ok(signal) = self.signals.try_recv() {
                out.push(signal);
            }
            out
        }

        async fn mount_board(&mut self, filter: TaskFilter) {
            self.engine.execute(UiCommand::MountBoard(filter)).unwrap();
            self.pump_until(|e| {
                e.board().is_some_and(TaskBoard::is_loaded) && e.phase(ChannelKind::Task) == Phase::Open
            })
            .await;
        }
    }

    #[tokio::test]
    async fn test_rejected_move_rolls_back_with_toast() {
        let api = FakeApi::default();
        api.tasks.lock().unwrap().push(task(42, TaskStatus::Todo, "alice"));
        api.failing.lock().unwrap().insert(42);
        let mut h = harness(api, None).await;
        h.mount_board(TaskFilter::default()).await;

        h.engine
            .execute(UiCommand::MoveTask {
                id: 42,
                status: TaskStatus::Doing,
            })
            .unwrap();
        assert_eq!(h.engine.board().unwrap().get(42).unwrap().status, TaskStatus::Doing);

        h.pump_until(|e| e.pending_mutations() == 0).await;
        let board = h.engine.board().unwrap();
        assert_eq!(board.get(42).unwrap().status, TaskStatus::Todo);
        assert_eq!(board.counts().todo, 1);
        assert!(h.drain().iter().any(UiSignal::is_error_toast));
        assert_eq!(
            h.api.patches.lock().unwrap().as_slice(),
            &[TaskPatch::status(42, TaskStatus::Doing)]
        );
    }

    #[tokio::test]
    async fn test_step_beyond_edge_is_noop() {
        let api = FakeApi::default();
        api.tasks.lock().unwrap().push(task(1, TaskStatus::Done, "alice"));
        let mut h = harness(api, None).await;
        h.mount_board(TaskFilter::default()).await;

        h.engine
            .execute(UiCommand::StepTask {
                id: 1,
                step: Step::Right,
            })
            .unwrap();
        assert_eq!(h.engine.pending_mutations(), 0);

        h.engine
            .execute(UiCommand::StepTask {
                id: 1,
                step: Step::Left,
            })
            .unwrap();
        assert_eq!(h.engine.board().unwrap().get(1).unwrap().status, TaskStatus::Doing);
    }

    #[tokio::test]
    async fn test_chat_scenario_sends_read_receipt() {
        let mut h = harness(FakeApi::default(), None).await;
        h.engine.execute(UiCommand::OpenChat("bob".into())).unwrap();
        h.pump_until(|e| e.phase(ChannelKind::Chat) == Phase::Open).await;

        h.server.push(
            "chat/t0k/bob",
            json!({
                "type": "receivedMessage",
                "data": {
                    "id": 5, "sender": "bob", "receiver": "alice", "content": "hi",
                    "sentAt": "2024-01-01T10:00:00", "read": false
                }
            })
            .to_string(),
        );
        h.pump_until(|e| e.chat().is_some_and(|c| c.get(5).is_some())).await;

        let entry = h.engine.chat().unwrap().get(5).unwrap();
        assert_eq!(entry.side, Side::Left);
        assert_eq!(entry.message.content, "hi");

        let (path, text) = h.inbound().await;
        assert_eq!(path, "chat/t0k/bob");
        let frame: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(frame, json!({"type": "markAsRead", "data": [5]}));

        h.server.push(
            "chat/t0k/bob",
            json!({"type": "markedAsReadMessages", "data": [5]}).to_string(),
        );
        h.pump_until(|e| e.chat().is_some_and(|c| c.unread_count() == 0)).await;
    }

    #[tokio::test]
    async fn test_history_receipts_wait_for_open_socket() {
        let api = FakeApi::default();
        api.history.lock().unwrap().push(unread_from_bob(3));
        let mut h = harness(api, None).await;
        h.engine.execute(UiCommand::OpenChat("bob".into())).unwrap();

        let (path, text) = h.inbound().await;
        assert_eq!(path, "chat/t0k/bob");
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"type": "markAsRead", "data": [3]})
        );
    }

    #[tokio::test]
    async fn test_receipts_for_unreachable_chat_close_it() {
        let api = FakeApi::default();
        api.history.lock().unwrap().push(unread_from_bob(3));
        let session = Arc::new(MemorySession::new("alice", "t0k", None));
        // Nothing listens on the discard port.
        let config = ClientConfig::new("127.0.0.1:9", false);
        let (mut engine, mut signals) = SyncEngine::new(&config, session, Arc::new(api)).unwrap();

        engine.execute(UiCommand::OpenChat("bob".into())).unwrap();
        while engine.chat().is_some() {
            tokio::time::timeout(Duration::from_secs(5), engine.process_next())
                .await
                .expect("chat was never closed");
        }

        let mut seen = Vec::new();
        while let Ok(signal) = signals.try_recv() {
            seen.push(signal);
        }
        assert!(seen.contains(&UiSignal::CloseChat));
        assert!(seen.iter().any(UiSignal::is_error_toast));
        assert_eq!(engine.phase(ChannelKind::Chat), Phase::Closed);
    }

    #[tokio::test]
    async fn test_reopening_closed_chat_reconnects() {
        let mut h = harness(FakeApi::default(), None).await;
        h.engine.execute(UiCommand::OpenChat("bob".into())).unwrap();
        h.pump_until(|e| e.phase(ChannelKind::Chat) == Phase::Open).await;

        h.engine.chat_channel.deactivate();
        h.server.wait_live(0).await;

        h.engine.execute(UiCommand::OpenChat("bob".into())).unwrap();
        h.pump_until(|e| e.phase(ChannelKind::Chat) == Phase::Open).await;
        h.server.wait_opened(2).await;
        assert_eq!(h.server.opened(), vec!["chat/t0k/bob", "chat/t0k/bob"]);

        // The same chat while its socket is live keeps the connection.
        h.engine.execute(UiCommand::OpenChat("bob".into())).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.server.opened().len(), 2);
        h.server.wait_live(1).await;
    }

    #[tokio::test]
    async fn test_created_task_respects_filter() {
        let mut h = harness(FakeApi::default(), None).await;
        h.mount_board(TaskFilter::new(Some("alice"), None)).await;

        for (id, author) in [(10, "bob"), (11, "alice")] {
            h.server.push(
                "taskws/",
                json!({
                    "type": "createTask",
                    "data": {"id": id, "title": "new", "status": 100, "username_author": author}
                })
                .to_string(),
            );
        }
        h.pump_until(|e| e.board().is_some_and(|b| b.contains(11))).await;
        let board = h.engine.board().unwrap();
        assert!(!board.contains(10));
        assert_eq!(board.len(), 1);
    }

    #[tokio::test]
    async fn test_developer_cannot_delete_foreign_task() {
        let api = FakeApi::default();
        api.tasks.lock().unwrap().push(task(7, TaskStatus::Todo, "bob"));
        api.tasks.lock().unwrap().push(task(8, TaskStatus::Todo, "alice"));
        api.failing.lock().unwrap().insert(8);
        let mut h = harness(api, Some(Role::Developer)).await;
        h.mount_board(TaskFilter::default()).await;

        assert!(matches!(
            h.engine.execute(UiCommand::DeleteTask(7)),
            Err(SyncError::PermissionDenied(_))
        ));
        assert!(h.engine.board().unwrap().contains(7));

        // Own task: removed at once and not restored when the server fails.
        h.engine.execute(UiCommand::DeleteTask(8)).unwrap();
        h.pump_until(|e| e.pending_mutations() == 0).await;
        assert!(!h.engine.board().unwrap().contains(8));
        assert!(h.drain().iter().any(UiSignal::is_error_toast));
    }

    #[tokio::test]
    async fn test_soft_delete_push_moves_task_to_trash() {
        let api = FakeApi::default();
        api.tasks.lock().unwrap().push(task(4, TaskStatus::Doing, "alice"));
        let mut h = harness(api, None).await;
        h.mount_board(TaskFilter::default()).await;
        h.engine.execute(UiCommand::MountTrash).unwrap();
        h.pump_until(|e| e.trash().is_some_and(DeletedBoard::is_loaded)).await;

        let mut deleted = serde_json::to_value(task(4, TaskStatus::Doing, "alice")).unwrap();
        deleted["deleted"] = json!(true);
        h.server.push(
            "taskws/",
            json!({"type": "updatedTask", "data": deleted}).to_string(),
        );
        h.pump_until(|e| e.trash().is_some_and(|t| t.contains(4))).await;
        assert!(!h.engine.board().unwrap().contains(4));
    }

    #[tokio::test]
    async fn test_notifications_cleared_after_confirmed_read() {
        let api = FakeApi::default();
        api.notifications.lock().unwrap().insert(
            "bob".into(),
            vec![Notification {
                id: 1,
                content: "bob".into(),
                sent_at: None,
                photo_url: None,
                read: false,
            }],
        );
        let mut h = harness(api, None).await;
        h.engine.start().unwrap();
        h.pump_until(|e| {
            e.notifications().total() == 1 && e.phase(ChannelKind::Notification) == Phase::Open
        })
        .await;

        h.server.push(
            "notification/",
            json!({"type": "receivedNotification", "data": {"id": 2, "content": "bob"}}).to_string(),
        );
        h.pump_until(|e| e.notifications().count_for("bob") == 2).await;

        h.engine
            .execute(UiCommand::OpenNotifications("bob".into()))
            .unwrap();
        h.pump_until(|e| e.notifications().total() == 0).await;
        assert_eq!(h.engine.chat().unwrap().counterpart(), "bob");
    }

    #[tokio::test]
    async fn test_forced_logout_is_terminal() {
        let mut h = harness(FakeApi::default(), None).await;
        h.engine.start().unwrap();
        h.engine.execute(UiCommand::OpenChat("bob".into())).unwrap();
        h.pump_until(|e| {
            e.phase(ChannelKind::Global) == Phase::Open && e.phase(ChannelKind::Chat) == Phase::Open
        })
        .await;

        h.server.push("global/", json!({"type": "forcedLogout"}).to_string());
        h.pump_until(|e| e.is_terminated()).await;

        assert!(!h.engine.process_next().await);
        assert!(!h.session.is_authenticated());
        assert!(h.engine.chat().is_none());
        let signals = h.drain();
        assert!(signals.contains(&UiSignal::CloseChat));
        assert_eq!(
            signals.last(),
            Some(&UiSignal::SessionTerminated {
                notice: FORCED_LOGOUT_NOTICE.to_string()
            })
        );
        assert!(matches!(
            h.engine.execute(UiCommand::MountBoard(TaskFilter::default())),
            Err(SyncError::SessionTerminated)
        ));
        h.server.wait_live(0).await;
    }
}
