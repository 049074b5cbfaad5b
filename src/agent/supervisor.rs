//! Session supervisor
//!
//! A single task owns every piece of mutable lifecycle state: the connection
//! state, the reconnect counter, liveness, behaviour settings and the live
//! session handle. Controller commands, session events, timer expiries and
//! maintenance ticks all arrive as messages and are handled one at a time, so
//! no tick or timer can act on a handle that has already been torn down.
//!
//! The supervisor never awaits the session handle. Calls into the session run
//! as spawned jobs that report back with the generation they were started
//! for; effects of a job whose session has since been retired are dropped.

use super::actions::{plan_collect, ActionPlan, ActionRequest, ActionStep};
use super::daycycle::{TimeTarget, WeatherType};
use super::maintenance::{
    choose_idle_action, environment_commands, IdleAction, MaintenanceScheduler, MaintenanceTask,
    MaintenanceTick,
};
use super::reconnect::{ReconnectPolicy, ReconnectionDecision};
use super::state::{
    log_state_transition, maintenance_allowed, transition, ConnectionState, LifecycleEvent,
    Liveness,
};
use super::status::{
    build_snapshot, connection_status, ConnectionStatus, StatusInputs, StatusSnapshot,
};
use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::observability::metrics;
use crate::session::{
    ConnectionTarget, EventSink, GameSession, SessionEnvelope, SessionError, SessionEvent,
    SessionFactory, WorldEvent,
};
use crate::store::{ConnectionRecord, SettingsRecord, SettingsStore, StoreError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Upper bound on a single call into the session handle
const SESSION_CALL_TIMEOUT: Duration = Duration::from_secs(10);

const SHUTDOWN_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub(crate) type Reply<T> = oneshot::Sender<T>;

/// Why a start was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOrigin {
    /// Explicit request from an API caller
    User,
    /// Resuming the persisted target at process start
    Startup,
    /// Deferred attempt scheduled by the reconnection policy
    Reconnect,
}

pub(crate) enum Command {
    Start {
        target: ConnectionTarget,
        origin: StartOrigin,
        reply: Reply<AgentResult<String>>,
    },
    Stop {
        reply: Reply<AgentResult<String>>,
    },
    Restart {
        reply: Reply<AgentResult<String>>,
    },
    Action {
        request: ActionRequest,
        reply: Reply<AgentResult<String>>,
    },
    CollectItems {
        reply: Reply<AgentResult<String>>,
    },
    SetWeather {
        weather: WeatherType,
        reply: Reply<AgentResult<String>>,
    },
    SetTime {
        target: TimeTarget,
        reply: Reply<AgentResult<String>>,
    },
    SetKeepWeather {
        enabled: bool,
        weather: Option<WeatherType>,
        reply: Reply<AgentResult<String>>,
    },
    SetKeepTime {
        enabled: bool,
        target: Option<TimeTarget>,
        reply: Reply<AgentResult<String>>,
    },
    ToggleAutoMovement {
        reply: Reply<AgentResult<String>>,
    },
    Status {
        reply: Reply<StatusSnapshot>,
    },
    ConnectionStatus {
        reply: Reply<ConnectionStatus>,
    },
    Settings {
        reply: Reply<SettingsRecord>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

enum Internal {
    ReconnectDue {
        epoch: u64,
        target: ConnectionTarget,
    },
    RestartDue {
        epoch: u64,
        target: ConnectionTarget,
    },
    SettingsLoaded {
        revision: u64,
        result: Result<Option<SettingsRecord>, StoreError>,
    },
    SettingsSaved {
        revision: u64,
        succeeded: bool,
    },
    JobFinished {
        generation: u64,
        kind: JobKind,
        outcomes: Vec<StepOutcome>,
    },
}

type StepOutcome = (ActionStep, AgentResult<()>);

/// What a session job reports back for
enum JobKind {
    /// Caller-visible action, answered once its effects are applied
    Action {
        name: &'static str,
        message: String,
        marks_dead: bool,
        reply: Reply<AgentResult<String>>,
    },
    Greeting,
    Maintenance(MaintenanceTask),
    /// Environment pass right after a keep-weather/time change
    Enforce {
        message: String,
        reply: Reply<AgentResult<String>>,
    },
}

/// Requests handled in order by the settings writer task
enum PersistRequest {
    Save { record: SettingsRecord, revision: u64 },
    Load { revision: u64 },
    Flush { done: oneshot::Sender<()> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Reconnect,
    Restart,
}

struct PendingTimer {
    kind: PendingKind,
    handle: JoinHandle<()>,
}

struct Inbox {
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedReceiver<SessionEnvelope>,
    internal: mpsc::UnboundedReceiver<Internal>,
    ticks: mpsc::UnboundedReceiver<MaintenanceTick>,
}

pub(crate) struct Supervisor {
    agent_id: String,
    config: Arc<AgentConfig>,
    factory: Arc<dyn SessionFactory>,
    policy: ReconnectPolicy,

    state: ConnectionState,
    liveness: Liveness,
    session: Option<Arc<dyn GameSession>>,
    /// Target of the most recently opened session
    current_target: Option<ConnectionTarget>,
    generation: u64,
    reconnect_attempts: u32,
    last_error: Option<String>,
    last_chat_at: Option<Instant>,

    /// In-memory mirror of the persisted record; authoritative until saved
    settings: SettingsRecord,
    settings_revision: u64,
    /// Oldest revision whose save failed and has not been superseded
    unsaved_revision: Option<u64>,

    pending: Option<PendingTimer>,
    timer_epoch: u64,
    scheduler: MaintenanceScheduler,
    /// Maintenance tasks with a job still running against the session
    busy_tasks: HashSet<MaintenanceTask>,

    event_tx: mpsc::UnboundedSender<SessionEnvelope>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    persist_tx: mpsc::UnboundedSender<PersistRequest>,
    inbox: Option<Inbox>,
}

impl Supervisor {
    /// Must be called from within a tokio runtime
    pub(crate) fn new(
        config: Arc<AgentConfig>,
        factory: Arc<dyn SessionFactory>,
        store: Arc<dyn SettingsStore>,
        settings: SettingsRecord,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (internal_tx, internal) = mpsc::unbounded_channel();
        let (tick_tx, ticks) = mpsc::unbounded_channel();

        let agent_id = config.agent.id.clone();
        let persist_tx = spawn_settings_writer(agent_id.clone(), store, internal_tx.clone());
        let policy = ReconnectPolicy::new(config.reconnect.max_attempts, config.base_delay());
        let scheduler = MaintenanceScheduler::new(config.maintenance.clone(), tick_tx);

        Self {
            agent_id,
            config,
            factory,
            policy,
            state: ConnectionState::Disconnected,
            liveness: Liveness::Alive,
            session: None,
            current_target: None,
            generation: 0,
            reconnect_attempts: 0,
            last_error: None,
            last_chat_at: None,
            settings,
            settings_revision: 0,
            unsaved_revision: None,
            pending: None,
            timer_epoch: 0,
            scheduler,
            busy_tasks: HashSet::new(),
            event_tx,
            internal_tx,
            persist_tx,
            inbox: Some(Inbox {
                commands,
                events,
                internal,
                ticks,
            }),
        }
    }

    pub(crate) async fn run(mut self) {
        let Some(mut inbox) = self.inbox.take() else {
            return;
        };
        info!(agent_id = %self.agent_id, "Supervisor started");

        loop {
            tokio::select! {
                command = inbox.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(envelope) = inbox.events.recv() => {
                    let span = crate::session_span!(
                        agent_id = %self.agent_id,
                        generation = envelope.generation,
                        event = envelope.event.name()
                    );
                    span.in_scope(|| self.handle_envelope(envelope));
                }
                Some(message) = inbox.internal.recv() => self.handle_internal(message),
                Some(tick) = inbox.ticks.recv() => {
                    let span = crate::maintenance_span!(
                        task = tick.task.as_str(),
                        epoch = tick.epoch
                    );
                    span.in_scope(|| self.handle_tick(tick));
                }
            }
        }

        info!(agent_id = %self.agent_id, "Supervisor stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start {
                target,
                origin,
                reply,
            } => {
                let _ = reply.send(self.start(target, origin));
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop());
            }
            Command::Restart { reply } => {
                let _ = reply.send(self.restart());
            }
            Command::Action { request, reply } => self.request_action(request, reply),
            Command::CollectItems { reply } => self.collect_items(reply),
            Command::SetWeather { weather, reply } => self.send_command(
                "set_weather",
                weather.command(),
                format!("Setting weather to {weather}"),
                reply,
            ),
            Command::SetTime { target, reply } => self.send_command(
                "set_time",
                target.command(),
                format!("Setting time to {target}"),
                reply,
            ),
            Command::SetKeepWeather {
                enabled,
                weather,
                reply,
            } => self.set_keep_weather(enabled, weather, reply),
            Command::SetKeepTime {
                enabled,
                target,
                reply,
            } => self.set_keep_time(enabled, target, reply),
            Command::ToggleAutoMovement { reply } => {
                let _ = reply.send(self.toggle_auto_movement());
            }
            Command::Status { reply } => {
                let snapshot = build_snapshot(
                    &self.status_inputs(),
                    self.session.as_deref(),
                    &self.config.status,
                );
                let _ = reply.send(snapshot);
            }
            Command::ConnectionStatus { reply } => {
                let _ = reply.send(connection_status(&self.status_inputs()));
            }
            Command::Settings { reply } => {
                let _ = reply.send(self.settings.clone());
            }
            // Intercepted by the run loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle operations
    // ------------------------------------------------------------------

    fn start(&mut self, target: ConnectionTarget, origin: StartOrigin) -> AgentResult<String> {
        let next = transition(self.state, &LifecycleEvent::StartRequested)?;
        self.cancel_pending();

        if origin != StartOrigin::Reconnect {
            self.reconnect_attempts = 0;
            let record = ConnectionRecord {
                host: target.host.clone(),
                port: target.port,
                user_disconnected: false,
            };
            if self.settings.connection.as_ref() != Some(&record) {
                self.update_settings(|settings| settings.connection = Some(record));
            }
        }

        self.generation += 1;
        self.current_target = Some(target.clone());
        self.liveness = Liveness::Alive;
        self.last_error = None;
        metrics().connection_attempt();

        let sink = EventSink::new(self.generation, self.event_tx.clone());
        let session = match self.factory.open(target.clone(), sink.clone()) {
            Ok(session) => session,
            Err(e) => {
                let message = e.to_string();
                error!(target = %target, error = %message, "Failed to open game session");
                self.set_state(next);
                self.on_terminated(LifecycleEvent::Failed, message.clone());
                return Err(AgentError::action_failed(message));
            }
        };

        self.session = Some(Arc::clone(&session));
        self.set_state(next);
        info!(
            target = %target,
            origin = ?origin,
            generation = self.generation,
            attempt = self.reconnect_attempts,
            "Connecting to game server"
        );

        tokio::spawn(async move {
            if let Err(e) = session.connect().await {
                sink.emit(SessionEvent::Error(e.to_string()));
            }
        });

        Ok("Bot connecting to server".to_string())
    }

    fn stop(&mut self) -> AgentResult<String> {
        if !self.state.is_active() {
            // A scheduled reconnect or restart counts as a session in progress
            if let Some(kind) = self.pending.as_ref().map(|p| p.kind) {
                self.cancel_pending();
                self.mark_user_disconnected();
                info!(pending = ?kind, "Pending reconnection cancelled");
                return Ok("Bot stopped successfully".to_string());
            }
        }

        let next = transition(self.state, &LifecycleEvent::StopRequested)?;
        self.cancel_pending();
        self.scheduler.stop_all();
        self.retire_session();
        self.set_state(next);
        self.liveness = Liveness::Alive;
        self.mark_user_disconnected();
        info!(agent_id = %self.agent_id, "Bot stopped by request");

        Ok("Bot stopped successfully".to_string())
    }

    fn restart(&mut self) -> AgentResult<String> {
        let target = self.current_target.clone().ok_or(AgentError::NoTargetKnown)?;

        if self.state.is_active() {
            self.stop()?;
        } else {
            self.cancel_pending();
        }

        let delay = self.config.restart_delay();
        self.schedule(PendingKind::Restart, delay, move |epoch| Internal::RestartDue {
            epoch,
            target,
        });
        info!(delay_ms = delay.as_millis() as u64, "Restart scheduled");

        Ok("Bot is restarting...".to_string())
    }

    async fn shutdown(&mut self) {
        self.cancel_pending();
        self.scheduler.stop_all();
        self.generation += 1;

        if let Some(session) = self.session.take() {
            match tokio::time::timeout(SHUTDOWN_DISCONNECT_TIMEOUT, session.disconnect()).await {
                Ok(Ok(())) => debug!("Session closed for shutdown"),
                Ok(Err(e)) => warn!(error = %e, "Session disconnect failed during shutdown"),
                Err(_) => warn!("Session disconnect timed out during shutdown"),
            }
        }
        self.set_state(ConnectionState::Disconnected);

        let (done, flushed) = oneshot::channel();
        if self.persist_tx.send(PersistRequest::Flush { done }).is_ok() {
            let _ = flushed.await;
        }
    }

    // ------------------------------------------------------------------
    // Session events
    // ------------------------------------------------------------------

    fn handle_envelope(&mut self, envelope: SessionEnvelope) {
        if envelope.generation != self.generation {
            debug!(
                generation = envelope.generation,
                current = self.generation,
                event = envelope.event.name(),
                "Dropping event from replaced session"
            );
            metrics().stale_event_dropped();
            return;
        }

        match envelope.event {
            SessionEvent::Connected => debug!("Transport link up, waiting for login"),
            SessionEvent::LoggedIn => self.on_login(),
            SessionEvent::Spawned => self.on_spawn(),
            SessionEvent::Died => self.on_death(),
            SessionEvent::Disconnected(reason) => {
                self.on_terminated(LifecycleEvent::Disconnected, reason)
            }
            SessionEvent::Error(message) => self.on_terminated(LifecycleEvent::Failed, message),
            SessionEvent::World(event) => self.on_world_event(event),
        }
    }

    fn on_login(&mut self) {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "Ignoring login outside of connecting state");
            return;
        }

        match transition(self.state, &LifecycleEvent::LoggedIn) {
            Ok(next) => self.set_state(next),
            Err(e) => {
                warn!(error = %e, "Login transition rejected");
                return;
            }
        }
        self.liveness = Liveness::Alive;
        self.reconnect_attempts = 0;
        self.last_error = None;
        metrics().logged_in();

        self.persist(PersistRequest::Load {
            revision: self.settings_revision,
        });
        self.reconcile_maintenance();
    }

    fn on_spawn(&mut self) {
        let was_dead = self.liveness.is_dead();
        self.liveness = Liveness::Alive;
        if was_dead {
            info!("Bot respawned");
        }

        self.reconcile_maintenance();
        self.enforce_environment(None);
    }

    fn on_death(&mut self) {
        if !self.liveness.is_dead() {
            info!("Bot died");
            metrics().died();
        }
        self.liveness = Liveness::Dead;
        self.reconcile_maintenance();
    }

    /// Unplanned end of the current session
    fn on_terminated(&mut self, event: LifecycleEvent, reason: String) {
        if !self.state.is_active() {
            debug!(state = %self.state, reason = %reason, "Ignoring termination of inactive session");
            return;
        }

        let next = match transition(self.state, &event) {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "Termination transition rejected");
                return;
            }
        };

        self.scheduler.stop_all();
        self.retire_session();
        self.liveness = Liveness::Alive;

        if event == LifecycleEvent::Failed {
            metrics().session_error();
            error!(error = %reason, "Game session error");
            self.last_error = Some(reason);
        } else {
            metrics().disconnected();
            warn!(reason = %reason, "Game session disconnected");
        }
        self.set_state(next);

        self.apply_reconnect_policy();
    }

    fn on_world_event(&mut self, event: WorldEvent) {
        match event {
            WorldEvent::Chat { username, message } => {
                debug!(username = %username, message = %message, "Chat received");
                self.last_chat_at = Some(Instant::now());

                if self.should_greet(&username, &message) {
                    if let Ok(session) = self.live_session() {
                        let greeting = ActionStep::Send(format!("Hello, {username}!"));
                        self.spawn_job(session, vec![greeting], JobKind::Greeting);
                    }
                }
            }
            WorldEvent::Health => debug!("Health changed"),
            WorldEvent::Rain => debug!("Weather changed"),
        }
    }

    fn should_greet(&self, username: &str, message: &str) -> bool {
        self.config.agent.greet_players
            && username != self.config.agent.username
            && message.to_lowercase().contains("hello bot")
    }

    // ------------------------------------------------------------------
    // Reconnection
    // ------------------------------------------------------------------

    fn apply_reconnect_policy(&mut self) {
        let persisted_target = self.settings.target();
        let decision = self.policy.decide(
            self.reconnect_attempts,
            persisted_target.as_ref(),
            self.settings.user_disconnected(),
        );

        match decision {
            ReconnectionDecision::Proceed {
                attempt,
                delay,
                target,
            } => {
                self.reconnect_attempts = attempt;
                metrics().reconnect_scheduled();
                info!(
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    target = %target,
                    "Reconnection scheduled"
                );
                self.schedule(PendingKind::Reconnect, delay, move |epoch| {
                    Internal::ReconnectDue { epoch, target }
                });
            }
            ReconnectionDecision::AbortMaxAttempts => {
                metrics().reconnects_exhausted();
                warn!(
                    attempts = self.reconnect_attempts,
                    "Reconnection attempts exhausted"
                );
            }
            ReconnectionDecision::AbortNoTarget => {
                info!("No persisted connection target, not reconnecting");
            }
            ReconnectionDecision::AbortUserDisconnected => {
                info!("Session was stopped by the user, not reconnecting");
            }
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::ReconnectDue { epoch, target } => {
                if !self.take_pending(epoch) {
                    return;
                }
                // A manual start may have won the race
                if self.state.is_active() {
                    debug!(state = %self.state, "Skipping reconnect, session already active");
                    return;
                }
                if let Err(e) = self.start(target, StartOrigin::Reconnect) {
                    warn!(error = %e, "Reconnect attempt could not start");
                }
            }
            Internal::RestartDue { epoch, target } => {
                if !self.take_pending(epoch) {
                    return;
                }
                if let Err(e) = self.start(target, StartOrigin::User) {
                    warn!(error = %e, "Restart could not start a new session");
                }
            }
            Internal::SettingsLoaded { revision, result } => {
                self.apply_loaded_settings(revision, result)
            }
            Internal::SettingsSaved {
                revision,
                succeeded,
            } => self.record_save_outcome(revision, succeeded),
            Internal::JobFinished {
                generation,
                kind,
                outcomes,
            } => self.on_job_finished(generation, kind, outcomes),
        }
    }

    /// Clear the pending slot if `epoch` belongs to it
    fn take_pending(&mut self, epoch: u64) -> bool {
        if epoch != self.timer_epoch {
            debug!(epoch, current = self.timer_epoch, "Ignoring cancelled timer");
            return false;
        }
        self.pending = None;
        true
    }

    fn schedule(
        &mut self,
        kind: PendingKind,
        delay: Duration,
        message: impl FnOnce(u64) -> Internal,
    ) {
        self.cancel_pending();
        let message = message(self.timer_epoch);
        let tx = self.internal_tx.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(message);
        });
        self.pending = Some(PendingTimer { kind, handle });
    }

    /// Abort any pending timer and invalidate messages it already queued
    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
            debug!(kind = ?pending.kind, "Pending timer cancelled");
        }
        self.timer_epoch += 1;
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    fn update_settings(&mut self, change: impl FnOnce(&mut SettingsRecord)) {
        change(&mut self.settings);
        self.settings_revision += 1;
        self.persist(PersistRequest::Save {
            record: self.settings.clone(),
            revision: self.settings_revision,
        });
    }

    fn record_save_outcome(&mut self, revision: u64, succeeded: bool) {
        match (succeeded, self.unsaved_revision) {
            (false, None) => self.unsaved_revision = Some(revision),
            (true, Some(oldest)) if revision >= oldest => {
                debug!(revision, "Settings saved, store is current again");
                self.unsaved_revision = None;
            }
            _ => {}
        }
    }

    fn mark_user_disconnected(&mut self) {
        if let Some(connection) = self.settings.connection.as_ref() {
            if connection.user_disconnected {
                return;
            }
            let connection = ConnectionRecord {
                user_disconnected: true,
                ..connection.clone()
            };
            self.update_settings(|settings| settings.connection = Some(connection));
        }
    }

    fn persist(&self, request: PersistRequest) {
        if self.persist_tx.send(request).is_err() {
            warn!(agent_id = %self.agent_id, "Settings writer is gone");
        }
    }

    fn apply_loaded_settings(
        &mut self,
        revision: u64,
        result: Result<Option<SettingsRecord>, StoreError>,
    ) {
        if revision != self.settings_revision {
            debug!(revision, current = self.settings_revision, "Discarding outdated settings load");
            return;
        }
        if self.unsaved_revision.is_some() {
            debug!("Store is behind in-memory settings, keeping in-memory values");
            return;
        }

        match result {
            Ok(Some(record)) => {
                debug!(
                    auto_movement = record.behavior.auto_movement_enabled,
                    keep_weather = record.behavior.keep_weather_enabled,
                    keep_time = record.behavior.keep_time_enabled,
                    "Behavior settings loaded"
                );
                self.settings = record;
                self.reconcile_maintenance();
            }
            Ok(None) => debug!("No persisted settings, keeping defaults"),
            Err(e) => warn!(error = %e, "Failed to load settings, keeping in-memory values"),
        }
    }

    fn set_keep_weather(
        &mut self,
        enabled: bool,
        weather: Option<WeatherType>,
        reply: Reply<AgentResult<String>>,
    ) {
        self.update_settings(|settings| {
            settings.behavior.keep_weather_enabled = enabled;
            if let Some(weather) = weather {
                settings.behavior.target_weather = weather;
            }
        });

        if !enabled {
            let _ = reply.send(Ok("Weather enforcement disabled".to_string()));
            return;
        }
        let message = format!(
            "Keeping weather at {}",
            self.settings.behavior.target_weather
        );
        self.enforce_environment(Some((message, reply)));
    }

    fn set_keep_time(
        &mut self,
        enabled: bool,
        target: Option<TimeTarget>,
        reply: Reply<AgentResult<String>>,
    ) {
        self.update_settings(|settings| {
            settings.behavior.keep_time_enabled = enabled;
            if let Some(target) = target {
                settings.behavior.target_time = target;
            }
        });

        if !enabled {
            let _ = reply.send(Ok("Time enforcement disabled".to_string()));
            return;
        }
        let message = format!("Keeping time at {}", self.settings.behavior.target_time);
        self.enforce_environment(Some((message, reply)));
    }

    /// Works while disconnected; the persisted value applies on next login
    fn toggle_auto_movement(&mut self) -> AgentResult<String> {
        let enabled = !self.settings.behavior.auto_movement_enabled;
        self.update_settings(|settings| settings.behavior.auto_movement_enabled = enabled);
        self.reconcile_maintenance();

        Ok(if enabled {
            "Automatic movement started".to_string()
        } else {
            "Automatic movement stopped".to_string()
        })
    }

    // ------------------------------------------------------------------
    // Actions and maintenance
    // ------------------------------------------------------------------

    fn live_session(&self) -> AgentResult<Arc<dyn GameSession>> {
        match (&self.session, self.state) {
            (Some(session), ConnectionState::Connected) => Ok(Arc::clone(session)),
            _ => Err(AgentError::NotConnected),
        }
    }

    fn request_action(&mut self, request: ActionRequest, reply: Reply<AgentResult<String>>) {
        let planned = self.live_session().and_then(|session| {
            let plan = request.plan(self.liveness, &session.current_inventory_slots())?;
            Ok((session, plan))
        });
        self.dispatch_action(request.name(), planned, reply);
    }

    fn collect_items(&mut self, reply: Reply<AgentResult<String>>) {
        let planned = self.live_session().and_then(|session| {
            let origin = session
                .current_position()
                .ok_or_else(|| AgentError::action_failed("Bot position is not known yet"))?;
            let plan = plan_collect(&session.current_entities(), origin)?;
            Ok((session, plan))
        });
        self.dispatch_action("collect_items", planned, reply);
    }

    fn send_command(
        &mut self,
        name: &'static str,
        text: String,
        message: String,
        reply: Reply<AgentResult<String>>,
    ) {
        let planned = self.live_session().map(|session| {
            let plan = ActionPlan {
                steps: vec![ActionStep::Send(text)],
                message,
                marks_dead: false,
            };
            (session, plan)
        });
        self.dispatch_action(name, planned, reply);
    }

    /// Run an accepted plan as a job; rejections are answered right away
    fn dispatch_action(
        &mut self,
        name: &'static str,
        planned: AgentResult<(Arc<dyn GameSession>, ActionPlan)>,
        reply: Reply<AgentResult<String>>,
    ) {
        match planned {
            Ok((session, plan)) => {
                let kind = JobKind::Action {
                    name,
                    message: plan.message,
                    marks_dead: plan.marks_dead,
                    reply,
                };
                self.spawn_job(session, plan.steps, kind);
            }
            Err(e) => {
                metrics().action_executed(name, false);
                let _ = reply.send(Err(e));
            }
        }
    }

    fn reconcile_maintenance(&mut self) {
        let allowed = maintenance_allowed(self.state, self.liveness);
        self.scheduler
            .reconcile(allowed, self.settings.behavior.auto_movement_enabled);
    }

    fn handle_tick(&mut self, tick: MaintenanceTick) {
        if !self.scheduler.is_current(&tick) {
            debug!("Ignoring tick from stopped ticker");
            return;
        }
        if !maintenance_allowed(self.state, self.liveness) {
            self.reconcile_maintenance();
            return;
        }
        if self.busy_tasks.contains(&tick.task) {
            debug!("Previous pass still running, skipping tick");
            return;
        }

        metrics().maintenance_tick();
        match tick.task {
            MaintenanceTask::Movement => self.idle_move(),
            MaintenanceTask::Environment => self.enforce_environment(None),
        }
    }

    fn idle_move(&mut self) {
        let Ok(session) = self.live_session() else {
            return;
        };
        let position = session.current_position();
        let action = choose_idle_action(&mut rand::thread_rng(), position);
        debug!(action = ?action, "Idle movement");

        let steps = match action {
            IdleAction::Look { yaw, pitch } => vec![ActionStep::Look { yaw, pitch }],
            IdleAction::MoveTo(goal) => vec![ActionStep::MoveTo(goal)],
            IdleAction::CollectItems => {
                let plan = position
                    .ok_or_else(|| AgentError::action_failed("Bot position is not known yet"))
                    .and_then(|origin| plan_collect(&session.current_entities(), origin));
                match plan {
                    Ok(plan) => plan.steps,
                    Err(e) => {
                        debug!(reason = %e, "Nothing to collect");
                        return;
                    }
                }
            }
        };
        self.spawn_job(session, steps, JobKind::Maintenance(MaintenanceTask::Movement));
    }

    /// Correct weather and time; `reply` is answered once the pass is done
    fn enforce_environment(&mut self, reply: Option<(String, Reply<AgentResult<String>>)>) {
        let pass = match self.live_session() {
            Ok(session) if !self.liveness.is_dead() => {
                let observed = WeatherType::observed(session.is_raining(), session.is_thundering());
                let commands = environment_commands(
                    &self.settings.behavior,
                    observed,
                    session.current_time_of_day(),
                );
                Some((session, commands)).filter(|(_, commands)| !commands.is_empty())
            }
            _ => None,
        };

        match (pass, reply) {
            (Some((session, commands)), reply) => {
                let steps = commands.into_iter().map(ActionStep::Send).collect();
                let kind = match reply {
                    Some((message, reply)) => JobKind::Enforce { message, reply },
                    None => JobKind::Maintenance(MaintenanceTask::Environment),
                };
                self.spawn_job(session, steps, kind);
            }
            (None, Some((message, reply))) => {
                let _ = reply.send(Ok(message));
            }
            (None, None) => {}
        }
    }

    /// Run `steps` against `session` off the supervisor task
    fn spawn_job(&mut self, session: Arc<dyn GameSession>, steps: Vec<ActionStep>, kind: JobKind) {
        // Environment corrections are independent; everything else stops at the first failure
        let keep_going = matches!(
            kind,
            JobKind::Enforce { .. } | JobKind::Maintenance(MaintenanceTask::Environment)
        );
        if let JobKind::Maintenance(task) = kind {
            self.busy_tasks.insert(task);
        }

        let generation = self.generation;
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcomes = run_steps(session.as_ref(), steps, keep_going).await;
            let _ = tx.send(Internal::JobFinished {
                generation,
                kind,
                outcomes,
            });
        });
    }

    fn on_job_finished(&mut self, generation: u64, kind: JobKind, outcomes: Vec<StepOutcome>) {
        let current = generation == self.generation;
        if !current {
            debug!(generation, current = self.generation, "Job finished for a replaced session");
        }
        let result = first_failure(&outcomes);

        match kind {
            JobKind::Action {
                name,
                message,
                marks_dead,
                reply,
            } => {
                metrics().action_executed(name, result.is_ok());
                if result.is_ok() {
                    info!(action = name, "Action sent");
                    if marks_dead && current {
                        self.on_death();
                    }
                }
                let _ = reply.send(result.map(|_| message));
            }
            JobKind::Greeting => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to greet player");
                }
            }
            JobKind::Maintenance(task) => {
                if current {
                    self.busy_tasks.remove(&task);
                }
                log_maintenance_outcomes(task, &outcomes);
            }
            JobKind::Enforce { message, reply } => {
                log_maintenance_outcomes(MaintenanceTask::Environment, &outcomes);
                let _ = reply.send(Ok(message));
            }
        }
    }

    fn status_inputs(&self) -> StatusInputs<'_> {
        StatusInputs {
            state: self.state,
            last_error: self.last_error.as_deref(),
            reconnect_attempts: self.reconnect_attempts,
            liveness: self.liveness,
            auto_moving: self.scheduler.is_running(MaintenanceTask::Movement),
            maintenance_active: self.scheduler.any_running(),
            behavior: &self.settings.behavior,
            last_chat_at: self.last_chat_at,
            username: &self.config.agent.username,
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            log_state_transition(self.state, next);
            self.state = next;
        }
        metrics().set_connection_state(next.as_str());
    }

    /// Drop the current handle and ignore anything it still reports
    fn retire_session(&mut self) {
        self.generation += 1;
        self.busy_tasks.clear();
        if let Some(session) = self.session.take() {
            tokio::spawn(async move {
                if let Err(e) = session.disconnect().await {
                    debug!(error = %e, "Retired session did not close cleanly");
                }
            });
        }
    }
}

async fn call<F>(future: F) -> AgentResult<()>
where
    F: std::future::Future<Output = Result<(), SessionError>>,
{
    match tokio::time::timeout(SESSION_CALL_TIMEOUT, future).await {
        Ok(result) => result.map_err(AgentError::from),
        Err(_) => Err(AgentError::action_failed("Game session did not respond")),
    }
}

async fn run_steps(
    session: &dyn GameSession,
    steps: Vec<ActionStep>,
    keep_going: bool,
) -> Vec<StepOutcome> {
    let mut outcomes = Vec::with_capacity(steps.len());
    for step in steps {
        let result = match &step {
            ActionStep::Send(text) => call(session.send_action(text)).await,
            ActionStep::Respawn => call(session.respawn()).await,
            ActionStep::Consume(slot) => call(session.consume(*slot)).await,
            ActionStep::MoveTo(goal) => call(session.move_to(*goal)).await,
            ActionStep::Look { yaw, pitch } => call(session.look(*yaw, *pitch)).await,
        };
        let failed = result.is_err();
        outcomes.push((step, result));
        if failed && !keep_going {
            break;
        }
    }
    outcomes
}

fn first_failure(outcomes: &[StepOutcome]) -> AgentResult<()> {
    match outcomes.iter().find_map(|(_, result)| result.as_ref().err()) {
        Some(e) => Err(e.clone()),
        None => Ok(()),
    }
}

fn log_maintenance_outcomes(task: MaintenanceTask, outcomes: &[StepOutcome]) {
    for (step, result) in outcomes {
        match result {
            Ok(()) if task == MaintenanceTask::Environment => {
                info!(step = ?step, "Environment corrected")
            }
            Ok(()) => {}
            Err(e) => {
                metrics().maintenance_failed();
                warn!(
                    task = task.as_str(),
                    step = ?step,
                    error = %e,
                    "Maintenance step failed, will retry next tick"
                );
            }
        }
    }
}

/// Serialize all store access through one task so loads observe prior saves
fn spawn_settings_writer(
    agent_id: String,
    store: Arc<dyn SettingsStore>,
    internal_tx: mpsc::UnboundedSender<Internal>,
) -> mpsc::UnboundedSender<PersistRequest> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            match request {
                PersistRequest::Save { record, revision } => {
                    let succeeded = match store.save(&agent_id, &record).await {
                        Ok(()) => true,
                        Err(e) => {
                            metrics().settings_save_failed();
                            warn!(
                                agent_id = %agent_id,
                                error = %e,
                                "Failed to save settings, in-memory values stay authoritative"
                            );
                            false
                        }
                    };
                    if internal_tx
                        .send(Internal::SettingsSaved {
                            revision,
                            succeeded,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                PersistRequest::Load { revision } => {
                    let result = store.load(&agent_id).await;
                    if internal_tx
                        .send(Internal::SettingsLoaded { revision, result })
                        .is_err()
                    {
                        break;
                    }
                }
                PersistRequest::Flush { done } => {
                    let _ = done.send(());
                }
            }
        }
        debug!(agent_id = %agent_id, "Settings writer stopped");
    });

    tx
}
