//! MQTT-backed game session handle
//!
//! Each `BridgeSession` owns one broker connection for exactly one game
//! session. Commands are published to the sidecar; lifecycle notifications and
//! world snapshots come back on the event and world topics.

use super::codec::{BridgeCodec, BridgeCommand, EventRoute, Inbound};
use super::connection::{configure_bridge_options, BridgeTopics, LinkState};
use crate::config::BridgeSection;
use crate::session::{
    BlockPos, ConnectionTarget, EntityInfo, EventSink, GameSession, InventorySlot, Position,
    SessionError, SessionEvent, SessionFactory, Vitals, WorldState,
};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Opens one [`BridgeSession`] per start
pub struct BridgeSessionFactory {
    agent_id: String,
    username: String,
    config: BridgeSection,
}

impl BridgeSessionFactory {
    pub fn new(agent_id: &str, username: &str, config: BridgeSection) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            username: username.to_string(),
            config,
        }
    }
}

impl SessionFactory for BridgeSessionFactory {
    fn open(
        &self,
        target: ConnectionTarget,
        sink: EventSink,
    ) -> Result<Arc<dyn GameSession>, SessionError> {
        let session = BridgeSession::new(
            &self.agent_id,
            &self.username,
            target,
            &self.config,
            sink,
        )?;
        Ok(Arc::new(session))
    }
}

pub struct BridgeSession {
    agent_id: String,
    username: String,
    target: ConnectionTarget,
    topics: BridgeTopics,
    connect_timeout: Duration,
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    world: Arc<RwLock<WorldState>>,
    sink: EventSink,
    link_tx: Arc<watch::Sender<LinkState>>,
    link_rx: watch::Receiver<LinkState>,
    shutdown_tx: watch::Sender<bool>,
    closing: Arc<AtomicBool>,
}

impl BridgeSession {
    pub fn new(
        agent_id: &str,
        username: &str,
        target: ConnectionTarget,
        config: &BridgeSection,
        sink: EventSink,
    ) -> Result<Self, SessionError> {
        let mqtt_options = configure_bridge_options(agent_id, sink.generation(), config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 64);
        let (link_tx, link_rx) = watch::channel(LinkState::Connecting);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            agent_id: agent_id.to_string(),
            username: username.to_string(),
            target,
            topics: BridgeTopics::new(&config.topic_prefix, agent_id),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            client,
            event_loop: Mutex::new(Some(event_loop)),
            loop_handle: Mutex::new(None),
            world: Arc::new(RwLock::new(WorldState::default())),
            sink,
            link_tx: Arc::new(link_tx),
            link_rx,
            shutdown_tx,
            closing: Arc::new(AtomicBool::new(false)),
        })
    }

    fn world(&self) -> RwLockReadGuard<'_, WorldState> {
        self.world.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn publish(&self, command: BridgeCommand) -> Result<(), SessionError> {
        if matches!(*self.link_rx.borrow(), LinkState::Disconnected(_)) {
            return Err(SessionError::Closed);
        }

        let payload = BridgeCodec::encode_command(&command)?;
        self.client
            .publish(self.topics.command.clone(), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| SessionError::PublishFailed(e.to_string()))?;

        debug!(agent_id = %self.agent_id, command = ?command, "Published bridge command");
        Ok(())
    }

    fn spawn_event_loop(&self, mut event_loop: EventLoop) -> JoinHandle<()> {
        let agent_id = self.agent_id.clone();
        let topics = self.topics.clone();
        let world = self.world.clone();
        let sink = self.sink.clone();
        let link_tx = self.link_tx.clone();
        let closing = self.closing.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(agent_id = %agent_id, generation = sink.generation(), "Starting bridge event loop");
            let mut acknowledged = false;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    polled = event_loop.poll() => {
                        match polled {
                            Ok(event) => match BridgeCodec::route_mqtt_event(&event) {
                                EventRoute::ConnectionAcknowledged => {
                                    acknowledged = true;
                                    let _ = link_tx.send(LinkState::Connected);
                                }
                                EventRoute::MessageReceived { topic, payload, retain } => {
                                    Self::handle_inbound(&topics, &world, &sink, &topic, &payload, retain);
                                }
                                EventRoute::Disconnected => {
                                    let _ = link_tx.send(LinkState::Disconnected(
                                        "Broker disconnected".to_string(),
                                    ));
                                    if acknowledged && !closing.load(Ordering::SeqCst) {
                                        sink.emit(SessionEvent::Error(
                                            "Bridge broker disconnected".to_string(),
                                        ));
                                    }
                                    break;
                                }
                                EventRoute::SubscriptionConfirmed => {
                                    debug!(agent_id = %agent_id, "Bridge subscription confirmed");
                                }
                                EventRoute::InfrastructureEvent(event_str) => {
                                    debug!(target: "bridge_transport", "MQTT event: {}", event_str);
                                }
                                EventRoute::OutgoingEvent => {}
                            },
                            Err(e) => {
                                let reason = e.to_string();
                                let _ = link_tx.send(LinkState::Disconnected(reason.clone()));
                                if closing.load(Ordering::SeqCst) {
                                    debug!(agent_id = %agent_id, "Bridge closed: {}", reason);
                                } else if acknowledged {
                                    error!(agent_id = %agent_id, error = %reason, "Bridge connection lost");
                                    sink.emit(SessionEvent::Error(format!(
                                        "Bridge connection lost: {reason}"
                                    )));
                                }
                                break;
                            }
                        }
                    }
                }
            }

            info!(agent_id = %agent_id, generation = sink.generation(), "Bridge event loop stopped");
        })
    }

    fn handle_inbound(
        topics: &BridgeTopics,
        world: &RwLock<WorldState>,
        sink: &EventSink,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) {
        match BridgeCodec::decode_inbound(topics, topic, payload, retain) {
            Ok(Some(Inbound::Event(event))) => {
                debug!(event = event.name(), "Bridge event received");
                if !sink.emit(event) {
                    debug!("Supervisor gone, dropping bridge event");
                }
            }
            Ok(Some(Inbound::World(snapshot))) => {
                let mut guard = world.write().unwrap_or_else(|poisoned| poisoned.into_inner());
                *guard = *snapshot;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(topic = %topic, "Dropping malformed bridge payload: {}", e);
            }
        }
    }

    /// Wait for ConnAck with timeout
    async fn wait_for_link(
        mut link_rx: watch::Receiver<LinkState>,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let result = tokio::time::timeout(timeout, async {
            loop {
                match &*link_rx.borrow_and_update() {
                    LinkState::Connected => return Ok(()),
                    LinkState::Disconnected(reason) => {
                        return Err(SessionError::ConnectionFailed(reason.clone()));
                    }
                    LinkState::Connecting => {}
                }
                if link_rx.changed().await.is_err() {
                    return Err(SessionError::ConnectionFailed(
                        "Link state channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err(SessionError::ConnectionFailed(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }
}

#[async_trait]
impl GameSession for BridgeSession {
    fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    async fn connect(&self) -> Result<(), SessionError> {
        let event_loop = self
            .event_loop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| SessionError::ConnectionFailed("Event loop already started".to_string()))?;

        let handle = self.spawn_event_loop(event_loop);
        *self
            .loop_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);

        Self::wait_for_link(self.link_rx.clone(), self.connect_timeout).await?;

        for topic in self.topics.inbound() {
            self.client
                .subscribe(topic, QoS::AtLeastOnce)
                .await
                .map_err(|e| SessionError::SubscriptionFailed(e.to_string()))?;
        }

        info!(
            agent_id = %self.agent_id,
            target = %self.target,
            "Bridge link up, requesting game connection"
        );

        self.publish(BridgeCommand::Connect {
            host: self.target.host.clone(),
            port: self.target.port,
            username: self.username.clone(),
        })
        .await
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        self.closing.store(true, Ordering::SeqCst);

        if let Err(e) = self.publish(BridgeCommand::Disconnect).await {
            debug!(agent_id = %self.agent_id, "Skipping disconnect command: {}", e);
        }
        if let Err(e) = self.client.disconnect().await {
            debug!(agent_id = %self.agent_id, "Broker disconnect request failed: {}", e);
        }

        let handle = self
            .loop_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(mut handle) = handle {
            match tokio::time::timeout(Duration::from_secs(2), &mut handle).await {
                Ok(Ok(())) => debug!("Bridge event loop shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("Bridge event loop ended with error: {}", e);
                }
                Err(_) => {
                    warn!("Bridge event loop didn't shut down gracefully, forcing abort");
                    let _ = self.shutdown_tx.send(true);
                    handle.abort();
                }
                _ => {}
            }
        }

        let _ = self
            .link_tx
            .send(LinkState::Disconnected("Client disconnected".to_string()));
        info!(agent_id = %self.agent_id, "Bridge session closed");
        Ok(())
    }

    async fn send_action(&self, text: &str) -> Result<(), SessionError> {
        self.publish(BridgeCommand::Chat {
            text: text.to_string(),
        })
        .await
    }

    async fn look(&self, yaw: f32, pitch: f32) -> Result<(), SessionError> {
        self.publish(BridgeCommand::Look { yaw, pitch }).await
    }

    async fn move_to(&self, goal: BlockPos) -> Result<(), SessionError> {
        self.publish(BridgeCommand::MoveTo {
            x: goal.x,
            y: goal.y,
            z: goal.z,
        })
        .await
    }

    async fn respawn(&self) -> Result<(), SessionError> {
        self.publish(BridgeCommand::Respawn).await
    }

    async fn consume(&self, slot: u32) -> Result<(), SessionError> {
        self.publish(BridgeCommand::Consume { slot }).await
    }

    fn current_position(&self) -> Option<Position> {
        self.world().position
    }

    fn current_health(&self) -> Vitals {
        self.world().vitals
    }

    fn current_inventory_slots(&self) -> Vec<InventorySlot> {
        self.world().inventory.clone()
    }

    fn current_entities(&self) -> Vec<EntityInfo> {
        self.world().entities.clone()
    }

    fn current_time_of_day(&self) -> i64 {
        self.world().time_of_day
    }

    fn is_raining(&self) -> bool {
        self.world().raining
    }

    fn is_thundering(&self) -> bool {
        self.world().thundering
    }

    fn self_entity_id(&self) -> Option<u64> {
        self.world().self_id
    }
}
