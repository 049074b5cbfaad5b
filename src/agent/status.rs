//! Point-in-time status snapshots
//!
//! Everything here is recomputed per request from the live session handle;
//! nothing is cached between calls.

use super::daycycle::{describe_time, DayLabel, WeatherType};
use super::state::{ConnectionState, Liveness};
use crate::config::StatusSection;
use crate::session::{EntityInfo, EntityKind, GameSession, InventorySlot, Position};
use crate::store::BehaviorSettings;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Chat seen within this window counts as "chatting"
pub const CHAT_ACTIVITY_WINDOW: Duration = Duration::from_secs(5);

const RELEVANT_KINDS: [EntityKind; 7] = [
    EntityKind::Player,
    EntityKind::Animal,
    EntityKind::Hostile,
    EntityKind::WaterCreature,
    EntityKind::Ambient,
    EntityKind::Mob,
    EntityKind::Living,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyEntity {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Rounded to one decimal
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Activity {
    Offline,
    Dead,
    AutoMoving,
    Chatting,
    Idle,
}

/// Fields only present while connected
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStatus {
    pub health: f32,
    pub food: f32,
    pub oxygen: f32,
    pub position: Option<Position>,
    pub weather: WeatherType,
    pub server_time: String,
    pub time_label: DayLabel,
    pub inventory: Vec<InventorySlot>,
    pub nearby_entities: Vec<NearbyEntity>,
    pub behavior_settings: BehaviorSettings,
    pub activity: Activity,
    pub is_dead: bool,
    pub is_auto_moving: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub online: bool,
    pub connection_state: ConnectionState,
    pub last_error: Option<String>,
    pub reconnect_attempts: u32,
    #[serde(flatten)]
    pub live: Option<LiveStatus>,
}

/// Reply of `getConnectionState`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub status: ConnectionState,
    pub error: Option<String>,
    pub is_auto_moving: bool,
    pub is_dead: bool,
    pub reconnect_attempts: u32,
    /// Any maintenance ticker is running
    pub maintenance_active: bool,
}

/// How the agent recognises its own entity in the world list
#[derive(Debug, Clone, Copy)]
pub struct SelfIdentity<'a> {
    pub id: Option<u64>,
    pub username: &'a str,
}

impl SelfIdentity<'_> {
    fn matches(&self, entity: &EntityInfo, distance: f64) -> bool {
        match self.id {
            Some(id) => entity.id == id,
            // No self id in the snapshot: match by player name, else the player standing on the origin
            None => {
                entity.kind == EntityKind::Player
                    && (entity.username.as_deref() == Some(self.username) || distance == 0.0)
            }
        }
    }
}

/// Supervisor-owned inputs to a snapshot
#[derive(Debug, Clone)]
pub struct StatusInputs<'a> {
    pub state: ConnectionState,
    pub last_error: Option<&'a str>,
    pub reconnect_attempts: u32,
    pub liveness: Liveness,
    pub auto_moving: bool,
    pub maintenance_active: bool,
    pub behavior: &'a BehaviorSettings,
    pub last_chat_at: Option<Instant>,
    pub username: &'a str,
}

/// Build a snapshot; never fails regardless of state
pub fn build_snapshot(
    inputs: &StatusInputs<'_>,
    session: Option<&dyn GameSession>,
    config: &StatusSection,
) -> StatusSnapshot {
    let live = match (inputs.state, session) {
        (ConnectionState::Connected, Some(session)) => Some(live_status(inputs, session, config)),
        _ => None,
    };

    StatusSnapshot {
        online: live.is_some(),
        connection_state: inputs.state,
        last_error: inputs.last_error.map(str::to_string),
        reconnect_attempts: inputs.reconnect_attempts,
        live,
    }
}

pub fn connection_status(inputs: &StatusInputs<'_>) -> ConnectionStatus {
    ConnectionStatus {
        is_connected: inputs.state == ConnectionState::Connected,
        status: inputs.state,
        error: inputs.last_error.map(str::to_string),
        is_auto_moving: inputs.auto_moving,
        is_dead: inputs.liveness.is_dead(),
        reconnect_attempts: inputs.reconnect_attempts,
        maintenance_active: inputs.maintenance_active,
    }
}

fn live_status(
    inputs: &StatusInputs<'_>,
    session: &dyn GameSession,
    config: &StatusSection,
) -> LiveStatus {
    let vitals = session.current_health();
    let position = session.current_position();
    let time = describe_time(session.current_time_of_day());

    let nearby_entities = match position {
        Some(origin) => nearby_entities(
            &session.current_entities(),
            origin,
            SelfIdentity {
                id: session.self_entity_id(),
                username: inputs.username,
            },
            config.nearby_radius,
            config.nearby_limit,
        ),
        None => Vec::new(),
    };

    LiveStatus {
        health: vitals.health,
        food: vitals.food,
        oxygen: vitals.oxygen,
        position,
        weather: WeatherType::observed(session.is_raining(), session.is_thundering()),
        server_time: time.clock,
        time_label: time.label,
        inventory: inventory_entries(session.current_inventory_slots()),
        nearby_entities,
        behavior_settings: inputs.behavior.clone(),
        activity: activity(
            inputs.state,
            inputs.liveness,
            inputs.auto_moving,
            inputs.last_chat_at,
            Instant::now(),
        ),
        is_dead: inputs.liveness.is_dead(),
        is_auto_moving: inputs.auto_moving,
    }
}

/// Relevant entities within `radius` of `origin`, closest first
pub fn nearby_entities(
    entities: &[EntityInfo],
    origin: Position,
    me: SelfIdentity<'_>,
    radius: f64,
    limit: usize,
) -> Vec<NearbyEntity> {
    let mut nearby: Vec<(f64, &EntityInfo)> = entities
        .iter()
        .filter(|e| RELEVANT_KINDS.contains(&e.kind))
        .filter_map(|e| e.position.map(|p| (origin.distance_to(&p), e)))
        .filter(|(distance, e)| *distance <= radius && !me.matches(e, *distance))
        .collect();

    nearby.sort_by(|a, b| a.0.total_cmp(&b.0));

    nearby
        .into_iter()
        .take(limit)
        .map(|(distance, e)| NearbyEntity {
            id: e.id,
            name: e.label(),
            kind: e.kind.as_str().to_string(),
            distance: (distance * 10.0).round() / 10.0,
        })
        .collect()
}

/// Occupied slots ordered by slot index
pub fn inventory_entries(mut slots: Vec<InventorySlot>) -> Vec<InventorySlot> {
    slots.retain(|s| s.count > 0);
    slots.sort_by_key(|s| s.slot);
    slots
}

pub fn activity(
    state: ConnectionState,
    liveness: Liveness,
    auto_moving: bool,
    last_chat_at: Option<Instant>,
    now: Instant,
) -> Activity {
    if state != ConnectionState::Connected {
        return Activity::Offline;
    }
    if liveness.is_dead() {
        return Activity::Dead;
    }
    if auto_moving {
        return Activity::AutoMoving;
    }
    match last_chat_at {
        Some(at) if now.saturating_duration_since(at) < CHAT_ACTIVITY_WINDOW => Activity::Chatting,
        _ => Activity::Idle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const UNKNOWN_SELF: SelfIdentity<'static> = SelfIdentity {
        id: None,
        username: "AfkBot",
    };

    fn entity(id: u64, kind: EntityKind, x: f64) -> EntityInfo {
        EntityInfo {
            id,
            kind,
            name: Some(format!("entity-{id}")),
            username: None,
            object_type: None,
            position: Some(Position::new(x, 64.0, 0.0)),
        }
    }

    #[test]
    fn test_nearby_entities_sorted_filtered_and_self_excluded() {
        let origin = Position::new(0.0, 64.0, 0.0);
        let entities = vec![
            entity(1, EntityKind::Player, 5.0),
            entity(2, EntityKind::Hostile, 40.0),
            entity(3, EntityKind::Animal, 12.3),
            entity(99, EntityKind::Player, 0.0),
        ];

        let nearby = nearby_entities(
            &entities,
            origin,
            SelfIdentity {
                id: Some(99),
                ..UNKNOWN_SELF
            },
            30.0,
            10,
        );

        let distances: Vec<f64> = nearby.iter().map(|e| e.distance).collect();
        assert_eq!(distances, vec![5.0, 12.3]);
        assert_eq!(nearby[0].id, 1);
        assert_eq!(nearby[1].kind, "animal");
    }

    #[test]
    fn test_self_excluded_without_self_id() {
        let origin = Position::new(0.0, 64.0, 0.0);
        let mut by_name = entity(1, EntityKind::Player, 2.0);
        by_name.username = Some("AfkBot".to_string());
        let entities = vec![
            by_name,
            entity(2, EntityKind::Player, 0.0),
            entity(3, EntityKind::Player, 4.0),
            entity(4, EntityKind::Animal, 0.0),
        ];

        let nearby = nearby_entities(&entities, origin, UNKNOWN_SELF, 30.0, 10);

        let ids: Vec<u64> = nearby.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn test_irrelevant_kinds_and_missing_positions_skipped() {
        let origin = Position::default();
        let mut no_position = entity(4, EntityKind::Mob, 1.0);
        no_position.position = None;
        let entities = vec![
            entity(1, EntityKind::Object, 1.0),
            entity(2, EntityKind::Other, 1.0),
            no_position,
            entity(3, EntityKind::Living, 2.0),
        ];

        let nearby = nearby_entities(&entities, origin, UNKNOWN_SELF, 30.0, 10);

        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].id, 3);
    }

    #[test]
    fn test_nearby_truncated_to_limit_after_sorting() {
        let origin = Position::new(0.0, 64.0, 0.0);
        let entities: Vec<_> = (0..15)
            .rev()
            .map(|i| entity(i, EntityKind::Animal, i as f64 + 1.0))
            .collect();

        let nearby = nearby_entities(&entities, origin, UNKNOWN_SELF, 30.0, 10);

        assert_eq!(nearby.len(), 10);
        assert_eq!(nearby[0].distance, 1.0);
        assert_eq!(nearby[9].distance, 10.0);
    }

    #[test]
    fn test_distance_rounding() {
        let origin = Position::default();
        let mut e = entity(1, EntityKind::Player, 0.0);
        e.position = Some(Position::new(3.0, 4.04, 0.0));

        let nearby = nearby_entities(&[e], origin, UNKNOWN_SELF, 30.0, 10);

        assert_eq!(nearby[0].distance, 5.0);
    }

    #[test]
    fn test_inventory_entries_keep_slot_index() {
        let slots = vec![
            InventorySlot {
                slot: 40,
                name: "bread".to_string(),
                count: 2,
                display_name: "Bread".to_string(),
            },
            InventorySlot {
                slot: 36,
                name: "stone".to_string(),
                count: 64,
                display_name: "Stone".to_string(),
            },
            InventorySlot {
                slot: 37,
                name: "air".to_string(),
                count: 0,
                display_name: "Air".to_string(),
            },
        ];

        let entries = inventory_entries(slots);

        let indices: Vec<u32> = entries.iter().map(|s| s.slot).collect();
        assert_eq!(indices, vec![36, 40]);
    }

    #[test]
    fn test_activity_priority() {
        let now = Instant::now();
        let recent = Some(now);

        assert_eq!(
            activity(ConnectionState::Connecting, Liveness::Alive, false, None, now),
            Activity::Offline
        );
        assert_eq!(
            activity(ConnectionState::Connected, Liveness::Dead, true, recent, now),
            Activity::Dead
        );
        assert_eq!(
            activity(ConnectionState::Connected, Liveness::Alive, true, recent, now),
            Activity::AutoMoving
        );
        assert_eq!(
            activity(ConnectionState::Connected, Liveness::Alive, false, recent, now),
            Activity::Chatting
        );
        assert_eq!(
            activity(ConnectionState::Connected, Liveness::Alive, false, None, now),
            Activity::Idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_chatting_expires_after_window() {
        let chat_at = Instant::now();
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(
            activity(ConnectionState::Connected, Liveness::Alive, false, Some(chat_at), Instant::now()),
            Activity::Idle
        );
    }

    #[test]
    fn test_offline_snapshot_shape() {
        let behavior = BehaviorSettings::default();
        let inputs = StatusInputs {
            state: ConnectionState::Error,
            last_error: Some("ECONNREFUSED"),
            reconnect_attempts: 3,
            liveness: Liveness::Alive,
            auto_moving: false,
            maintenance_active: false,
            behavior: &behavior,
            last_chat_at: None,
            username: "AfkBot",
        };

        let snapshot = build_snapshot(&inputs, None, &StatusSection::default());
        let value = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(value["online"], false);
        assert_eq!(value["connectionState"], "error");
        assert_eq!(value["lastError"], "ECONNREFUSED");
        assert_eq!(value["reconnectAttempts"], 3);
        assert!(value.get("health").is_none());
    }

    proptest! {
        #[test]
        fn nearby_output_is_sorted_and_bounded(
            xs in proptest::collection::vec(-100.0f64..100.0, 0..40),
            radius in 1.0f64..60.0,
        ) {
            let entities: Vec<_> = xs
                .iter()
                .enumerate()
                .map(|(i, x)| entity(i as u64, EntityKind::Animal, *x))
                .collect();

            let nearby = nearby_entities(&entities, Position::new(0.0, 64.0, 0.0), UNKNOWN_SELF, radius, 10);

            prop_assert!(nearby.len() <= 10);
            for pair in nearby.windows(2) {
                prop_assert!(pair[0].distance <= pair[1].distance);
            }
            for e in &nearby {
                prop_assert!(e.distance <= (radius * 10.0).round() / 10.0 + 0.05);
            }
        }
    }
}
