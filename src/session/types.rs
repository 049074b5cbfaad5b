//! World data exchanged with the game session
//!
//! The core never interprets these beyond distance maths and filtering; they
//! are whatever the protocol side reports.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host/port of the game server a session connects to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
}

impl ConnectionTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in world units
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Integer block coordinates containing this position
    pub fn block(&self) -> BlockPos {
        BlockPos {
            x: self.x.floor() as i64,
            y: self.y.floor() as i64,
            z: self.z.floor() as i64,
        }
    }
}

/// Block coordinates used for movement goals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl BlockPos {
    pub fn offset(&self, dx: i64, dy: i64, dz: i64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }
}

/// Health, hunger and air of the agent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Vitals {
    pub health: f32,
    pub food: f32,
    pub oxygen: f32,
}

/// One occupied inventory slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySlot {
    pub slot: u32,
    pub name: String,
    pub count: u32,
    pub display_name: String,
}

/// Coarse entity category as reported by the protocol side
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Animal,
    Hostile,
    WaterCreature,
    Ambient,
    Mob,
    Living,
    /// Non-living objects; dropped items are objects with `object_type = "Item"`
    Object,
    #[serde(other)]
    Other,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Player => "player",
            EntityKind::Animal => "animal",
            EntityKind::Hostile => "hostile",
            EntityKind::WaterCreature => "water_creature",
            EntityKind::Ambient => "ambient",
            EntityKind::Mob => "mob",
            EntityKind::Living => "living",
            EntityKind::Object => "object",
            EntityKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub id: u64,
    pub kind: EntityKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
}

impl EntityInfo {
    /// Best human-readable label: username, then name, then kind
    pub fn label(&self) -> String {
        self.username
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| self.kind.as_str().to_string())
    }

    pub fn is_dropped_item(&self) -> bool {
        self.kind == EntityKind::Object && self.object_type.as_deref() == Some("Item")
    }
}

/// Latest full picture of the world as seen by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldState {
    #[serde(default)]
    pub self_id: Option<u64>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(flatten)]
    pub vitals: Vitals,
    #[serde(default)]
    pub time_of_day: i64,
    #[serde(default)]
    pub raining: bool,
    #[serde(default)]
    pub thundering: bool,
    #[serde(default)]
    pub inventory: Vec<InventorySlot>,
    #[serde(default)]
    pub entities: Vec<EntityInfo>,
}
