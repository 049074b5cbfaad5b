//! One-shot actions and their command rendering
//!
//! An [`ActionRequest`] is turned into an [`ActionPlan`]: a list of steps the
//! supervisor runs against the live session plus the message reported back on
//! success. Planning is pure so preconditions are testable without a session.

use super::state::Liveness;
use crate::error::{AgentError, AgentResult};
use crate::session::{BlockPos, EntityInfo, InventorySlot, Position};
use serde::{Deserialize, Serialize};

/// Items the agent may eat, in no particular order of preference
pub const FOOD_ITEMS: [&str; 20] = [
    "apple",
    "bread",
    "cooked_beef",
    "cooked_chicken",
    "cooked_porkchop",
    "carrot",
    "baked_potato",
    "cooked_cod",
    "cooked_salmon",
    "golden_apple",
    "enchanted_golden_apple",
    "cake",
    "cookie",
    "melon_slice",
    "dried_kelp",
    "beef",
    "chicken",
    "porkchop",
    "mutton",
    "rabbit",
];

const CLEAR_EFFECTS: &str = "/effect clear @s";

/// `{success, message}` reply of every mutating operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
}

impl ActionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl From<AgentResult<String>> for ActionResult {
    fn from(result: AgentResult<String>) -> Self {
        match result {
            Ok(message) => ActionResult::success(message),
            Err(e) => e.to_action_result(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    Kill,
    Heal,
    Respawn,
    /// Clear effects and apply saturation
    Feed,
    /// Eat the first food item found in the inventory
    FeedFood,
    Starve,
    /// Raw chat line, sent as-is
    Chat(String),
    /// Slash command without the leading slash
    Command(String),
    Teleport { x: f64, y: f64, z: f64 },
}

/// One call against the session handle
#[derive(Debug, Clone, PartialEq)]
pub enum ActionStep {
    Send(String),
    Respawn,
    Consume(u32),
    MoveTo(BlockPos),
    Look { yaw: f32, pitch: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionPlan {
    pub steps: Vec<ActionStep>,
    pub message: String,
    /// Mark the agent dead as soon as the plan has been sent
    pub marks_dead: bool,
}

impl ActionPlan {
    fn new(steps: Vec<ActionStep>, message: impl Into<String>) -> Self {
        Self {
            steps,
            message: message.into(),
            marks_dead: false,
        }
    }
}

impl ActionRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ActionRequest::Kill => "kill",
            ActionRequest::Heal => "heal",
            ActionRequest::Respawn => "respawn",
            ActionRequest::Feed => "feed",
            ActionRequest::FeedFood => "feed_food",
            ActionRequest::Starve => "starve",
            ActionRequest::Chat(_) => "chat",
            ActionRequest::Command(_) => "command",
            ActionRequest::Teleport { .. } => "teleport",
        }
    }

    /// Check preconditions and render the steps for this action
    pub fn plan(&self, liveness: Liveness, inventory: &[InventorySlot]) -> AgentResult<ActionPlan> {
        let plan = match self {
            ActionRequest::Kill => {
                if liveness.is_dead() {
                    return Err(AgentError::action_failed("Bot is already dead"));
                }
                ActionPlan {
                    marks_dead: true,
                    ..ActionPlan::new(vec![ActionStep::Send("/kill".to_string())], "Bot killed")
                }
            }
            ActionRequest::Heal => ActionPlan::new(
                vec![ActionStep::Send(
                    "/effect give @s minecraft:regeneration 10 5".to_string(),
                )],
                "Applied regeneration effect",
            ),
            ActionRequest::Respawn => {
                if !liveness.is_dead() {
                    return Err(AgentError::action_failed("Bot is not dead"));
                }
                ActionPlan::new(vec![ActionStep::Respawn], "Bot respawning")
            }
            ActionRequest::Feed => ActionPlan::new(
                vec![
                    ActionStep::Send(CLEAR_EFFECTS.to_string()),
                    ActionStep::Send("/effect give @s minecraft:saturation 30 50".to_string()),
                ],
                "Applied saturation effect and cleared negative effects",
            ),
            ActionRequest::FeedFood => {
                let food = find_food(inventory)
                    .ok_or_else(|| AgentError::action_failed("No food found in inventory"))?;
                ActionPlan::new(
                    vec![
                        ActionStep::Send(CLEAR_EFFECTS.to_string()),
                        ActionStep::Consume(food.slot),
                    ],
                    format!("Eating {} and cleared negative effects", food.name),
                )
            }
            ActionRequest::Starve => ActionPlan::new(
                vec![
                    ActionStep::Send(CLEAR_EFFECTS.to_string()),
                    ActionStep::Send("/effect give @s minecraft:hunger 30 255".to_string()),
                ],
                "Applied hunger effect and cleared positive effects",
            ),
            ActionRequest::Chat(text) => {
                if text.trim().is_empty() {
                    return Err(AgentError::invalid_parameter("Message cannot be empty"));
                }
                ActionPlan::new(vec![ActionStep::Send(text.clone())], "Message sent")
            }
            ActionRequest::Command(command) => {
                let command = command.trim().trim_start_matches('/');
                if command.is_empty() {
                    return Err(AgentError::invalid_parameter("Command cannot be empty"));
                }
                ActionPlan::new(
                    vec![ActionStep::Send(format!("/{command}"))],
                    format!("Command executed: /{command}"),
                )
            }
            ActionRequest::Teleport { x, y, z } => {
                if ![x, y, z].iter().all(|c| c.is_finite()) {
                    return Err(AgentError::invalid_parameter(
                        "Teleport coordinates must be numbers",
                    ));
                }
                let command = format!("tp @s {x} {y} {z}");
                ActionPlan::new(
                    vec![ActionStep::Send(format!("/{command}"))],
                    format!("Command executed: /{command}"),
                )
            }
        };
        Ok(plan)
    }
}

/// First inventory slot holding something edible
pub fn find_food(inventory: &[InventorySlot]) -> Option<&InventorySlot> {
    inventory
        .iter()
        .filter(|slot| slot.count > 0)
        .find(|slot| FOOD_ITEMS.contains(&slot.name.as_str()))
}

/// Plan a walk to the closest dropped item
pub fn plan_collect(entities: &[EntityInfo], origin: Position) -> AgentResult<ActionPlan> {
    let items: Vec<(&EntityInfo, Position)> = entities
        .iter()
        .filter(|e| e.is_dropped_item())
        .filter_map(|e| e.position.map(|p| (e, p)))
        .collect();

    let closest = items
        .iter()
        .min_by(|a, b| origin.distance_to(&a.1).total_cmp(&origin.distance_to(&b.1)))
        .ok_or_else(|| AgentError::action_failed("No items found nearby"))?;

    Ok(ActionPlan::new(
        vec![ActionStep::MoveTo(closest.1.block())],
        format!("Moving to collect {} items", items.len()),
    ))
}
