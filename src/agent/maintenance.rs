//! Maintenance scheduler
//!
//! Two recurring tasks, idle movement and environment enforcement, each held
//! in its own slot. Ticker tasks only post [`MaintenanceTick`] messages back to
//! the supervisor, which performs the actual work; a ticker never touches the
//! session itself. Every start bumps an epoch so ticks already queued by a
//! stopped ticker can be recognised and ignored.

use super::daycycle::WeatherType;
use crate::config::MaintenanceSection;
use crate::session::{BlockPos, Position};
use crate::store::BehaviorSettings;
use rand::Rng;
use std::f32::consts::{FRAC_PI_2, TAU};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaintenanceTask {
    Movement,
    Environment,
}

impl MaintenanceTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceTask::Movement => "movement",
            MaintenanceTask::Environment => "environment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceTick {
    pub task: MaintenanceTask,
    pub epoch: u64,
}

/// What one idle-movement tick does
#[derive(Debug, Clone, PartialEq)]
pub enum IdleAction {
    Look { yaw: f32, pitch: f32 },
    MoveTo(BlockPos),
    CollectItems,
}

/// Weighted pick: 30% look around, 40% short walk, 30% collect items
pub fn choose_idle_action<R: Rng>(rng: &mut R, position: Option<Position>) -> IdleAction {
    let roll: f64 = rng.gen();

    if roll < 0.3 {
        return random_look(rng);
    }
    if roll < 0.7 {
        return match position {
            Some(position) => {
                let dx = rng.gen_range(-5..5);
                let dz = rng.gen_range(-5..5);
                IdleAction::MoveTo(position.block().offset(dx, 0, dz))
            }
            None => random_look(rng),
        };
    }
    IdleAction::CollectItems
}

fn random_look<R: Rng>(rng: &mut R) -> IdleAction {
    IdleAction::Look {
        yaw: rng.gen_range(0.0..TAU),
        pitch: rng.gen_range(-FRAC_PI_2..FRAC_PI_2),
    }
}

/// Commands needed to bring weather and time back to their targets
///
/// Empty when nothing is enforced or everything already matches, so repeated
/// ticks are no-ops.
pub fn environment_commands(
    behavior: &BehaviorSettings,
    observed_weather: WeatherType,
    time_of_day: i64,
) -> Vec<String> {
    let mut commands = Vec::new();

    if behavior.keep_weather_enabled && observed_weather != behavior.target_weather {
        commands.push(behavior.target_weather.command());
    }
    if behavior.keep_time_enabled && !behavior.target_time.is_satisfied_by(time_of_day) {
        commands.push(behavior.target_time.command());
    }

    commands
}

struct Ticker {
    epoch: u64,
    handle: JoinHandle<()>,
}

/// Holds at most one running ticker per task
pub struct MaintenanceScheduler {
    config: MaintenanceSection,
    tick_tx: mpsc::UnboundedSender<MaintenanceTick>,
    movement: Option<Ticker>,
    environment: Option<Ticker>,
    next_epoch: u64,
}

impl MaintenanceScheduler {
    pub fn new(config: MaintenanceSection, tick_tx: mpsc::UnboundedSender<MaintenanceTick>) -> Self {
        Self {
            config,
            tick_tx,
            movement: None,
            environment: None,
            next_epoch: 0,
        }
    }

    fn slot(&mut self, task: MaintenanceTask) -> &mut Option<Ticker> {
        match task {
            MaintenanceTask::Movement => &mut self.movement,
            MaintenanceTask::Environment => &mut self.environment,
        }
    }

    pub fn is_running(&self, task: MaintenanceTask) -> bool {
        match task {
            MaintenanceTask::Movement => self.movement.is_some(),
            MaintenanceTask::Environment => self.environment.is_some(),
        }
    }

    pub fn any_running(&self) -> bool {
        self.movement.is_some() || self.environment.is_some()
    }

    /// True if the tick came from the ticker currently in the slot
    pub fn is_current(&self, tick: &MaintenanceTick) -> bool {
        let slot = match tick.task {
            MaintenanceTask::Movement => &self.movement,
            MaintenanceTask::Environment => &self.environment,
        };
        slot.as_ref().is_some_and(|t| t.epoch == tick.epoch)
    }

    /// Start a ticker; returns false if one is already running
    pub fn start(&mut self, task: MaintenanceTask) -> bool {
        if self.is_running(task) {
            return false;
        }

        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let handle = match task {
            MaintenanceTask::Movement => self.spawn_movement_ticker(epoch),
            MaintenanceTask::Environment => self.spawn_environment_ticker(epoch),
        };
        *self.slot(task) = Some(Ticker { epoch, handle });
        debug!(task = task.as_str(), epoch, "Maintenance task started");
        true
    }

    /// Stop a ticker; returns false if none was running
    pub fn stop(&mut self, task: MaintenanceTask) -> bool {
        match self.slot(task).take() {
            Some(ticker) => {
                ticker.handle.abort();
                debug!(task = task.as_str(), epoch = ticker.epoch, "Maintenance task stopped");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        self.stop(MaintenanceTask::Movement);
        self.stop(MaintenanceTask::Environment);
    }

    /// Bring the running set in line with the gate
    ///
    /// Environment runs iff maintenance is allowed; movement additionally
    /// needs `movement_enabled`.
    pub fn reconcile(&mut self, allowed: bool, movement_enabled: bool) {
        if allowed {
            self.start(MaintenanceTask::Environment);
        } else {
            self.stop(MaintenanceTask::Environment);
        }

        if allowed && movement_enabled {
            self.start(MaintenanceTask::Movement);
        } else {
            self.stop(MaintenanceTask::Movement);
        }
    }

    fn movement_delay(&self) -> Duration {
        let min = self.config.movement_interval_min_ms;
        let max = self.config.movement_interval_max_ms.max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    fn spawn_movement_ticker(&self, epoch: u64) -> JoinHandle<()> {
        let tx = self.tick_tx.clone();
        let min = self.config.movement_interval_min_ms;
        let max = self.config.movement_interval_max_ms.max(min);
        let first_delay = self.movement_delay();

        tokio::spawn(async move {
            let mut delay = first_delay;
            loop {
                tokio::time::sleep(delay).await;
                let tick = MaintenanceTick {
                    task: MaintenanceTask::Movement,
                    epoch,
                };
                if tx.send(tick).is_err() {
                    break;
                }
                delay = Duration::from_millis(rand::thread_rng().gen_range(min..=max));
            }
        })
    }

    fn spawn_environment_ticker(&self, epoch: u64) -> JoinHandle<()> {
        let tx = self.tick_tx.clone();
        let period = Duration::from_millis(self.config.environment_interval_ms);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // First tick completes immediately, skip it

            loop {
                interval.tick().await;
                let tick = MaintenanceTick {
                    task: MaintenanceTask::Environment,
                    epoch,
                };
                if tx.send(tick).is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for MaintenanceScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}
