//! Thread-safe metrics collection
//!
//! Atomic counters for the session lifecycle and maintenance, plus per-action
//! statistics behind a mutex.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

pub struct MetricsCollector {
    // Session lifecycle
    connection_attempts: AtomicU64,
    logins: AtomicU64,
    disconnects: AtomicU64,
    session_errors: AtomicU64,
    stale_events_dropped: AtomicU64,
    reconnects_scheduled: AtomicU64,
    reconnects_exhausted: AtomicU64,
    deaths: AtomicU64,

    // Maintenance
    maintenance_ticks: AtomicU64,
    maintenance_failures: AtomicU64,

    // Actions
    actions_sent: AtomicU64,
    actions_failed: AtomicU64,
    action_stats: Mutex<BTreeMap<String, ActionStats>>,

    settings_save_failures: AtomicU64,

    connection_state: Mutex<String>,
    state_transitions: AtomicU64,
    uptime_start: AtomicU64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ActionStats {
    pub executions: u64,
    pub failures: u64,
    pub last_execution: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: u64,
    pub uptime_seconds: u64,
    pub connection_state: String,
    pub state_transitions: u64,
    pub session: SessionMetrics,
    pub maintenance: MaintenanceMetrics,
    pub actions: ActionMetrics,
    pub settings_save_failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionMetrics {
    pub connection_attempts: u64,
    pub logins: u64,
    pub disconnects: u64,
    pub errors: u64,
    pub stale_events_dropped: u64,
    pub reconnects_scheduled: u64,
    pub reconnects_exhausted: u64,
    pub deaths: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceMetrics {
    pub ticks: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionMetrics {
    pub sent: u64,
    pub failed: u64,
    pub by_action: BTreeMap<String, ActionStats>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            connection_attempts: AtomicU64::new(0),
            logins: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            session_errors: AtomicU64::new(0),
            stale_events_dropped: AtomicU64::new(0),
            reconnects_scheduled: AtomicU64::new(0),
            reconnects_exhausted: AtomicU64::new(0),
            deaths: AtomicU64::new(0),
            maintenance_ticks: AtomicU64::new(0),
            maintenance_failures: AtomicU64::new(0),
            actions_sent: AtomicU64::new(0),
            actions_failed: AtomicU64::new(0),
            action_stats: Mutex::new(BTreeMap::new()),
            settings_save_failures: AtomicU64::new(0),
            connection_state: Mutex::new("disconnected".to_string()),
            state_transitions: AtomicU64::new(0),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    pub fn connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn logged_in(&self) {
        self.logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_error(&self) {
        self.session_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stale_event_dropped(&self) {
        self.stale_events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnects_exhausted(&self) {
        self.reconnects_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn died(&self) {
        self.deaths.fetch_add(1, Ordering::Relaxed);
    }

    pub fn maintenance_tick(&self) {
        self.maintenance_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn maintenance_failed(&self) {
        self.maintenance_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn settings_save_failed(&self) {
        self.settings_save_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one requested action
    pub fn action_executed(&self, action: &str, success: bool) {
        if success {
            self.actions_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.actions_failed.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut stats) = self.action_stats.lock() {
            let entry = stats.entry(action.to_string()).or_default();
            entry.executions += 1;
            entry.last_execution = current_timestamp();
            if !success {
                entry.failures += 1;
            }
        }
    }

    pub fn set_connection_state(&self, state: &str) {
        if let Ok(mut current) = self.connection_state.lock() {
            if *current != state {
                self.state_transitions.fetch_add(1, Ordering::Relaxed);
                *current = state.to_string();
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let connection_state = self
            .connection_state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| "unknown".to_string());
        let by_action = self
            .action_stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();

        MetricsSnapshot {
            timestamp: now,
            uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            connection_state,
            state_transitions: self.state_transitions.load(Ordering::Relaxed),
            session: SessionMetrics {
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                logins: self.logins.load(Ordering::Relaxed),
                disconnects: self.disconnects.load(Ordering::Relaxed),
                errors: self.session_errors.load(Ordering::Relaxed),
                stale_events_dropped: self.stale_events_dropped.load(Ordering::Relaxed),
                reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
                reconnects_exhausted: self.reconnects_exhausted.load(Ordering::Relaxed),
                deaths: self.deaths.load(Ordering::Relaxed),
            },
            maintenance: MaintenanceMetrics {
                ticks: self.maintenance_ticks.load(Ordering::Relaxed),
                failures: self.maintenance_failures.load(Ordering::Relaxed),
            },
            actions: ActionMetrics {
                sent: self.actions_sent.load(Ordering::Relaxed),
                failed: self.actions_failed.load(Ordering::Relaxed),
                by_action,
            },
            settings_save_failures: self.settings_save_failures.load(Ordering::Relaxed),
        }
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
