use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::view::idle::IdleQueue;

/// An assignment of the primary and backup roles, tagged with a
/// monotonically increasing view number. An empty string means the role is
/// unassigned; `viewnum == 0` only ever describes the pre-bootstrap state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct View {
    pub viewnum: u64,
    pub primary: String,
    pub backup: String,
}

impl View {
    pub fn has_primary(&self) -> bool {
        !self.primary.is_empty()
    }

    pub fn has_backup(&self) -> bool {
        !self.backup.is_empty()
    }

    pub fn is_primary(&self, server: &str) -> bool {
        self.has_primary() && self.primary == server
    }

    pub fn is_backup(&self, server: &str) -> bool {
        self.has_backup() && self.backup == server
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let primary = if self.has_primary() {
            self.primary.as_str()
        } else {
            "-"
        };
        let backup = if self.has_backup() {
            self.backup.as_str()
        } else {
            "-"
        };
        write!(
            f,
            "view {} (primary: {}, backup: {})",
            self.viewnum, primary, backup
        )
    }
}

/// The view service state machine.
///
/// Owns the current view, an optional proposed (next) view, the
/// acknowledgment flag, per-server liveness timestamps, and the idle-server
/// queue. Purely synchronous: every entry point takes `now` explicitly and
/// computes the transition without blocking, so the whole machine can be
/// driven deterministically under test. Callers are responsible for running
/// each operation inside one exclusive critical section.
///
/// # View transition invariants
///
/// - `viewnum` increases by exactly 1 on every transition and never repeats.
/// - A proposed view becomes current only once the *outgoing* view's
///   primary has acknowledged that view; promotion resets the flag.
/// - A server holds at most one of {primary, backup, idle} in the current
///   view; promotion clears the promoted roles out of the idle queue.
/// - An expired server is never a promotion candidate until it heartbeats
///   again, and then it re-enters through the state machine rather than
///   resuming its old role.
#[derive(Debug)]
pub struct ViewState {
    current: View,
    proposed: Option<View>,
    acknowledged: bool,
    last_heartbeat: HashMap<String, Instant>,
    idle: IdleQueue,
    dead_threshold: Duration,
}

impl ViewState {
    pub fn new(dead_threshold: Duration) -> Self {
        Self {
            current: View::default(),
            proposed: None,
            acknowledged: false,
            last_heartbeat: HashMap::new(),
            idle: IdleQueue::new(),
            dead_threshold,
        }
    }

    /// Process one heartbeat and reply with the current view.
    ///
    /// The reply never exposes a proposed-but-unconfirmed transition:
    /// callers must only ever observe views whose predecessor the primary
    /// has acknowledged.
    pub fn heartbeat(&mut self, server_id: &str, reported_viewnum: u64, now: Instant) -> View {
        self.last_heartbeat.insert(server_id.to_string(), now);

        // Bootstrap: the first server ever seen becomes primary of view 1
        // outright. There is no prior committed view to acknowledge.
        if self.current.viewnum == 0 {
            self.current = View {
                viewnum: 1,
                primary: server_id.to_string(),
                backup: String::new(),
            };
            self.acknowledged = false;
            tracing::info!(primary = %server_id, "Bootstrapped view 1");
            return self.current.clone();
        }

        if self.current.is_primary(server_id) {
            if reported_viewnum == self.current.viewnum {
                // The primary confirms it is operating at the current view.
                self.acknowledged = true;
            } else if reported_viewnum == 0 {
                // The primary restarted and lost its state: swap the backup
                // in and demote the caller behind it.
                let mut next = self.base();
                next.primary = next.backup.clone();
                next.backup = server_id.to_string();
                next.viewnum = self.current.viewnum + 1;
                tracing::info!(
                    restarted = %server_id,
                    promoted = %next.primary,
                    viewnum = next.viewnum,
                    "Primary restarted, staging demotion"
                );
                self.stage(next);
            }
        } else {
            let mut base = self.base();
            if !base.has_backup() {
                base.backup = server_id.to_string();
                base.viewnum = self.current.viewnum + 1;
                tracing::info!(
                    backup = %server_id,
                    viewnum = base.viewnum,
                    "Staging view with new backup"
                );
                self.stage(base);
            } else if !self.current.is_backup(server_id) {
                // Spare capacity waiting for a future vacancy.
                self.idle.push(server_id);
            }
        }

        self.current.clone()
    }

    /// Pure read of the current view.
    pub fn query(&self) -> View {
        self.current.clone()
    }

    /// Periodic liveness check. Replaces an expired backup, or fails over
    /// from an expired primary to the backup; at most one of the two
    /// actions fires per tick, and either is gated on acknowledgment like
    /// any other transition.
    pub fn tick(&mut self, now: Instant) {
        if self.current.viewnum == 0 {
            return;
        }

        if self.current.has_backup() && self.expired(&self.current.backup, now) {
            let mut next = self.base();
            next.backup = self.pop_live_idle(now).unwrap_or_default();
            next.viewnum = self.current.viewnum + 1;
            tracing::info!(
                expired = %self.current.backup,
                replacement = %next.backup,
                viewnum = next.viewnum,
                "Backup expired, staging replacement"
            );
            self.stage(next);
        } else if self.current.has_primary() && self.expired(&self.current.primary, now) {
            let mut next = self.base();
            next.primary = next.backup.clone();
            next.backup = self.pop_live_idle(now).unwrap_or_default();
            next.viewnum = self.current.viewnum + 1;
            tracing::info!(
                expired = %self.current.primary,
                promoted = %next.primary,
                backup = %next.backup,
                viewnum = next.viewnum,
                "Primary expired, staging failover"
            );
            self.stage(next);
        }
    }

    pub fn current(&self) -> &View {
        &self.current
    }

    pub fn proposed(&self) -> Option<&View> {
        self.proposed.as_ref()
    }

    pub fn acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn idle_servers(&self) -> Vec<String> {
        self.idle.iter().map(|s| s.to_string()).collect()
    }

    /// Every known server with its liveness at `now`, sorted by name.
    pub fn liveness(&self, now: Instant) -> Vec<(String, bool)> {
        let mut servers: Vec<(String, bool)> = self
            .last_heartbeat
            .keys()
            .map(|s| (s.clone(), !self.expired(s, now)))
            .collect();
        servers.sort();
        servers
    }

    /// The view a new transition builds on: the in-flight proposal if one
    /// exists, else a copy of the current view.
    fn base(&self) -> View {
        self.proposed
            .clone()
            .unwrap_or_else(|| self.current.clone())
    }

    /// Stage `next` as the proposed view, then promote it immediately if
    /// the outgoing view has been acknowledged. Promotion resets the flag,
    /// so no two unconfirmed transitions are ever in flight.
    fn stage(&mut self, next: View) {
        self.proposed = Some(next);
        if !self.acknowledged {
            return;
        }
        if let Some(next) = self.proposed.take() {
            // The promoted roles stop being spare capacity.
            if next.has_primary() {
                self.idle.remove(&next.primary);
            }
            if next.has_backup() {
                self.idle.remove(&next.backup);
            }
            tracing::info!(
                viewnum = next.viewnum,
                primary = %next.primary,
                backup = %next.backup,
                "View promoted"
            );
            self.current = next;
            self.acknowledged = false;
        }
    }

    fn expired(&self, server: &str, now: Instant) -> bool {
        match self.last_heartbeat.get(server) {
            Some(seen) => now.saturating_duration_since(*seen) > self.dead_threshold,
            None => true,
        }
    }

    fn pop_live_idle(&mut self, now: Instant) -> Option<String> {
        let threshold = self.dead_threshold;
        let beats = &self.last_heartbeat;
        self.idle.pop_live(|server| {
            beats
                .get(server)
                .map_or(false, |seen| now.saturating_duration_since(*seen) <= threshold)
        })
    }
}
