use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;

/// Configuration for the view service.
#[derive(Debug, Clone)]
pub struct ViewConfig {
    pub listen_addr: SocketAddr,
    /// Expected interval between server heartbeats; also the tick period.
    pub ping_interval: Duration,
    /// Number of missed intervals after which a server is considered dead.
    pub dead_pings: u32,
    /// Address for the JSON status dashboard (optional).
    pub dashboard_addr: Option<SocketAddr>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            // SAFETY: hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:50070"
                .parse()
                .expect("default listen address is valid"),
            ping_interval: Duration::from_millis(100),
            dead_pings: 5,
            dashboard_addr: None,
        }
    }
}

impl ViewConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_dead_pings(mut self, dead_pings: u32) -> Self {
        self.dead_pings = dead_pings;
        self
    }

    pub fn with_dashboard_addr(mut self, addr: SocketAddr) -> Self {
        self.dashboard_addr = Some(addr);
        self
    }

    /// Elapsed time after which a server with no heartbeat is treated as failed.
    pub fn dead_threshold(&self) -> Duration {
        self.ping_interval * self.dead_pings
    }
}

/// Retry behavior for failed job assignments.
///
/// The dispatcher retries a failed job number on a freshly acquired worker;
/// this policy decides how long to wait before each retry and whether to
/// keep going.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// Retry immediately, forever. A job number is never abandoned.
    Unlimited,
    /// Give up on a job after `max_attempts` failed attempts.
    Capped { max_attempts: u32 },
    /// Exponential backoff from `base` up to `max`, with uniform jitter.
    Backoff { base: Duration, max: Duration },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Unlimited
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based). `None` means give up.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::Unlimited => Some(Duration::ZERO),
            RetryPolicy::Capped { max_attempts } => {
                if attempt < *max_attempts {
                    Some(Duration::ZERO)
                } else {
                    None
                }
            }
            RetryPolicy::Backoff { base, max } => {
                let exp = attempt.saturating_sub(1).min(16);
                let delay = base.saturating_mul(1u32 << exp).min(*max);
                let mut rng = rand::thread_rng();
                let jittered = rng.gen_range(delay.as_millis() / 2..=delay.as_millis());
                Some(Duration::from_millis(jittered as u64))
            }
        }
    }
}

/// Configuration for the job dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Address the worker registration endpoint listens on.
    pub listen_addr: SocketAddr,
    pub retry: RetryPolicy,
    /// Per-worker timeout for the shutdown RPC, so the shutdown sweep
    /// cannot block indefinitely on an unreachable worker.
    pub shutdown_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            // SAFETY: hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:50080"
                .parse()
                .expect("default listen address is valid"),
            retry: RetryPolicy::default(),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

impl DispatchConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
