use std::time::Duration;

/// Default key namespace root shared by all workers in a cluster.
pub const DEFAULT_PREFIX: &str = "async-job";

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Key namespace root; every store key is derived from it.
    pub prefix: String,
    /// Period of the delayed-job sweeper.
    pub resolution: Duration,
    /// Heartbeat interval. Also paces the abandoned-job recovery scan.
    pub delay: Duration,
    /// Liveness TTL multiplier: a worker is presumed dead once its
    /// heartbeat key has been silent for `delay * factor`. Must be >= 1.
    pub factor: f64,
    /// Upper bound on concurrently running job handlers per worker.
    pub max_in_flight: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            resolution: Duration::from_secs(10),
            delay: Duration::from_secs(5),
            factor: 2.0,
            max_in_flight: 32,
        }
    }
}

impl BrokerConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn with_resolution(mut self, resolution: Duration) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// TTL written on every heartbeat, rounded up to whole seconds.
    pub fn liveness_ttl(&self) -> Duration {
        Duration::from_secs((self.delay.as_secs_f64() * self.factor).ceil() as u64)
    }
}
