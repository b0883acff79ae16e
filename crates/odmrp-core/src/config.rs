use std::time::Duration;

pub const JOINQUERY_TYPE: u8 = 0x01;
pub const JOINREPLY_TYPE: u8 = 0x02;
pub const IPDATA_TYPE: u8 = 0x03;

/// Network-wide tunables, builder-style like the rest of this codebase's
/// config structs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub route_refresh: Duration,
    pub forwarding_timeout: Duration,
    pub default_ttl: u8,
    pub message_cache_size: usize,
    pub pending_queue_size: usize,
    pub tick_interval: Duration,
    pub verbose: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            route_refresh: Duration::from_millis(500),
            forwarding_timeout: Duration::from_millis(1500),
            default_ttl: 32,
            message_cache_size: 2048,
            pending_queue_size: 256,
            tick_interval: Duration::from_millis(1),
            verbose: false,
        }
    }
}

impl NetworkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route_refresh(mut self, d: Duration) -> Self {
        self.route_refresh = d;
        self
    }

    pub fn with_forwarding_timeout(mut self, d: Duration) -> Self {
        self.forwarding_timeout = d;
        self
    }

    pub fn with_default_ttl(mut self, ttl: u8) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_message_cache_size(mut self, size: usize) -> Self {
        self.message_cache_size = size;
        self
    }

    pub fn with_pending_queue_size(mut self, size: usize) -> Self {
        self.pending_queue_size = size;
        self
    }

    pub fn with_tick_interval(mut self, d: Duration) -> Self {
        self.tick_interval = d;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_constants() {
        let cfg = NetworkConfig::default();
        assert_eq!(cfg.route_refresh, Duration::from_millis(500));
        assert_eq!(cfg.forwarding_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.default_ttl, 32);
        assert_eq!(cfg.message_cache_size, 2048);
        assert_eq!(cfg.pending_queue_size, 256);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = NetworkConfig::new()
            .with_default_ttl(8)
            .with_verbose(true);
        assert_eq!(cfg.default_ttl, 8);
        assert!(cfg.verbose);
    }
}
