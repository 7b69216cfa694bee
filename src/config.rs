//! Process configuration. Production startup uses [`Config::default`],
//! which reproduces the fixed constants the original design hardcodes
//! (listen port, worker count, log path, cache capacity); tests override
//! individual fields to bind an ephemeral port or a temp log file.

use crate::cache;
use crate::pool;

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_port: u16,
    pub num_workers: usize,
    pub log_path: String,
    pub cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: 12345,
            num_workers: pool::NUM_WORKERS,
            log_path: "/var/log/erss/proxy.log".to_string(),
            cache_capacity: cache::CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_fixed_constants() {
        let config = Config::default();
        assert_eq!(config.listen_port, 12345);
        assert_eq!(config.num_workers, 100);
        assert_eq!(config.cache_capacity, 10_240);
        assert_eq!(config.log_path, "/var/log/erss/proxy.log");
    }
}
