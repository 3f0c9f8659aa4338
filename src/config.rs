//! Runtime configuration
//!
//! All tunables consumed by the orchestration core, loaded from the
//! environment with conservative defaults.

use std::time::Duration;

/// Configuration surface consumed by the orchestration core
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Maximum tool-use iterations per turn
    pub max_iterations: u32,
    /// Wall-clock deadline per turn
    pub turn_deadline: Duration,
    /// Pending-action time-to-live
    pub pending_action_ttl: Duration,
    /// Conversation lock lease; a crashed turn self-heals after this
    pub lock_ttl: Duration,
    /// Pacing delay before every loop iteration after the first
    pub pacing_delay: Duration,
    /// Database path for the durable record store
    pub db_path: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            turn_deadline: Duration::from_secs(120),
            pending_action_ttl: Duration::from_secs(3600),
            lock_ttl: Duration::from_secs(30),
            pacing_delay: Duration::from_millis(500),
            db_path: default_db_path(),
        }
    }
}

impl BotConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_iterations: env_parse("RELAYBOT_MAX_ITERATIONS", defaults.max_iterations),
            turn_deadline: Duration::from_secs(env_parse(
                "RELAYBOT_TURN_DEADLINE_SECS",
                defaults.turn_deadline.as_secs(),
            )),
            pending_action_ttl: Duration::from_secs(env_parse(
                "RELAYBOT_PENDING_TTL_SECS",
                defaults.pending_action_ttl.as_secs(),
            )),
            lock_ttl: Duration::from_secs(env_parse(
                "RELAYBOT_LOCK_TTL_SECS",
                defaults.lock_ttl.as_secs(),
            )),
            pacing_delay: Duration::from_millis(env_parse(
                "RELAYBOT_PACING_DELAY_MS",
                u64::try_from(defaults.pacing_delay.as_millis()).unwrap_or(500),
            )),
            db_path: std::env::var("RELAYBOT_DB_PATH").unwrap_or(defaults.db_path),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    format!("{home}/.relaybot/relaybot.db")
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = BotConfig::default();
        assert!(config.max_iterations > 0);
        assert!(config.lock_ttl < config.turn_deadline);
        assert!(config.lock_ttl.as_secs() < 60, "lock TTL must stay short");
    }
}
