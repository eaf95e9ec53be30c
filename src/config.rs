use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    /// Countdown cadence for live sessions.
    pub tick_interval_ms: u64,
    pub max_participants: usize,
    pub live_leaderboard_size: usize,
    pub final_leaderboard_size: usize,
    pub advance_on_all_answered: bool,
    /// How long completed sessions stay queryable before eviction.
    pub archive_retention_seconds: i64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let tick_interval_ms = settings
            .get_int("quiz.tick_interval_ms")
            .ok()
            .or_else(|| {
                env::var("QUIZ_TICK_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .filter(|v| *v > 0)
            .unwrap_or(1000) as u64;

        let max_participants = settings
            .get_int("quiz.max_participants")
            .ok()
            .or_else(|| {
                env::var("QUIZ_MAX_PARTICIPANTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .filter(|v| *v > 0)
            .unwrap_or(500) as usize;

        let live_leaderboard_size = settings
            .get_int("quiz.live_leaderboard_size")
            .ok()
            .filter(|v| *v > 0)
            .unwrap_or(5) as usize;

        let final_leaderboard_size = settings
            .get_int("quiz.final_leaderboard_size")
            .ok()
            .filter(|v| *v > 0)
            .unwrap_or(10) as usize;

        let advance_on_all_answered = settings
            .get_bool("quiz.advance_on_all_answered")
            .ok()
            .or_else(|| {
                env::var("QUIZ_ADVANCE_ON_ALL_ANSWERED")
                    .ok()
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            })
            .unwrap_or(false);

        let archive_retention_seconds = settings
            .get_int("quiz.archive_retention_seconds")
            .ok()
            .or_else(|| {
                env::var("QUIZ_ARCHIVE_RETENTION_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .filter(|v| *v > 0)
            .unwrap_or(1800);

        Ok(Config {
            bind_addr,
            tick_interval_ms,
            max_participants,
            live_leaderboard_size,
            final_leaderboard_size,
            advance_on_all_answered,
            archive_retention_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_config_file() {
        let config = Config::load().expect("default config should load");
        assert_eq!(config.tick_interval_ms, 1000);
        assert_eq!(config.live_leaderboard_size, 5);
        assert_eq!(config.final_leaderboard_size, 10);
        assert!(!config.advance_on_all_answered);
    }
}
