use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::Config;

pub mod leaderboard;
pub mod live_session;
pub mod registry;
pub mod runner;

use registry::{RegistrySettings, SessionRegistry};

pub struct AppState {
    pub config: Config,
    pub registry: SessionRegistry,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let settings = RegistrySettings {
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            live_options: live_session::LiveOptions {
                live_leaderboard_size: config.live_leaderboard_size,
                final_leaderboard_size: config.final_leaderboard_size,
                max_participants: config.max_participants,
                advance_on_all_answered: config.advance_on_all_answered,
            },
            archive_retention: chrono::Duration::seconds(config.archive_retention_seconds),
        };
        tracing::info!(
            "Session registry initialized: tick_interval={}ms, retention={}s",
            config.tick_interval_ms,
            config.archive_retention_seconds
        );

        Ok(Self {
            config,
            registry: SessionRegistry::new(settings),
        })
    }

    /// Periodically evicts completed sessions past their retention.
    pub fn start_archive_sweeper(self: &Arc<Self>, interval: Duration) {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = state.registry.sweep_archived(Utc::now()).await;
                if removed > 0 {
                    tracing::debug!("Archive sweep removed {} session(s)", removed);
                }
            }
        });
    }
}
