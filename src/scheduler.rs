//! The two timers that drive the pipeline.
//!
//! The feed check is coarse (it fetches every member feed) and the
//! announcement dispatch is fine (it posts at most one announcement per
//! tick). They run independently: a slow feed check never delays
//! dispatching, and overlapping feed ticks are tolerated because ingestion
//! is idempotent.

use crate::announce::{dispatch_tick, ChannelSet};
use crate::config::Config;
use crate::ingest;
use crate::pocket::PocketClient;
use crate::storage::Database;
use std::sync::Arc;
use tokio::time::{interval, Duration};

pub struct Scheduler {
    db: Database,
    client: reqwest::Client,
    config: Arc<Config>,
    channels: Arc<ChannelSet>,
    pocket: Option<PocketClient>,
}

impl Scheduler {
    pub fn new(
        db: Database,
        client: reqwest::Client,
        config: Arc<Config>,
        channels: Arc<ChannelSet>,
        pocket: Option<PocketClient>,
    ) -> Self {
        Self {
            db,
            client,
            config,
            channels,
            pocket,
        }
    }

    /// Run both timers until the process is stopped. Neither loop can exit:
    /// every tick catches its own failures.
    pub async fn run(self) {
        tracing::info!(
            feed_check_minutes = self.config.feed_check_interval_minutes,
            dispatch_minutes = self.config.dispatch_interval_minutes,
            "Schedulers started"
        );

        let feed_task = {
            let db = self.db.clone();
            let client = self.client.clone();
            let config = Arc::clone(&self.config);
            let pocket = self.pocket.clone();
            tokio::spawn(async move {
                let mut timer = interval(minutes(config.feed_check_interval_minutes));
                loop {
                    timer.tick().await;
                    ingest::check_feeds(&db, &client, &config, pocket.as_ref()).await;
                }
            })
        };

        let dispatch_task = {
            let db = self.db.clone();
            let channels = Arc::clone(&self.channels);
            let config = Arc::clone(&self.config);
            tokio::spawn(async move {
                let mut timer = interval(minutes(config.dispatch_interval_minutes));
                loop {
                    timer.tick().await;
                    dispatch_tick(&db, &channels).await;
                }
            })
        };

        let _ = tokio::join!(feed_task, dispatch_task);
    }

    /// One feed-check tick followed by one dispatch tick, then return.
    /// Lets operators drive the pipeline from cron instead of running the
    /// daemon.
    pub async fn run_once(&self) {
        ingest::check_feeds(&self.db, &self.client, &self.config, self.pocket.as_ref()).await;
        dispatch_tick(&self.db, &self.channels).await;
    }
}

/// Interval from minutes, floored at one second: tokio's interval panics
/// on a zero period and a zero in the config should not take the hub down.
fn minutes(m: u64) -> Duration {
    Duration::from_secs((m * 60).max(1))
}
