//! Interval-driven publish cycles, periodic backfill and interaction
//! fetching.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::backfill;
use crate::config::Config;
use crate::db::Database;
use crate::interactions;
use crate::publish;

/// Spawn one loop per scheduled connection plus the periodic backfill loop.
///
/// Each loop sleeps first so a process restart does not immediately
/// publish. Cycles for different connections run concurrently; each cycle
/// itself is sequential.
pub fn spawn_all(
    client: reqwest::Client,
    db: Database,
    config: Arc<Config>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    for connection in &config.connections {
        let Some(secs) = connection.interval_secs else {
            continue;
        };
        let name = connection.name.clone();
        let client = client.clone();
        let db = db.clone();
        let config = Arc::clone(&config);

        info!(connection = %name, interval_secs = secs, "Scheduling publish cycle");
        handles.push(tokio::spawn(async move {
            let interval = Duration::from_secs(secs);
            loop {
                tokio::time::sleep(interval).await;
                let Some(conn) = config.connection(&name) else {
                    break;
                };
                match publish::publish_next(&client, &db, conn).await {
                    Ok(Some(item)) => info!(connection = %name, %item, "Scheduled publish done"),
                    Ok(None) => info!(connection = %name, "Scheduled publish was a no-op"),
                    Err(e) => error!(connection = %name, "Scheduled publish failed: {e:#}"),
                }
            }
        }));
    }

    if let Some(secs) = config.backfill_interval_secs {
        info!(interval_secs = secs, "Scheduling backfill pass");
        let client = client.clone();
        let db = db.clone();
        let config = Arc::clone(&config);
        handles.push(tokio::spawn(async move {
            let interval = Duration::from_secs(secs);
            loop {
                tokio::time::sleep(interval).await;
                backfill::run_backfill(&client, &db, &config).await;
            }
        }));
    }

    if let Some(secs) = config.interactions_interval_secs {
        info!(interval_secs = secs, "Scheduling interactions fetch pass");
        handles.push(tokio::spawn(async move {
            let interval = Duration::from_secs(secs);
            loop {
                tokio::time::sleep(interval).await;
                interactions::run_interactions(&client, &db, &config).await;
            }
        }));
    }

    handles
}
