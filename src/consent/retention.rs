//! Retention sweeping for health records.
//!
//! Records are deleted once they are older than the stricter of their own
//! retention policy and their owner's, but only for patients that turned
//! auto-delete on.

use crate::event::{ServiceEvent, ServiceEventsSender};
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Delete every record whose owner has auto-delete on and whose retention has
/// lapsed at `now`. Returns the number of records removed.
pub fn purge_expired_records(store: &Store, now: DateTime<Utc>) -> usize {
    let settings = store.settings.clone();
    store.records.retain(&mut |record| {
        settings.get(&record.patient_did).map_or(true, |s| {
            let retention = record.retention.stricter(s.data_retention);
            !(s.auto_delete && record.is_expired(retention, now))
        })
    })
}

/// Background task that periodically purges expired records.
pub struct RetentionSweeper {
    store: Store,
    interval: Duration,
}

impl RetentionSweeper {
    /// Create a sweeper running every `interval`.
    #[must_use]
    pub fn new(store: Store, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Sweep until `shutdown` flips to true.
    pub async fn run(self, events: ServiceEventsSender, mut shutdown: watch::Receiver<bool>) {
        info!("Retention sweeper running every {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let removed = purge_expired_records(&self.store, Utc::now());
                    if removed > 0 {
                        info!("Retention sweep removed {removed} records");
                        let _ = events.send(ServiceEvent::RecordsPurged { count: removed });
                    } else {
                        debug!("Retention sweep found nothing to remove");
                    }
                }
            }
        }
        debug!("Retention sweeper stopped");
    }
}
