//! The sync engine: windowed endpoint sync and override reconciliation.

use crate::config::Instance;
use crate::endpoint::{treatment_by_id_url, Endpoint, TREATMENTS};
use crate::overrides::{is_active, OverrideCache};
use crate::record::{record_id, retain_new, Record};
use crate::transport::{NightscoutTransport, PostOutcome};
use crate::window::DayWindows;
use chrono::{DateTime, NaiveDateTime, Utc};
use nssync_storage::StorageBackend;
use tracing::{debug, error, info, warn};

/// Source of the current time, used by the override activity check.
pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What one endpoint sync did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointReport {
    /// Endpoint name.
    pub endpoint: &'static str,
    /// Day windows visited.
    pub windows: usize,
    /// Records fetched from the source.
    pub fetched: usize,
    /// Records accepted by the destination.
    pub posted: usize,
    /// Source fetches that failed.
    pub failed_fetches: usize,
    /// Windows skipped because the destination could not be queried.
    pub skipped_windows: usize,
    /// Posts that failed.
    pub failed_posts: usize,
    /// Overrides added to the cache.
    pub overrides_cached: usize,
}

/// What one reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Cached entries looked at.
    pub checked: usize,
    /// Entries whose override finished; their final state was posted.
    pub expired: usize,
    /// Entries whose treatment no longer exists on the source.
    pub vanished: usize,
    /// Entries still running.
    pub still_active: usize,
    /// Entries whose treatment could not be fetched; kept for next time.
    pub unreachable: usize,
    /// Final-state posts that failed. Their entries are dropped all the same.
    pub failed_posts: usize,
}

/// What a full run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// One report per endpoint, in sync order.
    pub endpoints: Vec<EndpointReport>,
    /// The reconcile pass, if it ran.
    pub reconcile: Option<ReconcileReport>,
}

/// Mirrors records from a source Nightscout to a destination Nightscout.
///
/// No method returns an error: failed requests are logged and counted in
/// the reports, and the run carries on with whatever can still be synced.
pub struct Syncer<T: NightscoutTransport, S: StorageBackend> {
    source: Instance,
    destination: Instance,
    transport: T,
    cache: OverrideCache<S>,
    clock: Clock,
}

impl<T: NightscoutTransport, S: StorageBackend> Syncer<T, S> {
    /// Creates a syncer using the system clock.
    pub fn new(
        source: Instance,
        destination: Instance,
        transport: T,
        cache: OverrideCache<S>,
    ) -> Self {
        Self {
            source,
            destination,
            transport,
            cache,
            clock: Box::new(Utc::now),
        }
    }

    /// Replaces the clock.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the override cache.
    pub fn cache(&self) -> &OverrideCache<S> {
        &self.cache
    }

    /// Syncs every endpoint over `[start, end)`, then optionally runs the
    /// override reconcile pass.
    pub fn run(
        &mut self,
        endpoints: &[Endpoint],
        start: NaiveDateTime,
        end: NaiveDateTime,
        reconcile: bool,
    ) -> RunReport {
        let mut report = RunReport::default();
        for endpoint in endpoints {
            report
                .endpoints
                .push(self.sync_endpoint(endpoint, start, end));
        }
        if reconcile {
            report.reconcile = Some(self.reconcile_overrides());
        }
        report
    }

    /// Syncs one endpoint over `[start, end)`, one day window at a time.
    pub fn sync_endpoint(
        &mut self,
        endpoint: &Endpoint,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> EndpointReport {
        let mut report = EndpointReport {
            endpoint: endpoint.name,
            ..Default::default()
        };

        for window in DayWindows::new(start, end) {
            report.windows += 1;
            debug!(endpoint = endpoint.name, from = %window.from, to = %window.to, "window");

            let url = endpoint.range_query_url(&self.source.url, window.from, window.to);
            let source_records = match self.transport.fetch(&url, &self.source.secret) {
                Ok(records) => records,
                Err(_) => {
                    report.failed_fetches += 1;
                    continue;
                }
            };
            if source_records.is_empty() {
                continue;
            }
            report.fetched += source_records.len();

            if endpoint.is_treatments() {
                report.overrides_cached += self.record_overrides(&source_records);
            }

            let to_post = if endpoint.deduplicate {
                let url = endpoint.range_query_url(&self.destination.url, window.from, window.to);
                match self.transport.fetch(&url, &self.destination.secret) {
                    Ok(existing) => retain_new(source_records, &existing, endpoint.date_field),
                    Err(_) => {
                        warn!(
                            endpoint = endpoint.name,
                            from = %window.from,
                            to = %window.to,
                            "destination query failed, skipping window"
                        );
                        report.skipped_windows += 1;
                        continue;
                    }
                }
            } else {
                source_records
            };

            if to_post.is_empty() {
                continue;
            }

            let url = endpoint.write_url(&self.destination.url);
            match self
                .transport
                .post(&url, &self.destination.secret, &to_post)
            {
                PostOutcome::Sent(count) => report.posted += count,
                PostOutcome::Failed => report.failed_posts += 1,
                PostOutcome::Skipped => {}
            }
        }

        info!(
            endpoint = report.endpoint,
            windows = report.windows,
            fetched = report.fetched,
            posted = report.posted,
            failed_fetches = report.failed_fetches,
            skipped_windows = report.skipped_windows,
            "endpoint synced"
        );
        report
    }

    /// Revisits every cached override on the source.
    ///
    /// Vanished treatments are forgotten. Finished ones are posted to the
    /// destination once more, carrying their final state, and forgotten.
    /// Running ones and unreachable ones stay cached. The cache is
    /// persisted at the end whatever happened.
    pub fn reconcile_overrides(&mut self) -> ReconcileReport {
        let now = (self.clock)();
        let mut report = ReconcileReport::default();
        let entries = self.cache.entries().to_vec();

        for entry in entries {
            report.checked += 1;
            let url = treatment_by_id_url(&self.source.url, &entry.id);
            let records = match self.transport.fetch(&url, &self.source.secret) {
                Ok(records) => records,
                Err(_) => {
                    report.unreachable += 1;
                    continue;
                }
            };

            let Some(treatment) = find_by_id(records, &entry.id) else {
                debug!(id = %entry.id, "override vanished from source");
                self.cache.remove(&entry.id);
                report.vanished += 1;
                continue;
            };

            if is_active(&treatment, now) {
                report.still_active += 1;
                continue;
            }

            debug!(id = %entry.id, "override finished, posting final state");
            let write_url = TREATMENTS.write_url(&self.destination.url);
            let outcome = self
                .transport
                .post(&write_url, &self.destination.secret, &[treatment]);
            if outcome == PostOutcome::Failed {
                warn!(id = %entry.id, "final state of finished override was not posted");
                report.failed_posts += 1;
            }
            self.cache.remove(&entry.id);
            report.expired += 1;
        }

        if let Err(e) = self.cache.persist() {
            error!(error = %e, "failed to persist override cache");
        }

        info!(
            checked = report.checked,
            expired = report.expired,
            vanished = report.vanished,
            still_active = report.still_active,
            unreachable = report.unreachable,
            failed_posts = report.failed_posts,
            "overrides reconciled"
        );
        report
    }

    fn record_overrides(&mut self, batch: &[Record]) -> usize {
        let now = (self.clock)();
        match self.cache.record_batch(batch, now) {
            Ok(added) => added,
            Err(e) => {
                error!(error = %e, "failed to persist override cache");
                0
            }
        }
    }
}

/// Picks the treatment with `id` out of a lookup answer.
fn find_by_id(records: Vec<Record>, id: &str) -> Option<Record> {
    records.into_iter().find(|r| record_id(r) == Some(id))
}
