//! Reconcile command implementation.

use super::build_syncer;
use nssync_engine::SyncConfig;
use tracing::info;

/// Runs the reconcile command.
pub fn run(config: SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut syncer = build_syncer(&config)?;
    info!(cached = syncer.cache().len(), "reconciling overrides");
    let report = syncer.reconcile_overrides();
    if report.unreachable > 0 {
        info!(
            unreachable = report.unreachable,
            "some overrides could not be checked and stay cached"
        );
    }
    Ok(())
}
