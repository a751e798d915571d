//! Sync command implementation.

use super::build_syncer;
use chrono::Local;
use nssync_engine::{default_range, Endpoint, SyncConfig, DEFAULT_ENDPOINTS};
use tracing::info;

/// Runs the sync command.
pub fn run(
    mut config: SyncConfig,
    endpoint_names: &[String],
    days_back: Option<u64>,
    days_forward: Option<u64>,
    skip_overrides: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let endpoints = resolve_endpoints(endpoint_names)?;
    if let Some(days) = days_back {
        config = config.with_days_back(days);
    }
    if let Some(days) = days_forward {
        config = config.with_days_forward(days);
    }

    let (start, end) = default_range(
        Local::now().naive_local(),
        config.days_back,
        config.days_forward,
    );
    info!(
        source = %config.source.url,
        destination = %config.destination.url,
        %start,
        %end,
        "starting sync"
    );

    let mut syncer = build_syncer(&config)?;
    let report = syncer.run(&endpoints, start, end, !skip_overrides);

    let posted: usize = report.endpoints.iter().map(|r| r.posted).sum();
    let failures: usize = report
        .endpoints
        .iter()
        .map(|r| r.failed_fetches + r.skipped_windows + r.failed_posts)
        .sum();
    info!(posted, failures, "sync complete");
    Ok(())
}

/// Maps endpoint names to endpoints; no names means all of them.
fn resolve_endpoints(names: &[String]) -> Result<Vec<Endpoint>, Box<dyn std::error::Error>> {
    if names.is_empty() {
        return Ok(DEFAULT_ENDPOINTS.to_vec());
    }
    names
        .iter()
        .map(|name| {
            Endpoint::by_name(name).ok_or_else(|| {
                Box::<dyn std::error::Error>::from(format!(
                    "Unknown endpoint '{name}' (expected entries, treatments, devicestatus or profiles)"
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_names_selects_every_endpoint_in_order() {
        let names: Vec<_> = resolve_endpoints(&[])
            .unwrap()
            .iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["entries", "treatments", "devicestatus", "profiles"]);
    }

    #[test]
    fn names_are_resolved_in_given_order() {
        let endpoints =
            resolve_endpoints(&["profiles".to_string(), "entries".to_string()]).unwrap();
        assert_eq!(endpoints[0].name, "profiles");
        assert_eq!(endpoints[1].name, "entries");
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = resolve_endpoints(&["food".to_string()]).unwrap_err();
        assert!(err.to_string().contains("food"));
    }
}
