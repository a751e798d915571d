//! CLI command implementations.

pub mod overrides;
pub mod reconcile;
pub mod sync;

use nssync_engine::{
    ConfigError, NightscoutClient, OverrideCache, ReqwestClient, RetryingClient, SyncConfig,
    Syncer,
};
use nssync_storage::FileBackend;
use std::path::{Path, PathBuf};
use tracing::warn;

/// The syncer every command builds.
pub type CliSyncer = Syncer<NightscoutClient<RetryingClient<ReqwestClient>>, FileBackend>;

/// Reads the environment and applies the `--cache-path` option.
pub fn load_config(cache_path: Option<PathBuf>) -> Result<SyncConfig, ConfigError> {
    configure(SyncConfig::from_env(), cache_path)
}

fn configure(
    loaded: Result<SyncConfig, ConfigError>,
    cache_path: Option<PathBuf>,
) -> Result<SyncConfig, ConfigError> {
    let config = loaded?;
    Ok(match cache_path {
        Some(path) => config.with_cache_path(path),
        None => config,
    })
}

/// Opens the override cache at `path`.
///
/// A cache that cannot be read is replaced by an empty one; the next
/// write overwrites it.
pub fn open_cache(path: &Path) -> OverrideCache<FileBackend> {
    match OverrideCache::load(FileBackend::new(path)) {
        Ok(cache) => cache,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "override cache unreadable, starting empty");
            OverrideCache::empty(FileBackend::new(path))
        }
    }
}

/// Builds a syncer over HTTP from `config`.
pub fn build_syncer(config: &SyncConfig) -> Result<CliSyncer, Box<dyn std::error::Error>> {
    let transport = NightscoutClient::from_config(config)?;
    Ok(Syncer::new(
        config.source.clone(),
        config.destination.clone(),
        transport,
        open_cache(&config.cache_path),
    ))
}
