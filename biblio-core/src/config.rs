//! Scan engine configuration, layered defaults + environment via the
//! `config` crate (`BIBLIO_` prefixed, double-underscore nesting).

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::Result;

/// Bumped whenever the parsing or reconciliation logic changes in a way
/// that should force a rescan of previously-scanned libraries, mirroring
/// `hummingbird`'s `SCAN_VERSION` constant.
pub const CURRENT_SCAN_VERSION: u32 = 1;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanEngineConfig {
    /// `0` lets `worker_count()` fall back to the machine's CPU count.
    pub worker_count: usize,
    pub allowed_extensions: Vec<String>,
    pub book_sidecar_filename: String,
    pub file_sidecar_suffix: String,
    pub cache_root: PathBuf,
    pub database_url: String,
    pub scan_version: u32,
}

impl Default for ScanEngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            allowed_extensions: vec!["epub".into(), "cbz".into(), "m4b".into()],
            book_sidecar_filename: "book.biblio.json".into(),
            file_sidecar_suffix: ".biblio.json".into(),
            cache_root: PathBuf::from("./cache/biblio"),
            database_url: "postgres://localhost/biblio".into(),
            scan_version: CURRENT_SCAN_VERSION,
        }
    }
}

impl ScanEngineConfig {
    /// Loads defaults, then overlays any `BIBLIO_*` environment variables
    /// (`BIBLIO_WORKER_COUNT`, `BIBLIO_DATABASE_URL`, ...).
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let figure = config::Config::builder()
            .set_default("worker_count", defaults.worker_count)?
            .set_default("allowed_extensions", defaults.allowed_extensions.clone())?
            .set_default("book_sidecar_filename", defaults.book_sidecar_filename.clone())?
            .set_default("file_sidecar_suffix", defaults.file_sidecar_suffix.clone())?
            .set_default("cache_root", defaults.cache_root.to_string_lossy().to_string())?
            .set_default("database_url", defaults.database_url.clone())?
            .set_default("scan_version", defaults.scan_version)?
            .add_source(config::Environment::with_prefix("BIBLIO").separator("__"))
            .build()?;
        Ok(figure.try_deserialize()?)
    }

    /// `scan_version` mismatches force a full rescan even when the caller
    /// didn't request `force_refresh` — additive on top of §4.1's priority
    /// rules, never a substitute for them.
    pub fn forces_refresh_over(&self, last_scan_version: Option<u32>) -> bool {
        last_scan_version != Some(self.scan_version)
    }

    pub fn effective_worker_count(&self) -> Option<usize> {
        (self.worker_count > 0).then_some(self.worker_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_supported_extensions() {
        let cfg = ScanEngineConfig::default();
        assert!(cfg.allowed_extensions.contains(&"epub".to_string()));
        assert!(cfg.allowed_extensions.contains(&"cbz".to_string()));
        assert!(cfg.allowed_extensions.contains(&"m4b".to_string()));
    }

    #[test]
    fn scan_version_mismatch_forces_refresh() {
        let cfg = ScanEngineConfig::default();
        assert!(cfg.forces_refresh_over(None));
        assert!(cfg.forces_refresh_over(Some(cfg.scan_version.wrapping_sub(1))));
        assert!(!cfg.forces_refresh_over(Some(cfg.scan_version)));
    }
}
