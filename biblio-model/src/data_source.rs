//! The provenance tag attached to every reconciled scalar and relationship.
//!
//! The literal wire strings are a contract: other services and the
//! sidecar files on disk persist these exact names, so the `Display`/`FromStr`
//! pair must never be reshuffled without a migration.

use std::fmt;
use std::str::FromStr;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSource {
    Manual,
    Sidecar,
    ExistingCover,
    EpubMetadata,
    CbzMetadata,
    M4bMetadata,
    Filepath,
}

impl DataSource {
    /// Lower priority number wins. Unknown sources (see `FromStr`) are
    /// treated as weaker than any known source so a rescan can always
    /// safely replace them.
    pub const fn priority(self) -> u8 {
        match self {
            DataSource::Manual => 0,
            DataSource::Sidecar => 1,
            DataSource::ExistingCover
            | DataSource::EpubMetadata
            | DataSource::CbzMetadata
            | DataSource::M4bMetadata => 2,
            DataSource::Filepath => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            DataSource::Manual => "manual",
            DataSource::Sidecar => "sidecar",
            DataSource::ExistingCover => "existing_cover",
            DataSource::EpubMetadata => "epub_metadata",
            DataSource::CbzMetadata => "cbz_metadata",
            DataSource::M4bMetadata => "m4b_metadata",
            DataSource::Filepath => "filepath",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = UnknownDataSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(DataSource::Manual),
            "sidecar" => Ok(DataSource::Sidecar),
            "existing_cover" => Ok(DataSource::ExistingCover),
            "epub_metadata" => Ok(DataSource::EpubMetadata),
            "cbz_metadata" => Ok(DataSource::CbzMetadata),
            "m4b_metadata" => Ok(DataSource::M4bMetadata),
            "filepath" => Ok(DataSource::Filepath),
            other => Err(UnknownDataSource(other.to_string())),
        }
    }
}

/// A persisted source string the reconciler doesn't recognize. Priority
/// `u8::MAX` keeps rescans safe: it always loses to a known source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDataSource(pub String);

impl fmt::Display for UnknownDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown data source {:?}", self.0)
    }
}

/// Priority lookup that tolerates unknown/legacy strings read back from
/// storage, so a row with an unrecognized source never wins a reconcile.
pub fn priority_of(raw: &str) -> u8 {
    DataSource::from_str(raw)
        .map(DataSource::priority)
        .unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_contract_strings() {
        for ds in [
            DataSource::Manual,
            DataSource::Sidecar,
            DataSource::ExistingCover,
            DataSource::EpubMetadata,
            DataSource::CbzMetadata,
            DataSource::M4bMetadata,
            DataSource::Filepath,
        ] {
            assert_eq!(DataSource::from_str(ds.as_str()).unwrap(), ds);
        }
    }

    #[test]
    fn unknown_source_is_weakest() {
        assert_eq!(priority_of("something-from-the-future"), u8::MAX);
        assert!(priority_of("something-from-the-future") > DataSource::Filepath.priority());
    }

    #[test]
    fn priority_ordering_matches_contract() {
        assert!(DataSource::Manual.priority() < DataSource::Sidecar.priority());
        assert!(DataSource::Sidecar.priority() < DataSource::EpubMetadata.priority());
        assert_eq!(DataSource::EpubMetadata.priority(), DataSource::CbzMetadata.priority());
        assert_eq!(DataSource::EpubMetadata.priority(), DataSource::M4bMetadata.priority());
        assert_eq!(DataSource::EpubMetadata.priority(), DataSource::ExistingCover.priority());
        assert!(DataSource::M4bMetadata.priority() < DataSource::Filepath.priority());
    }
}
