pub mod entity_cache;
pub mod fingerprint;
pub mod generation;

pub use entity_cache::{GenreFinder, PersonFinder, ScanCache, ScanCacheStats, SeriesFinder, TagFinder};
pub use fingerprint::{
    ArtifactFormat, AuthorFp, ChapterFp, CoverFp, Fingerprint, FingerprintInputs, IdentifierFp,
    NarratorFp, SeriesFp,
};
pub use generation::{ArtifactGenerator, GenerationCache};
