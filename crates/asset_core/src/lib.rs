//! Asset core: the pure candidate pipeline (canonicalise, dedupe, score, guardrail).
mod candidate;
mod canonical;
mod dedupe;
mod error;
mod hash;
mod labels;
mod profile;
mod score;

pub use candidate::{Candidate, ConfidenceBand, PixelSource};
pub use canonical::{canonicalize_url, host_of, strip_tracking};
pub use dedupe::{dedupe, DEFAULT_HAMMING_THRESHOLD};
pub use error::ConfigurationError;
pub use hash::{average_hash, hamming_distance, NoPixels, PerceptualHash, PixelHasher, HASH_GRID};
pub use labels::{match_label, match_vicinity, normalize_label, CONTEXT_BOOST};
pub use profile::{
    apply_profile, rank, ConsistencyWarning, GameProfile, GuardrailOutcome, WarningKind,
};
pub use score::{
    composite_score, proximity_score, score, score_all, size_score, ScoringWeights,
    FULL_SIZE_AREA, MAX_VICINITY_BOOST, NEUTRAL_PROXIMITY, PROXIMITY_HORIZON,
};
