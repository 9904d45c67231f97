use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::error::ConfigurationError;

/// Area at which the size term saturates (1200×1200).
pub const FULL_SIZE_AREA: f64 = 1200.0 * 1200.0;
/// Section distance at which the proximity term reaches zero.
pub const PROXIMITY_HORIZON: f64 = 6.0;
/// Proximity used when a candidate was not found under a section heading.
pub const NEUTRAL_PROXIMITY: f64 = 0.4;
/// Upper bound of the additive label-vicinity bonus.
pub const MAX_VICINITY_BOOST: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub size: f64,
    pub proximity: f64,
    pub source: f64,
    pub uniqueness: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            size: 0.35,
            proximity: 0.30,
            source: 0.25,
            uniqueness: 0.10,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let named = [
            ("size", self.size),
            ("proximity", self.proximity),
            ("source", self.source),
            ("uniqueness", self.uniqueness),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::InvalidWeight {
                    name: name.to_string(),
                    value,
                });
            }
        }
        let sum: f64 = named.iter().map(|(_, v)| v).sum();
        if sum <= 0.0 || sum > 1.0 + 1e-9 {
            return Err(ConfigurationError::WeightSum(sum));
        }
        Ok(())
    }
}

fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub fn size_score(candidate: &Candidate) -> f64 {
    clamp01(candidate.area() as f64 / FULL_SIZE_AREA)
}

pub fn proximity_score(candidate: &Candidate) -> f64 {
    match candidate.section_distance {
        Some(distance) => clamp01(1.0 - f64::from(distance) / PROXIMITY_HORIZON),
        None => NEUTRAL_PROXIMITY,
    }
}

/// Composite confidence in `[0, 1]`.
pub fn composite_score(candidate: &Candidate, weights: &ScoringWeights) -> f64 {
    let base = weights.size * size_score(candidate)
        + weights.proximity * proximity_score(candidate)
        + weights.source * clamp01(candidate.provider_weight)
        + weights.uniqueness * clamp01(candidate.uniqueness_score);
    let boost = clamp01(candidate.vicinity_boost).min(MAX_VICINITY_BOOST);
    clamp01(base + boost)
}

pub fn score(candidate: Candidate, weights: &ScoringWeights) -> Candidate {
    let final_score = composite_score(&candidate, weights);
    candidate.with_score(final_score)
}

pub fn score_all(candidates: Vec<Candidate>, weights: &ScoringWeights) -> Vec<Candidate> {
    candidates
        .into_iter()
        .map(|candidate| score(candidate, weights))
        .collect()
}
