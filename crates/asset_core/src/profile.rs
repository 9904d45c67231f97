use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::labels::normalize_label;

/// Per-game knowledge used to sanity-check a harvest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameProfile {
    /// Component labels that belong to this game. Empty means "anything goes".
    pub allowlist: Vec<String>,
    /// How many distinct images each label is expected to have at most.
    pub expected_counts: BTreeMap<String, u32>,
    /// Alternative term → canonical label.
    pub synonyms: BTreeMap<String, String>,
    /// Supplies that are not part of the box (pencils, sleeves, …).
    pub exclude_supply: Vec<String>,
}

impl GameProfile {
    pub fn canonical_label(&self, label: &str) -> String {
        let normalized = normalize_label(label);
        self.synonyms
            .iter()
            .find(|(term, _)| normalize_label(term) == normalized)
            .map(|(_, canonical)| normalize_label(canonical))
            .unwrap_or(normalized)
    }

    fn is_excluded(&self, canonical: &str) -> bool {
        let listed = |items: &[String]| {
            items
                .iter()
                .any(|item| self.canonical_label(item) == canonical)
        };
        if listed(&self.exclude_supply) {
            return true;
        }
        !self.allowlist.is_empty() && !listed(&self.allowlist)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// An expected label has no surviving image.
    Missing,
    /// More distinct images carry a label than the profile expects.
    Surplus,
}

/// Advisory mismatch between `expected_counts` and what was harvested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyWarning {
    pub label: String,
    pub expected: u32,
    pub observed: u32,
    pub kind: WarningKind,
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} `{}`: expected {}, observed {}",
            self.kind, self.label, self.expected, self.observed
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailOutcome {
    pub candidates: Vec<Candidate>,
    pub warnings: Vec<ConsistencyWarning>,
}

/// Tags candidates against the profile and returns them in final order.
///
/// Nothing is removed: disallowed labels are flagged `excluded` and count
/// mismatches become warnings. Unlabelled candidates are never excluded.
pub fn apply_profile(candidates: Vec<Candidate>, profile: &GameProfile) -> GuardrailOutcome {
    let tagged: Vec<Candidate> = candidates
        .into_iter()
        .map(|mut candidate| {
            if let Some(label) = candidate.label.take() {
                let canonical = profile.canonical_label(&label);
                candidate.excluded = profile.is_excluded(&canonical);
                candidate.label = Some(canonical);
            }
            candidate
        })
        .collect();

    let mut observed: BTreeMap<String, u32> = BTreeMap::new();
    for candidate in tagged.iter().filter(|c| !c.excluded) {
        if let Some(label) = &candidate.label {
            *observed.entry(label.clone()).or_default() += 1;
        }
    }

    let warnings = profile
        .expected_counts
        .iter()
        .filter_map(|(label, &expected)| {
            let label = profile.canonical_label(label);
            let seen = observed.get(&label).copied().unwrap_or(0);
            let kind = if seen == 0 && expected > 0 {
                WarningKind::Missing
            } else if seen > expected {
                WarningKind::Surplus
            } else {
                return None;
            };
            Some(ConsistencyWarning {
                label,
                expected,
                observed: seen,
                kind,
            })
        })
        .collect();

    GuardrailOutcome {
        candidates: rank(tagged),
        warnings,
    }
}

/// Deterministic final order: score, then provider priority, then discovery.
pub fn rank(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| a.provider_priority.cmp(&b.provider_priority))
            .then_with(|| a.discovery_index.cmp(&b.discovery_index))
    });
    candidates
}
