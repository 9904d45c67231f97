use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::hash::PerceptualHash;

/// Where the pixels of a candidate can be read from, if anywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PixelSource {
    /// Encoded image bytes already in memory.
    Buffer(Arc<[u8]>),
    /// Encoded image on local disk.
    Path(PathBuf),
    #[default]
    Absent,
}

impl PixelSource {
    pub fn is_accessible(&self) -> bool {
        !matches!(self, PixelSource::Absent)
    }
}

/// Coarse triage bucket derived from `final_score`. Presentation only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfidenceBand {
    High,
    Medium,
    #[default]
    Low,
}

impl ConfidenceBand {
    pub const HIGH_THRESHOLD: f64 = 0.75;
    pub const MEDIUM_THRESHOLD: f64 = 0.5;

    pub fn from_score(score: f64) -> Self {
        if score >= Self::HIGH_THRESHOLD {
            ConfidenceBand::High
        } else if score >= Self::MEDIUM_THRESHOLD {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }
}

impl fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceBand::High => write!(f, "high"),
            ConfidenceBand::Medium => write!(f, "medium"),
            ConfidenceBand::Low => write!(f, "low"),
        }
    }
}

/// One image that might show a game component.
///
/// Stages never mutate a candidate they do not own: each stage takes the
/// list by value and hands back a new one, using the `with_*` helpers below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub url: String,
    #[serde(skip)]
    pub pixels: PixelSource,
    /// Zero when unknown.
    pub width: u32,
    /// Zero when unknown.
    pub height: u32,
    pub format: Option<String>,
    pub has_alpha: bool,
    pub provider: String,
    pub provider_weight: f64,
    #[serde(skip)]
    pub provider_priority: usize,
    #[serde(skip)]
    pub discovery_index: usize,
    pub source_page: Option<String>,
    pub section_distance: Option<u32>,
    pub alt_text: Option<String>,
    pub label: Option<String>,
    pub vicinity_boost: f64,
    pub perceptual_hash: Option<PerceptualHash>,
    pub sharpness: Option<f64>,
    pub cluster_id: Option<usize>,
    pub uniqueness_score: f64,
    pub final_score: f64,
    pub confidence_band: ConfidenceBand,
    pub excluded: bool,
}

impl Candidate {
    /// A freshly discovered image; provider metadata is stamped at merge time.
    pub fn discovered(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pixels: PixelSource::Absent,
            width: 0,
            height: 0,
            format: None,
            has_alpha: false,
            provider: String::new(),
            provider_weight: 0.0,
            provider_priority: 0,
            discovery_index: 0,
            source_page: None,
            section_distance: None,
            alt_text: None,
            label: None,
            vicinity_boost: 0.0,
            perceptual_hash: None,
            sharpness: None,
            cluster_id: None,
            uniqueness_score: 1.0,
            final_score: 0.0,
            confidence_band: ConfidenceBand::Low,
            excluded: false,
        }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_pixels(mut self, pixels: PixelSource) -> Self {
        self.pixels = pixels;
        self
    }

    pub fn with_section(mut self, distance: u32, alt_text: Option<String>) -> Self {
        self.section_distance = Some(distance);
        self.alt_text = alt_text;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>, vicinity_boost: f64) -> Self {
        self.label = Some(label.into());
        self.vicinity_boost = vicinity_boost;
        self
    }

    pub fn with_source_page(mut self, page: impl Into<String>) -> Self {
        self.source_page = Some(page.into());
        self
    }

    pub fn with_hash(mut self, hash: PerceptualHash) -> Self {
        self.perceptual_hash = Some(hash);
        self
    }

    /// Stamps merge-time provenance.
    pub fn with_provenance(
        mut self,
        provider: impl Into<String>,
        weight: f64,
        priority: usize,
        discovery_index: usize,
    ) -> Self {
        self.provider = provider.into();
        self.provider_weight = weight;
        self.provider_priority = priority;
        self.discovery_index = discovery_index;
        self
    }

    pub fn with_score(mut self, final_score: f64) -> Self {
        self.final_score = final_score;
        self.confidence_band = ConfidenceBand::from_score(final_score);
        self
    }
}
