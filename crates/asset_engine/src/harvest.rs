use std::collections::HashSet;
use std::sync::Arc;

use asset_core::{
    apply_profile, dedupe, normalize_label, score_all, Candidate, ConfigurationError,
    ConsistencyWarning, GameProfile, PixelHasher, ScoringWeights, DEFAULT_HAMMING_THRESHOLD,
};
use harvest_logging::{harvest_info, harvest_warn};
use serde::Serialize;

use crate::cache::{CacheSettings, FetchCache};
use crate::clock::{Clock, TokioClock};
use crate::config::{HarvestConfig, ProviderConfig};
use crate::crawler::{CrawlSettings, RespectfulCrawler};
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::probe::ImageCrateProbe;
use crate::profiles::ProfileLoader;
use crate::providers::{
    HarvestRequest, PageHarvester, ProviderDescriptor, SourcePageProvider, TemplateProvider,
    SOURCE_PAGES_PROVIDER,
};
use crate::rate_limit::RateLimiter;
use crate::section::{SectionLocator, DEFAULT_MAX_SECTION_IMAGES};
use crate::transport::{ReqwestTransport, TransportSettings};
use crate::Diagnostic;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestOptions {
    /// Component labels to look for, on top of the game profile's allowlist.
    pub labels: Vec<String>,
    /// Keep per-URL diagnostics in the report.
    pub verbose: bool,
}

/// Ranked result of one harvest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestReport {
    pub subject: String,
    pub candidates: Vec<Candidate>,
    pub warnings: Vec<ConsistencyWarning>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarvestSettings {
    pub weights: ScoringWeights,
    pub dedup_threshold: u32,
    pub max_section_images: usize,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            dedup_threshold: DEFAULT_HAMMING_THRESHOLD,
            max_section_images: DEFAULT_MAX_SECTION_IMAGES,
        }
    }
}

/// Orchestrate, dedupe, score, guardrail.
pub struct Harvester {
    orchestrator: Orchestrator,
    hasher: Arc<dyn PixelHasher>,
    profiles: Arc<dyn ProfileLoader>,
    settings: HarvestSettings,
}

impl Harvester {
    pub fn new(
        orchestrator: Orchestrator,
        hasher: Arc<dyn PixelHasher>,
        profiles: Arc<dyn ProfileLoader>,
        settings: HarvestSettings,
    ) -> Self {
        Self {
            orchestrator,
            hasher,
            profiles,
            settings,
        }
    }

    /// Builds the whole network stack from `config`. Fails before any request
    /// is made when the configuration is unusable.
    pub fn from_config(
        config: &HarvestConfig,
        profiles: Arc<dyn ProfileLoader>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(TokioClock);
        let transport = ReqwestTransport::new(TransportSettings {
            max_bytes: config.max_body_bytes,
            ..TransportSettings::default()
        })
        .map_err(|err| ConfigurationError::HttpClient(err.to_string()))?;
        let limiter = Arc::new(RateLimiter::new(config.rate_limit_interval(), clock.clone()));
        let cache = Arc::new(FetchCache::new(
            Arc::new(transport),
            limiter,
            clock.clone(),
            CacheSettings {
                ttl: config.cache_ttl(),
                max_entries: config.cache_max_entries,
            },
        ));
        let crawler = Arc::new(RespectfulCrawler::new(
            cache,
            clock,
            CrawlSettings {
                request_timeout: config.request_timeout(),
                max_attempts: config.max_attempts,
                backoff_base: config.backoff_base(),
                user_agents: config.user_agents.clone(),
                blocked_hosts: config.blocked_hosts.clone(),
            },
        ));
        Self::with_crawler(config, crawler, profiles)
    }

    /// Wires the configured providers over an existing crawler.
    pub fn with_crawler(
        config: &HarvestConfig,
        crawler: Arc<RespectfulCrawler>,
        profiles: Arc<dyn ProfileLoader>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let probe = Arc::new(ImageCrateProbe);
        let pages = Arc::new(PageHarvester::new(
            crawler,
            probe.clone(),
            SectionLocator::default(),
        ));
        let registry = build_registry(&config.providers, &pages);
        let orchestrator = Orchestrator::new(
            registry,
            OrchestratorSettings {
                max_concurrent: config.max_concurrent_providers,
                global_timeout: config.global_timeout(),
            },
        );
        Ok(Self::new(
            orchestrator,
            probe,
            profiles,
            HarvestSettings {
                weights: config.weights,
                dedup_threshold: config.dedup_threshold,
                max_section_images: config.max_section_images,
            },
        ))
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn harvest(
        &self,
        subject_title: &str,
        extra_source_urls: &[String],
        options: &HarvestOptions,
    ) -> HarvestReport {
        let subject = subject_title.trim().to_string();
        let profile = self.profiles.load(&subject).unwrap_or_default();
        let request = HarvestRequest {
            subject_title: subject.clone(),
            extra_source_urls: extra_source_urls.to_vec(),
            labels: requested_labels(&options.labels, &profile),
            max_section_images: self.settings.max_section_images,
        };

        let merged = self.orchestrator.run(request).await;
        harvest_info!(
            "harvested {} candidates for `{}` ({} provider failures)",
            merged.candidates.len(),
            subject,
            merged.failures.len()
        );

        let weights = &self.settings.weights;
        // Representative selection breaks ties on score, so score once up front.
        let provisional = score_all(merged.candidates, weights);
        let distinct = dedupe(
            provisional,
            self.settings.dedup_threshold,
            self.hasher.as_ref(),
        );
        harvest_info!("{} distinct images after dedupe", distinct.len());

        let outcome = apply_profile(score_all(distinct, weights), &profile);
        for warning in &outcome.warnings {
            harvest_warn!("`{}`: {}", subject, warning);
        }

        HarvestReport {
            subject,
            candidates: outcome.candidates,
            warnings: outcome.warnings,
            diagnostics: if options.verbose {
                merged.diagnostics
            } else {
                Vec::new()
            },
        }
    }
}

fn build_registry(
    providers: &[ProviderConfig],
    pages: &Arc<PageHarvester>,
) -> Vec<ProviderDescriptor> {
    providers
        .iter()
        .filter_map(|entry| {
            let provider: Arc<dyn crate::providers::Provider> =
                if entry.name == SOURCE_PAGES_PROVIDER {
                    Arc::new(SourcePageProvider::new(pages.clone()))
                } else {
                    let Some(template) = entry.url_template.clone() else {
                        harvest_warn!("provider {} has no url template, skipping", entry.name);
                        return None;
                    };
                    Arc::new(TemplateProvider::new(
                        entry.name.clone(),
                        template,
                        pages.clone(),
                    ))
                };
            Some(ProviderDescriptor {
                name: entry.name.clone(),
                weight: entry.weight,
                enabled: entry.enabled,
                provider,
            })
        })
        .collect()
}

/// Caller labels followed by every label the profile knows about, without repeats.
fn requested_labels(labels: &[String], profile: &GameProfile) -> Vec<String> {
    let mut seen = HashSet::new();
    labels
        .iter()
        .chain(&profile.allowlist)
        .chain(profile.expected_counts.keys())
        .chain(profile.synonyms.keys())
        .filter(|label| seen.insert(normalize_label(label)))
        .filter(|label| !normalize_label(label).is_empty())
        .cloned()
        .collect()
}
