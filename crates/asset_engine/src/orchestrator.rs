use std::sync::Arc;
use std::time::Duration;

use asset_core::{canonicalize_url, Candidate};
use harvest_logging::{harvest_debug, harvest_info, harvest_warn};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::providers::{HarvestRequest, ProviderDescriptor, ProviderError, ProviderOutput};
use crate::Diagnostic;

pub const DEFAULT_MAX_CONCURRENT_PROVIDERS: usize = 4;
pub const DEFAULT_GLOBAL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_concurrent: usize,
    pub global_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_PROVIDERS,
            global_timeout: DEFAULT_GLOBAL_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    Error(String),
    Panicked,
    TimedOut,
    Malformed(String),
}

/// A provider whose contribution was replaced by an empty set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: FailureReason,
}

impl From<&ProviderFailure> for Diagnostic {
    fn from(failure: &ProviderFailure) -> Self {
        Diagnostic {
            provider: failure.provider.clone(),
            url: None,
            message: format!("provider failed: {:?}", failure.reason),
        }
    }
}

/// Merged provider output, in provider-priority order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedHarvest {
    pub candidates: Vec<Candidate>,
    pub failures: Vec<ProviderFailure>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs the provider registry concurrently and merges the results.
pub struct Orchestrator {
    registry: Vec<ProviderDescriptor>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(registry: Vec<ProviderDescriptor>, settings: OrchestratorSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &[ProviderDescriptor] {
        &self.registry
    }

    pub async fn run(&self, request: HarvestRequest) -> MergedHarvest {
        let request = Arc::new(request);
        let permits = Arc::new(Semaphore::new(self.settings.max_concurrent.max(1)));
        let deadline = tokio::time::Instant::now() + self.settings.global_timeout;

        let mut pending: Vec<(usize, &ProviderDescriptor, JoinHandle<_>)> = Vec::new();
        for (priority, descriptor) in self.registry.iter().enumerate() {
            if !descriptor.enabled {
                harvest_debug!("provider {} disabled, skipping", descriptor.name);
                continue;
            }
            let provider = descriptor.provider.clone();
            let request = request.clone();
            let permits = permits.clone();
            let handle = tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| ProviderError::Failed("provider pool closed".into()))?;
                provider.harvest(&request).await
            });
            pending.push((priority, descriptor, handle));
        }

        let mut merged = MergedHarvest::default();
        for (priority, descriptor, mut handle) in pending {
            let outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(output))) => validate(output),
                Ok(Ok(Err(err))) => Err(FailureReason::Error(err.to_string())),
                Ok(Err(join_err)) if join_err.is_panic() => Err(FailureReason::Panicked),
                Ok(Err(join_err)) => Err(FailureReason::Error(join_err.to_string())),
                Err(_) => {
                    handle.abort();
                    Err(FailureReason::TimedOut)
                }
            };

            match outcome {
                Ok(output) => {
                    harvest_info!(
                        "provider {} contributed {} candidates",
                        descriptor.name,
                        output.candidates.len()
                    );
                    merged.diagnostics.extend(output.diagnostics);
                    for candidate in output.candidates {
                        let index = merged.candidates.len();
                        merged.candidates.push(candidate.with_provenance(
                            descriptor.name.clone(),
                            descriptor.weight,
                            priority,
                            index,
                        ));
                    }
                }
                Err(reason) => {
                    harvest_warn!(
                        "provider {} failed, continuing without it: {:?}",
                        descriptor.name,
                        reason
                    );
                    let failure = ProviderFailure {
                        provider: descriptor.name.clone(),
                        reason,
                    };
                    merged.diagnostics.push(Diagnostic::from(&failure));
                    merged.failures.push(failure);
                }
            }
        }
        merged
    }
}

/// Canonicalises every URL; a single unusable URL rejects the whole output.
fn validate(output: ProviderOutput) -> Result<ProviderOutput, FailureReason> {
    let ProviderOutput {
        candidates,
        diagnostics,
    } = output;
    let candidates = candidates
        .into_iter()
        .map(|mut candidate| match canonicalize_url(&candidate.url) {
            Some(canonical) => {
                candidate.url = canonical;
                Ok(candidate)
            }
            None => Err(FailureReason::Malformed(format!(
                "unusable candidate url `{}`",
                candidate.url
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ProviderOutput {
        candidates,
        diagnostics,
    })
}
