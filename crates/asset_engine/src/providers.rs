use std::sync::Arc;

use asset_core::{match_vicinity, Candidate, PixelSource};
use harvest_logging::harvest_debug;

use crate::crawler::RespectfulCrawler;
use crate::decode::decode_page;
use crate::probe::ImageProbe;
use crate::section::{extract_section_images, SectionImage, SectionLocator};
use crate::{Diagnostic, FetchError};

pub const SOURCE_PAGES_PROVIDER: &str = "source_pages";
pub const WIKIPEDIA_PROVIDER: &str = "wikipedia";
pub const WIKIPEDIA_TEMPLATE: &str = "https://en.wikipedia.org/wiki/{title}";

/// Everything a provider needs to know about one harvest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestRequest {
    pub subject_title: String,
    pub extra_source_urls: Vec<String>,
    /// Component labels to look for near each image.
    pub labels: Vec<String>,
    pub max_section_images: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderOutput {
    pub candidates: Vec<Candidate>,
    /// Per-URL problems that were skipped over.
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("malformed output: {0}")]
    Malformed(String),
    #[error("{0}")]
    Failed(String),
}

/// One independent harvesting strategy.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn harvest(&self, request: &HarvestRequest) -> Result<ProviderOutput, ProviderError>;
}

/// Registry entry. Registry order is provider priority.
#[derive(Clone)]
pub struct ProviderDescriptor {
    pub name: String,
    pub weight: f64,
    pub enabled: bool,
    pub provider: Arc<dyn Provider>,
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Shared page routine: fetch, locate the component section, collect its
/// images, then fetch and probe every image.
pub struct PageHarvester {
    crawler: Arc<RespectfulCrawler>,
    probe: Arc<dyn ImageProbe>,
    locator: SectionLocator,
}

impl PageHarvester {
    pub fn new(
        crawler: Arc<RespectfulCrawler>,
        probe: Arc<dyn ImageProbe>,
        locator: SectionLocator,
    ) -> Self {
        Self {
            crawler,
            probe,
            locator,
        }
    }

    pub async fn harvest_pages(
        &self,
        provider: &str,
        pages: &[String],
        request: &HarvestRequest,
    ) -> ProviderOutput {
        let mut output = ProviderOutput::default();
        for page in pages {
            self.harvest_page(provider, page, request, &mut output).await;
        }
        output
    }

    async fn harvest_page(
        &self,
        provider: &str,
        page_url: &str,
        request: &HarvestRequest,
        output: &mut ProviderOutput,
    ) {
        let response = match self.crawler.fetch(page_url).await {
            Ok(response) => response,
            Err(err) => {
                harvest_debug!("[{}] skipping page {}: {}", provider, page_url, err);
                output
                    .diagnostics
                    .push(Diagnostic::for_url(provider, page_url, &err));
                return;
            }
        };
        let images = match decode_page(&response) {
            Ok(page) => extract_section_images(
                &self.locator,
                &page.html,
                page_url,
                request.max_section_images,
            ),
            Err(err) => {
                output.diagnostics.push(Diagnostic {
                    provider: provider.to_string(),
                    url: Some(page_url.to_string()),
                    message: err.to_string(),
                });
                return;
            }
        };
        harvest_debug!(
            "[{}] {} section images on {}",
            provider,
            images.len(),
            page_url
        );

        for image in images {
            let candidate = section_candidate(image, page_url, &request.labels);
            let candidate = self.attach_pixels(provider, candidate, output).await;
            output.candidates.push(candidate);
        }
    }

    async fn attach_pixels(
        &self,
        provider: &str,
        mut candidate: Candidate,
        output: &mut ProviderOutput,
    ) -> Candidate {
        let bytes = match self.crawler.get(&candidate.url).await {
            Ok(bytes) => bytes,
            Err(err) => {
                output
                    .diagnostics
                    .push(Diagnostic::for_url(provider, &candidate.url, &err));
                return candidate;
            }
        };
        let Some(meta) = self.probe.probe(&bytes) else {
            output.diagnostics.push(Diagnostic {
                provider: provider.to_string(),
                url: Some(candidate.url.clone()),
                message: "not a decodable image".to_string(),
            });
            return candidate;
        };
        candidate.format = meta.format;
        candidate.has_alpha = meta.has_alpha;
        candidate.sharpness = Some(meta.sharpness);
        candidate
            .with_dimensions(meta.width, meta.height)
            .with_hash(meta.hash)
            .with_pixels(PixelSource::Buffer(Arc::from(bytes.as_ref())))
    }
}

fn section_candidate(image: SectionImage, page_url: &str, labels: &[String]) -> Candidate {
    let vicinity = match_vicinity(image.alt_text.as_deref(), image.context.as_deref(), labels);
    let candidate = Candidate::discovered(image.url)
        .with_section(image.section_distance, image.alt_text)
        .with_source_page(page_url)
        .with_dimensions(
            image.width_hint.unwrap_or(0),
            image.height_hint.unwrap_or(0),
        );
    match vicinity {
        Some((label, boost)) => candidate.with_label(label, boost),
        None => candidate,
    }
}

/// Pages the caller pointed at directly.
pub struct SourcePageProvider {
    pages: Arc<PageHarvester>,
}

impl SourcePageProvider {
    pub fn new(pages: Arc<PageHarvester>) -> Self {
        Self { pages }
    }
}

#[async_trait::async_trait]
impl Provider for SourcePageProvider {
    async fn harvest(&self, request: &HarvestRequest) -> Result<ProviderOutput, ProviderError> {
        Ok(self
            .pages
            .harvest_pages(SOURCE_PAGES_PROVIDER, &request.extra_source_urls, request)
            .await)
    }
}

/// One page per game, addressed by a URL template.
pub struct TemplateProvider {
    name: String,
    template: String,
    pages: Arc<PageHarvester>,
}

impl TemplateProvider {
    pub fn new(name: impl Into<String>, template: impl Into<String>, pages: Arc<PageHarvester>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            pages,
        }
    }
}

#[async_trait::async_trait]
impl Provider for TemplateProvider {
    async fn harvest(&self, request: &HarvestRequest) -> Result<ProviderOutput, ProviderError> {
        if request.subject_title.trim().is_empty() {
            return Err(ProviderError::Failed("empty subject title".into()));
        }
        let page = expand_template(&self.template, &request.subject_title);
        Ok(self.pages.harvest_pages(&self.name, &[page], request).await)
    }
}

/// `{title}`: words joined by `_`, percent-encoded. `{slug}`: lower-case, hyphenated.
pub fn expand_template(template: &str, title: &str) -> String {
    let joined = title.split_whitespace().collect::<Vec<_>>().join("_");
    template
        .replace("{title}", &urlencoding::encode(&joined))
        .replace("{slug}", &slugify(title))
}

pub fn slugify(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}
