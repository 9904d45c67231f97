//! Asset engine: fetching, page parsing, providers and the harvest pipeline.
mod cache;
mod clock;
mod config;
mod crawler;
mod decode;
mod export;
mod filename;
mod harvest;
mod orchestrator;
mod persist;
mod probe;
mod profiles;
mod providers;
mod rate_limit;
mod section;
mod transport;
mod types;

pub use cache::{
    cache_key, CacheEntry, CacheSettings, FetchCache, FetchOptions, DEFAULT_CACHE_TTL,
    DEFAULT_MAX_ENTRIES, DEFAULT_REQUEST_TIMEOUT,
};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{HarvestConfig, ProviderConfig, CONFIG_PATH_ENV};
pub use crawler::{CrawlSettings, RespectfulCrawler, DEFAULT_USER_AGENTS};
pub use decode::{decode_html, decode_page, DecodeError, DecodedPage};
pub use export::{render_report, write_report, ExportError, ExportSummary};
pub use filename::report_filename;
pub use harvest::{HarvestOptions, HarvestReport, HarvestSettings, Harvester};
pub use orchestrator::{
    FailureReason, MergedHarvest, Orchestrator, OrchestratorSettings, ProviderFailure,
    DEFAULT_GLOBAL_TIMEOUT, DEFAULT_MAX_CONCURRENT_PROVIDERS,
};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use probe::{fingerprint_image, laplacian_variance, ImageCrateProbe, ImageMetadata, ImageProbe};
pub use profiles::{DirectoryProfileLoader, ProfileLoader, StaticProfileLoader};
pub use providers::{
    expand_template, slugify, HarvestRequest, PageHarvester, Provider, ProviderDescriptor,
    ProviderError, ProviderOutput, SourcePageProvider, TemplateProvider, SOURCE_PAGES_PROVIDER,
    WIKIPEDIA_PROVIDER, WIKIPEDIA_TEMPLATE,
};
pub use rate_limit::{RateLimiter, DEFAULT_MIN_INTERVAL};
pub use section::{
    extract_section_images, heading_level, SectionImage, SectionLocator, COMPONENT_HEADINGS,
    DEFAULT_MAX_SECTION_IMAGES,
};
pub use transport::{HttpTransport, ReqwestTransport, TransportRequest, TransportSettings};
pub use types::{Diagnostic, FailureKind, FetchError, FetchResponse};
