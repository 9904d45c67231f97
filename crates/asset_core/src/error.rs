use thiserror::Error;

/// Broken configuration. Always fatal, raised before any harvesting starts.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("scoring weight `{name}` must be a finite, non-negative number (got {value})")]
    InvalidWeight { name: String, value: f64 },
    #[error("scoring weights must sum to a value in (0, 1] (got {0})")]
    WeightSum(f64),
    #[error("provider `{name}` weight must be within [0, 1] (got {weight})")]
    ProviderWeight { name: String, weight: f64 },
    #[error("provider `{0}` is configured more than once")]
    DuplicateProvider(String),
    #[error("provider `{0}` needs a url_template containing {{title}} or {{slug}}")]
    MissingTemplate(String),
    #[error("dedup threshold must be at most 64 bits (got {0})")]
    Threshold(u32),
    #[error("`{name}` must be greater than zero")]
    Zero { name: &'static str },
    #[error("failed to read configuration {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to parse configuration {path}: {message}")]
    Parse { path: String, message: String },
    #[error("environment variable {name} has invalid value `{value}`")]
    Env { name: String, value: String },
    #[error("failed to build the http client: {0}")]
    HttpClient(String),
}
