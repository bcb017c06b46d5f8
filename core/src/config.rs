//! Client configuration.
//!
//! Defaults target the hosted backend. `from_env` overlays environment
//! variables so deployments can point at a local backend without code
//! changes.

use crate::error::ApiError;

pub const DEFAULT_BASE_URL: &str = "https://ed-tech-backend-tzn8.onrender.com/api";
pub const LOCAL_BASE_URL: &str = "http://localhost:8000/api";

pub const ENV_BASE_URL: &str = "EDTECH_API_BASE_URL";
pub const ENV_ORIGIN: &str = "EDTECH_API_ORIGIN";
pub const ENV_INCLUDE_CREDENTIALS: &str = "EDTECH_API_INCLUDE_CREDENTIALS";
pub const ENV_SOLVE_TEXT_FIELD: &str = "EDTECH_SOLVE_TEXT_FIELD";

/// Cross-origin behavior of outgoing requests.
///
/// `cross_origin` with an `origin` set sends an `Origin` header, which is
/// what a browser does for a cors-mode fetch. `include_credentials` keeps a
/// cookie jar so cookies set by the backend travel with later calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    pub cross_origin: bool,
    pub include_credentials: bool,
    pub origin: Option<String>,
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self {
            cross_origin: true,
            include_credentials: true,
            origin: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub origin_policy: OriginPolicy,
    /// JSON key carrying the question text for `/solve/`. The backend accepts
    /// more than one spelling, so this is configurable rather than fixed.
    pub solve_text_field: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            origin_policy: OriginPolicy::default(),
            solve_text_field: "text".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// A backend running on the developer's machine.
    pub fn local() -> Self {
        Self::new(LOCAL_BASE_URL)
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin_policy.origin = Some(origin.into());
        self
    }

    pub fn with_solve_text_field(mut self, field: impl Into<String>) -> Self {
        self.solve_text_field = field.into();
        self
    }

    /// Defaults overlaid with `EDTECH_*` environment variables.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_BASE_URL) {
            config.base_url = url;
        }
        if let Some(origin) = lookup(ENV_ORIGIN) {
            config.origin_policy.origin = Some(origin);
        }
        if let Some(raw) = lookup(ENV_INCLUDE_CREDENTIALS) {
            config.origin_policy.include_credentials = parse_bool(ENV_INCLUDE_CREDENTIALS, &raw)?;
        }
        if let Some(field) = lookup(ENV_SOLVE_TEXT_FIELD) {
            config.solve_text_field = field;
        }
        Ok(config)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ApiError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ApiError::InvalidConfig(format!("{key}: expected a boolean, got {raw:?}"))),
    }
}
