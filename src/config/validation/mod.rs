//! Configuration validation
//!
//! Every configuration section implements [`Validate`]; the top-level
//! `ObservabilityConfig::validate` prefixes section errors with their name.

mod monitoring_validators;

use url::Url;

/// Validation trait for configuration structures
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// Require a well-formed http(s) URL with a host
pub(crate) fn validate_http_url(url_str: &str, context: &str) -> Result<(), String> {
    let url = Url::parse(url_str)
        .map_err(|e| format!("{} has invalid URL format: {}", context, e))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(format!(
                "{} must use http:// or https:// scheme, got: {}",
                context, scheme
            ));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(format!("{} URL must have a valid host", context));
    }

    Ok(())
}
