//! Endpoint and model id handling

use detection_core::{DetectionError, Result};
use url::{Host, Url};

/// Public Gemini API root
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when none is requested
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Model ids suggested when the service reports an unknown model
pub const KNOWN_MODELS: [&str; 3] = ["gemini-1.5-flash", "gemini-1.5-pro", "gemini-1.0-pro"];

const MAX_MODEL_LEN: usize = 128;

/// Sanitizes and normalizes the API root
///
/// Rules:
/// - Trims whitespace
/// - Rejects control chars / newlines
/// - Parses as URL
/// - Rejects userinfo
/// - Allows http for loopback hosts only; otherwise requires https
/// - Drops query and fragment, strips trailing slashes from the path
pub fn sanitize_base_url(input: &str) -> Result<Url> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(DetectionError::InvalidEndpoint("empty".to_string()));
    }
    if raw.chars().any(|c| c.is_control()) {
        return Err(DetectionError::InvalidEndpoint(
            "contains control characters".to_string(),
        ));
    }
    let mut url = Url::parse(raw).map_err(|e| DetectionError::InvalidEndpoint(e.to_string()))?;

    if !url.username().is_empty() || url.password().is_some() {
        return Err(DetectionError::InvalidEndpoint(
            "must not include userinfo".to_string(),
        ));
    }

    url.set_query(None);
    url.set_fragment(None);

    let is_local = match url.host() {
        Some(Host::Domain(d)) => d.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    };

    match url.scheme() {
        "https" => {}
        "http" if is_local => {}
        other => {
            return Err(DetectionError::InvalidEndpoint(format!(
                "unsupported scheme: {other}"
            )))
        }
    }

    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);
    Ok(url)
}

/// Validate a model id, accepting an optional `models/` prefix
///
/// The id ends up as a path segment, so only `[A-Za-z0-9._-]` is allowed and
/// it must start with a letter or digit.
pub fn normalize_model(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let id = trimmed.strip_prefix("models/").unwrap_or(trimmed);

    let mut chars = id.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if !valid_start || !valid_rest || id.len() > MAX_MODEL_LEN {
        return Err(DetectionError::InvalidModel(input.to_string()));
    }
    Ok(id.to_string())
}

/// `{base}/models/{model}:generateContent`
pub fn generate_content_url(base: &Url, model: &str) -> Url {
    join_path(base, &format!("models/{model}:generateContent"))
}

fn join_path(base: &Url, segment: &str) -> Url {
    let mut url = base.clone();
    let mut path = url.path().trim_end_matches('/').to_string();
    path.push('/');
    path.push_str(segment);
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    url
}
