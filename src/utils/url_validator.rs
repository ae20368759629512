//! 目标地址校验：只允许 http / https，拦截危险协议

use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlValidationError {
    Empty,
    DangerousScheme(String),
    UnsupportedScheme(String),
    Malformed(String),
    MissingHost,
}

impl std::fmt::Display for UrlValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "destination URL cannot be empty"),
            Self::DangerousScheme(s) => write!(f, "scheme '{}' is not allowed", s),
            Self::UnsupportedScheme(s) => {
                write!(f, "unsupported scheme '{}', only http and https", s)
            }
            Self::Malformed(msg) => write!(f, "malformed URL: {}", msg),
            Self::MissingHost => write!(f, "destination URL has no host"),
        }
    }
}

impl std::error::Error for UrlValidationError {}

const DANGEROUS_SCHEMES: &[&str] = &["javascript", "data", "file", "vbscript", "about", "blob"];

pub fn validate_destination(raw: &str) -> Result<Url, UrlValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UrlValidationError::Empty);
    }

    // 先看前缀，`javascript:alert(1)` 这类不一定能被解析
    let scheme = raw
        .split_once(':')
        .map(|(s, _)| s.to_ascii_lowercase())
        .unwrap_or_default();
    if DANGEROUS_SCHEMES.contains(&scheme.as_str()) {
        return Err(UrlValidationError::DangerousScheme(scheme));
    }

    let url = Url::parse(raw).map_err(|e| UrlValidationError::Malformed(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlValidationError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }
    Ok(url)
}
