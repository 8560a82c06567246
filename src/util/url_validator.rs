use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors returned when a feed URL is rejected at registration time.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    /// Loopback, RFC 1918, link-local, unique-local or unspecified address
    #[error("Private or loopback address not allowed: {0}")]
    PrivateHost(String),
}

/// Which hosts a feed URL may point at.
///
/// The sweep fetches every registered URL from the server, so by default
/// addresses inside the deployment's network are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostPolicy {
    #[default]
    PublicOnly,
    AllowPrivate,
}

/// Validates a URL string for registration as a feed source.
///
/// # Errors
///
/// - [`UrlValidationError::InvalidUrl`] if it does not parse
/// - [`UrlValidationError::UnsupportedScheme`] for anything but http/https
/// - [`UrlValidationError::MissingHost`] if there is no host component
/// - [`UrlValidationError::PrivateHost`] for `localhost` or a non-public IP
///   literal, unless `policy` is [`HostPolicy::AllowPrivate`]
///
/// # Examples
///
/// ```
/// use suprss::util::{validate_url, HostPolicy};
///
/// let url = validate_url("https://example.com/feed.xml", HostPolicy::PublicOnly).unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("http://192.168.1.1/feed", HostPolicy::PublicOnly).is_err());
/// assert!(validate_url("http://192.168.1.1/feed", HostPolicy::AllowPrivate).is_ok());
/// assert!(validate_url("file:///etc/passwd", HostPolicy::AllowPrivate).is_err());
/// ```
pub fn validate_url(url_str: &str, policy: HostPolicy) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;

    if policy == HostPolicy::PublicOnly && is_private_host(host) {
        return Err(UrlValidationError::PrivateHost(host.to_owned()));
    }

    Ok(url)
}

fn is_private_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    match bare.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        Ok(IpAddr::V6(v6)) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // unique local fc00::/7
                || (first & 0xffc0) == 0xfe80 // link local fe80::/10
        }
        Err(_) => false,
    }
}
