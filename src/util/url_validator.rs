use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The string is not an absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Which hosts a feed URL may point at.
///
/// The default rejects localhost and private ranges so a registered source
/// cannot be used to probe the internal network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlPolicy {
    pub allow_private_hosts: bool,
}

impl UrlPolicy {
    pub const PERMISSIVE: UrlPolicy = UrlPolicy {
        allow_private_hosts: true,
    };
}

/// Validates a URL string for use as a feed source.
///
/// Always requires an absolute `http`/`https` URL with a host. Unless the
/// policy allows it, also rejects localhost and private IP ranges
/// (RFC 1918, link-local, unique local IPv6).
///
/// # Examples
///
/// ```
/// use feedsync::util::{validate_url, UrlPolicy};
///
/// let url = validate_url("https://example.com/feed.xml", UrlPolicy::default()).unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("/relative/feed", UrlPolicy::default()).is_err());
/// assert!(validate_url("http://192.168.1.1/feed", UrlPolicy::default()).is_err());
/// assert!(validate_url("http://127.0.0.1:8080/feed", UrlPolicy::PERMISSIVE).is_ok());
/// ```
pub fn validate_url(url_str: &str, policy: UrlPolicy) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
    if host.is_empty() {
        return Err(UrlValidationError::MissingHost);
    }

    if policy.allow_private_hosts {
        return Ok(url);
    }

    if host == "localhost" {
        return Err(UrlValidationError::Localhost);
    }

    // IPv6 hosts come back bracketed
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
        if ip.is_loopback() {
            return Err(UrlValidationError::Localhost);
        }
        if is_private_ip(&ip) {
            return Err(UrlValidationError::PrivateIp(ip.to_string()));
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => ipv4.is_private() || ipv4.is_link_local() || ipv4.is_unspecified(),
        IpAddr::V6(ipv6) => {
            if ipv6.is_unspecified() {
                return true;
            }
            let first = ipv6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link-local
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}
