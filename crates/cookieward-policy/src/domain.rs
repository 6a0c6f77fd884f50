//! Domain scoping
//!
//! Maps a URL or hostname to the organisation-level domain rules are keyed
//! by, using Mozilla's Public Suffix List via the `psl` crate.

use std::net::IpAddr;
use url::{Host, Url};

use crate::error::PolicyError;
use crate::Result;

fn is_web_scheme(scheme: &str) -> bool {
    scheme == "http" || scheme == "https"
}

/// True for absolute http(s) URLs. Everything else is out of scope.
pub fn is_web_url(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| is_web_scheme(parsed.scheme()) && parsed.host().is_some())
        .unwrap_or(false)
}

/// Check if a hostname is itself a known public suffix ("com", "co.uk").
pub fn is_public_suffix(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    psl::suffix(host.as_bytes())
        .map(|suffix| suffix.is_known() && suffix.as_bytes() == host.as_bytes())
        .unwrap_or(false)
}

/// Organisation-level domain for a URL or hostname.
///
/// `https://a.b.example.co.uk/x` gives `example.co.uk`. Hostnames without a
/// recognised public suffix (`localhost`, intranet names) and IP addresses
/// come back unchanged. Non-http(s) URLs are returned untouched so callers
/// can treat them as out of scope.
pub fn registrable_domain(input: &str) -> Result<String> {
    let trimmed = input.trim();

    let host = match Url::parse(trimmed) {
        Ok(url) => {
            if !is_web_scheme(url.scheme()) {
                return Ok(input.to_string());
            }
            match url.host() {
                Some(Host::Domain(domain)) => domain.to_string(),
                Some(Host::Ipv4(ip)) => return Ok(ip.to_string()),
                Some(Host::Ipv6(ip)) => return Ok(ip.to_string()),
                None => return Err(PolicyError::invalid_domain(input, "URL has no host")),
            }
        }
        // Bare hostname, e.g. a cookie domain
        Err(url::ParseError::RelativeUrlWithoutBase) => trimmed.to_string(),
        Err(e) => return Err(e.into()),
    };

    Ok(organization_domain(&host))
}

fn organization_domain(host: &str) -> String {
    let host = host.strip_prefix('.').unwrap_or(host).to_ascii_lowercase();

    if host.parse::<IpAddr>().is_ok() {
        return host;
    }

    match psl::domain(host.as_bytes()) {
        Some(domain) if domain.suffix().is_known() => {
            String::from_utf8_lossy(domain.as_bytes()).into_owned()
        }
        _ => host,
    }
}

/// Validate a domain typed into the exception editor.
///
/// Accepts only a plain organisation-level hostname: no scheme, port or path,
/// no subdomain label, not a bare public suffix. Returns the normalised form.
pub fn validate_rule_domain(input: &str) -> Result<String> {
    let candidate = input.trim().to_ascii_lowercase();
    let candidate = candidate.strip_prefix('.').unwrap_or(&candidate).to_string();

    if candidate.is_empty() {
        return Err(PolicyError::invalid_domain(input, "domain is empty"));
    }

    if let Ok(ip) = candidate.parse::<IpAddr>() {
        return Ok(ip.to_string());
    }

    if candidate.contains(|c: char| matches!(c, '/' | ':' | '?' | '#' | '@') || c.is_whitespace()) {
        return Err(PolicyError::invalid_domain(
            input,
            "only a hostname is allowed, without scheme, port or path",
        ));
    }

    let host = Host::parse(&candidate)
        .map_err(|e| PolicyError::invalid_domain(input, e.to_string()))?;

    match host {
        Host::Domain(domain) => {
            if is_public_suffix(&domain) {
                return Err(PolicyError::invalid_domain(input, "domain is a public suffix"));
            }

            let organization = organization_domain(&domain);
            if organization != domain {
                return Err(PolicyError::invalid_domain(
                    input,
                    format!("subdomains are not allowed, use '{}'", organization),
                ));
            }

            Ok(domain)
        }
        Host::Ipv4(ip) => Ok(ip.to_string()),
        Host::Ipv6(ip) => Ok(ip.to_string()),
    }
}
