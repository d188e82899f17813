//! SSRF protection for outbound HTTP calls (`did:web` resolution, Agent Card
//! fetches, Universal Resolver calls).
//!
//! Every outbound fetch in this crate goes through [`validate_and_pin_url`]
//! first: resolve the host, reject anything private/loopback/link-local/
//! reserved or on the static blocklist, and hand back the pinned IPs so the
//! actual request dials an address rather than re-resolving the hostname
//! (closing the DNS-rebinding TOCTOU window). Redirects are never followed.

use crate::error::{KernelError, Result};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

/// This crate never follows redirects on outbound fetches; a validated
/// origin must serve the response directly.
pub const MAX_REDIRECTS: u32 = 0;

const BLOCKED_DOMAINS: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "metadata.google.internal",
    "metadata.google.com",
    "169.254.169.254",
];

const BLOCKED_SUFFIXES: &[&str] = &[".local", ".internal", ".localhost"];

/// A hostname validated and resolved to a pinned set of safe IP addresses.
#[derive(Debug, Clone)]
pub struct PinnedHost {
    pub host: String,
    pub port: u16,
    pub addrs: Vec<IpAddr>,
}

/// Check a bare hostname (no scheme/port) against the static blocklist.
/// Does not perform DNS resolution; see [`validate_and_pin_url`] for the
/// full check including resolved-address inspection.
pub fn validate_url_host(hostname: &str) -> Result<()> {
    let lower = hostname.to_ascii_lowercase();

    if BLOCKED_DOMAINS.contains(&lower.as_str()) {
        return Err(KernelError::SsrfBlocked(format!(
            "host '{hostname}' is on the blocked domain list"
        )));
    }
    if BLOCKED_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix)) {
        return Err(KernelError::SsrfBlocked(format!(
            "host '{hostname}' matches a blocked suffix"
        )));
    }
    if let Ok(ip) = lower.parse::<IpAddr>() {
        reject_if_unsafe_ip(ip)?;
    }

    Ok(())
}

fn reject_if_unsafe_ip(ip: IpAddr) -> Result<()> {
    if is_unsafe_ip(ip) {
        return Err(KernelError::SsrfBlocked(format!(
            "address {ip} is private, loopback, link-local, or reserved"
        )));
    }
    Ok(())
}

fn is_unsafe_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_unspecified()
                || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // unique local fc00::/7
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // link-local fe80::/10
        }
    }
}

/// Parse `url`, validate its host against the blocklist, resolve it via DNS,
/// and reject the whole URL if any resolved address is unsafe. Returns the
/// pinned safe addresses for the caller to dial directly.
pub fn validate_and_pin_url(url: &str) -> Result<PinnedHost> {
    let parsed = url::Url::parse(url)
        .map_err(|e| KernelError::Validation(format!("invalid URL '{url}': {e}")))?;

    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        return Err(KernelError::Validation(format!(
            "unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| KernelError::Validation(format!("URL '{url}' has no host")))?
        .to_string();
    let port = parsed
        .port_or_known_default()
        .ok_or_else(|| KernelError::Validation("URL has no resolvable port".into()))?;

    validate_url_host(&host)?;

    let addrs = resolve(&host, port)?;
    if addrs.is_empty() {
        return Err(KernelError::Network(format!(
            "host '{host}' did not resolve to any address"
        )));
    }
    for addr in &addrs {
        reject_if_unsafe_ip(*addr)?;
    }

    Ok(PinnedHost { host, port, addrs })
}

fn resolve(host: &str, port: u16) -> Result<Vec<IpAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| KernelError::Network(format!("DNS resolution failed for '{host}': {e}")))?
        .collect();
    Ok(addrs.into_iter().map(|a| a.ip()).collect())
}

/// Validate a redirect target the same way as an initial request. Since
/// this crate never follows redirects ([`MAX_REDIRECTS`] is 0), this exists
/// only so callers that surface a `Location` header can validate it before
/// reporting it, without implying that the crate will follow it.
pub fn validate_redirect_target(location: &str) -> Result<PinnedHost> {
    validate_and_pin_url(location)
}
