//! Origin allowlist: decides which external senders may issue commands.
//!
//! An external sender declares the origin it runs on. The claim is trusted
//! only if it is a well-formed `https` url whose host is explicitly listed.
//! Everything else is denied (fail-closed).

use url::Url;

/// Result of checking an origin against the allowlist.
#[derive(Debug, Clone, PartialEq)]
pub enum OriginCheckResult {
    /// Origin is allowed
    Allowed,
    /// Origin is denied
    Denied { origin: String, reason: String },
}

impl OriginCheckResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, OriginCheckResult::Allowed)
    }
}

/// Allowlist of hosts that may act as external command senders.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed_hosts: Vec<String>,
}

impl OriginPolicy {
    /// Build a policy from host entries (`example.com` or `*.example.com`).
    pub fn new(allowed_hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed_hosts: allowed_hosts
                .into_iter()
                .map(|h| h.into().trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn allowed_hosts(&self) -> &[String] {
        &self.allowed_hosts
    }

    /// Check a claimed sender origin.
    ///
    /// Rules:
    /// - If the allowlist is empty → deny all (secure by default)
    /// - The origin must parse as a url with scheme `https` and a host
    /// - The host must equal an entry, or be a strict subdomain of a `*.` entry
    pub fn check_origin(&self, origin: &str) -> OriginCheckResult {
        let deny = |reason: String| OriginCheckResult::Denied {
            origin: origin.to_string(),
            reason,
        };

        if self.allowed_hosts.is_empty() {
            return deny("No origins configured (deny by default)".into());
        }

        let parsed = match Url::parse(origin.trim()) {
            Ok(url) => url,
            Err(e) => return deny(format!("Malformed origin: {e}")),
        };

        if parsed.scheme() != "https" {
            return deny(format!(
                "Origin scheme '{}' is not a secure transport",
                parsed.scheme()
            ));
        }

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return deny("Origin must not carry credentials".into());
        }

        let host = match parsed.host_str() {
            Some(host) if !host.is_empty() => host.to_lowercase(),
            _ => return deny("Origin has no host".into()),
        };

        if self.allowed_hosts.iter().any(|entry| host_matches(entry, &host)) {
            OriginCheckResult::Allowed
        } else {
            deny(format!(
                "Host '{}' not in allowlist ({} hosts configured)",
                host,
                self.allowed_hosts.len()
            ))
        }
    }
}

fn host_matches(entry: &str, host: &str) -> bool {
    match entry.strip_prefix("*.") {
        Some(suffix) => host
            .strip_suffix(suffix)
            .is_some_and(|prefix| prefix.ends_with('.') && prefix.len() > 1),
        None => entry == host,
    }
}
