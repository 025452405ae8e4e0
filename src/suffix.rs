//! Public-suffix based hostname splitting.

use crate::core::{Resolution, SuffixResolver};

/// A `SuffixResolver` backed by the compiled-in public suffix list.
#[derive(Debug, Clone, Copy, Default)]
pub struct PslResolver;

impl PslResolver {
    pub fn new() -> Self {
        Self
    }
}

impl SuffixResolver for PslResolver {
    fn resolve(&self, hostname: &str) -> Resolution {
        let host = hostname.strip_suffix('.').unwrap_or(hostname);
        // ASCII lowering keeps byte offsets identical to `host`.
        let lowered = host.to_ascii_lowercase();

        let Some(suffix) = icann_suffix(&lowered) else {
            return Resolution::default();
        };
        let Some(domain) = registrable_domain(&lowered, suffix) else {
            return Resolution::default();
        };

        let label = match host.len().checked_sub(domain.len() + 1) {
            Some(end) if host.as_bytes().get(end) == Some(&b'.') => host[..end].to_string(),
            _ => String::new(),
        };

        Resolution {
            registrable_domain: domain.to_string(),
            suffix: suffix.to_string(),
            label,
        }
    }
}

/// Longest ICANN suffix of `host`. Privately registered suffixes such as
/// `github.io` are skipped so that their tenants resolve as subdomains.
fn icann_suffix(host: &str) -> Option<&str> {
    let mut candidate = host;
    loop {
        let suffix = psl::suffix(candidate.as_bytes())?;
        let text = std::str::from_utf8(suffix.as_bytes()).ok()?;
        if suffix.typ() != Some(psl::Type::Private) {
            return (!text.is_empty()).then_some(text);
        }
        candidate = text.split_once('.')?.1;
    }
}

/// `suffix` plus the one label in front of it, as a tail of `host`.
fn registrable_domain<'a>(host: &'a str, suffix: &str) -> Option<&'a str> {
    let rest = host.strip_suffix(suffix)?.strip_suffix('.')?;
    let name = rest.rsplit('.').next().filter(|name| !name.is_empty())?;
    Some(&host[host.len() - suffix.len() - 1 - name.len()..])
}
