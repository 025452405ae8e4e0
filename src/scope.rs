//! Decides which part of a hostname becomes the reported candidate.
//!
//! Without a domain filter the whole internet is scanned and only the first
//! label of each subdomain is interesting. With a filter, hostnames outside the
//! listed registrable domains are dropped and the full hostname is reported.

use crate::config::FilterConfig;
use crate::core::{ObservedLabel, Resolution};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// An immutable allow-list of registrable domains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainFilterSet {
    domains: HashSet<String>,
}

impl DomainFilterSet {
    pub fn from_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .filter_map(|d| normalize_entry(d.as_ref()))
            .collect();
        Self { domains }
    }

    /// Loads one domain per line. Blank lines and `#` comments are skipped.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read domain filter file: {}", path.display()))?;
        Ok(Self::from_domains(
            content.lines().filter(|line| !line.trim_start().starts_with('#')),
        ))
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains(domain)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    fn extend(&mut self, other: DomainFilterSet) {
        self.domains.extend(other.domains);
    }
}

fn normalize_entry(entry: &str) -> Option<String> {
    let entry = entry.trim().trim_end_matches('.');
    (!entry.is_empty()).then(|| entry.to_ascii_lowercase())
}

/// How candidates are derived from resolved hostnames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanMode {
    /// No domain filter: report the leftmost subdomain label.
    Untargeted,
    /// Only report hostnames under these domains, in full.
    Targeted(DomainFilterSet),
}

impl ScanMode {
    /// Builds the mode from the filter configuration. The literal domain list
    /// and the domain file are combined.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let mut set = DomainFilterSet::from_domains(&config.domains);
        if let Some(path) = &config.domains_file {
            set.extend(DomainFilterSet::load_from_file(path)?);
        }

        let explicitly_requested = !config.domains.is_empty() || config.domains_file.is_some();
        if explicitly_requested {
            Ok(ScanMode::Targeted(set))
        } else {
            Ok(ScanMode::Untargeted)
        }
    }

    /// Returns the candidate for `hostname`, or `None` if the hostname is out
    /// of scope or yields an empty candidate.
    pub fn candidate(&self, hostname: &str, resolution: &Resolution) -> Option<ObservedLabel> {
        let label = match self {
            ScanMode::Untargeted => {
                let label = resolution.label.as_str();
                label.split_once('.').map_or(label, |(first, _)| first)
            }
            ScanMode::Targeted(filter) => {
                if !filter.contains(&resolution.registrable_domain) {
                    return None;
                }
                hostname
            }
        };

        if label.is_empty() {
            return None;
        }

        Some(ObservedLabel {
            label: label.to_string(),
            domain: resolution.registrable_domain.clone(),
        })
    }

    pub fn is_targeted(&self) -> bool {
        matches!(self, ScanMode::Targeted(_))
    }
}
