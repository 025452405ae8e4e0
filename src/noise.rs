//! Noise suppression for candidate labels.
//!
//! Public certificates are full of machine-generated hostnames (device ids,
//! UUIDs, cloud gateways). A label is rejected if it contains any literal rule
//! or if any pattern rule matches anywhere inside it.

use crate::config::NoiseConfig;
use anyhow::{Context, Result};
use regex::RegexSet;

const UUID: &str = "[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}";

/// Literal substrings rejected by default, `www` excluded.
pub const DEFAULT_LITERALS: &[&str] = &[
    "*",
    "azuregateway",
    "direwolf",
    "devshell-vm-",
    "device-local",
    "-local",
    "sni",
];

/// Returns the default pattern rules, in source form.
pub fn default_patterns() -> Vec<String> {
    vec![
        "[a-f0-9]{24}".to_string(),
        "device[a-f0-9]{7,8}-[a-f0-9]{8}".to_string(),
        UUID.to_string(),
        format!("device-{UUID}"),
    ]
}

/// A compiled, immutable rule set.
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    literals: Vec<String>,
    patterns: RegexSet,
}

impl NoiseFilter {
    /// Compiles a filter from explicit rules.
    pub fn new<L, P>(literals: L, patterns: P) -> Result<Self>
    where
        L: IntoIterator,
        L::Item: Into<String>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let literals = literals
            .into_iter()
            .map(Into::into)
            .filter(|l: &String| !l.is_empty())
            .collect();
        let patterns = RegexSet::new(patterns).context("Failed to compile noise patterns")?;
        Ok(Self { literals, patterns })
    }

    /// Builds the filter described by the configuration.
    pub fn from_config(config: &NoiseConfig) -> Result<Self> {
        let mut literals = config.literals.clone();
        if config.ignore_www && !literals.iter().any(|l| l == "www") {
            literals.insert(0, "www".to_string());
        }
        Self::new(literals, &config.patterns)
    }

    /// Returns `true` if the label should be reported.
    pub fn accept(&self, label: &str) -> bool {
        if self.literals.iter().any(|rule| label.contains(rule.as_str())) {
            return false;
        }
        !self.patterns.is_match(label)
    }

    /// Number of literal and pattern rules, for startup logging.
    pub fn rule_counts(&self) -> (usize, usize) {
        (self.literals.len(), self.patterns.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter() -> NoiseFilter {
        NoiseFilter::from_config(&NoiseConfig::default()).unwrap()
    }

    #[test]
    fn test_plain_label_is_accepted() {
        let filter = default_filter();
        assert!(filter.accept("api"));
        assert!(filter.accept("mail"));
        assert!(filter.accept("staging-eu"));
    }

    #[test]
    fn test_literal_rules_match_anywhere() {
        let filter = default_filter();
        assert!(!filter.accept("www"));
        assert!(!filter.accept("www2"));
        assert!(!filter.accept("*"));
        assert!(!filter.accept("prod-azuregateway-1"));
        assert!(!filter.accept("devshell-vm-1234"));
        assert!(!filter.accept("printer-local"));
        assert!(!filter.accept("sni1234"));
    }

    #[test]
    fn test_literals_are_case_sensitive() {
        let filter = default_filter();
        assert!(filter.accept("WWW"));
    }

    #[test]
    fn test_pattern_rules_search_not_full_match() {
        let filter = default_filter();
        assert!(!filter.accept("x0123456789abcdef01234567y"));
        assert!(!filter.accept("device12345678-9abcdef0"));
        assert!(!filter.accept("device1234567-89abcdef"));
        assert!(!filter.accept("host-123e4567-e89b-12d3-a456-426614174000"));
        assert!(!filter.accept("device-123e4567-e89b-12d3-a456-426614174000"));
    }

    #[test]
    fn test_short_hex_is_accepted() {
        let filter = default_filter();
        assert!(filter.accept("cafe"));
        assert!(filter.accept("0123456789abcdef"));
    }

    #[test]
    fn test_www_can_be_kept() {
        let config = NoiseConfig {
            ignore_www: false,
            ..Default::default()
        };
        let filter = NoiseFilter::from_config(&config).unwrap();
        assert!(filter.accept("www"));
        assert!(!filter.accept("sni"));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let result = NoiseFilter::new(Vec::<String>::new(), ["(unclosed"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rule_counts() {
        let filter = default_filter();
        assert_eq!(filter.rule_counts(), (DEFAULT_LITERALS.len() + 1, 4));
    }
}
