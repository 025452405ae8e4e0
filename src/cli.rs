//! Command-Line Interface (CLI) argument parsing.
//!
//! Flags are parsed with `clap` and merged on top of the configuration file
//! and environment, so every flag has an equivalent config key.

use clap::Parser;
use figment::{
    value::{Dict, Map, Tag, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Watch certificate transparency logs for newly issued subdomains.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Domains to filter for (e.g. 'google.com' or 'tesco.co.uk tesco.com').
    #[arg(short, long, value_name = "DOMAIN", num_args = 1..)]
    pub filter: Vec<String>,

    /// A file containing domains to filter for, one per line.
    #[arg(short = 'F', long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Append newly found subdomains to this file.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Send results to Telegram.
    #[arg(short, long)]
    pub telegram: bool,

    /// Telegram chat ID to send results to.
    #[arg(long, alias = "ti", value_name = "ID")]
    pub telegram_id: Option<String>,

    /// Telegram bot HTTP API token.
    #[arg(long, alias = "ty", value_name = "TOKEN")]
    pub telegram_key: Option<String>,

    /// Keep label counts in this SQLite database and re-alert on repeats.
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Re-alert every N sightings of a label (requires --db).
    #[arg(long, value_name = "N")]
    pub realert_threshold: Option<u64>,

    /// Do not suppress labels containing "www".
    #[arg(long)]
    pub keep_www: bool,

    /// Print results as JSON lines.
    #[arg(long)]
    pub json: bool,

    /// Certstream WebSocket URL.
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Logging level (e.g. "info", "debug", "substream=trace").
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

/// Inserts `value` at a dotted `path`, creating intermediate dictionaries.
fn insert_nested(dict: &mut Dict, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            dict.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = dict
                .entry(head.to_string())
                .or_insert_with(|| Value::Dict(Tag::Default, Dict::new()));
            if let Value::Dict(_, inner) = entry {
                insert_nested(inner, rest, value);
            }
        }
    }
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if !self.filter.is_empty() {
            insert_nested(&mut dict, "filter.domains", Value::serialize(&self.filter)?);
        }
        if let Some(path) = &self.file {
            insert_nested(&mut dict, "filter.domains_file", Value::serialize(path)?);
        }
        if let Some(path) = &self.output {
            insert_nested(&mut dict, "output.file", Value::serialize(path)?);
        }

        // Only an explicit flag turns Telegram on; its absence leaves the
        // config file in charge.
        if self.telegram {
            insert_nested(&mut dict, "output.telegram.enabled", Value::from(true));
        }
        if let Some(id) = &self.telegram_id {
            insert_nested(&mut dict, "output.telegram.chat_id", Value::from(id.clone()));
        }
        if let Some(key) = &self.telegram_key {
            insert_nested(&mut dict, "output.telegram.bot_token", Value::from(key.clone()));
        }

        if let Some(path) = &self.db {
            insert_nested(&mut dict, "deduplication.store", Value::from("sqlite"));
            insert_nested(&mut dict, "deduplication.db_path", Value::serialize(path)?);
        }
        if let Some(threshold) = self.realert_threshold {
            insert_nested(
                &mut dict,
                "deduplication.realert_threshold",
                Value::from(threshold),
            );
        }

        if self.keep_www {
            insert_nested(&mut dict, "noise.ignore_www", Value::from(false));
        }
        if self.json {
            insert_nested(&mut dict, "output.format", Value::from("json"));
        }
        if let Some(url) = &self.url {
            insert_nested(&mut dict, "network.certstream_url", Value::from(url.clone()));
        }
        if let Some(level) = &self.log_level {
            insert_nested(&mut dict, "log_level", Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
