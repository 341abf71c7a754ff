use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};

use bloom_opds::channel::build_channel;
use bloom_opds::config::Config;
use bloom_opds::feed::{parse_feed_with_stats, OpdsClient};

/// Get the config directory path (~/.config/bloom-opds/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("bloom-opds"))
}

#[derive(Parser, Debug)]
#[command(
    name = "bloom-opds",
    about = "Build a channel manifest from the Bloom Library OPDS catalog"
)]
struct Args {
    /// Config file (default: ~/.config/bloom-opds/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Catalog locale, e.g. en-GB
    #[arg(long, value_name = "LOCALE")]
    lang: Option<String>,

    /// Request ePUB acquisition links
    #[arg(long)]
    epub: bool,

    /// Request full navigation links
    #[arg(long)]
    no_minimal_nav_links: bool,

    /// Ask the catalog to group entries by language
    #[arg(long)]
    organize_by_language: bool,

    /// Override the catalog endpoint
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Parse a saved feed instead of fetching
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Write output here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Emit the normalized records instead of the channel manifest
    #[arg(long)]
    records_only: bool,
}

impl Args {
    /// Command-line flags take precedence over the config file.
    fn apply(&self, config: &mut Config) {
        if let Some(lang) = &self.lang {
            config.language = lang.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if self.epub {
            config.epub = true;
        }
        if self.no_minimal_nav_links {
            config.minimal_nav_links = false;
        }
        if self.organize_by_language {
            config.organize_by_language = true;
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => match get_config_dir() {
            Ok(dir) => dir.join("config.toml"),
            Err(e) => {
                tracing::debug!(error = %e, "No config directory, using defaults");
                return Ok(Config::default());
            }
        },
    };
    Config::load(&path).with_context(|| format!("Failed to load config: {}", path.display()))
}

fn write_output(path: Option<&Path>, json: &str) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write output file '{}'", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}").context("Failed to write to stdout")
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only the manifest
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = load_config(&args)?;
    args.apply(&mut config);
    if config.has_credentials() {
        tracing::debug!("Catalog credentials configured; requests are sent without them");
    }

    let bytes = match &args.input {
        Some(input) => tokio::fs::read(input)
            .await
            .with_context(|| format!("Failed to read feed file: {}", input.display()))?,
        None => {
            let client = OpdsClient::from_config(reqwest::Client::new(), &config)
                .context("Invalid catalog configuration")?;
            client
                .fetch(&config.feed_query())
                .await
                .context("Failed to fetch OPDS catalog")?
        }
    };

    let outcome = parse_feed_with_stats(&bytes).context("Failed to parse OPDS catalog")?;
    tracing::info!(
        records = outcome.stats.emitted,
        entries = outcome.stats.entries,
        skipped = outcome.stats.entries - outcome.stats.emitted,
        "Parsed catalog"
    );

    let json = if args.records_only {
        serde_json::to_string_pretty(&outcome.records)?
    } else {
        let build = build_channel(&config.channel, &outcome.records);
        if build.failed > 0 {
            tracing::warn!(
                failed = build.failed,
                "Some records could not be added to the channel"
            );
        }
        serde_json::to_string_pretty(&build.channel)?
    };

    write_output(args.output.as_deref(), &json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults_keep_config() {
        let args = Args::parse_from(["bloom-opds"]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.language, "en");
        assert!(config.minimal_nav_links);
        assert!(!config.epub);
        assert!(!config.organize_by_language);
    }

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "bloom-opds",
            "--lang",
            "en-GB",
            "--epub",
            "--no-minimal-nav-links",
            "--organize-by-language",
            "--base-url",
            "https://mirror.example/opds",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.language, "en-GB");
        assert_eq!(config.base_url, "https://mirror.example/opds");
        assert!(config.epub);
        assert!(!config.minimal_nav_links);
        assert!(config.organize_by_language);
    }

    #[test]
    fn test_args_output_and_input() {
        let args = Args::parse_from([
            "bloom-opds",
            "--input",
            "feed.xml",
            "-o",
            "channel.json",
            "--records-only",
        ]);
        assert_eq!(args.input, Some(PathBuf::from("feed.xml")));
        assert_eq!(args.output, Some(PathBuf::from("channel.json")));
        assert!(args.records_only);
    }
}
