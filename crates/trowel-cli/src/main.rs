use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trowel_client::OpenContextClient;
use trowel_core::normalize::{MultiValuePolicy, DEFAULT_MULTI_VALUE_DELIM};
use trowel_core::{Attribute, ClientConfig};

#[derive(Parser)]
#[command(
    name = "trowel",
    version,
    about = "Open Context search API client and table exporter"
)]
struct Cli {
    /// Directory for the JSON response cache
    #[arg(long, env = "TROWEL_CACHE_DIR", default_value = "oc-api-cache", global = true)]
    cache_dir: PathBuf,

    /// Cache file prefix (defaults to today's date)
    #[arg(long, env = "TROWEL_CACHE_PREFIX", global = true)]
    cache_prefix: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attributes discovered from a search URL's facets
    Attributes {
        /// Search/query URL
        #[arg(short, long)]
        url: String,

        /// Discover standard (externally defined) attributes instead of
        /// commonly used ones
        #[arg(long, default_value_t = false)]
        standard: bool,

        /// Include Von den Driesch bone measurement attributes
        /// (standard mode only)
        #[arg(long, default_value_t = false)]
        bone_measures: bool,

        /// Minimum portion of matched records an attribute must appear
        /// in (common mode only)
        #[arg(long, default_value_t = 0.2)]
        min_portion: f64,
    },

    /// Export every record matched by a search URL as CSV
    Export {
        /// Search/query URL
        #[arg(short, long)]
        url: String,

        /// Comma-separated attribute slugs to request
        #[arg(short, long)]
        attributes: Option<String>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Records to request per page
        #[arg(long, default_value_t = 200)]
        rows: u32,

        /// Milliseconds to pause before each live request
        #[arg(long, default_value_t = 250)]
        pace_ms: u64,

        /// Policy for non-numeric multi-valued attributes
        /// (first, last, json, concat, column_val)
        #[arg(long, default_value = "concat")]
        multi_value: String,

        /// Delimiter used by the concat policy
        #[arg(long, default_value = DEFAULT_MULTI_VALUE_DELIM)]
        delimiter: String,
    },

    /// Delete cached responses, scoped by the active prefix
    ClearCache {
        /// Delete entries carrying the active prefix instead of
        /// everything else
        #[arg(long, default_value_t = false)]
        active: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trowel=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::default().with_cache_dir(&cli.cache_dir);
    if let Some(prefix) = &cli.cache_prefix {
        config = config.with_cache_prefix(prefix);
    }

    match cli.command {
        Commands::Attributes {
            url,
            standard,
            bone_measures,
            min_portion,
        } => {
            let client = OpenContextClient::new(config)?;
            let attributes = if standard {
                client.standard_attributes(&url, bone_measures).await?
            } else {
                client.common_attributes(&url, Some(min_portion)).await?
            };
            print_attributes(&attributes);
        }

        Commands::Export {
            url,
            attributes,
            out,
            rows,
            pace_ms,
            multi_value,
            delimiter,
        } => {
            let policy = MultiValuePolicy::parse(&multi_value, &delimiter)?;
            let config = config
                .with_rows_per_page(rows)
                .with_pace(Duration::from_millis(pace_ms))
                .with_non_numeric_policy(policy);
            let client = OpenContextClient::new(config)?;

            let slugs: Vec<String> = attributes
                .as_deref()
                .unwrap_or("")
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();

            let table = client.build_table(&url, &slugs).await?;
            tracing::info!(
                records = table.len(),
                columns = table.columns().len(),
                "Table built"
            );

            match out {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    table.write_csv(file)?;
                    tracing::info!(path = %path.display(), "CSV written");
                }
                None => {
                    let stdout = std::io::stdout();
                    table.write_csv(stdout.lock())?;
                }
            }
        }

        Commands::ClearCache { active } => {
            let client = OpenContextClient::new(config)?;
            // keep_prefix=true deletes everything EXCEPT the active
            // prefix; --active inverts that.
            let deleted = client.cache().clear(!active)?;
            println!("Deleted {deleted} cache entries");
        }
    }

    Ok(())
}

fn print_attributes(attributes: &[Attribute]) {
    if attributes.is_empty() {
        println!("No attributes found");
        return;
    }
    for attribute in attributes {
        println!("{}\t{}", attribute.slug, attribute.label);
    }
}
