//! # Synapse CLI (`synapse`)
//!
//! ## Usage
//!
//! ```bash
//! synapse --config ./config/synapse.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `synapse init` | Create the SQLite database and run schema migrations |
//! | `synapse serve` | Start the HTTP server |
//! | `synapse capture` | Classify and save a page for an owner |
//! | `synapse list` | Print an owner's saved content, newest first |
//! | `synapse search "<prompt>"` | Hybrid search over an owner's content |
//! | `synapse classify` | Classify page signals without saving |
//!
//! Command output is JSON on stdout. Logs go to stderr and are filtered
//! with `RUST_LOG`.

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use synapse::capture::CaptureRequest;
use synapse::classifier::create_classifier;
use synapse::config::{self, ServiceCredentials};
use synapse::migrate;
use synapse::server;
use synapse::services::Services;
use synapse_core::classify::Signals;
use synapse_core::models::Segment;
use synapse_core::segments::Classification;

/// Synapse: capture, auto-tag, and retrieve personal content.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/synapse.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "synapse", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/synapse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it again is safe.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Classify and save a page.
    ///
    /// Without `--segment` the configured classifier picks the segments.
    Capture {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        url: String,

        #[arg(long, default_value = "")]
        title: String,

        /// Visible page text.
        #[arg(long, default_value = "")]
        text: String,

        /// Explicit segment label; repeat for multi-segment captures.
        #[arg(long = "segment")]
        segments: Vec<String>,

        /// Record the URL as an image.
        #[arg(long)]
        images: bool,

        /// Record the URL as a video.
        #[arg(long)]
        videos: bool,

        /// Record the URL as an outbound link.
        #[arg(long)]
        links: bool,
    },

    /// Print an owner's saved content, newest first.
    List {
        #[arg(long)]
        owner: String,

        /// Only show rows in this segment.
        #[arg(long)]
        segment: Option<String>,

        /// Only show rows whose text, URL, or media fields contain this.
        #[arg(long)]
        query: Option<String>,
    },

    /// Search an owner's content.
    Search {
        /// Free-text prompt, e.g. "articles from last week about databases".
        prompt: String,

        #[arg(long)]
        owner: String,

        /// Prefer results in this segment; repeatable.
        #[arg(long = "segment")]
        segments: Vec<String>,
    },

    /// Classify page signals without saving anything.
    Classify {
        #[arg(long, default_value = "")]
        text: String,

        #[arg(long)]
        images: bool,

        #[arg(long)]
        videos: bool,

        #[arg(long)]
        links: bool,

        /// Tag name of the captured element (e.g. `img`, `article`).
        #[arg(long)]
        element_type: Option<String>,
    },
}

fn parse_segment(label: &str) -> anyhow::Result<Segment> {
    Segment::from_label(label).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown segment '{}'. Must be one of: {}",
            label,
            Segment::ALL.map(|s| s.as_str()).join(", ")
        )
    })
}

fn init_tracing(command: &Commands) {
    let default = match command {
        Commands::Serve => "synapse=info,tower_http=info",
        _ => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.command);

    let cfg = config::load_config(&cli.config)?;
    let credentials = ServiceCredentials::from_env();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized");
        }
        Commands::Serve => {
            let services = Services::open(cfg, &credentials).await?;
            server::run_server(Arc::new(services)).await?;
        }
        Commands::Capture {
            owner,
            url,
            title,
            text,
            segments,
            images,
            videos,
            links,
        } => {
            let classification = if segments.is_empty() {
                None
            } else {
                let labels = segments
                    .iter()
                    .map(|s| parse_segment(s).map(|seg| seg.as_str().to_string()))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                Some(Classification {
                    categories: Some(labels),
                    ..Classification::default()
                })
            };

            let mut content = serde_json::Map::new();
            if images {
                content.insert("images".to_string(), json!([{ "src": url }]));
            }
            if videos {
                content.insert("videos".to_string(), json!([{ "src": url }]));
            }
            if links {
                content.insert("links".to_string(), json!([{ "href": url }]));
            }

            let request = CaptureRequest {
                url: url.clone(),
                title,
                content_text: text,
                classification,
                metadata: json!({ "content": content }),
                ..CaptureRequest::default()
            };

            let services = Services::open(cfg, &credentials).await?;
            let outcome = services.capture(&owner, request).await?;
            print_json(&outcome)?;
        }
        Commands::List {
            owner,
            segment,
            query,
        } => {
            let segment = segment.as_deref().map(parse_segment).transpose()?;
            let services = Services::open(cfg, &credentials).await?;
            let items = services.list(&owner, segment, query.as_deref()).await?;
            print_json(&items)?;
        }
        Commands::Search {
            prompt,
            owner,
            segments,
        } => {
            let segments = segments
                .iter()
                .map(|s| parse_segment(s))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let services = Services::open(cfg, &credentials).await?;
            let response = services.search(&owner, &prompt, &segments).await?;
            print_json(&response)?;
        }
        Commands::Classify {
            text,
            images,
            videos,
            links,
            element_type,
        } => {
            let classifier = create_classifier(&cfg.classifier, &credentials)?;
            let signals = Signals {
                text,
                has_images: images,
                has_videos: videos,
                has_links: links,
                element_type,
            };
            let result = classifier.classify(&signals).await;
            print_json(&result)?;
        }
    }

    Ok(())
}
