//! SiteSage CLI - on-page SEO audits.
//!
//! Parses arguments, wires services and prints JSON results; the audit
//! pipeline lives in the library.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use sitesage::config::AppConfig;
use sitesage::domain::models::{AuditRequest, CrawlerMode};
use sitesage::lifecycle::{self, Services};

const DEFAULT_OWNER: &str = "local";

#[derive(Parser)]
#[command(name = "sitesage")]
#[command(author, version, about = "On-page SEO auditor", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit one or more URLs
    Audit {
        /// URLs to audit (http/https)
        #[arg(required = true)]
        urls: Vec<String>,
        /// Crawler mode: standard (static HTML) or js (headless browser)
        #[arg(long, default_value = "standard")]
        mode: CrawlerMode,
        /// Write a PDF report per audit
        #[arg(long)]
        pdf: bool,
        /// Extra instructions for the narrative insights
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long, default_value = DEFAULT_OWNER)]
        owner: String,
    },
    /// Show a stored audit
    Show {
        id: String,
        #[arg(long, default_value = DEFAULT_OWNER)]
        owner: String,
    },
    /// List stored audits, newest first
    List {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
        #[arg(long, default_value = DEFAULT_OWNER)]
        owner: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    lifecycle::init_logging(config.log_filter.as_deref());

    let services = Services::setup(&config).await?;

    let result = match cli.command {
        Commands::Audit {
            urls,
            mode,
            pdf,
            prompt,
            owner,
        } => {
            let request = AuditRequest {
                urls,
                crawler_mode: mode,
                generate_pdf: pdf,
                custom_prompt: prompt,
            };
            match services.audits.process_batch(&owner, &request).await {
                Ok(items) => print_json(&items),
                Err(e) => Err(anyhow::Error::new(e).context("invalid audit request")),
            }
        }
        Commands::Show { id, owner } => match services.audits.get_audit(&owner, &id).await {
            Ok(record) => print_json(&record),
            Err(e) => Err(anyhow::Error::new(e)),
        },
        Commands::List {
            limit,
            offset,
            owner,
        } => match services.audits.list_audits(&owner, limit, offset).await {
            Ok(audits) => print_json(&audits),
            Err(e) => Err(anyhow::Error::new(e)),
        },
    };

    services.shutdown().await;
    result
}
