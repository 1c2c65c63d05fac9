//! Capture the values of specific Drupal nodes as JSON.
//!
//! Each node's English and Spanish translations land in
//! `node-<nid>-<lang>.json`; the body sections they reference land in
//! `section-<sid>-<lang>.json`. The files feed the script that builds CDR
//! summary XML for the PDQ data partners.

mod export;
mod store;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use config::Config;
use serde::Deserialize;
use tracing::info;

use store::JsonApiStore;

#[derive(Parser)]
#[command(name = "export_nodes", about = "Dump Drupal node translations to JSON")]
struct Cli {
    /// Node ids to capture
    #[arg(required = true)]
    nids: Vec<u64>,
    /// Output directory (overrides CDR_OUTPUT_DIR)
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct Settings {
    #[serde(default = "default_drupal_url")]
    drupal_url: String,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
}

fn default_drupal_url() -> String {
    "https://www-cms.cancer.gov".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Settings {
    fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(config::Environment::with_prefix("CDR"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    info!(settings_loaded = ?settings, msg = "Starting node export");

    let output_dir = cli.directory.unwrap_or(settings.output_dir);
    let mut store = JsonApiStore::new(&settings.drupal_url, &export::LANGCODES)?;
    let summary = export::export(&mut store, &cli.nids, &output_dir)?;

    println!(
        "\n{} nodes exported ({} not found), {} files in {:?}",
        summary.nodes, summary.missing, summary.files, output_dir
    );
    Ok(())
}
