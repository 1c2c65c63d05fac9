//! Protocols with gender clues in their PatientCharacteristics block (BZIssue::2830).
//!
//! Two flavours:
//!   original - any of male/female/men/women inside the element
//!   revised  - the word must follow a "Sex" label, and ids already handled
//!              in the Request2713 spreadsheet can be skipped

mod clues;
mod db;
mod report;
mod skip_list;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use serde::Deserialize;
use tracing::{debug, info};

use clues::Variant;
use report::Report;
use skip_list::SkipList;

#[derive(Parser)]
#[command(name = "request2830", about = "Report protocols with gender clues")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Any target word inside PatientCharacteristics
    Original,
    /// Target word must follow a "Sex" label
    Revised {
        /// Spreadsheet XML export listing CDR ids already processed
        skip_list: Option<PathBuf>,
    },
}

#[derive(Debug, Deserialize)]
struct Settings {
    #[serde(default = "default_db_path")]
    db_path: PathBuf,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/cdr.sqlite")
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
    info!(settings_loaded = ?settings, msg = "Starting gender clue report");

    let (variant, skip) = match cli.command {
        Commands::Original => (Variant::Original, SkipList::empty()),
        Commands::Revised { skip_list } => {
            let skip = match skip_list {
                Some(path) => SkipList::load(&path)?,
                None => SkipList::empty(),
            };
            (Variant::Revised, skip)
        }
    };

    let conn = db::connect(&settings.db_path)?;
    let progress = progress_line()?;
    let report = run(&conn, variant, &skip, &progress)?;
    progress.finish();

    let out = settings.output_dir.join(variant.output_file());
    report.write(&out)?;
    if report.is_empty() {
        println!("\nNo matching documents; empty report written to {:?}", out);
    } else {
        println!("\n{} matching documents written to {:?}", report.len(), out);
    }
    Ok(())
}

/// Single console line, rewritten in place with the running count.
fn progress_line() -> Result<ProgressBar> {
    let pb = ProgressBar::no_length();
    pb.set_style(ProgressStyle::with_template("processed {pos} documents")?);
    Ok(pb)
}

/// Store errors are not caught: any failure aborts the whole report.
fn run(
    conn: &Connection,
    variant: Variant,
    skip: &SkipList,
    progress: &ProgressBar,
) -> Result<Report> {
    let regex = clues::clue_regex(variant)?;
    debug!(pattern = %regex.as_str(), "compiled clue expression");

    if !skip.is_empty() {
        info!(already_done = skip.len(), "skipping ids from earlier request");
    }
    let doc_ids: Vec<i64> = db::tagged_doc_ids(conn)?
        .into_iter()
        .filter(|id| !skip.contains(*id))
        .collect();
    println!("{} doc ids collected", doc_ids.len());

    let mut report = Report::new();
    for doc_id in doc_ids {
        let Some(doc) = db::fetch_document(conn, doc_id)? else {
            continue;
        };
        progress.inc(1);
        if regex.is_match(&doc.xml) {
            report.push(doc.id, &doc.title);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::db::fixtures::{add_protocol, conn};
    use super::*;

    const SEX_FEMALE: &str = "<InScopeProtocol><PatientCharacteristics>\n\
                              <Para>Sex: Female</Para>\n\
                              </PatientCharacteristics></InScopeProtocol>";
    const FEMALE_ONLY: &str =
        "<InScopeProtocol><PatientCharacteristics>Female patients only</PatientCharacteristics></InScopeProtocol>";
    const NO_CLUE: &str =
        "<InScopeProtocol><PatientCharacteristics>Age 18 and over</PatientCharacteristics></InScopeProtocol>";

    fn sample() -> Connection {
        let conn = conn();
        add_protocol(&conn, 30, "Third <trial>", FEMALE_ONLY, true);
        add_protocol(&conn, 10, "First & foremost", SEX_FEMALE, true);
        add_protocol(&conn, 20, "Second", NO_CLUE, true);
        add_protocol(&conn, 40, "Untagged", SEX_FEMALE, false);
        conn
    }

    fn rows(html: &str) -> Vec<&str> {
        html.match_indices("<td>")
            .step_by(2)
            .map(|(i, _)| {
                let rest = &html[i + 4..];
                &rest[..rest.find("</td>").unwrap()]
            })
            .collect()
    }

    #[test]
    fn original_lists_every_clue_in_id_order() {
        let conn = sample();
        let report = run(
            &conn,
            Variant::Original,
            &SkipList::empty(),
            &ProgressBar::hidden(),
        )
        .unwrap();
        let html = report.render();
        assert_eq!(rows(&html), vec!["10", "30"]);
        assert!(html.contains("First &amp; foremost"));
        assert!(html.contains("Third &lt;trial&gt;"));
    }

    #[test]
    fn revised_requires_sex_label() {
        let conn = sample();
        let report = run(
            &conn,
            Variant::Revised,
            &SkipList::empty(),
            &ProgressBar::hidden(),
        )
        .unwrap();
        assert_eq!(rows(&report.render()), vec!["10"]);
    }

    #[test]
    fn skipped_ids_are_never_fetched() {
        let conn = sample();
        let skip = SkipList::parse(
            r#"<Workbook><Sheet><Row number="1"><Col number="0">CDR0000000010</Col></Row></Sheet></Workbook>"#,
        )
        .unwrap();
        let progress = ProgressBar::hidden();
        let report = run(&conn, Variant::Original, &skip, &progress).unwrap();
        assert_eq!(rows(&report.render()), vec!["30"]);
        // 20 and 30 fetched, 10 skipped
        assert_eq!(progress.position(), 2);
    }

    #[test]
    fn store_failure_aborts() {
        let conn = Connection::open_in_memory().unwrap();
        let result = run(&conn, Variant::Original, &SkipList::empty(), &ProgressBar::hidden());
        assert!(result.is_err());
    }
}
