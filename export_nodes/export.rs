use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::store::EntityStore;

pub const LANGCODES: [&str; 2] = ["en", "es"];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub nodes: usize,
    pub missing: usize,
    pub files: usize,
}

/// Dump each node's translations, and the sections they reference, as
/// pretty-printed JSON. Missing nodes are reported and skipped; store
/// failures abort.
pub fn export(
    store: &mut dyn EntityStore,
    nids: &[u64],
    output_dir: &Path,
) -> Result<ExportSummary> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {:?}", output_dir))?;
    let mut summary = ExportSummary::default();

    for &nid in nids {
        let Some(node) = store.load_node(nid)? else {
            println!("node {} not found", nid);
            summary.missing += 1;
            continue;
        };
        for code in LANGCODES {
            let Some(translation) = node.translation(code) else {
                continue;
            };
            write_json(output_dir, &format!("node-{}-{}.json", nid, code), &translation.fields)?;
            summary.files += 1;

            // no dedup: a section shared by two nodes is simply written again
            for &sid in &translation.sections {
                let Some(section) = store.load_section(sid)? else {
                    warn!(nid, sid, "section not found");
                    continue;
                };
                let Some(values) = section.translation_or_default(code) else {
                    continue;
                };
                write_json(output_dir, &format!("section-{}-{}.json", sid, code), &values.fields)?;
                summary.files += 1;
            }
        }
        summary.nodes += 1;
        println!("{}", node.id);
    }
    Ok(summary)
}

fn write_json(dir: &Path, name: &str, fields: &Map<String, Value>) -> Result<()> {
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(fields)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))
}
