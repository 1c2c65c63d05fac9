use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

const NCT_ID_PATH: &str = "/InScopeProtocol/ProtocolIDs/OtherID/IDType";
const NCT_ID_TYPE: &str = "ClinicalTrials.gov ID";

/// Per-query limit, sized for the full unfiltered id set.
const QUERY_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: i64,
    pub title: String,
    pub xml: String,
}

pub fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.busy_timeout(QUERY_TIMEOUT)?;
    Ok(conn)
}

/// Ids of protocols carrying a ClinicalTrials.gov id, ascending.
pub fn tagged_doc_ids(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT doc_id
           FROM query_term
          WHERE path = ?1
            AND value = ?2
       ORDER BY doc_id",
    )?;
    let ids = stmt
        .query_map(params![NCT_ID_PATH, NCT_ID_TYPE], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

pub fn fetch_document(conn: &Connection, id: i64) -> Result<Option<DocumentRecord>> {
    let mut stmt = conn.prepare_cached("SELECT title, xml FROM document WHERE id = ?1")?;
    let doc = stmt
        .query_row(params![id], |row| {
            Ok(DocumentRecord {
                id,
                title: row.get(0)?,
                xml: row.get(1)?,
            })
        })
        .optional()?;
    Ok(doc)
}
