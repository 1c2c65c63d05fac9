//! Ids already handled in an earlier request, read from the spreadsheet
//! export attached to that request.
//!
//! The export looks like:
//!
//! ```xml
//! <Workbook>
//!   <Sheet name="Sheet1">
//!     <Row number="0"><Col number="0">CDR ID</Col>...</Row>
//!     <Row number="1"><Col number="0">CDR0000062779</Col>...</Row>
//!   </Sheet>
//! </Workbook>
//! ```

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SkipListError {
    #[error("malformed spreadsheet XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("bad attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),
    #[error("no Sheet element")]
    MissingSheet,
    #[error("sheet has no data rows")]
    MissingRows,
}

#[derive(Debug, Default)]
pub struct SkipList {
    ids: HashSet<i64>,
}

impl SkipList {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Unreadable files are an error; unusable content is an empty list.
    pub fn load(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path)
            .with_context(|| format!("Failed to read skip list {:?}", path))?;
        let list = Self::parse(&xml).unwrap_or_else(|e| {
            warn!(path = ?path, error = %e, "ignoring skip list");
            Self::empty()
        });
        println!("{} already done", list.len());
        Ok(list)
    }

    /// Padded `CDR0000062779` entries are accepted alongside plain ids.
    pub fn parse(xml: &str) -> Result<Self, SkipListError> {
        let mut ids = HashSet::new();
        for raw in first_column(xml)? {
            match normalize_id(&raw) {
                Some(id) => {
                    ids.insert(id);
                }
                None => debug!(value = %raw, "not a CDR id"),
            }
        }
        Ok(SkipList { ids })
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Text of column 0 for every non-header row of the first sheet.
fn first_column(xml: &str) -> Result<Vec<String>, SkipListError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut values = Vec::new();

    // Element depth: 1 = root, 2 = Sheet, 3 = Row, 4 = Col.
    let mut depth = 0usize;
    let mut seen_sheet = false;
    let mut seen_row = false;
    let mut in_sheet = false;
    let mut in_data_row = false;
    let mut cell: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                let name = e.name();
                match (depth, name.as_ref()) {
                    (2, b"Sheet") if !seen_sheet => {
                        seen_sheet = true;
                        in_sheet = true;
                    }
                    (3, b"Row") if in_sheet => {
                        seen_row = true;
                        in_data_row = number(&e)?.as_deref() != Some("0");
                    }
                    (4, b"Col") if in_data_row => {
                        if number(&e)?.as_deref() == Some("0") {
                            cell = Some(String::new());
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if depth == 1 && e.name().as_ref() == b"Sheet" && !seen_sheet {
                    seen_sheet = true;
                } else if depth == 2 && in_sheet && e.name().as_ref() == b"Row" {
                    seen_row = true;
                }
            }
            Event::Text(e) => {
                if let Some(text) = cell.as_mut() {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(text) = cell.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(_) => {
                match depth {
                    4 => {
                        if let Some(text) = cell.take() {
                            values.push(text);
                        }
                    }
                    3 => in_data_row = false,
                    2 => {
                        if in_sheet {
                            // only the first sheet counts
                            break;
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_sheet {
        return Err(SkipListError::MissingSheet);
    }
    if !seen_row {
        return Err(SkipListError::MissingRows);
    }
    Ok(values)
}

fn number(e: &BytesStart) -> Result<Option<String>, SkipListError> {
    match e.try_get_attribute("number")? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

/// Accepts `62779` as well as the padded `CDR0000062779` form.
fn normalize_id(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("CDR")
        .or_else(|| trimmed.strip_prefix("cdr"))
        .unwrap_or(trimmed)
        .trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.xml", name)).unwrap()
    }

    #[test]
    fn request2713_export() {
        let list = SkipList::parse(&fixture("request2713")).unwrap();
        assert_eq!(list.len(), 3);
        assert!(list.contains(62779));
        assert!(list.contains(68871));
        assert!(list.contains(433459));
        // second sheet is never read
        assert!(!list.contains(999999));
    }

    #[test]
    fn header_row_is_skipped() {
        let xml = r#"<Workbook><Sheet>
            <Row number="0"><Col number="0">12345</Col></Row>
            <Row number="1"><Col number="0">678</Col><Col number="1">9</Col></Row>
        </Sheet></Workbook>"#;
        let list = SkipList::parse(xml).unwrap();
        assert!(!list.contains(12345));
        assert!(list.contains(678));
        assert!(!list.contains(9));
    }

    #[test]
    fn missing_sheet_or_rows() {
        assert!(matches!(
            SkipList::parse("<Workbook/>"),
            Err(SkipListError::MissingSheet)
        ));
        assert!(matches!(
            SkipList::parse("<Workbook><Sheet></Sheet></Workbook>"),
            Err(SkipListError::MissingRows)
        ));
    }

    #[test]
    fn malformed_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xml");
        std::fs::write(&path, "<Workbook><Sheet><Row number='1'></Col></Workbook>").unwrap();
        let list = SkipList::load(&path).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SkipList::load(&dir.path().join("absent.xml")).is_err());
    }

    #[test]
    fn id_forms() {
        assert_eq!(normalize_id(" 62779 "), Some(62779));
        assert_eq!(normalize_id("CDR0000062779"), Some(62779));
        assert_eq!(normalize_id("CDR ID"), None);
        assert_eq!(normalize_id(""), None);
    }
}
