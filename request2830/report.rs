use anyhow::{Context, Result};
use quick_xml::escape::escape;
use std::fs;
use std::path::Path;

const HEAD: &str = "
<html>
 <head>
  <meta http-equiv='Content-Type' content='text/html; charset=utf-8' />
  <title>Protocols with Gender Clues</title>
  <style type='text/css'>
   body   { font-family: Arial; }
   h1     { font-size: 14pt; }
   td, th { font-size: 10pt; }
   td     { vertical-align: top; }
  </style>
 </head>
 <body>
  <h1>Protocols with Gender Clues</h1>
  <table border='1' cellpadding='2' cellspacing='0'>
   <tr>
    <th>CDR ID</th>
    <th>Doc Title</th>
   </tr>
";

const TAIL: &str = "
  </table>
 </body>
</html>
";

/// Rows accumulate in the order documents are processed.
#[derive(Debug, Default)]
pub struct Report {
    rows: String,
    count: usize,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, doc_id: i64, title: &str) {
        self.rows.push_str(&format!(
            "
   <tr>
    <td>{}</td>
    <td>{}</td>
   </tr>
",
            doc_id,
            escape(title)
        ));
        self.count += 1;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn render(&self) -> String {
        let mut html = String::with_capacity(HEAD.len() + self.rows.len() + TAIL.len());
        html.push_str(HEAD);
        html.push_str(&self.rows);
        html.push_str(TAIL);
        html
    }

    /// Overwrites whatever a previous run left at `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render()).with_context(|| format!("Failed to write {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_are_escaped() {
        let mut report = Report::new();
        report.push(62779, "Tamoxifen <or> Raloxifene & Friends");
        let html = report.render();
        assert!(html.contains("<td>62779</td>"));
        assert!(html.contains("<td>Tamoxifen &lt;or&gt; Raloxifene &amp; Friends</td>"));
        assert!(!html.contains("<or>"));
    }

    #[test]
    fn rows_keep_insertion_order() {
        let mut report = Report::new();
        report.push(1, "first");
        report.push(2, "second");
        let html = report.render();
        assert_eq!(report.len(), 2);
        assert!(html.find("first").unwrap() < html.find("second").unwrap());
        assert_eq!(html.matches("<tr>").count(), 3);
    }

    #[test]
    fn empty_report_is_still_a_page() {
        let html = Report::new().render();
        assert!(html.contains("<th>CDR ID</th>"));
        assert!(html.trim_end().ends_with("</html>"));
        assert_eq!(html.matches("<td>").count(), 0);
    }

    #[test]
    fn write_replaces_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Request2830.html");
        fs::write(&path, "stale").unwrap();

        let mut report = Report::new();
        report.push(7, "fresh");
        report.write(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(!written.contains("stale"));
        assert!(written.contains("<td>fresh</td>"));
    }
}
