use anyhow::Result;
use regex::{Regex, RegexBuilder};

const ELEMENT: &str = "PatientCharacteristics";
const TARGETS: [&str; 4] = ["male", "female", "men", "women"];
const SEX_MARKER: &str = r"\Wsex\W";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Any of the target words inside the element.
    Original,
    /// Target word must follow a `Sex` label inside the element.
    Revised,
}

impl Variant {
    pub fn output_file(self) -> &'static str {
        match self {
            Variant::Original => "Request2830.html",
            Variant::Revised => "Request2830_revised.html",
        }
    }
}

pub fn clue_pattern(variant: Variant) -> String {
    let choices = TARGETS.join("|");
    match variant {
        Variant::Original => format!(r"<{0}.*?\W({1})\W.*?</{0}>", ELEMENT, choices),
        Variant::Revised => {
            format!(r"<{0}.*?{1}.*?\W({2})\W.*?</{0}>", ELEMENT, SEX_MARKER, choices)
        }
    }
}

/// Case-insensitive, `.` spans newlines, so a match runs from the opening
/// tag to the closing tag whatever lies between.
pub fn clue_regex(variant: Variant) -> Result<Regex> {
    let re = RegexBuilder::new(&clue_pattern(variant))
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()?;
    Ok(re)
}
