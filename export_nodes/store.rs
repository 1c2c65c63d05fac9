use reqwest::blocking::Client;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Reference fields whose targets are dumped alongside the node.
pub const SECTION_FIELDS: [&str; 2] = ["field_article_body", "field_landing_contents"];

/// Node bundles tried in order, each with the child field to include.
const NODE_TYPES: [(&str, &str); 2] = [
    ("cgov_article", "field_article_body"),
    ("cgov_mini_landing", "field_landing_contents"),
];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("node {nid} ({langcode}): {status}")]
    Status {
        nid: u64,
        langcode: String,
        status: reqwest::StatusCode,
    },
    #[error("unexpected JSON:API payload: {0}")]
    Payload(String),
}

/// One language version of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub fields: Map<String, Value>,
    pub sections: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: u64,
    pub translations: BTreeMap<String, Translation>,
    /// Language the entity was first loaded in.
    pub default_langcode: String,
}

impl Entity {
    pub fn translation(&self, langcode: &str) -> Option<&Translation> {
        self.translations.get(langcode)
    }

    /// The requested language if present, else the default one.
    pub fn translation_or_default(&self, langcode: &str) -> Option<&Translation> {
        self.translation(langcode)
            .or_else(|| self.translations.get(&self.default_langcode))
    }
}

pub trait EntityStore {
    /// `Ok(None)` when no node has this id.
    fn load_node(&mut self, nid: u64) -> Result<Option<Entity>, StoreError>;
    fn load_section(&mut self, sid: u64) -> Result<Option<Entity>, StoreError>;
}

/// Pulls nodes from Drupal's JSON:API. Sections arrive in the `included`
/// array of the node request and are served from that cache.
pub struct JsonApiStore {
    client: Client,
    base_url: String,
    langcodes: Vec<String>,
    sections: HashMap<u64, Entity>,
}

impl JsonApiStore {
    pub fn new(base_url: &str, langcodes: &[&str]) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(JsonApiStore {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            langcodes: langcodes.iter().map(|c| c.to_string()).collect(),
            sections: HashMap::new(),
        })
    }

    fn node_url(&self, node_type: &str, include: &str, nid: u64, langcode: &str) -> String {
        let prefix = if langcode == "es" { "espanol/" } else { "" };
        format!(
            "{}/{}jsonapi/node/{}?filter[drupal_internal__nid]={}&include={}",
            self.base_url, prefix, node_type, nid, include
        )
    }

    /// First node type answering with data wins. A non-success status only
    /// aborts when no node type answered successfully.
    fn fetch(&self, nid: u64, langcode: &str) -> Result<Option<Value>, StoreError> {
        let mut answered = false;
        let mut last_status = None;
        for (node_type, include) in NODE_TYPES {
            let url = self.node_url(node_type, include, nid, langcode);
            debug!(url = %url, "fetching");
            let response = self.client.get(&url).send()?;
            if !response.status().is_success() {
                debug!(url = %url, status = %response.status(), "request refused");
                last_status = Some(response.status());
                continue;
            }
            answered = true;
            let doc: Value = response.json()?;
            if has_data(&doc) {
                return Ok(Some(doc));
            }
        }
        match last_status {
            Some(status) if !answered => Err(StoreError::Status {
                nid,
                langcode: langcode.to_string(),
                status,
            }),
            _ => Ok(None),
        }
    }
}

impl EntityStore for JsonApiStore {
    fn load_node(&mut self, nid: u64) -> Result<Option<Entity>, StoreError> {
        let mut node: Option<Entity> = None;
        for langcode in self.langcodes.clone() {
            let Some(doc) = self.fetch(nid, &langcode)? else {
                continue;
            };
            let (translation, included) = parse_document(&doc)?;
            // Drupal serves the source language when a translation is missing.
            if !in_language(&translation, &langcode) {
                debug!(nid, langcode = %langcode, "no translation");
                continue;
            }
            for (sid, section) in included {
                merge_translation(&mut self.sections, sid, &langcode, section);
            }
            let entity = node.get_or_insert_with(|| Entity {
                id: nid,
                translations: BTreeMap::new(),
                default_langcode: langcode.clone(),
            });
            entity.translations.insert(langcode.clone(), translation);
        }
        if let Some(entity) = &node {
            info!(nid, languages = ?entity.translations.keys().collect::<Vec<_>>(), "loaded node");
        }
        Ok(node)
    }

    fn load_section(&mut self, sid: u64) -> Result<Option<Entity>, StoreError> {
        Ok(self.sections.get(&sid).cloned())
    }
}

fn merge_translation(
    cache: &mut HashMap<u64, Entity>,
    id: u64,
    langcode: &str,
    translation: Translation,
) {
    cache
        .entry(id)
        .or_insert_with(|| Entity {
            id,
            translations: BTreeMap::new(),
            default_langcode: langcode.to_string(),
        })
        .translations
        .insert(langcode.to_string(), translation);
}

fn in_language(translation: &Translation, langcode: &str) -> bool {
    match translation.fields.get("langcode").and_then(Value::as_str) {
        Some(code) => code == langcode,
        None => true,
    }
}

fn has_data(doc: &Value) -> bool {
    match doc.get("data") {
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(_)) => true,
        _ => false,
    }
}

/// Split a JSON:API document into the node translation and the included
/// sections, keyed by their internal ids.
fn parse_document(doc: &Value) -> Result<(Translation, Vec<(u64, Translation)>), StoreError> {
    let resource = match doc.get("data") {
        Some(Value::Array(items)) => items.first(),
        Some(data @ Value::Object(_)) => Some(data),
        _ => None,
    }
    .ok_or_else(|| StoreError::Payload("missing data".into()))?;
    let node = parse_resource(resource)?;

    let mut included = Vec::new();
    if let Some(Value::Array(items)) = doc.get("included") {
        for item in items {
            let Some(id) = item
                .pointer("/attributes/drupal_internal__id")
                .and_then(Value::as_u64)
            else {
                debug!(kind = ?item.get("type"), "included resource without internal id");
                continue;
            };
            included.push((id, parse_resource(item)?));
        }
    }
    Ok((node, included))
}

/// Attributes plus relationship data, flattened into one field map.
fn parse_resource(resource: &Value) -> Result<Translation, StoreError> {
    let mut fields = match resource.get("attributes") {
        Some(Value::Object(attrs)) => attrs.clone(),
        _ => return Err(StoreError::Payload("resource without attributes".into())),
    };
    let mut sections = Vec::new();
    if let Some(Value::Object(rels)) = resource.get("relationships") {
        for (name, rel) in rels {
            let data = rel.get("data").cloned().unwrap_or(Value::Null);
            if SECTION_FIELDS.contains(&name.as_str()) {
                sections.extend(target_ids(&data));
            }
            fields.insert(name.clone(), data);
        }
    }
    Ok(Translation { fields, sections })
}

fn target_ids(data: &Value) -> Vec<u64> {
    let items: Vec<&Value> = match data {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![data],
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| {
            item.pointer("/meta/drupal_internal__target_id")
                .and_then(Value::as_u64)
        })
        .collect()
}
