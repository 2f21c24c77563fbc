//! TOML front-matter documents.
//!
//! A document is a `+++` line, a TOML block, a second `+++` line, and an
//! optional markdown body:
//!
//! ```text
//! +++
//! title = "ride"
//! draft = true
//! +++
//! Body text
//! ```
//!
//! The body is kept verbatim so that saving a loaded document does not drop
//! hand-written content.

use thiserror::Error;
use toml::Value;

use tp_core::{FieldValue, Fields};

const MARKER: &str = "+++";

#[derive(Debug, Error)]
pub enum FrontMatterError {
    #[error("document does not start with a {MARKER} line")]
    MissingOpen,
    #[error("front matter is not closed by a {MARKER} line")]
    Unterminated,
    #[error("invalid front matter: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize front matter: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A parsed front-matter document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub fields: Fields,
    pub body: String,
}

fn is_marker(line: &str) -> bool {
    line.trim_end() == MARKER
}

/// Parses a document. Blank lines before the opening marker are ignored.
pub fn parse(text: &str) -> Result<Document, FrontMatterError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.split_inclusive('\n');

    let opened = lines
        .by_ref()
        .find(|line| !line.trim().is_empty())
        .is_some_and(is_marker);
    if !opened {
        return Err(FrontMatterError::MissingOpen);
    }

    let mut block = String::new();
    loop {
        let Some(line) = lines.next() else {
            return Err(FrontMatterError::Unterminated);
        };
        if is_marker(line) {
            break;
        }
        block.push_str(line);
    }

    let table: toml::Table = block.parse()?;
    Ok(Document {
        fields: from_table(table),
        body: lines.collect(),
    })
}

/// Renders a document back to text.
pub fn render(document: &Document) -> Result<String, FrontMatterError> {
    let block = toml::to_string(&to_table(&document.fields))?;
    Ok(format!("{MARKER}\n{block}{MARKER}\n{}", document.body))
}

fn from_table(table: toml::Table) -> Fields {
    table
        .into_iter()
        .map(|(key, value)| (key, from_value(value)))
        .collect()
}

fn from_value(value: Value) -> FieldValue {
    match value {
        Value::String(s) => FieldValue::String(s),
        Value::Integer(i) => FieldValue::Integer(i),
        Value::Float(f) => FieldValue::Float(f),
        Value::Boolean(b) => FieldValue::Boolean(b),
        Value::Datetime(dt) => FieldValue::Datetime(dt.to_string()),
        Value::Array(items) => FieldValue::List(items.into_iter().map(from_value).collect()),
        Value::Table(table) => FieldValue::Table(from_table(table)),
    }
}

fn to_table(fields: &Fields) -> toml::Table {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), to_value(value)))
        .collect()
}

fn to_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Boolean(b) => Value::Boolean(*b),
        FieldValue::Integer(i) => Value::Integer(*i),
        FieldValue::Float(f) => Value::Float(*f),
        FieldValue::String(s) => Value::String(s.clone()),
        FieldValue::Datetime(s) => s
            .parse()
            .map_or_else(|_| Value::String(s.clone()), Value::Datetime),
        FieldValue::List(items) => Value::Array(items.iter().map(to_value).collect()),
        FieldValue::Table(fields) => Value::Table(to_table(fields)),
    }
}
