//! Government scheme corpus
//!
//! Loads the scheme JSON file and flattens each record into the plain-text
//! document that gets embedded and returned as retrieval context.

mod indexer;

pub use indexer::{IndexReport, SchemeIndexer, SchemeStore};

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

const UNKNOWN_SCHEME: &str = "Unknown Scheme";
const UNKNOWN_DEPARTMENT: &str = "Unknown Department";

/// One scheme as it appears in the source JSON
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemeRecord {
    #[serde(rename = "Scheme Name", default)]
    pub scheme_name: Value,

    #[serde(rename = "Department", default)]
    pub department: Value,

    #[serde(rename = "Details", default)]
    pub details: Value,

    #[serde(rename = "Benefits", default)]
    pub benefits: Value,

    #[serde(rename = "Eligibility", default)]
    pub eligibility: Value,

    /// Either free text or `{"Mode": .., "Steps": [..]}`
    #[serde(rename = "Application Process", default)]
    pub application_process: Value,

    #[serde(rename = "Documents Required", default)]
    pub documents_required: Value,
}

/// Metadata stored next to each indexed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeMetadata {
    pub scheme_name: String,
    pub department: String,
    /// Position in the source file
    pub index: usize,
}

/// Flattened, index-ready scheme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeDocument {
    /// `scheme_{index}`
    pub id: String,
    pub text: String,
    pub metadata: SchemeMetadata,
}

impl SchemeRecord {
    /// Render the record as newline-separated `Label: value` lines.
    pub fn to_document(&self, index: usize) -> SchemeDocument {
        let scheme_name = label_or(&self.scheme_name, UNKNOWN_SCHEME);
        let department = label_or(&self.department, UNKNOWN_DEPARTMENT);

        let mut lines = vec![
            format!("Scheme Name: {}", scheme_name),
            format!("Department: {}", department),
        ];

        if is_present(&self.details) {
            lines.push(format!("Details: {}", render_scalar(&self.details)));
        }
        if is_present(&self.benefits) {
            lines.push(format!("Benefits: {}", render_list(&self.benefits, "; ")));
        }
        if is_present(&self.eligibility) {
            lines.push(format!("Eligibility: {}", render_list(&self.eligibility, "; ")));
        }
        if is_present(&self.application_process) {
            lines.push(format!(
                "Application Process: {}",
                render_application_process(&self.application_process)
            ));
        }
        if is_present(&self.documents_required) {
            lines.push(format!(
                "Documents Required: {}",
                render_list(&self.documents_required, "; ")
            ));
        }

        SchemeDocument {
            id: format!("scheme_{}", index),
            text: lines.join("\n"),
            metadata: SchemeMetadata {
                scheme_name,
                department,
                index,
            },
        }
    }
}

fn label_or(value: &Value, default: &str) -> String {
    if is_present(value) {
        render_scalar(value)
    } else {
        default.to_string()
    }
}

/// Empty strings, lists, objects, null, `false` and zero count as absent.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_list(value: &Value, separator: &str) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(render_scalar)
            .collect::<Vec<_>>()
            .join(separator),
        other => render_scalar(other),
    }
}

fn render_application_process(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mode = map.get("Mode").map(render_scalar).unwrap_or_default();
            let steps = map
                .get("Steps")
                .map(|steps| render_list(steps, " "))
                .unwrap_or_default();
            format!("Mode - {}. Steps: {}", mode, steps)
        }
        other => render_scalar(other),
    }
}

/// Parse a JSON array of schemes
pub fn parse_schemes(json: &str) -> Result<Vec<SchemeRecord>> {
    serde_json::from_str(json).map_err(|e| AppError::InvalidFormat {
        message: format!("Invalid scheme file: {}", e),
    })
}

/// Load and flatten every scheme in the file
pub fn load_schemes(path: impl AsRef<Path>) -> Result<Vec<SchemeDocument>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| AppError::Configuration {
        message: format!("Cannot read scheme file {}: {}", path.display(), e),
    })?;

    Ok(parse_schemes(&json)?
        .iter()
        .enumerate()
        .map(|(i, record)| record.to_document(i))
        .collect())
}
