//! Document loading from the data directory
//!
//! `.json` files yield one document per object (or per array element), using
//! the `content`, `text` or `body` field when present. `.txt` and `.md`
//! files are read as plain text.

use crate::error::Result;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// Raw text plus the file it came from
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub source: String,
    pub text: String,
}

/// File extensions the loader understands
pub const INDEXABLE_EXTENSIONS: &[&str] = &["json", "txt", "md"];

/// Load every indexable file under `data_dir`; a missing directory is created
pub async fn load_documents(data_dir: &Path) -> Result<Vec<SourceDocument>> {
    if !data_dir.exists() {
        tokio::fs::create_dir_all(data_dir).await?;
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(data_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        paths.push(entry.path());
    }
    // stable ordering keeps chunk ids reproducible
    paths.sort();

    let mut documents = Vec::new();
    for path in paths {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let ext = ext.to_lowercase();
        if !INDEXABLE_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }

        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Error reading file {}: {}", source, e);
                continue;
            }
        };

        let texts = if ext == "json" {
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => json_texts(&value),
                Err(e) => {
                    warn!("Error reading JSON file {}: {}", source, e);
                    continue;
                }
            }
        } else {
            vec![raw]
        };

        let before = documents.len();
        documents.extend(
            texts
                .into_iter()
                .filter(|t| !t.trim().is_empty())
                .map(|text| SourceDocument {
                    source: source.clone(),
                    text,
                }),
        );
        debug!("Loaded {} documents from {}", documents.len() - before, source);
    }

    Ok(documents)
}

/// Texts contained in a JSON value
pub fn json_texts(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(item_text).collect(),
        other => vec![item_text(other)],
    }
}

fn item_text(value: &Value) -> String {
    match value {
        Value::Object(map) => ["content", "text", "body"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                _ => None,
            })
            .unwrap_or_else(|| value.to_string()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_json_texts() {
        let value = json!([
            {"content": "first"},
            {"text": "second"},
            {"body": "third"},
            {"title": "no text field"},
            "plain"
        ]);
        let texts = json_texts(&value);
        assert_eq!(texts[0], "first");
        assert_eq!(texts[1], "second");
        assert_eq!(texts[2], "third");
        assert!(texts[3].contains("no text field"));
        assert_eq!(texts[4], "plain");

        assert_eq!(json_texts(&json!({"content": "single"})), vec!["single"]);
    }

    #[tokio::test]
    async fn test_load_documents() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("a_research.json"),
            r#"[{"url": "u", "content": "about qubits"}]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.md"), "# Notes\nentanglement").unwrap();
        std::fs::write(dir.path().join("broken.json"), "{oops").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let docs = load_documents(dir.path()).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source, "a_research.json");
        assert_eq!(docs[0].text, "about qubits");
        assert_eq!(docs[1].source, "notes.md");
    }

    #[tokio::test]
    async fn test_missing_dir_is_created() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        assert!(load_documents(&data).await.unwrap().is_empty());
        assert!(data.exists());
    }
}
