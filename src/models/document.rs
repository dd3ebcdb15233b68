use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A knowledge base document. Content is immutable once indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: id.into(),
            content: content.into(),
            title: None,
            source: None,
            metadata: None,
            created_at: Some(now.clone()),
            updated_at: Some(now),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Vector stores only accept UUID or integer point ids, so document ids are
    /// mapped onto a stable UUIDv5.
    pub fn point_id(id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_stable() {
        assert_eq!(Document::point_id("faq-1"), Document::point_id("faq-1"));
        assert_ne!(Document::point_id("faq-1"), Document::point_id("faq-2"));
        assert!(Uuid::parse_str(&Document::point_id("faq-1")).is_ok());
    }

    #[test]
    fn test_document_deserialize_camel_case() {
        let doc: Document = serde_json::from_str(
            r#"{"id":"a","content":"hello","createdAt":"2024-01-01T00:00:00Z","metadata":{"tags":["x"]}}"#,
        )
        .unwrap();
        assert_eq!(doc.created_at.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert!(doc.metadata.unwrap().contains_key("tags"));
        assert!(doc.title.is_none());
    }
}
