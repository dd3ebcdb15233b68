//! Tool descriptors returned by `list_tools`.

use serde_json::{Value, json};

pub const SEARCH_DOCUMENTS: &str = "search_documents";
pub const ESTIMATE_COST: &str = "estimate_cost";
pub const GET_CONFIG: &str = "get_config";
pub const UPDATE_CONFIG: &str = "update_config";
pub const IMPORT_DOCUMENTS: &str = "import_documents";

pub fn descriptors() -> Value {
    json!({
        "tools": [
            {
                "name": SEARCH_DOCUMENTS,
                "description": "Search the knowledge base. Returns relevant documents, or recommends using an LLM when no good match is found.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "The search query"},
                        "topK": {"type": "number", "description": "Number of results to return", "default": 5},
                        "scoreThreshold": {"type": "number", "description": "Minimum similarity score", "default": 0.82},
                        "useRerank": {"type": "boolean", "description": "Rerank candidates before thresholding", "default": true},
                        "estimateOnly": {"type": "boolean", "description": "Only estimate cost without searching", "default": false},
                        "filters": {"type": "object", "description": "Payload filter options"}
                    },
                    "required": ["query"]
                }
            },
            {
                "name": ESTIMATE_COST,
                "description": "Estimate the cost of a search operation",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "The search query to estimate cost for"},
                        "useRerank": {"type": "boolean", "description": "Include rerank cost", "default": true}
                    },
                    "required": ["query"]
                }
            },
            {
                "name": GET_CONFIG,
                "description": "Get the current configuration",
                "inputSchema": {"type": "object", "properties": {}}
            },
            {
                "name": UPDATE_CONFIG,
                "description": "Apply a partial configuration update",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "updates": {"type": "object", "description": "Configuration updates to apply"}
                    },
                    "required": ["updates"]
                }
            },
            {
                "name": IMPORT_DOCUMENTS,
                "description": "Embed and index documents",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "documents": {
                            "type": "array",
                            "description": "Documents with id, content and optional title, source, metadata",
                            "items": {"type": "object"}
                        }
                    },
                    "required": ["documents"]
                }
            }
        ]
    })
}
