use std::fmt::Write as FmtWrite;

use serde_json::{Value, json};

use crate::models::{CostEstimate, LogEntry, OutputFormat, SearchResponse};
use crate::server::estimate_json;
use crate::services::ImportSummary;
use crate::utils::preview;

const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_search_response(&self, query: &str, response: &SearchResponse) -> String;
    fn format_estimate(&self, estimate: &CostEstimate) -> String;
    fn format_config(&self, config: &Value) -> String;
    fn format_import_summary(&self, summary: &ImportSummary) -> String;
    fn format_log_entries(&self, entries: &[LogEntry]) -> String;
    fn format_index_status(&self, status: &IndexStatus) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct IndexStatus {
    pub url: String,
    pub collection: String,
    pub vector_size: u64,
    pub points: u64,
}

/// Writes into a `String` never fail, so the result is dropped.
fn render(f: impl FnOnce(&mut String) -> std::fmt::Result) -> String {
    let mut output = String::new();
    let _ = f(&mut output);
    output
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_response(&self, query: &str, response: &SearchResponse) -> String {
        render(|output| {
            if response.is_empty() {
                writeln!(output, "No results above threshold for: {}", query)?;
                writeln!(output, "Recommendation: answer with an LLM")?;
            } else {
                writeln!(output, "Search results for: \"{}\"", query)?;
                writeln!(output, "Found {} results\n", response.total)?;

                for (i, result) in response.results.iter().enumerate() {
                    writeln!(output, "{}. [Score: {:.3}] {}", i + 1, result.score, result.id)?;
                    if let Some(title) = result
                        .metadata
                        .as_ref()
                        .and_then(|m| m.get("title"))
                        .and_then(Value::as_str)
                    {
                        writeln!(output, "   Title: {}", title)?;
                    }
                    writeln!(output, "   ---")?;
                    for line in preview(&result.content, PREVIEW_CHARS).lines() {
                        writeln!(output, "   {}", line)?;
                    }
                    writeln!(output)?;
                }
            }

            writeln!(
                output,
                "Provider: {}  Rerank: {}  Tokens: {}  Cost: ${:.6}",
                response.provider,
                if response.rerank_used { "yes" } else { "no" },
                response.tokens_used,
                response.cost_estimate
            )
        })
    }

    fn format_estimate(&self, estimate: &CostEstimate) -> String {
        render(|output| {
            writeln!(output, "Cost estimate ({})", estimate.provider)?;
            writeln!(output, "---------------------")?;
            writeln!(output, "Embedding tokens: {}", estimate.embedding_tokens)?;
            writeln!(output, "Embedding cost:   ${:.6}", estimate.embedding_cost)?;
            writeln!(output, "Rerank cost:      ${:.6}", estimate.rerank_cost)?;
            writeln!(output, "Total cost:       ${:.6}", estimate.total_cost)
        })
    }

    fn format_config(&self, config: &Value) -> String {
        let mut lines = Vec::new();
        flatten("", config, &mut lines);
        render(|output| {
            for (key, value) in &lines {
                writeln!(output, "{} = {}", key, value)?;
            }
            Ok(())
        })
    }

    fn format_import_summary(&self, summary: &ImportSummary) -> String {
        render(|output| {
            writeln!(output, "Import complete")?;
            writeln!(output, "---------------")?;
            writeln!(output, "Documents imported: {}", summary.imported)?;
            writeln!(output, "Tokens used:        {}", summary.tokens)?;
            writeln!(output, "Estimated cost:     ${:.6}", summary.cost_estimate)
        })
    }

    fn format_log_entries(&self, entries: &[LogEntry]) -> String {
        if entries.is_empty() {
            return "No log entries found.\n".to_string();
        }

        render(|output| {
            for entry in entries {
                write!(
                    output,
                    "{} {:<15} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    log_type_name(entry),
                    entry.method.as_deref().unwrap_or("-")
                )?;
                if let Some(cost) = entry.cost_estimate {
                    write!(output, " cost=${:.6}", cost)?;
                }
                if let Some(tokens) = entry.tokens {
                    write!(output, " tokens={}", tokens)?;
                }
                if let Some(error) = &entry.error {
                    write!(output, " error=\"{}\"", error)?;
                }
                writeln!(output)?;
            }
            writeln!(output, "\n{} entries", entries.len())
        })
    }

    fn format_index_status(&self, status: &IndexStatus) -> String {
        render(|output| {
            writeln!(output, "Vector Index")?;
            writeln!(output, "------------")?;
            writeln!(output, "URL:         {}", status.url)?;
            writeln!(output, "Collection:  {}", status.collection)?;
            writeln!(output, "Vector size: {}", status.vector_size)?;
            writeln!(output, "Points:      {}", status.points)
        })
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }
}

pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render_value(&self, value: &Value) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string()) + "\n"
    }
}

impl Formatter for JsonFormatter {
    fn format_search_response(&self, query: &str, response: &SearchResponse) -> String {
        let mut value = serde_json::to_value(response).unwrap_or(Value::Null);
        if let Some(object) = value.as_object_mut() {
            object.insert("query".to_string(), json!(query));
        }
        self.render_value(&value)
    }

    fn format_estimate(&self, estimate: &CostEstimate) -> String {
        self.render_value(&estimate_json(estimate))
    }

    fn format_config(&self, config: &Value) -> String {
        self.render_value(config)
    }

    fn format_import_summary(&self, summary: &ImportSummary) -> String {
        self.render_value(&serde_json::to_value(summary).unwrap_or(Value::Null))
    }

    fn format_log_entries(&self, entries: &[LogEntry]) -> String {
        self.render_value(&json!({ "entries": entries, "total": entries.len() }))
    }

    fn format_index_status(&self, status: &IndexStatus) -> String {
        self.render_value(&json!({
            "url": status.url,
            "collection": status.collection,
            "vectorSize": status.vector_size,
            "points": status.points,
        }))
    }

    fn format_message(&self, message: &str) -> String {
        json!({ "message": message }).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        json!({ "error": error }).to_string()
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}

fn log_type_name(entry: &LogEntry) -> String {
    serde_json::to_value(entry.kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Flatten nested objects into dotted `key = value` pairs.
fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&path, child, out);
            }
        }
        other => out.push((prefix.to_string(), other.to_string())),
    }
}
