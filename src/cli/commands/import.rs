//! Import command implementation.

use anyhow::{Context, Result};
use clap::Args;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::CommandContext;
use crate::models::Document;

/// Arguments for the import command.
#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Path to JSON or JSONL file (use - for stdin)
    #[arg()]
    pub file: Option<PathBuf>,

    /// Only validate the import file without indexing
    #[arg(long)]
    pub validate_only: bool,
}

/// Handle the import command.
pub async fn handle_import(args: ImportArgs, ctx: &CommandContext<'_>) -> Result<()> {
    let formatter = ctx.formatter();
    let start_time = Instant::now();

    let input = read_input(args.file.as_deref())?;
    let documents = parse_documents(&input)?;

    if documents.is_empty() {
        println!(
            "{}",
            formatter.format_message("No documents found in input.")
        );
        return Ok(());
    }

    if let Some(doc) = documents
        .iter()
        .find(|d| d.id.trim().is_empty() || d.content.trim().is_empty())
    {
        anyhow::bail!(
            "every document needs a non-empty id and content (offending id: '{}')",
            doc.id
        );
    }

    if ctx.verbose || args.validate_only {
        eprintln!("Found {} documents to import", documents.len());
    }

    if args.validate_only {
        println!(
            "{}",
            formatter.format_message(&format!(
                "Validation successful: {} documents ready for import",
                documents.len()
            ))
        );
        return Ok(());
    }

    ctx.server
        .ensure_index(false)
        .await
        .context("failed to prepare vector collection")?;

    let pipeline = ctx.server.pipeline().await;
    if pipeline.retriever().index().is_none() {
        tracing::warn!("vector index disabled; documents are held in memory for this run only");
    }

    let summary = pipeline
        .import_documents(&ctx.user_id(), documents)
        .await
        .context("import failed")?;

    if ctx.verbose {
        eprintln!("Import completed in {}ms", start_time.elapsed().as_millis());
    }

    print!("{}", formatter.format_import_summary(&summary));

    Ok(())
}

/// Read input from file or stdin.
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path.to_string_lossy() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .context("failed to read stdin")?;
            Ok(input)
        }
    }
}

/// Parse documents from a JSON array or JSONL.
fn parse_documents(input: &str) -> Result<Vec<Document>> {
    let input = input.trim();

    if input.is_empty() {
        return Ok(Vec::new());
    }

    if input.starts_with('[') {
        return serde_json::from_str(input).context("failed to parse JSON array");
    }

    let mut documents = Vec::new();
    for (i, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let doc: Document = serde_json::from_str(line)
            .with_context(|| format!("failed to parse JSON at line {}", i + 1))?;
        documents.push(doc);
    }

    Ok(documents)
}
