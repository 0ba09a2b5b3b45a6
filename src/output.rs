//! Rendering of search results
use crate::search::SearchResult;
use serde_json::{json, Value};
use std::path::Path;

/// Output format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

/// Output formatter for search results
pub struct OutputFormatter {
    format: OutputFormat,
    include_metadata: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            include_metadata: true,
        }
    }

    pub fn with_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    /// Format results; `cursor` is the rank of the selected match
    pub fn format_results(
        &self,
        results: &[SearchResult],
        cursor: Option<usize>,
        query: &str,
        path: &Path,
    ) -> String {
        match self.format {
            OutputFormat::Text => self.format_text(results, cursor, query, path),
            OutputFormat::Json => self.format_json(results, cursor, query, path),
            OutputFormat::Markdown => self.format_markdown(results, cursor, query, path),
        }
    }

    fn format_json(
        &self,
        results: &[SearchResult],
        cursor: Option<usize>,
        query: &str,
        path: &Path,
    ) -> String {
        let matches: Vec<Value> = results
            .iter()
            .enumerate()
            .map(|(rank, r)| {
                json!({
                    "rank": rank,
                    "index": r.index,
                    "node_id": r.node.id.get(),
                    "kind": r.node.value.kind(),
                    "identifier": r.node.value.identifier(),
                    "label": r.node.value.label(),
                    "depth": r.node.depth,
                })
            })
            .collect();

        let mut result = json!({ "matches": matches });
        if self.include_metadata {
            result["query"] = json!(query);
            result["path"] = json!(path.to_string_lossy());
            result["total_matches"] = json!(results.len());
            result["cursor"] = json!(cursor);
        }

        serde_json::to_string_pretty(&result).unwrap_or_default()
    }

    /// Format as plain text (default)
    fn format_text(
        &self,
        results: &[SearchResult],
        cursor: Option<usize>,
        query: &str,
        path: &Path,
    ) -> String {
        let mut output = String::new();

        if self.include_metadata {
            output.push_str(&format!("Query: {query}\n"));
            output.push_str(&format!("Trace: {}\n", path.display()));
            output.push_str(&format!("Total matches: {}\n\n", results.len()));
        }

        for (rank, r) in results.iter().enumerate() {
            let marker = if cursor == Some(rank) { "→" } else { " " };
            output.push_str(&format!(
                "{marker} [{}] row {:>4} │ {}{} {}\n",
                rank + 1,
                r.index,
                "  ".repeat(r.node.depth),
                r.node.value.kind(),
                r.node.value.label()
            ));
        }

        output
    }

    fn format_markdown(
        &self,
        results: &[SearchResult],
        cursor: Option<usize>,
        query: &str,
        path: &Path,
    ) -> String {
        let mut output = String::new();

        if self.include_metadata {
            output.push_str("# Trace search results\n\n");
            output.push_str(&format!("- **Query:** `{}`\n", escape_markdown(query)));
            output.push_str(&format!("- **Trace:** `{}`\n", path.display()));
            output.push_str(&format!("- **Total matches:** {}\n\n", results.len()));
        }

        output.push_str("| | Rank | Row | Kind | Label |\n");
        output.push_str("|---|---|---|---|---|\n");
        for (rank, r) in results.iter().enumerate() {
            let marker = if cursor == Some(rank) { "→" } else { "" };
            output.push_str(&format!(
                "| {marker} | {} | {} | {} | {} |\n",
                rank + 1,
                r.index,
                r.node.value.kind(),
                escape_markdown(&r.node.value.label())
            ));
        }

        output
    }
}

fn escape_markdown(text: &str) -> String {
    text.replace('|', "\\|").replace('`', "\\`")
}
