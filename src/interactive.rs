//! Line-oriented match navigation over one loaded trace
use crate::error::Result;
use crate::metrics::Metrics;
use crate::search::{FrameLoop, ScanOptions, SystemClock, TraceSearchSession};
use crate::tree::TraceTree;
use colored::Colorize;
use log::info;
use std::collections::{BTreeMap, VecDeque};
use std::io::{BufRead, Write};
use std::rc::Rc;
use std::time::Instant;

/// Interactive navigation engine
pub struct InteractiveEngine {
    session: TraceSearchSession,
    frames: Rc<FrameLoop>,
    metrics: Metrics,
    history: VecDeque<String>,
    max_history: usize,
    context_rows: usize,
}

/// Command processing result
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    Continue,
    Quit,
}

impl InteractiveEngine {
    pub fn new(tree: TraceTree, options: ScanOptions, context_rows: usize) -> Self {
        let frames = Rc::new(FrameLoop::new());
        let metrics = options.metrics.clone().unwrap_or_default();
        let options = ScanOptions {
            metrics: Some(metrics.clone()),
            ..options
        };
        let session = TraceSearchSession::new(
            tree,
            frames.clone(),
            Rc::new(SystemClock::new()),
            options,
        );

        Self {
            session,
            frames,
            metrics,
            history: VecDeque::new(),
            max_history: 100,
            context_rows,
        }
    }

    pub fn session(&self) -> &TraceSearchSession {
        &self.session
    }

    /// Run the prompt loop until `quit` or end of input
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        initial_query: Option<&str>,
        mut input: R,
        out: &mut W,
    ) -> Result<()> {
        writeln!(out, "{}", "Starting interactive trace search...".green().bold())?;
        writeln!(out, "Rows: {}", self.session.tree().len())?;
        writeln!(out, "{}", "Type 'help' for commands, 'quit' to exit".dimmed())?;

        if let Some(query) = initial_query {
            self.search(query, out)?;
        }

        loop {
            self.display_state(out)?;

            write!(out, "\n> ")?;
            out.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            self.add_to_history(line.to_string());

            if self.process_command(line, out)? == CommandResult::Quit {
                break;
            }
        }

        info!("Interactive session ended");
        Ok(())
    }

    /// Start a search and drive the frame loop until it completes
    fn search<W: Write>(&mut self, query: &str, out: &mut W) -> Result<()> {
        let start = Instant::now();
        self.session.search(query);
        let frames = self.frames.run_until_idle();

        if !query.is_empty() {
            writeln!(
                out,
                "{} {} matches in {:.2?} ({} frames)",
                "Found".green(),
                self.session.state().result_count(),
                start.elapsed(),
                frames
            )?;
        }
        Ok(())
    }

    /// Rerun the active query, if a tree change restarted it
    fn settle(&mut self) {
        if self.session.is_searching() {
            self.frames.run_until_idle();
        }
    }

    fn parse_row<W: Write>(&self, arg: Option<&str>, out: &mut W) -> Result<Option<usize>> {
        match arg.and_then(|value| value.parse::<usize>().ok()) {
            Some(row) if row < self.session.tree().len() => Ok(Some(row)),
            _ => {
                writeln!(out, "{}", "Expected a row number from the list".red())?;
                Ok(None)
            }
        }
    }

    /// Process one command line
    pub fn process_command<W: Write>(&mut self, input: &str, out: &mut W) -> Result<CommandResult> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(CommandResult::Continue);
        }

        match parts[0] {
            "q" | "quit" | "exit" => return Ok(CommandResult::Quit),
            "h" | "help" => self.show_help(out)?,
            "s" | "search" => {
                if parts.len() > 1 {
                    let query = input.trim_start()[parts[0].len()..].trim_start();
                    self.search(query, out)?;
                } else {
                    writeln!(out, "Usage: search <query>")?;
                }
            }
            "n" | "next" => self.session.next_match(),
            "p" | "prev" | "previous" => self.session.previous_match(),
            "first" => self.session.first_match(),
            "last" => self.session.last_match(),
            "g" | "goto" => {
                let rank = parts.get(1).and_then(|value| value.parse::<usize>().ok());
                let moved = rank
                    .filter(|&rank| rank > 0)
                    .is_some_and(|rank| self.session.go_to_rank(rank - 1));
                if !moved {
                    writeln!(out, "{}", "No match with that number".red())?;
                }
            }
            "select" => {
                if let Some(row) = self.parse_row(parts.get(1).copied(), out)? {
                    if !self.session.select_row(row) {
                        writeln!(out, "Row {row} is not a match")?;
                    }
                }
            }
            "expand" | "collapse" => {
                if let Some(row) = self.parse_row(parts.get(1).copied(), out)? {
                    let expanded = parts[0] == "expand";
                    if self.session.set_expanded(row, expanded) {
                        self.settle();
                    } else {
                        writeln!(out, "Row {row} did not change")?;
                    }
                }
            }
            "c" | "clear" => self.session.clear_query(),
            "unselect" => self.session.clear_selection(),
            "stats" => self.show_statistics(out)?,
            "history" => self.show_history(out)?,
            _ => {
                // Treat as a query
                self.search(input, out)?;
            }
        }

        Ok(CommandResult::Continue)
    }

    /// Display the query, match count and the matches around the cursor
    fn display_state<W: Write>(&self, out: &mut W) -> Result<()> {
        let state = self.session.state();

        writeln!(out, "\n{}", "=".repeat(60).cyan())?;
        match &state.query {
            Some(query) => writeln!(out, "Query: {}", query.yellow())?,
            None => writeln!(out, "Query: {}", "<none>".dimmed())?,
        }
        writeln!(out, "Rows: {}", self.session.tree().len())?;

        let Some(results) = state.results.as_ref() else {
            return Ok(());
        };
        writeln!(out, "Matches: {}", results.len())?;
        if results.is_empty() {
            return Ok(());
        }

        let current = state.result_iterator_index.unwrap_or(0);
        let start = current.saturating_sub(self.context_rows);
        let end = (current + self.context_rows + 1).min(results.len());

        for (rank, result) in results.iter().enumerate().take(end).skip(start) {
            let selected = state.result_iterator_index == Some(rank);
            let marker = if selected { "→" } else { " " };
            let line = format!(
                "{} [{}] row {:>4} {}{}",
                marker,
                rank + 1,
                result.index,
                "  ".repeat(result.node.depth),
                result.node.value.label()
            );
            if selected {
                writeln!(out, "{}", line.yellow().bold())?;
            } else {
                writeln!(out, "{line}")?;
            }
        }
        Ok(())
    }

    fn show_help<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "\n{}", "Available commands:".green().bold())?;
        writeln!(out, "  {} - Search for a query", "search <query>".yellow())?;
        writeln!(out, "  {} - Next match", "next".yellow())?;
        writeln!(out, "  {} - Previous match", "prev".yellow())?;
        writeln!(out, "  {} - First / last match", "first, last".yellow())?;
        writeln!(out, "  {} - Go to match number", "goto <number>".yellow())?;
        writeln!(out, "  {} - Select a row of the tree", "select <row>".yellow())?;
        writeln!(out, "  {} - Expand or collapse a row", "expand|collapse <row>".yellow())?;
        writeln!(out, "  {} - Clear the query", "clear".yellow())?;
        writeln!(out, "  {} - Clear the selected match", "unselect".yellow())?;
        writeln!(out, "  {} - Show statistics", "stats".yellow())?;
        writeln!(out, "  {} - Show command history", "history".yellow())?;
        writeln!(out, "  {} - Quit", "quit".yellow())?;
        Ok(())
    }

    fn show_statistics<W: Write>(&self, out: &mut W) -> Result<()> {
        let state = self.session.state();

        writeln!(out, "\n{}", "Search Statistics:".green().bold())?;
        writeln!(out, "Rows: {}", self.session.tree().len())?;
        writeln!(out, "Nodes in trace: {}", self.session.tree().node_count())?;
        writeln!(out, "Total matches: {}", state.result_count())?;
        writeln!(out, "Batches run: {}", self.metrics.batches_run.get())?;
        writeln!(out, "Scans cancelled: {}", self.metrics.scans_cancelled.get())?;

        if let Some(results) = state.results.as_ref() {
            let mut kind_counts = BTreeMap::new();
            for result in results {
                *kind_counts.entry(result.node.value.kind()).or_insert(0) += 1;
            }

            if !kind_counts.is_empty() {
                writeln!(out, "\nMatches by kind:")?;
                for (kind, count) in kind_counts {
                    writeln!(out, "  {kind}: {count}")?;
                }
            }
        }
        Ok(())
    }

    fn add_to_history(&mut self, command: String) {
        if self.history.len() >= self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(command);
    }

    fn show_history<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "\n{}", "Command History:".green().bold())?;
        for (i, cmd) in self.history.iter().enumerate() {
            writeln!(out, "  {}: {}", i + 1, cmd)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TRACE: &str = r#"{"nodes": [
        {"type": "transaction", "event_id": "t1", "transaction": "/checkout", "transaction.op": "http.server",
         "children": [
            {"type": "span", "span_id": "s1", "op": "db", "description": "SELECT cart"},
            {"type": "span", "span_id": "s2", "op": "db", "description": "UPDATE cart"},
            {"type": "span", "span_id": "s3", "op": "queue", "description": "enqueue", "expanded": false,
             "children": [
                {"type": "span", "span_id": "s4", "op": "db", "description": "INSERT job"}
             ]}
         ]}
    ]}"#;

    fn engine() -> InteractiveEngine {
        let tree = TraceTree::from_json_str(TRACE).unwrap();
        InteractiveEngine::new(tree, ScanOptions::default(), 5)
    }

    fn cursor(engine: &InteractiveEngine) -> Option<usize> {
        engine.session().state().result_index
    }

    #[test]
    fn test_search_and_navigate() {
        let mut engine = engine();
        let mut out = Vec::new();

        engine.process_command("search db", &mut out).unwrap();
        assert_eq!(engine.session().state().result_count(), 2);

        engine.process_command("next", &mut out).unwrap();
        assert_eq!(cursor(&engine), Some(1));
        engine.process_command("n", &mut out).unwrap();
        assert_eq!(cursor(&engine), Some(2));
        engine.process_command("n", &mut out).unwrap();
        assert_eq!(cursor(&engine), Some(1));
        engine.process_command("prev", &mut out).unwrap();
        assert_eq!(cursor(&engine), Some(2));
        engine.process_command("goto 1", &mut out).unwrap();
        assert_eq!(cursor(&engine), Some(1));

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("2 matches"));
    }

    #[test]
    fn test_bare_input_is_a_query() {
        let mut engine = engine();
        let mut out = Vec::new();

        engine.process_command("cart", &mut out).unwrap();
        assert_eq!(
            engine.session().state().query.as_deref(),
            Some("cart")
        );
        assert_eq!(engine.session().state().result_count(), 2);
    }

    #[test]
    fn test_search_keeps_inner_whitespace() {
        let mut engine = engine();
        let mut out = Vec::new();

        engine
            .process_command("  search   SELECT  cart", &mut out)
            .unwrap();
        assert_eq!(
            engine.session().state().query.as_deref(),
            Some("SELECT  cart")
        );
        assert_eq!(engine.session().state().result_count(), 0);
    }

    #[test]
    fn test_expand_reruns_query() {
        let mut engine = engine();
        let mut out = Vec::new();

        engine.process_command("search db", &mut out).unwrap();
        engine.process_command("expand 3", &mut out).unwrap();

        assert!(!engine.session().is_searching());
        assert_eq!(engine.session().state().result_count(), 3);
    }

    #[test]
    fn test_clear_and_quit() {
        let mut engine = engine();
        let mut out = Vec::new();

        engine.process_command("search db", &mut out).unwrap();
        engine.process_command("clear", &mut out).unwrap();
        assert!(engine.session().state().results.is_none());

        assert_eq!(
            engine.process_command("quit", &mut out).unwrap(),
            CommandResult::Quit
        );
    }

    #[test]
    fn test_run_reads_until_quit() {
        let mut engine = engine();
        let mut out = Vec::new();
        let input = Cursor::new("last\nstats\nquit\n");

        engine.run(Some("db"), input, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Matches by kind:"));
        assert!(text.contains("span: 2"));
        assert_eq!(cursor(&engine), Some(2));
    }
}
