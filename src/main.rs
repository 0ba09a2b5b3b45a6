use clap::CommandFactory;
use clap::Parser;
use colored::*;
use env_logger::{Builder, Env, Target};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::fs;
use std::io;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracegrep::cli::{Cli, Commands};
use tracegrep::config::Config;
use tracegrep::error::{Result as TracegrepResult, TracegrepError};
use tracegrep::interactive::InteractiveEngine;
use tracegrep::metrics::Metrics;
use tracegrep::output::{OutputFormat, OutputFormatter};
use tracegrep::search::{FrameLoop, ScanOptions, SystemClock, TraceSearchSession};
use tracegrep::tree::TraceTree;

fn main() -> TracegrepResult<()> {
    let cli = Cli::parse();
    setup_logging(&cli)?;

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "tracegrep", &mut io::stdout());
        return Ok(());
    }

    let start_time = Instant::now();
    let config = load_config(&cli)?;
    if !config.display.color {
        colored::control::set_override(false);
    }

    let metrics = Metrics::new();
    let options = ScanOptions {
        batch_budget: match cli.budget_ms {
            Some(0) => {
                return Err(TracegrepError::InvalidArgument(
                    "--budget-ms must be greater than zero".to_string(),
                ))
            }
            Some(ms) => Duration::from_millis(ms),
            None => config.search.batch_budget(),
        },
        metrics: Some(metrics.clone()),
    };

    let mut tree = TraceTree::from_path(&cli.path)?;
    info!(
        "Loaded {} with {} rows ({} nodes)",
        cli.path.display(),
        tree.len(),
        tree.node_count()
    );

    match &cli.command {
        Commands::Search {
            query,
            next,
            prev,
            last,
            output_format,
        } => {
            let pb = ProgressBar::new_spinner().with_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .map_err(|e| TracegrepError::Other(e.to_string()))?
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
            );
            pb.set_message(format!("Searching {} rows...", tree.len()));

            let frames = Rc::new(FrameLoop::new());
            let mut session = TraceSearchSession::new(
                tree,
                frames.clone(),
                Rc::new(SystemClock::new()),
                options,
            );

            session.search(query);
            while frames.run_frame() > 0 {
                pb.tick();
            }
            pb.finish_and_clear();

            if *last {
                session.last_match();
            }
            for _ in 0..*next {
                session.next_match();
            }
            for _ in 0..*prev {
                session.previous_match();
            }

            let state = session.state();
            let results = state.results.as_deref().unwrap_or_default();
            let is_json = *output_format == OutputFormat::Json;

            if !is_json {
                if results.is_empty() {
                    println!("{}", "No matches found".yellow());
                } else {
                    println!(
                        "{} {} {}",
                        "Found".green(),
                        results.len(),
                        "matches:".green()
                    );
                }
            }

            if is_json || !results.is_empty() {
                let formatter = OutputFormatter::new(*output_format)
                    .with_metadata(config.display.show_summary);
                let rendered =
                    formatter.format_results(results, state.result_iterator_index, query, &cli.path);
                println!("{}", rendered.trim_end());
            }

            if config.display.show_timing && !is_json {
                println!(
                    "{}",
                    format!("Scanned in {} frames", frames.frames_run()).dimmed()
                );
            }
        }

        Commands::List { all } => {
            if *all {
                tree.expand_all();
            }
            for (index, node) in tree.list().iter().enumerate() {
                let toggle = match (node.child_count, node.expanded) {
                    (0, _) => " ",
                    (_, true) => "-",
                    (_, false) => "+",
                };
                println!(
                    "{:>4} {}{} {} {}",
                    index,
                    "  ".repeat(node.depth),
                    toggle,
                    node.value.kind().cyan(),
                    node.value.label()
                );
            }
            if config.display.show_summary {
                println!(
                    "\n{} rows shown, {} nodes in trace",
                    tree.len(),
                    tree.node_count()
                );
            }
        }

        Commands::Interactive { query } => {
            let mut engine = InteractiveEngine::new(tree, options, config.search.context_rows);
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            if let Err(e) = engine.run(query.as_deref(), stdin.lock(), &mut stdout) {
                eprintln!("{}", format!("Interactive mode error: {e}").red());
                return Err(e);
            }
        }

        // written before the trace is loaded
        Commands::Completions { .. } => {}
    }

    if cli.metrics {
        // keep stdout a single JSON document
        let json_output = matches!(
            cli.command,
            Commands::Search {
                output_format: OutputFormat::Json,
                ..
            }
        );
        if json_output {
            eprint!("{}", metrics.gather());
        } else {
            print!("{}", metrics.gather());
        }
    }

    info!(
        "Application finished. Total elapsed time: {:.2?}",
        start_time.elapsed()
    );
    Ok(())
}

fn load_config(cli: &Cli) -> TracegrepResult<Config> {
    match Config::load(cli.config.as_deref()) {
        Ok(config) => Ok(config),
        Err(e) if cli.config.is_none() => {
            warn!("Ignoring unreadable config file: {e:#}");
            Ok(Config::default())
        }
        Err(e) => Err(TracegrepError::Config(format!("{e:#}"))),
    }
}

fn setup_logging(cli: &Cli) -> TracegrepResult<()> {
    let default_level = if cli.verbose { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.module_path().unwrap_or("unknown"),
            record.args()
        )
    });

    if let Some(log_path) = &cli.log {
        if let Some(parent_dir) = log_path.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                fs::create_dir_all(parent_dir).map_err(TracegrepError::Io)?;
            }
        }
        let log_file = fs::File::create(log_path).map_err(TracegrepError::Io)?;
        builder.target(Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(Target::Stderr);
    }

    builder
        .try_init()
        .map_err(|e| TracegrepError::Other(e.to_string()))?;
    Ok(())
}
