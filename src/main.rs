//! Replybank - Canned-Response Selection Engine
//!
//! Operator CLI for asking queries, inspecting the engine and managing its
//! training data.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use replybank::{ReplybankConfig, ResponseEngine};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "replybank")]
#[command(version)]
#[command(about = "Canned-response selection engine", long_about = None)]
struct Cli {
    /// Config file (default: replybank.toml searched upward from the cwd)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Training data file (overrides config and DATA_FILE)
    #[arg(long, global = true)]
    data_file: Option<PathBuf>,

    /// RNG seed for reproducible selection
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single query
    Ask {
        /// Query text
        query: String,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive session reading queries from stdin
    Chat,

    /// Show intent and category for a query without learning from it
    Classify {
        /// Query text
        query: String,
    },

    /// Show corpus and bank counters
    Stats,

    /// List categories with template usage
    Categories,

    /// Re-cluster the whole corpus now
    Cluster,

    /// Discard all training data
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let config = load_config(&cli)?;
    let engine = ResponseEngine::open(config).context("Failed to open engine")?;

    match cli.command {
        Commands::Ask { query, json } => cmd_ask(&engine, &query, json)?,
        Commands::Chat => cmd_chat(&engine)?,
        Commands::Classify { query } => cmd_classify(&engine, &query)?,
        Commands::Stats => cmd_stats(&engine)?,
        Commands::Categories => cmd_categories(&engine),
        Commands::Cluster => cmd_cluster(&engine)?,
        Commands::Reset { yes } => cmd_reset(&engine, yes)?,
    }

    engine.close();
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ReplybankConfig> {
    let mut config = match &cli.config {
        Some(path) => ReplybankConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ReplybankConfig::load_from_cwd().context("Failed to load replybank.toml")?,
    };
    config.apply_env();
    if let Some(path) = &cli.data_file {
        config.storage.data_file = path.clone();
    }
    if cli.seed.is_some() {
        config.engine.seed = cli.seed;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_ask(engine: &ResponseEngine, query: &str, json: bool) -> Result<()> {
    let reply = engine.respond(query)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        println!("{}", reply.response);
    }
    Ok(())
}

fn cmd_chat(engine: &ResponseEngine) -> Result<()> {
    println!("Replybank {} - type a question, or 'quit' to exit", replybank::VERSION);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            _ => {}
        }

        match engine.answer(line) {
            Ok(answer) => {
                println!("{}", answer.response);
                log::debug!("[{}] intent={} scope={}", answer.status, answer.intent, answer.scope);
            }
            Err(e) => eprintln!("Error: {}", e),
        }
    }
    Ok(())
}

fn cmd_classify(engine: &ResponseEngine, query: &str) -> Result<()> {
    let report = engine.classify(query);
    println!("Intent:   {} ({}, {:.2})", report.intent, report.match_kind, report.score);
    println!(
        "Category: {}",
        report.category.as_deref().unwrap_or("(none)")
    );
    Ok(())
}

fn cmd_stats(engine: &ResponseEngine) -> Result<()> {
    let stats = engine.stats();
    println!("Data file:           {}", stats.data_file.display());
    println!("Corpus size:         {}", stats.corpus_size);
    println!("Clustered queries:   {}", stats.clustered);
    println!("Clusters (K):        {}", stats.num_clusters);
    println!("Learned phrases:     {}", stats.learned_phrases);
    println!("Used responses:      {}", stats.used_responses);
    println!("Generated templates: {}", stats.generated_templates);
    Ok(())
}

fn cmd_categories(engine: &ResponseEngine) {
    println!("{:<24} {:>9} {:>9} {:>6}", "CATEGORY", "TEMPLATES", "GENERATED", "USED");
    for c in engine.categories() {
        println!(
            "{:<24} {:>9} {:>9} {:>6}",
            c.name, c.templates, c.generated, c.used
        );
    }
}

fn cmd_cluster(engine: &ResponseEngine) -> Result<()> {
    let labelled = engine.force_cluster()?;
    if labelled == 0 {
        println!("Not enough queries to cluster yet");
    } else {
        println!("Clustered {} queries", labelled);
    }
    Ok(())
}

fn cmd_reset(engine: &ResponseEngine, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("reset discards all training data; pass --yes to confirm");
    }
    engine.reset();
    println!("Training data reset");
    Ok(())
}
