//! # Codementor CLI
//!
//! Command-line interface for the code mentor.
//!
//! Usage:
//!   codementor chat [--thread <id>]
//!   codementor ask [--thread <id>] [--file <path>] <question>
//!   codementor config
//!
//! Examples:
//!   codementor chat
//!   codementor ask --file src/lib.rs "Why does my loop panic?"
//!   codementor --model anthropic:claude-3-5-sonnet-latest --offline chat

use clap::{Parser, Subcommand};
use codementor_agent::{create_agent_app_with, MentorApp, TurnOutcome};
use codementor_error::{Error, ErrorKind, Result};
use codementor_runtime::{ChatMessage, ChatModel, Configuration, IndexConfig, Role, RunnableConfig};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Embedding size used with the offline hash embedder
const OFFLINE_DIMS: usize = 256;

#[derive(Parser)]
#[command(name = "codementor")]
#[command(author, version, about = "Codementor - hints, not answers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Model provider (openai, anthropic, local)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model name, optionally as <provider>:<model>
    #[arg(long, global = true)]
    model: Option<String>,

    /// Sampling temperature
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Embed memories locally instead of calling the embedding API
    #[arg(long, global = true)]
    offline: bool,

    /// Enable verbose output (debug logs, handoffs and token usage)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only show the mentor's reply
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to the mentor interactively
    Chat {
        /// Thread to continue
        #[arg(short, long)]
        thread: Option<String>,
    },
    /// Ask a single question
    Ask {
        /// Thread id for the turn
        #[arg(short, long)]
        thread: Option<String>,

        /// Source file to attach as a code block
        #[arg(short, long)]
        file: Option<String>,

        /// The question
        #[arg(trailing_var_arg = true, required = true)]
        question: Vec<String>,
    },
    /// Show the resolved configuration
    Config,
}

impl Cli {
    /// CLI flags as configurable values; environment variables still win
    fn runnable_config(&self) -> RunnableConfig {
        let mut config = RunnableConfig::new();
        if let Some(provider) = &self.provider {
            config = config.with("model_provider", provider.clone());
        }
        if let Some(model) = &self.model {
            config = config.with("model", model.clone());
        }
        if let Some(temperature) = self.temperature {
            config = config.with("temperature", temperature as f64);
        }
        config
    }

    fn index_config(&self) -> IndexConfig {
        if self.offline {
            IndexConfig::new(OFFLINE_DIMS, "hash:bag-of-words")
        } else {
            IndexConfig::default()
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ReplInput {
    New,
    History,
    Memories,
    Quit,
    Message(String),
}

impl ReplInput {
    fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        match trimmed {
            "" => None,
            "/new" => Some(Self::New),
            "/history" => Some(Self::History),
            "/memories" => Some(Self::Memories),
            "/quit" | "/exit" => Some(Self::Quit),
            _ => Some(Self::Message(trimmed.to_string())),
        }
    }
}

/// Read one message: lines up to the first blank line. A `/command` on the
/// first line is returned on its own. `None` at end of input.
fn read_message(input: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();

    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim_end_matches(['\n', '\r']);
        if lines.is_empty() && text.trim_start().starts_with('/') {
            return Ok(Some(text.trim().to_string()));
        }
        if text.trim().is_empty() {
            if lines.is_empty() {
                continue;
            }
            break;
        }
        lines.push(text.to_string());
    }

    Ok(if lines.is_empty() { None } else { Some(lines.join("\n")) })
}

/// The question, with `file` appended as a fenced code block
fn compose_question(question: &[String], file: Option<&Path>) -> Result<String> {
    let mut text = question.join(" ");
    if let Some(path) = file {
        let code = std::fs::read_to_string(path).map_err(|e| {
            Error::new(ErrorKind::IoFailed, format!("failed to read {}", path.display()))
                .with_operation("cli::compose_question")
                .set_source(e)
        })?;
        let lang = path.extension().and_then(|e| e.to_str()).map(fence_language).unwrap_or("");
        text.push_str(&format!("\n\n```{}\n{}\n```", lang, code.trim_end()));
    }
    Ok(text)
}

fn fence_language(extension: &str) -> &str {
    match extension {
        "rs" => "rust",
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "rb" => "ruby",
        "sh" => "bash",
        "h" => "c",
        "hpp" | "cc" => "cpp",
        other => other,
    }
}

fn new_thread_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn speaker(msg: &ChatMessage) -> &str {
    match msg.role {
        Role::System => "system",
        Role::User => "student",
        Role::Assistant => msg.name.as_deref().unwrap_or("assistant"),
        Role::Tool => "tool",
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

fn build_app(cli: &Cli) -> Result<MentorApp<ChatModel>> {
    let config = cli.runnable_config();
    create_agent_app_with(Some(&config), cli.index_config())
}

fn print_outcome(outcome: &TurnOutcome, verbose: bool, quiet: bool) {
    if quiet {
        println!("{}", outcome.response);
        return;
    }
    println!("\n{}\n", outcome.response);
    if verbose {
        if !outcome.handoffs.is_empty() {
            println!("  handoffs: {}", outcome.handoffs.join(" -> "));
        }
        println!(
            "  memories written: {}, tokens: {} ({} prompt + {} completion)",
            outcome.memories_written,
            outcome.usage.total_tokens,
            outcome.usage.prompt_tokens,
            outcome.usage.completion_tokens
        );
    }
}

fn print_history(app: &MentorApp<ChatModel>, thread_id: &str) -> Result<()> {
    let history = app.history(thread_id)?;
    if history.is_empty() {
        println!("(thread {} is empty)", thread_id);
        return Ok(());
    }
    println!("--- Thread {} ({} messages) ---", thread_id, history.len());
    for msg in &history {
        if let Some(calls) = &msg.tool_calls {
            for call in calls {
                println!("[{}] -> {}", speaker(msg), call.name);
            }
        }
        let text = msg.text();
        if !text.trim().is_empty() {
            let shown = if msg.role == Role::Tool { truncate(text, 200) } else { text.to_string() };
            println!("[{}] {}", speaker(msg), shown);
        }
    }
    Ok(())
}

async fn print_memories(app: &MentorApp<ChatModel>) -> Result<()> {
    let memories = app.memories().await?;
    if memories.is_empty() {
        println!("(no memories stored)");
        return Ok(());
    }
    for item in &memories {
        println!("--- Memory {} ({}) ---", item.key, item.updated_at.format("%Y-%m-%d %H:%M:%S"));
        println!("{}\n", item.content_text());
    }
    Ok(())
}

async fn run_chat(cli: &Cli, thread: Option<String>) -> Result<()> {
    let app = build_app(cli)?;
    let mut thread_id = thread.unwrap_or_else(new_thread_id);

    if !cli.quiet {
        println!("Codementor - ask about your code; finish a message with a blank line.");
        println!("Commands: /new /history /memories /quit");
        println!("Thread: {}\n", thread_id);
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    loop {
        if !cli.quiet {
            print!("you> ");
            io::stdout().flush().ok();
        }

        let Some(raw) = read_message(&mut input)? else {
            break;
        };
        match ReplInput::parse(&raw) {
            None => continue,
            Some(ReplInput::Quit) => break,
            Some(ReplInput::New) => {
                thread_id = new_thread_id();
                println!("Started thread {}", thread_id);
            }
            Some(ReplInput::History) => print_history(&app, &thread_id)?,
            Some(ReplInput::Memories) => print_memories(&app).await?,
            Some(ReplInput::Message(message)) => match app.invoke(&thread_id, message).await {
                Ok(outcome) => print_outcome(&outcome, cli.verbose, cli.quiet),
                Err(e) => {
                    tracing::error!(thread_id = %thread_id, error = %e, "turn failed");
                    eprintln!("Error: {}", e);
                }
            },
        }
    }

    if cli.verbose {
        let usage = app.usage();
        println!("Session: {} model calls, {} tokens", usage.total_calls, usage.total_tokens());
    }
    Ok(())
}

async fn run_ask(cli: &Cli, thread: Option<String>, file: Option<String>, question: &[String]) -> Result<()> {
    let message = compose_question(question, file.as_deref().map(Path::new))?;
    let app = build_app(cli)?;
    let thread_id = thread.unwrap_or_else(new_thread_id);

    let outcome = app.invoke(&thread_id, message).await?;
    print_outcome(&outcome, cli.verbose, cli.quiet);
    Ok(())
}

fn show_config(cli: &Cli) -> Result<()> {
    let config = cli.runnable_config();
    let resolved = Configuration::from_runnable_config(Some(&config))?;
    let (provider, model) = resolved.resolved_provider()?;

    let report = serde_json::json!({
        "configuration": resolved,
        "provider": provider.as_str(),
        "model": model,
        "index": cli.index_config(),
    });
    let text = serde_json::to_string_pretty(&report).map_err(|e| {
        Error::serialization_failed("failed to encode configuration")
            .with_operation("cli::show_config")
            .set_source(e)
    })?;
    println!("{}", text);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // RUST_LOG wins over the flags
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Chat { thread } => run_chat(&cli, thread.clone()).await,
        Commands::Ask { thread, file, question } => {
            run_ask(&cli, thread.clone(), file.clone(), question).await
        }
        Commands::Config => show_config(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}
