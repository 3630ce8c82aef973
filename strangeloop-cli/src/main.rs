//! # strangeloop CLI
//!
//! Command-line agent shell that asks a hosted model for answers and grows
//! its own capabilities.
//!
//! Usage:
//!   strangeloop ask <question>
//!   strangeloop capability add <description>
//!   strangeloop capability run <name> [args...] [--arg key=value]
//!   strangeloop do <request>
//!
//! Examples:
//!   strangeloop capability add "double a number"
//!   strangeloop capability run double_number 21
//!   strangeloop do "what is 21 doubled?"
//!   strangeloop do --no-auto-execute "generate a password"

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strangeloop_agent::{Agent, AgentConfig, Creation, Outcome};
use strangeloop_runtime::provider::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use strangeloop_runtime::registry::{SYNTHESIS_MAX_TOKENS, SYNTHESIS_TEMPERATURE};
use strangeloop_runtime::{
    parse_lenient, Capability, CapabilityMeta, CompletionProvider, Context, Error, ErrorKind,
    Origin, Result,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strangeloop")]
#[command(author, version, about = "strangeloop - a self-extending agent shell")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API key for the completion service (overrides config and environment)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Increase log detail (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a hello message
    Hello,
    /// Greet a user by name
    Greet {
        name: Option<String>,
    },
    /// Show version, paths and platform (more with --verbose)
    Info,
    /// Report line, word and byte counts for a file
    Process {
        file: PathBuf,

        /// Write the report to this path as well
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Ask the model a question
    Ask {
        #[arg(required = true)]
        question: Vec<String>,

        #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
        max_tokens: usize,

        #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
        temperature: f32,
    },
    /// Manage capabilities
    #[command(subcommand)]
    Capability(CapabilityCommand),
    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Let the agent decide how to handle a request
    Do {
        #[arg(required = true)]
        request: Vec<String>,

        #[command(flatten)]
        execution: Execution,
    },
}

#[derive(Subcommand)]
enum CapabilityCommand {
    /// Synthesize a capability from a description, load it and save it
    Add {
        #[arg(required = true)]
        description: Vec<String>,

        #[arg(long, default_value_t = SYNTHESIS_MAX_TOKENS)]
        max_tokens: usize,

        #[arg(long, default_value_t = SYNTHESIS_TEMPERATURE)]
        temperature: f32,
    },
    /// List available capabilities
    List,
    /// Show a capability's signature, documentation and source
    Show { name: String },
    /// Call a capability
    Run {
        name: String,

        /// Positional arguments
        #[arg(allow_negative_numbers = true)]
        args: Vec<String>,

        /// Keyword argument, repeatable
        #[arg(long = "arg", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        keyword: Vec<(String, String)>,

        /// Pass arguments as plain strings instead of parsing them as JSON
        #[arg(long)]
        raw: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Set a value (parsed as JSON when possible)
    Set { key: String, value: String },
    /// Print a value
    Get { key: String },
    /// Print every entry
    List,
    /// Remove a key
    Delete { key: String },
    /// Print the config file location
    Path,
}

#[derive(Args)]
struct Execution {
    /// Carry out the chosen action (default)
    #[arg(long, overrides_with = "no_auto_execute")]
    auto_execute: bool,

    /// Only describe what would be done
    #[arg(long, overrides_with = "auto_execute")]
    no_auto_execute: bool,
}

impl Execution {
    fn enabled(&self) -> bool {
        self.auto_execute || !self.no_auto_execute
    }
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Strings print bare, everything else as pretty JSON
fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn origin_label(origin: Origin) -> &'static str {
    match origin {
        Origin::Builtin => "builtin",
        Origin::Synthesized => "synthesized",
    }
}

// ============================================================================
// Command handlers
// ============================================================================

fn greeting(name: Option<&str>) -> String {
    match name {
        Some(name) => format!("Hello, {}! Welcome to strangeloop!", name),
        None => "Hello! Welcome to strangeloop!".to_string(),
    }
}

fn info(ctx: &Context, verbose: bool) {
    println!("strangeloop information:");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Config file: {}", ctx.config.path().display());
    println!("Capabilities: {}", ctx.registry.dir().display());

    if verbose {
        println!("\nVerbose information:");
        println!(
            "Platform: {}-{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        match std::env::current_exe() {
            Ok(exe) => println!("Executable: {}", exe.display()),
            Err(e) => println!("Executable: unknown ({})", e),
        }
        println!("Capabilities loaded: {}", ctx.registry.list().len());
    }
}

/// Line, word and byte counts
#[derive(Debug, PartialEq)]
struct TextStats {
    lines: usize,
    words: usize,
    bytes: usize,
}

impl TextStats {
    fn of(content: &[u8]) -> Self {
        let text = String::from_utf8_lossy(content);
        Self {
            lines: text.lines().count(),
            words: text.split_whitespace().count(),
            bytes: content.len(),
        }
    }

    fn report(&self, file: &Path) -> String {
        format!(
            "File: {}\nLines: {}\nWords: {}\nBytes: {}\n",
            file.display(),
            self.lines,
            self.words,
            self.bytes
        )
    }
}

fn process(file: &Path, output: Option<&Path>) -> Result<()> {
    println!("Processing file: {}", file.display());
    let content = std::fs::read(file).map_err(|e| {
        Error::from(e)
            .with_operation("cli::process")
            .with_context("path", file.display().to_string())
    })?;
    let report = TextStats::of(&content).report(file);
    print!("{}", report);

    if let Some(output) = output {
        std::fs::write(output, &report).map_err(|e| {
            Error::from(e)
                .with_operation("cli::process")
                .with_context("path", output.display().to_string())
        })?;
        println!("Results written to: {}", output.display());
    }
    println!("Processing complete!");
    Ok(())
}

fn print_creation(creation: &Creation) {
    println!("Created capability: {}", creation.meta.display_signature());
    let summary = creation.meta.summary();
    if !summary.is_empty() {
        println!("  {}", summary);
    }
    if let Some(previous) = &creation.replaced {
        println!(
            "Replaced existing capability: {} ({})",
            previous.display_signature(),
            origin_label(previous.origin)
        );
    }
    match &creation.persisted {
        Ok(path) => println!("Saved to: {}", path.display()),
        Err(e) => eprintln!("Warning: capability loaded but not saved: {}", e),
    }
}

fn print_capability(meta: &CapabilityMeta) {
    println!("{}", meta.display_signature());
    println!("Origin: {}", origin_label(meta.origin));
    for param in &meta.signature.params {
        let requirement = if param.is_required() { "required" } else { "optional" };
        print!("  {} ({})", param, requirement);
        if !param.description.is_empty() {
            print!(" - {}", param.description);
        }
        println!();
    }
    if !meta.documentation.is_empty() {
        println!("\n{}", meta.documentation);
    }
    if let Some(source) = &meta.source {
        println!("\nSource:\n{}", source.trim_end());
    }
}

async fn capability(ctx: &mut Context, api_key: Option<&str>, cmd: CapabilityCommand) -> Result<()> {
    match cmd {
        CapabilityCommand::Add {
            description,
            max_tokens,
            temperature,
        } => {
            let provider = ctx.provider(api_key)?;
            let description = description.join(" ");
            println!("Synthesizing capability: {}", description);

            let capability = Arc::new(
                ctx.registry
                    .synthesize(&provider, &description, max_tokens, temperature)
                    .await?,
            );
            let meta = capability.meta().clone();
            let replaced = ctx.registry.inject(capability);
            let persisted = ctx.registry.persist(&meta);
            print_creation(&Creation {
                meta,
                replaced,
                persisted,
            });
        }
        CapabilityCommand::List => {
            let capabilities = ctx.registry.list();
            if capabilities.is_empty() {
                println!("No capabilities available.");
            }
            for meta in capabilities {
                println!("{} [{}]", meta.display_signature(), origin_label(meta.origin));
                let summary = meta.summary();
                if !summary.is_empty() {
                    println!("    {}", summary);
                }
            }
        }
        CapabilityCommand::Show { name } => {
            print_capability(&ctx.registry.describe(&name)?);
        }
        CapabilityCommand::Run {
            name,
            args,
            keyword,
            raw,
        } => {
            let positional = args.into_iter().map(Value::String).collect();
            let keyword: Map<String, Value> = keyword
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect();
            let result = ctx.registry.invoke(&name, positional, keyword, !raw).await?;
            println!("{}", format_value(&result));
        }
    }
    Ok(())
}

fn config(ctx: &Context, cmd: ConfigCommand) -> Result<()> {
    let store = &ctx.config;
    match cmd {
        ConfigCommand::Set { key, value } => {
            let value = parse_lenient(&value);
            store.set(&key, value.clone())?;
            println!("Set {} = {}", key, value);
        }
        ConfigCommand::Get { key } => {
            let value = store.get(&key).ok_or_else(|| Error::key_not_found(&key))?;
            println!("{}", format_value(&value));
        }
        ConfigCommand::List => {
            let entries = store.list_all();
            if entries.is_empty() {
                println!("No configuration values set.");
            }
            for (key, value) in entries {
                println!("{} = {}", key, value);
            }
        }
        ConfigCommand::Delete { key } => {
            if !store.delete(&key)? {
                return Err(Error::key_not_found(&key).with_operation("cli::config"));
            }
            println!("Deleted {}", key);
        }
        ConfigCommand::Path => println!("{}", store.path().display()),
    }
    Ok(())
}

async fn ask<P: CompletionProvider>(
    provider: &P,
    question: &str,
    max_tokens: usize,
    temperature: f32,
) -> Result<()> {
    debug!(provider = provider.name(), model = provider.model(), "asking");
    let answer = provider.prompt(question, max_tokens, temperature).await?;
    println!("{}", answer.trim());
    Ok(())
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Invoked {
            name,
            result,
            created,
        } => {
            if let Some(creation) = created {
                print_creation(creation);
            }
            println!("Result of {}:", name);
            println!("{}", format_value(result));
        }
        Outcome::Created(creation) => print_creation(creation),
        Outcome::InvokeFailed { creation, .. } => print_creation(creation),
        Outcome::Suggested { command, rationale } => {
            if !rationale.is_empty() {
                println!("{}", rationale);
            }
            println!("Suggested command:\n  {}", command);
        }
        Outcome::Guidance(text) | Outcome::Responded(text) => println!("{}", text),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let api_key = cli.api_key.as_deref();
    match cli.command {
        Commands::Hello => println!("Hello from strangeloop!"),
        Commands::Greet { name } => println!("{}", greeting(name.as_deref())),
        Commands::Info => info(&Context::load()?, cli.verbose > 0),
        Commands::Process { file, output } => process(&file, output.as_deref())?,
        Commands::Ask {
            question,
            max_tokens,
            temperature,
        } => {
            let provider = Context::load()?.provider(api_key)?;
            ask(&provider, &question.join(" "), max_tokens, temperature).await?;
        }
        Commands::Capability(cmd) => capability(&mut Context::load()?, api_key, cmd).await?,
        Commands::Config(cmd) => config(&Context::load()?, cmd)?,
        Commands::Do { request, execution } => {
            let mut ctx = Context::load()?;
            let agent = Agent::with_config(
                ctx.provider(api_key)?,
                AgentConfig {
                    auto_execute: execution.enabled(),
                    ..AgentConfig::default()
                },
            );
            let outcome = agent.run(&mut ctx.registry, &request.join(" ")).await?;
            print_outcome(&outcome);
            if let Outcome::InvokeFailed { error, .. } = outcome {
                return Err(error);
            }
        }
    }
    Ok(())
}

fn report_error(err: &Error) {
    eprintln!("Error: {}", err.message());
    if err.kind().is_completion_failure() {
        if let Some(status) = err.context_value("status") {
            eprintln!("Completion service status: {}", status);
        }
        if let Some(body) = err.context_value("body") {
            eprintln!("{}", body);
        }
    }
    if err.kind() == ErrorKind::PlanParse {
        if let Some(reply) = err.context_value("reply") {
            eprintln!("\nModel reply:\n{}", reply);
        }
    }
    debug!("{:?}", err);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        report_error(&err);
        std::process::exit(1);
    }
}
