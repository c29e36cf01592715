use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::level_filters::LevelFilter;

use nl2sql::config::Config;
use nl2sql::db::{ConnectionConfig, Engine};
use nl2sql::llm::{explain_sql, InferenceClient, OllamaClient};
use nl2sql::output::{self, OutputFormat};
use nl2sql::session::{AskOptions, Session, SessionManager, SynthesisResult};
use nl2sql::synth::{validate, validate_for_execution, SqlSource, Synthesizer};

/// Ask questions about a database in plain English
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    target: TargetArgs,

    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only show errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the inference model
    #[arg(long, global = true)]
    model: Option<String>,

    /// Override the inference server URL
    #[arg(long, global = true)]
    inference_host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct TargetArgs {
    /// Use a saved connection by name
    #[arg(long = "connect", global = true)]
    connect: Option<String>,

    /// Connection URI, e.g. postgres://user@host:5432/db or sqlite:///path/app.db
    #[arg(long, global = true)]
    uri: Option<String>,

    #[arg(long, global = true)]
    engine: Option<Engine>,

    #[arg(long, global = true)]
    host: Option<String>,

    #[arg(long, global = true)]
    port: Option<u16>,

    /// Database name, or file path for SQLite
    #[arg(short = 'd', long, global = true)]
    database: Option<String>,

    #[arg(short = 'U', long = "user", global = true)]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the tables and columns of the database
    Schema {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Turn a question into SQL
    Ask {
        question: String,
        /// Run the generated statement
        #[arg(short = 'x', long)]
        execute: bool,
        /// Append LIMIT n when the statement has none
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Check a statement against the read-only policy
    Validate { sql: String },
    /// Explain a statement in plain English
    Explain { sql: String },
    /// Show connection and inference status
    Status,
    /// Save the given connection (without its password) to the config file
    Save {
        /// Name to store it under
        name: String,
    },
    /// Interactive question loop
    Shell {
        #[arg(short = 'x', long)]
        execute: bool,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else if quiet {
        LevelFilter::ERROR
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn resolve_target(target: &TargetArgs, config: &Config) -> Result<ConnectionConfig> {
    let mut conn = if let Some(ref name) = target.connect {
        match config.connection(name) {
            Some(c) => c.clone(),
            None => {
                let saved: Vec<&str> = config.connections.iter().map(|c| c.name.as_str()).collect();
                bail!(
                    "no saved connection named {:?} (saved: {})",
                    name,
                    if saved.is_empty() { "none".to_string() } else { saved.join(", ") }
                );
            }
        }
    } else if let Some(ref uri) = target.uri {
        ConnectionConfig::from_uri(uri)?
    } else if let Some(ref database) = target.database {
        ConnectionConfig {
            name: database.clone(),
            database: database.clone(),
            ..ConnectionConfig::default()
        }
    } else {
        bail!("no database given; use --connect NAME, --uri URI or --database NAME");
    };

    if let Some(engine) = target.engine {
        conn.engine = engine;
    }
    if let Some(ref host) = target.host {
        conn.host = host.clone();
    }
    if target.port.is_some() {
        conn.port = target.port;
    }
    if let Some(ref database) = target.database {
        conn.database = database.clone();
    }
    if let Some(ref user) = target.user {
        conn.username = user.clone();
    }
    Ok(conn)
}

fn resolve_connection(target: &TargetArgs, config: &Config) -> Result<ConnectionConfig> {
    let mut conn = resolve_target(target, config)?;

    // Resolve password: env vars, then interactive prompt
    if conn.engine != Engine::Sqlite && conn.password.is_empty() {
        if let Ok(pw) = std::env::var("NL2SQL_PASSWORD").or_else(|_| std::env::var("PGPASSWORD")) {
            conn.password = pw;
        } else if !conn.username.is_empty() {
            let prompt = format!("Password for {}: ", conn.display_string());
            conn.password = rpassword::read_password_from_tty(Some(&prompt))?;
        }
    }

    Ok(conn)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let mut inference_config = config.inference.clone();
    if let Some(ref model) = cli.model {
        inference_config.model = model.clone();
    }
    if let Some(ref host) = cli.inference_host {
        inference_config.host = host.clone();
    }
    let client: Arc<dyn InferenceClient> = Arc::new(
        OllamaClient::new(&inference_config).context("failed to set up inference client")?,
    );

    // These need no database.
    match cli.command {
        Command::Validate { ref sql } => return print_validation(sql),
        Command::Save { ref name } => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            return save_connection(config, &cli.target, name, &path);
        }
        Command::Explain { ref sql } => {
            let text = explain_sql(client.as_ref(), sql).await?;
            println!("{}", text);
            return Ok(());
        }
        _ => {}
    }

    let target = resolve_connection(&cli.target, &config)?;
    let manager = SessionManager::new(Some(client), Synthesizer::new(inference_config.sampling()));
    let session = manager
        .connect(&target)
        .await
        .with_context(|| format!("failed to connect to {}", target.display_string()))?;

    let result = run(&session, cli.command).await;
    manager.disconnect(session.id()).await?;
    result
}

async fn run(session: &Session, command: Command) -> Result<()> {
    match command {
        Command::Schema { format } => {
            let tables = session.schema().await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tables)?),
                _ => print!("{}", output::render_schema(&tables)),
            }
            Ok(())
        }
        Command::Ask {
            question,
            execute,
            limit,
            format,
        } => {
            let outcome = session.ask(&question, AskOptions { execute, limit }).await;
            print_outcome(&outcome, format)?;
            match outcome.error {
                Some(e) => bail!(e),
                None => Ok(()),
            }
        }
        Command::Status => {
            let status = session.status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Command::Shell { execute, limit } => shell(session, execute, limit).await,
        Command::Validate { .. } | Command::Explain { .. } | Command::Save { .. } => Ok(()),
    }
}

fn save_connection(mut config: Config, target: &TargetArgs, name: &str, path: &Path) -> Result<()> {
    let mut conn = resolve_target(target, &config)?;
    conn.name = name.to_string();
    let summary = conn.display_string();
    let replaced = config.remember(conn);
    config
        .save_to(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!(
        "{} connection {:?} ({}) in {}",
        if replaced { "updated" } else { "saved" },
        name,
        summary,
        path.display()
    );
    Ok(())
}

fn print_validation(sql: &str) -> Result<()> {
    let verdict = validate_for_execution(sql);
    if !validate(sql.trim()) {
        println!("warning: statement does not look like a read query");
    }
    match verdict.message {
        Some(message) if !verdict.allowed => bail!(message),
        _ => {
            println!("ok");
            Ok(())
        }
    }
}

fn print_outcome(outcome: &SynthesisResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
        OutputFormat::Csv => match outcome.result {
            Some(ref result) => print!("{}", output::to_csv(result)),
            None => println!("{}", outcome.sql),
        },
        OutputFormat::Table => {
            if outcome.source != SqlSource::Generated {
                eprintln!("note: model unavailable or unusable, showing a schema-based statement");
            }
            println!("{}", outcome.sql);
            if let Some(ref result) = outcome.result {
                println!();
                print!("{}", output::render_result(result));
            }
        }
    }
    Ok(())
}

const SHELL_HELP: &str = "\
  <question>   generate SQL (and run it when execution is on)
  \\x           toggle execution
  \\r <sql>     run SQL directly
  \\v <sql>     check SQL against the read-only policy
  \\e <sql>     explain SQL
  \\d           show schema
  \\h [text]    show history, or entries matching text
  \\q           quit";

async fn shell(session: &Session, mut execute: bool, limit: usize) -> Result<()> {
    println!("Connected to {} ({}). \\? for help.", session.target(), session.engine());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("nl2sql{}> ", if execute { "[x]" } else { "" });
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };

        match command {
            "\\q" | "exit" | "quit" => break,
            "\\?" | "help" => println!("{}", SHELL_HELP),
            "\\x" => {
                execute = !execute;
                println!("execution {}", if execute { "on" } else { "off" });
            }
            "\\d" => print!("{}", output::render_schema(&session.schema().await)),
            "\\h" if rest.is_empty() => {
                print!("{}", output::render_history(&session.history(20).await))
            }
            "\\h" => print!("{}", output::render_history(&session.search_history(rest).await)),
            "\\r" => match session.execute(rest, Some(limit)).await {
                Ok(result) => print!("{}", output::render_result(&result)),
                Err(e) => eprintln!("error: {}", e.report()),
            },
            "\\v" => {
                let report = session.validate(rest);
                match report.message {
                    Some(message) => println!("blocked: {}", message),
                    None if report.well_formed => println!("ok"),
                    None => println!("allowed, but does not look like a read query"),
                }
            }
            "\\e" => match session.explain(rest).await {
                Ok(text) => println!("{}", text),
                Err(e) => eprintln!("error: {}", e),
            },
            _ => {
                let outcome = session
                    .ask(
                        line,
                        AskOptions {
                            execute,
                            limit: Some(limit),
                        },
                    )
                    .await;
                print_outcome(&outcome, OutputFormat::Table)?;
                if let Some(ref e) = outcome.error {
                    eprintln!("error: {}", e);
                }
            }
        }
    }

    Ok(())
}
