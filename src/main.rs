//! InsightSQL REPL
//!
//! Chat with a SQLite database in natural language. Slash commands map to
//! the session's lifecycle actions; any other line is a question for the
//! agent.
//!
//! ```text
//! /key <api key>   set the model credential (resets the session)
//! /lang <name>     change the answer language
//! /connect         open the database
//! /clear           clear the screen, keep the agent's memory
//! /reset           wipe everything except the credential
//! /status          show which parts of the session are ready
//! /metrics         dump Prometheus metrics
//! /help            list commands
//! /quit            exit
//! ```

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use insightsql::agent::{AgentEvent, ProgressObserver, TracingObserver};
use insightsql::chat::TurnOutcome;
use insightsql::config::SUPPORTED_LANGUAGES;
use insightsql::session::Role;
use insightsql::{metrics, telemetry, AppConfig, Notice, NoticeLevel, SessionContext};

#[derive(Parser, Debug)]
#[command(name = "insightsql")]
#[command(about = "Ask questions about a SQL database in natural language", long_about = None)]
struct Cli {
    /// Ollama base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// Database URI, e.g. sqlite:///dresses.db
    #[arg(short, long)]
    database: Option<String>,

    /// Answer language
    #[arg(short, long)]
    language: Option<String>,

    /// Maximum agent iterations per question
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Prompt hub base URL (bundled template when omitted)
    #[arg(long)]
    prompt_hub: Option<String>,

    /// OTLP endpoint for trace export
    #[arg(long)]
    otlp_endpoint: Option<String>,

    /// Connect to the database on startup
    #[arg(long)]
    connect: bool,
}

impl Cli {
    fn apply(self, mut config: AppConfig) -> AppConfig {
        if let Some(v) = self.base_url {
            config.base_url = v;
        }
        if let Some(v) = self.model {
            config.model = v;
        }
        if let Some(v) = self.database {
            config.database_uri = v;
        }
        if let Some(v) = self.language {
            config.language = v;
        }
        if let Some(v) = self.max_iterations {
            config.max_iterations = v.max(1);
        }
        if self.prompt_hub.is_some() {
            config.prompt_hub_url = self.prompt_hub;
        }
        if self.otlp_endpoint.is_some() {
            config.otlp_endpoint = self.otlp_endpoint;
        }
        config
    }
}

/// Streams the agent's intermediate steps to the terminal and the trace
struct ConsoleObserver {
    trace: TracingObserver,
}

impl ProgressObserver for ConsoleObserver {
    fn on_event(&self, event: &AgentEvent) {
        self.trace.on_event(event);
        match event {
            AgentEvent::Thought { iteration, text } => {
                println!("{}", format!("[THOUGHT {}] {}", iteration, text).bright_black());
            }
            AgentEvent::ToolStart { tool, input } => {
                println!("{}", format!("[TOOL] {} <- {}", tool, input).cyan());
            }
            AgentEvent::ToolEnd { observation, .. } => {
                for line in observation.lines().take(12) {
                    println!("{}", format!("       {}", line).bright_black());
                }
            }
            AgentEvent::ParseError { .. } => {
                println!("{}", "[AGENT] Malformed response, retrying...".yellow());
            }
            AgentEvent::FinalAnswer { .. } => {}
        }
    }
}

fn show(notice: &Notice) {
    let text = notice.to_string();
    let line = match notice.level {
        NoticeLevel::Info => text.bright_blue(),
        NoticeLevel::Success => text.green(),
        NoticeLevel::Warning => text.yellow(),
        NoticeLevel::Error => text.red(),
    };
    println!("{}", line);
}

fn print_help() {
    println!("{}", "Commands:".bold());
    for (cmd, desc) in [
        ("/key <api key>", "set the model credential (resets the session)"),
        ("/lang <name>", "change the answer language"),
        ("/connect", "open the database"),
        ("/clear", "clear the screen, keep the agent's memory"),
        ("/reset", "wipe everything except the credential"),
        ("/status", "show which parts of the session are ready"),
        ("/metrics", "dump Prometheus metrics"),
        ("/quit", "exit"),
    ] {
        println!("  {:<16} {}", cmd.bright_cyan(), desc);
    }
}

fn print_status(session: &SessionContext) {
    let status = session.store().status();
    let mark = |ready: bool| if ready { "ready".green() } else { "missing".red() };
    println!("  model client  {}", mark(status.model_client));
    println!("  database      {}", mark(status.toolkit));
    println!("  memory        {}", mark(status.memory));
    println!("  agent         {}", mark(status.executor));
    println!("  language      {}", session.language());
    println!("  messages      {}", status.messages);
    for notice in session.readiness_notices() {
        show(&notice);
    }
}

fn redraw(session: &SessionContext) {
    print!("\x1B[2J\x1B[1;1H");
    for message in session.store().history() {
        match message.role {
            Role::User => println!("{}", format!("> {}", message.text).green()),
            Role::Assistant => println!("{}", message.text.bright_white()),
        }
    }
}

/// Outcome of one REPL line
enum Flow {
    Continue,
    Quit,
}

async fn handle_line(session: &mut SessionContext, line: &str) -> Flow {
    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };

    match command {
        "/quit" | "/exit" => return Flow::Quit,
        "/help" => print_help(),
        "/key" => {
            if arg.is_empty() {
                show(&Notice::warning("Usage: /key <api key>"));
            } else {
                show(&session.set_credential(arg));
            }
        }
        "/lang" => {
            if arg.is_empty() {
                println!(
                    "Current language: {} (suggested: {})",
                    session.language(),
                    SUPPORTED_LANGUAGES.join(", ")
                );
            } else {
                show(&session.set_language(arg));
            }
        }
        "/connect" => show(&session.connect().await),
        "/clear" => {
            let notice = session.clear_screen();
            redraw(session);
            show(&notice);
        }
        "/reset" => {
            let notice = session.full_reset();
            redraw(session);
            show(&notice);
        }
        "/status" => print_status(session),
        "/metrics" => match metrics::gather_text() {
            Ok(text) => print!("{}", text),
            Err(e) => show(&Notice::error(format!("Could not gather metrics: {}", e))),
        },
        _ if command.starts_with('/') => {
            show(&Notice::warning(format!("Unknown command {}. Try /help.", command)));
        }
        _ => match session
            .submit(line, &ConsoleObserver { trace: TracingObserver })
            .await {
            TurnOutcome::Completed { answer, .. } => {
                println!();
                println!("{}", answer.bright_white());
            }
            other => {
                if let Some(notice) = other.notice() {
                    show(&notice);
                }
            }
        },
    }

    for notice in session.refresh().await {
        show(&notice);
    }
    Flow::Continue
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let connect_on_start = cli.connect;
    let config = cli.apply(AppConfig::from_env());

    if let Err(e) = telemetry::init_tracing("insightsql", config.otlp_endpoint.as_deref()) {
        eprintln!("{}", format!("Tracing disabled: {}", e).yellow());
    }

    let mut session = SessionContext::with_defaults(config);

    println!("{}", "=== InsightSQL ===".bright_magenta().bold());
    println!(
        "{}",
        format!(
            "Model {} | database {} | answers in {}",
            session.config().model,
            session.config().database_uri,
            session.language()
        )
        .bright_black()
    );
    println!("{}", "Type /help for commands.".bright_black());
    println!();

    for notice in session.refresh().await {
        show(&notice);
    }
    if connect_on_start {
        show(&session.connect().await);
        for notice in session.refresh().await {
            show(&notice);
        }
    }
    for notice in session.readiness_notices() {
        show(&notice);
    }

    let mut rl = DefaultEditor::new()?;
    loop {
        match rl.readline(">> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                // keep credentials out of the line history
                if !trimmed.starts_with("/key") {
                    let _ = rl.add_history_entry(trimmed);
                }
                if let Flow::Quit = handle_line(&mut session, trimmed).await {
                    println!("{}", "Goodbye!".bright_green());
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type /quit to exit.".yellow());
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        }
    }

    telemetry::shutdown_tracing();
    Ok(())
}
