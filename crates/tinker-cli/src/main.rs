use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use tinker::{
    AgentRunner, AnthropicProvider, CancellationToken, Conversation, Sandbox, TinkerConfig,
    TurnEvent, TurnFinish, builtin_tools,
};

const DEFAULT_CONFIG_FILE: &str = "tinker.toml";

#[derive(Parser)]
#[command(name = "tinker", about = "Chat with a coding agent that can read and edit files")]
struct Args {
    /// Path to a tinker.toml config file (defaults to ./tinker.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model id, overriding the config file
    #[arg(long)]
    model: Option<String>,

    /// Maximum model calls per turn, overriding the config file
    #[arg(long)]
    max_steps: Option<usize>,

    /// Directory the file tools are confined to (defaults to the current directory)
    #[arg(long)]
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let api_key =
        std::env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY env var required")?;

    let sandbox = match &args.root {
        Some(root) => Sandbox::open(root),
        None => Sandbox::current_dir(),
    }
    .context("failed to open working directory")?;
    tracing::info!(root = %sandbox.root().display(), model = %config.provider.model, "starting");

    let mut provider = AnthropicProvider::new(api_key, config.provider.model.clone());
    if let Some(base_url) = &config.provider.base_url {
        provider = provider.with_base_url(base_url.clone());
    }

    let runner = AgentRunner::builder(Arc::new(provider))
        .config(&config)
        .tools(builtin_tools(Arc::new(sandbox)))
        .on_event(Arc::new(print_event))
        .build()
        .context("invalid agent configuration")?;

    repl(&runner).await
}

fn load_config(args: &Args) -> Result<TinkerConfig> {
    let mut config = match &args.config {
        Some(path) => TinkerConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            TinkerConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => TinkerConfig::default(),
    };

    if let Some(model) = &args.model {
        config.provider.model = model.clone();
    }
    if let Some(max_steps) = args.max_steps {
        config.agent.max_steps = max_steps;
    }
    config.validate()?;
    Ok(config)
}

fn print_event(event: TurnEvent) {
    match event {
        TurnEvent::AssistantText { text, .. } => println!("Claude: {text}"),
        TurnEvent::ToolCallStarted {
            tool_name, input, ..
        } => println!("Tool: {tool_name}({input})"),
        _ => {}
    }
}

async fn repl<P: tinker::LlmProvider>(runner: &AgentRunner<P>) -> Result<()> {
    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Chat with Claude (Ctrl-D to quit)");
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        // Ctrl-C only abandons the running turn, not the session.
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };
        let result = runner
            .run_turn_with_cancel(&mut conversation, input, &cancel)
            .await;
        watcher.abort();

        match result {
            Ok(output) => {
                match output.finish {
                    TurnFinish::Completed => {}
                    TurnFinish::StepBudgetExhausted => eprintln!(
                        "(stopped after {} steps; send another message to continue)",
                        output.steps
                    ),
                    TurnFinish::Cancelled => eprintln!("(turn cancelled)"),
                }
                tracing::debug!(
                    input_tokens = output.tokens_used.input_tokens,
                    output_tokens = output.tokens_used.output_tokens,
                    tool_calls = output.tool_calls_made,
                    "turn finished"
                );
            }
            Err(e) if e.is_transport() => eprintln!("Error: {e}"),
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(
        conversation_id = %conversation.id(),
        messages = conversation.len(),
        "session ended"
    );
    Ok(())
}
