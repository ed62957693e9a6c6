//! Switchboard - Operator CLI for the Completion Router
//!
//! Loads configuration once, wires the provider manager, adapters and router,
//! and runs a single command against them.
//!
//! # Usage
//!
//! ```bash
//! # Capacity per provider
//! switchboard health
//!
//! # Model catalogue with availability
//! switchboard models --json
//!
//! # One completion, streamed as it arrives
//! switchboard chat "Explain round-robin scheduling" --stream
//!
//! # Coding-oriented default model on every provider
//! switchboard chat "Write a binary search in Rust" --mode code
//!
//! # Verbose logging (to stderr)
//! RUST_LOG=switchboard_core=debug switchboard chat "hello"
//! ```
//!
//! # Environment Variables
//!
//! - `SWITCHBOARD_CONFIG`: Configuration file path
//! - `SWITCHBOARD_PRIORITY`: Comma-separated provider order
//! - `GROQ_API_KEY`, `GROQ_API_KEY_1`, ...: Provider keys (one prefix per provider)
//! - `RUST_LOG`: Log filter (overrides `--log-level`)

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use switchboard_core::{
    load_config_from_path, models, ChatMode, ChatRequest, ConfigOverrides, ProviderId,
    RequestRouter, SwitchboardConfig,
};

/// Switchboard - Multi-provider completion routing with pooled credentials
#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "SWITCHBOARD_CONFIG", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Provider order, overriding file and environment (e.g. groq,gemini)
    #[arg(short = 'p', long, value_delimiter = ',', global = true)]
    priority: Option<Vec<ProviderId>>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "SWITCHBOARD_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show credential capacity per provider
    Health {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List the models of every configured provider
    Models {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Send one prompt through the router
    Chat {
        /// User prompt
        prompt: String,

        /// System instructions prepended to the conversation
        #[arg(short = 's', long)]
        system: Option<String>,

        /// Model identifier sent to every provider
        #[arg(short = 'm', long, conflicts_with = "mode")]
        model: Option<String>,

        /// Pick each provider's default model for this mode (general, code, fast)
        #[arg(long)]
        mode: Option<ChatMode>,

        /// Maximum output tokens
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Sampling temperature (0.0 - 2.0)
        #[arg(short = 't', long)]
        temperature: Option<f32>,

        /// Print text as it arrives
        #[arg(long)]
        stream: bool,
    },
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so command output stays pipeable.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("switchboard={level},switchboard_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration and apply CLI overrides
fn load(args: &Args) -> Result<SwitchboardConfig> {
    let path = args
        .config
        .clone()
        .or_else(switchboard_core::default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref priority) = args.priority {
        overrides = overrides.with_priority(priority.clone());
    }
    overrides
        .apply(&mut config)
        .context("Invalid command-line overrides")?;

    info!(
        source = %config.source(),
        providers = ?config.active_providers(),
        "Configuration loaded"
    );
    Ok(config)
}

fn print_health(router: &RequestRouter, json: bool) -> Result<()> {
    let health = router.health_status();
    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    println!(
        "{:<12} {:>9} {:>7} {:>12} {:>10} {:>10}",
        "PROVIDER", "AVAILABLE", "TOTAL", "RATE-LIMITED", "USED", "CAPACITY"
    );
    for h in &health {
        println!(
            "{:<12} {:>9} {:>7} {:>12} {:>10} {:>10}",
            h.provider.as_str(),
            h.available_credentials,
            h.total_credentials,
            h.rate_limited_credentials,
            h.used_today,
            h.total_capacity
        );
    }
    if health.is_empty() {
        println!("(no providers configured)");
    }
    Ok(())
}

fn print_models(router: &RequestRouter, json: bool) -> Result<()> {
    let models = router.available_models();
    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    for m in &models {
        println!(
            "{:<12} {}{}{}",
            m.provider.as_str(),
            m.id,
            if m.is_default { "  (default)" } else { "" },
            if m.available { "" } else { "  [no capacity]" },
        );
    }
    Ok(())
}

async fn run_stream(router: &RequestRouter, request: ChatRequest) -> Result<()> {
    let mut stream = router.complete_stream(request);
    let mut stdout = std::io::stdout();

    loop {
        let chunk = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                // Dropping the stream cancels the upstream request
                writeln!(stdout)?;
                anyhow::bail!("Interrupted");
            }
            chunk = stream.next_chunk() => chunk,
        };
        let Some(chunk) = chunk else {
            break;
        };

        write!(stdout, "{}", chunk.delta)?;
        stdout.flush()?;

        if chunk.terminal {
            writeln!(stdout)?;
            if let Some(error) = chunk.error {
                anyhow::bail!(error);
            }
            debug!(
                provider = ?chunk.provider,
                model = ?chunk.model,
                usage = ?chunk.usage,
                "Stream complete"
            );
        }
    }
    Ok(())
}

async fn run_chat(router: &RequestRouter, request: ChatRequest) -> Result<()> {
    let response = tokio::select! {
        _ = tokio::signal::ctrl_c() => anyhow::bail!("Interrupted"),
        response = router.complete(&request) => response,
    };

    if !response.success {
        anyhow::bail!(response.error.unwrap_or_else(|| "request failed".to_string()));
    }
    println!("{}", response.content);
    debug!(
        provider = ?response.provider,
        model = ?response.model,
        total_tokens = response.usage.total_tokens,
        elapsed_ms = response.elapsed_ms,
        "Completion done"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = load(&args)?;

    if let Command::Chat {
        mode: Some(mode), ..
    } = args.command
    {
        for settings in config.providers.values_mut() {
            settings.default_model = Some(models::default_model(settings.provider, mode).to_string());
        }
    }

    let manager = Arc::new(config.build_manager());
    let router = config
        .build_router(Arc::clone(&manager))
        .context("Failed to build provider adapters")?;

    match args.command {
        Command::Health { json } => print_health(&router, json),
        Command::Models { json } => print_models(&router, json),
        Command::Chat {
            prompt,
            system,
            model,
            mode: _,
            max_tokens,
            temperature,
            stream,
        } => {
            let mut request = ChatRequest::from_prompt(prompt).with_stream(stream);
            if let Some(system) = system {
                request = request.with_system(system);
            }
            if let Some(model) = model {
                request = request.with_model(model);
            }
            if let Some(max_tokens) = max_tokens {
                request = request.with_max_tokens(max_tokens);
            }
            if let Some(temperature) = temperature {
                request = request.with_temperature(temperature);
            }

            if request.stream {
                run_stream(&router, request).await
            } else {
                run_chat(&router, request).await
            }
        }
    }
}
