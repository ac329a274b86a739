//! completion-router CLI - route prompts to the best-fit completion provider

mod cli;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::{Printer, WaitSpinner};
use completion_router::{
    api::{ChatRequest, Message, ProviderSelector, RequestContext},
    config::Config,
    optimization::count_tokens,
    orchestrator::Router,
    tools::ToolRegistry,
};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "completion-router")]
#[command(about = "Route chat requests across completion providers with token budgeting")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (RUST_LOG takes precedence)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Config file (default: ~/.config/completion-router/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a prompt through the router
    Chat {
        /// Prompt text
        prompt: String,

        /// Provider id or "auto"
        #[arg(short, long, default_value = "auto")]
        provider: ProviderSelector,

        #[arg(short, long, default_value = "0.7")]
        temperature: f32,

        /// Maximum output tokens (default: provider limit)
        #[arg(long)]
        max_tokens: Option<u32>,

        /// JSON file holding earlier messages ([{"role": ..., "content": ...}])
        #[arg(long)]
        history: Option<PathBuf>,

        /// Tenant or company name
        #[arg(long)]
        tenant: Option<String>,

        /// Acting user
        #[arg(long)]
        user: Option<String>,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which provider and path a prompt would take
    Route {
        prompt: String,

        #[arg(short, long, default_value = "auto")]
        provider: ProviderSelector,

        /// Tool names the request would expose
        #[arg(long)]
        tools: Vec<String>,
    },

    /// Estimate the token count of text or a file
    Tokens {
        /// Text to count
        text: Option<String>,

        /// Count a file instead
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List known providers with pricing and credential status
    Providers,

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Initialize configuration file with defaults
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration (credentials masked)
    Show,

    /// Show configuration file path
    Path,

    /// Validate configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    match cli.command {
        Commands::Chat {
            prompt,
            provider,
            temperature,
            max_tokens,
            history,
            tenant,
            user,
            json,
        } => {
            let mut request = ChatRequest::new(prompt)
                .with_provider(provider)
                .with_temperature(temperature)
                .with_context(RequestContext {
                    tenant,
                    acting_user: user,
                    ..Default::default()
                });
            if let Some(tokens) = max_tokens {
                request = request.with_max_output_tokens(tokens);
            }
            if let Some(path) = history {
                request = request.with_history(load_history(&path)?);
            }
            run_chat(config_path, request, json).await?;
        }
        Commands::Route {
            prompt,
            provider,
            tools,
        } => {
            let config = Config::load_from(config_path)?;
            let router = Router::from_config(&config, ToolRegistry::new());
            let request = ChatRequest::new(prompt).with_provider(provider).with_tools(tools);
            match router.plan(&request) {
                Ok(plan) => Printer::default().plan(&plan),
                Err(e) => Printer::default().error(&e),
            }
        }
        Commands::Tokens { text, file } => {
            let content = match (text, file) {
                (_, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                (Some(text), None) => text,
                (None, None) => anyhow::bail!("pass text or --file"),
            };
            println!("{}", count_tokens(&content));
        }
        Commands::Providers => {
            let config = Config::load_from(config_path)?;
            Printer::default().providers(&config);
        }
        Commands::Config(cmd) => {
            run_config_command(cmd, config_path)?;
        }
    }

    Ok(())
}

fn load_history(path: &PathBuf) -> Result<Vec<Message>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading history file {}", path.display()))?;
    let messages: Vec<Message> = serde_json::from_str(&content)
        .with_context(|| format!("parsing history file {}", path.display()))?;
    debug!(messages = messages.len(), "Loaded history");
    Ok(messages)
}

async fn run_chat(config_path: PathBuf, request: ChatRequest, json: bool) -> Result<()> {
    let config = Config::load_from(config_path)?;
    let router = Router::from_config(&config, ToolRegistry::new());
    let printer = Printer::default();

    let mut spinner = if json {
        WaitSpinner::hidden()
    } else {
        WaitSpinner::new()
    };
    spinner.start("Thinking...");
    let result = router.chat(request).await;
    spinner.stop();

    match result {
        Ok(response) if json => println!("{}", serde_json::to_string_pretty(&response)?),
        Ok(response) => printer.response(&response),
        Err(e) if json => {
            println!("{}", serde_json::to_string_pretty(&e.to_response())?);
            std::process::exit(1);
        }
        Err(e) => {
            printer.error(&e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn run_config_command(cmd: ConfigCommands, path: PathBuf) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => config_init(path, force),
        ConfigCommands::Show => config_show(path),
        ConfigCommands::Path => {
            config_path(&path);
            Ok(())
        }
        ConfigCommands::Validate => config_validate(path),
    }
}

fn config_init(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("Configuration file already exists at: {}", path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    Config::default().save_to(path.clone())?;

    println!("Configuration file created at: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file to add API keys under [providers.<id>], or");
    println!("  2. Set environment variables, e.g.:");
    println!("     export GROQ_API_KEY=your_groq_key");
    println!("     export ANTHROPIC_API_KEY=your_anthropic_key");

    Ok(())
}

fn config_show(path: PathBuf) -> Result<()> {
    let mut config = Config::load_from(path)?;

    for id in completion_router::api::ProviderId::ALL {
        let settings = config.providers.get_mut(id);
        if settings.api_key.is_some() {
            settings.api_key = Some("***".to_string());
        }
    }
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

fn config_path(path: &PathBuf) {
    println!("{}", path.display());

    if path.exists() {
        println!("(file exists)");
    } else {
        println!("(file does not exist - run 'config init' to create)");
    }
}

fn config_validate(path: PathBuf) -> Result<()> {
    let config = Config::load_from(path)?;

    match config.validate() {
        Ok(()) => {
            println!("Configuration is valid!");
            let missing = config.missing_credentials();
            if !missing.is_empty() {
                println!();
                println!("Enabled but without a credential:");
                for id in missing {
                    println!("  {} ({})", id, id.profile().credential_env);
                }
            }
        }
        Err(e) => {
            println!("Configuration validation failed:");
            println!("  {}", e);
        }
    }

    Ok(())
}
