use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use luna_common::Plan;
use luna_config::ConfigLoader;
use luna_security::PlanFeatures;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "luna", version, about = "Luna - AI companion platform backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the config
    /// file's `log_level`, then `info`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory holding config.yml / config.toml and the data directory
    #[arg(long, env = "LUNA_CONFIG_DIR", global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Start {
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Query a running server's status
    Status,

    /// Create the config and data directories
    Init,

    /// Print what each subscription plan includes
    Plans,
}

#[tokio::main]
async fn main() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => eprintln!("loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => eprintln!("ignoring unreadable .env file: {e}"),
    }

    let cli = Cli::parse();

    let config_loader = match cli.config_dir {
        Some(dir) => ConfigLoader::with_dir(dir),
        None => ConfigLoader::new()?,
    };
    let config = config_loader.load_with_env()?;

    let log_level = cli
        .log_level
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            config_loader.ensure_dirs()?;
            let mut config = config;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            config.validate()?;
            if config.brain.provider == "template" {
                warn!("using the template brain, set brain.provider to \"openai\" for model replies");
            }

            info!("starting luna v{}", env!("CARGO_PKG_VERSION"));
            let server = luna_gateway::GatewayServer::new(config, config_loader.config_dir());
            server.run().await?;
        }
        Commands::Status => {
            let base = config.gateway.base_url();
            println!("Luna status: checking {base} ...");

            let resp = reqwest::Client::new()
                .get(format!("{base}/api/status"))
                .send()
                .await
                .with_context(|| format!("server is not running at {base}"))?;
            if !resp.status().is_success() {
                anyhow::bail!("server at {base} answered {}", resp.status());
            }

            let body = resp.json::<serde_json::Value>().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::Init => {
            config_loader.ensure_dirs()?;
            println!("Luna setup");
            println!("Config directory: {}", config_loader.config_dir().display());
            if config_loader.config_file_exists() {
                println!("Existing config found, leaving it untouched.");
            } else {
                println!("Directories created. Add config.yml (or set JWT_SECRET and friends in .env) to get started.");
            }
        }
        Commands::Plans => print_plans(),
    }

    Ok(())
}

fn print_plans() {
    println!(
        "{:<10} {:>10} {:>14} {:>9} {:>10} {:>9} {:>10}",
        "plan", "companions", "voice min/mo", "advanced", "exclusive", "memories", "scenarios"
    );
    for plan in Plan::ALL {
        let f = PlanFeatures::for_plan(plan);
        println!(
            "{:<10} {:>10} {:>14} {:>9} {:>10} {:>9} {:>10}",
            plan.as_str(),
            f.max_companions,
            f.voice_minutes_per_month,
            yes_no(f.advanced_personality),
            yes_no(f.exclusive_avatars),
            f.memory_capacity,
            yes_no(f.custom_scenarios),
        );
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
