// src/bin/chatsweep.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chatsweep::channel::discord::DiscordClient;
use chatsweep::config::{self, Overrides, SweepConfig};
use chatsweep::engine::{DeletionEngine, EngineSettings};
use chatsweep::job::{follow_events, Job, JobEvent};
use chatsweep::logging;
use chatsweep::message::{Credential, DeletionRequest};
use chatsweep::pacing::ThreadPacer;

#[derive(Parser)]
#[command(
    name = "chatsweep",
    about = "Delete every message a user wrote in a chat channel"
)]
struct Cli {
    /// Config file (default: ./chatsweep.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the web UI and job API
    Serve {
        /// Host to bind (overrides chatsweep.toml)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides chatsweep.toml)
        #[arg(long)]
        port: Option<u16>,
        /// API base URL (overrides chatsweep.toml)
        #[arg(long)]
        api_base: Option<String>,
    },
    /// Run one deletion in the foreground. Ctrl-C stops after the current call.
    Run {
        /// Author whose messages are deleted
        #[arg(long)]
        user_id: String,
        /// Channel to sweep
        #[arg(long)]
        channel_id: String,
        /// Session token sent as the Authorization header
        #[arg(long)]
        token: String,
        /// API base URL (overrides chatsweep.toml)
        #[arg(long)]
        api_base: Option<String>,
        /// Messages per page, 1-100 (overrides chatsweep.toml)
        #[arg(long)]
        page_size: Option<u32>,
        /// Pause after each delete in milliseconds (overrides chatsweep.toml)
        #[arg(long)]
        pace_ms: Option<u64>,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_file = cli.config.as_deref();

    match cli.command {
        Commands::Serve {
            host,
            port,
            api_base,
        } => {
            let overrides = Overrides {
                api_base,
                web_host: host,
                web_port: port,
                ..Default::default()
            };
            cmd_serve(load_effective_config(config_file, &overrides)?)
        }
        Commands::Run {
            user_id,
            channel_id,
            token,
            api_base,
            page_size,
            pace_ms,
        } => {
            let overrides = Overrides {
                api_base,
                page_size,
                pace_ms,
                ..Default::default()
            };
            let request = DeletionRequest::new(&user_id, &channel_id, Credential::new(token));
            cmd_run(load_effective_config(config_file, &overrides)?, request)
        }
        Commands::Config => cmd_config(load_effective_config(config_file, &Overrides::default())?),
    }
}

/// File settings (explicit path, else ./chatsweep.toml, else defaults)
/// with command-line overrides on top.
fn load_effective_config(path: Option<&Path>, overrides: &Overrides) -> Result<SweepConfig> {
    let mut cfg = match path {
        Some(path) => config::load_config(path)?
            .with_context(|| format!("Config file not found: {}", path.display()))?,
        None => {
            let dir = chatsweep::work_dir()?;
            config::load_config(&config::config_path(&dir))?.unwrap_or_default()
        }
    };
    cfg.apply_overrides(overrides);
    cfg.validate()?;
    Ok(cfg)
}

fn cmd_serve(cfg: SweepConfig) -> Result<()> {
    logging::init(&cfg.log_filter);
    let store = Arc::new(DiscordClient::from_config(&cfg));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(chatsweep::web::serve(cfg, store, Arc::new(ThreadPacer)))
}

fn cmd_run(cfg: SweepConfig, request: DeletionRequest) -> Result<()> {
    logging::init(&cfg.log_filter);

    let engine = DeletionEngine::new(
        DiscordClient::from_config(&cfg),
        ThreadPacer,
        EngineSettings::from(&cfg),
    );
    let job = Job::new(&request.channel_id, &request.user_id);

    flag::register(SIGINT, job.cancel_flag()).context("Failed to register SIGINT handler")?;
    flag::register(SIGTERM, job.cancel_flag()).context("Failed to register SIGTERM handler")?;

    // Print deletions as they happen.
    let mut events = job.subscribe();
    let printer = std::thread::spawn(move || {
        follow_events(&mut events, |event| {
            if let JobEvent::Deleted { content, .. } = event {
                println!("deleted: {content}");
            }
        });
    });

    let outcome = engine.run(&job, &request);
    job.finish(&outcome);
    let _ = printer.join();

    match outcome {
        Ok(result) => {
            if result.is_cancelled() {
                println!("Cancelled. Deleted {} message(s).", result.total());
            } else {
                println!("Deleted {} message(s).", result.total());
            }
            if job.skipped() > 0 {
                println!("Skipped {} message(s) that could not be deleted.", job.skipped());
            }
            Ok(())
        }
        Err(e) => {
            if let Some(partial) = e.partial() {
                if partial.total() > 0 {
                    eprintln!(
                        "{} message(s) were deleted before the failure.",
                        partial.total()
                    );
                }
            }
            Err(e.into())
        }
    }
}

fn cmd_config(cfg: SweepConfig) -> Result<()> {
    print!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}
