use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use klein_core::config::Config;
use klein_core::presets::DEFAULT_PRESET;
use klein_core::{Status, Theme};
use klein_realtime::{DisplayState, HttpTokenProvider, SessionController, WsConnector};

#[derive(Parser)]
#[command(
    name = "klein",
    about = "Klein Realtime: sketch in, AI render out, streamed from fal.ai",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the token proxy and static asset server
    Serve {
        /// Port to listen on (default: $PORT or 3000)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Render one sketch through a realtime session
    Render {
        /// Sketch image (PNG or JPEG)
        #[arg(long)]
        sketch: PathBuf,

        /// Style preset id
        #[arg(long)]
        preset: Option<String>,

        /// Canvas theme (light or dark)
        #[arg(long)]
        theme: Option<Theme>,

        /// Output file
        #[arg(long, default_value = "klein-render.png")]
        out: PathBuf,

        /// Seconds to wait for a rendered image
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// List style presets
    Presets,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Load config
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);

    let config = Config::load(&config_path)?;
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| config.gateway_port());
            tracing::info!("Starting Klein Realtime gateway on port {port}");
            let state = Arc::new(klein_gateway::GatewayState::new(&config));
            klein_gateway::start_gateway(state, port).await?;
        }
        Commands::Render {
            sketch,
            preset,
            theme,
            out,
            timeout,
        } => {
            render(config, &sketch, preset, theme, &out, Duration::from_secs(timeout)).await?;
        }
        Commands::Presets => {
            let catalog = config.preset_catalog();
            let active = config.session().preset;
            for (id, phrase) in catalog.iter() {
                let marker = if id == active { "*" } else { " " };
                println!("{marker} {id:<10} {phrase}");
            }
            if !catalog.contains(&active) {
                println!("(unknown preset '{active}', '{DEFAULT_PRESET}' is used)");
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("# {}", config_path.display());
                println!("{}", serde_json::to_string_pretty(&config)?);
                let (warnings, errors) = config.validate();
                for warning in warnings {
                    eprintln!("warning: {warning}");
                }
                for error in &errors {
                    eprintln!("error: {error}");
                }
                if !errors.is_empty() {
                    bail!("configuration has {} error(s)", errors.len());
                }
            }
        },
    }

    Ok(())
}

fn init_logging(config: &Config, verbose: bool) {
    let logging = config.logging.clone().unwrap_or_default();
    let level = if verbose {
        "debug".to_string()
    } else {
        logging.level.clone().unwrap_or_else(|| "info".to_string())
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = tracing_subscriber::EnvFilter::new(&level);
        for directive in &logging.filters {
            match directive.parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("Ignoring invalid log filter '{directive}': {e}"),
            }
        }
        filter
    });

    if logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Drive one session: load the sketch, wait for the service to answer and
/// write the rendered image.
async fn render(
    mut config: Config,
    sketch: &Path,
    preset: Option<String>,
    theme: Option<Theme>,
    out: &Path,
    timeout: Duration,
) -> anyhow::Result<()> {
    let image = image::open(sketch)
        .with_context(|| format!("Failed to read sketch {}", sketch.display()))?;

    let mut session = config.session();
    if let Some(preset) = preset {
        session.preset = preset;
    }
    if let Some(theme) = theme {
        session.theme = theme;
    }
    config.session = Some(session);

    let realtime = config.realtime();
    let tokens = Arc::new(HttpTokenProvider::new(realtime.token_url.clone()));
    let connector = Arc::new(WsConnector::new(realtime, tokens));
    let (handle, task) = SessionController::start(&config, connector);

    handle.load_sketch(image);
    let settled = tokio::time::timeout(timeout, handle.wait_for(DisplayState::is_settled)).await;
    handle.shutdown();
    let _ = task.await;

    let state = match settled {
        Ok(Some(state)) => state,
        Ok(None) => bail!("session stopped before a result arrived"),
        Err(_) => bail!("no result within {}s", timeout.as_secs()),
    };

    match state.status {
        Status::Ready => {}
        status => bail!("render failed: {status}"),
    }
    let src = state
        .output_src
        .context("session reported ready without an image")?;
    write_output(&src, out)?;

    println!("{}", out.display());
    Ok(())
}

fn write_output(src: &str, out: &Path) -> anyhow::Result<()> {
    let (_, payload) = src
        .split_once(";base64,")
        .context("rendered image is not a base64 data URI")?;
    let bytes = STANDARD.decode(payload).context("invalid base64 in rendered image")?;

    match image::load_from_memory(&bytes) {
        Ok(decoded) => decoded
            .save(out)
            .with_context(|| format!("Failed to write {}", out.display()))?,
        Err(e) => {
            tracing::warn!(error = %e, "Could not decode rendered image, writing raw bytes");
            std::fs::write(out, &bytes)
                .with_context(|| format!("Failed to write {}", out.display()))?;
        }
    }
    Ok(())
}
