//! Shale - a small static web-asset server
//!
//! This is the main entry point for the Shale CLI.

use clap::{Parser, Subcommand};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use shale_core::config::{ConfigLoader, ShaleConfig};
use shale_core::middleware::{AccessLog, Chain, SetHeaders};
use shale_static::FileServer;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bytes::Bytes;
use http::{Request, Response};

/// Shale - a small static web-asset server
#[derive(Parser)]
#[command(name = "shale")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server with a configuration file
    Run {
        /// Path to the configuration file (JSON or TOML)
        #[arg(default_value = "shale.toml")]
        config: String,
    },

    /// Start a quick file server
    #[command(name = "file-server")]
    FileServer {
        /// Address to listen on
        #[arg(long, default_value = ":8080")]
        listen: String,

        /// Root directory to serve
        #[arg(long, default_value = ".")]
        root: String,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "shale.toml")]
        config: String,
    },

    /// Show version information
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config: config_path,
        } => {
            let config = match ConfigLoader::load(&config_path) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("❌ Failed to load config: {}", e);
                    std::process::exit(1);
                }
            };
            init_logging(cli.verbose, &config.logging.level);
            tracing::info!("📄 Loaded configuration from: {}", config_path);
            Ok(run_server(config)?)
        }

        Commands::FileServer { listen, root } => {
            init_logging(cli.verbose, "info");

            // Resolve absolute path
            let root = std::fs::canonicalize(&root)
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or(root);

            let config = ShaleConfig {
                listen,
                root,
                ..Default::default()
            };
            Ok(run_server(config)?)
        }

        Commands::Validate {
            config: config_path,
        } => {
            match ConfigLoader::load(&config_path).and_then(check_config) {
                Ok(()) => {
                    println!("✅ Configuration '{}' is valid!", config_path);
                }
                Err(e) => {
                    eprintln!("❌ Configuration Error: {}", e);
                    std::process::exit(1);
                }
            }
            Ok(())
        }

        Commands::Version => {
            println!("Shale v{}", shale_core::VERSION);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool, level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            tracing_subscriber::EnvFilter::new("debug")
        } else {
            tracing_subscriber::EnvFilter::new(level.to_string())
        }
    });

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}

/// Resolve everything the config names, without starting the server
fn check_config(config: ShaleConfig) -> shale_core::Result<()> {
    FileServer::from_config(config.root.as_str(), &config.index, &config.encodings)?;
    SetHeaders::from_map(&config.headers)?;
    Ok(())
}

/// Parse a listen address, accepting the `:port` shorthand
fn parse_listen(listen: &str) -> shale_core::Result<SocketAddr> {
    let listen = if listen.starts_with(':') {
        format!("0.0.0.0{}", listen)
    } else {
        listen.to_string()
    };
    listen
        .parse()
        .map_err(|e| shale_core::Error::Server(format!("Invalid listen address '{}': {}", listen, e)))
}

fn run_server(config: ShaleConfig) -> shale_core::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(config))
}

async fn serve(config: ShaleConfig) -> shale_core::Result<()> {
    let addr = parse_listen(&config.listen)?;

    let server = Arc::new(FileServer::from_config(
        config.root.as_str(),
        &config.index,
        &config.encodings,
    )?);
    let chain = Chain::new()
        .with(Arc::new(AccessLog))
        .with(Arc::new(SetHeaders::from_map(&config.headers)?));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("🚀 Shale v{} listening on http://{}", shale_core::VERSION, addr);
    tracing::info!("📁 Serving {} (index: {})", config.root, config.index);

    loop {
        let (stream, _) = match listener.accept().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Accept error: {}", e);
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let server = server.clone();
        let chain = chain.clone();

        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .serve_connection(
                    io,
                    service_fn(move |req| handle_request(req, server.clone(), chain.clone())),
                )
                .await
            {
                // Usually the client going away mid-response.
                tracing::debug!("Connection ended with error: {:?}", err);
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    server: Arc<FileServer>,
    chain: Chain,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, _body) = req.into_parts();
    let req = Request::from_parts(parts, ());

    let mut resp = match chain.before(&req) {
        Some(resp) => resp,
        None => server.serve(&req).await,
    };
    chain.after(&req, &mut resp);

    let (parts, body) = resp.into_parts();
    Ok(Response::from_parts(parts, Full::new(body)))
}
