//! Serve the clarity assistants over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Reads AZURE_OPENAI_* from the environment or .env
//! cargo run -p clarity-web
//! cargo run -p clarity-web -- --port 8080
//! cargo run -p clarity-web -- --static-dir frontend/out
//! ```
//!
//! ## Driving a session
//!
//! ```bash
//! curl -X POST localhost:3001/api/sessions
//! # {"session_id":"ss-..."}
//! curl -X POST localhost:3001/api/sessions/ss-.../audit \
//!   -H 'content-type: application/json' -d '{"action":"demo"}'
//! curl -X POST localhost:3001/api/sessions/ss-.../audit \
//!   -H 'content-type: application/json' -d '{"action":"run"}'
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use clarity_rs::config::ClarityConfig;
use clarity_web::{WebConfig, spawn_web};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// HTTP host for the audit and finance clarity assistants.
#[derive(Parser)]
#[command(about = "HTTP host for the audit and finance clarity assistants")]
struct Args {
    /// Port for the API server.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Serve a static frontend build from this directory.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Minutes of inactivity before a session is discarded.
    #[arg(long, default_value_t = 30)]
    session_ttl_mins: u64,
}

async fn serve(args: Args) -> Result<(), String> {
    let clarity = ClarityConfig::from_env().map_err(|e| e.to_string())?;
    info!(
        "Azure deployment '{}', modules from {}, prompts from {}",
        clarity.deployment,
        clarity.modules_dir.display(),
        clarity.prompts_dir.display()
    );

    let web_config = WebConfig {
        bind_addr: (args.host, args.port).into(),
        static_dir: args.static_dir,
        session_ttl: Duration::from_secs(args.session_ttl_mins.saturating_mul(60)),
    };
    let addr = spawn_web(&clarity, web_config)
        .await
        .map_err(|e| e.to_string())?;
    println!("Clarity API: http://{addr}/api/modules");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for Ctrl-C: {e}"))?;
    info!("Shutting down");
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = serve(args).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
