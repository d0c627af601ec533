//! HTTP host for the clarity audit and finance assistants.
//!
//! `clarity-web` owns what a browser frontend cannot: the per-session slots
//! (last note, last result, selected module, staged refinement) and the order
//! in which a render cycle touches them. Rendering itself stays external; any
//! client that speaks JSON can drive the two screens.
//!
//! # Quick start
//!
//! ```ignore
//! use clarity_rs::config::ClarityConfig;
//! use clarity_web::{WebConfig, spawn_web};
//!
//! let clarity = ClarityConfig::from_env()?;
//! let addr = spawn_web(&clarity, WebConfig::default()).await?;
//! println!("Clarity API: http://{addr}/api/modules");
//! ```
//!
//! # Endpoints
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /api/sessions` | Create a session, returns `{"session_id"}` |
//! | `DELETE /api/sessions/{id}` | Discard a session |
//! | `GET /api/modules` | Audit module catalog |
//! | `GET/POST /api/sessions/{id}/audit` | Audit view / audit actions |
//! | `GET/POST /api/sessions/{id}/finance` | Finance view / finance actions |

mod api;
mod server;
pub mod snapshot;

pub use snapshot::{AuditView, FinanceView, ModuleHeader};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clarity_rs::ChatError;
use clarity_rs::config::ClarityConfig;

/// Default idle time after which a session is discarded.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
    /// Directory of static frontend files served for non-API paths.
    ///
    /// If `None`, only the API is served and the frontend runs separately.
    pub static_dir: Option<PathBuf>,
    /// Sessions untouched for this long are dropped. Default: 30 minutes.
    pub session_ttl: Duration,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            static_dir: None,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }
}

/// Failure to bring the server up.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error(transparent)]
    Client(#[from] ChatError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down.
pub async fn spawn_web(clarity: &ClarityConfig, config: WebConfig) -> Result<SocketAddr, WebError> {
    let state = api::AppState::new(clarity, config.session_ttl)?;
    let router = server::build_router(state, config.static_dir);
    server::start_server(router, config.bind_addr).await
}
