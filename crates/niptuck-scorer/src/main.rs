mod config;
mod error;
mod model;
mod normalize;
mod photos;
mod prompt;
mod render;
mod rubric;
mod server;
mod session;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use niptuck_common::credential::CredentialStore;
use niptuck_common::gemini::GeminiClient;
use niptuck_common::kv::KeyValueStore;

use config::Config;
use server::NipTuckServer;
use session::ScoringSession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting niptuck-scorer MCP server");

    let config = Config::from_env()?;
    info!(
        endpoint = %config.gemini.endpoint(),
        timeout_ms = config.gemini.default_timeout.as_millis(),
        temperature = config.gemini.temperature,
        tcp = config.tcp_listen_addr.is_some(),
        "configuration loaded"
    );

    let kv = KeyValueStore::from_env()?;
    match &kv {
        KeyValueStore::File(store) => info!(path = %store.path().display(), "using file store"),
        KeyValueStore::Redis(redis) => {
            if redis.is_available().await {
                info!("redis connected");
            } else {
                info!("redis unavailable, API key reads will come back empty");
            }
        }
    }
    let credentials = CredentialStore::new(kv);
    info!(backend = credentials.backend_name(), "credential store ready");

    let temperature = config.gemini.temperature;
    let gemini = Arc::new(GeminiClient::new(config.gemini.clone())?);
    let server = NipTuckServer::new(ScoringSession::new(credentials, gemini, temperature));

    if let Some(addr) = config.tcp_listen_addr {
        let listener = TcpListener::bind(addr).await?;
        info!(listen_addr = %addr, "MCP server ready, serving on TCP");
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = server.clone();
            tokio::spawn(async move {
                tracing::info!(peer = %peer, "MCP client connected");
                let service = server.serve(stream).await.inspect_err(|e| {
                    tracing::error!(error = %e, "MCP server error");
                })?;
                service.waiting().await?;
                tracing::info!(peer = %peer, "MCP client disconnected");
                Ok::<(), anyhow::Error>(())
            });
        }
    } else {
        info!("MCP server ready, serving on stdio");
        let service = server.serve(stdio()).await.inspect_err(|e| {
            tracing::error!(error = %e, "MCP server error");
        })?;
        service.waiting().await?;
        info!("MCP server shut down");
    }
    Ok(())
}
