//! # banterd
//!
//! Banter gateway server binary — wires the store, limiter, registry,
//! retrieval, and provider together and serves the WebSocket gateway.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use banter_auth::{StaticTokenVerifier, TokenVerifier};
use banter_core::Identity;
use banter_gateway::{GatewayConfig, GatewayServer, GatewayState, PresenceBus, RoomDirectory};
use banter_limiter::{QuotaTable, RateLimiter};
use banter_llm::{CompletionProvider, ContextAssembler, OpenAiCompatProvider};
use banter_registry::ConnectionRegistry;
use banter_retrieval::{EmbeddingCache, RetrievalService};
use banter_store::migrations::run_migrations;
use banter_store::{
    ConnectionConfig, MemorySharedStore, RecordStore, SqliteRecordStore, new_file,
};

/// Banter chat gateway server.
#[derive(Parser, Debug)]
#[command(name = "banterd", about = "Banter chat gateway server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8793")]
    port: u16,

    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON file mapping tokens to identities
    /// (`{"token": {"id": "...", "displayName": "...", "email": "..."}}`).
    #[arg(long)]
    tokens_file: Option<PathBuf>,

    /// Accept this single token as a local development identity.
    #[arg(long)]
    dev_token: Option<String>,

    /// OpenAI-compatible completion endpoint base URL
    /// (e.g. `https://api.openai.com/v1`). Unset disables the assistant.
    #[arg(long, env = "BANTER_LLM_BASE_URL")]
    llm_base_url: Option<String>,

    /// Completion model ID.
    #[arg(long, env = "BANTER_LLM_MODEL", default_value = "gpt-4o-mini")]
    llm_model: String,

    /// Completion API key.
    #[arg(long, env = "BANTER_LLM_API_KEY", default_value = "")]
    llm_api_key: String,

    /// Maximum simultaneous connections per identity.
    #[arg(long, default_value = "5")]
    max_connections_per_user: usize,
}

impl Cli {
    fn default_db_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".banter").join("banter.db")
    }
}

fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn build_verifier(cli: &Cli) -> Result<Arc<dyn TokenVerifier>> {
    let mut verifier = StaticTokenVerifier::new();

    if let Some(path) = &cli.tokens_file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read tokens file {}", path.display()))?;
        let entries: HashMap<String, Identity> =
            serde_json::from_str(&raw).context("tokens file is not a token → identity map")?;
        let count = entries.len();
        for (token, identity) in entries {
            verifier = verifier.with_identity(token, identity);
        }
        info!(count, "loaded identities from tokens file");
    }

    if let Some(token) = &cli.dev_token {
        warn!("dev token enabled; do not use in production");
        verifier = verifier.with_identity(
            token.clone(),
            Identity {
                id: "dev".into(),
                display_name: "Developer".into(),
                email: "dev@localhost".into(),
            },
        );
    }

    Ok(Arc::new(verifier))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let db_path = cli.db_path.clone().unwrap_or_else(Cli::default_db_path);
    ensure_parent_dir(&db_path)?;
    let pool = new_file(
        db_path.to_str().context("database path is not UTF-8")?,
        &ConnectionConfig::default(),
    )?;
    {
        let conn = pool.get()?;
        let applied = run_migrations(&conn)?;
        info!(db = %db_path.display(), applied, "database ready");
    }

    let records = Arc::new(SqliteRecordStore::new(pool));
    let shared = Arc::new(MemorySharedStore::new());
    let retrieval = Arc::new(RetrievalService::new(
        records.clone(),
        EmbeddingCache::new(shared.clone()),
    ));

    let config = GatewayConfig {
        host: cli.host.clone(),
        port: cli.port,
        max_connections_per_user: cli.max_connections_per_user,
        ..GatewayConfig::default()
    };

    let assembler = Arc::new(ContextAssembler::new(
        records.clone(),
        retrieval.clone(),
        config.similar_k,
        config.recent_history,
    ));

    let provider: Option<Arc<dyn CompletionProvider>> = match &cli.llm_base_url {
        Some(base_url) => {
            info!(base_url, model = cli.llm_model, "assistant replies enabled");
            Some(Arc::new(OpenAiCompatProvider::new(
                base_url.clone(),
                cli.llm_api_key.clone(),
                cli.llm_model.clone(),
            )))
        }
        None => {
            info!("no completion endpoint configured; assistant replies disabled");
            None
        }
    };

    let state = Arc::new(GatewayState {
        verifier: build_verifier(&cli)?,
        registry: Arc::new(ConnectionRegistry::new(config.max_connections_per_user)),
        rooms: Arc::new(RoomDirectory::new()),
        limiter: Arc::new(RateLimiter::new(shared, QuotaTable::default())),
        records,
        retrieval,
        assembler,
        provider,
        presence: PresenceBus::new(),
        config,
    });

    // Catch up on messages that were persisted before their embedding
    // could be attached (e.g. after a crash mid-attach).
    {
        let records = Arc::clone(&state.records);
        let retrieval = Arc::clone(&state.retrieval);
        let _ = tokio::spawn(async move {
            let rooms = match records.list_rooms().await {
                Ok(rooms) => rooms,
                Err(e) => {
                    warn!(error = %e, "embedding backfill skipped");
                    return;
                }
            };
            for room in rooms {
                let outcome = retrieval.backfill(&room.id, 256).await;
                if outcome.succeeded + outcome.failed > 0 {
                    info!(
                        room = %room.id,
                        succeeded = outcome.succeeded,
                        failed = outcome.failed,
                        "embedding backfill"
                    );
                }
            }
        });
    }

    let server = GatewayServer::new(state);
    let (addr, handle) = server.listen().await?;
    info!(%addr, "banterd running");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        result = handle => {
            result.context("server task failed")?;
        }
    }
    Ok(())
}
