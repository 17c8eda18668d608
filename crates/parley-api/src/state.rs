//! Application state wiring the engine to concrete infrastructure.
//!
//! AppState pins the generic [`ChatEngine`] to the in-memory session store
//! and the OpenAI-compatible transport configured in `config.toml`.

use std::path::PathBuf;
use std::sync::Arc;

use parley_core::ChatEngine;
use parley_core::context::EngineContext;
use parley_infra::config::{load_global_config, resolve_data_dir};
use parley_infra::llm::create_provider;
use parley_infra::store::InMemorySessionStore;
use parley_types::config::GlobalConfig;

/// Concrete engine type pinned to infra implementations.
pub type ConcreteChatEngine = ChatEngine<InMemorySessionStore>;

/// Loaded configuration, without a transport. Enough for `parley config`.
pub struct AppConfig {
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
}

impl AppConfig {
    pub async fn load(data_dir: Option<PathBuf>) -> Self {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        let config = load_global_config(&data_dir).await;
        Self { config, data_dir }
    }
}

/// Shared application state holding the engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: ConcreteChatEngine,
    pub store: Arc<InMemorySessionStore>,
    pub config: GlobalConfig,
}

impl AppState {
    /// Build the engine: resolve the transport, wire the store.
    pub fn init(app: AppConfig) -> anyhow::Result<Self> {
        let provider = create_provider(&app.config.provider).map_err(|e| {
            anyhow::anyhow!(
                "{e}. Export {} with your provider API key.",
                app.config.provider.api_key_env
            )
        })?;

        let store = Arc::new(InMemorySessionStore::new());
        let ctx = EngineContext::from_config(&app.config);
        let engine = ChatEngine::new(ctx, provider, Arc::clone(&store));

        Ok(Self {
            engine,
            store,
            config: app.config,
        })
    }
}
