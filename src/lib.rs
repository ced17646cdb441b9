pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use logic::{
    BindingBuilder, Bindings, DefaultBindingBuilder, DispatchOutcome, DispatchState,
    DispatchStrategy, OpsEvaluator, ScriptEvaluator, TransformerDispatcher,
};

// Export all model types
pub use model::*;

pub use store::{MemoryStore, Store};

use std::sync::Arc;

/// Router over an empty in-memory store, with the configured named scripts loaded
pub fn build_app(config: &config::AppConfig) -> axum::Router {
    let evaluator = OpsEvaluator::with_scripts(config.scripts.clone());
    let dispatcher = TransformerDispatcher::new(Arc::new(evaluator));
    let state = Arc::new(api::AppState::new(MemoryStore::new(), dispatcher));

    routes::create_router().with_state(state)
}

