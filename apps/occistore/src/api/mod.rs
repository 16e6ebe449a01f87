//! # occistore Protocol Adapter
//!
//! HTTP/JSON surface over the entity graph store, using axum.
//!
//! ## Endpoints
//!
//! - `POST /save_resource` - Create or overwrite a resource
//! - `POST /save_link` - Create or overwrite a link
//! - `POST /update` - Merge attributes into an entity
//! - `POST /save_mixin`, `POST /update_mixin` - Attach a mixin to entities
//! - `POST /action` - Run a named action through the entity's handler
//! - `POST /find` - Descriptor of an entity (zero or one result)
//! - `POST /load` - Full content of an entity
//! - `POST /list` - Open a cursor over a category or id
//! - `POST /next` - Single-shot read of a cursor
//! - `POST /delete` - Cascading delete, or mixin dissociation
//! - `GET /properties/{name}`, `PUT /properties/{name}` - Introspection
//! - `GET /status` - Store statistics
//! - `GET /health` - Health check

mod handlers;
mod types;

// Re-export handlers and types for integration tests (via `occistore::api::*`)
#[allow(unused_imports)]
pub use handlers::{
    action_handler, delete_handler, find_handler, get_property_handler, health_handler,
    list_handler, load_handler, next_handler, save_link_handler, save_mixin_handler,
    save_resource_handler, set_property_handler, status_for, status_handler, update_handler,
    update_mixin_handler,
};
#[allow(unused_imports)]
pub use types::{
    AckResponse, ActionRequest, ActionResponse, DescriptorJson, FindResponse, HealthResponse,
    IdRequest, ItemJson, ListRequest, ListResponse, LoadResponse, MixinRequest, NextRequest,
    NextResponse, PropertyRequest, PropertyResponse, SaveLinkRequest, SaveResourceRequest,
    SaveResponse, StatusResponse, TaggedAttributes, TaggedValue, UpdateRequest, UpdateResponse,
    error_kind, from_wire_attributes, to_wire_attributes, validate_id,
};

use axum::{
    Router,
    routing::{get, post},
};
use occistore_core::{Session, StoreError};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// The store session. One lock covers the graph; cursors lock internally.
    pub session: Arc<RwLock<Session>>,
    /// Schema document served as the `schema` property.
    pub schema: Arc<Option<String>>,
}

impl AppState {
    /// Create new app state with a session and no schema.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
            schema: Arc::new(None),
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = Arc::new(schema);
        self
    }
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/save_resource", post(handlers::save_resource_handler))
        .route("/save_link", post(handlers::save_link_handler))
        .route("/update", post(handlers::update_handler))
        .route("/save_mixin", post(handlers::save_mixin_handler))
        .route("/update_mixin", post(handlers::update_mixin_handler))
        .route("/action", post(handlers::action_handler))
        .route("/find", post(handlers::find_handler))
        .route("/load", post(handlers::load_handler))
        .route("/list", post(handlers::list_handler))
        .route("/next", post(handlers::next_handler))
        .route("/delete", post(handlers::delete_handler))
        .route(
            "/properties/{name}",
            get(handlers::get_property_handler).put(handlers::set_property_handler),
        )
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(
    addr: &str,
    session: Session,
    schema: Option<String>,
) -> Result<(), StoreError> {
    let state = AppState::new(session).with_schema(schema);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| StoreError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("occistore protocol adapter listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| StoreError::IoError(format!("Server error: {}", e)))
}
