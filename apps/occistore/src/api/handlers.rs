//! # API Endpoint Handlers
//!
//! One handler per protocol operation. Every call is logged at `info`.

use super::{
    AppState,
    types::{
        AckResponse, ActionRequest, ActionResponse, FindResponse, HealthResponse, IdRequest,
        ListRequest, ListResponse, LoadResponse, MixinRequest, NextRequest, NextResponse,
        PropertyRequest, PropertyResponse, SaveLinkRequest, SaveResourceRequest, SaveResponse,
        StatusResponse, UpdateRequest, UpdateResponse, category_ids, error_kind,
        to_wire_attributes, validate_id,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use occistore_core::{CategoryId, EntityGraph, EntityId, StorageBackend, StoreError};

/// HTTP status for a store error.
pub fn status_for(error: &StoreError) -> StatusCode {
    match error {
        StoreError::UnknownCategory(_) | StoreError::DanglingReference { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        StoreError::IndexOutOfRange { .. } | StoreError::UnsupportedAttributeType { .. } => {
            StatusCode::BAD_REQUEST
        }
        StoreError::DigestUnavailable(_)
        | StoreError::SerializationError(_)
        | StoreError::DeserializationError(_)
        | StoreError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn describe(error: &StoreError) -> String {
    format!("{}: {}", error_kind(error), error)
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Store statistics.
pub async fn status_handler(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<AckResponse>)> {
    let session = state.session.read().await;
    let backend = match session.backend() {
        StorageBackend::InMemory => "memory",
        StorageBackend::Persistent => "redb",
    };

    let stats = session
        .graph()
        .stats()
        .map_err(|e| (status_for(&e), Json(AckResponse::error(describe(&e)))))?;
    Ok(Json(StatusResponse::new(
        backend,
        stats,
        session.cursors().open_count(),
    )))
}

// =============================================================================
// SAVE RESOURCE / SAVE LINK
// =============================================================================

pub async fn save_resource_handler(
    State(state): State<AppState>,
    Json(request): Json<SaveResourceRequest>,
) -> impl IntoResponse {
    if let Err(msg) = request.validate() {
        return (StatusCode::BAD_REQUEST, Json(SaveResponse::error(msg)));
    }
    tracing::info!(id = %request.id, kind = %request.kind, owner = %request.owner, "SaveResource");

    let attributes = request.attributes.as_ref().map(to_wire_attributes);
    let mut session = state.session.write().await;
    match session.graph_mut().save_resource(
        EntityId::new(request.id.as_str()),
        CategoryId::new(request.kind.as_str()),
        category_ids(&request.mixins),
        attributes.as_ref(),
        &request.owner,
    ) {
        Ok(id) => (StatusCode::OK, Json(SaveResponse::success(id))),
        Err(e) => (status_for(&e), Json(SaveResponse::error(describe(&e)))),
    }
}

pub async fn save_link_handler(
    State(state): State<AppState>,
    Json(request): Json<SaveLinkRequest>,
) -> impl IntoResponse {
    if let Err(msg) = request.validate() {
        return (StatusCode::BAD_REQUEST, Json(SaveResponse::error(msg)));
    }
    tracing::info!(
        id = %request.id,
        kind = %request.kind,
        source = %request.source,
        target = %request.target,
        "SaveLink"
    );

    let attributes = request.attributes.as_ref().map(to_wire_attributes);
    let mut session = state.session.write().await;
    match session.graph_mut().save_link(
        EntityId::new(request.id.as_str()),
        CategoryId::new(request.kind.as_str()),
        category_ids(&request.mixins),
        EntityId::new(request.source.as_str()),
        EntityId::new(request.target.as_str()),
        attributes.as_ref(),
        &request.owner,
    ) {
        Ok(id) => (StatusCode::OK, Json(SaveResponse::success(id))),
        Err(e) => (status_for(&e), Json(SaveResponse::error(describe(&e)))),
    }
}

// =============================================================================
// UPDATE / MIXINS / ACTIONS
// =============================================================================

pub async fn update_handler(
    State(state): State<AppState>,
    Json(request): Json<UpdateRequest>,
) -> impl IntoResponse {
    if let Err(msg) = request.validate() {
        return (StatusCode::BAD_REQUEST, Json(UpdateResponse::error(msg)));
    }
    tracing::info!(id = %request.id, attributes = request.attributes.len(), "Update");

    let attributes = to_wire_attributes(&request.attributes);
    let mut session = state.session.write().await;
    match session
        .graph_mut()
        .update(&EntityId::new(request.id.as_str()), &attributes)
    {
        Ok(applied) => (StatusCode::OK, Json(UpdateResponse::success(&applied))),
        Err(e) => (status_for(&e), Json(UpdateResponse::error(describe(&e)))),
    }
}

pub async fn save_mixin_handler(
    State(state): State<AppState>,
    Json(request): Json<MixinRequest>,
) -> impl IntoResponse {
    apply_mixin(state, request, "SaveMixin", EntityGraph::save_mixin).await
}

pub async fn update_mixin_handler(
    State(state): State<AppState>,
    Json(request): Json<MixinRequest>,
) -> impl IntoResponse {
    apply_mixin(state, request, "UpdateMixin", EntityGraph::update_mixin).await
}

async fn apply_mixin(
    state: AppState,
    request: MixinRequest,
    operation: &str,
    apply: fn(&mut EntityGraph, &CategoryId, &[EntityId]) -> Result<(), StoreError>,
) -> (StatusCode, Json<AckResponse>) {
    if let Err(msg) = request.validate() {
        return (StatusCode::BAD_REQUEST, Json(AckResponse::error(msg)));
    }
    tracing::info!(mixin = %request.mixin, targets = request.entity_ids.len(), "{}", operation);

    let mixin = CategoryId::new(request.mixin.as_str());
    let mut session = state.session.write().await;
    match apply(session.graph_mut(), &mixin, &request.targets()) {
        Ok(()) => (StatusCode::OK, Json(AckResponse::success())),
        Err(e) => (status_for(&e), Json(AckResponse::error(describe(&e)))),
    }
}

pub async fn action_handler(
    State(state): State<AppState>,
    Json(request): Json<ActionRequest>,
) -> impl IntoResponse {
    if let Err(msg) = request.validate() {
        return (StatusCode::BAD_REQUEST, Json(ActionResponse::error(msg)));
    }
    tracing::info!(id = %request.id, action = %request.action, "Action");

    let attributes = request.attributes.as_ref().map(to_wire_attributes);
    let session = state.session.read().await;
    match session.graph().execute_action(
        &EntityId::new(request.id.as_str()),
        &request.action,
        attributes.as_ref(),
    ) {
        Ok(executed) => (StatusCode::OK, Json(ActionResponse::success(executed))),
        Err(e) => (status_for(&e), Json(ActionResponse::error(describe(&e)))),
    }
}

// =============================================================================
// FIND / LOAD / DELETE
// =============================================================================

pub async fn find_handler(
    State(state): State<AppState>,
    Json(request): Json<IdRequest>,
) -> impl IntoResponse {
    tracing::info!(id = %request.id, "Find");

    let session = state.session.read().await;
    match session.graph().find(&EntityId::new(request.id.as_str())) {
        Ok(found) => (StatusCode::OK, Json(FindResponse::success(found))),
        Err(e) => (status_for(&e), Json(FindResponse::error(describe(&e)))),
    }
}

pub async fn load_handler(
    State(state): State<AppState>,
    Json(request): Json<IdRequest>,
) -> impl IntoResponse {
    tracing::info!(id = %request.id, "Load");

    let session = state.session.read().await;
    match session.graph().load(&EntityId::new(request.id.as_str())) {
        Ok(loaded) => (StatusCode::OK, Json(LoadResponse::success(loaded))),
        Err(e) => (
            status_for(&e),
            Json(LoadResponse::error(request.id, describe(&e))),
        ),
    }
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Json(request): Json<IdRequest>,
) -> impl IntoResponse {
    if let Err(msg) = validate_id("id", &request.id) {
        return (StatusCode::BAD_REQUEST, Json(AckResponse::error(msg)));
    }
    tracing::info!(id = %request.id, "Delete");

    let mut session = state.session.write().await;
    match session.graph_mut().delete(&request.id) {
        Ok(()) => (StatusCode::OK, Json(AckResponse::success())),
        Err(e) => (status_for(&e), Json(AckResponse::error(describe(&e)))),
    }
}

// =============================================================================
// LIST / NEXT
// =============================================================================

pub async fn list_handler(
    State(state): State<AppState>,
    Json(request): Json<ListRequest>,
) -> impl IntoResponse {
    tracing::info!(category = %request.category, "List");

    let filters = to_wire_attributes(&request.filters);
    let session = state.session.read().await;
    match session.list(&request.category, Some(&filters)) {
        Ok(handle) => (
            StatusCode::OK,
            Json(ListResponse::success(handle.cursor_id, handle.serial)),
        ),
        Err(e) => (status_for(&e), Json(ListResponse::error(describe(&e)))),
    }
}

pub async fn next_handler(
    State(state): State<AppState>,
    Json(request): Json<NextRequest>,
) -> impl IntoResponse {
    tracing::info!(cursor = %request.cursor_id, start = request.start, count = request.count, "Next");

    let session = state.session.read().await;
    match session.next(&request.cursor_id, request.start, request.count()) {
        Ok(items) => (StatusCode::OK, Json(NextResponse::success(items))),
        Err(e) => (status_for(&e), Json(NextResponse::error(describe(&e)))),
    }
}

// =============================================================================
// PROPERTIES
// =============================================================================

/// Read a property. Only `schema` has a value.
pub async fn get_property_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    tracing::info!(property = %name, "Get");

    let value = if name.eq_ignore_ascii_case("schema") {
        state.schema.as_deref().map(str::to_string)
    } else {
        None
    };
    Json(PropertyResponse {
        success: true,
        name,
        value,
    })
}

/// Write a property. Accepted and discarded.
pub async fn set_property_handler(
    Path(name): Path<String>,
    Json(request): Json<PropertyRequest>,
) -> impl IntoResponse {
    tracing::info!(property = %name, value = %request.value, "Set ignored");
    Json(AckResponse::success())
}
