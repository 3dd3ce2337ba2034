use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use axum_macros::debug_handler;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

use crate::{
    config::CorsConfig,
    dto::{
        CleanupRequest, CreateNoteRequest, CreateNoteResponse, MessageResponse, NoteResponse,
        PreviewResponse, ReadNoteRequest,
    },
    error::NoteError,
    guard::RequestMeta,
    service::{Deletion, NoteService, Retrieval},
};

#[derive(OpenApi)]
#[openapi(
    paths(create_note, read_note, read_note_with_password, delete_note, cleanup_note),
    components(schemas(
        CreateNoteRequest,
        CreateNoteResponse,
        ReadNoteRequest,
        NoteResponse,
        PreviewResponse,
        CleanupRequest,
        MessageResponse
    )),
    tags(
        (name = "notes", description = "Self-destructing notes API")
    )
)]
pub struct ApiDoc;

/// Which optional routes to mount.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub allow_unverified_read: bool,
    pub cors: CorsConfig,
}

fn message(status: StatusCode, text: impl Into<String>) -> Response {
    (status, Json(MessageResponse::new(text))).into_response()
}

fn error_response(e: NoteError) -> Response {
    match e {
        NoteError::Validation(msg) => message(StatusCode::BAD_REQUEST, msg),
        NoteError::Forbidden => message(StatusCode::FORBIDDEN, "Incorrect password"),
        NoteError::NotFound => message(StatusCode::NOT_FOUND, "Note not found or already destroyed."),
        NoteError::Store(e) => {
            tracing::error!("Database error: {e}");
            message(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn retrieval_response(retrieval: Retrieval) -> Response {
    match retrieval {
        Retrieval::Preview => (StatusCode::OK, Json(PreviewResponse::default())).into_response(),
        Retrieval::Delivered(note) => (StatusCode::OK, Json(note)).into_response(),
    }
}

fn bad_body(rejection: &JsonRejection) -> Response {
    tracing::debug!("Rejected request body: {rejection}");
    message(StatusCode::BAD_REQUEST, "Invalid request body")
}

fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
}

#[utoipa::path(
    post,
    path = "/notes",
    request_body = CreateNoteRequest,
    responses(
        (status = 201, description = "Note created successfully", body = CreateNoteResponse),
        (status = 400, description = "Missing or invalid field", body = MessageResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn create_note(
    State(service): State<Arc<NoteService>>,
    payload: Result<Json<CreateNoteRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_body(&rejection),
    };

    match service.create(payload).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/notes/{id}",
    params(
        ("id" = String, Path, description = "Note ID")
    ),
    responses(
        (status = 200, description = "Note delivered and destroyed, or a link preview", body = NoteResponse),
        (status = 404, description = "Note not found or already destroyed", body = MessageResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn read_note(
    State(service): State<Arc<NoteService>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let meta = RequestMeta {
        user_agent: user_agent(&headers),
    };

    match service.read_unverified(&id, &meta).await {
        Ok(retrieval) => retrieval_response(retrieval),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    post,
    path = "/notes/{id}",
    params(
        ("id" = String, Path, description = "Note ID")
    ),
    request_body = ReadNoteRequest,
    responses(
        (status = 200, description = "Note delivered and destroyed, or a link preview", body = NoteResponse),
        (status = 400, description = "Password missing", body = MessageResponse),
        (status = 403, description = "Incorrect password, note kept", body = MessageResponse),
        (status = 404, description = "Note not found or already destroyed", body = MessageResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn read_note_with_password(
    State(service): State<Arc<NoteService>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<ReadNoteRequest>, JsonRejection>,
) -> Response {
    let meta = RequestMeta {
        user_agent: user_agent(&headers),
    };
    let password = match &payload {
        Ok(Json(request)) => request.password.as_deref(),
        // A preview fetch carries no body; let the guard see it first.
        Err(_) => None,
    };

    match service.read_with_password(&id, password, &meta).await {
        Ok(retrieval) => retrieval_response(retrieval),
        Err(e @ NoteError::Validation(_)) => match &payload {
            Err(rejection) => bad_body(rejection),
            Ok(_) => error_response(e),
        },
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    delete,
    path = "/notes/{id}",
    params(
        ("id" = String, Path, description = "Note ID")
    ),
    responses(
        (status = 204, description = "Note deleted"),
        (status = 404, description = "Note not found", body = MessageResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn delete_note(
    State(service): State<Arc<NoteService>>,
    Path(id): Path<String>,
) -> Response {
    match service.delete(&id).await {
        Ok(Deletion::Deleted) => StatusCode::NO_CONTENT.into_response(),
        Ok(Deletion::AlreadyGone) => message(StatusCode::NOT_FOUND, "Note not found"),
        Err(e) => error_response(e),
    }
}

/// Target of scheduled cleanup jobs. Repeated delivery is harmless.
#[utoipa::path(
    post,
    path = "/cleanup",
    request_body = CleanupRequest,
    responses(
        (status = 200, description = "Note deleted or already gone", body = MessageResponse),
        (status = 400, description = "note_id missing", body = MessageResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn cleanup_note(
    State(service): State<Arc<NoteService>>,
    payload: Result<Json<CleanupRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(CleanupRequest {
        note_id: Some(note_id),
    })) = payload
    else {
        tracing::warn!("Cleanup invoked without a note_id");
        return message(StatusCode::BAD_REQUEST, "note_id is required");
    };

    match service.delete(&note_id).await {
        Ok(Deletion::Deleted) => message(StatusCode::OK, "Note deleted successfully"),
        Ok(Deletion::AlreadyGone) => message(StatusCode::OK, "Note already destroyed"),
        Err(e) => error_response(e),
    }
}

pub async fn root() -> Response {
    (StatusCode::OK, "Burn notes server is running").into_response()
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origin = if config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn router(service: Arc<NoteService>, options: &RouterOptions) -> Router {
    let mut router = Router::new()
        .route("/", get(root))
        .route("/notes", post(create_note))
        .route("/notes/{id}", post(read_note_with_password))
        .route("/notes/{id}", delete(delete_note))
        .route("/cleanup", post(cleanup_note));

    if options.allow_unverified_read {
        router = router.route("/notes/{id}", get(read_note));
    }

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .with_state(service)
        .layer(cors_layer(&options.cors))
        .layer(TraceLayer::new_for_http())
}
