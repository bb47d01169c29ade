//! HTTP API for photo upload, face match and registration

use crate::config::AppConfig;
use crate::registration::{
    object_store, EmbeddingService, FaceMatcher, HttpAiClient, ImageStorage, MatchOrchestrator,
    MatchOutcome, ObjectStore, RegistrationError, RegistrationForm, SubmissionService,
    UserDirectory,
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub images: Arc<ImageStorage>,
    pub directory: Arc<UserDirectory>,
    pub orchestrator: Arc<MatchOrchestrator>,
    pub submission: Arc<SubmissionService>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn ObjectStore>,
        matcher: Arc<dyn FaceMatcher>,
        embedder: Option<Arc<dyn EmbeddingService>>,
    ) -> Self {
        let images = Arc::new(ImageStorage::new(
            store.clone(),
            config.registration.users_prefix.clone(),
        ));
        let directory = Arc::new(UserDirectory::new(
            store,
            config.registration.records_prefix.clone(),
        ));
        let orchestrator = Arc::new(MatchOrchestrator::new(images.clone(), matcher));
        let submission = Arc::new(SubmissionService::new(
            images.clone(),
            directory.clone(),
            embedder,
        ));

        Self {
            images,
            directory,
            orchestrator,
            submission,
        }
    }

    /// Connect the configured storage backend and AI server client.
    pub fn connect(config: &AppConfig) -> Result<Self, RegistrationError> {
        let store = object_store::connect(&config.registration)?;
        let ai = Arc::new(HttpAiClient::new(&config.matcher)?);
        let embedder: Option<Arc<dyn EmbeddingService>> = if config.matcher.embed_on_register {
            Some(ai.clone())
        } else {
            None
        };

        Ok(Self::new(config, store, ai, embedder))
    }
}

impl IntoResponse for RegistrationError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistrationError::ValidationError(_) => StatusCode::BAD_REQUEST,
            RegistrationError::AlreadyExists(_) => StatusCode::CONFLICT,
            RegistrationError::NotFound(_) | RegistrationError::MatchNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            RegistrationError::TransportFailure(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        (status, Json(json!({ "success": false, "message": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct DestinationRequest {
    pub destination: String,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingUpdate {
    pub embedding: Vec<f32>,
}

// Configure routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(health_check))
        .route("/api/upload-image", post(upload_image))
        .route("/api/signed-url", post(signed_url))
        .route("/api/match", post(find_match))
        .route("/api/registrations", get(list_registrations).post(submit_registration))
        .route(
            "/api/registrations/:id",
            get(get_registration).delete(delete_registration),
        )
        .route("/api/registrations/:id/embedding", put(update_embedding))
        .route("/api/registrations/:id/embed", post(request_embedding))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "face-enroll",
        "bucket": state.images.store().bucket(),
    }))
}

fn upload_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

// Multipart upload: `file` (required) and `name` (optional folder label)
async fn upload_image(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut label: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return upload_error(StatusCode::BAD_REQUEST, format!("Malformed upload: {}", e)),
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload.jpg").to_string();
                match field.bytes().await {
                    Ok(bytes) => file = Some((file_name, bytes.to_vec())),
                    Err(e) => {
                        return upload_error(StatusCode::BAD_REQUEST, format!("Malformed upload: {}", e))
                    }
                }
            }
            "name" => label = field.text().await.ok(),
            _ => {}
        }
    }

    let Some((file_name, data)) = file.filter(|(_, data)| !data.is_empty()) else {
        return upload_error(StatusCode::BAD_REQUEST, "No file provided");
    };
    let label = label.unwrap_or_default();

    match state.images.try_upload(data, &file_name, &label).await {
        Ok(destination) => {
            info!("Image uploaded successfully: {}", destination);
            Json(json!({
                "imageUrl": state.images.public_url(&destination),
                "destination": destination,
                "message": "Image uploaded successfully",
            }))
            .into_response()
        }
        Err(RegistrationError::ValidationError(msg)) => upload_error(StatusCode::BAD_REQUEST, msg),
        Err(e) => {
            error!("Upload error: {}", e);
            upload_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload image")
        }
    }
}

async fn signed_url(
    State(state): State<AppState>,
    Json(payload): Json<DestinationRequest>,
) -> Result<impl IntoResponse, RegistrationError> {
    let signed = state.images.signed_url(&payload.destination).await?;
    Ok(Json(signed))
}

async fn find_match(
    State(state): State<AppState>,
    Json(payload): Json<DestinationRequest>,
) -> Result<impl IntoResponse, RegistrationError> {
    let outcome = state.orchestrator.find_match(&payload.destination).await?;
    let message = outcome.message().to_string();

    let body = match outcome {
        MatchOutcome::Matched { user, preview } => json!({
            "success": true,
            "message": message,
            "data": user,
            "previewUrl": preview.url,
        }),
        MatchOutcome::NotMatched { .. } => json!({
            "success": false,
            "message": message,
        }),
    };
    Ok(Json(body))
}

async fn list_registrations(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, RegistrationError> {
    let registrations = state.directory.list().await?;
    let count = registrations.len();
    Ok(Json(json!({ "registrations": registrations, "count": count })))
}

async fn submit_registration(
    State(state): State<AppState>,
    Json(form): Json<RegistrationForm>,
) -> Result<impl IntoResponse, RegistrationError> {
    info!("Registration request for mobile {:?}", form.mobile);
    let receipt = state.submission.submit(&form).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn get_registration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RegistrationError> {
    Ok(Json(state.directory.get(&id).await?))
}

async fn delete_registration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RegistrationError> {
    state.directory.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_embedding(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<EmbeddingUpdate>,
) -> Result<impl IntoResponse, RegistrationError> {
    Ok(Json(state.directory.set_embedding(&id, payload.embedding).await?))
}

async fn request_embedding(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RegistrationError> {
    state.submission.request_embedding(&id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "message": "Embedding requested" })),
    ))
}
