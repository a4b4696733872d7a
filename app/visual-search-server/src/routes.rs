//! HTTP surface for the visual search engine

use axum::{
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use visual_search::config::{ServiceConfig, UploadConfig};
use visual_search::{ExtractionError, SearchEngine, SearchError, SearchRequest, SearchResponse};

use crate::upload;

/// Multipart framing overhead allowed on top of the image size limit.
const MULTIPART_SLACK: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub upload: Arc<UploadConfig>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(engine: Arc<SearchEngine>, config: &ServiceConfig) -> Self {
        Self {
            engine,
            upload: Arc::new(config.upload.clone()),
            request_timeout: config.search.request_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UrlQuery {
    #[serde(rename = "imageUrl")]
    image_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    model: String,
    dimension: usize,
    catalog_size: usize,
    cached_items: usize,
}

/// JSON error body: `{success: false, message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match &err {
            SearchError::BadRequest(message) => Self::bad_request(message.clone()),
            SearchError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "Product not found"),
            SearchError::Extraction(ExtractionError::Fetch { .. }) => {
                tracing::warn!("Query image fetch failed: {}", err);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not fetch the image from the given URL",
                )
            }
            SearchError::Extraction(ExtractionError::Decode(_)) => {
                Self::bad_request("The uploaded file is not a readable image")
            }
            SearchError::Extraction(inner) => {
                tracing::error!("Query image extraction failed: {}", inner);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process image")
            }
            SearchError::Timeout => Self::new(StatusCode::GATEWAY_TIMEOUT, "Search timed out"),
            SearchError::Cancelled => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Search was cancelled")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "success": false, "message": self.message }));
        (self.status, body).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = &state.engine;
    Json(HealthResponse {
        status: "OK",
        model: engine.model_name().to_string(),
        dimension: engine.dimension(),
        catalog_size: engine.catalog().len(),
        cached_items: engine.cache().len(),
    })
}

async fn list_products(State(state): State<AppState>) -> Json<serde_json::Value> {
    let products = state.engine.catalog().items();
    Json(json!({
        "success": true,
        "count": products.len(),
        "products": products,
    }))
}

async fn list_categories(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "categories": state.engine.catalog().categories(),
    }))
}

async fn products_in_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Json<serde_json::Value> {
    let products = state.engine.catalog().in_category(&category);
    Json(json!({
        "success": true,
        "count": products.len(),
        "products": products,
    }))
}

async fn similar_products(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SearchResponse>, ApiError> {
    run_search(&state, SearchRequest::CatalogItem(id)).await
}

async fn search(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<SearchResponse>, ApiError> {
    let search_request = parse_search_request(&state, request).await?;
    run_search(&state, search_request).await
}

async fn run_search(
    state: &AppState,
    request: SearchRequest,
) -> Result<Json<SearchResponse>, ApiError> {
    // Dropping the search on timeout stops new per-item lookups; extractions
    // already running complete in the background and remain cached.
    match tokio::time::timeout(state.request_timeout, state.engine.search(request)).await {
        Ok(result) => Ok(Json(result?)),
        Err(_) => Err(SearchError::Timeout.into()),
    }
}

/// Accepts a multipart `image` file, a JSON `{imageUrl}` body or a form `imageUrl` field.
async fn parse_search_request(
    state: &AppState,
    request: Request,
) -> Result<SearchRequest, ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let image_url = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
        return parse_multipart(state, multipart).await;
    } else if content_type.starts_with("application/json") {
        let Json(body) = Json::<UrlQuery>::from_request(request, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        body.image_url
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(body) = Form::<UrlQuery>::from_request(request, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        body.image_url
    } else {
        None
    };

    image_url
        .map(SearchRequest::ImageUrl)
        .ok_or_else(|| ApiError::bad_request("No image file or URL provided"))
}

async fn parse_multipart(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<SearchRequest, ApiError> {
    let mut image: Option<(Option<String>, Bytes)> = None;
    let mut image_url: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let filename = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
                image = Some((filename, bytes));
            }
            Some("imageUrl") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
                image_url = Some(text);
            }
            _ => {}
        }
    }

    if let Some((filename, bytes)) = image {
        upload::validate(&state.upload, filename.as_deref(), &bytes)?;
        let filename = filename.map(|name| upload::sanitize_filename(&name));
        if state.upload.persist {
            let name = filename.as_deref().unwrap_or("upload");
            match upload::persist(&state.upload, name, &bytes).await {
                Ok(path) => tracing::info!("Saved upload to {}", path.display()),
                Err(e) => tracing::warn!("Could not save upload {}: {}", name, e),
            }
        }
        return Ok(SearchRequest::Upload { bytes, filename });
    }

    image_url
        .map(SearchRequest::ImageUrl)
        .ok_or_else(|| ApiError::bad_request("No image file or URL provided"))
}

/// Build the application router. Routes are served at the root and under `/api`.
pub fn router(state: AppState, image_root: Option<PathBuf>) -> Router {
    let body_limit = state.upload.max_bytes + MULTIPART_SLACK;

    let api = Router::new()
        .route("/health", get(health))
        .route("/products", get(list_products))
        .route("/products/:id/similar", get(similar_products))
        .route("/categories", get(list_categories))
        .route("/category/:category", get(products_in_category))
        .route("/search", post(search));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new().merge(api.clone()).nest("/api", api);
    if let Some(root) = image_root {
        app = app.nest_service("/product-images", ServeDir::new(root));
    }

    app.layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}
