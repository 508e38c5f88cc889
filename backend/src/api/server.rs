//! HTTP Server for the export API.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/export`     | Upload an MMS ID list and export it  |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |
//! | GET    | `/exports/{file}` | Download a finished CSV              |

use axum::{
    extract::{Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{error_response, failed_response, ExportResponse};
use crate::alma::AlmaClient;
use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::export::{is_export_file_name, run_export, ExportOptions};
use crate::input::read_identifiers_bytes;
use crate::schema::OutputSchema;

type ApiError = (StatusCode, Json<Value>);

/// Shared server state
pub struct AppState {
    pub config: ExportConfig,
    pub schema: OutputSchema,
}

/// Build the router
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/export", post(export_upload))
        .route("/api/logs", get(sse_logs))
        .route("/exports/{file}", get(download_export))
        .with_state(state)
        .layer(cors)
}

/// Start the HTTP server
pub async fn start_server(
    port: u16,
    config: ExportConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState {
        config,
        schema: OutputSchema::alma_digital(),
    });
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Alma export server running on http://localhost:{}", port);
    println!("   POST /api/export - Upload MMS ID CSV and export");
    println!("   GET  /api/logs   - SSE log stream");
    println!("   GET  /exports/{{file}} - Download an exported CSV file");
    println!("   GET  /health     - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "alma-export",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "export": "POST /api/export",
            "logs": "GET /api/logs (SSE)",
            "download": "GET /exports/{file}"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// HTTP status for a failed run
fn status_for(error: &ExportError) -> StatusCode {
    match error {
        ExportError::EmptyInput | ExportError::Input(_) | ExportError::Config(_) => {
            StatusCode::BAD_REQUEST
        }
        ExportError::AllRecordsFailed { .. } => StatusCode::BAD_GATEWAY,
        ExportError::CsvWrite(_) | ExportError::Schema(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(error_response(&message)))
}

fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, Json(error_response("Export not found")))
}

/// Download a finished export by bare file name.
async fn download_export(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    if !is_export_file_name(&file) {
        return Err(not_found());
    }
    let bytes = tokio::fs::read(state.config.export_dir.join(&file))
        .await
        .map_err(|_| not_found())?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file)),
    ];
    Ok((headers, bytes).into_response())
}

/// Export endpoint.
///
/// Multipart fields: `file` (required), `api_key`, `limit`, `institution`,
/// `mark_deleted`.
async fn export_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ExportResponse>, ApiError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut api_key: Option<String> = None;
    let mut institution: Option<String> = None;
    let mut limit: Option<usize> = None;
    let mut mark_deleted = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            file_name = field.file_name().map(|s| s.to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("Read error: {}", e)))?;
            file_data = Some(bytes.to_vec());
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| bad_request(format!("Read error: {}", e)))?;
        let text = text.trim().to_string();
        match name.as_str() {
            "api_key" => api_key = Some(text),
            "institution" => institution = Some(text),
            "limit" if !text.is_empty() => {
                let n = text
                    .parse::<usize>()
                    .map_err(|_| bad_request(format!("Invalid limit: {}", text)))?;
                limit = Some(n);
            }
            "mark_deleted" => mark_deleted = matches!(text.as_str(), "true" | "1" | "on"),
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| bad_request("No file provided".to_string()))?;
    log_info(format!(
        "New export request: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let fail = |e: ExportError| -> ApiError {
        let body = match &e {
            ExportError::AllRecordsFailed { failed } => failed_response(&e.to_string(), failed),
            _ => error_response(&e.to_string()),
        };
        (status_for(&e), Json(body))
    };

    let input = read_identifiers_bytes(&bytes).map_err(|e| fail(e.into()))?;
    let config = state
        .config
        .clone()
        .with_api_key(api_key)
        .with_institution(institution);
    let client = AlmaClient::from_config(&config).map_err(|e| fail(e.into()))?;

    let options = ExportOptions::default()
        .with_limit(limit)
        .with_mark_deleted(mark_deleted)
        .with_output_dir(config.export_dir.clone());

    let catalog = config.catalog();
    let report = run_export(&client, &input.identifiers, &catalog, &state.schema, &options)
        .await
        .map_err(fail)?;

    Ok(Json(ExportResponse::new(&report, &input)))
}
