// Web boundary: upload endpoint, JSON read endpoints and static assets
//
// Handlers only translate HTTP to the core operations. Anything that touches
// the file system or SQLite runs on the blocking pool.

use crate::config::Config;
use crate::db::{TransferSink, TransferSource};
use crate::error::{IngestError, StoreError};
use crate::ingest::{ingest_upload, IngestOptions, IngestReport};
use crate::query::{self, DailyCreditReport, Listing, RecordPage};
use axum::{
    extract::{rejection::QueryRejection, DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Everything the handlers need to reach storage
pub trait TransferStore: TransferSink + TransferSource {}

impl<T: TransferSink + TransferSource> TransferStore for T {}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TransferStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn TransferStore>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

// ============================================================================
// RESPONSES & ERRORS
// ============================================================================

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn failed(data: Option<T>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data,
            error: Some(error.into()),
        }
    }
}

/// Upload outcome sent back to the browser
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub report: IngestReport,
}

/// Read results carry how long the request took to serve
#[derive(Debug, Serialize)]
pub struct Timed<T> {
    #[serde(flatten)]
    pub result: T,
    pub elapsed_ms: f64,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Ingest(e) => {
                error!(error = %e, "upload could not be ingested");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The file could not be processed".to_string(),
                )
            }
            ApiError::Store(e) => {
                error!(error = %e, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ApiResponse::<()>::failed(None, message))).into_response()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(format!("invalid query parameters: {}", rejection.body_text()))
    }
}

/// Run blocking storage work off the async runtime
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {}", e)))?
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/transfers", get(list_transfers))
        .route("/transfers/range", get(range_transfers))
        .route("/transfers/daily-credit", get(daily_credit_totals))
        .route("/transfers/amount", get(amount_transfers));

    let static_dir = state.config.static_dir.clone();
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/uploads", post(upload_transfers))
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /uploads - Ingest the CSV sent in the `file` field
async fn upload_transfers(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut file_bytes = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart payload: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("invalid file field: {}", e)))?;
            file_bytes = Some(bytes);
        }
    }

    let bytes = file_bytes.ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;
    info!(bytes = bytes.len(), "upload received");

    let store = state.store.clone();
    let upload_dir = state.config.upload_dir.clone();
    let options = IngestOptions::from(state.config.as_ref());

    let report = blocking(move || {
        let path = spool_upload(&upload_dir, &bytes)
            .map_err(|e| ApiError::Internal(format!("failed to store upload: {}", e)))?;
        Ok(ingest_upload(store.as_ref(), &path, options)?)
    })
    .await?;

    if let Some(failure) = &report.failed_batch {
        let message = format!(
            "Stopped at batch {}: {} rows committed, {} rows not committed",
            failure.index, report.inserted, failure.not_committed
        );
        error!(run_id = %report.run_id, error = %failure.error, "{}", message);

        let body = ApiResponse::failed(
            Some(UploadResponse {
                message: message.clone(),
                report,
            }),
            message,
        );
        return Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response());
    }

    let message = if report.inserted == 0 && report.skipped == 0 {
        "No data to insert.".to_string()
    } else {
        format!(
            "File uploaded and processed: {} rows inserted, {} rows skipped.",
            report.inserted, report.skipped
        )
    };

    Ok((StatusCode::OK, Json(ApiResponse::ok(UploadResponse { message, report }))).into_response())
}

/// Write upload bytes to a uniquely named file that outlives this call
fn spool_upload(dir: &Path, bytes: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".csv")
        .tempfile_in(dir)?;
    file.write_all(bytes)?;

    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

/// GET /api/transfers - Page through every record
async fn list_transfers(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ApiResponse<Listing>>, ApiError> {
    let Query(params) = params?;
    let listing = blocking(move || {
        Ok(query::plain_listing(
            state.store.as_ref(),
            params.limit,
            params.offset,
            state.config.page_size,
            state.config.max_page_size,
        )?)
    })
    .await?;

    Ok(Json(ApiResponse::ok(listing)))
}

#[derive(Debug, Deserialize)]
pub struct DateRangeParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<u32>,
}

/// GET /api/transfers/range - Records between two DD-MM-YYYY dates
async fn range_transfers(
    State(state): State<AppState>,
    params: Result<Query<DateRangeParams>, QueryRejection>,
) -> Result<Json<ApiResponse<Timed<RecordPage>>>, ApiError> {
    let Query(params) = params?;
    let started = Instant::now();

    let page = blocking(move || {
        Ok(query::range_listing(
            state.store.as_ref(),
            params.start_date.as_deref(),
            params.end_date.as_deref(),
            params.page,
            state.config.page_size,
        )?)
    })
    .await?;

    Ok(Json(ApiResponse::ok(Timed {
        result: page,
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
    })))
}

/// GET /api/transfers/daily-credit - Credit totals per day
async fn daily_credit_totals(
    State(state): State<AppState>,
    params: Result<Query<DateRangeParams>, QueryRejection>,
) -> Result<Json<ApiResponse<DailyCreditReport>>, ApiError> {
    let Query(params) = params?;
    let report = blocking(move || {
        Ok(query::daily_credit(
            state.store.as_ref(),
            params.start_date.as_deref(),
            params.end_date.as_deref(),
        )?)
    })
    .await?;

    Ok(Json(ApiResponse::ok(report)))
}

#[derive(Debug, Deserialize)]
pub struct AmountParams {
    pub min_amount: Option<String>,
    pub max_amount: Option<String>,
    pub page: Option<u32>,
}

/// GET /api/transfers/amount - Records whose credit is within bounds
async fn amount_transfers(
    State(state): State<AppState>,
    params: Result<Query<AmountParams>, QueryRejection>,
) -> Result<Json<ApiResponse<Timed<RecordPage>>>, ApiError> {
    let Query(params) = params?;
    let started = Instant::now();

    let page = blocking(move || {
        Ok(query::amount_listing(
            state.store.as_ref(),
            params.min_amount.as_deref(),
            params.max_amount.as_deref(),
            params.page,
            state.config.page_size,
        )?)
    })
    .await?;

    Ok(Json(ApiResponse::ok(Timed {
        result: page,
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "transfer-boundary";

    fn test_state(upload_dir: &Path) -> AppState {
        let store = SqliteStore::open_in_memory().unwrap();
        let config = Config {
            upload_dir: upload_dir.to_path_buf(),
            batch_size: 2,
            ..Config::default()
        };
        AppState::new(Arc::new(store), config)
    }

    fn multipart_body(field: &str, content: &str) -> String {
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"export.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n{content}\r\n--{b}--\r\n",
            b = BOUNDARY
        )
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(app, request).await
    }

    async fn upload(app: Router, field: &str, content: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/uploads")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(field, content)))
            .unwrap();
        send(app, request).await
    }

    const EXPORT: &str = "date_time,trans_no,credit,debit,detail\n\
        01/09/2024_6215.97152,FT1,150,,salary\n\
        02/09/2024_3600,FT2,,20,coffee\n\
        02/09/2024_7200,FT3,450,,refund\n\
        bad-row,FT4,10,,broken\n\
        05/09/2024_60,FT5,900,,bonus\n";

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let (status, body) = get_json(app, "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_upload_then_query() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let (status, body) = upload(app.clone(), "file", EXPORT).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["report"]["inserted"], 4);
        assert_eq!(body["data"]["report"]["skipped"], 1);
        assert_eq!(body["data"]["report"]["batches_written"], 2);
        // Spooled upload is gone
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let (status, body) = get_json(
            app.clone(),
            "/api/transfers/range?start_date=01-09-2024&end_date=02-09-2024",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["filter_applied"], true);
        assert_eq!(body["data"]["total_matching"], 3);
        assert_eq!(body["data"]["records"][0]["time"], "01:43:35");
        assert!(body["data"]["elapsed_ms"].is_number());

        let (_, body) = get_json(
            app.clone(),
            "/api/transfers/daily-credit?start_date=01-09-2024&end_date=30-09-2024",
        )
        .await;
        let days = body["data"]["days"].as_array().unwrap();
        assert_eq!(days.len(), 3);
        assert_eq!(days[1]["date"], "2024-09-02");
        assert_eq!(days[1]["total_credit"], 450.0);

        let (_, body) = get_json(
            app.clone(),
            "/api/transfers/amount?min_amount=100&max_amount=500",
        )
        .await;
        assert_eq!(body["data"]["total_matching"], 2);
        assert_eq!(body["data"]["total_pages"], 1);

        let (_, body) = get_json(app, "/api/transfers?limit=2&offset=1").await;
        assert_eq!(body["data"]["total"], 4);
        assert_eq!(body["data"]["records"][0]["transaction_number"], "FT2");
    }

    #[tokio::test]
    async fn test_missing_range_bound_is_neutral() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let (status, body) = get_json(app, "/api/transfers/range?start_date=01-09-2024").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["filter_applied"], false);
        assert_eq!(body["data"]["total_matching"], 0);
        assert_eq!(body["data"]["records"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_non_numeric_paging_uses_error_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        for uri in [
            "/api/transfers?limit=abc",
            "/api/transfers?offset=-1",
            "/api/transfers/range?start_date=01-09-2024&end_date=02-09-2024&page=abc",
            "/api/transfers/amount?min_amount=1&max_amount=2&page=x",
        ] {
            let (status, body) = get_json(app.clone(), uri).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["success"], false, "{uri}");
            assert!(body["error"].as_str().unwrap().starts_with("invalid query parameters"));
        }
    }

    #[tokio::test]
    async fn test_upload_without_file_is_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let (status, body) = upload(app, "attachment", EXPORT).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_unparseable_upload_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let (status, body) = upload(app, "file", "just,some,columns\n1,2,3\n").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_header_only_upload() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let (status, body) = upload(app, "file", "date_time,trans_no,credit,debit,detail\n").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["message"], "No data to insert.");
    }
}
