use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_tracing_opentelemetry::middleware::OtelAxumLayer;
use clap::Parser;
use mimalloc::MiMalloc;
use quarry_api::init_tracing;
use quarry_core::{error::ExtractError, ocr::TesseractEngine, QuarryPipeline};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// Requests carry one url, not a document body.
const MAX_BODY_LIMIT: usize = 64 * 1024;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// OpenTelemetry collector endpoint
    #[arg(long, env = "OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    /// Sentry DSN
    #[arg(long, env = "SENTRY_DSN")]
    sentry_dsn: Option<String>,

    /// Sentry environment
    #[arg(long, env = "SENTRY_ENVIRONMENT", default_value = "dev")]
    sentry_environment: String,

    /// API listen address
    #[arg(long, env = "API_LISTEN_ADDR", default_value = "0.0.0.0:3002")]
    listen_addr: String,

    /// Tesseract binary used for pages without a text layer
    #[arg(long, env = "QUARRY_TESSERACT_PATH", default_value = "tesseract")]
    tesseract_path: String,

    /// Number of chunk downloads in flight per job
    #[arg(long, env = "QUARRY_FETCH_CONCURRENCY", default_value = "8")]
    fetch_concurrency: usize,
}

#[derive(Debug, Serialize)]
struct ApiError {
    kind: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ExtractRequest {
    pdf_url: String,
}

#[derive(Clone)]
struct AppState {
    pipeline: QuarryPipeline,
}

fn status_for(error: &ExtractError) -> StatusCode {
    match error {
        ExtractError::Validation => StatusCode::BAD_REQUEST,
        ExtractError::Download(_) => StatusCode::BAD_GATEWAY,
        ExtractError::GuardRejected => StatusCode::PAYLOAD_TOO_LARGE,
        ExtractError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize Sentry if DSN is provided
    let use_sentry = args.sentry_dsn.is_some();
    let _guard = args.sentry_dsn.map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                traces_sample_rate: 1f32,
                sample_rate: 1f32,
                environment: Some(args.sentry_environment.into()),
                ..Default::default()
            },
        ))
    });

    init_tracing(
        args.otlp_endpoint.as_deref(),
        "quarry-api".into(),
        use_sentry,
    )
    .expect("can't setup tracing for API");

    let engine = Arc::new(TesseractEngine::new(&args.tesseract_path));
    let pipeline = QuarryPipeline::new(engine).with_fetch_concurrency(args.fetch_concurrency);
    let app_state = AppState { pipeline };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/extract", post(extract_handler))
        .with_state(app_state)
        .layer(OtelAxumLayer::default())
        .layer(DefaultBodyLimit::max(MAX_BODY_LIMIT));

    let listener = TcpListener::bind(&args.listen_addr).await.unwrap();
    tracing::info!(
        "Starting quarry service listening on {}",
        listener.local_addr().unwrap()
    );
    axum::serve(listener, app).await.unwrap();
}

#[tracing::instrument(skip_all)]
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse {
        success: true,
        data: Some("Service is healthy"),
        error: None,
    })
}

#[tracing::instrument(skip_all, fields(pdf_url = %request.pdf_url))]
async fn extract_handler(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiResponse<()>>)> {
    let doc = state
        .pipeline
        .run(&request.pdf_url, Some(|_| {}))
        .await
        .map_err(|e| {
            (
                status_for(&e),
                Json(ApiResponse {
                    success: false,
                    data: None,
                    error: Some(ApiError {
                        kind: e.kind(),
                        message: e.to_string(),
                    }),
                }),
            )
        })?;

    Ok(Json(ApiResponse {
        success: true,
        data: Some(doc),
        error: None,
    }))
}
