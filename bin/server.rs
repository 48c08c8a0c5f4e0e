// Swipe Attendance - Recorder Server
// REST API with Axum: stations post swipes, a scheduler posts /send-summary

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info_span, warn};

use swipe_attendance::{
    telemetry, AppConfig, HttpEmailNotifier, RecordRequest, RecorderError, RecorderService,
    RecorderSettings, SqliteSink,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    recorder: Arc<RecorderService>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: String,
}

/// Optional body of POST /send-summary
#[derive(Debug, Default, Deserialize)]
struct SummaryRequest {
    since: Option<DateTime<Utc>>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
enum ApiError {
    Recorder(RecorderError),
    /// The blocking task itself died
    Internal(String),
}

impl From<RecorderError> for ApiError {
    fn from(e: RecorderError) -> Self {
        ApiError::Recorder(e)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Recorder(RecorderError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "Identity not found".to_string())
            }
            ApiError::Recorder(e) => {
                error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ApiError::Internal(e) => {
                error!(error = %e, "request task failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
        };
        (status, Json(ErrorResponse { detail })).into_response()
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(MessageResponse {
        message: "OK".to_string(),
    })
}

/// POST /swipe - Record one swipe
async fn record_swipe(
    State(state): State<AppState>,
    Json(request): Json<RecordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let recorder = state.recorder.clone();
    let receipt = tokio::task::spawn_blocking(move || recorder.record(request)).await??;

    Ok(Json(MessageResponse {
        message: receipt.message,
    }))
}

/// POST /send-summary - Report on recent swipes and email it
async fn send_summary(
    State(state): State<AppState>,
    body: Option<Json<SummaryRequest>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let since = body.map(|Json(b)| b).unwrap_or_default().since;
    let recorder = state.recorder.clone();
    let outcome = tokio::task::spawn_blocking(move || recorder.summarize(since)).await??;

    Ok(Json(MessageResponse {
        message: outcome.message,
    }))
}

fn app(state: AppState) -> Router {
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        let request_id = uuid::Uuid::new_v4();
        info_span!(
            "request",
            %request_id,
            method = %request.method(),
            uri = %request.uri()
        )
    });

    Router::new()
        .route("/swipe", post(record_swipe))
        .route("/send-summary", post(send_summary))
        .route("/api/health", get(health_check))
        .layer(ServiceBuilder::new().layer(trace))
        .with_state(state)
}

// ============================================================================
// Main Server
// ============================================================================

async fn serve(app: Router, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("\n🚀 Recorder running on http://{}", addr);
    println!("   POST /swipe");
    println!("   POST /send-summary");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    println!("🛰️  Swipe Attendance - Recorder v{}", swipe_attendance::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("❌ Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Some(path) = telemetry::init_tracing(Some(&config.log_dir()), "recorder")? {
        println!("✓ Logging to {}", path.display());
    }

    let sink = SqliteSink::open(config.database_path())?;
    println!("✓ Database opened: {}", config.database_path().display());

    let roster_path = config.roster_path();
    if !roster_path.exists() {
        warn!(path = %roster_path.display(), "roster file missing");
        eprintln!("⚠️  Roster not found at {}", roster_path.display());
    }

    // Blocking HTTP client: build it outside the async runtime
    let notifier = Arc::new(HttpEmailNotifier::new(&config.email));
    let recorder = RecorderService::new(
        Box::new(sink),
        notifier,
        RecorderSettings::from_config(&config),
    );
    let state = AppState {
        recorder: Arc::new(recorder),
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(app(state), &config.http_addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use swipe_attendance::{Email, Notifier, NotifyError};

    #[derive(Default)]
    struct CollectingNotifier {
        sent: Mutex<Vec<Email>>,
    }

    impl Notifier for CollectingNotifier {
        fn send(&self, email: &Email) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    fn state(dir: &std::path::Path) -> (AppState, Arc<CollectingNotifier>) {
        let roster_path = dir.join("roster.csv");
        std::fs::write(
            &roster_path,
            "identity_id,name,email\n1234567,Ada Lovelace,ada@example.test\n",
        )
        .unwrap();

        let notifier = Arc::new(CollectingNotifier::default());
        let settings = RecorderSettings {
            roster_path,
            backup_dir: dir.join("backup"),
            timezone: chrono_tz::America::New_York,
            confirm_swipes: true,
            signature: None,
            summary_recipients: vec!["chief@example.test".to_string()],
            summary_subject: "Attendance Summary".to_string(),
        };
        let recorder = RecorderService::new(
            Box::new(SqliteSink::open(dir.join("swipes.db")).unwrap()),
            notifier.clone(),
            settings,
        );
        (
            AppState {
                recorder: Arc::new(recorder),
            },
            notifier,
        )
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_record_known_identity() {
        let dir = tempfile::tempdir().unwrap();
        let (state, notifier) = state(dir.path());

        let Json(body) = record_swipe(State(state), Json(RecordRequest::new("1234567")))
            .await
            .unwrap();

        assert_eq!(body.message, "Swipe recorded and email sent");
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_unknown_identity_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = state(dir.path());

        let err = record_swipe(State(state), Json(RecordRequest::new("7654321")))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Recorder(RecorderError::NotFound(_))));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_send_summary_without_body() {
        let dir = tempfile::tempdir().unwrap();
        let (state, notifier) = state(dir.path());

        let Json(body) = send_summary(State(state), None).await.unwrap();

        assert_eq!(body.message, "Summary sent successfully");
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].attachments.len(), 2);
    }

    #[tokio::test]
    async fn test_send_summary_with_since() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = state(dir.path());

        let request = SummaryRequest {
            since: Some(Utc::now()),
        };
        let Json(body) = send_summary(State(state), Some(Json(request))).await.unwrap();
        assert_eq!(body.message, "Summary sent successfully");
    }

    #[test]
    fn test_roster_error_maps_to_500() {
        let err = ApiError::Recorder(RecorderError::Roster(anyhow::anyhow!("missing")));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
