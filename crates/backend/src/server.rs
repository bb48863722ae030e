//! # Prediction Server
//!
//! hyper-based HTTP server exposing the classifier.
//!
//! ## Endpoints
//!
//! - `POST /predict` - multipart upload (`image` or `file` field), returns ranked classes
//! - `GET /health` - liveness, model status and request counters
//! - `GET /metrics` - static model quality figures
//! - `OPTIONS` on any of the above - CORS preflight
//!
//! ## Request Flow
//!
//! A `/predict` request moves through size check, multipart parsing, model
//! check, preprocessing, inference and formatting. Every failure becomes a
//! JSON error body; preprocessing and inference run on the blocking pool so
//! the async workers never stall on CPU-bound work.

use crate::config::BackendConfig;
use dermalens_inference::{
    preprocess_image, Model, PredictionResponse, PredictionResult, DEFAULT_CONFIDENCE_THRESHOLD,
};
use dermalens_shared::{DermalensError, MetricsCollector, Result};
use hyper::body::{Bytes, HttpBody};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS, ALLOW,
    CONTENT_LENGTH, CONTENT_TYPE, ORIGIN, VARY,
};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use multer::{Constraints, Multipart, SizeLimit};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// `message` of the model-not-loaded error body
pub const MODEL_NOT_LOADED_MESSAGE: &str =
    "Please place your trained model file in the models/ directory";

/// `message` of the prediction-failure error body
pub const PREDICTION_FAILED_MESSAGE: &str =
    "Prediction failed. Please check your model file and try again.";

/// Upper bound on how much of a rejected oversized body is read and discarded
const MAX_DRAIN_BYTES: u64 = 64 * 1024 * 1024;

/// Routes and the one method each accepts
const ROUTES: [(&str, Method); 3] = [
    ("/predict", Method::POST),
    ("/health", Method::GET),
    ("/metrics", Method::GET),
];

/// State shared read-only by every request
#[derive(Debug)]
pub struct AppState {
    /// Validated configuration
    pub config: Arc<BackendConfig>,
    /// Loaded classifier; `None` when running degraded
    pub model: Option<Arc<Model>>,
    /// Request counters
    pub metrics: Arc<MetricsCollector>,
}

/// HTTP server for the classifier
#[derive(Debug)]
pub struct PredictionServer {
    state: Arc<AppState>,
}

/// Handle to a running server
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

/// A file taken from the multipart body
#[derive(Debug, Clone)]
pub struct Upload {
    /// Form field the file came from
    pub field: String,
    /// Client-supplied filename, possibly empty
    pub filename: String,
    /// File contents
    pub bytes: Bytes,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
}

impl PredictionServer {
    /// Creates a server; nothing is bound until [`spawn`](Self::spawn)
    pub fn new(
        config: Arc<BackendConfig>,
        model: Option<Arc<Model>>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                config,
                model,
                metrics,
            }),
        }
    }

    /// Shared request state, for calling [`handle_request`] directly
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Binds the listen address and serves in a background task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(self) -> Result<ServerHandle> {
        let bind_addr = self.state.config.listen_addr;
        let model_loaded = self.state.model.is_some();
        let state = self.state;

        let make_svc = make_service_fn(move |_conn| {
            let state = Arc::clone(&state);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| handle_request(req, Arc::clone(&state))))
            }
        });

        let server = match Server::try_bind(&bind_addr) {
            Ok(builder) => builder.serve(make_svc),
            Err(e) => {
                error!(error = %e, bind_addr = %bind_addr, "Failed to bind to address");
                return Err(DermalensError::configuration(
                    format!("Failed to bind to address {}", bind_addr),
                    Some(Box::new(e)),
                ));
            }
        };
        let local_addr = server.local_addr();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = server.with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Prediction server shutdown signal received");
        });

        info!(
            listen_addr = %local_addr,
            model_loaded,
            "Dermalens backend listening"
        );

        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                error!(error = %e, "HTTP server error");
                return Err(DermalensError::internal("HTTP server error", Some(Box::new(e))));
            }
            info!("Prediction server shut down");
            Ok(())
        });

        Ok(ServerHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    /// Serves until Ctrl-C, then shuts down gracefully
    pub async fn start(self) -> Result<()> {
        let ServerHandle {
            shutdown_tx,
            mut task,
            ..
        } = self.spawn()?;

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|e| {
                    DermalensError::configuration(
                        format!("Failed to listen for shutdown signal: {}", e),
                        None,
                    )
                })?;
                info!("Shutdown signal received, stopping backend server");
                if let Some(tx) = shutdown_tx {
                    tx.send(()).ok();
                }
                join_server(task).await
            }
            result = &mut task => flatten_join(result),
        }
    }
}

impl ServerHandle {
    /// Address the server actually bound, useful when port 0 was requested
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits for in-flight requests
    pub async fn shutdown(mut self) -> Result<()> {
        let tx = self
            .shutdown_tx
            .take()
            .ok_or_else(|| DermalensError::internal("Server is not running", None))?;
        tx.send(())
            .map_err(|_| DermalensError::internal("Failed to send shutdown signal", None))?;
        join_server(self.task).await
    }
}

async fn join_server(task: JoinHandle<Result<()>>) -> Result<()> {
    flatten_join(task.await)
}

fn flatten_join(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    result.map_err(|e| DermalensError::internal("Server task failed", Some(Box::new(e))))?
}

/// Routes one request and records its metrics
///
/// Never fails: every error is turned into a JSON response.
#[instrument(skip_all, fields(method = %req.method(), path = %req.uri().path()))]
pub async fn handle_request(
    req: Request<Body>,
    state: Arc<AppState>,
) -> std::result::Result<Response<Body>, Infallible> {
    let start = Instant::now();
    state.metrics.record_request();

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let origin = req
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = match (&method, path.as_str()) {
        (&Method::POST, "/predict") => handle_predict(req, &state).await,
        (&Method::GET, "/health") => handle_health(&state),
        (&Method::GET, "/metrics") => handle_metrics(),
        (&Method::OPTIONS, p) if route_method(p).is_some() => preflight_response(&req, p),
        (_, p) if route_method(p).is_some() => method_not_allowed(p),
        _ => {
            warn!(method = %method, path = %path, "Request to unknown endpoint");
            json_response(StatusCode::NOT_FOUND, &json!({ "error": "Not found" }))
        }
    };

    apply_cors(&mut response, origin.as_deref(), &state.config);

    let status = response.status().as_u16();
    state.metrics.record_response(status);
    if status >= 400 {
        state.metrics.record_error();
    }
    let elapsed = start.elapsed();
    state.metrics.record_request_duration(elapsed);

    debug!(
        status,
        duration_ms = elapsed.as_millis() as u64,
        "Request completed"
    );

    Ok(response)
}

fn route_method(path: &str) -> Option<Method> {
    ROUTES
        .iter()
        .find(|(route, _)| *route == path)
        .map(|(_, method)| method.clone())
}

async fn handle_predict(req: Request<Body>, state: &AppState) -> Response<Body> {
    match predict(req, state).await {
        Ok(body) => json_response(StatusCode::OK, &body),
        Err(err) => error_response(&err),
    }
}

/// Runs the upload-to-prediction pipeline
async fn predict(req: Request<Body>, state: &AppState) -> Result<PredictionResponse> {
    let limit = state.config.max_upload_bytes;

    if let Some(length) = declared_length(&req) {
        if length > limit as u64 {
            warn!(
                content_length = length,
                max_allowed = limit,
                "Upload exceeds size limit"
            );
            // Read the rest so the client sees the 413 instead of a reset
            drain_body(req.into_body(), MAX_DRAIN_BYTES).await;
            return Err(DermalensError::too_large_upload(limit));
        }
    }

    let upload = read_upload(req, limit).await?;

    let Some(model) = state.model.as_ref().map(Arc::clone) else {
        return Err(DermalensError::model_not_loaded(
            state.config.model_path.display().to_string(),
        ));
    };

    if !state.config.is_allowed_filename(&upload.filename) {
        warn!(
            filename = %upload.filename,
            allowed = ?state.config.allowed_extensions,
            "Unexpected file extension, classifying anyway"
        );
    }

    debug!(
        field = %upload.field,
        filename = %upload.filename,
        bytes = upload.bytes.len(),
        "Upload received"
    );

    let config = Arc::clone(&state.config);
    let metrics = Arc::clone(&state.metrics);
    let result = tokio::task::spawn_blocking(move || -> Result<PredictionResult> {
        let tensor = preprocess_image(&upload.bytes, config.image_size)?;
        let started = Instant::now();
        let probabilities = model.predict(&tensor)?;
        metrics.record_inference(started.elapsed());
        PredictionResult::from_probabilities(&config.labels, &probabilities)
    })
    .await
    .map_err(|e| DermalensError::internal("Prediction task failed", Some(Box::new(e))))??;

    let top = result.top();
    if !result.is_confident(DEFAULT_CONFIDENCE_THRESHOLD) {
        warn!(
            predicted_class = %top.label,
            probability = top.probability,
            threshold = DEFAULT_CONFIDENCE_THRESHOLD,
            "Low-confidence prediction"
        );
    }
    info!(
        predicted_class = %top.label,
        confidence_percent = format_args!("{:.2}", top.probability * 100.0),
        "Prediction successful"
    );

    Ok(result.to_response())
}

fn declared_length(req: &Request<Body>) -> Option<u64> {
    req.headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

async fn drain_body(mut body: Body, max_bytes: u64) {
    let mut drained = 0u64;
    while let Some(chunk) = body.data().await {
        match chunk {
            Ok(bytes) => {
                drained += bytes.len() as u64;
                if drained > max_bytes {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

/// Extracts the uploaded file from a `multipart/form-data` body
///
/// Only parts carrying a filename count as files. An `image` part with a
/// non-empty filename wins; otherwise the `file` part is used if present,
/// else the `image` part. The first part of each name is kept.
pub async fn read_upload(req: Request<Body>, limit: usize) -> Result<Upload> {
    let boundary = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or_else(|| {
            debug!("Request body is not multipart/form-data");
            DermalensError::NoFileProvided
        })?;

    let constraints =
        Constraints::new().size_limit(SizeLimit::new().whole_stream(limit as u64));
    let mut multipart = Multipart::with_constraints(req.into_body(), boundary, constraints);

    let mut image: Option<Upload> = None;
    let mut file: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let slot = match name.as_str() {
            "image" => &mut image,
            "file" => &mut file,
            _ => continue,
        };
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if slot.is_some() {
            continue;
        }

        let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        *slot = Some(Upload {
            field: name,
            filename,
            bytes,
        });
    }

    let chosen = match (image, file) {
        (Some(image), _) if !image.filename.is_empty() => image,
        (_, Some(file)) => file,
        (Some(image), None) => image,
        (None, None) => return Err(DermalensError::NoFileProvided),
    };

    if chosen.filename.is_empty() {
        return Err(DermalensError::NoFileSelected);
    }
    Ok(chosen)
}

fn multipart_error(err: multer::Error, limit: usize) -> DermalensError {
    if is_size_overrun(&err) {
        warn!(max_allowed = limit, error = %err, "Multipart body exceeds size limit");
        return DermalensError::too_large_upload(limit);
    }
    debug!(error = %err, "Malformed multipart body");
    DermalensError::NoFileProvided
}

/// Whether `err` is a size-limit overrun, possibly wrapped in a stream read failure
fn is_size_overrun(err: &multer::Error) -> bool {
    match err {
        multer::Error::StreamSizeExceeded { .. } | multer::Error::FieldSizeExceeded { .. } => true,
        multer::Error::StreamReadFailed(inner) => inner
            .downcast_ref::<multer::Error>()
            .is_some_and(is_size_overrun),
        _ => false,
    }
}

fn handle_health(state: &AppState) -> Response<Body> {
    let model_info = match &state.model {
        Some(model) => serde_json::to_value(model.info()).unwrap_or_else(|_| json!({})),
        None => json!({}),
    };

    let snapshot = state.metrics.snapshot();
    let mut requests = serde_json::to_value(&snapshot).unwrap_or_else(|_| json!({}));
    if let Some(fields) = requests.as_object_mut() {
        fields.insert("success_rate".to_string(), json!(snapshot.success_rate()));
        fields.insert("error_rate".to_string(), json!(snapshot.error_rate()));
        fields.insert(
            "p95_response_time_ms".to_string(),
            json!(snapshot.p95_response_time_ms()),
        );
    }

    json_response(
        StatusCode::OK,
        &json!({
            "status": "healthy",
            "message": "Dermalens backend is running",
            "model_loaded": state.model.is_some(),
            "model_info": model_info,
            "image_size": state.config.image_size,
            "batch_size": state.config.batch_size,
            "model_path": state.config.model_path.display().to_string(),
            "requests": requests,
        }),
    )
}

fn handle_metrics() -> Response<Body> {
    json_response(
        StatusCode::OK,
        &json!({
            "accuracy": 86.8,
            "loss": 0.025,
            "status": "success",
        }),
    )
}

fn preflight_response(req: &Request<Body>, path: &str) -> Response<Body> {
    let allow_methods = route_method(path)
        .map(|m| format!("{}, OPTIONS", m))
        .unwrap_or_else(|| "OPTIONS".to_string());
    let allow_headers = req
        .headers()
        .get(ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("content-type"));

    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(ACCESS_CONTROL_ALLOW_METHODS, allow_methods)
        .header(ACCESS_CONTROL_ALLOW_HEADERS, allow_headers)
        .header(ACCESS_CONTROL_MAX_AGE, "600")
        .body(Body::empty())
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn method_not_allowed(path: &str) -> Response<Body> {
    let mut response = json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &json!({ "error": "Method not allowed" }),
    );
    if let Some(method) = route_method(path) {
        if let Ok(value) = HeaderValue::from_str(method.as_str()) {
            response.headers_mut().insert(ALLOW, value);
        }
    }
    response
}

/// Adds CORS headers when `origin` is allowed
fn apply_cors(response: &mut Response<Body>, origin: Option<&str>, config: &BackendConfig) {
    let Some(origin) = origin else {
        return;
    };
    if !config.is_allowed_origin(origin) {
        debug!(origin, "Origin not in CORS allow list");
        return;
    }

    let headers = response.headers_mut();
    if config.cors_origins.iter().any(|o| o == "*") {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    } else if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.append(VARY, HeaderValue::from_static("origin"));
    }
}

/// Builds the JSON error body for `err` and logs it
fn error_response(err: &DermalensError) -> Response<Body> {
    let status =
        StatusCode::from_u16(err.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let body = match err {
        DermalensError::NoFileProvided
        | DermalensError::NoFileSelected
        | DermalensError::TooSmall { .. }
        | DermalensError::TooLargeUpload { .. } => {
            warn!(error_kind = err.kind(), error = %err, "Rejected upload");
            ErrorBody {
                error: err.to_string(),
                message: None,
                expected_path: None,
                status: None,
            }
        }
        DermalensError::ModelNotLoaded { expected_path } => {
            warn!(expected_path = %expected_path, "Prediction requested but no model is loaded");
            ErrorBody {
                error: err.to_string(),
                message: Some(MODEL_NOT_LOADED_MESSAGE),
                expected_path: Some(expected_path.clone()),
                status: None,
            }
        }
        _ => {
            error!(error_kind = err.kind(), error = ?err, "Prediction error");
            ErrorBody {
                error: err.to_string(),
                message: Some(PREDICTION_FAILED_MESSAGE),
                expected_path: None,
                status: Some("error"),
            }
        }
    };

    json_response(status, &body)
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .unwrap_or_else(|_| Response::new(Body::empty())),
        Err(e) => {
            error!(error = %e, "Failed to serialize response body");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"error":"Internal server error"}"#))
                .unwrap_or_else(|_| Response::new(Body::empty()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_table() {
        assert_eq!(route_method("/predict"), Some(Method::POST));
        assert_eq!(route_method("/health"), Some(Method::GET));
        assert_eq!(route_method("/nope"), None);
    }

    #[test]
    fn test_wrapped_size_overrun_maps_to_413() {
        let wrapped = multer::Error::StreamReadFailed(Box::new(
            multer::Error::StreamSizeExceeded { limit: 1024 },
        ));
        let err = multipart_error(wrapped, 1024);
        assert!(matches!(err, DermalensError::TooLargeUpload { .. }));
        assert_eq!(err.to_http_status(), 413);

        let err = multipart_error(multer::Error::IncompleteStream, 1024);
        assert!(matches!(err, DermalensError::NoFileProvided));
    }

    #[tokio::test]
    async fn test_error_bodies() {
        let response = error_response(&DermalensError::NoFileSelected);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, json!({ "error": "No file selected" }));

        let response = error_response(&DermalensError::inference("shape mismatch", None));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Prediction failed: shape mismatch");
        assert_eq!(json["message"], PREDICTION_FAILED_MESSAGE);
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_spawn_on_ephemeral_port_and_shutdown() {
        let config = BackendConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            ..BackendConfig::default()
        };
        let server = PredictionServer::new(Arc::new(config), None, Arc::new(MetricsCollector::new()));
        let handle = server.spawn().unwrap();
        assert_ne!(handle.local_addr().port(), 0);
        handle.shutdown().await.unwrap();
    }
}
