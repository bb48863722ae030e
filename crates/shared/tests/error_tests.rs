//! Error Tests
//!
//! Tests for error construction, status mapping, and conversion.

use dermalens_shared::error::DermalensError;
use std::error::Error;

#[test]
fn test_error_construction() {
    let err = DermalensError::model_not_loaded("models/model.onnx");
    assert!(matches!(err, DermalensError::ModelNotLoaded { .. }));

    let err = DermalensError::decode("bad bytes", None);
    assert!(matches!(err, DermalensError::Decode { .. }));

    let err = DermalensError::inference("shape mismatch", None);
    assert!(matches!(err, DermalensError::Inference { .. }));

    let err = DermalensError::model_load("m.onnx", "not an onnx file", None);
    assert!(matches!(err, DermalensError::ModelLoad { .. }));

    let err = DermalensError::too_large_upload(1024);
    assert!(matches!(err, DermalensError::TooLargeUpload { limit_bytes: 1024 }));
}

#[test]
fn test_http_status_mapping() {
    assert_eq!(DermalensError::NoFileProvided.to_http_status(), 400);
    assert_eq!(DermalensError::NoFileSelected.to_http_status(), 400);
    assert_eq!(
        DermalensError::TooSmall {
            width: 10,
            height: 10,
            min_side: 32
        }
        .to_http_status(),
        400
    );
    assert_eq!(
        DermalensError::too_large_upload(16 * 1024 * 1024).to_http_status(),
        413
    );
    assert_eq!(
        DermalensError::model_not_loaded("m.onnx").to_http_status(),
        500
    );
    assert_eq!(DermalensError::decode("x", None).to_http_status(), 500);
    assert_eq!(DermalensError::inference("x", None).to_http_status(), 500);
    assert_eq!(DermalensError::internal("x", None).to_http_status(), 500);
    assert_eq!(
        DermalensError::configuration("x", None).to_http_status(),
        500
    );
}

#[test]
fn test_client_facing_messages() {
    assert_eq!(
        DermalensError::NoFileProvided.to_string(),
        "No image file provided"
    );
    assert_eq!(DermalensError::NoFileSelected.to_string(), "No file selected");
    assert_eq!(
        DermalensError::model_not_loaded("m.onnx").to_string(),
        "Model not loaded"
    );
    assert_eq!(
        DermalensError::too_large_upload(16 * 1024 * 1024).to_string(),
        "File too large. Maximum size is 16MB."
    );
}

#[test]
fn test_error_kinds_are_distinct() {
    let kinds = [
        DermalensError::NoFileProvided.kind(),
        DermalensError::NoFileSelected.kind(),
        DermalensError::model_not_loaded("m").kind(),
        DermalensError::decode("x", None).kind(),
        DermalensError::inference("x", None).kind(),
        DermalensError::model_load("m", "x", None).kind(),
        DermalensError::too_large_upload(1).kind(),
        DermalensError::configuration("x", None).kind(),
        DermalensError::internal("x", None).kind(),
    ];
    let mut unique = kinds.to_vec();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), kinds.len());
}

#[test]
fn test_error_conversions() {
    let addr_err = "not-an-address".parse::<std::net::SocketAddr>().unwrap_err();
    let err: DermalensError = addr_err.into();
    assert!(matches!(err, DermalensError::Configuration { .. }));
    assert!(err.source().is_some());

    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: DermalensError = io_err.into();
    assert!(matches!(err, DermalensError::Configuration { .. }));

    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: DermalensError = io_err.into();
    assert!(matches!(err, DermalensError::Internal { .. }));
}

#[test]
fn test_source_chain_preserved() {
    let io_err = std::io::Error::new(std::io::ErrorKind::InvalidData, "truncated");
    let err = DermalensError::decode("truncated file", Some(Box::new(io_err)));
    let source = err.source().expect("source should be attached");
    assert_eq!(source.to_string(), "truncated");
}
