//! Configuration Tests
//!
//! Tests for backend configuration loading and validation. Tests touching
//! process environment run serially.

use dermalens_backend::{BackendConfig, Environment};
use serial_test::serial;
use std::path::PathBuf;

const ENV_VARS: [&str; 8] = [
    "DERMALENS_LISTEN_ADDR",
    "DERMALENS_MODEL_PATH",
    "DERMALENS_UPLOAD_FOLDER",
    "DERMALENS_CORS_ORIGINS",
    "DERMALENS_ENV",
    "DERMALENS_DEBUG",
    "DERMALENS_API_RATE_LIMIT",
    "DERMALENS_LOG_LEVEL",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_configuration_from_env_defaults() {
    clear_env();
    let config = BackendConfig::from_env().unwrap();
    assert_eq!(config.listen_addr.port(), 5001);
    assert_eq!(config.environment, Environment::Development);
    assert!(config.debug);
    assert_eq!(config.image_size, (128, 128));
    assert_eq!(config.labels.len(), 9);
}

#[test]
#[serial]
fn test_configuration_from_env_overrides() {
    clear_env();
    std::env::set_var("DERMALENS_LISTEN_ADDR", "127.0.0.1:7000");
    std::env::set_var("DERMALENS_MODEL_PATH", "/srv/models/classifier.onnx");
    std::env::set_var("DERMALENS_CORS_ORIGINS", "https://derma.example,http://localhost:3000");
    std::env::set_var("DERMALENS_ENV", "production");
    std::env::set_var("DERMALENS_API_RATE_LIMIT", "20 per minute");

    let config = BackendConfig::from_env().unwrap();
    clear_env();

    assert_eq!(config.listen_addr.to_string(), "127.0.0.1:7000");
    assert_eq!(
        config.model_path,
        PathBuf::from("/srv/models/classifier.onnx")
    );
    assert_eq!(
        config.cors_origins,
        vec!["https://derma.example", "http://localhost:3000"]
    );
    assert_eq!(config.environment, Environment::Production);
    assert!(!config.debug);
    assert_eq!(config.api_rate_limit, "20 per minute");
}

#[test]
#[serial]
fn test_debug_flag_overrides_profile() {
    clear_env();
    std::env::set_var("DERMALENS_ENV", "production");
    std::env::set_var("DERMALENS_DEBUG", "true");
    let config = BackendConfig::from_env().unwrap();
    clear_env();
    assert!(config.debug);
}

#[test]
#[serial]
fn test_invalid_env_values_are_rejected() {
    clear_env();
    std::env::set_var("DERMALENS_LISTEN_ADDR", "not-an-address");
    assert!(BackendConfig::from_env().is_err());
    clear_env();

    std::env::set_var("DERMALENS_DEBUG", "perhaps");
    assert!(BackendConfig::from_env().is_err());
    clear_env();

    std::env::set_var("DERMALENS_ENV", "staging");
    assert!(BackendConfig::from_env().is_err());
    clear_env();

    std::env::set_var("DERMALENS_API_RATE_LIMIT", "lots");
    assert!(BackendConfig::from_env().is_err());
    clear_env();

    std::env::set_var("DERMALENS_CORS_ORIGINS", "localhost:3000");
    assert!(BackendConfig::from_env().is_err());
    clear_env();
}

#[test]
fn test_validation_rules() {
    let zero_size = BackendConfig {
        image_size: (0, 128),
        ..BackendConfig::default()
    };
    assert!(BackendConfig::new(zero_size).is_err());

    let duplicate_labels = BackendConfig {
        labels: vec!["Nevus".to_string(), "Nevus".to_string()],
        ..BackendConfig::default()
    };
    assert!(BackendConfig::new(duplicate_labels).is_err());

    let dotted_extension = BackendConfig {
        allowed_extensions: vec![".png".to_string()],
        ..BackendConfig::default()
    };
    assert!(BackendConfig::new(dotted_extension).is_err());

    let wildcard = BackendConfig {
        cors_origins: vec!["*".to_string()],
        ..BackendConfig::default()
    };
    let wildcard = BackendConfig::new(wildcard).unwrap();
    assert!(wildcard.is_allowed_origin("https://anywhere.example"));
}

#[test]
fn test_filename_extensions() {
    let config = BackendConfig::new(BackendConfig {
        allowed_extensions: vec![" PNG ".to_string(), "jpg".to_string()],
        ..BackendConfig::default()
    })
    .unwrap();

    assert!(config.is_allowed_filename("lesion.png"));
    assert!(config.is_allowed_filename("LESION.JPG"));
    assert!(!config.is_allowed_filename("lesion.bmp"));
    assert!(!config.is_allowed_filename("lesion"));
}

#[test]
fn test_prepare_upload_folder_creates_nested_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let upload_folder = dir.path().join("data").join("uploads");
    let config = BackendConfig {
        upload_folder: upload_folder.clone(),
        ..BackendConfig::default()
    };

    config.prepare_upload_folder().unwrap();
    assert!(upload_folder.is_dir());

    // Idempotent
    config.prepare_upload_folder().unwrap();
}
