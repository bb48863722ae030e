//! Pipeline Tests
//!
//! Image bytes through preprocessing, a deterministic backend and the
//! formatter, checking the invariants clients rely on.

use dermalens_inference::testing::FixedOutputBackend;
use dermalens_inference::{
    disease_labels, preprocess_image, Model, PredictionResult, DEFAULT_IMAGE_SIZE,
};
use dermalens_shared::error::DermalensError;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 128])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

fn softmax_head() -> Vec<f32> {
    vec![0.02, 0.05, 0.01, 0.03, 0.61, 0.04, 0.20, 0.03, 0.01]
}

#[test]
fn test_end_to_end_prediction() {
    let labels = disease_labels();
    let model = Model::from_backend(
        FixedOutputBackend::new(DEFAULT_IMAGE_SIZE, softmax_head()),
        "models/stub.onnx",
    );

    let tensor = preprocess_image(&jpeg_bytes(300, 200), DEFAULT_IMAGE_SIZE).unwrap();
    let probabilities = model.predict(&tensor).unwrap();
    let result = PredictionResult::from_probabilities(&labels, &probabilities).unwrap();

    assert_eq!(result.top().label, "Melanoma");
    assert!((result.total_probability() - 1.0).abs() < 1e-4);

    let response = result.to_response();
    assert_eq!(response.top_predictions.len(), 3);
    assert_eq!(response.top_predictions[1].class_name, "Nevus");
    for pair in response.predictions.windows(2) {
        assert!(pair[0].probability >= pair[1].probability);
    }
}

#[test]
fn test_logit_head_is_softmaxed() {
    let labels = disease_labels();
    let logits = vec![-1.0, 0.5, 3.0, -2.0, 0.0, 1.0, -0.5, 0.2, 0.1];
    let model = Model::from_backend(
        FixedOutputBackend::new(DEFAULT_IMAGE_SIZE, logits),
        "models/stub.onnx",
    );

    let tensor = preprocess_image(&jpeg_bytes(64, 64), DEFAULT_IMAGE_SIZE).unwrap();
    let probabilities = model.predict(&tensor).unwrap();
    assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));

    let result = PredictionResult::from_probabilities(&labels, &probabilities).unwrap();
    assert_eq!(result.top().label, "Dermatofibroma");
    assert!((result.total_probability() - 1.0).abs() < 1e-4);
}

#[test]
fn test_wrong_output_length_fails_cleanly() {
    let model = Model::from_backend(
        FixedOutputBackend::new(DEFAULT_IMAGE_SIZE, vec![0.5, 0.5]),
        "models/stub.onnx",
    );
    let tensor = preprocess_image(&jpeg_bytes(32, 32), DEFAULT_IMAGE_SIZE).unwrap();
    let probabilities = model.predict(&tensor).unwrap();

    let err = PredictionResult::from_probabilities(&disease_labels(), &probabilities).unwrap_err();
    assert!(matches!(err, DermalensError::Inference { .. }));
}

#[test]
fn test_model_is_shareable_across_threads() {
    let backend = FixedOutputBackend::new(DEFAULT_IMAGE_SIZE, softmax_head());
    let calls = backend.call_counter();
    let model = Arc::new(Model::from_backend(backend, "models/stub.onnx"));
    let tensor = Arc::new(preprocess_image(&jpeg_bytes(50, 50), DEFAULT_IMAGE_SIZE).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let model = Arc::clone(&model);
            let tensor = Arc::clone(&tensor);
            std::thread::spawn(move || model.predict(&tensor).unwrap())
        })
        .collect();

    let outputs: Vec<Vec<f32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(outputs.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(calls.load(Ordering::Relaxed), 4);
}

#[test]
fn test_missing_model_file() {
    let err = Model::load("models/definitely-missing.onnx", DEFAULT_IMAGE_SIZE, 9).unwrap_err();
    assert!(matches!(err, DermalensError::ModelLoad { .. }));
}
