//! The fixed label set of the skin-lesion classifier.
//!
//! Index `i` of the model output is the probability of `DISEASE_CLASSES[i]`;
//! the order is part of the model's contract and must never be changed.

/// Class names in model output order
pub const DISEASE_CLASSES: [&str; 9] = [
    "Squamous Cell Carcinoma",
    "Basal Cell Carcinoma",
    "Dermatofibroma",
    "Vascular Lesion",
    "Melanoma",
    "Pigmented Benign Keratosis",
    "Nevus",
    "Seborrheic Keratosis",
    "Actinic Keratosis",
];

/// Owned copy of [`DISEASE_CLASSES`]
pub fn disease_labels() -> Vec<String> {
    DISEASE_CLASSES.iter().map(|s| (*s).to_string()).collect()
}
