//! Prediction formatting.
//!
//! Pairs a probability vector with the label set, ranks it and shapes the
//! JSON payload returned by `/predict`.

use dermalens_shared::error::{DermalensError, Result};
use serde::{Deserialize, Serialize};

/// Maximum probability below which a prediction is considered unreliable
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.1;

/// Number of entries in `top_predictions`
pub const TOP_N: usize = 3;

/// One label with its probability as a fraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProbability {
    /// Class name
    pub label: String,
    /// Probability in `[0, 1]`
    pub probability: f32,
}

/// Ranked predictions for one image; never empty
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    ranked: Vec<ClassProbability>,
}

/// One entry of the response's prediction lists, values in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    /// Class name
    #[serde(rename = "class")]
    pub class_name: String,
    /// Probability in percent
    pub probability: f64,
    /// Same value as `probability`, kept for client compatibility
    pub confidence: f64,
}

/// Body of a successful `/predict` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// Top-1 class name
    pub predicted_class: String,
    /// Alias of `predicted_class`
    pub prediction: String,
    /// Top-1 probability as a fraction
    pub confidence: f64,
    /// Alias of `confidence`
    pub max_probability: f64,
    /// Every class, ranked
    pub predictions: Vec<RankedEntry>,
    /// Alias of `predictions`
    pub all_predictions: Vec<RankedEntry>,
    /// The first three entries of `predictions`
    pub top_predictions: Vec<RankedEntry>,
    /// Always `"success"`
    pub status: String,
}

impl PredictionResult {
    /// Pairs `labels[i]` with `probabilities[i]` and ranks them
    ///
    /// The sort is stable: equal probabilities keep label order.
    ///
    /// # Errors
    ///
    /// [`DermalensError::Inference`] when the lengths differ or are zero.
    pub fn from_probabilities(labels: &[String], probabilities: &[f32]) -> Result<Self> {
        if labels.len() != probabilities.len() {
            return Err(DermalensError::inference(
                format!(
                    "model produced {} probabilities for {} labels",
                    probabilities.len(),
                    labels.len()
                ),
                None,
            ));
        }
        if labels.is_empty() {
            return Err(DermalensError::inference("no labels to rank", None));
        }

        let mut ranked: Vec<ClassProbability> = labels
            .iter()
            .zip(probabilities)
            .map(|(label, &probability)| ClassProbability {
                label: label.clone(),
                probability,
            })
            .collect();
        ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));

        Ok(Self { ranked })
    }

    /// All entries, highest probability first
    pub fn ranked(&self) -> &[ClassProbability] {
        &self.ranked
    }

    /// The most likely class
    pub fn top(&self) -> &ClassProbability {
        &self.ranked[0]
    }

    /// At most `n` leading entries
    pub fn top_n(&self, n: usize) -> &[ClassProbability] {
        &self.ranked[..n.min(self.ranked.len())]
    }

    /// Sum of all probabilities; ≈1.0 for renormalised output
    pub fn total_probability(&self) -> f32 {
        self.ranked.iter().map(|e| e.probability).sum()
    }

    /// Whether the top probability reaches `threshold`
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.top().probability >= threshold
    }

    /// Builds the `/predict` response body
    pub fn to_response(&self) -> PredictionResponse {
        let entries: Vec<RankedEntry> = self.ranked.iter().map(RankedEntry::from).collect();
        let top = self.top();
        let confidence = f64::from(top.probability);

        PredictionResponse {
            predicted_class: top.label.clone(),
            prediction: top.label.clone(),
            confidence,
            max_probability: confidence,
            top_predictions: entries[..TOP_N.min(entries.len())].to_vec(),
            all_predictions: entries.clone(),
            predictions: entries,
            status: "success".to_string(),
        }
    }
}

impl From<&ClassProbability> for RankedEntry {
    fn from(entry: &ClassProbability) -> Self {
        let percent = to_percent(entry.probability);
        Self {
            class_name: entry.label.clone(),
            probability: percent,
            confidence: percent,
        }
    }
}

fn to_percent(fraction: f32) -> f64 {
    f64::from(fraction) * 100.0
}
