use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use linfa::traits::{Fit, Transformer};
use linfa::Dataset;
use linfa_logistic::{MultiFittedLogisticRegression, MultiLogisticRegression};
use linfa_preprocessing::linear_scaling::LinearScaler;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::{FeatureRow, MatchResult, OutcomeProbabilities, FEATURE_COUNT, FEATURE_NAMES};
use crate::services::feature_builder::FeatureMatrix;

const CLASSES: usize = 3;
pub const MODEL_VERSION: &str = "multi_logistic_v1";

/// Anything that turns a feature row into {Away Win, Draw, Home Win}
/// probabilities.
pub trait OutcomeClassifier {
    fn predict_proba(&self, row: &FeatureRow) -> [f64; 3];

    fn predict(&self, row: &FeatureRow) -> MatchResult {
        OutcomeProbabilities::from_array(self.predict_proba(row)).most_likely()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub max_iterations: u64,
    /// L2 regularization strength.
    pub l2_penalty: f64,
    pub train_fraction: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            l2_penalty: 0.1,
            train_fraction: 0.8,
        }
    }
}

fn invalid_model(path: &Path, problem: &str) -> PipelineError {
    PipelineError::Config(format!("model at {} is unusable: {}", path.display(), problem))
}

/// Always predicts the class frequencies seen in training.
#[derive(Debug, Clone)]
pub struct ClassPriorClassifier {
    priors: [f64; CLASSES],
}

impl ClassPriorClassifier {
    pub fn fit(labels: &[u8]) -> Result<Self> {
        if labels.is_empty() {
            return Err(PipelineError::NotEnoughSamples(0));
        }
        let mut counts = [0.0; CLASSES];
        for &label in labels {
            counts[MatchResult::from_label(label)?.label() as usize] += 1.0;
        }
        let n = labels.len() as f64;
        Ok(Self { priors: counts.map(|c| c / n) })
    }
}

impl OutcomeClassifier for ClassPriorClassifier {
    fn predict_proba(&self, _row: &FeatureRow) -> [f64; 3] {
        self.priors
    }
}

/// Multinomial logistic regression (linfa) over standard-scaled features,
/// wrapped with the window and feature layout it was trained on.
#[derive(Debug, Serialize, Deserialize)]
pub struct SoftmaxClassifier {
    pub model_version: String,
    pub window: usize,
    pub feature_names: Vec<String>,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    scaler: LinearScaler<f64>,
    model: MultiFittedLogisticRegression<f64, usize>,
}

impl SoftmaxClassifier {
    pub fn fit(matrix: &FeatureMatrix, window: usize, config: &TrainingConfig) -> Result<Self> {
        let n = matrix.len();
        if n < 2 {
            return Err(PipelineError::NotEnoughSamples(n));
        }
        // Probability columns are only laid out {Away, Draw, Home} when every
        // class was seen in training.
        for class in MatchResult::BY_LABEL {
            if !matrix.labels().contains(&class.label()) {
                return Err(PipelineError::MissingClass(class.display_name()));
            }
        }

        let rows: Vec<[f64; FEATURE_COUNT]> = matrix.rows().iter().map(FeatureRow::values).collect();
        let records = Array2::from_shape_fn((n, FEATURE_COUNT), |(i, j)| rows[i][j]);
        let targets: Array1<usize> = matrix.labels().iter().map(|&l| l as usize).collect();
        let dataset = Dataset::new(records, targets);

        let scaler = LinearScaler::standard()
            .fit(&dataset)
            .map_err(|e| PipelineError::Training(e.to_string()))?;
        let dataset = scaler.transform(dataset);

        let model = MultiLogisticRegression::default()
            .alpha(config.l2_penalty)
            .max_iterations(config.max_iterations)
            .fit(&dataset)
            .map_err(|e| PipelineError::Training(e.to_string()))?;

        tracing::debug!("Fitted multinomial logistic regression on {} samples", n);

        Ok(Self {
            model_version: MODEL_VERSION.to_string(),
            window,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            trained_at: Utc::now(),
            training_samples: n,
            scaler,
            model,
        })
    }

    /// Refuse to score rows built with a different rolling window than the
    /// one the model was trained on.
    pub fn ensure_window(&self, window: usize) -> Result<()> {
        if self.window != window {
            return Err(PipelineError::WindowMismatch {
                trained: self.window,
                current: window,
            });
        }
        Ok(())
    }

    /// Mean absolute standard-scaled coefficient per feature over the three
    /// classes, normalized to sum to 1, most important first.
    pub fn feature_importances(&self) -> Vec<(String, f64)> {
        let params = self.model.params();
        let raw: Vec<f64> = params
            .rows()
            .into_iter()
            .map(|coefficients| coefficients.iter().map(|c| c.abs()).sum::<f64>() / CLASSES as f64)
            .collect();
        let total: f64 = raw.iter().sum();

        let mut importances: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(raw.into_iter().map(|v| if total > 0.0 { v / total } else { 0.0 }))
            .collect();
        importances.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        importances
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::info!("Model saved to {}", path.display());
        Ok(())
    }

    /// Load a saved model, rejecting any file whose feature layout or
    /// parameter shapes do not match what `predict_proba` indexes.
    pub fn load(path: &Path) -> Result<Self> {
        let model: Self = serde_json::from_str(&fs::read_to_string(path)?)?;

        if model.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
            return Err(invalid_model(path, "trained on a different feature layout"));
        }
        if model.scaler.offsets().len() != FEATURE_COUNT || model.scaler.scales().len() != FEATURE_COUNT {
            return Err(invalid_model(path, "scaler does not cover every feature"));
        }
        if model.model.params().dim() != (FEATURE_COUNT, CLASSES) {
            return Err(invalid_model(path, "coefficient matrix has the wrong shape"));
        }
        if model.model.intercept().len() != CLASSES {
            return Err(invalid_model(path, "intercept has the wrong length"));
        }
        if model.scaler.scales().iter().chain(model.model.params().iter()).any(|v| !v.is_finite()) {
            return Err(invalid_model(path, "non-finite parameters"));
        }
        Ok(model)
    }
}

impl OutcomeClassifier for SoftmaxClassifier {
    fn predict_proba(&self, row: &FeatureRow) -> [f64; 3] {
        let values = row.values();
        let records = Array2::from_shape_fn((1, FEATURE_COUNT), |(_, j)| values[j]);
        let probabilities = self.model.predict_probabilities(&self.scaler.transform(records));
        [probabilities[(0, 0)], probabilities[(0, 1)], probabilities[(0, 2)]]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub samples: usize,
    pub accuracy: f64,
    pub balanced_accuracy: f64,
    /// `confusion[true_label][predicted_label]`
    pub confusion: [[usize; CLASSES]; CLASSES],
}

impl Evaluation {
    pub fn report(&self) -> String {
        let mut out = format!("{:>10} {:>9} {:>9} {:>9} {:>9}\n", "", "precision", "recall", "f1-score", "support");
        for (k, class) in MatchResult::BY_LABEL.iter().enumerate() {
            let support: usize = self.confusion[k].iter().sum();
            let predicted: usize = (0..CLASSES).map(|t| self.confusion[t][k]).sum();
            let hits = self.confusion[k][k] as f64;
            let precision = if predicted > 0 { hits / predicted as f64 } else { 0.0 };
            let recall = if support > 0 { hits / support as f64 } else { 0.0 };
            let f1 = if precision + recall > 0.0 { 2.0 * precision * recall / (precision + recall) } else { 0.0 };
            out.push_str(&format!(
                "{:>10} {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
                class.display_name(),
                precision,
                recall,
                f1,
                support
            ));
        }
        out
    }
}

pub fn evaluate(model: &impl OutcomeClassifier, matrix: &FeatureMatrix) -> Evaluation {
    let mut confusion = [[0usize; CLASSES]; CLASSES];
    for (row, &label) in matrix.rows().iter().zip(matrix.labels()) {
        let predicted = model.predict(row).label() as usize;
        confusion[label as usize][predicted] += 1;
    }

    let samples = matrix.len();
    let correct: usize = (0..CLASSES).map(|k| confusion[k][k]).sum();
    let accuracy = if samples > 0 { correct as f64 / samples as f64 } else { 0.0 };

    let recalls: Vec<f64> = (0..CLASSES)
        .filter_map(|k| {
            let support: usize = confusion[k].iter().sum();
            (support > 0).then(|| confusion[k][k] as f64 / support as f64)
        })
        .collect();
    let balanced_accuracy = if recalls.is_empty() { 0.0 } else { recalls.iter().sum::<f64>() / recalls.len() as f64 };

    Evaluation {
        samples,
        accuracy,
        balanced_accuracy,
        confusion,
    }
}

/// Chronological train/validation split, fit, and validation metrics.
pub fn train_and_evaluate(
    matrix: &FeatureMatrix,
    window: usize,
    config: &TrainingConfig,
) -> Result<(SoftmaxClassifier, Evaluation)> {
    let (train, validation) = matrix.split(config.train_fraction);
    tracing::info!(
        "Train set: {} samples, Validation set: {} samples",
        train.len(),
        validation.len()
    );

    let model = SoftmaxClassifier::fit(&train, window, config)?;
    let evaluation = evaluate(&model, &validation);

    tracing::info!("Validation Accuracy: {:.4}", evaluation.accuracy);
    tracing::info!("Validation Balanced Accuracy: {:.4}", evaluation.balanced_accuracy);

    if let Ok(baseline) = ClassPriorClassifier::fit(train.labels()) {
        tracing::info!(
            "Class-prior baseline accuracy: {:.4}",
            evaluate(&baseline, &validation).accuracy
        );
    }

    Ok((model, evaluation))
}

pub fn write_feature_importances(path: &Path, importances: &[(String, f64)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["feature", "importance"])?;
    for (feature, importance) in importances {
        writer.write_record([feature.clone(), format!("{:.6}", importance)])?;
    }
    writer.flush()?;
    tracing::info!("Feature importances saved to {}", path.display());
    Ok(())
}
