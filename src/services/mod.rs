pub mod classifier;
pub mod data_cleaner;
pub mod feature_builder;
pub mod form_calculator;
pub mod history;
pub mod predictor;
pub mod sample_data;

pub use classifier::{SoftmaxClassifier, TrainingConfig};
pub use feature_builder::{FeatureBuilder, FeatureMatrix};
pub use form_calculator::compute_form;
pub use predictor::{MatchPrediction, PredictionEngine};
