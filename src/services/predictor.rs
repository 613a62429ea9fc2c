use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{FeatureRow, Match, OutcomeProbabilities, Prediction};
use crate::services::classifier::{OutcomeClassifier, SoftmaxClassifier};
use crate::services::feature_builder::FeatureBuilder;
use crate::utils::normalize_probabilities;

#[derive(Debug, Clone, Serialize)]
pub struct MatchPrediction {
    pub prediction: Prediction,
    pub probabilities: OutcomeProbabilities,
    pub features: FeatureRow,
}

/// Scores single fixtures with a trained model, building the feature row with
/// the same window the model was trained on.
pub struct PredictionEngine {
    builder: FeatureBuilder,
    model: SoftmaxClassifier,
}

impl PredictionEngine {
    /// Fails if the configured window differs from the model's training window.
    pub fn new(model: SoftmaxClassifier, window: usize) -> Result<Self> {
        model.ensure_window(window)?;
        Ok(Self {
            builder: FeatureBuilder::new(window),
            model,
        })
    }

    pub fn model(&self) -> &SoftmaxClassifier {
        &self.model
    }

    pub fn predict_match(
        &self,
        home_team: &str,
        away_team: &str,
        match_date: NaiveDateTime,
        history: &[Match],
    ) -> Result<MatchPrediction> {
        let features = self
            .builder
            .prepare_single_match_features(home_team, away_team, match_date, history)?;

        let probabilities = OutcomeProbabilities::from_array(normalize_probabilities(self.model.predict_proba(&features)));
        let outcome = probabilities.most_likely();

        tracing::info!(
            "Predicted {} vs {} on {}: Home {:.2}%, Draw {:.2}%, Away {:.2}%",
            home_team,
            away_team,
            match_date.format("%Y-%m-%d"),
            probabilities.home_win * 100.0,
            probabilities.draw * 100.0,
            probabilities.away_win * 100.0
        );

        Ok(MatchPrediction {
            prediction: Prediction {
                id: Uuid::new_v4().to_string(),
                home_team: home_team.to_string(),
                away_team: away_team.to_string(),
                match_date,
                away_win_probability: probabilities.away_win,
                draw_probability: probabilities.draw,
                home_win_probability: probabilities.home_win,
                predicted_outcome: outcome.display_name().to_string(),
                model_version: self.model.model_version.clone(),
                created_at: Utc::now(),
            },
            probabilities,
            features,
        })
    }
}
