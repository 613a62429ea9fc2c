use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::{FeatureRow, Match, MatchResult, FEATURE_COUNT};
use crate::services::form_calculator::{compute_form, TeamIndex};
use crate::services::history::{sorted_by_date, validate_fixture, validate_history};

/// Feature rows and their target labels, index-aligned and in chronological
/// order of the matches they were built from. Every label is 0, 1 or 2.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    rows: Vec<FeatureRow>,
    labels: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TargetRecord {
    result: u8,
}

impl FeatureMatrix {
    pub fn new(rows: Vec<FeatureRow>, labels: Vec<u8>) -> Result<Self> {
        if rows.len() != labels.len() {
            return Err(PipelineError::Misaligned {
                rows: rows.len(),
                labels: labels.len(),
            });
        }
        for &label in &labels {
            MatchResult::from_label(label)?;
        }
        Ok(Self { rows, labels })
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Chronological split: the first `fraction` of samples and the rest.
    pub fn split(&self, fraction: f64) -> (FeatureMatrix, FeatureMatrix) {
        let at = ((self.len() as f64) * fraction.clamp(0.0, 1.0)) as usize;
        (
            FeatureMatrix {
                rows: self.rows[..at].to_vec(),
                labels: self.labels[..at].to_vec(),
            },
            FeatureMatrix {
                rows: self.rows[at..].to_vec(),
                labels: self.labels[at..].to_vec(),
            },
        )
    }

    /// Write features and targets as two CSV files, creating parent
    /// directories as needed.
    pub fn save(&self, features_path: &Path, target_path: &Path) -> Result<()> {
        for path in [features_path, target_path] {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }

        let mut features = csv::Writer::from_path(features_path)?;
        if self.rows.is_empty() {
            features.write_record(crate::models::FEATURE_NAMES)?;
        }
        for row in &self.rows {
            features.serialize(row)?;
        }
        features.flush()?;

        let mut targets = csv::Writer::from_path(target_path)?;
        if self.labels.is_empty() {
            targets.write_record(["result"])?;
        }
        for label in &self.labels {
            targets.serialize(TargetRecord { result: *label })?;
        }
        targets.flush()?;

        tracing::info!("Saved features to {}", features_path.display());
        tracing::info!("Saved targets to {}", target_path.display());
        Ok(())
    }

    pub fn load(features_path: &Path, target_path: &Path) -> Result<Self> {
        let mut features = csv::Reader::from_path(features_path)?;
        let headers = features.headers()?.clone();
        for name in crate::models::FEATURE_NAMES {
            if !headers.iter().any(|h| h == name) {
                return Err(PipelineError::MissingColumn {
                    column: name.to_string(),
                    source_name: features_path.display().to_string(),
                });
            }
        }
        let rows = features.deserialize().collect::<std::result::Result<Vec<FeatureRow>, _>>()?;

        let mut targets = csv::Reader::from_path(target_path)?;
        let labels = targets
            .deserialize()
            .map(|record| record.map(|r: TargetRecord| r.result))
            .collect::<std::result::Result<Vec<u8>, _>>()?;

        Self::new(rows, labels)
    }
}

/// Turns match histories into model inputs. Holds the rolling window so the
/// training and inference paths cannot disagree on it.
#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilder {
    window: usize,
}

impl FeatureBuilder {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// One row per match with a known result, built only from matches dated
    /// strictly before it. `history` need not be sorted.
    pub fn build_feature_matrix(&self, history: &[Match]) -> Result<FeatureMatrix> {
        validate_history(history)?;

        let sorted = sorted_by_date(history);
        let index = TeamIndex::new(&sorted);

        let mut rows = Vec::with_capacity(sorted.len());
        let mut labels = Vec::with_capacity(sorted.len());
        let mut skipped = 0usize;

        for m in &sorted {
            let Some(result) = m.result else {
                skipped += 1;
                continue;
            };

            let home_form = index.form(&m.home_team, m.match_date, self.window);
            let away_form = index.form(&m.away_team, m.match_date, self.window);

            rows.push(FeatureRow::from_forms(&home_form, &away_form));
            labels.push(result.label());
        }

        if skipped > 0 {
            tracing::debug!("Skipped {} fixtures without a result", skipped);
        }
        tracing::info!(
            "Built feature matrix: {} samples, {} features ({} teams, window {})",
            rows.len(),
            FEATURE_COUNT,
            index.team_count(),
            self.window
        );

        FeatureMatrix::new(rows, labels)
    }

    /// The feature row for a single, possibly future, fixture. Shaped and
    /// computed exactly like the rows of `build_feature_matrix`.
    pub fn prepare_single_match_features(
        &self,
        home_team: &str,
        away_team: &str,
        match_date: NaiveDateTime,
        history: &[Match],
    ) -> Result<FeatureRow> {
        validate_fixture(home_team, away_team)?;
        validate_history(history)?;

        let home_form = compute_form(history, home_team, match_date, self.window);
        let away_form = compute_form(history, away_team, match_date, self.window);

        Ok(FeatureRow::from_forms(&home_form, &away_form))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::form_calculator::tests::{alternating_fixtures, day, played};
    use chrono::Duration;

    fn mixed_league() -> Vec<Match> {
        let teams = ["Arsenal", "Chelsea", "Everton", "Fulham"];
        let scores = [(2, 0), (1, 1), (0, 3), (4, 2), (0, 0), (1, 2)];
        let mut matches = Vec::new();
        let mut n = 0;
        for round in 0..6 {
            for (h, home) in teams.iter().enumerate() {
                let away = teams[(h + round % 3 + 1) % teams.len()];
                if *home == away {
                    continue;
                }
                let (hg, ag) = scores[n % scores.len()];
                let date = day(2021, 8, 14) + Duration::days(7 * round as i64 + (h as i64 % 2));
                matches.push(played(date, home, away, hg, ag));
                n += 1;
            }
        }
        matches
    }

    #[test]
    fn test_rows_and_labels_are_aligned() {
        let mut history = mixed_league();
        history[3].result = None;
        history[3].home_goals = None;
        history[3].away_goals = None;
        history[10].result = None;
        let expected = history.iter().filter(|m| m.result.is_some()).count();

        let matrix = FeatureBuilder::new(5).build_feature_matrix(&history).unwrap();
        assert_eq!(matrix.rows.len(), expected);
        assert_eq!(matrix.labels.len(), expected);
    }

    #[test]
    fn test_labels_follow_result_mapping() {
        let history = vec![
            played(day(2020, 1, 1), "Team A", "Team B", 1, 0),
            played(day(2020, 1, 2), "Team A", "Team B", 1, 1),
            played(day(2020, 1, 3), "Team A", "Team B", 0, 1),
        ];
        let matrix = FeatureBuilder::new(5).build_feature_matrix(&history).unwrap();
        assert_eq!(matrix.labels, vec![2, 1, 0]);
    }

    #[test]
    fn test_unsorted_history_is_processed_chronologically() {
        let history = alternating_fixtures();
        let mut reversed = history.clone();
        reversed.reverse();

        let builder = FeatureBuilder::new(5);
        assert_eq!(
            builder.build_feature_matrix(&history).unwrap(),
            builder.build_feature_matrix(&reversed).unwrap()
        );
    }

    #[test]
    fn test_first_match_has_zero_features() {
        let matrix = FeatureBuilder::new(5).build_feature_matrix(&alternating_fixtures()).unwrap();
        assert_eq!(matrix.rows[0], FeatureRow::default());
        assert_ne!(matrix.rows[1], FeatureRow::default());
    }

    #[test]
    fn test_build_is_idempotent() {
        let history = mixed_league();
        let builder = FeatureBuilder::new(5);
        let first = builder.build_feature_matrix(&history).unwrap();
        let second = builder.build_feature_matrix(&history).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_single_match_rows_equal_batch_rows() {
        let history = mixed_league();
        let builder = FeatureBuilder::new(5);
        let matrix = builder.build_feature_matrix(&history).unwrap();
        let sorted = sorted_by_date(&history);

        for (i, m) in sorted.iter().enumerate() {
            let mut without: Vec<Match> = sorted.clone();
            without.remove(i);

            let single = builder
                .prepare_single_match_features(&m.home_team, &m.away_team, m.match_date, &without)
                .unwrap();
            for (a, b) in single.values().iter().zip(matrix.rows[i].values().iter()) {
                assert!((a - b).abs() < 1e-9, "row {i} differs: {a} vs {b}");
            }
        }
    }

    #[test]
    fn test_single_match_for_future_fixture() {
        let history = alternating_fixtures();
        let row = FeatureBuilder::new(5)
            .prepare_single_match_features("Team A", "Team B", day(2021, 1, 1), &history)
            .unwrap();

        assert_eq!(row.values().len(), FEATURE_COUNT);
        // Last five of Team A: B-home loss, A-home win, loss, win, loss.
        assert!((row.home_points_avg - 1.2).abs() < 1e-9);
        assert!((row.home_home_points_avg - 3.0).abs() < 1e-9);
        assert!((row.away_away_points_avg - 0.0).abs() < 1e-9);
        assert!((row.points_diff - (row.home_points_avg - row.away_points_avg)).abs() < 1e-12);
    }

    #[test]
    fn test_batch_and_single_reject_bad_teams_alike() {
        let builder = FeatureBuilder::new(5);
        let mut history = alternating_fixtures();

        let single = builder.prepare_single_match_features("", "Team B", day(2021, 1, 1), &history);
        assert!(matches!(single, Err(PipelineError::InvalidTeam(_))));

        history[2].home_team = String::new();
        let batch = builder.build_feature_matrix(&history);
        assert!(matches!(batch, Err(PipelineError::InvalidTeam(_))));
        let single = builder.prepare_single_match_features("Team A", "Team B", day(2021, 1, 1), &history);
        assert!(matches!(single, Err(PipelineError::InvalidTeam(_))));
    }

    #[test]
    fn test_inconsistent_history_is_rejected() {
        let mut history = alternating_fixtures();
        history[4].result = Some(MatchResult::Draw);
        assert!(matches!(
            FeatureBuilder::new(5).build_feature_matrix(&history),
            Err(PipelineError::InconsistentResult { .. })
        ));
    }

    #[test]
    fn test_misaligned_matrix_is_rejected() {
        let err = FeatureMatrix::new(vec![FeatureRow::default()], vec![]).unwrap_err();
        assert!(matches!(err, PipelineError::Misaligned { rows: 1, labels: 0 }));
    }

    #[test]
    fn test_labels_outside_mapping_are_rejected() {
        let err = FeatureMatrix::new(vec![FeatureRow::default(); 2], vec![2, 7]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidLabel(7)));
    }

    #[test]
    fn test_load_rejects_unknown_target_label() {
        let dir = std::env::temp_dir().join(format!("epl-labels-{}", uuid::Uuid::new_v4()));
        let features = dir.join("X_features.csv");
        let targets = dir.join("y_target.csv");

        let matrix = FeatureBuilder::new(5).build_feature_matrix(&alternating_fixtures()).unwrap();
        matrix.save(&features, &targets).unwrap();

        let mut contents = fs::read_to_string(&targets).unwrap();
        let last = contents.trim_end().rfind('\n').unwrap();
        contents.truncate(last + 1);
        contents.push_str("7\n");
        fs::write(&targets, contents).unwrap();

        assert!(matches!(
            FeatureMatrix::load(&features, &targets),
            Err(PipelineError::InvalidLabel(7))
        ));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_chronological_split() {
        let matrix = FeatureBuilder::new(5).build_feature_matrix(&alternating_fixtures()).unwrap();
        let (train, validation) = matrix.split(0.8);
        assert_eq!(train.len(), 8);
        assert_eq!(validation.len(), 2);
        assert_eq!(validation.rows[0], matrix.rows[8]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("epl-features-{}", uuid::Uuid::new_v4()));
        let features = dir.join("processed").join("X_features.csv");
        let targets = dir.join("processed").join("y_target.csv");

        let matrix = FeatureBuilder::new(5).build_feature_matrix(&mixed_league()).unwrap();
        matrix.save(&features, &targets).unwrap();

        let header = fs::read_to_string(&features).unwrap();
        assert!(header.starts_with("home_goals_scored_avg,home_goals_conceded_avg,home_points_avg"));

        let loaded = FeatureMatrix::load(&features, &targets).unwrap();
        assert_eq!(loaded.labels, matrix.labels);
        for (a, b) in loaded.rows.iter().zip(&matrix.rows) {
            for (x, y) in a.values().iter().zip(b.values().iter()) {
                assert!((x - y).abs() < 1e-9);
            }
        }

        fs::remove_dir_all(&dir).ok();
    }
}
