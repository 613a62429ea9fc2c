use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{PipelineError, Result};

pub const DEFAULT_ROLLING_WINDOW: usize = 5;
pub const DEFAULT_RANDOM_SEED: u64 = 42;

/// Runtime settings, read once from the environment (and `.env`) at startup
/// and passed explicitly to everything that needs a path or the window size.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub models_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub rolling_window: usize,
    pub random_seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/epl.db".to_string(),
            data_dir: PathBuf::from("data"),
            models_dir: PathBuf::from("models"),
            reports_dir: PathBuf::from("reports"),
            rolling_window: DEFAULT_ROLLING_WINDOW,
            random_seed: DEFAULT_RANDOM_SEED,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let rolling_window = parse_var("ROLLING_WINDOW", defaults.rolling_window)?;
        if rolling_window == 0 {
            return Err(PipelineError::Config("ROLLING_WINDOW must be at least 1".to_string()));
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            data_dir: env::var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            models_dir: env::var("MODELS_DIR").map(PathBuf::from).unwrap_or(defaults.models_dir),
            reports_dir: env::var("REPORTS_DIR").map(PathBuf::from).unwrap_or(defaults.reports_dir),
            rolling_window,
            random_seed: parse_var("RANDOM_SEED", defaults.random_seed)?,
        })
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn interim_dir(&self) -> PathBuf {
        self.data_dir.join("interim")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    /// Raw sources, in the order they are combined during cleaning.
    pub fn raw_sources(&self) -> Vec<PathBuf> {
        let raw = self.raw_dir();
        vec![
            raw.join("epl_matches_raw.csv"),
            raw.join("scraped_matches_bs4.csv"),
            raw.join("scraped_matches_selenium.csv"),
        ]
    }

    pub fn cleaned_data_file(&self) -> PathBuf {
        self.interim_dir().join("epl_matches_cleaned.csv")
    }

    pub fn features_file(&self) -> PathBuf {
        self.processed_dir().join("X_features.csv")
    }

    pub fn target_file(&self) -> PathBuf {
        self.processed_dir().join("y_target.csv")
    }

    pub fn model_file(&self) -> PathBuf {
        self.models_dir.join("outcome_model.json")
    }

    pub fn feature_importance_file(&self) -> PathBuf {
        self.reports_dir.join("feature_importances.csv")
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PipelineError::Config(format!("{} has invalid value '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let settings = Settings::default();
        assert_eq!(settings.rolling_window, 5);
        assert_eq!(settings.features_file(), PathBuf::from("data/processed/X_features.csv"));
        assert_eq!(settings.cleaned_data_file(), PathBuf::from("data/interim/epl_matches_cleaned.csv"));
        assert_eq!(settings.raw_sources().len(), 3);
    }

    #[test]
    fn test_parse_var_falls_back_to_default() {
        let value: usize = parse_var("EPL_PREDICTOR_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
