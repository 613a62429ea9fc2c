use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid date '{0}'")]
    InvalidDate(String),

    #[error("Invalid team identifier: {0:?}")]
    InvalidTeam(String),

    #[error("A team cannot play itself: {0}")]
    SameTeam(String),

    #[error("Invalid result code '{0}', expected H, D or A")]
    InvalidResult(String),

    #[error("Invalid target label {0}, expected 0, 1 or 2")]
    InvalidLabel(u8),

    #[error("Result {result} on {date} does not match score {home_goals}-{away_goals} ({home_team} vs {away_team})")]
    InconsistentResult {
        date: String,
        home_team: String,
        away_team: String,
        home_goals: u32,
        away_goals: u32,
        result: &'static str,
    },

    #[error("Missing required column '{column}' in {source_name}")]
    MissingColumn { column: String, source_name: String },

    #[error("Feature matrix is misaligned: {rows} rows but {labels} labels")]
    Misaligned { rows: usize, labels: usize },

    #[error("Not enough samples to train: {0}")]
    NotEnoughSamples(usize),

    #[error("Model was trained with window {trained}, current window is {current}")]
    WindowMismatch { trained: usize, current: usize },

    #[error("Training data has no {0} samples")]
    MissingClass(&'static str),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
