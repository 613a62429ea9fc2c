use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Full-time result of a match, coded the way football-data.co.uk does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchResult {
    #[serde(rename = "H")]
    HomeWin,
    #[serde(rename = "D")]
    Draw,
    #[serde(rename = "A")]
    AwayWin,
}

impl MatchResult {
    /// Ordered by target label: Away Win, Draw, Home Win.
    pub const BY_LABEL: [MatchResult; 3] = [MatchResult::AwayWin, MatchResult::Draw, MatchResult::HomeWin];

    pub fn code(self) -> &'static str {
        match self {
            MatchResult::HomeWin => "H",
            MatchResult::Draw => "D",
            MatchResult::AwayWin => "A",
        }
    }

    pub fn label(self) -> u8 {
        match self {
            MatchResult::AwayWin => 0,
            MatchResult::Draw => 1,
            MatchResult::HomeWin => 2,
        }
    }

    pub fn from_label(label: u8) -> Result<Self> {
        Self::BY_LABEL
            .get(label as usize)
            .copied()
            .ok_or(PipelineError::InvalidLabel(label))
    }

    pub fn from_score(home_goals: u32, away_goals: u32) -> Self {
        match home_goals.cmp(&away_goals) {
            std::cmp::Ordering::Greater => MatchResult::HomeWin,
            std::cmp::Ordering::Equal => MatchResult::Draw,
            std::cmp::Ordering::Less => MatchResult::AwayWin,
        }
    }

    /// Standard league points (3 / 1 / 0) for the side playing at `venue`.
    pub fn points_for(self, venue: Venue) -> f64 {
        match (self, venue) {
            (MatchResult::Draw, _) => 1.0,
            (MatchResult::HomeWin, Venue::Home) | (MatchResult::AwayWin, Venue::Away) => 3.0,
            _ => 0.0,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            MatchResult::HomeWin => "Home Win",
            MatchResult::Draw => "Draw",
            MatchResult::AwayWin => "Away Win",
        }
    }
}

impl FromStr for MatchResult {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "H" => Ok(MatchResult::HomeWin),
            "D" => Ok(MatchResult::Draw),
            "A" => Ok(MatchResult::AwayWin),
            other => Err(PipelineError::InvalidResult(other.to_string())),
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The side a team occupies in a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Home,
    Away,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub match_date: NaiveDateTime,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    pub result: Option<MatchResult>,
}

impl Match {
    /// Which side `team` played on, if it played at all.
    pub fn venue_of(&self, team: &str) -> Option<Venue> {
        if self.home_team == team {
            Some(Venue::Home)
        } else if self.away_team == team {
            Some(Venue::Away)
        } else {
            None
        }
    }

    pub fn involves(&self, team: &str) -> bool {
        self.venue_of(team).is_some()
    }

    /// Goals (scored, conceded) from the point of view of `venue`.
    /// Unknown goals count as zero.
    pub fn goals_for(&self, venue: Venue) -> (f64, f64) {
        let home = self.home_goals.unwrap_or(0) as f64;
        let away = self.away_goals.unwrap_or(0) as f64;
        match venue {
            Venue::Home => (home, away),
            Venue::Away => (away, home),
        }
    }

    pub fn points_for(&self, venue: Venue) -> f64 {
        self.result.map_or(0.0, |r| r.points_for(venue))
    }
}

/// Mean goals scored, goals conceded and points over a set of matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FormAverages {
    pub goals_scored: f64,
    pub goals_conceded: f64,
    pub points: f64,
}

/// A team's rolling form as of some reference date: averages over its last
/// `window` matches, plus the home-only and away-only subsets of those matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamForm {
    pub overall: FormAverages,
    pub home: FormAverages,
    pub away: FormAverages,
}

impl TeamForm {
    pub fn venue(&self, venue: Venue) -> FormAverages {
        match venue {
            Venue::Home => self.home,
            Venue::Away => self.away,
        }
    }
}

pub const FEATURE_COUNT: usize = 15;

/// Column order the classifier is trained on. Must never change between
/// training and inference.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "home_goals_scored_avg",
    "home_goals_conceded_avg",
    "home_points_avg",
    "home_home_goals_scored_avg",
    "home_home_goals_conceded_avg",
    "home_home_points_avg",
    "away_goals_scored_avg",
    "away_goals_conceded_avg",
    "away_points_avg",
    "away_away_goals_scored_avg",
    "away_away_goals_conceded_avg",
    "away_away_points_avg",
    "goals_scored_diff",
    "goals_conceded_diff",
    "points_diff",
];

/// One model input row. Field declaration order matches `FEATURE_NAMES`,
/// which is also the CSV header order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub home_goals_scored_avg: f64,
    pub home_goals_conceded_avg: f64,
    pub home_points_avg: f64,
    pub home_home_goals_scored_avg: f64,
    pub home_home_goals_conceded_avg: f64,
    pub home_home_points_avg: f64,
    pub away_goals_scored_avg: f64,
    pub away_goals_conceded_avg: f64,
    pub away_points_avg: f64,
    pub away_away_goals_scored_avg: f64,
    pub away_away_goals_conceded_avg: f64,
    pub away_away_points_avg: f64,
    pub goals_scored_diff: f64,
    pub goals_conceded_diff: f64,
    pub points_diff: f64,
}

impl FeatureRow {
    pub fn from_forms(home: &TeamForm, away: &TeamForm) -> Self {
        let home_venue = home.venue(Venue::Home);
        let away_venue = away.venue(Venue::Away);

        Self {
            home_goals_scored_avg: home.overall.goals_scored,
            home_goals_conceded_avg: home.overall.goals_conceded,
            home_points_avg: home.overall.points,
            home_home_goals_scored_avg: home_venue.goals_scored,
            home_home_goals_conceded_avg: home_venue.goals_conceded,
            home_home_points_avg: home_venue.points,
            away_goals_scored_avg: away.overall.goals_scored,
            away_goals_conceded_avg: away.overall.goals_conceded,
            away_points_avg: away.overall.points,
            away_away_goals_scored_avg: away_venue.goals_scored,
            away_away_goals_conceded_avg: away_venue.goals_conceded,
            away_away_points_avg: away_venue.points,
            goals_scored_diff: home.overall.goals_scored - away.overall.goals_scored,
            goals_conceded_diff: home.overall.goals_conceded - away.overall.goals_conceded,
            points_diff: home.overall.points - away.overall.points,
        }
    }

    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        [
            self.home_goals_scored_avg,
            self.home_goals_conceded_avg,
            self.home_points_avg,
            self.home_home_goals_scored_avg,
            self.home_home_goals_conceded_avg,
            self.home_home_points_avg,
            self.away_goals_scored_avg,
            self.away_goals_conceded_avg,
            self.away_points_avg,
            self.away_away_goals_scored_avg,
            self.away_away_goals_conceded_avg,
            self.away_away_points_avg,
            self.goals_scored_diff,
            self.goals_conceded_diff,
            self.points_diff,
        ]
    }
}

/// Class probabilities, ordered like the target labels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeProbabilities {
    pub away_win: f64,
    pub draw: f64,
    pub home_win: f64,
}

impl OutcomeProbabilities {
    pub fn from_array(probs: [f64; 3]) -> Self {
        Self {
            away_win: probs[0],
            draw: probs[1],
            home_win: probs[2],
        }
    }

    pub fn most_likely(&self) -> MatchResult {
        let probs = [self.away_win, self.draw, self.home_win];
        let mut best = 0;
        for (i, p) in probs.iter().enumerate() {
            if *p > probs[best] {
                best = i;
            }
        }
        MatchResult::BY_LABEL[best]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    pub match_date: NaiveDateTime,
    pub away_win_probability: f64,
    pub draw_probability: f64,
    pub home_win_probability: f64,
    pub predicted_outcome: String,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}
