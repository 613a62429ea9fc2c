use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use statrs::distribution::Poisson;

use crate::error::{PipelineError, Result};
use crate::models::{Match, MatchResult};

pub const SAMPLE_TEAMS: [&str; 20] = [
    "Arsenal",
    "Chelsea",
    "Liverpool",
    "Manchester City",
    "Manchester United",
    "Tottenham",
    "Newcastle",
    "Brighton",
    "Aston Villa",
    "West Ham",
    "Crystal Palace",
    "Fulham",
    "Brentford",
    "Wolves",
    "Everton",
    "Nottingham Forest",
    "Bournemouth",
    "Burnley",
    "Sheffield United",
    "Luton",
];

const HOME_GOAL_RATE: f64 = 1.5;
const AWAY_GOAL_RATE: f64 = 1.2;
const DAYS_BETWEEN_MATCHES: i64 = 3;

fn season_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 8, 1)
        .map(|d| d.and_time(NaiveTime::MIN))
        .unwrap_or_default()
}

/// A synthetic league history: random pairings every three days from
/// 2020-08-01, Poisson-distributed goals with a home advantage.
pub fn generate(count: usize, seed: u64) -> Result<Vec<Match>> {
    let home_goals = Poisson::new(HOME_GOAL_RATE).map_err(|e| PipelineError::Config(e.to_string()))?;
    let away_goals = Poisson::new(AWAY_GOAL_RATE).map_err(|e| PipelineError::Config(e.to_string()))?;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut matches = Vec::with_capacity(count);
    for i in 0..count {
        let home_team = *SAMPLE_TEAMS.choose(&mut rng).unwrap_or(&SAMPLE_TEAMS[0]);
        let opponents: Vec<&str> = SAMPLE_TEAMS.iter().copied().filter(|t| *t != home_team).collect();
        let away_team = *opponents.choose(&mut rng).unwrap_or(&SAMPLE_TEAMS[1]);

        let hg: f64 = home_goals.sample(&mut rng);
        let ag: f64 = away_goals.sample(&mut rng);
        let (hg, ag) = (hg as u32, ag as u32);

        matches.push(Match {
            match_date: season_start() + Duration::days(DAYS_BETWEEN_MATCHES * i as i64),
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
            home_goals: Some(hg),
            away_goals: Some(ag),
            result: Some(MatchResult::from_score(hg, ag)),
        });
    }

    tracing::info!("Generated {} sample matches (seed {})", matches.len(), seed);
    Ok(matches)
}
