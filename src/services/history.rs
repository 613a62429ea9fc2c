//! Schema checks shared by the batch feature builder and the single-match
//! adapter, so both reject bad input with the same error kind.

use crate::error::{PipelineError, Result};
use crate::models::{Match, MatchResult};

pub fn validate_team_name(team: &str) -> Result<()> {
    if team.trim().is_empty() {
        return Err(PipelineError::InvalidTeam(team.to_string()));
    }
    Ok(())
}

pub fn validate_fixture(home_team: &str, away_team: &str) -> Result<()> {
    validate_team_name(home_team)?;
    validate_team_name(away_team)?;
    if home_team == away_team {
        return Err(PipelineError::SameTeam(home_team.to_string()));
    }
    Ok(())
}

pub fn validate_match(m: &Match) -> Result<()> {
    validate_fixture(&m.home_team, &m.away_team)?;

    if let (Some(home_goals), Some(away_goals), Some(result)) = (m.home_goals, m.away_goals, m.result) {
        if MatchResult::from_score(home_goals, away_goals) != result {
            return Err(PipelineError::InconsistentResult {
                date: m.match_date.to_string(),
                home_team: m.home_team.clone(),
                away_team: m.away_team.clone(),
                home_goals,
                away_goals,
                result: result.code(),
            });
        }
    }

    Ok(())
}

pub fn validate_history(history: &[Match]) -> Result<()> {
    history.iter().try_for_each(validate_match)
}

/// Stable sort by date: same-day matches keep their original relative order.
pub fn sorted_by_date(history: &[Match]) -> Vec<Match> {
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|m| m.match_date);
    sorted
}
