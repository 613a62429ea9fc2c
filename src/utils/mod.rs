use chrono::NaiveDateTime;

use crate::models::{Match, MatchResult, Venue};

/// Convert a team's last `window` matches played strictly before `reference`
/// to a form string, most recent first (e.g. "WLWDW"). Matches without a
/// result show as '?'.
pub fn results_to_form(team: &str, matches: &[Match], reference: NaiveDateTime, window: usize) -> String {
    let mut sorted: Vec<&Match> = matches
        .iter()
        .filter(|m| m.match_date < reference && m.involves(team))
        .collect();
    sorted.sort_by(|a, b| b.match_date.cmp(&a.match_date)); // Most recent first

    sorted
        .iter()
        .take(window)
        .filter_map(|m| {
            let venue = m.venue_of(team)?;
            Some(match (m.result, venue) {
                (None, _) => '?',
                (Some(MatchResult::Draw), _) => 'D',
                (Some(MatchResult::HomeWin), Venue::Home) | (Some(MatchResult::AwayWin), Venue::Away) => 'W',
                _ => 'L',
            })
        })
        .collect()
}

/// Normalize probabilities to sum to 1.0
pub fn normalize_probabilities(probs: [f64; 3]) -> [f64; 3] {
    let sum: f64 = probs.iter().sum();
    if sum == 0.0 {
        return probs;
    }
    probs.map(|p| p / sum)
}

pub fn format_percent(probability: f64) -> String {
    format!("{:.1}%", probability * 100.0)
}

/// Known team names closest to `query`, best match first. Case-insensitive
/// substring matches rank ahead of pure edit-distance matches.
pub fn suggest_teams(query: &str, teams: &[String], limit: usize) -> Vec<String> {
    let needle = query.trim().to_lowercase();
    let mut scored: Vec<(f64, &String)> = teams
        .iter()
        .map(|team| {
            let hay = team.to_lowercase();
            let similarity = strsim::jaro_winkler(&needle, &hay);
            let bonus = if !needle.is_empty() && hay.contains(&needle) { 1.0 } else { 0.0 };
            (similarity + bonus, team)
        })
        .filter(|(score, _)| *score >= 0.7)
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(limit).map(|(_, team)| team.clone()).collect()
}

/// Resolve a user-typed team name to a known one: exact match first, then a
/// single case-insensitive match.
pub fn resolve_team<'a>(query: &str, teams: &'a [String]) -> Option<&'a String> {
    let query = query.trim();
    teams.iter().find(|t| t.as_str() == query).or_else(|| {
        let mut candidates = teams.iter().filter(|t| t.eq_ignore_ascii_case(query));
        match (candidates.next(), candidates.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    })
}
