use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::models::{FormAverages, Match, TeamForm, Venue};

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    scored: f64,
    conceded: f64,
    points: f64,
    matches: usize,
}

impl Tally {
    fn add(&mut self, scored: f64, conceded: f64, points: f64) {
        self.scored += scored;
        self.conceded += conceded;
        self.points += points;
        self.matches += 1;
    }

    fn averages(&self) -> FormAverages {
        if self.matches == 0 {
            return FormAverages::default();
        }
        let n = self.matches as f64;
        FormAverages {
            goals_scored: self.scored / n,
            goals_conceded: self.conceded / n,
            points: self.points / n,
        }
    }
}

/// Aggregate a team's form over `matches`, which must already be the
/// selected window in chronological order.
fn summarize<'a>(team: &str, matches: impl Iterator<Item = &'a Match>) -> TeamForm {
    let mut overall = Tally::default();
    let mut home = Tally::default();
    let mut away = Tally::default();

    for m in matches {
        let Some(venue) = m.venue_of(team) else {
            continue;
        };
        let (scored, conceded) = m.goals_for(venue);
        let points = m.points_for(venue);

        overall.add(scored, conceded, points);
        match venue {
            Venue::Home => home.add(scored, conceded, points),
            Venue::Away => away.add(scored, conceded, points),
        }
    }

    TeamForm {
        overall: overall.averages(),
        home: home.averages(),
        away: away.averages(),
    }
}

/// Rolling form of `team` over its last `window` matches played strictly
/// before `reference`. `history` may be in any order and may contain other
/// teams' matches. Unknown teams and empty windows give the zero snapshot.
pub fn compute_form(history: &[Match], team: &str, reference: NaiveDateTime, window: usize) -> TeamForm {
    let mut prior: Vec<&Match> = history
        .iter()
        .filter(|m| m.match_date < reference && m.involves(team))
        .collect();
    prior.sort_by_key(|m| m.match_date);

    let start = prior.len().saturating_sub(window);
    summarize(team, prior[start..].iter().copied())
}

/// Per-team chronological index over a date-sorted history. Built once per
/// batch so each lookup is a binary search instead of a full scan; results are
/// identical to `compute_form` on the same history.
pub struct TeamIndex<'a> {
    matches: &'a [Match],
    by_team: HashMap<&'a str, Vec<usize>>,
}

impl<'a> TeamIndex<'a> {
    /// `sorted` must be ordered by `match_date` ascending.
    pub fn new(sorted: &'a [Match]) -> Self {
        debug_assert!(sorted.windows(2).all(|w| w[0].match_date <= w[1].match_date));

        let mut by_team: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (i, m) in sorted.iter().enumerate() {
            by_team.entry(m.home_team.as_str()).or_default().push(i);
            by_team.entry(m.away_team.as_str()).or_default().push(i);
        }

        Self { matches: sorted, by_team }
    }

    pub fn team_count(&self) -> usize {
        self.by_team.len()
    }

    pub fn form(&self, team: &str, reference: NaiveDateTime, window: usize) -> TeamForm {
        let Some(indices) = self.by_team.get(team) else {
            return TeamForm::default();
        };

        let end = indices.partition_point(|&i| self.matches[i].match_date < reference);
        let start = end.saturating_sub(window);
        summarize(team, indices[start..end].iter().map(|&i| &self.matches[i]))
    }
}
