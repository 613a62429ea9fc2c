use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{PipelineError, Result};
use crate::models::{Match, MatchResult};
use crate::services::history::{validate_history, validate_match};

pub const REQUIRED_COLUMNS: [&str; 6] = ["match_date", "home_team", "away_team", "home_goals", "away_goals", "result"];

/// Source column names seen in public datasets and scraped tables, mapped to
/// the canonical column names.
const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("date", "match_date"),
    ("Date", "match_date"),
    ("datetime", "match_date"),
    ("home", "home_team"),
    ("HomeTeam", "home_team"),
    ("Home", "home_team"),
    ("away", "away_team"),
    ("AwayTeam", "away_team"),
    ("Away", "away_team"),
    ("FTHG", "home_goals"),
    ("HG", "home_goals"),
    ("home_score", "home_goals"),
    ("FTAG", "away_goals"),
    ("AG", "away_goals"),
    ("away_score", "away_goals"),
    ("FTR", "result"),
    ("Result", "result"),
    ("Res", "result"),
];

pub fn standardize_column(name: &str) -> &str {
    let name = name.trim();
    COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(name)
}

/// Parse a match date in any of the formats the sources use. Date-only
/// values are taken as midnight.
pub fn parse_match_date(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc());
    }
    // Two-digit years first: "%Y" would happily read "21" as year 21.
    for format in ["%Y-%m-%d", "%d/%m/%y", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date.and_time(NaiveTime::MIN));
        }
    }

    Err(PipelineError::InvalidDate(raw.to_string()))
}

/// Lenient numeric parse: anything that is not a non-negative whole number
/// becomes unknown.
fn parse_goals(raw: &str) -> Option<u32> {
    let value: f64 = raw.trim().parse().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// A row as read from a source file, before cleaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMatch {
    pub match_date: Option<NaiveDateTime>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    pub result: Option<MatchResult>,
}

struct ColumnMap {
    match_date: usize,
    home_team: usize,
    away_team: usize,
    home_goals: usize,
    away_goals: usize,
    result: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &csv::StringRecord, source: &Path, require_result: bool) -> Result<Self> {
        let standardized: Vec<&str> = headers.iter().map(standardize_column).collect();
        let find = |column: &str| standardized.iter().position(|h| *h == column);
        let require = |column: &str| {
            find(column).ok_or_else(|| PipelineError::MissingColumn {
                column: column.to_string(),
                source_name: source.display().to_string(),
            })
        };

        let result = if require_result { Some(require("result")?) } else { find("result") };

        Ok(Self {
            match_date: require("match_date")?,
            home_team: require("home_team")?,
            away_team: require("away_team")?,
            home_goals: require("home_goals")?,
            away_goals: require("away_goals")?,
            result,
        })
    }
}

/// Read one raw source file. Unparseable goals, dates and result codes become
/// unknown rather than failing the whole file.
pub fn read_raw_matches(path: &Path) -> Result<Vec<RawMatch>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns = ColumnMap::resolve(reader.headers()?, path, false)?;

    let mut rows = Vec::new();
    let mut bad_results = 0usize;

    for record in reader.records() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("");

        let result = match columns.result.map(field).map(str::trim) {
            None | Some("") => None,
            Some(code) => match code.parse::<MatchResult>() {
                Ok(result) => Some(result),
                Err(_) => {
                    bad_results += 1;
                    None
                }
            },
        };

        rows.push(RawMatch {
            match_date: parse_match_date(field(columns.match_date)).ok(),
            home_team: non_empty(field(columns.home_team)),
            away_team: non_empty(field(columns.away_team)),
            home_goals: parse_goals(field(columns.home_goals)),
            away_goals: parse_goals(field(columns.away_goals)),
            result,
        });
    }

    if bad_results > 0 {
        tracing::warn!("{}: {} rows with an unrecognised result code treated as missing", path.display(), bad_results);
    }

    Ok(rows)
}

/// Turn combined raw rows into a match history: derive results when no source
/// carried any, drop rows without a date or teams, drop invalid fixtures,
/// keep the first of any (date, home, away) duplicates, sort by date.
pub fn clean_matches(mut raw: Vec<RawMatch>) -> Vec<Match> {
    let initial_rows = raw.len();

    if raw.iter().all(|r| r.result.is_none()) {
        for row in raw.iter_mut() {
            if let (Some(h), Some(a)) = (row.home_goals, row.away_goals) {
                row.result = Some(MatchResult::from_score(h, a));
            }
        }
    }

    let mut seen = HashSet::new();
    let mut invalid = 0usize;
    let mut matches: Vec<Match> = Vec::with_capacity(raw.len());

    for row in raw {
        let (Some(match_date), Some(home_team), Some(away_team)) = (row.match_date, row.home_team, row.away_team) else {
            continue;
        };

        let m = Match {
            match_date,
            home_team,
            away_team,
            home_goals: row.home_goals,
            away_goals: row.away_goals,
            result: row.result,
        };

        if let Err(e) = validate_match(&m) {
            tracing::warn!("Dropping invalid match: {}", e);
            invalid += 1;
            continue;
        }

        if seen.insert((m.match_date, m.home_team.clone(), m.away_team.clone())) {
            matches.push(m);
        }
    }

    matches.sort_by_key(|m| m.match_date);

    if invalid > 0 {
        tracing::warn!("Dropped {} invalid matches", invalid);
    }
    tracing::info!("Cleaned data: {} -> {} rows", initial_rows, matches.len());
    matches
}

/// Combine every source that exists on disk and clean the result.
pub fn clean_sources(paths: &[PathBuf]) -> Result<Vec<Match>> {
    let mut combined = Vec::new();

    for path in paths {
        if path.exists() {
            tracing::info!("Loading raw matches from {}", path.display());
            combined.extend(read_raw_matches(path)?);
        } else {
            tracing::debug!("Source {} not found, skipping", path.display());
        }
    }

    if combined.is_empty() {
        tracing::warn!("No raw data files found. Returning an empty match history.");
        return Ok(Vec::new());
    }

    Ok(clean_matches(combined))
}

pub fn write_cleaned(path: &Path, matches: &[Match]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    if matches.is_empty() {
        writer.write_record(REQUIRED_COLUMNS)?;
    }
    for m in matches {
        writer.serialize(m)?;
    }
    writer.flush()?;

    tracing::info!("Saved {} cleaned matches to {}", matches.len(), path.display());
    Ok(())
}

/// Load a cleaned history. Unlike raw sources this is strict: every column
/// must be present and every date must parse.
pub fn load_cleaned(path: &Path) -> Result<Vec<Match>> {
    let mut reader = csv::Reader::from_path(path)?;
    let columns = ColumnMap::resolve(reader.headers()?, path, true)?;

    let mut matches = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("");

        let result = match columns.result.map(field).map(str::trim) {
            None | Some("") => None,
            Some(code) => Some(code.parse::<MatchResult>()?),
        };

        matches.push(Match {
            match_date: parse_match_date(field(columns.match_date))?,
            home_team: field(columns.home_team).trim().to_string(),
            away_team: field(columns.away_team).trim().to_string(),
            home_goals: parse_goals(field(columns.home_goals)),
            away_goals: parse_goals(field(columns.away_goals)),
            result,
        });
    }

    validate_history(&matches)?;
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_csv(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("epl-raw-{}.csv", uuid::Uuid::new_v4()));
        fs::write(&path, contents).unwrap();
        path
    }

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_time(NaiveTime::MIN)
    }

    #[test]
    fn test_standardize_column_names() {
        assert_eq!(standardize_column("HomeTeam"), "home_team");
        assert_eq!(standardize_column(" FTR "), "result");
        assert_eq!(standardize_column("away_score"), "away_goals");
        assert_eq!(standardize_column("Referee"), "Referee");
    }

    #[test]
    fn test_parse_match_date_formats() {
        assert_eq!(parse_match_date("2023-08-12").unwrap(), at(2023, 8, 12));
        assert_eq!(parse_match_date("12/08/2023").unwrap(), at(2023, 8, 12));
        assert_eq!(parse_match_date("12/08/23").unwrap(), at(2023, 8, 12));
        assert_eq!(
            parse_match_date("2023-08-12T17:30:00").unwrap(),
            at(2023, 8, 12).date().and_hms_opt(17, 30, 0).unwrap()
        );
        assert_eq!(
            parse_match_date("2023-08-12T16:30:00+00:00").unwrap(),
            at(2023, 8, 12).date().and_hms_opt(16, 30, 0).unwrap()
        );
        assert!(matches!(parse_match_date("next tuesday"), Err(PipelineError::InvalidDate(_))));
        assert!(parse_match_date("2023-13-40").is_err());
    }

    #[test]
    fn test_read_football_data_layout() {
        let path = temp_csv(
            "Div,Date,HomeTeam,AwayTeam,FTHG,FTAG,FTR\n\
             E0,12/08/2023,Arsenal,Nott'm Forest,2,1,H\n\
             E0,12/08/2023,Bournemouth,West Ham,1,1,D\n\
             E0,13/08/2023,Brentford,Tottenham,2,2,X\n\
             E0,bad-date,Chelsea,Liverpool,n/a,1,\n",
        );

        let rows = read_raw_matches(&path).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].home_team.as_deref(), Some("Arsenal"));
        assert_eq!(rows[0].result, Some(MatchResult::HomeWin));
        assert_eq!(rows[2].result, None);
        assert_eq!(rows[3].match_date, None);
        assert_eq!(rows[3].home_goals, None);
        assert_eq!(rows[3].away_goals, Some(1));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_required_column() {
        let path = temp_csv("Date,HomeTeam,FTHG,FTAG\n12/08/2023,Arsenal,2,1\n");
        let err = read_raw_matches(&path).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { ref column, .. } if column == "away_team"));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_results_derived_when_no_source_has_them() {
        let raw = vec![
            RawMatch {
                match_date: Some(at(2023, 8, 12)),
                home_team: Some("Arsenal".into()),
                away_team: Some("Chelsea".into()),
                home_goals: Some(0),
                away_goals: Some(2),
                result: None,
            },
            RawMatch {
                match_date: Some(at(2023, 8, 13)),
                home_team: Some("Everton".into()),
                away_team: Some("Fulham".into()),
                home_goals: None,
                away_goals: Some(2),
                result: None,
            },
        ];

        let cleaned = clean_matches(raw);
        assert_eq!(cleaned[0].result, Some(MatchResult::AwayWin));
        assert_eq!(cleaned[1].result, None);
    }

    #[test]
    fn test_clean_drops_incomplete_and_duplicate_rows() {
        let base = RawMatch {
            match_date: Some(at(2023, 9, 2)),
            home_team: Some("Arsenal".into()),
            away_team: Some("Chelsea".into()),
            home_goals: Some(1),
            away_goals: Some(0),
            result: Some(MatchResult::HomeWin),
        };
        let duplicate = RawMatch {
            home_goals: Some(3),
            away_goals: Some(0),
            ..base.clone()
        };
        let earlier = RawMatch {
            match_date: Some(at(2023, 8, 20)),
            home_team: Some("Chelsea".into()),
            away_team: Some("Arsenal".into()),
            home_goals: Some(2),
            away_goals: Some(2),
            result: Some(MatchResult::Draw),
        };
        let no_date = RawMatch { match_date: None, ..base.clone() };
        let no_team = RawMatch { away_team: None, ..base.clone() };
        let contradictory = RawMatch {
            match_date: Some(at(2023, 9, 9)),
            result: Some(MatchResult::AwayWin),
            ..base.clone()
        };

        let cleaned = clean_matches(vec![base, duplicate, earlier, no_date, no_team, contradictory]);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].match_date, at(2023, 8, 20));
        // First occurrence wins.
        assert_eq!(cleaned[1].home_goals, Some(1));
    }

    #[test]
    fn test_clean_sources_without_files() {
        let missing = std::env::temp_dir().join(format!("epl-missing-{}.csv", uuid::Uuid::new_v4()));
        assert!(clean_sources(&[missing]).unwrap().is_empty());
    }

    #[test]
    fn test_cleaned_file_round_trip() {
        let path = std::env::temp_dir().join(format!("epl-cleaned-{}.csv", uuid::Uuid::new_v4()));
        let matches = vec![
            Match {
                match_date: at(2023, 8, 12),
                home_team: "Arsenal".into(),
                away_team: "Nott'm Forest".into(),
                home_goals: Some(2),
                away_goals: Some(1),
                result: Some(MatchResult::HomeWin),
            },
            Match {
                match_date: at(2023, 8, 19),
                home_team: "Crystal Palace".into(),
                away_team: "Arsenal".into(),
                home_goals: None,
                away_goals: None,
                result: None,
            },
        ];

        write_cleaned(&path, &matches).unwrap();
        let header = fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("match_date,home_team,away_team,home_goals,away_goals,result"));
        assert_eq!(load_cleaned(&path).unwrap(), matches);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_cleaned_rejects_bad_dates() {
        let path = temp_csv(
            "match_date,home_team,away_team,home_goals,away_goals,result\n\
             not-a-date,Arsenal,Chelsea,1,0,H\n",
        );
        assert!(matches!(load_cleaned(&path), Err(PipelineError::InvalidDate(_))));
        fs::remove_file(&path).ok();
    }
}
