use anyhow::{Context, Result};
use chrono::Utc;

use crate::config::Settings;
use crate::db::{create_pool, get_all_matches, get_team_matches, get_team_names, init_database, insert_prediction, replace_matches};
use crate::models::{Match, Venue};
use crate::services::classifier::{train_and_evaluate, write_feature_importances};
use crate::services::data_cleaner::{clean_sources, load_cleaned, parse_match_date, write_cleaned};
use crate::services::{compute_form, sample_data, FeatureBuilder, FeatureMatrix, PredictionEngine, SoftmaxClassifier, TrainingConfig};
use crate::utils::{format_percent, resolve_team, results_to_form, suggest_teams};

pub async fn init_db(settings: &Settings) -> Result<()> {
    let pool = create_pool(&settings.database_url).await?;
    init_database(&pool).await?;
    println!("✅ Database ready at {}", settings.database_url);
    Ok(())
}

async fn store_history(settings: &Settings, matches: &[Match]) -> Result<u64> {
    write_cleaned(&settings.cleaned_data_file(), matches)?;

    let pool = create_pool(&settings.database_url).await?;
    init_database(&pool).await?;
    Ok(replace_matches(&pool, matches).await?)
}

pub async fn ingest(settings: &Settings) -> Result<()> {
    println!("📥 Cleaning raw match data from {}...", settings.raw_dir().display());

    let matches = clean_sources(&settings.raw_sources())?;
    if matches.is_empty() {
        println!(
            "📭 No raw data found. Put CSV files in {} or run: epl-predictor sample",
            settings.raw_dir().display()
        );
        return Ok(());
    }

    let stored = store_history(settings, &matches).await?;
    println!("✅ Cleaned {} matches, {} stored", matches.len(), stored);
    Ok(())
}

pub async fn generate_sample(settings: &Settings, count: usize, seed: Option<u64>) -> Result<()> {
    let seed = seed.unwrap_or(settings.random_seed);
    let matches = sample_data::generate(count, seed)?;
    let stored = store_history(settings, &matches).await?;

    println!("✅ Created sample data: {} matches (seed {})", stored, seed);
    println!("💡 Next: epl-predictor features && epl-predictor train");
    Ok(())
}

/// The stored history, or the cleaned CSV when the database is still empty.
async fn load_history(settings: &Settings) -> Result<Vec<Match>> {
    let pool = create_pool(&settings.database_url).await?;
    init_database(&pool).await?;
    let stored = get_all_matches(&pool).await?;

    let cleaned = settings.cleaned_data_file();
    if stored.is_empty() && cleaned.exists() {
        tracing::info!("Database is empty, reading {}", cleaned.display());
        return Ok(load_cleaned(&cleaned)?);
    }
    Ok(stored)
}

pub async fn build_features(settings: &Settings) -> Result<()> {
    let history = load_history(settings).await?;
    if history.is_empty() {
        println!("📭 No matches stored. Try: epl-predictor ingest (or epl-predictor sample)");
        return Ok(());
    }

    let builder = FeatureBuilder::new(settings.rolling_window);
    let matrix = builder.build_feature_matrix(&history)?;
    matrix.save(&settings.features_file(), &settings.target_file())?;

    println!(
        "✅ Built feature matrix: {} samples from {} matches (window {})",
        matrix.len(),
        history.len(),
        builder.window()
    );
    Ok(())
}

pub async fn train(settings: &Settings) -> Result<()> {
    let matrix = FeatureMatrix::load(&settings.features_file(), &settings.target_file())
        .with_context(|| format!("loading features from {}", settings.processed_dir().display()))?;
    if matrix.is_empty() {
        println!("📭 Feature matrix is empty. Run: epl-predictor features");
        return Ok(());
    }
    println!("🧠 Training on {} samples...", matrix.len());

    let (model, evaluation) = train_and_evaluate(&matrix, settings.rolling_window, &TrainingConfig::default())?;
    model.save(&settings.model_file())?;

    let importances = model.feature_importances();
    write_feature_importances(&settings.feature_importance_file(), &importances)?;

    println!("\n📊 Validation ({} samples):", evaluation.samples);
    println!("   Accuracy: {:.4}", evaluation.accuracy);
    println!("   Balanced accuracy: {:.4}\n", evaluation.balanced_accuracy);
    print!("{}", evaluation.report());

    println!("\n🔝 Top features:");
    for (feature, importance) in importances.iter().take(5) {
        println!("   • {} ({:.3})", feature, importance);
    }
    Ok(())
}

fn warn_if_unknown(team: &str, teams: &[String]) {
    if resolve_team(team, teams).is_none() {
        println!("⚠️  No history for '{}': its form features will be zero.", team);
        let suggestions = suggest_teams(team, teams, 3);
        if !suggestions.is_empty() {
            println!("   Did you mean: {}?", suggestions.join(", "));
        }
    }
}

pub async fn predict(settings: &Settings, home: &str, away: &str, date: &str) -> Result<()> {
    let match_date = parse_match_date(date)?;

    let pool = create_pool(&settings.database_url).await?;
    init_database(&pool).await?;
    let history = get_all_matches(&pool).await?;
    let teams = get_team_names(&pool).await?;

    let home = resolve_team(home, &teams).map(String::as_str).unwrap_or(home);
    let away = resolve_team(away, &teams).map(String::as_str).unwrap_or(away);
    warn_if_unknown(home, &teams);
    warn_if_unknown(away, &teams);

    let model = SoftmaxClassifier::load(&settings.model_file())
        .with_context(|| format!("no trained model at {}; run: epl-predictor train", settings.model_file().display()))?;
    let engine = PredictionEngine::new(model, settings.rolling_window)?;

    let result = engine.predict_match(home, away, match_date, &history)?;
    insert_prediction(&pool, &result.prediction).await?;

    let p = result.probabilities;
    println!("🔮 {} vs {} ({}):", home, away, match_date.format("%Y-%m-%d"));
    println!("   Predicted outcome: {}", result.prediction.predicted_outcome);
    println!(
        "   Home win: {} | Draw: {} | Away win: {}",
        format_percent(p.home_win),
        format_percent(p.draw),
        format_percent(p.away_win)
    );
    println!(
        "   Form (pts/game, last {}): {} {:.2} | {} {:.2}",
        settings.rolling_window, home, result.features.home_points_avg, away, result.features.away_points_avg
    );
    Ok(())
}

pub async fn query_team(settings: &Settings, team_name: &str, date: Option<&str>) -> Result<()> {
    let reference = match date {
        Some(raw) => parse_match_date(raw)?,
        None => Utc::now().naive_utc(),
    };

    let pool = create_pool(&settings.database_url).await?;
    init_database(&pool).await?;
    let teams = get_team_names(&pool).await?;

    println!("🔍 Searching for team: {}", team_name);

    let Some(team) = resolve_team(team_name, &teams) else {
        println!("❌ No team found matching '{}'", team_name);
        let suggestions = suggest_teams(team_name, &teams, 5);
        if !suggestions.is_empty() {
            println!("\n💡 Did you mean:");
            for name in suggestions {
                println!("   • {}", name);
            }
        }
        return Ok(());
    };

    let history = get_all_matches(&pool).await?;
    let form = compute_form(&history, team, reference, settings.rolling_window);

    println!("📊 {} form before {} (last {} matches):", team, reference.format("%Y-%m-%d"), settings.rolling_window);
    println!("   Form: {}", results_to_form(team, &history, reference, settings.rolling_window));
    for (label, averages) in [("Overall", form.overall), ("Home", form.venue(Venue::Home)), ("Away", form.venue(Venue::Away))] {
        println!(
            "   {:<8} scored {:.2} | conceded {:.2} | points {:.2}",
            label, averages.goals_scored, averages.goals_conceded, averages.points
        );
    }

    println!("\n📅 Recent Matches:");
    let recent = get_team_matches(&pool, team, reference, 5).await?;
    if recent.is_empty() {
        println!("   No recent matches found");
    }
    for m in recent {
        let (venue, opponent) = if m.home_team == *team { ("vs", &m.away_team) } else { ("at", &m.home_team) };
        let score = match (m.home_goals, m.away_goals) {
            (Some(h), Some(a)) => format!("({}-{})", h, a),
            _ => "(TBD)".to_string(),
        };
        println!("   {} {} {} {}", m.match_date.format("%Y-%m-%d"), venue, opponent, score);
    }

    Ok(())
}
