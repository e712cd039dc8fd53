use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate};

use crate::db::database::Database;
use crate::models::validation::{Grade, ValidationResult, WeeklyReport};
use crate::services::backtest;
use crate::services::market_data::ReturnSource;

/// Computes and persists the trailing-week report card.
pub struct Scorecard<'a> {
    db: &'a Database,
    returns: &'a dyn ReturnSource,
    benchmark_symbol: String,
}

impl<'a> Scorecard<'a> {
    pub fn new(db: &'a Database, returns: &'a dyn ReturnSource, benchmark_symbol: &str) -> Self {
        Self {
            db,
            returns,
            benchmark_symbol: benchmark_symbol.to_string(),
        }
    }

    /// Validates the trailing 7 days ending at `as_of` and upserts the
    /// result under that week's Monday. Re-running within one week
    /// overwrites the same row.
    pub async fn run(&self, as_of: NaiveDate) -> Result<WeeklyReport> {
        let window_start = as_of - Duration::days(6);
        let start = window_start.format("%Y-%m-%d").to_string();
        let end = as_of.format("%Y-%m-%d").to_string();

        let history = self.db.get_sentiment_history_range(&start, &end)?;
        // The prediction for the window's last day settles on the next
        // trading day, so fetch one extra week of returns.
        let fetch_end = (as_of + Duration::days(7)).format("%Y-%m-%d").to_string();
        let returns = self
            .returns
            .daily_returns(&self.benchmark_symbol, &start, &fetch_end)
            .await;

        let result = backtest::validate(&start, &end, &history, &returns, None);
        let report = build_report(as_of, &result);
        if let Err(e) = self.db.save_weekly_report(&report) {
            tracing::warn!("could not persist weekly report for {}: {}", report.week_start, e);
        }
        tracing::info!(
            "scorecard for week of {}: grade {} over {} samples",
            report.week_start,
            report.grade.as_str(),
            report.sample_size
        );
        Ok(report)
    }
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn build_report(as_of: NaiveDate, result: &ValidationResult) -> WeeklyReport {
    let monday = week_start(as_of);
    let n = result.data_points.len();
    let (avg_sentiment, avg_return) = if n == 0 {
        (0.0, 0.0)
    } else {
        (
            result.data_points.iter().map(|p| p.sentiment_score).sum::<f64>() / n as f64,
            result.data_points.iter().map(|p| p.market_return).sum::<f64>() / n as f64,
        )
    };
    WeeklyReport {
        week_start: monday.format("%Y-%m-%d").to_string(),
        week_end: (monday + Duration::days(6)).format("%Y-%m-%d").to_string(),
        direction_accuracy: result.sentiment_accuracy,
        pearson_r: result.pearson_correlation,
        spearman_r: result.spearman_correlation,
        sample_size: result.sample_size,
        avg_sentiment,
        avg_return,
        grade: Grade::from_accuracy(result.sentiment_accuracy, result.sample_size),
    }
}
