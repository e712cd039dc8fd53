use std::collections::BTreeMap;

use crate::models::analysis::SentimentHistoryRecord;
use crate::models::validation::{BacktestDataPoint, ValidationResult};

/// One day of the externally supplied market series.
#[derive(Debug, Clone)]
pub struct DailyReturn {
    pub date: String,
    /// Fractional day-over-day return of the reference instrument.
    pub ret: f64,
}

/// Pearson product-moment correlation. None when either series is
/// constant (undefined, must not leak NaN).
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Spearman rank correlation: Pearson on the average-ranked series.
pub fn spearman(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    pearson(&average_ranks(xs), &average_ranks(ys))
}

/// Ranks 1..n with ties broken by average rank.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut indexed: Vec<(usize, f64)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < indexed.len() {
        let mut j = i;
        while j + 1 < indexed.len() && indexed[j + 1].1 == indexed[i].1 {
            j += 1;
        }
        // Positions i..=j share the same value; each gets the mean rank.
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[indexed[k].0] = avg_rank;
        }
        i = j + 1;
    }
    ranks
}

/// Sign equality with exact zero on either side counting as a non-match.
fn direction_match(sentiment: f64, ret: f64) -> bool {
    if sentiment == 0.0 || ret == 0.0 {
        return false;
    }
    (sentiment > 0.0) == (ret > 0.0)
}

/// Collapse per-category history into one overall sentiment per day,
/// weighted by article count.
pub fn daily_sentiment(history: &[SentimentHistoryRecord]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for r in history {
        let entry = sums.entry(r.date.clone()).or_insert((0.0, 0));
        entry.0 += r.avg_sentiment * r.article_count as f64;
        entry.1 += r.article_count;
    }
    sums.into_iter()
        .filter(|(_, (_, count))| *count > 0)
        .map(|(date, (sum, count))| (date, sum / count as f64))
        .collect()
}

/// Compare historical daily sentiment to the next trading day's market
/// return. A failed or empty market series yields an explicit empty
/// result, never an error.
pub fn validate(
    period_start: &str,
    period_end: &str,
    history: &[SentimentHistoryRecord],
    returns: &[DailyReturn],
    gpr: Option<&BTreeMap<String, f64>>,
) -> ValidationResult {
    if returns.is_empty() {
        return ValidationResult::empty(
            period_start,
            period_end,
            "no market return data available for the requested period",
        );
    }

    let sentiment_by_date = daily_sentiment(history);
    if sentiment_by_date.is_empty() {
        return ValidationResult::empty(
            period_start,
            period_end,
            "no sentiment history recorded for the requested period",
        );
    }

    // Each sentiment day predicts the first strictly-later trading day.
    let mut data_points: Vec<BacktestDataPoint> = Vec::new();
    for (date, sentiment) in &sentiment_by_date {
        let Some(next) = returns.iter().find(|r| r.date.as_str() > date.as_str()) else {
            continue;
        };
        data_points.push(BacktestDataPoint {
            date: date.clone(),
            sentiment_score: *sentiment,
            market_return: next.ret,
            direction_match: direction_match(*sentiment, next.ret),
            gpr_score: gpr.and_then(|g| g.get(date).copied()),
        });
    }

    let sample_size = data_points.len() as u32;
    if sample_size == 0 {
        return ValidationResult::empty(
            period_start,
            period_end,
            "sentiment and market return series do not overlap",
        );
    }

    let matches = data_points.iter().filter(|p| p.direction_match).count();
    let sentiment_accuracy = 100.0 * matches as f64 / sample_size as f64;

    let sentiments: Vec<f64> = data_points.iter().map(|p| p.sentiment_score).collect();
    let rets: Vec<f64> = data_points.iter().map(|p| p.market_return).collect();

    let gpr_correlation = {
        let paired: Vec<(f64, f64)> = data_points
            .iter()
            .filter_map(|p| p.gpr_score.map(|g| (p.sentiment_score, g)))
            .collect();
        let (xs, ys): (Vec<f64>, Vec<f64>) = paired.into_iter().unzip();
        pearson(&xs, &ys)
    };

    ValidationResult {
        period_start: period_start.to_string(),
        period_end: period_end.to_string(),
        sentiment_accuracy,
        pearson_correlation: pearson(&sentiments, &rets),
        spearman_correlation: spearman(&sentiments, &rets),
        gpr_correlation,
        sample_size,
        data_points,
        is_empty: false,
        message: None,
        calculated_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}
