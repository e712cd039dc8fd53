use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::models::analysis::DailyAnalysis;
use crate::models::article::NewsArticle;
use crate::models::narrative::NarrativeThread;
use crate::models::validation::{ValidationResult, WeeklyReport};
use crate::services::backtest;
use crate::services::scorecard::Scorecard;
use crate::AppState;

use super::error::ApiError;

fn parse_date(s: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("invalid date: {}", s)))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
pub struct RunRequest {
    pub date: String,
    #[serde(default)]
    pub articles: Vec<NewsArticle>,
}

pub async fn run_pipeline(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunRequest>,
) -> Result<Json<DailyAnalysis>, ApiError> {
    parse_date(&req.date)?;
    let analysis = state.pipeline.run(&req.date, &req.articles).await?;
    Ok(Json(analysis))
}

pub async fn latest_analysis(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DailyAnalysis>, ApiError> {
    state
        .db
        .get_latest_daily_analysis()?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no analysis recorded yet".to_string()))
}

pub async fn analysis_by_date(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<DailyAnalysis>, ApiError> {
    parse_date(&date)?;
    state
        .db
        .get_daily_analysis(&date)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no analysis for {}", date)))
}

#[derive(Deserialize)]
pub struct NarrativeQuery {
    pub days: Option<u32>,
}

pub async fn narratives(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NarrativeQuery>,
) -> Result<Json<Vec<NarrativeThread>>, ApiError> {
    let days = query.days.unwrap_or(state.config.narrative.window_days).max(1);
    let cutoff = (chrono::Utc::now().date_naive() - chrono::Duration::days(days as i64 - 1))
        .format("%Y-%m-%d")
        .to_string();
    let mut threads: Vec<NarrativeThread> = state
        .db
        .get_threads()?
        .into_iter()
        .filter(|t| t.last_seen >= cutoff)
        .collect();
    crate::services::narrative::sort_for_display(&mut threads);
    Ok(Json(threads))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestRequest {
    pub start_date: String,
    pub end_date: String,
    /// Optional externally supplied geopolitical-risk series by date.
    #[serde(default)]
    pub gpr_series: Option<BTreeMap<String, f64>>,
}

pub async fn run_backtest(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BacktestRequest>,
) -> Result<Json<ValidationResult>, ApiError> {
    let start = parse_date(&req.start_date)?;
    let end = parse_date(&req.end_date)?;
    if end < start {
        return Err(ApiError::BadRequest("endDate precedes startDate".to_string()));
    }

    let history = state
        .db
        .get_sentiment_history_range(&req.start_date, &req.end_date)?;
    // Predictions settle on the next trading day, so fetch past the end.
    let fetch_end = (end + chrono::Duration::days(7)).format("%Y-%m-%d").to_string();
    let returns = state
        .returns
        .daily_returns(&state.config.benchmark_symbol, &req.start_date, &fetch_end)
        .await;

    Ok(Json(backtest::validate(
        &req.start_date,
        &req.end_date,
        &history,
        &returns,
        req.gpr_series.as_ref(),
    )))
}

pub async fn scorecard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<WeeklyReport>, ApiError> {
    let card = Scorecard::new(
        &state.db,
        state.returns.as_ref(),
        &state.config.benchmark_symbol,
    );
    let report = card.run(chrono::Utc::now().date_naive()).await?;
    Ok(Json(report))
}

pub async fn scorecard_history(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<WeeklyReport>>, ApiError> {
    Ok(Json(state.db.get_weekly_reports()?))
}

pub async fn export_briefing(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    parse_date(&date)?;
    let analysis = state
        .db
        .get_daily_analysis(&date)?
        .ok_or_else(|| ApiError::NotFound(format!("no analysis for {}", date)))?;

    let markdown = render_briefing_markdown(&analysis);
    let headers = [
        (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"briefing-{}.md\"", date),
        ),
    ];
    Ok((headers, markdown))
}

fn render_briefing_markdown(analysis: &DailyAnalysis) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Market Briefing — {}\n\n", analysis.date));
    out.push_str(&analysis.briefing);
    out.push_str("\n\n## Trends\n\n");
    if analysis.trend_report.trends.is_empty() {
        out.push_str("No trends identified.\n");
    }
    for t in &analysis.trend_report.trends {
        out.push_str(&format!(
            "- **{}** ({}, confidence {:.0}): {}\n",
            t.name,
            t.momentum.as_str(),
            t.confidence,
            t.analysis
        ));
    }
    let sentiment = &analysis.strategist_report.market_sentiment;
    out.push_str(&format!(
        "\n## Market Sentiment\n\nOverall: {:.0}\n",
        sentiment.overall
    ));
    for (category, value) in &sentiment.by_category {
        out.push_str(&format!("- {}: {:.0}\n", category, value));
    }
    out.push_str(&format!("\n_Generated at {}_\n", analysis.generated_at));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::{MarketSentiment, StrategistReport, TrendReport};

    #[test]
    fn briefing_markdown_names_date_and_sentiment() {
        let analysis = DailyAnalysis {
            date: "2025-06-10".into(),
            briefing: "Quiet session across sectors.".into(),
            trend_report: TrendReport {
                trends: vec![],
                cross_category_insights: String::new(),
            },
            strategist_report: StrategistReport {
                opportunities: vec![],
                risks: vec![],
                market_sentiment: MarketSentiment {
                    overall: 12.0,
                    by_category: [("technology".to_string(), 30.0)].into_iter().collect(),
                },
            },
            enriched_articles: vec![],
            generated_at: "2025-06-10 18:00:00".into(),
        };
        let md = render_briefing_markdown(&analysis);
        assert!(md.starts_with("# Market Briefing — 2025-06-10"));
        assert!(md.contains("Quiet session across sectors."));
        assert!(md.contains("No trends identified."));
        assert!(md.contains("Overall: 12"));
        assert!(md.contains("- technology: 30"));
    }
}
