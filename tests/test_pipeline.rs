use std::sync::Arc;

use market_intel::config::AppConfig;
use market_intel::db::database::Database;
use market_intel::models::article::{NewsArticle, TrendDirection};
use market_intel::services::pipeline::IntelPipeline;
use market_intel::services::provider::stub::StubProvider;

fn article(ticker: &str, headline: &str, category: &str) -> NewsArticle {
    NewsArticle {
        ticker: ticker.to_string(),
        headline: headline.to_string(),
        url: format!("https://example.com/{}", headline.replace(' ', "-")),
        source: "test-wire".to_string(),
        category: category.to_string(),
    }
}

fn sample_day() -> Vec<NewsArticle> {
    vec![
        article("AAPL", "Apple beats on services revenue", "technology"),
        article("MSFT", "Azure growth re-accelerates", "technology"),
        article("NVDA", "Datacenter demand outpaces supply", "technology"),
        article("XOM", "Crude slides on supply glut", "energy"),
        article("CVX", "Refining margins compress", "energy"),
    ]
}

#[tokio::test]
async fn fully_degraded_day_has_the_documented_shape() {
    let db = Arc::new(Database::in_memory().unwrap());
    let mut config = AppConfig::default();
    config.reader_batch_delay_ms = 0;
    let pipeline = IntelPipeline::new(
        Arc::clone(&db),
        Arc::new(StubProvider::always_fail()),
        &config,
    );

    let analysis = pipeline.run("2025-06-10", &sample_day()).await.unwrap();

    // Briefing degrades to the deterministic template.
    assert!(analysis.briefing.contains("2025-06-10"));
    assert!(analysis.briefing.contains("5 headlines"));
    assert!(analysis.briefing.contains("technology"));
    assert!(analysis.briefing.contains("energy"));

    // Every article survives enrichment with neutral defaults.
    assert_eq!(analysis.enriched_articles.len(), 5);
    for a in &analysis.enriched_articles {
        assert_eq!(a.sentiment_score, 0.0);
        assert_eq!(a.impact_score, 50.0);
        assert!(a.key_entities.is_empty());
        assert_eq!(a.trend_direction, TrendDirection::Neutral);
    }

    // Analyst degrades to a single stable trend at confidence 50.
    assert_eq!(analysis.trend_report.trends.len(), 1);
    let trend = &analysis.trend_report.trends[0];
    assert_eq!(trend.confidence, 50.0);
    assert_eq!(
        analysis.trend_report.cross_category_insights,
        analysis.briefing
    );

    // Strategist degrades to arithmetic sentiment with nothing actionable.
    assert!(analysis.strategist_report.opportunities.is_empty());
    assert!(analysis.strategist_report.risks.is_empty());
    let sentiment = &analysis.strategist_report.market_sentiment;
    assert_eq!(sentiment.overall, 0.0);
    assert_eq!(sentiment.by_category.len(), 2);
    assert_eq!(sentiment.by_category["technology"], 0.0);
    assert_eq!(sentiment.by_category["energy"], 0.0);
}

#[tokio::test]
async fn persisted_day_round_trips_through_every_table() {
    let db = Arc::new(Database::in_memory().unwrap());
    let mut config = AppConfig::default();
    config.reader_batch_delay_ms = 0;
    let pipeline = IntelPipeline::new(
        Arc::clone(&db),
        Arc::new(StubProvider::always_fail()),
        &config,
    );

    pipeline.run("2025-06-10", &sample_day()).await.unwrap();

    let stored = db.get_daily_analysis("2025-06-10").unwrap().unwrap();
    assert_eq!(stored.enriched_articles.len(), 5);
    assert_eq!(
        db.get_latest_daily_analysis().unwrap().unwrap().date,
        "2025-06-10"
    );

    let history = db
        .get_sentiment_history_range("2025-06-10", "2025-06-10")
        .unwrap();
    assert_eq!(history.len(), 2);
    for record in &history {
        assert_eq!(record.avg_sentiment, 0.0);
    }

    // One cluster per category, rolled into one thread each.
    let clusters = db.get_clusters_since("2025-06-01").unwrap();
    assert_eq!(clusters.len(), 2);
    let threads = db.get_threads().unwrap();
    assert_eq!(threads.len(), 2);
    for thread in &threads {
        assert_eq!(thread.sentiment_arc.len(), 1);
        assert_eq!(thread.duration_days, 1);
    }
}

#[tokio::test]
async fn consecutive_days_extend_narrative_threads() {
    let db = Arc::new(Database::in_memory().unwrap());
    let mut config = AppConfig::default();
    config.reader_batch_delay_ms = 0;
    let pipeline = IntelPipeline::new(
        Arc::clone(&db),
        Arc::new(StubProvider::always_fail()),
        &config,
    );

    let day = vec![article("AAPL", "Apple beats on services revenue", "technology")];
    pipeline.run("2025-06-10", &day).await.unwrap();
    pipeline.run("2025-06-11", &day).await.unwrap();

    let threads = db.get_threads().unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].sentiment_arc.len(), 2);
    assert_eq!(threads[0].first_seen, "2025-06-10");
    assert_eq!(threads[0].last_seen, "2025-06-11");
    assert_eq!(threads[0].duration_days, 2);
}
