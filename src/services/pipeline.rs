use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::AppConfig;
use crate::db::database::Database;
use crate::models::analysis::{
    DailyAnalysis, MarketSentiment, Momentum, SentimentHistoryRecord, StrategistReport,
    TrendReport,
};
use crate::models::article::{EnrichedArticle, NewsArticle};
use crate::services::analyst::AnalystStage;
use crate::services::briefing::{fallback_briefing, BriefingGenerator};
use crate::services::narrative::{build_clusters, NarrativeTracker};
use crate::services::provider::{AnalysisProvider, GenerateOptions};
use crate::services::reader::ReaderStage;
use crate::services::strategist::StrategistStage;

/// Where a day's raw headlines come from. The HTTP surface passes them
/// in directly; scheduled ingestion would sit behind this same seam.
#[async_trait]
pub trait HeadlineSource: Send + Sync {
    async fn fetch(&self, date: &str) -> Result<Vec<NewsArticle>>;
}

pub struct StaticSource {
    articles: Vec<NewsArticle>,
}

impl StaticSource {
    pub fn new(articles: Vec<NewsArticle>) -> Self {
        Self { articles }
    }
}

#[async_trait]
impl HeadlineSource for StaticSource {
    async fn fetch(&self, _date: &str) -> Result<Vec<NewsArticle>> {
        Ok(self.articles.clone())
    }
}

/// Runs one full day of analysis and persists the results. Every stage
/// degrades instead of failing, so `run` only errs on invariant
/// breakage, never on model trouble.
pub struct IntelPipeline {
    db: Arc<Database>,
    reader: ReaderStage,
    analyst: AnalystStage,
    strategist: StrategistStage,
    briefing: BriefingGenerator,
    tracker: NarrativeTracker,
    window_days: u32,
}

impl IntelPipeline {
    pub fn new(db: Arc<Database>, provider: Arc<dyn AnalysisProvider>, config: &AppConfig) -> Self {
        let analysis_options = GenerateOptions {
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        };
        let briefing_options = GenerateOptions {
            temperature: config.llm.briefing_temperature,
            max_tokens: config.llm.max_tokens,
        };
        Self {
            db,
            reader: ReaderStage::new(
                Arc::clone(&provider),
                config.reader_batch_size,
                config.reader_batch_delay_ms,
                analysis_options,
            ),
            analyst: AnalystStage::new(Arc::clone(&provider), analysis_options),
            strategist: StrategistStage::new(Arc::clone(&provider), analysis_options),
            briefing: BriefingGenerator::new(provider, briefing_options),
            tracker: NarrativeTracker::new(config.narrative.clone()),
            window_days: config.narrative.window_days,
        }
    }

    pub async fn run(&self, date: &str, articles: &[NewsArticle]) -> Result<DailyAnalysis> {
        tracing::info!("running intel pipeline for {} ({} articles)", date, articles.len());

        let analysis = if articles.is_empty() {
            empty_day(date)
        } else {
            let briefing = self.briefing.generate(date, articles).await;
            let enriched = self.reader.enrich(articles).await;
            let trend_report = self.analyst.analyze(&enriched, &briefing).await;
            let strategist_report = self.strategist.strategize(&enriched, &trend_report).await;
            DailyAnalysis {
                date: date.to_string(),
                briefing,
                trend_report,
                strategist_report,
                enriched_articles: enriched,
                generated_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            }
        };

        self.persist(&analysis);
        Ok(analysis)
    }

    pub async fn run_from_source(&self, date: &str, source: &dyn HeadlineSource) -> Result<DailyAnalysis> {
        let articles = source.fetch(date).await?;
        self.run(date, &articles).await
    }

    /// All writes happen after the full run; a broken store degrades the
    /// day to compute-only.
    fn persist(&self, analysis: &DailyAnalysis) {
        if let Err(e) = self.db.save_daily_analysis(analysis) {
            tracing::warn!("could not persist daily analysis for {}: {}", analysis.date, e);
            return;
        }

        let history = derive_sentiment_history(analysis);
        if let Err(e) = self.db.save_sentiment_history(&history) {
            tracing::warn!("could not persist sentiment history for {}: {}", analysis.date, e);
        }

        let clusters = build_clusters(&analysis.date, &analysis.enriched_articles);
        if let Err(e) = self.db.save_clusters(&analysis.date, &clusters) {
            tracing::warn!("could not persist clusters for {}: {}", analysis.date, e);
        }

        if let Err(e) = self.refresh_narratives(&analysis.date) {
            tracing::warn!("narrative rollup failed for {}: {}", analysis.date, e);
        }
    }

    /// Replay the cluster window into the persisted thread set.
    fn refresh_narratives(&self, date: &str) -> Result<()> {
        let start = window_start(date, self.window_days)?;
        let clusters = self.db.get_clusters_since(&start)?;
        let threads = self.db.get_threads()?;
        let updated = self.tracker.track(threads, &clusters);
        self.db.upsert_threads(&updated)
    }
}

fn window_start(date: &str, window_days: u32) -> Result<String> {
    let day = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")?;
    Ok((day - chrono::Duration::days(window_days as i64 - 1))
        .format("%Y-%m-%d")
        .to_string())
}

/// The fixed shape for a day with no input. No model calls are made.
fn empty_day(date: &str) -> DailyAnalysis {
    let briefing = fallback_briefing(date, &[]);
    DailyAnalysis {
        date: date.to_string(),
        trend_report: TrendReport {
            trends: Vec::new(),
            cross_category_insights: briefing.clone(),
        },
        strategist_report: StrategistReport {
            opportunities: Vec::new(),
            risks: Vec::new(),
            market_sentiment: MarketSentiment {
                overall: 0.0,
                by_category: BTreeMap::new(),
            },
        },
        briefing,
        enriched_articles: Vec::new(),
        generated_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

/// One record per (date, category): mean sentiment, count, most frequent
/// entities, and the momentum of whichever trend covers the category.
pub fn derive_sentiment_history(analysis: &DailyAnalysis) -> Vec<SentimentHistoryRecord> {
    let mut by_category: BTreeMap<String, Vec<&EnrichedArticle>> = BTreeMap::new();
    for a in &analysis.enriched_articles {
        by_category.entry(a.article.category.clone()).or_default().push(a);
    }

    by_category
        .into_iter()
        .map(|(category, articles)| {
            let count = articles.len();
            let avg = articles.iter().map(|a| a.sentiment_score).sum::<f64>() / count as f64;

            let mut entity_counts: BTreeMap<&str, usize> = BTreeMap::new();
            for a in &articles {
                for e in &a.key_entities {
                    *entity_counts.entry(e.as_str()).or_default() += 1;
                }
            }
            let mut ranked: Vec<(&str, usize)> = entity_counts.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
            let top_topics = ranked.into_iter().take(5).map(|(e, _)| e.to_string()).collect();

            let trend_momentum = analysis
                .trend_report
                .trends
                .iter()
                .find(|t| t.sectors.iter().any(|s| s.eq_ignore_ascii_case(&category)))
                .map(|t| t.momentum)
                .unwrap_or(Momentum::Stable);

            SentimentHistoryRecord {
                date: analysis.date.clone(),
                category,
                avg_sentiment: avg,
                article_count: count as u32,
                top_topics,
                trend_momentum,
            }
        })
        .collect()
}
