use anyhow::Result;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::models::analysis::{
    DailyAnalysis, Momentum, SentimentHistoryRecord, StrategistReport, TrendReport,
};
use crate::models::article::{EnrichedArticle, NewsArticle, TrendDirection};
use crate::models::narrative::{ArticleCluster, NarrativeThread};
use crate::models::validation::{Grade, WeeklyReport};

pub struct Database {
    conn: Mutex<Connection>,
}

/// "Table not yet provisioned" is a distinct, non-fatal condition: reads
/// return empty history, writes are skipped by the caller with a warning.
fn is_missing_table(e: &anyhow::Error) -> bool {
    e.to_string().contains("no such table")
}

impl Database {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let db_path = data_dir.join("market_intel.db");
        let conn = Connection::open(db_path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Raw SQL escape hatch for tests that need to break the schema.
    #[cfg(test)]
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// In-memory database for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS daily_analysis (
                date TEXT PRIMARY KEY,
                briefing TEXT NOT NULL,
                trend_report TEXT NOT NULL,
                strategist_report TEXT NOT NULL,
                generated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS enriched_articles (
                date TEXT NOT NULL,
                article_key TEXT NOT NULL,
                ticker TEXT NOT NULL,
                headline TEXT NOT NULL,
                url TEXT NOT NULL,
                source TEXT NOT NULL,
                category TEXT NOT NULL,
                sentiment_score REAL NOT NULL,
                impact_score REAL NOT NULL,
                key_entities TEXT NOT NULL,
                trend_direction TEXT NOT NULL,
                PRIMARY KEY (date, article_key)
            );

            CREATE INDEX IF NOT EXISTS idx_enriched_date ON enriched_articles(date);

            CREATE TABLE IF NOT EXISTS sentiment_history (
                date TEXT NOT NULL,
                category TEXT NOT NULL,
                avg_sentiment REAL NOT NULL,
                article_count INTEGER NOT NULL,
                top_topics TEXT NOT NULL,
                trend_momentum TEXT NOT NULL,
                PRIMARY KEY (date, category)
            );

            CREATE INDEX IF NOT EXISTS idx_sentiment_date ON sentiment_history(date);

            CREATE TABLE IF NOT EXISTS article_clusters (
                id TEXT PRIMARY KEY,
                date TEXT NOT NULL,
                category TEXT NOT NULL,
                topic TEXT NOT NULL,
                entities TEXT NOT NULL,
                avg_sentiment REAL NOT NULL,
                article_count INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_clusters_date ON article_clusters(date);

            CREATE TABLE IF NOT EXISTS narrative_threads (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                category TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                duration_days INTEGER NOT NULL,
                cluster_ids TEXT NOT NULL,
                sentiment_arc TEXT NOT NULL,
                entities TEXT NOT NULL,
                escalation TEXT NOT NULL,
                status TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_threads_status ON narrative_threads(status);

            CREATE TABLE IF NOT EXISTS weekly_reports (
                week_start TEXT PRIMARY KEY,
                week_end TEXT NOT NULL,
                direction_accuracy REAL NOT NULL,
                pearson_r REAL,
                spearman_r REAL,
                sample_size INTEGER NOT NULL,
                avg_sentiment REAL NOT NULL,
                avg_return REAL NOT NULL,
                grade TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(())
    }

    // ====== Daily analysis ======

    /// Upsert by date; replaces the article rows for that date in the same
    /// transaction, so a re-run leaves at most one record set per day.
    pub fn save_daily_analysis(&self, analysis: &DailyAnalysis) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO daily_analysis (date, briefing, trend_report, strategist_report, generated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                analysis.date,
                analysis.briefing,
                serde_json::to_string(&analysis.trend_report)?,
                serde_json::to_string(&analysis.strategist_report)?,
                analysis.generated_at,
            ],
        )?;
        tx.execute(
            "DELETE FROM enriched_articles WHERE date = ?1",
            rusqlite::params![analysis.date],
        )?;
        for e in &analysis.enriched_articles {
            tx.execute(
                "INSERT OR REPLACE INTO enriched_articles (date, article_key, ticker, headline, url, source, category, sentiment_score, impact_score, key_entities, trend_direction) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    analysis.date,
                    e.article.article_key(),
                    e.article.ticker,
                    e.article.headline,
                    e.article.url,
                    e.article.source,
                    e.article.category,
                    e.sentiment_score,
                    e.impact_score,
                    serde_json::to_string(&e.key_entities)?,
                    e.trend_direction.as_str(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_daily_analysis(&self, date: &str) -> Result<Option<DailyAnalysis>> {
        match self.query_daily_analysis(Some(date)) {
            Err(e) if is_missing_table(&e) => {
                tracing::warn!("daily_analysis table missing, returning empty");
                Ok(None)
            }
            other => other,
        }
    }

    pub fn get_latest_daily_analysis(&self) -> Result<Option<DailyAnalysis>> {
        match self.query_daily_analysis(None) {
            Err(e) if is_missing_table(&e) => Ok(None),
            other => other,
        }
    }

    fn query_daily_analysis(&self, date: Option<&str>) -> Result<Option<DailyAnalysis>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String, String, String, String)> = {
            let result = match date {
                Some(d) => conn.query_row(
                    "SELECT date, briefing, trend_report, strategist_report, generated_at FROM daily_analysis WHERE date = ?1",
                    rusqlite::params![d],
                    |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                    },
                ),
                None => conn.query_row(
                    "SELECT date, briefing, trend_report, strategist_report, generated_at FROM daily_analysis ORDER BY date DESC LIMIT 1",
                    [],
                    |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                    },
                ),
            };
            match result {
                Ok(r) => Some(r),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            }
        };

        let Some((date, briefing, trend_json, strategist_json, generated_at)) = row else {
            return Ok(None);
        };

        let trend_report: TrendReport = serde_json::from_str(&trend_json)?;
        let strategist_report: StrategistReport = serde_json::from_str(&strategist_json)?;

        let mut stmt = conn.prepare(
            "SELECT ticker, headline, url, source, category, sentiment_score, impact_score, key_entities, trend_direction FROM enriched_articles WHERE date = ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![date], |row| {
            let entities_json: String = row.get(7)?;
            let trend: String = row.get(8)?;
            Ok(EnrichedArticle {
                article: NewsArticle {
                    ticker: row.get(0)?,
                    headline: row.get(1)?,
                    url: row.get(2)?,
                    source: row.get(3)?,
                    category: row.get(4)?,
                },
                sentiment_score: row.get(5)?,
                impact_score: row.get(6)?,
                key_entities: serde_json::from_str(&entities_json).unwrap_or_default(),
                trend_direction: TrendDirection::parse(&trend),
            })
        })?;
        let mut enriched_articles = Vec::new();
        for row in rows {
            enriched_articles.push(row?);
        }

        Ok(Some(DailyAnalysis {
            date,
            briefing,
            trend_report,
            strategist_report,
            enriched_articles,
            generated_at,
        }))
    }

    // ====== Sentiment history ======

    pub fn save_sentiment_history(&self, records: &[SentimentHistoryRecord]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        for r in records {
            tx.execute(
                "INSERT OR REPLACE INTO sentiment_history (date, category, avg_sentiment, article_count, top_topics, trend_momentum) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    r.date,
                    r.category,
                    r.avg_sentiment,
                    r.article_count,
                    serde_json::to_string(&r.top_topics)?,
                    r.trend_momentum.as_str(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_sentiment_history_range(
        &self,
        start: &str,
        end: &str,
    ) -> Result<Vec<SentimentHistoryRecord>> {
        let result = (|| -> Result<Vec<SentimentHistoryRecord>> {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT date, category, avg_sentiment, article_count, top_topics, trend_momentum FROM sentiment_history WHERE date >= ?1 AND date <= ?2 ORDER BY date ASC, category ASC",
            )?;
            let rows = stmt.query_map(rusqlite::params![start, end], |row| {
                let topics_json: String = row.get(4)?;
                let momentum: String = row.get(5)?;
                Ok(SentimentHistoryRecord {
                    date: row.get(0)?,
                    category: row.get(1)?,
                    avg_sentiment: row.get(2)?,
                    article_count: row.get(3)?,
                    top_topics: serde_json::from_str(&topics_json).unwrap_or_default(),
                    trend_momentum: Momentum::parse(&momentum),
                })
            })?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })();

        match result {
            Err(e) if is_missing_table(&e) => {
                tracing::warn!("sentiment_history table missing, returning empty");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    // ====== Article clusters ======

    /// Replaces the cluster set for the given date.
    pub fn save_clusters(&self, date: &str, clusters: &[ArticleCluster]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM article_clusters WHERE date = ?1",
            rusqlite::params![date],
        )?;
        for c in clusters {
            tx.execute(
                "INSERT OR REPLACE INTO article_clusters (id, date, category, topic, entities, avg_sentiment, article_count) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    c.id,
                    c.date,
                    c.category,
                    c.topic,
                    serde_json::to_string(&c.entities)?,
                    c.avg_sentiment,
                    c.article_count,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_clusters_since(&self, start: &str) -> Result<Vec<ArticleCluster>> {
        let result = (|| -> Result<Vec<ArticleCluster>> {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, date, category, topic, entities, avg_sentiment, article_count FROM article_clusters WHERE date >= ?1 ORDER BY date ASC",
            )?;
            let rows = stmt.query_map(rusqlite::params![start], |row| {
                let entities_json: String = row.get(4)?;
                Ok(ArticleCluster {
                    id: row.get(0)?,
                    date: row.get(1)?,
                    category: row.get(2)?,
                    topic: row.get(3)?,
                    entities: serde_json::from_str(&entities_json).unwrap_or_default(),
                    avg_sentiment: row.get(5)?,
                    article_count: row.get(6)?,
                })
            })?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })();

        match result {
            Err(e) if is_missing_table(&e) => Ok(Vec::new()),
            other => other,
        }
    }

    // ====== Narrative threads ======

    pub fn upsert_threads(&self, threads: &[NarrativeThread]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        for t in threads {
            tx.execute(
                "INSERT OR REPLACE INTO narrative_threads (id, title, category, first_seen, last_seen, duration_days, cluster_ids, sentiment_arc, entities, escalation, status) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    t.id,
                    t.title,
                    t.category,
                    t.first_seen,
                    t.last_seen,
                    t.duration_days,
                    serde_json::to_string(&t.cluster_ids)?,
                    serde_json::to_string(&t.sentiment_arc)?,
                    serde_json::to_string(&t.entities)?,
                    t.escalation.as_str(),
                    t.status.as_str(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_threads(&self) -> Result<Vec<NarrativeThread>> {
        let result = (|| -> Result<Vec<NarrativeThread>> {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, title, category, first_seen, last_seen, duration_days, cluster_ids, sentiment_arc, entities, escalation, status FROM narrative_threads",
            )?;
            let rows = stmt.query_map([], |row| {
                let cluster_ids: String = row.get(6)?;
                let arc: String = row.get(7)?;
                let entities: String = row.get(8)?;
                let escalation: String = row.get(9)?;
                let status: String = row.get(10)?;
                Ok(NarrativeThread {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    category: row.get(2)?,
                    first_seen: row.get(3)?,
                    last_seen: row.get(4)?,
                    duration_days: row.get(5)?,
                    cluster_ids: serde_json::from_str(&cluster_ids).unwrap_or_default(),
                    sentiment_arc: serde_json::from_str(&arc).unwrap_or_default(),
                    entities: serde_json::from_str(&entities).unwrap_or_default(),
                    escalation: crate::models::narrative::Escalation::parse(&escalation),
                    status: crate::models::narrative::ThreadStatus::parse(&status),
                })
            })?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })();

        match result {
            Err(e) if is_missing_table(&e) => Ok(Vec::new()),
            other => other,
        }
    }

    // ====== Weekly reports ======

    /// Upsert keyed by week start: idempotent per week, not per call.
    pub fn save_weekly_report(&self, report: &WeeklyReport) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO weekly_reports (week_start, week_end, direction_accuracy, pearson_r, spearman_r, sample_size, avg_sentiment, avg_return, grade, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))",
            rusqlite::params![
                report.week_start,
                report.week_end,
                report.direction_accuracy,
                report.pearson_r,
                report.spearman_r,
                report.sample_size,
                report.avg_sentiment,
                report.avg_return,
                report.grade.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_weekly_reports(&self) -> Result<Vec<WeeklyReport>> {
        let result = (|| -> Result<Vec<WeeklyReport>> {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT week_start, week_end, direction_accuracy, pearson_r, spearman_r, sample_size, avg_sentiment, avg_return, grade FROM weekly_reports ORDER BY week_start DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                let grade: String = row.get(8)?;
                Ok(WeeklyReport {
                    week_start: row.get(0)?,
                    week_end: row.get(1)?,
                    direction_accuracy: row.get(2)?,
                    pearson_r: row.get(3)?,
                    spearman_r: row.get(4)?,
                    sample_size: row.get(5)?,
                    avg_sentiment: row.get(6)?,
                    avg_return: row.get(7)?,
                    grade: Grade::parse(&grade),
                })
            })?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })();

        match result {
            Err(e) if is_missing_table(&e) => Ok(Vec::new()),
            other => other,
        }
    }
}
