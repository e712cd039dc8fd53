use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;

use crate::config::NarrativeConfig;
use crate::models::article::EnrichedArticle;
use crate::models::narrative::{ArticleCluster, Escalation, NarrativeThread, ThreadStatus};

/// Build one cluster per (date, category) from a day's enriched articles:
/// entity union, mean sentiment, topic from the category plus its most
/// frequent entities.
pub fn build_clusters(date: &str, articles: &[EnrichedArticle]) -> Vec<ArticleCluster> {
    let mut grouped: BTreeMap<String, Vec<&EnrichedArticle>> = BTreeMap::new();
    for a in articles {
        grouped.entry(a.article.category.clone()).or_default().push(a);
    }

    grouped
        .into_iter()
        .map(|(category, group)| {
            let avg_sentiment =
                group.iter().map(|a| a.sentiment_score).sum::<f64>() / group.len() as f64;

            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for a in &group {
                for e in &a.key_entities {
                    *counts.entry(e.as_str()).or_insert(0) += 1;
                }
            }
            let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

            let entities: Vec<String> = ranked.iter().map(|(e, _)| e.to_string()).collect();
            let top: Vec<&str> = ranked.iter().take(3).map(|(e, _)| *e).collect();
            let topic = if top.is_empty() {
                category.clone()
            } else {
                format!("{}: {}", category, top.join(", "))
            };

            ArticleCluster {
                // Natural key: re-running a date regenerates the same ids,
                // so thread rollups stay idempotent.
                id: format!("{}::{}", date, category),
                date: date.to_string(),
                category,
                topic,
                entities,
                avg_sentiment,
                article_count: group.len() as u32,
            }
        })
        .collect()
}

/// Narrative tracker: links clusters across days into persistent threads.
pub struct NarrativeTracker {
    config: NarrativeConfig,
}

impl NarrativeTracker {
    pub fn new(config: NarrativeConfig) -> Self {
        Self { config }
    }

    /// Roll the window of clusters into threads. Clusters must span the
    /// window ordered by date; the tracker replays them day by day so the
    /// inactivity rule sees every gap. Existing threads from previous
    /// rollups are carried forward.
    pub fn track(
        &self,
        mut threads: Vec<NarrativeThread>,
        clusters: &[ArticleCluster],
    ) -> Vec<NarrativeThread> {
        let mut by_date: BTreeMap<String, Vec<&ArticleCluster>> = BTreeMap::new();
        for c in clusters {
            by_date.entry(c.date.clone()).or_default().push(c);
        }

        for (date, day_clusters) in by_date {
            self.resolve_inactive(&mut threads, &date);

            for cluster in day_clusters {
                // A cluster absorbed by an earlier rollup updates its arc
                // point in place instead of appending a duplicate.
                if let Some((thread, pos)) = threads.iter_mut().find_map(|t| {
                    t.cluster_ids
                        .iter()
                        .position(|id| id == &cluster.id)
                        .map(move |pos| (t, pos))
                }) {
                    thread.sentiment_arc[pos] = cluster.avg_sentiment;
                    thread.escalation =
                        classify_escalation(&thread.sentiment_arc, self.config.slope_threshold);
                    continue;
                }
                match self.best_match(&threads, cluster) {
                    Some(idx) => self.absorb(&mut threads[idx], cluster),
                    None => threads.push(spawn_thread(cluster)),
                }
            }
        }

        sort_for_display(&mut threads);
        threads
    }

    /// Threads silent for the configured number of consecutive days become
    /// resolved and leave the matching pool; they stay in the output for
    /// history.
    fn resolve_inactive(&self, threads: &mut [NarrativeThread], today: &str) {
        let Some(today) = parse_date(today) else {
            return;
        };
        for t in threads.iter_mut() {
            if t.status != ThreadStatus::Active {
                continue;
            }
            if let Some(last) = parse_date(&t.last_seen) {
                let silent_days = (today - last).num_days();
                if silent_days > self.config.inactivity_days as i64 {
                    t.status = ThreadStatus::Resolved;
                }
            }
        }
    }

    /// Best active same-category thread by similarity, if above threshold.
    fn best_match(&self, threads: &[NarrativeThread], cluster: &ArticleCluster) -> Option<usize> {
        threads
            .iter()
            .enumerate()
            .filter(|(_, t)| t.status == ThreadStatus::Active && t.category == cluster.category)
            .map(|(i, t)| (i, similarity(t, cluster)))
            .filter(|(_, score)| *score >= self.config.match_threshold)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
    }

    fn absorb(&self, thread: &mut NarrativeThread, cluster: &ArticleCluster) {
        thread.cluster_ids.push(cluster.id.clone());
        thread.sentiment_arc.push(cluster.avg_sentiment);
        thread.last_seen = cluster.date.clone();
        thread.duration_days = duration_days(&thread.first_seen, &thread.last_seen);
        for e in &cluster.entities {
            if !thread.entities.contains(e) {
                thread.entities.push(e.clone());
            }
        }
        thread.escalation = classify_escalation(&thread.sentiment_arc, self.config.slope_threshold);
    }
}

/// Display order everywhere threads surface: active first, most recently
/// seen first within each status.
pub fn sort_for_display(threads: &mut [NarrativeThread]) {
    threads.sort_by(|a, b| {
        let status = |t: &NarrativeThread| match t.status {
            ThreadStatus::Active => 0,
            ThreadStatus::Resolved => 1,
        };
        status(a)
            .cmp(&status(b))
            .then(b.last_seen.cmp(&a.last_seen))
    });
}

fn spawn_thread(cluster: &ArticleCluster) -> NarrativeThread {
    NarrativeThread {
        id: uuid::Uuid::new_v4().to_string(),
        title: cluster.topic.clone(),
        category: cluster.category.clone(),
        first_seen: cluster.date.clone(),
        last_seen: cluster.date.clone(),
        duration_days: 1,
        cluster_ids: vec![cluster.id.clone()],
        sentiment_arc: vec![cluster.avg_sentiment],
        entities: cluster.entities.clone(),
        escalation: Escalation::Stable,
        status: ThreadStatus::Active,
    }
}

/// Entity Jaccard overlap, plus a keyword bonus when the cluster topic and
/// thread title share a token longer than 3 chars.
fn similarity(thread: &NarrativeThread, cluster: &ArticleCluster) -> f64 {
    let a: HashSet<&str> = thread.entities.iter().map(|s| s.as_str()).collect();
    let b: HashSet<&str> = cluster.entities.iter().map(|s| s.as_str()).collect();

    let jaccard = if a.is_empty() && b.is_empty() {
        0.0
    } else {
        let inter = a.intersection(&b).count() as f64;
        let union = a.union(&b).count() as f64;
        inter / union
    };

    let title_tokens: HashSet<String> = tokenize(&thread.title);
    let topic_tokens: HashSet<String> = tokenize(&cluster.topic);
    let keyword_bonus = if title_tokens.intersection(&topic_tokens).next().is_some() {
        0.25
    } else {
        0.0
    };

    jaccard + keyword_bonus
}

fn tokenize(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .map(|w| w.to_lowercase())
        .collect()
}

/// Least-squares slope over the last 3 arc points; rising/declining only
/// when the slope clears the threshold.
pub fn classify_escalation(arc: &[f64], slope_threshold: f64) -> Escalation {
    if arc.len() < 3 {
        return Escalation::Stable;
    }
    let tail = &arc[arc.len() - 3..];
    let slope = least_squares_slope(tail);
    if slope > slope_threshold {
        Escalation::Rising
    } else if slope < -slope_threshold {
        Escalation::Declining
    } else {
        Escalation::Stable
    }
}

fn least_squares_slope(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn duration_days(first: &str, last: &str) -> u32 {
    match (parse_date(first), parse_date(last)) {
        (Some(f), Some(l)) => ((l - f).num_days() + 1).max(1) as u32,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::article::{NewsArticle, TrendDirection};

    fn cluster(date: &str, category: &str, entities: &[&str], sentiment: f64) -> ArticleCluster {
        ArticleCluster {
            id: uuid::Uuid::new_v4().to_string(),
            date: date.into(),
            category: category.into(),
            topic: format!("{}: {}", category, entities.join(", ")),
            entities: entities.iter().map(|s| s.to_string()).collect(),
            avg_sentiment: sentiment,
            article_count: 2,
        }
    }

    fn tracker() -> NarrativeTracker {
        NarrativeTracker::new(NarrativeConfig::default())
    }

    #[test]
    fn clusters_group_by_category_with_entity_union() {
        let mk = |category: &str, entities: Vec<&str>, s: f64| EnrichedArticle {
            article: NewsArticle {
                ticker: "X".into(),
                headline: "h".into(),
                url: String::new(),
                source: "s".into(),
                category: category.into(),
            },
            sentiment_score: s,
            impact_score: 50.0,
            key_entities: entities.into_iter().map(String::from).collect(),
            trend_direction: TrendDirection::Neutral,
        };
        let articles = vec![
            mk("tech", vec!["OpenAI", "Nvidia"], 0.6),
            mk("tech", vec!["Nvidia"], 0.2),
            mk("energy", vec!["OPEC"], -0.3),
        ];
        let clusters = build_clusters("2025-06-02", &articles);
        assert_eq!(clusters.len(), 2);
        let tech = clusters.iter().find(|c| c.category == "tech").unwrap();
        assert!((tech.avg_sentiment - 0.4).abs() < 1e-12);
        assert!(tech.entities.contains(&"Nvidia".to_string()));
        assert!(tech.entities.contains(&"OpenAI".to_string()));
        assert_eq!(tech.article_count, 2);
    }

    #[test]
    fn matching_cluster_extends_thread() {
        let t = tracker();
        let threads = t.track(
            Vec::new(),
            &[cluster("2025-06-02", "tech", &["Nvidia", "OpenAI"], 0.5)],
        );
        assert_eq!(threads.len(), 1);

        let threads = t.track(
            threads,
            &[cluster("2025-06-03", "tech", &["Nvidia", "AMD"], 0.2)],
        );
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].sentiment_arc, vec![0.5, 0.2]);
        assert_eq!(threads[0].duration_days, 2);
        assert_eq!(threads[0].last_seen, "2025-06-03");
    }

    #[test]
    fn unrelated_cluster_spawns_new_thread() {
        let t = tracker();
        let threads = t.track(
            Vec::new(),
            &[cluster("2025-06-02", "tech", &["Nvidia"], 0.5)],
        );
        let threads = t.track(
            threads,
            &[cluster("2025-06-03", "energy", &["OPEC"], -0.1)],
        );
        assert_eq!(threads.len(), 2);
    }

    #[test]
    fn silent_thread_resolves_and_is_excluded_from_matching() {
        let t = tracker();
        let threads = t.track(
            Vec::new(),
            &[cluster("2025-06-02", "tech", &["Nvidia"], 0.5)],
        );

        // Same entities four days later: past the 3-day inactivity window,
        // so the old thread resolves and the cluster spawns a fresh one.
        let threads = t.track(
            threads,
            &[cluster("2025-06-06", "tech", &["Nvidia"], 0.1)],
        );
        assert_eq!(threads.len(), 2);
        let active: Vec<_> = threads
            .iter()
            .filter(|t| t.status == ThreadStatus::Active)
            .collect();
        let resolved: Vec<_> = threads
            .iter()
            .filter(|t| t.status == ThreadStatus::Resolved)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].sentiment_arc.len(), 1);
        // Active threads sort first.
        assert_eq!(threads[0].status, ThreadStatus::Active);
    }

    #[test]
    fn escalation_needs_three_points_and_significant_slope() {
        assert_eq!(classify_escalation(&[0.1, 0.5], 0.08), Escalation::Stable);
        assert_eq!(
            classify_escalation(&[-0.2, 0.1, 0.4], 0.08),
            Escalation::Rising
        );
        assert_eq!(
            classify_escalation(&[0.4, 0.1, -0.2], 0.08),
            Escalation::Declining
        );
        assert_eq!(
            classify_escalation(&[0.1, 0.12, 0.11], 0.08),
            Escalation::Stable
        );
        // Only the trailing 3 points count.
        assert_eq!(
            classify_escalation(&[-0.9, -0.9, -0.2, 0.1, 0.4], 0.08),
            Escalation::Rising
        );
    }

    #[test]
    fn duplicate_cluster_ids_are_not_absorbed_twice() {
        let t = tracker();
        let c = cluster("2025-06-02", "tech", &["Nvidia"], 0.5);
        let threads = t.track(Vec::new(), std::slice::from_ref(&c));
        let threads = t.track(threads, std::slice::from_ref(&c));
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].sentiment_arc.len(), 1);
    }

    #[test]
    fn rebuilt_clusters_for_a_date_update_the_arc_in_place() {
        let mk = |sentiment: f64| EnrichedArticle {
            article: NewsArticle {
                ticker: "NVDA".into(),
                headline: "h".into(),
                url: String::new(),
                source: "s".into(),
                category: "tech".into(),
            },
            sentiment_score: sentiment,
            impact_score: 50.0,
            key_entities: vec!["Nvidia".into()],
            trend_direction: TrendDirection::Neutral,
        };

        // Rebuilding a date's clusters must produce the same ids, so a
        // rerun replaces the day's arc point instead of appending.
        let first = build_clusters("2025-06-02", &[mk(0.5)]);
        let second = build_clusters("2025-06-02", &[mk(-0.3)]);
        assert_eq!(first[0].id, second[0].id);

        let t = tracker();
        let threads = t.track(Vec::new(), &first);
        let threads = t.track(threads, &second);
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].sentiment_arc, vec![-0.3]);
        assert_eq!(threads[0].duration_days, 1);
    }

    #[test]
    fn display_order_is_active_first_then_most_recent() {
        let t = tracker();
        let mut threads = t.track(
            Vec::new(),
            &[
                cluster("2025-06-02", "tech", &["Nvidia"], 0.5),
                cluster("2025-06-03", "energy", &["OPEC"], -0.1),
            ],
        );
        // Resolve the most recently seen thread; the older active one
        // must still sort first.
        threads[0].status = ThreadStatus::Resolved;
        sort_for_display(&mut threads);
        assert_eq!(threads[0].status, ThreadStatus::Active);
        assert_eq!(threads[0].last_seen, "2025-06-02");
        assert_eq!(threads[1].status, ThreadStatus::Resolved);
    }
}
