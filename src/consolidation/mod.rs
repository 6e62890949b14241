//! Consolidation Engine
//!
//! Runs during the dream phase over a batch of recent activity:
//! 1. **Extract**: up to 3 candidate patterns (generated, or a keyword heuristic)
//! 2. **Merge**: strengthen a similar existing pattern or insert a new one
//! 3. **Synthesize**: at most one insight per batch
//! 4. **Prune**: drop weak patterns that have not been refreshed for a week
//!
//! Extraction and synthesis share one generation request so a dream costs a
//! single external call. The engine keeps the pattern store in memory; the
//! scheduler persists whatever [`ConsolidationReport`] says changed.

mod patterns;
mod similarity;

pub use patterns::{ConsolidatedInsight, MemoryPattern};
pub use similarity::{tokens, PatternSimilarity, TokenOverlap};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::activity::ActivityRecord;
use crate::llm::{self, GenerationRequest, Generated, TextGenerator};

/// Words too common to count as a theme
const STOPWORDS: &[&str] = &[
    "about", "after", "again", "also", "been", "being", "between", "could", "does", "each",
    "from", "have", "into", "just", "like", "more", "most", "much", "only", "other", "over",
    "same", "should", "some", "such", "than", "that", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "very", "what", "when", "where", "which",
    "while", "will", "with", "would", "your",
];

/// Configuration for consolidation
#[derive(Debug, Clone)]
pub struct ConsolidationConfig {
    /// Minimum batch size for pattern extraction
    pub min_records_for_patterns: usize,
    /// Minimum batch size for insight synthesis
    pub min_records_for_insight: usize,
    /// Candidate patterns per batch
    pub max_patterns_per_batch: usize,
    /// Records included in the generation prompt
    pub prompt_records: usize,
    /// Strength of a newly inserted pattern
    pub new_pattern_strength: f64,
    /// Strength added when a pattern is seen again
    pub strengthen_step: f64,
    /// Patterns weaker than this are prune candidates
    pub prune_below_strength: f64,
    /// Prune candidates must be older than this many day units
    pub prune_after_days: u32,
    /// Length of one "day" for pruning
    pub day_unit: Duration,
    /// Timeout for the generation call
    pub llm_timeout: Duration,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            min_records_for_patterns: 2,
            min_records_for_insight: 3,
            max_patterns_per_batch: 3,
            prompt_records: 10,
            new_pattern_strength: 0.5,
            strengthen_step: 0.1,
            prune_below_strength: 0.2,
            prune_after_days: 7,
            day_unit: Duration::from_secs(86400),
            llm_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of one consolidation pass
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    pub records_considered: usize,
    /// Candidate patterns extracted from the batch
    pub patterns_found: usize,
    pub patterns_created: usize,
    pub patterns_strengthened: usize,
    pub insight: Option<ConsolidatedInsight>,
    /// Ids of pruned patterns
    pub pruned: Vec<String>,
    /// Created or strengthened patterns, post-merge
    pub changed: Vec<MemoryPattern>,
    /// Generation failed and heuristics were used
    pub degraded: bool,
}

impl ConsolidationReport {
    pub fn insight_generated(&self) -> bool {
        self.insight.is_some()
    }

    pub fn patterns_pruned(&self) -> usize {
        self.pruned.len()
    }
}

/// Consolidation statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidationStats {
    pub sessions: u64,
    pub insights_generated: u64,
    pub total_patterns: usize,
    pub strong_patterns: usize,
}

/// A candidate before merging
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    description: String,
    related: Vec<String>,
}

/// Consolidation engine
pub struct ConsolidationEngine {
    config: ConsolidationConfig,
    generator: Arc<dyn TextGenerator>,
    similarity: Box<dyn PatternSimilarity>,
    patterns: Vec<MemoryPattern>,
    sessions: u64,
    insights_generated: u64,
}

impl ConsolidationEngine {
    /// Create with the default token-overlap similarity
    pub fn new(config: ConsolidationConfig, generator: Arc<dyn TextGenerator>) -> Self {
        Self::with_similarity(config, generator, Box::new(TokenOverlap::default()))
    }

    /// Create with a custom similarity scorer
    pub fn with_similarity(
        config: ConsolidationConfig,
        generator: Arc<dyn TextGenerator>,
        similarity: Box<dyn PatternSimilarity>,
    ) -> Self {
        Self {
            config,
            generator,
            similarity,
            patterns: Vec::new(),
            sessions: 0,
            insights_generated: 0,
        }
    }

    /// Restore the pattern store
    pub fn load(&mut self, patterns: Vec<MemoryPattern>) {
        info!("Loaded {} memory patterns", patterns.len());
        self.patterns = patterns;
    }

    pub fn patterns(&self) -> &[MemoryPattern] {
        &self.patterns
    }

    /// Patterns at or above `min_strength`
    pub fn active_patterns(&self, min_strength: f64) -> Vec<&MemoryPattern> {
        self.patterns
            .iter()
            .filter(|p| p.strength >= min_strength)
            .collect()
    }

    /// Consolidate a batch of recent activity (most recent first)
    pub async fn consolidate(&mut self, batch: &[ActivityRecord], now: DateTime<Utc>) -> ConsolidationReport {
        let mut report = ConsolidationReport {
            records_considered: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return report;
        }

        let wants_patterns = batch.len() >= self.config.min_records_for_patterns;
        let wants_insight = batch.len() >= self.config.min_records_for_insight;

        let generated = if wants_patterns {
            Some(self.request_consolidation(batch, wants_insight).await)
        } else {
            None
        };
        let usable = generated.as_ref().filter(|g| !g.degraded).map(|g| g.text.as_str());
        report.degraded = generated.as_ref().is_some_and(|g| g.degraded);

        if wants_patterns {
            let mut candidates = usable
                .map(|text| parse_patterns(text, self.config.max_patterns_per_batch))
                .unwrap_or_default();
            if candidates.is_empty() {
                candidates = heuristic_patterns(batch, self.config.max_patterns_per_batch);
            }
            report.patterns_found = candidates.len();

            let mut changed_ids: Vec<String> = Vec::new();
            for candidate in candidates {
                let (id, created) = self.merge(candidate, now);
                if created {
                    report.patterns_created += 1;
                } else {
                    report.patterns_strengthened += 1;
                }
                if !changed_ids.contains(&id) {
                    changed_ids.push(id);
                }
            }
            report.changed = self
                .patterns
                .iter()
                .filter(|p| changed_ids.contains(&p.id))
                .cloned()
                .collect();
        }

        if wants_insight {
            let insight = usable
                .and_then(|text| parse_insight(text, batch, now))
                .unwrap_or_else(|| heuristic_insight(batch, now));
            self.insights_generated += 1;
            report.insight = Some(insight);
        }

        report.pruned = self.prune(now);
        self.sessions += 1;

        info!(
            "Consolidated {} records: {} patterns found, insight: {}, {} pruned",
            batch.len(),
            report.patterns_found,
            report.insight_generated(),
            report.pruned.len()
        );
        report
    }

    /// Merge one candidate into the store. Returns (pattern id, created).
    fn merge(&mut self, candidate: Candidate, now: DateTime<Utc>) -> (String, bool) {
        let best = self
            .patterns
            .iter()
            .enumerate()
            .map(|(i, p)| (i, self.similarity.score(&candidate.description, &p.description)))
            .filter(|(_, score)| self.similarity.is_match(*score))
            .fold(None::<(usize, f64)>, |best, (i, score)| match best {
                Some((_, b)) if b >= score => best,
                _ => Some((i, score)),
            });

        match best {
            Some((i, _)) => {
                let pattern = &mut self.patterns[i];
                pattern.strengthen(self.config.strengthen_step, now);
                for concept in candidate.related {
                    if !pattern.related_concepts.contains(&concept) {
                        pattern.related_concepts.push(concept);
                    }
                }
                debug!("Strengthened pattern '{}' to {:.2}", pattern.description, pattern.strength);
                (pattern.id.clone(), false)
            }
            None => {
                let mut pattern =
                    MemoryPattern::new(&candidate.description, self.config.new_pattern_strength, now);
                pattern.related_concepts = candidate.related;
                debug!("New pattern '{}'", pattern.description);
                let id = pattern.id.clone();
                self.patterns.push(pattern);
                (id, true)
            }
        }
    }

    /// Remove weak, stale patterns. Returns their ids.
    pub fn prune(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let max_age = chrono::Duration::from_std(self.config.day_unit * self.config.prune_after_days)
            .unwrap_or_else(|_| chrono::Duration::days(self.config.prune_after_days as i64));
        let min_strength = self.config.prune_below_strength;

        let mut pruned = Vec::new();
        self.patterns.retain(|p| {
            if p.is_stale(min_strength, max_age, now) {
                pruned.push(p.id.clone());
                false
            } else {
                true
            }
        });

        if !pruned.is_empty() {
            info!("Pruned {} weak patterns", pruned.len());
        }
        pruned
    }

    /// Single generation call covering patterns and (optionally) an insight
    async fn request_consolidation(&self, batch: &[ActivityRecord], with_insight: bool) -> Generated {
        let summary = batch
            .iter()
            .filter(|r| r.content != llm::PLACEHOLDER)
            .take(self.config.prompt_records)
            .map(|r| format!("- [{}] {}", r.category, r.content))
            .collect::<Vec<_>>()
            .join("\n");

        let mut prompt = format!(
            "You are consolidating recent cognitive activity during a dream phase.\n\n\
            Recent activity:\n{}\n\n\
            Identify recurring themes or regularities. List 1-{} patterns, one per line:\n\
            PATTERN: [brief description]\n",
            summary, self.config.max_patterns_per_batch
        );
        if with_insight {
            prompt.push_str(
                "\nThen state the single most useful insight:\n\
                INSIGHT: [the core insight]\n\
                CATEGORY: [pattern/principle/strategy/observation]\n\
                APPLICATIONS: [how to apply it, comma-separated]\n",
            );
        }
        prompt.push_str("\nYour consolidation:");

        let request = GenerationRequest::new(prompt, 0.6, 400);
        llm::generate_or_placeholder(self.generator.as_ref(), &request, self.config.llm_timeout).await
    }

    /// Consolidation statistics
    pub fn stats(&self) -> ConsolidationStats {
        ConsolidationStats {
            sessions: self.sessions,
            insights_generated: self.insights_generated,
            total_patterns: self.patterns.len(),
            strong_patterns: self.patterns.iter().filter(|p| p.strength > 0.7).count(),
        }
    }
}

/// `PATTERN:` lines from generated text
fn parse_patterns(text: &str, max: usize) -> Vec<Candidate> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim().trim_start_matches(['-', '*']).trim();
            let rest = line
                .strip_prefix("PATTERN:")
                .or_else(|| line.strip_prefix("Pattern:"))?;
            let description = rest.trim();
            (!description.is_empty()).then(|| Candidate {
                description: description.to_string(),
                related: vec![],
            })
        })
        .take(max)
        .collect()
}

/// Insight fields from generated text
fn parse_insight(text: &str, batch: &[ActivityRecord], now: DateTime<Utc>) -> Option<ConsolidatedInsight> {
    let insight = llm::extract_field(text, "INSIGHT")?;
    let category = llm::extract_field(text, "CATEGORY")
        .unwrap_or_else(|| "observation".to_string())
        .to_lowercase();

    Some(ConsolidatedInsight {
        timestamp: now,
        insight,
        source_excerpts: excerpts(batch),
        confidence: 0.7,
        category,
        applications: llm::extract_list_field(text, "APPLICATIONS"),
    })
}

fn excerpts(batch: &[ActivityRecord]) -> Vec<String> {
    batch.iter().take(5).map(|r| r.excerpt(50)).collect()
}

/// Tokens appearing in at least two records, most widespread first
fn recurring_tokens(batch: &[ActivityRecord]) -> Vec<String> {
    let mut frequency: HashMap<String, usize> = HashMap::new();
    for record in batch.iter().filter(|r| r.content != llm::PLACEHOLDER) {
        for token in tokens(&record.content) {
            if token.chars().count() >= 4
                && !STOPWORDS.contains(&token.as_str())
                && !token.chars().all(|c| c.is_numeric())
            {
                *frequency.entry(token).or_default() += 1;
            }
        }
    }

    let mut recurring: Vec<(String, usize)> =
        frequency.into_iter().filter(|(_, count)| *count >= 2).collect();
    recurring.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    recurring.into_iter().map(|(token, _)| token).collect()
}

/// Fallback extraction: group recurring tokens into themes of up to three words
fn heuristic_patterns(batch: &[ActivityRecord], max: usize) -> Vec<Candidate> {
    recurring_tokens(batch)
        .chunks(3)
        .filter(|chunk| chunk.len() >= 2)
        .take(max)
        .map(|chunk| Candidate {
            description: chunk.join(" "),
            related: chunk.to_vec(),
        })
        .collect()
}

/// Fallback synthesis: low-confidence observation about the dominant themes
fn heuristic_insight(batch: &[ActivityRecord], now: DateTime<Utc>) -> ConsolidatedInsight {
    let themes: Vec<String> = recurring_tokens(batch).into_iter().take(3).collect();
    let insight = if themes.is_empty() {
        format!("Consolidated {} recent activities without a dominant theme", batch.len())
    } else {
        format!("Recent activity keeps returning to: {}", themes.join(", "))
    };

    ConsolidatedInsight {
        timestamp: now,
        insight,
        source_excerpts: excerpts(batch),
        confidence: 0.4,
        category: "observation".to_string(),
        applications: vec![],
    }
}
