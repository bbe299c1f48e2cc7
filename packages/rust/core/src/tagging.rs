//! Relevance tagging: LLM classification with a keyword-rule fallback.
//!
//! Each record's narrative text is condensed into a corpus and labelled
//! High, Medium or Low against the user's technology keywords. LLM calls
//! run concurrently behind a semaphore and are cached in [`Storage`] by
//! prompt hash and model.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jbook_llm::{ChatClient, LlmClientConfig, OpenAiClient};
use jbook_shared::{
    AppConfig, EnrichedRecord, JbookError, ProviderKind, Relevance, Result, TaggedRecord,
};
use jbook_storage::{CachedTag, Storage};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::dataset::{read_records, write_tagged};
use crate::pipeline::ProgressReporter;

const TRUNCATION_SUFFIX: &str = "... [truncated]";

pub const SYSTEM_PROMPT: &str = "You are a defense technology analyst. Classify relevance of budget text to target technologies.\n\
Return a strict JSON object with keys: label (one of High, Medium, Low) and rationale (short string).";

const PRIMARY_FOCUS_RATIONALE: &str = "Primary focus phrases matched";
const KEYWORD_RATIONALE: &str = "Keyword mentioned in context";
const NO_MATCH_RATIONALE: &str = "No direct keyword match";

// ---------------------------------------------------------------------------
// Corpus and rules
// ---------------------------------------------------------------------------

/// Narrative text sent for classification: accomplishments, acquisition
/// strategy and mission, each capped at a third of `max_chars`.
pub fn build_corpus(record: &EnrichedRecord, max_chars: usize) -> String {
    let part_cap = max_chars / 3;
    let parts: Vec<String> = [
        &record.accomplishments_text,
        &record.acquisition_strategy_text,
        &record.mission_description_text,
    ]
    .into_iter()
    .filter_map(|t| t.as_deref().map(str::trim).filter(|t| !t.is_empty()))
    .map(|t| truncate_chars(t, part_cap))
    .collect();

    truncate_chars(&parts.join("\n\n"), max_chars)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{TRUNCATION_SUFFIX}", &text[..cut]),
        None => text.to_string(),
    }
}

/// Keyword heuristic used without an LLM, or when a call cannot be made.
pub fn rule_based_relevance(corpus: &str, keywords: &[String]) -> (Relevance, String) {
    let corpus = corpus.to_lowercase();
    let mut hits = 0;
    let mut primary = 0;

    for keyword in keywords {
        let k = keyword.trim().to_lowercase();
        if k.is_empty() || !corpus.contains(&k) {
            continue;
        }
        hits += 1;
        let phrases = [
            format!("focus on {k}"),
            format!("developing {k}"),
            format!("{k} program"),
            format!("{k} system"),
            format!("{k} capability"),
        ];
        if phrases.iter().any(|p| corpus.contains(p.as_str())) {
            primary += 1;
        }
    }

    if primary > 0 {
        (Relevance::High, PRIMARY_FOCUS_RATIONALE.to_string())
    } else if hits > 0 {
        (Relevance::Medium, KEYWORD_RATIONALE.to_string())
    } else {
        (Relevance::Low, NO_MATCH_RATIONALE.to_string())
    }
}

// ---------------------------------------------------------------------------
// LLM prompt and response
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct UserPayload<'a> {
    keywords: &'a [String],
    definitions: &'a BTreeMap<String, String>,
    corpus: &'a str,
    instructions: Instructions,
}

#[derive(Serialize)]
struct Instructions {
    #[serde(rename = "High")]
    high: &'static str,
    #[serde(rename = "Medium")]
    medium: &'static str,
    #[serde(rename = "Low")]
    low: &'static str,
}

/// JSON user message for one corpus.
pub fn user_prompt(
    corpus: &str,
    keywords: &[String],
    definitions: &BTreeMap<String, String>,
) -> Result<String> {
    let payload = UserPayload {
        keywords,
        definitions,
        corpus,
        instructions: Instructions {
            high: "technology is a primary focus or core deliverable",
            medium: "technology is a secondary component or enabling area",
            low: "technology only mentioned in passing or unrelated",
        },
    };
    serde_json::to_string(&payload)
        .map_err(|e| JbookError::parse(format!("failed to serialize prompt: {e}")))
}

/// Parse a `{label, rationale}` reply, tolerating markdown code fences.
///
/// A label other than High/Medium/Low becomes Low.
pub fn parse_llm_response(content: &str) -> std::result::Result<(Relevance, String), serde_json::Error> {
    let mut body = content.trim();
    body = body.strip_prefix("```json").unwrap_or(body);
    body = body.strip_prefix("```").unwrap_or(body);
    body = body.strip_suffix("```").unwrap_or(body);

    let value: serde_json::Value = serde_json::from_str(body.trim())?;
    let field = |key: &str| {
        value.get(key).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    };
    let relevance = field("label")
        .and_then(|label| label.parse().ok())
        .unwrap_or(Relevance::Low);
    Ok((relevance, field("rationale").unwrap_or_default()))
}

/// Cache key for a prompt; the model ID is stored alongside it.
pub fn prompt_hash(corpus: &str, keywords: &[String], definitions: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(corpus.as_bytes());
    hasher.update(b"\0");
    for keyword in keywords {
        hasher.update(keyword.as_bytes());
        hasher.update(b"\0");
    }
    for (term, definition) in definitions {
        hasher.update(term.as_bytes());
        hasher.update(b"=");
        hasher.update(definition.as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Batch tagging
// ---------------------------------------------------------------------------

/// Options shared by every record in a tagging batch.
#[derive(Debug, Clone)]
pub struct TaggingOptions {
    pub keywords: Vec<String>,
    pub definitions: BTreeMap<String, String>,
    /// Maximum in-flight LLM requests; values below 1 are treated as 1.
    pub concurrency: usize,
    pub max_corpus_chars: usize,
}

impl Default for TaggingOptions {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            definitions: BTreeMap::new(),
            concurrency: 4,
            max_corpus_chars: 8000,
        }
    }
}

/// Counters for one tagging batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagStats {
    pub records: usize,
    /// Successful LLM classifications.
    pub llm_calls: usize,
    pub cache_hits: usize,
    /// LLM calls that errored or returned unparseable JSON.
    pub failures: usize,
    /// Records labelled by the keyword rules.
    pub rule_based: usize,
}

/// Outcome of one LLM classification.
#[derive(Debug)]
pub enum LlmOutcome {
    /// A parsed reply; safe to cache.
    Fresh(Relevance, String),
    /// API or parse failure, already mapped to a Low label with the reason.
    Failed(Relevance, String),
}

async fn classify<C: ChatClient>(client: &C, user: &str) -> LlmOutcome {
    match client.chat(SYSTEM_PROMPT, user).await {
        Ok(content) => match parse_llm_response(&content) {
            Ok((relevance, rationale)) => LlmOutcome::Fresh(relevance, rationale),
            Err(e) => LlmOutcome::Failed(
                Relevance::Low,
                format!("JSON parse error: {e}. Content was: {content:?}"),
            ),
        },
        Err(e) => LlmOutcome::Failed(Relevance::Low, format!("LLM error: {e}")),
    }
}

/// Tag every record, returning labels in input order.
///
/// Without a client every record is labelled by [`rule_based_relevance`].
/// With one, cached results are reused and the rest are classified
/// concurrently; a task that dies falls back to the rules for its record.
#[instrument(skip_all, fields(records = records.len(), llm = client.is_some()))]
pub async fn tag_batch<C: ChatClient + 'static>(
    records: &[EnrichedRecord],
    options: &TaggingOptions,
    client: Option<Arc<C>>,
    cache: Option<&Storage>,
    progress: &dyn ProgressReporter,
) -> (Vec<(Relevance, String)>, TagStats) {
    let total = records.len();
    let mut stats = TagStats {
        records: total,
        ..TagStats::default()
    };
    let corpora: Vec<String> = records
        .iter()
        .map(|r| build_corpus(r, options.max_corpus_chars))
        .collect();

    let Some(client) = client else {
        let tags = corpora
            .iter()
            .enumerate()
            .map(|(i, corpus)| {
                progress.item(i + 1, total, &records[i].pe_number);
                rule_based_relevance(corpus, &options.keywords)
            })
            .collect();
        stats.rule_based = total;
        return (tags, stats);
    };

    let model = client.model().to_string();
    let hashes: Vec<String> = corpora
        .iter()
        .map(|c| prompt_hash(c, &options.keywords, &options.definitions))
        .collect();
    let mut results: Vec<Option<(Relevance, String)>> = vec![None; total];
    let mut done = 0;

    if let Some(cache) = cache {
        for (i, hash) in hashes.iter().enumerate() {
            match cache.get_cached_tag(hash, &model).await {
                Ok(Some(hit)) => {
                    results[i] = Some((hit.relevance, hit.rationale));
                    stats.cache_hits += 1;
                    done += 1;
                    progress.item(done, total, &records[i].pe_number);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "tag cache lookup failed"),
            }
        }
        debug!(hits = stats.cache_hits, "tag cache consulted");
    }

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut handles = Vec::new();
    for (i, corpus) in corpora.iter().enumerate() {
        if results[i].is_some() {
            continue;
        }
        let user = match user_prompt(corpus, &options.keywords, &options.definitions) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "cannot build prompt, using keyword rules");
                results[i] = Some(rule_based_relevance(corpus, &options.keywords));
                stats.rule_based += 1;
                continue;
            }
        };
        let client = Arc::clone(&client);
        let sem = Arc::clone(&semaphore);
        handles.push((
            i,
            tokio::spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return LlmOutcome::Failed(Relevance::Low, format!("LLM error: {e}")),
                };
                classify(client.as_ref(), &user).await
            }),
        ));
    }

    for (i, handle) in handles {
        let tag = match handle.await {
            Ok(LlmOutcome::Fresh(relevance, rationale)) => {
                stats.llm_calls += 1;
                if let Some(cache) = cache {
                    let entry = CachedTag {
                        relevance,
                        rationale: rationale.clone(),
                    };
                    if let Err(e) = cache.set_cached_tag(&hashes[i], &model, &entry).await {
                        warn!(error = %e, "failed to store tag in cache");
                    }
                }
                (relevance, rationale)
            }
            Ok(LlmOutcome::Failed(relevance, rationale)) => {
                warn!(pe = %records[i].pe_number, reason = %rationale, "LLM classification failed");
                stats.failures += 1;
                (relevance, rationale)
            }
            Err(e) => {
                warn!(pe = %records[i].pe_number, error = %e, "tagging task died, using keyword rules");
                stats.rule_based += 1;
                rule_based_relevance(&corpora[i], &options.keywords)
            }
        };
        results[i] = Some(tag);
        done += 1;
        progress.item(done, total, &records[i].pe_number);
    }

    let tags = results
        .into_iter()
        .map(|r| r.unwrap_or((Relevance::Low, "Missing result".to_string())))
        .collect();
    info!(?stats, "tagging batch complete");
    (tags, stats)
}

/// Build the LLM client for `provider`, or `None` to use the keyword rules.
///
/// An OpenAI provider without a model or API key degrades to the rules
/// with a warning.
pub fn resolve_llm_client(
    app: &AppConfig,
    provider: ProviderKind,
    model: Option<&str>,
) -> Option<OpenAiClient> {
    if provider == ProviderKind::RuleBased {
        return None;
    }
    let model = model.unwrap_or(&app.llm.default_model).trim();
    if model.is_empty() {
        warn!("no model configured, using keyword rules");
        return None;
    }
    let client = LlmClientConfig::from_app_config(app, Some(model)).and_then(OpenAiClient::new);
    match client {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %e, "LLM unavailable, using keyword rules");
            None
        }
    }
}

/// Read a definitions JSON object (`{"term": "definition"}`).
///
/// A missing file is ignored and yields no definitions.
pub fn load_definitions(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.is_file() {
        warn!(path = %path.display(), "definitions file not found, continuing without");
        return Ok(BTreeMap::new());
    }
    let text = std::fs::read_to_string(path).map_err(|e| JbookError::io(path, e))?;
    parse_definitions(&text)
        .map_err(|e| JbookError::parse(format!("{}: {e}", path.display())))
}

/// Parse a definitions JSON object.
pub fn parse_definitions(text: &str) -> std::result::Result<BTreeMap<String, String>, serde_json::Error> {
    serde_json::from_str(text)
}

// ---------------------------------------------------------------------------
// CSV tagging run
// ---------------------------------------------------------------------------

/// Configuration for [`run_tagging`].
#[derive(Debug, Clone)]
pub struct TagConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub options: TaggingOptions,
    /// Tag cache database; `None` disables caching and run logging.
    pub cache_path: Option<PathBuf>,
}

/// Result of [`run_tagging`].
#[derive(Debug)]
pub struct TagResult {
    pub output: PathBuf,
    pub stats: TagStats,
    /// Recorded tagging run, when a cache database was used.
    pub run_id: Option<String>,
    pub elapsed: Duration,
}

/// Tag an enriched CSV and write the tagged CSV.
#[instrument(skip_all, fields(input = %config.input.display(), output = %config.output.display()))]
pub async fn run_tagging<C: ChatClient + 'static>(
    config: &TagConfig,
    client: Option<Arc<C>>,
    progress: &dyn ProgressReporter,
) -> Result<TagResult> {
    let start = Instant::now();
    progress.phase("Reading dataset");
    let tagged = read_records(&config.input)?;
    let records: Vec<EnrichedRecord> = tagged.into_iter().map(|t| t.record).collect();

    let cache = match &config.cache_path {
        Some(path) => Storage::open(path)
            .await
            .inspect_err(|e| warn!(error = %e, "tag cache unavailable"))
            .ok(),
        None => None,
    };

    let model = client.as_ref().map(|c| c.model().to_string());
    let input = config.input.display().to_string();
    let mut run_id = None;
    if let Some(cache) = &cache {
        match cache.insert_tag_run(&input, model.as_deref()).await {
            Ok(id) => run_id = Some(id),
            Err(e) => warn!(error = %e, "failed to record tagging run"),
        }
    }

    progress.phase("Tagging relevance");
    let (tags, stats) = tag_batch(&records, &config.options, client, cache.as_ref(), progress).await;

    let out: Vec<TaggedRecord> = records
        .into_iter()
        .zip(tags)
        .map(|(record, (relevance, rationale))| TaggedRecord {
            record,
            relevance,
            rationale,
        })
        .collect();
    write_tagged(&config.output, &out)?;

    if let (Some(cache), Some(id)) = (&cache, &run_id) {
        let stats_json = serde_json::to_string(&stats).unwrap_or_default();
        if let Err(e) = cache.finish_tag_run(id, &stats_json).await {
            warn!(error = %e, "failed to finish tagging run");
        }
    }

    progress.done(&format!(
        "Wrote tagged dataset to {}",
        config.output.display()
    ));
    Ok(TagResult {
        output: config.output.clone(),
        stats,
        run_id,
        elapsed: start.elapsed(),
    })
}
