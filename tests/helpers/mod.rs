#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sutta_agent::agent::{AgentProgress, AgentSettings, IterativeAgent, Phase, ProgressCallback};
use sutta_agent::db;
use sutta_agent::embedding::{EmbeddingProvider, EMBEDDING_DIM};
use sutta_agent::memory::MemoryStore;
use sutta_agent::models::{ModelCatalog, ModelInfo, Provider};
use sutta_agent::retrieval::{EvidenceKey, RetrievedChunk, VectorRetriever};
use sutta_agent::synthesizer::{Judgment, Synthesis, Synthesizer};

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::load_sqlite_vec();
    let conn = Connection::open_in_memory().unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&conn).unwrap();
    conn
}

pub fn shared_db() -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(test_db()))
}

/// Generate a deterministic 384-dim embedding with a spike at position `seed`.
pub fn test_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[seed % EMBEDDING_DIM] = 1.0;
    v
}

/// Embeds text as a spike at the length of its first word.
pub struct SpikeEmbedding;

impl EmbeddingProvider for SpikeEmbedding {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(test_embedding(
            text.split_whitespace().next().unwrap_or("").len(),
        ))
    }
}

pub fn chunk(uid: &str, range: &str) -> RetrievedChunk {
    RetrievedChunk {
        sutta_uid: uid.into(),
        title: format!("{uid} title"),
        nikaya: Some(uid.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.').into()),
        segment_range: range.into(),
        text: format!("Passage {range} of {uid}."),
        score: 0.8,
    }
}

/// `n` distinct chunks of one sutta.
pub fn chunks(uid: &str, n: usize) -> Vec<RetrievedChunk> {
    (1..=n).map(|i| chunk(uid, &format!("{uid}:{i}"))).collect()
}

pub enum Round {
    Chunks(Vec<RetrievedChunk>),
    Fail,
    Hang,
}

/// Retriever that plays back scripted rounds, then `fallback` forever.
pub struct ScriptedRetriever {
    rounds: Mutex<VecDeque<Round>>,
    fallback: Vec<RetrievedChunk>,
    document_count: u64,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl ScriptedRetriever {
    pub fn new(rounds: Vec<Round>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            fallback: Vec::new(),
            document_count: 100,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Returns the same chunks on every call.
    pub fn fixed(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            fallback: chunks,
            ..Self::new(vec![])
        }
    }

    pub fn empty_corpus() -> Self {
        Self {
            document_count: 0,
            ..Self::new(vec![])
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorRetriever for ScriptedRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        let round = self.rounds.lock().unwrap().pop_front();
        match round {
            Some(Round::Chunks(chunks)) => Ok(chunks.into_iter().take(k).collect()),
            Some(Round::Fail) => Err(anyhow!("index unavailable")),
            Some(Round::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(vec![])
            }
            None => Ok(self.fallback.iter().take(k).cloned().collect()),
        }
    }

    async fn document_count(&self) -> Result<u64> {
        Ok(self.document_count)
    }
}

pub enum Verdict {
    Judge(Judgment),
    Fail,
    /// Never answers within any test timeout.
    Hang,
}

pub enum Answer {
    /// Cite every passage it was given.
    CiteAll,
    Cite(Vec<EvidenceKey>),
    Fail,
    Hang,
}

/// Synthesizer with scripted verdicts (sufficient once exhausted) and a fixed
/// answer mode.
pub struct ScriptedSynthesizer {
    model_id: String,
    verdicts: Mutex<VecDeque<Verdict>>,
    answer: Answer,
    answer_text: String,
    judge_calls: AtomicUsize,
    synth_calls: AtomicUsize,
    last_evidence: Mutex<Vec<RetrievedChunk>>,
}

impl ScriptedSynthesizer {
    pub fn new(verdicts: Vec<Verdict>, answer: Answer) -> Self {
        Self {
            model_id: "test/scripted".into(),
            verdicts: Mutex::new(verdicts.into()),
            answer,
            answer_text: "Scripted answer.".into(),
            judge_calls: AtomicUsize::new(0),
            synth_calls: AtomicUsize::new(0),
            last_evidence: Mutex::new(Vec::new()),
        }
    }

    pub fn with_model_id(mut self, id: &str) -> Self {
        self.model_id = id.into();
        self
    }

    pub fn with_answer_text(mut self, text: &str) -> Self {
        self.answer_text = text.into();
        self
    }

    pub fn judge_calls(&self) -> usize {
        self.judge_calls.load(Ordering::SeqCst)
    }

    pub fn synth_calls(&self) -> usize {
        self.synth_calls.load(Ordering::SeqCst)
    }

    /// Evidence passed to the last `synthesize` call.
    pub fn last_evidence(&self) -> Vec<RetrievedChunk> {
        self.last_evidence.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn judge_sufficiency(&self, _question: &str, _evidence: &[RetrievedChunk]) -> Result<Judgment> {
        self.judge_calls.fetch_add(1, Ordering::SeqCst);
        let verdict = self.verdicts.lock().unwrap().pop_front();
        match verdict {
            Some(Verdict::Judge(judgment)) => Ok(judgment),
            Some(Verdict::Fail) => Err(anyhow!("model unavailable")),
            Some(Verdict::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Judgment::search_more("too late"))
            }
            None => Ok(Judgment::sufficient()),
        }
    }

    async fn synthesize(&self, _question: &str, evidence: &[RetrievedChunk]) -> Result<Synthesis> {
        self.synth_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_evidence.lock().unwrap() = evidence.to_vec();
        let cited_evidence_keys = match &self.answer {
            Answer::CiteAll => evidence.iter().map(RetrievedChunk::key).collect(),
            Answer::Cite(keys) => keys.clone(),
            Answer::Fail => return Err(anyhow!("malformed response")),
            Answer::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                vec![]
            }
        };
        Ok(Synthesis {
            answer_text: self.answer_text.clone(),
            cited_evidence_keys,
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Catalog listing the given ids; building any of them yields a
/// sufficient-at-once synthesizer that cites everything.
pub struct StaticCatalog {
    ids: Vec<String>,
}

impl StaticCatalog {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ModelCatalog for StaticCatalog {
    fn available_models(&self) -> Vec<ModelInfo> {
        self.ids
            .iter()
            .map(|id| ModelInfo {
                id: id.clone(),
                display_name: id.clone(),
                description: "test model".into(),
                is_free: true,
                provider: Provider::Ollama,
            })
            .collect()
    }

    fn build(&self, model: &ModelInfo) -> Result<Arc<dyn Synthesizer>> {
        Ok(Arc::new(
            ScriptedSynthesizer::new(vec![], Answer::CiteAll)
                .with_model_id(&model.id)
                .with_answer_text(&format!("Answer from {}.", model.id)),
        ))
    }
}

/// Collects progress events for assertions.
#[derive(Clone, Default)]
pub struct ProgressRecorder {
    events: Arc<Mutex<Vec<AgentProgress>>>,
}

impl ProgressRecorder {
    pub fn callback(&self) -> ProgressCallback {
        let events = Arc::clone(&self.events);
        Arc::new(move |event| events.lock().unwrap().push(event))
    }

    pub fn events(&self) -> Vec<AgentProgress> {
        self.events.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.events().iter().map(|e| e.phase).collect()
    }

    pub fn count(&self, phase: Phase) -> usize {
        self.phases().iter().filter(|p| **p == phase).count()
    }
}

pub fn test_settings(max_iterations: u32) -> AgentSettings {
    AgentSettings {
        max_iterations,
        top_k: 8,
        retrieval_timeout: Duration::from_secs(5),
        llm_timeout: Duration::from_secs(5),
        snippet_chars: 500,
    }
}

/// Everything an agent test needs to inspect after a run.
pub struct Harness {
    pub agent: IterativeAgent,
    pub retriever: Arc<ScriptedRetriever>,
    pub synthesizer: Arc<ScriptedSynthesizer>,
    pub memory: MemoryStore,
    pub db: Arc<Mutex<Connection>>,
    pub progress: ProgressRecorder,
}

pub fn harness(
    retriever: ScriptedRetriever,
    synthesizer: ScriptedSynthesizer,
    settings: AgentSettings,
) -> Harness {
    let db = shared_db();
    let memory = MemoryStore::new(Arc::clone(&db));
    let retriever = Arc::new(retriever);
    let synthesizer = Arc::new(synthesizer);
    let agent = IterativeAgent::new(
        retriever.clone(),
        memory.clone(),
        Arc::new(StaticCatalog::new(&["ollama/llama3.1", "openai/gpt-4o"])),
        synthesizer.clone(),
        settings,
    );
    let progress = ProgressRecorder::default();
    agent.set_progress_callback(progress.callback());
    Harness {
        agent,
        retriever,
        synthesizer,
        memory,
        db,
        progress,
    }
}
