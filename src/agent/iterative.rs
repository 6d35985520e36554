//! [`IterativeAgent`]: answers a question from memory when it can, otherwise
//! runs up to `max_iterations` retrieve/judge rounds, synthesizes a cited
//! answer and stores it as a new insight.
//!
//! Every collaborator call is bounded by a timeout. Retrieval, model and
//! persistence failures degrade the run instead of failing it; only memory
//! corruption aborts with [`AgentError::Internal`].

use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::evidence::EvidenceSet;
use super::progress::{AgentProgress, Phase, ProgressCallback};
use super::{AgentError, AgentResponse};
use crate::config::SuttaConfig;
use crate::memory::store::{MemoryError, MemoryResult};
use crate::memory::{CaseFoldFingerprint, Citation, Fingerprinter, MemoryStore, WisdomEntry};
use crate::models::ModelCatalog;
use crate::retrieval::{RetrievedChunk, VectorRetriever};
use crate::synthesizer::{Judgment, Synthesis, Synthesizer};

pub const INSUFFICIENT_EVIDENCE_ANSWER: &str = "I could not find passages in the indexed suttas \
that address this question, so there is insufficient evidence to answer it. Try rephrasing, \
or import more of the canon.";

pub const SYNTHESIS_FAILED_ANSWER: &str = "I could not synthesize an answer from the retrieved \
passages. The language model may be unavailable; please try again.";

#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Upper bound on search rounds per question. At least 1.
    pub max_iterations: u32,
    /// Chunks requested per search round.
    pub top_k: usize,
    pub retrieval_timeout: Duration,
    pub llm_timeout: Duration,
    /// Citation snippet length in characters.
    pub snippet_chars: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&SuttaConfig::default())
    }
}

impl AgentSettings {
    pub fn from_config(config: &SuttaConfig) -> Self {
        Self {
            max_iterations: config.agent.max_iterations.max(1),
            top_k: config.retrieval.top_k,
            retrieval_timeout: config.agent.retrieval_timeout(),
            llm_timeout: config.agent.llm_timeout(),
            snippet_chars: config.agent.snippet_chars,
        }
    }
}

pub struct IterativeAgent {
    retriever: Arc<dyn VectorRetriever>,
    memory: MemoryStore,
    catalog: Arc<dyn ModelCatalog>,
    synthesizer: RwLock<Arc<dyn Synthesizer>>,
    fingerprinter: Arc<dyn Fingerprinter>,
    observer: RwLock<Option<ProgressCallback>>,
    settings: AgentSettings,
}

impl IterativeAgent {
    pub fn new(
        retriever: Arc<dyn VectorRetriever>,
        memory: MemoryStore,
        catalog: Arc<dyn ModelCatalog>,
        synthesizer: Arc<dyn Synthesizer>,
        mut settings: AgentSettings,
    ) -> Self {
        settings.max_iterations = settings.max_iterations.max(1);
        Self {
            retriever,
            memory,
            catalog,
            synthesizer: RwLock::new(synthesizer),
            fingerprinter: Arc::new(CaseFoldFingerprint::default()),
            observer: RwLock::new(None),
            settings,
        }
    }

    /// Replace the question normalization used for memory keys.
    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    /// Switch the synthesizer for subsequent runs. Runs already in flight keep
    /// the model they started with.
    pub fn set_model(&self, model_id: &str) -> Result<(), AgentError> {
        let model = self
            .catalog
            .find(model_id)
            .ok_or_else(|| AgentError::InvalidModel(model_id.to_string()))?;
        let synthesizer = self.catalog.build(&model).map_err(|e| {
            warn!(model = model_id, error = %e, "failed to build model backend");
            AgentError::InvalidModel(model_id.to_string())
        })?;

        let mut current = self
            .synthesizer
            .write()
            .map_err(|_| AgentError::Internal("synthesizer lock poisoned".into()))?;
        *current = synthesizer;
        info!(model = model_id, "model switched");
        Ok(())
    }

    pub fn current_model(&self) -> Result<String, AgentError> {
        Ok(self.current_synthesizer()?.model_id().to_string())
    }

    /// Register the progress observer, replacing any previous one.
    pub fn set_progress_callback(&self, callback: ProgressCallback) {
        let mut observer = match self.observer.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *observer = Some(callback);
    }

    pub async fn get_memory_count(&self) -> Result<u64> {
        Ok(self.with_memory(|m| m.count()).await?)
    }

    /// Delete every stored insight. Returns the number removed.
    pub async fn clear_memory(&self) -> Result<u64> {
        Ok(self.with_memory(|m| m.clear()).await?)
    }

    pub async fn is_ready(&self) -> bool {
        tokio::time::timeout(self.settings.retrieval_timeout, self.retriever.is_ready())
            .await
            .unwrap_or(false)
    }

    pub async fn get_document_count(&self) -> Result<u64> {
        bounded(
            self.settings.retrieval_timeout,
            "document count",
            self.retriever.document_count(),
        )
        .await
    }

    /// Answer `question`, from memory if an equivalent question was answered
    /// before.
    pub async fn research(&self, question: &str) -> Result<AgentResponse, AgentError> {
        let run_id = Uuid::now_v7();
        self.run(question)
            .instrument(info_span!("research", %run_id))
            .await
    }

    async fn run(&self, question: &str) -> Result<AgentResponse, AgentError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AgentError::EmptyQuestion);
        }
        if !self.is_ready().await {
            return Err(AgentError::NotReady);
        }

        let synthesizer = self.current_synthesizer()?;
        let max = self.settings.max_iterations;
        info!(model = synthesizer.model_id(), max_iterations = max, "research started");

        // RECALL
        let fingerprint = self.fingerprinter.fingerprint(question);
        self.emit(Phase::Recall, "Checking memory for similar questions...", 0);
        if let Some(entry) = self.recall(&fingerprint).await? {
            return Ok(self.replay(entry).await);
        }

        let mut evidence = EvidenceSet::new();
        let mut query = question.to_string();
        let mut rounds = 0;

        for iteration in 1..=max {
            rounds = iteration;

            // SEARCH
            self.emit(
                Phase::Search,
                &format!("Searching the suttas: {query}"),
                iteration,
            );
            let chunks = self.search(&query).await;
            let added = evidence.extend(chunks);
            info!(iteration, added, total = evidence.len(), "evidence accumulated");

            // ANALYZE
            self.emit(Phase::Analyze, "Evaluating the evidence...", iteration);
            if iteration == max {
                debug!(iteration, "iteration limit reached, synthesizing");
                break;
            }
            let judgment = self
                .judge(synthesizer.as_ref(), question, evidence.as_slice())
                .await;
            if judgment.sufficient {
                break;
            }
            match judgment.follow_up_query.trim() {
                "" => {
                    debug!(iteration, "no follow-up query proposed, synthesizing");
                    break;
                }
                next => {
                    debug!(iteration, follow_up = next, "searching again");
                    query = next.to_string();
                }
            }
        }

        // SYNTHESIZE
        self.emit(Phase::Synthesize, "Synthesizing an answer...", rounds);
        let (answer_text, citations, learnable) = if evidence.is_empty() {
            info!("no evidence gathered");
            (INSUFFICIENT_EVIDENCE_ANSWER.to_string(), Vec::new(), false)
        } else {
            match bounded(
                self.settings.llm_timeout,
                "synthesis",
                synthesizer.synthesize(question, evidence.as_slice()),
            )
            .await
            {
                Ok(synthesis) => {
                    let citations = self.resolve_citations(&synthesis, &evidence);
                    (synthesis.answer_text, citations, true)
                }
                Err(e) => {
                    warn!(error = %e, "synthesis failed, returning fallback answer");
                    (SYNTHESIS_FAILED_ANSWER.to_string(), Vec::new(), false)
                }
            }
        };

        // LEARN
        if learnable {
            self.emit(Phase::Learn, "Storing this insight for next time...", rounds);
            let entry = WisdomEntry::new(&fingerprint, question, &answer_text, citations.clone());
            if let Err(e) = self.with_memory(move |m| m.insert(&entry)).await {
                warn!(error = %e, "failed to store insight");
            }
        }

        // COMPLETE
        self.emit(Phase::Complete, "Research complete", rounds);
        info!(
            iterations = rounds,
            evidence = evidence.len(),
            citations = citations.len(),
            "research complete"
        );

        Ok(AgentResponse {
            answer_text,
            citations,
            from_memory: false,
            iterations: rounds,
            evidence_count: evidence.len(),
        })
    }

    /// Look up a stored insight. Storage failures count as a miss; a corrupt
    /// entry is fatal.
    async fn recall(&self, fingerprint: &str) -> Result<Option<WisdomEntry>, AgentError> {
        let key = fingerprint.to_string();
        match self.with_memory(move |m| m.lookup(&key)).await {
            Ok(entry) => Ok(entry),
            Err(e) if e.is_corruption() => Err(AgentError::Internal(e.to_string())),
            Err(e) => {
                warn!(error = %e, "memory lookup failed, continuing without memory");
                Ok(None)
            }
        }
    }

    async fn replay(&self, entry: WisdomEntry) -> AgentResponse {
        info!(fingerprint = %entry.fingerprint, hits = entry.hit_count, "answered from memory");
        let key = entry.fingerprint.clone();
        if let Err(e) = self.with_memory(move |m| m.record_hit(&key)).await {
            warn!(error = %e, "failed to record memory hit");
        }
        self.emit(Phase::Complete, "Answered from memory", 0);
        AgentResponse {
            answer_text: entry.answer_text,
            citations: entry.citations,
            from_memory: true,
            iterations: 0,
            evidence_count: 0,
        }
    }

    async fn search(&self, query: &str) -> Vec<RetrievedChunk> {
        match bounded(
            self.settings.retrieval_timeout,
            "retrieval",
            self.retriever.retrieve(query, self.settings.top_k),
        )
        .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "retrieval failed, treating as no results");
                Vec::new()
            }
        }
    }

    async fn judge(
        &self,
        synthesizer: &dyn Synthesizer,
        question: &str,
        evidence: &[RetrievedChunk],
    ) -> Judgment {
        match bounded(
            self.settings.llm_timeout,
            "sufficiency judgment",
            synthesizer.judge_sufficiency(question, evidence),
        )
        .await
        {
            Ok(judgment) => judgment,
            Err(e) => {
                warn!(error = %e, "sufficiency judgment failed, proceeding to synthesis");
                Judgment::sufficient()
            }
        }
    }

    /// Map cited keys onto gathered evidence, dropping unknown and repeated keys.
    fn resolve_citations(&self, synthesis: &Synthesis, evidence: &EvidenceSet) -> Vec<Citation> {
        let mut seen = HashSet::new();
        let mut citations = Vec::new();
        for key in &synthesis.cited_evidence_keys {
            if !seen.insert(key) {
                continue;
            }
            match evidence.get(key) {
                Some(chunk) => citations.push(Citation::from_chunk(chunk, self.settings.snippet_chars)),
                None => debug!(%key, "dropping citation outside gathered evidence"),
            }
        }
        citations
    }

    fn current_synthesizer(&self) -> Result<Arc<dyn Synthesizer>, AgentError> {
        self.synthesizer
            .read()
            .map(|s| Arc::clone(&*s))
            .map_err(|_| AgentError::Internal("synthesizer lock poisoned".into()))
    }

    fn emit(&self, phase: Phase, message: &str, iteration: u32) {
        let observer = match self.observer.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        debug!(%phase, iteration, "{message}");
        if let Some(callback) = observer {
            callback(AgentProgress {
                phase,
                message: message.to_string(),
                iteration,
                max_iterations: self.settings.max_iterations,
            });
        }
    }

    /// Run a blocking store operation off the async runtime.
    async fn with_memory<T, F>(&self, op: F) -> MemoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&MemoryStore) -> MemoryResult<T> + Send + 'static,
    {
        let store = self.memory.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| MemoryError::Unavailable(format!("memory task failed: {e}")))?
    }
}

async fn bounded<T>(
    limit: Duration,
    what: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| anyhow!("{what} timed out after {limit:?}"))?
}
