//! Research assistant over the Sutta Pitaka.
//!
//! Questions are answered by an iterative agent that searches an indexed corpus
//! of sutta passages, asks a language model whether the evidence suffices,
//! refines its query when it does not, and finally synthesizes an answer with
//! citations. Answers are stored as insights keyed by a normalized question
//! fingerprint, so repeated questions are answered from memory without any
//! retrieval or model call.
//!
//! # Architecture
//!
//! - **Storage**: SQLite for passages and insights, with
//!   [sqlite-vec](https://github.com/asg017/sqlite-vec) for vector search
//! - **Embeddings**: Local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions),
//!   or an Ollama server
//! - **Models**: Any OpenAI-compatible chat endpoint (Ollama, OpenAI, OpenRouter)
//!
//! # Modules
//!
//! - [`agent`]: The iterative research loop and its progress events
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`context`]: Shared application state for agent-facing commands
//! - [`db`]: SQLite database initialization, schema, migrations, and health checks
//! - [`embedding`]: Text-to-vector embedding providers
//! - [`llm`]: Chat-completion clients
//! - [`memory`]: Insight store, question fingerprints and citation records
//! - [`models`]: Registry of models that can back the synthesizer
//! - [`retrieval`]: Passage retrieval and grouped sutta search
//! - [`synthesizer`]: Sufficiency judgment and cited answer synthesis

pub mod agent;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod llm;
pub mod memory;
pub mod models;
pub mod retrieval;
pub mod synthesizer;
