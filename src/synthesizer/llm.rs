use anyhow::Result;
use async_trait::async_trait;

use super::prompt::{self, SYSTEM_PROMPT};
use super::{Judgment, Synthesis, Synthesizer};
use crate::llm::{ChatMessage, LlmClient, LlmRequest};
use crate::retrieval::RetrievedChunk;

/// Judgment tokens are few; the answer budget comes from config.
const JUDGE_MAX_TOKENS: u32 = 256;

/// [`Synthesizer`] over any chat-completion client.
pub struct LlmSynthesizer {
    client: Box<dyn LlmClient>,
    model_id: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmSynthesizer {
    pub fn new(
        client: Box<dyn LlmClient>,
        model_id: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            model_id: model_id.into(),
            temperature,
            max_tokens,
        }
    }

    async fn ask(&self, prompt: String, max_tokens: u32) -> Result<String> {
        let response = self
            .client
            .complete(LlmRequest {
                system_prompt: Some(SYSTEM_PROMPT.to_string()),
                messages: vec![ChatMessage::user(prompt)],
                temperature: Some(self.temperature),
                max_tokens: Some(max_tokens),
            })
            .await?;
        tracing::debug!(
            requested = self.client.model_name(),
            model = %response.model,
            finish_reason = ?response.finish_reason,
            chars = response.content.len(),
            "completion received"
        );
        Ok(response.content)
    }
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn judge_sufficiency(
        &self,
        question: &str,
        evidence: &[RetrievedChunk],
    ) -> Result<Judgment> {
        let reply = self
            .ask(prompt::judge_prompt(question, evidence), JUDGE_MAX_TOKENS)
            .await?;
        prompt::parse_judgment(&reply)
    }

    async fn synthesize(&self, question: &str, evidence: &[RetrievedChunk]) -> Result<Synthesis> {
        let reply = self
            .ask(prompt::synthesis_prompt(question, evidence), self.max_tokens)
            .await?;
        prompt::parse_synthesis(&reply, evidence)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use std::sync::Mutex;

    /// Replays canned completions and records the prompts it was sent.
    struct CannedClient {
        replies: Mutex<Vec<String>>,
        prompts: std::sync::Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
            self.prompts
                .lock()
                .unwrap()
                .push(request.messages[0].content.clone());
            let content = self.replies.lock().unwrap().remove(0);
            Ok(LlmResponse {
                content,
                model: "canned".into(),
                finish_reason: Some("stop".into()),
            })
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn chunk() -> RetrievedChunk {
        RetrievedChunk {
            sutta_uid: "sn12.1".into(),
            title: "Dependent Origination".into(),
            nikaya: Some("sn".into()),
            segment_range: "sn12.1:2.1-2.14".into(),
            text: "Ignorance is a condition for choices.".into(),
            score: 0.9,
        }
    }

    #[tokio::test]
    async fn judge_then_synthesize() {
        let prompts = std::sync::Arc::new(Mutex::new(Vec::new()));
        let client = CannedClient {
            replies: Mutex::new(vec![
                r#"{"sufficient": true}"#.into(),
                r#"{"answer": "Dependent origination is...", "citations": [1]}"#.into(),
            ]),
            prompts: prompts.clone(),
        };
        let synth = LlmSynthesizer::new(Box::new(client), "ollama/test", 0.1, 512);
        let evidence = vec![chunk()];

        let judgment = synth.judge_sufficiency("What is it?", &evidence).await.unwrap();
        assert!(judgment.sufficient);

        let synthesis = synth.synthesize("What is it?", &evidence).await.unwrap();
        assert_eq!(synthesis.cited_evidence_keys, vec![evidence[0].key()]);
        assert_eq!(synth.model_id(), "ollama/test");

        let sent = prompts.lock().unwrap();
        assert!(sent[1].contains("[1] Dependent Origination (sn12.1, sn12.1:2.1-2.14)"));
    }

    #[tokio::test]
    async fn stray_citation_keeps_the_answer() {
        let client = CannedClient {
            replies: Mutex::new(vec![
                r#"{"answer": "Dependent origination is...", "citations": [1, "sn12.1"]}"#.into(),
            ]),
            prompts: Default::default(),
        };
        let synth = LlmSynthesizer::new(Box::new(client), "m", 0.1, 512);
        let evidence = vec![chunk()];

        let synthesis = synth.synthesize("Q", &evidence).await.unwrap();
        assert_eq!(synthesis.answer_text, "Dependent origination is...");
        assert_eq!(synthesis.cited_evidence_keys, vec![evidence[0].key()]);
    }

    #[tokio::test]
    async fn malformed_reply_is_an_error() {
        let client = CannedClient {
            replies: Mutex::new(vec!["I cannot answer that.".into()]),
            prompts: Default::default(),
        };
        let synth = LlmSynthesizer::new(Box::new(client), "m", 0.1, 512);
        assert!(synth.synthesize("Q", &[chunk()]).await.is_err());
    }
}
