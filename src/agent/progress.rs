use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Stage of a research run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Recall,
    Search,
    Analyze,
    Synthesize,
    Learn,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Recall => "RECALL",
            Self::Search => "SEARCH",
            Self::Analyze => "ANALYZE",
            Self::Synthesize => "SYNTHESIZE",
            Self::Learn => "LEARN",
            Self::Complete => "COMPLETE",
        };
        f.write_str(name)
    }
}

/// One phase transition. `iteration` is 0 during recall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentProgress {
    pub phase: Phase,
    pub message: String,
    pub iteration: u32,
    pub max_iterations: u32,
}

/// Progress observer. Called inline on the research task, so it must not block.
pub type ProgressCallback = Arc<dyn Fn(AgentProgress) + Send + Sync>;

/// A callback that forwards events into a channel, for consumers that render
/// progress on another task.
pub fn progress_channel() -> (ProgressCallback, mpsc::UnboundedReceiver<AgentProgress>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: ProgressCallback = Arc::new(move |event| {
        // receiver gone means nobody is watching
        let _ = tx.send(event);
    });
    (callback, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_delivers_in_order() {
        let (callback, mut rx) = progress_channel();
        for phase in [Phase::Recall, Phase::Search, Phase::Complete] {
            callback(AgentProgress {
                phase,
                message: phase.to_string(),
                iteration: 0,
                max_iterations: 3,
            });
        }
        drop(callback);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event.phase);
        }
        assert_eq!(seen, vec![Phase::Recall, Phase::Search, Phase::Complete]);
    }

    #[test]
    fn dropped_receiver_is_harmless() {
        let (callback, rx) = progress_channel();
        drop(rx);
        callback(AgentProgress {
            phase: Phase::Learn,
            message: String::new(),
            iteration: 1,
            max_iterations: 1,
        });
    }

    #[test]
    fn phase_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Phase::Synthesize).unwrap(), "\"SYNTHESIZE\"");
    }
}
