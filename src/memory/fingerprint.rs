//! Question fingerprints used as memory keys.
//!
//! Normalization is deliberately simple (case and whitespace folding, with
//! optional punctuation removal). It is exposed through [`Fingerprinter`] so a
//! different heuristic can be plugged into the agent.

/// Maps a question to its memory lookup key.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, question: &str) -> String;
}

/// Lower-cases, collapses whitespace and optionally drops ASCII punctuation.
#[derive(Debug, Clone, Copy)]
pub struct CaseFoldFingerprint {
    pub strip_punctuation: bool,
}

impl Default for CaseFoldFingerprint {
    fn default() -> Self {
        Self {
            strip_punctuation: true,
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Fingerprinter for CaseFoldFingerprint {
    /// Never returns an empty key for a non-blank question: if stripping
    /// punctuation leaves nothing, the punctuation is kept.
    fn fingerprint(&self, question: &str) -> String {
        let lowered = question.to_lowercase();
        if self.strip_punctuation {
            let stripped: String = lowered
                .chars()
                .map(|c| if c.is_ascii_punctuation() { ' ' } else { c })
                .collect();
            let folded = collapse_whitespace(&stripped);
            if !folded.is_empty() {
                return folded;
            }
        }
        collapse_whitespace(&lowered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_and_whitespace() {
        let fp = CaseFoldFingerprint::default();
        assert_eq!(
            fp.fingerprint("  What is   Dependent Origination?\n"),
            fp.fingerprint("what is dependent origination")
        );
    }

    #[test]
    fn keeps_punctuation_when_disabled() {
        let fp = CaseFoldFingerprint {
            strip_punctuation: false,
        };
        assert_eq!(fp.fingerprint("What is  Nibbāna?"), "what is nibbāna?");
        assert_ne!(fp.fingerprint("nibbāna?"), fp.fingerprint("nibbāna"));
    }

    #[test]
    fn keeps_diacritics() {
        let fp = CaseFoldFingerprint::default();
        assert_eq!(fp.fingerprint("Paṭicca-samuppāda"), "paṭicca samuppāda");
    }

    #[test]
    fn punctuation_only_questions_keep_their_punctuation() {
        let fp = CaseFoldFingerprint::default();
        assert_eq!(fp.fingerprint(" ??? "), "???");
        assert_eq!(fp.fingerprint("? ?"), "? ?");
        assert_ne!(fp.fingerprint("!!"), fp.fingerprint("???"));
        assert!(!fp.fingerprint("...").is_empty());
    }

    #[test]
    fn reworded_questions_do_not_collide() {
        let fp = CaseFoldFingerprint::default();
        assert_ne!(
            fp.fingerprint("What is dependent origination?"),
            fp.fingerprint("Explain dependent origination")
        );
    }
}
