//! The per-event classification pipeline.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use switchboard_ai::TranscriptClassifier;
use switchboard_types::{ComplianceVerdict, TranscriptionPayload};

use crate::context::ContextWindows;
use crate::dedup::DedupCache;

/// Prior snippets supplied as classification context.
const CONTEXT_WINDOW: usize = 3;

/// How long an accepted final transcript suppresses identical resends.
const DEDUP_TTL: Duration = Duration::from_secs(3);

/// Drives one transcription event from dedup through classification to the
/// enriched payload the server broadcasts.
///
/// The caches use `std::sync::Mutex` intentionally: every lock acquisition
/// is a brief map/queue operation that never spans an `.await` point.
pub struct CompliancePipeline {
    dedup: Mutex<DedupCache>,
    contexts: Mutex<ContextWindows>,
    classifier: Arc<dyn TranscriptClassifier>,
}

impl CompliancePipeline {
    pub fn new(classifier: Arc<dyn TranscriptClassifier>) -> Self {
        Self {
            dedup: Mutex::new(DedupCache::new(DEDUP_TTL)),
            contexts: Mutex::new(ContextWindows::new(CONTEXT_WINDOW)),
            classifier,
        }
    }

    /// Processes one transcription event.
    ///
    /// Returns `None` when the event is a duplicate resend (drop it), or the
    /// enriched payload to broadcast. Events that are not caller-side speech
    /// content, or whose transcript is empty, pass through unclassified with
    /// a clean verdict attached.
    pub async fn process(&self, payload: TranscriptionPayload) -> Option<TranscriptionPayload> {
        {
            let mut dedup = self.dedup.lock().expect("dedup lock");
            if dedup.is_duplicate(&payload) {
                return None;
            }
        }

        if !payload.is_content() || !payload.is_inbound_track() {
            return Some(payload.enriched(false, &[]));
        }

        let transcript = payload.transcript();
        if transcript.trim().is_empty() {
            return Some(payload.enriched(false, &[]));
        }

        let call_sid = payload.call_sid().unwrap_or_default().to_string();
        let context = {
            let contexts = self.contexts.lock().expect("contexts lock");
            contexts.snapshot(&call_sid)
        };

        match self.classifier.classify(&transcript, &context).await {
            Ok(verdict) => {
                let verdict = harden_verdict(&transcript, &context, verdict);
                {
                    let mut contexts = self.contexts.lock().expect("contexts lock");
                    contexts.push(&call_sid, transcript);
                }
                Some(payload.enriched(verdict.violation, &verdict.phrases))
            }
            Err(e) => {
                // Classification is best-effort; the event still flows, the
                // context window is left untouched.
                tracing::warn!(call_sid = %call_sid, "transcript classification failed: {e}");
                Some(payload.enriched(false, &[]))
            }
        }
    }

    /// Handles a summary (end-of-call) event: the call's context window is
    /// discarded.
    pub fn end_of_call(&self, call_sid: &str) {
        let mut contexts = self.contexts.lock().expect("contexts lock");
        contexts.clear(call_sid);
        tracing::info!(call_sid = %call_sid, "compliance context cleared");
    }
}

/// Hardens a model verdict against hallucination.
///
/// A phrase survives only if it is literally present (case-insensitively)
/// in the current text or the context it was judged against; duplicates
/// collapse case-insensitively. An empty surviving list forces the verdict
/// to non-violating regardless of the model's boolean.
pub fn harden_verdict(
    current: &str,
    context: &[String],
    verdict: ComplianceVerdict,
) -> ComplianceVerdict {
    let mut haystack = current.to_lowercase();
    for snippet in context {
        haystack.push(' ');
        haystack.push_str(&snippet.to_lowercase());
    }

    let mut seen = HashSet::new();
    let mut phrases = Vec::new();
    for phrase in verdict.phrases {
        let trimmed = phrase.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lowered = trimmed.to_lowercase();
        if !haystack.contains(&lowered) {
            continue;
        }
        if !seen.insert(lowered) {
            continue;
        }
        phrases.push(trimmed.to_string());
    }

    let violation = verdict.violation && !phrases.is_empty();
    ComplianceVerdict { violation, phrases }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use switchboard_ai::AiError;

    fn verdict(violation: bool, phrases: &[&str]) -> ComplianceVerdict {
        ComplianceVerdict {
            violation,
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn phrases_must_be_literally_present() {
        let hardened = harden_verdict(
            "I will cancel your account",
            &["earlier snippet".to_string()],
            verdict(true, &["cancel your account", "burn it down"]),
        );
        assert!(hardened.violation);
        assert_eq!(hardened.phrases, vec!["cancel your account"]);
    }

    #[test]
    fn presence_check_is_case_insensitive_and_spans_context() {
        let hardened = harden_verdict(
            "nothing here",
            &["He said GIVE ME THE CARD NUMBER".to_string()],
            verdict(true, &["give me the card number"]),
        );
        assert!(hardened.violation);
        assert_eq!(hardened.phrases, vec!["give me the card number"]);
    }

    #[test]
    fn duplicate_phrases_collapse_case_insensitively() {
        let hardened = harden_verdict(
            "Bad Phrase bad phrase",
            &[],
            verdict(true, &["Bad Phrase", "bad phrase", "BAD PHRASE"]),
        );
        assert_eq!(hardened.phrases.len(), 1);
    }

    #[test]
    fn empty_surviving_list_forces_clean_verdict() {
        let hardened = harden_verdict("innocent text", &[], verdict(true, &["fabricated"]));
        assert!(!hardened.violation);
        assert!(hardened.phrases.is_empty());
    }

    /// Classifier that records its inputs and replays a fixed verdict.
    struct RecordingClassifier {
        calls: StdMutex<Vec<(String, Vec<String>)>>,
        result: Result<ComplianceVerdict, ()>,
    }

    impl RecordingClassifier {
        fn ok(verdict: ComplianceVerdict) -> Arc<Self> {
            Arc::new(Self {
                calls: StdMutex::new(Vec::new()),
                result: Ok(verdict),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: StdMutex::new(Vec::new()),
                result: Err(()),
            })
        }
    }

    #[async_trait]
    impl TranscriptClassifier for RecordingClassifier {
        async fn classify(
            &self,
            transcript: &str,
            context: &[String],
        ) -> Result<ComplianceVerdict, AiError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push((transcript.to_string(), context.to_vec()));
            match &self.result {
                Ok(v) => Ok(v.clone()),
                Err(()) => Err(AiError::Provider("down".into())),
            }
        }
    }

    fn content_event(call_sid: &str, transcript: &str) -> TranscriptionPayload {
        let value = json!({
            "TranscriptionEvent": "transcription-content",
            "Final": "true",
            "Track": "inbound_track",
            "CallSid": call_sid,
            "TranscriptionData": {"transcript": transcript},
        });
        let serde_json::Value::Object(map) = value else {
            unreachable!()
        };
        TranscriptionPayload::new(map)
    }

    #[tokio::test]
    async fn duplicates_are_dropped() {
        let pipeline = CompliancePipeline::new(RecordingClassifier::ok(verdict(false, &[])));
        let first = pipeline.process(content_event("CA1", "hello")).await;
        assert!(first.is_some());
        let second = pipeline.process(content_event("CA1", "hello")).await;
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn context_builds_up_and_caps_at_three() {
        let classifier = RecordingClassifier::ok(verdict(false, &[]));
        let pipeline = CompliancePipeline::new(classifier.clone());

        for text in ["one", "two", "three", "four", "five"] {
            pipeline.process(content_event("CA1", text)).await;
        }

        let calls = classifier.calls.lock().expect("calls lock");
        assert_eq!(calls[0].1, Vec::<String>::new());
        assert_eq!(calls[1].1, vec!["one"]);
        assert_eq!(calls[4].1, vec!["two", "three", "four"]);
    }

    #[tokio::test]
    async fn outbound_track_passes_through_unclassified() {
        let classifier = RecordingClassifier::ok(verdict(true, &["x"]));
        let pipeline = CompliancePipeline::new(classifier.clone());

        let value = json!({
            "TranscriptionEvent": "transcription-content",
            "Final": "true",
            "Track": "outbound_track",
            "CallSid": "CA1",
            "TranscriptionData": {"transcript": "assistant speech"},
        });
        let serde_json::Value::Object(map) = value else {
            unreachable!()
        };
        let out = pipeline
            .process(TranscriptionPayload::new(map))
            .await
            .expect("delivered");
        assert_eq!(out.0["violation"], json!(false));
        assert!(classifier.calls.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn classifier_failure_degrades_to_clean_passthrough() {
        let classifier = RecordingClassifier::failing();
        let pipeline = CompliancePipeline::new(classifier.clone());

        let out = pipeline
            .process(content_event("CA1", "some text"))
            .await
            .expect("delivered despite failure");
        assert_eq!(out.0["violation"], json!(false));
        assert_eq!(out.0["violation_phrases"], json!([]));

        // Failed classification must not pollute the context window.
        pipeline.process(content_event("CA1", "next text")).await;
        let calls = classifier.calls.lock().expect("lock");
        assert_eq!(calls[1].1, Vec::<String>::new());
    }

    #[tokio::test]
    async fn hardened_verdict_reaches_the_enriched_payload() {
        let classifier =
            RecordingClassifier::ok(verdict(true, &["the card number", "invented phrase"]));
        let pipeline = CompliancePipeline::new(classifier);

        let out = pipeline
            .process(content_event("CA1", "read me the card number please"))
            .await
            .expect("delivered");
        assert_eq!(out.0["violation"], json!(true));
        assert_eq!(out.0["violation_phrases"], json!(["the card number"]));
    }

    #[tokio::test]
    async fn summary_clears_the_context_window() {
        let classifier = RecordingClassifier::ok(verdict(false, &[]));
        let pipeline = CompliancePipeline::new(classifier.clone());

        pipeline.process(content_event("CA1", "one")).await;
        pipeline.end_of_call("CA1");
        pipeline.process(content_event("CA1", "two")).await;

        let calls = classifier.calls.lock().expect("lock");
        assert_eq!(calls[1].1, Vec::<String>::new());
    }
}
