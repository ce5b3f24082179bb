// src/conversation/classifier.rs
// IntentClassifier seam plus the one in-tree implementation.
// A real NLU provider is out-of-scope; KeywordIntentClassifier
// is both the documented "keyword heuristic fallback" and the only
// classifier this crate ships, so it doubles as ConversationCore's primary
// classifier in tests and in a deployment with no external provider wired
// up.

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use crate::error::ClassifierError;
use crate::store::conversation::ConversationTurn;

#[derive(Debug, Clone)]
pub struct ClassifiedIntent {
    pub intent_kind: String,
    pub confidence: f32,
    pub entities: serde_json::Value,
    pub missing_entities: Vec<String>,
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        history: &[ConversationTurn],
    ) -> Result<ClassifiedIntent, ClassifierError>;
}

pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    fn extract_location(text: &str) -> Option<String> {
        let pattern = Regex::new(r"(?i)\bin ([a-z][a-z .]*)$").expect("valid pattern");
        pattern
            .captures(text.trim())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(
        &self,
        text: &str,
        _history: &[ConversationTurn],
    ) -> Result<ClassifiedIntent, ClassifierError> {
        let lower = text.to_ascii_lowercase();

        if lower.contains("status") || lower.contains("sync") {
            return Ok(ClassifiedIntent {
                intent_kind: "sync_status".into(),
                confidence: 0.9,
                entities: json!({}),
                missing_entities: vec![],
            });
        }

        if lower.contains("conflict") {
            return Ok(ClassifiedIntent {
                intent_kind: "conflict_report".into(),
                confidence: 0.9,
                entities: json!({}),
                missing_entities: vec![],
            });
        }

        if lower.contains("candidate") || lower.contains("lead") || lower.contains("search") {
            let location = Self::extract_location(text);
            let missing = if location.is_none() { vec!["location".to_string()] } else { vec![] };
            return Ok(ClassifiedIntent {
                intent_kind: "candidate_search".into(),
                confidence: 0.9,
                entities: json!({ "location": location }),
                missing_entities: missing,
            });
        }

        Ok(ClassifiedIntent {
            intent_kind: "unknown".into(),
            confidence: 0.4,
            entities: json!({}),
            missing_entities: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recognizes_sync_status_intent() {
        let classifier = KeywordIntentClassifier;
        let result = classifier.classify("what's the sync status for leads", &[]).await.unwrap();
        assert_eq!(result.intent_kind, "sync_status");
        assert!(result.confidence >= 0.8);
    }

    #[tokio::test]
    async fn recognizes_conflict_report_intent() {
        let classifier = KeywordIntentClassifier;
        let result = classifier.classify("any conflicts today?", &[]).await.unwrap();
        assert_eq!(result.intent_kind, "conflict_report");
    }

    #[tokio::test]
    async fn candidate_search_without_location_is_missing_entity() {
        let classifier = KeywordIntentClassifier;
        let result = classifier.classify("find me a candidate", &[]).await.unwrap();
        assert_eq!(result.intent_kind, "candidate_search");
        assert_eq!(result.missing_entities, vec!["location".to_string()]);
    }

    #[tokio::test]
    async fn candidate_search_with_location_has_no_missing_entity() {
        let classifier = KeywordIntentClassifier;
        let result = classifier.classify("find me a candidate in Chicago", &[]).await.unwrap();
        assert!(result.missing_entities.is_empty());
        assert_eq!(result.entities.get("location").and_then(|v| v.as_str()), Some("Chicago"));
    }

    #[tokio::test]
    async fn unrecognized_text_is_low_confidence() {
        let classifier = KeywordIntentClassifier;
        let result = classifier.classify("blah blah blah", &[]).await.unwrap();
        assert!(result.confidence < 0.8);
    }
}
