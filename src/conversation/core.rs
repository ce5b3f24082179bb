// src/conversation/core.rs
// ConversationCore state machine: idle -> classifying ->
// (clarifying <-> classifying) -> answering -> idle, one instance shared
// across all users, keyed internally by user id.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use crate::artifact::fields;
use crate::conversation::classifier::{ClassifiedIntent, IntentClassifier, KeywordIntentClassifier};
use crate::config::conversation::ConversationConfig;
use crate::dedup::DedupCache;
use crate::domain::{AmbiguityKind, ModuleKind};
use crate::error::CoreError;
use crate::store::clarification::ClarificationSession;
use crate::store::conversation::TurnRole;
use crate::store::Store;
use crate::utils::hash::sha256_hash;

pub struct ConversationCore {
    store: Store,
    dedup: Arc<DedupCache>,
    classifier: Arc<dyn IntentClassifier>,
    config: ConversationConfig,
}

impl ConversationCore {
    pub fn new(
        store: Store,
        dedup: Arc<DedupCache>,
        classifier: Arc<dyn IntentClassifier>,
        config: ConversationConfig,
    ) -> Self {
        Self { store, dedup, classifier, config }
    }

    /// Entry point for one inbound user message. Returns the text reply to
    /// send back to the user.
    pub async fn handle_message(&self, user_id: &str, text: &str) -> Result<String, CoreError> {
        let dedup_key = format!("conv_inbound:{}:{}", user_id, sha256_hash(text));
        if self.dedup.contains(&dedup_key) {
            return Ok("Already working on your previous message — one moment.".to_string());
        }
        self.dedup.insert(&dedup_key, "1");

        self.store.conversation.append(user_id, TurnRole::User, text, None, None).await?;

        if let Some(session) = self.store.clarifications.latest_open_for_user(user_id).await? {
            if !session.is_expired(Utc::now()) {
                return self.handle_clarifying_reply(user_id, text, session).await;
            }
            // Lapsed session: transition clarifying -> idle before treating
            // this message as a fresh one.
            self.store.clarifications.cancel(&session.id).await?;
        }

        self.classify_and_respond(user_id, text, None).await
    }

    async fn handle_clarifying_reply(
        &self,
        user_id: &str,
        text: &str,
        session: ClarificationSession,
    ) -> Result<String, CoreError> {
        if is_cancel_phrase(text) {
            self.store.clarifications.cancel(&session.id).await?;
            let reply = "Okay, cancelled. Let me know if you'd like to try again.".to_string();
            self.store.conversation.append(user_id, TurnRole::Assistant, &reply, None, None).await?;
            return Ok(reply);
        }

        match resolve_reply(text, &session.options, self.config.fuzzy_match_threshold) {
            Some(index) => {
                let resolved_value = session.options[index].clone();
                self.store.clarifications.resolve(&session.id, &resolved_value).await?;

                let merged = merge_slot(
                    session.partial_intent.clone().unwrap_or_else(|| Value::Object(Default::default())),
                    session.ambiguity_kind,
                    &resolved_value,
                );

                self.classify_and_respond(user_id, &session.original_query, Some(merged)).await
            }
            None => {
                let reply = render_clarification_prompt(session.ambiguity_kind, &session.options);
                self.store.conversation.append(user_id, TurnRole::Assistant, &reply, None, None).await?;
                Ok(reply)
            }
        }
    }

    async fn classify_and_respond(
        &self,
        user_id: &str,
        query_text: &str,
        merged: Option<Value>,
    ) -> Result<String, CoreError> {
        let history = self
            .store
            .conversation
            .recent(user_id, self.config.hot_window_turns as u32)
            .await?;

        let classified = match self.classifier.classify(query_text, &history).await {
            Ok(c) => c,
            Err(primary_err) => {
                warn!(error = %primary_err, "intent classifier unavailable, falling back to keyword heuristic");
                match KeywordIntentClassifier.classify(query_text, &history).await {
                    Ok(c) => c,
                    Err(_) => {
                        let reply =
                            "I'm not able to understand that right now — could you try rephrasing?".to_string();
                        self.store.conversation.append(user_id, TurnRole::Assistant, &reply, None, None).await?;
                        return Ok(reply);
                    }
                }
            }
        };

        let entities = overlay(classified.entities.clone(), merged);
        let still_missing: Vec<&String> = classified
            .missing_entities
            .iter()
            .filter(|slot| entities.get(slot.as_str()).and_then(Value::as_str).is_none())
            .collect();

        if classified.confidence >= self.config.confidence_threshold && still_missing.is_empty() {
            let reply = self.render_answer(&classified.intent_kind, &entities).await?;
            self.store
                .conversation
                .append(user_id, TurnRole::Assistant, &reply, Some(&classified.intent_kind), Some(classified.confidence))
                .await?;
            return Ok(reply);
        }

        let ambiguity_kind = if !still_missing.is_empty() {
            AmbiguityKind::MissingEntity
        } else {
            AmbiguityKind::AmbiguousQuery
        };
        let options = self.clarification_options(ambiguity_kind, &classified).await?;
        let session = self
            .store
            .clarifications
            .create(
                user_id,
                query_text,
                ambiguity_kind,
                &options,
                Some(&entities),
                self.config.clarification_ttl_seconds,
            )
            .await?;

        let reply = render_clarification_prompt(ambiguity_kind, &session.options);
        self.store
            .conversation
            .append(user_id, TurnRole::Assistant, &reply, Some(&classified.intent_kind), Some(classified.confidence))
            .await?;
        Ok(reply)
    }

    async fn render_answer(&self, intent_kind: &str, entities: &Value) -> Result<String, CoreError> {
        match intent_kind {
            "sync_status" => {
                let rows = self.store.sync_metadata.list_all().await?;
                let lines: Vec<String> = rows.iter().map(|m| format!("{}: {}", m.module, m.sync_status)).collect();
                Ok(format!("Sync status — {}", lines.join(", ")))
            }
            "conflict_report" => {
                let conflicts = self.store.conflicts.list(None, true, 5, 0).await?;
                if conflicts.is_empty() {
                    Ok("No unresolved conflicts right now.".to_string())
                } else {
                    Ok(format!("{} unresolved conflict(s) pending review.", conflicts.len()))
                }
            }
            "candidate_search" => {
                let location = entities.get("location").and_then(Value::as_str).unwrap_or("your area");
                Ok(format!("Searching candidates in {location}. I'll follow up with matches shortly."))
            }
            _ => Ok("Here's what I found for your request.".to_string()),
        }
    }

    async fn clarification_options(
        &self,
        ambiguity_kind: AmbiguityKind,
        classified: &ClassifiedIntent,
    ) -> Result<Vec<String>, CoreError> {
        if ambiguity_kind == AmbiguityKind::MissingEntity
            && classified.missing_entities.iter().any(|slot| slot == "location")
        {
            return self.recent_metro_options().await;
        }

        Ok(["Leads", "Deals", "Contacts", "Accounts"]
            .into_iter()
            .map(str::to_string)
            .take(self.config.max_options)
            .collect())
    }

    async fn recent_metro_options(&self) -> Result<Vec<String>, CoreError> {
        let since = Utc::now() - chrono::Duration::days(30);
        let records = self.store.mirrored.list_recent(ModuleKind::Leads, since, 50).await?;

        let mut seen = HashSet::new();
        let mut options = Vec::new();
        for record in records {
            if let Some(location) = fields::extract_location(&record.payload) {
                if seen.insert(location.clone()) {
                    options.push(location);
                    if options.len() >= self.config.max_options {
                        break;
                    }
                }
            }
        }
        if options.is_empty() {
            options.push("Any location".to_string());
        }
        Ok(options)
    }
}

fn is_cancel_phrase(text: &str) -> bool {
    matches!(text.trim().to_ascii_lowercase().as_str(), "cancel" | "nevermind" | "never mind" | "stop")
}

fn overlay(base: Value, patch: Option<Value>) -> Value {
    let Some(patch) = patch else { return base };
    match (base, patch) {
        (Value::Object(mut target), Value::Object(source)) => {
            for (key, value) in source {
                target.insert(key, value);
            }
            Value::Object(target)
        }
        (_, patch) => patch,
    }
}

fn merge_slot(partial: Value, ambiguity_kind: AmbiguityKind, resolved_value: &str) -> Value {
    let mut map = match partial {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    map.insert("resolved_slot".to_string(), Value::String(resolved_value.to_string()));
    if ambiguity_kind == AmbiguityKind::MissingEntity {
        map.insert("location".to_string(), Value::String(resolved_value.to_string()));
    }
    Value::Object(map)
}

/// Resolve a clarifying reply against the presented options: an exact
/// 1-based number, a `#n` token, or a free-text fuzzy match above the
/// configured similarity threshold.
fn resolve_reply(reply: &str, options: &[String], fuzzy_threshold: f32) -> Option<usize> {
    let trimmed = reply.trim();

    if let Some(rest) = trimmed.strip_prefix('#') {
        if let Ok(n) = rest.parse::<usize>() {
            if n >= 1 && n <= options.len() {
                return Some(n - 1);
            }
        }
    }

    if let Ok(n) = trimmed.parse::<usize>() {
        if n >= 1 && n <= options.len() {
            return Some(n - 1);
        }
    }

    let mut best: Option<(usize, f32)> = None;
    for (i, option) in options.iter().enumerate() {
        let score = token_similarity(trimmed, option);
        if score >= fuzzy_threshold && best.map(|(_, b)| score > b).unwrap_or(true) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

fn token_similarity(a: &str, b: &str) -> f32 {
    let a_tokens: HashSet<String> = a.to_ascii_lowercase().split_whitespace().map(str::to_string).collect();
    let b_tokens: HashSet<String> = b.to_ascii_lowercase().split_whitespace().map(str::to_string).collect();
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0.0;
    }
    let intersection = a_tokens.intersection(&b_tokens).count() as f32;
    let union = a_tokens.union(&b_tokens).count() as f32;
    intersection / union
}

fn render_clarification_prompt(ambiguity_kind: AmbiguityKind, options: &[String]) -> String {
    let numbered: Vec<String> = options.iter().enumerate().map(|(i, o)| format!("#{} {o}", i + 1)).collect();
    format!(
        "I need a bit more detail ({}). Choose one: {}",
        ambiguity_kind.as_str().replace('_', " "),
        numbered.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    fn test_config() -> ConversationConfig {
        ConversationConfig {
            clarification_ttl_seconds: 300,
            clarification_reap_hours: 24,
            memory_retention_days: 30,
            confidence_threshold: 0.8,
            fuzzy_match_threshold: 0.6,
            max_options: 5,
            hot_window_turns: 10,
        }
    }

    struct FixedClassifier(ClassifiedIntent);

    #[async_trait]
    impl IntentClassifier for FixedClassifier {
        async fn classify(
            &self,
            _text: &str,
            _history: &[crate::store::conversation::ConversationTurn],
        ) -> Result<ClassifiedIntent, crate::error::ClassifierError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn high_confidence_answers_directly() {
        let store = Store::in_memory().await;
        let dedup = Arc::new(DedupCache::new(600));
        let classifier = Arc::new(FixedClassifier(ClassifiedIntent {
            intent_kind: "sync_status".into(),
            confidence: 0.95,
            entities: json!({}),
            missing_entities: vec![],
        }));
        let core = ConversationCore::new(store.clone(), dedup, classifier, test_config());

        let reply = core.handle_message("user-1", "what's the sync status").await.unwrap();
        assert!(reply.starts_with("Sync status"));

        let turns = store.conversation.recent("user-1", 10).await.unwrap();
        assert_eq!(turns.len(), 2);
    }

    #[tokio::test]
    async fn missing_entity_opens_clarification_and_resolves_by_number() {
        let store = Store::in_memory().await;
        let dedup = Arc::new(DedupCache::new(600));
        let classifier = Arc::new(FixedClassifier(ClassifiedIntent {
            intent_kind: "candidate_search".into(),
            confidence: 0.9,
            entities: json!({ "location": Value::Null }),
            missing_entities: vec!["location".to_string()],
        }));
        let core = ConversationCore::new(store.clone(), dedup, classifier, test_config());

        let reply = core.handle_message("user-2", "find me a candidate").await.unwrap();
        assert!(reply.contains("Choose one"));

        let open = store.clarifications.latest_open_for_user("user-2").await.unwrap();
        assert!(open.is_some());

        let reply2 = core.handle_message("user-2", "#1").await.unwrap();
        assert!(reply2.contains("Searching candidates"));

        let open_after = store.clarifications.latest_open_for_user("user-2").await.unwrap();
        assert!(open_after.is_none());
    }

    #[tokio::test]
    async fn cancel_phrase_ends_clarification() {
        let store = Store::in_memory().await;
        let dedup = Arc::new(DedupCache::new(600));
        let classifier = Arc::new(FixedClassifier(ClassifiedIntent {
            intent_kind: "candidate_search".into(),
            confidence: 0.9,
            entities: json!({ "location": Value::Null }),
            missing_entities: vec!["location".to_string()],
        }));
        let core = ConversationCore::new(store.clone(), dedup, classifier, test_config());

        core.handle_message("user-3", "find me a candidate").await.unwrap();
        let reply = core.handle_message("user-3", "cancel").await.unwrap();
        assert!(reply.contains("cancelled"));

        let open = store.clarifications.latest_open_for_user("user-3").await.unwrap();
        assert!(open.is_none());
    }

    #[test]
    fn resolve_reply_matches_hash_token() {
        let options = vec!["Chicago".to_string(), "Austin".to_string()];
        assert_eq!(resolve_reply("#2", &options, 0.6), Some(1));
        assert_eq!(resolve_reply("2", &options, 0.6), Some(1));
        assert_eq!(resolve_reply("austin please", &options, 0.3), Some(1));
        assert_eq!(resolve_reply("nothing like it", &options, 0.6), None);
    }
}
