// src/artifact/builder.rs
// Concrete ArtifactBuilder: selects candidate records for a
// subscription, anonymizes and ranks them, and renders a BuiltArtifact.
// Kept separate from scheduler/mod.rs so the dependency graph stays acyclic
// (scheduler depends on the ArtifactBuilder trait only; this module depends
// on Store).

use std::cmp::Ordering;
use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::artifact::fields;
use crate::artifact::lookup_tables::LookupTables;
use crate::domain::{ModuleKind, Role};
use crate::error::CoreError;
use crate::scheduler::{ArtifactBuilder, BuiltArtifact};
use crate::store::mirrored::MirroredRecord;
use crate::store::subscription::Subscription;
use crate::store::Store;

/// How far back a MirroredRecord can be and still be considered a candidate.
const CANDIDATE_WINDOW_DAYS: i64 = 30;
const CANDIDATE_FETCH_LIMIT: u32 = 200;

/// Cap on the achievement-keyword bonus so one overzealous headline cannot
/// dominate the ranking.
const MAX_ACHIEVEMENT_BONUS: usize = 3;

/// Subscriptions draw candidates primarily from Leads and Deals.
const MODULES_CONSIDERED: [ModuleKind; 2] = [ModuleKind::Leads, ModuleKind::Deals];

/// Audience tag convention marking a subscription as privileged; the exact
/// tag format is resolved as an Open Question in DESIGN.md.
const PRIVILEGED_AUDIENCE_TAG: &str = "privileged";

struct Candidate {
    external_id: String,
    employer: String,
    location: String,
    score: f64,
    bullet: String,
}

pub struct Builder {
    store: Store,
    tables: RwLock<LookupTables>,
    lookup_tables_path: String,
    privileged_roles: Vec<Role>,
}

impl Builder {
    pub async fn new(store: Store, lookup_tables_path: String, privileged_roles: Vec<Role>) -> Self {
        let tables = LookupTables::load(&lookup_tables_path).await.unwrap_or_else(|e| {
            warn!(error = %e, "falling back to built-in lookup tables");
            LookupTables::default_tables()
        });
        Self {
            store,
            tables: RwLock::new(tables),
            lookup_tables_path,
            privileged_roles,
        }
    }

    /// Re-read the lookup tables file and swap it in atomically. A failed
    /// reload leaves the previously loaded table in place.
    pub async fn reload(&self) -> Result<(), CoreError> {
        let fresh = LookupTables::load(&self.lookup_tables_path).await?;
        *self.tables.write() = fresh;
        Ok(())
    }

    fn is_privileged_audience(&self, subscription: &Subscription) -> bool {
        subscription.audience_tag.eq_ignore_ascii_case(PRIVILEGED_AUDIENCE_TAG)
    }

    async fn requester_role(&self, subscription: &Subscription) -> Result<Role, CoreError> {
        Ok(self.store.roles.lookup(&subscription.recipient_address).await?)
    }

    fn build_candidate(&self, module: ModuleKind, record: &MirroredRecord, filter_set: &Value) -> Option<Candidate> {
        if !passes_filters(&record.payload, filter_set) {
            return None;
        }

        let tables = self.tables.read();
        let employer = fields::extract_employer(&record.payload)
            .map(|raw| tables.normalize_employer(&raw).to_string())
            .unwrap_or_else(|| "Undisclosed firm".to_string());
        let location = fields::extract_location(&record.payload)
            .map(|raw| tables.normalize_metro(&raw).to_string())
            .unwrap_or_else(|| "Location withheld".to_string());
        let aum = fields::extract_aum(&record.payload);
        let aum_bucket = aum.map(|a| tables.aum_bucket(a).to_string());
        let compensation_text = fields::extract_compensation_range(&record.payload)
            .map(|(min, max)| format!("Target comp: ${:.0}k-${:.0}k OTE", min / 1000.0, max / 1000.0));
        let credentials = fields::extract_credentials(&record.payload);
        let is_growth = fields::extract_is_growth(&record.payload);
        let achievement_bonus = fields::count_achievement_keywords(&record.payload).min(MAX_ACHIEVEMENT_BONUS);
        let annotations: Vec<String> = fields::extract_annotations(&record.payload)
            .into_iter()
            .filter(|a| !tables.is_internal_annotation(a))
            .collect();
        drop(tables);

        // Growth outranks static metrics; financial magnitude outranks
        // credential enumeration; achievement keywords add a small, bounded
        // bonus.
        let score = (is_growth as u8 as f64) * 1_000_000.0
            + aum.unwrap_or(0.0) / 1000.0
            + credentials.len() as f64 * 10.0
            + achievement_bonus as f64;

        let mut bullet = format!("{module} — {employer} — {location}");
        if let Some(bucket) = &aum_bucket {
            bullet.push_str(&format!(" — {bucket}"));
        }
        if let Some(comp) = &compensation_text {
            bullet.push_str(&format!(" — {comp}"));
        }
        if !credentials.is_empty() {
            bullet.push_str(&format!(" — {}", credentials.join(", ")));
        }
        if is_growth {
            bullet.push_str(" — growth trajectory");
        }
        for annotation in &annotations {
            bullet.push_str(&format!(" — {annotation}"));
        }

        Some(Candidate {
            external_id: record.external_id.clone(),
            employer,
            location,
            score,
            bullet,
        })
    }

    async fn candidates(&self, subscription: &Subscription) -> Result<Vec<Candidate>, CoreError> {
        let since = Utc::now() - chrono::Duration::days(CANDIDATE_WINDOW_DAYS);
        let mut candidates = Vec::new();
        for module in MODULES_CONSIDERED {
            let records = self
                .store
                .mirrored
                .list_recent(module, since, CANDIDATE_FETCH_LIMIT)
                .await?;
            for record in &records {
                if let Some(candidate) = self.build_candidate(module, record, &subscription.filter_set) {
                    candidates.push(candidate);
                }
            }
        }
        Ok(rank_and_dedup(candidates))
    }
}

/// Location, credentials, compensation, and growth-only predicates pulled
/// from the subscription's filter set.
fn passes_filters(payload: &Value, filter_set: &Value) -> bool {
    if let Some(location_filter) = filter_set.get("location").and_then(Value::as_str) {
        let needle = location_filter.to_ascii_lowercase();
        match fields::extract_location(payload) {
            Some(loc) if loc.to_ascii_lowercase().contains(&needle) => {}
            _ => return false,
        }
    }

    if let Some(required) = filter_set.get("credentials").and_then(Value::as_array) {
        let required: Vec<String> = required
            .iter()
            .filter_map(|v| v.as_str().map(str::to_ascii_uppercase))
            .collect();
        if !required.is_empty() {
            let have: Vec<String> = fields::extract_credentials(payload)
                .into_iter()
                .map(|c| c.to_ascii_uppercase())
                .collect();
            if !required.iter().any(|r| have.contains(r)) {
                return false;
            }
        }
    }

    if let Some(min_compensation) = filter_set.get("min_compensation").and_then(Value::as_f64) {
        match fields::extract_compensation_range(payload) {
            Some((_, max)) if max >= min_compensation => {}
            _ => return false,
        }
    }

    if filter_set.get("growth_only").and_then(Value::as_bool).unwrap_or(false)
        && !fields::extract_is_growth(payload)
    {
        return false;
    }

    true
}

/// Sort by descending score (external id as a deterministic tiebreaker),
/// then collapse same-employer/same-location duplicates, keeping the first
/// (highest-scoring) instance of each.
fn rank_and_dedup(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.external_id.cmp(&b.external_id))
    });

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert((c.employer.clone(), c.location.clone())))
        .collect()
}

#[async_trait]
impl ArtifactBuilder for Builder {
    async fn build(&self, subscription: &Subscription) -> Result<BuiltArtifact, CoreError> {
        if self.is_privileged_audience(subscription) {
            let role = self.requester_role(subscription).await?;
            if !self.privileged_roles.contains(&role) {
                return Ok(BuiltArtifact {
                    subject: format!("{} digest", subscription.audience_tag),
                    body: "No items available for your current access level.".to_string(),
                    item_count: 0,
                });
            }
        }

        let candidates = self.candidates(subscription).await?;
        let take = subscription.max_items.max(0) as usize;
        let selected: Vec<Candidate> = candidates.into_iter().take(take).collect();

        let subject = format!("Your {} digest — {} item(s)", subscription.audience_tag, selected.len());
        let body = if selected.is_empty() {
            "No new matches since your last digest.".to_string()
        } else {
            selected.iter().map(|c| format!("- {}", c.bullet)).collect::<Vec<_>>().join("\n")
        };

        Ok(BuiltArtifact {
            subject,
            body,
            item_count: selected.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Cadence;
    use serde_json::json;

    async fn seeded_subscription(store: &Store, audience_tag: &str, recipient: &str, max_items: i64, filter_set: Value) -> Subscription {
        store
            .subscriptions
            .create(
                "user-1",
                recipient,
                audience_tag,
                Cadence::Weekly,
                max_items,
                "UTC",
                true,
                None,
                &filter_set,
            )
            .await
            .unwrap()
    }

    async fn seed_record(store: &Store, module: ModuleKind, external_id: &str, payload: Value) {
        store
            .mirrored
            .insert(module, external_id, None, None, None, Utc::now(), &payload)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn privileged_audience_is_empty_for_non_privileged_role() {
        let store = Store::in_memory().await;
        store.roles.set("recruiter@example.com", Role::Recruiter).await.unwrap();
        seed_record(&store, ModuleKind::Leads, "1", json!({"Employer": "Acme", "Location": "Chicago"})).await;
        let subscription = seeded_subscription(&store, "privileged", "recruiter@example.com", 5, json!({})).await;

        let builder = Builder::new(store.clone(), "nonexistent.yaml".into(), vec![Role::Executive, Role::Admin]).await;
        let artifact = builder.build(&subscription).await.unwrap();
        assert_eq!(artifact.item_count, 0);
    }

    #[tokio::test]
    async fn privileged_audience_is_populated_for_privileged_role() {
        let store = Store::in_memory().await;
        store.roles.set("exec@example.com", Role::Executive).await.unwrap();
        seed_record(&store, ModuleKind::Leads, "1", json!({"Employer": "Acme", "Location": "Chicago"})).await;
        let subscription = seeded_subscription(&store, "privileged", "exec@example.com", 5, json!({})).await;

        let builder = Builder::new(store.clone(), "nonexistent.yaml".into(), vec![Role::Executive, Role::Admin]).await;
        let artifact = builder.build(&subscription).await.unwrap();
        assert_eq!(artifact.item_count, 1);
    }

    #[tokio::test]
    async fn growth_candidates_rank_above_static_ones() {
        let store = Store::in_memory().await;
        seed_record(
            &store,
            ModuleKind::Leads,
            "static",
            json!({"Employer": "Static Co", "Location": "Denver", "AUM": 900_000_000.0}),
        )
        .await;
        seed_record(
            &store,
            ModuleKind::Leads,
            "growth",
            json!({"Employer": "Growth Co", "Location": "Austin", "Growth_Metric": true, "AUM": 1_000_000.0}),
        )
        .await;
        let subscription = seeded_subscription(&store, "general", "user@example.com", 5, json!({})).await;

        let builder = Builder::new(store.clone(), "nonexistent.yaml".into(), vec![]).await;
        let artifact = builder.build(&subscription).await.unwrap();
        let growth_pos = artifact.body.find("Growth Co").unwrap();
        let static_pos = artifact.body.find("Static Co").unwrap();
        assert!(growth_pos < static_pos);
    }

    #[tokio::test]
    async fn location_filter_excludes_non_matching_records() {
        let store = Store::in_memory().await;
        seed_record(&store, ModuleKind::Leads, "1", json!({"Employer": "Acme", "Location": "Chicago, IL"})).await;
        seed_record(&store, ModuleKind::Leads, "2", json!({"Employer": "Beta", "Location": "Austin, TX"})).await;
        let subscription = seeded_subscription(&store, "general", "user@example.com", 5, json!({"location": "austin"})).await;

        let builder = Builder::new(store.clone(), "nonexistent.yaml".into(), vec![]).await;
        let artifact = builder.build(&subscription).await.unwrap();
        assert_eq!(artifact.item_count, 1);
        assert!(artifact.body.contains("Beta"));
    }

    #[tokio::test]
    async fn truncates_to_max_items_without_synthesizing_filler() {
        let store = Store::in_memory().await;
        for i in 0..5 {
            seed_record(
                &store,
                ModuleKind::Leads,
                &i.to_string(),
                json!({"Employer": format!("Firm {i}"), "Location": format!("City {i}")}),
            )
            .await;
        }
        let subscription = seeded_subscription(&store, "general", "user@example.com", 2, json!({})).await;

        let builder = Builder::new(store.clone(), "nonexistent.yaml".into(), vec![]).await;
        let artifact = builder.build(&subscription).await.unwrap();
        assert_eq!(artifact.item_count, 2);
    }

    #[tokio::test]
    async fn internal_annotations_are_never_rendered() {
        let store = Store::in_memory().await;
        seed_record(
            &store,
            ModuleKind::Leads,
            "1",
            json!({
                "Employer": "Acme",
                "Location": "Chicago",
                "Annotations": ["Internal: do not forward", "Strong referral"],
            }),
        )
        .await;
        let subscription = seeded_subscription(&store, "general", "user@example.com", 5, json!({})).await;

        let builder = Builder::new(store.clone(), "nonexistent.yaml".into(), vec![]).await;
        let artifact = builder.build(&subscription).await.unwrap();
        assert!(!artifact.body.contains("do not forward"));
        assert!(artifact.body.contains("Strong referral"));
    }
}
