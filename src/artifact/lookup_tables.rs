// src/artifact/lookup_tables.rs
// Versioned anonymization lookup tables.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AumBucket {
    /// Upper bound of this bucket, in dollars. Buckets are evaluated in
    /// ascending `max` order; the first bucket an amount fits under wins.
    pub max: f64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLookupTables {
    #[serde(default)]
    pub employer_equivalence: HashMap<String, String>,
    #[serde(default)]
    pub aum_buckets: Vec<AumBucket>,
    #[serde(default)]
    pub internal_annotation_patterns: Vec<String>,
    #[serde(default)]
    pub metro_equivalence: HashMap<String, String>,
    #[serde(default = "default_overflow_label")]
    pub aum_overflow_label: String,
}

fn default_overflow_label() -> String {
    "$1B+".to_string()
}

impl Default for RawLookupTables {
    fn default() -> Self {
        Self {
            employer_equivalence: HashMap::new(),
            aum_buckets: vec![
                AumBucket { max: 50_000_000.0, label: "Under $50M AUM".into() },
                AumBucket { max: 100_000_000.0, label: "$50M-$100M AUM".into() },
                AumBucket { max: 250_000_000.0, label: "$100M-$250M AUM".into() },
                AumBucket { max: 500_000_000.0, label: "$250M-$500M AUM".into() },
                AumBucket { max: 1_000_000_000.0, label: "$500M-$1B AUM".into() },
            ],
            internal_annotation_patterns: vec!["(?i)^internal".to_string(), "(?i)do not share".to_string()],
            metro_equivalence: HashMap::new(),
            aum_overflow_label: default_overflow_label(),
        }
    }
}

/// The parsed table plus its compiled regex set, kept together so patterns
/// are only compiled once per load/reload rather than once per candidate.
pub struct LookupTables {
    raw: RawLookupTables,
    compiled_patterns: Vec<Regex>,
}

impl LookupTables {
    pub fn from_raw(raw: RawLookupTables) -> Result<Self, CoreError> {
        let compiled_patterns = raw
            .internal_annotation_patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| CoreError::Internal(format!("bad annotation pattern {p}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { raw, compiled_patterns })
    }

    pub fn default_tables() -> Self {
        Self::from_raw(RawLookupTables::default()).expect("built-in defaults always compile")
    }

    /// Load from a YAML file at `path`, falling back to the built-in
    /// defaults if the file doesn't exist yet (so a fresh deployment works
    /// before an operator has populated the table).
    pub async fn load(path: &str) -> Result<Self, CoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let raw: RawLookupTables = serde_yaml::from_str(&contents)
                    .map_err(|e| CoreError::Internal(format!("invalid lookup tables at {path}: {e}")))?;
                Self::from_raw(raw)
            }
            Err(_) => Ok(Self::default_tables()),
        }
    }

    pub fn normalize_employer<'a>(&'a self, name: &'a str) -> &'a str {
        self.raw.employer_equivalence.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn normalize_metro<'a>(&'a self, location: &'a str) -> &'a str {
        self.raw.metro_equivalence.get(location).map(String::as_str).unwrap_or(location)
    }

    pub fn aum_bucket(&self, aum: f64) -> &str {
        self.raw
            .aum_buckets
            .iter()
            .find(|bucket| aum <= bucket.max)
            .map(|bucket| bucket.label.as_str())
            .unwrap_or(self.raw.aum_overflow_label.as_str())
    }

    pub fn is_internal_annotation(&self, text: &str) -> bool {
        self.compiled_patterns.iter().any(|re| re.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tables_bucket_known_amounts() {
        let tables = LookupTables::default_tables();
        assert_eq!(tables.aum_bucket(30_000_000.0), "Under $50M AUM");
        assert_eq!(tables.aum_bucket(120_000_000.0), "$100M-$250M AUM");
        assert_eq!(tables.aum_bucket(5_000_000_000.0), "$1B+");
    }

    #[test]
    fn internal_annotations_are_flagged() {
        let tables = LookupTables::default_tables();
        assert!(tables.is_internal_annotation("Internal: do not forward"));
        assert!(tables.is_internal_annotation("please do not share comp band"));
        assert!(!tables.is_internal_annotation("Strong candidate, referred by exec sponsor"));
    }

    #[test]
    fn unmapped_employer_passes_through_unchanged() {
        let tables = LookupTables::default_tables();
        assert_eq!(tables.normalize_employer("Acme Wealth"), "Acme Wealth");
    }

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let tables = LookupTables::load("/nonexistent/lookup_tables.yaml").await.unwrap();
        assert_eq!(tables.aum_bucket(10_000_000.0), "Under $50M AUM");
    }
}
