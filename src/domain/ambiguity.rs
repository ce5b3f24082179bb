// src/domain/ambiguity.rs
// Ambiguity kinds a ClarificationSession can be raised for

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityKind {
    MissingTimeframe,
    MissingEntity,
    VagueSearch,
    MultipleMatches,
    AmbiguousQuery,
    MultipleIntents,
}

impl AmbiguityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmbiguityKind::MissingTimeframe => "missing_timeframe",
            AmbiguityKind::MissingEntity => "missing_entity",
            AmbiguityKind::VagueSearch => "vague_search",
            AmbiguityKind::MultipleMatches => "multiple_matches",
            AmbiguityKind::AmbiguousQuery => "ambiguous_query",
            AmbiguityKind::MultipleIntents => "multiple_intents",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "missing_timeframe" => Some(AmbiguityKind::MissingTimeframe),
            "missing_entity" => Some(AmbiguityKind::MissingEntity),
            "vague_search" => Some(AmbiguityKind::VagueSearch),
            "multiple_matches" => Some(AmbiguityKind::MultipleMatches),
            "ambiguous_query" => Some(AmbiguityKind::AmbiguousQuery),
            "multiple_intents" => Some(AmbiguityKind::MultipleIntents),
            _ => None,
        }
    }
}
