// src/artifact/fields.rs
// Typed accessors over the candidate payload fields ArtifactBuilder actually
// reads, same discipline as `sync::payload` but for the
// digest-ranking fields instead of the sync-arbitration fields.

use serde_json::Value;

pub fn extract_employer(payload: &Value) -> Option<String> {
    payload.get("Employer").and_then(Value::as_str).map(str::to_string)
}

pub fn extract_aum(payload: &Value) -> Option<f64> {
    payload.get("AUM").and_then(Value::as_f64)
}

pub fn extract_compensation_range(payload: &Value) -> Option<(f64, f64)> {
    let min = payload.get("Compensation_Min").and_then(Value::as_f64)?;
    let max = payload.get("Compensation_Max").and_then(Value::as_f64)?;
    Some((min, max))
}

pub fn extract_location(payload: &Value) -> Option<String> {
    payload.get("Location").and_then(Value::as_str).map(str::to_string)
}

pub fn extract_credentials(payload: &Value) -> Vec<String> {
    payload
        .get("Credentials")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Free-text notes attached to the record, some of which are internal
/// shorthand that must never reach a recipient.
pub fn extract_annotations(payload: &Value) -> Vec<String> {
    payload
        .get("Annotations")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

pub fn extract_is_growth(payload: &Value) -> bool {
    payload.get("Growth_Metric").and_then(Value::as_bool).unwrap_or(false)
}

/// Count of recognized achievement keywords in the headline/summary text,
/// capped by the caller before it factors into ranking.
pub fn count_achievement_keywords(payload: &Value) -> usize {
    const KEYWORDS: &[&str] = &["award", "top producer", "president's club", "promoted", "recognized"];
    let text = payload
        .get("Headline")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_ascii_lowercase();
    KEYWORDS.iter().filter(|k| text.contains(*k)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_known_fields() {
        let payload = json!({
            "Employer": "Acme Wealth",
            "AUM": 125_000_000.0,
            "Compensation_Min": 150_000.0,
            "Compensation_Max": 220_000.0,
            "Location": "Chicago, IL",
            "Credentials": ["CFA", "CFP"],
            "Annotations": ["internal: do not share comp band"],
            "Growth_Metric": true,
            "Headline": "Top Producer, promoted to SVP",
        });

        assert_eq!(extract_employer(&payload).as_deref(), Some("Acme Wealth"));
        assert_eq!(extract_aum(&payload), Some(125_000_000.0));
        assert_eq!(extract_compensation_range(&payload), Some((150_000.0, 220_000.0)));
        assert_eq!(extract_location(&payload).as_deref(), Some("Chicago, IL"));
        assert_eq!(extract_credentials(&payload), vec!["CFA".to_string(), "CFP".to_string()]);
        assert!(extract_is_growth(&payload));
        assert_eq!(count_achievement_keywords(&payload), 2);
    }

    #[test]
    fn missing_fields_default_sensibly() {
        let payload = json!({});
        assert_eq!(extract_employer(&payload), None);
        assert_eq!(extract_aum(&payload), None);
        assert!(extract_credentials(&payload).is_empty());
        assert!(!extract_is_growth(&payload));
        assert_eq!(count_achievement_keywords(&payload), 0);
    }
}
