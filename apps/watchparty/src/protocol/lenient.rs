//! Field-level deserializers that turn malformed numbers into "absent"
//! instead of failing the whole message.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::PlayState;

/// A playback position in seconds: finite and non-negative, zero included.
pub fn position<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(sanitize_position))
}

pub fn sanitize_position(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .filter(|pos| pos.is_finite() && *pos >= 0.0)
}

/// A millisecond timestamp. Fractional values are truncated; zero and
/// negatives are rejected.
pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(sanitize_timestamp))
}

pub fn sanitize_timestamp(value: &Value) -> Option<u64> {
    if let Some(ts) = value.as_u64() {
        return (ts > 0).then_some(ts);
    }
    value
        .as_f64()
        .filter(|ts| ts.is_finite() && *ts >= 1.0)
        .map(|ts| ts as u64)
}

pub fn count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok()))
}

pub fn play_state<'de, D>(deserializer: D) -> Result<Option<PlayState>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value.as_ref().and_then(Value::as_str) {
        Some("playing") => Some(PlayState::Playing),
        Some("paused") => Some(PlayState::Paused),
        _ => None,
    })
}

pub fn string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_position_is_kept() {
        assert_eq!(sanitize_position(&json!(0)), Some(0.0));
        assert_eq!(sanitize_position(&json!(0.0)), Some(0.0));
    }

    #[test]
    fn garbage_positions_are_absent() {
        assert_eq!(sanitize_position(&json!(-1.5)), None);
        assert_eq!(sanitize_position(&json!("12")), None);
        assert_eq!(sanitize_position(&Value::Null), None);
    }

    #[test]
    fn timestamps_accept_floats() {
        assert_eq!(sanitize_timestamp(&json!(1_700_000_000_123u64)), Some(1_700_000_000_123));
        assert_eq!(sanitize_timestamp(&json!(1_700_000_000_123.7)), Some(1_700_000_000_123));
        assert_eq!(sanitize_timestamp(&json!(-5)), None);
        assert_eq!(sanitize_timestamp(&json!(0)), None);
    }
}
