//! Structured record decoding.
//!
//! A record is one JSON object carrying a `"Time"` field and one field named after the
//! channel, both holding the payload as a digit string:
//!
//! ```json
//! {"Time": "12", "Signal_0": "7"}
//! ```
//!
//! Fields are looked up by name, never by position. JSON numbers are accepted as well as
//! strings, and non-integral values are truncated toward zero.

use crate::error::RecordError;
use crate::store::{ChannelId, Sample};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Name of the timestamp field.
pub const TIME_FIELD: &str = "Time";

/// One JSON object received from a producer.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRecord {
    fields: Map<String, Value>,
}

impl StructuredRecord {
    /// Build a record from a parsed JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(RecordError::NotAnObject(json_kind(&other))),
        }
    }

    /// Build the canonical two-field record for one sample.
    pub fn from_sample(channel: &ChannelId, sample: Sample) -> Self {
        let mut fields = Map::new();
        fields.insert(TIME_FIELD.to_string(), Value::String(sample.timestamp.to_string()));
        fields.insert(channel.to_string(), Value::String(sample.value.to_string()));
        Self { fields }
    }

    /// Field lookup by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Borrow the underlying JSON object.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Serialize back to compact JSON text.
    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

impl FromStr for StructuredRecord {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: Value =
            serde_json::from_str(s).map_err(|e| RecordError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }
}

impl TryFrom<Value> for StructuredRecord {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

/// Turns structured records into `(ChannelId, Sample)` pairs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordDecoder;

impl RecordDecoder {
    /// Decode one record.
    ///
    /// The channel field is the single field other than `"Time"`. When a record carries
    /// extra fields, only those whose value reads as a sample value are candidates, and
    /// exactly one candidate must remain.
    pub fn decode(record: &StructuredRecord) -> Result<(ChannelId, Sample), RecordError> {
        let time = record.get(TIME_FIELD).ok_or(RecordError::MissingTime)?;
        let timestamp = parse_field(TIME_FIELD, time)?;

        let (channel, raw) = Self::channel_field(record)?;
        let value = parse_field(channel, raw)?;

        Ok((ChannelId::new(channel), Sample::new(value, timestamp)))
    }

    fn channel_field(record: &StructuredRecord) -> Result<(&str, &Value), RecordError> {
        let others: Vec<(&String, &Value)> = record
            .fields()
            .iter()
            .filter(|(name, _)| name.as_str() != TIME_FIELD)
            .collect();

        match others.as_slice() {
            [] => Err(RecordError::MissingChannel),
            [(name, value)] => Ok((name.as_str(), *value)),
            _ => {
                let numeric: Vec<&(&String, &Value)> = others
                    .iter()
                    .filter(|(_, value)| value_text(value).and_then(parse_sample_value).is_ok())
                    .collect();

                match numeric.as_slice() {
                    [] => Err(RecordError::MissingChannel),
                    [(name, value)] => Ok((name.as_str(), *value)),
                    many => Err(RecordError::AmbiguousChannel(
                        many.iter().map(|(name, _)| name.to_string()).collect(),
                    )),
                }
            }
        }
    }
}

fn parse_field(name: &str, value: &Value) -> Result<u64, RecordError> {
    value_text(value)
        .and_then(parse_sample_value)
        .map_err(|reason| RecordError::InvalidNumber {
            field: name.to_string(),
            reason,
        })
}

fn value_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("expected string or number, found {}", json_kind(other))),
    }
}

/// Parse base-10 text as `u64`, truncating non-negative decimals.
fn parse_sample_value(text: String) -> Result<u64, String> {
    if let Ok(v) = text.parse::<u64>() {
        return Ok(v);
    }

    let float: f64 = text
        .parse()
        .map_err(|_| format!("'{}' is not a number", text))?;

    if !float.is_finite() || float < 0.0 || float >= u64::MAX as f64 {
        return Err(format!("'{}' is outside the unsigned 64-bit range", text));
    }
    Ok(float.trunc() as u64)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> StructuredRecord {
        StructuredRecord::from_value(value).unwrap()
    }

    #[test]
    fn decodes_canonical_record() {
        let (id, sample) =
            RecordDecoder::decode(&record(json!({"Time": "12", "Signal_0": "7"}))).unwrap();
        assert_eq!(id.as_str(), "Signal_0");
        assert_eq!(sample, Sample::new(7, 12));
    }

    #[test]
    fn field_order_does_not_matter() {
        let (id, sample) =
            RecordDecoder::decode(&record(json!({"Signal_3": "1", "Time": "2"}))).unwrap();
        assert_eq!(id.as_str(), "Signal_3");
        assert_eq!(sample, Sample::new(1, 2));

        let parsed: StructuredRecord = r#"{"Time":"5","Signal_9":"6"}"#.parse().unwrap();
        let (id, _) = RecordDecoder::decode(&parsed).unwrap();
        assert_eq!(id.as_str(), "Signal_9");
    }

    #[test]
    fn numbers_and_decimals_are_truncated() {
        let (_, sample) =
            RecordDecoder::decode(&record(json!({"Time": 0.934, "Signal_0": "41.99"}))).unwrap();
        assert_eq!(sample, Sample::new(41, 0));
    }

    #[test]
    fn negative_fractions_are_rejected_before_truncation() {
        for value in [json!("-0.36"), json!(-0.36187707387757756), json!("-1.5")] {
            let err = RecordDecoder::decode(&record(json!({"Time": "1", "Signal_0": value})))
                .unwrap_err();
            assert!(
                matches!(err, RecordError::InvalidNumber { ref field, .. } if field == "Signal_0"),
                "accepted {value}"
            );
        }

        let err = RecordDecoder::decode(&record(json!({"Time": "-0.5", "Signal_0": "3"})))
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidNumber { ref field, .. } if field == "Time"));
    }

    #[test]
    fn missing_time_is_rejected() {
        let err = RecordDecoder::decode(&record(json!({"Signal_0": "7"}))).unwrap_err();
        assert_eq!(err, RecordError::MissingTime);
    }

    #[test]
    fn missing_channel_is_rejected() {
        let err = RecordDecoder::decode(&record(json!({"Time": "7"}))).unwrap_err();
        assert_eq!(err, RecordError::MissingChannel);
    }

    #[test]
    fn unparseable_values_are_rejected() {
        let err =
            RecordDecoder::decode(&record(json!({"Time": "soon", "Signal_0": "1"}))).unwrap_err();
        assert!(matches!(err, RecordError::InvalidNumber { ref field, .. } if field == "Time"));

        let err =
            RecordDecoder::decode(&record(json!({"Time": "1", "Signal_0": "-4"}))).unwrap_err();
        assert!(matches!(err, RecordError::InvalidNumber { ref field, .. } if field == "Signal_0"));

        let err =
            RecordDecoder::decode(&record(json!({"Time": "1", "Signal_0": null}))).unwrap_err();
        assert!(matches!(err, RecordError::InvalidNumber { .. }));
    }

    #[test]
    fn non_numeric_extra_fields_are_ignored() {
        let (id, sample) = RecordDecoder::decode(&record(
            json!({"project": "rapidjson", "Time": "3", "Signal_0": "9"}),
        ))
        .unwrap();
        assert_eq!(id.as_str(), "Signal_0");
        assert_eq!(sample, Sample::new(9, 3));
    }

    #[test]
    fn two_numeric_channels_are_ambiguous() {
        let err = RecordDecoder::decode(&record(
            json!({"Time": "3", "Signal_0": "9", "Signal_1": "4"}),
        ))
        .unwrap_err();
        assert!(matches!(err, RecordError::AmbiguousChannel(names) if names.len() == 2));
    }

    #[test]
    fn non_objects_are_rejected() {
        assert_eq!(
            StructuredRecord::from_value(json!([1, 2])).unwrap_err(),
            RecordError::NotAnObject("array")
        );
        assert!(matches!(
            "{not json".parse::<StructuredRecord>(),
            Err(RecordError::InvalidJson(_))
        ));
    }

    #[test]
    fn from_sample_uses_digit_strings() {
        let rec = StructuredRecord::from_sample(&ChannelId::from("Signal_2"), Sample::new(5, 99));
        assert_eq!(rec.get("Time"), Some(&json!("99")));
        assert_eq!(rec.get("Signal_2"), Some(&json!("5")));
        assert_eq!(RecordDecoder::decode(&rec).unwrap().1, Sample::new(5, 99));
    }
}
