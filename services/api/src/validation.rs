//! Validation and sanitization of incoming session payloads
//!
//! Clients have sent three payload shapes over time; the gateway reconciles
//! them into one canonical record before anything touches the store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{SecondsFormat, Utc};
use common::emotion::Emotion;
use common::sanitize::sanitize_text;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Errors raised while normalizing a payload
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid data format: missing type or data")]
    UnknownFormat,

    #[error("Invalid data format: expected a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for field: {0}")]
    InvalidField(String),
}

/// How strictly payloads are checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Fill in missing fields and accept everything else
    #[default]
    Lenient,
    /// Additionally require identifiers and the structural fields
    Strict,
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(ValidationMode::Lenient),
            "strict" => Ok(ValidationMode::Strict),
            other => Err(format!("Unknown validation mode: {}", other)),
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::Lenient => f.write_str("lenient"),
            ValidationMode::Strict => f.write_str("strict"),
        }
    }
}

/// A normalized session ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSession {
    /// Session type used in the storage key
    pub session_type: String,
    pub record: Map<String, Value>,
}

impl CanonicalSession {
    pub fn session_id(&self) -> &str {
        self.record
            .get("sessionId")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationGateway {
    mode: ValidationMode,
}

impl ValidationGateway {
    pub fn new(mode: ValidationMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Reconcile the payload shape, then validate and fill in the record
    pub fn normalize(&self, payload: Value) -> Result<CanonicalSession, ValidationError> {
        let Value::Object(mut payload) = payload else {
            return Err(ValidationError::NotAnObject);
        };

        let (session_type, data) = if let Some(kind) = non_empty_str(&payload, "type")
            .filter(|_| {
                non_empty_str(&payload, "userId").is_some()
                    && non_empty_str(&payload, "sessionId").is_some()
            }) {
            debug!("Detected direct data format");
            (kind.to_string(), payload)
        } else if let (Some(kind), Some(_)) =
            (non_empty_str(&payload, "type"), payload.get("data"))
        {
            debug!("Detected {{type, data}} format");
            let kind = kind.to_string();
            match payload.remove("data") {
                Some(Value::Object(data)) => (kind, data),
                _ => return Err(ValidationError::NotAnObject),
            }
        } else if let Some(context) = non_empty_str(&payload, "context") {
            debug!("Detected legacy format with context");
            (context.to_string(), payload)
        } else {
            return Err(ValidationError::UnknownFormat);
        };

        let record = match self.mode {
            ValidationMode::Lenient => fill_lenient(&session_type, data),
            ValidationMode::Strict => {
                check_strict(&data)?;
                fill_lenient(&session_type, data)
            }
        };

        Ok(CanonicalSession {
            session_type,
            record,
        })
    }
}

fn non_empty_str<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn fill_lenient(session_type: &str, mut data: Map<String, Value>) -> Map<String, Value> {
    for field in ["userId", "sessionId"] {
        if non_empty_str(&data, field).is_none() {
            debug!("No {} provided, generating one", field);
            data.insert(field.to_string(), Value::String(Uuid::new_v4().to_string()));
        }
    }

    let text = data
        .get("text")
        .and_then(Value::as_str)
        .map(sanitize_text)
        .unwrap_or_default();
    data.insert("text".to_string(), Value::String(text));

    if non_empty_str(&data, "timestamp").is_none() {
        data.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }

    if let Some(Value::Object(emotions)) = data.get("emotions") {
        let entry = timeline_entry(emotions);
        data.insert("emotionTimeline".to_string(), Value::Array(vec![entry]));
    }

    if !data.contains_key("emotionTimeline") {
        data.insert("emotionTimeline".to_string(), Value::Array(Vec::new()));
    }

    if non_empty_str(&data, "context").is_none() {
        data.insert("context".to_string(), Value::String(session_type.to_string()));
    }

    data
}

/// One timeline entry summarizing a manual emotion map
///
/// Keys are mapped to the canonical vocabulary and unknown keys dropped.
/// The dominant emotion is the arg-max; an all-zero map is `neutral`.
fn timeline_entry(emotions: &Map<String, Value>) -> Value {
    let mut all_emotions: BTreeMap<&'static str, u8> = BTreeMap::new();
    for (key, value) in emotions {
        let (Some(emotion), Some(score)) = (Emotion::parse(key), percent(value)) else {
            continue;
        };
        let slot = all_emotions.entry(emotion.as_str()).or_insert(0);
        *slot = (*slot).max(score);
    }

    let (emotion, score) = all_emotions
        .iter()
        .fold((Emotion::Neutral.as_str(), 0), |max, (emotion, score)| {
            if *score > max.1 { (*emotion, *score) } else { max }
        });

    json!({
        "timestamp": 0,
        "emotion": emotion,
        "score": score,
        "allEmotions": all_emotions,
    })
}

fn percent(value: &Value) -> Option<u8> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    Some(number.clamp(0.0, 100.0).round() as u8)
}

fn check_strict(data: &Map<String, Value>) -> Result<(), ValidationError> {
    static UUID_V4_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = UUID_V4_REGEX.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-4[0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}$")
            .expect("Failed to compile UUID regex")
    });

    for field in ["userId", "sessionId"] {
        let value = data
            .get(field)
            .ok_or_else(|| ValidationError::MissingField(field.to_string()))?;
        if !value.as_str().is_some_and(|id| regex.is_match(id)) {
            return Err(ValidationError::InvalidField(field.to_string()));
        }
    }

    match data.get("deviceInfo") {
        None => return Err(ValidationError::MissingField("deviceInfo".to_string())),
        Some(Value::Object(_)) => {}
        Some(_) => return Err(ValidationError::InvalidField("deviceInfo".to_string())),
    }

    match (data.get("keystrokeData"), data.get("timings")) {
        (Some(Value::Array(_)), _) | (_, Some(Value::Array(_))) => {}
        (None, None) => return Err(ValidationError::MissingField("keystrokeData".to_string())),
        (Some(_), _) => return Err(ValidationError::InvalidField("keystrokeData".to_string())),
        (None, Some(_)) => return Err(ValidationError::InvalidField("timings".to_string())),
    }

    match data.get("cameraActive") {
        None => return Err(ValidationError::MissingField("cameraActive".to_string())),
        Some(Value::Bool(_)) => {}
        Some(_) => return Err(ValidationError::InvalidField("cameraActive".to_string())),
    }

    match data.get("musicId") {
        None => Err(ValidationError::MissingField("musicId".to_string())),
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(ValidationError::InvalidField("musicId".to_string())),
    }
}
