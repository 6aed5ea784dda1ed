//! The `Operation` capability and the values it produces.

use std::fmt;

use async_trait::async_trait;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::context::ExecutionContext;
use crate::extras::Extras;

// ---------------------------------------------------------------------------
// Operation trait
// ---------------------------------------------------------------------------

/// A named unit of work exposed through the dispatcher.
///
/// Implementations are constructed fresh for every call and dropped
/// afterwards, so they may keep per-call state in `self` without leaking it
/// into other requests.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Name clients pass in the selector parameter. Must be unique
    /// (case-insensitive) across every deployed module.
    fn name(&self) -> &str;

    /// Human-readable summary shown in the catalog listing.
    fn description(&self) -> &str {
        ""
    }

    /// Declared parameters, parameter name to type and meaning.
    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    /// Runs the operation.
    async fn execute(&self, ctx: &ExecutionContext) -> Result<OperationOutput, OperationFault>;
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Ordered map of declared parameter names to their description.
///
/// Serialized as a JSON object whose key order follows declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters(Vec<(String, String)>);

impl Parameters {
    /// Creates an empty declaration list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style declaration. A repeated name replaces the earlier
    /// description in place.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.declare(name, description);
        self
    }

    /// Declares `name`, replacing an earlier description in place.
    pub fn declare(&mut self, name: impl Into<String>, description: impl Into<String>) {
        let name = name.into();
        let description = description.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = description,
            None => self.0.push((name, description)),
        }
    }

    /// Looks up the description of a declared parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_str())
    }

    /// Declared names and descriptions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, d)| (n.as_str(), d.as_str()))
    }

    /// Number of declared parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Parameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, description) in &self.0 {
            map.serialize_entry(name, description)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Parameters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ParametersVisitor;

        impl<'de> Visitor<'de> for ParametersVisitor {
            type Value = Parameters;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter names to descriptions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Parameters, A::Error> {
                let mut params = Parameters::new();
                while let Some((name, description)) = access.next_entry::<String, String>()? {
                    params.declare(name, description);
                }
                Ok(params)
            }
        }

        deserializer.deserialize_map(ParametersVisitor)
    }
}

// ---------------------------------------------------------------------------
// OperationOutput
// ---------------------------------------------------------------------------

/// How the dispatcher renders an operation's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderMode {
    /// Model, status and extras wrapped in the response envelope.
    #[default]
    Envelope,
    /// Only the model is serialized; request extras are not merged.
    ModelOnly,
}

/// Successful result of an operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutput {
    /// Operation-specific payload.
    #[serde(default)]
    pub model: Value,
    /// Operation-set extras. These keep their keys when request extras are merged.
    #[serde(default)]
    pub extras: Extras,
    /// Additional top-level envelope fields.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Optional status message reported alongside `Succeeded`.
    #[serde(default)]
    pub message: String,
    /// Envelope or model-only rendering.
    #[serde(default)]
    pub render: RenderMode,
}

impl OperationOutput {
    /// Wraps a model in an envelope output.
    #[must_use]
    pub fn new(model: impl Into<Value>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Output rendered without the envelope wrapper.
    #[must_use]
    pub fn model_only(model: impl Into<Value>) -> Self {
        Self {
            model: model.into(),
            render: RenderMode::ModelOnly,
            ..Self::default()
        }
    }

    /// Sets an extra value.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key, value);
        self
    }

    /// Sets an additional top-level envelope field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Sets the success message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

// ---------------------------------------------------------------------------
// OperationFault
// ---------------------------------------------------------------------------

/// Error raised by an operation.
///
/// Carries a short classification, the message, the time the fault was
/// captured (RFC 3339, UTC) and arbitrary structured diagnostics. The
/// dispatcher folds all of it into the failure envelope's message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {message}")]
pub struct OperationFault {
    /// Short classification, e.g. `InvalidParameter`.
    pub kind: String,
    /// Human-readable description.
    pub message: String,
    /// Capture time, RFC 3339 in UTC.
    pub captured_at: String,
    /// Structured diagnostic data.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl OperationFault {
    /// Captures a fault of the given kind at the current time.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            captured_at: now_rfc3339(),
            data: Map::new(),
        }
    }

    /// A fault with the generic `OperationFailed` kind.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new("OperationFailed", message)
    }

    /// A fault blaming a request parameter. The parameter name and the
    /// offending value are recorded as structured data.
    #[must_use]
    pub fn invalid_parameter(name: &str, value: &str, message: impl Into<String>) -> Self {
        Self::new("InvalidParameter", message)
            .with_data("parameter", name)
            .with_data("value", value)
    }

    /// Attaches a diagnostic value.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Full diagnostic text: kind, message, capture time and data.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        let mut text = format!("{self} (captured at {})", self.captured_at);
        if !self.data.is_empty() {
            text.push_str(" data: ");
            text.push_str(&Value::Object(self.data.clone()).to_string());
        }
        text
    }
}

/// Current UTC time formatted as RFC 3339.
#[must_use]
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
