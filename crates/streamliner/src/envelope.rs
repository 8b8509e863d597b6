//! Call envelope
//!
//! The unit of work crossing any boundary: the in-process dispatcher, the
//! per-device worker channels and the remote HTTP transport all carry the
//! same self-describing value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One call to a named model, optionally targeting one of its methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub model_name: String,
    /// `None` invokes the model itself.
    #[serde(default)]
    pub method_name: Option<String>,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl CallEnvelope {
    pub fn new(
        model_name: impl Into<String>,
        method_name: Option<String>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            method_name,
            args,
            kwargs,
        }
    }

    /// Envelope invoking the model object itself with positional arguments only.
    pub fn call(model_name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::new(model_name, None, args, Map::new())
    }

    /// Human-readable target, `model` or `model.method`.
    pub fn target(&self) -> String {
        match &self.method_name {
            Some(method) => format!("{}.{}", self.model_name, method),
            None => self.model_name.clone(),
        }
    }
}

/// Successful response body of a fleet endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    pub result: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let mut kwargs = Map::new();
        kwargs.insert("threshold".to_string(), json!(0.5));
        let envelope = CallEnvelope::new("clip", Some("score".to_string()), vec![json!("a.jpg")], kwargs);

        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            wire,
            json!({
                "model_name": "clip",
                "method_name": "score",
                "args": ["a.jpg"],
                "kwargs": {"threshold": 0.5}
            })
        );
    }

    #[test]
    fn test_absent_method_is_null_on_the_wire() {
        let wire = serde_json::to_value(CallEnvelope::call("clip", vec![])).unwrap();
        assert_eq!(wire["method_name"], Value::Null);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let envelope: CallEnvelope = serde_json::from_value(json!({"model_name": "clip"})).unwrap();
        assert_eq!(envelope.method_name, None);
        assert!(envelope.args.is_empty());
        assert!(envelope.kwargs.is_empty());
        assert_eq!(envelope.target(), "clip");
    }
}
