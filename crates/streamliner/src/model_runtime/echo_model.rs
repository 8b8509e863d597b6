//! Diagnostic model that reports where it runs and what it was called with.

use super::model_trait::Model;
use serde_json::{json, Map, Value};

pub struct EchoModel {
    device: usize,
    calls: u64,
}

impl EchoModel {
    pub fn from_params(params: &Map<String, Value>) -> Self {
        let device = params
            .get("device")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        Self { device, calls: 0 }
    }
}

impl Model for EchoModel {
    fn call(&mut self, args: &[Value], kwargs: &Map<String, Value>) -> anyhow::Result<Value> {
        self.calls += 1;
        Ok(json!({
            "device": self.device,
            "calls": self.calls,
            "args": args,
            "kwargs": kwargs,
        }))
    }

    fn call_method(
        &mut self,
        method: &str,
        _args: &[Value],
        _kwargs: &Map<String, Value>,
    ) -> anyhow::Result<Value> {
        match method {
            "device" => Ok(json!(self.device)),
            other => Err(anyhow::anyhow!("EchoModel has no method '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_counts_calls() {
        let mut model = EchoModel::from_params(&Map::new());
        model.call(&[], &Map::new()).unwrap();
        let out = model.call(&[json!("x")], &Map::new()).unwrap();
        assert_eq!(out["calls"], json!(2));
        assert_eq!(out["args"], json!(["x"]));
    }

    #[test]
    fn test_unknown_method() {
        let mut model = EchoModel::from_params(&Map::new());
        assert!(model.call_method("train", &[], &Map::new()).is_err());
        assert_eq!(model.call_method("device", &[], &Map::new()).unwrap(), json!(0));
    }
}
