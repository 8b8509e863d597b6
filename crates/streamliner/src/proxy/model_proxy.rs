//! Model proxies
//!
//! `ModelProxy::model("clip")` resolves a configured model to a
//! `MethodProxy`; calling it builds a `CallEnvelope` and hands it to the
//! injected executor. Callers cannot tell whether the executor is the local
//! fleet, an in-process cache or a remote endpoint.

use super::executor::CallExecutor;
use crate::envelope::CallEnvelope;
use crate::error::FleetError;
use crate::model_runtime::{ModelCatalog, ModelSpec};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Clone)]
pub struct ModelProxy {
    catalog: Arc<ModelCatalog>,
    executor: Arc<dyn CallExecutor>,
}

impl ModelProxy {
    pub fn new(catalog: ModelCatalog, executor: Arc<dyn CallExecutor>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            executor,
        }
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.catalog.keys().map(String::as_str)
    }

    pub fn contains(&self, model_name: &str) -> bool {
        self.catalog.contains_key(model_name)
    }

    /// Look up a configured model. Unknown names fail here, before anything
    /// is dispatched.
    pub fn model(&self, model_name: &str) -> Result<MethodProxy, FleetError> {
        let spec = self
            .catalog
            .get(model_name)
            .ok_or_else(|| FleetError::ModelNotFound(model_name.to_string()))?;
        Ok(MethodProxy {
            executor: Arc::clone(&self.executor),
            model_name: model_name.to_string(),
            method_name: None,
            spec: spec.clone(),
        })
    }
}

/// A callable handle on one model, or one allow-listed method of it.
#[derive(Clone)]
pub struct MethodProxy {
    executor: Arc<dyn CallExecutor>,
    model_name: String,
    method_name: Option<String>,
    spec: ModelSpec,
}

impl std::fmt::Debug for MethodProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodProxy")
            .field("model_name", &self.model_name)
            .field("method_name", &self.method_name)
            .finish()
    }
}

impl MethodProxy {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn method_name(&self) -> Option<&str> {
        self.method_name.as_deref()
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Bind a method declared in the model's `proxy_methods`.
    pub fn method(&self, method_name: &str) -> Result<MethodProxy, FleetError> {
        if !self.spec.allows_method(method_name) {
            return Err(FleetError::MethodNotConfigured {
                model: self.model_name.clone(),
                method: method_name.to_string(),
            });
        }
        Ok(MethodProxy {
            executor: Arc::clone(&self.executor),
            model_name: self.model_name.clone(),
            method_name: Some(method_name.to_string()),
            spec: self.spec.clone(),
        })
    }

    pub fn envelope(&self, args: Vec<Value>, kwargs: Map<String, Value>) -> CallEnvelope {
        CallEnvelope::new(self.model_name.clone(), self.method_name.clone(), args, kwargs)
    }

    pub async fn call(&self, args: Vec<Value>, kwargs: Map<String, Value>) -> Result<Value, FleetError> {
        self.executor.execute(self.envelope(args, kwargs)).await
    }

    pub async fn call_args(&self, args: Vec<Value>) -> Result<Value, FleetError> {
        self.call(args, Map::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_runtime::parse_catalog;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingExecutor {
        seen: Mutex<Vec<CallEnvelope>>,
    }

    #[async_trait]
    impl CallExecutor for RecordingExecutor {
        async fn execute(&self, envelope: CallEnvelope) -> Result<Value, FleetError> {
            let target = envelope.target();
            self.seen.lock().push(envelope);
            Ok(json!({ "target": target }))
        }
    }

    fn proxy() -> (ModelProxy, Arc<RecordingExecutor>) {
        let catalog = parse_catalog(
            r#"{
                "clip": {"model_class": "ClipModel", "proxy_methods": ["encode_text", "encode_image"]},
                "ranker": {"model_class": "Ranker"}
            }"#,
        )
        .unwrap();
        let executor = Arc::new(RecordingExecutor::default());
        (ModelProxy::new(catalog, executor.clone()), executor)
    }

    #[tokio::test]
    async fn test_model_call_builds_envelope() {
        let (proxy, executor) = proxy();
        let mut kwargs = Map::new();
        kwargs.insert("top_k".to_string(), json!(3));

        let out = proxy.model("ranker").unwrap().call(vec![json!("query")], kwargs.clone()).await.unwrap();
        assert_eq!(out, json!({"target": "ranker"}));
        assert_eq!(
            executor.seen.lock()[0],
            CallEnvelope::new("ranker", None, vec![json!("query")], kwargs)
        );
    }

    #[tokio::test]
    async fn test_method_call_builds_envelope() {
        let (proxy, executor) = proxy();
        let encode = proxy.model("clip").unwrap().method("encode_text").unwrap();
        assert_eq!(encode.method_name(), Some("encode_text"));

        encode.call_args(vec![json!(["a dog"])]).await.unwrap();
        assert_eq!(
            executor.seen.lock()[0],
            CallEnvelope::new("clip", Some("encode_text".into()), vec![json!(["a dog"])], Map::new())
        );
    }

    #[tokio::test]
    async fn test_unknown_model_fails_without_dispatch() {
        let (proxy, executor) = proxy();
        let err = proxy.model("whisper").unwrap_err();
        assert!(matches!(err, FleetError::ModelNotFound(ref name) if name == "whisper"));
        assert!(err.is_configuration());
        assert!(executor.seen.lock().is_empty());
    }

    #[test]
    fn test_unlisted_method_is_rejected() {
        let (proxy, executor) = proxy();
        let clip = proxy.model("clip").unwrap();
        assert!(matches!(
            clip.method("__del__"),
            Err(FleetError::MethodNotConfigured { ref model, ref method }) if model == "clip" && method == "__del__"
        ));
        assert!(proxy.model("ranker").unwrap().method("encode_text").is_err());
        assert!(executor.seen.lock().is_empty());
    }

    #[test]
    fn test_lists_configured_models() {
        let (proxy, _) = proxy();
        assert_eq!(proxy.model_names().collect::<Vec<_>>(), vec!["clip", "ranker"]);
        assert!(proxy.contains("clip"));
        assert!(!proxy.contains("whisper"));
    }
}
