//! Concurrent fan-out of model requests.

use std::sync::Arc;

use lifetrace_core::{LanguageModel, LifetraceError, LifetraceResult, ModelRequest};
use tokio::task::JoinSet;

/// Send every request concurrently and collect the outcomes in input order.
///
/// Each request runs on its own task. One failing request never affects the
/// others; its slot simply holds the error. The call returns only after all
/// tasks have finished.
pub async fn invoke_many(
    model: Arc<dyn LanguageModel>,
    requests: Vec<ModelRequest>,
) -> Vec<LifetraceResult<String>> {
    let total = requests.len();
    let mut tasks = JoinSet::new();
    for (index, request) in requests.into_iter().enumerate() {
        let model = Arc::clone(&model);
        tasks.spawn(async move { (index, model.invoke(&request).await) });
    }

    let mut slots: Vec<Option<LifetraceResult<String>>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(e) => tracing::error!(error = %e, "Model request task failed"),
        }
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(LifetraceError::TaskFailed {
                    reason: "model request task did not complete".to_string(),
                })
            })
        })
        .collect()
}
