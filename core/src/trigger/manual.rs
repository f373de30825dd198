use crate::errors::TriggerError;
use crate::task::TriggerSpec;
use crate::trigger::{FiringCallback, TriggerEngine};
use async_trait::async_trait;
use dashmap::DashMap;

/// A [`TriggerEngine`] that never fires on its own. Registered callbacks
/// are held until [`ManualTriggerEngine::fire`] is called, which makes
/// firings fully deterministic. Meant for tests and for embedding
/// callers that drive due times themselves; it accepts every
/// [`TriggerSpec`] without looking at it.
#[derive(Default)]
pub struct ManualTriggerEngine {
    callbacks: DashMap<String, FiringCallback>,
}

impl ManualTriggerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires one due-time for `task_id`. Returns whether a schedule for
    /// that id existed.
    pub fn fire(&self, task_id: &str) -> bool {
        match self.callbacks.get(task_id) {
            Some(cb) => {
                cb();
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, task_id: &str) -> bool {
        self.callbacks.contains_key(task_id)
    }
}

#[async_trait]
impl TriggerEngine for ManualTriggerEngine {
    async fn schedule(
        &self,
        task_id: &str,
        _spec: &TriggerSpec,
        firing: FiringCallback,
    ) -> Result<(), TriggerError> {
        self.callbacks.insert(task_id.to_string(), firing);
        Ok(())
    }

    async fn cancel(&self, task_id: &str) {
        self.callbacks.remove(task_id);
    }

    async fn shutdown(&self) {
        self.callbacks.clear();
    }
}
