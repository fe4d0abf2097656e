//! Mock executor for deterministic testing.
//!
//! Returns pre-configured results without calling any collaborator.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use warden_core::{Result, WardenError};

use crate::executor::ActionExecutor;

/// A mock executor that pops pre-configured results in order. Once the
/// script runs dry it returns an empty object.
///
/// # Example
/// ```
/// use warden_proposal::MockExecutor;
/// let exec = MockExecutor::new("browser")
///     .with_result(serde_json::json!({"clicked": true}));
/// ```
pub struct MockExecutor {
    name: String,
    script: Mutex<VecDeque<std::result::Result<serde_json::Value, String>>>,
    /// Every params value this executor received (for assertions).
    pub calls: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl MockExecutor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_result(self, value: serde_json::Value) -> Self {
        self.script.lock().push_back(Ok(value));
        self
    }

    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.script.lock().push_back(Err(message.into()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ActionExecutor for MockExecutor {
    async fn execute(&self, params: &serde_json::Value) -> Result<serde_json::Value> {
        self.calls.lock().push(params.clone());
        match self.script.lock().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(WardenError::Executor {
                kind: self.name.clone(),
                reason: message,
            }),
            None => Ok(serde_json::json!({})),
        }
    }
}
