//! Deterministic conversion stub.

use super::ConversionClient;
use crate::error::ConversionError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A canned answer for one conversion call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scripted {
    /// Succeed with these segments
    Pages(Vec<String>),
    /// Fail with a 429-style rate-limit error
    RateLimited(String),
    /// Fail with a service error carrying this message
    Fail(String),
}

impl Scripted {
    fn into_result(self) -> Result<Vec<String>, ConversionError> {
        match self {
            Scripted::Pages(pages) => Ok(pages),
            Scripted::RateLimited(message) => Err(ConversionError::RateLimited { message }),
            Scripted::Fail(message) => Err(ConversionError::Service(message)),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    by_file: HashMap<String, VecDeque<Scripted>>,
    fallback: Option<Scripted>,
    calls: Vec<String>,
}

/// [`ConversionClient`] answering from a per-file script
///
/// Answers queued for a file name are consumed in order; the last one keeps
/// answering once the queue is down to it. Files without a script get the
/// fallback, which by default succeeds with a single `# <file>` segment.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConversionClient {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl ScriptedConversionClient {
    /// Create a client that converts every file successfully
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every conversion call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an answer for `file`
    pub fn push(&self, file: &str, answer: Scripted) -> &Self {
        self.lock()
            .by_file
            .entry(file.to_string())
            .or_default()
            .push_back(answer);
        self
    }

    /// Answer used for files without a script
    pub fn set_fallback(&self, answer: Scripted) -> &Self {
        self.lock().fallback = Some(answer);
        self
    }

    /// File names converted so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        // A panic while holding the lock leaves the script itself intact.
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_answer(&self, file: &str) -> Scripted {
        let mut script = self.lock();
        script.calls.push(file.to_string());

        if let Some(queue) = script.by_file.get_mut(file) {
            let answer = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(answer) = answer {
                return answer;
            }
        }

        script
            .fallback
            .clone()
            .unwrap_or_else(|| Scripted::Pages(vec![format!("# {file}")]))
    }
}

#[async_trait]
impl ConversionClient for ScriptedConversionClient {
    async fn convert(&self, path: &Path) -> Result<Vec<String>, ConversionError> {
        let file = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let answer = self.next_answer(&file);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        answer.into_result()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
