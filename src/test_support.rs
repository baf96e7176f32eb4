use crate::error::Result;
use crate::locks::ExclusiveLock;
use crate::policy::Operator;
use std::collections::VecDeque;

/// Operator that answers retry prompts from a script and records everything
/// it was told.
#[derive(Debug, Default)]
pub(crate) struct ScriptedOperator {
    answers: VecDeque<bool>,
    pub(crate) messages: Vec<String>,
    pub(crate) prompts: usize,
}

impl ScriptedOperator {
    pub(crate) fn answering(answers: &[bool]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// All notifications joined by newlines.
    pub(crate) fn transcript(&self) -> String {
        self.messages.join("\n")
    }
}

impl Operator for ScriptedOperator {
    fn notify(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }

    fn confirm_retry(&mut self) -> bool {
        self.prompts += 1;
        // Running out of script behaves like a closed stdin.
        self.answers.pop_front().unwrap_or(false)
    }
}

/// Wraps a lock and counts calls into it.
#[derive(Debug)]
pub(crate) struct CountingLock<L> {
    inner: L,
    pub(crate) acquire_calls: usize,
    pub(crate) release_calls: usize,
}

impl<L: ExclusiveLock> CountingLock<L> {
    pub(crate) fn new(inner: L) -> Self {
        Self {
            inner,
            acquire_calls: 0,
            release_calls: 0,
        }
    }

    pub(crate) fn inner(&self) -> &L {
        &self.inner
    }
}

impl<L: ExclusiveLock> ExclusiveLock for CountingLock<L> {
    fn try_acquire(&mut self) -> Result<bool> {
        self.acquire_calls += 1;
        self.inner.try_acquire()
    }

    fn release(&mut self) -> Result<()> {
        self.release_calls += 1;
        self.inner.release()
    }
}
