use crate::logger::Logger;

/// Receives document-count progress from long-running batches.
pub trait ProgressSink: Send + Sync {
    fn advance(&self, stage: &str, done: usize, total: usize);
}

/// Logs every `every` documents and at completion.
#[derive(Debug, Clone)]
pub struct LogProgress {
    every: usize,
    logger: Logger,
}

impl LogProgress {
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
            logger: Logger::new("Progress"),
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ProgressSink for LogProgress {
    fn advance(&self, stage: &str, done: usize, total: usize) {
        if done % self.every == 0 || done == total {
            self.logger.info(&format!("{}: processed {}/{}", stage, done, total));
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&self, _stage: &str, _done: usize, _total: usize) {}
}
