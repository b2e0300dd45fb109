// Run-wide completion barrier

use tokio::sync::watch;
use tracing::error;

use crate::output::errors::TodError;

#[derive(Debug, Clone, Default)]
struct Progress {
    completed: usize,
    failure: Option<TodError>,
}

/// Counts successful executions against a target fixed at construction
///
/// Which host produced a signal does not matter. A fatal error releases
/// waiters early so a run that can no longer finish does not hang.
pub struct CompletionTracker {
    target: usize,
    progress: watch::Sender<Progress>,
}

impl CompletionTracker {
    pub fn new(target: usize) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        CompletionTracker { target, progress }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn completed(&self) -> usize {
        self.progress.borrow().completed
    }

    /// Record one successful command
    pub fn signal(&self) {
        let target = self.target;
        self.progress.send_modify(|p| {
            if p.completed >= target {
                error!(
                    completed = p.completed,
                    target, "completion signal past the target, ignoring"
                );
                return;
            }
            p.completed += 1;
        });
    }

    /// Record an error that stops the run from reaching its target.
    /// Only the first one is kept.
    pub fn fail(&self, err: TodError) {
        self.progress.send_modify(|p| {
            if p.failure.is_none() {
                p.failure = Some(err);
            }
        });
    }

    /// Wait for the target, or for the first fatal error
    pub async fn wait(&self) -> Result<usize, TodError> {
        let target = self.target;
        let mut rx = self.progress.subscribe();

        let progress = rx
            .wait_for(|p| p.completed >= target || p.failure.is_some())
            .await
            .map_err(|_| TodError::Assignment {
                message: "Completion tracker closed before the run finished".to_string(),
                pending: target,
            })?;

        // Reaching the target wins over a late failure
        if progress.completed >= target {
            return Ok(progress.completed);
        }
        match &progress.failure {
            Some(err) => Err(err.clone()),
            None => Ok(progress.completed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_releases_at_target() {
        let tracker = Arc::new(CompletionTracker::new(3));

        let producers: Vec<_> = (0..3)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move { tracker.signal() })
            })
            .collect();
        for p in producers {
            p.await.unwrap();
        }

        assert_eq!(tracker.wait().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_zero_target_returns_immediately() {
        let tracker = CompletionTracker::new(0);
        assert_eq!(tracker.wait().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failure_releases_waiter() {
        let tracker = Arc::new(CompletionTracker::new(5));
        tracker.signal();

        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.wait().await })
        };

        tracker.fail(TodError::Assignment {
            message: "no hosts".to_string(),
            pending: 4,
        });

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(TodError::Assignment { pending: 4, .. })));
        assert_eq!(tracker.completed(), 1);
    }

    #[test]
    fn test_extra_signals_are_ignored() {
        let tracker = CompletionTracker::new(1);
        tracker.signal();
        tracker.signal();
        assert_eq!(tracker.completed(), 1);
    }
}
