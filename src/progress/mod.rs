use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Per-subtask counter published by an extraction unit.
#[derive(Debug, Default)]
pub struct ProgressToken {
    processed: AtomicU64,
    total: AtomicU64,
    has_total: AtomicBool,
    completed: AtomicBool,
}

impl ProgressToken {
    pub fn new() -> ProgressToken {
        ProgressToken::default()
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Release);
        self.has_total.store(true, Ordering::Release);
    }

    pub fn increment(&self) {
        self.processed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn complete(&self) {
        self.completed.store(true, Ordering::Release);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> Option<u64> {
        self.has_total
            .load(Ordering::Acquire)
            .then(|| self.total.load(Ordering::Acquire))
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

/// Sums every attached token into one fraction. Completion is published
/// exactly once, after the last token completes.
pub struct ProgressAggregator {
    tokens: Mutex<Vec<Arc<ProgressToken>>>,
    fraction_tx: watch::Sender<f64>,
    completed_tx: watch::Sender<bool>,
    completion_fired: AtomicBool,
}

impl Default for ProgressAggregator {
    fn default() -> ProgressAggregator {
        ProgressAggregator::new()
    }
}

impl ProgressAggregator {
    pub fn new() -> ProgressAggregator {
        let (fraction_tx, _) = watch::channel(0.0);
        let (completed_tx, _) = watch::channel(false);
        ProgressAggregator {
            tokens: Mutex::new(Vec::new()),
            fraction_tx,
            completed_tx,
            completion_fired: AtomicBool::new(false),
        }
    }

    pub fn attach(&self) -> Arc<ProgressToken> {
        let token = Arc::new(ProgressToken::new());
        self.tokens.lock().push(Arc::clone(&token));
        token
    }

    /// Overall progress in `[0, 1]`; zero while no totals are known.
    pub fn fraction(&self) -> f64 {
        let tokens = self.tokens.lock();
        let total: u64 = tokens.iter().filter_map(|t| t.total()).sum();
        if total == 0 {
            return 0.0;
        }
        let processed: u64 = tokens.iter().map(|t| t.processed()).sum();
        (processed as f64 / total as f64).min(1.0)
    }

    /// True only while no token has published a total yet.
    pub fn is_indeterminate(&self) -> bool {
        self.tokens.lock().iter().all(|t| t.total().is_none())
    }

    pub fn is_completed(&self) -> bool {
        let tokens = self.tokens.lock();
        !tokens.is_empty() && tokens.iter().all(|t| t.is_completed())
    }

    /// Re-evaluates the aggregate and publishes it to watchers. Callers
    /// invoke this after mutating a token.
    pub fn refresh(&self) {
        let _ = self.fraction_tx.send(self.fraction());
        if self.is_completed() && !self.completion_fired.swap(true, Ordering::AcqRel) {
            let _ = self.completed_tx.send(true);
        }
    }

    pub fn watch_fraction(&self) -> watch::Receiver<f64> {
        self.fraction_tx.subscribe()
    }

    pub fn watch_completed(&self) -> watch::Receiver<bool> {
        self.completed_tx.subscribe()
    }
}

/// Cooperative cancellation flag, checked between per-file units.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Outcome of a cancellable extraction. Partial output stays in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStatus {
    Completed,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregator_sums_tokens() {
        let aggregator = ProgressAggregator::new();
        let a = aggregator.attach();
        let b = aggregator.attach();

        assert!(aggregator.is_indeterminate());
        assert_eq!(aggregator.fraction(), 0.0);

        a.set_total(4);
        b.set_total(6);
        assert!(!aggregator.is_indeterminate());

        a.increment();
        a.increment();
        b.increment();
        assert!((aggregator.fraction() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn completion_fires_once_after_last_token() {
        let aggregator = ProgressAggregator::new();
        let a = aggregator.attach();
        let b = aggregator.attach();
        let mut watcher = aggregator.watch_completed();

        a.set_total(1);
        a.increment();
        a.complete();
        aggregator.refresh();
        assert!(!aggregator.is_completed());
        assert!(!*watcher.borrow_and_update());

        b.complete();
        aggregator.refresh();
        assert!(aggregator.is_completed());
        assert!(*watcher.borrow_and_update());

        aggregator.refresh();
        assert!(!watcher.has_changed().unwrap());
    }

    #[test]
    fn cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
