//! Sequence-model dispatch.
//!
//! In `inline` mode the classifier call is awaited within the tick. In
//! `detached` mode each window is classified on its own task and the result
//! is picked up on a later tick; at most `max_in_flight` calls run at once
//! and windows beyond that are skipped rather than queued.

use std::sync::Arc;

use crowdwatch_inference::{SequenceClassifier, SlidingWindow};
use crowdwatch_models::SequenceVerdict;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::DispatchMode;

/// A finished sequence call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedVerdict {
    pub verdict: SequenceVerdict,
    pub timed_out: bool,
}

/// What happened to the sequence path on one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Calls that finished since the previous tick, in window order.
    pub completed: Vec<CompletedVerdict>,
    /// Newest completed verdict, when newer than everything applied before.
    pub applied: Option<SequenceVerdict>,
    /// Completed verdicts discarded because a newer one was applied.
    pub stale: u64,
    /// Sequence number given to a window submitted on this tick.
    pub dispatched: Option<u64>,
    /// A window was due but the in-flight cap was reached.
    pub skipped: bool,
}

pub struct SequenceDispatcher {
    mode: DispatchMode,
    classifier: Arc<SequenceClassifier>,
    max_in_flight: usize,
    in_flight: JoinSet<CompletedVerdict>,
    next_seq: u64,
    last_applied: u64,
}

impl SequenceDispatcher {
    pub fn new(mode: DispatchMode, classifier: Arc<SequenceClassifier>, max_in_flight: usize) -> Self {
        Self {
            mode,
            classifier,
            max_in_flight: max_in_flight.max(1),
            in_flight: JoinSet::new(),
            next_seq: 1,
            last_applied: 0,
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Sequence number of the last applied verdict, 0 before the first.
    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    /// Advance one tick, optionally submitting a completed window.
    pub async fn tick(&mut self, window: Option<SlidingWindow>) -> DispatchReport {
        match self.mode {
            DispatchMode::Inline => self.tick_inline(window).await,
            DispatchMode::Detached => self.tick_detached(window),
        }
    }

    /// Wait for every in-flight call at end of stream.
    pub async fn finish(&mut self) -> DispatchReport {
        let mut completed = Vec::new();
        while let Some(joined) = self.in_flight.join_next().await {
            match joined {
                Ok(done) => completed.push(done),
                Err(e) => warn!(error = %e, "Sequence task did not complete"),
            }
        }
        self.settle(completed)
    }

    /// Drop pending calls and forget sequence state.
    pub fn reset(&mut self) {
        self.in_flight.abort_all();
        self.in_flight = JoinSet::new();
        self.last_applied = self.next_seq.saturating_sub(1);
    }

    async fn tick_inline(&mut self, window: Option<SlidingWindow>) -> DispatchReport {
        let Some(window) = window else {
            return DispatchReport::default();
        };
        let seq = self.take_seq();
        let done = run(self.classifier.clone(), window, seq).await;
        let mut report = self.settle(vec![done]);
        report.dispatched = Some(seq);
        report
    }

    fn tick_detached(&mut self, window: Option<SlidingWindow>) -> DispatchReport {
        let mut completed = Vec::new();
        while let Some(joined) = self.in_flight.try_join_next() {
            match joined {
                Ok(done) => completed.push(done),
                Err(e) => warn!(error = %e, "Sequence task did not complete"),
            }
        }
        let mut report = self.settle(completed);

        if let Some(window) = window {
            let seq = self.take_seq();
            if self.in_flight.len() >= self.max_in_flight {
                debug!(window_seq = seq, in_flight = self.in_flight.len(), "Skipping window");
                report.skipped = true;
            } else {
                self.in_flight.spawn(run(self.classifier.clone(), window, seq));
                report.dispatched = Some(seq);
            }
        }
        report
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn settle(&mut self, mut completed: Vec<CompletedVerdict>) -> DispatchReport {
        completed.sort_by_key(|c| c.verdict.window_seq);

        let mut report = DispatchReport::default();
        if let Some(newest) = completed.last() {
            if newest.verdict.window_seq > self.last_applied {
                self.last_applied = newest.verdict.window_seq;
                report.applied = Some(newest.verdict.clone());
            }
        }
        report.stale = completed.len() as u64 - u64::from(report.applied.is_some());
        report.completed = completed;
        report
    }
}

async fn run(classifier: Arc<SequenceClassifier>, window: SlidingWindow, seq: u64) -> CompletedVerdict {
    match classifier.try_classify(&window, seq).await {
        Ok(verdict) => CompletedVerdict {
            verdict,
            timed_out: false,
        },
        Err(e) => CompletedVerdict {
            verdict: classifier.fallback(&window, seq, &e),
            timed_out: e.is_timeout(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crowdwatch_inference::{ClassifierConfig, InferenceResult, SequenceBackend};
    use crowdwatch_models::FeatureVector;
    use std::time::Duration;

    /// Answers the mean motion energy of the window after a delay.
    struct SlowMean(Duration);

    #[async_trait]
    impl SequenceBackend for SlowMean {
        fn name(&self) -> &'static str {
            "slow-mean"
        }

        async fn predict(&self, window: &SlidingWindow) -> InferenceResult<f64> {
            tokio::time::sleep(self.0).await;
            let energy = window.channel(0);
            Ok(energy.iter().sum::<f64>() / energy.len() as f64)
        }
    }

    fn classifier(delay: Duration) -> Arc<SequenceClassifier> {
        Arc::new(SequenceClassifier::new(
            Arc::new(SlowMean(delay)),
            ClassifierConfig {
                window_size: 4,
                ..ClassifierConfig::default()
            },
        ))
    }

    fn window(energy: f64) -> SlidingWindow {
        SlidingWindow::new((0..4).map(|t| FeatureVector::new(t, energy, 0.0)).collect())
    }

    #[tokio::test]
    async fn test_inline_applies_immediately() {
        let mut dispatcher = SequenceDispatcher::new(DispatchMode::Inline, classifier(Duration::ZERO), 1);
        assert_eq!(dispatcher.tick(None).await, DispatchReport::default());

        let report = dispatcher.tick(Some(window(0.8))).await;
        assert_eq!(report.dispatched, Some(1));
        let applied = report.applied.unwrap();
        assert_eq!(applied.window_seq, 1);
        assert!(applied.panic_detected);
        assert_eq!(report.stale, 0);
    }

    #[tokio::test]
    async fn test_detached_skips_when_full() {
        let mut dispatcher =
            SequenceDispatcher::new(DispatchMode::Detached, classifier(Duration::from_millis(200)), 1);

        let first = dispatcher.tick(Some(window(0.2))).await;
        assert_eq!(first.dispatched, Some(1));
        assert!(first.applied.is_none());

        let second = dispatcher.tick(Some(window(0.9))).await;
        assert!(second.skipped);
        assert_eq!(second.dispatched, None);

        let last = dispatcher.finish().await;
        assert_eq!(last.applied.unwrap().window_seq, 1);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_detached_result_applied_on_later_tick() {
        let mut dispatcher =
            SequenceDispatcher::new(DispatchMode::Detached, classifier(Duration::ZERO), 2);
        dispatcher.tick(Some(window(0.7))).await;

        let mut applied = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if let Some(v) = dispatcher.tick(None).await.applied {
                applied = Some(v);
                break;
            }
        }
        let applied = applied.unwrap();
        assert_eq!(applied.window_seq, 1);
        assert!((applied.confidence - 0.7).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_older_results_are_stale() {
        let mut dispatcher =
            SequenceDispatcher::new(DispatchMode::Detached, classifier(Duration::from_millis(20)), 2);
        dispatcher.tick(Some(window(0.1))).await;
        dispatcher.tick(Some(window(0.2))).await;

        let report = dispatcher.finish().await;
        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.applied.unwrap().window_seq, 2);
        assert_eq!(report.stale, 1);
        assert_eq!(dispatcher.last_applied(), 2);
    }
}
