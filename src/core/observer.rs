//! Progress observers.
//!
//! The orchestrator notifies observers at pipeline start, before and after
//! every step, and at pipeline end. An observer that errors or panics is
//! logged and skipped; it never changes the outcome of a run.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::domain::{Brief, ProgressKind, ProgressUpdate};

/// Receives progress notifications
pub trait Observer: Send + Sync {
    fn notify(&self, update: &ProgressUpdate<'_>) -> Result<()>;
}

impl<O: Observer + ?Sized> Observer for Arc<O> {
    fn notify(&self, update: &ProgressUpdate<'_>) -> Result<()> {
        (**self).notify(update)
    }
}

/// Invoke an observer, logging and swallowing errors and panics
pub fn notify_isolated(observer: &dyn Observer, update: &ProgressUpdate<'_>) {
    match panic::catch_unwind(AssertUnwindSafe(|| observer.notify(update))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(error = %e, kind = ?update.kind, "Observer failed, continuing");
        }
        Err(_) => {
            warn!(kind = ?update.kind, "Observer panicked, continuing");
        }
    }
}

/// Observer backed by a closure
pub struct FnObserver<F> {
    f: F,
}

impl<F> Observer for FnObserver<F>
where
    F: Fn(&ProgressUpdate<'_>) -> Result<()> + Send + Sync,
{
    fn notify(&self, update: &ProgressUpdate<'_>) -> Result<()> {
        (self.f)(update)
    }
}

/// Wrap a closure as an observer
pub fn from_fn<F>(f: F) -> FnObserver<F>
where
    F: Fn(&ProgressUpdate<'_>) -> Result<()> + Send + Sync,
{
    FnObserver { f }
}

/// Several observers behind one, each isolated from the others
#[derive(Clone, Default)]
pub struct ObserverChain {
    observers: Vec<Arc<dyn Observer>>,
}

impl ObserverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observer: Arc<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn with(mut self, observer: impl Observer + 'static) -> Self {
        self.push(Arc::new(observer));
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl From<Vec<Arc<dyn Observer>>> for ObserverChain {
    fn from(observers: Vec<Arc<dyn Observer>>) -> Self {
        Self { observers }
    }
}

impl Observer for ObserverChain {
    fn notify(&self, update: &ProgressUpdate<'_>) -> Result<()> {
        for observer in &self.observers {
            notify_isolated(observer.as_ref(), update);
        }
        Ok(())
    }
}

/// Writes every notification to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn notify(&self, update: &ProgressUpdate<'_>) -> Result<()> {
        let percent = update.percent();
        match &update.kind {
            ProgressKind::StepFailed { error, .. } => {
                error!(
                    step = update.step.unwrap_or_default(),
                    percent,
                    %error,
                    "{}",
                    update.message
                );
            }
            ProgressKind::PipelineFailed => {
                warn!(percent, "{}", update.message);
            }
            _ => {
                info!(step = update.step.unwrap_or_default(), percent, "{}", update.message);
            }
        }
        Ok(())
    }
}

/// Calls back with a step's output once that step completes
pub struct OnStepCompleted<F> {
    step: String,
    f: F,
}

impl<F> OnStepCompleted<F>
where
    F: Fn(&str, &Value, &Brief) -> Result<()> + Send + Sync,
{
    pub fn new(step: impl Into<String>, f: F) -> Self {
        Self {
            step: step.into(),
            f,
        }
    }
}

impl<F> Observer for OnStepCompleted<F>
where
    F: Fn(&str, &Value, &Brief) -> Result<()> + Send + Sync,
{
    fn notify(&self, update: &ProgressUpdate<'_>) -> Result<()> {
        if !matches!(update.kind, ProgressKind::StepCompleted { .. }) {
            return Ok(());
        }
        if update.step != Some(self.step.as_str()) {
            return Ok(());
        }
        match update.brief.output(&self.step) {
            Some(output) => (self.f)(&self.step, output, update.brief),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn update<'a>(
        brief: &'a Brief,
        kind: ProgressKind,
        step: Option<&'a str>,
    ) -> ProgressUpdate<'a> {
        ProgressUpdate {
            kind,
            progress: 0.5,
            message: "test".to_string(),
            step,
            brief,
        }
    }

    #[test]
    fn test_chain_survives_failing_observers() {
        let brief = Brief::new("topic").unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        let chain = ObserverChain::new()
            .with(from_fn(|_| anyhow::bail!("display disconnected")))
            .with(from_fn(|_| panic!("observer bug")))
            .with(from_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));

        let result = chain.notify(&update(&brief, ProgressKind::PipelineStarted, None));

        assert!(result.is_ok());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_on_step_completed_filters_by_step() {
        let mut brief = Brief::new("topic").unwrap();
        brief.start().unwrap();
        brief.record_success("outline", json!(["intro"])).unwrap();

        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let hook = OnStepCompleted::new("outline", move |name: &str, output: &Value, _: &Brief| {
            sink.lock().unwrap().push((name.to_string(), output.clone()));
            Ok(())
        });

        let done = ProgressKind::StepCompleted { index: 0, total: 2 };
        let started = ProgressKind::StepStarted { index: 0, total: 2 };
        hook.notify(&update(&brief, started, Some("outline"))).unwrap();
        hook.notify(&update(&brief, done.clone(), Some("draft"))).unwrap();
        hook.notify(&update(&brief, done, Some("outline"))).unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0], ("outline".to_string(), json!(["intro"])));
    }

    #[test]
    fn test_log_observer_never_fails() {
        let brief = Brief::new("topic").unwrap();
        let failed = ProgressKind::StepFailed {
            index: 0,
            total: 1,
            error: "boom".to_string(),
        };
        assert!(LogObserver.notify(&update(&brief, failed, Some("a"))).is_ok());
    }
}
