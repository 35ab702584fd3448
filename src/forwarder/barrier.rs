//! Fault barrier
//!
//! Runs a unit of work and makes sure any failure is logged with full
//! context before it propagates. Failures are never swallowed: errors are
//! returned unchanged and panics keep unwinding.

use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tracing::error;

use crate::error::{Error, Result};

/// Log-then-rethrow wrapper around fallible work
#[derive(Debug, Clone, Default)]
pub struct FaultBarrier {
    failures: Arc<AtomicU64>,
}

impl FaultBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a synchronous action
    pub fn run<T, F>(&self, context: &str, action: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                self.record_error(context, &e);
                Err(e)
            }
            Err(payload) => {
                self.record_panic(context, payload.as_ref());
                panic::resume_unwind(payload)
            }
        }
    }

    /// Run an asynchronous action
    pub async fn run_async<T, Fut>(&self, context: &str, action: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match AssertUnwindSafe(action).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                self.record_error(context, &e);
                Err(e)
            }
            Err(payload) => {
                self.record_panic(context, payload.as_ref());
                panic::resume_unwind(payload)
            }
        }
    }

    /// Number of failures that went through this barrier (all clones share it)
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn record_error(&self, context: &str, e: &Error) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let backtrace = Backtrace::force_capture();
        error!(
            context = %context,
            kind = ?e.kind(),
            error = %e,
            detail = ?e,
            backtrace = %backtrace,
            "Failure in {}: {}",
            context,
            e
        );
    }

    fn record_panic(&self, context: &str, payload: &(dyn Any + Send)) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let backtrace = Backtrace::force_capture();
        let message = panic_message(payload);
        error!(
            context = %context,
            panic = %message,
            backtrace = %backtrace,
            "Panic in {}: {}",
            context,
            message
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
