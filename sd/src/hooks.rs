//! Pre-dispatch observers
//!
//! Hooks run synchronously, in registration order, right before a claimed job
//! is handed to the work queue. The first failing hook stops the chain and
//! the job is skipped; the scheduler logs the failure and moves on.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use delayqueue::DelayedJob;

/// What a hook sees about the job being dispatched
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'a> {
    pub queue: &'a str,
    pub job_type: &'a str,
    pub args: &'a [Value],
}

impl<'a> From<&'a DelayedJob> for DispatchContext<'a> {
    fn from(job: &'a DelayedJob) -> Self {
        Self {
            queue: &job.queue,
            job_type: &job.job_type,
            args: &job.args,
        }
    }
}

/// A pre-dispatch observer
pub trait DispatchHook: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Called before the job is enqueued; an error skips the job
    fn before_dispatch(&self, ctx: &DispatchContext<'_>) -> eyre::Result<()>;
}

/// A hook failed (returned an error or panicked)
#[derive(Debug, Error)]
#[error("Dispatch hook '{hook}' failed: {message}")]
pub struct HookError {
    pub hook: String,
    pub message: String,
}

/// Hook backed by a closure
pub struct FnHook<F> {
    name: String,
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(&DispatchContext<'_>) -> eyre::Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> DispatchHook for FnHook<F>
where
    F: Fn(&DispatchContext<'_>) -> eyre::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn before_dispatch(&self, ctx: &DispatchContext<'_>) -> eyre::Result<()> {
        (self.f)(ctx)
    }
}

/// Logs every dispatch at info level
#[derive(Debug, Default)]
pub struct LogDispatchHook;

impl DispatchHook for LogDispatchHook {
    fn name(&self) -> &str {
        "log-dispatch"
    }

    fn before_dispatch(&self, ctx: &DispatchContext<'_>) -> eyre::Result<()> {
        info!(queue = ctx.queue, job_type = ctx.job_type, args = ?ctx.args, "Dispatching delayed job");
        Ok(())
    }
}

/// Ordered list of registered hooks
#[derive(Clone, Default)]
pub struct DispatchHooks {
    hooks: Vec<Arc<dyn DispatchHook>>,
}

impl DispatchHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook; hooks run in the order they were registered
    pub fn register(&mut self, hook: Arc<dyn DispatchHook>) -> &mut Self {
        debug!(hook = hook.name(), "DispatchHooks::register: called");
        self.hooks.push(hook);
        self
    }

    /// Append a closure hook
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&DispatchContext<'_>) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnHook::new(name, f)))
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Run every hook for one job, stopping at the first failure
    ///
    /// A panicking hook counts as a failure.
    pub fn run(&self, ctx: &DispatchContext<'_>) -> Result<(), HookError> {
        for hook in &self.hooks {
            let outcome = catch_unwind(AssertUnwindSafe(|| hook.before_dispatch(ctx)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{:#}", e),
                Err(panic) => panic_message(panic.as_ref()),
            };
            return Err(HookError {
                hook: hook.name().to_string(),
                message,
            });
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    fn job() -> DelayedJob {
        DelayedJob::new("emails", "Welcome", vec![json!(1)], 0)
    }

    #[test]
    fn test_hooks_run_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = DispatchHooks::new();
        for name in ["first", "second", "third"] {
            let calls = calls.clone();
            hooks.register_fn(name, move |_ctx| {
                calls.lock().unwrap().push(name);
                Ok(())
            });
        }

        let job = job();
        hooks.run(&DispatchContext::from(&job)).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(hooks.names(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_hook_sees_job_fields() {
        let mut hooks = DispatchHooks::new();
        hooks.register_fn("check", |ctx| {
            eyre::ensure!(ctx.queue == "emails", "wrong queue");
            eyre::ensure!(ctx.job_type == "Welcome", "wrong type");
            eyre::ensure!(ctx.args == [json!(1)], "wrong args");
            Ok(())
        });
        let job = job();
        assert!(hooks.run(&DispatchContext::from(&job)).is_ok());
    }

    #[test]
    fn test_failure_stops_chain_and_names_hook() {
        let reached = Arc::new(Mutex::new(false));
        let mut hooks = DispatchHooks::new();
        hooks.register_fn("veto", |_| Err(eyre::eyre!("not today")));
        {
            let reached = reached.clone();
            hooks.register_fn("after", move |_| {
                *reached.lock().unwrap() = true;
                Ok(())
            });
        }

        let job = job();
        let err = hooks.run(&DispatchContext::from(&job)).unwrap_err();
        assert_eq!(err.hook, "veto");
        assert!(err.message.contains("not today"));
        assert!(!*reached.lock().unwrap());
    }

    #[test]
    fn test_panicking_hook_is_a_failure() {
        let mut hooks = DispatchHooks::new();
        hooks.register_fn("boom", |_| panic!("exploded"));

        let job = job();
        let err = hooks.run(&DispatchContext::from(&job)).unwrap_err();
        assert_eq!(err.hook, "boom");
        assert!(err.message.contains("exploded"));
    }

    #[test]
    fn test_empty_hooks_pass() {
        let hooks = DispatchHooks::new();
        assert!(hooks.is_empty());
        let job = job();
        assert!(hooks.run(&DispatchContext::from(&job)).is_ok());
    }

    #[test]
    fn test_log_hook_passes() {
        let mut hooks = DispatchHooks::new();
        hooks.register(Arc::new(LogDispatchHook));
        let job = job();
        assert!(hooks.run(&DispatchContext::from(&job)).is_ok());
        assert_eq!(hooks.len(), 1);
    }
}
