//! Ordered step execution with reverse-order compensation.
//!
//! A flow is a flat list of [`Step`] descriptors run against one shared
//! context. Steps with a compensation are remembered once they succeed. When a
//! later step fails, remembered compensations run newest first, then the
//! failure is returned. A compensation that itself fails is logged and does
//! not replace the original error.

use std::fmt::Display;

use futures::future::BoxFuture;
use tracing::{debug, warn};

/// What to do after a step succeeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepFlow {
    /// Run the next step.
    Continue,
    /// Stop here successfully; remaining steps are skipped.
    Finish,
}

/// Future returned by a step's `run`.
pub type StepFuture<'a, E> = BoxFuture<'a, Result<StepFlow, E>>;

/// Future returned by a step's `compensate`.
pub type CompensateFuture<'a, E> = BoxFuture<'a, Result<(), E>>;

/// Step body.
pub type RunFn<C, E> = for<'a> fn(&'a mut C) -> StepFuture<'a, E>;

/// Undo for a completed step.
pub type CompensateFn<C, E> = for<'a> fn(&'a mut C) -> CompensateFuture<'a, E>;

/// One named unit of work.
pub struct Step<C, E> {
    /// Name used in logs and failures.
    pub name: &'static str,
    /// The work.
    pub run: RunFn<C, E>,
    /// Undo, for steps with side effects.
    pub compensate: Option<CompensateFn<C, E>>,
}

impl<C, E> Step<C, E> {
    /// A step without side effects.
    pub fn read_only(name: &'static str, run: RunFn<C, E>) -> Self {
        Self {
            name,
            run,
            compensate: None,
        }
    }

    /// A step whose effects are undone by `compensate`.
    pub fn compensating(name: &'static str, run: RunFn<C, E>, compensate: CompensateFn<C, E>) -> Self {
        Self {
            name,
            run,
            compensate: Some(compensate),
        }
    }
}

/// A step failed. Compensations have already run.
#[derive(Debug)]
pub struct StepFailure<E> {
    /// Name of the failing step.
    pub step: &'static str,
    /// Its error.
    pub error: E,
}

/// Run `steps` in order against `ctx`.
pub async fn run_steps<C, E>(ctx: &mut C, steps: &[Step<C, E>]) -> Result<(), StepFailure<E>>
where
    C: Send,
    E: Display,
{
    let mut completed: Vec<&Step<C, E>> = Vec::new();
    for step in steps {
        debug!(step = step.name, "running step");
        match (step.run)(ctx).await {
            Ok(flow) => {
                if step.compensate.is_some() {
                    completed.push(step);
                }
                if flow == StepFlow::Finish {
                    debug!(step = step.name, "flow finished early");
                    break;
                }
            }
            Err(error) => {
                unwind(ctx, &completed).await;
                return Err(StepFailure {
                    step: step.name,
                    error,
                });
            }
        }
    }
    Ok(())
}

async fn unwind<C, E: Display>(ctx: &mut C, completed: &[&Step<C, E>]) {
    for step in completed.iter().rev() {
        let Some(compensate) = step.compensate else {
            continue;
        };
        debug!(step = step.name, "compensating");
        if let Err(err) = compensate(ctx).await {
            warn!(step = step.name, error = %err, "compensation failed");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
