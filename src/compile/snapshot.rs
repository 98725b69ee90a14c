use serde::Serialize;

use workflow::{DataContext, ExecutorKind};

use super::context::{BuiltStep, CompilationContext};

/// JSON record of a compilation, written at the end of every run
/// and also when a step fails to build.
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    pub title: &'a str,
    pub run_code: &'a str,
    pub message: Option<&'a str>,
    pub created: String,
    pub executor: ExecutorKind,
    pub complete: bool,
    /// Step that stopped compilation, if any.
    pub failed_step: Option<&'a str>,
    pub error: Option<String>,
    pub order: &'a [String],
    pub samples: &'a DataContext,
    /// Steps that were built, in execution order.
    pub steps: &'a [BuiltStep],
}

impl<'a> Snapshot<'a> {
    pub fn new(ctx: &'a CompilationContext) -> Self {
        Self {
            title: &ctx.pipeline.title,
            run_code: &ctx.run_code,
            message: ctx.message.as_deref(),
            created: chrono::Local::now().to_rfc3339(),
            executor: ctx.executor.kind(),
            complete: true,
            failed_step: None,
            error: None,
            order: ctx.resolution.order(),
            samples: &ctx.pipeline.samples,
            steps: &ctx.built,
        }
    }

    pub fn failed(mut self, step: &'a str, error: &anyhow::Error) -> Self {
        self.complete = false;
        self.failed_step = Some(step);
        self.error = Some(format!("{error:#}"));
        self
    }
}
