use std::panic::{catch_unwind, AssertUnwindSafe};

use framedrop_common::frame::Frame;
use rayon::prelude::*;

use crate::error::{TaskFault, TaskResult};
use crate::FrameIndex;

/// Read-only analysis run once per advance with the previous and current frame.
///
/// Pre-tasks only ever see shared references, and may run concurrently with
/// every other pre-task registered on the same engine. Any state a pre-task
/// keeps across frames must be synchronized by the task itself.
pub trait PreTask: Send + Sync {
    fn run(&self, previous: &Frame, current: &Frame, index: FrameIndex) -> TaskResult;

    /// Name used when a fault is logged.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Mutating step run in registration order over the result frame.
pub trait PostTask: Send {
    fn run(&mut self, result: &mut Frame) -> TaskResult;

    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Adapter registering a closure as a [`PreTask`].
pub struct PreFn<F> {
    name: String,
    f: F,
}

impl<F> PreTask for PreFn<F>
where
    F: Fn(&Frame, &Frame, FrameIndex) -> TaskResult + Send + Sync,
{
    fn run(&self, previous: &Frame, current: &Frame, index: FrameIndex) -> TaskResult {
        (self.f)(previous, current, index)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Adapter registering a closure as a [`PostTask`].
pub struct PostFn<F> {
    name: String,
    f: F,
}

impl<F> PostTask for PostFn<F>
where
    F: FnMut(&mut Frame) -> TaskResult + Send,
{
    fn run(&mut self, result: &mut Frame) -> TaskResult {
        (self.f)(result)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Ordered pre-task and post-task lists.
///
/// Registration appends; there is no removal and no de-duplication. Contract
/// violations by a task are not detected here.
#[derive(Default)]
pub struct TaskRegistry {
    pre_tasks: Vec<Box<dyn PreTask>>,
    post_tasks: Vec<Box<dyn PostTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pre_task(&mut self, task: impl PreTask + 'static) {
        self.pre_tasks.push(Box::new(task));
    }

    pub fn add_post_task(&mut self, task: impl PostTask + 'static) {
        self.post_tasks.push(Box::new(task));
    }

    pub fn add_pre_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Frame, &Frame, FrameIndex) -> TaskResult + Send + Sync + 'static,
    {
        self.add_pre_task(PreFn {
            name: name.into(),
            f,
        });
    }

    pub fn add_post_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnMut(&mut Frame) -> TaskResult + Send + 'static,
    {
        self.add_post_task(PostFn {
            name: name.into(),
            f,
        });
    }

    pub fn pre_task_count(&self) -> usize {
        self.pre_tasks.len()
    }

    pub fn post_task_count(&self) -> usize {
        self.post_tasks.len()
    }

    pub fn pre_task_names(&self) -> Vec<&str> {
        self.pre_tasks.iter().map(|t| t.name()).collect()
    }

    pub fn post_task_names(&self) -> Vec<&str> {
        self.post_tasks.iter().map(|t| t.name()).collect()
    }

    pub(crate) fn pre_tasks(&self) -> &[Box<dyn PreTask>] {
        &self.pre_tasks
    }

    /// Run every post-task in registration order over `result`.
    pub(crate) fn run_post(&mut self, result: &mut Frame) -> Vec<TaskFault> {
        let mut faults = Vec::new();
        for task in self.post_tasks.iter_mut() {
            if let Err(fault) = run_post(task.as_mut(), result) {
                faults.push(fault);
            }
        }
        faults
    }
}

/// Run every pre-task one after the other. Returns the faults raised.
pub(crate) fn run_pre_sequential(
    tasks: &[Box<dyn PreTask>],
    previous: &Frame,
    current: &Frame,
    index: FrameIndex,
) -> Vec<TaskFault> {
    tasks
        .iter()
        .filter_map(|task| run_pre(task.as_ref(), previous, current, index).err())
        .collect()
}

/// Run every pre-task on the current rayon pool and join them all.
pub(crate) fn run_pre_parallel(
    tasks: &[Box<dyn PreTask>],
    previous: &Frame,
    current: &Frame,
    index: FrameIndex,
) -> Vec<TaskFault> {
    tasks
        .par_iter()
        .filter_map(|task| run_pre(task.as_ref(), previous, current, index).err())
        .collect()
}

fn run_pre(
    task: &dyn PreTask,
    previous: &Frame,
    current: &Frame,
    index: FrameIndex,
) -> Result<(), TaskFault> {
    guard(task.name(), || task.run(previous, current, index))
}

fn run_post(task: &mut dyn PostTask, result: &mut Frame) -> Result<(), TaskFault> {
    let name = task.name().to_string();
    guard(&name, || task.run(result))
}

/// Turn both error returns and panics inside a task body into a [`TaskFault`].
fn guard(name: &str, f: impl FnOnce() -> TaskResult) -> Result<(), TaskFault> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(TaskFault::Failed {
            task: name.to_string(),
            source,
        }),
        Err(payload) => Err(TaskFault::Panicked {
            task: name.to_string(),
            message: panic_message(payload),
        }),
    }
}

/// Extract a human-readable message from a panic payload.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
