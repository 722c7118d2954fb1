use framedrop_common::frame::Frame;
use rayon::ThreadPool;
use tracing::{debug, info, warn};

use crate::buffer::FrameBuffer;
use crate::error::{EngineError, ReadError, SourceError, TaskFault, TaskResult};
use crate::source::FrameSource;
use crate::task::{run_pre_parallel, run_pre_sequential, PostTask, PreTask, TaskRegistry};
use crate::FrameIndex;

/// Position of the active source in the source list.
const ACTIVE_SOURCE: usize = 0;

/// Lifecycle of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No frame pair has been read yet (or priming failed).
    Created,
    /// The last advance succeeded.
    Running,
    /// The last read hit the end of the stream.
    Exhausted,
    /// The last read failed.
    Failed,
}

/// How pre-tasks are dispatched within one advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Sequential,
    /// Run pre-tasks on a rayon pool. `worker_threads == 0` uses the global
    /// pool, anything else builds a dedicated pool of that size.
    Parallel { worker_threads: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub dispatch: Dispatch,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            dispatch: Dispatch::Parallel { worker_threads: 0 },
        }
    }
}

enum Workers {
    Sequential,
    GlobalPool,
    Pool(ThreadPool),
}

/// Drives one capture source through the pre-task / post-task chain.
///
/// Each successful [`advance`](Self::advance):
/// 1. reads the next frame (two on the very first call),
/// 2. on the first success only, runs post-tasks over a copy of frame 0,
/// 3. bumps the frame index,
/// 4. runs all pre-tasks on `(previous, current, index)` and joins them,
/// 5. copies `current` into `result`,
/// 6. runs all post-tasks over `result` in registration order.
///
/// The engine is synchronous: `advance` returns only after every task for
/// that frame is done. Faults inside tasks are logged and swallowed.
pub struct PipelineEngine<S> {
    sources: Vec<S>,
    /// `describe()` of the active source, taken once at construction.
    source_name: String,
    buffer: FrameBuffer,
    registry: TaskRegistry,
    workers: Workers,
    frame_index: FrameIndex,
    state: EngineState,
}

impl<S: FrameSource> PipelineEngine<S> {
    /// Engine over a single source, dispatching pre-tasks on the global pool.
    pub fn new(source: S) -> Self {
        Self::build(vec![source], Workers::GlobalPool)
    }

    /// Engine over an ordered source list. Only the first source is read.
    pub fn from_sources(sources: Vec<S>, options: EngineOptions) -> Result<Self, EngineOpenError> {
        if sources.is_empty() {
            return Err(SourceError::Unavailable {
                descriptor: "source list".into(),
                reason: "no capture source configured".into(),
            }
            .into());
        }
        let workers = match options.dispatch {
            Dispatch::Sequential => Workers::Sequential,
            Dispatch::Parallel { worker_threads: 0 } => Workers::GlobalPool,
            Dispatch::Parallel { worker_threads } => Workers::Pool(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(worker_threads)
                    .thread_name(|i| format!("framedrop-pretask-{i}"))
                    .build()
                    .map_err(EngineError::from)?,
            ),
        };
        Ok(Self::build(sources, workers))
    }

    /// Engine over a single source with explicit options.
    pub fn with_options(source: S, options: EngineOptions) -> Result<Self, EngineOpenError> {
        Self::from_sources(vec![source], options)
    }

    fn build(sources: Vec<S>, workers: Workers) -> Self {
        let source_name = sources
            .get(ACTIVE_SOURCE)
            .map(|source| source.describe())
            .unwrap_or_default();
        info!(
            source = %source_name,
            sources = sources.len(),
            "pipeline engine created"
        );
        Self {
            sources,
            source_name,
            buffer: FrameBuffer::new(),
            registry: TaskRegistry::new(),
            workers,
            frame_index: 0,
            state: EngineState::Created,
        }
    }

    // -- Registration ------------------------------------------------------------

    pub fn add_pre_task(&mut self, task: impl PreTask + 'static) {
        self.registry.add_pre_task(task);
    }

    pub fn add_post_task(&mut self, task: impl PostTask + 'static) {
        self.registry.add_post_task(task);
    }

    pub fn add_pre_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Frame, &Frame, FrameIndex) -> TaskResult + Send + Sync + 'static,
    {
        self.registry.add_pre_fn(name, f);
    }

    pub fn add_post_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnMut(&mut Frame) -> TaskResult + Send + 'static,
    {
        self.registry.add_post_fn(name, f);
    }

    // -- Driving -----------------------------------------------------------------

    /// Process the next frame. Returns false when no frame could be read;
    /// the driver is expected to stop (or retry) at that point.
    pub fn advance(&mut self) -> bool {
        self.try_advance().is_ok()
    }

    /// Like [`advance`](Self::advance) but keeps the reason a read failed.
    /// Returns the new frame index on success.
    pub fn try_advance(&mut self) -> Result<FrameIndex, ReadError> {
        let priming = self.frame_index == 0;

        if let Err(e) = self.read_into_buffer(priming) {
            self.record_read_error(&e);
            return Err(e);
        }

        if priming {
            // Frame 0 would otherwise never pass through the post-task chain.
            self.buffer.seed_result_from_previous();
            self.dispatch_post();
        }

        self.frame_index += 1;
        if self.state != EngineState::Running {
            info!(frame_index = self.frame_index, "pipeline running");
        }
        self.state = EngineState::Running;

        self.dispatch_pre();
        self.buffer.snapshot_result();
        self.dispatch_post();

        debug!(frame_index = self.frame_index, "frame advanced");
        Ok(self.frame_index)
    }

    /// Read then rotate, so a failed read leaves the buffer untouched.
    fn read_into_buffer(&mut self, priming: bool) -> Result<(), ReadError> {
        let source = &mut self.sources[ACTIVE_SOURCE];
        if priming {
            let first = source.read_next()?;
            let second = source.read_next()?;
            self.buffer.prime_first(first, second);
        } else {
            let next = source.read_next()?;
            self.buffer.rotate(next);
        }
        Ok(())
    }

    fn record_read_error(&mut self, error: &ReadError) {
        let source = self.source_name.as_str();
        if self.frame_index == 0 {
            // Nothing was primed, the engine has not started.
            warn!(source, error = %error, "could not read two frames to prime the pipeline");
            return;
        }
        match error {
            ReadError::EndOfStream => {
                info!(source, frame_index = self.frame_index, "end of stream");
                self.state = EngineState::Exhausted;
            }
            ReadError::Failure(reason) => {
                warn!(source, frame_index = self.frame_index, reason, "frame read failed");
                self.state = EngineState::Failed;
            }
        }
    }

    fn dispatch_pre(&self) {
        let Some((previous, current)) = self.buffer.inputs() else {
            return;
        };
        let index = self.frame_index;
        let tasks = self.registry.pre_tasks();
        let faults = match &self.workers {
            Workers::Sequential => run_pre_sequential(tasks, previous, current, index),
            Workers::GlobalPool => run_pre_parallel(tasks, previous, current, index),
            Workers::Pool(pool) => {
                pool.install(|| run_pre_parallel(tasks, previous, current, index))
            }
        };
        log_faults("pre-task", index, &faults);
    }

    fn dispatch_post(&mut self) {
        let Some(result) = self.buffer.result_mut() else {
            return;
        };
        let faults = self.registry.run_post(result);
        log_faults("post-task", self.frame_index, &faults);
    }

    // -- Accessors ---------------------------------------------------------------

    pub fn current_frame_index(&self) -> FrameIndex {
        self.frame_index
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// The active source, e.g. to inspect its position after a run.
    pub fn active_source(&self) -> &S {
        &self.sources[ACTIVE_SOURCE]
    }
}

fn log_faults(kind: &str, frame_index: FrameIndex, faults: &[TaskFault]) {
    for fault in faults {
        warn!(kind, frame_index, error = %fault, "task fault, continuing");
    }
}

/// Errors that can occur while constructing an engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineOpenError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use framedrop_common::frame::PixelFormat;
    use std::sync::{Arc, Mutex};

    const RED: [u8; 3] = [255, 0, 0];
    const BLUE: [u8; 3] = [0, 0, 255];

    /// Frame whose pixels all hold `value`, so each one is recognizable.
    fn frame(value: u8) -> Frame {
        Frame::filled(4, 4, PixelFormat::Rgb8, &[value, value, value])
    }

    fn source(count: u8) -> MemorySource {
        MemorySource::from_frames((0..count).map(frame))
    }

    fn sequential(source: MemorySource) -> PipelineEngine<MemorySource> {
        PipelineEngine::with_options(
            source,
            EngineOptions {
                dispatch: Dispatch::Sequential,
            },
        )
        .unwrap()
    }

    /// Records the value of pixel (0, 0) of every frame the post-chain sees.
    fn record_post(engine: &mut PipelineEngine<MemorySource>) -> Arc<Mutex<Vec<u8>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.add_post_fn("record", move |result: &mut Frame| {
            sink.lock().unwrap().push(result.pixel(0, 0).unwrap()[0]);
            Ok(())
        });
        seen
    }

    #[test]
    fn n_frames_give_n_minus_one_advances() {
        for n in 2..8u8 {
            let mut engine = PipelineEngine::new(source(n));
            let mut successes = 0;
            while engine.advance() {
                successes += 1;
            }
            assert_eq!(successes, n as u64 - 1);
            assert_eq!(engine.current_frame_index(), n as u64 - 1);
        }
    }

    #[test]
    fn single_frame_source_never_advances() {
        let mut engine = PipelineEngine::new(source(1));
        for _ in 0..3 {
            assert!(!engine.advance());
        }
        assert_eq!(engine.current_frame_index(), 0);
        assert_eq!(engine.state(), EngineState::Created);
    }

    #[test]
    fn three_frames_yield_indices_one_and_two() {
        let mut engine = PipelineEngine::new(source(3));
        assert_eq!(engine.try_advance(), Ok(1));
        assert_eq!(engine.try_advance(), Ok(2));
        assert_eq!(engine.try_advance(), Err(ReadError::EndOfStream));
        assert_eq!(engine.current_frame_index(), 2);
        assert_eq!(engine.state(), EngineState::Exhausted);
    }

    #[test]
    fn pre_tasks_see_consecutive_pairs_and_index() {
        let mut engine = sequential(source(4));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.add_pre_fn("pairs", move |prev: &Frame, cur: &Frame, index| {
            let p = prev.pixel(0, 0).unwrap()[0];
            let c = cur.pixel(0, 0).unwrap()[0];
            sink.lock().unwrap().push((p, c, index));
            Ok(())
        });
        while engine.advance() {}
        assert_eq!(*seen.lock().unwrap(), vec![(0, 1, 1), (1, 2, 2), (2, 3, 3)]);
    }

    #[test]
    fn first_advance_runs_post_tasks_for_frame_zero_and_one() {
        let mut engine = PipelineEngine::new(source(3));
        let seen = record_post(&mut engine);

        assert!(engine.advance());
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);

        assert!(engine.advance());
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn post_task_order_is_registration_order() {
        fn paint(color: [u8; 3]) -> impl FnMut(&mut Frame) -> TaskResult + Send {
            move |result: &mut Frame| {
                result.set_pixel(0, 0, &color);
                Ok(())
            }
        }

        for (first, second) in [(RED, BLUE), (BLUE, RED)] {
            let mut engine = PipelineEngine::new(source(2));
            engine.add_post_fn("first", paint(first));
            engine.add_post_fn("second", paint(second));
            assert!(engine.advance());
            let result = engine.buffer().result().unwrap();
            assert_eq!(result.pixel(0, 0).unwrap(), &second);
            // current itself is never painted
            assert_eq!(engine.buffer().current().unwrap(), &frame(1));
        }
    }

    #[test]
    fn post_tasks_never_leak_into_pre_task_inputs() {
        fn sums(with_post_tasks: bool) -> Vec<(u64, u64)> {
            let mut engine = PipelineEngine::new(source(6));
            let sums = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&sums);
            engine.add_pre_fn("sum", move |prev: &Frame, cur: &Frame, _| {
                sink.lock().unwrap().push((prev.pixel_sum(), cur.pixel_sum()));
                Ok(())
            });
            if with_post_tasks {
                engine.add_post_fn("scribble", |result: &mut Frame| {
                    result.fill(&[200, 100, 50]);
                    Ok(())
                });
            }
            while engine.advance() {}
            let out = sums.lock().unwrap().clone();
            out
        }

        assert_eq!(sums(false), sums(true));
        assert_eq!(sums(true).len(), 5);
    }

    #[test]
    fn faulting_pre_task_does_not_stop_the_frame() {
        let mut engine = PipelineEngine::new(source(3));
        let ran = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&ran);
        engine.add_pre_fn("errors", |_, _, _| Err("analysis exploded".into()));
        engine.add_pre_fn("panics", |_, _, _| panic!("analysis panicked"));
        engine.add_pre_fn("healthy", move |_, _, _| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });
        let seen = record_post(&mut engine);

        assert!(engine.advance());
        assert!(engine.advance());
        assert_eq!(*ran.lock().unwrap(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn faulting_post_task_keeps_partial_mutation() {
        let mut engine = PipelineEngine::new(source(2));
        engine.add_post_fn("half-done", |result: &mut Frame| {
            result.set_pixel(0, 0, &RED);
            Err("overlay failed".into())
        });
        let seen = record_post(&mut engine);

        assert!(engine.advance());
        // The recorder still ran and observed the partial write.
        assert_eq!(*seen.lock().unwrap(), vec![255, 255]);
        assert_eq!(engine.buffer().result().unwrap().pixel(0, 0).unwrap(), &RED);
    }

    #[test]
    fn read_failure_keeps_buffer_and_allows_retry() {
        let mut engine = PipelineEngine::new(MemorySource::scripted([
            Ok(frame(0)),
            Ok(frame(1)),
            Err(ReadError::Failure("usb hiccup".into())),
            Ok(frame(2)),
        ]));

        assert!(engine.advance());
        assert_eq!(
            engine.try_advance(),
            Err(ReadError::Failure("usb hiccup".into()))
        );
        assert_eq!(engine.state(), EngineState::Failed);
        assert_eq!(engine.current_frame_index(), 1);
        assert_eq!(engine.buffer().previous(), Some(&frame(0)));
        assert_eq!(engine.buffer().current(), Some(&frame(1)));

        assert_eq!(engine.try_advance(), Ok(2));
        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(engine.buffer().previous(), Some(&frame(1)));
        assert_eq!(engine.buffer().current(), Some(&frame(2)));
    }

    #[test]
    fn failed_priming_retries_with_fresh_pair() {
        let mut engine = PipelineEngine::new(MemorySource::scripted([
            Ok(frame(0)),
            Err(ReadError::Failure("dropped".into())),
            Ok(frame(5)),
            Ok(frame(6)),
        ]));
        assert!(!engine.advance());
        assert_eq!(engine.state(), EngineState::Created);
        assert_eq!(engine.current_frame_index(), 0);

        assert!(engine.advance());
        assert_eq!(engine.buffer().previous(), Some(&frame(5)));
        assert_eq!(engine.buffer().current(), Some(&frame(6)));
    }

    #[test]
    fn parallel_and_sequential_dispatch_agree() {
        fn run(dispatch: Dispatch) -> Vec<(FrameIndex, u64)> {
            let mut engine =
                PipelineEngine::with_options(source(10), EngineOptions { dispatch }).unwrap();
            let out = Arc::new(Mutex::new(Vec::new()));
            for _ in 0..4 {
                let sink = Arc::clone(&out);
                engine.add_pre_fn("diff", move |prev: &Frame, cur: &Frame, index| {
                    let delta = cur.pixel_sum() - prev.pixel_sum();
                    sink.lock().unwrap().push((index, delta));
                    Ok(())
                });
            }
            while engine.advance() {}
            let mut values = out.lock().unwrap().clone();
            values.sort();
            values
        }

        let expected = run(Dispatch::Sequential);
        assert_eq!(expected.len(), 36);
        assert_eq!(run(Dispatch::Parallel { worker_threads: 0 }), expected);
        assert_eq!(run(Dispatch::Parallel { worker_threads: 3 }), expected);
    }

    #[test]
    fn dedicated_pool_runs_pre_tasks_on_its_own_threads() {
        let mut engine = PipelineEngine::with_options(
            source(3),
            EngineOptions {
                dispatch: Dispatch::Parallel { worker_threads: 2 },
            },
        )
        .unwrap();
        let threads = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&threads);
        engine.add_pre_fn("thread", move |_, _, _| {
            let name = std::thread::current().name().unwrap_or_default().to_string();
            sink.lock().unwrap().push(name);
            Ok(())
        });
        while engine.advance() {}

        let threads = threads.lock().unwrap();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|n| n.starts_with("framedrop-pretask-")));
    }

    #[test]
    fn panicking_post_task_keeps_partial_write_in_both_passes() {
        let mut engine = PipelineEngine::new(source(2));
        engine.add_post_fn("panics-midway", |result: &mut Frame| {
            result.set_pixel(0, 0, &BLUE);
            panic!("overlay panicked");
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.add_post_fn("record", move |result: &mut Frame| {
            sink.lock().unwrap().push(result.pixel(0, 0).unwrap().to_vec());
            Ok(())
        });

        // frame-0 pass plus frame-1 pass, both after the panic
        assert!(engine.advance());
        assert_eq!(*seen.lock().unwrap(), vec![BLUE.to_vec(), BLUE.to_vec()]);
        assert_eq!(engine.state(), EngineState::Running);
        // previous is never touched by the frame-0 pass
        assert_eq!(engine.buffer().previous(), Some(&frame(0)));
    }

    #[test]
    fn source_is_described_once() {
        struct Counting {
            inner: MemorySource,
            describes: Arc<Mutex<usize>>,
        }

        impl FrameSource for Counting {
            fn read_next(&mut self) -> Result<Frame, ReadError> {
                self.inner.read_next()
            }

            fn describe(&self) -> String {
                *self.describes.lock().unwrap() += 1;
                "counting".into()
            }
        }

        let describes = Arc::new(Mutex::new(0));
        let mut engine = PipelineEngine::new(Counting {
            inner: MemorySource::scripted([
                Ok(frame(0)),
                Ok(frame(1)),
                Err(ReadError::Failure("a".into())),
                Err(ReadError::Failure("b".into())),
            ]),
            describes: Arc::clone(&describes),
        });
        assert!(engine.advance());
        assert!(!engine.advance());
        assert!(!engine.advance());
        assert!(!engine.advance());
        assert_eq!(*describes.lock().unwrap(), 1);
    }

    #[test]
    fn tasks_added_between_advances_apply_from_next_frame() {
        let mut engine = PipelineEngine::new(source(4));
        assert!(engine.advance());

        let seen = record_post(&mut engine);
        let indices = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&indices);
        engine.add_pre_fn("late", move |_, _, index| {
            sink.lock().unwrap().push(index);
            Ok(())
        });

        assert!(engine.advance());
        assert!(engine.advance());
        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
        assert_eq!(*indices.lock().unwrap(), vec![2, 3]);
    }

    #[test]
    fn empty_source_list_is_unavailable() {
        let result = PipelineEngine::<MemorySource>::from_sources(Vec::new(), EngineOptions::default());
        assert!(matches!(
            result,
            Err(EngineOpenError::Source(SourceError::Unavailable { .. }))
        ));
    }

    #[test]
    fn only_the_first_source_is_read() {
        let mut engine = PipelineEngine::from_sources(
            vec![source(3), source(3)],
            EngineOptions::default(),
        )
        .unwrap();
        while engine.advance() {}
        assert_eq!(engine.source_count(), 2);
        assert_eq!(engine.current_frame_index(), 2);
        assert_eq!(engine.active_source().reads(), 4);
    }
}
