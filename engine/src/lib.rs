//! Frame-sequential task execution.
//!
//! A [`PipelineEngine`] pulls frames from a [`FrameSource`], keeps the
//! previous/current pair in a [`FrameBuffer`], fans out read-only
//! [`PreTask`]s over the pair and then threads a copy of the current frame
//! through the ordered [`PostTask`] chain.

pub mod buffer;
pub mod engine;
pub mod error;
pub mod source;
pub mod task;

/// Number of frame pairs successfully advanced. Starts at 0.
pub type FrameIndex = u64;

pub use buffer::FrameBuffer;
pub use engine::{Dispatch, EngineOpenError, EngineOptions, EngineState, PipelineEngine};
pub use error::{EngineError, ReadError, SourceError, TaskError, TaskFault, TaskResult};
pub use framedrop_common::frame::{Frame, PixelFormat};
pub use source::{FrameSource, MemorySource};
pub use task::{PostTask, PreTask, TaskRegistry};
