use std::collections::VecDeque;

use framedrop_common::frame::Frame;

use crate::error::ReadError;

/// One capture input.
///
/// Implementations are opened through their own constructor, which returns
/// `SourceError::Unavailable` when the input cannot be used at all. After
/// that, `read_next` yields frames in source order. The only side effect of a
/// read is advancing the source position, including on failure.
pub trait FrameSource: Send {
    /// Read the next frame, blocking if the underlying input needs to.
    fn read_next(&mut self) -> Result<Frame, ReadError>;

    /// Human-readable description for logging.
    fn describe(&self) -> String {
        "unnamed source".into()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_next(&mut self) -> Result<Frame, ReadError> {
        (**self).read_next()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// In-memory source that replays a scripted sequence of reads.
///
/// Once the script is exhausted every read returns `EndOfStream`.
#[derive(Debug, Default)]
pub struct MemorySource {
    script: VecDeque<Result<Frame, ReadError>>,
    reads: u64,
}

impl MemorySource {
    pub fn from_frames(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self::scripted(frames.into_iter().map(Ok))
    }

    /// Replay frames and injected failures in the given order.
    pub fn scripted(script: impl IntoIterator<Item = Result<Frame, ReadError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            reads: 0,
        }
    }

    /// Entries still waiting to be read.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    /// Total number of `read_next` calls so far.
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl FrameSource for MemorySource {
    fn read_next(&mut self) -> Result<Frame, ReadError> {
        self.reads += 1;
        self.script.pop_front().unwrap_or(Err(ReadError::EndOfStream))
    }

    fn describe(&self) -> String {
        format!("memory source ({} entries left)", self.script.len())
    }
}
