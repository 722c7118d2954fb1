use framedrop_common::frame::Frame;

/// The three frame slots owned by one engine.
///
/// `previous` and `current` are only ever replaced by moving frames in, so
/// they can never share storage. `result` is a separate deep copy that is the
/// only slot post-tasks get to mutate.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    previous: Option<Frame>,
    current: Option<Frame>,
    result: Option<Frame>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bootstrap with the first two frames of a source.
    pub fn prime_first(&mut self, first: Frame, second: Frame) {
        self.previous = Some(first);
        self.current = Some(second);
    }

    /// Shift `current` into `previous` and store `next` as `current`.
    ///
    /// The old `previous` is dropped. Callers only rotate after a successful
    /// read, so a failed read never leaves the buffer half-rotated.
    pub fn rotate(&mut self, next: Frame) {
        self.previous = self.current.replace(next);
    }

    /// Deep-copy `current` into `result`, reusing the result allocation.
    pub fn snapshot_result(&mut self) {
        Self::copy_into(&mut self.result, self.current.as_ref());
    }

    /// Deep-copy `previous` into `result`. Used once, to push frame 0
    /// through the post-task chain without touching `previous`.
    pub fn seed_result_from_previous(&mut self) {
        Self::copy_into(&mut self.result, self.previous.as_ref());
    }

    fn copy_into(slot: &mut Option<Frame>, source: Option<&Frame>) {
        match source {
            Some(src) => match slot {
                Some(dst) => dst.clone_from(src),
                None => *slot = Some(src.clone()),
            },
            None => *slot = None,
        }
    }

    pub fn previous(&self) -> Option<&Frame> {
        self.previous.as_ref()
    }

    pub fn current(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    pub fn result(&self) -> Option<&Frame> {
        self.result.as_ref()
    }

    /// Split borrow used for dispatch: both pre-task inputs at once.
    pub(crate) fn inputs(&self) -> Option<(&Frame, &Frame)> {
        Some((self.previous.as_ref()?, self.current.as_ref()?))
    }

    pub(crate) fn result_mut(&mut self) -> Option<&mut Frame> {
        self.result.as_mut()
    }
}
