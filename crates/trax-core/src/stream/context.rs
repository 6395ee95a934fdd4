#![forbid(unsafe_code)]

use std::fmt;

use super::EventStream;

/// Lifecycle state of a [`ProcessingContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Started,
    Paused,
    Resumed,
    Ended,
}

impl ContextState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "Started",
            Self::Paused => "Paused",
            Self::Resumed => "Resumed",
            Self::Ended => "Ended",
        }
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle on an open span of the event stream.
///
/// Invalid transitions are logged as errors and return `false`.
#[derive(Clone)]
pub struct ProcessingContext {
    id: String,
    stream: EventStream,
}

impl fmt::Debug for ProcessingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingContext")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl ProcessingContext {
    pub(super) fn new(id: String, stream: EventStream) -> Self {
        Self { id, stream }
    }

    /// Id of the `!PCS` event that opened the context.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn state(&self) -> ContextState {
        self.stream.context_state(&self.id)
    }

    /// Pop the context off the stack (`!PCP`). Allowed from started or
    /// resumed.
    pub fn pause(&self) -> bool {
        self.stream.pause_context(&self.id)
    }

    /// Push a paused context back on the stack (`!PCR`).
    pub fn resume(&self) -> bool {
        self.stream.resume_context(&self.id)
    }

    /// Close the context (`!PCE`). Allowed once.
    pub fn end(&self) -> bool {
        self.stream.end_context(&self.id)
    }

    /// Drop a superseded context without closing it in the log.
    pub(crate) fn discard(&self) {
        self.stream.discard_context(&self.id);
    }
}
