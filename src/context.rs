//! # Caller Context
//!
//! Opaque tokens identifying the code location that originated a measured
//! unit of work. Only the token's string form is recorded on events.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Origin of a measured unit of work.
pub trait CallerContext: fmt::Display + Send + Sync {}

impl<T> CallerContext for T where T: fmt::Display + Send + Sync {}

/// Produces a caller context from some input, if one can be derived.
pub trait ContextProvider<I: ?Sized> {
    fn provide_caller_context(&self, input: &I) -> Option<Arc<dyn CallerContext>>;
}

/// One frame of a call chain supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerFrame {
    pub module: String,
    pub function: String,
    pub line: Option<u32>,
}

impl CallerFrame {
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            line: None,
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

/// Context derived from a [`CallerFrame`], displayed as `module.function`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameCallerContext {
    pub module: String,
    pub function: String,
}

impl fmt::Display for FrameCallerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.function)
    }
}

type FramePredicate = Box<dyn Fn(&CallerFrame) -> bool + Send + Sync>;

/// Picks the first matching frame of a call chain, innermost first.
///
/// Frame 0 is the frame that captured the chain and is always skipped. A frame
/// satisfying the exit predicate before any match aborts the search.
pub struct FrameContextProvider {
    matches: FramePredicate,
    exits: FramePredicate,
}

impl FrameContextProvider {
    pub fn new<M, E>(matches: M, exits: E) -> Self
    where
        M: Fn(&CallerFrame) -> bool + Send + Sync + 'static,
        E: Fn(&CallerFrame) -> bool + Send + Sync + 'static,
    {
        Self {
            matches: Box::new(matches),
            exits: Box::new(exits),
        }
    }

    /// Match frames whose module starts with `prefix`, never exiting early.
    pub fn module_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self::new(move |frame| frame.module.starts_with(&prefix), |_| false)
    }

    pub fn find(&self, frames: &[CallerFrame]) -> Option<FrameCallerContext> {
        for frame in frames.iter().skip(1) {
            if (self.exits)(frame) {
                return None;
            }
            if (self.matches)(frame) {
                return Some(FrameCallerContext {
                    module: frame.module.clone(),
                    function: frame.function.clone(),
                });
            }
        }
        None
    }
}

impl ContextProvider<[CallerFrame]> for FrameContextProvider {
    fn provide_caller_context(&self, frames: &[CallerFrame]) -> Option<Arc<dyn CallerContext>> {
        self.find(frames)
            .map(|context| Arc::new(context) as Arc<dyn CallerContext>)
    }
}

impl fmt::Debug for FrameContextProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameContextProvider").finish_non_exhaustive()
    }
}

/// Source location of the caller, displayed as `file:line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationContext {
    file: &'static str,
    line: u32,
}

impl LocationContext {
    #[track_caller]
    pub fn capture() -> Self {
        let location = Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
        }
    }

    pub fn file(&self) -> &'static str {
        self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn shared(self) -> Arc<dyn CallerContext> {
        Arc::new(self)
    }
}

impl fmt::Display for LocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}
