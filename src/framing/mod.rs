//! Peer stream framing.
//!
//! Peers speak a continuous byte stream, WebSocket clients expect discrete
//! messages. A framing function decides where the next outgoing message ends
//! within the peer's read buffer.
//!
//! # Contract
//!
//! ```text
//! fn(data, last_read, &mut frame_type, &mut state, config) -> Result<usize, FramingError>
//! ```
//!
//! | Return | Meaning |
//! |--------|---------|
//! | `Ok(n)`, `n > 0` | The first `n` bytes form one message of `frame_type` |
//! | `Ok(0)` | Incomplete, wait for more data |
//! | `Err(_)` | Unrecoverable, the connection is closed with 1011 |
//!
//! `last_read` is the number of bytes appended by the most recent read; on
//! repeated invocations over the remaining buffer it is clamped to the
//! buffer length. `frame_type` is reset to [`FrameType::Binary`] before
//! every call. `state` starts out [`FramingState::Empty`], is created lazily
//! by the function on first use and reset exactly once by
//! [`Framing::teardown`] when the connection closes.
//!
//! # Built-ins
//!
//! | Name | Module | Behavior |
//! |------|--------|----------|
//! | `binary` | `passthrough` | Whole buffer, binary |
//! | `auto` | `passthrough` | Whole buffer, text if it looks like UTF-8 |
//! | `separator` | `separator` | Up to and including a configured byte sequence |
//! | `newline` | `separator` | Up to and including a line terminator, UTF-8 detected |
//! | `fixedlength` | `length` | Fixed-size records |
//! | `dynamic32` | `length` | 32-bit length-prefixed records |
//! | `json` | `json` | One complete JSON value |

// ============================================================================
// Submodules
// ============================================================================

mod json;
mod length;
mod passthrough;
mod separator;

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::protocol::Opcode;

// ============================================================================
// Re-exports
// ============================================================================

pub use json::json;
pub use length::{Dynamic32Config, dynamic32, fixedlength, parse_c_integer};
pub use passthrough::{auto, binary, looks_like_utf8};
pub use separator::{newline, parse_escapes, separator};

// ============================================================================
// Contract Types
// ============================================================================

/// Signature shared by all framing functions.
pub type FramingFn = fn(
    data: &[u8],
    last_read: usize,
    frame_type: &mut FrameType,
    state: &mut FramingState,
    config: &str,
) -> Result<usize, FramingError>;

/// How a framed chunk is sent to the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Text frame.
    Text,
    /// Binary frame.
    #[default]
    Binary,
    /// Consume the bytes without sending anything.
    Discard,
}

impl FrameType {
    /// WebSocket opcode for this frame type, `None` for [`FrameType::Discard`].
    #[inline]
    #[must_use]
    pub const fn opcode(self) -> Option<Opcode> {
        match self {
            Self::Text => Some(Opcode::Text),
            Self::Binary => Some(Opcode::Binary),
            Self::Discard => None,
        }
    }
}

/// Per-connection framing state.
///
/// One case per stateful built-in, plus [`FramingState::Extension`] for
/// framings added through [`FramingRegistry::register`].
#[derive(Default)]
pub enum FramingState {
    /// Nothing cached yet.
    #[default]
    Empty,
    /// Parsed separator needle.
    Needle(Vec<u8>),
    /// Parsed fixed record length.
    FixedLength(usize),
    /// Parsed length-prefix layout.
    Dynamic32(Dynamic32Config),
    /// State owned by a registered extension framing.
    Extension(Box<dyn Any + Send>),
}

impl FramingState {
    /// Returns `true` if no state has been created.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Debug for FramingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Needle(needle) => f.debug_tuple("Needle").field(needle).finish(),
            Self::FixedLength(len) => f.debug_tuple("FixedLength").field(len).finish(),
            Self::Dynamic32(config) => f.debug_tuple("Dynamic32").field(config).finish(),
            Self::Extension(_) => f.write_str("Extension(..)"),
        }
    }
}

// ============================================================================
// FramingError
// ============================================================================

/// Unrecoverable error reported by a framing function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct FramingError {
    message: String,
}

impl FramingError {
    /// Creates a framing error.
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// Framing
// ============================================================================

/// A named framing function.
#[derive(Clone, Copy)]
pub struct Framing {
    name: &'static str,
    func: FramingFn,
}

impl Framing {
    /// Pairs a name with a framing function.
    #[inline]
    #[must_use]
    pub const fn new(name: &'static str, func: FramingFn) -> Self {
        Self { name, func }
    }

    /// The registered name.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Runs the framing function over `data`.
    ///
    /// # Errors
    ///
    /// Propagates the function's [`FramingError`].
    #[inline]
    pub fn frame(
        &self,
        data: &[u8],
        last_read: usize,
        frame_type: &mut FrameType,
        state: &mut FramingState,
        config: &str,
    ) -> Result<usize, FramingError> {
        (self.func)(data, last_read, frame_type, state, config)
    }

    /// Releases any state the function created.
    #[inline]
    pub fn teardown(&self, state: &mut FramingState) {
        if !state.is_empty() {
            debug!(framing = self.name, "Releasing framing state");
            *state = FramingState::Empty;
        }
    }
}

impl Default for Framing {
    fn default() -> Self {
        Self::new("auto", auto)
    }
}

impl PartialEq for Framing {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Framing {}

impl fmt::Debug for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Framing").field(&self.name).finish()
    }
}

// ============================================================================
// FramingRegistry
// ============================================================================

/// Built-in framings, registered by [`FramingRegistry::with_builtins`].
const BUILTINS: [(&str, FramingFn); 7] = [
    ("binary", binary),
    ("auto", auto),
    ("separator", separator),
    ("newline", newline),
    ("fixedlength", fixedlength),
    ("dynamic32", dynamic32),
    ("json", json),
];

/// Name of the framing used when none or an unknown one is requested.
pub const DEFAULT_FRAMING: &str = "auto";

/// Table of available framings, keyed by name.
///
/// # Example
///
/// ```ignore
/// let mut framings = FramingRegistry::with_builtins();
/// framings.register("stx", my_stx_framing);
///
/// let framing = framings.resolve(Some("newline"));
/// assert_eq!(framing.name(), "newline");
/// ```
#[derive(Debug, Clone)]
pub struct FramingRegistry {
    framings: FxHashMap<&'static str, FramingFn>,
}

impl FramingRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            framings: FxHashMap::default(),
        }
    }

    /// Creates a registry holding every built-in framing.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (name, func) in BUILTINS {
            registry.framings.insert(name, func);
        }
        registry
    }

    /// Adds a framing, replacing any existing one with the same name.
    pub fn register(&mut self, name: &'static str, func: FramingFn) {
        if self.framings.insert(name, func).is_some() {
            info!(framing = name, "Replacing registered framing");
        } else {
            debug!(framing = name, "Registered framing");
        }
    }

    /// Looks up a framing by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Framing> {
        self.framings
            .get_key_value(name)
            .map(|(&name, &func)| Framing::new(name, func))
    }

    /// Looks up a framing, falling back to `auto` for absent or unknown names.
    #[must_use]
    pub fn resolve(&self, name: Option<&str>) -> Framing {
        match name {
            Some(name) => self.get(name).unwrap_or_else(|| {
                info!(framing = name, "Unknown framing, using {DEFAULT_FRAMING}");
                self.fallback()
            }),
            None => self.fallback(),
        }
    }

    fn fallback(&self) -> Framing {
        self.get(DEFAULT_FRAMING).unwrap_or_default()
    }

    /// Number of registered framings.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.framings.len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.framings.is_empty()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.framings.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for FramingRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============================================================================
// Tests
// ============================================================================
