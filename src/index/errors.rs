use std::fmt;

/// Index-level failures. Duplicate keys and missing keys are *not* errors:
/// `insert` reports a duplicate through its boolean result and lookups
/// return `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The buffer pool could not supply a frame: every frame is pinned.
    BufferPoolExhausted,
    /// A page image failed to decode as a tree node.
    CorruptedPage,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BufferPoolExhausted => write!(f, "all buffer pool frames are pinned"),
            Error::CorruptedPage => write!(f, "page is not a valid tree node"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(_: std::io::Error) -> Self {
        // Cursor I/O over a fixed page buffer only fails on truncation.
        Error::CorruptedPage
    }
}
