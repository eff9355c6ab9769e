// THEORY:
// Every failure the core can report lives here. Most of them never reach the
// caller of a tick: an empty frame or a cell that clamps away simply yields
// inactive cells, and a link that is not ready just skips the send. The enums
// below cover what *is* surfaced: configuration mistakes (fatal before the
// first tick), malformed frames handed in by the capture side, transport
// failures (reported per tick, never fatal) and payloads that fail to decode.

use std::path::PathBuf;
use thiserror::Error;

/// A grid shape that cannot be laid out on a canvas.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("grid must have at least one row and one column (got {rows}x{cols})")]
    EmptyGrid { rows: usize, cols: usize },

    #[error("cell aspect ratio must be a positive finite number (got {0})")]
    InvalidAspectRatio(f32),

    #[error("a {width}x{height} canvas leaves no room for a {rows}x{cols} grid")]
    CanvasTooSmall {
        width: u32,
        height: u32,
        rows: usize,
        cols: usize,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("unsupported pixel layout with {0} channels (expected 1, 3 or 4)")]
    UnsupportedChannels(usize),

    #[error("frame buffer holds {actual} bytes, {expected} needed")]
    Truncated { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("write could not complete without blocking")]
    WouldBlock,

    #[error("transport rejected the payload: {0}")]
    Rejected(String),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Returned when a wire payload does not describe a grid of the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("dense payload does not start with the 0xFF marker")]
    MissingMarker,

    #[error("payload carries {actual} cells, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("byte {value:#04x} at cell {index} is neither 0 nor 8")]
    InvalidCellByte { index: usize, value: u8 },

    #[error("index list is not terminated by a newline")]
    MissingTerminator,

    #[error("index list is not a valid array: {0}")]
    MalformedIndexList(String),

    #[error("cell index {index} is outside a grid of {cells} cells")]
    IndexOutOfRange { index: usize, cells: usize },
}
