// THEORY:
// `gridcast` turns camera frames into a grid of on/off cells and streams the
// grid to a microcontroller over a serial link, sending only when something
// changed.
//
// The public entry point is `pipeline::GridPipeline`: build it from a
// `PipelineConfig`, open a `Transport`, then call `tick` once per frame. The
// building blocks (thresholding, sampling, gating, wire formats, handshake)
// live in `core_modules` and are public for tools that need one stage on its
// own, such as a device simulator decoding payloads.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use config::{ConfigHandle, GridConfig, PipelineConfig, Tuning};
pub use core_modules::activation_grid::ActivationGrid;
pub use core_modules::change_gate::RateLimit;
pub use core_modules::encoder::Encoding;
pub use core_modules::frame::frame::{BinaryFrame, Frame};
pub use core_modules::transport::{MemoryTransport, Transport};
pub use error::{ConfigError, DecodeError, FrameError, GeometryError, TransportError};
pub use pipeline::{GridPipeline, SendOutcome, TickReport};
