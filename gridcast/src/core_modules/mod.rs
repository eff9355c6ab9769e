pub mod activation_grid;
pub mod binarizer;
pub mod change_gate;
pub mod encoder;
pub mod frame;
pub mod geometry;
pub mod handshake;
pub mod sampler;
pub mod transport;

#[cfg(test)]
mod properties;
