// THEORY:
// The `pipeline` module is the top-level API of the engine. One call to `tick`
// runs one full pass for one camera frame:
//
//   apply pending tuning -> binarize -> sample cells -> gate -> maybe write
//   -> read one handshake line
//
// Nothing in a tick waits. A frame that cannot be sampled yields an all-off
// grid, a link that is closed or not yet READY skips the send, and a failed
// write is reported in the `TickReport` while leaving the last-sent baseline
// alone so the next eligible frame retries.
//
// The pipeline owns all state that survives between ticks: the cached layout,
// the change gate, the handshake flag and the current grid. It is driven from
// a single thread and takes the transport by `&mut` per call, so the caller
// stays in charge of the link.

use crate::config::{ConfigHandle, PipelineConfig, Tuning};
use crate::core_modules::activation_grid::ActivationGrid;
use crate::core_modules::binarizer::binarize;
use crate::core_modules::change_gate::{ChangeGate, GateDecision};
use crate::core_modules::encoder::Encoding;
use crate::core_modules::frame::frame::Frame;
use crate::core_modules::geometry::GridLayout;
use crate::core_modules::handshake::HandshakeReader;
use crate::core_modules::sampler::sample_grid;
use crate::core_modules::transport::Transport;
use crate::error::{ConfigError, TransportError};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What happened to the send attempt of one tick.
#[derive(Debug)]
pub enum SendOutcome {
    /// The link is closed or the device has not said READY.
    NotReady,
    /// Outside the rate-limit window.
    Throttled,
    /// Eligible, but the device already shows this grid.
    Unchanged,
    Sent { bytes: usize },
    /// The write failed. The same grid is retried on the next eligible tick.
    WriteFailed(TransportError),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }
}

/// The result of one tick.
#[derive(Debug)]
pub struct TickReport {
    /// Zero-based ordinal of the frame this report belongs to.
    pub frame_index: u64,
    pub active_cells: usize,
    pub outcome: SendOutcome,
    /// Set on the one tick where the handshake completed.
    pub became_ready: bool,
}

pub struct GridPipeline {
    config: PipelineConfig,
    tuning: Tuning,
    tuning_rx: watch::Receiver<Tuning>,
    layout: Option<GridLayout>,
    /// Canvas size the grid last failed to fit, so the warning is logged once.
    rejected_canvas: Option<(u32, u32)>,
    gate: ChangeGate,
    handshake: HandshakeReader,
    grid: ActivationGrid,
    frames_processed: u64,
}

impl GridPipeline {
    /// Validates `config` and builds a pipeline together with the handle used
    /// to retune it while running.
    pub fn new(config: PipelineConfig) -> Result<(Self, ConfigHandle), ConfigError> {
        config.validate()?;
        let (handle, tuning_rx) = ConfigHandle::new(config.tuning.clone());
        let pipeline = Self {
            tuning: config.tuning.clone(),
            tuning_rx,
            layout: None,
            rejected_canvas: None,
            gate: ChangeGate::new(config.rate_limit),
            handshake: HandshakeReader::new(),
            grid: ActivationGrid::new(config.grid.rows, config.grid.cols),
            frames_processed: 0,
            config,
        };
        Ok((pipeline, handle))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The tuning snapshot used by the most recent tick.
    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn encoding(&self) -> Encoding {
        self.config.encoding
    }

    pub fn is_ready(&self) -> bool {
        self.handshake.is_ready()
    }

    /// The grid produced by the most recent tick.
    pub fn grid(&self) -> &ActivationGrid {
        &self.grid
    }

    pub fn last_sent(&self) -> Option<&ActivationGrid> {
        self.gate.last_sent()
    }

    pub fn layout(&self) -> Option<&GridLayout> {
        self.layout.as_ref()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Opens `transport` at the configured baud rate.
    pub fn connect<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<(), TransportError> {
        if transport.is_connected() {
            return Ok(());
        }
        transport.open(self.config.baud_rate)?;
        info!(baud_rate = self.config.baud_rate, "serial link opened");
        Ok(())
    }

    /// Closes `transport` and drops all link state: readiness, the rate-limit
    /// clock and the last-sent baseline.
    pub fn teardown<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        transport.close();
        self.handshake.reset();
        self.gate.reset();
        info!("serial link closed, waiting for READY after reconnect");
    }

    /// Runs one full pass for `frame`.
    pub fn tick<T: Transport + ?Sized>(
        &mut self,
        frame: &Frame<'_>,
        transport: &mut T,
        now: Instant,
    ) -> TickReport {
        let frame_index = self.frames_processed;
        self.frames_processed += 1;

        self.apply_pending_tuning();
        self.grid = self.process_frame(frame);
        let outcome = self.maybe_send(transport, now);
        let became_ready = self.handshake.poll(transport);

        TickReport {
            frame_index,
            active_cells: self.grid.active_count(),
            outcome,
            became_ready,
        }
    }

    /// Binarizes and samples `frame` into a fresh grid. Does not touch the link.
    pub fn process_frame(&mut self, frame: &Frame<'_>) -> ActivationGrid {
        let rows = self.config.grid.rows;
        let cols = self.config.grid.cols;
        if frame.is_empty() {
            return ActivationGrid::new(rows, cols);
        }

        self.refresh_layout(frame.width(), frame.height());
        let Some(layout) = self.layout.as_ref() else {
            return ActivationGrid::new(rows, cols);
        };

        let binary = binarize(frame, self.tuning.binarize_threshold);
        sample_grid(&binary, layout, &self.tuning)
    }

    /// Recomputes the cached layout when the canvas size changed.
    fn refresh_layout(&mut self, width: u32, height: u32) {
        if self
            .layout
            .as_ref()
            .is_some_and(|layout| layout.fits_canvas(width, height))
            || self.rejected_canvas == Some((width, height))
        {
            return;
        }
        match GridLayout::compute(width, height, &self.config.grid) {
            Ok(layout) => {
                debug!(width, height, "grid layout computed");
                self.layout = Some(layout);
                self.rejected_canvas = None;
            }
            Err(err) => {
                warn!(width, height, %err, "frame cannot hold the grid, all cells stay off");
                self.layout = None;
                self.rejected_canvas = Some((width, height));
            }
        }
    }

    fn apply_pending_tuning(&mut self) {
        // The channel keeps its last value after the handle is dropped.
        let latest = self.tuning_rx.borrow_and_update();
        if latest.has_changed() {
            self.tuning = latest.clone();
            debug!(tuning = ?self.tuning, "tuning updated");
        }
    }

    fn maybe_send<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        now: Instant,
    ) -> SendOutcome {
        if !self.handshake.is_ready() || !transport.is_connected() {
            return SendOutcome::NotReady;
        }

        match self.gate.evaluate(&self.grid, now) {
            GateDecision::Throttled => SendOutcome::Throttled,
            GateDecision::Unchanged => SendOutcome::Unchanged,
            GateDecision::Send => {
                let payload = self.config.encoding.encode(&self.grid);
                match transport.write(&payload) {
                    Ok(()) => {
                        self.gate.record_sent(&self.grid);
                        debug!(
                            bytes = payload.len(),
                            active = self.grid.active_count(),
                            "grid sent"
                        );
                        SendOutcome::Sent {
                            bytes: payload.len(),
                        }
                    }
                    Err(err) => {
                        warn!(%err, "grid write failed, will retry on the next eligible frame");
                        SendOutcome::WriteFailed(err)
                    }
                }
            }
        }
    }
}
