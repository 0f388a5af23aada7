//! Output timestamp generation for recorded frames.
//!
//! Output timestamps follow the input deltas so playback keeps the
//! original pacing, but they never go backwards and never stall. A
//! pause collapses: the first frame after [`Retimer::resync`] advances
//! by the last observed delta instead of the wall-clock gap.

/// Per-stream timestamp state.
#[derive(Clone, Debug, Default)]
pub struct Retimer {
    last_in: Option<u64>,
    last_out: u64,
    last_delta: u64,
    resync: bool,
}

impl Retimer {
    /// A retimer that has seen no frames.
    pub fn new() -> Self {
        Self::default()
    }

    /// Output timestamp for a frame with input timestamp `input`.
    ///
    /// Does not change state; call [`advance`](Self::advance) once the
    /// frame is durably written.
    pub fn next(&self, input: u64) -> u64 {
        let Some(last_in) = self.last_in else {
            return input;
        };
        if self.resync {
            self.last_out.saturating_add(self.last_delta.max(1))
        } else if input > last_in {
            self.last_out.saturating_add(input - last_in)
        } else {
            self.last_out.saturating_add(1)
        }
    }

    /// Commit a frame: `input` was written as `output`.
    pub fn advance(&mut self, input: u64, output: u64) {
        if self.last_in.is_some() && !self.resync {
            self.last_delta = output.saturating_sub(self.last_out);
        }
        self.last_in = Some(input);
        self.last_out = output;
        self.resync = false;
    }

    /// Collapse the gap before the next frame.
    pub fn resync(&mut self) {
        if self.last_in.is_some() {
            self.resync = true;
        }
    }

    /// Last output timestamp, or 0 before the first frame.
    pub fn last_output(&self) -> u64 {
        self.last_out
    }
}
