//! Progress reporting: tenths-of-a-percent counters plus a spinner baton,
//! throttled to update only when the 256-block-granularity baton index
//! actually changes.

use std::io::Write;

const SPINNER: &[u8; 4] = b"|/-\\";

pub struct Progress {
    last_logical_baton: Option<u64>,
    last_physical_baton: Option<u64>,
    spinner: usize,
}

impl Progress {
    pub fn new() -> Self {
        Self { last_logical_baton: None, last_physical_baton: None, spinner: 0 }
    }

    /// Reports progress if the logical or physical baton index has changed
    /// since the last report. `physical_pos` is the device position (used
    /// for the percentage); `physical_touched` is the cumulative count of
    /// blocks written so far (used only to drive the baton).
    #[allow(clippy::too_many_arguments)]
    pub fn maybe_report(
        &mut self,
        out: &mut dyn Write,
        logical_pos: u64,
        block_count: u64,
        physical_pos: u64,
        physical_touched: u64,
        block_range: u64,
    ) {
        let logical_baton = logical_pos >> 8;
        let physical_baton = physical_touched >> 8;

        if self.last_logical_baton == Some(logical_baton)
            && self.last_physical_baton == Some(physical_baton)
        {
            return;
        }

        self.report(out, logical_pos, block_count, physical_pos, physical_touched, block_range);
    }

    /// Unconditionally emits one final progress line.
    #[allow(clippy::too_many_arguments)]
    pub fn force_report(
        &mut self,
        out: &mut dyn Write,
        logical_pos: u64,
        block_count: u64,
        physical_pos: u64,
        physical_touched: u64,
        block_range: u64,
    ) {
        self.report(out, logical_pos, block_count, physical_pos, physical_touched, block_range);
    }

    #[allow(clippy::too_many_arguments)]
    fn report(
        &mut self,
        out: &mut dyn Write,
        logical_pos: u64,
        block_count: u64,
        physical_pos: u64,
        physical_touched: u64,
        block_range: u64,
    ) {
        let logical_permil = logical_pos.saturating_mul(1000) / block_count.max(1);
        let physical_permil = physical_pos.saturating_mul(1000) / block_range.max(1);
        let baton = SPINNER[self.spinner] as char;

        let _ = write!(
            out,
            "\r {:>3}.{}% {} -> {:>3}.{}% {}",
            logical_permil / 10,
            logical_permil % 10,
            baton,
            physical_permil / 10,
            physical_permil % 10,
            baton,
        );
        let _ = out.flush();

        self.spinner = (self.spinner + 1) % SPINNER.len();
        self.last_logical_baton = Some(logical_pos >> 8);
        self.last_physical_baton = Some(physical_touched >> 8);
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}
