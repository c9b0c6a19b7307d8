//! Sliding-window sequence loss detection.
//!
//! [`SequenceLossTracker`] keeps one bit per slot for the `window_size` most
//! recent sequence numbers, indexed by `seq % window_size`. When the highest
//! sequence number seen moves forward, every slot the advance overwrites is
//! finalized: if its bit was never set, the sequence number it stood for is
//! counted as lost. Late arrivals that land before their slot is overwritten
//! simply set the bit; arrivals older than the window are ignored.
//!
//! Memory is fixed at `MAX_WINDOW_SIZE` bits and an update costs at most
//! `window_size` bit operations, however far the sequence jumps.

use log::{debug, trace};

use crate::config::{WindowSize, MAX_WINDOW_SIZE};
use crate::error::ConfigError;

const BITMAP_BYTES: usize = MAX_WINDOW_SIZE as usize / 8;

#[derive(Debug, Clone)]
pub struct SequenceLossTracker {
    window: WindowSize,
    bitmap: [u8; BITMAP_BYTES],
    /// Highest sequence number observed, `None` until the first one arrives.
    highest: Option<u32>,
    lost: u32,
}

impl Default for SequenceLossTracker {
    fn default() -> Self {
        Self::new(WindowSize::default())
    }
}

impl SequenceLossTracker {
    pub fn new(window: WindowSize) -> Self {
        Self {
            window,
            bitmap: [0; BITMAP_BYTES],
            highest: None,
            lost: 0,
        }
    }

    /// Records that `seq` was observed. Accepts duplicates, reordering and
    /// arbitrary jumps; the lost count can only grow.
    pub fn notify_received(&mut self, seq: u32) {
        let Some(highest) = self.highest else {
            // Nothing before the first observed sequence number is known, so
            // the slots it would have occupied count as accounted for.
            self.bitmap = [0xFF; BITMAP_BYTES];
            self.highest = Some(seq);
            return;
        };

        let window = u32::from(self.window.get());

        if seq > highest {
            let advance = seq - highest;
            let scanned = advance.min(window);
            let mut newly_lost = 0u32;

            for step in 1..=scanned {
                // The slot of `highest + step` still holds `highest + step - window`.
                let vacated = highest + step;
                if !self.bit(vacated) {
                    newly_lost += 1;
                }
                self.set_bit(vacated, false);
            }
            // Jumps past a full window skip sequence numbers that never got a slot.
            newly_lost += advance - scanned;

            self.set_bit(seq, true);
            self.highest = Some(seq);

            if newly_lost > 0 {
                self.lost = self.lost.saturating_add(newly_lost);
                debug!(
                    "advance {} -> {} finalized {} lost (total {})",
                    highest, seq, newly_lost, self.lost
                );
            }
        } else if highest - seq < window {
            self.set_bit(seq, true);
        } else {
            trace!("seq {} is older than the window ending at {}", seq, highest);
        }
    }

    pub fn lost(&self) -> u32 {
        self.lost
    }

    pub fn highest_seen(&self) -> Option<u32> {
        self.highest
    }

    pub fn window_size(&self) -> WindowSize {
        self.window
    }

    /// Changes the window. Any ingested state is dropped rather than
    /// reconciled with the new bitmap size; the lost count is kept.
    pub fn set_window_size(&mut self, size: u16) -> Result<(), ConfigError> {
        let window = WindowSize::try_from(size)?;
        if self.highest.is_some() {
            debug!("window resized {} -> {}, resetting tracker", self.window, window);
        }
        self.window = window;
        self.bitmap = [0; BITMAP_BYTES];
        self.highest = None;
        Ok(())
    }

    fn slot(&self, seq: u32) -> usize {
        (seq % u32::from(self.window.get())) as usize
    }

    fn bit(&self, seq: u32) -> bool {
        let slot = self.slot(seq);
        (self.bitmap[slot / 8] >> (7 - slot % 8)) & 0x01 == 1
    }

    fn set_bit(&mut self, seq: u32, value: bool) {
        let slot = self.slot(seq);
        let mask = 0x80u8 >> (slot % 8);
        if value {
            self.bitmap[slot / 8] |= mask;
        } else {
            self.bitmap[slot / 8] &= !mask;
        }
    }
}
