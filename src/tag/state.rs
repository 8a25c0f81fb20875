use serde::Serialize;

use crate::{configs::DelayReference, time::Instant};

use super::Discard;


/// State of a single ranging cycle
///
/// A new `ExchangeState` is created at the start of every cycle and dropped at
/// its end, whether the cycle succeeded or not. Every anchor slot can only be
/// written once.
#[derive(Debug)]
pub struct ExchangeState<const N: usize> {
    seq: u8,
    anchors_heard: usize,
    anchor_rx: [Option<Instant>; N],
    most_recent: Option<usize>,
}

impl<const N: usize> ExchangeState<N> {
    /// Creates the state for a cycle whose Poll carries `seq`
    pub fn new(seq: u8) -> Self {
        ExchangeState {
            seq,
            anchors_heard: 0,
            anchor_rx: [None; N],
            most_recent: None,
        }
    }

    /// Sequence number of this cycle's Poll
    pub fn seq(&self) -> u8 {
        self.seq
    }

    /// Number of anchors heard from so far
    pub fn anchors_heard(&self) -> usize {
        self.anchors_heard
    }

    /// Whether all anchors have been heard from
    pub fn is_complete(&self) -> bool {
        self.anchors_heard == N
    }

    /// Stores the receive time of an anchor's Response
    pub fn store(&mut self, anchor_id: u8, rx_time: Instant) -> Result<(), Discard> {
        let i = slot(anchor_id, N).ok_or(Discard::AnchorIdOutOfRange(anchor_id))?;

        if self.anchor_rx[i].is_some() {
            return Err(Discard::DuplicateAnchor(anchor_id));
        }

        self.anchor_rx[i] = Some(rx_time);
        self.anchors_heard += 1;
        self.most_recent = Some(i);

        Ok(())
    }

    /// Returns all receive times, once every anchor has been heard from
    pub fn collected(&self, reference: DelayReference) -> Option<Collected<N>> {
        if !self.is_complete() {
            return None;
        }

        let mut anchor_rx = [Instant::default(); N];
        for (rx, stored) in anchor_rx.iter_mut().zip(self.anchor_rx.iter()) {
            *rx = (*stored)?;
        }

        let reference = match reference {
            DelayReference::MostRecent => anchor_rx[self.most_recent?],
            DelayReference::HighestAnchor => *anchor_rx.last()?,
        };

        Some(Collected { anchor_rx, reference })
    }
}

/// The receive times of a complete set of Responses
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Collected<const N: usize> {
    /// Receive times in anchor order
    pub anchor_rx: [Instant; N],

    /// The receive time the Final's send time is based on
    pub reference: Instant,
}


/// Counts the frames that were dropped during a cycle, by reason
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    /// See [`Discard::TruncatedFrame`]
    pub truncated_frames: u32,
    /// See [`Discard::FrameMismatch`]
    pub mismatched_frames: u32,
    /// See [`Discard::ReceiveFault`]
    pub receive_faults: u32,
    /// See [`Discard::AnchorIdOutOfRange`]
    pub anchor_id_out_of_range: u32,
    /// See [`Discard::DuplicateAnchor`]
    pub duplicate_anchors: u32,
}

impl Diagnostics {
    /// Counts a dropped frame
    pub fn record(&mut self, discard: Discard) {
        let counter = match discard {
            Discard::TruncatedFrame { .. } => &mut self.truncated_frames,
            Discard::FrameMismatch => &mut self.mismatched_frames,
            Discard::ReceiveFault(_) => &mut self.receive_faults,
            Discard::AnchorIdOutOfRange(_) => &mut self.anchor_id_out_of_range,
            Discard::DuplicateAnchor(_) => &mut self.duplicate_anchors,
        };
        *counter = counter.wrapping_add(1);
    }

    /// Total number of dropped frames
    pub fn total(&self) -> u32 {
        self.truncated_frames
            .wrapping_add(self.mismatched_frames)
            .wrapping_add(self.receive_faults)
            .wrapping_add(self.anchor_id_out_of_range)
            .wrapping_add(self.duplicate_anchors)
    }
}


// Maps a 1-based anchor identifier to its slot
fn slot(anchor_id: u8, anchors: usize) -> Option<usize> {
    let id = anchor_id as usize;
    if id >= 1 && id <= anchors {
        Some(id - 1)
    }
    else {
        None
    }
}
