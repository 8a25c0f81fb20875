use crate::{
    frame::FrameError,
    macros::TimeoutError,
    transceiver::SysStatus,
};

use super::Phase;


/// An error that aborts a ranging cycle
///
/// None of these is fatal beyond the current cycle. The next call to
/// [`Tag::range`](super::Tag::range) starts a fresh cycle.
#[derive(Debug)]
pub enum Error<E> {
    /// The transceiver driver failed
    Driver(E),

    /// The Final could not be encoded
    Frame(FrameError),

    /// The transceiver refused to send the Poll
    PollRejected,

    /// The send time of the Final had already passed when the transmission
    /// was requested
    ///
    /// The Final was not sent. This happens if the code between receiving the
    /// last Response and starting the transmission took longer than the
    /// configured Response-to-Final delay.
    DelayedTransmitRejected,

    /// The cycle deadline expired
    Timeout {
        /// Where the cycle was waiting when the deadline expired
        phase: Phase,
        /// How many anchors had been heard from by then
        anchors_heard: usize,
    },
}

impl<E> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Error::Driver(error)
    }
}

impl<E> Error<E> {
    pub(super) fn from_timeout(
        error: TimeoutError<Error<E>>,
        phase: Phase,
        anchors_heard: usize,
    )
        -> Self
    {
        match error {
            TimeoutError::Timeout => Error::Timeout { phase, anchors_heard },
            TimeoutError::Other(error) => error,
        }
    }
}


/// A received frame that was dropped without affecting the cycle
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Discard {
    /// The frame's declared length doesn't fit into the receive buffer, or is
    /// too short to hold an anchor identifier. Its payload was not used.
    TruncatedFrame {
        /// Length declared by the transceiver, including checksum
        len: usize,
    },

    /// The frame is not a Response addressed to this tag
    FrameMismatch,

    /// The transceiver reported a receive timeout or error
    ReceiveFault(SysStatus),

    /// The anchor identifier is outside of `1..=N`
    AnchorIdOutOfRange(u8),

    /// The anchor has already been heard from in this cycle
    DuplicateAnchor(u8),
}

impl Discard {
    /// Whether the receiver needs to be reset after this
    pub fn requires_rx_reset(&self) -> bool {
        match self {
            Discard::TruncatedFrame { .. }
            | Discard::FrameMismatch
            | Discard::ReceiveFault(_) => true,
            Discard::AnchorIdOutOfRange(_) | Discard::DuplicateAnchor(_) => false,
        }
    }
}
