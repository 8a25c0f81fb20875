//! Tag side of a double-sided two-way ranging exchange
//!
//! A ranging cycle goes through the following phases:
//!
//! 1. The tag broadcasts a Poll and enables its receiver.
//! 2. It collects one Response from each of the `N` anchors.
//! 3. It computes when the Final will go out, based on the receive time of a
//!    Response, and schedules a delayed transmission.
//! 4. Each anchor receives the Final, which contains all the tag's time stamps,
//!    and computes its distance to the tag.
//!
//! All of that is driven by [`Tag::range`]. The tag doesn't compute any
//! distances itself.


mod collector;
mod error;
mod state;


pub use self::{
    error::*,
    state::Diagnostics,
};

use self::state::{Collected, ExchangeState};


use core::num::Wrapping;

use embedded_hal::{
    blocking::delay::DelayMs,
    timer::CountDown,
};
use serde::Serialize;

use crate::{
    block_timeout,
    configs::{ConfigError, TagConfig},
    frame::{self, MAX_FRAME_LEN, POLL_LEN},
    time::{Duration, DxTime, Instant},
    transceiver::{SysStatus, Transceiver, TxMode, TxStart},
};


/// Where a ranging cycle currently is
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// No cycle has run yet, or a new one is starting
    Init,

    /// The Poll has been handed to the transceiver
    PollSent,

    /// Waiting for the anchors' Responses
    CollectingResponses,

    /// All Responses are in, the Final is being prepared
    ComputingFinal,

    /// The Final has been scheduled for transmission
    ///
    /// Once the transmission has completed, this is the final phase of a
    /// successful cycle.
    FinalSent,

    /// The cycle ended without sending a Final
    Aborted,
}


/// Counts the tag's activity over its whole lifetime
///
/// All counters wrap around on overflow.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Counters {
    /// Poll and Final frames that have been sent
    pub tx_frames: u32,

    /// Received frames that looked like a Response to this tag
    pub rx_frames: u32,

    /// Cycles that ended with a Final being sent
    pub cycles_completed: u32,

    /// Cycles that ended early
    pub cycles_aborted: u32,
}


/// Result of a successful ranging cycle
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ranging<const N: usize> {
    /// Sequence number of the Poll
    pub poll_seq: u8,

    /// Sequence number of the Final
    pub final_seq: u8,

    /// When the Poll was sent
    pub poll_tx: Instant,

    /// When the Final was sent
    pub final_tx: Instant,

    /// The value that was programmed into the DX_TIME register
    pub dx_time: DxTime,

    /// When each anchor's Response was received, in anchor order
    pub anchor_rx: [Instant; N],

    /// Frames that were dropped during the cycle
    pub diagnostics: Diagnostics,
}

impl<const N: usize> Ranging<N> {
    /// Time from sending the Poll to receiving the anchor's Response
    ///
    /// Anchor identifiers start at 1. Returns `None` for identifiers outside
    /// of `1..=N`.
    pub fn round_trip(&self, anchor_id: u8) -> Option<Duration> {
        let rx = self.anchor_time(anchor_id)?;
        Some(rx.duration_since(self.poll_tx))
    }

    /// Time from receiving the anchor's Response to sending the Final
    ///
    /// Anchor identifiers start at 1. Returns `None` for identifiers outside
    /// of `1..=N`.
    pub fn reply_time(&self, anchor_id: u8) -> Option<Duration> {
        let rx = self.anchor_time(anchor_id)?;
        Some(self.final_tx.duration_since(rx))
    }

    fn anchor_time(&self, anchor_id: u8) -> Option<Instant> {
        let i = (anchor_id as usize).checked_sub(1)?;
        self.anchor_rx.get(i).copied()
    }
}


/// The ranging tag, for `N` anchors
///
/// Owns the transceiver and runs one ranging cycle per call to
/// [`Tag::range`]. The transceiver needs to be initialized and configured
/// before it is passed to [`Tag::new`].
pub struct Tag<D, const N: usize> {
    radio: D,
    config: TagConfig,
    seq: Wrapping<u8>,
    phase: Phase,
    counters: Counters,
    diagnostics: Diagnostics,
    rx_buf: [u8; MAX_FRAME_LEN],
    tx_buf: [u8; MAX_FRAME_LEN],
}

impl<D, const N: usize> Tag<D, N>
where
    D: Transceiver,
{
    /// Creates a new tag
    ///
    /// Returns an error, if the configuration doesn't work with `N` anchors.
    pub fn new(radio: D, config: TagConfig) -> Result<Self, ConfigError> {
        config.validate(N)?;

        Ok(Tag {
            radio,
            config,
            seq: Wrapping(0),
            phase: Phase::Init,
            counters: Counters::default(),
            diagnostics: Diagnostics::default(),
            rx_buf: [0; MAX_FRAME_LEN],
            tx_buf: [0; MAX_FRAME_LEN],
        })
    }

    /// Provides direct access to the transceiver
    pub fn radio(&self) -> &D {
        &self.radio
    }

    /// Provides mutable access to the transceiver
    ///
    /// Only use this between ranging cycles.
    pub fn radio_mut(&mut self) -> &mut D {
        &mut self.radio
    }

    /// Releases the transceiver
    pub fn free(self) -> D {
        self.radio
    }

    /// Returns the configuration
    pub fn config(&self) -> &TagConfig {
        &self.config
    }

    /// Returns the phase the last cycle is in, or ended in
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the activity counters
    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Returns the dropped frames of the last cycle
    ///
    /// This is the same as [`Ranging::diagnostics`], but is also available
    /// after a cycle has been aborted.
    pub fn last_diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Returns the sequence number the next Poll will carry
    pub fn seq(&self) -> u8 {
        self.seq.0
    }

    /// Runs a ranging cycle
    ///
    /// `timer` bounds the whole cycle. It needs to be started by the caller
    /// before this method is called. If it expires before the Final has been
    /// sent, the cycle is aborted with [`Error::Timeout`]. Pass
    /// [`Unbounded`](crate::util::Unbounded) to wait as long as it takes.
    ///
    /// Every cycle uses up one sequence number, whether it succeeds or not.
    /// The Poll carries that sequence number, the Final carries the next one.
    pub fn range<T>(&mut self, timer: &mut T)
        -> Result<Ranging<N>, Error<D::Error>>
        where T: CountDown
    {
        self.phase = Phase::Init;
        self.diagnostics = Diagnostics::default();

        let mut state = ExchangeState::new(self.seq.0);
        let result = self.exchange(&mut state, timer);

        self.seq += Wrapping(1);

        match result {
            Ok(ranging) => {
                self.counters.cycles_completed =
                    self.counters.cycles_completed.wrapping_add(1);

                info!(
                    "Ranging cycle {} complete ({} frames dropped)",
                    ranging.poll_seq,
                    ranging.diagnostics.total(),
                );
                Ok(ranging)
            }
            Err(error) => {
                self.counters.cycles_aborted =
                    self.counters.cycles_aborted.wrapping_add(1);

                warn!(
                    "Ranging cycle {} aborted in phase {} ({} of {} anchors)",
                    state.seq(),
                    self.phase,
                    state.anchors_heard(),
                    N,
                );
                self.phase = Phase::Aborted;

                // Don't let a late Response reach the next cycle. The cycle's
                // own error takes precedence over a failure here.
                if self.shut_down_receiver().is_err() {
                    warn!("Failed to idle transceiver after abort");
                }
                Err(error)
            }
        }
    }

    /// Runs a ranging cycle, then waits for the configured ranging interval
    ///
    /// The wait happens whether the cycle succeeded or not, so this can be
    /// called in a loop to range continuously.
    pub fn range_and_wait<T, W>(&mut self, timer: &mut T, delay: &mut W)
        -> Result<Ranging<N>, Error<D::Error>>
        where
            T: CountDown,
            W: DelayMs<u32>,
    {
        let result = self.range(timer);
        delay.delay_ms(self.config.ranging_interval_ms);
        result
    }

    fn exchange<T>(&mut self, state: &mut ExchangeState<N>, timer: &mut T)
        -> Result<Ranging<N>, Error<D::Error>>
        where T: CountDown
    {
        self.send_poll(state.seq())?;
        self.phase = Phase::PollSent;
        trace!("Poll sent: {}", state.seq());

        self.phase = Phase::CollectingResponses;
        let collected = self.collect_responses(state, timer)?;

        self.phase = Phase::ComputingFinal;

        // Only valid once the Poll has actually gone out, which it has, as
        // the Responses prove.
        let poll_tx = Instant::from_le_bytes(self.radio.read_tx_timestamp()?);

        let dx_time = DxTime::after(
            collected.reference,
            self.config.response_to_final_delay_uus,
        );
        let final_tx = dx_time.tx_timestamp(self.config.tx_antenna_delay());
        let final_seq = state.seq().wrapping_add(1);

        let len = frame::encode_final(
            &self.config.addressing,
            final_seq,
            poll_tx,
            final_tx,
            &collected.anchor_rx,
            &mut self.tx_buf,
        )
            .map_err(Error::Frame)?;

        self.radio.write_tx_data(&self.tx_buf[..len])?;
        self.radio.write_tx_fctrl(len, true)?;
        self.radio.set_delayed_trx_time(dx_time.value())?;

        match self.radio.start_tx(TxMode::Delayed)? {
            TxStart::Accepted => {}
            TxStart::Rejected => {
                warn!("Final rejected: send time {} already passed", dx_time.value());
                return Err(Error::DelayedTransmitRejected);
            }
        }
        self.phase = Phase::FinalSent;

        block_timeout!(&mut *timer, self.poll_tx_done())
            .map_err(|error| {
                Error::from_timeout(error, Phase::FinalSent, state.anchors_heard())
            })?;
        self.radio.clear_status(SysStatus::TXFRS)?;
        self.counters.tx_frames = self.counters.tx_frames.wrapping_add(1);

        Ok(Ranging {
            poll_seq: state.seq(),
            final_seq,
            poll_tx,
            final_tx,
            dx_time,
            anchor_rx: collected.anchor_rx,
            diagnostics: self.diagnostics,
        })
    }

    /// Sends the Poll and tells the transceiver to listen right after
    fn send_poll(&mut self, seq: u8) -> Result<(), Error<D::Error>> {
        let poll = frame::encode_poll(&self.config.addressing, seq);

        // Anything received before this Poll belongs to an earlier cycle
        self.radio.force_idle()?;
        self.radio.clear_status(
            SysStatus::TXFRS
                | SysStatus::RXFCG
                | SysStatus::ALL_RX_TO
                | SysStatus::ALL_RX_ERR
        )?;
        self.radio.write_tx_data(&poll)?;
        self.radio.write_tx_fctrl(POLL_LEN, true)?;

        match self.radio.start_tx(TxMode::Immediate { response_expected: true })? {
            TxStart::Accepted => {
                self.counters.tx_frames = self.counters.tx_frames.wrapping_add(1);
                Ok(())
            }
            TxStart::Rejected => Err(Error::PollRejected),
        }
    }

    /// Turns the receiver off and drops whatever it has received
    fn shut_down_receiver(&mut self) -> Result<(), D::Error> {
        self.radio.force_idle()?;
        self.radio.clear_status(
            SysStatus::RXFCG | SysStatus::ALL_RX_TO | SysStatus::ALL_RX_ERR
        )?;
        self.radio.rx_reset()
    }

    /// Checks whether the Final has been sent
    fn poll_tx_done(&mut self) -> nb::Result<(), Error<D::Error>> {
        let status = self.radio
            .read_status()
            .map_err(|error| nb::Error::Other(Error::Driver(error)))?;

        if status.tx_done() {
            Ok(())
        }
        else {
            Err(nb::Error::WouldBlock)
        }
    }
}
