use embedded_hal::timer::CountDown;

use crate::{
    block_timeout,
    frame::{self, COMMON_LEN, SEQ_IDX},
    time::Instant,
    transceiver::{SysStatus, Transceiver},
};

use super::{Collected, Discard, Error, ExchangeState, Phase, Tag};


/// What the transceiver reported while waiting for a Response
#[derive(Clone, Copy, Debug)]
enum RxEvent {
    /// A frame with a good checksum is in the RX buffer
    Frame,
    /// The receiver timed out or hit an error
    Fault(SysStatus),
}

/// What became of a received frame
#[derive(Clone, Copy, Debug)]
enum Reception {
    Stored(u8),
    Discarded(Discard),
}


impl<D, const N: usize> Tag<D, N>
where
    D: Transceiver,
{
    /// Collects Responses until every anchor has been heard from
    ///
    /// Expects the receiver to be enabled already, which the Poll's
    /// "response expected" mode takes care of. Frames that can't be used are
    /// dropped and counted, and waiting resumes. Only the timer or a driver
    /// error ends the loop early.
    pub(super) fn collect_responses<T>(
        &mut self,
        state: &mut ExchangeState<N>,
        timer: &mut T,
    )
        -> Result<Collected<N>, Error<D::Error>>
        where T: CountDown
    {
        let template = self.config.addressing.response_template();

        loop {
            if let Some(collected) = state.collected(self.config.delay_reference) {
                return Ok(collected);
            }

            let event = block_timeout!(&mut *timer, self.poll_rx_event())
                .map_err(|error| {
                    Error::from_timeout(
                        error,
                        Phase::CollectingResponses,
                        state.anchors_heard(),
                    )
                })?;

            let reception = match event {
                RxEvent::Frame => self.receive_response(state, &template)?,
                RxEvent::Fault(status) => Reception::Discarded(Discard::ReceiveFault(status)),
            };

            match reception {
                Reception::Stored(anchor_id) => {
                    debug!("Received anchor {}", anchor_id);

                    // Only listen if another Response is expected. An enabled
                    // receiver holds back the transmission of the Final.
                    if !state.is_complete() {
                        self.radio.rx_enable()?;
                    }
                }
                Reception::Discarded(discard) => {
                    match discard {
                        Discard::AnchorIdOutOfRange(anchor_id) => {
                            warn!("Anchor id out of range: {}", anchor_id);
                        }
                        _ => {
                            debug!("Dropped frame: {}", discard);
                        }
                    }
                    self.diagnostics.record(discard);

                    if discard.requires_rx_reset() {
                        self.radio.clear_status(SysStatus::ALL_RX_TO | SysStatus::ALL_RX_ERR)?;
                        self.radio.rx_reset()?;
                    }

                    // The collection isn't complete, or we wouldn't be here.
                    self.radio.rx_enable()?;
                }
            }
        }
    }

    /// Checks whether the receive operation has finished
    fn poll_rx_event(&mut self) -> nb::Result<RxEvent, Error<D::Error>> {
        let status = self.radio
            .read_status()
            .map_err(|error| nb::Error::Other(Error::Driver(error)))?;

        if status.rx_good() {
            return Ok(RxEvent::Frame);
        }
        if status.rx_failed() {
            return Ok(RxEvent::Fault(status));
        }

        Err(nb::Error::WouldBlock)
    }

    /// Reads the received frame and stores its time stamp, if it's a valid
    /// Response
    fn receive_response(
        &mut self,
        state: &mut ExchangeState<N>,
        template: &[u8; COMMON_LEN],
    )
        -> Result<Reception, Error<D::Error>>
    {
        // TXFRS is still set from the Poll
        self.radio.clear_status(SysStatus::RXFCG | SysStatus::TXFRS)?;

        let len = self.radio.rx_frame_len()?;
        if len > self.config.rx_buffer_len {
            return Ok(Reception::Discarded(Discard::TruncatedFrame { len }));
        }

        let buf = &mut self.rx_buf[..len];
        self.radio.read_rx_data(buf)?;

        // The sequence number is not relevant for validation
        if len > SEQ_IDX {
            buf[SEQ_IDX] = 0;
        }
        if !frame::matches(buf, template) {
            return Ok(Reception::Discarded(Discard::FrameMismatch));
        }

        // The prefix alone doesn't make a Response
        let anchor_id = match frame::extract_anchor_id(buf) {
            Ok(anchor_id) => anchor_id,
            Err(_) => return Ok(Reception::Discarded(Discard::TruncatedFrame { len })),
        };

        self.counters.rx_frames = self.counters.rx_frames.wrapping_add(1);
        let rx_time = Instant::from_le_bytes(self.radio.read_rx_timestamp()?);

        match state.store(anchor_id, rx_time) {
            Ok(()) => Ok(Reception::Stored(anchor_id)),
            Err(discard) => Ok(Reception::Discarded(discard)),
        }
    }
}
