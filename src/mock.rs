//! Scripted transceiver and timers for tests


use std::collections::VecDeque;

use embedded_hal::{blocking::delay::DelayMs, timer::CountDown};

use crate::{
    frame::{Addressing, RangingFrame, Response, RESPONSE_LEN},
    time::Instant,
    transceiver::{SysStatus, Transceiver, TxMode, TxStart},
};


/// Something the receiver will report, once it is enabled
#[derive(Clone, Debug)]
pub enum Incoming {
    Frame {
        bytes: Vec<u8>,
        declared_len: usize,
        rx_time: Instant,
    },
    Timeout,
    Error,
}

impl Incoming {
    /// A valid Response from the given anchor
    pub fn response(anchor_id: u8, seq: u8, rx_time: u64) -> Self {
        let bytes = response_bytes(&Addressing::default(), anchor_id, seq);
        Incoming::frame(bytes, rx_time)
    }

    pub fn frame(bytes: Vec<u8>, rx_time: u64) -> Self {
        Incoming::Frame {
            declared_len: bytes.len(),
            bytes,
            rx_time: instant(rx_time),
        }
    }
}

pub fn response_bytes(addressing: &Addressing, anchor_id: u8, seq: u8) -> Vec<u8> {
    let mut buf = [0; RESPONSE_LEN];
    let len = RangingFrame::<1>::Response(Response {
        header: addressing.response(seq),
        anchor_id,
        activity_parameter: 0,
    })
    .encode(&mut buf)
    .unwrap();

    buf[..len].to_vec()
}

pub fn instant(value: u64) -> Instant {
    Instant::new(value).unwrap()
}


/// A frame handed to the transmitter
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sent {
    pub bytes: Vec<u8>,
    pub fctrl: (usize, bool),
    pub mode: TxMode,
    pub dx_time: Option<u32>,
    pub rx_enabled: bool,
}


#[derive(Debug, Eq, PartialEq)]
pub struct MockError;


#[derive(Debug, Default)]
pub struct MockRadio {
    pub incoming: VecDeque<Incoming>,
    pub status: SysStatus,
    pub rx_enabled: bool,

    pub sent: Vec<Sent>,
    pub rejected: Vec<Sent>,
    pub reject_immediate: bool,
    pub reject_delayed: bool,
    pub poll_tx_time: u64,

    pub rx_enables: usize,
    pub rx_resets: usize,
    pub idles: usize,
    pub rx_data_reads: usize,
    pub status_reads: usize,

    /// Fail every register access once this many status reads have happened
    pub fail_after_status_reads: Option<usize>,

    tx_data: Vec<u8>,
    tx_fctrl: (usize, bool),
    dx_time: Option<u32>,
    received: Option<(Vec<u8>, usize, Instant)>,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_incoming<I>(incoming: I) -> Self
        where I: IntoIterator<Item=Incoming>
    {
        let mut radio = Self::new();
        radio.incoming.extend(incoming);
        radio
    }

    pub fn finals(&self) -> Vec<&Sent> {
        self.sent.iter().filter(|sent| sent.mode == TxMode::Delayed).collect()
    }

    /// Puts a received frame or event into the status register right away,
    /// whether the receiver is enabled or not
    pub fn land(&mut self, incoming: Incoming) {
        self.rx_enabled = false;
        self.apply(incoming);
    }

    fn apply(&mut self, incoming: Incoming) {
        match incoming {
            Incoming::Frame { bytes, declared_len, rx_time } => {
                self.received = Some((bytes, declared_len, rx_time));
                self.status |= SysStatus::RXFCG;
            }
            Incoming::Timeout => {
                self.status |= SysStatus::RXRFTO;
            }
            Incoming::Error => {
                self.status |= SysStatus::RXFCE;
            }
        }
    }

    fn check(&self) -> Result<(), MockError> {
        match self.fail_after_status_reads {
            Some(limit) if self.status_reads > limit => Err(MockError),
            _ => Ok(()),
        }
    }

    fn transmission(&self, mode: TxMode) -> Sent {
        let len = self.tx_fctrl.0.min(self.tx_data.len());
        Sent {
            bytes: self.tx_data[..len].to_vec(),
            fctrl: self.tx_fctrl,
            mode,
            dx_time: match mode {
                TxMode::Delayed => self.dx_time,
                TxMode::Immediate { .. } => None,
            },
            rx_enabled: self.rx_enabled,
        }
    }
}

impl Transceiver for MockRadio {
    type Error = MockError;

    fn read_status(&mut self) -> Result<SysStatus, MockError> {
        self.status_reads += 1;
        self.check()?;

        let pending = self.status.any(SysStatus::RXFCG)
            || self.status.rx_failed();

        if self.rx_enabled && !pending {
            if let Some(incoming) = self.incoming.pop_front() {
                self.rx_enabled = false;
                self.apply(incoming);
            }
        }

        Ok(self.status)
    }

    fn clear_status(&mut self, flags: SysStatus) -> Result<(), MockError> {
        self.check()?;
        self.status.0 &= !flags.0;
        Ok(())
    }

    fn write_tx_data(&mut self, data: &[u8]) -> Result<(), MockError> {
        self.check()?;
        self.tx_data = data.to_vec();
        Ok(())
    }

    fn write_tx_fctrl(&mut self, len: usize, ranging: bool) -> Result<(), MockError> {
        self.check()?;
        self.tx_fctrl = (len, ranging);
        Ok(())
    }

    fn set_delayed_trx_time(&mut self, dx_time: u32) -> Result<(), MockError> {
        self.check()?;
        self.dx_time = Some(dx_time);
        Ok(())
    }

    fn start_tx(&mut self, mode: TxMode) -> Result<TxStart, MockError> {
        self.check()?;

        let transmission = self.transmission(mode);
        let rejected = match mode {
            TxMode::Immediate { .. } => self.reject_immediate,
            TxMode::Delayed => self.reject_delayed,
        };
        if rejected {
            self.rejected.push(transmission);
            return Ok(TxStart::Rejected);
        }

        self.sent.push(transmission);
        self.status |= SysStatus::TXFRS;
        if let TxMode::Immediate { response_expected: true } = mode {
            self.rx_enabled = true;
        }

        Ok(TxStart::Accepted)
    }

    fn force_idle(&mut self) -> Result<(), MockError> {
        self.check()?;
        self.idles += 1;
        self.rx_enabled = false;
        Ok(())
    }

    fn rx_enable(&mut self) -> Result<(), MockError> {
        self.check()?;
        self.rx_enables += 1;
        self.rx_enabled = true;
        Ok(())
    }

    fn rx_reset(&mut self) -> Result<(), MockError> {
        self.check()?;
        self.rx_resets += 1;
        Ok(())
    }

    fn rx_frame_len(&mut self) -> Result<usize, MockError> {
        self.check()?;
        Ok(self.received.as_ref().map(|(_, len, _)| *len).unwrap_or(0))
    }

    fn read_rx_data(&mut self, buf: &mut [u8]) -> Result<(), MockError> {
        self.check()?;
        self.rx_data_reads += 1;

        if let Some((bytes, _, _)) = &self.received {
            let len = buf.len().min(bytes.len());
            buf[..len].copy_from_slice(&bytes[..len]);
        }
        Ok(())
    }

    fn read_tx_timestamp(&mut self) -> Result<[u8; 5], MockError> {
        self.check()?;
        Ok(le_bytes(self.poll_tx_time))
    }

    fn read_rx_timestamp(&mut self) -> Result<[u8; 5], MockError> {
        self.check()?;
        let rx_time = self.received
            .as_ref()
            .map(|(_, _, rx_time)| rx_time.value())
            .unwrap_or(0);
        Ok(le_bytes(rx_time))
    }
}

fn le_bytes(value: u64) -> [u8; 5] {
    let mut raw = [0; 5];
    raw.copy_from_slice(&value.to_le_bytes()[..5]);
    raw
}


/// Expires after the given number of polls
#[derive(Debug)]
pub struct PollBudget(pub usize);

impl CountDown for PollBudget {
    type Time = usize;

    fn start<T>(&mut self, count: T)
        where T: Into<Self::Time>
    {
        self.0 = count.into();
    }

    fn wait(&mut self) -> nb::Result<(), void::Void> {
        if self.0 == 0 {
            return Ok(());
        }
        self.0 -= 1;
        Err(nb::Error::WouldBlock)
    }
}


/// Records requested delays instead of waiting
#[derive(Debug, Default)]
pub struct MockDelay {
    pub delays_ms: Vec<u32>,
}

impl DelayMs<u32> for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.delays_ms.push(ms);
    }
}
