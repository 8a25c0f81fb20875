//! Interface to the UWB transceiver
//!
//! The ranging engine doesn't talk to registers itself. Everything it needs
//! from the radio goes through the [`Transceiver`] trait, which mirrors the
//! register-level operations of the DW1000: status flags, TX/RX buffers,
//! delayed transmission and the time stamp registers.
//!
//! A `Transceiver` is exclusively borrowed by the ranging engine for the whole
//! duration of a ranging cycle.

use core::ops::{BitOr, BitOrAssign};


/// Operations the ranging engine needs from the transceiver driver
pub trait Transceiver {
    /// Error returned by the driver, typically an SPI error
    type Error;

    /// Reads the low 32 bits of the SYS_STATUS register
    fn read_status(&mut self) -> Result<SysStatus, Self::Error>;

    /// Clears the given status flags
    ///
    /// Flags are cleared by writing a 1 to them, so flags that are not set in
    /// `flags` are left untouched.
    fn clear_status(&mut self, flags: SysStatus) -> Result<(), Self::Error>;

    /// Writes a frame into the TX buffer
    ///
    /// `data` has the full frame length, including the two checksum bytes,
    /// which the transceiver overwrites.
    fn write_tx_data(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Writes the TX frame control register
    ///
    /// `len` includes the checksum. `ranging` sets the ranging bit in the PHY
    /// header.
    fn write_tx_fctrl(&mut self, len: usize, ranging: bool) -> Result<(), Self::Error>;

    /// Programs the DX_TIME register for a delayed transmission
    fn set_delayed_trx_time(&mut self, dx_time: u32) -> Result<(), Self::Error>;

    /// Starts a transmission
    ///
    /// Returns [`TxStart::Rejected`], if a delayed transmission was requested
    /// for a time that has already passed. The frame is not sent in that case.
    fn start_tx(&mut self, mode: TxMode) -> Result<TxStart, Self::Error>;

    /// Turns off the transmitter and receiver
    ///
    /// Cancels any pending reception or delayed transmission. Returns once
    /// the transceiver is idle.
    fn force_idle(&mut self) -> Result<(), Self::Error>;

    /// Enables the receiver immediately
    fn rx_enable(&mut self) -> Result<(), Self::Error>;

    /// Resets the receiver
    ///
    /// Required after a receive error, to reinitialize the leading edge
    /// detection.
    fn rx_reset(&mut self) -> Result<(), Self::Error>;

    /// Reads the length of the received frame, including checksum
    fn rx_frame_len(&mut self) -> Result<usize, Self::Error>;

    /// Reads the received frame from the start of the RX buffer
    ///
    /// Reads `buf.len()` bytes. The caller makes sure this doesn't exceed the
    /// received frame length.
    fn read_rx_data(&mut self, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Reads the TX time stamp of the last transmitted frame
    ///
    /// 40 bits, least significant byte first.
    fn read_tx_timestamp(&mut self) -> Result<[u8; 5], Self::Error>;

    /// Reads the RX time stamp of the last received frame
    ///
    /// 40 bits, least significant byte first.
    fn read_rx_timestamp(&mut self) -> Result<[u8; 5], Self::Error>;
}


/// How a transmission is started
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxMode {
    /// Start right away
    Immediate {
        /// Enable the receiver as soon as the frame has been sent
        response_expected: bool,
    },

    /// Start at the time programmed with
    /// [`Transceiver::set_delayed_trx_time`]
    Delayed,
}

/// Whether the transceiver accepted a transmission request
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxStart {
    /// The transmission has started, or will start at the programmed time
    Accepted,

    /// The programmed time had already passed when the transmission was
    /// requested
    Rejected,
}


/// Low 32 bits of the SYS_STATUS register
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SysStatus(pub u32);

impl SysStatus {
    /// TX Frame Sent
    pub const TXFRS: SysStatus = SysStatus(1 << 7);
    /// RX PHY Header Error
    pub const RXPHE: SysStatus = SysStatus(1 << 12);
    /// RX FCS Good
    pub const RXFCG: SysStatus = SysStatus(1 << 14);
    /// RX FCS Error
    pub const RXFCE: SysStatus = SysStatus(1 << 15);
    /// RX Reed-Solomon Frame Sync Loss
    pub const RXRFSL: SysStatus = SysStatus(1 << 16);
    /// RX Frame Wait Timeout
    pub const RXRFTO: SysStatus = SysStatus(1 << 17);
    /// Leading Edge Detection Error
    pub const LDEERR: SysStatus = SysStatus(1 << 18);
    /// Preamble Detection Timeout
    pub const RXPTO: SysStatus = SysStatus(1 << 21);
    /// Receive SFD Timeout
    pub const RXSFDTO: SysStatus = SysStatus(1 << 26);
    /// Auto Frame Filtering Rejection
    pub const AFFREJ: SysStatus = SysStatus(1 << 29);

    /// All receive timeouts
    pub const ALL_RX_TO: SysStatus = SysStatus(Self::RXRFTO.0 | Self::RXPTO.0);

    /// All receive errors
    pub const ALL_RX_ERR: SysStatus = SysStatus(
        Self::RXPHE.0
            | Self::RXFCE.0
            | Self::RXRFSL.0
            | Self::RXSFDTO.0
            | Self::AFFREJ.0
            | Self::LDEERR.0,
    );

    /// Returns whether any of the flags in `flags` is set
    pub fn any(&self, flags: SysStatus) -> bool {
        self.0 & flags.0 != 0
    }

    /// Returns whether a frame was received with a good checksum
    pub fn rx_good(&self) -> bool {
        self.any(Self::RXFCG)
    }

    /// Returns whether a receive timeout or error occured
    pub fn rx_failed(&self) -> bool {
        self.any(Self::ALL_RX_TO | Self::ALL_RX_ERR)
    }

    /// Returns whether a frame has been sent
    pub fn tx_done(&self) -> bool {
        self.any(Self::TXFRS)
    }
}

impl BitOr for SysStatus {
    type Output = SysStatus;

    fn bitor(self, rhs: SysStatus) -> SysStatus {
        SysStatus(self.0 | rhs.0)
    }
}

impl BitOrAssign for SysStatus {
    fn bitor_assign(&mut self, rhs: SysStatus) {
        self.0 |= rhs.0;
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_match_register_layout() {
        assert_eq!(SysStatus::TXFRS.0, 0x0000_0080);
        assert_eq!(SysStatus::RXFCG.0, 0x0000_4000);
        assert_eq!(SysStatus::ALL_RX_TO.0, 0x0022_0000);
        assert_eq!(SysStatus::ALL_RX_ERR.0, 0x2405_9000);
    }

    #[test]
    fn classifies_events() {
        let status = SysStatus::RXFCG | SysStatus::TXFRS;
        assert!(status.rx_good());
        assert!(status.tx_done());
        assert!(!status.rx_failed());

        assert!(SysStatus::RXPTO.rx_failed());
        assert!(SysStatus::LDEERR.rx_failed());
        assert!(!SysStatus::default().rx_failed());
    }
}
