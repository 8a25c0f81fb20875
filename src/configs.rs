//! Configuration of the ranging tag
//!
//! The defaults match the anchor firmware this tag talks to. Radio settings
//! like channel, bit rate and preamble are the driver's business and don't
//! show up here.

use crate::{
    frame::{self, Addressing},
    time::Duration,
};


/// Configuration of a ranging tag
#[derive(Clone, Copy, Debug)]
pub struct TagConfig {
    /// PAN id and short addresses used in the ranging frames
    pub addressing: Addressing,

    /// TX antenna delay, in device time units
    ///
    /// This is added to the programmed send time to get the time stamp the
    /// transceiver will put on the Final. It needs to match the value in the
    /// transceiver's TX_ANTD register.
    pub tx_antenna_delay: u16,

    /// Delay between receiving the reference Response and sending the Final,
    /// in UWB microseconds
    ///
    /// This needs to cover the time it takes to prepare the Final, and the
    /// frame length of the Final itself.
    pub response_to_final_delay_uus: u32,

    /// Capacity of the receive buffer, in bytes
    ///
    /// Frames that declare a larger length are not read.
    pub rx_buffer_len: usize,

    /// Delay between the end of one ranging cycle and the start of the next,
    /// in milliseconds
    pub ranging_interval_ms: u32,

    /// Which receive time stamp the Final's send time is based on
    pub delay_reference: DelayReference,
}

impl Default for TagConfig {
    fn default() -> Self {
        TagConfig {
            addressing: Addressing::default(),
            tx_antenna_delay: 16436,
            response_to_final_delay_uus: 3800,
            rx_buffer_len: 32,
            ranging_interval_ms: 100,
            delay_reference: DelayReference::default(),
        }
    }
}

impl TagConfig {
    /// Returns the TX antenna delay as a `Duration`
    pub fn tx_antenna_delay(&self) -> Duration {
        Duration::from_antenna_delay(self.tx_antenna_delay)
    }

    /// Checks whether this configuration works with `anchors` anchors
    pub fn validate(&self, anchors: usize) -> Result<(), ConfigError> {
        if anchors == 0 {
            return Err(ConfigError::NoAnchors);
        }
        if anchors > u8::MAX as usize || frame::final_len(anchors) > frame::MAX_FRAME_LEN {
            return Err(ConfigError::TooManyAnchors {
                final_len: frame::final_len(anchors),
            });
        }
        if self.rx_buffer_len < frame::RESPONSE_LEN
            || self.rx_buffer_len > frame::MAX_FRAME_LEN
        {
            return Err(ConfigError::InvalidRxBufferLen(self.rx_buffer_len));
        }
        if Duration::from_uus(self.response_to_final_delay_uus).is_none() {
            return Err(ConfigError::DelayTooLong);
        }

        Ok(())
    }
}


/// Selects the receive time stamp the Final's send time is based on
///
/// If all anchors respond in the order of their identifiers, both variants
/// select the same time stamp.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DelayReference {
    /// The Response that was stored last
    ///
    /// This is always the latest of the received time stamps, so the Final
    /// can't be scheduled before a Response that arrived late.
    MostRecent,

    /// The Response of the anchor with the highest identifier
    HighestAnchor,
}

impl Default for DelayReference {
    fn default() -> Self {
        DelayReference::MostRecent
    }
}


/// The configuration was not valid
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Ranging requires at least one anchor
    NoAnchors,

    /// The Final for this number of anchors doesn't fit into a frame
    TooManyAnchors {
        /// Length the Final would have
        final_len: usize,
    },

    /// The receive buffer can't hold a Response, or is larger than any frame
    InvalidRxBufferLen(usize),

    /// The Response-to-Final delay doesn't fit into the 40-bit system time
    DelayTooLong,
}
