//! Frames exchanged during a ranging cycle
//!
//! A ranging cycle uses three messages:
//! 1. The tag broadcasts a [`Poll`](RangingFrame::Poll).
//! 2. Each anchor replies with a [`Response`] that carries its identifier.
//! 3. The tag sends a [`Final`], which contains the tag's Poll TX time, its
//!    Final TX time, and the time each anchor's Response was received.
//!
//! The anchors use the Final message to compute the time of flight.
//!
//! All frames are IEEE 802.15.4 data frames with 16-bit addressing and share a
//! 10-byte prefix:
//!
//! | Offset | Length | Field                                 |
//! |--------|--------|---------------------------------------|
//! | 0      | 2      | frame control (`0x8841`)              |
//! | 2      | 1      | sequence number                       |
//! | 3      | 2      | PAN id                                |
//! | 5      | 2      | destination address                   |
//! | 7      | 2      | source address                        |
//! | 9      | 1      | function code                         |
//!
//! Multi-byte fields are little-endian. Every frame ends with a 2-byte
//! checksum that the transceiver fills in. The encoded frames in this module
//! contain placeholder bytes for it, so their length is the length that goes
//! into the TX frame control register.

use core::convert::TryFrom;

use byte::{BytesExt as _, LE};
use ieee802154::mac::{PanId, ShortAddress};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::time::Instant;


/// Frame control of all ranging frames: data frame, 16-bit addresses
pub const FRAME_CONTROL: u16 = 0x8841;

/// Length of the prefix shared by all ranging frames
pub const COMMON_LEN: usize = 10;

/// Offset of the sequence number
pub const SEQ_IDX: usize = 2;

/// Offset of the function code
pub const FUNCTION_IDX: usize = 9;

/// Offset of the anchor identifier in a Response
pub const ANCHOR_ID_IDX: usize = 10;

/// Offset of the activity parameter in a Response
pub const ACTIVITY_PARAMETER_IDX: usize = 11;

/// Offset of the Poll TX time stamp in a Final
pub const POLL_TX_IDX: usize = 10;

/// Offset of the Final TX time stamp in a Final
pub const FINAL_TX_IDX: usize = 14;

/// Offset of the first anchor RX time stamp in a Final
pub const ANCHOR_RX_IDX: usize = 18;

/// Length of a time stamp field
pub const TS_LEN: usize = 4;

/// Length of the checksum appended by the transceiver
pub const FCS_LEN: usize = 2;

/// Length of a Poll, including checksum
pub const POLL_LEN: usize = COMMON_LEN + FCS_LEN;

/// Length of a Response, including checksum
pub const RESPONSE_LEN: usize = 20;

/// Largest frame the transceiver can send or receive in standard mode
pub const MAX_FRAME_LEN: usize = 127;

/// Length of a Final for the given number of anchors, including checksum
pub const fn final_len(anchors: usize) -> usize {
    ANCHOR_RX_IDX + anchors * TS_LEN + FCS_LEN
}


/// Identifies the type of a ranging frame
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FunctionCode {
    /// Tag → anchors, starts the exchange
    Poll = 0xE0,
    /// Anchor → tag
    Response = 0xE1,
    /// Tag → anchors, carries the time stamps
    Final = 0x23,
}


/// Network identity of the tag and the anchors it ranges with
///
/// The anchors don't have individual addresses. They all use the same short
/// address and tell themselves apart through the anchor identifier in their
/// Response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Addressing {
    /// PAN all nodes belong to
    pub pan_id: PanId,
    /// Short address of the tag
    pub tag: ShortAddress,
    /// Short address shared by all anchors
    pub anchor: ShortAddress,
}

impl Default for Addressing {
    fn default() -> Self {
        Addressing {
            pan_id: PanId(0xDECA),
            tag: ShortAddress(u16::from_le_bytes(*b"VE")),
            anchor: ShortAddress(u16::from_le_bytes(*b"WA")),
        }
    }
}

impl Addressing {
    /// Returns the header of a frame sent by the tag
    pub fn outgoing(&self, seq: u8, function: FunctionCode) -> Header {
        Header {
            frame_control: FRAME_CONTROL,
            seq,
            pan_id: self.pan_id,
            destination: self.anchor,
            source: self.tag,
            function,
        }
    }

    /// Returns the header of a Response sent by an anchor
    pub fn response(&self, seq: u8) -> Header {
        Header {
            frame_control: FRAME_CONTROL,
            seq,
            pan_id: self.pan_id,
            destination: self.tag,
            source: self.anchor,
            function: FunctionCode::Response,
        }
    }

    /// Returns the prefix every expected Response starts with
    ///
    /// The sequence number is zero. See [`matches`].
    pub fn response_template(&self) -> [u8; COMMON_LEN] {
        self.response(0).to_bytes()
    }
}


/// The prefix shared by all ranging frames
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    /// IEEE 802.15.4 frame control field
    pub frame_control: u16,
    /// Exchange sequence number
    pub seq: u8,
    /// PAN id
    pub pan_id: PanId,
    /// Destination address
    pub destination: ShortAddress,
    /// Source address
    pub source: ShortAddress,
    /// Type of the frame
    pub function: FunctionCode,
}

impl Header {
    /// Encodes the header
    pub fn to_bytes(&self) -> [u8; COMMON_LEN] {
        let frame_control = self.frame_control.to_le_bytes();
        let pan_id = self.pan_id.0.to_le_bytes();
        let destination = self.destination.0.to_le_bytes();
        let source = self.source.0.to_le_bytes();

        [
            frame_control[0],
            frame_control[1],
            self.seq,
            pan_id[0],
            pan_id[1],
            destination[0],
            destination[1],
            source[0],
            source[1],
            self.function.into(),
        ]
    }

    /// Decodes the header at the start of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        require_len(bytes, COMMON_LEN)?;

        let function = FunctionCode::try_from(bytes[FUNCTION_IDX])
            .map_err(|_| FrameError::UnknownFunction(bytes[FUNCTION_IDX]))?;

        Ok(Header {
            frame_control: read_u16(bytes, 0)?,
            seq: bytes[SEQ_IDX],
            pan_id: PanId(read_u16(bytes, 3)?),
            destination: ShortAddress(read_u16(bytes, 5)?),
            source: ShortAddress(read_u16(bytes, 7)?),
            function,
        })
    }
}


/// Response sent by an anchor after receiving a Poll
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Response {
    /// The frame's prefix
    pub header: Header,

    /// Identifies the anchor, starting at 1
    pub anchor_id: u8,

    /// Activity parameter, not used by the tag
    pub activity_parameter: u16,
}

/// Final message sent by the tag after all anchors have responded
///
/// Time stamps are truncated to their low 32 bits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Final<const N: usize> {
    /// The frame's prefix
    pub header: Header,

    /// When the Poll was sent
    pub poll_tx: u32,

    /// When this Final is sent
    pub final_tx: u32,

    /// When each anchor's Response was received, in anchor order
    pub anchor_rx: [u32; N],
}


/// A ranging frame, for `N` anchors
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RangingFrame<const N: usize> {
    /// Starts the exchange. Consists of the header only.
    Poll(Header),

    /// An anchor's reply to the Poll
    Response(Response),

    /// Concludes the exchange
    Final(Final<N>),
}

impl<const N: usize> RangingFrame<N> {
    /// Returns the frame's header
    pub fn header(&self) -> &Header {
        match self {
            RangingFrame::Poll(header) => header,
            RangingFrame::Response(response) => &response.header,
            RangingFrame::Final(final_) => &final_.header,
        }
    }

    /// Returns the encoded length of the frame, including checksum
    pub fn len(&self) -> usize {
        match self {
            RangingFrame::Poll(_) => POLL_LEN,
            RangingFrame::Response(_) => RESPONSE_LEN,
            RangingFrame::Final(_) => final_len(N),
        }
    }

    /// Encodes the frame into `buf`
    ///
    /// Bytes that aren't part of any field, including the checksum
    /// placeholder, are zeroed. Returns the length of the encoded frame.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, FrameError> {
        let len = self.len();
        if buf.len() < len {
            return Err(FrameError::BufferTooSmall { required_len: len });
        }

        let buf = &mut buf[..len];
        for byte in buf.iter_mut() {
            *byte = 0;
        }
        buf[..COMMON_LEN].copy_from_slice(&self.header().to_bytes());

        match self {
            RangingFrame::Poll(_) => {}
            RangingFrame::Response(response) => {
                buf[ANCHOR_ID_IDX] = response.anchor_id;
                write_u16(buf, ACTIVITY_PARAMETER_IDX, response.activity_parameter)?;
            }
            RangingFrame::Final(final_) => {
                write_u32(buf, POLL_TX_IDX, final_.poll_tx)?;
                write_u32(buf, FINAL_TX_IDX, final_.final_tx)?;
                for (i, &rx) in final_.anchor_rx.iter().enumerate() {
                    write_u32(buf, ANCHOR_RX_IDX + i * TS_LEN, rx)?;
                }
            }
        }

        Ok(len)
    }

    /// Decodes a received frame
    ///
    /// `bytes` needs to contain at least the declared length of the frame
    /// type, checksum included. Anything beyond that is ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let header = Header::decode(bytes)?;

        match header.function {
            FunctionCode::Poll => {
                require_len(bytes, POLL_LEN)?;
                Ok(RangingFrame::Poll(header))
            }
            FunctionCode::Response => {
                require_len(bytes, RESPONSE_LEN)?;
                Ok(RangingFrame::Response(Response {
                    header,
                    anchor_id: extract_anchor_id(bytes)?,
                    activity_parameter: read_u16(bytes, ACTIVITY_PARAMETER_IDX)?,
                }))
            }
            FunctionCode::Final => {
                require_len(bytes, final_len(N))?;

                let mut anchor_rx = [0; N];
                for (i, rx) in anchor_rx.iter_mut().enumerate() {
                    *rx = extract_timestamp_field(bytes, ANCHOR_RX_IDX + i * TS_LEN)?;
                }

                Ok(RangingFrame::Final(Final {
                    header,
                    poll_tx: extract_timestamp_field(bytes, POLL_TX_IDX)?,
                    final_tx: extract_timestamp_field(bytes, FINAL_TX_IDX)?,
                    anchor_rx,
                }))
            }
        }
    }
}


/// Encodes the Poll for the given sequence number
pub fn encode_poll(addressing: &Addressing, seq: u8) -> [u8; POLL_LEN] {
    let mut frame = [0; POLL_LEN];
    frame[..COMMON_LEN]
        .copy_from_slice(&addressing.outgoing(seq, FunctionCode::Poll).to_bytes());
    frame
}

/// Encodes a Final into `buf`
///
/// All time stamps are truncated to their low 32 bits. Returns the length of
/// the encoded frame.
pub fn encode_final<const N: usize>(
    addressing: &Addressing,
    seq: u8,
    poll_tx: Instant,
    final_tx: Instant,
    anchor_rx: &[Instant; N],
    buf: &mut [u8],
)
    -> Result<usize, FrameError>
{
    let mut rx = [0; N];
    for (field, instant) in rx.iter_mut().zip(anchor_rx.iter()) {
        *field = instant.low_u32();
    }

    RangingFrame::Final(Final {
        header: addressing.outgoing(seq, FunctionCode::Final),
        poll_tx: poll_tx.low_u32(),
        final_tx: final_tx.low_u32(),
        anchor_rx: rx,
    })
    .encode(buf)
}

/// Checks whether a received frame starts with the expected prefix
///
/// Only the first [`COMMON_LEN`] bytes are compared, and the sequence number
/// is ignored, since it doesn't tell the receiver anything about whether the
/// frame is the one it expects. Returns `false` if either slice is too short.
pub fn matches(received: &[u8], template: &[u8]) -> bool {
    if received.len() < COMMON_LEN || template.len() < COMMON_LEN {
        return false;
    }

    received[..COMMON_LEN]
        .iter()
        .zip(&template[..COMMON_LEN])
        .enumerate()
        .all(|(i, (a, b))| i == SEQ_IDX || a == b)
}

/// Returns the anchor identifier of a received Response
pub fn extract_anchor_id(received: &[u8]) -> Result<u8, FrameError> {
    require_len(received, ANCHOR_ID_IDX + 1)?;
    Ok(received[ANCHOR_ID_IDX])
}

/// Returns the 32-bit little-endian time stamp field at `offset`
pub fn extract_timestamp_field(received: &[u8], offset: usize) -> Result<u32, FrameError> {
    read_u32(received, offset)
}


/// An error that can occur while encoding or decoding frames
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// The received bytes are shorter than the frame requires
    TruncatedFrame {
        /// Length the frame requires
        required_len: usize,
        /// Length that was available
        actual_len: usize,
    },

    /// The function code is not one of the ranging frames
    UnknownFunction(u8),

    /// The output buffer can't hold the encoded frame
    BufferTooSmall {
        /// Indicates how large a buffer would have been required
        required_len: usize,
    },
}


fn require_len(bytes: &[u8], required_len: usize) -> Result<(), FrameError> {
    if bytes.len() < required_len {
        return Err(FrameError::TruncatedFrame {
            required_len,
            actual_len: bytes.len(),
        });
    }

    Ok(())
}

fn read_u16(bytes: &[u8], mut offset: usize) -> Result<u16, FrameError> {
    let required_len = offset + 2;
    require_len(bytes, required_len)?;
    bytes
        .read_with::<u16>(&mut offset, LE)
        .map_err(|_| FrameError::TruncatedFrame {
            required_len,
            actual_len: bytes.len(),
        })
}

fn read_u32(bytes: &[u8], mut offset: usize) -> Result<u32, FrameError> {
    let required_len = offset + TS_LEN;
    require_len(bytes, required_len)?;
    bytes
        .read_with::<u32>(&mut offset, LE)
        .map_err(|_| FrameError::TruncatedFrame {
            required_len,
            actual_len: bytes.len(),
        })
}

fn write_u16(buf: &mut [u8], mut offset: usize, value: u16) -> Result<(), FrameError> {
    let required_len = offset + 2;
    buf.write_with(&mut offset, value, LE)
        .map_err(|_| FrameError::BufferTooSmall { required_len })
}

fn write_u32(buf: &mut [u8], mut offset: usize, value: u32) -> Result<(), FrameError> {
    let required_len = offset + TS_LEN;
    buf.write_with(&mut offset, value, LE)
        .map_err(|_| FrameError::BufferTooSmall { required_len })
}
