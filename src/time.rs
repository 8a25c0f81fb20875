//! Time-related types based on the DW1000's system time
//!
//! Besides the 40-bit [`Instant`] and [`Duration`], this module contains the
//! arithmetic needed to schedule a delayed transmission: conversion from UWB
//! microseconds, the 32-bit value programmed into the DX_TIME register
//! ([`DxTime`]), and the TX timestamp the hardware will produce for it.


use core::ops::Add;
use serde::{Serialize, Deserialize};


/// The maximum value of 40-bit system time stamps.
pub const TIME_MAX: u64 = 0xffffffffff;

/// Device time units per UWB microsecond
///
/// 1 uus = 512 / 499.2 µs, and 1 µs = 499.2 * 128 dtu.
pub const UUS_TO_DWT_TIME: u64 = 65536;

/// Converts a delay in UWB microseconds into device time units
///
/// ``` rust
/// use dw1000_ds_twr_tag::time::to_device_time_units;
///
/// assert_eq!(to_device_time_units(3800), 3800 * 65536);
/// ```
pub fn to_device_time_units(uus: u32) -> u64 {
    // `uus` is at most 32 bits wide, and the factor is 2^16, so the result
    // fits within 48 bits.
    uus as u64 * UUS_TO_DWT_TIME
}


/// A point in DW1000 system time
///
/// System time counts device time units of ~15.65 ps in a 40-bit register.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct Instant(u64);

impl Instant {
    /// Creates an `Instant` from a 40-bit system time
    ///
    /// Returns `None`, if `value` is larger than [`TIME_MAX`].
    ///
    /// ``` rust
    /// use dw1000_ds_twr_tag::time::{Instant, TIME_MAX};
    ///
    /// assert_eq!(Instant::new(TIME_MAX).map(|i| i.value()), Some(TIME_MAX));
    /// assert_eq!(Instant::new(1 << 40), None);
    /// ```
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Instant(value))
        }
        else {
            None
        }
    }

    /// Creates an `Instant` from a raw TX_TIME or RX_TIME register read
    ///
    /// The transceiver reports time stamps as 5 bytes, least significant byte
    /// first, which always fit into 40 bits.
    pub fn from_le_bytes(raw: [u8; 5]) -> Self {
        let value = raw
            .iter()
            .rev()
            .fold(0u64, |value, &byte| (value << 8) | byte as u64);

        Instant(value)
    }

    /// Returns the system time in device time units, at most [`TIME_MAX`]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the low 32 bits of the timestamp
    ///
    /// This is how time stamps travel in ranging frames. Time stamps within a
    /// single exchange are never more than 2^32 device time units (~67 ms)
    /// apart, so differences between truncated values are still correct when
    /// computed with wrapping 32-bit arithmetic.
    pub fn low_u32(&self) -> u32 {
        self.0 as u32
    }

    /// Returns the time from `earlier` to `self`
    ///
    /// System time wraps around after 2^40 device time units (~17.2 s), so
    /// there is no way to tell which of two time stamps is the later one. The
    /// caller needs to know that `earlier` really is earlier, and that less
    /// than a full wrap-around lies between the two.
    ///
    /// ``` rust
    /// use dw1000_ds_twr_tag::time::{Instant, TIME_MAX};
    ///
    /// let poll_tx     = Instant::new(TIME_MAX - 99).unwrap();
    /// let response_rx = Instant::new(400).unwrap();
    ///
    /// assert_eq!(response_rx.duration_since(poll_tx).value(), 500);
    /// ```
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        if self.value() >= earlier.value() {
            Duration(self.value() - earlier.value())
        }
        else {
            Duration(TIME_MAX - earlier.value() + self.value() + 1)
        }
    }
}

/// Wraps around at 2^40, like the system time
impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        // Two 40-bit values can't overflow a u64
        Instant((self.value() + rhs.value()) % (TIME_MAX + 1))
    }
}


/// Time between two [`Instant`]s, in device time units
///
/// Limited to 40 bits, like the system time.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct Duration(u64);

impl Duration {
    /// Creates a `Duration` from a number of device time units
    ///
    /// Returns `None`, if `value` is larger than [`TIME_MAX`].
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Duration(value))
        }
        else {
            None
        }
    }

    /// Creates a `Duration` from an antenna delay register value
    pub fn from_antenna_delay(delay: u16) -> Self {
        Duration(delay as u64)
    }

    /// Creates a `Duration` from a number of UWB microseconds
    ///
    /// Returns `None`, if the result doesn't fit into 40 bits, which is the
    /// case for anything above 2^24 - 1 uus (~17 s).
    pub fn from_uus(uus: u32) -> Option<Self> {
        Duration::new(to_device_time_units(uus))
    }

    /// Returns the duration in device time units, at most [`TIME_MAX`]
    pub fn value(&self) -> u64 {
        self.0
    }
}


/// A value for the DX_TIME register
///
/// The register holds the upper 32 bits of a 40-bit system time. On top of
/// that, the hardware ignores the lowest bit of the register value, so delayed
/// transmissions can only start on a 512 device time unit grid.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct DxTime(u32);

impl DxTime {
    /// Computes the delayed send time for a frame
    ///
    /// Adds `delay_uus` to `reference`, the receive time of a previous frame,
    /// and converts the result to the register's resolution. The addition
    /// wraps around at 40 bits, like the system time does.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use dw1000_ds_twr_tag::time::{DxTime, Instant};
    ///
    /// let rx_time = Instant::new(0x12_3456_7800).unwrap();
    /// let dx_time = DxTime::after(rx_time, 3800);
    ///
    /// assert_eq!(dx_time.value(), ((0x12_3456_7800_u64 + 3800 * 65536) >> 8) as u32);
    /// ```
    pub fn after(reference: Instant, delay_uus: u32) -> Self {
        let send_time = reference.value() + to_device_time_units(delay_uus);

        // Shifting a value modulo 2^40 right by 8 is the same as taking the
        // shifted value modulo 2^32, so the cast does the wrapping for us.
        DxTime((send_time >> 8) as u32)
    }

    /// Creates a `DxTime` from a raw register value
    pub fn from_register(value: u32) -> Self {
        DxTime(value)
    }

    /// Returns the raw register value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns the system time at which the transmission will actually start
    ///
    /// This is the register value with the ignored low bit cleared, expanded
    /// back to 40 bits. The lowest 9 bits of the result are always zero.
    pub fn start_time(&self) -> Instant {
        Instant(((self.0 & 0xffff_fffe) as u64) << 8)
    }

    /// Returns the TX timestamp the transmission will carry
    ///
    /// The hardware adds the TX antenna delay to the start time of a
    /// transmission. The antenna delay isn't bound to the 512 device time unit
    /// grid, so it is added after the start time has been aligned.
    pub fn tx_timestamp(&self, tx_antenna_delay: Duration) -> Instant {
        self.start_time() + tx_antenna_delay
    }
}
