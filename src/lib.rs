//! Tag-side engine for double-sided two-way ranging with DW1000 anchors
//!
//! This crate implements the tag's part of a ranging exchange with a fixed set
//! of anchors over an ultra-wideband link. In each cycle, the tag broadcasts a
//! Poll, collects one Response from each anchor, and sends a Final at a
//! precisely scheduled time. The Final carries the tag's time stamps, which
//! allow the anchors to compute the time of flight.
//!
//! The crate doesn't access the transceiver's registers itself. The
//! transceiver driver needs to implement the [`Transceiver`] trait.
//!
//! # Example
//!
//! ``` rust,ignore
//! use dw1000_ds_twr_tag::{Tag, TagConfig};
//!
//! let mut tag: Tag<_, 3> = Tag::new(radio, TagConfig::default())?;
//!
//! loop {
//!     timer.start(50.ms());
//!     match tag.range_and_wait(&mut timer, &mut delay) {
//!         Ok(ranging) => {
//!             // The Final is on its way to the anchors
//!         }
//!         Err(error) => {
//!             // The cycle was aborted. The next one starts from scratch.
//!         }
//!     }
//! }
//! ```


#![cfg_attr(not(test), no_std)]

#![deny(missing_docs)]


#[macro_use]
mod fmt;

pub mod configs;
pub mod frame;
pub mod macros;
pub mod tag;
pub mod time;
pub mod transceiver;
pub mod util;

#[cfg(test)]
mod mock;


pub use ieee802154::mac;

pub use crate::{
    configs::{
        ConfigError,
        DelayReference,
        TagConfig,
    },
    frame::{
        FrameError,
        RangingFrame,
    },
    tag::{
        Error,
        Ranging,
        Tag,
    },
    time::{
        Duration,
        DxTime,
        Instant,
        TIME_MAX,
    },
    transceiver::Transceiver,
};
