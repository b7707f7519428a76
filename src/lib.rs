#![cfg_attr(docsrs, feature(doc_cfg))]
//! # dalylink
//!
//! An asynchronous client for the read commands of Daly BMS (Battery Management System)
//! devices. The protocol engine is independent of the physical link, it talks to the
//! BMS through the two primitives of the [`Transport`] trait.
//!
//! ## Features
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling the `dalylink` command-line tool.
//!
//! ### Transport Features
//! - `tokio-serial-async`: Enables a serial port [`Transport`] using `tokio` and `tokio-serial`.
//!
//! ### Utility Features
//! - `serde`: Enables `serde` support for the decoded responses.
//! - `bin-dependencies`: Enables all features required by the `dalylink` binary executable.

/// Contains error types for the library.
mod error;
/// Defines the communication protocol for Daly BMS.
pub mod protocol;

mod client;
mod transport;

pub use client::{ClientConfig, DalyClient, DeviceCounts, RESYNC_OVERREAD};
pub use error::{Error, HeaderField, IncompleteFrames};
pub use transport::Transport;

/// Serial port transport for Tokio applications.
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-serial-async")))]
#[cfg(feature = "tokio-serial-async")]
pub mod tokio_serial_async;
