#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

// Must come first so the logging macros are visible to every module
#[macro_use]
mod fmt;

pub mod api;
pub mod client;
pub mod constants;
pub mod discovery;
pub mod event;
pub mod gatt;
#[cfg(test)]
mod mock;
pub mod processor;
pub mod queue;
pub mod transport;
pub mod uuid;

use crate::constants::SRV_DISC_START_HANDLE;

pub use client::{ClientError, ClientHandler, GattClient, Owner};
pub use discovery::{
    CharacteristicRecord, DbDiscovery, DiscoveryError, DiscoveryEvent, ServiceRecord,
};
pub use event::BleEvent;
pub use queue::{GattQueue, GattRequest, QueueError, RequestEvent, RequestEventKind};
pub use transport::{RawError, Transport};
pub use uuid::Uuid;

/// Options for configuring a `GattClient` instance
///
/// # Examples
///
/// ```rust
/// use gattwalk::{GattClientOptions, constants};
///
/// // Use default options
/// let default_options = GattClientOptions::default();
/// assert_eq!(default_options.srv_disc_start_handle, constants::HANDLE_MIN);
///
/// // Skip the attribute table's GAP and GATT services
/// let options = GattClientOptions {
///     srv_disc_start_handle: 0x000C,
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GattClientOptions {
    /// First attribute handle searched by primary service discovery
    ///
    /// Services that start below this handle are never found.
    pub srv_disc_start_handle: u16,
}

impl Default for GattClientOptions {
    fn default() -> Self {
        Self {
            srv_disc_start_handle: SRV_DISC_START_HANDLE,
        }
    }
}
