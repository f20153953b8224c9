//! BLE Stack Events
//!
//! Owned representation of the event stream delivered by the radio stack.
//! Discovery responses carry their payload; every connection-oriented event
//! carries its connection handle so the request queue can use it as a retry
//! trigger.

use crate::constants::{MAX_ATTR_VALUE_LEN, MAX_DISC_RSP_ENTRIES};
use crate::gatt::{Characteristic, Descriptor, DiscoveredService, GattStatus};
use heapless::Vec;

/// GATT client event parameters
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GattcParams {
    /// Primary service discovery response
    PrimaryServiceDiscoveryResponse(Vec<DiscoveredService, MAX_DISC_RSP_ENTRIES>),
    /// Characteristic discovery response
    CharacteristicDiscoveryResponse(Vec<Characteristic, MAX_DISC_RSP_ENTRIES>),
    /// Descriptor discovery response
    DescriptorDiscoveryResponse(Vec<Descriptor, MAX_DISC_RSP_ENTRIES>),
    /// Read response
    ReadResponse {
        /// Attribute handle
        handle: u16,
        /// Offset of the returned data
        offset: u16,
        /// Attribute data
        data: Vec<u8, MAX_ATTR_VALUE_LEN>,
    },
    /// Write response
    WriteResponse {
        /// Attribute handle
        handle: u16,
    },
    /// Notification or indication received from the peer
    Hvx {
        /// Attribute handle
        handle: u16,
        /// Attribute data
        data: Vec<u8, MAX_ATTR_VALUE_LEN>,
    },
    /// Write command transmission complete
    WriteCmdTxComplete {
        /// Number of write commands transmitted
        count: u8,
    },
    /// GATT procedure timeout
    Timeout,
}

/// GATT client event
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GattcEvent {
    /// Connection the event belongs to
    pub conn_handle: u16,
    /// Procedure status
    pub gatt_status: GattStatus,
    /// Event parameters
    pub params: GattcParams,
}

/// GATT server event parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GattsParams {
    /// Peer wrote an attribute
    Write {
        /// Attribute handle
        handle: u16,
    },
    /// Indication confirmation received
    HandleValueConfirm {
        /// Attribute handle
        handle: u16,
    },
    /// Notification transmission complete
    HvnTxComplete {
        /// Number of notifications transmitted
        count: u8,
    },
    /// GATT server procedure timeout
    Timeout,
}

/// GATT server event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GattsEvent {
    /// Connection the event belongs to
    pub conn_handle: u16,
    /// Event parameters
    pub params: GattsParams,
}

/// Event delivered by the BLE stack
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleEvent {
    /// Link established
    Connected {
        /// New connection handle
        conn_handle: u16,
    },
    /// Link lost or closed
    Disconnected {
        /// Connection handle of the closed link
        conn_handle: u16,
        /// HCI disconnect reason
        reason: u8,
    },
    /// GATT client event
    Gattc(GattcEvent),
    /// GATT server event
    Gatts(GattsEvent),
    /// Any event not relevant to GATT processing
    Other,
}

impl BleEvent {
    /// Connection handle of a GATT client or server event, or of a disconnect
    ///
    /// These are the events that drive request queue processing; others return `None`.
    #[must_use]
    pub const fn queue_conn_handle(&self) -> Option<u16> {
        match self {
            Self::Disconnected { conn_handle, .. } => Some(*conn_handle),
            Self::Gattc(evt) => Some(evt.conn_handle),
            Self::Gatts(evt) => Some(evt.conn_handle),
            Self::Connected { .. } | Self::Other => None,
        }
    }

    /// Build a primary service discovery response
    #[must_use]
    pub fn primary_services(conn_handle: u16, services: &[DiscoveredService]) -> Self {
        let services: Vec<_, MAX_DISC_RSP_ENTRIES> =
            services.iter().copied().take(MAX_DISC_RSP_ENTRIES).collect();
        Self::discovery(
            conn_handle,
            services.is_empty(),
            GattcParams::PrimaryServiceDiscoveryResponse(services),
        )
    }

    /// Build a characteristic discovery response
    #[must_use]
    pub fn characteristics(conn_handle: u16, chars: &[Characteristic]) -> Self {
        let chars: Vec<_, MAX_DISC_RSP_ENTRIES> =
            chars.iter().copied().take(MAX_DISC_RSP_ENTRIES).collect();
        Self::discovery(
            conn_handle,
            chars.is_empty(),
            GattcParams::CharacteristicDiscoveryResponse(chars),
        )
    }

    /// Build a descriptor discovery response
    #[must_use]
    pub fn descriptors(conn_handle: u16, descs: &[Descriptor]) -> Self {
        let descs: Vec<_, MAX_DISC_RSP_ENTRIES> =
            descs.iter().copied().take(MAX_DISC_RSP_ENTRIES).collect();
        Self::discovery(
            conn_handle,
            descs.is_empty(),
            GattcParams::DescriptorDiscoveryResponse(descs),
        )
    }

    fn discovery(conn_handle: u16, not_found: bool, params: GattcParams) -> Self {
        let gatt_status = if not_found {
            GattStatus::AttributeNotFound
        } else {
            GattStatus::Success
        };
        Self::Gattc(GattcEvent {
            conn_handle,
            gatt_status,
            params,
        })
    }
}
