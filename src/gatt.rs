//! GATT Attribute Data
//!
//! Plain data types describing a peer's attribute table as reported by the
//! transport during discovery: handle ranges, characteristic declarations,
//! descriptors and service instances.

use crate::uuid::Uuid;

/// An inclusive range of attribute handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandleRange {
    /// First handle in the range
    pub start_handle: u16,
    /// Last handle in the range
    pub end_handle: u16,
}

impl HandleRange {
    /// Create a new handle range
    #[must_use]
    pub const fn new(start_handle: u16, end_handle: u16) -> Self {
        Self {
            start_handle,
            end_handle,
        }
    }

    /// Range is empty when it starts past its end
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start_handle > self.end_handle
    }
}

/// Characteristic properties bit field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharProperties(pub u8);

impl CharProperties {
    /// Broadcast permitted
    pub const BROADCAST: u8 = 0x01;
    /// Read permitted
    pub const READ: u8 = 0x02;
    /// Write without response permitted
    pub const WRITE_WITHOUT_RESPONSE: u8 = 0x04;
    /// Write permitted
    pub const WRITE: u8 = 0x08;
    /// Notify permitted
    pub const NOTIFY: u8 = 0x10;
    /// Indicate permitted
    pub const INDICATE: u8 = 0x20;
    /// Authenticated signed writes permitted
    pub const AUTH_SIGNED_WRITES: u8 = 0x40;
    /// Extended properties descriptor present
    pub const EXTENDED_PROPERTIES: u8 = 0x80;

    /// Check a single property bit
    ///
    /// Lets applications decide from a discovered characteristic whether to
    /// read, write or subscribe to it.
    #[must_use]
    pub const fn has(&self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

/// A characteristic declaration returned by characteristic discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Characteristic {
    /// Characteristic UUID
    pub uuid: Uuid,
    /// Characteristic properties
    pub props: CharProperties,
    /// Handle of the characteristic declaration
    pub handle_decl: u16,
    /// Handle of the characteristic value
    pub handle_value: u16,
}

/// A descriptor returned by descriptor discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Descriptor {
    /// Descriptor type UUID
    pub uuid: Uuid,
    /// Descriptor handle
    pub handle: u16,
}

/// A primary service instance returned by primary service discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveredService {
    /// Service UUID
    pub uuid: Uuid,
    /// Handles spanned by the service
    pub handle_range: HandleRange,
}

/// GATT procedure status reported with every GATT client event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GattStatus {
    /// Procedure completed
    Success,
    /// Peer reported that no attribute matched the request
    AttributeNotFound,
    /// Any other ATT or stack status code
    Other(u16),
}

impl GattStatus {
    /// ATT status code for Attribute Not Found
    pub const ATTERR_ATTRIBUTE_NOT_FOUND: u16 = 0x010A;

    /// Map the raw status code of a stack event
    ///
    /// For transports translating their native GATT client events into
    /// [`BleEvent`](crate::event::BleEvent)s.
    #[must_use]
    pub const fn from_raw(status: u16) -> Self {
        match status {
            0x0000 => Self::Success,
            Self::ATTERR_ATTRIBUTE_NOT_FOUND => Self::AttributeNotFound,
            other => Self::Other(other),
        }
    }

    /// Check for success
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_range() {
        let range = HandleRange::new(0x0010, 0x0015);
        assert!(!range.is_empty());
        assert!(!HandleRange::new(0x0010, 0x0010).is_empty());
        assert!(HandleRange::new(0x0011, 0x0010).is_empty());
    }

    #[test]
    fn test_char_properties() {
        let props = CharProperties(CharProperties::READ | CharProperties::NOTIFY);
        assert!(props.has(CharProperties::READ));
        assert!(!props.has(CharProperties::WRITE));
        assert!(props.has(CharProperties::NOTIFY));
    }

    #[test]
    fn test_gatt_status_from_raw() {
        assert_eq!(GattStatus::from_raw(0x0000), GattStatus::Success);
        assert_eq!(GattStatus::from_raw(0x010A), GattStatus::AttributeNotFound);
        assert_eq!(GattStatus::from_raw(0x0105), GattStatus::Other(0x0105));
        assert!(GattStatus::Success.is_success());
        assert!(!GattStatus::AttributeNotFound.is_success());
    }
}
