//! Bluetooth UUIDs
//!
//! Services, characteristics and descriptors are identified by 16-, 32- or 128-bit
//! UUIDs. 16- and 32-bit values are aliases within the Bluetooth Base UUID
//! (`0000xxxx-0000-1000-8000-00805F9B34FB`).

/// Bluetooth Base UUID, little-endian
const BASE_UUID: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Well-known descriptor UUIDs recognized during descriptor discovery
pub mod descriptors {
    /// Characteristic Extended Properties
    pub const CHAR_EXT_PROP: u16 = 0x2900;
    /// Characteristic User Description
    pub const CHAR_USER_DESC: u16 = 0x2901;
    /// Client Characteristic Configuration
    pub const CLIENT_CHAR_CONFIG: u16 = 0x2902;
    /// Report Reference
    pub const REPORT_REF: u16 = 0x2908;
}

/// A Bluetooth UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Uuid {
    /// 16-bit SIG-assigned UUID
    Uuid16(u16),
    /// 32-bit SIG-assigned UUID
    Uuid32(u32),
    /// 128-bit UUID, little-endian byte order
    Uuid128([u8; 16]),
}

impl Uuid {
    /// Create a 16-bit UUID
    #[must_use]
    pub const fn new_16(uuid: u16) -> Self {
        Self::Uuid16(uuid)
    }

    /// Create a 128-bit UUID from little-endian bytes
    #[must_use]
    pub const fn new_128(bytes: [u8; 16]) -> Self {
        Self::Uuid128(bytes)
    }

    /// Expand to the full 128-bit form, little-endian
    #[must_use]
    pub fn to_le_bytes(&self) -> [u8; 16] {
        match *self {
            Self::Uuid16(short) => Self::expand(u32::from(short)),
            Self::Uuid32(short) => Self::expand(short),
            Self::Uuid128(bytes) => bytes,
        }
    }

    /// The 16-bit alias, if this UUID has one
    #[must_use]
    pub fn as_u16(&self) -> Option<u16> {
        match *self {
            Self::Uuid16(short) => Some(short),
            Self::Uuid32(short) => u16::try_from(short).ok(),
            Self::Uuid128(bytes) => {
                if bytes[..12] == BASE_UUID[..12] && bytes[14..] == [0, 0] {
                    Some(u16::from_le_bytes([bytes[12], bytes[13]]))
                } else {
                    None
                }
            }
        }
    }

    /// Compare two UUIDs by value, so a 16-bit alias matches its 128-bit form
    #[must_use]
    pub fn matches(&self, other: &Uuid) -> bool {
        self.to_le_bytes() == other.to_le_bytes()
    }

    fn expand(short: u32) -> [u8; 16] {
        let mut bytes = BASE_UUID;
        bytes[12..].copy_from_slice(&short.to_le_bytes());
        bytes
    }
}

impl From<u16> for Uuid {
    fn from(uuid: u16) -> Self {
        Self::Uuid16(uuid)
    }
}

impl From<[u8; 16]> for Uuid {
    fn from(bytes: [u8; 16]) -> Self {
        Self::Uuid128(bytes)
    }
}
