//! Discovered Database Records

use crate::constants::{HANDLE_INVALID, MAX_CHARACTERISTICS};
use crate::gatt::{Characteristic, Descriptor, HandleRange};
use crate::uuid::{Uuid, descriptors};
use heapless::Vec;

/// A discovered characteristic and the handles of its well-known descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharacteristicRecord {
    /// Characteristic declaration as reported by the peer
    pub characteristic: Characteristic,
    /// Client Characteristic Configuration descriptor
    pub cccd_handle: Option<u16>,
    /// Characteristic Extended Properties descriptor
    pub ext_prop_handle: Option<u16>,
    /// Characteristic User Description descriptor
    pub user_desc_handle: Option<u16>,
    /// Report Reference descriptor
    pub report_ref_handle: Option<u16>,
}

impl CharacteristicRecord {
    /// New record with no descriptors found yet
    #[must_use]
    pub const fn new(characteristic: Characteristic) -> Self {
        Self {
            characteristic,
            cccd_handle: None,
            ext_prop_handle: None,
            user_desc_handle: None,
            report_ref_handle: None,
        }
    }

    /// Store `desc` if it is one of the tracked descriptor types
    pub fn record_descriptor(&mut self, desc: &Descriptor) {
        let slot = match desc.uuid.as_u16() {
            Some(descriptors::CLIENT_CHAR_CONFIG) => &mut self.cccd_handle,
            Some(descriptors::CHAR_EXT_PROP) => &mut self.ext_prop_handle,
            Some(descriptors::CHAR_USER_DESC) => &mut self.user_desc_handle,
            Some(descriptors::REPORT_REF) => &mut self.report_ref_handle,
            _ => return,
        };
        *slot = Some(desc.handle);
    }

    /// All tracked descriptors have been found
    #[must_use]
    pub const fn has_all_descriptors(&self) -> bool {
        self.cccd_handle.is_some()
            && self.ext_prop_handle.is_some()
            && self.user_desc_handle.is_some()
            && self.report_ref_handle.is_some()
    }
}

/// A service of interest and what was found of it on the peer
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceRecord {
    /// Service UUID
    pub uuid: Uuid,
    /// Handles spanned by the service, zero until the service is found
    pub handle_range: HandleRange,
    /// Discovered characteristics in handle order
    pub characteristics: Vec<CharacteristicRecord, MAX_CHARACTERISTICS>,
}

impl ServiceRecord {
    /// Empty record for `uuid`
    #[must_use]
    pub const fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            handle_range: HandleRange::new(HANDLE_INVALID, HANDLE_INVALID),
            characteristics: Vec::new(),
        }
    }

    /// Look up a characteristic by UUID
    ///
    /// Application-side lookup into a service reported by
    /// [`DiscoveryEvent::Complete`](crate::discovery::DiscoveryEvent::Complete).
    #[must_use]
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&CharacteristicRecord> {
        self.characteristics
            .iter()
            .find(|record| record.characteristic.uuid.matches(uuid))
    }

    /// Handles that may hold descriptors of the characteristic at `index`
    ///
    /// The range runs from just past the value handle up to the next declaration,
    /// or to the end of the service for the last characteristic. Returns `None`
    /// when there is no room for a descriptor.
    #[must_use]
    pub fn descriptor_range(&self, index: usize) -> Option<HandleRange> {
        let current = self.characteristics.get(index)?;
        let start_handle = current.characteristic.handle_value.checked_add(1)?;
        let end_handle = match self.characteristics.get(index + 1) {
            Some(next) => next.characteristic.handle_decl.checked_sub(1)?,
            None => self.handle_range.end_handle,
        };
        let range = HandleRange::new(start_handle, end_handle);
        (!range.is_empty()).then_some(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::CharProperties;

    fn characteristic(handle_decl: u16) -> CharacteristicRecord {
        CharacteristicRecord::new(Characteristic {
            uuid: Uuid::new_16(0x2A19),
            props: CharProperties(CharProperties::READ),
            handle_decl,
            handle_value: handle_decl + 1,
        })
    }

    #[test]
    fn test_descriptor_range() {
        let mut service = ServiceRecord::new(Uuid::new_16(0x180F));
        service.handle_range = HandleRange::new(0x0010, 0x0018);
        for decl in [0x0011, 0x0013, 0x0016] {
            service.characteristics.push(characteristic(decl)).unwrap();
        }

        // Value handle directly followed by the next declaration
        assert_eq!(service.descriptor_range(0), None);
        assert_eq!(service.descriptor_range(1), Some(HandleRange::new(0x0015, 0x0015)));
        // Last characteristic runs to the service end
        assert_eq!(service.descriptor_range(2), Some(HandleRange::new(0x0018, 0x0018)));
        assert_eq!(service.descriptor_range(3), None);

        service.handle_range.end_handle = 0x0017;
        assert_eq!(service.descriptor_range(2), None);

        let found = service.characteristic(&Uuid::new_16(0x2A19));
        assert_eq!(found.map(|c| c.characteristic.handle_decl), Some(0x0011));
        assert!(service.characteristic(&Uuid::new_16(0x2A00)).is_none());
    }

    #[test]
    fn test_descriptor_range_at_handle_limit() {
        let mut service = ServiceRecord::new(Uuid::new_16(0x180F));
        service.handle_range = HandleRange::new(0xFFF0, 0xFFFF);
        let mut record = characteristic(0xFFFE);
        record.characteristic.handle_value = 0xFFFF;
        service.characteristics.push(record).unwrap();

        assert_eq!(service.descriptor_range(0), None);
    }

    #[test]
    fn test_record_descriptor() {
        let mut record = characteristic(0x0020);
        record.record_descriptor(&Descriptor {
            uuid: Uuid::new_16(descriptors::CLIENT_CHAR_CONFIG),
            handle: 0x0022,
        });
        record.record_descriptor(&Descriptor {
            uuid: Uuid::new_16(0x2904),
            handle: 0x0023,
        });

        assert_eq!(record.cccd_handle, Some(0x0022));
        assert_eq!(record.ext_prop_handle, None);
        assert!(!record.has_all_descriptors());

        for (uuid, handle) in [
            (descriptors::CHAR_EXT_PROP, 0x0024),
            (descriptors::CHAR_USER_DESC, 0x0025),
            (descriptors::REPORT_REF, 0x0026),
        ] {
            record.record_descriptor(&Descriptor {
                uuid: Uuid::new_16(uuid),
                handle,
            });
        }
        assert!(record.has_all_descriptors());
        assert_eq!(record.report_ref_handle, Some(0x0026));
    }
}
