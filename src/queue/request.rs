//! Queued GATT Requests
//!
//! Each request kind maps onto exactly one transport primitive. The queue never
//! inspects a request beyond calling [`GattRequest::dispatch`], so retry handling
//! is identical for every variant.

use super::QueueError;
use crate::constants::MAX_ATTR_VALUE_LEN;
use crate::gatt::HandleRange;
use crate::transport::{HvxParams, HvxType, RawError, Transport, WriteOp, WriteParams};
use crate::uuid::Uuid;
use heapless::Vec;

/// A GATT operation waiting for its turn on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GattRequest {
    /// Read an attribute value
    Read {
        /// Attribute handle
        handle: u16,
        /// Offset into the attribute value
        offset: u16,
    },
    /// Write an attribute value
    Write(WriteParams),
    /// Discover primary services by UUID
    ServiceDiscovery {
        /// First handle to search from
        start_handle: u16,
        /// Service UUID
        uuid: Uuid,
    },
    /// Discover characteristics in a handle range
    CharacteristicDiscovery(HandleRange),
    /// Discover descriptors in a handle range
    DescriptorDiscovery(HandleRange),
    /// Send a notification or indication
    Hvx(HvxParams),
}

impl GattRequest {
    /// Build a write request, copying `value` into the request
    ///
    /// # Errors
    /// Returns [`QueueError::NoMem`] if `value` is longer than [`MAX_ATTR_VALUE_LEN`]
    pub fn write(op: WriteOp, handle: u16, offset: u16, value: &[u8]) -> Result<Self, QueueError> {
        Ok(Self::Write(WriteParams {
            op,
            handle,
            offset,
            value: Self::copy_value(value)?,
        }))
    }

    /// Build a notification or indication, copying `data` into the request
    ///
    /// # Errors
    /// Returns [`QueueError::NoMem`] if `data` is longer than [`MAX_ATTR_VALUE_LEN`]
    pub fn hvx(hvx_type: HvxType, handle: u16, offset: u16, data: &[u8]) -> Result<Self, QueueError> {
        Ok(Self::Hvx(HvxParams {
            hvx_type,
            handle,
            offset,
            data: Self::copy_value(data)?,
        }))
    }

    fn copy_value(value: &[u8]) -> Result<Vec<u8, MAX_ATTR_VALUE_LEN>, QueueError> {
        Vec::from_slice(value).map_err(|()| QueueError::NoMem)
    }

    /// Short name of the request kind, for logging
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Write(_) => "write",
            Self::ServiceDiscovery { .. } => "service discovery",
            Self::CharacteristicDiscovery(_) => "characteristic discovery",
            Self::DescriptorDiscovery(_) => "descriptor discovery",
            Self::Hvx(_) => "hvx",
        }
    }

    /// Hand the request to the transport
    ///
    /// A notification that the transport accepts only partially fails with
    /// [`RawError::DataSize`].
    ///
    /// # Errors
    /// Returns the transport's error, `Busy` included
    pub fn dispatch<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        conn_handle: u16,
    ) -> Result<(), RawError> {
        match self {
            Self::Read { handle, offset } => transport.read(conn_handle, *handle, *offset),
            Self::Write(params) => transport.write(conn_handle, params),
            Self::ServiceDiscovery { start_handle, uuid } => {
                transport.primary_services_discover(conn_handle, *start_handle, uuid)
            }
            Self::CharacteristicDiscovery(range) => {
                transport.characteristics_discover(conn_handle, *range)
            }
            Self::DescriptorDiscovery(range) => transport.descriptors_discover(conn_handle, *range),
            Self::Hvx(params) => {
                let written = transport.hvx(conn_handle, params)?;
                if usize::from(written) == params.data.len() {
                    Ok(())
                } else {
                    warn!(
                        "[GQ] hvx on {:#x} queued {} of {} bytes",
                        params.handle,
                        written,
                        params.data.len()
                    );
                    Err(RawError::DataSize)
                }
            }
        }
    }
}
