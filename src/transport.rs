//! Radio Stack Transport
//!
//! The transport is the BLE stack underneath the queue: it accepts one GATT
//! procedure at a time per connection and answers later with an event. Every
//! call returns immediately with acceptance, a transient busy result, or a
//! terminal error code.

use crate::constants::MAX_ATTR_VALUE_LEN;
use crate::gatt::HandleRange;
use crate::uuid::Uuid;
use heapless::Vec;

/// Error codes returned synchronously by the radio stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RawError {
    /// Internal error
    Internal,
    /// No memory for operation
    NoMem,
    /// Not found
    NotFound,
    /// Not supported
    NotSupported,
    /// Invalid parameter
    InvalidParam,
    /// Invalid state, operation disallowed in this state
    InvalidState,
    /// Invalid length
    InvalidLength,
    /// Invalid flags
    InvalidFlags,
    /// Invalid data
    InvalidData,
    /// Invalid data size
    DataSize,
    /// Operation timed out
    Timeout,
    /// Null pointer
    Null,
    /// Forbidden operation
    Forbidden,
    /// Bad memory address
    InvalidAddr,
    /// Busy, retry later
    Busy,
    /// Connection count exceeded
    ConnCount,
    /// Not enough resources for operation
    Resources,
    /// Any other stack code, such as a BLE or vendor specific error
    Other(u32),
}

impl RawError {
    /// Map a raw stack return code, `0` meaning success
    ///
    /// # Errors
    /// Returns the matching `RawError` for any non-zero code; codes without a
    /// named variant are kept in [`RawError::Other`].
    pub const fn convert(ret: u32) -> Result<(), RawError> {
        let err = match ret {
            0 => return Ok(()),
            3 => Self::Internal,
            4 => Self::NoMem,
            5 => Self::NotFound,
            6 => Self::NotSupported,
            7 => Self::InvalidParam,
            8 => Self::InvalidState,
            9 => Self::InvalidLength,
            10 => Self::InvalidFlags,
            11 => Self::InvalidData,
            12 => Self::DataSize,
            13 => Self::Timeout,
            14 => Self::Null,
            15 => Self::Forbidden,
            16 => Self::InvalidAddr,
            17 => Self::Busy,
            18 => Self::ConnCount,
            19 => Self::Resources,
            other => Self::Other(other),
        };
        Err(err)
    }

    /// Raw code of this error
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Internal => 3,
            Self::NoMem => 4,
            Self::NotFound => 5,
            Self::NotSupported => 6,
            Self::InvalidParam => 7,
            Self::InvalidState => 8,
            Self::InvalidLength => 9,
            Self::InvalidFlags => 10,
            Self::InvalidData => 11,
            Self::DataSize => 12,
            Self::Timeout => 13,
            Self::Null => 14,
            Self::Forbidden => 15,
            Self::InvalidAddr => 16,
            Self::Busy => 17,
            Self::ConnCount => 18,
            Self::Resources => 19,
            Self::Other(code) => code,
        }
    }
}

/// GATT client write operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteOp {
    /// Write request, answered by a write response
    Request,
    /// Write command, no response
    Command,
    /// Signed write command
    SignedCommand,
    /// Prepare write request
    PrepareRequest,
    /// Execute queued prepared writes
    ExecuteRequest,
}

/// Parameters of a GATT client write
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WriteParams {
    /// Write operation
    pub op: WriteOp,
    /// Attribute handle to write
    pub handle: u16,
    /// Offset into the attribute value
    pub offset: u16,
    /// Value to write
    pub value: Vec<u8, MAX_ATTR_VALUE_LEN>,
}

/// Handle value notification type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HvxType {
    /// Unacknowledged notification
    Notification,
    /// Acknowledged indication
    Indication,
}

/// Parameters of a GATT server notification or indication
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HvxParams {
    /// Notification or indication
    pub hvx_type: HvxType,
    /// Characteristic value handle
    pub handle: u16,
    /// Offset into the attribute value
    pub offset: u16,
    /// Value to send
    pub data: Vec<u8, MAX_ATTR_VALUE_LEN>,
}

/// The BLE stack primitives used by the request queue
///
/// Each call starts a procedure and returns at once. `Err(RawError::Busy)` means
/// the stack could not take the request right now and nothing was started.
pub trait Transport {
    /// Read an attribute value
    ///
    /// # Errors
    /// Returns the stack's error code if the procedure could not be started
    fn read(&mut self, conn_handle: u16, handle: u16, offset: u16) -> Result<(), RawError>;

    /// Write an attribute value
    ///
    /// # Errors
    /// Returns the stack's error code if the procedure could not be started
    fn write(&mut self, conn_handle: u16, params: &WriteParams) -> Result<(), RawError>;

    /// Discover primary services with `uuid`, starting at `start_handle`
    ///
    /// # Errors
    /// Returns the stack's error code if the procedure could not be started
    fn primary_services_discover(
        &mut self,
        conn_handle: u16,
        start_handle: u16,
        uuid: &Uuid,
    ) -> Result<(), RawError>;

    /// Discover characteristic declarations in `range`
    ///
    /// # Errors
    /// Returns the stack's error code if the procedure could not be started
    fn characteristics_discover(
        &mut self,
        conn_handle: u16,
        range: HandleRange,
    ) -> Result<(), RawError>;

    /// Discover descriptors in `range`
    ///
    /// # Errors
    /// Returns the stack's error code if the procedure could not be started
    fn descriptors_discover(&mut self, conn_handle: u16, range: HandleRange)
    -> Result<(), RawError>;

    /// Send a notification or indication, returning the number of bytes queued
    ///
    /// # Errors
    /// Returns the stack's error code if the value could not be queued
    fn hvx(&mut self, conn_handle: u16, params: &HvxParams) -> Result<u16, RawError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read(&mut self, conn_handle: u16, handle: u16, offset: u16) -> Result<(), RawError> {
        (**self).read(conn_handle, handle, offset)
    }

    fn write(&mut self, conn_handle: u16, params: &WriteParams) -> Result<(), RawError> {
        (**self).write(conn_handle, params)
    }

    fn primary_services_discover(
        &mut self,
        conn_handle: u16,
        start_handle: u16,
        uuid: &Uuid,
    ) -> Result<(), RawError> {
        (**self).primary_services_discover(conn_handle, start_handle, uuid)
    }

    fn characteristics_discover(
        &mut self,
        conn_handle: u16,
        range: HandleRange,
    ) -> Result<(), RawError> {
        (**self).characteristics_discover(conn_handle, range)
    }

    fn descriptors_discover(
        &mut self,
        conn_handle: u16,
        range: HandleRange,
    ) -> Result<(), RawError> {
        (**self).descriptors_discover(conn_handle, range)
    }

    fn hvx(&mut self, conn_handle: u16, params: &HvxParams) -> Result<u16, RawError> {
        (**self).hvx(conn_handle, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_error_convert() {
        assert_eq!(RawError::convert(0), Ok(()));
        assert_eq!(RawError::convert(3), Err(RawError::Internal));
        assert_eq!(RawError::convert(17), Err(RawError::Busy));
        assert_eq!(RawError::convert(7), Err(RawError::InvalidParam));
        assert_eq!(RawError::convert(0x3002), Err(RawError::Other(0x3002)));
    }

    #[test]
    fn test_raw_error_code() {
        assert_eq!(RawError::Busy.code(), 17);
        assert_eq!(RawError::DataSize.code(), 12);
        assert_eq!(RawError::Other(0x3002).code(), 0x3002);
        for ret in [3, 12, 19, 0x3001, 0x8000] {
            assert_eq!(RawError::convert(ret).map_err(RawError::code), Err(ret));
        }
    }
}
