//! `GattWalk` Constants
//!
//! This module contains the capacity limits and protocol values used throughout the
//! `GattWalk` library. The capacity constants size every fixed buffer in the crate;
//! nothing here is tunable at runtime.

/// Maximum number of simultaneously tracked connections in a request queue
///
/// Must be a power of two.
pub const MAX_CONNECTIONS: usize = 4;

/// Maximum number of requests buffered per connection
pub const QUEUE_SIZE: usize = 4;

/// Maximum number of services of interest per discovery session
pub const MAX_SERVICES: usize = 6;

/// Maximum number of characteristics stored per discovered service
pub const MAX_CHARACTERISTICS: usize = 6;

/// Maximum number of entries carried by a single discovery response event
pub const MAX_DISC_RSP_ENTRIES: usize = 8;

/// Maximum attribute value length stored for queued writes and notifications
pub const MAX_ATTR_VALUE_LEN: usize = 64;

/// Maximum number of queue events produced while handling a single transport event
pub const MAX_EVENTS_PER_PASS: usize = QUEUE_SIZE + 1;

/// Depth of the processor channels
pub const CHANNEL_DEPTH: usize = 4;

/// Invalid connection handle
pub const CONN_HANDLE_INVALID: u16 = 0xFFFF;

/// Invalid attribute handle
pub const HANDLE_INVALID: u16 = 0x0000;

/// Lowest valid attribute handle
pub const HANDLE_MIN: u16 = 0x0001;

/// Default start handle for primary service discovery
pub const SRV_DISC_START_HANDLE: u16 = HANDLE_MIN;
