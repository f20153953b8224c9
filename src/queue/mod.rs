//! GATT Request Queue
//!
//! Serializes GATT procedures so that each connection has at most one request
//! outstanding in the radio stack. Requests from any number of owners share one
//! FIFO per connection.
//!
//! # Flow
//!
//! 1. [`GattQueue::register`] starts tracking a connection.
//! 2. [`GattQueue::enqueue`] dispatches at once when the connection is idle, or
//!    buffers the request behind the ones already waiting.
//! 3. [`GattQueue::on_ble_evt`] is fed every stack event. Any event for a tracked
//!    connection ends the request in flight and lets the next one go out; a
//!    disconnect drops the connection and everything queued for it.
//!
//! A request rejected with [`RawError::Busy`] stays at the head and is reissued on
//! the next event for its connection. Any other error retires it and is reported
//! once through the completion handler.

mod request;

pub use request::GattRequest;

use crate::constants::{MAX_CONNECTIONS, QUEUE_SIZE};
use crate::event::BleEvent;
use crate::transport::{RawError, Transport};
use heapless::{Deque, FnvIndexMap};

/// Errors returned synchronously by the request queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueError {
    /// No room for another connection, request or payload
    NoMem,
    /// Connection is not registered with the queue
    InvalidParam,
}

/// Outcome of a queued request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestEventKind {
    /// The transport accepted the request
    NoError,
    /// The transport rejected the request
    Error(RawError),
}

/// Completion notification for one request, delivered to its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RequestEvent<O> {
    /// Owner tag given at enqueue time
    pub owner: O,
    /// Connection the request was issued on
    pub conn_handle: u16,
    /// Outcome
    pub kind: RequestEventKind,
}

#[derive(Debug)]
struct Entry<O> {
    request: GattRequest,
    owner: O,
}

#[derive(Debug)]
struct Connection<O> {
    entries: Deque<Entry<O>, QUEUE_SIZE>,
    /// Set when the transport accepts a request, cleared by the next event
    in_flight: bool,
}

impl<O> Connection<O> {
    const fn new() -> Self {
        Self {
            entries: Deque::new(),
            in_flight: false,
        }
    }
}

/// Per-connection GATT request queue
///
/// `O` tags each request with its owner so completions can be routed back.
#[derive(Debug)]
pub struct GattQueue<O> {
    conns: FnvIndexMap<u16, Connection<O>, MAX_CONNECTIONS>,
}

impl<O> Default for GattQueue<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> GattQueue<O> {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            conns: FnvIndexMap::new(),
        }
    }

    /// Check whether `conn_handle` is tracked
    #[must_use]
    pub fn is_registered(&self, conn_handle: u16) -> bool {
        self.conns.contains_key(&conn_handle)
    }

    /// Number of requests waiting on `conn_handle`, not counting one in flight
    #[must_use]
    pub fn pending(&self, conn_handle: u16) -> usize {
        self.conns
            .get(&conn_handle)
            .map_or(0, |conn| conn.entries.len())
    }

    /// No request is waiting or in flight on `conn_handle`
    #[must_use]
    pub fn is_idle(&self, conn_handle: u16) -> bool {
        self.conns
            .get(&conn_handle)
            .is_none_or(|conn| conn.entries.is_empty() && !conn.in_flight)
    }
}

impl<O: Copy> GattQueue<O> {
    /// Start tracking a connection
    ///
    /// Registering a connection that is already tracked does nothing.
    ///
    /// # Errors
    /// Returns [`QueueError::NoMem`] if [`MAX_CONNECTIONS`] connections are tracked
    pub fn register(&mut self, conn_handle: u16) -> Result<(), QueueError> {
        if self.conns.contains_key(&conn_handle) {
            return Ok(());
        }
        self.conns
            .insert(conn_handle, Connection::new())
            .map_err(|_| QueueError::NoMem)?;
        debug!("[GQ] registered connection {:#x}", conn_handle);
        Ok(())
    }

    /// Submit a request on `conn_handle`
    ///
    /// `handler` receives the completion if the request is dispatched during this
    /// call. A request that has to wait completes through a later
    /// [`on_ble_evt`](Self::on_ble_evt).
    ///
    /// # Errors
    /// Returns [`QueueError::InvalidParam`] if the connection is not registered, or
    /// [`QueueError::NoMem`] if its queue is full
    pub fn enqueue<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        conn_handle: u16,
        request: GattRequest,
        owner: O,
        handler: &mut impl FnMut(RequestEvent<O>),
    ) -> Result<(), QueueError> {
        let Some(conn) = self.conns.get_mut(&conn_handle) else {
            warn!("[GQ] {} on unregistered connection {:#x}", request.name(), conn_handle);
            return Err(QueueError::InvalidParam);
        };

        if conn.in_flight || !conn.entries.is_empty() {
            trace!("[GQ] buffering {} on {:#x}", request.name(), conn_handle);
            return conn
                .entries
                .push_back(Entry { request, owner })
                .map_err(|_| QueueError::NoMem);
        }

        match request.dispatch(transport, conn_handle) {
            Ok(()) => {
                debug!("[GQ] {} dispatched on {:#x}", request.name(), conn_handle);
                conn.in_flight = true;
                handler(RequestEvent {
                    owner,
                    conn_handle,
                    kind: RequestEventKind::NoError,
                });
            }
            Err(RawError::Busy) => {
                debug!("[GQ] stack busy, {} held on {:#x}", request.name(), conn_handle);
                conn.entries
                    .push_back(Entry { request, owner })
                    .map_err(|_| QueueError::NoMem)?;
            }
            Err(err) => {
                error!(
                    "[GQ] {} failed on {:#x}: {:?}",
                    request.name(),
                    conn_handle,
                    err
                );
                handler(RequestEvent {
                    owner,
                    conn_handle,
                    kind: RequestEventKind::Error(err),
                });
            }
        }
        Ok(())
    }

    /// Feed a stack event to the queue
    ///
    /// Events for a tracked connection release its in-flight slot and dispatch
    /// waiting requests in FIFO order. A disconnect purges the connection without
    /// callbacks.
    pub fn on_ble_evt<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        evt: &BleEvent,
        handler: &mut impl FnMut(RequestEvent<O>),
    ) {
        let Some(conn_handle) = evt.queue_conn_handle() else {
            return;
        };

        if let BleEvent::Disconnected { .. } = evt {
            if let Some(conn) = self.conns.remove(&conn_handle) {
                debug!(
                    "[GQ] connection {:#x} closed, dropped {} requests",
                    conn_handle,
                    conn.entries.len()
                );
            }
            return;
        }

        if let Some(conn) = self.conns.get_mut(&conn_handle) {
            conn.in_flight = false;
            Self::process(transport, conn_handle, conn, handler);
        }
    }

    fn process<T: Transport + ?Sized>(
        transport: &mut T,
        conn_handle: u16,
        conn: &mut Connection<O>,
        handler: &mut impl FnMut(RequestEvent<O>),
    ) {
        while !conn.in_flight {
            let Some(entry) = conn.entries.front() else {
                break;
            };
            let kind = match entry.request.dispatch(transport, conn_handle) {
                Ok(()) => {
                    debug!("[GQ] {} dispatched on {:#x}", entry.request.name(), conn_handle);
                    conn.in_flight = true;
                    RequestEventKind::NoError
                }
                Err(RawError::Busy) => {
                    debug!("[GQ] stack busy, retrying {:#x} later", conn_handle);
                    break;
                }
                Err(err) => {
                    error!(
                        "[GQ] {} failed on {:#x}: {:?}",
                        entry.request.name(),
                        conn_handle,
                        err
                    );
                    RequestEventKind::Error(err)
                }
            };
            if let Some(entry) = conn.entries.pop_front() {
                handler(RequestEvent {
                    owner: entry.owner,
                    conn_handle,
                    kind,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{GattcEvent, GattcParams};
    use crate::gatt::{GattStatus, HandleRange};
    use crate::mock::{Call, MockTransport};
    use crate::transport::WriteOp;
    use std::vec::Vec;

    const CONN: u16 = 5;

    fn write_rsp(conn_handle: u16) -> BleEvent {
        BleEvent::Gattc(GattcEvent {
            conn_handle,
            gatt_status: GattStatus::Success,
            params: GattcParams::WriteResponse { handle: 0x0010 },
        })
    }

    fn read(handle: u16) -> GattRequest {
        GattRequest::Read { handle, offset: 0 }
    }

    #[test]
    fn test_register_idempotent() {
        let mut queue = GattQueue::<u8>::new();
        queue.register(CONN).unwrap();
        queue.register(CONN).unwrap();
        assert!(queue.is_registered(CONN));
        assert_eq!(queue.conns.len(), 1);
    }

    #[test]
    fn test_register_too_many_connections() {
        let mut queue = GattQueue::<u8>::new();
        for conn in 0..MAX_CONNECTIONS as u16 {
            queue.register(conn).unwrap();
        }
        assert_eq!(queue.register(100), Err(QueueError::NoMem));
        // Existing handles still register fine
        assert_eq!(queue.register(0), Ok(()));
    }

    #[test]
    fn test_enqueue_unregistered() {
        let mut queue = GattQueue::<u8>::new();
        let mut transport = MockTransport::new();
        let mut events = Vec::new();

        let result = queue.enqueue(&mut transport, CONN, read(0x10), 1, &mut |e| events.push(e));

        assert_eq!(result, Err(QueueError::InvalidParam));
        assert!(transport.calls.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn test_read_waits_for_write_completion() {
        let mut queue = GattQueue::new();
        let mut transport = MockTransport::new();
        let mut events = Vec::new();
        queue.register(CONN).unwrap();

        let write = GattRequest::write(WriteOp::Request, 0x0010, 0, &[0x01, 0x00]).unwrap();
        queue
            .enqueue(&mut transport, CONN, write, 'w', &mut |e| events.push(e))
            .unwrap();
        queue
            .enqueue(&mut transport, CONN, read(0x0012), 'r', &mut |e| events.push(e))
            .unwrap();

        // Only the write reached the transport
        assert_eq!(transport.calls.len(), 1);
        assert_eq!(queue.pending(CONN), 1);
        assert_eq!(
            events,
            [RequestEvent {
                owner: 'w',
                conn_handle: CONN,
                kind: RequestEventKind::NoError
            }]
        );

        queue.on_ble_evt(&mut transport, &write_rsp(CONN), &mut |e| events.push(e));

        assert_eq!(
            transport.calls,
            [
                Call::Write {
                    conn_handle: CONN,
                    handle: 0x0010
                },
                Call::Read {
                    conn_handle: CONN,
                    handle: 0x0012,
                    offset: 0
                },
            ]
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].owner, 'r');
        assert!(!queue.is_idle(CONN));
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = GattQueue::new();
        let mut transport = MockTransport::new();
        let mut events = Vec::new();
        queue.register(CONN).unwrap();

        for (owner, handle) in [(0u8, 0x20), (1, 0x21), (2, 0x22)] {
            queue
                .enqueue(&mut transport, CONN, read(handle), owner, &mut |e| events.push(e))
                .unwrap();
        }
        for _ in 0..2 {
            queue.on_ble_evt(&mut transport, &write_rsp(CONN), &mut |e| events.push(e));
        }

        let handles: Vec<u16> = transport
            .calls
            .iter()
            .map(|call| match call {
                Call::Read { handle, .. } => *handle,
                other => panic!("unexpected call {other:?}"),
            })
            .collect();
        assert_eq!(handles, [0x20, 0x21, 0x22]);
        let owners: Vec<u8> = events.iter().map(|e| e.owner).collect();
        assert_eq!(owners, [0, 1, 2]);
        assert!(!queue.is_idle(CONN));

        queue.on_ble_evt(&mut transport, &write_rsp(CONN), &mut |e| events.push(e));
        assert!(queue.is_idle(CONN));
    }

    #[test]
    fn test_busy_retried_on_next_event() {
        let mut queue = GattQueue::new();
        let mut transport = MockTransport::new();
        let mut events = Vec::new();
        queue.register(CONN).unwrap();
        transport.push_results(&[Err(RawError::Busy), Err(RawError::Busy)]);

        let request = GattRequest::CharacteristicDiscovery(HandleRange::new(0x0001, 0x000F));
        queue
            .enqueue(&mut transport, CONN, request, 7u8, &mut |e| events.push(e))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(queue.pending(CONN), 1);

        // Unrelated traffic on the connection triggers the retries
        queue.on_ble_evt(&mut transport, &write_rsp(CONN), &mut |e| events.push(e));
        assert!(events.is_empty());
        queue.on_ble_evt(&mut transport, &write_rsp(CONN), &mut |e| events.push(e));

        assert_eq!(transport.calls.len(), 3);
        assert_eq!(
            events,
            [RequestEvent {
                owner: 7,
                conn_handle: CONN,
                kind: RequestEventKind::NoError
            }]
        );
        assert_eq!(queue.pending(CONN), 0);
    }

    #[test]
    fn test_terminal_error_reported_once() {
        let mut queue = GattQueue::new();
        let mut transport = MockTransport::new();
        let mut events = Vec::new();
        queue.register(CONN).unwrap();
        transport.push_results(&[Err(RawError::InvalidState)]);

        queue
            .enqueue(&mut transport, CONN, read(0x30), 1u8, &mut |e| events.push(e))
            .unwrap();

        assert_eq!(
            events,
            [RequestEvent {
                owner: 1,
                conn_handle: CONN,
                kind: RequestEventKind::Error(RawError::InvalidState)
            }]
        );
        assert!(queue.is_idle(CONN));
    }

    #[test]
    fn test_error_does_not_stall_queue() {
        let mut queue = GattQueue::new();
        let mut transport = MockTransport::new();
        let mut events = Vec::new();
        queue.register(CONN).unwrap();

        queue
            .enqueue(&mut transport, CONN, read(0x40), 0u8, &mut |e| events.push(e))
            .unwrap();
        queue
            .enqueue(&mut transport, CONN, read(0x41), 1, &mut |e| events.push(e))
            .unwrap();
        queue
            .enqueue(&mut transport, CONN, read(0x42), 2, &mut |e| events.push(e))
            .unwrap();

        transport.push_results(&[Err(RawError::InvalidParam), Ok(())]);
        queue.on_ble_evt(&mut transport, &write_rsp(CONN), &mut |e| events.push(e));

        assert_eq!(transport.calls.len(), 3);
        assert_eq!(events[1].kind, RequestEventKind::Error(RawError::InvalidParam));
        assert_eq!(events[2].owner, 2);
        assert_eq!(events[2].kind, RequestEventKind::NoError);
    }

    #[test]
    fn test_queue_full() {
        let mut queue = GattQueue::new();
        let mut transport = MockTransport::new();
        let mut events = Vec::new();
        queue.register(CONN).unwrap();

        // First request goes straight out, the rest fill the buffer
        for handle in 0..=QUEUE_SIZE as u16 {
            queue
                .enqueue(&mut transport, CONN, read(handle), 0u8, &mut |e| events.push(e))
                .unwrap();
        }
        assert_eq!(
            queue.enqueue(&mut transport, CONN, read(0xFF), 0, &mut |e| events.push(e)),
            Err(QueueError::NoMem)
        );
        assert_eq!(queue.pending(CONN), QUEUE_SIZE);
    }

    #[test]
    fn test_disconnect_purges_without_callbacks() {
        let mut queue = GattQueue::new();
        let mut transport = MockTransport::new();
        let mut events = Vec::new();
        queue.register(CONN).unwrap();
        queue.register(6).unwrap();

        queue
            .enqueue(&mut transport, CONN, read(0x50), 0u8, &mut |e| events.push(e))
            .unwrap();
        queue
            .enqueue(&mut transport, CONN, read(0x51), 1, &mut |e| events.push(e))
            .unwrap();
        queue
            .enqueue(&mut transport, 6, read(0x52), 2, &mut |e| events.push(e))
            .unwrap();
        events.clear();

        let disconnected = BleEvent::Disconnected {
            conn_handle: CONN,
            reason: 0x13,
        };
        queue.on_ble_evt(&mut transport, &disconnected, &mut |e| events.push(e));
        queue.on_ble_evt(&mut transport, &write_rsp(CONN), &mut |e| events.push(e));

        assert!(events.is_empty());
        assert!(!queue.is_registered(CONN));
        assert_eq!(transport.calls.len(), 2);
        assert!(queue.is_registered(6));
        // The handle can be reused by a new link
        queue.register(CONN).unwrap();
        assert!(queue.is_idle(CONN));
    }

    #[test]
    fn test_events_for_other_connections_ignored() {
        let mut queue = GattQueue::new();
        let mut transport = MockTransport::new();
        let mut events = Vec::new();
        queue.register(CONN).unwrap();

        queue
            .enqueue(&mut transport, CONN, read(0x60), 0u8, &mut |e| events.push(e))
            .unwrap();
        queue
            .enqueue(&mut transport, CONN, read(0x61), 1, &mut |e| events.push(e))
            .unwrap();

        queue.on_ble_evt(&mut transport, &write_rsp(9), &mut |e| events.push(e));
        queue.on_ble_evt(&mut transport, &BleEvent::Other, &mut |e| events.push(e));

        assert_eq!(transport.calls.len(), 1);
        assert_eq!(queue.pending(CONN), 1);
    }
}
