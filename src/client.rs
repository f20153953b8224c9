//! GATT Client
//!
//! Ties one transport, one request queue and one discovery session together.
//! Stack events are fed through [`GattClient::on_ble_evt`], which hands them to
//! discovery before the queue so that requests issued in response to an event
//! go out in the same pass.

use crate::constants::MAX_EVENTS_PER_PASS;
use crate::discovery::{DbDiscovery, DiscoveryError, DiscoveryEvent};
use crate::event::BleEvent;
use crate::queue::{GattQueue, GattRequest, QueueError, RequestEvent};
use crate::transport::Transport;
use crate::uuid::Uuid;
use crate::GattClientOptions;
use heapless::Vec;

/// Owner tag of a queued request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Owner {
    /// Issued by the discovery session
    Discovery,
    /// Issued by the application, with its token
    Application(u16),
}

/// Errors returned by client operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientError {
    /// Request queue error
    Queue(QueueError),
    /// Discovery error
    Discovery(DiscoveryError),
}

impl From<QueueError> for ClientError {
    fn from(err: QueueError) -> Self {
        Self::Queue(err)
    }
}

impl From<DiscoveryError> for ClientError {
    fn from(err: DiscoveryError) -> Self {
        Self::Discovery(err)
    }
}

/// Application callbacks of a [`GattClient`]
pub trait ClientHandler {
    /// A discovery event was produced
    fn on_discovery_event(&mut self, evt: &DiscoveryEvent);

    /// A request enqueued by the application was dispatched or rejected
    ///
    /// The event's owner is the token passed to [`GattClient::enqueue`].
    fn on_request_event(&mut self, evt: &RequestEvent<u16>) {
        let _ = evt;
    }

    /// Every stack event, after discovery and the queue have seen it
    fn on_ble_evt(&mut self, evt: &BleEvent) {
        let _ = evt;
    }
}

/// A GATT client for one radio stack
#[derive(Debug)]
pub struct GattClient<T, H> {
    transport: T,
    handler: H,
    queue: GattQueue<Owner>,
    discovery: DbDiscovery<Owner>,
}

impl<T: Transport, H: ClientHandler> GattClient<T, H> {
    /// Create a client over `transport`, reporting to `handler`
    #[must_use]
    pub fn new(transport: T, handler: H, options: GattClientOptions) -> Self {
        Self {
            transport,
            handler,
            queue: GattQueue::new(),
            discovery: DbDiscovery::with_start_handle(
                Owner::Discovery,
                options.srv_disc_start_handle,
            ),
        }
    }

    /// Start tracking a connection in the request queue
    ///
    /// # Errors
    /// Returns [`ClientError::Queue`] if the queue has no room for the connection
    pub fn register_connection(&mut self, conn_handle: u16) -> Result<(), ClientError> {
        Ok(self.queue.register(conn_handle)?)
    }

    /// Add a service of interest to the discovery session
    ///
    /// # Errors
    /// Returns [`ClientError::Discovery`] if the service cannot be registered
    pub fn register_service(&mut self, uuid: Uuid) -> Result<(), ClientError> {
        Ok(self.discovery.register_service(uuid)?)
    }

    /// Start discovering the registered services on `conn_handle`
    ///
    /// # Errors
    /// Returns [`ClientError::Discovery`] if discovery cannot start
    pub fn start_discovery(&mut self, conn_handle: u16) -> Result<(), ClientError> {
        let handler = &mut self.handler;
        self.discovery.start(
            &mut self.queue,
            &mut self.transport,
            conn_handle,
            &mut |evt: &DiscoveryEvent| handler.on_discovery_event(evt),
        )?;
        Ok(())
    }

    /// Submit an application request on `conn_handle`
    ///
    /// The outcome is reported through [`ClientHandler::on_request_event`] with `token`.
    ///
    /// # Errors
    /// Returns [`ClientError::Queue`] if the connection is unknown or its queue is full
    pub fn enqueue(
        &mut self,
        conn_handle: u16,
        request: GattRequest,
        token: u16,
    ) -> Result<(), ClientError> {
        let handler = &mut self.handler;
        self.queue.enqueue(
            &mut self.transport,
            conn_handle,
            request,
            Owner::Application(token),
            &mut |evt| Self::deliver_request_event(handler, &evt, token),
        )?;
        Ok(())
    }

    /// Process a stack event
    pub fn on_ble_evt(&mut self, evt: &BleEvent) {
        let handler = &mut self.handler;
        self.discovery.on_ble_evt(
            &mut self.queue,
            &mut self.transport,
            evt,
            &mut |devt: &DiscoveryEvent| handler.on_discovery_event(devt),
        );

        let mut completed: Vec<RequestEvent<Owner>, MAX_EVENTS_PER_PASS> = Vec::new();
        self.queue.on_ble_evt(&mut self.transport, evt, &mut |revt| {
            if completed.push(revt).is_err() {
                warn!("[CLIENT] request event dropped on {:#x}", revt.conn_handle);
            }
        });

        for revt in &completed {
            match revt.owner {
                Owner::Discovery => self
                    .discovery
                    .on_request_event(revt, &mut |devt: &DiscoveryEvent| {
                        handler.on_discovery_event(devt);
                    }),
                Owner::Application(token) => Self::deliver_request_event(handler, revt, token),
            }
        }

        handler.on_ble_evt(evt);
    }

    fn deliver_request_event(handler: &mut H, evt: &RequestEvent<Owner>, token: u16) {
        handler.on_request_event(&RequestEvent {
            owner: token,
            conn_handle: evt.conn_handle,
            kind: evt.kind,
        });
    }

    /// The discovery session
    #[must_use]
    pub const fn discovery(&self) -> &DbDiscovery<Owner> {
        &self.discovery
    }

    /// The request queue
    #[must_use]
    pub const fn queue(&self) -> &GattQueue<Owner> {
        &self.queue
    }

    /// The application handler
    #[must_use]
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// The application handler, mutably
    pub const fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// The transport
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }
}
