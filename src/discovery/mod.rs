//! GATT Database Discovery
//!
//! Walks a peer's attribute table for a list of services of interest, one
//! connection at a time. For each registered service the session runs:
//!
//! 1. Primary service discovery by UUID
//! 2. Characteristic discovery over the service's handle range, page by page
//! 3. Descriptor discovery in each gap between characteristics
//!
//! All requests go through the shared [`GattQueue`], so discovery traffic is
//! serialized with every other GATT user on the connection.
//!
//! Results are staged per service and delivered in one burst once the last
//! registered service concludes, followed by [`DiscoveryEvent::Available`]. If the
//! run is aborted by an error, staged results are dropped and only
//! [`DiscoveryEvent::Error`] and [`DiscoveryEvent::Available`] are delivered.

mod record;

pub use record::{CharacteristicRecord, ServiceRecord};

use crate::constants::{CONN_HANDLE_INVALID, MAX_SERVICES, SRV_DISC_START_HANDLE};
use crate::event::{BleEvent, GattcEvent, GattcParams};
use crate::gatt::{Characteristic, Descriptor, DiscoveredService, HandleRange};
use crate::queue::{GattQueue, GattRequest, QueueError, RequestEvent, RequestEventKind};
use crate::transport::{RawError, Transport};
use crate::uuid::Uuid;
use heapless::Vec;

/// Reasons a discovery operation can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryError {
    /// No services registered
    InvalidState,
    /// A discovery is already running
    Busy,
    /// No room for another service of interest
    NoMem,
    /// The request queue refused a request
    Queue(QueueError),
    /// The transport rejected a request
    Transport(RawError),
}

impl From<QueueError> for DiscoveryError {
    fn from(err: QueueError) -> Self {
        Self::Queue(err)
    }
}

impl From<RawError> for DiscoveryError {
    fn from(err: RawError) -> Self {
        Self::Transport(err)
    }
}

/// Events delivered to the application
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryEvent {
    /// The session is free to discover another connection
    Available {
        /// Connection of the finished session
        conn_handle: u16,
    },
    /// A service of interest was found and walked
    Complete {
        /// Connection the service was found on
        conn_handle: u16,
        /// The discovered service
        service: ServiceRecord,
    },
    /// A service of interest is not present on the peer
    ServiceNotFound {
        /// Connection that was searched
        conn_handle: u16,
        /// Record of the missing service, without characteristics
        service: ServiceRecord,
    },
    /// Discovery was aborted
    Error {
        /// Connection being discovered
        conn_handle: u16,
        /// What went wrong
        reason: DiscoveryError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    PrimaryService,
    Characteristics,
    Descriptors,
}

/// A discovery session
///
/// One session discovers one connection at a time; run several sessions with
/// distinct owner tags to discover connections in parallel.
#[derive(Debug)]
pub struct DbDiscovery<O> {
    owner: O,
    srv_disc_start_handle: u16,
    registered: Vec<Uuid, MAX_SERVICES>,
    /// One record per registered service reached in the current run
    services: Vec<ServiceRecord, MAX_SERVICES>,
    pending: Vec<DiscoveryEvent, MAX_SERVICES>,
    conn_handle: u16,
    phase: Phase,
    curr_srv_ind: usize,
    curr_char_ind: usize,
    discoveries_count: usize,
}

impl<O: Copy + PartialEq> DbDiscovery<O> {
    /// Create a session whose queue requests are tagged with `owner`
    #[must_use]
    pub const fn new(owner: O) -> Self {
        Self::with_start_handle(owner, SRV_DISC_START_HANDLE)
    }

    /// Create a session that searches for primary services from `srv_disc_start_handle`
    #[must_use]
    pub const fn with_start_handle(owner: O, srv_disc_start_handle: u16) -> Self {
        Self {
            owner,
            srv_disc_start_handle,
            registered: Vec::new(),
            services: Vec::new(),
            pending: Vec::new(),
            conn_handle: CONN_HANDLE_INVALID,
            phase: Phase::Idle,
            curr_srv_ind: 0,
            curr_char_ind: 0,
            discoveries_count: 0,
        }
    }

    /// Drop all registrations and results
    pub fn reset(&mut self) {
        *self = Self::with_start_handle(self.owner, self.srv_disc_start_handle);
    }

    /// Add a service to look for
    ///
    /// Registering the same UUID twice has no effect.
    ///
    /// # Errors
    /// Returns [`DiscoveryError::Busy`] while a discovery is running, or
    /// [`DiscoveryError::NoMem`] if [`MAX_SERVICES`] services are registered
    pub fn register_service(&mut self, uuid: Uuid) -> Result<(), DiscoveryError> {
        if self.is_in_progress() {
            return Err(DiscoveryError::Busy);
        }
        if self.is_registered(&uuid) {
            return Ok(());
        }
        self.registered
            .push(uuid)
            .map_err(|_| DiscoveryError::NoMem)?;
        debug!("[DB] registered service {:?}", uuid);
        Ok(())
    }

    /// A discovery is running
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Connection of the current or last run, [`CONN_HANDLE_INVALID`] after a disconnect
    #[must_use]
    pub const fn conn_handle(&self) -> u16 {
        self.conn_handle
    }

    /// Records of the services reached in the current or last run
    #[must_use]
    pub fn services(&self) -> &[ServiceRecord] {
        &self.services
    }

    /// Services of interest, in registration order
    #[must_use]
    pub fn registered_services(&self) -> &[Uuid] {
        &self.registered
    }

    fn is_registered(&self, uuid: &Uuid) -> bool {
        self.registered.iter().any(|known| known.matches(uuid))
    }

    /// Start discovering `conn_handle`
    ///
    /// The connection is registered with `queue`. A transport error on the first
    /// request is reported through `handler` and the call still succeeds.
    ///
    /// # Errors
    /// Returns [`DiscoveryError::InvalidState`] with no services registered,
    /// [`DiscoveryError::Busy`] while a discovery is running, or
    /// [`DiscoveryError::Queue`] if the queue refuses the connection or the request
    pub fn start<T: Transport + ?Sized>(
        &mut self,
        queue: &mut GattQueue<O>,
        transport: &mut T,
        conn_handle: u16,
        handler: &mut impl FnMut(&DiscoveryEvent),
    ) -> Result<(), DiscoveryError> {
        if self.registered.is_empty() {
            return Err(DiscoveryError::InvalidState);
        }
        if self.is_in_progress() {
            return Err(DiscoveryError::Busy);
        }
        queue.register(conn_handle)?;

        self.services.clear();
        self.pending.clear();
        self.curr_srv_ind = 0;
        self.curr_char_ind = 0;
        self.discoveries_count = 0;
        self.conn_handle = conn_handle;
        info!("[DB] starting discovery on {:#x}", conn_handle);

        match self.discover_service(queue, transport) {
            Ok(()) => Ok(()),
            Err(DiscoveryError::Queue(err)) => {
                self.phase = Phase::Idle;
                self.conn_handle = CONN_HANDLE_INVALID;
                Err(err.into())
            }
            Err(reason) => {
                self.fail(reason, handler);
                Ok(())
            }
        }
    }

    /// Feed a stack event to the session
    ///
    /// Only discovery responses for the session's connection that match the
    /// step in progress are acted on.
    pub fn on_ble_evt<T: Transport + ?Sized>(
        &mut self,
        queue: &mut GattQueue<O>,
        transport: &mut T,
        evt: &BleEvent,
        handler: &mut impl FnMut(&DiscoveryEvent),
    ) {
        match evt {
            BleEvent::Disconnected { conn_handle, .. } if *conn_handle == self.conn_handle => {
                if self.is_in_progress() {
                    info!("[DB] {:#x} disconnected, discovery abandoned", conn_handle);
                }
                self.phase = Phase::Idle;
                self.conn_handle = CONN_HANDLE_INVALID;
            }
            BleEvent::Gattc(gattc) if gattc.conn_handle == self.conn_handle => {
                match (&gattc.params, self.phase) {
                    (
                        GattcParams::PrimaryServiceDiscoveryResponse(services),
                        Phase::PrimaryService,
                    ) => {
                        self.on_primary_service_rsp(queue, transport, gattc, services, handler);
                    }
                    (
                        GattcParams::CharacteristicDiscoveryResponse(chars),
                        Phase::Characteristics,
                    ) => {
                        self.on_characteristic_rsp(queue, transport, gattc, chars, handler);
                    }
                    (GattcParams::DescriptorDiscoveryResponse(descs), Phase::Descriptors) => {
                        self.on_descriptor_rsp(queue, transport, gattc, descs, handler);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    /// Handle the queue's completion event for a request of this session
    ///
    /// A transport error aborts the run.
    pub fn on_request_event(
        &mut self,
        evt: &RequestEvent<O>,
        handler: &mut impl FnMut(&DiscoveryEvent),
    ) {
        if evt.owner != self.owner || evt.conn_handle != self.conn_handle || !self.is_in_progress()
        {
            return;
        }
        if let RequestEventKind::Error(err) = evt.kind {
            self.fail(err.into(), handler);
        }
    }

    fn on_primary_service_rsp<T: Transport + ?Sized>(
        &mut self,
        queue: &mut GattQueue<O>,
        transport: &mut T,
        evt: &GattcEvent,
        found: &[DiscoveredService],
        handler: &mut impl FnMut(&DiscoveryEvent),
    ) {
        let instance = if evt.gatt_status.is_success() {
            found.first()
        } else {
            None
        };
        let Some(instance) = instance else {
            debug!("[DB] service not found on {:#x}", self.conn_handle);
            self.conclude_service(false, queue, transport, handler);
            return;
        };
        if found.len() > 1 {
            warn!(
                "[DB] {} instances of the service found, using the first",
                found.len()
            );
        }
        let Some(service) = self.services.get_mut(self.curr_srv_ind) else {
            return;
        };
        debug!(
            "[DB] found {:?} at {:#x}..{:#x}",
            service.uuid,
            instance.handle_range.start_handle,
            instance.handle_range.end_handle
        );
        service.handle_range = instance.handle_range;
        let range = instance.handle_range;

        self.phase = Phase::Characteristics;
        self.curr_char_ind = 0;
        self.request(
            queue,
            transport,
            GattRequest::CharacteristicDiscovery(range),
            handler,
        );
    }

    fn on_characteristic_rsp<T: Transport + ?Sized>(
        &mut self,
        queue: &mut GattQueue<O>,
        transport: &mut T,
        evt: &GattcEvent,
        chars: &[Characteristic],
        handler: &mut impl FnMut(&DiscoveryEvent),
    ) {
        let Some(service) = self.services.get_mut(self.curr_srv_ind) else {
            return;
        };

        if evt.gatt_status.is_success() && !chars.is_empty() {
            for characteristic in chars {
                if service
                    .characteristics
                    .push(CharacteristicRecord::new(*characteristic))
                    .is_err()
                {
                    warn!(
                        "[DB] no room for more characteristics of {:?}, increase MAX_CHARACTERISTICS",
                        service.uuid
                    );
                    break;
                }
            }

            let next_page = match service.characteristics.last() {
                Some(last) if !service.characteristics.is_full() => {
                    let after = last.characteristic.handle_value;
                    (after < service.handle_range.end_handle)
                        .then(|| HandleRange::new(after + 1, service.handle_range.end_handle))
                }
                _ => None,
            };
            if let Some(range) = next_page {
                trace!("[DB] more characteristics may follow {:#x}", range.start_handle);
                self.curr_char_ind = service.characteristics.len();
                self.request(
                    queue,
                    transport,
                    GattRequest::CharacteristicDiscovery(range),
                    handler,
                );
                return;
            }
        }

        self.curr_char_ind = 0;
        self.discover_descriptors(queue, transport, handler);
    }

    fn on_descriptor_rsp<T: Transport + ?Sized>(
        &mut self,
        queue: &mut GattQueue<O>,
        transport: &mut T,
        evt: &GattcEvent,
        descs: &[Descriptor],
        handler: &mut impl FnMut(&DiscoveryEvent),
    ) {
        let Some(service) = self.services.get_mut(self.curr_srv_ind) else {
            return;
        };
        let char_count = service.characteristics.len();

        if evt.gatt_status.is_success() {
            if let Some(record) = service.characteristics.get_mut(self.curr_char_ind) {
                for desc in descs {
                    record.record_descriptor(desc);
                    if record.has_all_descriptors() {
                        break;
                    }
                }
            }
        }

        if self.curr_char_ind + 1 >= char_count {
            self.conclude_service(true, queue, transport, handler);
        } else {
            self.curr_char_ind += 1;
            self.discover_descriptors(queue, transport, handler);
        }
    }

    /// Request descriptors for the first characteristic from `curr_char_ind` that
    /// has room for any, or conclude the service if none has
    fn discover_descriptors<T: Transport + ?Sized>(
        &mut self,
        queue: &mut GattQueue<O>,
        transport: &mut T,
        handler: &mut impl FnMut(&DiscoveryEvent),
    ) {
        self.phase = Phase::Descriptors;

        let mut range = None;
        if let Some(service) = self.services.get(self.curr_srv_ind) {
            while self.curr_char_ind < service.characteristics.len() {
                range = service.descriptor_range(self.curr_char_ind);
                if range.is_some() {
                    break;
                }
                self.curr_char_ind += 1;
            }
        }

        match range {
            Some(range) => self.request(
                queue,
                transport,
                GattRequest::DescriptorDiscovery(range),
                handler,
            ),
            None => self.conclude_service(true, queue, transport, handler),
        }
    }

    /// Stage the result of the current service and move on to the next one
    fn conclude_service<T: Transport + ?Sized>(
        &mut self,
        found: bool,
        queue: &mut GattQueue<O>,
        transport: &mut T,
        handler: &mut impl FnMut(&DiscoveryEvent),
    ) {
        if let Some(service) = self.services.get(self.curr_srv_ind) {
            if self.is_registered(&service.uuid) {
                let conn_handle = self.conn_handle;
                let service = service.clone();
                let event = if found {
                    debug!(
                        "[DB] {:?} discovered with {} characteristics",
                        service.uuid,
                        service.characteristics.len()
                    );
                    DiscoveryEvent::Complete {
                        conn_handle,
                        service,
                    }
                } else {
                    DiscoveryEvent::ServiceNotFound {
                        conn_handle,
                        service,
                    }
                };
                if self.pending.push(event).is_err() {
                    warn!("[DB] pending event list full");
                }
            }
        }
        self.discoveries_count += 1;

        if self.discoveries_count < self.registered.len() {
            self.curr_srv_ind += 1;
            self.curr_char_ind = 0;
            if let Err(reason) = self.discover_service(queue, transport) {
                self.fail(reason, handler);
            }
            return;
        }

        self.phase = Phase::Idle;
        info!("[DB] discovery finished on {:#x}", self.conn_handle);
        if self.pending.len() == self.registered.len() {
            for event in &self.pending {
                handler(event);
            }
        }
        self.pending.clear();
        handler(&DiscoveryEvent::Available {
            conn_handle: self.conn_handle,
        });
    }

    /// Begin primary service discovery for the registered service at `curr_srv_ind`
    fn discover_service<T: Transport + ?Sized>(
        &mut self,
        queue: &mut GattQueue<O>,
        transport: &mut T,
    ) -> Result<(), DiscoveryError> {
        let uuid = *self
            .registered
            .get(self.curr_srv_ind)
            .ok_or(DiscoveryError::InvalidState)?;
        self.services.truncate(self.curr_srv_ind);
        self.services
            .push(ServiceRecord::new(uuid))
            .map_err(|_| DiscoveryError::NoMem)?;
        self.phase = Phase::PrimaryService;
        debug!(
            "[DB] discovering service {:?} on {:#x}",
            uuid, self.conn_handle
        );
        self.enqueue(
            queue,
            transport,
            GattRequest::ServiceDiscovery {
                start_handle: self.srv_disc_start_handle,
                uuid,
            },
        )
    }

    /// Enqueue a request, aborting the run if it fails
    fn request<T: Transport + ?Sized>(
        &mut self,
        queue: &mut GattQueue<O>,
        transport: &mut T,
        request: GattRequest,
        handler: &mut impl FnMut(&DiscoveryEvent),
    ) {
        if let Err(reason) = self.enqueue(queue, transport, request) {
            self.fail(reason, handler);
        }
    }

    /// Enqueue a request, folding an immediate dispatch failure into the result
    fn enqueue<T: Transport + ?Sized>(
        &self,
        queue: &mut GattQueue<O>,
        transport: &mut T,
        request: GattRequest,
    ) -> Result<(), DiscoveryError> {
        let mut rejected = None;
        queue.enqueue(
            transport,
            self.conn_handle,
            request,
            self.owner,
            &mut |evt: RequestEvent<O>| {
                if let RequestEventKind::Error(err) = evt.kind {
                    rejected = Some(err);
                }
            },
        )?;
        rejected.map_or(Ok(()), |err| Err(err.into()))
    }

    fn fail(&mut self, reason: DiscoveryError, handler: &mut impl FnMut(&DiscoveryEvent)) {
        error!(
            "[DB] discovery on {:#x} failed: {:?}",
            self.conn_handle, reason
        );
        self.phase = Phase::Idle;
        self.pending.clear();

        let conn_handle = self.conn_handle;
        let current = self
            .services
            .get(self.curr_srv_ind)
            .map(|service| service.uuid);
        if current.is_some_and(|uuid| self.is_registered(&uuid)) {
            handler(&DiscoveryEvent::Error {
                conn_handle,
                reason,
            });
        }
        handler(&DiscoveryEvent::Available { conn_handle });
    }
}
