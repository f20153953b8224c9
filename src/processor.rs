//! Processor Task - stack event and API command processing
//!
//! The processor owns a [`GattClient`] and serves two channels: stack events
//! pushed by the radio driver, and commands sent by the functions in
//! [`crate::api`]. Each message is handled to completion before the next one is
//! received, so the client never sees concurrent access.
//!
//! # Usage
//!
//! ```rust,ignore
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use gattwalk::{GattClient, GattClientOptions, processor::GattClientChannels};
//! use gattwalk::constants::CHANNEL_DEPTH;
//!
//! static CHANNELS: GattClientChannels<CriticalSectionRawMutex, CHANNEL_DEPTH> =
//!     GattClientChannels::new();
//!
//! #[embassy_executor::task]
//! async fn gatt_task(transport: SoftdeviceTransport, handler: AppHandler) -> ! {
//!     let client = GattClient::new(transport, handler, GattClientOptions::default());
//!     gattwalk::processor::run(client, &CHANNELS).await
//! }
//!
//! // From the stack event handler:
//! CHANNELS.events.try_send(event).ok();
//!
//! // From application code:
//! gattwalk::api::start_discovery(&CHANNELS, conn_handle).await?;
//! ```

use crate::client::{ClientError, ClientHandler, GattClient};
use crate::event::BleEvent;
use crate::queue::GattRequest;
use crate::transport::Transport;
use crate::uuid::Uuid;
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;

/// Commands accepted by the processor
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Register a connection with the request queue
    RegisterConnection(u16),
    /// Add a service of interest
    RegisterService(Uuid),
    /// Start discovery on a connection
    StartDiscovery(u16),
    /// Submit an application request
    Enqueue {
        /// Connection to issue the request on
        conn_handle: u16,
        /// The request
        request: GattRequest,
        /// Token reported back with the request's outcome
        token: u16,
    },
}

/// Response to a [`Command`]
pub type Response = Result<(), ClientError>;

/// Channels connecting the processor to the stack and to application tasks
pub struct GattClientChannels<M: RawMutex, const N: usize> {
    /// Stack events, fed by the radio driver
    pub events: Channel<M, BleEvent, N>,
    /// API commands
    pub commands: Channel<M, Command, N>,
    /// API responses, one per command
    pub responses: Channel<M, Response, N>,
}

impl<M: RawMutex, const N: usize> GattClientChannels<M, N> {
    /// Create empty channels
    #[must_use]
    pub const fn new() -> Self {
        Self {
            events: Channel::new(),
            commands: Channel::new(),
            responses: Channel::new(),
        }
    }
}

impl<M: RawMutex, const N: usize> Default for GattClientChannels<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute one command against the client
fn execute<T: Transport, H: ClientHandler>(
    client: &mut GattClient<T, H>,
    command: Command,
) -> Response {
    match command {
        Command::RegisterConnection(conn_handle) => client.register_connection(conn_handle),
        Command::RegisterService(uuid) => client.register_service(uuid),
        Command::StartDiscovery(conn_handle) => client.start_discovery(conn_handle),
        Command::Enqueue {
            conn_handle,
            request,
            token,
        } => client.enqueue(conn_handle, request, token),
    }
}

/// Wait for one stack event or command and process it
///
/// A response that does not fit in the response channel is dropped with a
/// warning, so unread responses never stall event processing.
pub async fn process_next<T: Transport, H: ClientHandler, M: RawMutex, const N: usize>(
    client: &mut GattClient<T, H>,
    channels: &GattClientChannels<M, N>,
) {
    match select(channels.events.receive(), channels.commands.receive()).await {
        Either::First(event) => {
            trace!("[PROCESSOR] stack event: {:?}", event);
            client.on_ble_evt(&event);
        }
        Either::Second(command) => {
            debug!("[PROCESSOR] command: {:?}", command);
            let response = execute(client, command);
            debug!("[PROCESSOR] response: {:?}", response);
            // Never wait on callers; stack events must keep flowing
            if channels.responses.try_send(response).is_err() {
                warn!("[PROCESSOR] response channel full, response dropped");
            }
        }
    }
}

/// Run the processor forever
pub async fn run<T: Transport, H: ClientHandler, M: RawMutex, const N: usize>(
    mut client: GattClient<T, H>,
    channels: &GattClientChannels<M, N>,
) -> ! {
    info!("[PROCESSOR] started");
    loop {
        process_next(&mut client, channels).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GattClientOptions;
    use crate::client::tests::Recorder;
    use crate::constants::CHANNEL_DEPTH;
    use crate::discovery::DiscoveryEvent;
    use crate::mock::{Call, MockTransport};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type Channels = GattClientChannels<CriticalSectionRawMutex, CHANNEL_DEPTH>;

    fn client() -> GattClient<MockTransport, Recorder> {
        GattClient::new(
            MockTransport::new(),
            Recorder::default(),
            GattClientOptions::default(),
        )
    }

    #[test]
    fn test_command_gets_response() {
        let channels = Channels::new();
        let mut client = client();

        channels
            .commands
            .try_send(Command::RegisterService(Uuid::new_16(0x180F)))
            .unwrap();
        block_on(process_next(&mut client, &channels));

        assert_eq!(channels.responses.try_receive(), Ok(Ok(())));
        assert_eq!(
            client.discovery().registered_services(),
            [Uuid::new_16(0x180F)]
        );
    }

    #[test]
    fn test_stack_event_reaches_client() {
        let channels = Channels::new();
        let mut client = client();
        client.register_service(Uuid::new_16(0x180F)).unwrap();
        client.start_discovery(4).unwrap();

        channels
            .events
            .try_send(BleEvent::primary_services(4, &[]))
            .unwrap();
        block_on(process_next(&mut client, &channels));

        assert!(channels.responses.try_receive().is_err());
        assert_eq!(client.handler().discovery.len(), 2);
        assert!(matches!(
            client.handler().discovery[0],
            DiscoveryEvent::ServiceNotFound { conn_handle: 4, .. }
        ));
        assert_eq!(
            client.transport().last_call(),
            Some(&Call::PrimaryServices {
                conn_handle: 4,
                start_handle: 0x0001,
                uuid: Uuid::new_16(0x180F)
            })
        );
    }

    #[test]
    fn test_full_response_channel_does_not_stall_events() {
        let channels = Channels::new();
        let mut client = client();
        let battery = Uuid::new_16(0x180F);

        // Responses nobody reads
        for _ in 0..CHANNEL_DEPTH {
            channels
                .commands
                .try_send(Command::RegisterService(battery))
                .unwrap();
            block_on(process_next(&mut client, &channels));
        }
        channels
            .commands
            .try_send(Command::StartDiscovery(4))
            .unwrap();
        block_on(process_next(&mut client, &channels));
        assert!(client.discovery().is_in_progress());

        channels
            .events
            .try_send(BleEvent::primary_services(4, &[]))
            .unwrap();
        block_on(process_next(&mut client, &channels));

        assert_eq!(client.handler().discovery.len(), 2);
        assert!(!client.discovery().is_in_progress());
        for _ in 0..CHANNEL_DEPTH {
            assert_eq!(channels.responses.try_receive(), Ok(Ok(())));
        }
        assert!(channels.responses.try_receive().is_err());
    }
}
