//! `GattWalk` API Functions
//!
//! Async functions for application tasks. Each one sends a [`Command`] to the
//! processor task serving `channels` and waits for its response, so they must
//! not be called from the processor task itself.
//!
//! Responses are matched to commands by order; keep one caller per channel set,
//! or serialize callers, so a response is never taken by the wrong task. The
//! processor drops a response when the response channel is full, so a cancelled
//! call can leave a stale response behind but never blocks the processor.
//!
//! # Usage
//!
//! ```rust,ignore
//! use gattwalk::api;
//! use gattwalk::uuid::Uuid;
//!
//! api::register_service(&CHANNELS, Uuid::new_16(0x180F)).await?;
//! api::start_discovery(&CHANNELS, conn_handle).await?;
//! ```

use crate::client::ClientError;
use crate::event::BleEvent;
use crate::processor::{Command, GattClientChannels};
use crate::queue::GattRequest;
use crate::uuid::Uuid;
use embassy_sync::blocking_mutex::raw::RawMutex;

async fn request<M: RawMutex, const N: usize>(
    channels: &GattClientChannels<M, N>,
    command: Command,
) -> Result<(), ClientError> {
    channels.commands.send(command).await;
    channels.responses.receive().await
}

/// Register a connection with the request queue.
///
/// # Errors
///
/// Returns an error if the queue already tracks the maximum number of connections.
pub async fn register_connection<M: RawMutex, const N: usize>(
    channels: &GattClientChannels<M, N>,
    conn_handle: u16,
) -> Result<(), ClientError> {
    request(channels, Command::RegisterConnection(conn_handle)).await
}

/// Add a service of interest for discovery.
///
/// # Errors
///
/// Returns an error if discovery is running or the service list is full.
pub async fn register_service<M: RawMutex, const N: usize>(
    channels: &GattClientChannels<M, N>,
    uuid: Uuid,
) -> Result<(), ClientError> {
    request(channels, Command::RegisterService(uuid)).await
}

/// Start discovering the registered services on a connection.
///
/// Results arrive through the client's handler.
///
/// # Errors
///
/// Returns an error if no services are registered, a discovery is already running,
/// or the connection cannot be registered with the queue.
pub async fn start_discovery<M: RawMutex, const N: usize>(
    channels: &GattClientChannels<M, N>,
    conn_handle: u16,
) -> Result<(), ClientError> {
    request(channels, Command::StartDiscovery(conn_handle)).await
}

/// Submit a GATT request on a connection.
///
/// # Errors
///
/// Returns an error if the connection is not registered or its queue is full.
pub async fn enqueue<M: RawMutex, const N: usize>(
    channels: &GattClientChannels<M, N>,
    conn_handle: u16,
    request: GattRequest,
    token: u16,
) -> Result<(), ClientError> {
    self::request(
        channels,
        Command::Enqueue {
            conn_handle,
            request,
            token,
        },
    )
    .await
}

/// Hand a stack event to the processor.
pub async fn submit_event<M: RawMutex, const N: usize>(
    channels: &GattClientChannels<M, N>,
    event: BleEvent,
) {
    channels.events.send(event).await;
}
