//! Recording transport for unit tests

use crate::gatt::HandleRange;
use crate::transport::{HvxParams, RawError, Transport, WriteParams};
use crate::uuid::Uuid;
use std::collections::VecDeque;
use std::vec::Vec;

/// One transport primitive invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Read {
        conn_handle: u16,
        handle: u16,
        offset: u16,
    },
    Write {
        conn_handle: u16,
        handle: u16,
    },
    PrimaryServices {
        conn_handle: u16,
        start_handle: u16,
        uuid: Uuid,
    },
    Characteristics {
        conn_handle: u16,
        range: HandleRange,
    },
    Descriptors {
        conn_handle: u16,
        range: HandleRange,
    },
    Hvx {
        conn_handle: u16,
        handle: u16,
    },
}

/// Accepts every call unless a scripted result is queued
#[derive(Debug, Default)]
pub struct MockTransport {
    pub calls: Vec<Call>,
    pub script: VecDeque<Result<(), RawError>>,
    /// Byte count reported by `hvx`, the full length when `None`
    pub hvx_written: Option<u16>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue results for the next calls, in order
    pub fn push_results(&mut self, results: &[Result<(), RawError>]) {
        self.script.extend(results.iter().copied());
    }

    pub fn last_call(&self) -> Option<&Call> {
        self.calls.last()
    }

    fn record(&mut self, call: Call) -> Result<(), RawError> {
        self.calls.push(call);
        self.script.pop_front().unwrap_or(Ok(()))
    }
}

impl Transport for MockTransport {
    fn read(&mut self, conn_handle: u16, handle: u16, offset: u16) -> Result<(), RawError> {
        self.record(Call::Read {
            conn_handle,
            handle,
            offset,
        })
    }

    fn write(&mut self, conn_handle: u16, params: &WriteParams) -> Result<(), RawError> {
        self.record(Call::Write {
            conn_handle,
            handle: params.handle,
        })
    }

    fn primary_services_discover(
        &mut self,
        conn_handle: u16,
        start_handle: u16,
        uuid: &Uuid,
    ) -> Result<(), RawError> {
        self.record(Call::PrimaryServices {
            conn_handle,
            start_handle,
            uuid: *uuid,
        })
    }

    fn characteristics_discover(
        &mut self,
        conn_handle: u16,
        range: HandleRange,
    ) -> Result<(), RawError> {
        self.record(Call::Characteristics { conn_handle, range })
    }

    fn descriptors_discover(
        &mut self,
        conn_handle: u16,
        range: HandleRange,
    ) -> Result<(), RawError> {
        self.record(Call::Descriptors { conn_handle, range })
    }

    fn hvx(&mut self, conn_handle: u16, params: &HvxParams) -> Result<u16, RawError> {
        self.record(Call::Hvx {
            conn_handle,
            handle: params.handle,
        })?;
        Ok(self
            .hvx_written
            .unwrap_or(params.data.len().try_into().unwrap_or(u16::MAX)))
    }
}
