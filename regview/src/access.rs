//! Outbound requests to the service that reaches the hardware, e.g., an OpenOCD connection

use std::{cell::RefCell, fmt};

use log::debug;

/// Receiver of read and write requests emitted by the value models
///
/// Requests are fire-and-forget notifications. The implementor decides how and when to perform
/// them, and delivers read results back through [`crate::RegisterModel::set_value`] or
/// [`crate::PeripheralModel::apply_read_result`].
pub trait RegisterAccess {
    /// Request the current value of the register at `address`
    fn request_read(&self, address: u64);
    /// Request `value` to be written into the register at `address`
    fn request_write(&self, address: u64, value: u64);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessRequest {
    Read { address: u64 },
    Write { address: u64, value: u64 },
}

impl fmt::Display for AccessRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { address } => write!(f, "read  {address:#010x}"),
            Self::Write { address, value } => write!(f, "write {address:#010x} <- {value:#010x}"),
        }
    }
}

/// [`RegisterAccess`] that records every request in the order it was received
#[derive(Debug, Default)]
pub struct RequestLog {
    requests: RefCell<Vec<AccessRequest>>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<AccessRequest> {
        self.requests.borrow().clone()
    }

    /// Remove and return the requests received so far
    pub fn take(&self) -> Vec<AccessRequest> {
        self.requests.take()
    }

    fn push(&self, request: AccessRequest) {
        debug!("{request}");
        self.requests.borrow_mut().push(request);
    }
}

impl RegisterAccess for RequestLog {
    fn request_read(&self, address: u64) {
        self.push(AccessRequest::Read { address });
    }

    fn request_write(&self, address: u64, value: u64) {
        self.push(AccessRequest::Write { address, value });
    }
}
