// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! POS-side facade used by the front end.
//!
//! Exchanges run on a worker thread so the caller stays responsive. Connect,
//! disconnect and exchange all take the same lock, so they never interleave;
//! a second exchange started while one is outstanding waits its turn. A
//! worker installs its cancel token only once it holds the port, so a cancel
//! always reaches the exchange that is on the wire.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::debug;
use crate::codec::{self, CodecError, Packet};
use crate::connection::{Connection, ConnectionError, ConnectionState};
use crate::exchange::{CancelToken, ExchangeConfig, ExchangeEvent, ExchangeResult};
use crate::protocol::TransactionRequest;
use crate::serial::PortOpener;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicked exchange leaves the connection itself consistent
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Terminal<O: PortOpener + 'static> {
    connection: Arc<Mutex<Connection<O>>>,
    cancel: Arc<Mutex<CancelToken>>,
    config: ExchangeConfig,
}

/// Cancels whatever exchange its terminal is running, from any thread
#[derive(Clone)]
pub struct CancelHandle(Arc<Mutex<CancelToken>>);

impl CancelHandle {
    pub fn cancel(&self) {
        debug!("cancel requested");
        lock(&self.0).cancel();
    }
}

/// An exchange running in the background
pub struct ExchangeHandle {
    events: Receiver<ExchangeEvent>,
    worker: JoinHandle<ExchangeResult>,
}

impl ExchangeHandle {
    /// Diagnostic stream; iteration ends when the exchange finishes
    pub fn events(&self) -> &Receiver<ExchangeEvent> {
        &self.events
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn wait(self) -> ExchangeResult {
        self.worker.join().unwrap_or_else(|_| {
            ExchangeResult::TransportError("exchange worker panicked".to_string())
        })
    }
}

impl<O: PortOpener + 'static> Terminal<O> {
    pub fn new(connection: Connection<O>) -> Self {
        Terminal {
            connection: Arc::new(Mutex::new(connection)),
            cancel: Arc::new(Mutex::new(CancelToken::new())),
            config: ExchangeConfig::default(),
        }
    }

    #[cfg(test)]
    pub fn with_exchange_config(mut self, config: ExchangeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connect(&self, port: &str) -> Result<(), ConnectionError> {
        lock(&self.connection).connect(port)
    }

    /// Cancels any outstanding exchange, then closes the port
    pub fn disconnect(&self) {
        self.cancel_outstanding_exchange();
        lock(&self.connection).disconnect();
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.connection).state()
    }

    pub fn cancel_outstanding_exchange(&self) {
        self.cancel_handle().cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    pub fn build_packet(&self, request: &TransactionRequest) -> Result<Packet, CodecError> {
        codec::build_request(request)
    }

    /// Start one exchange. Each exchange gets a fresh cancel token once it
    /// owns the port, so a cancel issued earlier has no effect on it.
    pub fn exchange(&self, packet: Packet) -> ExchangeHandle {
        let (tx, rx) = mpsc::channel();
        let connection = Arc::clone(&self.connection);
        let cancel = Arc::clone(&self.cancel);
        let config = self.config;

        let worker = thread::spawn(move || {
            let mut connection = lock(&connection);
            let token = CancelToken::new();
            *lock(&cancel) = token.clone();
            connection.exchange(&packet, &token, &config, &tx)
        });

        ExchangeHandle { events: rx, worker }
    }
}
