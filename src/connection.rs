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

//! Connection lifecycle
//!
//! Owns the open transport. Connecting always tears down the previous link
//! first; disconnecting never fails.

use std::sync::mpsc::Sender;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use crate::codec::Packet;
use crate::exchange::{self, CancelToken, ExchangeConfig, ExchangeEvent, ExchangeResult};
use crate::protocol::SETTLE_DELAY;
use crate::serial::{PortOpener, PortSettings, Transport};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Message from the transport layer, unchanged
    #[error("{message}")]
    OpenFailed { port: String, message: String },
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected(String),
}

enum Link {
    Disconnected,
    Connected {
        port: String,
        transport: Box<dyn Transport>,
    },
}

pub struct Connection<O: PortOpener> {
    opener: O,
    settings: PortSettings,
    settle_delay: Duration,
    link: Link,
}

impl<O: PortOpener> Connection<O> {
    pub fn new(opener: O, settings: PortSettings) -> Self {
        Connection {
            opener,
            settings,
            settle_delay: SETTLE_DELAY,
            link: Link::Disconnected,
        }
    }

    #[cfg(test)]
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn state(&self) -> ConnectionState {
        match &self.link {
            Link::Disconnected => ConnectionState::Disconnected,
            Link::Connected { port, .. } => ConnectionState::Connected(port.clone()),
        }
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        matches!(self.link, Link::Connected { .. })
    }

    pub fn connect(&mut self, port: &str) -> Result<(), ConnectionError> {
        self.disconnect();
        std::thread::sleep(self.settle_delay);

        match self.opener.open(port, &self.settings) {
            Ok(transport) => {
                info!(port, baud = self.settings.baud_rate, "connected");
                self.link = Link::Connected {
                    port: port.to_string(),
                    transport,
                };
                Ok(())
            }
            Err(message) => {
                warn!(port, %message, "connect failed");
                Err(ConnectionError::OpenFailed {
                    port: port.to_string(),
                    message,
                })
            }
        }
    }

    /// Close the link if one is open. Close errors are logged and dropped.
    pub fn disconnect(&mut self) {
        if let Link::Connected { port, transport } = std::mem::replace(&mut self.link, Link::Disconnected) {
            match transport.close() {
                Ok(()) => info!(%port, "disconnected"),
                Err(e) => warn!(%port, error = %e, "error while closing port ignored"),
            }
        }
    }

    /// Run one exchange over the open link, or report `NotConnected`
    /// without touching any transport.
    pub fn exchange(
        &mut self,
        packet: &Packet,
        cancel: &CancelToken,
        config: &ExchangeConfig,
        events: &Sender<ExchangeEvent>,
    ) -> ExchangeResult {
        match &mut self.link {
            Link::Disconnected => {
                debug!("exchange refused: not connected");
                ExchangeResult::NotConnected
            }
            Link::Connected { transport, .. } => {
                exchange::run(transport.as_mut(), packet, cancel, config, events)
            }
        }
    }
}

impl<O: PortOpener> Drop for Connection<O> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
