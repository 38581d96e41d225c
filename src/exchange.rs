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

//! One transmit-then-receive cycle against an open transport.
//!
//! The packet is written in a single call, then bytes are read one at a time
//! until ETX arrives, the deadline passes, or the cancel token fires. The
//! per-read timeout is the only suspension point, so cancellation is seen at
//! most one poll interval late.

use std::fmt;
use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use crate::codec::{Packet, to_hex};
use crate::protocol::{ETX, EXCHANGE_DEADLINE, READ_TIMEOUT};
use crate::serial::Transport;

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation shared between the operator and one exchange
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Configuration, Events and Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Wall-clock limit from the start of the exchange
    pub deadline: Duration,
    /// Per-read timeout; also bounds cancellation latency
    pub poll_interval: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            deadline: EXCHANGE_DEADLINE,
            poll_interval: READ_TIMEOUT,
        }
    }
}

/// Diagnostic lines produced while an exchange runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// Emitted strictly before the packet is written
    Transmit(Vec<u8>),
    /// Emitted strictly after the terminating ETX is read
    Receive(Vec<u8>),
}

impl fmt::Display for ExchangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeEvent::Transmit(bytes) => write!(f, "TX > {}", to_hex(bytes)),
            ExchangeEvent::Receive(bytes) => write!(f, "RX < {}", to_hex(bytes)),
        }
    }
}

/// Terminal outcome of one exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeResult {
    Response(Vec<u8>),
    Cancelled,
    TimedOut,
    TransportError(String),
    NotConnected,
}

impl ExchangeResult {
    pub fn response(&self) -> Option<&[u8]> {
        match self {
            ExchangeResult::Response(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl fmt::Display for ExchangeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeResult::Response(bytes) => write!(f, "Response received ({} bytes)", bytes.len()),
            ExchangeResult::Cancelled => write!(f, "Cancelled by User"),
            ExchangeResult::TimedOut => write!(f, "Error: Timeout"),
            ExchangeResult::TransportError(message) => write!(f, "Error: {}", message),
            ExchangeResult::NotConnected => write!(f, "Error: Not Connected"),
        }
    }
}

// ============================================================================
// Exchange Loop
// ============================================================================

/// Run a single exchange. Diagnostic events go to `events`; a dropped
/// receiver is not an error.
pub fn run(
    transport: &mut dyn Transport,
    packet: &Packet,
    cancel: &CancelToken,
    config: &ExchangeConfig,
    events: &Sender<ExchangeEvent>,
) -> ExchangeResult {
    let start = Instant::now();

    debug!(packet = %packet, "transmitting");
    let _ = events.send(ExchangeEvent::Transmit(packet.as_bytes().to_vec()));
    if let Err(e) = transport.write_all(packet.as_bytes()) {
        warn!(error = %e, "write failed");
        return ExchangeResult::TransportError(e.to_string());
    }

    let mut buffer = Vec::new();
    loop {
        if cancel.is_cancelled() {
            info!(received = buffer.len(), "exchange cancelled");
            return ExchangeResult::Cancelled;
        }

        let elapsed = start.elapsed();
        if elapsed >= config.deadline {
            info!(received = buffer.len(), "exchange timed out");
            return ExchangeResult::TimedOut;
        }

        let wait = config.poll_interval.min(config.deadline - elapsed);
        match transport.read_byte(wait) {
            Ok(Some(byte)) => {
                buffer.push(byte);
                if byte == ETX {
                    debug!(frame = %to_hex(&buffer), "frame complete");
                    let _ = events.send(ExchangeEvent::Receive(buffer.clone()));
                    return ExchangeResult::Response(buffer);
                }
            }
            Ok(None) => {}
            Err(e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => {
                warn!(error = %e, received = buffer.len(), "read failed");
                return ExchangeResult::TransportError(e.to_string());
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
