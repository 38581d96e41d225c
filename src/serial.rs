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

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use serialport::{SerialPort as SerialPortTrait, SerialPortType, DataBits, Parity, StopBits, FlowControl};
use tracing::debug;
use crate::protocol::{BAUD_RATE, READ_TIMEOUT};

// ============================================================================
// Transport Traits
// ============================================================================

/// Byte-level operations the exchange engine needs from an open link
pub trait Transport: Send {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    /// Read a single byte, or `None` if nothing arrived within `timeout`
    fn read_byte(&mut self, timeout: Duration) -> std::io::Result<Option<u8>>;

    fn close(self: Box<Self>) -> std::io::Result<()>;
}

/// Opens transports by port name
pub trait PortOpener: Send {
    fn open(&mut self, port_name: &str, settings: &PortSettings) -> Result<Box<dyn Transport>, String>;
}

/// Line settings for the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub read_timeout: Duration,
}

impl Default for PortSettings {
    /// 9600 8N1 with a 500 ms read timeout
    fn default() -> Self {
        PortSettings {
            baud_rate: BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout: READ_TIMEOUT,
        }
    }
}

// ============================================================================
// Real Serial Port Implementation
// ============================================================================

/// Real serial port implementation that wraps the serialport crate
pub struct RealSerialPort {
    port: Box<dyn SerialPortTrait>,
    timeout: Duration,
}

impl RealSerialPort {
    pub fn open(port_name: &str, settings: &PortSettings) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, settings.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout)
            .open()?;

        Ok(RealSerialPort { port, timeout: settings.read_timeout })
    }
}

impl Transport for RealSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.port.write_all(buf)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> std::io::Result<Option<u8>> {
        if timeout != self.timeout {
            self.port.set_timeout(timeout)
                .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
            self.timeout = timeout;
        }

        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn close(self: Box<Self>) -> std::io::Result<()> {
        self.port.clear(serialport::ClearBuffer::All)
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
        // Dropping the handle releases the device
        Ok(())
    }
}

/// Opens real serial devices
#[derive(Debug, Default)]
pub struct SerialOpener;

impl PortOpener for SerialOpener {
    fn open(&mut self, port_name: &str, settings: &PortSettings) -> Result<Box<dyn Transport>, String> {
        debug!(port = port_name, ?settings, "opening serial port");
        RealSerialPort::open(port_name, settings)
            .map(|port| Box::new(port) as Box<dyn Transport>)
            .map_err(|e| e.to_string())
    }
}

// ============================================================================
// Port Discovery
// ============================================================================

/// A serial device the operator can pick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    /// USB product string, when the device reports one
    pub product: Option<String>,
}

pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(|info| {
            let product = match info.port_type {
                SerialPortType::UsbPort(usb) => usb.product,
                _ => None,
            };
            PortInfo { name: info.port_name, product }
        })
        .collect();

    ports.sort_by(|a, b| a.name.cmp(&b.name));
    ports
}

// ============================================================================
// Mock Serial Port for Testing
// ============================================================================

#[cfg(test)]
pub struct MockTransport {
    // Data to return on reads (None = timeout)
    read_buffer: Vec<Option<u8>>,
    read_pos: usize,
    // Track what was written
    write_log: Vec<u8>,
    // Expected writes for verification
    expected_writes: Vec<u8>,
    fail_writes: bool,
    fail_reads_after: Option<usize>,
    fail_close: bool,
    closed: Option<std::sync::Arc<std::sync::atomic::AtomicBool>>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new(responses: Vec<Option<u8>>, expected_writes: Vec<u8>) -> Self {
        MockTransport {
            read_buffer: responses,
            read_pos: 0,
            write_log: Vec::new(),
            expected_writes,
            fail_writes: false,
            fail_reads_after: None,
            fail_close: false,
            closed: None,
        }
    }

    /// Every scripted byte followed by nothing but timeouts
    pub fn replying(frame: &[u8], expected_writes: Vec<u8>) -> Self {
        MockTransport::new(frame.iter().copied().map(Some).collect(), expected_writes)
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self.expected_writes.clear();
        self
    }

    /// Return an I/O error once `reads` reads have been served
    pub fn failing_reads_after(mut self, reads: usize) -> Self {
        self.fail_reads_after = Some(reads);
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn tracking_close(mut self, flag: std::sync::Arc<std::sync::atomic::AtomicBool>) -> Self {
        self.closed = Some(flag);
        self
    }
}

#[cfg(test)]
impl Transport for MockTransport {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        if self.fail_writes {
            return Err(std::io::Error::new(ErrorKind::BrokenPipe, "Mock write failure"));
        }
        self.write_log.extend_from_slice(buf);
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> std::io::Result<Option<u8>> {
        if self.fail_reads_after == Some(self.read_pos) {
            return Err(std::io::Error::new(ErrorKind::Other, "Mock read failure"));
        }

        // Out of responses = timeout
        if self.read_pos >= self.read_buffer.len() {
            std::thread::sleep(timeout);
            return Ok(None);
        }

        let response = self.read_buffer[self.read_pos];
        self.read_pos += 1;
        if response.is_none() {
            std::thread::sleep(timeout);
        }
        Ok(response)
    }

    fn close(self: Box<Self>) -> std::io::Result<()> {
        if let Some(flag) = &self.closed {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        }
        if self.fail_close {
            return Err(std::io::Error::new(ErrorKind::Other, "Mock close failure"));
        }
        Ok(())
    }
}

#[cfg(test)]
impl Drop for MockTransport {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        if self.fail_reads_after.is_none() {
            assert_eq!(
                self.read_pos,
                self.read_buffer.len(),
                "MockTransport dropped with {} unconsumed responses (read {} of {} bytes)",
                self.read_buffer.len() - self.read_pos,
                self.read_pos,
                self.read_buffer.len()
            );
        }

        assert_eq!(
            &self.write_log,
            &self.expected_writes,
            "MockTransport write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );
    }
}

/// Hands out scripted transports in order and counts open attempts
#[cfg(test)]
pub struct MockOpener {
    transports: std::collections::VecDeque<Result<MockTransport, String>>,
    pub opened: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

#[cfg(test)]
impl MockOpener {
    pub fn new(transports: Vec<Result<MockTransport, String>>) -> Self {
        MockOpener {
            transports: transports.into(),
            opened: Default::default(),
        }
    }
}

#[cfg(test)]
impl PortOpener for MockOpener {
    fn open(&mut self, port_name: &str, _settings: &PortSettings) -> Result<Box<dyn Transport>, String> {
        self.opened.lock().unwrap().push(port_name.to_string());
        match self.transports.pop_front() {
            Some(Ok(transport)) => Ok(Box::new(transport)),
            Some(Err(message)) => Err(message),
            None => Err(format!("No such port: {}", port_name)),
        }
    }
}
