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

//! GHL protocol constants and transaction fields

use std::fmt;
use std::time::Duration;

/// Start of text - first byte of every frame
pub const STX: u8 = 0x02;

/// End of text - last byte of every frame
pub const ETX: u8 = 0x03;

/// Filler appended to the payload before the check digit is folded
pub const CHECK_DIGIT_PAD: u8 = 0xFF;

/// Length of the XOR check digit
pub const CHECK_DIGIT_LEN: usize = 8;

/// Width of the command code field
pub const COMMAND_LEN: usize = 3;

/// Width of the amount field (cents, zero padded)
pub const AMOUNT_LEN: usize = 12;

/// Width of the invoice field (zero padded)
pub const INVOICE_LEN: usize = 6;

/// Width of the cashier field (space padded on the left)
pub const CASHIER_LEN: usize = 4;

/// Length of a request payload
pub const REQUEST_PAYLOAD_LEN: usize = COMMAND_LEN + AMOUNT_LEN + INVOICE_LEN + CASHIER_LEN;

/// Largest amount, in cents, that fits the amount field
pub const MAX_AMOUNT_CENTS: i64 = 999_999_999_999;

/// Largest invoice number that fits the invoice field
pub const MAX_INVOICE: u32 = 999_999;

/// Standard GHL line speed
pub const BAUD_RATE: u32 = 9600;

/// Per-read timeout while waiting for a response byte
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Overall deadline for one exchange
pub const EXCHANGE_DEADLINE: Duration = Duration::from_secs(60);

/// Pause between closing and reopening a port so the OS releases the handle
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

// ============================================================================
// Commands
// ============================================================================

/// Transactions the POS can request from the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Sale,
    Void,
    Settlement,
    Refund,
}

impl Command {
    pub const ALL: [Command; 4] = [Command::Sale, Command::Void, Command::Settlement, Command::Refund];

    /// Request code sent by the POS
    pub fn code(self) -> &'static str {
        match self {
            Command::Sale => "020",
            Command::Void => "022",
            Command::Settlement => "050",
            Command::Refund => "026",
        }
    }

    /// Code the terminal answers with
    pub fn response_code(self) -> &'static str {
        match self {
            Command::Sale => "021",
            Command::Void => "023",
            Command::Settlement => "051",
            Command::Refund => "027",
        }
    }

    pub fn from_code(code: &str) -> Option<Command> {
        Command::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn from_response_code(code: &str) -> Option<Command> {
        Command::ALL.into_iter().find(|c| c.response_code() == code)
    }

    /// The terminal ignores the amount for these commands and expects zeros
    pub fn requires_zero_amount(self) -> bool {
        matches!(self, Command::Void | Command::Settlement)
    }

    /// The terminal assigns its own invoice for these commands
    pub fn requires_zero_invoice(self) -> bool {
        matches!(self, Command::Sale | Command::Settlement)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Sale => "SALE",
            Command::Void => "VOID",
            Command::Settlement => "SETTLEMENT",
            Command::Refund => "REFUND",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Transaction Request
// ============================================================================

/// Fields of one outbound transaction, before encoding
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    pub command: Command,
    /// Amount in currency units with two implied decimals
    pub amount: f64,
    pub invoice: u32,
    pub cashier: String,
}

impl TransactionRequest {
    pub fn new(command: Command, amount: f64, invoice: u32, cashier: impl Into<String>) -> Self {
        TransactionRequest {
            command,
            amount,
            invoice,
            cashier: cashier.into(),
        }
    }

    /// Zero the fields the command's protocol rules forbid.
    ///
    /// Callers apply this before handing the fields to the codec; the codec
    /// encodes whatever it is given.
    pub fn normalized(mut self) -> Self {
        if self.command.requires_zero_amount() {
            self.amount = 0.0;
        }
        if self.command.requires_zero_invoice() {
            self.invoice = 0;
        }
        self
    }
}
