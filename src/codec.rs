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

//! Outbound packet construction.
//!
//! A packet is `STX + payload + check digit + ETX`, where the payload is the
//! fixed-width ASCII concatenation of command, amount, invoice and cashier.

use std::fmt;
use thiserror::Error;
use crate::protocol::*;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("amount {0} is not a finite number")]
    AmountNotFinite(f64),

    #[error("amount {0} does not fit in 12 digits of cents")]
    AmountOutOfRange(f64),

    #[error("invoice {0} does not fit in 6 digits")]
    InvoiceOutOfRange(u32),
}

// ============================================================================
// Packet
// ============================================================================

/// A fully framed request, immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet(Vec<u8>);

impl Packet {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The ASCII fields between STX and the check digit
    pub fn payload(&self) -> &[u8] {
        &self.0[1..self.0.len() - CHECK_DIGIT_LEN - 1]
    }

    pub fn check_digit(&self) -> &[u8] {
        let end = self.0.len() - 1;
        &self.0[end - CHECK_DIGIT_LEN..end]
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ============================================================================
// Check Digit
// ============================================================================

/// XOR every 8-byte block of the payload together.
///
/// The payload is padded with 0xFF up to the next multiple of 8; a payload
/// that is already a multiple of 8 gets no padding.
pub fn compute_check_digit(payload: &[u8]) -> [u8; CHECK_DIGIT_LEN] {
    let mut check_digit = [0u8; CHECK_DIGIT_LEN];

    for block in payload.chunks(CHECK_DIGIT_LEN) {
        for i in 0..CHECK_DIGIT_LEN {
            check_digit[i] ^= block.get(i).copied().unwrap_or(CHECK_DIGIT_PAD);
        }
    }

    check_digit
}

// ============================================================================
// Field Encoding
// ============================================================================

/// Amount as 12 digits of cents.
///
/// Cents are taken with a truncating cast of `amount * 100`, so a value like
/// 0.29 whose product lands just under 29 encodes to 28 cents. Terminals in
/// the field expect exactly this.
pub fn encode_amount(amount: f64) -> Result<String, CodecError> {
    if !amount.is_finite() {
        return Err(CodecError::AmountNotFinite(amount));
    }

    let scaled = amount * 100.0;
    if scaled < 0.0 || scaled >= (MAX_AMOUNT_CENTS + 1) as f64 {
        return Err(CodecError::AmountOutOfRange(amount));
    }

    let cents = scaled as i64;
    Ok(format!("{:0width$}", cents, width = AMOUNT_LEN))
}

pub fn encode_invoice(invoice: u32) -> Result<String, CodecError> {
    if invoice > MAX_INVOICE {
        return Err(CodecError::InvoiceOutOfRange(invoice));
    }
    Ok(format!("{:0width$}", invoice, width = INVOICE_LEN))
}

/// Cashier id right-aligned in 4 characters; longer ids keep their first 4
pub fn encode_cashier(cashier: &str) -> String {
    let truncated: String = cashier.chars().take(CASHIER_LEN).collect();
    format!("{:>width$}", truncated, width = CASHIER_LEN)
}

// ============================================================================
// Packet Builder
// ============================================================================

pub fn build_packet(command: Command, amount: f64, invoice: u32, cashier: &str) -> Result<Packet, CodecError> {
    let mut payload = String::with_capacity(REQUEST_PAYLOAD_LEN);
    payload.push_str(command.code());
    payload.push_str(&encode_amount(amount)?);
    payload.push_str(&encode_invoice(invoice)?);
    payload.push_str(&encode_cashier(cashier));

    let payload = payload.into_bytes();
    let check_digit = compute_check_digit(&payload);

    let mut bytes = Vec::with_capacity(payload.len() + CHECK_DIGIT_LEN + 2);
    bytes.push(STX);
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(&check_digit);
    bytes.push(ETX);

    Ok(Packet(bytes))
}

pub fn build_request(request: &TransactionRequest) -> Result<Packet, CodecError> {
    build_packet(request.command, request.amount, request.invoice, &request.cashier)
}

/// Uppercase hex with no separators, as shown in the communication log
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_digit_no_padding_on_full_block() {
        assert_eq!(&compute_check_digit(b"12345678"), b"12345678");

        let two_blocks = compute_check_digit(b"ABCDEFGHABCDEFGH");
        assert_eq!(two_blocks, [0u8; 8]);
    }

    #[test]
    fn test_check_digit_pads_with_ff() {
        assert_eq!(compute_check_digit(b"A"), [0x41, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(compute_check_digit(b""), [0u8; 8]);
    }

    #[test]
    fn test_check_digit_deterministic() {
        let payload = b"020000000001234000000  99";
        assert_eq!(compute_check_digit(payload), compute_check_digit(payload));
    }

    #[test]
    fn test_field_encoding() {
        assert_eq!(encode_amount(12.34).unwrap(), "000000001234");
        assert_eq!(encode_amount(0.0).unwrap(), "000000000000");
        assert_eq!(encode_invoice(7).unwrap(), "000007");
        assert_eq!(encode_cashier("99"), "  99");
        assert_eq!(encode_cashier("123456"), "1234");
        assert_eq!(encode_cashier(""), "    ");
        assert_eq!(encode_cashier("ABCD"), "ABCD");
    }

    #[test]
    fn test_amount_truncates() {
        // 0.29 * 100 == 28.999999999999996
        assert_eq!(encode_amount(0.29).unwrap(), "000000000028");
        // 1.005 * 100 == 100.49999999999999
        assert_eq!(encode_amount(1.005).unwrap(), "000000000100");
    }

    #[test]
    fn test_amount_out_of_range() {
        assert_eq!(encode_amount(-1.0), Err(CodecError::AmountOutOfRange(-1.0)));
        assert_eq!(encode_amount(1e10), Err(CodecError::AmountOutOfRange(1e10)));
        assert!(matches!(encode_amount(f64::NAN), Err(CodecError::AmountNotFinite(_))));
        assert!(matches!(encode_amount(f64::INFINITY), Err(CodecError::AmountNotFinite(_))));
        assert_eq!(encode_amount(9_999_999_999.99).unwrap().len(), AMOUNT_LEN);
    }

    #[test]
    fn test_invoice_out_of_range() {
        assert_eq!(encode_invoice(999_999).unwrap(), "999999");
        assert_eq!(encode_invoice(1_000_000), Err(CodecError::InvoiceOutOfRange(1_000_000)));
        assert!(build_packet(Command::Refund, 1.0, 1_000_000, "1").is_err());
    }

    #[test]
    fn test_sale_packet_bytes() {
        let packet = build_packet(Command::Sale, 1.00, 0, "99").unwrap();

        let mut expected = vec![STX];
        expected.extend_from_slice(b"020000000000100000000  99");
        expected.extend_from_slice(&[0x09, 0xCD, 0xCF, 0xCF, 0xCE, 0xDF, 0xDF, 0xC6]);
        expected.push(ETX);

        assert_eq!(packet.as_bytes(), &expected[..]);
        assert_eq!(
            packet.to_hex(),
            "023032303030303030303030303130303030303030302020393909CDCFCFCEDFDFC603"
        );
    }

    #[test]
    fn test_sale_check_digit_by_blocks() {
        let payload = b"020000000000100000000  99";
        let mut padded = payload.to_vec();
        padded.resize(32, 0xFF);

        let mut expected = [0u8; 8];
        for block in padded.chunks(8) {
            for (acc, b) in expected.iter_mut().zip(block) {
                *acc ^= b;
            }
        }

        assert_eq!(compute_check_digit(payload), expected);
    }

    #[test]
    fn test_packet_layout() {
        for cmd in Command::ALL {
            let packet = build_packet(cmd, 12.34, 7, "123456").unwrap();
            let bytes = packet.as_bytes();

            assert_eq!(bytes[0], STX);
            assert_eq!(bytes[bytes.len() - 1], ETX);
            assert_eq!(packet.len(), 1 + REQUEST_PAYLOAD_LEN + CHECK_DIGIT_LEN + 1);

            let payload = packet.payload();
            assert_eq!(&payload[..3], cmd.code().as_bytes());
            assert_eq!(&payload[3..15], b"000000001234");
            assert_eq!(&payload[15..21], b"000007");
            assert_eq!(&payload[21..25], b"1234");
        }
    }

    #[test]
    fn test_embedded_check_digit_matches_payload() {
        let packet = build_packet(Command::Refund, 250.75, 123, "7").unwrap();
        assert_eq!(packet.check_digit(), &compute_check_digit(packet.payload())[..]);

        let stripped: Vec<u8> = packet.as_bytes().iter().copied()
            .filter(|b| *b != STX && *b != ETX)
            .collect();
        assert_eq!(stripped.len(), REQUEST_PAYLOAD_LEN + CHECK_DIGIT_LEN);
        let (payload, check) = stripped.split_at(REQUEST_PAYLOAD_LEN);
        assert_eq!(payload, b"026000000025075000123   7");
        assert_eq!(check, &compute_check_digit(payload)[..]);
        assert_eq!(check, &[0x07, 0xCD, 0xCA, 0xC8, 0xCC, 0xD8, 0xDA, 0xDF]);
    }

    #[test]
    fn test_build_request_matches_build_packet() {
        let req = TransactionRequest::new(Command::Void, 10.0, 55, "01").normalized();
        let packet = build_request(&req).unwrap();
        assert_eq!(packet, build_packet(Command::Void, 0.0, 55, "01").unwrap());
        assert_eq!(&packet.payload()[3..15], b"000000000000");
    }
}
