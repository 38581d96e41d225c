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

//! Frame translator
//!
//! Turns a hex dump copied from the communication log back into named
//! fields. Requests use the fixed layout the codec writes; responses use
//! the layout observed from terminals in the field:
//!
//! ```text
//! cmd(3) err(2) card(22) expiry(4) type(2) auth(8) gross(12) net(12)
//! stan(6) invoice(6) cashier(4) label(15) [tid(8) mid(15) batch(6)]
//! ```
//!
//! The bracketed tail is only sent by firmware v1.0.17 and later.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use crate::codec::{compute_check_digit, to_hex};
use crate::protocol::{CHECK_DIGIT_LEN, COMMAND_LEN, Command};

/// STX + one payload byte + check digit + ETX
const MIN_DECODABLE_LEN: usize = 1 + 1 + CHECK_DIGIT_LEN + 1;

/// Payload length from which the terminal/merchant/batch tail is present
const EXTENDED_RESPONSE_LEN: usize = 125;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no STX (02) marker found in input")]
    MissingStx,

    #[error("no ETX (03) marker found in input")]
    MissingEtx,

    #[error("malformed packet: ETX before STX")]
    EtxBeforeStx,

    #[error("hex conversion error: {0}")]
    InvalidHex(String),

    #[error("packet too short to be valid ({0} bytes)")]
    TooShort(usize),
}

// ============================================================================
// Decoded Structures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CardType {
    #[serde(rename = "VISA")]
    Visa,
    #[serde(rename = "MASTERCARD")]
    Mastercard,
    #[serde(rename = "DINERS")]
    Diners,
    #[serde(rename = "AMEX")]
    Amex,
    #[serde(rename = "MYDEBIT")]
    MyDebit,
    #[serde(rename = "JCB")]
    Jcb,
    #[serde(rename = "UNIONPAY")]
    UnionPay,
    #[serde(rename = "E-WALLET")]
    EWallet,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl CardType {
    pub fn from_code(code: &str) -> CardType {
        match code {
            "04" => CardType::Visa,
            "05" => CardType::Mastercard,
            "06" => CardType::Diners,
            "07" => CardType::Amex,
            "08" => CardType::MyDebit,
            "09" => CardType::Jcb,
            "10" => CardType::UnionPay,
            "11" => CardType::EWallet,
            _ => CardType::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CardType::Visa => "VISA",
            CardType::Mastercard => "MASTERCARD",
            CardType::Diners => "DINERS",
            CardType::Amex => "AMEX",
            CardType::MyDebit => "MYDEBIT",
            CardType::Jcb => "JCB",
            CardType::UnionPay => "UNIONPAY",
            CardType::EWallet => "E-WALLET",
            CardType::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Firmware {
    #[serde(rename = "OLD (< v1.0.17)")]
    Old,
    #[serde(rename = "NEW (v1.0.17+)")]
    New,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestFields {
    pub command: Option<String>,
    pub amount: Option<String>,
    pub invoice_no: Option<String>,
    pub cashier_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseFields {
    pub command: Option<String>,
    pub error_code: Option<String>,
    pub card_number: Option<String>,
    pub expiry_raw: Option<String>,
    pub expiry: Option<String>,
    pub card_type_code: Option<String>,
    pub card_type: CardType,
    pub auth_code: Option<String>,
    pub gross_amount: Option<String>,
    pub net_amount: Option<String>,
    pub stan: Option<String>,
    pub invoice_no: Option<String>,
    pub cashier_id: Option<String>,
    pub card_label: Option<String>,
    pub firmware: Firmware,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<String>,
}

impl ResponseFields {
    /// Short operator receipt
    pub fn receipt_lines(&self) -> Vec<String> {
        let kind = self.command.as_deref()
            .and_then(Command::from_response_code)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

        vec![
            format!("TYPE:       {}", kind),
            format!("CARD:       {}", field(&self.card_number)),
            format!("CARD TYPE:  {}", self.card_type.name()),
            format!("AUTH CODE:  {}", field(&self.auth_code)),
            format!("AMOUNT:     {}", field(&self.gross_amount)),
            format!("INVOICE:    {}", field(&self.invoice_no)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrameKind {
    Request(RequestFields),
    Response(ResponseFields),
    Unknown { payload_ascii: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedFrame {
    pub raw_hex: String,
    pub total_bytes: usize,
    pub payload_bytes: usize,
    pub command: String,
    pub check_digit: String,
    pub check_digit_valid: bool,
    pub decoded: FrameKind,
}

// ============================================================================
// Hex Extraction
// ============================================================================

/// Pull the first frame out of a pasted log line such as
/// `[11:50:02] RX < 0230...03`.
///
/// Anything up to the last `>` or `<` is discarded so timestamp digits are
/// not mistaken for hex. The frame runs from the first `02` to the last `03`.
pub fn extract_frame(input: &str) -> Result<Vec<u8>, DecodeError> {
    let body = match input.rfind(['>', '<']) {
        Some(pos) => &input[pos + 1..],
        None => input,
    };

    let clean: String = body.chars().filter(|c| c.is_ascii_hexdigit()).collect();

    let stx = clean.find("02").ok_or(DecodeError::MissingStx)?;
    let etx = clean.rfind("03").ok_or(DecodeError::MissingEtx)?;
    if etx < stx {
        return Err(DecodeError::EtxBeforeStx);
    }

    parse_hex(&clean[stx..etx + 2])
}

fn parse_hex(hex: &str) -> Result<Vec<u8>, DecodeError> {
    if hex.len() % 2 != 0 {
        return Err(DecodeError::InvalidHex(format!("odd number of digits ({})", hex.len())));
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| DecodeError::InvalidHex(e.to_string()))
        })
        .collect()
}

// ============================================================================
// Frame Decoding
// ============================================================================

pub fn decode_frame(frame: &[u8]) -> Result<DecodedFrame, DecodeError> {
    if frame.len() < MIN_DECODABLE_LEN {
        return Err(DecodeError::TooShort(frame.len()));
    }

    let end = frame.len() - 1;
    let payload = &frame[1..end - CHECK_DIGIT_LEN];
    let check_digit = &frame[end - CHECK_DIGIT_LEN..end];

    let command = match std::str::from_utf8(&payload[..COMMAND_LEN.min(payload.len())]) {
        Ok(s) if s.len() == COMMAND_LEN => s.to_string(),
        _ => "???".to_string(),
    };

    let decoded = if Command::from_code(&command).is_some() {
        FrameKind::Request(decode_request(payload))
    } else if Command::from_response_code(&command).is_some() {
        FrameKind::Response(decode_response(payload))
    } else {
        FrameKind::Unknown { payload_ascii: String::from_utf8_lossy(payload).into_owned() }
    };

    Ok(DecodedFrame {
        raw_hex: to_hex(frame),
        total_bytes: frame.len(),
        payload_bytes: payload.len(),
        command,
        check_digit: to_hex(check_digit),
        check_digit_valid: compute_check_digit(payload)[..] == *check_digit,
        decoded,
    })
}

pub fn decode_hex(input: &str) -> Result<DecodedFrame, DecodeError> {
    decode_frame(&extract_frame(input)?)
}

fn field(payload: &[u8], start: usize, len: usize) -> Option<String> {
    let bytes = payload.get(start..start + len)?;
    Some(String::from_utf8_lossy(bytes).trim().to_string())
}

fn money(payload: &[u8], start: usize, len: usize) -> Option<String> {
    let cents: u64 = field(payload, start, len)?.parse().ok()?;
    Some(format!("{}.{:02}", cents / 100, cents % 100))
}

/// `YYMM` as "2027 March"; two-digit years follow the usual 69 pivot
fn expiry(raw: &str) -> Option<String> {
    if raw.len() != 4 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let yy: i32 = raw[..2].parse().ok()?;
    let mm: u32 = raw[2..].parse().ok()?;
    let year = if yy < 69 { 2000 + yy } else { 1900 + yy };
    NaiveDate::from_ymd_opt(year, mm, 1).map(|d| d.format("%Y %B").to_string())
}

fn decode_request(payload: &[u8]) -> RequestFields {
    RequestFields {
        command: field(payload, 0, 3),
        amount: money(payload, 3, 12),
        invoice_no: field(payload, 15, 6),
        cashier_id: field(payload, 21, 4),
    }
}

fn decode_response(payload: &[u8]) -> ResponseFields {
    let extended = payload.len() >= EXTENDED_RESPONSE_LEN;
    let expiry_raw = field(payload, 27, 4);
    let card_type_code = field(payload, 31, 2);

    ResponseFields {
        command: field(payload, 0, 3),
        error_code: field(payload, 3, 2),
        card_number: field(payload, 5, 22),
        expiry: expiry_raw.as_deref().and_then(expiry),
        expiry_raw,
        card_type: card_type_code.as_deref().map(CardType::from_code).unwrap_or(CardType::Unknown),
        card_type_code,
        auth_code: field(payload, 33, 8),
        gross_amount: money(payload, 41, 12),
        net_amount: money(payload, 53, 12),
        stan: field(payload, 65, 6),
        invoice_no: field(payload, 71, 6),
        cashier_id: field(payload, 77, 4),
        card_label: field(payload, 81, 15),
        firmware: if extended { Firmware::New } else { Firmware::Old },
        terminal_id: if extended { field(payload, 96, 8) } else { None },
        merchant_id: if extended { field(payload, 104, 15) } else { None },
        batch_number: if extended { field(payload, 119, 6) } else { None },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::build_packet;
    use crate::protocol::{ETX, STX};

    fn frame_from_payload(payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![STX];
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&compute_check_digit(payload));
        frame.push(ETX);
        frame
    }

    fn sale_response_payload() -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(b"021");                      // command
        p.extend_from_slice(b"00");                       // error code
        p.extend_from_slice(b"411111XXXXXX1111      ");   // card number (22)
        p.extend_from_slice(b"2703");                     // expiry
        p.extend_from_slice(b"04");                       // card type
        p.extend_from_slice(b"ABC123  ");                 // auth code (8)
        p.extend_from_slice(b"000000001234");             // gross
        p.extend_from_slice(b"000000001200");             // net
        p.extend_from_slice(b"000321");                   // stan
        p.extend_from_slice(b"000042");                   // invoice
        p.extend_from_slice(b"  99");                     // cashier
        p.extend_from_slice(b"VISA CREDIT    ");          // card label (15)
        assert_eq!(p.len(), 96);
        p
    }

    #[test]
    fn test_extract_frame_from_log_line() {
        let bytes = extract_frame("[11:50:23] TX > 02303203").unwrap();
        assert_eq!(bytes, vec![0x02, 0x30, 0x32, 0x03]);

        let bytes = extract_frame("02 30 32 03").unwrap();
        assert_eq!(bytes, vec![0x02, 0x30, 0x32, 0x03]);
    }

    #[test]
    fn test_extract_frame_errors() {
        assert_eq!(extract_frame("RX < 3031"), Err(DecodeError::MissingStx));
        assert_eq!(extract_frame("RX < 0231"), Err(DecodeError::MissingEtx));
        assert_eq!(extract_frame("RX < 0310 02"), Err(DecodeError::EtxBeforeStx));
        assert!(matches!(extract_frame("RX < 0213103"), Err(DecodeError::InvalidHex(_))));
    }

    #[test]
    fn test_decode_request_packet() {
        let packet = build_packet(Command::Refund, 12.34, 7, "99").unwrap();
        let decoded = decode_frame(packet.as_bytes()).unwrap();

        assert_eq!(decoded.command, "026");
        assert_eq!(decoded.total_bytes, 35);
        assert_eq!(decoded.payload_bytes, 25);
        assert!(decoded.check_digit_valid);
        assert_eq!(decoded.decoded, FrameKind::Request(RequestFields {
            command: Some("026".into()),
            amount: Some("12.34".into()),
            invoice_no: Some("000007".into()),
            cashier_id: Some("99".into()),
        }));
    }

    #[test]
    fn test_decode_roundtrips_logged_hex() {
        let packet = build_packet(Command::Sale, 1.00, 0, "99").unwrap();
        let line = format!("[09:15:00] TX > {}", packet.to_hex());

        let decoded = decode_hex(&line).unwrap();

        assert_eq!(decoded.raw_hex, packet.to_hex());
        assert_eq!(decoded.check_digit, "09CDCFCFCEDFDFC6");
    }

    #[test]
    fn test_decode_sale_response() {
        let frame = frame_from_payload(&sale_response_payload());
        let decoded = decode_frame(&frame).unwrap();

        let FrameKind::Response(fields) = decoded.decoded else {
            panic!("expected a response");
        };
        assert_eq!(fields.error_code.as_deref(), Some("00"));
        assert_eq!(fields.card_number.as_deref(), Some("411111XXXXXX1111"));
        assert_eq!(fields.expiry.as_deref(), Some("2027 March"));
        assert_eq!(fields.card_type, CardType::Visa);
        assert_eq!(fields.auth_code.as_deref(), Some("ABC123"));
        assert_eq!(fields.gross_amount.as_deref(), Some("12.34"));
        assert_eq!(fields.net_amount.as_deref(), Some("12.00"));
        assert_eq!(fields.stan.as_deref(), Some("000321"));
        assert_eq!(fields.invoice_no.as_deref(), Some("000042"));
        assert_eq!(fields.cashier_id.as_deref(), Some("99"));
        assert_eq!(fields.card_label.as_deref(), Some("VISA CREDIT"));
        assert_eq!(fields.firmware, Firmware::Old);
        assert_eq!(fields.terminal_id, None);
    }

    #[test]
    fn test_decode_extended_response() {
        let mut payload = sale_response_payload();
        payload.extend_from_slice(b"T0000001");           // terminal id
        payload.extend_from_slice(b"M00000000000001");    // merchant id
        payload.extend_from_slice(b"000009");             // batch
        let decoded = decode_frame(&frame_from_payload(&payload)).unwrap();

        let FrameKind::Response(fields) = decoded.decoded else {
            panic!("expected a response");
        };
        assert_eq!(fields.firmware, Firmware::New);
        assert_eq!(fields.terminal_id.as_deref(), Some("T0000001"));
        assert_eq!(fields.merchant_id.as_deref(), Some("M00000000000001"));
        assert_eq!(fields.batch_number.as_deref(), Some("000009"));
    }

    #[test]
    fn test_decode_truncated_response() {
        let decoded = decode_frame(&frame_from_payload(b"02151")).unwrap();

        let FrameKind::Response(fields) = decoded.decoded else {
            panic!("expected a response");
        };
        assert_eq!(fields.error_code.as_deref(), Some("51"));
        assert_eq!(fields.card_number, None);
        assert_eq!(fields.card_type, CardType::Unknown);
        assert_eq!(fields.gross_amount, None);
    }

    #[test]
    fn test_decode_unknown_and_short() {
        let decoded = decode_frame(&frame_from_payload(b"999HELLO")).unwrap();
        assert_eq!(decoded.decoded, FrameKind::Unknown { payload_ascii: "999HELLO".into() });

        assert_eq!(decode_frame(&[STX, b'0', ETX]), Err(DecodeError::TooShort(3)));
    }

    #[test]
    fn test_decode_single_byte_payload() {
        let frame = frame_from_payload(b"X");
        assert_eq!(frame.len(), 11);

        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.payload_bytes, 1);
        assert_eq!(decoded.command, "???");
        assert!(decoded.check_digit_valid);
        assert_eq!(decoded.decoded, FrameKind::Unknown { payload_ascii: "X".into() });

        assert_eq!(decode_frame(&frame[1..]), Err(DecodeError::TooShort(10)));
    }

    #[test]
    fn test_bad_check_digit_flagged() {
        let mut frame = frame_from_payload(b"021000000");
        let idx = frame.len() - 2;
        frame[idx] ^= 0x01;
        assert!(!decode_frame(&frame).unwrap().check_digit_valid);
    }

    #[test]
    fn test_card_types() {
        assert_eq!(CardType::from_code("05"), CardType::Mastercard);
        assert_eq!(CardType::from_code("11"), CardType::EWallet);
        assert_eq!(CardType::from_code("99"), CardType::Unknown);
        assert_eq!(CardType::from_code("10").name(), "UNIONPAY");
    }

    #[test]
    fn test_expiry_rendering() {
        assert_eq!(expiry("2612").as_deref(), Some("2026 December"));
        assert_eq!(expiry("9901").as_deref(), Some("1999 January"));
        assert_eq!(expiry("2613"), None);
        assert_eq!(expiry("26"), None);
    }

    #[test]
    fn test_json_shape() {
        let packet = build_packet(Command::Void, 0.0, 42, "1").unwrap();
        let json = serde_json::to_value(decode_frame(packet.as_bytes()).unwrap()).unwrap();

        assert_eq!(json["command"], "022");
        assert_eq!(json["decoded"]["type"], "request");
        assert_eq!(json["decoded"]["invoice_no"], "000042");
    }

    #[test]
    fn test_receipt_lines() {
        let FrameKind::Response(fields) = decode_frame(&frame_from_payload(&sale_response_payload())).unwrap().decoded else {
            panic!("expected a response");
        };
        let lines = fields.receipt_lines();
        assert_eq!(lines[0], "TYPE:       SALE");
        assert!(lines.iter().any(|l| l == "AMOUNT:     12.34"));
    }
}
