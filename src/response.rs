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

use std::fmt;
use crate::protocol::{ETX, STX};

/// Shortest raw frame worth interpreting
pub const MIN_FRAME_LEN: usize = 10;

/// Shortest marker-free text that still holds a result code
pub const MIN_TEXT_LEN: usize = 5;

/// Offset of the 2-character result code in the marker-free text
pub const RESULT_CODE_OFFSET: usize = 3;

pub const APPROVED_CODE: &str = "00";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Approved,
    Declined(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Approved => write!(f, "TRANSACTION APPROVED!"),
            Outcome::Declined(code) => write!(f, "DECLINED. Error Code: {}", code),
        }
    }
}

/// Read the result code out of a completed response frame.
///
/// Every STX and ETX byte is removed, wherever it sits, and the code is the
/// two characters at offset 3 of what remains. Frames that are too short
/// yield `None`.
pub fn interpret(frame: &[u8]) -> Option<Outcome> {
    if frame.len() < MIN_FRAME_LEN {
        return None;
    }

    let text: Vec<u8> = frame.iter().copied().filter(|b| *b != STX && *b != ETX).collect();
    if text.len() < MIN_TEXT_LEN {
        return None;
    }

    let code = String::from_utf8_lossy(&text[RESULT_CODE_OFFSET..RESULT_CODE_OFFSET + 2]).into_owned();
    if code == APPROVED_CODE {
        Some(Outcome::Approved)
    } else {
        Some(Outcome::Declined(code))
    }
}
