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
use std::str::FromStr;
use thiserror::Error;
use crate::protocol::{INVOICE_LEN, MAX_INVOICE};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvoiceError {
    #[error("invoice must be 1 to 6 digits, got '{0}'")]
    Invalid(String),
}

/// Running invoice number kept by the POS
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InvoiceRegister(u32);

impl InvoiceRegister {
    #[cfg(test)]
    pub fn new(value: u32) -> Result<Self, InvoiceError> {
        if value > MAX_INVOICE {
            return Err(InvoiceError::Invalid(value.to_string()));
        }
        Ok(InvoiceRegister(value))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Next invoice after an approval; 999999 rolls over to 000001
    pub fn increment(&mut self) {
        self.0 = if self.0 >= MAX_INVOICE { 1 } else { self.0 + 1 };
    }
}

impl Default for InvoiceRegister {
    fn default() -> Self {
        InvoiceRegister(1)
    }
}

impl FromStr for InvoiceRegister {
    type Err = InvoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.len() > INVOICE_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvoiceError::Invalid(s.to_string()));
        }
        s.parse::<u32>()
            .map(InvoiceRegister)
            .map_err(|_| InvoiceError::Invalid(s.to_string()))
    }
}

impl fmt::Display for InvoiceRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = INVOICE_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let inv: InvoiceRegister = "000041".parse().unwrap();
        assert_eq!(inv.value(), 41);
        assert_eq!(inv.to_string(), "000041");

        let inv: InvoiceRegister = "7".parse().unwrap();
        assert_eq!(inv.to_string(), "000007");
    }

    #[test]
    fn test_rejects_non_digits() {
        assert!("12a".parse::<InvoiceRegister>().is_err());
        assert!("".parse::<InvoiceRegister>().is_err());
        assert!("-1".parse::<InvoiceRegister>().is_err());
        assert!("1234567".parse::<InvoiceRegister>().is_err());
        assert!(InvoiceRegister::new(1_000_000).is_err());
    }

    #[test]
    fn test_increment() {
        let mut inv = InvoiceRegister::new(41).unwrap();
        inv.increment();
        assert_eq!(inv.to_string(), "000042");

        let mut inv = InvoiceRegister::new(999_999).unwrap();
        inv.increment();
        assert_eq!(inv.to_string(), "000001");
    }

    #[test]
    fn test_default() {
        assert_eq!(InvoiceRegister::default().to_string(), "000001");
    }
}
