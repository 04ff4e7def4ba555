use crate::error::{ResolveError, Result};
use serde::{Deserialize, Serialize};

/// A check-digit-valid GTIN (EAN-8, UPC-A, EAN-13 or GTIN-14).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Gtin {
    pub raw: String,
    /// Digits as given, separators removed.
    pub digits: String,
    /// Zero-padded 14-digit form; equal for every spelling of one item.
    pub gtin14: String,
}

const GTIN_LENGTHS: [usize; 4] = [8, 12, 13, 14];

fn strip_gtin(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '.')
        .collect()
}

fn check_gtin(digits: &[u8]) -> bool {
    let Some((&check, body)) = digits.split_last() else {
        return false;
    };
    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| if i % 2 == 0 { d as u32 * 3 } else { d as u32 })
        .sum();
    (10 - (sum % 10)) % 10 == check as u32
}

impl Gtin {
    pub fn parse(input: &str) -> Result<Self> {
        let stripped = strip_gtin(input);

        if !GTIN_LENGTHS.contains(&stripped.len()) || !stripped.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ResolveError::InvalidGtin(input.to_string()));
        }

        let digits: Vec<u8> = stripped.bytes().map(|b| b - b'0').collect();
        if !check_gtin(&digits) {
            return Err(ResolveError::InvalidGtin(input.to_string()));
        }

        let gtin14 = format!("{stripped:0>14}");
        Ok(Self {
            raw: input.to_string(),
            digits: stripped,
            gtin14,
        })
    }

    /// Every standard-length spelling of this GTIN, shortest first.
    ///
    /// A UPC-A `036000291452` is also written as the EAN-13 `0036000291452`.
    pub fn equivalents(&self) -> Vec<String> {
        GTIN_LENGTHS
            .iter()
            .filter_map(|&len| {
                let (pad, tail) = self.gtin14.split_at(14 - len);
                pad.bytes().all(|b| b == b'0').then(|| tail.to_string())
            })
            .collect()
    }
}

/// Values to look up for a barcode-like query: all GTIN spellings when the
/// input is a valid GTIN, plus the trimmed input as given.
pub fn lookup_values(input: &str) -> Vec<String> {
    let trimmed = input.trim();
    let mut values = match Gtin::parse(trimmed) {
        Ok(gtin) => gtin.equivalents(),
        Err(_) => Vec::new(),
    };
    if !trimmed.is_empty() && !values.iter().any(|v| v == trimmed) {
        values.push(trimmed.to_string());
    }
    values
}
