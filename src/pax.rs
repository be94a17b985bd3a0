//! PAX extended-header body decoding.
//!
//! A PAX extended header's data section is a back-to-back sequence of
//! records of the form `"<len> <key>=<value>\n"`, where `<len>` is the
//! decimal byte length of the whole record including the length digits
//! themselves and the trailing newline. Keys of interest are ASCII; values
//! are UTF-8 and may contain `=` and spaces, so the split happens on the
//! first `=` only.
//!
//! The body arrives from the archive in block-sized pieces and a record may
//! straddle those pieces, so [`PaxParser`] accumulates bytes across `feed`
//! calls and only decodes once the declared body length has been consumed.

use std::collections::BTreeMap;

use thiserror::Error;

/// Error decoding a PAX extended-header body.
#[derive(Debug, Error)]
pub enum PaxError {
    /// A record's length prefix or framing is malformed.
    #[error("malformed PAX record at byte {offset}")]
    Malformed {
        /// Byte offset of the record within the header body.
        offset: usize,
    },

    /// A key or value is not valid UTF-8.
    #[error("PAX record is not valid UTF-8 at byte {offset}")]
    InvalidUtf8 {
        /// Byte offset of the record within the header body.
        offset: usize,
    },
}

/// Accumulates a PAX extended-header body across reads and decodes it into
/// an ordered key/value mapping.
#[derive(Debug, Default)]
pub struct PaxParser {
    body: Vec<u8>,
}

impl PaxParser {
    /// Create an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a piece of the header body. Pieces may split records at any
    /// byte position.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Number of body bytes accumulated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Whether any body bytes have been accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Decode the accumulated body into a mapping.
    ///
    /// Later records win on duplicate keys, matching how producers emit
    /// supersets.
    ///
    /// # Errors
    ///
    /// Returns [`PaxError`] if a record's framing is broken or a key/value
    /// is not UTF-8.
    pub fn finish(self) -> Result<BTreeMap<String, String>, PaxError> {
        parse_pax_body(&self.body)
    }
}

/// Decode a complete PAX header body into an ordered key/value mapping.
pub fn parse_pax_body(mut data: &[u8]) -> Result<BTreeMap<String, String>, PaxError> {
    let total = data.len();
    let mut headers = BTreeMap::new();

    while !data.is_empty() {
        let offset = total - data.len();

        let space = data
            .iter()
            .position(|&b| b == b' ')
            .ok_or(PaxError::Malformed { offset })?;
        let len: usize = std::str::from_utf8(&data[..space])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(PaxError::Malformed { offset })?;

        // The record must cover its prefix, the separator, at least "=", and
        // the trailing newline.
        if len > data.len() || len < space + 2 {
            return Err(PaxError::Malformed { offset });
        }
        if data[len - 1] != b'\n' {
            return Err(PaxError::Malformed { offset });
        }

        let kv = &data[space + 1..len - 1];
        let eq = kv
            .iter()
            .position(|&b| b == b'=')
            .ok_or(PaxError::Malformed { offset })?;

        let key = std::str::from_utf8(&kv[..eq])
            .map_err(|_| PaxError::InvalidUtf8 { offset })?
            .to_string();
        let value = std::str::from_utf8(&kv[eq + 1..])
            .map_err(|_| PaxError::InvalidUtf8 { offset })?
            .to_string();

        headers.insert(key, value);
        data = &data[len..];
    }

    Ok(headers)
}
