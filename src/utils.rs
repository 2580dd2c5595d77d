//! Table reading helpers.
//!
//! Source files come with no fixed delimiter or text encoding, so readers try an
//! ordered list of `(delimiter, encoding)` candidates and keep the first parse that
//! yields more than one column.

use csv::{ReaderBuilder, StringRecord};
use std::path::Path;
use tracing::debug;

use crate::error::{DataError, DataResult};

/// Text encodings seen in regulator and mapping files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
    Windows1252,
}

impl TextEncoding {
    /// Decode strictly; `None` when the bytes are not valid in this encoding
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        let text = match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok()?.to_string(),
            // ISO-8859-1 maps every byte to the code point of the same value
            TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            TextEncoding::Windows1252 => encoding_rs::WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)?
                .into_owned(),
        };
        Some(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
    }
}

/// One attempt of the robust reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCandidate {
    pub delimiter: u8,
    pub encoding: TextEncoding,
}

impl ReadCandidate {
    pub const fn new(delimiter: u8, encoding: TextEncoding) -> Self {
        Self { delimiter, encoding }
    }
}

/// Delimiters in the outer loop, encodings in the inner loop
pub const DEFAULT_CANDIDATES: [ReadCandidate; 6] = [
    ReadCandidate::new(b',', TextEncoding::Utf8),
    ReadCandidate::new(b',', TextEncoding::Latin1),
    ReadCandidate::new(b',', TextEncoding::Windows1252),
    ReadCandidate::new(b';', TextEncoding::Utf8),
    ReadCandidate::new(b';', TextEncoding::Latin1),
    ReadCandidate::new(b';', TextEncoding::Windows1252),
];

/// Header plus string records, all columns kept as text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: StringRecord,
    pub records: Vec<StringRecord>,
}

impl RawTable {
    pub fn new(headers: StringRecord, records: Vec<StringRecord>) -> Self {
        Self { headers, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Case-insensitive, whitespace-insensitive column lookup
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_uppercase();
        self.headers
            .iter()
            .position(|header| header.trim().to_uppercase() == wanted)
    }

    pub fn require_column(&self, name: &str, source: &Path) -> DataResult<usize> {
        self.column_index(name).ok_or_else(|| {
            DataError::malformed(source, format!("required column '{}' not found", name))
        })
    }

    /// Upper-case and trim every header
    pub fn normalize_headers(&mut self) {
        self.headers = self
            .headers
            .iter()
            .map(|header| header.trim().to_uppercase())
            .collect();
    }
}

/// Parse text with a fixed delimiter and encoding
pub fn parse_table(bytes: &[u8], candidate: ReadCandidate) -> Option<RawTable> {
    let text = candidate.encoding.decode(bytes)?;

    let mut reader = ReaderBuilder::new()
        .delimiter(candidate.delimiter)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers().ok()?.clone();
    let records = reader
        .records()
        .collect::<Result<Vec<StringRecord>, csv::Error>>()
        .ok()?;

    Some(RawTable::new(headers, records))
}

/// Try each candidate in order; the first parse with more than one column wins
pub fn read_table_robust(bytes: &[u8], candidates: &[ReadCandidate]) -> Option<(RawTable, ReadCandidate)> {
    for candidate in candidates {
        match parse_table(bytes, *candidate) {
            Some(table) if table.column_count() > 1 => return Some((table, *candidate)),
            Some(_) => debug!("Candidate {:?} produced a single column", candidate),
            None => debug!("Candidate {:?} failed to parse", candidate),
        }
    }
    None
}

/// Load a file with the default candidate list
pub fn load_table_robust(path: &Path) -> DataResult<RawTable> {
    if !path.exists() {
        return Err(DataError::MissingInput(format!(
            "file '{}' not found",
            path.display()
        )));
    }

    let bytes = std::fs::read(path)?;
    read_table_robust(&bytes, &DEFAULT_CANDIDATES)
        .map(|(table, candidate)| {
            debug!(
                "Loaded {} with delimiter '{}' and {:?}",
                path.display(),
                candidate.delimiter as char,
                candidate.encoding
            );
            table
        })
        .ok_or_else(|| {
            DataError::malformed(path, "no delimiter/encoding combination produced more than one column")
        })
}

/// Numeric coercion for code columns: "9512", " 9512 " and "9512.0" all parse
pub fn parse_code(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(code) = value.parse::<i64>() {
        return Some(code);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.fract() == 0.0)
        .map(|v| v as i64)
}

/// Numeric coercion for value columns; unparseable or empty cells count as zero
pub fn parse_amount(value: &str) -> f64 {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}
