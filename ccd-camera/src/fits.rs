//! Minimal in-memory FITS codec.
//!
//! Writes single-HDU images: 80-byte header cards in 2880-byte blocks,
//! big-endian data, unsigned 16 and 32 bit depths stored signed with the
//! conventional BZERO offsets. The matching reader restores native pixel
//! values, so an encode/decode pair is bit-for-bit.

use std::collections::HashMap;
use std::io::Read;

use thiserror::Error;

pub const BLOCK_SIZE: usize = 2880;
pub const RECORD_SIZE: usize = 80;

const BZERO_U16: i64 = 32768;
const BZERO_U32: i64 = 2147483648;

#[derive(Debug, Error)]
pub enum FitsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported bit depth: {0}")]
    UnsupportedDepth(u8),
    #[error("data size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("malformed FITS: {0}")]
    Malformed(String),
}

/// One header card value.
#[derive(Debug, Clone, PartialEq)]
pub enum FitsValue {
    Logical(bool),
    Integer(i64),
    /// Fixed-point formatting; FITS readers choke on locale-dependent or
    /// scientific notation, so the precision is always explicit.
    Float { value: f64, precision: usize },
    Str(String),
}

impl FitsValue {
    pub fn float(value: f64, precision: usize) -> Self {
        FitsValue::Float { value, precision }
    }
}

/// One keyword record.
#[derive(Debug, Clone)]
pub struct FitsCard {
    pub keyword: String,
    pub value: FitsValue,
    pub comment: String,
}

/// Ordered list of user header cards plus trailing COMMENT records.
#[derive(Debug, Clone, Default)]
pub struct FitsHeader {
    cards: Vec<FitsCard>,
    comments: Vec<String>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, keyword: &str, value: FitsValue, comment: &str) {
        self.cards.push(FitsCard {
            keyword: keyword.to_string(),
            value,
            comment: comment.to_string(),
        });
    }

    pub fn add_comment(&mut self, text: &str) {
        self.comments.push(text.to_string());
    }

    pub fn cards(&self) -> &[FitsCard] {
        &self.cards
    }

    pub fn get(&self, keyword: &str) -> Option<&FitsValue> {
        self.cards
            .iter()
            .find(|c| c.keyword == keyword)
            .map(|c| &c.value)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }
}

fn format_record(keyword: &str, value: &FitsValue, comment: &str) -> [u8; RECORD_SIZE] {
    let mut record = [b' '; RECORD_SIZE];
    let key = keyword.as_bytes();
    record[..key.len().min(8)].copy_from_slice(&key[..key.len().min(8)]);
    record[8] = b'=';
    record[9] = b' ';

    let mut text = String::new();
    match value {
        FitsValue::Str(s) => {
            // Quoted, single quotes doubled, padded to the 8-char minimum.
            let escaped = s.replace('\'', "''");
            text.push('\'');
            text.push_str(&escaped);
            while text.len() < 9 {
                text.push(' ');
            }
            text.push('\'');
        }
        FitsValue::Logical(b) => {
            text = format!("{:>20}", if *b { "T" } else { "F" });
        }
        FitsValue::Integer(v) => {
            text = format!("{v:>20}");
        }
        FitsValue::Float { value, precision } => {
            text = format!("{:>20}", format!("{value:.precision$}"));
        }
    }
    if !comment.is_empty() {
        text.push_str(" / ");
        text.push_str(comment);
    }
    let bytes = text.as_bytes();
    let n = bytes.len().min(RECORD_SIZE - 10);
    record[10..10 + n].copy_from_slice(&bytes[..n]);
    record
}

fn plain_record(text: &str) -> [u8; RECORD_SIZE] {
    let mut record = [b' '; RECORD_SIZE];
    let bytes = text.as_bytes();
    let n = bytes.len().min(RECORD_SIZE);
    record[..n].copy_from_slice(&bytes[..n]);
    record
}

fn pad_to_block(out: &mut Vec<u8>, fill: u8) {
    while out.len() % BLOCK_SIZE != 0 {
        out.push(fill);
    }
}

/// Encodes a frame as a single-HDU FITS file.
///
/// `width`/`height` are the binned image dimensions, `planes` is 1 for
/// monochrome and 3 for color (NAXIS3), `data` holds native-endian unsigned
/// samples of the given depth.
pub fn write_fits(
    width: u32,
    height: u32,
    planes: u8,
    bpp: u8,
    header: &FitsHeader,
    data: &[u8],
) -> Result<Vec<u8>, FitsError> {
    if !matches!(bpp, 8 | 16 | 32) {
        return Err(FitsError::UnsupportedDepth(bpp));
    }
    let expected = width as usize * height as usize * planes as usize * (bpp as usize / 8);
    if data.len() != expected {
        return Err(FitsError::SizeMismatch {
            expected,
            actual: data.len(),
        });
    }

    let naxis = if planes == 3 { 3 } else { 2 };
    let mut out = Vec::with_capacity(BLOCK_SIZE + expected + BLOCK_SIZE);

    let mut card = |keyword: &str, value: FitsValue, comment: &str| {
        out.extend_from_slice(&format_record(keyword, &value, comment));
    };
    card("SIMPLE", FitsValue::Logical(true), "file conforms to FITS standard");
    card("BITPIX", FitsValue::Integer(i64::from(bpp)), "bits per data pixel");
    card("NAXIS", FitsValue::Integer(naxis), "number of data axes");
    card("NAXIS1", FitsValue::Integer(i64::from(width)), "length of data axis 1");
    card("NAXIS2", FitsValue::Integer(i64::from(height)), "length of data axis 2");
    if naxis == 3 {
        card("NAXIS3", FitsValue::Integer(3), "length of data axis 3");
    }
    match bpp {
        16 => {
            card("BZERO", FitsValue::Integer(BZERO_U16), "offset data range to unsigned short");
            card("BSCALE", FitsValue::Integer(1), "default scaling factor");
        }
        32 => {
            card("BZERO", FitsValue::Integer(BZERO_U32), "offset data range to unsigned long");
            card("BSCALE", FitsValue::Integer(1), "default scaling factor");
        }
        _ => {}
    }
    for c in header.cards() {
        out.extend_from_slice(&format_record(&c.keyword, &c.value, &c.comment));
    }
    for text in &header.comments {
        out.extend_from_slice(&plain_record(&format!("COMMENT {text}")));
    }
    out.extend_from_slice(&plain_record("END"));
    pad_to_block(&mut out, b' ');

    match bpp {
        8 => out.extend_from_slice(data),
        16 => {
            for chunk in data.chunks_exact(2) {
                let sample = u16::from_ne_bytes([chunk[0], chunk[1]]);
                let stored = (i32::from(sample) - BZERO_U16 as i32) as i16;
                out.extend_from_slice(&stored.to_be_bytes());
            }
        }
        32 => {
            for chunk in data.chunks_exact(4) {
                let sample = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let stored = (i64::from(sample) - BZERO_U32) as i32;
                out.extend_from_slice(&stored.to_be_bytes());
            }
        }
        _ => unreachable!(),
    }
    pad_to_block(&mut out, 0);
    Ok(out)
}

/// Decoded single-HDU FITS image. `data` is back in the writer's native
/// unsigned layout.
#[derive(Debug)]
pub struct ParsedFits {
    pub width: u32,
    pub height: u32,
    pub planes: u8,
    pub bpp: u8,
    pub data: Vec<u8>,
    cards: HashMap<String, String>,
}

impl ParsedFits {
    /// Raw (trimmed) value text of a card.
    pub fn card(&self, keyword: &str) -> Option<&str> {
        self.cards.get(keyword).map(String::as_str)
    }

    pub fn card_f64(&self, keyword: &str) -> Option<f64> {
        self.card(keyword)?.parse().ok()
    }

    pub fn card_i64(&self, keyword: &str) -> Option<i64> {
        self.card(keyword)?.parse().ok()
    }

    /// String card with quotes stripped and trailing padding removed.
    pub fn card_str(&self, keyword: &str) -> Option<String> {
        let raw = self.card(keyword)?;
        let inner = raw.strip_prefix('\'')?.rsplit_once('\'')?.0;
        Some(inner.trim_end().replace("''", "'"))
    }
}

fn parse_value(record: &str) -> String {
    let body = record.get(10..).unwrap_or("");
    let trimmed = body.trim_start();
    if let Some(rest) = trimmed.strip_prefix('\'') {
        // Scan for the closing quote, honoring doubled-quote escapes.
        let mut end = 0;
        let bytes = rest.as_bytes();
        while end < bytes.len() {
            if bytes[end] == b'\'' {
                if end + 1 < bytes.len() && bytes[end + 1] == b'\'' {
                    end += 2;
                    continue;
                }
                break;
            }
            end += 1;
        }
        format!("'{}'", &rest[..end.min(rest.len())])
    } else {
        trimmed
            .split('/')
            .next()
            .unwrap_or("")
            .trim()
            .to_string()
    }
}

/// Decodes a single-HDU FITS image produced by [`write_fits`].
pub fn read_fits(bytes: &[u8]) -> Result<ParsedFits, FitsError> {
    if bytes.len() < BLOCK_SIZE {
        return Err(FitsError::Malformed("shorter than one block".to_string()));
    }

    let mut cards = HashMap::new();
    let mut offset = 0;
    let mut saw_end = false;
    while offset + RECORD_SIZE <= bytes.len() {
        let record = std::str::from_utf8(&bytes[offset..offset + RECORD_SIZE])
            .map_err(|_| FitsError::Malformed("non-ASCII header record".to_string()))?;
        offset += RECORD_SIZE;
        // Multi-byte characters straddling the field boundaries make the
        // record garbage, not a panic.
        let keyword = record
            .get(..8)
            .map(str::trim_end)
            .ok_or_else(|| FitsError::Malformed("header record split mid-character".to_string()))?;
        if keyword == "END" {
            saw_end = true;
            break;
        }
        if record.get(8..10) == Some("= ") {
            cards.insert(keyword.to_string(), parse_value(record));
        }
    }
    if !saw_end {
        return Err(FitsError::Malformed("missing END card".to_string()));
    }
    let data_start = offset.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;

    let need = |k: &str| -> Result<i64, FitsError> {
        cards
            .get(k)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| FitsError::Malformed(format!("missing {k} card")))
    };
    let bitpix = need("BITPIX")?;
    let naxis = need("NAXIS")?;
    let width = need("NAXIS1")? as u32;
    let height = need("NAXIS2")? as u32;
    let planes: u8 = if naxis == 3 { need("NAXIS3")? as u8 } else { 1 };
    let bzero = cards
        .get("BZERO")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);

    let bpp = match bitpix {
        8 => 8u8,
        16 => 16,
        32 => 32,
        other => {
            return Err(FitsError::Malformed(format!("unsupported BITPIX {other}")));
        }
    };
    let elements = width as usize * height as usize * planes as usize;
    let data_len = elements * (bpp as usize / 8);
    if bytes.len() < data_start + data_len {
        return Err(FitsError::Malformed("truncated data unit".to_string()));
    }
    let raw = &bytes[data_start..data_start + data_len];

    let mut reader = raw;
    let mut data = Vec::with_capacity(data_len);
    match bpp {
        8 => {
            reader.read_to_end(&mut data)?;
        }
        16 => {
            for chunk in raw.chunks_exact(2) {
                let stored = i16::from_be_bytes([chunk[0], chunk[1]]);
                let sample = if bzero == BZERO_U16 {
                    (i32::from(stored) + BZERO_U16 as i32) as u16
                } else {
                    stored as u16
                };
                data.extend_from_slice(&sample.to_ne_bytes());
            }
        }
        32 => {
            for chunk in raw.chunks_exact(4) {
                let stored = i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let sample = if bzero == BZERO_U32 {
                    (i64::from(stored) + BZERO_U32) as u32
                } else {
                    stored as u32
                };
                data.extend_from_slice(&sample.to_ne_bytes());
            }
        }
        _ => unreachable!(),
    }

    Ok(ParsedFits {
        width,
        height,
        planes,
        bpp,
        data,
        cards,
    })
}
