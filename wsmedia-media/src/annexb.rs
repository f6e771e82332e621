//! H.264 Annex B parsing
//!
//! Splits a raw elementary stream into NAL units by locating start codes
//! (`00 00 01` or `00 00 00 01`). Nothing beyond the NAL header byte is
//! interpreted.

use crate::error::MediaError;

/// Smallest buffer that can hold a start code plus a NAL header
pub const MIN_ANNEXB_LEN: usize = 4;

/// Four-byte Annex B start code used when re-framing NAL units
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

const SHORT_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// NAL unit types (low 5 bits of the NAL header)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// Non-IDR slice (P or B frame)
    NonIdrSlice,
    /// IDR slice (keyframe)
    IdrSlice,
    /// Supplemental enhancement information
    Sei,
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// Access unit delimiter
    Aud,
    /// Any other type, ignored by the frame sources
    Other(u8),
}

impl From<u8> for NalUnitType {
    fn from(header: u8) -> Self {
        match header & 0x1F {
            1 => NalUnitType::NonIdrSlice,
            5 => NalUnitType::IdrSlice,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::Aud,
            n => NalUnitType::Other(n),
        }
    }
}

impl NalUnitType {
    /// Classify a NAL unit by its header byte
    pub fn of(nal: &[u8]) -> Option<Self> {
        nal.first().map(|&header| NalUnitType::from(header))
    }

    /// Check if this is a slice carrying picture data
    pub fn is_slice(&self) -> bool {
        matches!(self, NalUnitType::NonIdrSlice | NalUnitType::IdrSlice)
    }

    /// Check if this is a parameter set (SPS/PPS)
    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NalUnitType::Sps | NalUnitType::Pps)
    }
}

/// Split an Annex B buffer into NAL units.
///
/// The returned slices borrow from `data`, exclude their start codes and are
/// in stream order. Spans between back-to-back start codes are dropped.
pub fn split_annexb(data: &[u8]) -> Result<Vec<&[u8]>, MediaError> {
    if data.len() < MIN_ANNEXB_LEN {
        return Err(MediaError::BufferTooSmall { len: data.len() });
    }

    let mut start = leading_start_code_len(data).ok_or(MediaError::MalformedStream)?;
    let mut nalus = Vec::new();

    while start < data.len() {
        match find_start_code(data, start) {
            Some((code_pos, code_len)) => {
                if code_pos > start {
                    nalus.push(&data[start..code_pos]);
                }
                start = code_pos + code_len;
            }
            None => {
                nalus.push(&data[start..]);
                break;
            }
        }
    }

    if nalus.is_empty() {
        return Err(MediaError::NoNalusFound);
    }
    Ok(nalus)
}

fn leading_start_code_len(data: &[u8]) -> Option<usize> {
    if data.starts_with(&SHORT_START_CODE) {
        Some(SHORT_START_CODE.len())
    } else if data.starts_with(&START_CODE) {
        Some(START_CODE.len())
    } else {
        None
    }
}

/// Find the next start code at or after `from`, returning its position and length
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut pos = from;
    while pos + 2 < data.len() {
        if data[pos + 2] > 1 {
            // No start code can end at pos + 2, skip ahead
            pos += 3;
            continue;
        }
        if data[pos] == 0 && data[pos + 1] == 0 && data[pos + 2] == 1 {
            // A zero just before belongs to a 4-byte start code
            if pos > from && data[pos - 1] == 0 {
                return Some((pos - 1, START_CODE.len()));
            }
            return Some((pos, SHORT_START_CODE.len()));
        }
        pos += 1;
    }
    None
}
