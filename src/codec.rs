//! Bit-exact encoding of reader commands and tag replies.
//!
//! The bitstring is the source of truth for `bitlen`: every `Command`/`Reply`
//! exposes `encode()` (or, for replies, a length formula) and `bitlen()`
//! derives from it rather than the other way round.

use crate::error::SimError;
use crate::types::{CommandCode, InventoryFlag, MemoryBank, Session, TagEncoding};

/// Encodes `value` as `"1"` or `"0"`.
pub fn encode_bool(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Encodes `value` as an `n_bits`-wide big-endian binary string, wrapping
/// modulo `2^n_bits`.
pub fn encode_int(value: u32, n_bits: u32) -> String {
    let modulus = 1u64 << n_bits;
    let wrapped = (value as u64) % modulus;
    format!("{:0width$b}", wrapped, width = n_bits as usize)
}

pub fn encode_word(value: u16) -> String {
    encode_int(value as u32, 16)
}

pub fn encode_byte(value: u8) -> String {
    encode_int(value as u32, 8)
}

/// Extensible Bit Vector encoding: 8-bit blocks, MSB block's MSB clear,
/// continuation blocks' MSB set, most-significant block first.
pub fn encode_ebv(value: u64) -> String {
    encode_ebv_block(value, true)
}

fn encode_ebv_block(value: u64, first_block: bool) -> String {
    let prefix = if first_block { '0' } else { '1' };
    if value < 128 {
        format!("{prefix}{:07b}", value)
    } else {
        format!(
            "{}{}",
            encode_ebv_block(value >> 7, false),
            encode_ebv_block(value % 128, first_block)
        )
    }
}

/// Decodes an EBV bitstring back to its integer value (used by round-trip tests).
pub fn decode_ebv(bits: &str) -> Result<u64, SimError> {
    if bits.is_empty() || bits.len() % 8 != 0 {
        return Err(SimError::InvalidArgument(
            "EBV bitstring must be a non-empty multiple of 8 bits".into(),
        ));
    }
    let mut value: u64 = 0;
    for block in bits.as_bytes().chunks(8) {
        let block = std::str::from_utf8(block).unwrap();
        let continues = &block[0..1] == "1";
        let payload = u64::from_str_radix(&block[1..], 2)
            .map_err(|e| SimError::InvalidArgument(e.to_string()))?;
        value = (value << 7) | payload;
        if !continues {
            return Ok(value);
        }
    }
    Err(SimError::InvalidArgument(
        "EBV bitstring ended mid-continuation".into(),
    ))
}

/// Parameters for a Query command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryParams {
    pub dr: crate::types::DivideRatio,
    pub m: TagEncoding,
    pub trext: bool,
    pub sel: crate::types::SelFlag,
    pub session: Session,
    pub target: InventoryFlag,
    pub q: u8,
    pub crc5: u8,
}

/// The five reader commands, as a tagged variant rather than a dynamic-dispatch
/// trait object.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Query(QueryParams),
    QueryRep { session: Session },
    Ack { rn: u16 },
    ReqRn { rn: u16, crc16: u16 },
    Read {
        bank: MemoryBank,
        word_ptr: u64,
        word_count: u8,
        rn: u16,
        crc16: u16,
    },
}

impl Command {
    pub fn code(&self) -> CommandCode {
        match self {
            Command::Query(_) => CommandCode::Query,
            Command::QueryRep { .. } => CommandCode::QueryRep,
            Command::Ack { .. } => CommandCode::Ack,
            Command::ReqRn { .. } => CommandCode::ReqRn,
            Command::Read { .. } => CommandCode::Read,
        }
    }

    /// Validates field ranges (Q bounded, CRC5 a 5-bit field). Called by the
    /// reader MAC before a command is queued for transmission.
    pub fn validate(&self) -> Result<(), SimError> {
        if let Command::Query(p) = self {
            if p.q > 15 {
                return Err(SimError::InvalidArgument(format!(
                    "Q must be in 0..=15, but {} found",
                    p.q
                )));
            }
        }
        Ok(())
    }

    /// Encodes the command to its bit-exact `'0'/'1'` wire representation.
    pub fn encode(&self) -> String {
        match self {
            Command::Query(p) => format!(
                "{}{}{}{}{}{}{}{}{}",
                self.code().code(),
                p.dr.code(),
                p.m.code(),
                encode_bool(p.trext),
                p.sel.code(),
                p.session.code(),
                p.target.code(),
                encode_int(p.q as u32, 4),
                encode_int(p.crc5 as u32, 5),
            ),
            Command::QueryRep { session } => format!("{}{}", self.code().code(), session.code()),
            Command::Ack { rn } => format!("{}{}", self.code().code(), encode_word(*rn)),
            Command::ReqRn { rn, crc16 } => format!(
                "{}{}{}",
                self.code().code(),
                encode_word(*rn),
                encode_word(*crc16)
            ),
            Command::Read {
                bank,
                word_ptr,
                word_count,
                rn,
                crc16,
            } => format!(
                "{}{}{}{}{}{}",
                self.code().code(),
                bank.code(),
                encode_ebv(*word_ptr),
                encode_byte(*word_count),
                encode_word(*rn),
                encode_word(*crc16),
            ),
        }
    }

    pub fn bitlen(&self) -> usize {
        self.encode().len()
    }

    /// `true` for a Query command, used by [`crate::timing::reader_frame_duration`]
    /// to pick the right reader preamble — detected on the leading bits so it
    /// also works on a bare `&str` wire image.
    pub fn is_query(&self) -> bool {
        matches!(self, Command::Query(_))
    }
}

/// `true` if `bits` starts with the Query opcode.
pub fn bits_are_query(bits: &str) -> bool {
    bits.starts_with(CommandCode::Query.code())
}

/// Tag replies. `bitlen` is a closed formula per reply kind rather than
/// derived from an encoded string — the tag-side bit pattern is never
/// constructed explicitly, only its length matters for timing and
/// reception-success calculations.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Query { rn16: u16 },
    Ack { epc: Vec<u8>, pc: u16, crc16: u16 },
    ReqRn { rn16: u16, crc16: u16 },
    Read {
        data: Vec<u8>,
        rn16: u16,
        crc16: u16,
        header: bool,
    },
}

impl Reply {
    pub fn bitlen(&self) -> usize {
        match self {
            Reply::Query { .. } => 16,
            Reply::Ack { epc, .. } => 32 + epc.len() * 8,
            Reply::ReqRn { .. } => 32,
            Reply::Read { data, .. } => 33 + data.len() * 8,
        }
    }
}

/// Converts a hex string to owned bytes, rejecting malformed input explicitly
/// rather than panicking partway through.
pub fn hex_to_bytes(epc_hex: &str) -> Result<Vec<u8>, SimError> {
    if epc_hex.len() % 2 != 0 {
        return Err(SimError::InvalidArgument(format!(
            "hex string must have even length, got {} chars",
            epc_hex.len()
        )));
    }
    (0..epc_hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&epc_hex[i..i + 2], 16)
                .map_err(|e| SimError::InvalidArgument(e.to_string()))
        })
        .collect()
}
