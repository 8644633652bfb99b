//! Bit-exact protocol enumerations and minimal boundary geometry types.
//!
//! Every enum here carries its wire code alongside the value a formula needs
//! (`DivideRatio::value`, `TagEncoding::symbols_per_bit`, ...): code plus
//! derived accessor, with a `from_*` parse helper where a reply needs one
//! decoded back.

use crate::error::SimError;

/// Divide ratio, selects the tag-to-reader backscatter divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DivideRatio {
    Dr8,
    Dr643,
}

impl DivideRatio {
    pub fn code(self) -> &'static str {
        match self {
            DivideRatio::Dr8 => "0",
            DivideRatio::Dr643 => "1",
        }
    }

    /// Numeric DR value used in `BLF = value / TRcal`.
    pub fn value(self) -> f64 {
        match self {
            DivideRatio::Dr8 => 8.0,
            DivideRatio::Dr643 => 64.0 / 3.0,
        }
    }
}

/// Inventoried-flag session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Session {
    S0,
    S1,
    S2,
    S3,
}

impl Session {
    pub fn code(self) -> &'static str {
        match self {
            Session::S0 => "00",
            Session::S1 => "01",
            Session::S2 => "10",
            Session::S3 => "11",
        }
    }
}

/// Tag backscatter encoding (FM0 or Miller M2/M4/M8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagEncoding {
    Fm0,
    M2,
    M4,
    M8,
}

impl TagEncoding {
    pub fn code(self) -> &'static str {
        match self {
            TagEncoding::Fm0 => "00",
            TagEncoding::M2 => "01",
            TagEncoding::M4 => "10",
            TagEncoding::M8 => "11",
        }
    }

    /// Symbols transmitted per encoded bit (`spb` in the timing formulas).
    pub fn symbols_per_bit(self) -> f64 {
        match self {
            TagEncoding::Fm0 => 1.0,
            TagEncoding::M2 => 2.0,
            TagEncoding::M4 => 4.0,
            TagEncoding::M8 => 8.0,
        }
    }

    /// Maps the `M` field's numeric value (1, 2, 4 or 8) to an encoding.
    pub fn from_m(m: u32) -> Result<Self, SimError> {
        match m {
            1 => Ok(TagEncoding::Fm0),
            2 => Ok(TagEncoding::M2),
            4 => Ok(TagEncoding::M4),
            8 => Ok(TagEncoding::M8),
            other => Err(SimError::InvalidArgument(format!(
                "m must be 1, 2, 4 or 8, but {other} found"
            ))),
        }
    }
}

/// Inventory flag (A/B) carried by Query/tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryFlag {
    A,
    B,
}

impl InventoryFlag {
    pub fn code(self) -> &'static str {
        match self {
            InventoryFlag::A => "0",
            InventoryFlag::B => "1",
        }
    }
}

/// `Sel` field of Query: which tags are eligible to respond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelFlag {
    All,
    NotSel,
    Sel,
}

impl SelFlag {
    pub fn code(self) -> &'static str {
        match self {
            SelFlag::All => "00",
            SelFlag::NotSel => "10",
            SelFlag::Sel => "11",
        }
    }
}

/// Tag memory bank addressed by Read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryBank {
    Reserved,
    Epc,
    Tid,
    User,
}

impl MemoryBank {
    pub fn code(self) -> &'static str {
        match self {
            MemoryBank::Reserved => "00",
            MemoryBank::Epc => "01",
            MemoryBank::Tid => "10",
            MemoryBank::User => "11",
        }
    }
}

/// Reader command opcode, fixed leading bit pattern per the standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    Query,
    QueryRep,
    Ack,
    ReqRn,
    Read,
}

impl CommandCode {
    pub fn code(self) -> &'static str {
        match self {
            CommandCode::Query => "1000",
            CommandCode::QueryRep => "00",
            CommandCode::Ack => "01",
            CommandCode::ReqRn => "11000001",
            CommandCode::Read => "11000010",
        }
    }
}

/// Temperature range, selects which FRT step table applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TempRange {
    Nominal,
    Extended,
}

/// A 3-component position/orientation vector. The simulator never performs
/// vector algebra on it — it is a pass-through carrier for the injected
/// `path_loss` closure, which owns all mobility/geometry math.
pub type Vec3 = [f64; 3];

/// Minimal antenna description consumed by the injected path-loss function.
/// Radiation pattern shape is folded into that closure rather than carried
/// as a second injected function, since the core only ever needs the
/// resulting dB figure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Antenna {
    pub position: Vec3,
    pub orientation: Vec3,
    pub gain: f64,
}

impl Antenna {
    pub fn new(position: Vec3, orientation: Vec3, gain: f64) -> Self {
        Antenna {
            position,
            orientation,
            gain,
        }
    }
}

impl Default for Antenna {
    fn default() -> Self {
        Antenna {
            position: [0.0, 0.0, 0.0],
            orientation: [1.0, 0.0, 0.0],
            gain: 0.0,
        }
    }
}
