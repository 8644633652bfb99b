//! Tag MAC state machine: power gating, slot counter, and the
//! Query/QueryRep/ACK/Req_RN/Read command handlers.
//!
//! CRC5/CRC16 fields are never computed here — they are opaque payloads
//! carried end to end from command to reply; the only field a tag actually
//! checks is the `rn`/handle it was given.

use crate::codec::{Command, Reply};
use crate::error::SimError;
use crate::types::{Antenna, MemoryBank};
use rand::Rng;

/// Tag MAC state. `OPEN` and `KILLED` are reserved for operations this
/// simulator doesn't model (Lock, Kill) but are kept in the enum so a
/// future handler slots in without renumbering anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagState {
    Off,
    Ready,
    Arbitrate,
    Reply,
    Acknowledged,
    Open,
    Secured,
    Killed,
}

/// Slot counters wrap within a 15-bit field (`Q` is bounded to `0..=15`,
/// so the largest slot count is `2^15 - 1`).
const SLOT_WRAP: u16 = 0x7FFF;

/// A single tag's persistent memory banks and MAC state.
pub struct Tag {
    pub id: usize,
    pub epc: Vec<u8>,
    pub tid: Vec<u8>,
    pub user: Vec<u8>,
    pub reserved: Vec<u8>,
    pub sensitivity_dbm: f64,
    pub antenna: Antenna,
    pub state: TagState,
    pub energized: bool,
    slot: u16,
    rn16: u16,
}

impl Tag {
    pub fn new(id: usize, epc: Vec<u8>, tid: Vec<u8>, user: Vec<u8>, sensitivity_dbm: f64) -> Self {
        Tag {
            id,
            epc,
            tid,
            user,
            reserved: vec![0u8; 8],
            sensitivity_dbm,
            antenna: Antenna::default(),
            state: TagState::Off,
            energized: false,
            slot: 0,
            rn16: 0,
        }
    }

    pub fn with_antenna(mut self, antenna: Antenna) -> Self {
        self.antenna = antenna;
        self
    }

    /// Reevaluates power state from the currently received signal strength,
    /// returning the `(from, to)` state transition if one occurred. Crossing
    /// below sensitivity always forces `OFF`, clearing cached singulation
    /// state; crossing above it from `OFF` powers the tag on into `READY`.
    pub fn update_power(&mut self, rx_power_dbm: f64) -> Option<(TagState, TagState)> {
        let in_range = rx_power_dbm >= self.sensitivity_dbm;
        if in_range && !self.energized {
            let from = self.state;
            self.energized = true;
            self.state = TagState::Ready;
            Some((from, self.state))
        } else if !in_range && self.energized {
            let from = self.state;
            self.energized = false;
            self.state = TagState::Off;
            self.slot = 0;
            self.rn16 = 0;
            Some((from, self.state))
        } else {
            None
        }
    }

    fn draws_slot(&mut self, q: u8, rng: &mut impl Rng) -> Option<Reply> {
        let span = 1u32 << q;
        self.slot = rng.gen_range(0..span) as u16;
        if self.slot == 0 {
            self.state = TagState::Reply;
            self.rn16 = rng.gen();
            Some(Reply::Query { rn16: self.rn16 })
        } else {
            self.state = TagState::Arbitrate;
            None
        }
    }

    /// Query is accepted from any state but `OFF`/`KILLED`: a tag mid-round
    /// that hears a fresh Query simply restarts arbitration with a new slot
    /// draw.
    pub fn handle_query(&mut self, q: u8, rng: &mut impl Rng) -> Option<Reply> {
        if !self.energized || matches!(self.state, TagState::Off | TagState::Killed) {
            return None;
        }
        self.draws_slot(q, rng)
    }

    /// Advances the slot counter on a QueryRep: `slot - 1` if
    /// `slot > 0`, else wraps to `0x7FFF`. Slot 0 after the decrement means
    /// this tag replies now.
    pub fn handle_query_rep(&mut self, rng: &mut impl Rng) -> Option<Reply> {
        if !self.energized || matches!(self.state, TagState::Off | TagState::Ready | TagState::Killed) {
            return None;
        }
        self.slot = if self.slot > 0 { self.slot - 1 } else { SLOT_WRAP };
        if self.slot == 0 {
            self.state = TagState::Reply;
            self.rn16 = rng.gen();
            Some(Reply::Query { rn16: self.rn16 })
        } else {
            None
        }
    }

    /// Validates the ACK's echoed RN16 and, if it matches, replies with the
    /// tag's EPC, moving the tag to ACKNOWLEDGED.
    pub fn handle_ack(&mut self, rn: u16) -> Option<Reply> {
        if self.state != TagState::Reply {
            return None;
        }
        if rn != self.rn16 {
            let err = SimError::ProtocolViolation(format!(
                "ack rn {rn:#06x} does not match stored rn16 {:#06x}",
                self.rn16
            ));
            log::debug!("{err}");
            return None;
        }
        self.state = TagState::Acknowledged;
        Some(Reply::Ack {
            epc: self.epc.clone(),
            pc: (self.epc.len() as u16 / 2) << 11,
            crc16: 0,
        })
    }

    /// Validates Req_RN's echoed RN16 and issues a fresh one, moving the tag
    /// into the SECURED (access) state.
    pub fn handle_req_rn(&mut self, rn: u16, rng: &mut impl Rng) -> Option<Reply> {
        if !matches!(self.state, TagState::Acknowledged | TagState::Secured) {
            return None;
        }
        if rn != self.rn16 {
            let err = SimError::ProtocolViolation(format!(
                "req_rn rn {rn:#06x} does not match stored rn16 {:#06x}",
                self.rn16
            ));
            log::debug!("{err}");
            return None;
        }
        self.rn16 = rng.gen();
        self.state = TagState::Secured;
        Some(Reply::ReqRn {
            rn16: self.rn16,
            crc16: 0,
        })
    }

    /// Validates Read's echoed RN16 and returns the requested memory words
    /// or a `header = true` (error) reply when the address
    /// range is invalid. Stays in `SECURED`.
    pub fn handle_read(
        &mut self,
        bank: MemoryBank,
        word_ptr: u64,
        word_count: u8,
        rn: u16,
    ) -> Result<Option<Reply>, SimError> {
        if self.state != TagState::Secured {
            return Ok(None);
        }
        if rn != self.rn16 {
            let err = SimError::ProtocolViolation(format!(
                "read rn {rn:#06x} does not match stored rn16 {:#06x}",
                self.rn16
            ));
            log::debug!("{err}");
            return Ok(None);
        }
        let mem = match bank {
            MemoryBank::Reserved => &self.reserved,
            MemoryBank::Epc => &self.epc,
            MemoryBank::Tid => &self.tid,
            MemoryBank::User => &self.user,
        };
        let start = (word_ptr as usize) * 2;
        let len = (word_count as usize) * 2;
        let end = start
            .checked_add(len)
            .ok_or_else(|| SimError::InvalidArgument("read range overflowed".into()))?;
        if end > mem.len() {
            return Ok(Some(Reply::Read {
                data: Vec::new(),
                rn16: self.rn16,
                crc16: 0,
                header: true,
            }));
        }
        Ok(Some(Reply::Read {
            data: mem[start..end].to_vec(),
            rn16: self.rn16,
            crc16: 0,
            header: false,
        }))
    }

    /// Dispatches any reader command to the matching handler, for callers
    /// that don't need per-command typing (the channel's collision path).
    pub fn handle_command(&mut self, cmd: &Command, rng: &mut impl Rng) -> Result<Option<Reply>, SimError> {
        match cmd {
            Command::Query(p) => Ok(self.handle_query(p.q, rng)),
            Command::QueryRep { .. } => Ok(self.handle_query_rep(rng)),
            Command::Ack { rn } => Ok(self.handle_ack(*rn)),
            Command::ReqRn { rn, .. } => Ok(self.handle_req_rn(*rn, rng)),
            Command::Read {
                bank,
                word_ptr,
                word_count,
                rn,
                ..
            } => self.handle_read(*bank, *word_ptr, *word_count, *rn),
        }
    }
}
