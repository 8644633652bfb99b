//! Reader MAC driver: drives a round/slot loop with `log::{debug, warn}`
//! around every state transition, and a struct of tunables instead of free
//! functions.

use crate::codec::{Command, QueryParams, Reply};
use crate::types::{
    Antenna, DivideRatio, InventoryFlag, MemoryBank, SelFlag, Session, TagEncoding, TempRange,
};

/// Reader-side tunables for one inventory session. Immutable once a
/// [`Reader`] is built — no mutable process-wide singleton.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderConfig {
    pub tari: f64,
    pub rtcal: f64,
    pub trcal: f64,
    pub delim: f64,
    pub dr: DivideRatio,
    pub m: TagEncoding,
    pub trext: bool,
    pub sel: SelFlag,
    pub session: Session,
    pub target: InventoryFlag,
    pub q: u8,
    pub temp: TempRange,
    pub tx_power_dbm: f64,
    /// Ordered antenna set the reader cycles through one-per-round. Must be
    /// non-empty.
    pub antennas: Vec<Antenna>,
    pub read_bank: MemoryBank,
    pub read_word_ptr: u64,
    pub read_word_count: u8,
}

/// What the reader is currently waiting on a reply for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AwaitingRn16,
    AwaitingEpc,
    AwaitingHandle,
    AwaitingData,
}

/// One singulated tag's record, built up across a slot's ACK/Req_RN/Read exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoriedTag {
    pub epc: Vec<u8>,
    pub data: Vec<u8>,
}

/// Drives a Q-slotted-ALOHA inventory round: one Query, up to `2^Q - 1`
/// QueryRep-delimited slots, and a full ACK/Req_RN/Read exchange whenever a
/// slot singulates a tag cleanly.
pub struct Reader {
    pub config: ReaderConfig,
    phase: Phase,
    slot: u32,
    slots_in_round: u32,
    rn16: u16,
    handle: u16,
    pending_epc: Vec<u8>,
    current_antenna_index: usize,
    pub round: u64,
    pub inventory: Vec<InventoriedTag>,
}

impl Reader {
    pub fn new(config: ReaderConfig) -> Self {
        assert!(!config.antennas.is_empty(), "a reader needs at least one antenna");
        let slots_in_round = 1u32 << config.q;
        Reader {
            config,
            phase: Phase::Idle,
            slot: 0,
            slots_in_round,
            rn16: 0,
            handle: 0,
            pending_epc: Vec::new(),
            current_antenna_index: 0,
            round: 0,
            inventory: Vec::new(),
        }
    }

    /// The antenna currently selected for transmission and reception.
    pub fn current_antenna(&self) -> Antenna {
        self.config.antennas[self.current_antenna_index]
    }

    /// Rotates to the next antenna in the configured list, wrapping around.
    fn rotate_antenna(&mut self) {
        self.current_antenna_index = (self.current_antenna_index + 1) % self.config.antennas.len();
    }

    /// The slot currently in progress (or just completed), for observers
    /// that want to report slot boundaries.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Begins a fresh inventory round, returning the Query to transmit.
    pub fn begin_round(&mut self) -> Command {
        self.round += 1;
        self.slot = 0;
        self.slots_in_round = 1u32 << self.config.q;
        self.phase = Phase::AwaitingRn16;
        log::debug!("round {} begins, Q={}", self.round, self.config.q);
        Command::Query(QueryParams {
            dr: self.config.dr,
            m: self.config.m,
            trext: self.config.trext,
            sel: self.config.sel,
            session: self.config.session,
            target: self.config.target,
            q: self.config.q,
            crc5: 0,
        })
    }

    /// Advances to the next slot, or `None` if the round is complete. A
    /// round completing also rotates to the next configured antenna, per
    /// the standard's end-of-round antenna switch.
    fn advance_slot(&mut self) -> Option<Command> {
        self.slot += 1;
        if self.slot >= self.slots_in_round {
            self.phase = Phase::Idle;
            self.rotate_antenna();
            log::debug!(
                "round {} ends after {} slots, antenna -> {}",
                self.round,
                self.slots_in_round,
                self.current_antenna_index
            );
            return None;
        }
        self.phase = Phase::AwaitingRn16;
        Some(Command::QueryRep {
            session: self.config.session,
        })
    }

    /// A slot timed out without a usable reply (spec timer T1/T2/T3): move on.
    pub fn on_timeout(&mut self) -> Option<Command> {
        log::warn!("round {} slot {} timed out in phase {:?}", self.round, self.slot, self.phase);
        self.advance_slot()
    }

    /// Processes a successfully received reply, returning the reader's next
    /// command if the exchange continues, or `None` once the slot is done.
    pub fn on_reply(&mut self, reply: &Reply) -> Option<Command> {
        match (self.phase, reply) {
            (Phase::AwaitingRn16, Reply::Query { rn16 }) => {
                self.rn16 = *rn16;
                self.phase = Phase::AwaitingEpc;
                Some(Command::Ack { rn: *rn16 })
            }
            (Phase::AwaitingEpc, Reply::Ack { epc, .. }) => {
                self.pending_epc = epc.clone();
                self.phase = Phase::AwaitingHandle;
                Some(Command::ReqRn {
                    rn: self.rn16,
                    crc16: 0,
                })
            }
            (Phase::AwaitingHandle, Reply::ReqRn { rn16, .. }) => {
                self.handle = *rn16;
                self.phase = Phase::AwaitingData;
                Some(Command::Read {
                    bank: self.config.read_bank,
                    word_ptr: self.config.read_word_ptr,
                    word_count: self.config.read_word_count,
                    rn: self.handle,
                    crc16: 0,
                })
            }
            (Phase::AwaitingData, Reply::Read { data, header, .. }) => {
                if !header {
                    self.inventory.push(InventoriedTag {
                        epc: std::mem::take(&mut self.pending_epc),
                        data: data.clone(),
                    });
                } else {
                    log::warn!("round {} slot {} read reported an error header", self.round, self.slot);
                }
                self.advance_slot()
            }
            (phase, reply) => {
                log::warn!("unexpected reply {reply:?} in phase {phase:?}, ignoring");
                None
            }
        }
    }

    pub fn is_round_complete(&self) -> bool {
        self.phase == Phase::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReaderConfig {
        ReaderConfig {
            tari: 6.25e-6,
            rtcal: 18.75e-6,
            trcal: 56.25e-6,
            delim: 12.5e-6,
            dr: DivideRatio::Dr8,
            m: TagEncoding::M4,
            trext: false,
            sel: SelFlag::All,
            session: Session::S0,
            target: InventoryFlag::A,
            q: 2,
            temp: TempRange::Nominal,
            tx_power_dbm: 30.0,
            antennas: vec![Antenna::default()],
            read_bank: MemoryBank::Tid,
            read_word_ptr: 0,
            read_word_count: 2,
        }
    }

    #[test]
    fn begin_round_issues_query_with_configured_q() {
        let mut reader = Reader::new(config());
        match reader.begin_round() {
            Command::Query(p) => assert_eq!(p.q, 2),
            other => panic!("expected Query, got {other:?}"),
        }
        assert_eq!(reader.slots_in_round, 4);
    }

    #[test]
    fn full_slot_exchange_records_inventory() {
        let mut reader = Reader::new(config());
        reader.begin_round();
        let ack = reader
            .on_reply(&Reply::Query { rn16: 0xBEEF })
            .expect("should ack");
        assert_eq!(ack, Command::Ack { rn: 0xBEEF });

        let reqrn = reader
            .on_reply(&Reply::Ack {
                epc: vec![0xAA; 12],
                pc: 0,
                crc16: 0,
            })
            .expect("should req_rn");
        assert!(matches!(reqrn, Command::ReqRn { rn: 0xBEEF, .. }));

        let read = reader
            .on_reply(&Reply::ReqRn {
                rn16: 0xCAFE,
                crc16: 0,
            })
            .expect("should read");
        assert!(matches!(read, Command::Read { rn: 0xCAFE, .. }));

        let next = reader.on_reply(&Reply::Read {
            data: vec![1, 2, 3, 4],
            rn16: 0xCAFE,
            crc16: 0,
            header: false,
        });
        assert!(matches!(next, Some(Command::QueryRep { .. })));
        assert_eq!(reader.inventory.len(), 1);
        assert_eq!(reader.inventory[0].epc, vec![0xAA; 12]);
        assert_eq!(reader.inventory[0].data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn timeout_advances_slot_without_recording_inventory() {
        let mut reader = Reader::new(config());
        reader.begin_round();
        let next = reader.on_timeout();
        assert!(matches!(next, Some(Command::QueryRep { .. })));
        assert!(reader.inventory.is_empty());
    }

    #[test]
    fn round_completes_after_last_slot() {
        let mut reader = Reader::new(config());
        reader.begin_round();
        let mut commands = 0;
        while reader.on_timeout().is_some() {
            commands += 1;
        }
        assert_eq!(commands, reader.slots_in_round - 1);
        assert!(reader.is_round_complete());
    }

    #[test]
    fn antenna_rotates_after_round_completes() {
        let mut config = config();
        config.antennas = vec![
            Antenna::new([0.0; 3], [1.0, 0.0, 0.0], 1.0),
            Antenna::new([1.0; 3], [0.0, 1.0, 0.0], 2.0),
        ];
        let mut reader = Reader::new(config);
        assert_eq!(reader.current_antenna().gain, 1.0);
        reader.begin_round();
        while reader.on_timeout().is_some() {}
        assert_eq!(reader.current_antenna().gain, 2.0);
        reader.begin_round();
        while reader.on_timeout().is_some() {}
        assert_eq!(reader.current_antenna().gain, 1.0);
    }

    #[test]
    fn unexpected_reply_is_ignored_without_panicking() {
        let mut reader = Reader::new(config());
        reader.begin_round();
        let result = reader.on_reply(&Reply::ReqRn { rn16: 1, crc16: 0 });
        assert_eq!(result, None);
    }
}
