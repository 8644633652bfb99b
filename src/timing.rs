//! Link timing: preambles, frame durations and the T1..T7 family.
//!
//! All durations are seconds, all frequencies Hz, throughout.

use crate::codec::{bits_are_query, Command, Reply};
use crate::error::SimError;
use crate::types::{DivideRatio, TagEncoding, TempRange};

pub const DEFAULT_DELIM: f64 = 12.5e-6;

/// Reader-to-tag sync preamble: `{Delim, Tari, RTcal}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReaderSync {
    pub tari: f64,
    pub rtcal: f64,
    pub delim: f64,
}

impl ReaderSync {
    pub fn new(tari: f64, rtcal: f64) -> Self {
        ReaderSync {
            tari,
            rtcal,
            delim: DEFAULT_DELIM,
        }
    }

    pub fn with_delim(tari: f64, rtcal: f64, delim: f64) -> Self {
        ReaderSync { tari, rtcal, delim }
    }

    pub fn data0(&self) -> f64 {
        self.tari
    }

    pub fn data1(&self) -> f64 {
        self.rtcal - self.tari
    }

    pub fn duration(&self) -> f64 {
        self.delim + self.tari + self.rtcal
    }
}

/// Full reader preamble (sync + TRcal), used ahead of Query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReaderPreamble {
    pub sync: ReaderSync,
    pub trcal: f64,
}

impl ReaderPreamble {
    pub fn new(tari: f64, rtcal: f64, trcal: f64, delim: f64) -> Self {
        ReaderPreamble {
            sync: ReaderSync::with_delim(tari, rtcal, delim),
            trcal,
        }
    }

    pub fn duration(&self) -> f64 {
        self.sync.duration() + self.trcal
    }
}

/// Tag-side preamble, FM0 or Miller-coded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TagPreamble {
    Fm0 { extended: bool },
    Miller { encoding: TagEncoding, extended: bool },
}

impl TagPreamble {
    pub fn new(encoding: TagEncoding, extended: bool) -> Self {
        match encoding {
            TagEncoding::Fm0 => TagPreamble::Fm0 { extended },
            other => TagPreamble::Miller {
                encoding: other,
                extended,
            },
        }
    }

    pub fn encoding(&self) -> TagEncoding {
        match self {
            TagPreamble::Fm0 { .. } => TagEncoding::Fm0,
            TagPreamble::Miller { encoding, .. } => *encoding,
        }
    }

    pub fn bitlen(&self) -> usize {
        match self {
            TagPreamble::Fm0 { extended } => if *extended { 18 } else { 6 },
            TagPreamble::Miller { extended, .. } => if *extended { 22 } else { 10 },
        }
    }

    pub fn duration(&self, blf: f64) -> f64 {
        (self.bitlen() as f64 * self.encoding().symbols_per_bit()) / blf
    }
}

/// `BLF = DR / TRcal`.
pub fn blf(dr: DivideRatio, trcal: f64) -> f64 {
    dr.value() / trcal
}

/// `PRI = TRcal / DR = 1 / BLF`.
pub fn pri(trcal: f64, dr: DivideRatio) -> f64 {
    trcal / dr.value()
}

/// Tag bitrate in bits/second for the given encoding.
pub fn tag_bitrate(dr: DivideRatio, trcal: f64, encoding: TagEncoding) -> f64 {
    blf(dr, trcal) / encoding.symbols_per_bit()
}

/// FRT lookup, piecewise-constant in `trcal`. `trcal` is in seconds; the
/// published table is in microseconds, converted here.
pub fn frt(trcal: f64, dr: DivideRatio, temp: TempRange) -> f64 {
    const DR8_NOMINAL: &[(f64, f64)] = &[
        (25.0, 0.19),
        (25.25, 0.10),
        (30.9375, 0.12),
        (49.50, 0.10),
        (75.00, 0.07),
        (202.0, 0.04),
    ];
    const DR8_EXTENDED: &[(f64, f64)] = &[
        (24.75, 0.19),
        (30.9375, 0.15),
        (49.50, 0.10),
        (75.00, 0.07),
        (202.0, 0.04),
    ];
    const DR643_NOMINAL: &[(f64, f64)] = &[
        (33.633, 0.15),
        (66.033, 0.22),
        (67.367, 0.10),
        (82.467, 0.12),
        (131.967, 0.10),
        (198.00, 0.07),
        (227.25, 0.05),
    ];
    const DR643_EXTENDED: &[(f64, f64)] = &[
        (33.633, 0.15),
        (66.033, 0.22),
        (82.467, 0.15),
        (84.133, 0.10),
        (131.967, 0.12),
        (198.00, 0.07),
        (227.25, 0.05),
    ];

    let table = match (dr, temp) {
        (DivideRatio::Dr8, TempRange::Nominal) => DR8_NOMINAL,
        (DivideRatio::Dr8, TempRange::Extended) => DR8_EXTENDED,
        (DivideRatio::Dr643, TempRange::Nominal) => DR643_NOMINAL,
        (DivideRatio::Dr643, TempRange::Extended) => DR643_EXTENDED,
    };

    let trcal_us = trcal * 1e6;
    for &(upper_us, value) in table {
        if trcal_us < upper_us {
            return value;
        }
    }
    table.last().unwrap().1
}

/// `min_link_t`/`max_link_t` for timer index `1..=7`.
pub fn min_link_t(
    index: u8,
    rtcal: f64,
    trcal: f64,
    dr: DivideRatio,
    temp: TempRange,
) -> Result<f64, SimError> {
    match index {
        1 | 5 | 6 => {
            let p = pri(trcal, dr);
            let f = frt(trcal, dr, temp);
            Ok(rtcal.max(10.0 * p) * (1.0 - f) - 2e-6)
        }
        2 => Ok(3.0 * pri(trcal, dr)),
        3 => Ok(0.0),
        4 => Ok(2.0 * rtcal),
        7 => Ok(max_link_t(2, rtcal, trcal, dr, temp)?.max(250e-6)),
        other => Err(SimError::InvalidArgument(format!(
            "timer index must be in 1..=7, but {other} found"
        ))),
    }
}

pub fn max_link_t(
    index: u8,
    rtcal: f64,
    trcal: f64,
    dr: DivideRatio,
    temp: TempRange,
) -> Result<f64, SimError> {
    match index {
        1 => {
            let p = pri(trcal, dr);
            let f = frt(trcal, dr, temp);
            Ok(rtcal.max(10.0 * p) * (1.0 + f) + 2e-6)
        }
        2 => Ok(20.0 * pri(trcal, dr)),
        5..=7 => Ok(0.02),
        3 | 4 => Ok(f64::INFINITY),
        other => Err(SimError::InvalidArgument(format!(
            "timer index must be in 1..=7, but {other} found"
        ))),
    }
}

/// The reader's inter-command pause, also the bound used for the per-slot T4
/// listen timer: `3·PRI` once T4 has already elapsed since the command was
/// sent, else whatever is left of T4 (never less than `3·PRI`).
pub fn t2_pause(now: f64, t_sent: f64, rtcal: f64, trcal: f64, dr: DivideRatio) -> f64 {
    let t4 = 2.0 * rtcal;
    let p = pri(trcal, dr);
    let elapsed = now - t_sent;
    if elapsed > t4 {
        3.0 * p
    } else {
        (t4 - elapsed).max(3.0 * p)
    }
}

/// Duration of a reader frame: the right preamble (full preamble ahead of
/// Query, sync elsewhere, detected from the command's leading bits) plus the
/// Tari/RTcal-weighted body.
pub fn reader_frame_duration(
    cmd_bits: &str,
    tari: f64,
    rtcal: f64,
    trcal: f64,
    delim: f64,
) -> f64 {
    let preamble_duration = if bits_are_query(cmd_bits) {
        ReaderPreamble::new(tari, rtcal, trcal, delim).duration()
    } else {
        ReaderSync::with_delim(tari, rtcal, delim).duration()
    };
    let sync = ReaderSync::with_delim(tari, rtcal, delim);
    let (zeros, ones) = count_bits(cmd_bits);
    let body = zeros as f64 * sync.data0() + ones as f64 * sync.data1();
    preamble_duration + body
}

/// Convenience wrapper computing a [`Command`]'s encoded duration directly.
pub fn command_duration(cmd: &Command, tari: f64, rtcal: f64, trcal: f64, delim: f64) -> f64 {
    reader_frame_duration(&cmd.encode(), tari, rtcal, trcal, delim)
}

fn count_bits(bits: &str) -> (usize, usize) {
    let ones = bits.bytes().filter(|&b| b == b'1').count();
    (bits.len() - ones, ones)
}

/// Duration of a tag reply frame: preamble + body + 1-symbol end-of-signaling
/// suffix, all divided by the tag's own backscatter clock.
pub fn tag_frame_duration(reply: &Reply, blf: f64, encoding: TagEncoding, trext: bool) -> f64 {
    let preamble = TagPreamble::new(encoding, trext);
    let spb = encoding.symbols_per_bit();
    let body = (reply.bitlen() as f64 * spb) / blf;
    let suffix = spb / blf;
    preamble.duration(blf) + body + suffix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Command, QueryParams};
    use crate::types::{InventoryFlag, MemoryBank, Session, SelFlag};

    #[test]
    fn blf_pri_are_reciprocal() {
        for trcal_us in [25.0, 33.633, 66.033, 202.0] {
            for dr in [DivideRatio::Dr8, DivideRatio::Dr643] {
                let trcal = trcal_us * 1e-6;
                let b = blf(dr, trcal);
                let p = pri(trcal, dr);
                assert!((b * p - 1.0).abs() < 1e-9, "BLF*PRI should be 1");
            }
        }
    }

    #[test]
    fn frt_scenarios() {
        assert_eq!(frt(31.25e-6, DivideRatio::Dr8, TempRange::Nominal), 0.10);
        assert_eq!(frt(66.7e-6, DivideRatio::Dr643, TempRange::Extended), 0.15);
    }

    #[test]
    fn frt_is_nonincreasing_over_dr8_nominal_steps() {
        let points_us = [24.0, 25.0, 25.2, 30.0, 40.0, 70.0, 300.0];
        let mut prev = f64::INFINITY;
        for p in points_us {
            let f = frt(p * 1e-6, DivideRatio::Dr8, TempRange::Nominal);
            assert!(f <= prev + 1e-12);
            prev = f;
        }
    }

    #[test]
    fn link_t1_scenario() {
        let rtcal = 75e-6;
        let trcal = 225e-6;
        let t1_min = min_link_t(1, rtcal, trcal, DivideRatio::Dr8, TempRange::Nominal).unwrap();
        let t1_max = max_link_t(1, rtcal, trcal, DivideRatio::Dr8, TempRange::Nominal).unwrap();
        assert!((t1_min - 268.0e-6).abs() < 1e-8, "T1 min was {t1_min}");
        assert!((t1_max - 294.5e-6).abs() < 1e-8, "T1 max was {t1_max}");
    }

    #[test]
    fn t2_pause_uses_remaining_t4_when_reply_is_prompt() {
        let rtcal = 18.75e-6;
        let trcal = 56.25e-6;
        let t_sent = 100e-6;
        let now = t_sent + 1e-6; // reply arrived almost immediately
        let dt = t2_pause(now, t_sent, rtcal, trcal, DivideRatio::Dr8);
        let t4 = 2.0 * rtcal;
        let p = pri(trcal, DivideRatio::Dr8);
        assert!((dt - (t4 - 1e-6).max(3.0 * p)).abs() < 1e-12);
    }

    #[test]
    fn t2_pause_floors_at_3pri_once_t4_has_elapsed() {
        let rtcal = 18.75e-6;
        let trcal = 56.25e-6;
        let t_sent = 100e-6;
        let now = t_sent + 2.0 * rtcal + 5e-6; // past T4 already
        let dt = t2_pause(now, t_sent, rtcal, trcal, DivideRatio::Dr8);
        assert!((dt - 3.0 * pri(trcal, DivideRatio::Dr8)).abs() < 1e-12);
    }

    #[test]
    fn frame_timing_scenario_3() {
        let cmd = Command::Query(QueryParams {
            dr: DivideRatio::Dr8,
            m: TagEncoding::M8,
            trext: false,
            sel: SelFlag::Sel,
            session: Session::S1,
            target: InventoryFlag::A,
            q: 3,
            crc5: 0xAA,
        });
        let tari = 6.25e-6;
        let rtcal = 18.75e-6;
        let trcal = 56.25e-6;
        let duration = command_duration(&cmd, tari, rtcal, trcal, DEFAULT_DELIM);
        let sync = ReaderSync::with_delim(tari, rtcal, DEFAULT_DELIM);
        let (zeros, ones) = count_bits(&cmd.encode());
        let body = zeros as f64 * sync.data0() + ones as f64 * sync.data1();
        assert!((body - 200e-6).abs() < 1e-9, "body was {body}");
        assert!((duration - 293.75e-6).abs() < 1e-9, "duration was {duration}");
    }

    #[test]
    fn reader_frame_duration_matches_preamble_plus_weighted_body() {
        let tari = 6.25e-6;
        let rtcal = 18.75e-6;
        let trcal = 56.25e-6;
        let cmd = Command::QueryRep { session: Session::S0 };
        let bits = cmd.encode();
        let duration = reader_frame_duration(&bits, tari, rtcal, trcal, DEFAULT_DELIM);
        let sync = ReaderSync::with_delim(tari, rtcal, DEFAULT_DELIM);
        let (zeros, ones) = count_bits(&bits);
        let expected =
            sync.duration() + zeros as f64 * sync.data0() + ones as f64 * sync.data1();
        assert!((duration - expected).abs() < 1e-12);
    }

    #[test]
    fn read_command_duration_uses_ebv_word_ptr() {
        let cmd = Command::Read {
            bank: MemoryBank::Tid,
            word_ptr: 128,
            word_count: 2,
            rn: 0,
            crc16: 0,
        };
        assert_eq!(cmd.bitlen(), 8 + 2 + 16 + 8 + 16 + 16);
    }
}
