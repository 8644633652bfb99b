//! Shared broadcast radio channel: collision tracking and the SNR/BER
//! reception decision. Any second concurrent reply breaks every currently
//! open reception, modeling a slot collision on a shared medium.
//!
//! Mobility, geometry and the radiation-pattern/path-loss formula arrive
//! here as an injected closure instead of a dependency, the same way the
//! BER model does.

use std::collections::{HashMap, HashSet};

use rand::Rng;

use crate::ber::{db_to_linear, success_probability};
use crate::error::SimError;
use crate::types::Antenna;

/// Computes the path loss in dB between a transmitting and receiving
/// antenna moving at `velocity` (m/s, signed, positive = closing). Injected
/// so the core never depends on a geometry/propagation crate; only this
/// callback's result is consumed. By convention the returned figure is
/// non-positive (dB of attenuation) and is *added* to the link budget.
pub type PathLossFn = Box<dyn Fn(&Antenna, &Antenna, f64) -> f64>;

/// Computes a bit error rate from a linear SNR, e.g. [`crate::ber::rayleigh_ber`].
pub type BerModel = fn(f64) -> f64;

/// Tracks which replies are currently in flight and whether each has been
/// broken by a concurrent transmission, plus the physical-layer parameters
/// needed for the reception-success decision.
pub struct Channel {
    path_loss: PathLossFn,
    ber_model: BerModel,
    legacy_reception_formula: bool,
    noise_floor_dbm: f64,
    bandwidth_hz: f64,
    open: HashMap<usize, bool>,
    reader_attached: bool,
    tags: HashSet<usize>,
}

impl Channel {
    pub fn new(
        path_loss: PathLossFn,
        ber_model: BerModel,
        legacy_reception_formula: bool,
        noise_floor_dbm: f64,
        bandwidth_hz: f64,
    ) -> Self {
        Channel {
            path_loss,
            ber_model,
            legacy_reception_formula,
            noise_floor_dbm,
            bandwidth_hz,
            open: HashMap::new(),
            reader_attached: false,
            tags: HashSet::new(),
        }
    }

    /// Attaches the one reader this channel carries. A second attempt
    /// without an intervening [`Channel::detach_reader`] is a misconfiguration,
    /// not a runtime condition to recover from.
    pub fn attach_reader(&mut self) -> Result<(), SimError> {
        if self.reader_attached {
            return Err(SimError::InvalidState(
                "a reader is already attached to this channel".into(),
            ));
        }
        self.reader_attached = true;
        Ok(())
    }

    pub fn detach_reader(&mut self) {
        self.reader_attached = false;
    }

    pub fn is_reader_attached(&self) -> bool {
        self.reader_attached
    }

    /// Attaches tag `tag` to this channel. Idempotent.
    pub fn attach_tag(&mut self, tag: usize) {
        self.tags.insert(tag);
    }

    /// Detaches tag `tag` from this channel. Idempotent.
    pub fn detach_tag(&mut self, tag: usize) {
        self.tags.remove(&tag);
    }

    pub fn is_tag_attached(&self, tag: usize) -> bool {
        self.tags.contains(&tag)
    }

    /// Received power at `rx`, given `tx` transmitting at `tx_power_dbm`:
    /// `rx_power = tx_power + tx_gain + path_loss + rx_gain`.
    pub fn rx_power_dbm(&self, tx_power_dbm: f64, tx: &Antenna, rx: &Antenna, velocity: f64) -> f64 {
        tx_power_dbm + tx.gain + (self.path_loss)(tx, rx, velocity) + rx.gain
    }

    /// Derives the linear SNR: a synchronization-jitter term (`sync_var`)
    /// built from the excess SNR, preamble duration and channel bandwidth,
    /// folded back in as a `cos²` penalty.
    fn snr_linear(&self, rx_power_dbm: f64, preamble_duration: f64, spb: f64, pri: f64) -> f64 {
        let excess = db_to_linear(rx_power_dbm - self.noise_floor_dbm);
        let sync_var = (1.0 / (excess * preamble_duration * self.bandwidth_hz)).sqrt();
        excess * spb * pri * self.bandwidth_hz * sync_var.cos().powi(2)
    }

    /// Registers the start of tag `tag`'s reply. If another reply is already
    /// open, every currently-open reply (this one included) is marked broken.
    pub fn begin_tag_reply(&mut self, tag: usize) {
        if !self.open.is_empty() {
            for broken in self.open.values_mut() {
                *broken = true;
            }
            self.open.insert(tag, true);
        } else {
            self.open.insert(tag, false);
        }
    }

    /// Ends tag `tag`'s reply, returning whether it collided with another
    /// concurrent transmission.
    pub fn end_tag_reply(&mut self, tag: usize) -> bool {
        self.open.remove(&tag).unwrap_or(false)
    }

    pub fn any_reply_open(&self) -> bool {
        !self.open.is_empty()
    }

    /// Rolls whether a tag reply arrives intact. A collision is
    /// always fatal regardless of BER; otherwise `ber_model` turns the
    /// derived SNR into a per-bit error rate, which `success_probability`
    /// turns into a frame-level success chance, and a single uniform draw
    /// decides delivery.
    pub fn reception_succeeds(
        &self,
        rx_power_dbm: f64,
        preamble_duration: f64,
        spb: f64,
        pri: f64,
        bitlen: usize,
        collided: bool,
        rng: &mut impl Rng,
    ) -> bool {
        if collided {
            return false;
        }
        let snr = self.snr_linear(rx_power_dbm, preamble_duration, spb, pri);
        let ber = (self.ber_model)(snr);
        let p = success_probability(ber, bitlen, self.legacy_reception_formula);
        rng.gen::<f64>() <= p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::rayleigh_ber;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn free_space_loss(_tx: &Antenna, _rx: &Antenna, _velocity: f64) -> f64 {
        -40.0
    }

    fn channel() -> Channel {
        Channel::new(Box::new(free_space_loss), rayleigh_ber, false, -90.0, 1.2e6)
    }

    #[test]
    fn second_reader_attach_is_rejected() {
        let mut ch = channel();
        ch.attach_reader().unwrap();
        assert!(ch.attach_reader().is_err());
    }

    #[test]
    fn reader_can_reattach_after_detach() {
        let mut ch = channel();
        ch.attach_reader().unwrap();
        ch.detach_reader();
        assert!(ch.attach_reader().is_ok());
    }

    #[test]
    fn tag_attach_detach_is_idempotent() {
        let mut ch = channel();
        ch.attach_tag(0);
        ch.attach_tag(0);
        assert!(ch.is_tag_attached(0));
        ch.detach_tag(0);
        ch.detach_tag(0);
        assert!(!ch.is_tag_attached(0));
    }

    #[test]
    fn single_reply_never_collides() {
        let mut ch = channel();
        ch.begin_tag_reply(0);
        assert!(!ch.end_tag_reply(0));
    }

    #[test]
    fn concurrent_replies_break_each_other() {
        let mut ch = channel();
        ch.begin_tag_reply(0);
        ch.begin_tag_reply(1);
        assert!(ch.end_tag_reply(0));
        assert!(ch.end_tag_reply(1));
    }

    #[test]
    fn a_third_late_arrival_only_breaks_still_open_replies() {
        let mut ch = channel();
        ch.begin_tag_reply(0);
        assert!(!ch.end_tag_reply(0));
        ch.begin_tag_reply(1);
        assert!(!ch.end_tag_reply(1), "no concurrent sender was open at this point");
    }

    #[test]
    fn rx_power_includes_gains_and_loss() {
        let ch = channel();
        let tx = Antenna::new([0.0; 3], [1.0, 0.0, 0.0], 6.0);
        let rx = Antenna::new([1.0, 0.0, 0.0], [-1.0, 0.0, 0.0], 2.0);
        let p = ch.rx_power_dbm(30.0, &tx, &rx, 0.0);
        assert!((p - (30.0 + 6.0 + 2.0 - 40.0)).abs() < 1e-9);
    }

    #[test]
    fn collision_always_fails_regardless_of_snr() {
        let ch = channel();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(!ch.reception_succeeds(0.0, 10e-6, 4.0, 28e-6, 32, true, &mut rng));
    }

    #[test]
    fn high_snr_clean_frame_almost_always_succeeds() {
        let ch = channel();
        let mut rng = StdRng::seed_from_u64(42);
        let mut successes = 0;
        for _ in 0..100 {
            if ch.reception_succeeds(40.0, 10e-6, 4.0, 28e-6, 32, false, &mut rng) {
                successes += 1;
            }
        }
        assert!(successes > 90, "expected high-SNR frames to mostly succeed, got {successes}/100");
    }
}
