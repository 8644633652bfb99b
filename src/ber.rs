//! SNR/BER reception models.
//!
//! Two fading models are offered: Rayleigh fading (closed-form) and AWGN via
//! the Gaussian Q-function. `erf` is hand-rolled (Abramowitz & Stegun 7.1.26)
//! rather than pulled in as a new dependency.

/// Abramowitz & Stegun 7.1.26, absolute error < 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

/// Gaussian Q-function, `Q(x) = 0.5 - 0.5*erf(x/sqrt(2))`.
fn q_function(x: f64) -> f64 {
    0.5 - 0.5 * erf(x / std::f64::consts::SQRT_2)
}

/// Bit error rate under Rayleigh fading, from linear SNR.
///
/// `t = sqrt(1 + 2/snr); ber = 0.5 - 1/t + (2/pi) * atan(t)/t`.
pub fn rayleigh_ber(snr_linear: f64) -> f64 {
    let t = (1.0 + 2.0 / snr_linear).sqrt();
    0.5 - 1.0 / t + (2.0 / std::f64::consts::PI) * t.atan() / t
}

/// Bit error rate under AWGN via the Q-function, from linear SNR.
///
/// `q = Q(sqrt(snr)); ber = 2*q*(1-q)`.
pub fn awgn_q_ber(snr_linear: f64) -> f64 {
    let q = q_function(snr_linear.sqrt());
    2.0 * q * (1.0 - q)
}

/// Converts a dB figure to a linear ratio.
pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

/// Reception-success probability for a frame of `bitlen` bits at the given
/// per-bit error rate.
///
/// Two formulas are kept side by side: `bitlen ** (1 - ber)` is almost
/// certainly a transcription bug — it grows *with* `bitlen` for `ber > 0`,
/// the opposite of every other BER-based success model — but is kept as
/// `legacy` for parity with runs that depend on it. The non-legacy path is
/// the textbook `(1 - ber) ^ bitlen`.
pub fn success_probability(ber: f64, bitlen: usize, legacy: bool) -> f64 {
    if legacy {
        (bitlen as f64).powf(1.0 - ber)
    } else {
        (1.0 - ber).powi(bitlen as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erf_matches_known_values() {
        assert!((erf(0.0)).abs() < 1e-9);
        assert!((erf(1.0) - 0.8427007929).abs() < 1e-6);
        assert!((erf(-1.0) + 0.8427007929).abs() < 1e-6);
    }

    #[test]
    fn q_function_is_half_at_zero() {
        assert!((q_function(0.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn ber_decreases_with_snr() {
        let low = rayleigh_ber(db_to_linear(0.0));
        let high = rayleigh_ber(db_to_linear(20.0));
        assert!(high < low);

        let low = awgn_q_ber(db_to_linear(0.0));
        let high = awgn_q_ber(db_to_linear(20.0));
        assert!(high < low);
    }

    #[test]
    fn ber_is_bounded() {
        for snr_db in [-10.0, 0.0, 10.0, 30.0, 60.0] {
            let snr = db_to_linear(snr_db);
            let r = rayleigh_ber(snr);
            let a = awgn_q_ber(snr);
            assert!((0.0..=0.5).contains(&r), "rayleigh ber out of range: {r}");
            assert!((0.0..=0.5).contains(&a), "awgn ber out of range: {a}");
        }
    }

    #[test]
    fn corrected_success_probability_decreases_with_bitlen() {
        let short = success_probability(0.01, 16, false);
        let long = success_probability(0.01, 160, false);
        assert!(long < short);
        assert!((0.0..=1.0).contains(&short));
        assert!((0.0..=1.0).contains(&long));
    }

    #[test]
    fn legacy_success_probability_grows_with_bitlen_when_ber_positive() {
        let short = success_probability(0.1, 16, true);
        let long = success_probability(0.1, 160, true);
        assert!(long > short, "legacy formula's known quirk should hold");
    }

    #[test]
    fn zero_ber_always_succeeds() {
        assert_eq!(success_probability(0.0, 500, false), 1.0);
    }
}
