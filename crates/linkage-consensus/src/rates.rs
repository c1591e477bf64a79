//! Per-step event probabilities for binding and unbinding.
//!
//! An event with rate `k` happens at least once during `dt` with
//! probability `1 - exp(-k dt)`. Unbinding of a loaded bond follows Bell's
//! law, which scales the force-free off-rate by `exp(F x_beta / kT)`.

/// Probability of at least one event of a Poisson process with `rate`
/// during `dt`. Non-positive rates never fire.
pub fn probability_from_rate(rate: f64, dt: f64) -> f64 {
    if !(rate > 0.0 && dt > 0.0) {
        return 0.0;
    }
    // 1 - exp(-x) without cancellation for small x
    -(-rate * dt).exp_m1()
}

/// Probability that a free binding spot and an eligible linker bind.
pub fn binding_probability(k_on: f64, dt: f64) -> f64 {
    probability_from_rate(k_on, dt)
}

/// Probability that an unloaded bond releases.
pub fn unbinding_probability(k_off0: f64, dt: f64) -> f64 {
    probability_from_rate(k_off0, dt)
}

/// Bell's force-dependent off-rate `k_off0 * exp(F x_beta / kT)`.
///
/// `force` is the magnitude of the link force, so load only speeds release.
pub fn bell_off_rate(k_off0: f64, force: f64, x_beta: f64, kt: f64) -> f64 {
    if kt <= 0.0 {
        return k_off0;
    }
    k_off0 * (force * x_beta / kt).exp()
}

/// Probability that a loaded bond releases during `dt`.
pub fn bell_unbinding_probability(k_off0: f64, force: f64, x_beta: f64, kt: f64, dt: f64) -> f64 {
    probability_from_rate(bell_off_rate(k_off0, force, x_beta, kt), dt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_never_fires() {
        assert_eq!(probability_from_rate(0.0, 1.0), 0.0);
        assert_eq!(probability_from_rate(-3.0, 1.0), 0.0);
        assert_eq!(probability_from_rate(1.0, 0.0), 0.0);
    }

    #[test]
    fn matches_closed_form() {
        let p = probability_from_rate(2.0, 0.1);
        assert!((p - (1.0 - (-0.2f64).exp())).abs() < 1e-15);
    }

    #[test]
    fn small_rates_keep_precision() {
        let p = probability_from_rate(1e-12, 1e-6);
        assert!((p - 1e-18).abs() < 1e-30);
    }

    #[test]
    fn bell_with_zero_force_equals_force_free() {
        let (k, xb, kt, dt) = (0.5, 2e-3, 4.28e-3, 0.05);
        assert_eq!(bell_off_rate(k, 0.0, xb, kt), k);
        assert_eq!(
            bell_unbinding_probability(k, 0.0, xb, kt, dt),
            unbinding_probability(k, dt)
        );
    }

    #[test]
    fn load_accelerates_release() {
        let (k, xb, kt, dt) = (0.5, 2e-3, 4.28e-3, 0.05);
        let free = bell_unbinding_probability(k, 0.0, xb, kt, dt);
        let pulled = bell_unbinding_probability(k, 5.0, xb, kt, dt);
        let harder = bell_unbinding_probability(k, 10.0, xb, kt, dt);
        assert!(pulled > free);
        assert!(harder > pulled);
        assert!(harder <= 1.0);
    }
}
