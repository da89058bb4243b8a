use std::f64::consts::PI;

use num_complex::Complex64;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::utilities::{CMat, Fft2, Mat};

/// Spectral von Kármán phase screen
///
/// Returns a `n`x`n` phase screen in radians with a pixel size `delta` in meters,
/// the Fried parameter `r0`, the outer scale `l0_outer` and the inner scale `l0_inner`.
/// The screen is periodic, it is only used to seed the infinite phase screen.
pub fn ft_phase_screen<R: Rng>(
    r0: f64,
    n: usize,
    delta: f64,
    l0_outer: f64,
    l0_inner: f64,
    rng: &mut R,
) -> Mat {
    let del_f = 1. / (n as f64 * delta);
    let fm = 5.92 / l0_inner / (2. * PI);
    let f0 = 1. / l0_outer;
    let freq = |k: usize| {
        if k <= n / 2 {
            k as f64 * del_f
        } else {
            (k as f64 - n as f64) * del_f
        }
    };
    let mut cn = CMat::from_fn(n, n, |i, j| {
        if i == 0 && j == 0 {
            return Complex64::new(0., 0.);
        }
        let f2 = freq(i).powi(2) + freq(j).powi(2);
        let psd =
            0.023 * r0.powf(-5. / 3.) * (-f2 / (fm * fm)).exp() / (f2 + f0 * f0).powf(11. / 6.);
        let (re, im): (f64, f64) = (rng.sample(StandardNormal), rng.sample(StandardNormal));
        Complex64::new(re, im) * psd.sqrt() * del_f
    });
    Fft2::new(n, n).forward(&mut cn);
    cn.map(|c| c.re)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn zero_mean_finite() {
        let mut rng = StdRng::seed_from_u64(7);
        let screen = ft_phase_screen(0.15, 64, 0.05, 25., 0.01, &mut rng);
        assert!(screen.iter().all(|x| x.is_finite()));
        // the piston is removed with the DC term
        assert!(screen.mean().abs() < 1e-9);
        assert!(screen.variance() > 0.);
    }
}
