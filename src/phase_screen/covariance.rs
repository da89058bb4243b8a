use std::{collections::HashMap, f64::consts::PI};

use libm::tgamma;
use scilib::math::bessel;

use crate::utilities::Mat;

use super::PhaseScreenError;

/// Von Kármán phase covariance in rd² at separation `r`
///
/// `r`, the Fried parameter `r0` and the outer scale `l0` are given in meters.
pub fn phase_covariance(r: f64, r0: f64, l0: f64) -> f64 {
    let r = r + 1e-40;
    let a = (l0 / r0).powf(5. / 3.);
    let b1 = 2f64.powf(-5. / 6.) * tgamma(11. / 6.) / PI.powf(8. / 3.);
    let b2 = ((24. / 5.) * tgamma(6. / 5.)).powf(5. / 6.);
    let x = 2. * PI * r / l0;
    let c = x.powf(5. / 6.) * bessel::k(x, 5. / 6.).re;
    a * b1 * b2 * c
}

/// Conditional Gaussian coefficients of a new line given the stencil
///
/// `positions` are the integer pixel coordinates of the `n_stencil` stencil points followed by
/// the points of the new line. Returns `(A,B)` such that `x = A z + B w` where `z` is the stencil
/// data and `w` a white noise vector with unit variance:
///  - `A = Σxz Σzz⁻¹`, solved with a LU factorization,
///  - `B = U diag(√s)` from the SVD `U diag(s) Uᵀ` of the conditional covariance `Σxx - A Σzx`.
pub fn ab_from_positions(
    positions: &[[i64; 2]],
    n_stencil: usize,
    pixel_scale: f64,
    r0: f64,
    l0: f64,
) -> Result<(Mat, Mat), PhaseScreenError> {
    let n = positions.len();
    let n_line = n - n_stencil;
    // pixel separations are integers: the covariance is evaluated once per squared distance
    let mut cache: HashMap<i64, f64> = HashMap::new();
    let cov = Mat::from_fn(n, n, |i, j| {
        let [ri, ci] = positions[i];
        let [rj, cj] = positions[j];
        let d2 = (ri - rj).pow(2) + (ci - cj).pow(2);
        *cache
            .entry(d2)
            .or_insert_with(|| phase_covariance((d2 as f64).sqrt() * pixel_scale, r0, l0))
    });
    let cov_zz = cov.view((0, 0), (n_stencil, n_stencil)).into_owned();
    let cov_zx = cov.view((0, n_stencil), (n_stencil, n_line)).into_owned();
    let cov_xx = cov.view((n_stencil, n_stencil), (n_line, n_line)).into_owned();
    // Σzz is symmetric: Aᵀ = Σzz⁻¹ Σzx
    let a_mat = cov_zz
        .lu()
        .solve(&cov_zx)
        .ok_or(PhaseScreenError::SingularCovariance)?
        .transpose();
    let bbt = cov_xx - &a_mat * &cov_zx;
    let svd = bbt.svd(true, false);
    let u = svd.u.ok_or(PhaseScreenError::NonFinite)?;
    let s = &svd.singular_values;
    if !s.iter().all(|x| x.is_finite()) || !a_mat.iter().all(|x| x.is_finite()) {
        return Err(PhaseScreenError::NonFinite);
    }
    let s_max = s.max();
    let n_null = s.iter().filter(|&&x| x <= s_max * 1e-12).count();
    if n_null > 0 {
        log::warn!(
            "conditional covariance is rank deficient: {} of {} singular values are negligible",
            n_null,
            s.len()
        );
    }
    let b_mat = Mat::from_fn(n_line, n_line, |i, j| u[(i, j)] * s[j].sqrt());
    Ok((a_mat, b_mat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covariance_at_origin() {
        let (r0, l0): (f64, f64) = (0.15, 25.);
        let limit = (l0 / r0).powf(5. / 3.)
            * 2f64.powf(-5. / 6.)
            * tgamma(11. / 6.)
            / PI.powf(8. / 3.)
            * ((24. / 5.) * tgamma(6. / 5.)).powf(5. / 6.)
            * 2f64.powf(-1. / 6.)
            * tgamma(5. / 6.);
        let c0 = phase_covariance(0., r0, l0);
        assert!(c0.is_finite());
        assert!((c0 - limit).abs() / limit < 1e-6);
    }

    #[test]
    fn half_order_argument() {
        // x^(5/6) K_(5/6)(x) at a separation of one outer scale over 2π
        let (r0, l0) = (0.15, 25.);
        let c = phase_covariance(l0 / (2. * PI), r0, l0);
        let c0 = phase_covariance(0., r0, l0);
        // K_(5/6)(1) = 0.54053
        let ratio = 0.540_53 / (2f64.powf(-1. / 6.) * tgamma(5. / 6.));
        assert!((c / c0 - ratio).abs() < 1e-3);
    }

    #[test]
    fn covariance_decreases() {
        let c: Vec<f64> = [0., 0.1, 1., 10., 50.]
            .iter()
            .map(|r| phase_covariance(*r, 0.15, 25.))
            .collect();
        assert!(c.windows(2).all(|w| w[1] < w[0]));
        assert!(c[4] / c[0] < 1e-3);
    }

    #[test]
    fn structure_function_small_scales() {
        // D(r) = 2(C(0)-C(r)) -> 6.88 (r/r0)^(5/3) for r << L0
        let (r0, l0) = (0.1, 1e6);
        let r = 0.01;
        let d = 2. * (phase_covariance(0., r0, l0) - phase_covariance(r, r0, l0));
        let kolmogorov = 6.88 * (r / r0).powf(5. / 3.);
        assert!((d - kolmogorov).abs() / kolmogorov < 0.01);
    }

    #[test]
    fn conditional_coefficients() {
        let positions: Vec<[i64; 2]> = (0..4)
            .flat_map(|r| (0..4).map(move |c| [r, c]))
            .chain((0..4).map(|c| [-1, c]))
            .collect();
        let (a, b) = ab_from_positions(&positions, 16, 0.1, 0.15, 25.).unwrap();
        assert_eq!(a.shape(), (4, 16));
        assert_eq!(b.shape(), (4, 4));
        // B Bᵀ is the conditional covariance, smaller than the prior variance
        let bbt = &b * b.transpose();
        let c0 = phase_covariance(0., 0.15, 25.);
        assert!(bbt.diagonal().iter().all(|x| *x > 0. && *x < c0));
    }
}
