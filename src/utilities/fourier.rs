//! Two-dimensional discrete Fourier transforms

use std::{fmt, sync::Arc};

use nalgebra::{DMatrix, Scalar};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use super::CMat;

/// 2D FFT of a fixed size matrix
///
/// The plans are created once and can be shared between threads.
#[derive(Clone)]
pub struct Fft2 {
    shape: (usize, usize),
    forward: [Arc<dyn Fft<f64>>; 2],
    inverse: [Arc<dyn Fft<f64>>; 2],
}
impl fmt::Debug for Fft2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fft2").field("shape", &self.shape).finish()
    }
}
impl Fft2 {
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        Self {
            shape: (n_rows, n_cols),
            forward: [
                planner.plan_fft_forward(n_rows),
                planner.plan_fft_forward(n_cols),
            ],
            inverse: [
                planner.plan_fft_inverse(n_rows),
                planner.plan_fft_inverse(n_cols),
            ],
        }
    }
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }
    fn process(plans: &[Arc<dyn Fft<f64>>; 2], data: &mut CMat) {
        // columns are contiguous in memory
        plans[0].process(data.as_mut_slice());
        let mut transposed = data.transpose();
        plans[1].process(transposed.as_mut_slice());
        transposed.transpose_to(data);
    }
    /// In place forward transform (un-normalized)
    pub fn forward(&self, data: &mut CMat) {
        assert_eq!(data.shape(), self.shape, "FFT size mismatch");
        Self::process(&self.forward, data);
    }
    /// In place inverse transform, normalized by the number of elements
    pub fn inverse(&self, data: &mut CMat) {
        assert_eq!(data.shape(), self.shape, "FFT size mismatch");
        Self::process(&self.inverse, data);
        let n = (self.shape.0 * self.shape.1) as f64;
        data.apply(|x| *x /= n);
    }
}

/// Circular shift of the rows and columns of a matrix
///
/// The element at `(i,j)` moves to `(i+rows,j+cols)` modulo the matrix shape.
pub fn roll<T: Scalar>(mat: &DMatrix<T>, rows: isize, cols: isize) -> DMatrix<T> {
    let (n, m) = mat.shape();
    if n == 0 || m == 0 {
        return mat.clone();
    }
    let rows = rows.rem_euclid(n as isize) as usize;
    let cols = cols.rem_euclid(m as isize) as usize;
    DMatrix::from_fn(n, m, |i, j| {
        mat[((i + n - rows) % n, (j + m - cols) % m)].clone()
    })
}
/// Moves the zero-frequency component to the center of the matrix
pub fn fftshift<T: Scalar>(mat: &DMatrix<T>) -> DMatrix<T> {
    let (n, m) = mat.shape();
    roll(mat, (n / 2) as isize, (m / 2) as isize)
}
/// Inverse of [fftshift]
pub fn ifftshift<T: Scalar>(mat: &DMatrix<T>) -> DMatrix<T> {
    let (n, m) = mat.shape();
    roll(mat, -((n / 2) as isize), -((m / 2) as isize))
}

/// Element-wise complex exponential `exp(i*phase)`
pub fn phasor(phase: &super::Mat) -> CMat {
    phase.map(|p| Complex64::from_polar(1., p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::Mat;

    #[test]
    fn forward_inverse() {
        let fft = Fft2::new(6, 4);
        let data = CMat::from_fn(6, 4, |i, j| Complex64::new(i as f64 - j as f64, (i * j) as f64));
        let mut buffer = data.clone();
        fft.forward(&mut buffer);
        // DC term is the sum of all the elements
        let sum: Complex64 = data.iter().sum();
        assert!((buffer[(0, 0)] - sum).norm() < 1e-9);
        fft.inverse(&mut buffer);
        assert!((buffer - data).norm() < 1e-9);
    }

    #[test]
    fn single_frequency() {
        let (n, m) = (8, 8);
        let fft = Fft2::new(n, m);
        let mut data = phasor(&Mat::from_fn(n, m, |i, j| {
            2. * std::f64::consts::PI * (i as f64 / n as f64 + 2. * j as f64 / m as f64)
        }));
        fft.forward(&mut data);
        let peak = data
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map(|(k, _)| (k % n, k / n))
            .unwrap();
        assert_eq!(peak, (1, 2));
    }

    #[test]
    fn shifts() {
        let mat = Mat::from_fn(5, 4, |i, j| (i * 4 + j) as f64);
        let shifted = fftshift(&mat);
        assert_eq!(shifted[(2, 2)], mat[(0, 0)]);
        assert_eq!(ifftshift(&shifted), mat);
        assert_eq!(roll(&mat, -1, 1)[(0, 1)], mat[(1, 0)]);
    }
}
