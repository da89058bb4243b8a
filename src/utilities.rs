//! Numerical utilities shared by the atmosphere and the wavefront sensors

use nalgebra::DMatrix;
use num_complex::Complex64;

pub mod coordinates;
pub mod fourier;
pub mod grid;
pub mod interpolation;
pub mod mask;
pub mod toccd;

pub use fourier::{fftshift, ifftshift, roll, Fft2};
pub use grid::{make_mask, make_xy};
pub use interpolation::Interp2D;
pub use mask::Mask;
pub use toccd::toccd;

/// Real matrix, indexed as (row, column) i.e. (y, x)
pub type Mat = DMatrix<f64>;
/// Complex matrix
pub type CMat = DMatrix<Complex64>;

/// Checks that all the elements of a matrix are finite
pub fn is_finite(mat: &Mat) -> bool {
    mat.iter().all(|x| x.is_finite())
}

/// Median of a slice, NaN if empty
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

/// Centers `image` into a `side`x`side` frame, padding with zeros or cropping
pub fn pad_or_crop(image: &Mat, side: usize) -> Mat {
    let n = image.nrows();
    if side > n {
        let delta = (side - n) / 2;
        let mut frame = Mat::zeros(side, side);
        frame
            .view_mut((delta, delta), (n, image.ncols()))
            .copy_from(image);
        frame
    } else if side < n {
        let delta = (n - side) / 2;
        image.view((delta, delta), (side, side)).into_owned()
    } else {
        image.clone()
    }
}
