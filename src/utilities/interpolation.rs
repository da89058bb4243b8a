//! Bilinear resampling

use super::Mat;

/// Bilinear weights of one output sample
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tap {
    row: usize,
    col: usize,
    w_row: f64,
    w_col: f64,
}
impl Tap {
    fn new(shape: (usize, usize), y: f64, x: f64) -> Self {
        let (row, w_row) = Self::axis(shape.0, y);
        let (col, w_col) = Self::axis(shape.1, x);
        Self {
            row,
            col,
            w_row,
            w_col,
        }
    }
    // coordinates are clamped to the grid
    fn axis(n: usize, u: f64) -> (usize, f64) {
        if n < 2 {
            return (0, 0.);
        }
        let u = u.clamp(0., (n - 1) as f64);
        let i = (u.floor() as usize).min(n - 2);
        (i, u - i as f64)
    }
    #[inline]
    fn sample(&self, input: &Mat) -> f64 {
        let (i, j) = (self.row, self.col);
        let (ni, nj) = ((i + 1).min(input.nrows() - 1), (j + 1).min(input.ncols() - 1));
        let (wr, wc) = (self.w_row, self.w_col);
        (1. - wr) * ((1. - wc) * input[(i, j)] + wc * input[(i, nj)])
            + wr * ((1. - wc) * input[(ni, j)] + wc * input[(ni, nj)])
    }
}

/// Geometric transformation of a 2D grid with bilinear interpolation
///
/// The output sample `(i,j)` is read from the input grid at
///  `x = xx(i,j)*cos(a) - yy(i,j)*sin(a) + origin[0]` (column coordinate)
///  `y = xx(i,j)*sin(a) + yy(i,j)*cos(a) + origin[1]` (row coordinate)
///
/// where `(xx,yy)` are output coordinates relative to the rotation center, in input pixel units.
/// The bilinear taps are computed once, interpolating a grid only costs 4 reads per output sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Interp2D {
    in_shape: (usize, usize),
    out_shape: (usize, usize),
    taps: Vec<Tap>,
}
impl Interp2D {
    pub fn new(
        in_shape: (usize, usize),
        xx: &Mat,
        yy: &Mat,
        rotation_deg: f64,
        origin: [f64; 2],
    ) -> Self {
        assert_eq!(xx.shape(), yy.shape(), "coordinates shape mismatch");
        let (s, c) = rotation_deg.to_radians().sin_cos();
        let taps = xx
            .iter()
            .zip(yy.iter())
            .map(|(&x, &y)| {
                let xr = x * c - y * s + origin[0];
                let yr = x * s + y * c + origin[1];
                Tap::new(in_shape, yr, xr)
            })
            .collect();
        Self {
            in_shape,
            out_shape: xx.shape(),
            taps,
        }
    }
    pub fn in_shape(&self) -> (usize, usize) {
        self.in_shape
    }
    pub fn out_shape(&self) -> (usize, usize) {
        self.out_shape
    }
    /// Resamples `input`
    pub fn interpolate(&self, input: &Mat) -> Mat {
        assert_eq!(input.shape(), self.in_shape, "interpolator input shape mismatch");
        Mat::from_iterator(
            self.out_shape.0,
            self.out_shape.1,
            self.taps.iter().map(|tap| tap.sample(input)),
        )
    }
}

/// Samples `image` at `(i+dy,j+dx)` for each pixel `(i,j)`, zero outside of the image
///
/// A positive `dx` (`dy`) moves the image content toward lower column (row) indices.
pub fn sample_shifted(image: &Mat, dy: f64, dx: f64) -> Mat {
    let (n, m) = image.shape();
    let at = |i: isize, j: isize| {
        if i < 0 || j < 0 || i >= n as isize || j >= m as isize {
            0.
        } else {
            image[(i as usize, j as usize)]
        }
    };
    Mat::from_fn(n, m, |i, j| {
        let y = i as f64 + dy;
        let x = j as f64 + dx;
        let (i0, j0) = (y.floor(), x.floor());
        let (wr, wc) = (y - i0, x - j0);
        let (i0, j0) = (i0 as isize, j0 as isize);
        (1. - wr) * ((1. - wc) * at(i0, j0) + wc * at(i0, j0 + 1))
            + wr * ((1. - wc) * at(i0 + 1, j0) + wc * at(i0 + 1, j0 + 1))
    })
}

/// Shifts the content of `image` by `[dx,dy]` pixels, filling with zeros
pub fn shift_image(image: &Mat, shift: [f64; 2]) -> Mat {
    sample_shifted(image, -shift[1], -shift[0])
}

/// Rotates `image` by `angle_deg` around its center, filling with zeros
pub fn rotate_image(image: &Mat, angle_deg: f64) -> Mat {
    let (n, m) = image.shape();
    let (s, c) = angle_deg.to_radians().sin_cos();
    let (cy, cx) = (0.5 * (n as f64 - 1.), 0.5 * (m as f64 - 1.));
    Mat::from_fn(n, m, |i, j| {
        let (y, x) = (i as f64 - cy, j as f64 - cx);
        // inverse rotation of the output coordinates
        let xi = x * c + y * s + cx;
        let yi = -x * s + y * c + cy;
        if xi < 0. || yi < 0. || xi > (m - 1) as f64 || yi > (n - 1) as f64 {
            0.
        } else {
            Tap::new((n, m), yi, xi).sample(image)
        }
    })
}

/// Linear magnification of `image` by an integer `factor`
pub fn expand(image: &Mat, factor: usize) -> Mat {
    if factor <= 1 {
        return image.clone();
    }
    let (n, m) = image.shape();
    let f = factor as f64;
    Mat::from_fn(n * factor, m * factor, |i, j| {
        Tap::new((n, m), i as f64 / f, j as f64 / f).sample(image)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::make_xy;

    #[test]
    fn identity() {
        let input = Mat::from_fn(10, 10, |i, j| (i * 10 + j) as f64);
        let (xx, yy) = make_xy(6, 3., false, false);
        let interp = Interp2D::new((10, 10), &xx, &yy, 0., [4.5, 4.5]);
        let output = interp.interpolate(&input);
        assert_eq!(output, input.view((2, 2), (6, 6)).into_owned());
    }

    #[test]
    fn linear_field() {
        // bilinear interpolation is exact on a plane
        let input = Mat::from_fn(16, 16, |i, j| 2. * i as f64 - 3. * j as f64);
        let (xx, yy) = make_xy(8, 3., false, false);
        let interp = Interp2D::new((16, 16), &xx, &yy, 30., [7.3, 6.9]);
        let output = interp.interpolate(&input);
        let (s, c) = 30f64.to_radians().sin_cos();
        for ((o, x), y) in output.iter().zip(xx.iter()).zip(yy.iter()) {
            let xr = x * c - y * s + 7.3;
            let yr = x * s + y * c + 6.9;
            assert!((o - (2. * yr - 3. * xr)).abs() < 1e-9);
        }
    }

    #[test]
    fn shift_and_expand() {
        let mut image = Mat::zeros(8, 8);
        image[(3, 3)] = 1.;
        let shifted = shift_image(&image, [2., 1.]);
        assert_eq!(shifted[(4, 5)], 1.);
        assert_eq!(shifted.sum(), 1.);
        let half = shift_image(&image, [0.5, 0.]);
        assert!((half[(3, 3)] - 0.5).abs() < 1e-12 && (half[(3, 4)] - 0.5).abs() < 1e-12);
        let big = expand(&Mat::from_element(3, 3, 2.), 2);
        assert_eq!(big.shape(), (6, 6));
        assert!(big.iter().all(|x| *x == 2.));
    }

    #[test]
    fn quarter_turn() {
        let image = Mat::from_fn(5, 5, |i, j| if i == 2 && j == 4 { 1. } else { 0. });
        let rotated = rotate_image(&image, 90.);
        assert!((rotated[(4, 2)] - 1.).abs() < 1e-9);
    }
}
