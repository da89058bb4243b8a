use super::Mat;

/// Overlap matrix `n_out`x`n_in` of two 1D pixel grids spanning the same extent
///
/// Each column sums to 1 so that the flux of an input pixel is fully distributed over the output pixels.
fn overlap(n_in: usize, n_out: usize) -> Mat {
    let scale = n_out as f64 / n_in as f64;
    let mut r = Mat::zeros(n_out, n_in);
    for i in 0..n_in {
        let (a, b) = (i as f64 * scale, (i + 1) as f64 * scale);
        let first = a.floor() as usize;
        let last = (b.ceil() as usize).min(n_out);
        for o in first..last {
            let w = (b.min((o + 1) as f64) - a.max(o as f64)).max(0.);
            r[(o, i)] = w / scale;
        }
    }
    r
}

/// Flux conserving resampling of `image` to a `n_rows`x`n_cols` detector
pub fn toccd(image: &Mat, n_rows: usize, n_cols: usize) -> Mat {
    if image.shape() == (n_rows, n_cols) {
        return image.clone();
    }
    let r_rows = overlap(image.nrows(), n_rows);
    let r_cols = overlap(image.ncols(), n_cols);
    r_rows * image * r_cols.transpose()
}
