use super::Mat;

/// Coordinates of a square grid of `sampling`x`sampling` points
///
/// The grid spans `[-ratio,ratio]` with a step of `2*ratio/sampling`:
///  - by default, the grid is centered between pixels, the coordinates are `(k-(n-1)/2)*step`,
///  - if `zero_sampled` is set, the origin falls on pixel `n/2`, the coordinates are `(k-n/2)*step`,
///  - if `quarter` is set, only the quadrant of positive coordinates is returned.
///
/// Returns the `(xx,yy)` pair of matrices where x varies along the columns and y along the rows.
pub fn make_xy(sampling: usize, ratio: f64, quarter: bool, zero_sampled: bool) -> (Mat, Mat) {
    let step = 2. * ratio / sampling as f64;
    let origin = if zero_sampled {
        (sampling / 2) as f64
    } else {
        0.5 * (sampling as f64 - 1.)
    };
    let (first, n) = if quarter {
        (sampling / 2, sampling - sampling / 2)
    } else {
        (0, sampling)
    };
    let coords: Vec<f64> = (first..first + n)
        .map(|k| (k as f64 - origin) * step)
        .collect();
    let xx = Mat::from_fn(n, n, |_, j| coords[j]);
    let yy = Mat::from_fn(n, n, |i, _| coords[i]);
    (xx, yy)
}

/// Binary mask of a `sampling`x`sampling` grid
///
/// The mask is a disk (or a square if `square` is set) centered on the grid with a diameter equal
/// to `diaratio` times the grid size, with an optional central obstruction of relative diameter `obsratio`.
pub fn make_mask(sampling: usize, diaratio: f64, obsratio: f64, square: bool) -> Mat {
    let (xx, yy) = make_xy(sampling, 1., false, false);
    Mat::from_fn(sampling, sampling, |i, j| {
        let (x, y) = (xx[(i, j)], yy[(i, j)]);
        let r = if square {
            x.abs().max(y.abs())
        } else {
            x.hypot(y)
        };
        if r <= diaratio && (obsratio <= 0. || r >= obsratio * diaratio) {
            1.
        } else {
            0.
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_grid() {
        let (xx, yy) = make_xy(4, 2., false, false);
        assert_eq!(xx.row(0).iter().cloned().collect::<Vec<_>>(), vec![-1.5, -0.5, 0.5, 1.5]);
        assert_eq!(yy.column(3).iter().cloned().collect::<Vec<_>>(), vec![-1.5, -0.5, 0.5, 1.5]);
    }

    #[test]
    fn zero_sampled_quarter() {
        let (xx, yy) = make_xy(8, 4., true, true);
        assert_eq!(xx.shape(), (4, 4));
        assert_eq!(xx.row(2).iter().cloned().collect::<Vec<_>>(), vec![0., 1., 2., 3.]);
        assert_eq!(yy[(3, 0)], 3.);
    }

    #[test]
    fn annular_mask() {
        let full = make_mask(64, 1., 0., false);
        let annulus = make_mask(64, 1., 0.3, false);
        let disk_area = std::f64::consts::PI * 32. * 32.;
        assert!((full.sum() - disk_area).abs() / disk_area < 0.02);
        assert!(annulus.sum() < full.sum());
        assert_eq!(annulus[(32, 32)], 0.);
        assert_eq!(make_mask(16, 1., 0., true).sum(), 256.);
    }
}
