use serde::{Deserialize, Serialize};
use skyangle::Conversion;

use super::PyramidError;

/// Sampling of the pyramid Fourier optics
///
/// All sizes are in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PyramidGeometry {
    /// Integer magnification of the input field required to reach the field-of-view
    pub fov_res: usize,
    /// Ratio of the requested field-of-view to the internal one
    pub fp_masking: f64,
    /// Number of pixels per λ/D in the focal plane
    pub fft_res: f64,
    /// Scaling of the pyramid facets tilt
    pub tilt_scale: f64,
    /// Size of the input field after magnification
    pub fft_sampling: usize,
    /// Zero padding of the field
    pub fft_padding: usize,
    /// Size of the FFTs
    pub fft_totsize: usize,
    /// Detector size before cropping or padding
    pub toccd_side: usize,
    /// Detector size
    pub final_ccd_side: usize,
}

/// Inputs of the pyramid geometry solver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryRequest {
    /// Input field size
    pub pixel_pupil: usize,
    /// Input field pixel size in meters
    pub pixel_pitch: f64,
    /// Wavelength in nm
    pub wavelength: f64,
    /// Field-of-view in arcsec
    pub fov: f64,
    /// Pupil image diameter in detector pixels
    pub pup_diam: usize,
    /// Detector size in pixels
    pub ccd_side: usize,
    /// Accepted relative reduction of the field-of-view
    pub fov_errinf: f64,
    /// Accepted relative enlargement of the field-of-view
    pub fov_errsup: f64,
    /// Distance between pupil images centers in detector pixels
    pub pup_dist: Option<usize>,
    /// Clearance around the pupil images in detector pixels
    pub pup_margin: usize,
    /// Minimum number of pixels per λ/D
    pub fft_res: f64,
    pub min_pup_dist: Option<usize>,
}

fn round_even(x: f64) -> f64 {
    (x / 2.).round_ties_even() * 2.
}

/// Solves for the Fourier sampling of the pyramid
///
/// The field-of-view of the sampled field is `λ/pitch`; when it falls short of the requested
/// field-of-view minus the lower margin, the field is magnified by the smallest integer factor that
/// reaches it. A field-of-view above the upper margin cannot be reduced and is rejected.
pub fn calc_geometry(request: &GeometryRequest) -> Result<PyramidGeometry, PyramidError> {
    let GeometryRequest {
        pixel_pupil,
        pixel_pitch,
        wavelength,
        fov,
        pup_diam,
        ccd_side,
        fov_errinf,
        fov_errsup,
        pup_dist,
        pup_margin,
        fft_res,
        min_pup_dist,
    } = *request;
    if pup_diam == 0 || pixel_pupil == 0 {
        return Err(PyramidError::PupilDiameter);
    }
    let pup_dist = pup_dist.unwrap_or(pup_diam + 2 * pup_margin);
    let min_pup_dist = min_pup_dist.unwrap_or(pup_diam + 2 * pup_margin);
    if pup_dist < min_pup_dist {
        return Err(PyramidError::PupilDistance(pup_dist, min_pup_dist));
    }
    let min_ccd_side = pup_dist + pup_diam + 2 * pup_margin;
    if ccd_side < min_ccd_side {
        return Err(PyramidError::CcdSide(ccd_side, min_ccd_side));
    }

    let mut fov_internal = (wavelength * 1e-9 / pixel_pitch).to_arcsec();
    let min_fov = fov * (1. - fov_errinf);
    let max_fov = fov * (1. + fov_errsup);
    let mut fov_res = 1usize;
    if fov_internal < min_fov {
        fov_res = (min_fov / fov_internal) as usize;
        if fov_internal * (fov_res as f64) < min_fov {
            fov_res += 1;
        }
    }
    if fov_internal > max_fov {
        return Err(PyramidError::FieldOfView {
            internal: fov_internal,
            max: max_fov,
        });
    }
    if fov_res > 1 {
        fov_internal *= fov_res as f64;
        log::warn!(
            "reaching the requested FoV of {fov:.2}arcsec requires a {fov_res}x interpolation of the input field"
        );
    }
    let fp_masking = fov / fov_internal;
    if fov_internal != fov {
        log::debug!("FoV reduction from {fov_internal:.2} to {fov:.2}arcsec with a focal plane mask");
    }

    let fft_sampling = pixel_pupil * fov_res;
    let pup_diam_f = pup_diam as f64;
    let fft_res_min = (pup_dist + pup_diam) as f64 / pup_diam_f * 1.1;
    let fft_res = fft_res.max(fft_res_min);

    let toccd_side = round_even(fft_res * pup_diam_f);
    let fft_res = toccd_side / pup_diam_f;
    let fft_totsize = round_even(fft_sampling as f64 * fft_res);
    let fft_res = fft_totsize / fft_sampling as f64;
    let fft_padding = round_even(fft_sampling as f64 * fft_res - fft_sampling as f64);

    Ok(PyramidGeometry {
        fov_res,
        fp_masking,
        fft_res,
        tilt_scale: fft_res / (pup_dist as f64 / pup_diam_f / 2.),
        fft_sampling,
        fft_padding: fft_padding as usize,
        fft_totsize: fft_totsize as usize,
        toccd_side: toccd_side as usize,
        final_ccd_side: ccd_side,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GeometryRequest {
        GeometryRequest {
            pixel_pupil: 160,
            pixel_pitch: 0.05,
            wavelength: 750.,
            fov: 2.1,
            pup_diam: 30,
            ccd_side: 80,
            fov_errinf: 0.1,
            fov_errsup: 0.5,
            pup_dist: Some(36),
            pup_margin: 2,
            fft_res: 3.,
            min_pup_dist: None,
        }
    }

    #[test]
    fn sampling() {
        let geom = calc_geometry(&request()).unwrap();
        assert_eq!(geom.fov_res, 1);
        assert_eq!(geom.fft_sampling, 160);
        assert_eq!(geom.fft_totsize, 480);
        assert_eq!(geom.fft_padding, 320);
        assert_eq!(geom.toccd_side, 90);
        assert_eq!(geom.final_ccd_side, 80);
        assert!((geom.fft_res - 3.).abs() < 1e-12);
        assert!((geom.tilt_scale - 5.).abs() < 1e-12);
        assert!(geom.toccd_side <= geom.fft_totsize);
        assert!(geom.fp_masking < 1.);
    }

    #[test]
    fn fov_too_small() {
        let res = calc_geometry(&GeometryRequest {
            fov: 1.,
            ..request()
        });
        assert!(matches!(res, Err(PyramidError::FieldOfView { .. })));
    }

    #[test]
    fn fov_interpolation() {
        let geom = calc_geometry(&GeometryRequest {
            fov: 10.,
            ..request()
        })
        .unwrap();
        assert_eq!(geom.fov_res, 3);
        assert_eq!(geom.fft_sampling, 480);
        assert_eq!(geom.fft_totsize % 2, 0);
    }

    #[test]
    fn pupils_do_not_fit() {
        assert!(matches!(
            calc_geometry(&GeometryRequest {
                ccd_side: 60,
                ..request()
            }),
            Err(PyramidError::CcdSide(60, 70))
        ));
        assert!(matches!(
            calc_geometry(&GeometryRequest {
                pup_dist: Some(30),
                ..request()
            }),
            Err(PyramidError::PupilDistance(30, 34))
        ));
    }
}
