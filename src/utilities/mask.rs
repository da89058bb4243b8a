use serde::{Deserialize, Serialize};

use super::{make_mask, Mat};

/// A generic binary mask structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    shape: (usize, usize),
    data: Vec<bool>,
}
impl Mask {
    /// Creates a mask from column-wise boolean values
    pub fn new(shape: (usize, usize), data: Vec<bool>) -> Self {
        assert_eq!(shape.0 * shape.1, data.len(), "mask data length mismatch");
        Self { shape, data }
    }
    /// Disk (or annulus if `obsratio>0`) inscribed in a `n`x`n` grid
    pub fn circular(n: usize, obsratio: f64) -> Self {
        Self::from(&make_mask(n, 1., obsratio, false))
    }
    /// Returns the number of non-zeros in the mask
    pub fn nnz(&self) -> usize {
        self.data.iter().filter(|m| **m).count()
    }
    /// Returns the mask shape
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }
    /// Returns an iterator over the mask values
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.data.iter().cloned()
    }
}
impl From<&Mat> for Mask {
    /// Non-zero values of the matrix are set to `true`
    fn from(mat: &Mat) -> Self {
        Self {
            shape: mat.shape(),
            data: mat.iter().map(|x| *x != 0.).collect(),
        }
    }
}
impl From<&Mask> for Mat {
    fn from(mask: &Mask) -> Self {
        Mat::from_iterator(
            mask.shape.0,
            mask.shape.1,
            mask.iter().map(|m| if m { 1. } else { 0. }),
        )
    }
}
