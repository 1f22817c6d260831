use opencv::{core::Mat, prelude::*};

use crate::error::{Error, Result};
use crate::Frame;

impl TryFrom<&Mat> for Frame {
    type Error = Error;

    /// Copies an 8-bit BGR matrix, as decoded by `VideoCapture`.
    fn try_from(mat: &Mat) -> Result<Self> {
        if mat.typ() != opencv::core::CV_8UC3 {
            return Err(Error::InvalidFrame(format!(
                "expected an 8-bit 3 channel matrix, got type {}",
                mat.typ()
            )));
        }

        let (rows, cols) = (mat.rows(), mat.cols());
        let data = mat.data_bytes()?;

        if data.len() != rows as usize * cols as usize * 3 {
            return Err(Error::InvalidFrame(format!(
                "{} bytes do not make a {}x{} frame",
                data.len(),
                cols,
                rows
            )));
        }

        Frame::from_raw(cols as u32, rows as u32, data.to_vec())
    }
}
