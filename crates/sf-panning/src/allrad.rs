//! AllRAD higher-order-ambisonics decoding.
//!
//! Decodes HOA signals to a regular virtual loudspeaker array with a stored
//! decode matrix, then pans every virtual loudspeaker onto the real array
//! with VBAP. The combined matrix is recomputed whenever the listener (and
//! with it the VBAP state) changes.

use sf_core::{ConfigError, ConfigResult, Sample};
use sf_num::AlignedMatrix;
use sf_objects::CartesianPosition;

use crate::vbap::Vbap;

pub struct AllRad {
    /// Virtual regular array positions.
    virtual_positions: Vec<CartesianPosition>,
    /// Stored HOA-to-virtual decode matrix, `harmonics x virtual`.
    reg_decode: AlignedMatrix<Sample>,
    /// Combined decode matrix, `harmonics x real speakers`.
    decode: AlignedMatrix<Sample>,
    scratch_gains: Vec<Sample>,
}

impl AllRad {
    /// `reg_decode` must have one column per virtual loudspeaker; its row
    /// count `(order + 1)^2` determines the supported HOA order.
    pub fn new(
        virtual_positions: Vec<CartesianPosition>,
        reg_decode: AlignedMatrix<Sample>,
        num_real_speakers: usize,
    ) -> ConfigResult<Self> {
        if virtual_positions.is_empty() {
            return Err(ConfigError::LoudspeakerArray(
                "AllRAD virtual array is empty".to_string(),
            ));
        }
        if reg_decode.cols() != virtual_positions.len() {
            return Err(ConfigError::LoudspeakerArray(format!(
                "decode matrix has {} columns for {} virtual loudspeakers",
                reg_decode.cols(),
                virtual_positions.len()
            )));
        }
        let harmonics = reg_decode.rows();
        let order = (harmonics as f64).sqrt() as usize;
        if order * order != harmonics || harmonics == 0 {
            return Err(ConfigError::LoudspeakerArray(format!(
                "decode matrix row count {harmonics} is not a square number of harmonics"
            )));
        }
        Ok(Self {
            virtual_positions,
            reg_decode,
            decode: AlignedMatrix::new(harmonics, num_real_speakers, 1),
            scratch_gains: vec![0.0; num_real_speakers],
        })
    }

    /// Supported HOA order.
    pub fn order(&self) -> usize {
        (self.reg_decode.rows() as f64).sqrt() as usize - 1
    }

    #[inline]
    pub fn num_harmonics(&self) -> usize {
        self.reg_decode.rows()
    }

    /// Recompute the combined decode matrix for the current VBAP state.
    pub fn calc_decode_gains(&mut self, vbap: &Vbap) {
        self.decode.clear();
        for (virt_idx, &position) in self.virtual_positions.iter().enumerate() {
            // Virtual loudspeakers are at infinity relative to the listener.
            vbap.calculate_gains(position, true, &mut self.scratch_gains);
            for harmonic in 0..self.reg_decode.rows() {
                let weight = *self.reg_decode.at(harmonic, virt_idx);
                if weight == 0.0 {
                    continue;
                }
                let row = self.decode.row_mut(harmonic);
                for (out, &gain) in row.iter_mut().zip(&self.scratch_gains) {
                    *out += weight * gain;
                }
            }
        }
    }

    /// Combined decode matrix, `harmonics x real speakers`.
    #[inline]
    pub fn decode_matrix(&self) -> &AlignedMatrix<Sample> {
        &self.decode
    }
}
