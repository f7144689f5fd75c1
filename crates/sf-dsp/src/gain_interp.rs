//! Time-varying gain matrix core.
//!
//! Dense N-input x M-output matrix whose entries move linearly from their
//! previous to their target value across a configurable interpolation period
//! (a whole number of blocks). New targets arriving mid-transition restart
//! the transition from the currently reached value, so the output stays free
//! of discontinuities.

use sf_core::{ConfigError, ConfigResult, ProcessError, ProcessResult};
use sf_num::{AlignedMatrix, AlignedVec, Scalar, kernels};

#[derive(Debug, Clone)]
pub struct GainMatrixCore<T> {
    previous_gains: AlignedMatrix<T>,
    next_gains: AlignedMatrix<T>,
    block_size: usize,
    interpolation_periods: usize,
    interpolation_counter: usize,
    /// Precomputed ramp of `(periods + 1) * block` samples: the rising part
    /// followed by one block of ones for the steady state.
    ramp: AlignedVec<T>,
    temp: AlignedVec<T>,
    alignment: usize,
}

impl<T: Scalar> GainMatrixCore<T> {
    pub fn new(
        inputs: usize,
        outputs: usize,
        block_size: usize,
        interpolation_steps: usize,
        initial_value: T,
        alignment: usize,
    ) -> ConfigResult<Self> {
        if block_size == 0 {
            return Err(ConfigError::OutOfRange {
                parameter: "block_size",
                detail: "must be nonzero".to_string(),
            });
        }
        if interpolation_steps % block_size != 0 {
            return Err(ConfigError::InvalidInterpolationPeriod {
                period: interpolation_steps,
                block_size,
            });
        }
        let interpolation_periods = interpolation_steps / block_size;

        let mut previous_gains = AlignedMatrix::new(outputs, inputs, alignment);
        previous_gains.fill(initial_value);
        let next_gains = previous_gains.clone();

        let mut ramp = AlignedVec::new((interpolation_periods + 1) * block_size, alignment);
        if interpolation_periods > 0 {
            let rising = interpolation_periods * block_size;
            kernels::vector_ramp(
                &mut ramp.as_mut_slice()[..rising],
                T::ZERO,
                T::ONE,
                false,
                true,
                alignment,
            )
            .map_err(|_| ConfigError::OutOfRange {
                parameter: "interpolation_ramp",
                detail: "ramp construction failed".to_string(),
            })?;
        }
        let steady_start = interpolation_periods * block_size;
        ramp.as_mut_slice()[steady_start..].fill(T::ONE);

        Ok(Self {
            previous_gains,
            next_gains,
            block_size,
            interpolation_periods,
            interpolation_counter: interpolation_periods,
            ramp,
            temp: AlignedVec::new(block_size, alignment),
            alignment,
        })
    }

    /// Construct with a full initial matrix instead of a scalar.
    pub fn with_initial_matrix(
        inputs: usize,
        outputs: usize,
        block_size: usize,
        interpolation_steps: usize,
        initial: &AlignedMatrix<T>,
        alignment: usize,
    ) -> ConfigResult<Self> {
        if initial.rows() != outputs || initial.cols() != inputs {
            return Err(ConfigError::OutOfRange {
                parameter: "initial_matrix",
                detail: format!(
                    "{}x{} does not match {outputs}x{inputs}",
                    initial.rows(),
                    initial.cols()
                ),
            });
        }
        let mut core = Self::new(
            inputs,
            outputs,
            block_size,
            interpolation_steps,
            T::ZERO,
            alignment,
        )?;
        core.previous_gains.copy_from(initial);
        core.next_gains.copy_from(initial);
        Ok(core)
    }

    #[inline]
    pub fn inputs(&self) -> usize {
        self.previous_gains.cols()
    }

    #[inline]
    pub fn outputs(&self) -> usize {
        self.previous_gains.rows()
    }

    /// Install a new target matrix.
    ///
    /// If the previous transition is still running, the currently reached
    /// interpolated value becomes the start of the new transition.
    pub fn set_new_gains(&mut self, new_gains: &AlignedMatrix<T>) -> ConfigResult<()> {
        if new_gains.rows() != self.outputs() || new_gains.cols() != self.inputs() {
            return Err(ConfigError::OutOfRange {
                parameter: "gain_matrix",
                detail: format!(
                    "{}x{} does not match {}x{}",
                    new_gains.rows(),
                    new_gains.cols(),
                    self.outputs(),
                    self.inputs()
                ),
            });
        }
        if self.interpolation_counter >= self.interpolation_periods {
            // Previous transition completed; its target is the new start.
            std::mem::swap(&mut self.previous_gains, &mut self.next_gains);
        } else {
            let ratio = T::from_usize(self.interpolation_counter)
                / T::from_usize(self.interpolation_periods);
            for row in 0..self.outputs() {
                for col in 0..self.inputs() {
                    let prev = *self.previous_gains.at(row, col);
                    let next = *self.next_gains.at(row, col);
                    *self.previous_gains.at_mut(row, col) = prev + ratio * (next - prev);
                }
            }
        }
        self.next_gains.copy_from(new_gains);
        self.interpolation_counter = 0;
        Ok(())
    }

    /// Process one block: `outputs[m] = sum_n gain(m, n, t) * inputs[n]`.
    pub fn process(&mut self, inputs: &[&[T]], outputs: &mut [&mut [T]]) -> ProcessResult<()> {
        let map_err = |detail: &str| ProcessError::Kernel {
            component: "GainMatrixCore".to_string(),
            detail: detail.to_string(),
        };
        if inputs.len() != self.inputs() || outputs.len() != self.outputs() {
            return Err(ProcessError::Component {
                component: "GainMatrixCore".to_string(),
                detail: "channel count mismatch".to_string(),
            });
        }
        let ramp_offset = self.block_size * self.interpolation_counter;
        let ramp_partition = &self.ramp.as_slice()[ramp_offset..ramp_offset + self.block_size];
        for (out_idx, output) in outputs.iter_mut().enumerate() {
            kernels::vector_zero(output, self.alignment).map_err(|_| map_err("zero"))?;
            for (in_idx, input) in inputs.iter().enumerate() {
                let old_gain = *self.previous_gains.at(out_idx, in_idx);
                let gain_diff = *self.next_gains.at(out_idx, in_idx) - old_gain;
                kernels::vector_fill(old_gain, &mut self.temp, self.alignment)
                    .map_err(|_| map_err("fill"))?;
                kernels::vector_multiply_constant_add_inplace(
                    gain_diff,
                    ramp_partition,
                    &mut self.temp,
                    self.alignment,
                )
                .map_err(|_| map_err("ramp"))?;
                kernels::vector_multiply_add_inplace(input, &self.temp, output, self.alignment)
                    .map_err(|_| map_err("mac"))?;
            }
        }
        if self.interpolation_counter < self.interpolation_periods {
            self.interpolation_counter += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_from(rows: usize, cols: usize, values: &[f32]) -> AlignedMatrix<f32> {
        let mut m = AlignedMatrix::new(rows, cols, 8);
        for r in 0..rows {
            for c in 0..cols {
                *m.at_mut(r, c) = values[r * cols + c];
            }
        }
        m
    }

    #[test]
    fn steady_state_applies_gain() {
        let mut core = GainMatrixCore::new(2, 1, 4, 8, 0.0, 1).unwrap();
        core.set_new_gains(&matrix_from(1, 2, &[0.5, 2.0])).unwrap();
        // Run past the transition.
        let in0 = [1.0f32; 4];
        let in1 = [1.0f32; 4];
        let mut out = [0.0f32; 4];
        for _ in 0..4 {
            let mut outputs: [&mut [f32]; 1] = [&mut out];
            core.process(&[&in0, &in1], &mut outputs).unwrap();
        }
        for s in out {
            assert!((s - 2.5).abs() < 1e-6);
        }
    }

    #[test]
    fn transition_is_monotone_within_bounds() {
        let mut core = GainMatrixCore::new(1, 1, 8, 8, 1.0, 1).unwrap();
        core.set_new_gains(&matrix_from(1, 1, &[0.0])).unwrap();
        let input = [1.0f32; 8];
        let mut out = [0.0f32; 8];
        let mut outputs: [&mut [f32]; 1] = [&mut out];
        core.process(&[&input], &mut outputs).unwrap();
        // Gains interpolate from 1 toward 0; every sample stays within the
        // old/new bounds and decreases monotonically.
        for pair in out.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-7);
        }
        assert!(out[0] <= 1.0 && out[7] >= 0.0);
        // After the transition the gain is exactly the target.
        let mut outputs: [&mut [f32]; 1] = [&mut out];
        core.process(&[&input], &mut outputs).unwrap();
        for s in out {
            assert!(s.abs() < 1e-6);
        }
    }

    #[test]
    fn mid_transition_update_restarts_from_current_value() {
        let mut core = GainMatrixCore::new(1, 1, 4, 16, 0.0, 1).unwrap();
        core.set_new_gains(&matrix_from(1, 1, &[1.0])).unwrap();
        let input = [1.0f32; 4];
        let mut out = [0.0f32; 4];
        let mut outputs: [&mut [f32]; 1] = [&mut out];
        core.process(&[&input], &mut outputs).unwrap();
        // One of four periods done; the reached value is 0.25.
        core.set_new_gains(&matrix_from(1, 1, &[0.25])).unwrap();
        // New transition starts at 0.25 and targets 0.25: output constant.
        let mut outputs: [&mut [f32]; 1] = [&mut out];
        core.process(&[&input], &mut outputs).unwrap();
        for s in out {
            assert!((s - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn zero_interpolation_steps_switch_immediately() {
        let mut core = GainMatrixCore::new(1, 1, 4, 0, 1.0, 1).unwrap();
        core.set_new_gains(&matrix_from(1, 1, &[3.0])).unwrap();
        let input = [1.0f32; 4];
        let mut out = [0.0f32; 4];
        let mut outputs: [&mut [f32]; 1] = [&mut out];
        core.process(&[&input], &mut outputs).unwrap();
        for s in out {
            assert!((s - 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn rejects_non_multiple_interpolation() {
        assert!(GainMatrixCore::<f32>::new(1, 1, 64, 96, 0.0, 8).is_err());
    }
}
