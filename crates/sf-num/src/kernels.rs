//! Elementwise numeric kernels.
//!
//! Every kernel takes slices plus an alignment parameter in elements. If the
//! alignment is greater than one, the data pointers must satisfy it; this is
//! what the aligned containers guarantee and what the kernels verify. Kernels
//! report failures through [`KernelError`] and never panic in release builds.
//!
//! Naming follows the convention `vector_<op>[_inplace|_constant|_strided]`.

use thiserror::Error;

use crate::{Scalar, is_aligned};

/// Status codes returned by the numeric kernels.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    #[error("pointer does not satisfy the requested alignment")]
    Alignment,

    #[error("invalid argument (size mismatch or out-of-range parameter)")]
    InvalidArgument,

    #[error("internal logic error")]
    Logic,
}

pub type KernelResult = Result<(), KernelError>;

#[inline]
fn check_alignment<T>(ptr: *const T, alignment: usize) -> KernelResult {
    if is_aligned(ptr, alignment) {
        Ok(())
    } else {
        Err(KernelError::Alignment)
    }
}

#[inline]
fn check_equal_len(a: usize, b: usize) -> KernelResult {
    if a == b {
        Ok(())
    } else {
        Err(KernelError::InvalidArgument)
    }
}

// ============ Fill / ramp ============

/// Set every element of `dest` to zero.
pub fn vector_zero<T: Scalar>(dest: &mut [T], alignment: usize) -> KernelResult {
    vector_fill(T::ZERO, dest, alignment)
}

/// Set every element of `dest` to `value`.
pub fn vector_fill<T: Scalar>(value: T, dest: &mut [T], alignment: usize) -> KernelResult {
    check_alignment(dest.as_ptr(), alignment)?;
    dest.fill(value);
    Ok(())
}

/// Fill `dest` with a linear ramp from `start` to `end`.
///
/// The endpoint handling matches the interpolation ramps used throughout the
/// renderer: with `start_inclusive` the first element equals `start`,
/// otherwise the ramp begins one step in; with `end_inclusive` the last
/// element equals `end`, otherwise the ramp stops one step short.
pub fn vector_ramp<T: Scalar>(
    dest: &mut [T],
    start: T,
    end: T,
    start_inclusive: bool,
    end_inclusive: bool,
    alignment: usize,
) -> KernelResult {
    check_alignment(dest.as_ptr(), alignment)?;
    let n = dest.len();
    if n == 0 {
        return Ok(());
    }
    if n == 1 {
        dest[0] = if start_inclusive { start } else { end };
        return Ok(());
    }
    // Number of steps between the first and last produced value.
    let steps = n - 1 + usize::from(!start_inclusive) + usize::from(!end_inclusive);
    if steps == 0 {
        return Err(KernelError::InvalidArgument);
    }
    let step = (end - start) / T::from_usize(steps);
    let offset = if start_inclusive { 0usize } else { 1 };
    for (idx, value) in dest.iter_mut().enumerate() {
        *value = start + T::from_usize(idx + offset) * step;
    }
    Ok(())
}

// ============ Copy ============

/// Copy `src` into `dest`. Works for any `Copy` element type.
pub fn vector_copy<T: Copy>(src: &[T], dest: &mut [T], alignment: usize) -> KernelResult {
    check_equal_len(src.len(), dest.len())?;
    check_alignment(src.as_ptr(), alignment)?;
    check_alignment(dest.as_ptr(), alignment)?;
    dest.copy_from_slice(src);
    Ok(())
}

/// Copy `count` elements with independent source and destination strides.
///
/// Strides are in elements and must be nonzero. No alignment is assumed for
/// strided access.
pub fn vector_copy_strided<T: Copy>(
    src: &[T],
    dest: &mut [T],
    src_stride: usize,
    dest_stride: usize,
    count: usize,
) -> KernelResult {
    if count == 0 {
        return Ok(());
    }
    if src_stride == 0 || dest_stride == 0 {
        return Err(KernelError::InvalidArgument);
    }
    if src.len() < (count - 1) * src_stride + 1 || dest.len() < (count - 1) * dest_stride + 1 {
        return Err(KernelError::InvalidArgument);
    }
    for idx in 0..count {
        dest[idx * dest_stride] = src[idx * src_stride];
    }
    Ok(())
}

/// Fill `count` strided elements of `dest` with `value`.
pub fn vector_fill_strided<T: Copy>(
    value: T,
    dest: &mut [T],
    stride: usize,
    count: usize,
) -> KernelResult {
    if count == 0 {
        return Ok(());
    }
    if stride == 0 || dest.len() < (count - 1) * stride + 1 {
        return Err(KernelError::InvalidArgument);
    }
    for idx in 0..count {
        dest[idx * stride] = value;
    }
    Ok(())
}

// ============ Add / subtract ============

/// `result = op1 + op2`.
pub fn vector_add<T: Scalar>(
    op1: &[T],
    op2: &[T],
    result: &mut [T],
    alignment: usize,
) -> KernelResult {
    check_equal_len(op1.len(), op2.len())?;
    check_equal_len(op1.len(), result.len())?;
    check_alignment(op1.as_ptr(), alignment)?;
    check_alignment(op2.as_ptr(), alignment)?;
    check_alignment(result.as_ptr(), alignment)?;
    T::block_add(op1, op2, result);
    Ok(())
}

/// `acc += op`.
pub fn vector_add_inplace<T: Scalar>(op: &[T], acc: &mut [T], alignment: usize) -> KernelResult {
    check_equal_len(op.len(), acc.len())?;
    check_alignment(op.as_ptr(), alignment)?;
    check_alignment(acc.as_ptr(), alignment)?;
    T::block_add_assign(op, acc);
    Ok(())
}

/// `result = op + constant`.
pub fn vector_add_constant<T: Scalar>(
    constant: T,
    op: &[T],
    result: &mut [T],
    alignment: usize,
) -> KernelResult {
    check_equal_len(op.len(), result.len())?;
    check_alignment(op.as_ptr(), alignment)?;
    check_alignment(result.as_ptr(), alignment)?;
    for (x, o) in op.iter().zip(result.iter_mut()) {
        *o = *x + constant;
    }
    Ok(())
}

/// `acc += constant` elementwise.
pub fn vector_add_constant_inplace<T: Scalar>(
    constant: T,
    acc: &mut [T],
    alignment: usize,
) -> KernelResult {
    check_alignment(acc.as_ptr(), alignment)?;
    for o in acc.iter_mut() {
        *o += constant;
    }
    Ok(())
}

/// `result = minuend - subtrahend`.
pub fn vector_subtract<T: Scalar>(
    minuend: &[T],
    subtrahend: &[T],
    result: &mut [T],
    alignment: usize,
) -> KernelResult {
    check_equal_len(minuend.len(), subtrahend.len())?;
    check_equal_len(minuend.len(), result.len())?;
    check_alignment(minuend.as_ptr(), alignment)?;
    check_alignment(subtrahend.as_ptr(), alignment)?;
    check_alignment(result.as_ptr(), alignment)?;
    for ((x, y), o) in minuend.iter().zip(subtrahend).zip(result.iter_mut()) {
        *o = *x - *y;
    }
    Ok(())
}

/// `acc -= op`.
pub fn vector_subtract_inplace<T: Scalar>(
    op: &[T],
    acc: &mut [T],
    alignment: usize,
) -> KernelResult {
    check_equal_len(op.len(), acc.len())?;
    check_alignment(op.as_ptr(), alignment)?;
    check_alignment(acc.as_ptr(), alignment)?;
    for (x, o) in op.iter().zip(acc.iter_mut()) {
        *o -= *x;
    }
    Ok(())
}

/// `result = op - constant`.
pub fn vector_subtract_constant<T: Scalar>(
    constant: T,
    op: &[T],
    result: &mut [T],
    alignment: usize,
) -> KernelResult {
    vector_add_constant(T::ZERO - constant, op, result, alignment)
}

/// `acc -= constant` elementwise.
pub fn vector_subtract_constant_inplace<T: Scalar>(
    constant: T,
    acc: &mut [T],
    alignment: usize,
) -> KernelResult {
    vector_add_constant_inplace(T::ZERO - constant, acc, alignment)
}

// ============ Multiply ============

/// `result = op1 * op2` elementwise.
pub fn vector_multiply<T: Scalar>(
    op1: &[T],
    op2: &[T],
    result: &mut [T],
    alignment: usize,
) -> KernelResult {
    check_equal_len(op1.len(), op2.len())?;
    check_equal_len(op1.len(), result.len())?;
    check_alignment(op1.as_ptr(), alignment)?;
    check_alignment(op2.as_ptr(), alignment)?;
    check_alignment(result.as_ptr(), alignment)?;
    T::block_mul(op1, op2, result);
    Ok(())
}

/// `acc *= op` elementwise.
pub fn vector_multiply_inplace<T: Scalar>(
    op: &[T],
    acc: &mut [T],
    alignment: usize,
) -> KernelResult {
    check_equal_len(op.len(), acc.len())?;
    check_alignment(op.as_ptr(), alignment)?;
    check_alignment(acc.as_ptr(), alignment)?;
    for (x, o) in op.iter().zip(acc.iter_mut()) {
        *o *= *x;
    }
    Ok(())
}

/// `result = constant * op`.
pub fn vector_multiply_constant<T: Scalar>(
    constant: T,
    op: &[T],
    result: &mut [T],
    alignment: usize,
) -> KernelResult {
    check_equal_len(op.len(), result.len())?;
    check_alignment(op.as_ptr(), alignment)?;
    check_alignment(result.as_ptr(), alignment)?;
    for (x, o) in op.iter().zip(result.iter_mut()) {
        *o = constant * *x;
    }
    Ok(())
}

/// `acc *= constant` elementwise.
pub fn vector_multiply_constant_inplace<T: Scalar>(
    constant: T,
    acc: &mut [T],
    alignment: usize,
) -> KernelResult {
    check_alignment(acc.as_ptr(), alignment)?;
    for o in acc.iter_mut() {
        *o *= constant;
    }
    Ok(())
}

// ============ Fused multiply-accumulate ============

/// `result = factor1 * factor2 + addend`.
pub fn vector_multiply_add<T: Scalar>(
    factor1: &[T],
    factor2: &[T],
    addend: &[T],
    result: &mut [T],
    alignment: usize,
) -> KernelResult {
    check_equal_len(factor1.len(), factor2.len())?;
    check_equal_len(factor1.len(), addend.len())?;
    check_equal_len(factor1.len(), result.len())?;
    check_alignment(factor1.as_ptr(), alignment)?;
    check_alignment(factor2.as_ptr(), alignment)?;
    check_alignment(addend.as_ptr(), alignment)?;
    check_alignment(result.as_ptr(), alignment)?;
    for (((x, y), a), o) in factor1.iter().zip(factor2).zip(addend).zip(result.iter_mut()) {
        *o = *x * *y + *a;
    }
    Ok(())
}

/// `acc += factor1 * factor2`.
pub fn vector_multiply_add_inplace<T: Scalar>(
    factor1: &[T],
    factor2: &[T],
    acc: &mut [T],
    alignment: usize,
) -> KernelResult {
    check_equal_len(factor1.len(), factor2.len())?;
    check_equal_len(factor1.len(), acc.len())?;
    check_alignment(factor1.as_ptr(), alignment)?;
    check_alignment(factor2.as_ptr(), alignment)?;
    check_alignment(acc.as_ptr(), alignment)?;
    T::block_mul_add_assign(factor1, factor2, acc);
    Ok(())
}

/// `result = constant * factor + addend`.
pub fn vector_multiply_constant_add<T: Scalar>(
    constant: T,
    factor: &[T],
    addend: &[T],
    result: &mut [T],
    alignment: usize,
) -> KernelResult {
    check_equal_len(factor.len(), addend.len())?;
    check_equal_len(factor.len(), result.len())?;
    check_alignment(factor.as_ptr(), alignment)?;
    check_alignment(addend.as_ptr(), alignment)?;
    check_alignment(result.as_ptr(), alignment)?;
    for ((x, a), o) in factor.iter().zip(addend).zip(result.iter_mut()) {
        *o = constant * *x + *a;
    }
    Ok(())
}

/// `acc += constant * factor`.
pub fn vector_multiply_constant_add_inplace<T: Scalar>(
    constant: T,
    factor: &[T],
    acc: &mut [T],
    alignment: usize,
) -> KernelResult {
    check_equal_len(factor.len(), acc.len())?;
    check_alignment(factor.as_ptr(), alignment)?;
    check_alignment(acc.as_ptr(), alignment)?;
    T::block_mul_constant_add_assign(constant, factor, acc);
    Ok(())
}

// ============ Ramp-scaled MAC ============

/// Gain interpolation primitive:
/// `result[i] (+)= (base_gain + ramp_gain * ramp[i]) * input[i]`.
///
/// With `accumulate` the scaled signal is added into `result`, otherwise it
/// replaces it. This is the single kernel behind all click-free gain and
/// matrix transitions.
#[allow(clippy::too_many_arguments)]
pub fn vector_ramp_scaling<T: Scalar>(
    input: &[T],
    ramp: &[T],
    result: &mut [T],
    base_gain: T,
    ramp_gain: T,
    accumulate: bool,
    alignment: usize,
) -> KernelResult {
    check_equal_len(input.len(), ramp.len())?;
    check_equal_len(input.len(), result.len())?;
    check_alignment(input.as_ptr(), alignment)?;
    check_alignment(ramp.as_ptr(), alignment)?;
    check_alignment(result.as_ptr(), alignment)?;
    if accumulate {
        for ((x, r), o) in input.iter().zip(ramp).zip(result.iter_mut()) {
            *o += (base_gain + ramp_gain * *r) * *x;
        }
    } else {
        for ((x, r), o) in input.iter().zip(ramp).zip(result.iter_mut()) {
            *o = (base_gain + ramp_gain * *r) * *x;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlignedVec;

    const SIZES: &[usize] = &[1, 2, 3, 4, 7, 8, 15, 16, 31, 32, 1023, 1024];

    fn reference_tolerance(n: usize) -> f64 {
        4.0 * f64::EPSILON * n as f64
    }

    fn make_data(n: usize, seed: u64) -> AlignedVec<f64> {
        // Simple LCG keeps the tests dependency-free and deterministic.
        let mut state = seed;
        let mut v = AlignedVec::new(n, 8);
        for x in v.iter_mut() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            *x = (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5;
        }
        v
    }

    #[test]
    fn add_matches_scalar_reference() {
        for &n in SIZES {
            let a = make_data(n, 1);
            let b = make_data(n, 2);
            let mut out = AlignedVec::<f64>::new(n, 8);
            vector_add(&a, &b, &mut out, 8).unwrap();
            for i in 0..n {
                let expected = a[i] + b[i];
                assert!(
                    (out[i] - expected).abs() <= reference_tolerance(n),
                    "n={n} i={i}"
                );
            }
        }
    }

    #[test]
    fn add_matches_scalar_reference_f32() {
        for &n in SIZES {
            let a64 = make_data(n, 3);
            let b64 = make_data(n, 4);
            let a: Vec<f32> = a64.iter().map(|&x| x as f32).collect();
            let b: Vec<f32> = b64.iter().map(|&x| x as f32).collect();
            let a = AlignedVec::from_slice(&a, 8);
            let b = AlignedVec::from_slice(&b, 8);
            let mut out = AlignedVec::<f32>::new(n, 8);
            vector_add(&a, &b, &mut out, 8).unwrap();
            for i in 0..n {
                let expected = a[i] + b[i];
                assert!(
                    (out[i] - expected).abs() <= 4.0 * f32::EPSILON * n as f32,
                    "n={n} i={i}"
                );
            }
        }
    }

    #[test]
    fn multiply_add_inplace_matches_reference() {
        for &n in SIZES {
            let a = make_data(n, 5);
            let b = make_data(n, 6);
            let mut acc = make_data(n, 7);
            let initial: Vec<f64> = acc.iter().copied().collect();
            vector_multiply_add_inplace(&a, &b, &mut acc, 8).unwrap();
            for i in 0..n {
                let expected = initial[i] + a[i] * b[i];
                assert!(
                    (acc[i] - expected).abs() <= reference_tolerance(n),
                    "n={n} i={i}"
                );
            }
        }
    }

    #[test]
    fn multiply_constant_add_inplace_matches_reference() {
        for &n in SIZES {
            let a = make_data(n, 8);
            let mut acc = make_data(n, 9);
            let initial: Vec<f64> = acc.iter().copied().collect();
            vector_multiply_constant_add_inplace(0.75, &a, &mut acc, 8).unwrap();
            for i in 0..n {
                let expected = initial[i] + 0.75 * a[i];
                assert!(
                    (acc[i] - expected).abs() <= reference_tolerance(n),
                    "n={n} i={i}"
                );
            }
        }
    }

    #[test]
    fn ramp_inclusive_endpoints() {
        let mut v = AlignedVec::<f64>::new(5, 8);
        vector_ramp(&mut v, 0.0, 1.0, true, true, 8).unwrap();
        assert_eq!(v.as_slice(), &[0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn ramp_exclusive_start() {
        let mut v = AlignedVec::<f64>::new(4, 8);
        vector_ramp(&mut v, 0.0, 1.0, false, true, 8).unwrap();
        assert_eq!(v.as_slice(), &[0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn ramp_exclusive_end() {
        let mut v = AlignedVec::<f64>::new(4, 8);
        vector_ramp(&mut v, 0.0, 1.0, true, false, 8).unwrap();
        assert_eq!(v.as_slice(), &[0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn strided_copy_places_elements() {
        let src = [1.0f32, 2.0, 3.0];
        let mut dest = [0.0f32; 7];
        vector_copy_strided(&src, &mut dest, 1, 3, 3).unwrap();
        assert_eq!(dest, [1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 3.0]);
    }

    #[test]
    fn strided_copy_rejects_overrun() {
        let src = [1.0f32, 2.0];
        let mut dest = [0.0f32; 3];
        assert_eq!(
            vector_copy_strided(&src, &mut dest, 1, 3, 2),
            Err(KernelError::InvalidArgument)
        );
    }

    #[test]
    fn misaligned_pointer_is_rejected() {
        let v = AlignedVec::<f32>::new(16, 8);
        let mut out = AlignedVec::<f32>::new(16, 8);
        // Offsetting by one element breaks the 8-element alignment.
        let misaligned = &v.as_slice()[1..9];
        let res = vector_add(misaligned, &v.as_slice()[..8], &mut out.as_mut_slice()[..8], 8);
        assert_eq!(res, Err(KernelError::Alignment));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let a = AlignedVec::<f32>::new(8, 8);
        let b = AlignedVec::<f32>::new(4, 8);
        let mut out = AlignedVec::<f32>::new(8, 8);
        assert_eq!(
            vector_add(&a, &b, &mut out, 8),
            Err(KernelError::InvalidArgument)
        );
    }

    #[test]
    fn ramp_scaling_accumulating() {
        let input = AlignedVec::from_slice(&[1.0f64; 8], 8);
        let mut ramp = AlignedVec::<f64>::new(8, 8);
        vector_ramp(&mut ramp, 0.0, 1.0, true, false, 8).unwrap();
        let mut out = AlignedVec::from_slice(&[10.0f64; 8], 8);
        vector_ramp_scaling(&input, &ramp, &mut out, 2.0, 4.0, true, 8).unwrap();
        for i in 0..8 {
            let expected = 10.0 + 2.0 + 4.0 * (i as f64 / 8.0);
            assert!((out[i] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn copy_works_for_integers() {
        let src = [1u16, 2, 3, 4];
        let mut dest = [0u16; 4];
        vector_copy(&src, &mut dest, 1).unwrap();
        assert_eq!(dest, src);

        let src = [-1i64, 5, 7];
        let mut dest = [0i64; 3];
        vector_copy(&src, &mut dest, 1).unwrap();
        assert_eq!(dest, src);
    }
}
