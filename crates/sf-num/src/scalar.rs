//! Scalar abstraction over the two supported float widths.
//!
//! The kernel entry points are generic over [`Scalar`]; the trait carries
//! vectorised block primitives so the f32 and f64 implementations can use
//! `wide` lanes while the generic code stays on stable Rust.

use core::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use wide::{f32x8, f64x4};

/// Floating-point element type usable by the numeric kernels.
pub trait Scalar:
    Copy
    + Default
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + 'static
{
    const ZERO: Self;
    const ONE: Self;

    fn from_usize(value: usize) -> Self;
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn abs(self) -> Self;
    fn sqrt(self) -> Self;
    fn floor(self) -> Self;
    fn round(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn tan(self) -> Self;
    fn exp(self) -> Self;
    fn powf(self, exponent: Self) -> Self;
    fn is_finite(self) -> bool;

    /// `out[i] = a[i] + b[i]`; slices have equal length.
    fn block_add(a: &[Self], b: &[Self], out: &mut [Self]) {
        for ((x, y), o) in a.iter().zip(b).zip(out.iter_mut()) {
            *o = *x + *y;
        }
    }

    /// `acc[i] += a[i]`.
    fn block_add_assign(a: &[Self], acc: &mut [Self]) {
        for (x, o) in a.iter().zip(acc.iter_mut()) {
            *o += *x;
        }
    }

    /// `out[i] = a[i] * b[i]`.
    fn block_mul(a: &[Self], b: &[Self], out: &mut [Self]) {
        for ((x, y), o) in a.iter().zip(b).zip(out.iter_mut()) {
            *o = *x * *y;
        }
    }

    /// `acc[i] += a[i] * b[i]`.
    fn block_mul_add_assign(a: &[Self], b: &[Self], acc: &mut [Self]) {
        for ((x, y), o) in a.iter().zip(b).zip(acc.iter_mut()) {
            *o += *x * *y;
        }
    }

    /// `acc[i] += c * a[i]`.
    fn block_mul_constant_add_assign(constant: Self, a: &[Self], acc: &mut [Self]) {
        for (x, o) in a.iter().zip(acc.iter_mut()) {
            *o += constant * *x;
        }
    }
}

#[inline]
fn load8(src: &[f32]) -> f32x8 {
    let mut lane = [0.0f32; 8];
    lane.copy_from_slice(src);
    f32x8::from(lane)
}

#[inline]
fn load4(src: &[f64]) -> f64x4 {
    let mut lane = [0.0f64; 4];
    lane.copy_from_slice(src);
    f64x4::from(lane)
}

impl Scalar for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn from_usize(value: usize) -> Self {
        value as f32
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn abs(self) -> Self {
        self.abs()
    }

    #[inline]
    fn sqrt(self) -> Self {
        self.sqrt()
    }

    #[inline]
    fn floor(self) -> Self {
        self.floor()
    }

    #[inline]
    fn round(self) -> Self {
        self.round()
    }

    #[inline]
    fn sin(self) -> Self {
        self.sin()
    }

    #[inline]
    fn cos(self) -> Self {
        self.cos()
    }

    #[inline]
    fn tan(self) -> Self {
        self.tan()
    }

    #[inline]
    fn exp(self) -> Self {
        self.exp()
    }

    #[inline]
    fn powf(self, exponent: Self) -> Self {
        self.powf(exponent)
    }

    #[inline]
    fn is_finite(self) -> bool {
        self.is_finite()
    }

    fn block_add(a: &[Self], b: &[Self], out: &mut [Self]) {
        let n = out.len();
        let vec_len = n - n % 8;
        let mut i = 0;
        while i < vec_len {
            let v = load8(&a[i..i + 8]) + load8(&b[i..i + 8]);
            out[i..i + 8].copy_from_slice(&v.to_array());
            i += 8;
        }
        while i < n {
            out[i] = a[i] + b[i];
            i += 1;
        }
    }

    fn block_add_assign(a: &[Self], acc: &mut [Self]) {
        let n = acc.len();
        let vec_len = n - n % 8;
        let mut i = 0;
        while i < vec_len {
            let v = load8(&acc[i..i + 8]) + load8(&a[i..i + 8]);
            acc[i..i + 8].copy_from_slice(&v.to_array());
            i += 8;
        }
        while i < n {
            acc[i] += a[i];
            i += 1;
        }
    }

    fn block_mul(a: &[Self], b: &[Self], out: &mut [Self]) {
        let n = out.len();
        let vec_len = n - n % 8;
        let mut i = 0;
        while i < vec_len {
            let v = load8(&a[i..i + 8]) * load8(&b[i..i + 8]);
            out[i..i + 8].copy_from_slice(&v.to_array());
            i += 8;
        }
        while i < n {
            out[i] = a[i] * b[i];
            i += 1;
        }
    }

    fn block_mul_add_assign(a: &[Self], b: &[Self], acc: &mut [Self]) {
        let n = acc.len();
        let vec_len = n - n % 8;
        let mut i = 0;
        while i < vec_len {
            let v = load8(&a[i..i + 8]).mul_add(load8(&b[i..i + 8]), load8(&acc[i..i + 8]));
            acc[i..i + 8].copy_from_slice(&v.to_array());
            i += 8;
        }
        while i < n {
            acc[i] += a[i] * b[i];
            i += 1;
        }
    }

    fn block_mul_constant_add_assign(constant: Self, a: &[Self], acc: &mut [Self]) {
        let n = acc.len();
        let vc = f32x8::splat(constant);
        let vec_len = n - n % 8;
        let mut i = 0;
        while i < vec_len {
            let v = load8(&a[i..i + 8]).mul_add(vc, load8(&acc[i..i + 8]));
            acc[i..i + 8].copy_from_slice(&v.to_array());
            i += 8;
        }
        while i < n {
            acc[i] += constant * a[i];
            i += 1;
        }
    }
}

impl Scalar for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn from_usize(value: usize) -> Self {
        value as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn abs(self) -> Self {
        self.abs()
    }

    #[inline]
    fn sqrt(self) -> Self {
        self.sqrt()
    }

    #[inline]
    fn floor(self) -> Self {
        self.floor()
    }

    #[inline]
    fn round(self) -> Self {
        self.round()
    }

    #[inline]
    fn sin(self) -> Self {
        self.sin()
    }

    #[inline]
    fn cos(self) -> Self {
        self.cos()
    }

    #[inline]
    fn tan(self) -> Self {
        self.tan()
    }

    #[inline]
    fn exp(self) -> Self {
        self.exp()
    }

    #[inline]
    fn powf(self, exponent: Self) -> Self {
        self.powf(exponent)
    }

    #[inline]
    fn is_finite(self) -> bool {
        self.is_finite()
    }

    fn block_add(a: &[Self], b: &[Self], out: &mut [Self]) {
        let n = out.len();
        let vec_len = n - n % 4;
        let mut i = 0;
        while i < vec_len {
            let v = load4(&a[i..i + 4]) + load4(&b[i..i + 4]);
            out[i..i + 4].copy_from_slice(&v.to_array());
            i += 4;
        }
        while i < n {
            out[i] = a[i] + b[i];
            i += 1;
        }
    }

    fn block_add_assign(a: &[Self], acc: &mut [Self]) {
        let n = acc.len();
        let vec_len = n - n % 4;
        let mut i = 0;
        while i < vec_len {
            let v = load4(&acc[i..i + 4]) + load4(&a[i..i + 4]);
            acc[i..i + 4].copy_from_slice(&v.to_array());
            i += 4;
        }
        while i < n {
            acc[i] += a[i];
            i += 1;
        }
    }

    fn block_mul(a: &[Self], b: &[Self], out: &mut [Self]) {
        let n = out.len();
        let vec_len = n - n % 4;
        let mut i = 0;
        while i < vec_len {
            let v = load4(&a[i..i + 4]) * load4(&b[i..i + 4]);
            out[i..i + 4].copy_from_slice(&v.to_array());
            i += 4;
        }
        while i < n {
            out[i] = a[i] * b[i];
            i += 1;
        }
    }

    fn block_mul_add_assign(a: &[Self], b: &[Self], acc: &mut [Self]) {
        let n = acc.len();
        let vec_len = n - n % 4;
        let mut i = 0;
        while i < vec_len {
            let v = load4(&a[i..i + 4]).mul_add(load4(&b[i..i + 4]), load4(&acc[i..i + 4]));
            acc[i..i + 4].copy_from_slice(&v.to_array());
            i += 4;
        }
        while i < n {
            acc[i] += a[i] * b[i];
            i += 1;
        }
    }

    fn block_mul_constant_add_assign(constant: Self, a: &[Self], acc: &mut [Self]) {
        let n = acc.len();
        let vc = f64x4::splat(constant);
        let vec_len = n - n % 4;
        let mut i = 0;
        while i < vec_len {
            let v = load4(&a[i..i + 4]).mul_add(vc, load4(&acc[i..i + 4]));
            acc[i..i + 4].copy_from_slice(&v.to_array());
            i += 4;
        }
        while i < n {
            acc[i] += constant * a[i];
            i += 1;
        }
    }
}
