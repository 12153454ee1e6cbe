//! Saturating compute loops, one per workload kind.
//!
//! Each call runs `iterations` passes of a short dependent-op chain and
//! returns nothing; the only effect is keeping the current core busy.
//! SIMD paths are re-checked with `is_x86_feature_detected!` before the
//! `target_feature` functions are entered, and degrade to the scalar chain
//! otherwise.

use std::hint::black_box;

use crate::WorkloadKind;

pub fn run(kind: WorkloadKind, iterations: u64) {
    match kind {
        WorkloadKind::BasicAdd => basic_add(iterations),
        WorkloadKind::Amx => tile_standin(iterations),
        WorkloadKind::Avx128 => simd128(iterations),
        WorkloadKind::Avx256 => simd256(iterations),
        WorkloadKind::Avx512 => simd512(iterations),
    }
}

/// Ten dependent 64-bit adds per iteration.
fn basic_add(iterations: u64) {
    let mut a: u64 = black_box(1);
    let mut b: u64 = black_box(2);
    for _ in 0..iterations {
        a = a.wrapping_add(b);
        b = b.wrapping_add(a);
        a = a.wrapping_add(b);
        b = b.wrapping_add(a);
        a = a.wrapping_add(b);
        b = b.wrapping_add(a);
        a = a.wrapping_add(b);
        b = b.wrapping_add(a);
        a = a.wrapping_add(b);
        b = black_box(b.wrapping_add(a));
    }
    black_box((a, b));
}

/// Scalar register traffic standing in for tile ops; no tile configuration is done.
fn tile_standin(iterations: u64) {
    let mut acc: u64 = black_box(0);
    for i in 0..iterations {
        let mut x = i ^ acc;
        let mut y = acc ^ 0x9e37_79b9_7f4a_7c15;
        let mut z = x ^ y;
        x = x.wrapping_add(1);
        y = y.wrapping_add(1);
        z = z.wrapping_add(1);
        acc = black_box(x ^ y ^ z);
    }
    black_box(acc);
}

#[cfg(target_arch = "x86_64")]
fn simd128(iterations: u64) {
    if is_x86_feature_detected!("avx") {
        // SAFETY: AVX presence checked above.
        unsafe { x86::xmm_avx(iterations) }
    } else if is_x86_feature_detected!("sse2") {
        // SAFETY: SSE2 presence checked above.
        unsafe { x86::xmm_sse(iterations) }
    } else {
        basic_add(iterations)
    }
}

#[cfg(target_arch = "x86_64")]
fn simd256(iterations: u64) {
    if is_x86_feature_detected!("avx2") {
        // SAFETY: AVX2 presence checked above.
        unsafe { x86::ymm(iterations) }
    } else {
        basic_add(iterations)
    }
}

#[cfg(target_arch = "x86_64")]
fn simd512(iterations: u64) {
    if is_x86_feature_detected!("avx512f") {
        // SAFETY: AVX-512F presence checked above.
        unsafe { x86::zmm(iterations) }
    } else {
        basic_add(iterations)
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn simd128(iterations: u64) {
    basic_add(iterations)
}

#[cfg(not(target_arch = "x86_64"))]
fn simd256(iterations: u64) {
    basic_add(iterations)
}

#[cfg(not(target_arch = "x86_64"))]
fn simd512(iterations: u64) {
    basic_add(iterations)
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;
    use std::hint::black_box;

    #[inline(always)]
    unsafe fn xmm_chain(iterations: u64) {
        let mut x0 = _mm_set1_ps(black_box(1.0));
        let x1 = _mm_set1_ps(black_box(2.0));
        for _ in 0..iterations {
            let x2 = _mm_mul_ps(_mm_add_ps(x0, x1), x1);
            let x3 = _mm_mul_ps(_mm_add_ps(x2, x0), x1);
            let x4 = _mm_add_ps(x3, x0);
            x0 = _mm_mul_ps(x4, x0);
        }
        black_box(x0);
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn xmm_sse(iterations: u64) {
        xmm_chain(iterations)
    }

    // Same chain, VEX-encoded.
    #[target_feature(enable = "avx")]
    pub unsafe fn xmm_avx(iterations: u64) {
        xmm_chain(iterations)
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn ymm(iterations: u64) {
        let mut y0 = _mm256_set1_ps(black_box(1.0));
        let y1 = _mm256_set1_ps(black_box(2.0));
        for _ in 0..iterations {
            y0 = _mm256_mul_ps(_mm256_add_ps(y0, y1), y1);
            let y2 = _mm256_castpd_ps(_mm256_permute4x64_pd::<0x1B>(_mm256_castps_pd(y0)));
            y0 = _mm256_add_ps(y0, y2);
            let y3 = y0;
            y0 = _mm256_mul_ps(_mm256_add_ps(y0, y3), y3);
            y0 = _mm256_add_ps(y0, y1);
        }
        black_box(y0);
    }

    #[target_feature(enable = "avx512f")]
    pub unsafe fn zmm(iterations: u64) {
        let mut z0 = _mm512_set1_ps(black_box(1.0));
        let z1 = _mm512_set1_ps(black_box(2.0));
        for _ in 0..iterations {
            z0 = _mm512_mul_ps(_mm512_add_ps(z0, z1), z1);
            let z2 = _mm512_fmadd_ps(z0, z1, _mm512_add_ps(z0, z1));
            let z3 = _mm512_fmadd_ps(z0, z1, z2);
            z0 = _mm512_mul_ps(_mm512_add_ps(z0, z3), z3);
        }
        black_box(z0);
    }
}
