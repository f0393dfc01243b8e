//! Float DSP helpers plus the few fixed-point routines whose results feed
//! entropy-coded decisions and therefore have to be bit exact on every platform.

use crate::range::ilog;

/// keeps divisions and square roots away from zero
pub const EPSILON: f32 = 1e-15;

pub fn inner_prod(x: &[f32], y: &[f32]) -> f32 {
    x.iter().zip(y.iter()).fold(0.0, |acc, (a, b)| acc + a * b)
}

/// returns `(<x,y1>, <x,y2>)` in one pass
pub fn dual_inner_prod(x: &[f32], y1: &[f32], y2: &[f32]) -> (f32, f32) {
    x.iter()
        .zip(y1.iter().zip(y2.iter()))
        .fold((0.0, 0.0), |(xy1, xy2), (a, (b, c))| (xy1 + a * b, xy2 + a * c))
}

#[inline]
pub fn celt_exp2(x: f32) -> f32 {
    (0.693_147_2 * x).exp()
}

#[inline]
pub fn celt_log2(x: f32) -> f32 {
    1.442_695 * x.ln()
}

/// `cos(pi/2 * x)` for `x` in `[0, 1]`
#[inline]
pub fn cos_norm(x: f32) -> f32 {
    (0.5 * std::f32::consts::PI * x).cos()
}

/// # Description
/// Approximates `atan2(y, x)` with a rational polynomial.
/// ## Comments
/// - inputs whose squared magnitude is below `1e-18` return `0`
pub fn fast_atan2f(y: f32, x: f32) -> f32 {
    const CA: f32 = 0.431_579_74;
    const CB: f32 = 0.678_484_03;
    const CC: f32 = 0.085_955_42;
    const CE: f32 = std::f32::consts::FRAC_PI_2;

    let x2 = x * x;
    let y2 = y * y;
    if x2 + y2 < 1e-18 {
        return 0.0;
    }
    if x2 < y2 {
        let den = (y2 + CB * x2) * (y2 + CC * x2);
        -x * y * (y2 + CA * x2) / den + if y < 0.0 { -CE } else { CE }
    } else {
        let den = (x2 + CB * y2) * (x2 + CC * y2);
        x * y * (x2 + CA * y2) / den + if y < 0.0 { -CE } else { CE }
            - if x * y < 0.0 { -CE } else { CE }
    }
}

/// Q15 multiply with rounding, both operands truncated to 16 bits first
#[inline]
pub fn frac_mul16(a: i32, b: i32) -> i32 {
    (16384 + i32::from(a as i16) * i32::from(b as i16)) >> 15
}

/// # Description
/// Fixed-point `cos(pi/2 * x/16384)` scaled to Q15.
/// ## Parameters
/// - `x` must lie in `(0, 16384)`
pub fn bitexact_cos(x: i16) -> i16 {
    let tmp = (4096 + i32::from(x) * i32::from(x)) >> 13;
    debug_assert!(tmp <= 32767);
    let x2 = tmp;
    let x2 = (32767 - x2)
        + frac_mul16(
            x2,
            -7651 + frac_mul16(x2, 8277 + frac_mul16(-626, x2)),
        );
    (1 + x2) as i16
}

/// fixed-point `log2(isin/icos)` in Q11
pub fn bitexact_log2tan(isin: i32, icos: i32) -> i32 {
    let lc = ilog(icos as u32);
    let ls = ilog(isin as u32);
    let icos = icos << (15 - lc);
    let isin = isin << (15 - ls);
    (ls - lc) * (1 << 11) + frac_mul16(isin, frac_mul16(isin, -2597) + 7932)
        - frac_mul16(icos, frac_mul16(icos, -2597) + 7932)
}

/// integer square root, rounded down
pub fn isqrt32(mut val: u32) -> u32 {
    if val == 0 {
        return 0;
    }
    let mut g = 0u32;
    let mut bshift = (ilog(val) - 1) >> 1;
    let mut b = 1u32 << bshift;
    loop {
        let t = ((g << 1) + b) << bshift;
        if t <= val {
            g += b;
            val -= t;
        }
        b >>= 1;
        bshift -= 1;
        if bshift < 0 {
            break;
        }
    }
    g
}

#[cfg(test)]
mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn sanity() {
        assert_eq!(inner_prod(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
        let (a, b) = dual_inner_prod(&[1.0, 2.0], &[3.0, 4.0], &[-1.0, 1.0]);
        assert_eq!((a, b), (11.0, 1.0));
        assert!((celt_exp2(3.0) - 8.0).abs() < 1e-4);
        assert!((celt_log2(8.0) - 3.0).abs() < 1e-4);
    }

    #[test]
    fn fast_atan2f_tracks_libm() {
        for k in 0..64 {
            let angle = k as f32 / 64.0 * std::f32::consts::FRAC_PI_2;
            let (s, c) = angle.sin_cos();
            let approx = fast_atan2f(s, c);
            assert!((approx - angle).abs() < 1e-3, "angle {}", angle);
        }
        assert_eq!(fast_atan2f(0.0, 0.0), 0.0);
    }

    #[test]
    fn bitexact_cos_is_close_to_cos() {
        for x in (1..16384).step_by(97) {
            let expected = (x as f64 / 16384.0 * std::f64::consts::FRAC_PI_2).cos() * 32768.0;
            let got = bitexact_cos(x as i16) as f64;
            assert!((got - expected).abs() < 16.0, "x={} got={} expected={}", x, got, expected);
        }
    }

    #[test]
    fn log2tan_is_antisymmetric() {
        let a = bitexact_cos(4000) as i32;
        let b = bitexact_cos(16384 - 4000) as i32;
        let forward = bitexact_log2tan(a, b);
        let backward = bitexact_log2tan(b, a);
        assert!((forward + backward).abs() <= 2);
        assert!(forward > 0);
    }

    #[test]
    fn isqrt32_floors() {
        for v in [0u32, 1, 2, 3, 4, 15, 16, 17, 99, 100, 65535, 1 << 30, u32::MAX] {
            let g = isqrt32(v) as u64;
            assert!(g * g <= v as u64);
            assert!((g + 1) * (g + 1) > v as u64);
        }
    }
}
