//! Pyramid vector quantization of unit norm band shapes.

use super::cwrs::{decode_pulses, encode_pulses};
use crate::math::{cos_norm, fast_atan2f, inner_prod, EPSILON};
use crate::range::{RangeDecoder, RangeEncoder};
use serde::{Deserialize, Serialize};

/// # Description
/// How much energy the spreading rotation smears across a band
/// before quantization.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Spread {
    None = 0,
    Light = 1,
    Normal = 2,
    Aggressive = 3,
}

impl Spread {
    /// `None` for anything past the four spreading levels
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Spread::None),
            1 => Some(Spread::Light),
            2 => Some(Spread::Normal),
            3 => Some(Spread::Aggressive),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    fn factor(self) -> Option<i32> {
        match self {
            Spread::None => None,
            Spread::Light => Some(15),
            Spread::Normal => Some(10),
            Spread::Aggressive => Some(5),
        }
    }
}

/// one pass of Givens rotations between samples `stride` apart
fn exp_rotation1(x: &mut [f32], stride: usize, c: f32, s: f32) {
    let len = x.len();
    let ms = -s;
    for i in 0..len.saturating_sub(stride) {
        let x1 = x[i];
        let x2 = x[i + stride];
        x[i + stride] = c * x2 + s * x1;
        x[i] = c * x1 + ms * x2;
    }
    if len >= 2 * stride + 1 {
        for i in (0..=len - 2 * stride - 1).rev() {
            let x1 = x[i];
            let x2 = x[i + stride];
            x[i + stride] = c * x2 + s * x1;
            x[i] = c * x1 + ms * x2;
        }
    }
}

/// # Description
/// Spreads (`dir > 0`) or unspreads (`dir < 0`) the energy of each of the
/// `stride` interleaved blocks of `x` ahead of a `k` pulse search.
/// ## Comments
/// - a forward rotation followed by the inverse one restores `x` up to
///   float rounding
pub fn exp_rotation(x: &mut [f32], dir: i32, stride: usize, k: i32, spread: Spread) {
    let len = x.len();
    let factor = match spread.factor() {
        Some(f) if 2 * k < len as i32 => f,
        _ => return,
    };

    let gain = len as f32 / (len as i32 + factor * k) as f32;
    let theta = 0.5 * (gain * gain);
    let c = cos_norm(theta);
    let s = cos_norm(1.0 - theta);

    let mut stride2 = 0;
    if len >= 8 * stride {
        stride2 = 1;
        // about sqrt(len/stride), rounded
        while (stride2 * stride2 + stride2) * stride + (stride >> 2) < len {
            stride2 += 1;
        }
    }

    let block = len / stride;
    for chunk in x.chunks_exact_mut(block).take(stride) {
        if dir < 0 {
            if stride2 != 0 {
                exp_rotation1(chunk, stride2, s, c);
            }
            exp_rotation1(chunk, 1, c, s);
        } else {
            exp_rotation1(chunk, 1, c, -s);
            if stride2 != 0 {
                exp_rotation1(chunk, stride2, s, -c);
            }
        }
    }
}

/// scales the integer pulses `iy` with energy `ryy` to a vector of norm `gain`
fn normalise_residual(iy: &[i32], x: &mut [f32], ryy: f32, gain: f32) {
    let g = gain / ryy.sqrt();
    x.iter_mut().zip(iy.iter()).for_each(|(x, &y)| *x = g * y as f32);
}

/// # Description
/// One bit per block of `iy`, set when the block holds any pulse.
pub fn extract_collapse_mask(iy: &[i32], b: usize) -> u32 {
    if b <= 1 {
        return 1;
    }
    let n0 = iy.len() / b;
    iy.chunks_exact(n0)
        .take(b)
        .enumerate()
        .fold(0, |mask, (i, block)| {
            mask | ((block.iter().any(|&v| v != 0) as u32) << i)
        })
}

/// # Description
/// Greedy search for the `k` pulse vector closest in angle to `x`.
/// ## Comments
/// - `x` is left holding its absolute values, or a unit impulse when its
///   sum is too small to project
/// - the magnitudes of `iy` always sum to exactly `k`
/// ## Returns
/// the squared norm of `iy`
pub fn op_pvq_search(x: &mut [f32], iy: &mut [i32], k: i32) -> f32 {
    let n = x.len();
    let mut y = vec![0.0f32; n];
    let signs = x.iter().map(|&v| v < 0.0).collect::<Vec<_>>();
    x.iter_mut().for_each(|v| *v = v.abs());
    iy.iter_mut().for_each(|v| *v = 0);

    let mut xy = 0.0f32;
    let mut yy = 0.0f32;
    let mut pulses_left = k;

    if k > (n as i32 >> 1) {
        let mut sum = x.iter().sum::<f32>();
        if !(sum > EPSILON && sum < 64.0) {
            x[0] = 1.0;
            x.iter_mut().skip(1).for_each(|v| *v = 0.0);
            sum = 1.0;
        }
        // K + 0.8 can never round up to more than K pulses
        let rcp = (k as f32 + 0.8) * (1.0 / sum);
        for j in 0..n {
            iy[j] = (rcp * x[j]).floor() as i32;
            y[j] = iy[j] as f32;
            yy += y[j] * y[j];
            xy += x[j] * y[j];
            y[j] *= 2.0;
            pulses_left -= iy[j];
        }
    }

    if pulses_left > n as i32 + 3 {
        let tmp = pulses_left as f32;
        yy += tmp * tmp;
        yy += tmp * y[0];
        iy[0] += pulses_left;
        pulses_left = 0;
    }

    for _ in 0..pulses_left {
        yy += 1.0;
        let mut best_id = 0;
        let rxy = xy + x[0];
        let mut best_num = rxy * rxy;
        let mut best_den = yy + y[0];
        for j in 1..n {
            let rxy = xy + x[j];
            let rxy = rxy * rxy;
            let ryy = yy + y[j];
            if best_den * rxy > ryy * best_num {
                best_den = ryy;
                best_num = rxy;
                best_id = j;
            }
        }
        xy += x[best_id];
        yy += y[best_id];
        y[best_id] += 2.0;
        iy[best_id] += 1;
    }

    iy.iter_mut().zip(signs.iter()).for_each(|(v, &neg)| {
        let s = -(neg as i32);
        *v = (*v ^ s) - s;
    });
    yy
}

/// # Description
/// Quantizes the unit vector `x` with `k` pulses and writes the codeword.
/// ## Parameters
/// - `b` number of interleaved short blocks in the band
/// - `resynth` replace `x` with its quantized version scaled to `gain`
/// ## Returns
/// the collapse mask of the pulse vector
#[allow(clippy::too_many_arguments)]
pub fn alg_quant(
    x: &mut [f32],
    k: i32,
    spread: Spread,
    b: usize,
    enc: &mut RangeEncoder,
    gain: f32,
    resynth: bool,
) -> u32 {
    debug_assert!(k > 0);
    let mut iy = vec![0i32; x.len()];
    exp_rotation(x, 1, b, k, spread);
    let yy = op_pvq_search(x, &mut iy, k);
    encode_pulses(&iy, k as usize, enc);
    if resynth {
        normalise_residual(&iy, x, yy, gain);
        exp_rotation(x, -1, b, k, spread);
    }
    extract_collapse_mask(&iy, b)
}

/// decoder side of [`alg_quant`], always reconstructs `x`
pub fn alg_unquant(
    x: &mut [f32],
    k: i32,
    spread: Spread,
    b: usize,
    dec: &mut RangeDecoder,
    gain: f32,
) -> u32 {
    debug_assert!(k > 0);
    let mut iy = vec![0i32; x.len()];
    let ryy = decode_pulses(&mut iy, k as usize, dec) as f32;
    normalise_residual(&iy, x, ryy, gain);
    exp_rotation(x, -1, b, k, spread);
    extract_collapse_mask(&iy, b)
}

/// scales `x` to norm `gain`
pub fn renormalise_vector(x: &mut [f32], gain: f32) {
    let e = EPSILON + inner_prod(x, x);
    let g = gain / e.sqrt();
    x.iter_mut().for_each(|v| *v *= g);
}

/// # Description
/// Angle between the mid and side energies of `x` and `y` in Q14,
/// `0..=16384` covering `0..=pi/2`.
/// ## Parameters
/// - `stereo` treat `x`/`y` as left/right and measure on mid/side;
///   otherwise they already are the two halves to compare
pub fn stereo_itheta(x: &[f32], y: &[f32], stereo: bool) -> i32 {
    let (emid, eside) = if stereo {
        x.iter().zip(y.iter()).fold((EPSILON, EPSILON), |(em, es), (&l, &r)| {
            let m = l + r;
            let s = l - r;
            (em + m * m, es + s * s)
        })
    } else {
        (EPSILON + inner_prod(x, x), EPSILON + inner_prod(y, y))
    };
    let mid = emid.sqrt();
    let side = eside.sqrt();
    (0.5 + 16384.0 * 0.63662 * fast_atan2f(side, mid)).floor() as i32
}

#[cfg(test)]
mod test {
    #[allow(unused_imports)]
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_unit(rng: &mut StdRng, n: usize) -> Vec<f32> {
        let mut x = (0..n).map(|_| rng.gen_range(-1.0..1.0f32)).collect::<Vec<_>>();
        renormalise_vector(&mut x, 1.0);
        x
    }

    #[test]
    fn sanity() {
        assert_eq!(Spread::from_index(2), Some(Spread::Normal));
        assert_eq!(Spread::Aggressive.index(), 3);
        assert_eq!(extract_collapse_mask(&[0, 0, 1, 0], 1), 1);
        assert_eq!(extract_collapse_mask(&[0, 0, 1, 0, 0, 0, 0, -2], 4), 0b1010);
    }

    #[test]
    fn spread_levels_map_both_ways() {
        for level in [Spread::None, Spread::Light, Spread::Normal, Spread::Aggressive] {
            assert_eq!(Spread::from_index(level.index()), Some(level));
        }
        assert_eq!(Spread::from_index(4), None);
        assert_eq!(Spread::from_index(usize::MAX), None);
    }

    #[test]
    fn search_spends_exactly_k_pulses() {
        let mut rng = StdRng::seed_from_u64(3);
        for n in [2usize, 3, 4, 8, 16, 24, 48] {
            for k in [1, 2, 5, 11, 32, 100] {
                let mut x = random_unit(&mut rng, n);
                let mut iy = vec![0; n];
                let yy = op_pvq_search(&mut x, &mut iy, k);
                assert_eq!(iy.iter().map(|v| v.abs()).sum::<i32>(), k, "n={} k={}", n, k);
                assert_eq!(yy, iy.iter().map(|v| (v * v) as f32).sum::<f32>());
            }
        }
    }

    #[test]
    fn search_keeps_signs() {
        let mut x = vec![0.9, -0.3, 0.1, -0.3];
        let mut iy = vec![0; 4];
        op_pvq_search(&mut x, &mut iy, 6);
        assert!(iy[0] > 0);
        assert!(iy[1] <= 0 && iy[3] <= 0);
    }

    #[test]
    fn silent_input_falls_back_to_impulse() {
        let mut x = vec![0.0f32; 8];
        let mut iy = vec![0; 8];
        op_pvq_search(&mut x, &mut iy, 20);
        assert_eq!(iy[0], 20);
        assert!(iy[1..].iter().all(|&v| v == 0));
    }

    #[test]
    fn rotation_is_invertible() {
        let mut rng = StdRng::seed_from_u64(11);
        for spread in [Spread::Light, Spread::Normal, Spread::Aggressive] {
            for &(n, b) in [(16usize, 1usize), (32, 2), (64, 4), (96, 8)].iter() {
                let x = random_unit(&mut rng, n);
                let mut rotated = x.clone();
                exp_rotation(&mut rotated, 1, b, 3, spread);
                assert!(rotated.iter().zip(x.iter()).any(|(a, b)| (a - b).abs() > 1e-4));
                exp_rotation(&mut rotated, -1, b, 3, spread);
                for (a, b) in rotated.iter().zip(x.iter()) {
                    assert!((a - b).abs() < 1e-4);
                }
            }
        }
    }

    #[test]
    fn quant_unquant_reconstruct_the_same_vector() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut enc = RangeEncoder::new(256);
        let inputs = (0..6).map(|_| random_unit(&mut rng, 16)).collect::<Vec<_>>();
        let mut encoded = Vec::new();
        for x in inputs.iter() {
            let mut x = x.clone();
            let mask = alg_quant(&mut x, 7, Spread::Normal, 2, &mut enc, 1.0, true);
            encoded.push((x, mask));
        }
        enc.done();
        assert!(!enc.error());

        let mut dec = RangeDecoder::new(enc.buffer());
        for (expected, mask) in encoded.iter() {
            let mut x = vec![0.0f32; 16];
            let got_mask = alg_unquant(&mut x, 7, Spread::Normal, 2, &mut dec, 1.0);
            assert_eq!(got_mask, *mask);
            for (a, b) in x.iter().zip(expected.iter()) {
                assert!((a - b).abs() < 1e-6);
            }
            assert!((inner_prod(&x, &x) - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn itheta_spans_quarter_turn() {
        let x = [1.0, 0.5, 0.25];
        let zero = [0.0, 0.0, 0.0];
        assert_eq!(stereo_itheta(&x, &zero, false), 0);
        let itheta = stereo_itheta(&zero, &x, false);
        assert!((itheta - 16384).abs() <= 2);
        // identical channels have no side energy
        assert_eq!(stereo_itheta(&x, &x, true), 0);
        let mid = stereo_itheta(&x, &x, false);
        assert!((mid - 8192).abs() <= 2);
    }
}
