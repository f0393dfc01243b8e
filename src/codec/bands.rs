//! Band orchestration: recursive band splitting, mono and stereo shape
//! coding, spectral folding and anti-collapse.

use super::cwrs::get_pulses;
use super::rate::{bits2pulses, pulses2bits};
use super::vq::{alg_quant, alg_unquant, renormalise_vector, stereo_itheta, Spread};
use crate::collections::{CollapseMasks, Window};
use crate::math::{
    bitexact_cos, bitexact_log2tan, celt_exp2, celt_log2, dual_inner_prod, frac_mul16, inner_prod,
    isqrt32, lcg_rand,
};
use crate::mode::{Mode, QTHETA_OFFSET, QTHETA_OFFSET_TWOPHASE};
use crate::range::{Coder, BITRES};

const ORDERY_TABLE: [usize; 30] = [
    1, 0, //
    3, 0, 2, 1, //
    7, 0, 4, 3, 6, 1, 5, 2, //
    15, 0, 8, 7, 12, 3, 11, 4, 14, 1, 9, 6, 13, 2, 10, 5,
];
const EXP2_TABLE8: [i32; 8] = [16384, 17866, 19483, 21247, 23170, 25267, 27554, 30048];
const BIT_INTERLEAVE_TABLE: [u32; 16] = [0, 1, 1, 1, 2, 3, 3, 3, 2, 3, 3, 3, 2, 3, 3, 3];
const BIT_DEINTERLEAVE_TABLE: [u32; 16] = [
    0x00, 0x03, 0x0c, 0x0f, 0x30, 0x33, 0x3c, 0x3f, 0xc0, 0xc3, 0xcc, 0xcf, 0xf0, 0xf3, 0xfc, 0xff,
];
const FRAC_1_SQRT_2: f32 = 0.707_106_78;

/// # Description
/// Square root of the energy of every band of every channel.
/// ## Parameters
/// - `x` channels laid out one after the other, `mode.frame_size(lm)` samples each
/// - `band_e` receives `band + channel * nb_ebands`
pub fn compute_band_energies(mode: &Mode, x: &[f32], band_e: &mut [f32], end: usize, channels: usize, lm: i32) {
    let n = mode.frame_size(lm);
    let nb = mode.nb_ebands;
    for c in 0..channels {
        for i in 0..end {
            let band = &x[c * n + band_lo(mode, i, lm)..c * n + band_lo(mode, i + 1, lm)];
            band_e[i + c * nb] = (1e-27 + inner_prod(band, band)).sqrt();
        }
    }
}

/// divides every band of `freq` by its energy, writing the unit norm shapes to `x`
pub fn normalise_bands(mode: &Mode, freq: &[f32], x: &mut [f32], band_e: &[f32], end: usize, channels: usize, lm: i32) {
    let n = mode.frame_size(lm);
    let nb = mode.nb_ebands;
    for c in 0..channels {
        for i in 0..end {
            let g = 1.0 / (1e-27 + band_e[i + c * nb]);
            let range = c * n + band_lo(mode, i, lm)..c * n + band_lo(mode, i + 1, lm);
            x[range.clone()]
                .iter_mut()
                .zip(freq[range].iter())
                .for_each(|(v, &f)| *v = f * g);
        }
    }
}

/// # Description
/// Rebuilds one channel's spectrum from unit norm shapes and log2 band energies.
/// ## Comments
/// - bins outside `start..end` come out as zero, as does the whole frame when `silence` is set
#[allow(clippy::too_many_arguments)]
pub fn denormalise_bands(
    mode: &Mode,
    x: &[f32],
    freq: &mut [f32],
    log_e: &[f32],
    start: usize,
    end: usize,
    lm: i32,
    silence: bool,
) {
    let n = mode.frame_size(lm);
    let (start, end, bound) = if silence {
        (0, 0, 0)
    } else {
        (start, end, band_lo(mode, end, lm))
    };
    freq[..band_lo(mode, start, lm)].iter_mut().for_each(|f| *f = 0.0);
    for i in start..end {
        let lg = log_e[i] + mode.e_mean(i);
        let g = celt_exp2(lg.min(32.0));
        let range = band_lo(mode, i, lm)..band_lo(mode, i + 1, lm);
        freq[range.clone()]
            .iter_mut()
            .zip(x[range].iter())
            .for_each(|(f, &v)| *f = v * g);
    }
    freq[bound..n].iter_mut().for_each(|f| *f = 0.0);
}

/// log2 band energies relative to the mode's per band mean, `-14` above `eff_end`
pub fn amp_to_log2(mode: &Mode, eff_end: usize, end: usize, band_e: &[f32], log_e: &mut [f32], channels: usize) {
    let nb = mode.nb_ebands;
    for c in 0..channels {
        for i in 0..eff_end {
            log_e[i + c * nb] = celt_log2(band_e[i + c * nb]) - mode.e_mean(i);
        }
        for i in eff_end..end {
            log_e[i + c * nb] = -14.0;
        }
    }
}

/// # Description
/// Refills short blocks that collapsed to zero with signed noise whose level
/// follows the short-term energy history of the band.
/// ## Parameters
/// - `x` shapes of all channels, `size` samples apart
/// - `log_e`, `prev1`, `prev2` log2 energies of this frame and the two before,
///   `2 * nb_ebands` entries each
/// - `pulses` PVQ bits per band in 1/8 bits
#[allow(clippy::too_many_arguments)]
pub fn anti_collapse(
    mode: &Mode,
    x: &mut [f32],
    masks: &CollapseMasks,
    lm: i32,
    channels: usize,
    size: usize,
    start: usize,
    end: usize,
    log_e: &[f32],
    prev1: &[f32],
    prev2: &[f32],
    pulses: &[i32],
    mut seed: u32,
) {
    let nb = mode.nb_ebands;
    let blocks = 1usize << lm;
    for i in start..end {
        let n0 = (mode.ebands[i + 1] - mode.ebands[i]) as usize;
        // depth in 1/8 bits
        let depth = ((1 + pulses[i]) as u32 / n0 as u32) >> lm;
        let thresh = 0.5 * celt_exp2(-0.125 * depth as f32);
        let sqrt_1 = 1.0 / ((n0 << lm) as f32).sqrt();
        for c in 0..channels {
            let mut p1 = prev1[c * nb + i];
            let mut p2 = prev2[c * nb + i];
            if channels == 1 {
                p1 = p1.max(prev1[nb + i]);
                p2 = p2.max(prev2[nb + i]);
            }
            let ediff = (log_e[c * nb + i] - p1.min(p2)).max(0.0);
            // short blocks carry less energy than a long one
            let mut r = 2.0 * celt_exp2(-ediff);
            if lm == 3 {
                r *= std::f32::consts::SQRT_2;
            }
            let r = r.min(thresh) * sqrt_1;

            let offset = c * size + ((mode.ebands[i] as usize) << lm);
            let band = &mut x[offset..offset + (n0 << lm)];
            let mut renormalize = false;
            for k in 0..blocks {
                if masks.get(i, c) & (1 << k) == 0 {
                    for j in 0..n0 {
                        seed = lcg_rand(seed);
                        band[(j << lm) + k] = if seed & 0x8000 != 0 { r } else { -r };
                    }
                    renormalize = true;
                }
            }
            if renormalize {
                renormalise_vector(band, 1.0);
            }
        }
    }
}

#[inline]
fn band_lo(mode: &Mode, band: usize, lm: i32) -> usize {
    (mode.ebands[band] as usize) << lm
}

/// weight of each channel's error in the theta search distortion
fn compute_channel_weights(ex: f32, ey: f32) -> [f32; 2] {
    let min_e = ex.min(ey);
    [ex + min_e / 3.0, ey + min_e / 3.0]
}

/// folds `y` into `x` with the band energies as weights, the side is dropped
fn intensity_stereo(mode: &Mode, x: &mut [f32], y: &[f32], band_e: &[f32], band: usize) {
    let left = band_e[band];
    let right = band_e[band + mode.nb_ebands];
    let norm = 1e-15 + (1e-15 + left * left + right * right).sqrt();
    let a1 = left / norm;
    let a2 = right / norm;
    x.iter_mut().zip(y.iter()).for_each(|(l, &r)| *l = a1 * *l + a2 * r);
}

/// left/right to mid/side
fn stereo_split(x: &mut [f32], y: &mut [f32]) {
    x.iter_mut().zip(y.iter_mut()).for_each(|(l, r)| {
        let a = FRAC_1_SQRT_2 * *l;
        let b = FRAC_1_SQRT_2 * *r;
        *l = a + b;
        *r = b - a;
    });
}

/// # Description
/// Mid/side back to left/right, each side renormalised.
/// ## Comments
/// - a near silent channel makes `y` a copy of `x`
fn stereo_merge(x: &mut [f32], y: &mut [f32], mid: f32) {
    let (xp, side) = dual_inner_prod(y, x, y);
    let xp = mid * xp;
    let el = mid * mid + side - 2.0 * xp;
    let er = mid * mid + side + 2.0 * xp;
    if er < 6e-4 || el < 6e-4 {
        y.copy_from_slice(x);
        return;
    }
    let lgain = 1.0 / el.sqrt();
    let rgain = 1.0 / er.sqrt();
    x.iter_mut().zip(y.iter_mut()).for_each(|(xv, yv)| {
        let l = mid * *xv;
        let r = *yv;
        *xv = lgain * (l - r);
        *yv = rgain * (l + r);
    });
}

/// # Description
/// Block interleaved to block contiguous order.
/// ## Parameters
/// - `n0` samples per block
/// - `hadamard` use the ordering that keeps a Hadamard transform sequency sorted
fn deinterleave_hadamard(x: &mut [f32], n0: usize, stride: usize, hadamard: bool) {
    let mut tmp = vec![0.0; n0 * stride];
    for i in 0..stride {
        let dst = if hadamard { ORDERY_TABLE[stride - 2 + i] } else { i };
        for j in 0..n0 {
            tmp[dst * n0 + j] = x[j * stride + i];
        }
    }
    x[..tmp.len()].copy_from_slice(&tmp);
}

fn interleave_hadamard(x: &mut [f32], n0: usize, stride: usize, hadamard: bool) {
    let mut tmp = vec![0.0; n0 * stride];
    for i in 0..stride {
        let src = if hadamard { ORDERY_TABLE[stride - 2 + i] } else { i };
        for j in 0..n0 {
            tmp[j * stride + i] = x[src * n0 + j];
        }
    }
    x[..tmp.len()].copy_from_slice(&tmp);
}

/// one level of a Haar transform between pairs `stride` apart
fn haar1(x: &mut [f32], n0: usize, stride: usize) {
    for i in 0..stride {
        for j in 0..n0 >> 1 {
            let a = stride * 2 * j + i;
            let b = stride * (2 * j + 1) + i;
            let tmp1 = FRAC_1_SQRT_2 * x[a];
            let tmp2 = FRAC_1_SQRT_2 * x[b];
            x[a] = tmp1 + tmp2;
            x[b] = tmp1 - tmp2;
        }
    }
}

/// # Description
/// Number of steps theta is quantized to, given `b` bits for a split of an
/// `n`-sample band. Always even, or `1` when there is no room for a split angle.
fn compute_qn(n: i32, b: i32, offset: i32, pulse_cap: i32, stereo: bool) -> i32 {
    let mut n2 = 2 * n - 1;
    if stereo && n == 2 {
        n2 -= 1;
    }
    // leaves enough for one pulse on the side of a full split
    let qb = ((b + n2 * offset) / n2)
        .min(b - pulse_cap - (4 << BITRES))
        .min(8 << BITRES);
    if qb < (1 << BITRES >> 1) {
        1
    } else {
        let qn = EXP2_TABLE8[(qb & 0x7) as usize] >> (14 - (qb >> BITRES));
        (qn + 1) >> 1 << 1
    }
}

/// # Description
/// Per frame state threaded through the band recursion.
/// ## Comments
/// - `Copy` so the theta search can snapshot and roll it back
#[derive(Copy, Clone)]
struct BandCtx<'a> {
    mode: &'a Mode,
    band_e: &'a [f32],
    resynth: bool,
    band: usize,
    intensity: usize,
    spread: Spread,
    tf_change: i32,
    remaining_bits: i32,
    seed: u32,
    theta_round: i32,
    avoid_split_noise: bool,
    disable_inv: bool,
}

/// outcome of [`compute_theta`]
struct Split {
    inv: bool,
    imid: i32,
    iside: i32,
    delta: i32,
    itheta: i32,
    qalloc: i32,
}

/// # Description
/// Measures (encoder) or reads (decoder) the split angle between the two
/// halves `x` and `y`, and prepares the mid/side weights and bit offset.
/// ## Parameters
/// - `b` bits for the whole split, the cost of theta is taken off
/// - `bb` blocks in each half, `b0` blocks before the split
/// - `fill` loses the bits of a half that ends up with no energy
#[allow(clippy::too_many_arguments)]
fn compute_theta(
    ctx: &mut BandCtx,
    coder: &mut Coder,
    x: &mut [f32],
    y: &mut [f32],
    b: &mut i32,
    bb: usize,
    b0: usize,
    lm: i32,
    stereo: bool,
    fill: &mut u32,
) -> Split {
    let mode = ctx.mode;
    let i = ctx.band;
    let n = x.len() as i32;
    let encode = coder.is_encoder();

    let pulse_cap = i32::from(mode.log_n[i]) + lm * (1 << BITRES);
    let offset = (pulse_cap >> 1)
        - if stereo && n == 2 {
            QTHETA_OFFSET_TWOPHASE
        } else {
            QTHETA_OFFSET
        };
    let mut qn = compute_qn(n, *b, offset, pulse_cap, stereo);
    if stereo && i >= ctx.intensity {
        qn = 1;
    }

    let mut itheta = if encode { stereo_itheta(x, y, stereo) } else { 0 };
    let mut inv = false;
    let tell = coder.tell_frac();

    if qn != 1 {
        if encode {
            if !stereo || ctx.theta_round == 0 {
                itheta = (itheta * qn + 8192) >> 14;
                if !stereo && ctx.avoid_split_noise && itheta > 0 && itheta < qn {
                    // keep the allocation from injecting noise into a silent half
                    let unquantized = itheta * 16384 / qn;
                    let imid = i32::from(bitexact_cos(unquantized as i16));
                    let iside = i32::from(bitexact_cos((16384 - unquantized) as i16));
                    let delta = frac_mul16((n - 1) << 7, bitexact_log2tan(iside, imid));
                    if delta > *b {
                        itheta = qn;
                    } else if delta < -*b {
                        itheta = 0;
                    }
                }
            } else {
                // bias towards the two ends
                let bias = if itheta > 8192 { 32767 / qn } else { -32767 / qn };
                let down = (qn - 1).min(((itheta * qn + bias) >> 14).max(0));
                itheta = if ctx.theta_round < 0 { down } else { down + 1 };
            }
        }

        if stereo && n > 2 {
            // step pdf, three times as likely up to half way
            let p0 = 3;
            let x0 = qn / 2;
            let ft = (p0 * (x0 + 1) + x0) as u32;
            let bounds = |x: i32| {
                if x <= x0 {
                    ((p0 * x) as u32, (p0 * (x + 1)) as u32)
                } else {
                    ((x - 1 - x0 + (x0 + 1) * p0) as u32, (x - x0 + (x0 + 1) * p0) as u32)
                }
            };
            match coder {
                Coder::Encoder(enc) => {
                    let (fl, fh) = bounds(itheta);
                    enc.encode(fl, fh, ft);
                }
                Coder::Decoder(dec) => {
                    let fs = dec.decode(ft) as i32;
                    let x = if fs < (x0 + 1) * p0 {
                        fs / p0
                    } else {
                        x0 + 1 + (fs - (x0 + 1) * p0)
                    };
                    let (fl, fh) = bounds(x);
                    dec.update(fl, fh, ft);
                    itheta = x;
                }
            }
        } else if b0 > 1 || stereo {
            itheta = coder.uint(itheta as u32, qn as u32 + 1) as i32;
        } else {
            // triangular pdf
            let half = qn >> 1;
            let ft = (half + 1) * (half + 1);
            match coder {
                Coder::Encoder(enc) => {
                    let (fl, fs) = if itheta <= half {
                        (itheta * (itheta + 1) >> 1, itheta + 1)
                    } else {
                        (ft - ((qn + 1 - itheta) * (qn + 2 - itheta) >> 1), qn + 1 - itheta)
                    };
                    enc.encode(fl as u32, (fl + fs) as u32, ft as u32);
                }
                Coder::Decoder(dec) => {
                    let fm = dec.decode(ft as u32) as i32;
                    let (fl, fs) = if fm < (half * (half + 1) >> 1) {
                        itheta = ((isqrt32(8 * fm as u32 + 1) - 1) >> 1) as i32;
                        (itheta * (itheta + 1) >> 1, itheta + 1)
                    } else {
                        itheta = ((2 * (qn as u32 + 1) - isqrt32(8 * (ft - fm - 1) as u32 + 1)) >> 1) as i32;
                        (ft - ((qn + 1 - itheta) * (qn + 2 - itheta) >> 1), qn + 1 - itheta)
                    };
                    dec.update(fl as u32, (fl + fs) as u32, ft as u32);
                }
            }
        }
        itheta = ((itheta as u32 * 16384) / qn as u32) as i32;
        if encode && stereo {
            if itheta == 0 {
                intensity_stereo(mode, x, y, ctx.band_e, i);
            } else {
                stereo_split(x, y);
            }
        }
    } else if stereo {
        if encode {
            inv = itheta > 8192 && !ctx.disable_inv;
            if inv {
                y.iter_mut().for_each(|v| *v = -*v);
            }
            intensity_stereo(mode, x, y, ctx.band_e, i);
        }
        inv = if *b > 2 << BITRES && ctx.remaining_bits > 2 << BITRES {
            coder.bit_logp(inv, 2)
        } else {
            false
        };
        if ctx.disable_inv {
            inv = false;
        }
        itheta = 0;
    }

    let qalloc = coder.tell_frac() - tell;
    *b -= qalloc;

    let (imid, iside, delta) = match itheta {
        0 => {
            *fill &= (1u32 << bb) - 1;
            (32767, 0, -16384)
        }
        16384 => {
            *fill &= ((1u32 << bb) - 1) << bb;
            (0, 32767, 16384)
        }
        _ => {
            let imid = i32::from(bitexact_cos(itheta as i16));
            let iside = i32::from(bitexact_cos((16384 - itheta) as i16));
            // mid/side split minimizing the squared error of the band
            let delta = frac_mul16((n - 1) << 7, bitexact_log2tan(iside, imid));
            (imid, iside, delta)
        }
    };
    log::trace!("band {} n={} qn={} itheta={} qalloc={}", i, n, qn, itheta, qalloc);

    Split {
        inv,
        imid,
        iside,
        delta,
        itheta,
        qalloc,
    }
}

/// codes the sign of a single sample band when there is a bit for it
fn code_n1_sign(ctx: &mut BandCtx, coder: &mut Coder, x: &mut f32) {
    let mut sign = 0;
    if ctx.remaining_bits >= 1 << BITRES {
        sign = coder.bits((*x < 0.0) as u32, 1);
        ctx.remaining_bits -= 1 << BITRES;
    }
    if ctx.resynth {
        *x = if sign != 0 { -1.0 } else { 1.0 };
    }
}

fn quant_band_n1(
    ctx: &mut BandCtx,
    coder: &mut Coder,
    x: &mut [f32],
    y: Option<&mut [f32]>,
    lowband_out: Option<&mut [f32]>,
) -> u32 {
    code_n1_sign(ctx, coder, &mut x[0]);
    if let Some(y) = y {
        code_n1_sign(ctx, coder, &mut y[0]);
    }
    if let Some(out) = lowband_out {
        out[0] = x[0];
    }
    1
}

/// # Description
/// Codes the shape of a band, halving it while the bits exceed what the
/// largest codebook for its size can spend.
/// ## Parameters
/// - `lowband` folding source, at least as long as `x`
/// - `lm` `-1` once the band is split below a single short block
/// ## Returns
/// collapse mask of the `bb` blocks
#[allow(clippy::too_many_arguments)]
fn quant_partition(
    ctx: &mut BandCtx,
    coder: &mut Coder,
    x: &mut [f32],
    mut b: i32,
    mut bb: usize,
    lowband: Option<&[f32]>,
    mut lm: i32,
    gain: f32,
    mut fill: u32,
) -> u32 {
    let mode = ctx.mode;
    let i = ctx.band;
    let n = x.len();
    let b0 = bb;

    let split = lm != -1 && n > 2 && {
        let cache = mode.cache.band_bits(mode.nb_ebands, lm, i);
        b > i32::from(cache[cache[0] as usize]) + 12
    };

    if split {
        let half = n >> 1;
        let (xl, xr) = x.split_at_mut(half);
        lm -= 1;
        if bb == 1 {
            fill = (fill & 1) | (fill << 1);
        }
        bb = (bb + 1) >> 1;

        let s = compute_theta(ctx, coder, xl, xr, &mut b, bb, b0, lm, false, &mut fill);
        let mid = s.imid as f32 / 32768.0;
        let side = s.iside as f32 / 32768.0;
        let mut delta = s.delta;

        // give low energy blocks of a transient more than their share
        if b0 > 1 && s.itheta & 0x3fff != 0 {
            if s.itheta > 8192 {
                delta -= delta >> (4 - lm);
            } else {
                delta = 0.min(delta + (((half as i32) << BITRES) >> (5 - lm)));
            }
        }
        let mut mbits = 0.max(b.min((b - delta) / 2));
        let mut sbits = b - mbits;
        ctx.remaining_bits -= s.qalloc;

        let next_lowband = lowband.map(|l| &l[half..]);
        let mut rebalance = ctx.remaining_bits;
        let mut cm;
        if mbits >= sbits {
            cm = quant_partition(ctx, coder, xl, mbits, bb, lowband, lm, gain * mid, fill);
            rebalance = mbits - (rebalance - ctx.remaining_bits);
            if rebalance > 3 << BITRES && s.itheta != 0 {
                sbits += rebalance - (3 << BITRES);
            }
            cm |= quant_partition(ctx, coder, xr, sbits, bb, next_lowband, lm, gain * side, fill >> bb)
                << (b0 >> 1);
        } else {
            cm = quant_partition(ctx, coder, xr, sbits, bb, next_lowband, lm, gain * side, fill >> bb)
                << (b0 >> 1);
            rebalance = sbits - (rebalance - ctx.remaining_bits);
            if rebalance > 3 << BITRES && s.itheta != 16384 {
                mbits += rebalance - (3 << BITRES);
            }
            cm |= quant_partition(ctx, coder, xl, mbits, bb, lowband, lm, gain * mid, fill);
        }
        return cm;
    }

    let mut q = bits2pulses(mode, i, lm, b);
    let mut curr_bits = pulses2bits(mode, i, lm, q);
    ctx.remaining_bits -= curr_bits;
    // never bust the budget
    while ctx.remaining_bits < 0 && q > 0 {
        ctx.remaining_bits += curr_bits;
        q -= 1;
        curr_bits = pulses2bits(mode, i, lm, q);
        ctx.remaining_bits -= curr_bits;
    }
    log::trace!("band {} leaf n={} bits={} q={}", i, n, b, q);

    if q != 0 {
        let k = get_pulses(q);
        return match coder {
            Coder::Encoder(enc) => alg_quant(x, k, ctx.spread, bb, enc, gain, ctx.resynth),
            Coder::Decoder(dec) => alg_unquant(x, k, ctx.spread, bb, dec, gain),
        };
    }

    if !ctx.resynth {
        return 0;
    }
    // no pulses, fill the band anyway
    let cm_mask = ((1u64 << bb) - 1) as u32;
    fill &= cm_mask;
    if fill == 0 {
        x.iter_mut().for_each(|v| *v = 0.0);
        return 0;
    }
    let cm = match lowband {
        None => {
            for v in x.iter_mut() {
                ctx.seed = lcg_rand(ctx.seed);
                *v = (ctx.seed as i32 >> 20) as f32;
            }
            cm_mask
        }
        Some(lowband) => {
            // about 48 dB below the folded level
            for (v, &l) in x.iter_mut().zip(lowband.iter()) {
                ctx.seed = lcg_rand(ctx.seed);
                let tmp = if ctx.seed & 0x8000 != 0 { 1.0 / 256.0 } else { -1.0 / 256.0 };
                *v = l + tmp;
            }
            fill
        }
    };
    renormalise_vector(x, gain);
    cm
}

/// # Description
/// Codes one mono band (or one channel of a dual stereo band), first moving
/// it to the time-frequency resolution the frame asked for.
/// ## Parameters
/// - `lowband` owned copy of the folding source, `x.len()` long
/// - `lowband_out` receives the reconstructed band scaled for later folding
#[allow(clippy::too_many_arguments)]
fn quant_band(
    ctx: &mut BandCtx,
    coder: &mut Coder,
    x: &mut [f32],
    b: i32,
    mut bb: usize,
    mut lowband: Option<&mut [f32]>,
    lm: i32,
    lowband_out: Option<&mut [f32]>,
    gain: f32,
    mut fill: u32,
) -> u32 {
    let n0 = x.len();
    let n = n0;
    let mut n_b = n / bb;
    let long_blocks = bb == 1;
    let encode = coder.is_encoder();
    let mut tf_change = ctx.tf_change;
    let mut time_divide = 0;

    if n == 1 {
        return quant_band_n1(ctx, coder, x, None, lowband_out);
    }
    let recombine = tf_change.max(0) as usize;

    // recombine blocks for more frequency resolution
    for k in 0..recombine {
        if encode {
            haar1(x, n >> k, 1 << k);
        }
        if let Some(l) = lowband.as_deref_mut() {
            haar1(l, n >> k, 1 << k);
        }
        fill = BIT_INTERLEAVE_TABLE[(fill & 0xf) as usize] | BIT_INTERLEAVE_TABLE[(fill >> 4) as usize & 0xf] << 2;
    }
    bb >>= recombine;
    n_b <<= recombine;

    // split blocks for more time resolution
    while n_b & 1 == 0 && tf_change < 0 {
        if encode {
            haar1(x, n_b, bb);
        }
        if let Some(l) = lowband.as_deref_mut() {
            haar1(l, n_b, bb);
        }
        fill |= fill << bb;
        bb <<= 1;
        n_b >>= 1;
        time_divide += 1;
        tf_change += 1;
    }
    let b0 = bb;
    let n_b0 = n_b;

    // time order instead of frequency order
    if b0 > 1 {
        if encode {
            deinterleave_hadamard(x, n_b >> recombine, b0 << recombine, long_blocks);
        }
        if let Some(l) = lowband.as_deref_mut() {
            deinterleave_hadamard(l, n_b >> recombine, b0 << recombine, long_blocks);
        }
    }

    let mut cm = quant_partition(ctx, coder, x, b, bb, lowband.as_deref(), lm, gain, fill);

    if ctx.resynth {
        if b0 > 1 {
            interleave_hadamard(x, n_b >> recombine, b0 << recombine, long_blocks);
        }
        n_b = n_b0;
        bb = b0;
        for _ in 0..time_divide {
            bb >>= 1;
            n_b <<= 1;
            cm |= cm >> bb;
            haar1(x, n_b, bb);
        }
        for k in 0..recombine {
            cm = BIT_DEINTERLEAVE_TABLE[cm as usize & 0xf];
            haar1(x, n0 >> k, 1 << k);
        }
        bb <<= recombine;

        if let Some(out) = lowband_out {
            let scale = (n0 as f32).sqrt();
            out.iter_mut().zip(x.iter()).for_each(|(o, &v)| *o = scale * v);
        }
        cm &= ((1u64 << bb) - 1) as u32;
    }
    cm
}

/// # Description
/// Codes a band of a stereo pair as a mid/side split.
/// ## Comments
/// - two sample bands code the side with a single sign bit, the side being
///   orthogonal to the mid
/// - the mid is coded with unit gain so it can be folded later
#[allow(clippy::too_many_arguments)]
fn quant_band_stereo(
    ctx: &mut BandCtx,
    coder: &mut Coder,
    x: &mut [f32],
    y: &mut [f32],
    mut b: i32,
    bb: usize,
    lowband: Option<&mut [f32]>,
    lm: i32,
    lowband_out: Option<&mut [f32]>,
    mut fill: u32,
) -> u32 {
    let n = x.len();
    let encode = coder.is_encoder();
    if n == 1 {
        return quant_band_n1(ctx, coder, x, Some(y), lowband_out);
    }
    let orig_fill = fill;

    let s = compute_theta(ctx, coder, x, y, &mut b, bb, bb, lm, true, &mut fill);
    let mid = s.imid as f32 / 32768.0;
    let side = s.iside as f32 / 32768.0;
    let mut cm;

    if n == 2 {
        let sbits = if s.itheta != 0 && s.itheta != 16384 { 1 << BITRES } else { 0 };
        let mbits = b - sbits;
        let swap = s.itheta > 8192;
        ctx.remaining_bits -= s.qalloc + sbits;

        let (x2, y2) = if swap { (&mut *y, &mut *x) } else { (&mut *x, &mut *y) };
        let mut sign = 0;
        if sbits != 0 {
            let value = if encode {
                (x2[0] * y2[1] - x2[1] * y2[0] < 0.0) as u32
            } else {
                0
            };
            sign = coder.bits(value, 1);
        }
        let sign = 1.0 - 2.0 * sign as f32;
        // orig_fill, since itheta == 16384 cleared the bits of the folded side
        cm = quant_band(ctx, coder, x2, mbits, bb, lowband, lm, lowband_out, 1.0, orig_fill);
        y2[0] = -sign * x2[1];
        y2[1] = sign * x2[0];
        if ctx.resynth {
            x[0] *= mid;
            x[1] *= mid;
            y[0] *= side;
            y[1] *= side;
            for j in 0..2 {
                let tmp = x[j];
                x[j] = tmp - y[j];
                y[j] = tmp + y[j];
            }
        }
    } else {
        let mut mbits = 0.max(b.min((b - s.delta) / 2));
        let mut sbits = b - mbits;
        ctx.remaining_bits -= s.qalloc;

        let mut rebalance = ctx.remaining_bits;
        if mbits >= sbits {
            cm = quant_band(ctx, coder, x, mbits, bb, lowband, lm, lowband_out, 1.0, fill);
            rebalance = mbits - (rebalance - ctx.remaining_bits);
            if rebalance > 3 << BITRES && s.itheta != 0 {
                sbits += rebalance - (3 << BITRES);
            }
            // the high bits of fill are always clear for the side, it never folds
            cm |= quant_band(ctx, coder, y, sbits, bb, None, lm, None, side, fill >> bb);
        } else {
            cm = quant_band(ctx, coder, y, sbits, bb, None, lm, None, side, fill >> bb);
            rebalance = sbits - (rebalance - ctx.remaining_bits);
            if rebalance > 3 << BITRES && s.itheta != 16384 {
                mbits += rebalance - (3 << BITRES);
            }
            cm |= quant_band(ctx, coder, x, mbits, bb, lowband, lm, lowband_out, 1.0, fill);
        }
    }

    if ctx.resynth {
        if n != 2 {
            stereo_merge(x, y, mid);
        }
        if s.inv {
            y.iter_mut().for_each(|v| *v = -*v);
        }
    }
    cm
}

/// # Description
/// Duplicates the tail of the first band's folding data so the second band
/// has enough to fold from.
/// ## Comments
/// - copies nothing when the first two bands have the same width
fn special_hybrid_folding(mode: &Mode, norm: &mut [f32], norm2: Option<&mut [f32]>, start: usize, lm: i32) {
    let n1 = (mode.band_width(start, 0) << lm) as usize;
    let n2 = (mode.band_width(start + 1, 0) << lm) as usize;
    if n2 <= n1 {
        return;
    }
    let copy = |buf: &mut [f32]| {
        let src = Window::new(n1, n1 as isize - n2 as isize, n2 - n1, buf.len());
        let dst = Window::new(n1, 0, n2 - n1, buf.len());
        if let (Some(src), Some(_)) = (src, dst) {
            buf.copy_within(src.range(), n1);
        }
    };
    copy(norm);
    if let Some(norm2) = norm2 {
        copy(norm2);
    }
}

/// # Description
/// Inputs of [`quant_all_bands`].
/// ## Comments
/// - `band_e` holds both channels, `band + channel * nb_ebands`
/// - `pulses` and `tf_res` are indexed by band
/// - `total_bits` is in 1/8 bits, `balance` comes from the allocation
#[derive(Copy, Clone, Debug)]
pub struct BandQuantParams<'a> {
    pub start: usize,
    pub end: usize,
    pub band_e: &'a [f32],
    pub pulses: &'a [i32],
    pub short_blocks: bool,
    pub spread: Spread,
    pub dual_stereo: bool,
    pub intensity: usize,
    pub tf_res: &'a [i32],
    pub total_bits: i32,
    pub balance: i32,
    pub lm: i32,
    pub coded_bands: usize,
    pub complexity: i32,
    pub disable_inv: bool,
}

/// # Description
/// Codes the shapes of every band in `start..end`.
/// ## Parameters
/// - `x`, `y` one channel each, `mode.frame_size(lm)` samples; `y` is `None` for mono
/// - `masks` receives the collapse mask of every band and channel
/// - `seed` folding noise state, updated in place
/// ## Comments
/// - the decoder (and the encoder when it runs the theta search) leaves the
///   reconstructed shapes in `x` and `y`
/// - `end` is clamped to the mode's effective band count
pub fn quant_all_bands(
    mode: &Mode,
    params: &BandQuantParams,
    x: &mut [f32],
    mut y: Option<&mut [f32]>,
    masks: &mut CollapseMasks,
    seed: &mut u32,
    coder: &mut Coder,
) {
    let BandQuantParams {
        start,
        band_e,
        pulses,
        short_blocks,
        spread,
        tf_res,
        total_bits,
        lm,
        coded_bands,
        complexity,
        disable_inv,
        ..
    } = *params;
    let nb = mode.nb_ebands;
    let end = params.end.min(mode.eff_ebands);
    let encode = coder.is_encoder();
    let stereo = y.is_some();
    let channels = if stereo { 2 } else { 1 };
    let theta_rdo = encode && stereo && !params.dual_stereo && complexity >= 8;
    let resynth = !encode || theta_rdo;
    let bb = if short_blocks { 1usize << lm } else { 1 };
    let eb = |j: usize| i32::from(mode.ebands[j]) << lm;

    let norm_offset = eb(start);
    // the last band is never folded from
    let norm_len = (eb(nb - 1) - norm_offset).max(0) as usize;
    let mut norm = vec![0.0f32; norm_len];
    let mut norm2 = vec![0.0f32; if stereo { norm_len } else { 0 }];

    let mut ctx = BandCtx {
        mode,
        band_e,
        resynth,
        band: start,
        intensity: params.intensity,
        spread,
        tf_change: 0,
        remaining_bits: 0,
        seed: *seed,
        theta_round: 0,
        // no noise injection in the first band of a transient
        avoid_split_noise: bb > 1,
        disable_inv,
    };

    let mut balance = params.balance;
    let mut dual_stereo = params.dual_stereo;
    let mut update_lowband = true;
    let mut lowband_offset = 0usize;

    for i in start..end {
        ctx.band = i;
        let last = i == end - 1;
        let lo = eb(i) as usize;
        let n = (eb(i + 1) - eb(i)) as usize;

        let tell = coder.tell_frac();
        if i != start {
            balance -= tell;
        }
        let remaining_bits = total_bits - tell - 1;
        ctx.remaining_bits = remaining_bits;
        let b = if i < coded_bands {
            let curr_balance = balance / (coded_bands - i).min(3) as i32;
            0.max(16383.min((remaining_bits + 1).min(pulses[i] + curr_balance)))
        } else {
            0
        };

        if resynth && (eb(i) - n as i32 >= eb(start) || i == start + 1) && (update_lowband || lowband_offset == 0) {
            lowband_offset = i;
        }
        if i == start + 1 {
            special_hybrid_folding(mode, &mut norm, dual_stereo.then_some(&mut norm2[..]), start, lm);
        }
        ctx.tf_change = tf_res[i];

        // conservative collapse masks of the bands folded from
        let mut fold = None;
        let (mut x_cm, mut y_cm);
        if lowband_offset != 0 && (spread != Spread::Aggressive || bb > 1 || ctx.tf_change < 0) {
            // never repeat spectral content within one band
            let effective = (eb(lowband_offset) - norm_offset - n as i32).max(0);
            let mut fold_start = lowband_offset;
            loop {
                fold_start -= 1;
                if eb(fold_start) <= effective + norm_offset {
                    break;
                }
            }
            let mut fold_end = lowband_offset;
            while fold_end < i && eb(fold_end) < effective + norm_offset + n as i32 {
                fold_end += 1;
            }
            x_cm = 0;
            y_cm = 0;
            for fold_i in fold_start..fold_end.max(fold_start + 1) {
                x_cm |= u32::from(masks.get(fold_i, 0));
                y_cm |= u32::from(masks.get(fold_i, channels - 1));
            }
            fold = Window::new(effective as usize, 0, n, norm_len);
        } else {
            // the LCG fills every block
            x_cm = (1u32 << bb) - 1;
            y_cm = x_cm;
        }

        if dual_stereo && i == params.intensity {
            dual_stereo = false;
            if resynth {
                let len = (eb(i) - norm_offset) as usize;
                norm[..len]
                    .iter_mut()
                    .zip(norm2[..len].iter())
                    .for_each(|(a, &b)| *a = 0.5 * (*a + b));
            }
        }

        let out = if last {
            None
        } else {
            Window::new(lo - norm_offset as usize, 0, n, norm_len)
        };
        let lowband_of = |buf: &[f32]| fold.map(|w| w.view(buf).to_vec());
        let xb = &mut x[lo..lo + n];

        match y.as_deref_mut() {
            Some(yfull) if dual_stereo => {
                let yb = &mut yfull[lo..lo + n];
                let mut lb = lowband_of(&norm);
                x_cm = quant_band(&mut ctx, coder, xb, b / 2, bb, lb.as_deref_mut(), lm, out.map(|w| w.view_mut(&mut norm)), 1.0, x_cm);
                let mut lb = lowband_of(&norm2);
                y_cm = quant_band(&mut ctx, coder, yb, b / 2, bb, lb.as_deref_mut(), lm, out.map(|w| w.view_mut(&mut norm2)), 1.0, y_cm);
            }
            Some(yfull) => {
                let yb = &mut yfull[lo..lo + n];
                let checkpoint = if theta_rdo && i < params.intensity {
                    coder.encoder_mut().map(|enc| enc.checkpoint())
                } else {
                    None
                };
                match checkpoint {
                    Some(ec_save) => {
                        let w = compute_channel_weights(band_e[i], band_e[i + nb]);
                        let cm = x_cm | y_cm;
                        let ctx_save = ctx;
                        let x_save = xb.to_vec();
                        let y_save = yb.to_vec();

                        // round theta down
                        ctx.theta_round = -1;
                        let mut lb = lowband_of(&norm);
                        x_cm = quant_band_stereo(&mut ctx, coder, xb, yb, b, bb, lb.as_deref_mut(), lm, out.map(|w| w.view_mut(&mut norm)), cm);
                        let dist0 = w[0] * inner_prod(&x_save, xb) + w[1] * inner_prod(&y_save, yb);

                        let cm2 = x_cm;
                        let ctx_save2 = ctx;
                        let x_save2 = xb.to_vec();
                        let y_save2 = yb.to_vec();
                        let norm_save2 = out.map(|w| w.view(&norm).to_vec());
                        let mut first = None;
                        if let Some(enc) = coder.encoder_mut() {
                            let state = enc.checkpoint();
                            let tail = enc.save_tail(&ec_save);
                            enc.restore(ec_save);
                            first = Some((state, tail));
                        }
                        ctx = ctx_save;
                        xb.copy_from_slice(&x_save);
                        yb.copy_from_slice(&y_save);
                        if i == start + 1 {
                            special_hybrid_folding(mode, &mut norm, None, start, lm);
                        }

                        // round theta up
                        ctx.theta_round = 1;
                        let mut lb = lowband_of(&norm);
                        x_cm = quant_band_stereo(&mut ctx, coder, xb, yb, b, bb, lb.as_deref_mut(), lm, out.map(|w| w.view_mut(&mut norm)), cm);
                        let dist1 = w[0] * inner_prod(&x_save, xb) + w[1] * inner_prod(&y_save, yb);

                        if dist0 >= dist1 {
                            x_cm = cm2;
                            ctx = ctx_save2;
                            xb.copy_from_slice(&x_save2);
                            yb.copy_from_slice(&y_save2);
                            if let (Some(w), Some(saved)) = (out, norm_save2) {
                                w.view_mut(&mut norm).copy_from_slice(&saved);
                            }
                            if let (Some(enc), Some((state, tail))) = (coder.encoder_mut(), first) {
                                enc.restore(state);
                                enc.restore_tail(&ec_save, &tail);
                            }
                        }
                        log::trace!("band {} theta search: down={} up={}", i, dist0, dist1);
                    }
                    None => {
                        ctx.theta_round = 0;
                        let mut lb = lowband_of(&norm);
                        x_cm = quant_band_stereo(&mut ctx, coder, xb, yb, b, bb, lb.as_deref_mut(), lm, out.map(|w| w.view_mut(&mut norm)), x_cm | y_cm);
                    }
                }
                y_cm = x_cm;
            }
            None => {
                let mut lb = lowband_of(&norm);
                x_cm = quant_band(&mut ctx, coder, xb, b, bb, lb.as_deref_mut(), lm, out.map(|w| w.view_mut(&mut norm)), 1.0, x_cm | y_cm);
                y_cm = x_cm;
            }
        }

        masks.set(i, 0, x_cm);
        masks.set(i, channels - 1, y_cm);
        balance += pulses[i] + tell;
        // move the folding point only while bands get at least a bit per sample
        update_lowband = b > (n << BITRES) as i32;
        ctx.avoid_split_noise = false;
    }
    *seed = ctx.seed;
}

#[cfg(test)]
mod test {
    #[allow(unused_imports)]
    use super::*;
    use crate::codec::rate::{compute_allocation, AllocationRequest};
    use crate::range::{RangeDecoder, RangeEncoder};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn test_ctx<'a>(mode: &'a Mode, band_e: &'a [f32], resynth: bool) -> BandCtx<'a> {
        BandCtx {
            mode,
            band_e,
            resynth,
            band: 10,
            intensity: mode.nb_ebands,
            spread: Spread::Normal,
            tf_change: 0,
            remaining_bits: 1 << 16,
            seed: 1234,
            theta_round: 0,
            avoid_split_noise: false,
            disable_inv: false,
        }
    }

    #[test]
    fn sanity() {
        assert_eq!(compute_qn(4, 1000, 40, 0, false), 256);
        assert_eq!(compute_qn(4, 0, 0, 0, false), 1);
        for b in (0..400).step_by(7) {
            let qn = compute_qn(8, b, 10, 20, false);
            assert!(qn == 1 || (qn % 2 == 0 && qn <= 256));
        }
        assert_eq!(compute_channel_weights(3.0, 6.0), [4.0, 7.0]);
    }

    #[test]
    fn haar_is_its_own_inverse() {
        let mut rng = StdRng::seed_from_u64(1);
        let orig = (0..16).map(|_| rng.gen_range(-1.0..1.0f32)).collect::<Vec<_>>();
        for stride in [1usize, 2, 4] {
            let mut x = orig.clone();
            haar1(&mut x, 16 / stride, stride);
            haar1(&mut x, 16 / stride, stride);
            assert!(x.iter().zip(orig.iter()).all(|(a, b)| (a - b).abs() < 1e-5));
        }
    }

    #[test]
    fn interleave_undoes_deinterleave() {
        let orig = (0..32).map(|v| v as f32).collect::<Vec<_>>();
        for &stride in [2usize, 4, 8, 16].iter() {
            for &hadamard in [false, true].iter() {
                let mut x = orig.clone();
                deinterleave_hadamard(&mut x, 32 / stride, stride, hadamard);
                assert_ne!(x, orig);
                interleave_hadamard(&mut x, 32 / stride, stride, hadamard);
                assert_eq!(x, orig);
            }
        }
    }

    #[test]
    fn split_then_merge_keeps_the_pair_unit_norm() {
        let mut x = vec![0.6, 0.8, 0.0, 0.0];
        let mut y = vec![0.0, 0.6, 0.8, 0.0];
        stereo_split(&mut x, &mut y);
        let e = inner_prod(&x, &x) + inner_prod(&y, &y);
        assert!((e - 2.0).abs() < 1e-5);

        renormalise_vector(&mut x, 1.0);
        renormalise_vector(&mut y, 0.5);
        stereo_merge(&mut x, &mut y, 0.8);
        assert!((inner_prod(&x, &x) - 1.0).abs() < 1e-4);
        assert!((inner_prod(&y, &y) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn silent_band_without_pulses() {
        let mode = Mode::standard();
        let band_e = vec![1.0; 2 * mode.nb_ebands];

        // nothing to fold from and no fill bits: exact zero
        let mut enc = RangeEncoder::new(64);
        let mut coder = Coder::Encoder(&mut enc);
        let mut ctx = test_ctx(mode, &band_e, true);
        let mut x = vec![0.0f32; 16];
        let cm = quant_band(&mut ctx, &mut coder, &mut x, 0, 1, None, 1, None, 1.0, 0);
        assert_eq!(cm, 0);
        assert!(x.iter().all(|&v| v == 0.0));

        // fill bit set: unit norm noise
        let cm = quant_band(&mut ctx, &mut coder, &mut x, 0, 1, None, 1, None, 1.0, 1);
        assert_eq!(cm, 1);
        assert!((inner_prod(&x, &x) - 1.0).abs() < 1e-4);
        assert_eq!(coder.tell_frac(), RangeEncoder::new(64).tell_frac());
    }

    #[test]
    fn folded_band_follows_its_source() {
        let mode = Mode::standard();
        let band_e = vec![1.0; 2 * mode.nb_ebands];
        let mut dec = RangeDecoder::new(&[0u8; 8]);
        let mut coder = Coder::Decoder(&mut dec);
        let mut ctx = test_ctx(mode, &band_e, true);
        let mut lowband = (0..16).map(|v| if v % 3 == 0 { 1.0 } else { -0.5 }).collect::<Vec<f32>>();
        let source = lowband.clone();
        let mut x = vec![0.0f32; 16];
        let cm = quant_band(&mut ctx, &mut coder, &mut x, 0, 1, Some(&mut lowband), 1, None, 1.0, 1);
        assert_eq!(cm, 1);
        let norm = inner_prod(&source, &source).sqrt();
        let corr = inner_prod(&x, &source) / norm;
        assert!(corr > 0.99);
    }

    fn random_shapes(mode: &Mode, lm: i32, rng: &mut StdRng) -> (Vec<f32>, Vec<f32>) {
        let n = mode.frame_size(lm);
        let freq = (0..n).map(|_| rng.gen_range(-1.0..1.0f32)).collect::<Vec<_>>();
        let mut band_e = vec![0.0; 2 * mode.nb_ebands];
        compute_band_energies(mode, &freq, &mut band_e, mode.nb_ebands, 1, lm);
        let mut x = vec![0.0; n];
        normalise_bands(mode, &freq, &mut x, &band_e, mode.nb_ebands, 1, lm);
        (x, band_e)
    }

    /// allocation plus band coding, the way a frame lays them out
    fn code_bands(mode: &Mode, lm: i32, x: &mut [f32], band_e: &[f32], bytes: usize, coder: &mut Coder) -> u32 {
        let nb = mode.nb_ebands;
        let total = (bytes as i32 * (8 << BITRES)) - coder.tell_frac() - 1;
        let offsets = vec![0; nb];
        let cap = mode.init_caps(lm, 1);
        let req = AllocationRequest {
            start: 0,
            end: nb,
            offsets: &offsets,
            cap: &cap,
            alloc_trim: 5,
            intensity: 0,
            dual_stereo: false,
            total,
            channels: 1,
            lm,
            prev: nb,
            signal_bandwidth: nb - 1,
        };
        let alloc = compute_allocation(mode, &req, coder);
        let tf_res = vec![0; nb];
        let params = BandQuantParams {
            start: 0,
            end: nb,
            band_e,
            pulses: &alloc.pulses,
            short_blocks: false,
            spread: Spread::Normal,
            dual_stereo: false,
            intensity: 0,
            tf_res: &tf_res,
            total_bits: bytes as i32 * (8 << BITRES),
            balance: alloc.balance,
            lm,
            coded_bands: alloc.coded_bands,
            complexity: 5,
            disable_inv: false,
        };
        let mut masks = CollapseMasks::new(nb, 1);
        let mut seed = 0;
        quant_all_bands(mode, &params, x, None, &mut masks, &mut seed, coder);
        seed
    }

    #[test]
    fn mono_bands_round_trip() {
        let mode = Mode::standard();
        let lm = 3;
        let mut rng = StdRng::seed_from_u64(21);
        let (orig, band_e) = random_shapes(mode, lm, &mut rng);

        let mut enc = RangeEncoder::new(160);
        let mut x = orig.clone();
        code_bands(mode, lm, &mut x, &band_e, 160, &mut Coder::Encoder(&mut enc));
        enc.done();
        assert!(!enc.error());
        let range = enc.range();
        let bytes = enc.into_bytes();

        let mut dec = RangeDecoder::new(&bytes);
        let mut y = vec![0.0; orig.len()];
        code_bands(mode, lm, &mut y, &band_e, 160, &mut Coder::Decoder(&mut dec));
        assert!(!dec.error());
        assert_eq!(dec.range(), range);

        // coded shapes point the same way as the input
        let lo = band_lo(mode, 2, lm);
        let hi = band_lo(mode, 12, lm);
        let corr = inner_prod(&orig[lo..hi], &y[lo..hi])
            / (inner_prod(&orig[lo..hi], &orig[lo..hi]) * inner_prod(&y[lo..hi], &y[lo..hi])).sqrt();
        assert!(corr > 0.5, "correlation {}", corr);
    }

    #[test]
    fn anti_collapse_fills_collapsed_blocks() {
        let mode = Mode::standard();
        let lm = 2;
        let nb = mode.nb_ebands;
        let size = mode.frame_size(lm);
        let mut x = vec![0.0f32; size];
        let mut masks = CollapseMasks::new(nb, 1);
        for i in 0..nb {
            masks.set(i, 0, 0b0101);
        }
        let log_e = vec![0.0; 2 * nb];
        let prev = vec![-2.0; 2 * nb];
        let pulses = vec![16; nb];
        anti_collapse(mode, &mut x, &masks, lm, 1, size, 0, nb, &log_e, &prev, &prev, &pulses, 7);
        for i in 0..nb {
            let band = &x[band_lo(mode, i, lm)..band_lo(mode, i + 1, lm)];
            assert!((inner_prod(band, band) - 1.0).abs() < 1e-4);
            // blocks 0 and 2 had energy and stay empty here
            assert!(band.iter().step_by(4).all(|&v| v == 0.0));
        }
    }

    #[test]
    fn denormalise_restores_band_energies() {
        let mode = Mode::standard();
        let lm = 3;
        let mut rng = StdRng::seed_from_u64(5);
        let n = mode.frame_size(lm);
        let freq = (0..n).map(|_| rng.gen_range(-1.0..1.0f32)).collect::<Vec<_>>();
        let nb = mode.nb_ebands;
        let mut band_e = vec![0.0; 2 * nb];
        compute_band_energies(mode, &freq, &mut band_e, nb, 1, lm);
        let mut x = vec![0.0; n];
        normalise_bands(mode, &freq, &mut x, &band_e, nb, 1, lm);
        let mut log_e = vec![0.0; 2 * nb];
        amp_to_log2(mode, nb, nb, &band_e, &mut log_e, 1);

        let mut out = vec![1.0; n];
        denormalise_bands(mode, &x, &mut out, &log_e, 0, nb, lm, false);
        let bound = band_lo(mode, nb, lm);
        assert!(out[..bound]
            .iter()
            .zip(freq.iter())
            .all(|(a, b)| (a - b).abs() < 1e-3));
        assert!(out[bound..].iter().all(|&v| v == 0.0));

        denormalise_bands(mode, &x, &mut out, &log_e, 0, nb, lm, true);
        assert!(out.iter().all(|&v| v == 0.0));
    }
}
