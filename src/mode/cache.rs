use crate::codec::cwrs::{fits_in32, get_pulses, get_required_bits};
use crate::range::BITRES;

/// largest pseudo pulse index stored in the cache, `get_pulses(40) == 128`
pub const MAX_PSEUDO: i32 = 40;
pub const LOG_MAX_PSEUDO: i32 = 6;
pub const MAX_FINE_BITS: i32 = 8;
pub const FINE_OFFSET: i32 = 21;
pub const QTHETA_OFFSET: i32 = 4;
pub const QTHETA_OFFSET_TWOPHASE: i32 = 16;

/// # Description
/// Bit costs of PVQ codebooks for every band size a mode can produce.
/// ## Comments
/// - `index[(lm + 1) * nb_ebands + band]` is the start of a run in `bits`,
///   `-1` when the band is empty at that block size
/// - a run starts with its entry count `K`, followed by the cost minus one of
///   `get_pulses(1..=K)` pulses in 1/8 bits
/// - `caps[(lm * 2 + channels - 1) * nb_ebands + band]` is the cap on the
///   bits per coefficient a band can use, see [`PulseCache::band_caps`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PulseCache {
    pub index: Vec<i16>,
    pub bits: Vec<u8>,
    pub caps: Vec<u8>,
}

impl PulseCache {
    /// # Description
    /// Builds the cache for band edges `ebands` (length `nb_ebands + 1`) and
    /// block sizes up to `max_lm`.
    pub fn compute(ebands: &[i16], log_n: &[i16], max_lm: i32) -> Self {
        let nb = ebands.len() - 1;
        let width = |j: usize| i32::from(ebands[j + 1] - ebands[j]);
        let rows = (max_lm + 2) as usize;

        let mut index = vec![-1i16; nb * rows];
        let mut entries: Vec<(i32, i32, usize)> = Vec::new();
        let mut curr = 0usize;

        for i in 0..rows {
            for j in 0..nb {
                let n = (width(j) << i) >> 1;
                // reuse an earlier entry of the same size
                let earlier = (0..=i).find_map(|k| {
                    let limit = if k == i { j } else { nb };
                    (0..limit)
                        .find(|&m| n == (width(m) << k) >> 1)
                        .map(|m| index[k * nb + m])
                });
                if let Some(found) = earlier {
                    index[i * nb + j] = found;
                }
                if index[i * nb + j] == -1 && n != 0 {
                    let mut k = 0;
                    while fits_in32(n, get_pulses(k + 1)) && k < MAX_PSEUDO {
                        k += 1;
                    }
                    entries.push((n, k, curr));
                    index[i * nb + j] = curr as i16;
                    curr += k as usize + 1;
                }
            }
        }

        let mut bits = vec![0u8; curr];
        for &(n, k, start) in entries.iter() {
            let required = get_required_bits(n as usize, get_pulses(k) as usize, BITRES);
            for j in 1..=k as usize {
                bits[start + j] = (required[get_pulses(j as i32) as usize] - 1) as u8;
            }
            bits[start] = k as u8;
        }

        let mut caps = Vec::with_capacity((max_lm as usize + 1) * 2 * nb);
        for i in 0..=max_lm {
            for c in 1..=2 {
                for j in 0..nb {
                    let max_bits = band_max_bits(&index, &bits, log_n, width(j), nb, j, i, c);
                    let cap = 4 * max_bits / (c * (width(j) << i)) - 64;
                    caps.push(cap.clamp(0, 255) as u8);
                }
            }
        }

        Self { index, bits, caps }
    }

    /// cost table of band `band` at block size `lm`, `lm == -1` for a split
    /// below the shortest block
    pub fn band_bits(&self, nb_ebands: usize, lm: i32, band: usize) -> &[u8] {
        let start = self.index[(lm + 1) as usize * nb_ebands + band];
        &self.bits[start.max(0) as usize..]
    }

    /// # Description
    /// Per band maximum allocation in 1/8 bits for a frame.
    /// ## Parameters
    /// - `ebands` band edges of the mode
    /// - `lm` log2 of the number of short blocks
    /// - `channels` 1 or 2
    pub fn band_caps(&self, ebands: &[i16], lm: i32, channels: i32) -> Vec<i32> {
        let nb = ebands.len() - 1;
        let row = nb * (2 * lm as usize + channels as usize - 1);
        (0..nb)
            .map(|i| {
                let n = i32::from(ebands[i + 1] - ebands[i]) << lm;
                (i32::from(self.caps[row + i]) + 64) * channels * n >> 2
            })
            .collect()
    }
}

/// # Description
/// The largest number of bits a band reliably consumes once it is fully
/// split, including theta, stereo and fine energy bits.
#[allow(clippy::too_many_arguments)]
fn band_max_bits(
    index: &[i16],
    bits: &[u8],
    log_n: &[i16],
    width: i32,
    nb: usize,
    j: usize,
    i: i32,
    c: i32,
) -> i32 {
    let mut n0 = width;
    if n0 << i == 1 {
        return c * (1 + MAX_FINE_BITS) << BITRES;
    }
    let log_n = i32::from(log_n[j]);
    let mut lm0 = 0;
    if n0 > 2 {
        n0 >>= 1;
        lm0 -= 1;
    } else if n0 <= 1 {
        lm0 = i.min(1);
        n0 <<= lm0;
    }

    let start = index[(lm0 + 1) as usize * nb + j].max(0) as usize;
    let pcache = &bits[start..];
    let mut max_bits = i32::from(pcache[pcache[0] as usize]) + 1;

    let mut n = n0;
    for k in 0..i - lm0 {
        max_bits <<= 1;
        let offset = ((log_n + ((lm0 + k) << BITRES)) >> 1) - QTHETA_OFFSET;
        let num = 459 * ((2 * n - 1) * offset + max_bits);
        let den = ((2 * n - 1) << 9) - 459;
        let qb = ((num + (den >> 1)) / den).min(57);
        max_bits += qb;
        n <<= 1;
    }

    if c == 2 {
        max_bits <<= 1;
        let two_phase = n == 2;
        let offset = ((log_n + (i << BITRES)) >> 1)
            - if two_phase { QTHETA_OFFSET_TWOPHASE } else { QTHETA_OFFSET };
        let ndof = 2 * n - 1 - two_phase as i32;
        let scale = if two_phase { 512 } else { 487 };
        let num = scale * (max_bits + ndof * offset);
        let den = (ndof << 9) - scale;
        let qb = ((num + (den >> 1)) / den).min(if two_phase { 64 } else { 61 });
        max_bits += qb;
    }

    let ndof = c * n + (c == 2 && n > 2) as i32;
    let mut offset = ((log_n + (i << BITRES)) >> 1) - FINE_OFFSET;
    if n == 2 {
        offset += 1 << BITRES >> 2;
    }
    let num = max_bits + ndof * offset;
    let den = (ndof - 1) << BITRES;
    let qb = ((num + (den >> 1)) / den).min(MAX_FINE_BITS);
    max_bits + (c * qb << BITRES)
}
