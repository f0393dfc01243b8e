//! Bit allocation: splits a frame budget between bands, and inside each band
//! between fine energy and PVQ.

use crate::mode::{Mode, FINE_OFFSET, LOG2_FRAC_TABLE, LOG_MAX_PSEUDO, MAX_FINE_BITS};
use crate::range::{Coder, BITRES};

const ALLOC_STEPS: i32 = 6;

/// # Description
/// Pulse index whose cost is closest to `bits` (1/8 bits) for `band` at
/// block size `lm`.
pub fn bits2pulses(mode: &Mode, band: usize, lm: i32, bits: i32) -> i32 {
    let cache = mode.cache.band_bits(mode.nb_ebands, lm, band);
    let mut lo = 0;
    let mut hi = i32::from(cache[0]);
    let bits = bits - 1;
    for _ in 0..LOG_MAX_PSEUDO {
        let mid = (lo + hi + 1) >> 1;
        if i32::from(cache[mid as usize]) >= bits {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    let below = if lo == 0 { -1 } else { i32::from(cache[lo as usize]) };
    if bits - below <= i32::from(cache[hi as usize]) - bits {
        lo
    } else {
        hi
    }
}

/// cost in 1/8 bits of pulse index `pulses`
pub fn pulses2bits(mode: &Mode, band: usize, lm: i32, pulses: i32) -> i32 {
    if pulses == 0 {
        return 0;
    }
    let cache = mode.cache.band_bits(mode.nb_ebands, lm, band);
    i32::from(cache[pulses as usize]) + 1
}

/// # Description
/// Inputs of [`compute_allocation`].
/// ## Comments
/// - `offsets` and `cap` are indexed by band and must cover `0..end`
/// - `intensity` and `dual_stereo` are the encoder's wishes, the decoder
///   reads the coded values instead
#[derive(Copy, Clone, Debug)]
pub struct AllocationRequest<'a> {
    pub start: usize,
    pub end: usize,
    pub offsets: &'a [i32],
    pub cap: &'a [i32],
    pub alloc_trim: i32,
    pub intensity: usize,
    pub dual_stereo: bool,
    /// budget in 1/8 bits
    pub total: i32,
    pub channels: i32,
    pub lm: i32,
    /// coded band count of the previous frame
    pub prev: usize,
    pub signal_bandwidth: usize,
}

/// # Description
/// Result of [`compute_allocation`], all per band vectors cover every band of the mode.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Allocation {
    pub coded_bands: usize,
    pub intensity: usize,
    pub dual_stereo: bool,
    /// bits over the band caps, handed on to the band quantizer
    pub balance: i32,
    /// PVQ bits per band in 1/8 bits
    pub pulses: Vec<i32>,
    /// fine energy bits per band and channel
    pub fine_quant: Vec<i32>,
    pub fine_priority: Vec<bool>,
}

/// # Description
/// Works out how many bits each band gets.
/// ## Comments
/// - codes the band skip flags, the intensity band and the dual stereo flag;
///   on the decoder side the same symbols are read back, so both sides
///   reach the same allocation
pub fn compute_allocation(mode: &Mode, req: &AllocationRequest, coder: &mut Coder) -> Allocation {
    let AllocationRequest {
        start,
        end,
        offsets,
        cap,
        alloc_trim,
        channels: c,
        lm,
        ..
    } = *req;
    let len = mode.nb_ebands;
    let eb = |j: usize| i32::from(mode.ebands[j]);
    let width = |j: usize| eb(j + 1) - eb(j);

    let mut total = req.total.max(0);
    let mut skip_start = start;
    // one bit to signal the end of the skipped bands
    let skip_rsv = if total >= 1 << BITRES { 1 << BITRES } else { 0 };
    total -= skip_rsv;

    let mut intensity_rsv = 0;
    let mut dual_stereo_rsv = 0;
    if c == 2 {
        intensity_rsv = i32::from(LOG2_FRAC_TABLE[(end - start).min(LOG2_FRAC_TABLE.len() - 1)]);
        if intensity_rsv > total {
            intensity_rsv = 0;
        } else {
            total -= intensity_rsv;
            dual_stereo_rsv = if total >= 1 << BITRES { 1 << BITRES } else { 0 };
            total -= dual_stereo_rsv;
        }
    }

    let mut bits1 = vec![0i32; len];
    let mut bits2 = vec![0i32; len];
    let mut thresh = vec![0i32; len];
    let mut trim_offset = vec![0i32; len];

    for j in start..end {
        // no PVQ bits below this
        thresh[j] = (c << BITRES).max((3 * width(j) << lm << BITRES) >> 4);
        // tilt of the allocation curve
        trim_offset[j] = c * width(j) * (alloc_trim - 5 - lm) * (end - j - 1) as i32
            * (1 << (lm + BITRES))
            >> 6;
        // single coefficient bands get one coarse value per coefficient anyway
        if width(j) << lm == 1 {
            trim_offset[j] -= c << BITRES;
        }
    }

    let curve_bits = |curve: usize, j: usize| {
        c * width(j) * i32::from(mode.alloc_vectors[curve * len + j]) << lm >> 2
    };

    let mut lo = 1i32;
    let mut hi = mode.nb_alloc_vectors as i32 - 1;
    loop {
        let mut done = false;
        let mut psum = 0;
        let mid = (lo + hi) >> 1;
        for j in (start..end).rev() {
            let mut bitsj = curve_bits(mid as usize, j);
            if bitsj > 0 {
                bitsj = (bitsj + trim_offset[j]).max(0);
            }
            bitsj += offsets[j];
            if bitsj >= thresh[j] || done {
                done = true;
                psum += bitsj.min(cap[j]);
            } else if bitsj >= c << BITRES {
                psum += c << BITRES;
            }
        }
        if psum > total {
            hi = mid - 1;
        } else {
            lo = mid + 1;
        }
        if lo > hi {
            break;
        }
    }
    hi = lo;
    lo -= 1;

    for j in start..end {
        let mut bits1j = curve_bits(lo as usize, j);
        let mut bits2j = if hi as usize >= mode.nb_alloc_vectors {
            cap[j]
        } else {
            curve_bits(hi as usize, j)
        };
        if bits1j > 0 {
            bits1j = (bits1j + trim_offset[j]).max(0);
        }
        if bits2j > 0 {
            bits2j = (bits2j + trim_offset[j]).max(0);
        }
        if lo > 0 {
            bits1j += offsets[j];
        }
        bits2j += offsets[j];
        if offsets[j] > 0 {
            skip_start = j;
        }
        bits1[j] = bits1j;
        bits2[j] = (bits2j - bits1j).max(0);
    }

    let mut alloc = Allocation {
        coded_bands: 0,
        intensity: req.intensity,
        dual_stereo: req.dual_stereo,
        balance: 0,
        pulses: vec![0; len],
        fine_quant: vec![0; len],
        fine_priority: vec![false; len],
    };

    let interp = Interpolation {
        bits1: &bits1,
        bits2: &bits2,
        thresh: &thresh,
        skip_start,
        skip_rsv,
        intensity_rsv,
        dual_stereo_rsv,
    };
    interp_bits2pulses(mode, req, &interp, total, &mut alloc, coder);

    log::debug!(
        "allocation: coded={} intensity={} dual={} balance={}",
        alloc.coded_bands,
        alloc.intensity,
        alloc.dual_stereo,
        alloc.balance
    );
    alloc
}

/// the two bracketing curves handed from the coarse search to the fine one
struct Interpolation<'a> {
    bits1: &'a [i32],
    bits2: &'a [i32],
    thresh: &'a [i32],
    skip_start: usize,
    skip_rsv: i32,
    intensity_rsv: i32,
    dual_stereo_rsv: i32,
}

/// unsigned division, matching the bitstream's rounding of negative remainders
#[inline]
fn udiv(a: i32, b: i32) -> i32 {
    (a as u32 / b as u32) as i32
}

fn interp_bits2pulses(
    mode: &Mode,
    req: &AllocationRequest,
    interp: &Interpolation,
    mut total: i32,
    alloc: &mut Allocation,
    coder: &mut Coder,
) {
    let AllocationRequest {
        start,
        end,
        cap,
        channels: c,
        lm,
        prev,
        signal_bandwidth,
        ..
    } = *req;
    let Interpolation {
        bits1,
        bits2,
        thresh,
        skip_start,
        skip_rsv,
        mut intensity_rsv,
        mut dual_stereo_rsv,
    } = *interp;

    let eb = |j: usize| i32::from(mode.ebands[j]);
    let alloc_floor = c << BITRES;
    let stereo = (c > 1) as i32;
    let log_m = lm << BITRES;
    let bits = &mut alloc.pulses;
    let ebits = &mut alloc.fine_quant;
    let fine_priority = &mut alloc.fine_priority;

    let mut lo = 0;
    let mut hi = 1 << ALLOC_STEPS;
    for _ in 0..ALLOC_STEPS {
        let mid = (lo + hi) >> 1;
        let mut psum = 0;
        let mut done = false;
        for j in (start..end).rev() {
            let tmp = bits1[j] + (mid * bits2[j] >> ALLOC_STEPS);
            if tmp >= thresh[j] || done {
                done = true;
                psum += tmp.min(cap[j]);
            } else if tmp >= alloc_floor {
                psum += alloc_floor;
            }
        }
        if psum > total {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    let mut psum = 0;
    let mut done = false;
    for j in (start..end).rev() {
        let mut tmp = bits1[j] + (lo * bits2[j] >> ALLOC_STEPS);
        if tmp < thresh[j] && !done {
            tmp = if tmp >= alloc_floor { alloc_floor } else { 0 };
        } else {
            done = true;
        }
        tmp = tmp.min(cap[j]);
        bits[j] = tmp;
        psum += tmp;
    }

    // decide which bands to skip, working down from the top
    let mut coded_bands = end;
    loop {
        let j = coded_bands - 1;
        // neither the first band nor a boosted one is ever skipped
        if j <= skip_start {
            total += skip_rsv;
            break;
        }
        let mut left = total - psum;
        let percoeff = udiv(left, eb(coded_bands) - eb(start));
        left -= (eb(coded_bands) - eb(start)) * percoeff;
        let rem = (left - (eb(j) - eb(start))).max(0);
        let band_width = eb(coded_bands) - eb(j);
        let mut band_bits = bits[j] + percoeff * band_width + rem;

        // below the threshold the band is skipped without a flag
        if band_bits >= thresh[j].max(alloc_floor + (1 << BITRES)) {
            let keep = if coder.is_encoder() {
                // hysteresis keeps bands from flickering in and out
                let depth_threshold = if coded_bands > 17 {
                    if j < prev {
                        7
                    } else {
                        9
                    }
                } else {
                    0
                };
                coded_bands <= start + 2
                    || (band_bits > (depth_threshold * band_width << lm << BITRES) >> 4
                        && j <= signal_bandwidth)
            } else {
                false
            };
            if coder.bit_logp(keep, 1) {
                break;
            }
            psum += 1 << BITRES;
            band_bits -= 1 << BITRES;
        }

        psum -= bits[j] + intensity_rsv;
        if intensity_rsv > 0 {
            intensity_rsv = i32::from(LOG2_FRAC_TABLE[j - start]);
        }
        psum += intensity_rsv;
        if band_bits >= alloc_floor {
            // enough for one fine energy bit per channel
            psum += alloc_floor;
            bits[j] = alloc_floor;
        } else {
            bits[j] = 0;
        }
        log::trace!("band {} skipped with {} bits", j, band_bits);
        coded_bands -= 1;
    }

    if intensity_rsv > 0 {
        let wanted = alloc.intensity.min(coded_bands);
        let coded = coder.uint(
            wanted.saturating_sub(start) as u32,
            (coded_bands + 1 - start) as u32,
        );
        alloc.intensity = start + coded as usize;
    } else {
        alloc.intensity = 0;
    }
    if alloc.intensity <= start {
        total += dual_stereo_rsv;
        dual_stereo_rsv = 0;
    }
    alloc.dual_stereo = if dual_stereo_rsv > 0 {
        coder.bit_logp(alloc.dual_stereo, 1)
    } else {
        false
    };
    let intensity = alloc.intensity;
    let dual_stereo = alloc.dual_stereo;

    // spread what is left over the coded bands
    let mut left = total - psum;
    let percoeff = udiv(left, eb(coded_bands) - eb(start));
    left -= (eb(coded_bands) - eb(start)) * percoeff;
    for j in start..coded_bands {
        bits[j] += percoeff * (eb(j + 1) - eb(j));
    }
    for j in start..coded_bands {
        let tmp = left.min(eb(j + 1) - eb(j));
        bits[j] += tmp;
        left -= tmp;
    }

    let mut balance = 0;
    for j in start..coded_bands {
        let n0 = eb(j + 1) - eb(j);
        let n = n0 << lm;
        let bit = bits[j] + balance;
        let mut excess;
        if n > 1 {
            excess = (bit - cap[j]).max(0);
            bits[j] = bit - excess;

            // one more degree of freedom for a coupled stereo band
            let den = c * n + (c == 2 && n > 2 && !dual_stereo && j < intensity) as i32;
            let nclogn = den * (i32::from(mode.log_n[j]) + log_m);
            let mut offset = (nclogn >> 1) - den * FINE_OFFSET;
            if n == 2 {
                offset += den << BITRES >> 2;
            }
            if bits[j] + offset < den * 2 << BITRES {
                offset += nclogn >> 2;
            } else if bits[j] + offset < den * 3 << BITRES {
                offset += nclogn >> 3;
            }

            ebits[j] = (bits[j] + offset + (den << (BITRES - 1))).max(0);
            ebits[j] = udiv(ebits[j], den) >> BITRES;
            if c * ebits[j] > bits[j] >> BITRES {
                ebits[j] = bits[j] >> stereo >> BITRES;
            }
            ebits[j] = ebits[j].min(MAX_FINE_BITS);
            fine_priority[j] = ebits[j] * (den << BITRES) >= bits[j] + offset;
            bits[j] -= c * ebits[j] << BITRES;
        } else {
            // a sign bit, everything else goes to fine energy
            excess = (bit - (c << BITRES)).max(0);
            bits[j] = bit - excess;
            ebits[j] = 0;
            fine_priority[j] = true;
        }

        // fine energy cannot use the rebalancing of the band quantizer
        if excess > 0 {
            let extra_fine = (excess >> (stereo + BITRES)).min(MAX_FINE_BITS - ebits[j]);
            ebits[j] += extra_fine;
            let extra_bits = extra_fine * c << BITRES;
            fine_priority[j] = extra_bits >= excess - balance;
            excess -= extra_bits;
        }
        balance = excess;
    }
    alloc.balance = balance;

    // skipped bands spend everything on fine energy
    for j in coded_bands..end {
        ebits[j] = bits[j] >> stereo >> BITRES;
        bits[j] = 0;
        fine_priority[j] = ebits[j] < 1;
    }
    alloc.coded_bands = coded_bands;
}
