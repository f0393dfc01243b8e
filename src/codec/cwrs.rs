//! Enumeration of signed pulse vectors.
//!
//! A vector of `n` integers whose magnitudes sum to `k` maps to a unique index
//! in `0..V(n,k)`, where `V(n,k) = U(n,k) + U(n,k+1)` and `U` counts the
//! vectors whose first coordinate is positive.

use crate::range::{ilog, RangeDecoder, RangeEncoder};
use std::sync::LazyLock;

/// highest column stored for each row of the U table
const U_ROW_LIMITS: [usize; 15] = [176, 176, 176, 176, 176, 176, 96, 54, 37, 28, 24, 19, 18, 16, 14];

/// # Description
/// `U(n,k)` for `n <= 14`, filled with `U(n,k) = U(n-1,k) + U(n,k-1) + U(n-1,k-1)`
/// ## Comments
/// - `U(n,k) == U(k,n)`, so lookups use `min(n,k)` as the row and `max(n,k)` as the column
/// - a codebook that passes `fits_in32` always lands in a stored row, but the
///   column may run past the row's limit, e.g. `(20,10)` needs row 11 column 20
static U_TABLE: LazyLock<Vec<Vec<u32>>> = LazyLock::new(|| {
    let mut rows: Vec<Vec<u64>> = Vec::with_capacity(U_ROW_LIMITS.len());
    for (n, &limit) in U_ROW_LIMITS.iter().enumerate() {
        let mut row = vec![0u64; limit + 1];
        if n == 0 {
            row[0] = 1;
        } else {
            let prev = &rows[n - 1];
            for k in 1..=limit {
                row[k] = prev[k] + row[k - 1] + prev[k - 1];
            }
        }
        rows.push(row);
    }
    rows.into_iter()
        .map(|row| row.into_iter().map(|v| v as u32).collect())
        .collect()
});

/// number of vectors with a positive leading coordinate, `U(n,k)`
#[inline]
pub fn pvq_u(n: usize, k: usize) -> u32 {
    let (row, col) = if n < k { (n, k) } else { (k, n) };
    U_TABLE
        .get(row)
        .and_then(|r| r.get(col))
        .copied()
        .unwrap_or_else(|| u_outside_table(row, col))
}

/// `U(row,col)` for a cell the table does not store, `row <= col`
fn u_outside_table(row: usize, col: usize) -> u32 {
    match row {
        0 => (col == 0) as u32,
        1 => 1,
        2 => (2 * col - 1) as u32,
        _ => pvq_u_row(row, col)[col] as u32,
    }
}

/// codebook size `V(n,k)`
#[inline]
pub fn pvq_v(n: usize, k: usize) -> u32 {
    pvq_u(n, k) + pvq_u(n, k + 1)
}

/// # Description
/// Computes `U(n,0..=max_k+1)` for any `n`, including rows the table does not hold.
/// ## Comments
/// - values are only meaningful while `V(n,k)` fits in 32 bits
pub fn pvq_u_row(n: usize, max_k: usize) -> Vec<u64> {
    let len = max_k + 2;
    let mut row = vec![0u64; len];
    if n == 0 {
        row[0] = 1;
        return row;
    }
    // n == 1
    row.iter_mut().skip(1).for_each(|u| *u = 1);
    for _ in 2..=n {
        let mut diag = row[0];
        for k in 1..len {
            let up = row[k];
            row[k] = up.wrapping_add(row[k - 1]).wrapping_add(diag);
            diag = up;
        }
    }
    row
}

/// # Description
/// Index of the pulse vector `y` inside its codebook.
/// ## Comments
/// - `y.len()` must be at least 1; a one dimensional vector only carries its sign
pub fn icwrs(y: &[i32]) -> u32 {
    let n = y.len();
    if n == 1 {
        return (y[0] < 0) as u32;
    }
    let mut j = n - 1;
    let mut i = (y[j] < 0) as u32;
    let mut k = y[j].unsigned_abs() as usize;
    loop {
        j -= 1;
        i += pvq_u(n - j, k);
        k += y[j].unsigned_abs() as usize;
        if y[j] < 0 {
            i += pvq_u(n - j, k + 1);
        }
        if j == 0 {
            break;
        }
    }
    i
}

/// # Description
/// Inverse of [`icwrs`]. Writes the vector of index `i` in the `(y.len(), k)`
/// codebook into `y` and returns its squared norm.
pub fn cwrsi(mut k: usize, mut i: u32, y: &mut [i32]) -> i32 {
    let mut n = y.len();
    let mut yy = 0i32;
    let mut out = 0usize;

    if n == 1 {
        let val = if i != 0 { -(k as i32) } else { k as i32 };
        y[0] = val;
        return val * val;
    }

    while n > 2 {
        if k >= n {
            // more pulses than dimensions left
            let p = pvq_u(n, k + 1);
            let s = -((i >= p) as i32);
            i -= p & s as u32;
            let k0 = k;
            let q = pvq_u(n, n);
            let mut p;
            if q > i {
                k = n;
                loop {
                    k -= 1;
                    p = pvq_u(k, n);
                    if p <= i {
                        break;
                    }
                }
            } else {
                p = pvq_u(n, k);
                while p > i {
                    k -= 1;
                    p = pvq_u(n, k);
                }
            }
            i -= p;
            let val = (k0 as i32 - k as i32 + s) ^ s;
            y[out] = val;
            yy += val * val;
        } else {
            let p = pvq_u(k, n);
            let q = pvq_u(k + 1, n);
            if p <= i && i < q {
                i -= p;
                y[out] = 0;
            } else {
                let s = -((i >= q) as i32);
                i -= q & s as u32;
                let k0 = k;
                let mut p;
                loop {
                    k -= 1;
                    p = pvq_u(k, n);
                    if p <= i {
                        break;
                    }
                }
                i -= p;
                let val = (k0 as i32 - k as i32 + s) ^ s;
                y[out] = val;
                yy += val * val;
            }
        }
        out += 1;
        n -= 1;
    }

    // n == 2
    let p = 2 * k as u32 + 1;
    let s = -((i >= p) as i32);
    i -= p & s as u32;
    let k0 = k;
    k = ((i + 1) >> 1) as usize;
    if k != 0 {
        i -= 2 * k as u32 - 1;
    }
    let val = (k0 as i32 - k as i32 + s) ^ s;
    y[out] = val;
    yy += val * val;

    // n == 1
    let s = -(i as i32);
    let val = (k as i32 + s) ^ s;
    y[out + 1] = val;
    yy + val * val
}

pub fn encode_pulses(y: &[i32], k: usize, enc: &mut RangeEncoder) {
    if k == 0 {
        return;
    }
    enc.encode_uint(icwrs(y), pvq_v(y.len(), k));
}

/// decodes `y.len()` coordinates holding `k` pulses, returns the squared norm
pub fn decode_pulses(y: &mut [i32], k: usize, dec: &mut RangeDecoder) -> i32 {
    if k == 0 {
        y.iter_mut().for_each(|v| *v = 0);
        return 0;
    }
    let i = dec.decode_uint(pvq_v(y.len(), k));
    cwrsi(k, i, y)
}

/// pseudo pulse index to pulse count, exponential above 8
#[inline]
pub fn get_pulses(i: i32) -> i32 {
    if i < 8 {
        i
    } else {
        (8 + (i & 7)) << ((i >> 3) - 1)
    }
}

/// # Description
/// true when every index of the `(n,k)` codebook fits in 32 bits
pub fn fits_in32(n: i32, k: i32) -> bool {
    const MAX_N: [i32; 15] = [
        32767, 32767, 32767, 1476, 283, 109, 60, 40, 29, 24, 20, 18, 16, 14, 13,
    ];
    const MAX_K: [i32; 15] = [
        32767, 32767, 32767, 32767, 1172, 238, 95, 53, 36, 27, 22, 18, 16, 15, 13,
    ];
    if n >= 14 {
        if k >= 14 {
            false
        } else {
            n <= MAX_N[k as usize]
        }
    } else {
        k <= MAX_K[n as usize]
    }
}

/// # Description
/// `log2(val)` with `frac` fractional bits, the cost of coding one of `val`
/// equiprobable symbols.
pub fn log2_frac(mut val: u32, mut frac: i32) -> i32 {
    let mut l = ilog(val);
    if val & val.wrapping_sub(1) != 0 {
        if l > 16 {
            val = ((val - 1) >> (l - 16)) + 1;
        } else {
            val <<= 16 - l;
        }
        l = (l - 1) << frac;
        loop {
            let b = (val >> 16) as i32;
            l += b << frac;
            val = (val + b as u32) >> b;
            val = (val.wrapping_mul(val).wrapping_add(0x7FFF)) >> 15;
            let more = frac > 0;
            frac -= 1;
            if !more {
                break;
            }
        }
        l + (val > 0x8000) as i32
    } else {
        (l - 1) << frac
    }
}

/// # Description
/// Cost in `1/(1 << frac)` bits of coding `0..=max_k` pulses into `n` dimensions.
pub fn get_required_bits(n: usize, max_k: usize, frac: i32) -> Vec<i16> {
    let mut bits = vec![0i16; max_k + 1];
    if n == 1 {
        bits.iter_mut().skip(1).for_each(|b| *b = (1 << frac) as i16);
    } else {
        let u = pvq_u_row(n, max_k);
        for k in 1..=max_k {
            bits[k] = log2_frac((u[k] + u[k + 1]) as u32, frac) as i16;
        }
    }
    bits
}

#[cfg(test)]
mod test {
    #[allow(unused_imports)]
    use super::*;

    /// every vector of `n` coordinates whose magnitudes sum to `k`
    fn all_vectors(n: usize, k: i32) -> Vec<Vec<i32>> {
        if n == 1 {
            return if k == 0 { vec![vec![0]] } else { vec![vec![k], vec![-k]] };
        }
        let mut out = Vec::new();
        for head in -k..=k {
            for mut tail in all_vectors(n - 1, k - head.abs()) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn sanity() {
        assert_eq!(pvq_u(0, 0), 1);
        assert_eq!(pvq_u(3, 0), 0);
        assert_eq!(pvq_u(1, 5), 1);
        assert_eq!(pvq_u(2, 4), 7);
        assert_eq!(pvq_v(2, 3), 12);
        assert_eq!(pvq_v(4, 3), 88);
        assert_eq!(get_pulses(7), 7);
        assert_eq!(get_pulses(8), 8);
        assert_eq!(get_pulses(16), 16);
        assert_eq!(get_pulses(40), 128);
    }

    #[test]
    fn table_row_matches_recurrence() {
        for n in 0..15 {
            let row = pvq_u_row(n, 12);
            for k in 0..=12 {
                assert_eq!(row[k] as u32, pvq_u(n, k), "n={} k={}", n, k);
            }
        }
    }

    #[test]
    fn bijection_small_codebooks() {
        for n in 1..=5usize {
            for k in 1..=4 {
                let vectors = all_vectors(n, k);
                assert_eq!(vectors.len() as u32, pvq_v(n, k as usize));
                let mut seen = vec![false; vectors.len()];
                for v in vectors.iter() {
                    let index = icwrs(v) as usize;
                    assert!(!seen[index], "duplicate index {} for {:?}", index, v);
                    seen[index] = true;

                    let mut back = vec![0; n];
                    let yy = cwrsi(k as usize, index as u32, &mut back);
                    assert_eq!(&back, v);
                    assert_eq!(yy, v.iter().map(|x| x * x).sum::<i32>());
                }
            }
        }
    }

    #[test]
    fn four_dims_three_pulses_round_trip() {
        let y = [1, -1, 1, 0];
        let mut enc = RangeEncoder::new(16);
        encode_pulses(&y, 3, &mut enc);
        enc.done();
        let mut dec = RangeDecoder::new(enc.buffer());
        let mut out = [0; 4];
        let yy = decode_pulses(&mut out, 3, &mut dec);
        assert_eq!(out, y);
        assert_eq!(yy, 3);
    }

    /// pulses dealt round robin over the coordinates with alternating signs
    fn spread_vector(n: usize, k: usize) -> Vec<i32> {
        let mut y = vec![0; n];
        for p in 0..k {
            y[p % n] += 1;
        }
        y.iter()
            .enumerate()
            .map(|(i, &v)| if i % 2 == 1 { -v } else { v })
            .collect()
    }

    #[test]
    fn codebooks_past_the_stored_rows() {
        assert_eq!(pvq_u(10, 20) as u64, pvq_u_row(10, 20)[20]);
        assert_eq!(pvq_u(3, 400), 2 * 400 * 400 - 2 * 400 + 1);

        for n in 1..=20usize {
            for k in 0..=64usize {
                if k > 0 && !fits_in32(n as i32, k as i32) {
                    continue;
                }
                let row = pvq_u_row(n, k);
                assert_eq!(pvq_v(n, k) as u64, row[k] + row[k + 1], "n={} k={}", n, k);

                let mut first = vec![0; n];
                first[0] = -(k as i32);
                let mut last = vec![0; n];
                last[n - 1] = k as i32;
                for y in [first, last, spread_vector(n, k)].iter() {
                    if k > 0 {
                        let mut back = vec![9; n];
                        cwrsi(k, icwrs(y), &mut back);
                        assert_eq!(&back, y, "n={} k={}", n, k);
                    }

                    let mut enc = RangeEncoder::new(16);
                    encode_pulses(y, k, &mut enc);
                    enc.done();
                    let mut dec = RangeDecoder::new(enc.buffer());
                    let mut out = vec![9; n];
                    let yy = decode_pulses(&mut out, k, &mut dec);
                    assert_eq!(&out, y, "n={} k={}", n, k);
                    assert_eq!(yy, y.iter().map(|x| x * x).sum::<i32>());
                }
            }
        }
    }

    #[test]
    fn fits_in32_agrees_with_u64_rows() {
        for n in 2..40usize {
            let row = pvq_u_row(n, 40);
            for k in 1..40usize {
                if fits_in32(n as i32, k as i32) {
                    assert!(row[k] + row[k + 1] <= u32::MAX as u64, "n={} k={}", n, k);
                }
            }
        }
    }

    #[test]
    fn log2_frac_tracks_log2() {
        assert_eq!(log2_frac(1, 3), 0);
        assert_eq!(log2_frac(2, 3), 8);
        assert_eq!(log2_frac(8, 3), 24);
        for v in 3..2000u32 {
            let got = log2_frac(v, 3) as f64 / 8.0;
            let exact = (v as f64).log2();
            assert!((got - exact).abs() < 0.2, "v={} got={}", v, got);
        }
    }

    #[test]
    fn required_bits_grow_with_pulses() {
        let bits = get_required_bits(8, 16, 3);
        assert_eq!(bits[0], 0);
        assert!(bits.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(get_required_bits(1, 3, 3), vec![0, 8, 8, 8]);
    }
}
