use super::*;

/// # Description
/// Range decoder, the exact mirror of [`RangeEncoder`].
/// ## Comments
/// - reading past either end of the buffer yields zeros
/// - out-of-range values set a sticky error flag that callers check once per frame
#[derive(Clone, Debug)]
pub struct RangeDecoder {
    buf: Vec<u8>,
    offs: u32,
    end_offs: u32,
    end_window: u32,
    nend_bits: i32,
    nbits_total: i32,
    rng: u32,
    val: u32,
    ext: u32,
    rem: i32,
    error: bool,
}

impl RangeDecoder {
    pub fn new(data: &[u8]) -> Self {
        let mut dec = Self {
            buf: data.to_vec(),
            offs: 0,
            end_offs: 0,
            end_window: 0,
            nend_bits: 0,
            nbits_total: CODE_BITS as i32 + 1
                - ((CODE_BITS - CODE_EXTRA) / SYM_BITS * SYM_BITS) as i32,
            rng: 1 << CODE_EXTRA,
            val: 0,
            ext: 0,
            rem: 0,
            error: false,
        };
        dec.rem = dec.read_byte();
        dec.val = dec.rng - 1 - (dec.rem as u32 >> (SYM_BITS - CODE_EXTRA));
        dec.normalize();
        dec
    }

    pub fn storage(&self) -> usize {
        self.buf.len()
    }

    pub fn error(&self) -> bool {
        self.error
    }

    pub fn range(&self) -> u32 {
        self.rng
    }

    pub fn tell(&self) -> i32 {
        tell_of(self.nbits_total, self.rng)
    }

    pub fn tell_frac(&self) -> i32 {
        tell_frac_of(self.nbits_total, self.rng)
    }

    /// # Description
    /// Marks the rest of the frame as consumed without reading it
    pub fn skip_to_end(&mut self) {
        let total = (self.buf.len() * 8) as i32;
        self.nbits_total += total - self.tell();
    }

    fn read_byte(&mut self) -> i32 {
        if (self.offs as usize) < self.buf.len() {
            let b = self.buf[self.offs as usize];
            self.offs += 1;
            i32::from(b)
        } else {
            0
        }
    }

    fn read_byte_from_end(&mut self) -> u32 {
        if (self.end_offs as usize) < self.buf.len() {
            self.end_offs += 1;
            u32::from(self.buf[self.buf.len() - self.end_offs as usize])
        } else {
            0
        }
    }

    fn normalize(&mut self) {
        while self.rng <= CODE_BOT {
            self.nbits_total += SYM_BITS as i32;
            self.rng <<= SYM_BITS;
            let mut sym = self.rem;
            self.rem = self.read_byte();
            sym = ((sym << SYM_BITS) | self.rem) >> (SYM_BITS - CODE_EXTRA);
            self.val = ((self.val << SYM_BITS).wrapping_add(SYM_MAX & !(sym as u32)))
                & (CODE_TOP - 1);
        }
    }

    /// # Description
    /// Returns the cumulative frequency of the next symbol out of `ft`.
    /// ## Comments
    /// `update` must follow with the interval the value falls in.
    pub fn decode(&mut self, ft: u32) -> u32 {
        self.ext = self.rng / ft;
        let s = self.val / self.ext;
        ft - (s + 1).min(ft)
    }

    pub fn decode_bin(&mut self, bits: u32) -> u32 {
        self.ext = self.rng >> bits;
        let s = self.val / self.ext;
        (1u32 << bits) - (s + 1).min(1u32 << bits)
    }

    pub fn update(&mut self, fl: u32, fh: u32, ft: u32) {
        let s = self.ext * (ft - fh);
        self.val = self.val.wrapping_sub(s);
        self.rng = if fl > 0 {
            self.ext * (fh - fl)
        } else {
            self.rng - s
        };
        self.normalize();
    }

    pub fn decode_bit_logp(&mut self, logp: u32) -> bool {
        let r = self.rng;
        let d = self.val;
        let s = r >> logp;
        let ret = d < s;
        if !ret {
            self.val = d - s;
        }
        self.rng = if ret { s } else { r - s };
        self.normalize();
        ret
    }

    pub fn decode_icdf(&mut self, icdf: &[u8], ftb: u32) -> usize {
        let mut s = self.rng;
        let d = self.val;
        let r = s >> ftb;
        let mut ret = 0usize;
        let mut t;
        loop {
            t = s;
            s = r * u32::from(icdf[ret]);
            if d >= s {
                break;
            }
            ret += 1;
        }
        self.val = d - s;
        self.rng = t - s;
        self.normalize();
        ret
    }

    /// # Description
    /// Decodes a value coded with `encode_uint(_, ft)`
    /// ## Comments
    /// - a value `>= ft` is clamped to `ft - 1` and sets the error flag
    pub fn decode_uint(&mut self, ft: u32) -> u32 {
        debug_assert!(ft > 1);
        let ft = ft - 1;
        let mut ftb = ilog(ft);
        if ftb > UINT_BITS {
            ftb -= UINT_BITS;
            let top = (ft >> ftb) + 1;
            let s = self.decode(top);
            self.update(s, s + 1, top);
            let t = (s << ftb) | self.decode_bits(ftb as u32);
            if t <= ft {
                return t;
            }
            self.error = true;
            ft
        } else {
            let top = ft + 1;
            let s = self.decode(top);
            self.update(s, s + 1, top);
            s
        }
    }

    pub fn decode_bits(&mut self, bits: u32) -> u32 {
        let mut window = self.end_window;
        let mut available = self.nend_bits;
        if (available as u32) < bits {
            loop {
                window |= self.read_byte_from_end() << available;
                available += SYM_BITS as i32;
                if available > WINDOW_SIZE - SYM_BITS as i32 {
                    break;
                }
            }
        }
        let ret = window & ((1u64 << bits) - 1) as u32;
        window = if bits >= 32 { 0 } else { window >> bits };
        available -= bits as i32;
        self.end_window = window;
        self.nend_bits = available;
        self.nbits_total += bits as i32;
        ret
    }
}

#[cfg(test)]
mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn sanity() {
        let dec = RangeDecoder::new(&[0u8; 8]);
        assert_eq!(dec.tell(), 1);
        assert!(!dec.error());
    }

    #[test]
    fn empty_buffer_reads_zeros() {
        let mut dec = RangeDecoder::new(&[]);
        assert_eq!(dec.decode_bits(8), 0);
        let _ = dec.decode_uint(10);
        assert!(dec.tell() > 1);
    }

    #[test]
    fn skip_to_end_consumes_budget() {
        let mut dec = RangeDecoder::new(&[0x55; 20]);
        dec.skip_to_end();
        assert_eq!(dec.tell(), 160);
    }

    #[test]
    fn bit_logp_round_trip() {
        let pattern = [true, false, false, true, true, false, true, false];
        let mut enc = RangeEncoder::new(32);
        pattern
            .iter()
            .enumerate()
            .for_each(|(k, &b)| enc.encode_bit_logp(b, 1 + (k as u32 % 15)));
        enc.done();
        let mut dec = RangeDecoder::new(enc.buffer());
        pattern.iter().enumerate().for_each(|(k, &b)| {
            assert_eq!(dec.decode_bit_logp(1 + (k as u32 % 15)), b);
        });
    }
}
