use super::*;

/// # Description
/// Coder registers of a [`RangeEncoder`], kept apart from the byte buffer so
/// that a checkpoint is a plain copy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EncoderState {
    offs: u32,
    end_offs: u32,
    end_window: u32,
    nend_bits: i32,
    nbits_total: i32,
    rng: u32,
    val: u32,
    rem: i32,
    ext: u32,
    error: bool,
}

impl EncoderState {
    /// write offset of the range-coded part of the buffer
    pub fn offset(&self) -> usize {
        self.offs as usize
    }
}

/// # Description
/// Range encoder writing into a fixed-size buffer
/// ## Comments
/// - the buffer size is the frame budget, nothing is written past it
/// - overflow sets a sticky error flag instead of failing the call
#[derive(Clone, Debug)]
pub struct RangeEncoder {
    buf: Vec<u8>,
    state: EncoderState,
}

impl RangeEncoder {
    pub fn new(size: usize) -> Self {
        Self {
            buf: vec![0; size],
            state: EncoderState {
                offs: 0,
                end_offs: 0,
                end_window: 0,
                nend_bits: 0,
                nbits_total: CODE_BITS as i32 + 1,
                rng: CODE_TOP,
                val: 0,
                rem: -1,
                ext: 0,
                error: false,
            },
        }
    }

    pub fn storage(&self) -> usize {
        self.buf.len()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn error(&self) -> bool {
        self.state.error
    }

    /// current range, after `done()` this is the value the decoder must end with
    pub fn range(&self) -> u32 {
        self.state.rng
    }

    pub fn tell(&self) -> i32 {
        tell_of(self.state.nbits_total, self.state.rng)
    }

    pub fn tell_frac(&self) -> i32 {
        tell_frac_of(self.state.nbits_total, self.state.rng)
    }

    pub fn checkpoint(&self) -> EncoderState {
        self.state
    }

    pub fn restore(&mut self, state: EncoderState) {
        self.state = state;
    }

    /// copies every byte from the checkpoint's write offset to the end of storage
    pub fn save_tail(&self, state: &EncoderState) -> Vec<u8> {
        self.buf[state.offset().min(self.buf.len())..].to_vec()
    }

    pub fn restore_tail(&mut self, state: &EncoderState, tail: &[u8]) {
        let start = state.offset().min(self.buf.len());
        let end = (start + tail.len()).min(self.buf.len());
        self.buf[start..end].copy_from_slice(&tail[..end - start]);
    }

    fn write_byte(&mut self, value: u32) -> bool {
        let s = &mut self.state;
        if (s.offs + s.end_offs) as usize >= self.buf.len() {
            return true;
        }
        self.buf[s.offs as usize] = value as u8;
        s.offs += 1;
        false
    }

    fn write_byte_at_end(&mut self, value: u32) -> bool {
        let storage = self.buf.len();
        let s = &mut self.state;
        if (s.offs + s.end_offs) as usize >= storage {
            return true;
        }
        s.end_offs += 1;
        self.buf[storage - s.end_offs as usize] = value as u8;
        false
    }

    /// # Description
    /// Outputs a symbol, holding back runs of `0xFF` until it is known
    /// whether a carry will propagate into them.
    fn carry_out(&mut self, c: i32) {
        if c as u32 != SYM_MAX {
            let carry = c >> SYM_BITS;
            if self.state.rem >= 0 {
                let failed = self.write_byte((self.state.rem + carry) as u32);
                self.state.error |= failed;
            }
            if self.state.ext > 0 {
                let sym = (SYM_MAX as i32 + carry) as u32 & SYM_MAX;
                while self.state.ext > 0 {
                    let failed = self.write_byte(sym);
                    self.state.error |= failed;
                    self.state.ext -= 1;
                }
            }
            self.state.rem = c & SYM_MAX as i32;
        } else {
            self.state.ext += 1;
        }
    }

    fn normalize(&mut self) {
        while self.state.rng <= CODE_BOT {
            self.carry_out((self.state.val >> CODE_SHIFT) as i32);
            self.state.val = (self.state.val << SYM_BITS) & (CODE_TOP - 1);
            self.state.rng <<= SYM_BITS;
            self.state.nbits_total += SYM_BITS as i32;
        }
    }

    /// encodes the interval `[fl, fh)` out of a total frequency `ft`
    pub fn encode(&mut self, fl: u32, fh: u32, ft: u32) {
        let s = &mut self.state;
        let r = s.rng / ft;
        if fl > 0 {
            s.val = s.val.wrapping_add(s.rng - r * (ft - fl));
            s.rng = r * (fh - fl);
        } else {
            s.rng -= r * (ft - fh);
        }
        self.normalize();
    }

    /// like `encode` with `ft == 1 << bits`
    pub fn encode_bin(&mut self, fl: u32, fh: u32, bits: u32) {
        let s = &mut self.state;
        let r = s.rng >> bits;
        if fl > 0 {
            s.val = s.val.wrapping_add(s.rng - r * ((1 << bits) - fl));
            s.rng = r * (fh - fl);
        } else {
            s.rng -= r * ((1 << bits) - fh);
        }
        self.normalize();
    }

    /// encodes a bit that is set with probability `1/(1 << logp)`
    pub fn encode_bit_logp(&mut self, bit: bool, logp: u32) {
        let s = &mut self.state;
        let mut r = s.rng;
        let l = s.val;
        let cut = r >> logp;
        r -= cut;
        if bit {
            s.val = l.wrapping_add(r);
        }
        s.rng = if bit { cut } else { r };
        self.normalize();
    }

    /// # Description
    /// Encodes `symbol` with an inverse cumulative table of `ftb` bits
    /// ## Comments
    /// - `icdf` must be terminated by a `0`
    pub fn encode_icdf(&mut self, symbol: usize, icdf: &[u8], ftb: u32) {
        let s = &mut self.state;
        let r = s.rng >> ftb;
        if symbol > 0 {
            s.val = s
                .val
                .wrapping_add(s.rng - r * u32::from(icdf[symbol - 1]));
            s.rng = r * (u32::from(icdf[symbol - 1]) - u32::from(icdf[symbol]));
        } else {
            s.rng -= r * u32::from(icdf[symbol]);
        }
        self.normalize();
    }

    /// # Description
    /// Encodes `fl` uniformly in `[0, ft)`.
    /// ## Comments
    /// Only the top `UINT_BITS` are range coded, the rest go out as raw bits.
    pub fn encode_uint(&mut self, fl: u32, ft: u32) {
        debug_assert!(ft > 1);
        let ft = ft - 1;
        let mut ftb = ilog(ft);
        if ftb > UINT_BITS {
            ftb -= UINT_BITS;
            let top = (ft >> ftb) + 1;
            let sym = fl >> ftb;
            self.encode(sym, sym + 1, top);
            self.encode_bits(fl & ((1u32 << ftb) - 1), ftb as u32);
        } else {
            self.encode(fl, fl + 1, ft + 1);
        }
    }

    /// appends `bits` raw bits of `fl`, packed from the end of the buffer
    pub fn encode_bits(&mut self, fl: u32, bits: u32) {
        debug_assert!(bits <= 25);
        let mut window = self.state.end_window;
        let mut used = self.state.nend_bits;
        if used + bits as i32 > WINDOW_SIZE {
            loop {
                let failed = self.write_byte_at_end(window & SYM_MAX);
                self.state.error |= failed;
                window >>= SYM_BITS;
                used -= SYM_BITS as i32;
                if used < SYM_BITS as i32 {
                    break;
                }
            }
        }
        window |= fl << used;
        used += bits as i32;
        self.state.end_window = window;
        self.state.nend_bits = used;
        self.state.nbits_total += bits as i32;
    }

    /// # Description
    /// Overwrites the first `nbits` bits of the stream after they were coded.
    /// ## Comments
    /// - sets the error flag if too few bits have been coded to reach them
    pub fn patch_initial_bits(&mut self, val: u32, nbits: u32) {
        debug_assert!(nbits <= SYM_BITS);
        let shift = SYM_BITS - nbits;
        let mask = ((1u32 << nbits) - 1) << shift;
        let s = &mut self.state;
        if s.offs > 0 {
            self.buf[0] = ((u32::from(self.buf[0]) & !mask) | (val << shift)) as u8;
        } else if s.rem >= 0 {
            s.rem = ((s.rem as u32 & !mask) | (val << shift)) as i32;
        } else if s.rng <= (CODE_TOP >> nbits) {
            s.val = (s.val & !(mask << CODE_SHIFT)) | (val << (CODE_SHIFT + shift));
        } else {
            s.error = true;
        }
    }

    /// # Description
    /// Flushes the coder with the fewest bits that still identify the final
    /// interval and zeroes the unused middle of the buffer.
    pub fn done(&mut self) {
        let mut l = CODE_BITS as i32 - ilog(self.state.rng);
        let mut msk = (CODE_TOP - 1) >> l;
        let mut end = self.state.val.wrapping_add(msk) & !msk;
        if (end | msk) >= self.state.val.wrapping_add(self.state.rng) {
            l += 1;
            msk >>= 1;
            end = self.state.val.wrapping_add(msk) & !msk;
        }
        while l > 0 {
            self.carry_out((end >> CODE_SHIFT) as i32);
            end = (end << SYM_BITS) & (CODE_TOP - 1);
            l -= SYM_BITS as i32;
        }
        if self.state.rem >= 0 || self.state.ext > 0 {
            self.carry_out(0);
        }

        let mut window = self.state.end_window;
        let mut used = self.state.nend_bits;
        while used >= SYM_BITS as i32 {
            let failed = self.write_byte_at_end(window & SYM_MAX);
            self.state.error |= failed;
            window >>= SYM_BITS;
            used -= SYM_BITS as i32;
        }

        if !self.state.error {
            let storage = self.buf.len();
            let offs = self.state.offs as usize;
            let end_offs = self.state.end_offs as usize;
            self.buf[offs..storage - end_offs].iter_mut().for_each(|b| *b = 0);
            if used > 0 {
                if end_offs >= storage {
                    self.state.error = true;
                } else {
                    let l = -l;
                    if offs + end_offs >= storage && l < used {
                        window &= (1u32 << l) - 1;
                        self.state.error = true;
                    }
                    self.buf[storage - end_offs - 1] |= window as u8;
                }
            }
        }
        log::trace!(
            "range encoder done: {} front bytes, {} tail bytes, rng={:#010x}",
            self.state.offs,
            self.state.end_offs,
            self.state.rng
        );
    }
}

#[cfg(test)]
mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn sanity() {
        let enc = RangeEncoder::new(10);
        assert_eq!(enc.storage(), 10);
        assert_eq!(enc.tell(), 1);
        assert_eq!(enc.tell_frac(), 8);
        assert!(!enc.error());
    }

    #[test]
    fn raw_bits_fill_from_the_end() {
        let mut enc = RangeEncoder::new(4);
        enc.encode_bits(0xAB, 8);
        enc.encode_bits(0x3, 2);
        enc.done();
        assert!(!enc.error());
        assert_eq!(enc.buffer()[3], 0xAB);
        assert_eq!(enc.buffer()[2] & 0x3, 0x3);
    }

    #[test]
    fn patch_initial_bits_rewrites_first_byte() {
        let mut enc = RangeEncoder::new(16);
        for _ in 0..10 {
            enc.encode_uint(3, 16);
        }
        enc.patch_initial_bits(0b10, 2);
        enc.done();
        assert!(!enc.error());
        assert_eq!(enc.buffer()[0] >> 6, 0b10);
    }

    #[test]
    fn checkpoint_restore_rewinds_state() {
        let mut enc = RangeEncoder::new(64);
        enc.encode_uint(17, 100);
        let saved = enc.checkpoint();
        let before = enc.save_tail(&saved);
        for k in 0..40 {
            enc.encode_uint(k, 41);
        }
        assert_ne!(enc.tell(), {
            let mut scratch = RangeEncoder::new(64);
            scratch.encode_uint(17, 100);
            scratch.tell()
        });
        enc.restore(saved);
        enc.restore_tail(&saved, &before);
        assert_eq!(enc.checkpoint(), saved);

        let mut fresh = RangeEncoder::new(64);
        fresh.encode_uint(17, 100);
        enc.encode_uint(5, 9);
        fresh.encode_uint(5, 9);
        enc.done();
        fresh.done();
        assert_eq!(enc.buffer(), fresh.buffer());
    }
}
