//! Streaming LZW decompression, GIF flavored: variable-width codes from 3
//! to 12 bits, least significant bit first, with explicit clear and end
//! codes.
//!
//! The dictionary is a fixed arena of 4096 entries addressed by `u16`
//! indices, never pointers. Each entry stores its expansion length minus
//! one, a prefix index, and the last (up to) eight bytes of its expansion,
//! so reconstructing an expansion hops the prefix chain once per eight
//! bytes rather than once per byte. Expansions land in an 8199-byte ring
//! which is drained to the destination once at least 4096 bytes are
//! buffered.

use crate::buffer::{check_workbuf_len, IoBuffer};
use crate::geom::RangeIIU64;
use crate::status::{
    Control, Status, ERROR_BAD_ARGUMENT, ERROR_BAD_CALL_SEQUENCE, INITIALIZE_ALREADY_ZEROED,
    SUSPENSION_SHORT_READ, SUSPENSION_SHORT_WRITE, VERSION,
};
use crate::traits::IoTransformer;

pub const ERROR_BAD_CODE: Status = Status::Error("#lzw: bad code");
pub const ERROR_TRUNCATED_INPUT: Status = Status::Error("#lzw: truncated input");

const MAX_ENTRIES: usize = 4096;
const MAX_WIDTH: u32 = 12;
const OUTPUT_LEN: usize = 8199;
const FLUSH_THRESHOLD: usize = 4096;

const CO_TRANSFORM_IO: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Stage {
    #[default]
    Decode,
    Done,
}

/// Streaming LZW decoder.
pub struct LzwDecoder {
    ctrl: Control,
    stage: Stage,
    started: bool,

    /// Literal width to use for the next stream; set before decoding.
    pending_literal_width: u32,
    literal_width: u32,
    clear_code: u32,
    end_code: u32,
    save_code: u32,
    prev_code: u32,
    has_prev: bool,
    width: u32,

    bits: u32,
    n_bits: u32,

    output: [u8; OUTPUT_LEN],
    output_ri: usize,
    output_wi: usize,

    /// Expansion length minus one, per dictionary entry.
    lengths: [u16; MAX_ENTRIES],
    prefixes: [u16; MAX_ENTRIES],
    /// The last `(lengths[i] % 8) + 1` bytes of entry i's expansion.
    suffixes: [[u8; 8]; MAX_ENTRIES],
    first_bytes: [u8; MAX_ENTRIES],
}

impl Default for LzwDecoder {
    fn default() -> Self {
        Self {
            ctrl: Control::default(),
            stage: Stage::Decode,
            started: false,
            pending_literal_width: 8,
            literal_width: 8,
            clear_code: 0,
            end_code: 0,
            save_code: 0,
            prev_code: 0,
            has_prev: false,
            width: 0,
            bits: 0,
            n_bits: 0,
            output: [0; OUTPUT_LEN],
            output_ri: 0,
            output_wi: 0,
            lengths: [0; MAX_ENTRIES],
            prefixes: [0; MAX_ENTRIES],
            suffixes: [[0; 8]; MAX_ENTRIES],
            first_bytes: [0; MAX_ENTRIES],
        }
    }
}

impl LzwDecoder {
    #[must_use]
    pub fn new() -> Box<Self> {
        let mut d: Box<Self> = Box::default();
        let status =
            d.initialize(core::mem::size_of::<Self>(), VERSION, INITIALIZE_ALREADY_ZEROED);
        debug_assert!(status.is_ok());
        d
    }

    pub fn initialize(&mut self, sizeof_receiver: usize, version: u32, flags: u32) -> Status {
        let status =
            self.ctrl
                .initialize(sizeof_receiver, core::mem::size_of::<Self>(), version, flags);
        if !status.is_ok() {
            return status;
        }
        let ctrl = self.ctrl;
        *self = Self { ctrl, ..Self::default() };
        Status::Ok
    }

    /// Sets the literal width (2 to 8 bits) of the next stream. Must be
    /// called before the first `transform_io`.
    pub fn set_literal_width(&mut self, width: u32) -> Status {
        if self.ctrl.configured_too_late() {
            return ERROR_BAD_CALL_SEQUENCE;
        }
        if !(2..=8).contains(&width) {
            return ERROR_BAD_ARGUMENT;
        }
        self.pending_literal_width = width;
        Status::Ok
    }

    fn start(&mut self) {
        self.literal_width = self.pending_literal_width;
        self.clear_code = 1 << self.literal_width;
        self.end_code = self.clear_code + 1;
        self.reset_dictionary();
        for i in 0..self.clear_code {
            self.lengths[i as usize] = 0;
            self.suffixes[i as usize][0] = i as u8;
            self.first_bytes[i as usize] = i as u8;
        }
        self.started = true;
    }

    fn reset_dictionary(&mut self) {
        self.save_code = self.end_code + 1;
        self.width = self.literal_width + 1;
        self.has_prev = false;
    }

    /// Refills the bit buffer to at least `want` bits, loading up to four
    /// bytes at a time. False when the source is dry first.
    #[inline]
    fn refill(&mut self, src: &mut IoBuffer<'_>, want: u32) -> bool {
        while self.n_bits < want {
            let avail = src.reader_length();
            if avail == 0 {
                return false;
            }
            if avail >= 4 && self.n_bits <= 8 {
                let w = crate::num::peek_u32le(src.reader_slice());
                let k = (32 - self.n_bits) >> 3;
                let mask = ((1u64 << (8 * k)) - 1) as u32;
                self.bits |= (w & mask) << self.n_bits;
                self.n_bits += 8 * k;
                src.consume(k as usize);
            } else {
                let b = src.reader_slice()[0];
                src.consume(1);
                self.bits |= u32::from(b) << self.n_bits;
                self.n_bits += 8;
            }
        }
        true
    }

    /// Adds the next dictionary entry: `prev`'s expansion plus `fb`.
    fn add_entry(&mut self, prev: u32, fb: u8) {
        if self.save_code as usize >= MAX_ENTRIES {
            return;
        }
        let sc = self.save_code as usize;
        let lm1 = (self.lengths[prev as usize] + 1) & 0xFFF;
        self.lengths[sc] = lm1;
        if lm1 % 8 != 0 {
            self.prefixes[sc] = self.prefixes[prev as usize];
            self.suffixes[sc] = self.suffixes[prev as usize];
            self.suffixes[sc][(lm1 % 8) as usize] = fb;
        } else {
            self.prefixes[sc] = prev as u16;
            self.suffixes[sc][0] = fb;
        }
        self.first_bytes[sc] = self.first_bytes[prev as usize];
        self.save_code += 1;
        if self.save_code == (1 << self.width) && self.width < MAX_WIDTH {
            self.width += 1;
        }
    }

    /// Appends `code`'s expansion to the output ring: the trailing partial
    /// block, then full 8-byte blocks walking the prefix chain backwards.
    fn emit(&mut self, code: u32) {
        let lm1 = self.lengths[code as usize] as usize;
        let full_blocks = lm1 >> 3;
        let rem = lm1 & 7;
        let start = self.output_wi;

        let tail_at = start + full_blocks * 8;
        self.output[tail_at..tail_at + rem + 1]
            .copy_from_slice(&self.suffixes[code as usize][..rem + 1]);

        let mut c = code;
        for k in (0..full_blocks).rev() {
            c = u32::from(self.prefixes[c as usize]);
            let at = start + k * 8;
            self.output[at..at + 8].copy_from_slice(&self.suffixes[c as usize]);
        }
        self.output_wi = start + lm1 + 1;
    }

    fn do_transform(&mut self, dst: &mut IoBuffer<'_>, src: &mut IoBuffer<'_>) -> Status {
        if !self.started {
            self.start();
        }
        loop {
            // Drain buffered output first.
            if self.output_ri < self.output_wi {
                let n = (self.output_wi - self.output_ri).min(dst.writer_length());
                dst.write_slice(&self.output[self.output_ri..self.output_ri + n]);
                self.output_ri += n;
                if self.output_ri < self.output_wi {
                    return SUSPENSION_SHORT_WRITE;
                }
                self.output_ri = 0;
                self.output_wi = 0;
            }
            if self.stage == Stage::Done {
                return Status::Ok;
            }

            // Decode codes until the ring wants flushing or input runs out.
            while self.output_wi < FLUSH_THRESHOLD {
                let width = self.width;
                if !self.refill(src, width) {
                    if self.output_ri < self.output_wi {
                        break;
                    }
                    if src.is_closed() {
                        return ERROR_TRUNCATED_INPUT;
                    }
                    return SUSPENSION_SHORT_READ;
                }
                let code = self.bits & ((1u32 << width) - 1);
                self.bits >>= width;
                self.n_bits -= width;

                if code < self.clear_code {
                    self.emit(code);
                    if self.has_prev {
                        self.add_entry(self.prev_code, code as u8);
                    }
                    self.prev_code = code;
                    self.has_prev = true;
                } else if code == self.clear_code {
                    self.reset_dictionary();
                } else if code == self.end_code {
                    self.stage = Stage::Done;
                    break;
                } else if code < self.save_code {
                    self.emit(code);
                    if self.has_prev {
                        self.add_entry(self.prev_code, self.first_bytes[code as usize]);
                    }
                    self.prev_code = code;
                    self.has_prev = true;
                } else if code == self.save_code && self.has_prev {
                    // The KwKwK case: the entry being referenced is the one
                    // about to be created.
                    self.add_entry(self.prev_code, self.first_bytes[self.prev_code as usize]);
                    self.emit(code);
                    self.prev_code = code;
                } else {
                    return ERROR_BAD_CODE;
                }
            }
        }
    }
}

impl IoTransformer for LzwDecoder {
    fn transform_io(
        &mut self,
        dst: &mut IoBuffer<'_>,
        src: &mut IoBuffer<'_>,
        workbuf: &mut [u8],
    ) -> Status {
        let status = self.ctrl.begin(CO_TRANSFORM_IO);
        if !status.is_ok() {
            return status;
        }
        let status = check_workbuf_len(workbuf, self.workbuf_len());
        if !status.is_ok() {
            return self.ctrl.settle(CO_TRANSFORM_IO, status);
        }
        let status = self.do_transform(dst, src);
        self.ctrl.settle(CO_TRANSFORM_IO, status)
    }

    fn workbuf_len(&self) -> RangeIIU64 {
        RangeIIU64::new(0, 0)
    }

    fn set_quirk_enabled(&mut self, _quirk: u32, _enabled: bool) -> Status {
        if self.ctrl.configured_too_late() {
            return ERROR_BAD_CALL_SEQUENCE;
        }
        crate::status::ERROR_UNSUPPORTED_OPTION
    }
}
