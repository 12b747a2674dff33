//! Streaming DEFLATE decompression (RFC 1951).
//!
//! The decoder is a stage machine over caller-owned buffers: each
//! `transform_io` call runs until the source is dry, the destination is
//! full, or the final block ends, then suspends or completes. All state
//! that must survive a suspension lives in the receiver: the bit buffer,
//! the stage tag, the pending match, the two Huffman tables and the 32 KiB
//! history window.
//!
//! The symbol loop has two renditions. The slow loop checks both buffers
//! before every byte and is the correctness reference. The fast loop runs
//! only while the destination can take a whole maximum-length match (258
//! bytes) and the source holds at least 12 bytes, which lets it skip the
//! per-byte checks.

use crate::buffer::{check_workbuf_len, IoBuffer};
use crate::geom::RangeIIU64;
use crate::status::{
    Control, Status, INITIALIZE_ALREADY_ZEROED, SUSPENSION_SHORT_READ, SUSPENSION_SHORT_WRITE,
    VERSION,
};
use crate::traits::IoTransformer;

use super::huffman::{
    build, entry_base, entry_extra, entry_kind, entry_len, fixed_distance_lengths,
    fixed_lit_len_lengths, Alphabet, KIND_BAD, KIND_DISTANCE, KIND_END_OF_BLOCK, KIND_LENGTH,
    KIND_LITERAL, KIND_REDIRECT, MAX_CODE_LENGTH, PRIMARY_BITS, TABLE_SIZE,
};

pub const ERROR_BAD_BLOCK_TYPE: Status = Status::Error("#deflate: bad block type");
pub const ERROR_BAD_DISTANCE: Status = Status::Error("#deflate: bad distance");
pub const ERROR_BAD_HUFFMAN_CODE: Status = Status::Error("#deflate: bad Huffman code");
pub const ERROR_BAD_CODE_COUNT: Status = Status::Error("#deflate: bad Huffman code count");
pub const ERROR_BAD_CODE_LENGTH_REPETITION: Status =
    Status::Error("#deflate: bad Huffman code length repetition");
pub const ERROR_INCONSISTENT_STORED_BLOCK_LENGTH: Status =
    Status::Error("#deflate: inconsistent stored block length");
pub const ERROR_TRUNCATED_INPUT: Status = Status::Error("#deflate: truncated input");

/// History window: 32 KiB of ring, plus a 257-byte mirror of the ring's
/// start so any maximal 258-byte match can be read as one contiguous run.
const WINDOW_SIZE: usize = 32 * 1024;
const WINDOW_MASK: usize = WINDOW_SIZE - 1;
const HISTORY_LEN: usize = WINDOW_SIZE + 257;

/// Order in which the code-length-alphabet lengths appear in a dynamic
/// block header (RFC 1951 section 3.2.7).
const CODE_ORDER: [u8; 19] = [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

const CO_TRANSFORM_IO: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Stage {
    #[default]
    BlockHeader,
    StoredLength,
    StoredCopy,
    DynCounts,
    DynCodeLengths,
    DynSymbolLengths,
    Symbol,
    LengthExtra,
    DistSymbol,
    DistExtra,
    MatchCopy,
    Done,
}

/// Streaming DEFLATE decoder.
pub struct DeflateDecoder {
    ctrl: Control,
    stage: Stage,

    // Bit reader: LSB-first, at most 31 bits buffered.
    bits: u32,
    n_bits: u32,

    bfinal: bool,

    // Stored-block state.
    stored_header: [u8; 4],
    stored_header_n: u32,
    stored_remaining: u32,

    // Dynamic-header state.
    n_lit: u32,
    n_dist: u32,
    n_clen: u32,
    dyn_index: u32,
    code_lengths: [u8; 320],

    // Pending match, carried across suspensions.
    saved_length: u32,
    saved_distance: u32,
    saved_extra: u32,

    // Sliding history.
    history: [u8; HISTORY_LEN],
    history_index: u32,
    total_out: u64,

    // huffs[0]: code-length then literal/length table; huffs[1]: distances.
    huffs: [[u32; TABLE_SIZE]; 2],
}

impl Default for DeflateDecoder {
    fn default() -> Self {
        Self {
            ctrl: Control::default(),
            stage: Stage::BlockHeader,
            bits: 0,
            n_bits: 0,
            bfinal: false,
            stored_header: [0; 4],
            stored_header_n: 0,
            stored_remaining: 0,
            n_lit: 0,
            n_dist: 0,
            n_clen: 0,
            dyn_index: 0,
            code_lengths: [0; 320],
            saved_length: 0,
            saved_distance: 0,
            saved_extra: 0,
            history: [0; HISTORY_LEN],
            history_index: 0,
            total_out: 0,
            huffs: [[0; TABLE_SIZE]; 2],
        }
    }
}

enum SymbolRead {
    Entry(u32),
    NeedInput,
}

impl DeflateDecoder {
    /// A ready-to-use receiver. The receiver is table-heavy, so it lives on
    /// the heap.
    #[must_use]
    pub fn new() -> Box<Self> {
        let mut d: Box<Self> = Box::default();
        let status =
            d.initialize(core::mem::size_of::<Self>(), VERSION, INITIALIZE_ALREADY_ZEROED);
        debug_assert!(status.is_ok());
        d
    }

    /// The version/size handshake. [`Self::new`] performs it with this
    /// crate's own constants; callers holding raw receiver memory can drive
    /// it explicitly.
    pub fn initialize(&mut self, sizeof_receiver: usize, version: u32, flags: u32) -> Status {
        let status =
            self.ctrl
                .initialize(sizeof_receiver, core::mem::size_of::<Self>(), version, flags);
        if !status.is_ok() {
            return status;
        }
        if (flags & INITIALIZE_ALREADY_ZEROED) == 0 {
            let ctrl = self.ctrl;
            *self = Self { ctrl, ..Self::default() };
        }
        Status::Ok
    }

    /// Total bytes produced across all calls so far.
    #[must_use]
    pub fn transformed_length(&self) -> u64 {
        self.total_out
    }

    // ── Bit reader ───────────────────────────────────────────────────────────

    /// Tops the bit buffer up to at least `n` bits. False when the source
    /// runs dry first.
    #[inline]
    fn fill_bits(&mut self, src: &mut IoBuffer<'_>, n: u32) -> bool {
        while self.n_bits < n {
            let Some(&b) = src.reader_slice().first() else {
                return false;
            };
            src.consume(1);
            self.bits |= u32::from(b) << self.n_bits;
            self.n_bits += 8;
        }
        true
    }

    #[inline]
    fn take_bits(&mut self, n: u32) -> u32 {
        debug_assert!(n <= self.n_bits);
        let v = self.bits & (((1u64 << n) - 1) as u32);
        self.bits >>= n;
        self.n_bits -= n;
        v
    }

    fn short_read(src: &IoBuffer<'_>) -> Status {
        if src.is_closed() {
            ERROR_TRUNCATED_INPUT
        } else {
            SUSPENSION_SHORT_READ
        }
    }

    // ── History window ───────────────────────────────────────────────────────

    #[inline]
    fn push_history(&mut self, b: u8) {
        let i = self.history_index as usize;
        self.history[i] = b;
        if i < HISTORY_LEN - WINDOW_SIZE {
            self.history[i + WINDOW_SIZE] = b;
        }
        self.history_index = ((i + 1) & WINDOW_MASK) as u32;
    }

    fn push_history_slice(&mut self, s: &[u8]) {
        for &b in s {
            self.push_history(b);
        }
    }

    /// Emits one byte of a pending match, reading the window with
    /// write-through so overlapping matches replicate.
    #[inline]
    fn match_byte(&mut self, distance: u32) -> u8 {
        let i = (self.history_index as usize + WINDOW_SIZE - distance as usize) & WINDOW_MASK;
        let b = self.history[i];
        self.push_history(b);
        b
    }

    // ── Huffman symbol reader (slow path) ────────────────────────────────────

    /// Resolves one symbol from table `which`, consuming its bits. Returns
    /// `NeedInput` without consuming anything when the buffered bits cannot
    /// yet prove a decode.
    fn read_symbol(&mut self, which: usize, src: &mut IoBuffer<'_>) -> Result<SymbolRead, Status> {
        loop {
            let entry = self.huffs[which][(self.bits & 0x1FF) as usize];
            let kind = entry_kind(entry);
            let len = entry_len(entry);

            if kind == KIND_REDIRECT {
                if self.n_bits < PRIMARY_BITS {
                    if !self.fill_bits(src, PRIMARY_BITS) {
                        return Ok(SymbolRead::NeedInput);
                    }
                    continue;
                }
                let mask = (1u32 << entry_extra(entry)) - 1;
                let sub = self.huffs[which]
                    [(entry_base(entry) + ((self.bits >> PRIMARY_BITS) & mask)) as usize];
                let total = PRIMARY_BITS + entry_len(sub);
                if self.n_bits < total {
                    if !self.fill_bits(src, total) {
                        return Ok(SymbolRead::NeedInput);
                    }
                    continue;
                }
                if entry_kind(sub) == KIND_BAD {
                    return Err(ERROR_BAD_HUFFMAN_CODE);
                }
                self.take_bits(total);
                return Ok(SymbolRead::Entry(sub));
            }

            // An entry can be trusted once its code length fits the real
            // bits: shorter codes replicate across every index sharing
            // their low bits.
            if kind != KIND_BAD && len != 0 && len <= self.n_bits {
                self.take_bits(len);
                return Ok(SymbolRead::Entry(entry));
            }
            if kind == KIND_BAD && len != 0 && len <= self.n_bits {
                return Err(ERROR_BAD_HUFFMAN_CODE);
            }
            if (len == 0 || kind == KIND_BAD) && self.n_bits >= MAX_CODE_LENGTH {
                return Err(ERROR_BAD_HUFFMAN_CODE);
            }
            if !self.fill_bits(src, self.n_bits + 8) {
                return Ok(SymbolRead::NeedInput);
            }
        }
    }

    // ── Stage machine ────────────────────────────────────────────────────────

    fn do_transform(&mut self, dst: &mut IoBuffer<'_>, src: &mut IoBuffer<'_>) -> Status {
        loop {
            match self.stage {
                Stage::BlockHeader => {
                    if !self.fill_bits(src, 3) {
                        return Self::short_read(src);
                    }
                    self.bfinal = self.take_bits(1) != 0;
                    match self.take_bits(2) {
                        0 => {
                            // Stored blocks restart on a byte boundary.
                            let drop = self.n_bits & 7;
                            self.take_bits(drop);
                            self.stored_header_n = 0;
                            self.stage = Stage::StoredLength;
                        }
                        1 => {
                            let status = self.init_fixed_huffman();
                            if !status.is_ok() {
                                return status;
                            }
                            self.stage = Stage::Symbol;
                        }
                        2 => {
                            self.stage = Stage::DynCounts;
                        }
                        _ => return ERROR_BAD_BLOCK_TYPE,
                    }
                }

                Stage::StoredLength => {
                    while self.stored_header_n < 4 {
                        let b = if self.n_bits >= 8 {
                            self.take_bits(8) as u8
                        } else {
                            let Some(&b) = src.reader_slice().first() else {
                                return Self::short_read(src);
                            };
                            src.consume(1);
                            b
                        };
                        self.stored_header[self.stored_header_n as usize] = b;
                        self.stored_header_n += 1;
                    }
                    let len = crate::num::peek_u16le(&self.stored_header[0..2]);
                    let nlen = crate::num::peek_u16le(&self.stored_header[2..4]);
                    if len ^ nlen != 0xFFFF {
                        return ERROR_INCONSISTENT_STORED_BLOCK_LENGTH;
                    }
                    self.stored_remaining = u32::from(len);
                    self.stage = Stage::StoredCopy;
                }

                Stage::StoredCopy => {
                    while self.stored_remaining > 0 {
                        let n = (self.stored_remaining as usize)
                            .min(src.reader_length())
                            .min(dst.writer_length());
                        if n == 0 {
                            if src.reader_length() == 0 {
                                return Self::short_read(src);
                            }
                            return SUSPENSION_SHORT_WRITE;
                        }
                        self.push_history_slice(&src.reader_slice()[..n]);
                        dst.write_slice(&src.reader_slice()[..n]);
                        src.consume(n);
                        self.total_out += n as u64;
                        self.stored_remaining -= n as u32;
                    }
                    self.stage = if self.bfinal { Stage::Done } else { Stage::BlockHeader };
                }

                Stage::DynCounts => {
                    if !self.fill_bits(src, 14) {
                        return Self::short_read(src);
                    }
                    self.n_lit = 257 + self.take_bits(5);
                    self.n_dist = 1 + self.take_bits(5);
                    self.n_clen = 4 + self.take_bits(4);
                    if self.n_lit > 286 || self.n_dist > 30 {
                        return ERROR_BAD_CODE_COUNT;
                    }
                    self.code_lengths = [0; 320];
                    self.dyn_index = 0;
                    self.stage = Stage::DynCodeLengths;
                }

                Stage::DynCodeLengths => {
                    while self.dyn_index < self.n_clen {
                        if !self.fill_bits(src, 3) {
                            return Self::short_read(src);
                        }
                        let order = CODE_ORDER[self.dyn_index as usize] as usize;
                        self.code_lengths[order] = self.take_bits(3) as u8;
                        self.dyn_index += 1;
                    }
                    let status = build(
                        &mut self.huffs[0],
                        &self.code_lengths[..19],
                        Alphabet::CodeLength,
                    );
                    if !status.is_ok() {
                        return status;
                    }
                    self.code_lengths = [0; 320];
                    self.dyn_index = 0;
                    self.stage = Stage::DynSymbolLengths;
                }

                Stage::DynSymbolLengths => {
                    let status = self.read_dynamic_symbol_lengths(src);
                    if !status.is_ok() {
                        return status;
                    }
                    let n_lit = self.n_lit as usize;
                    let n_dist = self.n_dist as usize;
                    let status =
                        build(&mut self.huffs[0], &self.code_lengths[..n_lit], Alphabet::LitLen);
                    if !status.is_ok() {
                        return status;
                    }
                    let status = build(
                        &mut self.huffs[1],
                        &self.code_lengths[n_lit..n_lit + n_dist],
                        Alphabet::Distance,
                    );
                    if !status.is_ok() {
                        return status;
                    }
                    log::trace!(
                        "deflate: dynamic block, {n_lit} lit/len codes, {n_dist} distance codes"
                    );
                    self.stage = Stage::Symbol;
                }

                Stage::Symbol => {
                    if dst.writer_length() >= 258 && src.reader_length() >= 12 {
                        let status = self.fast_loop(dst, src);
                        if !status.is_ok() {
                            return status;
                        }
                        if self.stage != Stage::Symbol {
                            continue;
                        }
                    }
                    if dst.writer_length() == 0 {
                        return SUSPENSION_SHORT_WRITE;
                    }
                    let entry = match self.read_symbol(0, src) {
                        Err(e) => return e,
                        Ok(SymbolRead::NeedInput) => return Self::short_read(src),
                        Ok(SymbolRead::Entry(e)) => e,
                    };
                    match entry_kind(entry) {
                        KIND_LITERAL => {
                            let b = entry_base(entry) as u8;
                            dst.write_u8(b);
                            self.push_history(b);
                            self.total_out += 1;
                        }
                        KIND_END_OF_BLOCK => {
                            self.stage =
                                if self.bfinal { Stage::Done } else { Stage::BlockHeader };
                        }
                        KIND_LENGTH => {
                            self.saved_length = entry_base(entry);
                            self.saved_extra = entry_extra(entry);
                            self.stage = Stage::LengthExtra;
                        }
                        _ => return ERROR_BAD_HUFFMAN_CODE,
                    }
                }

                Stage::LengthExtra => {
                    let n = self.saved_extra;
                    if !self.fill_bits(src, n) {
                        return Self::short_read(src);
                    }
                    self.saved_length += self.take_bits(n);
                    self.stage = Stage::DistSymbol;
                }

                Stage::DistSymbol => {
                    let entry = match self.read_symbol(1, src) {
                        Err(e) => return e,
                        Ok(SymbolRead::NeedInput) => return Self::short_read(src),
                        Ok(SymbolRead::Entry(e)) => e,
                    };
                    if entry_kind(entry) != KIND_DISTANCE {
                        return ERROR_BAD_HUFFMAN_CODE;
                    }
                    self.saved_distance = entry_base(entry);
                    self.saved_extra = entry_extra(entry);
                    self.stage = Stage::DistExtra;
                }

                Stage::DistExtra => {
                    let n = self.saved_extra;
                    if !self.fill_bits(src, n) {
                        return Self::short_read(src);
                    }
                    self.saved_distance += self.take_bits(n);
                    if u64::from(self.saved_distance) > self.total_out
                        || self.saved_distance as usize > WINDOW_SIZE
                    {
                        return ERROR_BAD_DISTANCE;
                    }
                    self.stage = Stage::MatchCopy;
                }

                Stage::MatchCopy => {
                    while self.saved_length > 0 {
                        if dst.writer_length() == 0 {
                            return SUSPENSION_SHORT_WRITE;
                        }
                        let b = self.match_byte(self.saved_distance);
                        dst.write_u8(b);
                        self.total_out += 1;
                        self.saved_length -= 1;
                    }
                    self.stage = Stage::Symbol;
                }

                Stage::Done => return Status::Ok,
            }
        }
    }

    /// Reads the run-length-encoded literal/length plus distance code
    /// lengths of a dynamic block header into `code_lengths`.
    fn read_dynamic_symbol_lengths(&mut self, src: &mut IoBuffer<'_>) -> Status {
        let total = self.n_lit + self.n_dist;
        while self.dyn_index < total {
            // Peek before consuming: the symbol (at most 7 bits) and its
            // repeat field (at most 7 bits) are taken together, so a
            // suspension here never strands half an operation.
            let entry = self.huffs[0][(self.bits & 0x1FF) as usize];
            let len = entry_len(entry);
            if len == 0 || len > self.n_bits {
                if len == 0 && self.n_bits >= 7 {
                    return ERROR_BAD_HUFFMAN_CODE;
                }
                if !self.fill_bits(src, self.n_bits + 8) {
                    return Self::short_read(src);
                }
                continue;
            }
            let symbol = entry_base(entry);
            let (extra_bits, base, repeat_of_previous) = match symbol {
                0..=15 => {
                    self.take_bits(len);
                    self.code_lengths[self.dyn_index as usize] = symbol as u8;
                    self.dyn_index += 1;
                    continue;
                }
                16 => (2u32, 3u32, true),
                17 => (3, 3, false),
                _ => (7, 11, false),
            };
            if self.n_bits < len + extra_bits {
                if !self.fill_bits(src, len + extra_bits) {
                    return Self::short_read(src);
                }
                continue;
            }
            self.take_bits(len);
            let mut repeat = base + self.take_bits(extra_bits);
            let fill = if repeat_of_previous {
                if self.dyn_index == 0 {
                    return ERROR_BAD_CODE_LENGTH_REPETITION;
                }
                self.code_lengths[(self.dyn_index - 1) as usize]
            } else {
                0
            };
            if self.dyn_index + repeat > total {
                return ERROR_BAD_CODE_LENGTH_REPETITION;
            }
            while repeat > 0 {
                self.code_lengths[self.dyn_index as usize] = fill;
                self.dyn_index += 1;
                repeat -= 1;
            }
        }
        Status::Ok
    }

    fn init_fixed_huffman(&mut self) -> Status {
        let status = build(&mut self.huffs[0], &fixed_lit_len_lengths(), Alphabet::LitLen);
        if !status.is_ok() {
            return status;
        }
        build(&mut self.huffs[1], &fixed_distance_lengths(), Alphabet::Distance)
    }

    // ── Fast symbol loop ─────────────────────────────────────────────────────

    /// Decodes symbols without per-byte suspension checks. Entered only
    /// when the destination can absorb a maximal match and the source holds
    /// a full worst-case symbol; exits back to the slow loop as soon as
    /// either guard fails or the block ends.
    fn fast_loop(&mut self, dst: &mut IoBuffer<'_>, src: &mut IoBuffer<'_>) -> Status {
        let mut bits = self.bits;
        let mut n_bits = self.n_bits;
        let mut consumed = 0usize;

        let status = loop {
            if src.reader_length() - consumed < 12 || dst.writer_length() < 258 {
                break Status::Ok;
            }
            let data = src.reader_slice();
            while n_bits < 15 {
                bits |= u32::from(data[consumed]) << n_bits;
                consumed += 1;
                n_bits += 8;
            }

            let mut entry = self.huffs[0][(bits & 0x1FF) as usize];
            if entry_kind(entry) == KIND_REDIRECT {
                let mask = (1u32 << entry_extra(entry)) - 1;
                entry = self.huffs[0]
                    [(entry_base(entry) + ((bits >> PRIMARY_BITS) & mask)) as usize];
                bits >>= PRIMARY_BITS;
                n_bits -= PRIMARY_BITS;
            }
            let len = entry_len(entry);
            bits >>= len;
            n_bits -= len;

            match entry_kind(entry) {
                KIND_LITERAL => {
                    let b = entry_base(entry) as u8;
                    dst.write_u8(b);
                    self.push_history(b);
                    self.total_out += 1;
                    continue;
                }
                KIND_END_OF_BLOCK => {
                    self.stage = if self.bfinal { Stage::Done } else { Stage::BlockHeader };
                    break Status::Ok;
                }
                KIND_LENGTH => {}
                _ => break ERROR_BAD_HUFFMAN_CODE,
            }

            // Length extra bits.
            let mut extra = entry_extra(entry);
            while n_bits < extra {
                bits |= u32::from(data[consumed]) << n_bits;
                consumed += 1;
                n_bits += 8;
            }
            let length = entry_base(entry) + (bits & ((1u32 << extra) - 1));
            bits >>= extra;
            n_bits -= extra;

            // Distance symbol.
            while n_bits < 15 {
                bits |= u32::from(data[consumed]) << n_bits;
                consumed += 1;
                n_bits += 8;
            }
            let mut dentry = self.huffs[1][(bits & 0x1FF) as usize];
            if entry_kind(dentry) == KIND_REDIRECT {
                let mask = (1u32 << entry_extra(dentry)) - 1;
                dentry = self.huffs[1]
                    [(entry_base(dentry) + ((bits >> PRIMARY_BITS) & mask)) as usize];
                bits >>= PRIMARY_BITS;
                n_bits -= PRIMARY_BITS;
            }
            if entry_kind(dentry) != KIND_DISTANCE {
                break ERROR_BAD_HUFFMAN_CODE;
            }
            let dlen = entry_len(dentry);
            bits >>= dlen;
            n_bits -= dlen;

            extra = entry_extra(dentry);
            while n_bits < extra {
                bits |= u32::from(data[consumed]) << n_bits;
                consumed += 1;
                n_bits += 8;
            }
            let distance = entry_base(dentry) + (bits & ((1u32 << extra) - 1));
            bits >>= extra;
            n_bits -= extra;

            if u64::from(distance) > self.total_out || distance as usize > WINDOW_SIZE {
                break ERROR_BAD_DISTANCE;
            }
            for _ in 0..length {
                let b = self.match_byte(distance);
                dst.write_u8(b);
            }
            self.total_out += u64::from(length);
        };

        src.consume(consumed);
        self.bits = bits;
        self.n_bits = n_bits;
        status
    }
}

impl IoTransformer for DeflateDecoder {
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
        RangeIIU64::new(1, 1)
    }

    fn set_quirk_enabled(&mut self, _quirk: u32, _enabled: bool) -> Status {
        if self.ctrl.configured_too_late() {
            return crate::status::ERROR_BAD_CALL_SEQUENCE;
        }
        crate::status::ERROR_UNSUPPORTED_OPTION
    }
}
