//! GZIP wrapper (RFC 1952): a flag-driven header, an embedded DEFLATE
//! stream, and a little-endian CRC-32 plus modular length trailer.
//!
//! The optional FEXTRA, FNAME, FCOMMENT and FHCRC fields are parsed and
//! skipped; reserved FLG bits are rejected.

use crate::buffer::{check_workbuf_len, IoBuffer};
use crate::checksum::Crc32;
use crate::deflate::DeflateDecoder;
use crate::geom::RangeIIU64;
use crate::status::{
    Control, Status, ERROR_BAD_CALL_SEQUENCE, ERROR_NOT_ENOUGH_DATA, INITIALIZE_ALREADY_ZEROED,
    SUSPENSION_SHORT_READ, VERSION,
};
use crate::traits::{HasherU32, IoTransformer};

pub const ERROR_BAD_HEADER: Status = Status::Error("#gzip: bad header");
pub const ERROR_BAD_HEADER_FLAG: Status = Status::Error("#gzip: bad header flag");
pub const ERROR_BAD_CHECKSUM: Status = Status::Error("#gzip: bad checksum");
pub const ERROR_BAD_LENGTH: Status = Status::Error("#gzip: bad length");

/// Quirk: skip the trailing checksum and length comparisons.
pub const QUIRK_IGNORE_CHECKSUM: u32 = 1;

const FLG_FHCRC: u8 = 0x02;
const FLG_FEXTRA: u8 = 0x04;
const FLG_FNAME: u8 = 0x08;
const FLG_FCOMMENT: u8 = 0x10;
const FLG_RESERVED: u8 = 0xE0;

const CO_TRANSFORM_IO: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Stage {
    #[default]
    Header,
    ExtraLength,
    ExtraData,
    Name,
    Comment,
    HeaderCrc,
    Deflate,
    Trailer,
    Done,
}

/// Streaming GZIP decoder (single member).
pub struct GzipDecoder {
    ctrl: Control,
    stage: Stage,
    deflate: DeflateDecoder,
    crc: Crc32,
    digest: u32,
    ignore_checksum: bool,
    flags: u8,
    scratch: [u8; 10],
    scratch_n: u32,
    skip_remaining: u32,
}

impl Default for GzipDecoder {
    fn default() -> Self {
        Self {
            ctrl: Control::default(),
            stage: Stage::Header,
            deflate: DeflateDecoder::default(),
            crc: Crc32::new(),
            digest: 0,
            ignore_checksum: false,
            flags: 0,
            scratch: [0; 10],
            scratch_n: 0,
            skip_remaining: 0,
        }
    }
}

impl GzipDecoder {
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
        let inner = self.deflate.initialize(
            core::mem::size_of::<DeflateDecoder>(),
            VERSION,
            INITIALIZE_ALREADY_ZEROED,
        );
        debug_assert!(inner.is_ok());
        Status::Ok
    }

    /// Disables checksum and length verification. Must precede the first
    /// `transform_io` call.
    pub fn set_ignore_checksum(&mut self, ignore: bool) -> Status {
        if self.ctrl.configured_too_late() {
            return ERROR_BAD_CALL_SEQUENCE;
        }
        self.ignore_checksum = ignore;
        Status::Ok
    }

    fn short_read(src: &IoBuffer<'_>) -> Status {
        if src.is_closed() {
            ERROR_NOT_ENOUGH_DATA
        } else {
            SUSPENSION_SHORT_READ
        }
    }

    /// Collects `n` bytes into `scratch` across suspensions. True once all
    /// `n` are present.
    fn gather(&mut self, src: &mut IoBuffer<'_>, n: u32) -> bool {
        while self.scratch_n < n {
            let Some(&b) = src.reader_slice().first() else {
                return false;
            };
            src.consume(1);
            self.scratch[self.scratch_n as usize] = b;
            self.scratch_n += 1;
        }
        true
    }

    /// Consumes bytes until a NUL terminator. True when the NUL was seen.
    fn skip_until_nul(src: &mut IoBuffer<'_>) -> bool {
        while let Some(&b) = src.reader_slice().first() {
            src.consume(1);
            if b == 0 {
                return true;
            }
        }
        false
    }

    fn do_transform(
        &mut self,
        dst: &mut IoBuffer<'_>,
        src: &mut IoBuffer<'_>,
        workbuf: &mut [u8],
    ) -> Status {
        loop {
            match self.stage {
                Stage::Header => {
                    if !self.gather(src, 10) {
                        return Self::short_read(src);
                    }
                    if self.scratch[0] != 0x1F || self.scratch[1] != 0x8B {
                        return ERROR_BAD_HEADER;
                    }
                    if self.scratch[2] != 8 {
                        return ERROR_BAD_HEADER;
                    }
                    self.flags = self.scratch[3];
                    if self.flags & FLG_RESERVED != 0 {
                        return ERROR_BAD_HEADER_FLAG;
                    }
                    self.scratch_n = 0;
                    self.stage = Stage::ExtraLength;
                }

                Stage::ExtraLength => {
                    if self.flags & FLG_FEXTRA == 0 {
                        self.stage = Stage::Name;
                        continue;
                    }
                    if !self.gather(src, 2) {
                        return Self::short_read(src);
                    }
                    self.skip_remaining = u32::from(crate::num::peek_u16le(&self.scratch));
                    self.scratch_n = 0;
                    self.stage = Stage::ExtraData;
                }

                Stage::ExtraData => {
                    while self.skip_remaining > 0 {
                        let n = (self.skip_remaining as usize).min(src.reader_length());
                        if n == 0 {
                            return Self::short_read(src);
                        }
                        src.consume(n);
                        self.skip_remaining -= n as u32;
                    }
                    self.stage = Stage::Name;
                }

                Stage::Name => {
                    if self.flags & FLG_FNAME != 0 && !Self::skip_until_nul(src) {
                        return Self::short_read(src);
                    }
                    self.stage = Stage::Comment;
                }

                Stage::Comment => {
                    if self.flags & FLG_FCOMMENT != 0 && !Self::skip_until_nul(src) {
                        return Self::short_read(src);
                    }
                    self.stage = Stage::HeaderCrc;
                }

                Stage::HeaderCrc => {
                    if self.flags & FLG_FHCRC != 0 {
                        if !self.gather(src, 2) {
                            return Self::short_read(src);
                        }
                        self.scratch_n = 0;
                    }
                    log::debug!("gzip: header accepted, flags 0x{:02X}", self.flags);
                    self.stage = Stage::Deflate;
                }

                Stage::Deflate => {
                    let start = dst.writer_index();
                    let status = self.deflate.transform_io(dst, src, workbuf);
                    self.digest = self.crc.update_u32(dst.written_since(start));
                    if !status.is_ok() {
                        return status;
                    }
                    self.scratch_n = 0;
                    self.stage = Stage::Trailer;
                }

                Stage::Trailer => {
                    if !self.gather(src, 8) {
                        return Self::short_read(src);
                    }
                    let want_crc = crate::num::peek_u32le(&self.scratch[0..4]);
                    let want_isize = crate::num::peek_u32le(&self.scratch[4..8]);
                    if !self.ignore_checksum {
                        if want_crc != self.digest {
                            return ERROR_BAD_CHECKSUM;
                        }
                        if u64::from(want_isize)
                            != (self.deflate.transformed_length() & 0xFFFF_FFFF)
                        {
                            return ERROR_BAD_LENGTH;
                        }
                    }
                    self.stage = Stage::Done;
                }

                Stage::Done => return Status::Ok,
            }
        }
    }
}

impl IoTransformer for GzipDecoder {
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
        let status = self.do_transform(dst, src, workbuf);
        self.ctrl.settle(CO_TRANSFORM_IO, status)
    }

    fn workbuf_len(&self) -> RangeIIU64 {
        RangeIIU64::new(1, 1)
    }

    fn set_quirk_enabled(&mut self, quirk: u32, enabled: bool) -> Status {
        if self.ctrl.configured_too_late() {
            return ERROR_BAD_CALL_SEQUENCE;
        }
        if quirk == QUIRK_IGNORE_CHECKSUM {
            self.ignore_checksum = enabled;
            return Status::Ok;
        }
        crate::status::ERROR_UNSUPPORTED_OPTION
    }
}
