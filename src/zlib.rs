//! ZLIB wrapper (RFC 1950): a two-byte header, an embedded DEFLATE stream,
//! and a big-endian Adler-32 trailer checked against the decompressed
//! bytes.

use crate::buffer::{check_workbuf_len, IoBuffer};
use crate::checksum::Adler32;
use crate::deflate::DeflateDecoder;
use crate::geom::RangeIIU64;
use crate::status::{
    Control, Status, ERROR_BAD_CALL_SEQUENCE, INITIALIZE_ALREADY_ZEROED, SUSPENSION_SHORT_READ,
    VERSION,
};
use crate::traits::{HasherU32, IoTransformer};

pub const ERROR_BAD_COMPRESSION_METHOD: Status =
    Status::Error("#zlib: bad compression method");
pub const ERROR_BAD_COMPRESSION_WINDOW_SIZE: Status =
    Status::Error("#zlib: bad compression window size");
pub const ERROR_BAD_PARITY_CHECK: Status = Status::Error("#zlib: bad parity check");
pub const ERROR_BAD_CHECKSUM: Status = Status::Error("#zlib: bad checksum");
pub const ERROR_UNSUPPORTED_PRESET_DICTIONARY: Status =
    Status::Error("#zlib: unsupported preset dictionary");

/// Quirk: skip the trailing checksum comparison.
pub const QUIRK_IGNORE_CHECKSUM: u32 = 1;

const CO_TRANSFORM_IO: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Stage {
    #[default]
    Header,
    Deflate,
    Trailer,
    Done,
}

/// Streaming ZLIB decoder.
pub struct ZlibDecoder {
    ctrl: Control,
    stage: Stage,
    deflate: DeflateDecoder,
    adler: Adler32,
    digest: u32,
    ignore_checksum: bool,
    trailer: [u8; 4],
    trailer_n: u32,
}

impl Default for ZlibDecoder {
    fn default() -> Self {
        Self {
            ctrl: Control::default(),
            stage: Stage::Header,
            deflate: DeflateDecoder::default(),
            adler: Adler32::new(),
            digest: 1,
            ignore_checksum: false,
            trailer: [0; 4],
            trailer_n: 0,
        }
    }
}

impl ZlibDecoder {
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

    /// Disables checksum verification. Must precede the first
    /// `transform_io` call.
    pub fn set_ignore_checksum(&mut self, ignore: bool) -> Status {
        if self.ctrl.configured_too_late() {
            return ERROR_BAD_CALL_SEQUENCE;
        }
        self.ignore_checksum = ignore;
        Status::Ok
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
                    if src.reader_length() < 2 {
                        return if src.is_closed() {
                            crate::status::ERROR_NOT_ENOUGH_DATA
                        } else {
                            SUSPENSION_SHORT_READ
                        };
                    }
                    let cmf = src.reader_slice()[0];
                    let flg = src.reader_slice()[1];
                    if cmf & 0x0F != 8 {
                        return ERROR_BAD_COMPRESSION_METHOD;
                    }
                    if cmf >> 4 > 7 {
                        return ERROR_BAD_COMPRESSION_WINDOW_SIZE;
                    }
                    if flg & 0x20 != 0 {
                        return ERROR_UNSUPPORTED_PRESET_DICTIONARY;
                    }
                    if (u32::from(cmf) * 256 + u32::from(flg)) % 31 != 0 {
                        return ERROR_BAD_PARITY_CHECK;
                    }
                    src.consume(2);
                    log::debug!("zlib: header accepted, window size 2^{}", (cmf >> 4) + 8);
                    self.stage = Stage::Deflate;
                }

                Stage::Deflate => {
                    let start = dst.writer_index();
                    let status = self.deflate.transform_io(dst, src, workbuf);
                    self.digest = self.adler.update_u32(dst.written_since(start));
                    if !status.is_ok() {
                        return status;
                    }
                    self.stage = Stage::Trailer;
                }

                Stage::Trailer => {
                    while self.trailer_n < 4 {
                        let Some(&b) = src.reader_slice().first() else {
                            return if src.is_closed() {
                                crate::status::ERROR_NOT_ENOUGH_DATA
                            } else {
                                SUSPENSION_SHORT_READ
                            };
                        };
                        src.consume(1);
                        self.trailer[self.trailer_n as usize] = b;
                        self.trailer_n += 1;
                    }
                    let want = crate::num::peek_u32be(&self.trailer);
                    if !self.ignore_checksum && want != self.digest {
                        return ERROR_BAD_CHECKSUM;
                    }
                    self.stage = Stage::Done;
                }

                Stage::Done => return Status::Ok,
            }
        }
    }
}

impl IoTransformer for ZlibDecoder {
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
