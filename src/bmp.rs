//! BMP image decoding: BITMAPINFOHEADER and the 52/56-byte bitfield
//! variants plus the V4 (108) and V5 (124) headers, at 1/4/8/16/24/32 bits
//! per pixel, BI_RGB or BI_BITFIELDS, bottom-up or top-down.
//!
//! Compression codes 4 and 5 mark an embedded JPEG or PNG payload: the
//! decoder answers `@I/O redirect` from `decode_image_config` and reports
//! the payload's FourCC and byte range through `tell_me_more`.

use crate::buffer::{check_workbuf_len, IoBuffer};
use crate::geom::{RangeIEU64, RangeIIU64, RectIEU32};
use crate::num::{peek_u16le, peek_u32le};
use crate::pixel::{PixelBuffer, PIXEL_FORMAT_BGRA_NONPREMUL};
use crate::status::{
    Control, Status, ERROR_BAD_ARGUMENT, ERROR_BAD_CALL_SEQUENCE, ERROR_NOT_ENOUGH_DATA,
    ERROR_NO_MORE_INFORMATION, INITIALIZE_ALREADY_ZEROED, NOTE_END_OF_DATA, NOTE_I_O_REDIRECT,
    SUSPENSION_SHORT_READ, VERSION,
};
use crate::swizzle::Swizzler;
use crate::traits::{
    DecodeFrameOptions, Disposal, FrameConfig, ImageConfig, ImageDecoder, MoreInformation,
    PixelBlend, FOURCC_JPEG, FOURCC_PNG,
};

pub const ERROR_BAD_HEADER: Status = Status::Error("#bmp: bad header");
pub const ERROR_UNSUPPORTED_BMP_FILE: Status = Status::Error("#bmp: unsupported BMP file");

const CO_DECODE_IMAGE_CONFIG: u32 = 1;
const CO_DECODE_FRAME_CONFIG: u32 = 2;
const CO_DECODE_FRAME: u32 = 3;
const CO_TELL_ME_MORE: u32 = 4;

/// Largest info header we accept (the V5 header).
const MAX_INFO_LEN: usize = 124;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ConfigStage {
    #[default]
    FileHeader,
    InfoLength,
    InfoBody,
    Masks,
    Palette,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CallSeq {
    #[default]
    New,
    HaveImageConfig,
    HaveFrameConfig,
    EndOfData,
    Redirected,
}

/// Per-channel extraction parameters derived from a bitfield mask.
#[derive(Debug, Clone, Copy, Default)]
struct Channel {
    shift: u32,
    max: u32,
}

impl Channel {
    fn from_mask(mask: u32) -> Result<Self, Status> {
        if mask == 0 {
            return Ok(Self { shift: 0, max: 0 });
        }
        let shift = mask.trailing_zeros();
        let width = (mask >> shift).trailing_ones();
        // The mask must be one contiguous run of at most 16 bits.
        if width > 16 || (mask >> shift) != (1u32 << width) - 1 {
            return Err(ERROR_BAD_HEADER);
        }
        Ok(Self { shift, max: (1u32 << width) - 1 })
    }

    #[inline]
    fn extract(self, v: u32, missing: u8) -> u8 {
        if self.max == 0 {
            return missing;
        }
        (((v >> self.shift) & self.max) * 255 / self.max) as u8
    }
}

/// BMP image decoder: one frame, optionally an I/O redirect.
pub struct BmpDecoder {
    ctrl: Control,
    call: CallSeq,
    stage: ConfigStage,

    scratch: [u8; MAX_INFO_LEN],
    scratch_n: usize,
    scratch_want: usize,

    width: u32,
    height: u32,
    top_down: bool,
    bits_per_pixel: u32,
    compression: u32,
    pixel_offset: u32,
    info_len: u32,
    palette_entries: u32,
    palette_have: usize,
    palette: [u8; 1024],
    ch_r: Channel,
    ch_g: Channel,
    ch_b: Channel,
    ch_a: Channel,
    has_alpha: bool,

    // Frame progress.
    gap_done: bool,
    row_bytes_have: usize,
    cur_row: u32,
    dirty_rows: u32,

    redirect_fourcc: u32,
    redirect_reported: bool,

    swizzler: Swizzler,
    num_frame_configs: u64,
    num_frames: u64,
}

impl Default for BmpDecoder {
    fn default() -> Self {
        Self {
            ctrl: Control::default(),
            call: CallSeq::New,
            stage: ConfigStage::FileHeader,
            scratch: [0; MAX_INFO_LEN],
            scratch_n: 0,
            scratch_want: 0,
            width: 0,
            height: 0,
            top_down: false,
            bits_per_pixel: 0,
            compression: 0,
            pixel_offset: 0,
            info_len: 0,
            palette_entries: 0,
            palette_have: 0,
            palette: [0; 1024],
            ch_r: Channel::default(),
            ch_g: Channel::default(),
            ch_b: Channel::default(),
            ch_a: Channel::default(),
            has_alpha: false,
            gap_done: false,
            row_bytes_have: 0,
            cur_row: 0,
            dirty_rows: 0,
            redirect_fourcc: 0,
            redirect_reported: false,
            swizzler: Swizzler::new(),
            num_frame_configs: 0,
            num_frames: 0,
        }
    }
}

impl BmpDecoder {
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

    fn short_read(src: &IoBuffer<'_>) -> Status {
        if src.is_closed() {
            ERROR_NOT_ENOUGH_DATA
        } else {
            SUSPENSION_SHORT_READ
        }
    }

    /// Accumulates `want` bytes into `scratch` across suspensions.
    fn gather(&mut self, src: &mut IoBuffer<'_>, want: usize) -> bool {
        self.scratch_want = want;
        while self.scratch_n < want {
            let n = (want - self.scratch_n).min(src.reader_length());
            if n == 0 {
                return false;
            }
            self.scratch[self.scratch_n..self.scratch_n + n]
                .copy_from_slice(&src.reader_slice()[..n]);
            src.consume(n);
            self.scratch_n += n;
        }
        self.scratch_n = 0;
        true
    }

    /// Bytes per padded pixel row.
    fn row_stride(&self) -> usize {
        ((self.bits_per_pixel as usize * self.width as usize + 31) / 32) * 4
    }

    fn do_decode_image_config(
        &mut self,
        dst: &mut ImageConfig,
        src: &mut IoBuffer<'_>,
    ) -> Status {
        loop {
            match self.stage {
                ConfigStage::FileHeader => {
                    if !self.gather(src, 14) {
                        return Self::short_read(src);
                    }
                    if self.scratch[0] != b'B' || self.scratch[1] != b'M' {
                        return ERROR_BAD_HEADER;
                    }
                    self.pixel_offset = peek_u32le(&self.scratch[10..14]);
                    self.stage = ConfigStage::InfoLength;
                }

                ConfigStage::InfoLength => {
                    if !self.gather(src, 4) {
                        return Self::short_read(src);
                    }
                    self.info_len = peek_u32le(&self.scratch[0..4]);
                    match self.info_len {
                        40 | 52 | 56 | 108 | 124 => {}
                        _ => return ERROR_UNSUPPORTED_BMP_FILE,
                    }
                    self.stage = ConfigStage::InfoBody;
                }

                ConfigStage::InfoBody => {
                    let body = self.info_len as usize - 4;
                    if !self.gather(src, body) {
                        return Self::short_read(src);
                    }
                    let w = peek_u32le(&self.scratch[0..4]) as i32;
                    let h = peek_u32le(&self.scratch[4..8]) as i32;
                    if w <= 0 || h == 0 || h == i32::MIN {
                        return ERROR_BAD_HEADER;
                    }
                    self.width = w as u32;
                    self.top_down = h < 0;
                    self.height = h.unsigned_abs();
                    if peek_u16le(&self.scratch[8..10]) != 1 {
                        return ERROR_BAD_HEADER;
                    }
                    self.bits_per_pixel = u32::from(peek_u16le(&self.scratch[10..12]));
                    self.compression = peek_u32le(&self.scratch[12..16]);
                    self.palette_entries = peek_u32le(&self.scratch[28..32]);

                    match self.compression {
                        4 | 5 => {
                            self.redirect_fourcc =
                                if self.compression == 4 { FOURCC_JPEG } else { FOURCC_PNG };
                            self.call = CallSeq::Redirected;
                            log::debug!(
                                "bmp: compression {} redirects to embedded payload",
                                self.compression
                            );
                            return NOTE_I_O_REDIRECT;
                        }
                        0 | 3 => {}
                        _ => return ERROR_UNSUPPORTED_BMP_FILE,
                    }
                    match self.bits_per_pixel {
                        1 | 4 | 8 | 16 | 24 | 32 => {}
                        _ => return ERROR_UNSUPPORTED_BMP_FILE,
                    }

                    // Default channel layout per depth; headers of 52 bytes
                    // and up carry explicit masks for 16/32 bpp.
                    let (r, g, b, a) = match self.bits_per_pixel {
                        16 => (0x7C00, 0x03E0, 0x001F, 0),
                        32 => (0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0),
                        _ => (0, 0, 0, 0),
                    };
                    let (r, g, b, a) = if self.info_len >= 52 && self.compression == 3 {
                        (
                            peek_u32le(&self.scratch[36..40]),
                            peek_u32le(&self.scratch[40..44]),
                            peek_u32le(&self.scratch[44..48]),
                            if self.info_len >= 56 {
                                peek_u32le(&self.scratch[48..52])
                            } else {
                                0
                            },
                        )
                    } else {
                        (r, g, b, a)
                    };
                    if self.compression == 3 && self.info_len == 40 {
                        // BITFIELDS with a bare 40-byte header: three mask
                        // words follow the header.
                        self.stage = ConfigStage::Masks;
                        continue;
                    }
                    let status = self.set_masks(r, g, b, a);
                    if !status.is_ok() {
                        return status;
                    }
                    self.stage = ConfigStage::Palette;
                }

                ConfigStage::Masks => {
                    if !self.gather(src, 12) {
                        return Self::short_read(src);
                    }
                    let r = peek_u32le(&self.scratch[0..4]);
                    let g = peek_u32le(&self.scratch[4..8]);
                    let b = peek_u32le(&self.scratch[8..12]);
                    let status = self.set_masks(r, g, b, 0);
                    if !status.is_ok() {
                        return status;
                    }
                    self.stage = ConfigStage::Palette;
                }

                ConfigStage::Palette => {
                    if self.bits_per_pixel <= 8 {
                        let mut n = self.palette_entries as usize;
                        if n == 0 || n > (1 << self.bits_per_pixel) {
                            n = 1 << self.bits_per_pixel;
                        }
                        // The palette can be up to 1024 bytes, larger than
                        // the scratch area, so fill it in place.
                        while self.palette_have < n * 4 {
                            let avail = src.reader_length();
                            if avail == 0 {
                                return Self::short_read(src);
                            }
                            let m = (n * 4 - self.palette_have).min(avail);
                            self.palette[self.palette_have..self.palette_have + m]
                                .copy_from_slice(&src.reader_slice()[..m]);
                            src.consume(m);
                            self.palette_have += m;
                        }
                        // BGRX entries become opaque BGRA.
                        for i in 0..n {
                            self.palette[4 * i + 3] = 0xFF;
                        }
                    }
                    self.stage = ConfigStage::Done;
                }

                ConfigStage::Done => break,
            }
        }

        dst.pixcfg.set(PIXEL_FORMAT_BGRA_NONPREMUL, self.width, self.height);
        dst.first_frame_io_position = u64::from(self.pixel_offset);
        dst.first_frame_is_opaque = !self.has_alpha;
        self.call = CallSeq::HaveImageConfig;
        log::debug!(
            "bmp: image config {}x{}, {} bpp, compression {}",
            self.width,
            self.height,
            self.bits_per_pixel,
            self.compression
        );
        Status::Ok
    }

    fn set_masks(&mut self, r: u32, g: u32, b: u32, a: u32) -> Status {
        match (
            Channel::from_mask(r),
            Channel::from_mask(g),
            Channel::from_mask(b),
            Channel::from_mask(a),
        ) {
            (Ok(cr), Ok(cg), Ok(cb), Ok(ca)) => {
                self.ch_r = cr;
                self.ch_g = cg;
                self.ch_b = cb;
                self.ch_a = ca;
                self.has_alpha = a != 0;
                Status::Ok
            }
            _ => ERROR_BAD_HEADER,
        }
    }

    /// Converts one raw row (in `raw`) to BGRA in `staged`.
    fn stage_row(&self, raw: &[u8], staged: &mut [u8]) {
        let w = self.width as usize;
        match self.bits_per_pixel {
            1 | 4 => {
                let per_byte = 8 / self.bits_per_pixel as usize;
                let bits = self.bits_per_pixel;
                let mask = (1u16 << bits) as u8 - 1;
                for x in 0..w {
                    let byte = raw[x / per_byte];
                    let shift = 8 - bits as usize * (x % per_byte + 1);
                    let idx = ((byte >> shift) & mask) as usize * 4;
                    staged[4 * x..4 * x + 4].copy_from_slice(&self.palette[idx..idx + 4]);
                }
            }
            8 => {
                for x in 0..w {
                    let idx = raw[x] as usize * 4;
                    staged[4 * x..4 * x + 4].copy_from_slice(&self.palette[idx..idx + 4]);
                }
            }
            16 => {
                for x in 0..w {
                    let v = u32::from(peek_u16le(&raw[2 * x..]));
                    staged[4 * x] = self.ch_b.extract(v, 0);
                    staged[4 * x + 1] = self.ch_g.extract(v, 0);
                    staged[4 * x + 2] = self.ch_r.extract(v, 0);
                    staged[4 * x + 3] = self.ch_a.extract(v, 0xFF);
                }
            }
            24 => {
                for x in 0..w {
                    staged[4 * x..4 * x + 3].copy_from_slice(&raw[3 * x..3 * x + 3]);
                    staged[4 * x + 3] = 0xFF;
                }
            }
            _ => {
                for x in 0..w {
                    let v = peek_u32le(&raw[4 * x..]);
                    staged[4 * x] = self.ch_b.extract(v, 0);
                    staged[4 * x + 1] = self.ch_g.extract(v, 0);
                    staged[4 * x + 2] = self.ch_r.extract(v, 0);
                    staged[4 * x + 3] = self.ch_a.extract(v, 0xFF);
                }
            }
        }
    }

    fn do_decode_frame(
        &mut self,
        dst: &mut PixelBuffer<'_>,
        src: &mut IoBuffer<'_>,
        blend: PixelBlend,
        workbuf: &mut [u8],
    ) -> Status {
        if !self.gap_done {
            // Skip from wherever the palette ended to the declared pixel
            // data offset.
            while src.reader_position() < u64::from(self.pixel_offset) {
                let n = (u64::from(self.pixel_offset) - src.reader_position())
                    .min(src.reader_length() as u64) as usize;
                if n == 0 {
                    return Self::short_read(src);
                }
                src.consume(n);
            }
            if src.reader_position() != u64::from(self.pixel_offset) {
                return ERROR_BAD_HEADER;
            }
            self.gap_done = true;
            let status = self.swizzler.prepare(
                dst.config().format(),
                &mut [],
                PIXEL_FORMAT_BGRA_NONPREMUL,
                &[],
                blend,
            );
            if !status.is_ok() {
                return status;
            }
        }

        let stride = self.row_stride();
        let staged_len = self.width as usize * 4;
        while self.cur_row < self.height {
            // Fill the raw row region of the workbuf.
            while self.row_bytes_have < stride {
                let n = (stride - self.row_bytes_have).min(src.reader_length());
                if n == 0 {
                    return Self::short_read(src);
                }
                workbuf[self.row_bytes_have..self.row_bytes_have + n]
                    .copy_from_slice(&src.reader_slice()[..n]);
                src.consume(n);
                self.row_bytes_have += n;
            }
            let (raw, staged) = workbuf.split_at_mut(stride);
            self.stage_row(&raw[..stride], &mut staged[..staged_len]);
            let y = if self.top_down {
                self.cur_row
            } else {
                self.height - 1 - self.cur_row
            };
            let dst_bpp = self.swizzler.dst_bytes_per_pixel();
            let row = dst.row(y);
            self.swizzler
                .swizzle(&mut row[..self.width as usize * dst_bpp], &staged[..staged_len]);
            self.row_bytes_have = 0;
            self.cur_row += 1;
            self.dirty_rows = self.cur_row;
        }
        self.num_frames += 1;
        self.call = CallSeq::EndOfData;
        Status::Ok
    }
}

impl ImageDecoder for BmpDecoder {
    fn decode_image_config(&mut self, dst: &mut ImageConfig, src: &mut IoBuffer<'_>) -> Status {
        let status = self.ctrl.begin(CO_DECODE_IMAGE_CONFIG);
        if !status.is_ok() {
            return status;
        }
        let status = if self.call != CallSeq::New {
            ERROR_BAD_CALL_SEQUENCE
        } else {
            self.do_decode_image_config(dst, src)
        };
        self.ctrl.settle(CO_DECODE_IMAGE_CONFIG, status)
    }

    fn decode_frame_config(&mut self, dst: &mut FrameConfig, _src: &mut IoBuffer<'_>) -> Status {
        let status = self.ctrl.begin(CO_DECODE_FRAME_CONFIG);
        if !status.is_ok() {
            return status;
        }
        let status = match self.call {
            CallSeq::New | CallSeq::Redirected | CallSeq::HaveFrameConfig => {
                ERROR_BAD_CALL_SEQUENCE
            }
            CallSeq::EndOfData => NOTE_END_OF_DATA,
            CallSeq::HaveImageConfig => {
                *dst = FrameConfig {
                    bounds: RectIEU32::new(0, 0, self.width, self.height),
                    duration: 0,
                    index: 0,
                    io_position: u64::from(self.pixel_offset),
                    disposal: Disposal::None,
                    opaque_within_bounds: !self.has_alpha,
                    overwrite_instead_of_blend: false,
                    background_color: 0xFF00_0000,
                };
                self.num_frame_configs = 1;
                self.call = CallSeq::HaveFrameConfig;
                Status::Ok
            }
        };
        self.ctrl.settle(CO_DECODE_FRAME_CONFIG, status)
    }

    fn decode_frame(
        &mut self,
        dst: &mut PixelBuffer<'_>,
        src: &mut IoBuffer<'_>,
        blend: PixelBlend,
        workbuf: &mut [u8],
        _opts: &DecodeFrameOptions,
    ) -> Status {
        let status = self.ctrl.begin(CO_DECODE_FRAME);
        if !status.is_ok() {
            return status;
        }
        let status = check_workbuf_len(workbuf, self.workbuf_len());
        if !status.is_ok() {
            return self.ctrl.settle(CO_DECODE_FRAME, status);
        }
        let status = match self.call {
            CallSeq::HaveFrameConfig => self.do_decode_frame(dst, src, blend, workbuf),
            CallSeq::EndOfData => NOTE_END_OF_DATA,
            _ => ERROR_BAD_CALL_SEQUENCE,
        };
        self.ctrl.settle(CO_DECODE_FRAME, status)
    }

    fn restart_frame(&mut self, index: u64, io_position: u64) -> Status {
        let status = self.ctrl.begin_plain();
        if !status.is_ok() {
            return status;
        }
        if self.call == CallSeq::New || self.call == CallSeq::Redirected {
            return ERROR_BAD_CALL_SEQUENCE;
        }
        if index != 0 || io_position != u64::from(self.pixel_offset) {
            return ERROR_BAD_ARGUMENT;
        }
        self.call = CallSeq::HaveImageConfig;
        self.gap_done = false;
        self.row_bytes_have = 0;
        self.cur_row = 0;
        self.dirty_rows = 0;
        Status::Ok
    }

    fn frame_dirty_rect(&self) -> RectIEU32 {
        if self.dirty_rows == 0 {
            RectIEU32::default()
        } else if self.top_down {
            RectIEU32::new(0, 0, self.width, self.dirty_rows)
        } else {
            RectIEU32::new(0, self.height - self.dirty_rows, self.width, self.height)
        }
    }

    fn num_animation_loops(&self) -> u32 {
        0
    }

    fn num_decoded_frame_configs(&self) -> u64 {
        self.num_frame_configs
    }

    fn num_decoded_frames(&self) -> u64 {
        self.num_frames
    }

    fn tell_me_more(
        &mut self,
        _dst: &mut IoBuffer<'_>,
        minfo: &mut MoreInformation,
        _src: &mut IoBuffer<'_>,
    ) -> Status {
        let status = self.ctrl.begin(CO_TELL_ME_MORE);
        if !status.is_ok() {
            return status;
        }
        let status = if self.call == CallSeq::Redirected && !self.redirect_reported {
            self.redirect_reported = true;
            *minfo = MoreInformation::io_redirect(
                self.redirect_fourcc,
                RangeIEU64::new(u64::from(self.pixel_offset), u64::MAX),
            );
            Status::Ok
        } else {
            ERROR_NO_MORE_INFORMATION
        };
        self.ctrl.settle(CO_TELL_ME_MORE, status)
    }

    fn set_report_metadata(&mut self, _fourcc: u32, _report: bool) -> Status {
        crate::status::ERROR_UNSUPPORTED_OPTION
    }

    fn workbuf_len(&self) -> RangeIIU64 {
        let n = (self.row_stride() + self.width as usize * 4) as u64;
        RangeIIU64::new(n, n)
    }

    fn set_quirk_enabled(&mut self, _quirk: u32, _enabled: bool) -> Status {
        if self.ctrl.configured_too_late() {
            return ERROR_BAD_CALL_SEQUENCE;
        }
        crate::status::ERROR_UNSUPPORTED_OPTION
    }
}
