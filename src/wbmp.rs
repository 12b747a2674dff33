//! WBMP image decoding: type-0 (the only registered type), 1 bit per
//! pixel, most significant bit first, rows padded to a byte boundary.
//! Width and height are 7-bit continuation-encoded integers capped at 32
//! bits.

use crate::buffer::{check_workbuf_len, IoBuffer};
use crate::geom::{RangeIIU64, RectIEU32};
use crate::pixel::{PixelBuffer, PIXEL_FORMAT_Y};
use crate::status::{
    Control, Status, ERROR_BAD_ARGUMENT, ERROR_BAD_CALL_SEQUENCE, ERROR_BAD_RESTART,
    ERROR_NOT_ENOUGH_DATA, ERROR_NO_MORE_INFORMATION, INITIALIZE_ALREADY_ZEROED,
    NOTE_END_OF_DATA, SUSPENSION_SHORT_READ, VERSION,
};
use crate::swizzle::Swizzler;
use crate::traits::{
    DecodeFrameOptions, Disposal, FrameConfig, ImageConfig, ImageDecoder, MoreInformation,
    PixelBlend,
};

pub const ERROR_BAD_HEADER: Status = Status::Error("#wbmp: bad header");
pub const ERROR_UNSUPPORTED_WBMP_FILE: Status = Status::Error("#wbmp: unsupported WBMP file");

const CO_DECODE_IMAGE_CONFIG: u32 = 1;
const CO_DECODE_FRAME_CONFIG: u32 = 2;
const CO_DECODE_FRAME: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum HeaderStage {
    #[default]
    TypeField,
    FixHeader,
    Width,
    Height,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CallSeq {
    #[default]
    New,
    HaveImageConfig,
    HaveFrameConfig,
    EndOfData,
}

/// WBMP image decoder: one opaque grayscale frame.
pub struct WbmpDecoder {
    ctrl: Control,
    call: CallSeq,
    header_stage: HeaderStage,

    width: u32,
    height: u32,
    frame_io_position: u64,

    // 7-bit continuation accumulator.
    uintvar: u32,
    uintvar_n: u32,

    // Frame progress.
    cur_x: u32,
    cur_y: u32,
    dirty_rows: u32,

    swizzler: Swizzler,
    num_frame_configs: u64,
    num_frames: u64,
}

impl Default for WbmpDecoder {
    fn default() -> Self {
        Self {
            ctrl: Control::default(),
            call: CallSeq::New,
            header_stage: HeaderStage::TypeField,
            width: 0,
            height: 0,
            frame_io_position: 0,
            uintvar: 0,
            uintvar_n: 0,
            cur_x: 0,
            cur_y: 0,
            dirty_rows: 0,
            swizzler: Swizzler::new(),
            num_frame_configs: 0,
            num_frames: 0,
        }
    }
}

impl WbmpDecoder {
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

    /// One step of the 7-bit continuation integer. `Ok(Some(v))` when the
    /// terminating byte arrives.
    fn step_uintvar(&mut self, b: u8) -> Result<Option<u32>, Status> {
        // Five continuation bytes would exceed 32 bits.
        if self.uintvar_n >= 5 || (self.uintvar_n == 4 && self.uintvar > (u32::MAX >> 7)) {
            return Err(ERROR_BAD_HEADER);
        }
        if self.uintvar > (u32::MAX >> 7) {
            return Err(ERROR_BAD_HEADER);
        }
        self.uintvar = (self.uintvar << 7) | u32::from(b & 0x7F);
        self.uintvar_n += 1;
        if b & 0x80 == 0 {
            let v = self.uintvar;
            self.uintvar = 0;
            self.uintvar_n = 0;
            Ok(Some(v))
        } else {
            Ok(None)
        }
    }

    fn do_decode_image_config(
        &mut self,
        dst: &mut ImageConfig,
        src: &mut IoBuffer<'_>,
    ) -> Status {
        loop {
            if self.header_stage == HeaderStage::Done {
                break;
            }
            let Some(&b) = src.reader_slice().first() else {
                return Self::short_read(src);
            };
            src.consume(1);
            match self.header_stage {
                HeaderStage::TypeField => match self.step_uintvar(b) {
                    Err(e) => return e,
                    Ok(Some(0)) => self.header_stage = HeaderStage::FixHeader,
                    Ok(Some(_)) => return ERROR_UNSUPPORTED_WBMP_FILE,
                    Ok(None) => {}
                },
                HeaderStage::FixHeader => {
                    // Extension headers (high bit set) are not registered
                    // for type 0.
                    if b != 0 {
                        return ERROR_UNSUPPORTED_WBMP_FILE;
                    }
                    self.header_stage = HeaderStage::Width;
                }
                HeaderStage::Width => match self.step_uintvar(b) {
                    Err(e) => return e,
                    Ok(Some(0)) => return ERROR_BAD_HEADER,
                    Ok(Some(w)) => {
                        self.width = w;
                        self.header_stage = HeaderStage::Height;
                    }
                    Ok(None) => {}
                },
                HeaderStage::Height => match self.step_uintvar(b) {
                    Err(e) => return e,
                    Ok(Some(0)) => return ERROR_BAD_HEADER,
                    Ok(Some(h)) => {
                        self.height = h;
                        self.header_stage = HeaderStage::Done;
                    }
                    Ok(None) => {}
                },
                HeaderStage::Done => unreachable!(),
            }
        }
        self.frame_io_position = src.reader_position();
        dst.pixcfg.set(PIXEL_FORMAT_Y, self.width, self.height);
        dst.first_frame_io_position = self.frame_io_position;
        dst.first_frame_is_opaque = true;
        self.call = CallSeq::HaveImageConfig;
        log::debug!("wbmp: image config {}x{}", self.width, self.height);
        Status::Ok
    }

    fn do_decode_frame(
        &mut self,
        dst: &mut PixelBuffer<'_>,
        src: &mut IoBuffer<'_>,
        blend: PixelBlend,
        workbuf: &mut [u8],
    ) -> Status {
        if self.cur_y == 0 && self.cur_x == 0 {
            let status = self.swizzler.prepare(
                dst.config().format(),
                &mut [],
                PIXEL_FORMAT_Y,
                &[],
                blend,
            );
            if !status.is_ok() {
                return status;
            }
        }
        let row_len = self.width as usize;
        while self.cur_y < self.height {
            while self.cur_x < self.width {
                let Some(&b) = src.reader_slice().first() else {
                    return Self::short_read(src);
                };
                src.consume(1);
                let n = (self.width - self.cur_x).min(8);
                for i in 0..n {
                    workbuf[(self.cur_x + i) as usize] =
                        if b & (0x80 >> i) != 0 { 0xFF } else { 0x00 };
                }
                self.cur_x += n;
            }
            let dst_bpp = self.swizzler.dst_bytes_per_pixel();
            let y = self.cur_y;
            let row = dst.row(y);
            self.swizzler.swizzle(&mut row[..row_len * dst_bpp], &workbuf[..row_len]);
            self.cur_x = 0;
            self.cur_y += 1;
            self.dirty_rows = self.cur_y;
        }
        self.num_frames += 1;
        self.call = CallSeq::EndOfData;
        Status::Ok
    }
}

impl ImageDecoder for WbmpDecoder {
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

    fn decode_frame_config(&mut self, dst: &mut FrameConfig, src: &mut IoBuffer<'_>) -> Status {
        let status = self.ctrl.begin(CO_DECODE_FRAME_CONFIG);
        if !status.is_ok() {
            return status;
        }
        let status = match self.call {
            CallSeq::New => ERROR_BAD_CALL_SEQUENCE,
            CallSeq::EndOfData => NOTE_END_OF_DATA,
            CallSeq::HaveFrameConfig => ERROR_BAD_CALL_SEQUENCE,
            CallSeq::HaveImageConfig => {
                if src.reader_position() != self.frame_io_position {
                    ERROR_BAD_RESTART
                } else {
                    *dst = FrameConfig {
                        bounds: RectIEU32::new(0, 0, self.width, self.height),
                        duration: 0,
                        index: 0,
                        io_position: self.frame_io_position,
                        disposal: Disposal::None,
                        opaque_within_bounds: true,
                        overwrite_instead_of_blend: false,
                        background_color: 0xFF00_0000,
                    };
                    self.num_frame_configs = 1;
                    self.call = CallSeq::HaveFrameConfig;
                    Status::Ok
                }
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
        if self.call == CallSeq::New {
            return ERROR_BAD_CALL_SEQUENCE;
        }
        if index != 0 || io_position != self.frame_io_position {
            return ERROR_BAD_ARGUMENT;
        }
        self.call = CallSeq::HaveImageConfig;
        self.cur_x = 0;
        self.cur_y = 0;
        self.dirty_rows = 0;
        Status::Ok
    }

    fn frame_dirty_rect(&self) -> RectIEU32 {
        if self.dirty_rows == 0 {
            RectIEU32::default()
        } else {
            RectIEU32::new(0, 0, self.width, self.dirty_rows)
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
        _minfo: &mut MoreInformation,
        _src: &mut IoBuffer<'_>,
    ) -> Status {
        ERROR_NO_MORE_INFORMATION
    }

    fn set_report_metadata(&mut self, _fourcc: u32, _report: bool) -> Status {
        crate::status::ERROR_UNSUPPORTED_OPTION
    }

    fn workbuf_len(&self) -> RangeIIU64 {
        RangeIIU64::new(u64::from(self.width), u64::from(self.width))
    }

    fn set_quirk_enabled(&mut self, _quirk: u32, _enabled: bool) -> Status {
        if self.ctrl.configured_too_late() {
            return ERROR_BAD_CALL_SEQUENCE;
        }
        crate::status::ERROR_UNSUPPORTED_OPTION
    }
}
