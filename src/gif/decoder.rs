//! The GIF frame state machine.
//!
//! `decode_image_config` parses the header, logical screen descriptor and
//! global palette. `decode_frame_config` walks the block stream (consuming
//! extensions) up to and including the next image descriptor.
//! `decode_frame` reads the optional local palette, then drives the LZW
//! decoder over sub-block-framed compressed data, assembling rows in the
//! caller's workbuf and swizzling each completed row into the destination
//! pixel buffer, honoring the four-pass interlace ordering.

use crate::buffer::{check_workbuf_len, IoBuffer};
use crate::geom::{RangeIEU64, RangeIIU64, RectIEU32};
use crate::lzw::LzwDecoder;
use crate::num::peek_u16le;
use crate::pixel::{PixelBuffer, PALETTE_LENGTH, PIXEL_FORMAT_INDEXED_BGRA_BINARY};
use crate::traits::IoTransformer;
use crate::status::{
    Control, Status, ERROR_BAD_ARGUMENT, ERROR_BAD_CALL_SEQUENCE, ERROR_BAD_RESTART,
    ERROR_NOT_ENOUGH_DATA, ERROR_NO_MORE_INFORMATION, ERROR_TOO_MUCH_DATA,
    INITIALIZE_ALREADY_ZEROED, NOTE_END_OF_DATA, NOTE_METADATA_REPORTED,
    SUSPENSION_EVEN_MORE_INFORMATION, SUSPENSION_MISPOSITIONED_READ, SUSPENSION_SHORT_READ,
    VERSION,
};
use crate::swizzle::Swizzler;
use crate::traits::{
    DecodeFrameOptions, Disposal, FrameConfig, ImageConfig, ImageDecoder, MoreInformation,
    PixelBlend, FOURCC_ICCP, FOURCC_XMP,
};

pub const ERROR_BAD_HEADER: Status = Status::Error("#gif: bad header");
pub const ERROR_BAD_EXTENSION: Status = Status::Error("#gif: bad extension");
pub const ERROR_BAD_FRAME_RECT: Status = Status::Error("#gif: bad frame rect");
pub const ERROR_BAD_LITERAL_WIDTH: Status = Status::Error("#gif: bad literal width");
pub const ERROR_BAD_PALETTE: Status = Status::Error("#gif: bad palette");
pub const ERROR_NOT_ENOUGH_PIXEL_DATA: Status = Status::Error("#gif: not enough pixel data");

pub const QUIRK_DELAY_NUM_DECODED_FRAMES: u32 = 1;
pub const QUIRK_FIRST_FRAME_LOCAL_PALETTE_MEANS_BLACK_BACKGROUND: u32 = 2;
pub const QUIRK_HONOR_BACKGROUND_COLOR: u32 = 3;
pub const QUIRK_IGNORE_TOO_MUCH_PIXEL_DATA: u32 = 4;
pub const QUIRK_IMAGE_BOUNDS_ARE_STRICT: u32 = 5;
pub const QUIRK_REJECT_EMPTY_FRAME: u32 = 6;
pub const QUIRK_REJECT_EMPTY_PALETTE: u32 = 7;
const QUIRK_COUNT: usize = 7;

const CO_DECODE_IMAGE_CONFIG: u32 = 1;
const CO_DECODE_FRAME_CONFIG: u32 = 2;
const CO_DECODE_FRAME: u32 = 3;
const CO_TELL_ME_MORE: u32 = 4;

const BLOCK_EXTENSION: u8 = 0x21;
const BLOCK_IMAGE: u8 = 0x2C;
const BLOCK_TRAILER: u8 = 0x3B;
const LABEL_GRAPHIC_CONTROL: u8 = 0xF9;
const LABEL_COMMENT: u8 = 0xFE;
const LABEL_APPLICATION: u8 = 0xFF;

const INTERLACE_START: [u32; 4] = [0, 4, 2, 1];
const INTERLACE_DELTA: [u32; 4] = [8, 8, 4, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CallSeq {
    #[default]
    New,
    HeaderDone,
    HaveImageConfig,
    HaveFrameConfig,
    EndOfData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ConfigStage {
    #[default]
    Header,
    ScreenDescriptor,
    GlobalPalette,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum WalkStage {
    #[default]
    BlockType,
    ExtensionLabel,
    GraphicControl,
    ApplicationLength,
    ApplicationId,
    NetscapeData,
    SkipSubBlocks,
    Descriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FrameStage {
    #[default]
    LocalPalette,
    LiteralWidth,
    Data,
    Residual,
    Complete,
}

/// GIF image decoder.
pub struct GifDecoder {
    ctrl: Control,
    call: CallSeq,
    quirks: [bool; QUIRK_COUNT],

    // Logical screen.
    config_stage: ConfigStage,
    width: u32,
    height: u32,
    has_global_palette: bool,
    global_palette_len: u32,
    global_palette: [u8; PALETTE_LENGTH],
    background_index: u8,
    first_frame_io_position: u64,

    // Scratch for fixed-size gathers.
    scratch: [u8; 16],
    scratch_n: usize,
    palette_have: usize,

    // Block walk.
    walk_stage: WalkStage,
    /// Stream position of the first block in the upcoming frame's group
    /// (its graphic control or other leading extensions), recorded so a
    /// restarted frame replays them.
    frame_group_pos: Option<u64>,
    skip_need_len: bool,
    skip_remaining: u32,
    restart_expect: Option<u64>,

    // Graphic-control accumulator for the upcoming frame.
    gc_has_transparency: bool,
    gc_transparent_index: u8,
    gc_disposal: Disposal,
    gc_duration_ms: u64,

    // Animation.
    num_loops: u32,
    seen_netscape: bool,

    // Metadata redirection.
    report_icc: bool,
    report_xmp: bool,
    metadata_pending: bool,
    metadata_fourcc: u32,
    metadata_chunk_pos: u64,

    // Current frame, fixed at decode_frame_config time.
    frame_rect: RectIEU32,
    frame_interlaced: bool,
    frame_has_local_palette: bool,
    frame_local_palette_len: u32,
    frame_transparent_index: Option<u8>,
    frame_is_first: bool,

    // Frame decode progress.
    frame_stage: FrameStage,
    frame_palette: [u8; PALETTE_LENGTH],
    lzw: LzwDecoder,
    swizzler: Swizzler,
    block_remaining: u32,
    row_fill: usize,
    interlace_pass: u8,
    frame_row: u32,
    rows_done: bool,
    saw_lzw_end: bool,
    dirty: RectIEU32,

    num_frame_configs: u64,
    num_frames: u64,
    frame_count_pending: bool,
}

impl Default for GifDecoder {
    fn default() -> Self {
        Self {
            ctrl: Control::default(),
            call: CallSeq::New,
            quirks: [false; QUIRK_COUNT],
            config_stage: ConfigStage::Header,
            width: 0,
            height: 0,
            has_global_palette: false,
            global_palette_len: 0,
            global_palette: [0; PALETTE_LENGTH],
            background_index: 0,
            first_frame_io_position: 0,
            scratch: [0; 16],
            scratch_n: 0,
            palette_have: 0,
            walk_stage: WalkStage::BlockType,
            frame_group_pos: None,
            skip_need_len: true,
            skip_remaining: 0,
            restart_expect: None,
            gc_has_transparency: false,
            gc_transparent_index: 0,
            gc_disposal: Disposal::None,
            gc_duration_ms: 0,
            num_loops: 1,
            seen_netscape: false,
            report_icc: false,
            report_xmp: false,
            metadata_pending: false,
            metadata_fourcc: 0,
            metadata_chunk_pos: 0,
            frame_rect: RectIEU32::default(),
            frame_interlaced: false,
            frame_has_local_palette: false,
            frame_local_palette_len: 0,
            frame_transparent_index: None,
            frame_is_first: true,
            frame_stage: FrameStage::LocalPalette,
            frame_palette: [0; PALETTE_LENGTH],
            lzw: LzwDecoder::default(),
            swizzler: Swizzler::new(),
            block_remaining: 0,
            row_fill: 0,
            interlace_pass: 0,
            frame_row: 0,
            rows_done: false,
            saw_lzw_end: false,
            dirty: RectIEU32::default(),
            num_frame_configs: 0,
            num_frames: 0,
            frame_count_pending: false,
        }
    }
}

impl GifDecoder {
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

    fn quirk(&self, q: u32) -> bool {
        self.quirks[(q - 1) as usize]
    }

    fn short_read(src: &IoBuffer<'_>) -> Status {
        if src.is_closed() {
            ERROR_NOT_ENOUGH_DATA
        } else {
            SUSPENSION_SHORT_READ
        }
    }

    fn gather(&mut self, src: &mut IoBuffer<'_>, want: usize) -> bool {
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

    /// Reads GIF's RGB palette entries into a BGRA palette, across
    /// suspensions. `dest` selects the global or frame palette.
    fn gather_palette(
        &mut self,
        src: &mut IoBuffer<'_>,
        entries: u32,
        into_global: bool,
    ) -> bool {
        let want = entries as usize * 3;
        while self.palette_have < want {
            let avail = src.reader_length();
            if avail == 0 {
                return false;
            }
            let n = (want - self.palette_have).min(avail);
            let data = src.reader_slice();
            for i in 0..n {
                let at = self.palette_have + i;
                let entry = at / 3;
                let chan = at % 3;
                // RGB on the wire, BGRA in the palette.
                let pal = if into_global {
                    &mut self.global_palette
                } else {
                    &mut self.frame_palette
                };
                pal[entry * 4 + (2 - chan)] = data[i];
                pal[entry * 4 + 3] = 0xFF;
            }
            src.consume(n);
            self.palette_have += n;
        }
        self.palette_have = 0;
        true
    }

    // ── Image config ─────────────────────────────────────────────────────────

    fn do_decode_image_config(
        &mut self,
        dst: &mut ImageConfig,
        src: &mut IoBuffer<'_>,
    ) -> Status {
        loop {
            match self.config_stage {
                ConfigStage::Header => {
                    if !self.gather(src, 6) {
                        return Self::short_read(src);
                    }
                    let ok87 = &self.scratch[..6] == b"GIF87a";
                    let ok89 = &self.scratch[..6] == b"GIF89a";
                    if !ok87 && !ok89 {
                        return ERROR_BAD_HEADER;
                    }
                    self.config_stage = ConfigStage::ScreenDescriptor;
                }
                ConfigStage::ScreenDescriptor => {
                    if !self.gather(src, 7) {
                        return Self::short_read(src);
                    }
                    self.width = u32::from(peek_u16le(&self.scratch[0..2]));
                    self.height = u32::from(peek_u16le(&self.scratch[2..4]));
                    let flags = self.scratch[4];
                    self.background_index = self.scratch[5];
                    self.has_global_palette = flags & 0x80 != 0;
                    self.global_palette_len = 2 << (flags & 0x07);
                    self.config_stage = ConfigStage::GlobalPalette;
                }
                ConfigStage::GlobalPalette => {
                    if self.has_global_palette {
                        let entries = self.global_palette_len;
                        if !self.gather_palette(src, entries, true) {
                            return Self::short_read(src);
                        }
                    }
                    break;
                }
            }
        }
        self.first_frame_io_position = src.reader_position();
        dst.pixcfg
            .set(PIXEL_FORMAT_INDEXED_BGRA_BINARY, self.width, self.height);
        dst.first_frame_io_position = self.first_frame_io_position;
        dst.first_frame_is_opaque = false;
        self.call = CallSeq::HeaderDone;
        log::debug!(
            "gif: image config {}x{}, global palette {}",
            self.width,
            self.height,
            if self.has_global_palette { self.global_palette_len } else { 0 }
        );
        Status::Ok
    }

    // ── Frame config (block walk) ────────────────────────────────────────────

    fn do_decode_frame_config(
        &mut self,
        dst: &mut FrameConfig,
        src: &mut IoBuffer<'_>,
    ) -> Status {
        if self.frame_count_pending {
            self.num_frames += 1;
            self.frame_count_pending = false;
        }
        if let Some(expect) = self.restart_expect.take() {
            if src.reader_position() != expect {
                return ERROR_BAD_RESTART;
            }
        }
        loop {
            match self.walk_stage {
                WalkStage::BlockType => {
                    if self.frame_group_pos.is_none() {
                        self.frame_group_pos = Some(src.reader_position());
                    }
                    let Some(&b) = src.reader_slice().first() else {
                        return Self::short_read(src);
                    };
                    src.consume(1);
                    match b {
                        BLOCK_EXTENSION => self.walk_stage = WalkStage::ExtensionLabel,
                        BLOCK_IMAGE => self.walk_stage = WalkStage::Descriptor,
                        BLOCK_TRAILER => {
                            self.call = CallSeq::EndOfData;
                            return NOTE_END_OF_DATA;
                        }
                        _ => return ERROR_BAD_EXTENSION,
                    }
                }

                WalkStage::ExtensionLabel => {
                    let Some(&label) = src.reader_slice().first() else {
                        return Self::short_read(src);
                    };
                    src.consume(1);
                    match label {
                        LABEL_GRAPHIC_CONTROL => self.walk_stage = WalkStage::GraphicControl,
                        LABEL_APPLICATION => self.walk_stage = WalkStage::ApplicationLength,
                        LABEL_COMMENT => {
                            self.skip_need_len = true;
                            self.walk_stage = WalkStage::SkipSubBlocks;
                        }
                        _ => {
                            self.skip_need_len = true;
                            self.walk_stage = WalkStage::SkipSubBlocks;
                        }
                    }
                }

                WalkStage::GraphicControl => {
                    // Block size (4), flags, delay x2, transparent index,
                    // terminator.
                    if !self.gather(src, 6) {
                        return Self::short_read(src);
                    }
                    if self.scratch[0] != 4 || self.scratch[5] != 0 {
                        return ERROR_BAD_EXTENSION;
                    }
                    let flags = self.scratch[1];
                    self.gc_has_transparency = flags & 0x01 != 0;
                    self.gc_transparent_index = self.scratch[4];
                    self.gc_disposal = match (flags >> 2) & 0x07 {
                        2 => Disposal::RestoreBackground,
                        // Disposal 4 is treated as "restore previous".
                        3 | 4 => Disposal::RestorePrevious,
                        _ => Disposal::None,
                    };
                    self.gc_duration_ms = u64::from(peek_u16le(&self.scratch[2..4])) * 10;
                    self.walk_stage = WalkStage::BlockType;
                }

                WalkStage::ApplicationLength => {
                    let Some(&len) = src.reader_slice().first() else {
                        return Self::short_read(src);
                    };
                    src.consume(1);
                    if len == 11 {
                        self.walk_stage = WalkStage::ApplicationId;
                    } else {
                        // An unrecognized application block; skip its
                        // identifier like any other sub-block.
                        self.skip_need_len = false;
                        self.skip_remaining = u32::from(len);
                        self.walk_stage = WalkStage::SkipSubBlocks;
                    }
                }

                WalkStage::ApplicationId => {
                    if !self.gather(src, 11) {
                        return Self::short_read(src);
                    }
                    let id = &self.scratch[..11];
                    if id == b"NETSCAPE2.0" {
                        self.walk_stage = WalkStage::NetscapeData;
                    } else if id == b"ICCRGBG1012" && self.report_icc {
                        self.metadata_pending = true;
                        self.metadata_fourcc = FOURCC_ICCP;
                        self.metadata_chunk_pos = src.reader_position();
                        self.skip_need_len = true;
                        self.walk_stage = WalkStage::SkipSubBlocks;
                        log::debug!("gif: reporting ICC profile metadata");
                        return NOTE_METADATA_REPORTED;
                    } else if id == b"XMP DataXMP" && self.report_xmp {
                        self.metadata_pending = true;
                        self.metadata_fourcc = FOURCC_XMP;
                        self.metadata_chunk_pos = src.reader_position();
                        self.skip_need_len = true;
                        self.walk_stage = WalkStage::SkipSubBlocks;
                        log::debug!("gif: reporting XMP metadata");
                        return NOTE_METADATA_REPORTED;
                    } else {
                        self.skip_need_len = true;
                        self.walk_stage = WalkStage::SkipSubBlocks;
                    }
                }

                WalkStage::NetscapeData => {
                    // Sub-block of 3: 0x01, loop count (u16le), terminator.
                    if !self.gather(src, 5) {
                        return Self::short_read(src);
                    }
                    if self.scratch[0] == 3 && self.scratch[1] == 1 && self.scratch[4] == 0 {
                        let n = u32::from(peek_u16le(&self.scratch[2..4]));
                        // Zero means loop forever.
                        self.num_loops = n;
                        self.seen_netscape = true;
                    }
                    self.walk_stage = WalkStage::BlockType;
                }

                WalkStage::SkipSubBlocks => {
                    loop {
                        if self.skip_need_len {
                            let Some(&len) = src.reader_slice().first() else {
                                return Self::short_read(src);
                            };
                            src.consume(1);
                            if len == 0 {
                                break;
                            }
                            self.skip_remaining = u32::from(len);
                            self.skip_need_len = false;
                        }
                        while self.skip_remaining > 0 {
                            let n = (self.skip_remaining as usize).min(src.reader_length());
                            if n == 0 {
                                return Self::short_read(src);
                            }
                            src.consume(n);
                            self.skip_remaining -= n as u32;
                        }
                        self.skip_need_len = true;
                    }
                    self.metadata_pending = false;
                    self.walk_stage = WalkStage::BlockType;
                }

                WalkStage::Descriptor => {
                    if !self.gather(src, 9) {
                        return Self::short_read(src);
                    }
                    let left = u32::from(peek_u16le(&self.scratch[0..2]));
                    let top = u32::from(peek_u16le(&self.scratch[2..4]));
                    let w = u32::from(peek_u16le(&self.scratch[4..6]));
                    let h = u32::from(peek_u16le(&self.scratch[6..8]));
                    let flags = self.scratch[8];
                    self.frame_rect = RectIEU32::new(left, top, left + w, top + h);
                    self.frame_has_local_palette = flags & 0x80 != 0;
                    self.frame_interlaced = flags & 0x40 != 0;
                    self.frame_local_palette_len = 2 << (flags & 0x07);

                    let image_rect = RectIEU32::new(0, 0, self.width, self.height);
                    if self.quirk(QUIRK_IMAGE_BOUNDS_ARE_STRICT)
                        && !image_rect.contains_rect(self.frame_rect)
                    {
                        return ERROR_BAD_FRAME_RECT;
                    }
                    if self.quirk(QUIRK_REJECT_EMPTY_FRAME) && self.frame_rect.is_empty() {
                        return ERROR_BAD_FRAME_RECT;
                    }

                    self.frame_transparent_index =
                        self.gc_has_transparency.then_some(self.gc_transparent_index);
                    let background_color = self.frame_background_color();

                    *dst = FrameConfig {
                        bounds: self.frame_rect,
                        duration: self.gc_duration_ms,
                        index: self.num_frame_configs,
                        io_position: self.frame_group_pos.take().unwrap_or_default(),
                        disposal: self.gc_disposal,
                        opaque_within_bounds: !self.gc_has_transparency,
                        overwrite_instead_of_blend: !self.gc_has_transparency,
                        background_color,
                    };
                    // The graphic control applies to exactly one frame.
                    self.gc_has_transparency = false;
                    self.gc_transparent_index = 0;
                    self.gc_disposal = Disposal::None;
                    self.gc_duration_ms = 0;

                    self.num_frame_configs += 1;
                    self.frame_stage = FrameStage::LocalPalette;
                    self.call = CallSeq::HaveFrameConfig;
                    self.walk_stage = WalkStage::BlockType;
                    return Status::Ok;
                }
            }
        }
    }

    fn frame_background_color(&self) -> u32 {
        if self.frame_is_first
            && self.frame_has_local_palette
            && self.quirk(QUIRK_FIRST_FRAME_LOCAL_PALETTE_MEANS_BLACK_BACKGROUND)
        {
            return 0xFF00_0000;
        }
        if self.quirk(QUIRK_HONOR_BACKGROUND_COLOR)
            && self.has_global_palette
            && !self.gc_has_transparency
        {
            let i = self.background_index as usize * 4;
            let (b, g, r) = (
                self.global_palette[i],
                self.global_palette[i + 1],
                self.global_palette[i + 2],
            );
            return 0xFF00_0000 | (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b);
        }
        0
    }

    // ── Frame decode ─────────────────────────────────────────────────────────

    fn frame_width(&self) -> usize {
        self.frame_rect.width() as usize
    }

    /// Picks the next frame-relative row per the interlace ordering. True
    /// while a row is current; false once the frame is complete.
    fn advance_row(&mut self) {
        let h = self.frame_rect.height();
        if !self.frame_interlaced {
            self.frame_row += 1;
            self.rows_done = self.frame_row >= h;
            return;
        }
        loop {
            self.frame_row += INTERLACE_DELTA[self.interlace_pass as usize];
            if self.frame_row < h {
                return;
            }
            if self.interlace_pass >= 3 {
                self.rows_done = true;
                return;
            }
            self.interlace_pass += 1;
            self.frame_row = INTERLACE_START[self.interlace_pass as usize];
        }
    }

    /// Writes the assembled row (palette indices in `row`) into `dst` at
    /// the current frame row, clipped to the destination bounds.
    fn emit_row(&mut self, dst: &mut PixelBuffer<'_>, row: &[u8]) {
        let y = self.frame_rect.min_incl_y + self.frame_row;
        let dst_w = dst.config().width();
        let dst_h = dst.config().height();
        if y >= dst_h || self.frame_rect.min_incl_x >= dst_w {
            return;
        }
        let x0 = self.frame_rect.min_incl_x as usize;
        let visible = (dst_w as usize - x0).min(row.len());
        let dst_bpp = self.swizzler.dst_bytes_per_pixel();
        let out = dst.row(y);
        self.swizzler
            .swizzle(&mut out[x0 * dst_bpp..(x0 + visible) * dst_bpp], &row[..visible]);
        self.dirty = self.dirty.unite(RectIEU32::new(
            self.frame_rect.min_incl_x,
            y,
            self.frame_rect.min_incl_x + visible as u32,
            y + 1,
        ));
    }

    fn do_decode_frame(
        &mut self,
        dst: &mut PixelBuffer<'_>,
        src: &mut IoBuffer<'_>,
        blend: PixelBlend,
        workbuf: &mut [u8],
    ) -> Status {
        loop {
            match self.frame_stage {
                FrameStage::LocalPalette => {
                    if self.frame_has_local_palette {
                        let entries = self.frame_local_palette_len;
                        if !self.gather_palette(src, entries, false) {
                            return Self::short_read(src);
                        }
                    } else if self.has_global_palette {
                        self.frame_palette = self.global_palette;
                    } else if self.quirk(QUIRK_REJECT_EMPTY_PALETTE) {
                        return ERROR_BAD_PALETTE;
                    } else {
                        self.frame_palette = [0; PALETTE_LENGTH];
                        for i in 0..256 {
                            self.frame_palette[4 * i + 3] = 0xFF;
                        }
                    }
                    if let Some(t) = self.frame_transparent_index {
                        let i = t as usize * 4;
                        self.frame_palette[i..i + 4].copy_from_slice(&[0, 0, 0, 0]);
                    }
                    let status = self.swizzler.prepare(
                        dst.config().format(),
                        dst.palette_mut(),
                        PIXEL_FORMAT_INDEXED_BGRA_BINARY,
                        &self.frame_palette,
                        blend,
                    );
                    if !status.is_ok() {
                        return status;
                    }
                    self.frame_stage = FrameStage::LiteralWidth;
                }

                FrameStage::LiteralWidth => {
                    let Some(&lw) = src.reader_slice().first() else {
                        return Self::short_read(src);
                    };
                    src.consume(1);
                    if !(2..=8).contains(&lw) {
                        return ERROR_BAD_LITERAL_WIDTH;
                    }
                    let status = self.lzw.initialize(
                        core::mem::size_of::<LzwDecoder>(),
                        VERSION,
                        0,
                    );
                    if !status.is_ok() {
                        return status;
                    }
                    let status = self.lzw.set_literal_width(u32::from(lw));
                    if !status.is_ok() {
                        return status;
                    }
                    self.block_remaining = 0;
                    self.row_fill = 0;
                    self.interlace_pass = 0;
                    self.frame_row = 0;
                    self.rows_done = self.frame_rect.height() == 0 || self.frame_width() == 0;
                    self.saw_lzw_end = false;
                    self.dirty = RectIEU32::default();
                    self.frame_stage = FrameStage::Data;
                }

                FrameStage::Data => {
                    let status = self.drive_lzw(dst, src, workbuf);
                    if !status.is_ok() {
                        return status;
                    }
                }

                FrameStage::Residual => {
                    // Consume remaining sub-blocks through the terminator.
                    loop {
                        if self.skip_need_len {
                            let Some(&len) = src.reader_slice().first() else {
                                return Self::short_read(src);
                            };
                            src.consume(1);
                            if len == 0 {
                                break;
                            }
                            if !self.quirk(QUIRK_IGNORE_TOO_MUCH_PIXEL_DATA)
                                && !self.saw_lzw_end
                            {
                                return ERROR_TOO_MUCH_DATA;
                            }
                            self.skip_remaining = u32::from(len);
                            self.skip_need_len = false;
                        }
                        while self.skip_remaining > 0 {
                            let n = (self.skip_remaining as usize).min(src.reader_length());
                            if n == 0 {
                                return Self::short_read(src);
                            }
                            src.consume(n);
                            self.skip_remaining -= n as u32;
                        }
                        self.skip_need_len = true;
                    }
                    self.frame_stage = FrameStage::Complete;
                }

                FrameStage::Complete => return self.finish_frame(),
            }
        }
    }

    fn finish_frame(&mut self) -> Status {
        if self.quirk(QUIRK_DELAY_NUM_DECODED_FRAMES) {
            self.frame_count_pending = true;
        } else {
            self.num_frames += 1;
        }
        self.frame_is_first = false;
        self.frame_stage = FrameStage::LocalPalette;
        self.call = CallSeq::HaveImageConfig;
        Status::Ok
    }

    /// Feeds sub-block bytes through the LZW decoder, assembling rows in
    /// the workbuf and emitting them as they complete. Returns ok when the
    /// frame stage has moved on (to Residual or Complete).
    fn drive_lzw(
        &mut self,
        dst: &mut PixelBuffer<'_>,
        src: &mut IoBuffer<'_>,
        workbuf: &mut [u8],
    ) -> Status {
        let frame_w = self.frame_width();
        loop {
            if self.block_remaining == 0 {
                let Some(&len) = src.reader_slice().first() else {
                    return Self::short_read(src);
                };
                src.consume(1);
                if len == 0 {
                    // Terminator: flush whatever the ring still holds.
                    let status = self.flush_lzw_tail(dst, workbuf);
                    if !status.is_ok() {
                        return status;
                    }
                    if !self.rows_done {
                        return ERROR_NOT_ENOUGH_PIXEL_DATA;
                    }
                    if !self.quirk(QUIRK_IGNORE_TOO_MUCH_PIXEL_DATA) && self.lzw_has_excess() {
                        return ERROR_TOO_MUCH_DATA;
                    }
                    self.frame_stage = FrameStage::Complete;
                    return Status::Ok;
                }
                self.block_remaining = u32::from(len);
            }

            let avail = src.reader_length().min(self.block_remaining as usize);
            if avail == 0 {
                return Self::short_read(src);
            }
            let mut chunk = [0u8; 255];
            let take = avail.min(255);
            chunk[..take].copy_from_slice(&src.reader_slice()[..take]);
            let mut lzw_src = IoBuffer::reader(&mut chunk[..take], false);

            let (status, produced, consumed);
            if !self.rows_done {
                let mut lzw_dst = IoBuffer::writer(&mut workbuf[self.row_fill..frame_w]);
                status = self.lzw.transform_io(&mut lzw_dst, &mut lzw_src, &mut []);
                produced = lzw_dst.writer_index();
                consumed = take - lzw_src.reader_length();
                src.consume(consumed);
                self.block_remaining -= consumed as u32;
                self.row_fill += produced;
                if self.row_fill >= frame_w {
                    self.emit_row(dst, &workbuf[..frame_w]);
                    self.row_fill = 0;
                    self.advance_row();
                }
            } else {
                // All rows are present; any further output is excess.
                let mut scrap = [0u8; 255];
                let mut lzw_dst = IoBuffer::writer(&mut scrap);
                status = self.lzw.transform_io(&mut lzw_dst, &mut lzw_src, &mut []);
                produced = lzw_dst.writer_index();
                consumed = take - lzw_src.reader_length();
                src.consume(consumed);
                self.block_remaining -= consumed as u32;
                if produced > 0 && !self.quirk(QUIRK_IGNORE_TOO_MUCH_PIXEL_DATA) {
                    return ERROR_TOO_MUCH_DATA;
                }
            }

            match status {
                Status::Ok => {
                    // The end code arrived. Anything the ring still held
                    // has been drained; skip the rest of this block plus
                    // any residual blocks.
                    self.saw_lzw_end = true;
                    if !self.rows_done {
                        return ERROR_NOT_ENOUGH_PIXEL_DATA;
                    }
                    self.skip_need_len = false;
                    self.skip_remaining = self.block_remaining;
                    self.block_remaining = 0;
                    self.frame_stage = FrameStage::Residual;
                    return Status::Ok;
                }
                Status::Suspension(_) => {
                    // Short read wants the next chunk; short write marked a
                    // row boundary. Either way, continue.
                }
                _ => return status,
            }
        }
    }

    /// True when the LZW decoder still has buffered output after the frame
    /// rectangle is full: pixels beyond the frame.
    fn lzw_has_excess(&mut self) -> bool {
        let mut scrap = [0u8; 8];
        let mut empty = [0u8; 0];
        let mut lzw_src = IoBuffer::reader(&mut empty, true);
        let mut lzw_dst = IoBuffer::writer(&mut scrap);
        let _ = self.lzw.transform_io(&mut lzw_dst, &mut lzw_src, &mut []);
        lzw_dst.writer_index() > 0
    }

    /// Drains whatever the LZW ring still buffers into remaining rows.
    fn flush_lzw_tail(&mut self, dst: &mut PixelBuffer<'_>, workbuf: &mut [u8]) -> Status {
        let frame_w = self.frame_width();
        loop {
            if self.rows_done {
                return Status::Ok;
            }
            let mut empty = [0u8; 0];
            let mut lzw_src = IoBuffer::reader(&mut empty, true);
            let mut lzw_dst = IoBuffer::writer(&mut workbuf[self.row_fill..frame_w]);
            let status = self.lzw.transform_io(&mut lzw_dst, &mut lzw_src, &mut []);
            let produced = lzw_dst.writer_index();
            self.row_fill += produced;
            if self.row_fill >= frame_w {
                self.emit_row(dst, &workbuf[..frame_w]);
                self.row_fill = 0;
                self.advance_row();
                continue;
            }
            match status {
                Status::Ok => {
                    self.saw_lzw_end = true;
                    return Status::Ok;
                }
                Status::Suspension(_) if produced > 0 => {}
                Status::Suspension(_) => {
                    // The inner source is closed and the row has space, so
                    // no suspension can be legal here.
                    return crate::status::ERROR_CANNOT_RETURN_A_SUSPENSION;
                }
                Status::Error(m) if m == crate::lzw::ERROR_TRUNCATED_INPUT.message() => {
                    // The stream ended without an explicit end code; accept
                    // that as long as all the pixels arrived.
                    return Status::Ok;
                }
                _ => return status,
            }
        }
    }
}

impl ImageDecoder for GifDecoder {
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
            CallSeq::HeaderDone | CallSeq::HaveImageConfig => {
                self.do_decode_frame_config(dst, src)
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
        if index > self.num_frame_configs {
            return ERROR_BAD_ARGUMENT;
        }
        self.call = CallSeq::HaveImageConfig;
        self.walk_stage = WalkStage::BlockType;
        self.frame_stage = FrameStage::LocalPalette;
        self.frame_group_pos = None;
        self.restart_expect = Some(io_position);
        self.num_frame_configs = index;
        self.gc_has_transparency = false;
        self.gc_transparent_index = 0;
        self.gc_disposal = Disposal::None;
        self.gc_duration_ms = 0;
        self.metadata_pending = false;
        Status::Ok
    }

    fn frame_dirty_rect(&self) -> RectIEU32 {
        self.dirty
    }

    fn num_animation_loops(&self) -> u32 {
        if !self.seen_netscape {
            return 1;
        }
        // The NETSCAPE count is "extra repeats"; zero means forever.
        if self.num_loops == 0 {
            0
        } else {
            self.num_loops.saturating_add(1)
        }
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
        src: &mut IoBuffer<'_>,
    ) -> Status {
        let status = self.ctrl.begin(CO_TELL_ME_MORE);
        if !status.is_ok() {
            return status;
        }
        let status = self.do_tell_me_more(minfo, src);
        self.ctrl.settle(CO_TELL_ME_MORE, status)
    }

    fn set_report_metadata(&mut self, fourcc: u32, report: bool) -> Status {
        match fourcc {
            FOURCC_ICCP => self.report_icc = report,
            FOURCC_XMP => self.report_xmp = report,
            _ => return crate::status::ERROR_UNSUPPORTED_OPTION,
        }
        Status::Ok
    }

    fn workbuf_len(&self) -> RangeIIU64 {
        let n = u64::from(self.width.max(self.frame_rect.width()));
        RangeIIU64::new(n, n)
    }

    fn set_quirk_enabled(&mut self, quirk: u32, enabled: bool) -> Status {
        if self.ctrl.configured_too_late() {
            return ERROR_BAD_CALL_SEQUENCE;
        }
        if (1..=QUIRK_COUNT as u32).contains(&quirk) {
            self.quirks[(quirk - 1) as usize] = enabled;
            Status::Ok
        } else {
            crate::status::ERROR_UNSUPPORTED_OPTION
        }
    }
}

impl GifDecoder {
    fn do_tell_me_more(
        &mut self,
        minfo: &mut MoreInformation,
        src: &mut IoBuffer<'_>,
    ) -> Status {
        if !self.metadata_pending {
            return ERROR_NO_MORE_INFORMATION;
        }
        if src.reader_position() != self.metadata_chunk_pos {
            *minfo = MoreInformation::io_seek(self.metadata_chunk_pos);
            return SUSPENSION_MISPOSITIONED_READ;
        }
        let Some(&len) = src.reader_slice().first() else {
            return if src.is_closed() { ERROR_NOT_ENOUGH_DATA } else { SUSPENSION_SHORT_READ };
        };
        src.consume(1);
        if len == 0 {
            self.metadata_pending = false;
            self.walk_stage = WalkStage::BlockType;
            return Status::Ok;
        }
        let start = src.reader_position();
        let end = start + u64::from(len);
        self.metadata_chunk_pos = end;
        *minfo = MoreInformation::metadata_raw_passthrough(
            self.metadata_fourcc,
            RangeIEU64::new(start, end),
        );
        SUSPENSION_EVEN_MORE_INFORMATION
    }
}
