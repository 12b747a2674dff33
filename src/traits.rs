//! Capability interfaces: the four trait contracts that let callers treat
//! "any hasher", "any byte transformer", "any image decoder" or "any token
//! decoder" uniformly, plus the plain-data types their methods exchange.
//!
//! All four are object safe; the CLI drives `Box<dyn ImageDecoder>` chosen
//! by sniffing magic bytes.

use crate::buffer::{IoBuffer, TokenBuffer};
use crate::geom::{RangeIEU64, RangeIIU64, RectIEU32};
use crate::pixel::{PixelBuffer, PixelConfig};
use crate::status::Status;

// ─────────────────────────────────────────────────────────────────────────────
// FourCC tags
// ─────────────────────────────────────────────────────────────────────────────

pub const FOURCC_ICCP: u32 = u32::from_be_bytes(*b"ICCP");
pub const FOURCC_XMP: u32 = u32::from_be_bytes(*b"XMP ");
pub const FOURCC_JPEG: u32 = u32::from_be_bytes(*b"JPEG");
pub const FOURCC_PNG: u32 = u32::from_be_bytes(*b"PNG ");
pub const FOURCC_GIF: u32 = u32::from_be_bytes(*b"GIF ");
pub const FOURCC_BMP: u32 = u32::from_be_bytes(*b"BMP ");
pub const FOURCC_WBMP: u32 = u32::from_be_bytes(*b"WBMP");

// ─────────────────────────────────────────────────────────────────────────────
// Image metadata types
// ─────────────────────────────────────────────────────────────────────────────

/// What `decode_image_config` fills in: the stream's natural pixel config,
/// where frame configs begin, and whether the first frame is known opaque.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageConfig {
    pub pixcfg: PixelConfig,
    pub first_frame_io_position: u64,
    pub first_frame_is_opaque: bool,
}

/// How a frame's rectangle interacts with what is already on the canvas
/// once the next frame replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposal {
    #[default]
    None,
    RestoreBackground,
    RestorePrevious,
}

/// What `decode_frame_config` fills in, per frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameConfig {
    pub bounds: RectIEU32,
    /// Display duration in milliseconds.
    pub duration: u64,
    pub index: u64,
    /// Stream position to pass to `restart_frame` to re-decode this frame.
    pub io_position: u64,
    pub disposal: Disposal,
    pub opaque_within_bounds: bool,
    /// When true the frame overwrites the canvas rather than blending.
    pub overwrite_instead_of_blend: bool,
    /// 0xAARRGGBB, premultiplied.
    pub background_color: u32,
}

/// Blend mode for `decode_frame` and the pixel swizzler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelBlend {
    #[default]
    Src,
    SrcOver,
}

/// Per-call options for `decode_frame`. Currently empty; a struct rather
/// than nothing so the signature can grow without breaking callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeFrameOptions {}

// ─────────────────────────────────────────────────────────────────────────────
// MoreInformation
// ─────────────────────────────────────────────────────────────────────────────

/// `tell_me_more` asked the caller to seek the source to `pos`.
pub const MORE_INFORMATION_FLAVOR_IO_SEEK: u32 = 1;
/// The stream's payload is really another format: `fourcc` plus `range`.
pub const MORE_INFORMATION_FLAVOR_IO_REDIRECT: u32 = 2;
/// Raw metadata passthrough: the caller reads `range` from the source.
pub const MORE_INFORMATION_FLAVOR_METADATA_RAW_PASSTHROUGH: u32 = 3;

/// The out-parameter of `tell_me_more`: a flavor tag, a FourCC naming what
/// kind of data is being reported, and a byte range (or seek target) in the
/// original stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoreInformation {
    pub flavor: u32,
    pub fourcc: u32,
    pub range: RangeIEU64,
    /// Seek target for [`MORE_INFORMATION_FLAVOR_IO_SEEK`].
    pub pos: u64,
}

impl MoreInformation {
    pub(crate) fn io_seek(pos: u64) -> Self {
        Self { flavor: MORE_INFORMATION_FLAVOR_IO_SEEK, pos, ..Self::default() }
    }

    pub(crate) fn io_redirect(fourcc: u32, range: RangeIEU64) -> Self {
        Self { flavor: MORE_INFORMATION_FLAVOR_IO_REDIRECT, fourcc, range, ..Self::default() }
    }

    pub(crate) fn metadata_raw_passthrough(fourcc: u32, range: RangeIEU64) -> Self {
        Self {
            flavor: MORE_INFORMATION_FLAVOR_METADATA_RAW_PASSTHROUGH,
            fourcc,
            range,
            ..Self::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability traits
// ─────────────────────────────────────────────────────────────────────────────

/// A rolling 32-bit hash.
pub trait HasherU32 {
    /// Folds `x` into the hash and returns the new accumulated digest.
    fn update_u32(&mut self, x: &[u8]) -> u32;

    fn set_quirk_enabled(&mut self, quirk: u32, enabled: bool) -> Status;
}

/// A bytes-to-bytes streaming transformer (DEFLATE, LZW, ZLIB, GZIP).
pub trait IoTransformer {
    /// Advances the decode: consumes from `src`, produces into `dst`.
    /// Suspends with `$short read` / `$short write` when a buffer runs dry.
    fn transform_io(
        &mut self,
        dst: &mut IoBuffer<'_>,
        src: &mut IoBuffer<'_>,
        workbuf: &mut [u8],
    ) -> Status;

    /// `[min, max]` byte length of the workbuf `transform_io` needs.
    fn workbuf_len(&self) -> RangeIIU64;

    fn set_quirk_enabled(&mut self, quirk: u32, enabled: bool) -> Status;
}

/// A bytes-to-pixels streaming decoder (GIF, BMP, WBMP).
pub trait ImageDecoder {
    fn decode_image_config(&mut self, dst: &mut ImageConfig, src: &mut IoBuffer<'_>) -> Status;

    fn decode_frame_config(&mut self, dst: &mut FrameConfig, src: &mut IoBuffer<'_>) -> Status;

    fn decode_frame(
        &mut self,
        dst: &mut PixelBuffer<'_>,
        src: &mut IoBuffer<'_>,
        blend: PixelBlend,
        workbuf: &mut [u8],
        opts: &DecodeFrameOptions,
    ) -> Status;

    /// Prepares to re-decode frame `index`, whose frame config began at
    /// stream offset `io_position`. The caller must reposition the source.
    fn restart_frame(&mut self, index: u64, io_position: u64) -> Status;

    /// The bounding rectangle of pixels touched by the latest
    /// `decode_frame` call (or by all of them, for cumulative decoders).
    fn frame_dirty_rect(&self) -> RectIEU32;

    /// 0 means loop forever; N means play N times.
    fn num_animation_loops(&self) -> u32;

    fn num_decoded_frame_configs(&self) -> u64;

    fn num_decoded_frames(&self) -> u64;

    /// Drives the metadata-redirection protocol after `@metadata reported`
    /// or `@I/O redirect`: each call fills `minfo` with one chunk and
    /// returns `$even more information`, or ok when the sequence is done.
    fn tell_me_more(
        &mut self,
        dst: &mut IoBuffer<'_>,
        minfo: &mut MoreInformation,
        src: &mut IoBuffer<'_>,
    ) -> Status;

    /// Opts in (or out) of reporting metadata with the given FourCC.
    fn set_report_metadata(&mut self, fourcc: u32, report: bool) -> Status;

    fn workbuf_len(&self) -> RangeIIU64;

    fn set_quirk_enabled(&mut self, quirk: u32, enabled: bool) -> Status;
}

/// A bytes-to-tokens streaming decoder (JSON).
pub trait TokenDecoder {
    fn decode_tokens(
        &mut self,
        dst: &mut TokenBuffer<'_>,
        src: &mut IoBuffer<'_>,
        workbuf: &mut [u8],
    ) -> Status;

    fn workbuf_len(&self) -> RangeIIU64;

    fn set_quirk_enabled(&mut self, quirk: u32, enabled: bool) -> Status;
}
