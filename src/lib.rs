//! Streaming decoders for DEFLATE, ZLIB, GZIP, LZW, GIF, BMP, WBMP and
//! JSON, plus the Adler-32 and CRC-32/IEEE rolling hashes.
//!
//! Every decoder shares one execution discipline:
//!
//! - **Coroutines over caller-owned buffers.** No decoder performs I/O.
//!   Each step call consumes a caller-provided [`IoBuffer`] and produces
//!   into another; when either runs dry mid-decode it returns a suspension
//!   [`Status`] and resumes on the next call, byte-identical to an
//!   unsuspended run.
//! - **No heap allocation at decode time.** Huffman tables, LZW
//!   dictionaries, palettes and token stacks all live inside the receiver
//!   structs or caller-provided work buffers.
//! - **Hostile-input robustness.** Every length and index is checked;
//!   malformed input yields a typed error status, never an out-of-bounds
//!   access.
//! - **Capability traits.** [`HasherU32`], [`IoTransformer`],
//!   [`ImageDecoder`] and [`TokenDecoder`] let callers drive any concrete
//!   decoder uniformly.
//!
//! ```
//! use unravel::{GzipDecoder, IoBuffer, IoTransformer, Status};
//!
//! // A GZIP stream whose payload is the two bytes "Hi".
//! let mut src_bytes: Vec<u8> = vec![
//!     0x1F, 0x8B, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0xF3,
//!     0xC8, 0x04, 0x00, 0x82, 0x89, 0xD1, 0xF7, 0x02, 0x00, 0x00, 0x00,
//! ];
//! let mut dst_bytes = [0u8; 16];
//! let mut workbuf = [0u8; 1];
//!
//! let mut decoder = GzipDecoder::new();
//! let mut src = IoBuffer::reader(&mut src_bytes, true);
//! let mut dst = IoBuffer::writer(&mut dst_bytes);
//! assert_eq!(decoder.transform_io(&mut dst, &mut src, &mut workbuf), Status::Ok);
//! assert_eq!(dst.reader_slice(), b"Hi");
//! ```

#![allow(clippy::needless_return, clippy::similar_names, clippy::manual_range_contains)]
#![warn(clippy::correctness, clippy::perf)]

pub mod bmp;
pub mod buffer;
pub mod checksum;
pub mod deflate;
pub mod float;
pub mod geom;
pub mod gif;
pub mod gzip;
pub mod json;
pub mod lzw;
pub mod num;
pub mod pixel;
pub mod status;
pub mod swizzle;
pub mod text;
pub mod traits;
pub mod wbmp;
pub mod zlib;

// ── Primary re-exports ────────────────────────────────────────────────────────

pub use buffer::{IoBuffer, Match7, Token, TokenBuffer};
pub use checksum::{Adler32, Crc32};
pub use geom::{RangeIEU64, RangeIIU64, RectIEU32};
pub use pixel::{PixelBuffer, PixelConfig, PixelFormat};
pub use status::{Status, VERSION, VERSION_MAJOR, VERSION_MINOR};
pub use swizzle::Swizzler;
pub use traits::{
    DecodeFrameOptions, Disposal, FrameConfig, HasherU32, ImageConfig, ImageDecoder,
    IoTransformer, MoreInformation, PixelBlend, TokenDecoder,
};

pub use bmp::BmpDecoder;
pub use deflate::DeflateDecoder;
pub use gif::GifDecoder;
pub use gzip::GzipDecoder;
pub use json::JsonDecoder;
pub use lzw::LzwDecoder;
pub use wbmp::WbmpDecoder;
pub use zlib::ZlibDecoder;
