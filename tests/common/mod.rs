//! Shared test utilities: hand encoders for DEFLATE and GIF-flavored LZW
//! (enough to fabricate known-good streams without any compression
//! library), a minimal GIF file builder, and chunk-feeding drivers that
//! exercise the suspension protocol.

#![allow(dead_code)]

use unravel::status::{SUSPENSION_SHORT_READ, SUSPENSION_SHORT_WRITE};
use unravel::{IoBuffer, IoTransformer, Status, Token, TokenBuffer, TokenDecoder};

// ─────────────────────────────────────────────────────────────────────────────
// Bit writer (DEFLATE bit order: bytes filled least significant bit first)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct BitWriter {
    pub bytes: Vec<u8>,
    bit: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `n` bits of `value`, least significant first.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        for i in 0..n {
            let b = (value >> i) & 1;
            if self.bit == 0 {
                self.bytes.push(0);
            }
            let last = self.bytes.len() - 1;
            self.bytes[last] |= (b as u8) << self.bit;
            self.bit = (self.bit + 1) & 7;
        }
    }

    /// Appends a Huffman code: most significant code bit first.
    pub fn write_code(&mut self, code: u32, n: u32) {
        for i in (0..n).rev() {
            self.write_bits((code >> i) & 1, 1);
        }
    }

    pub fn align(&mut self) {
        self.bit = 0;
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DEFLATE test encoder (stored and fixed-Huffman blocks)
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed-table literal/length code for `sym` as `(code, bits)`.
fn fixed_lit_len_code(sym: u32) -> (u32, u32) {
    match sym {
        0..=143 => (0x30 + sym, 8),
        144..=255 => (0x190 + sym - 144, 9),
        256..=279 => (sym - 256, 7),
        _ => (0xC0 + sym - 280, 8),
    }
}

/// `(symbol, base)` for a DEFLATE match length 3..=258.
fn length_symbol(len: u32) -> (u32, u32, u32) {
    const BASES: [u32; 29] = [
        3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99,
        115, 131, 163, 195, 227, 258,
    ];
    const EXTRAS: [u32; 29] = [
        0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
    ];
    for i in (0..29).rev() {
        if len >= BASES[i] && (i == 28 || len < BASES[i + 1]) {
            return (257 + i as u32, BASES[i], EXTRAS[i]);
        }
    }
    unreachable!()
}

fn distance_symbol(dist: u32) -> (u32, u32, u32) {
    const BASES: [u32; 30] = [
        1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025,
        1537, 2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
    ];
    const EXTRAS: [u32; 30] = [
        0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12,
        12, 13, 13,
    ];
    for i in (0..30).rev() {
        if dist >= BASES[i] {
            return (i as u32, BASES[i], EXTRAS[i]);
        }
    }
    unreachable!()
}

/// Encodes DEFLATE streams out of literals and matches, fixed-Huffman only.
pub struct DeflateEncoder {
    bw: BitWriter,
}

impl DeflateEncoder {
    pub fn new() -> Self {
        Self { bw: BitWriter::new() }
    }

    pub fn start_fixed_block(&mut self, bfinal: bool) {
        self.bw.write_bits(u32::from(bfinal), 1);
        self.bw.write_bits(1, 2);
    }

    pub fn literal(&mut self, b: u8) {
        let (code, n) = fixed_lit_len_code(u32::from(b));
        self.bw.write_code(code, n);
    }

    pub fn literals(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.literal(b);
        }
    }

    pub fn match_(&mut self, len: u32, dist: u32) {
        let (sym, base, extra) = length_symbol(len);
        let (code, n) = fixed_lit_len_code(sym);
        self.bw.write_code(code, n);
        self.bw.write_bits(len - base, extra);

        let (dsym, dbase, dextra) = distance_symbol(dist);
        self.bw.write_code(dsym, 5);
        self.bw.write_bits(dist - dbase, dextra);
    }

    pub fn end_block(&mut self) {
        let (code, n) = fixed_lit_len_code(256);
        self.bw.write_code(code, n);
    }

    pub fn finish(self) -> Vec<u8> {
        self.bw.finish()
    }
}

/// A whole stored block (bfinal optional) framed per RFC 1951 3.2.4.
pub fn stored_block(data: &[u8], bfinal: bool) -> Vec<u8> {
    assert!(data.len() <= 0xFFFF);
    let len = data.len() as u16;
    let mut out = vec![u8::from(bfinal)];
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&(!len).to_le_bytes());
    out.extend_from_slice(data);
    out
}

/// A complete fixed-Huffman literal-only stream for `data`.
pub fn fixed_literal_stream(data: &[u8]) -> Vec<u8> {
    let mut e = DeflateEncoder::new();
    e.start_fixed_block(true);
    e.literals(data);
    e.end_block();
    e.finish()
}

/// Wraps a raw DEFLATE stream in ZLIB framing.
pub fn zlib_wrap(deflate: &[u8], payload: &[u8]) -> Vec<u8> {
    use unravel::HasherU32;
    let mut out = vec![0x78, 0x9C];
    out.extend_from_slice(deflate);
    let mut h = unravel::Adler32::new();
    let digest = h.update_u32(payload);
    out.extend_from_slice(&digest.to_be_bytes());
    out
}

/// Wraps a raw DEFLATE stream in a minimal GZIP member.
pub fn gzip_wrap(deflate: &[u8], payload: &[u8]) -> Vec<u8> {
    use unravel::HasherU32;
    let mut out = vec![0x1F, 0x8B, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03];
    out.extend_from_slice(deflate);
    let mut h = unravel::Crc32::new();
    let digest = h.update_u32(payload);
    out.extend_from_slice(&digest.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// LZW test encoder (GIF flavor: LSB-first variable-width codes)
// ─────────────────────────────────────────────────────────────────────────────

/// Encodes `data` as a clear code, one literal code per byte, and an end
/// code, tracking the decoder's width-growth rule exactly.
pub fn lzw_encode_literals(literal_width: u32, data: &[u8]) -> Vec<u8> {
    let clear = 1u32 << literal_width;
    let end = clear + 1;
    let mut save = clear + 2;
    let mut width = literal_width + 1;
    let mut bw = BitWriter::new();

    bw.write_bits(clear, width);
    let mut has_prev = false;
    for &b in data {
        assert!(u32::from(b) < clear, "literal out of range for width");
        bw.write_bits(u32::from(b), width);
        if has_prev && save < 4096 {
            save += 1;
            if save == (1 << width) && width < 12 {
                width += 1;
            }
        }
        has_prev = true;
    }
    bw.write_bits(end, width);
    bw.finish()
}

/// Splits `data` into GIF sub-blocks followed by the block terminator.
pub fn gif_data_blocks(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(255) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out.push(0);
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// GIF file builder
// ─────────────────────────────────────────────────────────────────────────────

pub struct GifFrame {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub interlaced: bool,
    pub local_palette: Option<Vec<[u8; 3]>>,
    /// Palette indices, row major, in the frame's natural (non-interlaced)
    /// order; the builder reorders rows itself when `interlaced`.
    pub pixels: Vec<u8>,
    /// `(transparent_index, disposal, delay_centiseconds)`.
    pub graphic_control: Option<(Option<u8>, u8, u16)>,
}

impl GifFrame {
    pub fn simple(width: u16, height: u16, pixels: Vec<u8>) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
            interlaced: false,
            local_palette: None,
            pixels,
            graphic_control: None,
        }
    }
}

fn palette_size_field(entries: usize) -> u8 {
    // Field n encodes 2^(n+1) entries.
    let mut n = 0u8;
    while (2usize << n) < entries {
        n += 1;
    }
    n
}

pub struct GifBuilder {
    pub width: u16,
    pub height: u16,
    pub version_87a: bool,
    pub global_palette: Option<Vec<[u8; 3]>>,
    pub background_index: u8,
    pub loop_count: Option<u16>,
    pub frames: Vec<GifFrame>,
    /// `(application id, sub-block payloads)` emitted before the frames.
    pub application_blocks: Vec<([u8; 11], Vec<Vec<u8>>)>,
}

impl GifBuilder {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            version_87a: false,
            global_palette: None,
            background_index: 0,
            loop_count: None,
            frames: Vec::new(),
            application_blocks: Vec::new(),
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(if self.version_87a { b"GIF87a" } else { b"GIF89a" });
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        let mut flags = 0u8;
        if let Some(pal) = &self.global_palette {
            flags |= 0x80 | palette_size_field(pal.len());
        }
        out.push(flags);
        out.push(self.background_index);
        out.push(0); // aspect ratio

        if let Some(pal) = &self.global_palette {
            let n = 2usize << palette_size_field(pal.len());
            for i in 0..n {
                let rgb = pal.get(i).copied().unwrap_or([0, 0, 0]);
                out.extend_from_slice(&rgb);
            }
        }

        if let Some(loops) = self.loop_count {
            out.extend_from_slice(&[0x21, 0xFF, 11]);
            out.extend_from_slice(b"NETSCAPE2.0");
            out.extend_from_slice(&[3, 1]);
            out.extend_from_slice(&loops.to_le_bytes());
            out.push(0);
        }

        for (id, payloads) in &self.application_blocks {
            out.extend_from_slice(&[0x21, 0xFF, 11]);
            out.extend_from_slice(id);
            for p in payloads {
                assert!(p.len() <= 255);
                out.push(p.len() as u8);
                out.extend_from_slice(p);
            }
            out.push(0);
        }

        for f in &self.frames {
            if let Some((transparent, disposal, delay)) = &f.graphic_control {
                let mut gc_flags = (*disposal & 0x07) << 2;
                if transparent.is_some() {
                    gc_flags |= 0x01;
                }
                out.extend_from_slice(&[0x21, 0xF9, 4, gc_flags]);
                out.extend_from_slice(&delay.to_le_bytes());
                out.push(transparent.unwrap_or(0));
                out.push(0);
            }

            out.push(0x2C);
            out.extend_from_slice(&f.left.to_le_bytes());
            out.extend_from_slice(&f.top.to_le_bytes());
            out.extend_from_slice(&f.width.to_le_bytes());
            out.extend_from_slice(&f.height.to_le_bytes());
            let mut flags = 0u8;
            if f.interlaced {
                flags |= 0x40;
            }
            if let Some(pal) = &f.local_palette {
                flags |= 0x80 | palette_size_field(pal.len());
            }
            out.push(flags);

            if let Some(pal) = &f.local_palette {
                let n = 2usize << palette_size_field(pal.len());
                for i in 0..n {
                    let rgb = pal.get(i).copied().unwrap_or([0, 0, 0]);
                    out.extend_from_slice(&rgb);
                }
            }

            // Literal width: enough bits for the palette in use.
            let entries = f
                .local_palette
                .as_ref()
                .or(self.global_palette.as_ref())
                .map_or(2, Vec::len);
            let lw = u32::from(palette_size_field(entries)) + 1;
            let lw = lw.max(2);
            out.push(lw as u8);

            let ordered = if f.interlaced {
                interlace_rows(&f.pixels, f.width as usize, f.height as usize)
            } else {
                f.pixels.clone()
            };
            let lzw = lzw_encode_literals(lw, &ordered);
            out.extend_from_slice(&gif_data_blocks(&lzw));
        }

        out.push(0x3B);
        out
    }
}

/// Reorders progressive rows into GIF's four-pass interlace order.
pub fn interlace_rows(pixels: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len());
    let passes: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];
    for (start, delta) in passes {
        let mut y = start;
        while y < height {
            out.extend_from_slice(&pixels[y * width..(y + 1) * width]);
            y += delta;
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunk-feeding drivers
// ─────────────────────────────────────────────────────────────────────────────

/// Runs `input` through a transformer with the given source chunk size and
/// destination capacity, modeling a caller that appends and compacts.
pub fn transform_chunked(
    t: &mut dyn IoTransformer,
    input: &[u8],
    in_chunk: usize,
    out_cap: usize,
) -> Result<Vec<u8>, Status> {
    let mut out = Vec::new();
    let mut dst_bytes = vec![0u8; out_cap.max(1)];
    let mut workbuf = vec![0u8; t.workbuf_len().min_incl as usize];
    let mut pending: Vec<u8> = Vec::new();
    let mut fed = 0usize;

    loop {
        let closed = fed == input.len();
        let mut src = IoBuffer::reader(&mut pending, closed);
        let mut dst = IoBuffer::writer(&mut dst_bytes);
        let status = t.transform_io(&mut dst, &mut src, &mut workbuf);
        out.extend_from_slice(dst.reader_slice());
        let consumed = src.reader_index();
        drop(src);
        pending.drain(..consumed);

        match status {
            Status::Ok => return Ok(out),
            s if s == SUSPENSION_SHORT_WRITE => {}
            s if s == SUSPENSION_SHORT_READ => {
                assert!(fed < input.len(), "decoder wants more than the whole input");
                let end = (fed + in_chunk.max(1)).min(input.len());
                pending.extend_from_slice(&input[fed..end]);
                fed = end;
            }
            s => return Err(s),
        }
    }
}

/// One-shot convenience wrapper.
pub fn transform_all(t: &mut dyn IoTransformer, input: &[u8]) -> Result<Vec<u8>, Status> {
    transform_chunked(t, input, input.len().max(1), 1 << 20)
}

/// Tokenizes `input`, feeding source chunks of `in_chunk` bytes through a
/// bounded pending buffer and collecting every token.
pub fn tokenize_chunked(
    d: &mut dyn TokenDecoder,
    input: &[u8],
    in_chunk: usize,
    token_cap: usize,
) -> Result<Vec<Token>, Status> {
    let mut out = Vec::new();
    let mut tokens = vec![Token::default(); token_cap.max(1)];
    let mut workbuf = [0u8; 0];
    let mut pending: Vec<u8> = Vec::new();
    let mut fed = 0usize;

    loop {
        let closed = fed == input.len();
        let mut src = IoBuffer::reader(&mut pending, closed);
        let mut dst = TokenBuffer::writer(&mut tokens);
        let status = d.decode_tokens(&mut dst, &mut src, &mut workbuf);
        out.extend_from_slice(dst.reader_slice());
        let consumed = src.reader_index();
        drop(src);
        drop(dst);
        pending.drain(..consumed);

        match status {
            Status::Ok => return Ok(out),
            s if s == SUSPENSION_SHORT_WRITE => {}
            s if s == SUSPENSION_SHORT_READ => {
                if fed >= input.len() {
                    return Err(s);
                }
                let end = (fed + in_chunk.max(1)).min(input.len());
                pending.extend_from_slice(&input[fed..end]);
                fed = end;
            }
            s => return Err(s),
        }
    }
}

/// The sum of token lengths must tile the consumed source exactly.
pub fn token_lengths(tokens: &[Token]) -> usize {
    tokens.iter().map(|t| t.length()).sum()
}
