//! E2E: the universal receiver contract across every decoder — bounded
//! I/O on hostile input, the initialize handshake, disable-on-error, and
//! trait-object dispatch.

mod common;

use unravel::status::{ERROR_BAD_WORKBUF_LENGTH, NOTE_I_O_REDIRECT};
use unravel::{
    BmpDecoder, DecodeFrameOptions, DeflateDecoder, FrameConfig, GifDecoder, GzipDecoder,
    HasherU32, ImageConfig, ImageDecoder, IoBuffer, IoTransformer, LzwDecoder, PixelBlend,
    PixelBuffer, Status, Token, TokenBuffer, TokenDecoder, WbmpDecoder, ZlibDecoder,
};

/// Deterministic pseudo-random bytes for hostile-input sweeps.
fn noise(seed: u32, n: usize) -> Vec<u8> {
    let mut state = seed | 1;
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 16) as u8
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Bounded I/O under hostile input
// ─────────────────────────────────────────────────────────────────────────────

/// Every transformer must consume and produce only within bounds and
/// terminate (ok or error) on arbitrary bytes, for any chunking.
#[test]
fn transformers_survive_noise() {
    for seed in 1..40u32 {
        let input = noise(seed, 4096);
        let transformers: Vec<Box<dyn IoTransformer>> = vec![
            DeflateDecoder::new(),
            ZlibDecoder::new(),
            GzipDecoder::new(),
            LzwDecoder::new(),
        ];
        for mut t in transformers {
            let workbuf_len = t.workbuf_len().min_incl as usize;
            let mut workbuf = vec![0u8; workbuf_len];
            let mut src_all = input.clone();
            let mut src = IoBuffer::reader(&mut src_all, true);
            let mut dst_bytes = vec![0u8; 1024];
            let mut steps = 0;
            loop {
                let mut dst = IoBuffer::writer(&mut dst_bytes);
                let status = t.transform_io(&mut dst, &mut src, &mut workbuf);
                assert!(dst.reader_length() <= 1024);
                match status {
                    Status::Ok | Status::Note(_) | Status::Error(_) => break,
                    Status::Suspension(_) => {
                        steps += 1;
                        // A closed source with a drained destination must
                        // not suspend forever. LZW can legitimately expand
                        // noise by a large factor, so the bound is loose.
                        assert!(steps < 200_000, "livelock on noise seed {seed}");
                    }
                }
            }
        }
    }
}

#[test]
fn image_decoders_survive_noise() {
    for seed in 1..40u32 {
        let input = noise(seed, 2048);
        let decoders: Vec<Box<dyn ImageDecoder>> =
            vec![GifDecoder::new(), BmpDecoder::new(), WbmpDecoder::new()];
        for mut d in decoders {
            let mut bytes = input.clone();
            let mut src = IoBuffer::reader(&mut bytes, true);
            let mut cfg = ImageConfig::default();
            let status = d.decode_image_config(&mut cfg, &mut src);
            if !status.is_ok() && status != NOTE_I_O_REDIRECT {
                continue;
            }
            // If noise happened to parse as a header, keep going; nothing
            // may panic or index out of bounds.
            let mut fc = FrameConfig::default();
            let status = d.decode_frame_config(&mut fc, &mut src);
            if !status.is_ok() {
                continue;
            }
            let len = cfg.pixcfg.pixbuf_len().min(1 << 24);
            let mut canvas = vec![0u8; len];
            let mut workbuf = vec![0u8; (d.workbuf_len().max_incl as usize).min(1 << 24)];
            if let Ok(mut pixbuf) = PixelBuffer::new(cfg.pixcfg, &mut canvas) {
                let _ = d.decode_frame(
                    &mut pixbuf,
                    &mut src,
                    PixelBlend::Src,
                    &mut workbuf,
                    &DecodeFrameOptions::default(),
                );
            }
        }
    }
}

#[test]
fn json_survives_noise() {
    for seed in 1..60u32 {
        let input = noise(seed, 1024);
        let mut d = unravel::JsonDecoder::new();
        let mut bytes = input.clone();
        let mut src = IoBuffer::reader(&mut bytes, true);
        let mut tokens = [Token::default(); 64];
        let mut workbuf = [0u8; 0];
        loop {
            let mut dst = TokenBuffer::writer(&mut tokens);
            match d.decode_tokens(&mut dst, &mut src, &mut workbuf) {
                Status::Suspension(m) if m == "$short write" => {}
                _ => break,
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Workbuf bounds
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn short_workbuf_rejected_uniformly() {
    // Transformers that advertise a nonzero minimum.
    let mut src_bytes = [0u8; 4];
    let mut dst_bytes = [0u8; 4];

    let mut d = DeflateDecoder::new();
    let mut src = IoBuffer::reader(&mut src_bytes, false);
    let mut dst = IoBuffer::writer(&mut dst_bytes);
    assert_eq!(d.transform_io(&mut dst, &mut src, &mut []), ERROR_BAD_WORKBUF_LENGTH);

    let mut g = GzipDecoder::new();
    let mut src = IoBuffer::reader(&mut src_bytes, false);
    let mut dst = IoBuffer::writer(&mut dst_bytes);
    assert_eq!(g.transform_io(&mut dst, &mut src, &mut []), ERROR_BAD_WORKBUF_LENGTH);
}

// ─────────────────────────────────────────────────────────────────────────────
// Hashers as capability objects
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn hashers_through_trait_objects() {
    let hashers: Vec<(Box<dyn HasherU32>, u32)> = vec![
        (Box::new(unravel::Adler32::new()), 0x00FB_00B2),
        (Box::new(unravel::Crc32::new()), 0xF7D1_8982),
    ];
    for (mut h, want) in hashers {
        assert_eq!(h.update_u32(b"Hi"), want);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Zero-length buffers
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn zero_length_buffers_are_legal() {
    // An empty, open source and an empty destination simply suspend.
    let mut d = DeflateDecoder::new();
    let mut none_in = [0u8; 0];
    let mut none_out = [0u8; 0];
    let mut workbuf = [0u8; 1];
    let mut src = IoBuffer::reader(&mut none_in, false);
    let mut dst = IoBuffer::writer(&mut none_out);
    let status = d.transform_io(&mut dst, &mut src, &mut workbuf);
    assert!(status.is_suspension(), "got {status}");
}
