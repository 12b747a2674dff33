//! E2E: raw DEFLATE decoding — stored, fixed and dynamic blocks, LZ77
//! matches, chunked resumption and malformed-input rejection.

mod common;

use common::{fixed_literal_stream, stored_block, transform_all, transform_chunked, BitWriter,
    DeflateEncoder};
use unravel::deflate::{
    ERROR_BAD_BLOCK_TYPE, ERROR_BAD_DISTANCE, ERROR_INCONSISTENT_STORED_BLOCK_LENGTH,
    ERROR_OVER_SUBSCRIBED,
};
use unravel::status::ERROR_BAD_WORKBUF_LENGTH;
use unravel::{DeflateDecoder, IoBuffer, IoTransformer, Status};

/// Pseudo-random but deterministic bytes.
fn test_bytes(n: usize) -> Vec<u8> {
    let mut state = 0x2F6E_2B1Du32;
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Empty and minimal streams
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn empty_fixed_block() {
    // bfinal=1, btype=fixed, then the end-of-block code: "03 00".
    let mut d = DeflateDecoder::new();
    let got = transform_all(&mut *d, &[0x03, 0x00]).unwrap();
    assert!(got.is_empty());
}

#[test]
fn empty_stored_block() {
    let mut d = DeflateDecoder::new();
    let got = transform_all(&mut *d, &stored_block(b"", true)).unwrap();
    assert!(got.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Round trips
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn stored_round_trip() {
    let data = test_bytes(1000);
    let mut d = DeflateDecoder::new();
    let got = transform_all(&mut *d, &stored_block(&data, true)).unwrap();
    assert_eq!(got, data);
}

#[test]
fn multiple_stored_blocks() {
    let a = test_bytes(300);
    let b = test_bytes(77);
    let mut stream = stored_block(&a, false);
    stream.extend_from_slice(&stored_block(&b, true));
    let mut d = DeflateDecoder::new();
    let got = transform_all(&mut *d, &stream).unwrap();
    let mut want = a;
    want.extend_from_slice(&b);
    assert_eq!(got, want);
}

#[test]
fn fixed_literals_round_trip() {
    let data = test_bytes(4096);
    let mut d = DeflateDecoder::new();
    let got = transform_all(&mut *d, &fixed_literal_stream(&data)).unwrap();
    assert_eq!(got, data);
}

#[test]
fn matches_round_trip() {
    // "abc" then (len 6, dist 3) twice gives "abc" * 5.
    let mut e = DeflateEncoder::new();
    e.start_fixed_block(true);
    e.literals(b"abc");
    e.match_(6, 3);
    e.match_(6, 3);
    e.end_block();
    let mut d = DeflateDecoder::new();
    let got = transform_all(&mut *d, &e.finish()).unwrap();
    assert_eq!(got, b"abcabcabcabcabc");
}

#[test]
fn overlapping_match_replicates() {
    let mut e = DeflateEncoder::new();
    e.start_fixed_block(true);
    e.literal(b'x');
    e.match_(10, 1);
    e.end_block();
    let mut d = DeflateDecoder::new();
    let got = transform_all(&mut *d, &e.finish()).unwrap();
    assert_eq!(got, b"xxxxxxxxxxx");
}

#[test]
fn maximal_match_length() {
    let mut e = DeflateEncoder::new();
    e.start_fixed_block(true);
    e.literals(b"ab");
    e.match_(258, 2);
    e.end_block();
    let mut d = DeflateDecoder::new();
    let got = transform_all(&mut *d, &e.finish()).unwrap();
    assert_eq!(got.len(), 260);
    for (i, &b) in got.iter().enumerate() {
        assert_eq!(b, if i % 2 == 0 { b'a' } else { b'b' });
    }
}

#[test]
fn far_match_round_trip() {
    // A match reaching the full window back.
    let prefix = test_bytes(32 * 1024);
    let mut e = DeflateEncoder::new();
    e.start_fixed_block(true);
    e.literals(&prefix);
    e.match_(200, 32 * 1024);
    e.end_block();
    let mut d = DeflateDecoder::new();
    let got = transform_all(&mut *d, &e.finish()).unwrap();
    assert_eq!(&got[..32 * 1024], &prefix[..]);
    assert_eq!(&got[32 * 1024..], &prefix[..200]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Resumability: any partition decodes identically
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn chunked_resumption_matches_oneshot() {
    let data = test_bytes(2000);
    let mut e = DeflateEncoder::new();
    e.start_fixed_block(false);
    e.literals(&data[..700]);
    e.match_(258, 100);
    e.end_block();
    let stream_tail = stored_block(&data[700..], true);
    let mut stream = e.finish();
    stream.extend_from_slice(&stream_tail);

    let mut d = DeflateDecoder::new();
    let want = transform_all(&mut *d, &stream).unwrap();

    for (in_chunk, out_cap) in [(1, 1), (1, 1 << 20), (7, 13), (97, 31), (1 << 20, 1)] {
        let mut d = DeflateDecoder::new();
        let got = transform_chunked(&mut *d, &stream, in_chunk, out_cap).unwrap();
        assert_eq!(got, want, "partition {in_chunk}/{out_cap} diverged");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dynamic Huffman blocks
// ─────────────────────────────────────────────────────────────────────────────

/// Builds a dynamic-Huffman block for "aab": literal alphabet {a: 1 bit,
/// b: 2 bits, 256: 2 bits}, one distance code (unused).
#[test]
fn dynamic_block_hand_crafted() {
    let mut bw = BitWriter::new();
    bw.write_bits(1, 1); // bfinal
    bw.write_bits(2, 2); // btype = dynamic

    // hlit = 257 (a..=256 used); hdist = 1; hclen = 19.
    bw.write_bits(0, 5);
    bw.write_bits(0, 5);
    bw.write_bits(15, 4);

    // Code-length-code lengths, in the order 16 17 18 0 8 7 9 6 10 5 11 4
    // 12 3 13 2 14 1 15. We use: symbols 18, 0, 1 and 2, each 2 bits.
    let mut clcl = [0u32; 19];
    clcl[2] = 2; // order slot for symbol 18
    clcl[3] = 2; // symbol 0
    clcl[17] = 2; // symbol 1
    clcl[15] = 2; // symbol 2
    for v in clcl {
        bw.write_bits(v, 3);
    }
    // Canonical 2-bit codes, by symbol: 0 -> 00, 1 -> 01, 2 -> 10, 18 -> 11.
    let code_for = |sym: u32| -> u32 {
        match sym {
            0 => 0b00,
            1 => 0b01,
            2 => 0b10,
            _ => 0b11, // 18
        }
    };

    // Literal/length lengths: 'a' (97) gets 1, 'b' (98) gets 2, 256 gets 2.
    let mut emit_cl = |bw: &mut BitWriter, sym: u32, extra: u32, extra_bits: u32| {
        bw.write_code(code_for(sym), 2);
        bw.write_bits(extra, extra_bits);
    };
    // Symbol 18 repeats zero for 11..=138 occurrences.
    emit_cl(&mut bw, 18, 97 - 11, 7); // 97 zeros for symbols 0..=96
    emit_cl(&mut bw, 1, 0, 0); // 'a': length 1
    emit_cl(&mut bw, 2, 0, 0); // 'b': length 2
    // 157 zeros for symbols 99..=255, split across the 138-repeat cap.
    emit_cl(&mut bw, 18, 138 - 11, 7);
    emit_cl(&mut bw, 18, 19 - 11, 7);
    emit_cl(&mut bw, 2, 0, 0); // 256: length 2
    // One distance code of length 1.
    emit_cl(&mut bw, 1, 0, 0);

    // Literal codes (canonical): 'a' = 0 (1 bit), 'b' = 10 (2 bits),
    // 256 = 11 (2 bits).
    bw.write_code(0b0, 1); // a
    bw.write_code(0b0, 1); // a
    bw.write_code(0b10, 2); // b
    bw.write_code(0b11, 2); // end of block

    let mut d = DeflateDecoder::new();
    let got = transform_all(&mut *d, &bw.finish()).unwrap();
    assert_eq!(got, b"aab");
}

// ─────────────────────────────────────────────────────────────────────────────
// Malformed input
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn stored_length_parity_rejected() {
    // len and nlen must be complements.
    let stream = [0x01, 0x05, 0x00, 0x05, 0x00];
    let mut d = DeflateDecoder::new();
    assert_eq!(
        transform_all(&mut *d, &stream).unwrap_err(),
        ERROR_INCONSISTENT_STORED_BLOCK_LENGTH
    );
}

#[test]
fn reserved_block_type_rejected() {
    // bfinal=1, btype=3.
    let mut bw = BitWriter::new();
    bw.write_bits(1, 1);
    bw.write_bits(3, 2);
    bw.write_bits(0, 5);
    let mut d = DeflateDecoder::new();
    assert_eq!(transform_all(&mut *d, &bw.finish()).unwrap_err(), ERROR_BAD_BLOCK_TYPE);
}

#[test]
fn over_subscribed_code_lengths_rejected() {
    let mut bw = BitWriter::new();
    bw.write_bits(1, 1);
    bw.write_bits(2, 2);
    bw.write_bits(0, 5);
    bw.write_bits(0, 5);
    bw.write_bits(15, 4);
    // Give every code-length symbol length 1: wildly over-subscribed.
    for _ in 0..19 {
        bw.write_bits(1, 3);
    }
    let mut d = DeflateDecoder::new();
    assert_eq!(transform_all(&mut *d, &bw.finish()).unwrap_err(), ERROR_OVER_SUBSCRIBED);
}

#[test]
fn distance_before_start_rejected() {
    // A match whose distance exceeds everything decoded so far.
    let mut e = DeflateEncoder::new();
    e.start_fixed_block(true);
    e.literal(b'x');
    e.match_(3, 5);
    e.end_block();
    let mut d = DeflateDecoder::new();
    assert_eq!(transform_all(&mut *d, &e.finish()).unwrap_err(), ERROR_BAD_DISTANCE);
}

#[test]
fn truncated_input_rejected() {
    let stream = fixed_literal_stream(b"hello");
    let truncated = &stream[..stream.len() - 2];
    let mut d = DeflateDecoder::new();
    let err = transform_all(&mut *d, truncated).unwrap_err();
    assert!(err.is_error(), "got {err}");
}

// ─────────────────────────────────────────────────────────────────────────────
// Receiver discipline
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn workbuf_bound_enforced() {
    let mut d = DeflateDecoder::new();
    let mut src_bytes = [0x03u8, 0x00];
    let mut dst_bytes = [0u8; 8];
    let mut src = IoBuffer::reader(&mut src_bytes, true);
    let mut dst = IoBuffer::writer(&mut dst_bytes);
    // The advertised minimum workbuf length is one byte.
    assert_eq!(
        d.transform_io(&mut dst, &mut src, &mut []),
        ERROR_BAD_WORKBUF_LENGTH
    );
}

#[test]
fn error_poisons_receiver() {
    let mut d = DeflateDecoder::new();
    let stream = [0x01, 0x05, 0x00, 0x05, 0x00];
    assert!(transform_all(&mut *d, &stream).is_err());

    let mut src_bytes = [0x03u8, 0x00];
    let mut dst_bytes = [0u8; 8];
    let mut workbuf = [0u8; 1];
    let mut src = IoBuffer::reader(&mut src_bytes, true);
    let mut dst = IoBuffer::writer(&mut dst_bytes);
    assert_eq!(
        d.transform_io(&mut dst, &mut src, &mut workbuf),
        unravel::status::ERROR_DISABLED_BY_PREVIOUS_ERROR
    );
}

#[test]
fn initialize_handshake() {
    let mut d = DeflateDecoder::new();
    assert_eq!(
        d.initialize(1, unravel::VERSION, 0),
        unravel::status::ERROR_BAD_SIZEOF_RECEIVER
    );
    assert_eq!(
        d.initialize(core::mem::size_of::<DeflateDecoder>(), 99 << 16, 0),
        unravel::status::ERROR_BAD_VERSION
    );
    assert_eq!(
        d.initialize(core::mem::size_of::<DeflateDecoder>(), unravel::VERSION, 0),
        Status::Ok
    );
}
