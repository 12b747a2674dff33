//! E2E: JSON tokenization — token tiling, structure details, strings and
//! escapes, numbers, depth limits, quirks and chunked resumption.

mod common;

use common::{token_lengths, tokenize_chunked};
use unravel::buffer::{
    Token, TOKEN_CAT_FILLER, TOKEN_CAT_LITERAL, TOKEN_CAT_NUMBER, TOKEN_CAT_STRING,
    TOKEN_CAT_STRUCTURE, TOKEN_CAT_UNICODE_CODE_POINT, TOKEN_DETAIL_FILLER_PUNCTUATION,
    TOKEN_DETAIL_LITERAL_FALSE, TOKEN_DETAIL_LITERAL_NULL, TOKEN_DETAIL_LITERAL_TRUE,
    TOKEN_DETAIL_NUMBER_FLOATING_POINT, TOKEN_DETAIL_NUMBER_INTEGER_SIGNED,
    TOKEN_DETAIL_NUMBER_INTEGER_UNSIGNED, TOKEN_DETAIL_STRING_BACKSLASH_X,
    TOKEN_DETAIL_STRUCTURE_FROM_NONE, TOKEN_DETAIL_STRUCTURE_POP, TOKEN_DETAIL_STRUCTURE_PUSH,
    TOKEN_DETAIL_STRUCTURE_TO_DICT, TOKEN_DETAIL_STRUCTURE_TO_LIST,
};
use unravel::json::{
    ERROR_BAD_BACKSLASH_ESCAPE, ERROR_BAD_C0_CONTROL_CODE, ERROR_BAD_INPUT, ERROR_BAD_UTF_8,
    ERROR_UNSUPPORTED_NUMBER_LENGTH, ERROR_UNSUPPORTED_RECURSION_DEPTH,
    QUIRK_ALLOW_ASCII_CONTROL_CODES, QUIRK_ALLOW_BACKSLASH_X, QUIRK_ALLOW_COMMENT_BLOCK,
    QUIRK_ALLOW_COMMENT_LINE, QUIRK_ALLOW_EXTRA_COMMA, QUIRK_ALLOW_INF_NAN_NUMBERS,
    QUIRK_ALLOW_LEADING_UNICODE_BYTE_ORDER_MARK, QUIRK_EXPECT_TRAILING_NEW_LINE,
    QUIRK_REPLACE_INVALID_UNICODE,
};
use unravel::status::{SUSPENSION_SHORT_READ, SUSPENSION_SHORT_WRITE};
use unravel::{IoBuffer, JsonDecoder, Status, TokenBuffer, TokenDecoder};

fn tokenize(input: &[u8]) -> Result<Vec<Token>, Status> {
    let mut d = JsonDecoder::new();
    tokenize_chunked(&mut *d, input, input.len().max(1), 256)
}

fn tokenize_with(quirks: &[u32], input: &[u8]) -> Result<Vec<Token>, Status> {
    let mut d = JsonDecoder::new();
    for &q in quirks {
        assert!(d.set_quirk_enabled(q, true).is_ok());
    }
    tokenize_chunked(&mut *d, input, input.len().max(1), 256)
}

/// Non-filler tokens only.
fn significant(tokens: &[Token]) -> Vec<Token> {
    tokens.iter().copied().filter(|t| t.category() != TOKEN_CAT_FILLER).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// The S5 scenario and basic structure
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn array_of_numbers() {
    let input = b"[1, 2, 3]";
    let tokens = tokenize(input).unwrap();
    assert_eq!(token_lengths(&tokens), input.len(), "tokens tile the input");

    let kinds: Vec<(u32, usize)> =
        tokens.iter().map(|t| (t.category(), t.length())).collect();
    assert_eq!(
        kinds,
        vec![
            (TOKEN_CAT_STRUCTURE, 1), // [
            (TOKEN_CAT_NUMBER, 1),    // 1
            (TOKEN_CAT_FILLER, 1),    // ,
            (TOKEN_CAT_FILLER, 1),    // space
            (TOKEN_CAT_NUMBER, 1),    // 2
            (TOKEN_CAT_FILLER, 1),    // ,
            (TOKEN_CAT_FILLER, 1),    // space
            (TOKEN_CAT_NUMBER, 1),    // 3
            (TOKEN_CAT_STRUCTURE, 1), // ]
        ]
    );
    let open = tokens[0];
    assert!(open.detail() & TOKEN_DETAIL_STRUCTURE_PUSH != 0);
    assert!(open.detail() & TOKEN_DETAIL_STRUCTURE_FROM_NONE != 0);
    assert!(open.detail() & TOKEN_DETAIL_STRUCTURE_TO_LIST != 0);
    let close = tokens[8];
    assert!(close.detail() & TOKEN_DETAIL_STRUCTURE_POP != 0);
    // The commas are punctuation filler.
    assert_eq!(tokens[2].detail(), TOKEN_DETAIL_FILLER_PUNCTUATION);
}

#[test]
fn number_content_flags() {
    let t = significant(&tokenize(b"17").unwrap())[0];
    assert!(t.detail() & TOKEN_DETAIL_NUMBER_INTEGER_UNSIGNED != 0);
    assert!(t.detail() & TOKEN_DETAIL_NUMBER_INTEGER_SIGNED != 0);

    let t = significant(&tokenize(b"-17").unwrap())[0];
    assert!(t.detail() & TOKEN_DETAIL_NUMBER_INTEGER_UNSIGNED == 0);
    assert!(t.detail() & TOKEN_DETAIL_NUMBER_INTEGER_SIGNED != 0);

    let t = significant(&tokenize(b"1.75e2").unwrap())[0];
    assert!(t.detail() & TOKEN_DETAIL_NUMBER_FLOATING_POINT != 0);
    assert!(t.detail() & TOKEN_DETAIL_NUMBER_INTEGER_SIGNED == 0);
}

#[test]
fn literals() {
    let input = b"[true, false, null]";
    let sig = significant(&tokenize(input).unwrap());
    assert_eq!(sig[1].category(), TOKEN_CAT_LITERAL);
    assert_eq!(sig[1].detail(), TOKEN_DETAIL_LITERAL_TRUE);
    assert_eq!(sig[2].detail(), TOKEN_DETAIL_LITERAL_FALSE);
    assert_eq!(sig[3].detail(), TOKEN_DETAIL_LITERAL_NULL);
    assert_eq!(sig[1].length(), 4);
    assert_eq!(sig[2].length(), 5);
}

// ─────────────────────────────────────────────────────────────────────────────
// The S6 scenario: suspension mid-object, and a mismatched close
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn object_across_suspension() {
    let mut d = JsonDecoder::new();
    let mut tokens = [Token::default(); 8];
    let mut workbuf = [0u8; 0];

    let mut open = *b"{";
    let mut src = IoBuffer::reader(&mut open, false);
    let mut dst = TokenBuffer::writer(&mut tokens);
    assert_eq!(
        d.decode_tokens(&mut dst, &mut src, &mut workbuf),
        SUSPENSION_SHORT_READ
    );
    let push = dst.reader_slice()[0];
    assert_eq!(push.category(), TOKEN_CAT_STRUCTURE);
    assert!(push.detail() & TOKEN_DETAIL_STRUCTURE_TO_DICT != 0);

    let mut close = *b"}";
    let mut src = IoBuffer::reader(&mut close, false);
    let mut dst = TokenBuffer::writer(&mut tokens);
    assert_eq!(d.decode_tokens(&mut dst, &mut src, &mut workbuf), Status::Ok);
    let pop = dst.reader_slice()[0];
    assert!(pop.detail() & TOKEN_DETAIL_STRUCTURE_POP != 0);
}

#[test]
fn mismatched_close_rejected() {
    assert_eq!(tokenize(b"{]").unwrap_err(), ERROR_BAD_INPUT);
    assert_eq!(tokenize(b"[}").unwrap_err(), ERROR_BAD_INPUT);
    assert_eq!(tokenize(b"{,}").unwrap_err(), ERROR_BAD_INPUT);
    assert_eq!(tokenize(b"[1,]").unwrap_err(), ERROR_BAD_INPUT);
}

// ─────────────────────────────────────────────────────────────────────────────
// Strings
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn string_token_chain() {
    let input = br#""hello \n world""#;
    let tokens = tokenize(input).unwrap();
    assert_eq!(token_lengths(&tokens), input.len());

    // Opening quote, plain run, escape code point, plain run, close quote.
    assert_eq!(tokens[0].category(), TOKEN_CAT_STRING);
    assert!(tokens[0].continued());
    assert_eq!(tokens[1].category(), TOKEN_CAT_STRING);
    assert_eq!(tokens[1].length(), 6); // "hello "
    assert_eq!(tokens[2].category(), TOKEN_CAT_UNICODE_CODE_POINT);
    assert_eq!(tokens[2].detail(), 0x0A);
    assert_eq!(tokens[2].length(), 2);
    let last = *tokens.last().unwrap();
    assert!(!last.continued(), "the closing quote ends the chain");
}

#[test]
fn surrogate_pair_escape() {
    let input = br#""\uD83D\uDE00""#;
    let tokens = tokenize(input).unwrap();
    let cp = tokens[1];
    assert_eq!(cp.category(), TOKEN_CAT_UNICODE_CODE_POINT);
    assert_eq!(cp.detail(), 0x1F600);
    assert_eq!(cp.length(), 12, "both escapes decode as one code point");
}

#[test]
fn lone_surrogate_rejected_or_replaced() {
    let input = br#""\uD83D xyz""#;
    assert_eq!(tokenize(input).unwrap_err(), ERROR_BAD_BACKSLASH_ESCAPE);

    let tokens = tokenize_with(&[QUIRK_REPLACE_INVALID_UNICODE], input).unwrap();
    let cp = tokens[1];
    assert_eq!(cp.category(), TOKEN_CAT_UNICODE_CODE_POINT);
    assert_eq!(cp.detail(), 0xFFFD);
    assert_eq!(cp.length(), 6);
}

#[test]
fn utf8_in_strings() {
    let input = "\"caf\u{e9} \u{1F600}\"".as_bytes().to_vec();
    let tokens = tokenize(&input).unwrap();
    assert_eq!(token_lengths(&tokens), input.len());

    // Invalid UTF-8 is an error without the replacement quirk.
    let bad = b"\"ab\x80cd\"";
    assert_eq!(tokenize(bad).unwrap_err(), ERROR_BAD_UTF_8);
    let tokens = tokenize_with(&[QUIRK_REPLACE_INVALID_UNICODE], bad).unwrap();
    assert!(tokens
        .iter()
        .any(|t| t.category() == TOKEN_CAT_UNICODE_CODE_POINT && t.detail() == 0xFFFD));
}

#[test]
fn control_codes_in_strings() {
    let input = b"\"a\x01b\"";
    assert_eq!(tokenize(input).unwrap_err(), ERROR_BAD_C0_CONTROL_CODE);
    assert!(tokenize_with(&[QUIRK_ALLOW_ASCII_CONTROL_CODES], input).is_ok());
}

#[test]
fn backslash_x_packs_runs() {
    let input = br#""\x41\x42\x43""#;
    assert_eq!(tokenize(input).unwrap_err(), ERROR_BAD_BACKSLASH_ESCAPE);

    let tokens = tokenize_with(&[QUIRK_ALLOW_BACKSLASH_X], input).unwrap();
    let packed = tokens[1];
    assert_eq!(packed.category(), TOKEN_CAT_STRING);
    assert_eq!(packed.detail(), TOKEN_DETAIL_STRING_BACKSLASH_X);
    assert_eq!(packed.length(), 12, "three escapes pack into one token");
}

// ─────────────────────────────────────────────────────────────────────────────
// Depth and number limits
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn recursion_depth_limit() {
    let ok: Vec<u8> = {
        let mut v = vec![b'['; 1024];
        v.extend(vec![b']'; 1024]);
        v
    };
    assert!(tokenize(&ok).is_ok());

    let too_deep = vec![b'['; 1025];
    assert_eq!(tokenize(&too_deep).unwrap_err(), ERROR_UNSUPPORTED_RECURSION_DEPTH);
}

#[test]
fn number_length_cap() {
    let mut v = b"1".to_vec();
    v.extend(vec![b'0'; 98]);
    assert!(tokenize(&v).is_ok(), "99 digits are accepted");

    let mut v = b"1".to_vec();
    v.extend(vec![b'0'; 99]);
    assert_eq!(tokenize(&v).unwrap_err(), ERROR_UNSUPPORTED_NUMBER_LENGTH);
}

// ─────────────────────────────────────────────────────────────────────────────
// Quirks
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn comments_quirk() {
    let input = b"[1, /* two */ 2] // done";
    assert_eq!(tokenize(input).unwrap_err(), ERROR_BAD_INPUT);

    let tokens = tokenize_with(
        &[QUIRK_ALLOW_COMMENT_BLOCK, QUIRK_ALLOW_COMMENT_LINE],
        input,
    )
    .unwrap();
    let sig = significant(&tokens);
    assert_eq!(sig.len(), 4); // [ 1 2 ]
}

#[test]
fn extra_comma_quirk() {
    assert!(tokenize_with(&[QUIRK_ALLOW_EXTRA_COMMA], b"[1,]").is_ok());
    assert!(tokenize_with(&[QUIRK_ALLOW_EXTRA_COMMA], b"{\"k\":1,}").is_ok());
}

#[test]
fn inf_nan_quirk() {
    assert_eq!(tokenize(b"[Infinity]").unwrap_err(), ERROR_BAD_INPUT);
    let tokens = tokenize_with(&[QUIRK_ALLOW_INF_NAN_NUMBERS], b"[Infinity, -Infinity, NaN]")
        .unwrap();
    let sig = significant(&tokens);
    assert_eq!(sig[1].category(), TOKEN_CAT_NUMBER);
    assert_eq!(sig[1].length(), 8);
    assert_eq!(sig[2].length(), 9);
    assert_eq!(sig[3].length(), 3);
}

#[test]
fn leading_bom_quirk() {
    let mut input = vec![0xEF, 0xBB, 0xBF];
    input.extend_from_slice(b"[]");
    assert!(tokenize(&input).is_err());
    assert!(tokenize_with(&[QUIRK_ALLOW_LEADING_UNICODE_BYTE_ORDER_MARK], &input).is_ok());
}

#[test]
fn trailing_newline_quirk() {
    let mut d = JsonDecoder::new();
    assert!(d.set_quirk_enabled(QUIRK_EXPECT_TRAILING_NEW_LINE, true).is_ok());
    let got = tokenize_chunked(&mut *d, b"[]\n", 64, 64).unwrap();
    assert_eq!(token_lengths(&got), 3);

    // Without the newline, a closed source is an error.
    let mut d = JsonDecoder::new();
    assert!(d.set_quirk_enabled(QUIRK_EXPECT_TRAILING_NEW_LINE, true).is_ok());
    assert_eq!(
        tokenize_chunked(&mut *d, b"[]", 64, 64).unwrap_err(),
        ERROR_BAD_INPUT
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// String reconstruction
// ─────────────────────────────────────────────────────────────────────────────

/// Re-encoding the token stream of a string value reproduces the decoded
/// text: COPY tokens take their source bytes verbatim, code-point tokens
/// re-encode as UTF-8, DROP tokens contribute nothing.
#[test]
fn string_tokens_reconstruct_text() {
    let input = "\"caf\u{e9} \\u00e9 \\n tail \u{1F600}\"".as_bytes().to_vec();
    let tokens = tokenize(&input).unwrap();
    assert_eq!(token_lengths(&tokens), input.len());

    let mut source_at = 0usize;
    let mut rebuilt = Vec::new();
    for t in &tokens {
        match t.category() {
            TOKEN_CAT_STRING if t.detail() == unravel::buffer::TOKEN_DETAIL_STRING_COPY => {
                rebuilt.extend_from_slice(&input[source_at..source_at + t.length()]);
            }
            TOKEN_CAT_UNICODE_CODE_POINT => {
                let mut buf = [0u8; 4];
                let n = unravel::text::encode_utf8(t.detail(), &mut buf);
                rebuilt.extend_from_slice(&buf[..n]);
            }
            _ => {}
        }
        source_at += t.length();
    }
    assert_eq!(rebuilt, "caf\u{e9} \u{e9} \n tail \u{1F600}".as_bytes());
}

// ─────────────────────────────────────────────────────────────────────────────
// Resumability
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn chunked_matches_oneshot() {
    let input = br#"{"alpha": [1, 2.5, -3e2], "beta": {"s": "x\tyAz", "t": [true, false, null]}, "gamma": "plain"}"#;
    let want = tokenize(input).unwrap();
    assert_eq!(token_lengths(&want), input.len());

    for chunk in [1, 2, 3, 7, 13] {
        let mut d = JsonDecoder::new();
        let got = tokenize_chunked(&mut *d, input, chunk, 2).unwrap();
        assert_eq!(got, want, "chunk size {chunk} diverged");
    }
}

#[test]
fn short_write_suspends() {
    let mut d = JsonDecoder::new();
    let mut input = *b"[1,2]";
    let mut src = IoBuffer::reader(&mut input, true);
    let mut tokens = [Token::default(); 1];
    let mut dst = TokenBuffer::writer(&mut tokens);
    let mut workbuf = [0u8; 0];
    assert_eq!(
        d.decode_tokens(&mut dst, &mut src, &mut workbuf),
        SUSPENSION_SHORT_WRITE
    );
    assert_eq!(dst.reader_length(), 1);
}
