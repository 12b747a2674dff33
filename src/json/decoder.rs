//! The JSON tokenizer state machine.
//!
//! Nesting is a 1024-level bit stack (one bit per level: list or dict). A
//! small "expect" bitmask names which lexical classes may appear next.
//! Each `decode_tokens` iteration emits at most one token, so a suspension
//! never strands half a lexeme: multi-byte lexemes (escapes, keywords,
//! numbers) are only consumed once they are wholly present, which is why a
//! source buffer of at least 100 bytes guarantees progress.

use crate::buffer::{
    IoBuffer, Match7, Token, TokenBuffer, TOKEN_CAT_FILLER, TOKEN_CAT_LITERAL, TOKEN_CAT_NUMBER,
    TOKEN_CAT_STRING, TOKEN_CAT_STRUCTURE, TOKEN_CAT_UNICODE_CODE_POINT,
    TOKEN_DETAIL_FILLER_COMMENT_BLOCK, TOKEN_DETAIL_FILLER_COMMENT_LINE,
    TOKEN_DETAIL_FILLER_PUNCTUATION, TOKEN_DETAIL_LITERAL_FALSE, TOKEN_DETAIL_LITERAL_NULL,
    TOKEN_DETAIL_LITERAL_TRUE, TOKEN_DETAIL_NUMBER_FLOATING_POINT,
    TOKEN_DETAIL_NUMBER_INTEGER_SIGNED, TOKEN_DETAIL_NUMBER_INTEGER_UNSIGNED,
    TOKEN_DETAIL_NUMBER_NAN, TOKEN_DETAIL_NUMBER_NEG_INF, TOKEN_DETAIL_NUMBER_POS_INF,
    TOKEN_DETAIL_STRING_BACKSLASH_X, TOKEN_DETAIL_STRING_COPY, TOKEN_DETAIL_STRING_DROP,
    TOKEN_DETAIL_STRUCTURE_FROM_DICT, TOKEN_DETAIL_STRUCTURE_FROM_LIST,
    TOKEN_DETAIL_STRUCTURE_FROM_NONE, TOKEN_DETAIL_STRUCTURE_POP,
    TOKEN_DETAIL_STRUCTURE_PUSH, TOKEN_DETAIL_STRUCTURE_TO_DICT,
    TOKEN_DETAIL_STRUCTURE_TO_LIST, TOKEN_DETAIL_STRUCTURE_TO_NONE, TOKEN_LENGTH_MAX,
};
use crate::geom::RangeIIU64;
use crate::status::{
    Control, Status, ERROR_BAD_CALL_SEQUENCE, INITIALIZE_ALREADY_ZEROED, SUSPENSION_SHORT_READ,
    SUSPENSION_SHORT_WRITE, VERSION,
};
use crate::text::{decode_utf8, hex_digit, REPLACEMENT_CODE_POINT};
use crate::traits::TokenDecoder;

pub const ERROR_BAD_INPUT: Status = Status::Error("#json: bad input");
pub const ERROR_BAD_BACKSLASH_ESCAPE: Status = Status::Error("#json: bad backslash escape");
pub const ERROR_BAD_C0_CONTROL_CODE: Status = Status::Error("#json: bad C0 control code");
pub const ERROR_BAD_UTF_8: Status = Status::Error("#json: bad UTF-8");
pub const ERROR_UNSUPPORTED_NUMBER_LENGTH: Status =
    Status::Error("#json: unsupported number length");
pub const ERROR_UNSUPPORTED_RECURSION_DEPTH: Status =
    Status::Error("#json: unsupported recursion depth");

pub const QUIRK_ALLOW_ASCII_CONTROL_CODES: u32 = 1;
pub const QUIRK_ALLOW_BACKSLASH_A: u32 = 2;
pub const QUIRK_ALLOW_BACKSLASH_CAPITAL_U: u32 = 3;
pub const QUIRK_ALLOW_BACKSLASH_E: u32 = 4;
pub const QUIRK_ALLOW_BACKSLASH_NEW_LINE: u32 = 5;
pub const QUIRK_ALLOW_BACKSLASH_QUESTION_MARK: u32 = 6;
pub const QUIRK_ALLOW_BACKSLASH_SINGLE_QUOTE: u32 = 7;
pub const QUIRK_ALLOW_BACKSLASH_V: u32 = 8;
pub const QUIRK_ALLOW_BACKSLASH_X: u32 = 9;
pub const QUIRK_ALLOW_BACKSLASH_ZERO: u32 = 10;
pub const QUIRK_ALLOW_COMMENT_BLOCK: u32 = 11;
pub const QUIRK_ALLOW_COMMENT_LINE: u32 = 12;
pub const QUIRK_ALLOW_EXTRA_COMMA: u32 = 13;
pub const QUIRK_ALLOW_INF_NAN_NUMBERS: u32 = 14;
pub const QUIRK_ALLOW_LEADING_ASCII_RECORD_SEPARATOR: u32 = 15;
pub const QUIRK_ALLOW_LEADING_UNICODE_BYTE_ORDER_MARK: u32 = 16;
pub const QUIRK_EXPECT_TRAILING_NEW_LINE: u32 = 17;
pub const QUIRK_REPLACE_INVALID_UNICODE: u32 = 18;
const QUIRK_COUNT: usize = 18;

/// Maximum number literal length in bytes.
const MAX_NUMBER_LENGTH: usize = 99;

/// Maximum nesting depth.
const MAX_DEPTH: u32 = 1024;

const CO_DECODE_TOKENS: u32 = 1;

// Expect bitmask.
const X_VALUE: u32 = 1 << 0;
const X_STRING: u32 = 1 << 1; // a dict key
const X_COMMA: u32 = 1 << 2;
const X_COLON: u32 = 1 << 3;
const X_CLOSE_BRACE: u32 = 1 << 4;
const X_CLOSE_BRACKET: u32 = 1 << 5;
const X_END: u32 = 1 << 6;

// ─────────────────────────────────────────────────────────────────────────────
// Character class lookup tables
// ─────────────────────────────────────────────────────────────────────────────

const C_INVALID: u8 = 0;
const C_WHITESPACE: u8 = 1;
const C_STRING: u8 = 2;
const C_COMMA: u8 = 3;
const C_COLON: u8 = 4;
const C_NUMBER: u8 = 5;
const C_OPEN_BRACE: u8 = 6;
const C_CLOSE_BRACE: u8 = 7;
const C_OPEN_BRACKET: u8 = 8;
const C_CLOSE_BRACKET: u8 = 9;
const C_LITERAL_F: u8 = 10;
const C_LITERAL_T: u8 = 11;
const C_LITERAL_N: u8 = 12;
const C_COMMENT: u8 = 13;
const C_INF: u8 = 14;
const C_NAN: u8 = 15;

const fn make_classes() -> [u8; 256] {
    let mut t = [C_INVALID; 256];
    t[b' ' as usize] = C_WHITESPACE;
    t[b'\t' as usize] = C_WHITESPACE;
    t[b'\n' as usize] = C_WHITESPACE;
    t[b'\r' as usize] = C_WHITESPACE;
    t[b'"' as usize] = C_STRING;
    t[b',' as usize] = C_COMMA;
    t[b':' as usize] = C_COLON;
    t[b'-' as usize] = C_NUMBER;
    let mut d = b'0';
    while d <= b'9' {
        t[d as usize] = C_NUMBER;
        d += 1;
    }
    t[b'{' as usize] = C_OPEN_BRACE;
    t[b'}' as usize] = C_CLOSE_BRACE;
    t[b'[' as usize] = C_OPEN_BRACKET;
    t[b']' as usize] = C_CLOSE_BRACKET;
    t[b'f' as usize] = C_LITERAL_F;
    t[b't' as usize] = C_LITERAL_T;
    t[b'n' as usize] = C_LITERAL_N;
    t[b'/' as usize] = C_COMMENT;
    t[b'I' as usize] = C_INF;
    t[b'N' as usize] = C_NAN;
    t
}

static CLASSES: [u8; 256] = make_classes();

// String-body classes for the four-bytes-at-a-time scanner. PLAIN is zero
// so a whole word of plain bytes ORs to zero.
const S_PLAIN: u8 = 0;
const S_QUOTE: u8 = 1;
const S_BACKSLASH: u8 = 2;
const S_CONTROL: u8 = 4;
const S_MULTIBYTE: u8 = 8;

const fn make_string_classes() -> [u8; 256] {
    let mut t = [S_PLAIN; 256];
    let mut b = 0usize;
    while b < 0x20 {
        t[b] = S_CONTROL;
        b += 1;
    }
    t[b'"' as usize] = S_QUOTE;
    t[b'\\' as usize] = S_BACKSLASH;
    let mut b = 0x80usize;
    while b < 0x100 {
        t[b] = S_MULTIBYTE;
        b += 1;
    }
    t
}

static STRING_CLASSES: [u8; 256] = make_string_classes();

// ─────────────────────────────────────────────────────────────────────────────
// Decoder
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Comment {
    #[default]
    None,
    Line,
    Block,
    /// Inside a block comment, the previous byte was a `*`.
    BlockStar,
}

/// Streaming JSON token decoder.
pub struct JsonDecoder {
    ctrl: Control,
    quirks: [bool; QUIRK_COUNT],

    stack: [u32; 32],
    depth: u32,
    expect: u32,

    started: bool,
    in_string: bool,
    string_is_key: bool,
    comment: Comment,
}

impl Default for JsonDecoder {
    fn default() -> Self {
        Self {
            ctrl: Control::default(),
            quirks: [false; QUIRK_COUNT],
            stack: [0; 32],
            depth: 0,
            expect: X_VALUE,
            started: false,
            in_string: false,
            string_is_key: false,
            comment: Comment::None,
        }
    }
}

impl JsonDecoder {
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
            ERROR_BAD_INPUT
        } else {
            SUSPENSION_SHORT_READ
        }
    }

    // ── Nesting stack ────────────────────────────────────────────────────────

    /// True when the innermost container is a dict.
    fn in_dict(&self) -> bool {
        debug_assert!(self.depth > 0);
        let i = (self.depth - 1) as usize;
        self.stack[i / 32] & (1 << (i % 32)) != 0
    }

    fn push(&mut self, is_dict: bool) -> Status {
        if self.depth >= MAX_DEPTH {
            return ERROR_UNSUPPORTED_RECURSION_DEPTH;
        }
        let i = self.depth as usize;
        if is_dict {
            self.stack[i / 32] |= 1 << (i % 32);
        } else {
            self.stack[i / 32] &= !(1 << (i % 32));
        }
        self.depth += 1;
        Status::Ok
    }

    /// The expect mask after a complete value at the current depth.
    fn after_value(&self) -> u32 {
        if self.depth == 0 {
            X_END
        } else if self.in_dict() {
            X_COMMA | X_CLOSE_BRACE
        } else {
            X_COMMA | X_CLOSE_BRACKET
        }
    }

    fn structure_from(&self) -> u32 {
        if self.depth == 0 {
            TOKEN_DETAIL_STRUCTURE_FROM_NONE
        } else if self.in_dict() {
            TOKEN_DETAIL_STRUCTURE_FROM_DICT
        } else {
            TOKEN_DETAIL_STRUCTURE_FROM_LIST
        }
    }

    // ── Main loop ────────────────────────────────────────────────────────────

    fn do_decode_tokens(&mut self, dst: &mut TokenBuffer<'_>, src: &mut IoBuffer<'_>) -> Status {
        loop {
            // Every iteration emits at most one token.
            if dst.writer_length() == 0 {
                return SUSPENSION_SHORT_WRITE;
            }
            if self.comment != Comment::None {
                let status = self.continue_comment(dst, src);
                if !status.is_ok() {
                    return status;
                }
                continue;
            }
            if self.in_string {
                let status = self.string_step(dst, src);
                if !status.is_ok() {
                    return status;
                }
                if !self.in_string
                    && self.expect == X_END
                    && !self.quirk(QUIRK_EXPECT_TRAILING_NEW_LINE)
                {
                    return Status::Ok;
                }
                continue;
            }

            let data = src.reader_slice();
            let Some(&b) = data.first() else {
                if self.expect == X_END && !self.quirk(QUIRK_EXPECT_TRAILING_NEW_LINE) {
                    return Status::Ok;
                }
                return Self::short_read(src);
            };

            // Leading byte-order-mark / record-separator allowances apply
            // before anything else is seen.
            if !self.started {
                if b == 0x1E && self.quirk(QUIRK_ALLOW_LEADING_ASCII_RECORD_SEPARATOR) {
                    dst.write_token(Token::simple(TOKEN_CAT_FILLER, 0, false, 1));
                    src.consume(1);
                    continue;
                }
                if b == 0xEF && self.quirk(QUIRK_ALLOW_LEADING_UNICODE_BYTE_ORDER_MARK) {
                    if data.len() < 3 {
                        return Self::short_read(src);
                    }
                    if data[1] == 0xBB && data[2] == 0xBF {
                        dst.write_token(Token::simple(TOKEN_CAT_FILLER, 0, false, 3));
                        src.consume(3);
                        continue;
                    }
                    return ERROR_BAD_INPUT;
                }
            }

            match CLASSES[b as usize] {
                C_WHITESPACE => {
                    let mut n = 1;
                    while n < data.len()
                        && n < TOKEN_LENGTH_MAX
                        && CLASSES[data[n] as usize] == C_WHITESPACE
                    {
                        n += 1;
                    }
                    let mut ends_value = false;
                    if self.expect == X_END && self.quirk(QUIRK_EXPECT_TRAILING_NEW_LINE) {
                        // The required trailing newline ends the token run
                        // and the decode.
                        if let Some(at) = data[..n].iter().position(|&c| c == b'\n') {
                            n = at + 1;
                            ends_value = true;
                        }
                    }
                    dst.write_token(Token::simple(TOKEN_CAT_FILLER, 0, false, n));
                    src.consume(n);
                    if ends_value {
                        return Status::Ok;
                    }
                }

                C_COMMENT
                    if self.quirk(QUIRK_ALLOW_COMMENT_BLOCK)
                        || self.quirk(QUIRK_ALLOW_COMMENT_LINE) =>
                {
                    if data.len() < 2 {
                        return Self::short_read(src);
                    }
                    match data[1] {
                        b'/' if self.quirk(QUIRK_ALLOW_COMMENT_LINE) => {
                            self.comment = Comment::Line;
                        }
                        b'*' if self.quirk(QUIRK_ALLOW_COMMENT_BLOCK) => {
                            self.comment = Comment::Block;
                        }
                        _ => return ERROR_BAD_INPUT,
                    }
                    let detail = if self.comment == Comment::Line {
                        TOKEN_DETAIL_FILLER_COMMENT_LINE
                    } else {
                        TOKEN_DETAIL_FILLER_COMMENT_BLOCK
                    };
                    dst.write_token(Token::simple(TOKEN_CAT_FILLER, detail, true, 2));
                    src.consume(2);
                }

                C_OPEN_BRACKET if self.expect & X_VALUE != 0 => {
                    let detail = TOKEN_DETAIL_STRUCTURE_PUSH
                        | self.structure_from()
                        | TOKEN_DETAIL_STRUCTURE_TO_LIST;
                    let status = self.push(false);
                    if !status.is_ok() {
                        return status;
                    }
                    self.started = true;
                    dst.write_token(Token::simple(TOKEN_CAT_STRUCTURE, detail, false, 1));
                    src.consume(1);
                    self.expect = X_VALUE | X_CLOSE_BRACKET;
                }

                C_OPEN_BRACE if self.expect & X_VALUE != 0 => {
                    let detail = TOKEN_DETAIL_STRUCTURE_PUSH
                        | self.structure_from()
                        | TOKEN_DETAIL_STRUCTURE_TO_DICT;
                    let status = self.push(true);
                    if !status.is_ok() {
                        return status;
                    }
                    self.started = true;
                    dst.write_token(Token::simple(TOKEN_CAT_STRUCTURE, detail, false, 1));
                    src.consume(1);
                    self.expect = X_STRING | X_CLOSE_BRACE;
                }

                C_CLOSE_BRACKET if self.expect & X_CLOSE_BRACKET != 0 => {
                    self.depth -= 1;
                    let detail = TOKEN_DETAIL_STRUCTURE_POP
                        | TOKEN_DETAIL_STRUCTURE_FROM_LIST
                        | self.structure_to();
                    dst.write_token(Token::simple(TOKEN_CAT_STRUCTURE, detail, false, 1));
                    src.consume(1);
                    self.expect = self.after_value();
                    if self.expect == X_END && !self.quirk(QUIRK_EXPECT_TRAILING_NEW_LINE) {
                        return Status::Ok;
                    }
                }

                C_CLOSE_BRACE if self.expect & X_CLOSE_BRACE != 0 => {
                    self.depth -= 1;
                    let detail = TOKEN_DETAIL_STRUCTURE_POP
                        | TOKEN_DETAIL_STRUCTURE_FROM_DICT
                        | self.structure_to();
                    dst.write_token(Token::simple(TOKEN_CAT_STRUCTURE, detail, false, 1));
                    src.consume(1);
                    self.expect = self.after_value();
                    if self.expect == X_END && !self.quirk(QUIRK_EXPECT_TRAILING_NEW_LINE) {
                        return Status::Ok;
                    }
                }

                C_COMMA if self.expect & X_COMMA != 0 => {
                    dst.write_token(Token::simple(
                        TOKEN_CAT_FILLER,
                        TOKEN_DETAIL_FILLER_PUNCTUATION,
                        false,
                        1,
                    ));
                    src.consume(1);
                    self.expect = if self.in_dict() {
                        X_STRING
                            | if self.quirk(QUIRK_ALLOW_EXTRA_COMMA) { X_CLOSE_BRACE } else { 0 }
                    } else {
                        X_VALUE
                            | if self.quirk(QUIRK_ALLOW_EXTRA_COMMA) {
                                X_CLOSE_BRACKET
                            } else {
                                0
                            }
                    };
                }

                C_COLON if self.expect & X_COLON != 0 => {
                    dst.write_token(Token::simple(
                        TOKEN_CAT_FILLER,
                        TOKEN_DETAIL_FILLER_PUNCTUATION,
                        false,
                        1,
                    ));
                    src.consume(1);
                    self.expect = X_VALUE;
                }

                C_STRING if self.expect & (X_VALUE | X_STRING) != 0 => {
                    self.string_is_key = self.expect & X_VALUE == 0;
                    self.in_string = true;
                    self.started = true;
                    dst.write_token(Token::simple(
                        TOKEN_CAT_STRING,
                        TOKEN_DETAIL_STRING_DROP,
                        true,
                        1,
                    ));
                    src.consume(1);
                }

                C_NUMBER if self.expect & X_VALUE != 0 => {
                    let status = self.number_step(dst, src);
                    if !status.is_ok() {
                        return status;
                    }
                    if self.expect == X_END && !self.quirk(QUIRK_EXPECT_TRAILING_NEW_LINE) {
                        return Status::Ok;
                    }
                }

                C_LITERAL_F if self.expect & X_VALUE != 0 => {
                    let status = self.keyword_step(
                        dst,
                        src,
                        b"false",
                        Token::simple(TOKEN_CAT_LITERAL, TOKEN_DETAIL_LITERAL_FALSE, false, 5),
                    );
                    if !status.is_ok() {
                        return status;
                    }
                    if self.expect == X_END && !self.quirk(QUIRK_EXPECT_TRAILING_NEW_LINE) {
                        return Status::Ok;
                    }
                }

                C_LITERAL_T if self.expect & X_VALUE != 0 => {
                    let status = self.keyword_step(
                        dst,
                        src,
                        b"true",
                        Token::simple(TOKEN_CAT_LITERAL, TOKEN_DETAIL_LITERAL_TRUE, false, 4),
                    );
                    if !status.is_ok() {
                        return status;
                    }
                    if self.expect == X_END && !self.quirk(QUIRK_EXPECT_TRAILING_NEW_LINE) {
                        return Status::Ok;
                    }
                }

                C_LITERAL_N if self.expect & X_VALUE != 0 => {
                    let status = self.keyword_step(
                        dst,
                        src,
                        b"null",
                        Token::simple(TOKEN_CAT_LITERAL, TOKEN_DETAIL_LITERAL_NULL, false, 4),
                    );
                    if !status.is_ok() {
                        return status;
                    }
                    if self.expect == X_END && !self.quirk(QUIRK_EXPECT_TRAILING_NEW_LINE) {
                        return Status::Ok;
                    }
                }

                C_INF
                    if self.expect & X_VALUE != 0
                        && self.quirk(QUIRK_ALLOW_INF_NAN_NUMBERS) =>
                {
                    let status = self.infinity_step(dst, src);
                    if !status.is_ok() {
                        return status;
                    }
                    if self.expect == X_END && !self.quirk(QUIRK_EXPECT_TRAILING_NEW_LINE) {
                        return Status::Ok;
                    }
                }

                C_NAN
                    if self.expect & X_VALUE != 0
                        && self.quirk(QUIRK_ALLOW_INF_NAN_NUMBERS) =>
                {
                    let status = self.keyword_step(
                        dst,
                        src,
                        b"NaN",
                        Token::simple(
                            TOKEN_CAT_NUMBER,
                            TOKEN_DETAIL_NUMBER_FLOATING_POINT | TOKEN_DETAIL_NUMBER_NAN,
                            false,
                            3,
                        ),
                    );
                    if !status.is_ok() {
                        return status;
                    }
                    if self.expect == X_END && !self.quirk(QUIRK_EXPECT_TRAILING_NEW_LINE) {
                        return Status::Ok;
                    }
                }

                _ => {
                    if self.expect == X_END {
                        // Trailing garbage is left unread without the
                        // trailing-newline requirement.
                        if self.quirk(QUIRK_EXPECT_TRAILING_NEW_LINE) {
                            return ERROR_BAD_INPUT;
                        }
                        return Status::Ok;
                    }
                    return ERROR_BAD_INPUT;
                }
            }
        }
    }

    fn structure_to(&self) -> u32 {
        // Called after depth has been decremented by a pop.
        if self.depth == 0 {
            TOKEN_DETAIL_STRUCTURE_TO_NONE
        } else if self.in_dict() {
            TOKEN_DETAIL_STRUCTURE_TO_DICT
        } else {
            TOKEN_DETAIL_STRUCTURE_TO_LIST
        }
    }

    // ── Comments ─────────────────────────────────────────────────────────────

    fn continue_comment(&mut self, dst: &mut TokenBuffer<'_>, src: &mut IoBuffer<'_>) -> Status {
        let data = src.reader_slice();
        if data.is_empty() {
            return Self::short_read(src);
        }
        let detail = if self.comment == Comment::Line {
            TOKEN_DETAIL_FILLER_COMMENT_LINE
        } else {
            TOKEN_DETAIL_FILLER_COMMENT_BLOCK
        };
        let mut n = 0usize;
        let mut done = false;
        while n < data.len() && n < TOKEN_LENGTH_MAX {
            let b = data[n];
            n += 1;
            match self.comment {
                Comment::Line => {
                    if b == b'\n' {
                        done = true;
                        break;
                    }
                }
                Comment::Block => {
                    if b == b'*' {
                        self.comment = Comment::BlockStar;
                    }
                }
                Comment::BlockStar => {
                    if b == b'/' {
                        done = true;
                        break;
                    }
                    if b != b'*' {
                        self.comment = Comment::Block;
                    }
                }
                Comment::None => unreachable!(),
            }
        }
        dst.write_token(Token::simple(TOKEN_CAT_FILLER, detail, !done, n));
        src.consume(n);
        if done {
            self.comment = Comment::None;
        }
        Status::Ok
    }

    // ── Strings ──────────────────────────────────────────────────────────────

    /// Emits one token of string body: a plain run, an escape, a code
    /// point, or the closing quote.
    fn string_step(&mut self, dst: &mut TokenBuffer<'_>, src: &mut IoBuffer<'_>) -> Status {
        let data = src.reader_slice();
        if data.is_empty() {
            return Self::short_read(src);
        }
        match STRING_CLASSES[data[0] as usize] {
            S_QUOTE => {
                dst.write_token(Token::simple(
                    TOKEN_CAT_STRING,
                    TOKEN_DETAIL_STRING_DROP,
                    false,
                    1,
                ));
                src.consume(1);
                self.in_string = false;
                self.expect = if self.string_is_key { X_COLON } else { self.after_value() };
                Status::Ok
            }
            S_BACKSLASH => self.escape_step(dst, src),
            S_CONTROL => {
                if !self.quirk(QUIRK_ALLOW_ASCII_CONTROL_CODES) {
                    return ERROR_BAD_C0_CONTROL_CODE;
                }
                dst.write_token(Token::simple(
                    TOKEN_CAT_STRING,
                    TOKEN_DETAIL_STRING_COPY,
                    true,
                    1,
                ));
                src.consume(1);
                Status::Ok
            }
            S_MULTIBYTE => {
                let (cp, len) = decode_utf8(data);
                if len == 0 {
                    // A so-far-valid prefix that needs more bytes.
                    if !src.is_closed() {
                        return SUSPENSION_SHORT_READ;
                    }
                    return self.bad_unicode(dst, src, 1);
                }
                if cp == REPLACEMENT_CODE_POINT && len == 1 {
                    return self.bad_unicode(dst, src, 1);
                }
                dst.write_token(Token::simple(
                    TOKEN_CAT_STRING,
                    TOKEN_DETAIL_STRING_COPY,
                    true,
                    len,
                ));
                src.consume(len);
                Status::Ok
            }
            _ => {
                // A plain ASCII run, scanned four bytes at a stride.
                let mut n = 1usize;
                let cap = data.len().min(TOKEN_LENGTH_MAX);
                while n + 4 <= cap {
                    let or = STRING_CLASSES[data[n] as usize]
                        | STRING_CLASSES[data[n + 1] as usize]
                        | STRING_CLASSES[data[n + 2] as usize]
                        | STRING_CLASSES[data[n + 3] as usize];
                    if or != S_PLAIN {
                        break;
                    }
                    n += 4;
                }
                while n < cap && STRING_CLASSES[data[n] as usize] == S_PLAIN {
                    n += 1;
                }
                dst.write_token(Token::simple(
                    TOKEN_CAT_STRING,
                    TOKEN_DETAIL_STRING_COPY,
                    true,
                    n,
                ));
                src.consume(n);
                Status::Ok
            }
        }
    }

    fn bad_unicode(
        &mut self,
        dst: &mut TokenBuffer<'_>,
        src: &mut IoBuffer<'_>,
        skip: usize,
    ) -> Status {
        if !self.quirk(QUIRK_REPLACE_INVALID_UNICODE) {
            return ERROR_BAD_UTF_8;
        }
        dst.write_token(Token::simple(
            TOKEN_CAT_UNICODE_CODE_POINT,
            REPLACEMENT_CODE_POINT,
            true,
            skip,
        ));
        src.consume(skip);
        Status::Ok
    }

    /// Handles one backslash escape. Consumes nothing until the whole
    /// escape is present.
    fn escape_step(&mut self, dst: &mut TokenBuffer<'_>, src: &mut IoBuffer<'_>) -> Status {
        let data = src.reader_slice();
        if data.len() < 2 {
            return Self::short_read(src);
        }
        let (cp, len): (u32, usize) = match data[1] {
            b'"' => (0x22, 2),
            b'\\' => (0x5C, 2),
            b'/' => (0x2F, 2),
            b'b' => (0x08, 2),
            b'f' => (0x0C, 2),
            b'n' => (0x0A, 2),
            b'r' => (0x0D, 2),
            b't' => (0x09, 2),
            b'a' if self.quirk(QUIRK_ALLOW_BACKSLASH_A) => (0x07, 2),
            b'e' if self.quirk(QUIRK_ALLOW_BACKSLASH_E) => (0x1B, 2),
            b'v' if self.quirk(QUIRK_ALLOW_BACKSLASH_V) => (0x0B, 2),
            b'0' if self.quirk(QUIRK_ALLOW_BACKSLASH_ZERO) => (0x00, 2),
            b'\'' if self.quirk(QUIRK_ALLOW_BACKSLASH_SINGLE_QUOTE) => (0x27, 2),
            b'?' if self.quirk(QUIRK_ALLOW_BACKSLASH_QUESTION_MARK) => (0x3F, 2),
            b'\n' if self.quirk(QUIRK_ALLOW_BACKSLASH_NEW_LINE) => (0x0A, 2),
            b'u' => return self.unicode_escape_step(dst, src),
            b'x' if self.quirk(QUIRK_ALLOW_BACKSLASH_X) => {
                return self.backslash_x_step(dst, src)
            }
            b'U' if self.quirk(QUIRK_ALLOW_BACKSLASH_CAPITAL_U) => {
                if data.len() < 10 {
                    return Self::short_read(src);
                }
                let Some(cp) = crate::text::parse_hex_u32(&data[2..10]) else {
                    return ERROR_BAD_BACKSLASH_ESCAPE;
                };
                if cp > 0x10_FFFF || (0xD800..=0xDFFF).contains(&cp) {
                    return self.escape_replace_or_error(dst, src, 10);
                }
                (cp, 10)
            }
            _ => return ERROR_BAD_BACKSLASH_ESCAPE,
        };
        dst.write_token(Token::simple(TOKEN_CAT_UNICODE_CODE_POINT, cp, true, len));
        src.consume(len);
        Status::Ok
    }

    fn escape_replace_or_error(
        &mut self,
        dst: &mut TokenBuffer<'_>,
        src: &mut IoBuffer<'_>,
        len: usize,
    ) -> Status {
        if !self.quirk(QUIRK_REPLACE_INVALID_UNICODE) {
            return ERROR_BAD_BACKSLASH_ESCAPE;
        }
        dst.write_token(Token::simple(
            TOKEN_CAT_UNICODE_CODE_POINT,
            REPLACEMENT_CODE_POINT,
            true,
            len,
        ));
        src.consume(len);
        Status::Ok
    }

    /// `\uXXXX`, possibly a surrogate pair `\uXXXX\uYYYY`.
    fn unicode_escape_step(&mut self, dst: &mut TokenBuffer<'_>, src: &mut IoBuffer<'_>) -> Status {
        let data = src.reader_slice();
        if data.len() < 6 {
            return Self::short_read(src);
        }
        let Some(hi) = parse_hex4(&data[2..6]) else {
            return ERROR_BAD_BACKSLASH_ESCAPE;
        };
        if (0xDC00..=0xDFFF).contains(&hi) {
            // A lone low surrogate.
            return self.escape_replace_or_error(dst, src, 6);
        }
        if (0xD800..=0xDBFF).contains(&hi) {
            // The low surrogate must follow immediately.
            if data.len() < 12 {
                if data.len() >= 8 && (data[6] != b'\\' || data[7] != b'u') {
                    return self.escape_replace_or_error(dst, src, 6);
                }
                if src.is_closed() {
                    return self.escape_replace_or_error(dst, src, 6);
                }
                return SUSPENSION_SHORT_READ;
            }
            if data[6] != b'\\' || data[7] != b'u' {
                return self.escape_replace_or_error(dst, src, 6);
            }
            let Some(lo) = parse_hex4(&data[8..12]) else {
                return ERROR_BAD_BACKSLASH_ESCAPE;
            };
            if !(0xDC00..=0xDFFF).contains(&lo) {
                return self.escape_replace_or_error(dst, src, 6);
            }
            let cp = 0x1_0000 + ((hi - 0xD800) << 10) + (lo - 0xDC00);
            dst.write_token(Token::simple(TOKEN_CAT_UNICODE_CODE_POINT, cp, true, 12));
            src.consume(12);
            return Status::Ok;
        }
        dst.write_token(Token::simple(TOKEN_CAT_UNICODE_CODE_POINT, hi, true, 6));
        src.consume(6);
        Status::Ok
    }

    /// A run of adjacent `\xHH` escapes packs into one token whose length
    /// covers all of them; the token denotes raw bytes, not code points.
    fn backslash_x_step(&mut self, dst: &mut TokenBuffer<'_>, src: &mut IoBuffer<'_>) -> Status {
        let data = src.reader_slice();
        let mut n = 0usize;
        while n + 4 <= data.len()
            && n + 4 <= TOKEN_LENGTH_MAX
            && data[n] == b'\\'
            && data[n + 1] == b'x'
        {
            if hex_digit(data[n + 2]).is_none() || hex_digit(data[n + 3]).is_none() {
                return ERROR_BAD_BACKSLASH_ESCAPE;
            }
            n += 4;
        }
        if n == 0 {
            // The first escape itself is split across the buffer edge.
            if data.len() < 4 && !src.is_closed() {
                return SUSPENSION_SHORT_READ;
            }
            return ERROR_BAD_BACKSLASH_ESCAPE;
        }
        dst.write_token(Token::simple(
            TOKEN_CAT_STRING,
            TOKEN_DETAIL_STRING_BACKSLASH_X,
            true,
            n,
        ));
        src.consume(n);
        Status::Ok
    }

    // ── Keywords ─────────────────────────────────────────────────────────────

    fn keyword_step(
        &mut self,
        dst: &mut TokenBuffer<'_>,
        src: &mut IoBuffer<'_>,
        keyword: &[u8],
        token: Token,
    ) -> Status {
        match src.match7(keyword) {
            Match7::Short => SUSPENSION_SHORT_READ,
            Match7::Failed => ERROR_BAD_INPUT,
            Match7::Matched => {
                self.started = true;
                dst.write_token(token);
                src.consume(keyword.len());
                self.expect = self.after_value();
                Status::Ok
            }
        }
    }

    /// `Infinity` is one byte too long for the seven-byte matcher, so its
    /// classified leading `I` is matched separately from the remainder.
    fn infinity_step(&mut self, dst: &mut TokenBuffer<'_>, src: &mut IoBuffer<'_>) -> Status {
        match src.match7_at(1, b"nfinity") {
            KeywordMatch::Short => SUSPENSION_SHORT_READ,
            KeywordMatch::Failed => ERROR_BAD_INPUT,
            KeywordMatch::Matched => {
                self.started = true;
                dst.write_token(Token::simple(
                    TOKEN_CAT_NUMBER,
                    TOKEN_DETAIL_NUMBER_FLOATING_POINT | TOKEN_DETAIL_NUMBER_POS_INF,
                    false,
                    8,
                ));
                src.consume(8);
                self.expect = self.after_value();
                Status::Ok
            }
        }
    }

    // ── Numbers ──────────────────────────────────────────────────────────────

    fn number_step(&mut self, dst: &mut TokenBuffer<'_>, src: &mut IoBuffer<'_>) -> Status {
        let data = src.reader_slice();

        // A leading minus may introduce -Infinity under the quirk.
        if data[0] == b'-' && self.quirk(QUIRK_ALLOW_INF_NAN_NUMBERS) {
            if data.len() < 2 {
                return Self::short_read(src);
            }
            if data[1] == b'I' {
                match src.match7_at(1, b"Infinity") {
                    KeywordMatch::Matched => {
                        self.started = true;
                        dst.write_token(Token::simple(
                            TOKEN_CAT_NUMBER,
                            TOKEN_DETAIL_NUMBER_FLOATING_POINT | TOKEN_DETAIL_NUMBER_NEG_INF,
                            false,
                            9,
                        ));
                        src.consume(9);
                        self.expect = self.after_value();
                        return Status::Ok;
                    }
                    KeywordMatch::Short => return Self::short_read(src),
                    KeywordMatch::Failed => return ERROR_BAD_INPUT,
                }
            }
        }

        // Find the span of number-ish bytes.
        let mut n = 0usize;
        while n < data.len() && is_number_byte(data[n]) {
            n += 1;
        }
        if n > MAX_NUMBER_LENGTH {
            return ERROR_UNSUPPORTED_NUMBER_LENGTH;
        }
        if n == data.len() && !src.is_closed() {
            // The number may continue beyond the buffer.
            return SUSPENSION_SHORT_READ;
        }
        let Some(detail) = validate_number(&data[..n]) else {
            return ERROR_BAD_INPUT;
        };
        self.started = true;
        dst.write_token(Token::simple(TOKEN_CAT_NUMBER, detail, false, n));
        src.consume(n);
        self.expect = self.after_value();
        Status::Ok
    }
}

/// Bytes that may appear inside a number literal.
#[inline]
fn is_number_byte(b: u8) -> bool {
    b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E')
}

fn parse_hex4(b: &[u8]) -> Option<u32> {
    let mut v = 0u32;
    for &x in &b[..4] {
        v = (v << 4) | u32::from(hex_digit(x)?);
    }
    Some(v)
}

/// Validates a complete number literal against the JSON grammar, returning
/// its content flags.
fn validate_number(s: &[u8]) -> Option<u32> {
    let mut i = 0;
    let negative = s.first() == Some(&b'-');
    if negative {
        i += 1;
    }
    // Integer part: 0, or a nonzero digit followed by digits.
    match s.get(i)? {
        b'0' => i += 1,
        b'1'..=b'9' => {
            while i < s.len() && s[i].is_ascii_digit() {
                i += 1;
            }
        }
        _ => return None,
    }
    let mut floating = false;
    if s.get(i) == Some(&b'.') {
        floating = true;
        i += 1;
        let start = i;
        while i < s.len() && s[i].is_ascii_digit() {
            i += 1;
        }
        if i == start {
            return None;
        }
    }
    if matches!(s.get(i), Some(b'e' | b'E')) {
        floating = true;
        i += 1;
        if matches!(s.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let start = i;
        while i < s.len() && s[i].is_ascii_digit() {
            i += 1;
        }
        if i == start {
            return None;
        }
    }
    if i != s.len() {
        return None;
    }
    Some(if floating {
        TOKEN_DETAIL_NUMBER_FLOATING_POINT
    } else if negative {
        TOKEN_DETAIL_NUMBER_FLOATING_POINT | TOKEN_DETAIL_NUMBER_INTEGER_SIGNED
    } else {
        TOKEN_DETAIL_NUMBER_FLOATING_POINT
            | TOKEN_DETAIL_NUMBER_INTEGER_SIGNED
            | TOKEN_DETAIL_NUMBER_INTEGER_UNSIGNED
    })
}

/// Keyword matching against the reader at an offset.
enum KeywordMatch {
    Matched,
    Short,
    Failed,
}

trait Match7At {
    fn match7_at(&self, offset: usize, keyword: &[u8]) -> KeywordMatch;
}

impl Match7At for IoBuffer<'_> {
    fn match7_at(&self, offset: usize, keyword: &[u8]) -> KeywordMatch {
        let have = &self.reader_slice()[offset.min(self.reader_length())..];
        let n = have.len().min(keyword.len());
        if have[..n] != keyword[..n] {
            return KeywordMatch::Failed;
        }
        if have.len() >= keyword.len() {
            KeywordMatch::Matched
        } else if self.is_closed() {
            KeywordMatch::Failed
        } else {
            KeywordMatch::Short
        }
    }
}

impl TokenDecoder for JsonDecoder {
    fn decode_tokens(
        &mut self,
        dst: &mut TokenBuffer<'_>,
        src: &mut IoBuffer<'_>,
        workbuf: &mut [u8],
    ) -> Status {
        let status = self.ctrl.begin(CO_DECODE_TOKENS);
        if !status.is_ok() {
            return status;
        }
        let _ = workbuf;
        let status = self.do_decode_tokens(dst, src);
        let status = if status.is_ok() {
            // One top-level value per ok; reset for the next.
            self.expect = X_VALUE;
            self.started = false;
            status
        } else {
            status
        };
        self.ctrl.settle(CO_DECODE_TOKENS, status)
    }

    fn workbuf_len(&self) -> RangeIIU64 {
        RangeIIU64::new(0, 0)
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
