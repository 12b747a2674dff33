//! Streaming JSON tokenization (RFC 8259 plus a family of quirks).
//!
//! The tokenizer emits 64-bit tokens that tile the source bytes exactly:
//! whitespace and comments become filler tokens, structural characters
//! become structure tokens, string contents become chains of string and
//! code-point tokens, and numbers become number tokens tagged with which
//! converters apply. It never allocates and suspends cleanly at buffer
//! boundaries.

mod decoder;

pub use decoder::{
    JsonDecoder, ERROR_BAD_BACKSLASH_ESCAPE, ERROR_BAD_C0_CONTROL_CODE, ERROR_BAD_INPUT,
    ERROR_BAD_UTF_8, ERROR_UNSUPPORTED_NUMBER_LENGTH, ERROR_UNSUPPORTED_RECURSION_DEPTH,
    QUIRK_ALLOW_ASCII_CONTROL_CODES, QUIRK_ALLOW_BACKSLASH_A, QUIRK_ALLOW_BACKSLASH_CAPITAL_U,
    QUIRK_ALLOW_BACKSLASH_E, QUIRK_ALLOW_BACKSLASH_NEW_LINE,
    QUIRK_ALLOW_BACKSLASH_QUESTION_MARK, QUIRK_ALLOW_BACKSLASH_SINGLE_QUOTE,
    QUIRK_ALLOW_BACKSLASH_V, QUIRK_ALLOW_BACKSLASH_X, QUIRK_ALLOW_BACKSLASH_ZERO,
    QUIRK_ALLOW_COMMENT_BLOCK, QUIRK_ALLOW_COMMENT_LINE, QUIRK_ALLOW_EXTRA_COMMA,
    QUIRK_ALLOW_INF_NAN_NUMBERS, QUIRK_ALLOW_LEADING_ASCII_RECORD_SEPARATOR,
    QUIRK_ALLOW_LEADING_UNICODE_BYTE_ORDER_MARK, QUIRK_EXPECT_TRAILING_NEW_LINE,
    QUIRK_REPLACE_INVALID_UNICODE,
};
