//! DEFLATE decompression (RFC 1951): Huffman table construction plus the
//! streaming block decoder. The ZLIB and GZIP wrappers embed
//! [`DeflateDecoder`]; raw DEFLATE streams can drive it directly.

mod decoder;
mod huffman;

pub use decoder::{
    DeflateDecoder, ERROR_BAD_BLOCK_TYPE, ERROR_BAD_CODE_COUNT,
    ERROR_BAD_CODE_LENGTH_REPETITION, ERROR_BAD_DISTANCE, ERROR_BAD_HUFFMAN_CODE,
    ERROR_INCONSISTENT_STORED_BLOCK_LENGTH, ERROR_TRUNCATED_INPUT,
};
pub use huffman::{ERROR_OVER_SUBSCRIBED, ERROR_UNDER_SUBSCRIBED};
