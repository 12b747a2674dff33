//! GIF image decoding (GIF87a and GIF89a): the container block walk, the
//! per-frame LZW drive, interlacing, disposal bookkeeping, animation loop
//! counts and the metadata-redirection protocol for embedded ICC profiles
//! and XMP packets.

mod decoder;

pub use decoder::{
    GifDecoder, ERROR_BAD_EXTENSION, ERROR_BAD_FRAME_RECT, ERROR_BAD_HEADER,
    ERROR_BAD_LITERAL_WIDTH, ERROR_BAD_PALETTE, ERROR_NOT_ENOUGH_PIXEL_DATA,
    QUIRK_DELAY_NUM_DECODED_FRAMES, QUIRK_FIRST_FRAME_LOCAL_PALETTE_MEANS_BLACK_BACKGROUND,
    QUIRK_HONOR_BACKGROUND_COLOR, QUIRK_IGNORE_TOO_MUCH_PIXEL_DATA,
    QUIRK_IMAGE_BOUNDS_ARE_STRICT, QUIRK_REJECT_EMPTY_FRAME, QUIRK_REJECT_EMPTY_PALETTE,
};
