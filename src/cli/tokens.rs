//! `unravel tokens`: tokenize a JSON file and print the token stream,
//! demonstrating the token-buffer coroutine contract with a small,
//! fixed-size token buffer.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Args;

use unravel::buffer::{
    Token, TOKEN_CAT_FILLER, TOKEN_CAT_LITERAL, TOKEN_CAT_NUMBER, TOKEN_CAT_STRING,
    TOKEN_CAT_STRUCTURE, TOKEN_CAT_UNICODE_CODE_POINT,
};
use unravel::json::{
    QUIRK_ALLOW_COMMENT_BLOCK, QUIRK_ALLOW_COMMENT_LINE, QUIRK_ALLOW_EXTRA_COMMA,
    QUIRK_ALLOW_INF_NAN_NUMBERS,
};
use unravel::status::{SUSPENSION_SHORT_READ, SUSPENSION_SHORT_WRITE};
use unravel::{IoBuffer, JsonDecoder, Status, TokenBuffer, TokenDecoder};

#[derive(Debug, Args)]
pub struct TokensArgs {
    /// Input JSON file.
    pub file: PathBuf,

    /// Permissive parsing: comments, trailing commas, Infinity and NaN.
    #[arg(long = "lax")]
    pub lax: bool,
}

fn category_name(t: Token) -> &'static str {
    match t.category() {
        TOKEN_CAT_FILLER => "filler",
        TOKEN_CAT_STRUCTURE => "structure",
        TOKEN_CAT_STRING => "string",
        TOKEN_CAT_UNICODE_CODE_POINT => "code-point",
        TOKEN_CAT_LITERAL => "literal",
        TOKEN_CAT_NUMBER => "number",
        _ => "?",
    }
}

pub fn run(args: &TokensArgs) -> anyhow::Result<()> {
    let mut data =
        std::fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;

    let mut decoder = JsonDecoder::new();
    if args.lax {
        for quirk in [
            QUIRK_ALLOW_COMMENT_BLOCK,
            QUIRK_ALLOW_COMMENT_LINE,
            QUIRK_ALLOW_EXTRA_COMMA,
            QUIRK_ALLOW_INF_NAN_NUMBERS,
        ] {
            let status = decoder.set_quirk_enabled(quirk, true);
            anyhow::ensure!(status.is_ok(), "set_quirk_enabled: {status}");
        }
    }

    let mut src = IoBuffer::reader(&mut data, true);
    let mut tokens = [Token::default(); 64];
    let mut offset = 0u64;
    let mut workbuf = [0u8; 0];
    loop {
        let mut dst = TokenBuffer::writer(&mut tokens);
        let status = decoder.decode_tokens(&mut dst, &mut src, &mut workbuf);
        for t in dst.reader_slice() {
            println!(
                "{offset:>8}  {:<10} len {:>3}  detail 0x{:05X}{}",
                category_name(*t),
                t.length(),
                t.detail(),
                if t.continued() { "  continued" } else { "" },
            );
            offset += t.length() as u64;
        }
        match status {
            Status::Ok => break,
            s if s == SUSPENSION_SHORT_WRITE => {}
            s if s == SUSPENSION_SHORT_READ => {
                bail!("{}: unexpected end of input", args.file.display())
            }
            s => bail!("{}: {s}", args.file.display()),
        }
    }
    Ok(())
}
