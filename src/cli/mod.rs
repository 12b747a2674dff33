//! The `unravel` command-line tool: decompress byte streams, inspect
//! images and dump JSON token streams using the library's streaming
//! decoders.
//!
//! The decode path deliberately drives the coroutine API the way any
//! embedding would: fixed buffers, refill on `$short read`, drain on
//! `$short write`, compact between calls.

pub mod decode;
pub mod image;
pub mod logger;
pub mod tokens;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "unravel", version, about = "Streaming decoders for compressed and image formats")]
pub struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decompress gzip, zlib or raw deflate streams.
    Decode(decode::DecodeArgs),
    /// Print image configuration and frame details for GIF/BMP/WBMP files.
    Image(image::ImageArgs),
    /// Tokenize a JSON file and print the token stream.
    Tokens(tokens::TokensArgs),
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Decode(args) => decode::run(&args),
        Command::Image(args) => image::run(&args),
        Command::Tokens(args) => tokens::run(&args),
    }
}
