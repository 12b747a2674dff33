//! `unravel decode`: stream gzip/zlib/raw-deflate files through the
//! coroutine API with fixed-size buffers.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Args;
use rayon::prelude::*;

use unravel::status::{SUSPENSION_SHORT_READ, SUSPENSION_SHORT_WRITE};
use unravel::{DeflateDecoder, GzipDecoder, IoBuffer, IoTransformer, Status, ZlibDecoder};

const SRC_BUF_LEN: usize = 64 * 1024;
const DST_BUF_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Auto,
    Gzip,
    Zlib,
    Deflate,
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Input files.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Input framing.
    #[arg(short = 'f', long = "format", value_enum, default_value = "auto")]
    pub format: Format,

    /// Skip trailer checksum verification.
    #[arg(long = "ignore-checksum")]
    pub ignore_checksum: bool,

    /// Write decoded bytes to stdout instead of files.
    #[arg(short = 'c', long = "stdout")]
    pub stdout: bool,

    /// Number of worker threads for multiple inputs (0 = one per core).
    #[arg(long = "workers", default_value_t = 0)]
    pub workers: usize,
}

pub fn run(args: &DecodeArgs) -> anyhow::Result<()> {
    if args.files.len() <= 1 || args.stdout {
        for f in &args.files {
            decode_one(args, f)?;
        }
        return Ok(());
    }
    let workers = if args.workers == 0 { num_cpus::get() } else { args.workers };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("building worker pool")?;
    pool.install(|| {
        args.files
            .par_iter()
            .map(|f| decode_one(args, f))
            .collect::<anyhow::Result<Vec<_>>>()
    })?;
    Ok(())
}

fn sniff_format(path: &Path, first: &[u8]) -> Format {
    if first.len() >= 2 && first[0] == 0x1F && first[1] == 0x8B {
        return Format::Gzip;
    }
    if first.len() >= 2
        && first[0] & 0x0F == 8
        && (u32::from(first[0]) * 256 + u32::from(first[1])) % 31 == 0
    {
        return Format::Zlib;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => Format::Gzip,
        Some("zz" | "zlib") => Format::Zlib,
        _ => Format::Deflate,
    }
}

fn output_path(input: &Path) -> PathBuf {
    match input.extension().and_then(|e| e.to_str()) {
        Some("gz" | "zz" | "zlib" | "deflate") => input.with_extension(""),
        _ => {
            let mut name = input.as_os_str().to_os_string();
            name.push(".out");
            PathBuf::from(name)
        }
    }
}

fn decode_one(args: &DecodeArgs, path: &Path) -> anyhow::Result<()> {
    let mut input = File::open(path).with_context(|| format!("opening {}", path.display()))?;

    let mut src_bytes = vec![0u8; SRC_BUF_LEN];
    let mut dst_bytes = vec![0u8; DST_BUF_LEN];
    let mut workbuf = [0u8; 1];

    // Read the first chunk up front so the format can be sniffed.
    let filled = fill(&mut input, &mut src_bytes)?;
    let format = match args.format {
        Format::Auto => sniff_format(path, &src_bytes[..filled]),
        f => f,
    };
    log::info!("decoding {} as {:?}", path.display(), format);

    let mut gzip;
    let mut zlib;
    let mut deflate;
    let decoder: &mut dyn IoTransformer = match format {
        Format::Gzip | Format::Auto => {
            gzip = GzipDecoder::new();
            if args.ignore_checksum {
                let status = gzip.set_ignore_checksum(true);
                anyhow::ensure!(status.is_ok(), "set_ignore_checksum: {status}");
            }
            &mut *gzip
        }
        Format::Zlib => {
            zlib = ZlibDecoder::new();
            if args.ignore_checksum {
                let status = zlib.set_ignore_checksum(true);
                anyhow::ensure!(status.is_ok(), "set_ignore_checksum: {status}");
            }
            &mut *zlib
        }
        Format::Deflate => {
            deflate = DeflateDecoder::new();
            &mut *deflate
        }
    };

    let stdout = std::io::stdout();
    let mut sink: Box<dyn Write> = if args.stdout {
        Box::new(stdout.lock())
    } else {
        let out = output_path(path);
        Box::new(File::create(&out).with_context(|| format!("creating {}", out.display()))?)
    };

    let mut pending = filled;
    let mut closed = false;
    let mut total_out: u64 = 0;
    loop {
        let mut src = IoBuffer::reader(&mut src_bytes[..pending], closed);
        let mut dst = IoBuffer::writer(&mut dst_bytes);
        let status = decoder.transform_io(&mut dst, &mut src, &mut workbuf);
        sink.write_all(dst.reader_slice())?;
        total_out += dst.reader_length() as u64;
        let consumed = src.reader_index();
        drop(src);
        // Compact: keep the unread tail at the front of the buffer.
        src_bytes.copy_within(consumed..pending, 0);
        pending -= consumed;

        match status {
            Status::Ok => break,
            s if s == SUSPENSION_SHORT_WRITE => {}
            s if s == SUSPENSION_SHORT_READ => {
                if closed {
                    bail!("{}: truncated input", path.display());
                }
                let n = fill(&mut input, &mut src_bytes[pending..])?;
                if n == 0 {
                    closed = true;
                }
                pending += n;
            }
            s => bail!("{}: {s}", path.display()),
        }
    }
    log::info!("{}: {total_out} bytes decoded", path.display());
    Ok(())
}

fn fill(input: &mut File, buf: &mut [u8]) -> anyhow::Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        let got = input.read(&mut buf[n..])?;
        if got == 0 {
            break;
        }
        n += got;
    }
    Ok(n)
}
