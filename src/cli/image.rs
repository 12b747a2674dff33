//! `unravel image`: print image configurations and frame details, with an
//! optional raw-pixel dump of every frame.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Args;
use rayon::prelude::*;

use unravel::pixel::PIXEL_FORMAT_BGRA_NONPREMUL;
use unravel::status::{NOTE_END_OF_DATA, NOTE_I_O_REDIRECT};
use unravel::{
    BmpDecoder, DecodeFrameOptions, FrameConfig, GifDecoder, ImageConfig, ImageDecoder,
    IoBuffer, MoreInformation, PixelBlend, PixelBuffer, PixelConfig, WbmpDecoder,
};

#[derive(Debug, Args)]
pub struct ImageArgs {
    /// Input files (GIF, BMP or WBMP).
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Write each frame as raw BGRA bytes next to the input.
    #[arg(long = "dump")]
    pub dump: bool,
}

pub fn run(args: &ImageArgs) -> anyhow::Result<()> {
    if args.files.len() <= 1 {
        for f in &args.files {
            inspect_one(args, f)?;
        }
        return Ok(());
    }
    args.files
        .par_iter()
        .map(|f| inspect_one(args, f))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(())
}

fn new_decoder(path: &Path, magic: &[u8]) -> anyhow::Result<Box<dyn ImageDecoder>> {
    if magic.starts_with(b"GIF8") {
        return Ok(GifDecoder::new());
    }
    if magic.starts_with(b"BM") {
        return Ok(BmpDecoder::new());
    }
    if path.extension().and_then(|e| e.to_str()) == Some("wbmp") {
        return Ok(WbmpDecoder::new());
    }
    bail!("{}: unrecognized image format", path.display())
}

fn inspect_one(args: &ImageArgs, path: &Path) -> anyhow::Result<()> {
    let mut data =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut decoder = new_decoder(path, &data)?;

    let mut src = IoBuffer::reader(&mut data, true);
    let mut cfg = ImageConfig::default();
    let status = decoder.decode_image_config(&mut cfg, &mut src);
    if status == NOTE_I_O_REDIRECT {
        let mut minfo = MoreInformation::default();
        let mut none = [0u8; 0];
        let mut dst = IoBuffer::writer(&mut none);
        let status = decoder.tell_me_more(&mut dst, &mut minfo, &mut src);
        anyhow::ensure!(status.is_ok(), "{}: tell_me_more: {status}", path.display());
        let fourcc = minfo.fourcc.to_be_bytes();
        println!(
            "{}: embedded {} payload at byte offset {}",
            path.display(),
            String::from_utf8_lossy(&fourcc).trim_end(),
            minfo.range.min_incl,
        );
        return Ok(());
    }
    anyhow::ensure!(status.is_ok(), "{}: {status}", path.display());

    let pixcfg = cfg.pixcfg;
    println!(
        "{}: {}x{}, {} bpp{}",
        path.display(),
        pixcfg.width(),
        pixcfg.height(),
        pixcfg.format().bits_per_pixel(),
        if pixcfg.format().is_indexed() { ", indexed" } else { "" },
    );

    // Decode every frame into a BGRA canvas.
    let mut out_cfg = PixelConfig::default();
    out_cfg.set(PIXEL_FORMAT_BGRA_NONPREMUL, pixcfg.width(), pixcfg.height());
    let mut canvas = vec![0u8; out_cfg.pixbuf_len()];
    let mut frame_index = 0u64;
    loop {
        let mut fc = FrameConfig::default();
        let status = decoder.decode_frame_config(&mut fc, &mut src);
        if status == NOTE_END_OF_DATA {
            break;
        }
        anyhow::ensure!(status.is_ok(), "{}: frame config: {status}", path.display());

        let mut workbuf = vec![0u8; decoder.workbuf_len().max_incl as usize];
        let mut pixbuf = PixelBuffer::new(out_cfg, &mut canvas)
            .map_err(|s| anyhow::anyhow!("pixel buffer: {s}"))?;
        let status = decoder.decode_frame(
            &mut pixbuf,
            &mut src,
            PixelBlend::SrcOver,
            &mut workbuf,
            &DecodeFrameOptions::default(),
        );
        if status == NOTE_END_OF_DATA {
            break;
        }
        anyhow::ensure!(status.is_ok(), "{}: frame decode: {status}", path.display());

        let dirty = decoder.frame_dirty_rect();
        println!(
            "  frame {frame_index}: rect ({}, {}, {}, {}), {} ms",
            fc.bounds.min_incl_x,
            fc.bounds.min_incl_y,
            fc.bounds.max_excl_x,
            fc.bounds.max_excl_y,
            fc.duration,
        );
        log::debug!("  dirty rect: {dirty:?}");

        if args.dump {
            let out = path.with_extension(format!("frame{frame_index}.bgra"));
            let mut f =
                File::create(&out).with_context(|| format!("creating {}", out.display()))?;
            f.write_all(&canvas[..out_cfg.pixbuf_len()])?;
            log::info!("wrote {}", out.display());
        }
        frame_index += 1;
    }
    println!(
        "  {} frame(s), {} loop(s)",
        decoder.num_decoded_frames(),
        decoder.num_animation_loops(),
    );
    Ok(())
}
