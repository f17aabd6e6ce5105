//! DPCF: one recorded depth frame per file.
//!
//! File layout (little-endian):
//!   00  : [u8;4]  magic = b"DPCF"
//!   04  : u32     version = 1
//!   08  : u32     flags (bitfield)
//!                 bit 0 => confidence plane present
//!   0C  : u64     timestamp_ns
//!   14  : u32     width
//!   18  : u32     height
//!   1C  : f32[4]  fx, fy, cx, cy
//!   2C  : u32[2]  intrinsics reference width, height
//!   34  : f32[4]  pose rotation quaternion (x, y, z, w), camera-to-world
//!   44  : f32[3]  pose translation (metres)
//!   50  : u16     depth_mm[width * height]
//!   ..  : u8      confidence[width * height]   (if bit0)

use crate::frame::{CameraIntrinsics, DepthFrame, Pose};
use std::fs::File;
use std::io::{self, ErrorKind, Write};
use std::path::Path;

pub const DPCF_MAGIC: [u8; 4] = *b"DPCF";
pub const DPCF_VERSION: u32 = 1;

const FLAG_CONFIDENCE: u32 = 1 << 0;

#[inline(always)]
fn need(buf: &[u8], want: usize) -> io::Result<()> {
    if buf.len() < want {
        Err(io::Error::new(ErrorKind::UnexpectedEof, "truncated DPCF"))
    } else {
        Ok(())
    }
}

#[inline(always)]
fn take<'a>(buf: &mut &'a [u8], n: usize) -> io::Result<&'a [u8]> {
    need(buf, n)?;
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

#[inline(always)]
fn le_u32(buf: &mut &[u8]) -> io::Result<u32> {
    let b = take(buf, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[inline(always)]
fn le_u64(buf: &mut &[u8]) -> io::Result<u64> {
    let b = take(buf, 8)?;
    Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
}

#[inline(always)]
fn le_f32(buf: &mut &[u8]) -> io::Result<f32> {
    Ok(f32::from_bits(le_u32(buf)?))
}

#[cold]
fn bad(msg: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg)
}

/// Parse a DPCF frame from a contiguous byte slice.
pub fn parse_dpcf_bytes(mut p: &[u8]) -> io::Result<DepthFrame> {
    if take(&mut p, 4)? != DPCF_MAGIC {
        return Err(bad("bad DPCF magic"));
    }

    let version = le_u32(&mut p)?;
    if version != DPCF_VERSION {
        return Err(bad("unsupported DPCF version"));
    }

    let flags = le_u32(&mut p)?;
    let has_confidence = (flags & FLAG_CONFIDENCE) != 0;

    let timestamp_ns = le_u64(&mut p)?;
    let width = le_u32(&mut p)?;
    let height = le_u32(&mut p)?;
    if width == 0 || height == 0 {
        return Err(bad("DPCF frame has zero size"));
    }

    let intrinsics = CameraIntrinsics {
        fx: le_f32(&mut p)?,
        fy: le_f32(&mut p)?,
        cx: le_f32(&mut p)?,
        cy: le_f32(&mut p)?,
        width: le_u32(&mut p)?,
        height: le_u32(&mut p)?,
    };

    let pose = Pose {
        rotation: [
            le_f32(&mut p)?,
            le_f32(&mut p)?,
            le_f32(&mut p)?,
            le_f32(&mut p)?,
        ],
        translation: [le_f32(&mut p)?, le_f32(&mut p)?, le_f32(&mut p)?],
    };

    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| bad("frame size overflow"))?;
    let depth_bytes = pixels
        .checked_mul(2)
        .ok_or_else(|| bad("depth plane size overflow"))?;

    let raw = take(&mut p, depth_bytes)?;
    let depth_mm: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    let confidence = if has_confidence {
        Some(take(&mut p, pixels)?.to_vec())
    } else {
        None
    };

    if !p.is_empty() {
        return Err(bad("trailing bytes after DPCF payload"));
    }

    let frame = DepthFrame {
        timestamp_ns,
        intrinsics,
        pose,
        width,
        height,
        depth_mm,
        confidence,
    };
    frame.validate().map_err(|e| bad(&e.to_string()))?;

    Ok(frame)
}

/// Fast path: prefer mmap; fall back to a single read.
#[cfg(feature = "mmap")]
pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<DepthFrame> {
    let file = File::open(path)?;
    let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
    parse_dpcf_bytes(&map)
}

#[cfg(not(feature = "mmap"))]
pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<DepthFrame> {
    let bytes = std::fs::read(path)?;
    parse_dpcf_bytes(&bytes)
}

/// Serialize a frame. The frame's planes must match its dimensions.
pub fn encode(frame: &DepthFrame) -> io::Result<Vec<u8>> {
    frame
        .validate()
        .map_err(|e| io::Error::new(ErrorKind::InvalidData, e.to_string()))?;

    let pixels = frame.pixel_count();
    let planes = pixels * 2 + if frame.confidence.is_some() { pixels } else { 0 };
    let mut out = Vec::<u8>::with_capacity(0x50 + planes);

    let mut flags = 0u32;
    if frame.confidence.is_some() {
        flags |= FLAG_CONFIDENCE;
    }

    out.write_all(&DPCF_MAGIC)?;
    write_u32(&mut out, DPCF_VERSION)?;
    write_u32(&mut out, flags)?;
    out.write_all(&frame.timestamp_ns.to_le_bytes())?;
    write_u32(&mut out, frame.width)?;
    write_u32(&mut out, frame.height)?;

    let k = &frame.intrinsics;
    for v in [k.fx, k.fy, k.cx, k.cy] {
        write_f32(&mut out, v)?;
    }
    write_u32(&mut out, k.width)?;
    write_u32(&mut out, k.height)?;

    for v in frame.pose.rotation {
        write_f32(&mut out, v)?;
    }
    for v in frame.pose.translation {
        write_f32(&mut out, v)?;
    }

    for &d in &frame.depth_mm {
        out.write_all(&d.to_le_bytes())?;
    }

    if let Some(confidence) = frame.confidence.as_ref() {
        out.write_all(confidence)?;
    }

    Ok(out)
}

pub fn write_file<P: AsRef<Path>>(path: P, frame: &DepthFrame) -> io::Result<()> {
    let bytes = encode(frame)?;

    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    file.flush()?;

    Ok(())
}

#[inline]
fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[inline]
fn write_f32<W: Write>(w: &mut W, v: f32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}
