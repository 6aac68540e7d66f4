//! PTC1: compact snapshot format for merged 2-D point sets.
//!
//! - Stores the grid anchor (east, north indices) of the local frame.
//! - Stores i32 (x, y) offsets per point in `units_per_meter` units.
//! - Default units: 100 units/meter (centimetres).
//! - Optional u64 generation token used by callers to invalidate snapshots.
//!
//! File layout (little-endian):
//!   00  : [u8;4]  magic = b"PTC1"
//!   04  : u32     version = 1
//!   08  : u32     flags (bitfield)
//!                 bit 0 => generation token present
//!   0C  : u32     points_count
//!   10  : u32     units_per_meter (default: 100, cm)
//!   14  : i64[2]  anchor (min_east, min_north)
//!   ..  : u64     generation          (if bit0)
//!   ..  : for each point: i32 x, i32 y

use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const PTC_MAGIC: [u8; 4] = *b"PTC1";
pub const PTC_VERSION: u32 = 1;

/// Default lattice: centimetres.
pub const DEFAULT_UNITS_PER_METER: u32 = 100;

const FLAG_GENERATION: u32 = 1 << 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointSnapshot {
    pub units_per_meter: u32,
    /// Grid indices of the tile anchoring the local frame.
    pub anchor: [i64; 2],
    pub generation: Option<u64>,
    pub xs: Vec<i32>,
    pub ys: Vec<i32>,
}

impl PointSnapshot {
    #[inline]
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }
}

#[inline(always)]
fn need(buf: &[u8], want: usize) -> io::Result<()> {
    if buf.len() < want {
        Err(io::Error::new(ErrorKind::UnexpectedEof, "truncated PTC1"))
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
fn le_i64(buf: &mut &[u8]) -> io::Result<i64> {
    let b = take(buf, 8)?;
    Ok(i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
}

#[inline(always)]
fn le_u64(buf: &mut &[u8]) -> io::Result<u64> {
    let b = take(buf, 8)?;
    Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
}

#[cold]
fn bad(msg: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg)
}

/// Parse PTC1 from a contiguous byte slice.
pub fn parse_ptc_bytes(mut p: &[u8]) -> io::Result<PointSnapshot> {
    if take(&mut p, 4)? != PTC_MAGIC {
        return Err(bad("bad PTC1 magic"));
    }

    let version = le_u32(&mut p)?;
    if version != PTC_VERSION {
        return Err(bad("unsupported PTC1 version"));
    }

    let flags = le_u32(&mut p)?;
    let has_generation = (flags & FLAG_GENERATION) != 0;

    let count = le_u32(&mut p)? as usize;
    let units_per_meter = le_u32(&mut p)?;
    if units_per_meter == 0 {
        return Err(bad("units_per_meter must be > 0"));
    }

    let anchor = [le_i64(&mut p)?, le_i64(&mut p)?];

    let generation = if has_generation {
        Some(le_u64(&mut p)?)
    } else {
        None
    };

    let pts_bytes = count
        .checked_mul(8)
        .ok_or_else(|| bad("points size overflow"))?;
    let raw = take(&mut p, pts_bytes)?;

    if !p.is_empty() {
        return Err(bad("trailing bytes after points block"));
    }

    let mut xs = Vec::with_capacity(count);
    let mut ys = Vec::with_capacity(count);

    // Zero-copy view when the block happens to be 4-aligned; portable decode otherwise.
    #[cfg(target_endian = "little")]
    let pairs: Option<&[[i32; 2]]> = bytemuck::try_cast_slice(raw).ok();
    #[cfg(not(target_endian = "little"))]
    let pairs: Option<&[[i32; 2]]> = None;

    match pairs {
        Some(pairs) => {
            for &[x, y] in pairs {
                xs.push(x);
                ys.push(y);
            }
        }
        None => {
            for chunk in raw.chunks_exact(8) {
                xs.push(i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
                ys.push(i32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]));
            }
        }
    }

    Ok(PointSnapshot {
        units_per_meter,
        anchor,
        generation,
        xs,
        ys,
    })
}

/// Fast path: prefer mmap; fall back to a single read.
#[cfg(feature = "mmap")]
pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<PointSnapshot> {
    let file = File::open(path)?;
    let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
    parse_ptc_bytes(&map)
}

#[cfg(not(feature = "mmap"))]
pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<PointSnapshot> {
    let bytes = fs::read(path)?;
    parse_ptc_bytes(&bytes)
}

/// Serialize a snapshot into any writer.
pub fn write_snapshot<W: Write>(w: &mut W, snap: &PointSnapshot) -> io::Result<()> {
    if snap.xs.len() != snap.ys.len() {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            "xs length != ys length",
        ));
    }

    let count = u32::try_from(snap.xs.len())
        .map_err(|_| io::Error::new(ErrorKind::InvalidData, "too many points for PTC1"))?;

    let mut flags = 0u32;
    if snap.generation.is_some() {
        flags |= FLAG_GENERATION;
    }

    w.write_all(&PTC_MAGIC)?;

    write_u32(w, PTC_VERSION)?;
    write_u32(w, flags)?;
    write_u32(w, count)?;
    write_u32(w, snap.units_per_meter)?;

    write_i64(w, snap.anchor[0])?;
    write_i64(w, snap.anchor[1])?;

    if let Some(generation) = snap.generation {
        w.write_all(&generation.to_le_bytes())?;
    }

    for (&x, &y) in snap.xs.iter().zip(snap.ys.iter()) {
        write_i32(w, x)?;
        write_i32(w, y)?;
    }

    Ok(())
}

/// Path used for the in-progress copy of `path`.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write the snapshot next to `path` and rename it into place once complete,
/// so readers never observe a partial file.
pub fn write_file<P: AsRef<Path>>(path: P, snap: &PointSnapshot) -> io::Result<()> {
    let path = path.as_ref();
    let tmp = temp_path_for(path);

    {
        let mut out = BufWriter::new(File::create(&tmp)?);
        write_snapshot(&mut out, snap)?;
        out.flush()?;
    }

    fs::rename(&tmp, path)
}

#[inline]
fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[inline]
fn write_i32<W: Write>(w: &mut W, v: i32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[inline]
fn write_i64<W: Write>(w: &mut W, v: i64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(generation: Option<u64>) -> PointSnapshot {
        PointSnapshot {
            units_per_meter: DEFAULT_UNITS_PER_METER,
            anchor: [4810, 54560],
            generation,
            xs: vec![0, 5, 5000, -12, i32::MAX],
            ys: vec![0, 0, 5000, 7, i32::MIN],
        }
    }

    #[test]
    fn file_round_trip_keeps_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.ptc");

        let snap = sample(Some(7));
        write_file(&path, &snap).unwrap();

        assert!(!temp_path_for(&path).exists());
        assert_eq!(read_file(&path).unwrap(), snap);
    }

    #[test]
    fn generation_is_optional() {
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &sample(None)).unwrap();

        // Header without the generation token is 36 bytes.
        assert_eq!(buf.len(), 36 + 5 * 8);
        assert_eq!(parse_ptc_bytes(&buf).unwrap().generation, None);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &sample(Some(1))).unwrap();
        buf.truncate(buf.len() - 3);

        let err = parse_ptc_bytes(&buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &sample(None)).unwrap();
        buf[0] = b'X';

        let err = parse_ptc_bytes(&buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn mismatched_axes_are_not_written() {
        let mut snap = sample(None);
        snap.ys.pop();

        let mut buf = Vec::new();
        assert!(write_snapshot(&mut buf, &snap).is_err());
    }
}
