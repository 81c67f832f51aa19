//! Pixel source and frame compositing
//!
//! The presentation core only needs an RGBA row-major bitmap. Decoding is
//! delegated to the `image` crate; compositing converts the bitmap into the
//! packed little-endian ARGB8888 layout that wl_shm buffers use.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

/// Bytes per packed 32-bit pixel
pub const BYTES_PER_PIXEL: u32 = 4;

/// Pixel formats a compositor may advertise for shared-memory buffers.
///
/// The two legacy formats carry the wl_shm enum values 0 and 1, every other
/// format uses its DRM fourcc code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32-bit packed, 8-bit alpha + red + green + blue
    Argb8888,
    /// Same layout as ARGB8888 with the alpha byte ignored
    Xrgb8888,
    Other(u32),
}

impl PixelFormat {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => PixelFormat::Argb8888,
            1 => PixelFormat::Xrgb8888,
            other => PixelFormat::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            PixelFormat::Argb8888 => 0,
            PixelFormat::Xrgb8888 => 1,
            PixelFormat::Other(code) => code,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Argb8888 => write!(f, "ARGB8888"),
            PixelFormat::Xrgb8888 => write!(f, "XRGB8888"),
            PixelFormat::Other(code) => write!(f, "{:#010x}", code),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("bitmap {width}x{height} carries {len} bytes, expected {expected}")]
    Malformed {
        width: u32,
        height: u32,
        len: usize,
        expected: usize,
    },
}

/// Decoded image, 4 bytes per pixel in R, G, B, A order, rows top to bottom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Bitmap {
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, SourceError> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL as usize;
        if rgba.len() != expected {
            return Err(SourceError::Malformed {
                width,
                height,
                len: rgba.len(),
                expected,
            });
        }
        Ok(Self { width, height, rgba })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn row(&self, y: u32) -> &[u8] {
        let stride = (self.width * BYTES_PER_PIXEL) as usize;
        let start = y as usize * stride;
        &self.rgba[start..start + stride]
    }
}

/// Decode an image file into an RGBA bitmap
pub fn decode(path: &Path) -> Result<Bitmap, SourceError> {
    let reader = image::ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let decoded = reader.decode().map_err(|source| SourceError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    Bitmap::from_rgba(width, height, rgba.into_raw())
}

/// Supplies the bitmap to composite into each frame
pub trait PixelSource {
    fn current(&mut self, time: u32) -> Result<&Bitmap, SourceError>;
}

/// Pixel source backed by an image file on disk.
///
/// The file is decoded on first successful use and cached. While the file is
/// missing or undecodable every frame retries, but only the first failure of
/// a streak is logged as a warning.
pub struct ImageFileSource {
    path: PathBuf,
    cached: Option<Bitmap>,
    failing: bool,
}

impl ImageFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: None,
            failing: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&mut self) -> Result<Bitmap, SourceError> {
        match decode(&self.path) {
            Ok(bitmap) => {
                info!(
                    "Decoded {:?} ({}x{})",
                    self.path,
                    bitmap.width(),
                    bitmap.height()
                );
                self.failing = false;
                Ok(bitmap)
            }
            Err(e) => {
                if !self.failing {
                    warn!("Pixel source unavailable, presenting blank frames: {}", e);
                } else {
                    debug!("Pixel source still unavailable: {}", e);
                }
                self.failing = true;
                Err(e)
            }
        }
    }
}

impl PixelSource for ImageFileSource {
    fn current(&mut self, _time: u32) -> Result<&Bitmap, SourceError> {
        let bitmap = match self.cached.take() {
            Some(bitmap) => bitmap,
            None => self.load()?,
        };
        Ok(self.cached.insert(bitmap))
    }
}

/// Paint one frame into a mapped buffer.
///
/// The buffer is cleared to fully transparent, then the bitmap is copied in,
/// clipped to the smaller of the two extents. Each destination pixel is the
/// little-endian packing of `a << 24 | r << 16 | g << 8 | b`.
pub fn paint_frame(dst: &mut [u8], width: u32, height: u32, bitmap: Option<&Bitmap>) {
    dst.fill(0);

    let Some(bitmap) = bitmap else { return };

    let dst_stride = (width * BYTES_PER_PIXEL) as usize;
    let rows = height.min(bitmap.height());
    let cols = width.min(bitmap.width()) as usize;

    for y in 0..rows {
        let start = y as usize * dst_stride;
        let Some(dst_row) = dst.get_mut(start..start + dst_stride) else {
            return;
        };

        let src = bitmap.row(y).chunks_exact(4).take(cols);
        for (out, px) in dst_row.chunks_exact_mut(4).zip(src) {
            let packed = (px[3] as u32) << 24
                | (px[0] as u32) << 16
                | (px[1] as u32) << 8
                | px[2] as u32;
            out.copy_from_slice(&packed.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel_at(buf: &[u8], width: u32, x: u32, y: u32) -> u32 {
        let i = ((y * width + x) * 4) as usize;
        u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]])
    }

    #[test]
    fn test_format_codes() {
        assert_eq!(PixelFormat::from_code(0), PixelFormat::Argb8888);
        assert_eq!(PixelFormat::from_code(1), PixelFormat::Xrgb8888);
        assert_eq!(PixelFormat::from_code(0x34325241).code(), 0x34325241);
        assert_eq!(PixelFormat::Xrgb8888.to_string(), "XRGB8888");
    }

    #[test]
    fn test_bitmap_rejects_short_data() {
        let err = Bitmap::from_rgba(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, SourceError::Malformed { expected: 16, .. }));
    }

    #[test]
    fn test_paint_converts_rgba_to_argb() {
        let bitmap = Bitmap::from_rgba(1, 1, vec![0x11, 0x22, 0x33, 0x44]).unwrap();
        let mut buf = vec![0xff; 4];

        paint_frame(&mut buf, 1, 1, Some(&bitmap));

        assert_eq!(pixel_at(&buf, 1, 0, 0), 0x4411_2233);
        // little-endian in memory: B, G, R, A
        assert_eq!(buf, vec![0x33, 0x22, 0x11, 0x44]);
    }

    #[test]
    fn test_paint_clips_larger_bitmap() {
        let rgba: Vec<u8> = (0..4 * 4).flat_map(|i| [i as u8, 0, 0, 0xff]).collect();
        let bitmap = Bitmap::from_rgba(4, 4, rgba).unwrap();
        let mut buf = vec![0xaa; 2 * 2 * 4];

        paint_frame(&mut buf, 2, 2, Some(&bitmap));

        assert_eq!(pixel_at(&buf, 2, 0, 0), 0xff00_0000);
        assert_eq!(pixel_at(&buf, 2, 1, 0), 0xff01_0000);
        assert_eq!(pixel_at(&buf, 2, 0, 1), 0xff04_0000);
        assert_eq!(pixel_at(&buf, 2, 1, 1), 0xff05_0000);
    }

    #[test]
    fn test_paint_leaves_uncovered_area_transparent() {
        let bitmap = Bitmap::from_rgba(1, 1, vec![1, 2, 3, 4]).unwrap();
        let mut buf = vec![0xff; 3 * 2 * 4];

        paint_frame(&mut buf, 3, 2, Some(&bitmap));

        assert_eq!(pixel_at(&buf, 3, 0, 0), 0x0401_0203);
        for (x, y) in [(1, 0), (2, 0), (0, 1), (1, 1), (2, 1)] {
            assert_eq!(pixel_at(&buf, 3, x, y), 0, "pixel ({x}, {y})");
        }
    }

    #[test]
    fn test_paint_without_bitmap_clears() {
        let mut buf = vec![0xff; 16];
        paint_frame(&mut buf, 2, 2, None);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ImageFileSource::new(dir.path().join("absent.png"));

        assert!(matches!(source.current(0), Err(SourceError::Io { .. })));
        // still failing on the next frame, no panic, no cache
        assert!(source.current(16).is_err());
    }

    #[test]
    fn test_file_source_decodes_png_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        image::RgbaImage::from_raw(2, 1, vec![255, 0, 0, 255, 0, 255, 0, 128])
            .unwrap()
            .save(&path)
            .unwrap();

        let mut source = ImageFileSource::new(&path);
        let bitmap = source.current(0).unwrap().clone();
        assert_eq!((bitmap.width(), bitmap.height()), (2, 1));

        // cached: deleting the file does not affect later frames
        std::fs::remove_file(&path).unwrap();
        assert_eq!(source.current(16).unwrap(), &bitmap);
    }

    #[test]
    fn test_file_source_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not an image").unwrap();

        let mut source = ImageFileSource::new(&path);
        assert!(matches!(source.current(0), Err(SourceError::Decode { .. })));
    }
}
