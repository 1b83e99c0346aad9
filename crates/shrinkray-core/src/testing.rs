//! Deterministic fakes shared by the unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::decode::{DecodeError, Decoder, RasterImage};
use crate::encode::{OutputFormat, RasterSurface, SurfaceError};

/// RGBA gradient with a little texture so lossy codecs have work to do.
pub fn gradient_image(width: u32, height: u32) -> RasterImage {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.push(((x * 255) / width.max(1)) as u8);
            pixels.push(((y * 255) / height.max(1)) as u8);
            pixels.push(((x * 7 + y * 13) % 256) as u8);
            pixels.push(255);
        }
    }
    RasterImage::new(width, height, pixels).unwrap()
}

/// Pseudo-random RGBA noise from a seed (xorshift).
pub fn noise_image(width: u32, height: u32, seed: u32) -> RasterImage {
    let mut state = seed | 1;
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..width * height {
        for _ in 0..3 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            pixels.push((state & 0xFF) as u8);
        }
        pixels.push(255);
    }
    RasterImage::new(width, height, pixels).unwrap()
}

/// Surface whose output size is a known linear function of quality.
///
/// Records every probe so tests can count encodes and check the qualities
/// the caller asked for.
#[derive(Debug, Default)]
pub struct FakeSurface {
    absent: HashSet<OutputFormat>,
    failing: HashSet<OutputFormat>,
    calls: Mutex<Vec<(OutputFormat, f32)>>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `format` as unavailable.
    pub fn without(mut self, format: OutputFormat) -> Self {
        self.absent.insert(format);
        self
    }

    /// Fail with a platform error for `format`.
    pub fn failing(mut self, format: OutputFormat) -> Self {
        self.failing.insert(format);
        self
    }

    /// Encoded size in bytes for a quality.
    pub fn size_for(quality: f32) -> u64 {
        1000 + (10_000.0 * quality) as u64
    }

    /// Number of extract calls, including ones that produced nothing.
    pub fn probes(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Qualities of calls that produced a buffer, in call order.
    pub fn qualities(&self) -> Vec<f32> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(format, _)| !self.absent.contains(format) && !self.failing.contains(format))
            .map(|(_, q)| *q)
            .collect()
    }
}

impl RasterSurface for FakeSurface {
    fn extract(
        &self,
        _image: &RasterImage,
        format: OutputFormat,
        quality: f32,
    ) -> Result<Option<Vec<u8>>, SurfaceError> {
        self.calls.lock().unwrap().push((format, quality));
        if self.failing.contains(&format) {
            return Err(SurfaceError("fake platform failure".to_string()));
        }
        if self.absent.contains(&format) {
            return Ok(None);
        }
        Ok(Some(vec![0u8; Self::size_for(quality) as usize]))
    }
}

/// Decoder that yields a small gradient, failing on inputs starting with
/// `b"bad"`.
#[derive(Debug, Default)]
pub struct FakeDecoder {
    calls: Mutex<usize>,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl Decoder for FakeDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<RasterImage, DecodeError> {
        *self.calls.lock().unwrap() += 1;
        if bytes.starts_with(b"bad") {
            return Err(DecodeError::CorruptedFile("marked bad".to_string()));
        }
        Ok(gradient_image(4, 4))
    }
}
