use asset_core::{average_hash, PerceptualHash, PixelHasher, PixelSource, HASH_GRID};
use harvest_logging::harvest_trace;
use image::imageops::FilterType;
use image::DynamicImage;

/// Longest side the sharpness measure works on.
const SHARPNESS_SIDE: u32 = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: Option<String>,
    pub has_alpha: bool,
    pub hash: PerceptualHash,
    /// Variance of the Laplacian over a downscaled luma copy.
    pub sharpness: f64,
}

/// Reads metadata from encoded image bytes; `None` when the bytes are not an image.
pub trait ImageProbe: Send + Sync {
    fn probe(&self, bytes: &[u8]) -> Option<ImageMetadata>;
}

/// Probe and fingerprinter backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateProbe;

impl ImageProbe for ImageCrateProbe {
    fn probe(&self, bytes: &[u8]) -> Option<ImageMetadata> {
        let format = image::guess_format(bytes)
            .ok()
            .and_then(|f| f.extensions_str().first().map(|ext| ext.to_string()));
        let decoded = match image::load_from_memory(bytes) {
            Ok(decoded) => decoded,
            Err(err) => {
                harvest_trace!("image probe rejected {} bytes: {}", bytes.len(), err);
                return None;
            }
        };
        Some(ImageMetadata {
            width: decoded.width(),
            height: decoded.height(),
            format,
            has_alpha: decoded.color().has_alpha(),
            hash: fingerprint_image(&decoded),
            sharpness: laplacian_variance(&decoded),
        })
    }
}

impl PixelHasher for ImageCrateProbe {
    fn fingerprint(&self, pixels: &PixelSource) -> Option<PerceptualHash> {
        let decoded = match pixels {
            PixelSource::Buffer(bytes) => image::load_from_memory(bytes).ok()?,
            PixelSource::Path(path) => image::open(path).ok()?,
            PixelSource::Absent => return None,
        };
        Some(fingerprint_image(&decoded))
    }
}

/// 8×8 grayscale average hash.
pub fn fingerprint_image(image: &DynamicImage) -> PerceptualHash {
    let side = HASH_GRID as u32;
    let small = image.resize_exact(side, side, FilterType::Triangle).to_luma8();
    let mut grid = [0u8; HASH_GRID * HASH_GRID];
    for (cell, pixel) in grid.iter_mut().zip(small.pixels()) {
        *cell = pixel.0[0];
    }
    average_hash(&grid)
}

/// Focus measure: higher means more edge energy.
pub fn laplacian_variance(image: &DynamicImage) -> f64 {
    let luma = image.thumbnail(SHARPNESS_SIDE, SHARPNESS_SIDE).to_luma8();
    let (w, h) = luma.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let at = |x: u32, y: u32| f64::from(luma.get_pixel(x, y).0[0]);
    let mut responses = Vec::with_capacity(((w - 2) * (h - 2)) as usize);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let value =
                4.0 * at(x, y) - at(x - 1, y) - at(x + 1, y) - at(x, y - 1) - at(x, y + 1);
            responses.push(value);
        }
    }
    let n = responses.len() as f64;
    let mean = responses.iter().sum::<f64>() / n;
    responses.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}
