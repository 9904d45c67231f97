use std::sync::Arc;

use asset_core::{
    dedupe, hamming_distance, Candidate, NoPixels, PerceptualHash, PixelHasher, PixelSource,
    DEFAULT_HAMMING_THRESHOLD,
};
use pretty_assertions::assert_eq;

/// Reads the fingerprint straight out of the first eight buffer bytes.
struct BytesAsHash;

impl PixelHasher for BytesAsHash {
    fn fingerprint(&self, pixels: &PixelSource) -> Option<PerceptualHash> {
        match pixels {
            PixelSource::Buffer(bytes) if bytes.len() >= 8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                Some(PerceptualHash(u64::from_le_bytes(raw)))
            }
            _ => None,
        }
    }
}

fn with_pixels(url: &str, hash: u64, width: u32, height: u32) -> Candidate {
    let bytes: Arc<[u8]> = hash.to_le_bytes().to_vec().into();
    Candidate::discovered(url)
        .with_pixels(PixelSource::Buffer(bytes))
        .with_dimensions(width, height)
}

/// Deterministic pseudo-random hashes, some deliberately close together.
fn noisy_set() -> Vec<Candidate> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut out = Vec::new();
    for i in 0..60u32 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let base = if i % 3 == 0 { 0xF0F0_F0F0_0F0F_0F0F } else { state };
        let jitter = u64::from(i % 5);
        out.push(with_pixels(
            &format!("https://img.example.com/{i}.png"),
            base ^ jitter,
            100 + i,
            100,
        ));
    }
    out
}

#[test]
fn larger_rendition_is_the_representative() {
    let small = with_pixels("https://a.example.com/board-small.jpg", 0xABCD, 800, 600);
    let large = with_pixels("https://b.example.com/board-large.jpg", 0xABCF, 1600, 1200);
    let out = dedupe(vec![small, large], DEFAULT_HAMMING_THRESHOLD, &BytesAsHash);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].url, "https://b.example.com/board-large.jpg");
    assert_eq!((out[0].width, out[0].height), (1600, 1200));
    assert_eq!(out[0].cluster_id, Some(0));
    assert_eq!(out[0].uniqueness_score, 0.0);
}

#[test]
fn same_url_from_two_providers_keeps_the_higher_priority_copy() {
    let a = Candidate::discovered("https://cdn.example.com/abyss/board.jpg")
        .with_provenance("provider_a", 0.85, 0, 0);
    let b = Candidate::discovered("https://cdn.example.com/abyss/board.jpg")
        .with_provenance("provider_b", 0.70, 1, 1);
    let out = dedupe(vec![a, b], DEFAULT_HAMMING_THRESHOLD, &NoPixels);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].provider, "provider_a");
    assert_eq!(out[0].provider_weight, 0.85);
    assert_eq!(out[0].uniqueness_score, 1.0);
}

#[test]
fn candidates_without_pixels_stay_singletons() {
    let a = Candidate::discovered("https://example.com/a.png");
    let b = Candidate::discovered("https://example.com/b.png");
    let out = dedupe(vec![a, b], 64, &BytesAsHash);
    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|c| c.uniqueness_score == 1.0));
    assert_eq!(out[0].cluster_id, Some(0));
    assert_eq!(out[1].cluster_id, Some(1));
}

#[test]
fn survivors_are_pairwise_farther_than_threshold() {
    let out = dedupe(noisy_set(), DEFAULT_HAMMING_THRESHOLD, &BytesAsHash);
    for (i, a) in out.iter().enumerate() {
        for b in &out[i + 1..] {
            let (Some(ha), Some(hb)) = (a.perceptual_hash, b.perceptual_hash) else {
                continue;
            };
            assert!(
                hamming_distance(ha.0, hb.0) > DEFAULT_HAMMING_THRESHOLD,
                "{} and {} are near-duplicates",
                a.url,
                b.url
            );
        }
    }
}

#[test]
fn dedupe_is_idempotent() {
    let once = dedupe(noisy_set(), DEFAULT_HAMMING_THRESHOLD, &BytesAsHash);
    let twice = dedupe(once.clone(), DEFAULT_HAMMING_THRESHOLD, &BytesAsHash);
    assert_eq!(once, twice);
}

#[test]
fn threshold_is_respected_at_the_boundary() {
    let a = with_pixels("https://example.com/a.png", 0, 10, 10);
    let six_bits = with_pixels("https://example.com/b.png", 0b11_1111, 10, 10);
    let seven_bits = with_pixels("https://example.com/c.png", 0b111_1111_0000_0000, 10, 10);
    let out = dedupe(vec![a, six_bits, seven_bits], 6, &BytesAsHash);
    let urls: Vec<&str> = out.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(urls, vec!["https://example.com/a.png", "https://example.com/c.png"]);
}
