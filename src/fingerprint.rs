//! Perceptual image fingerprinting and matching.
//!
//! Feed images and platform posts are compared by a 64-bit DCT perceptual
//! hash so a republished image can be recognized even after the platform
//! re-encoded or resized it. Two fingerprints compare by Hamming distance;
//! near-duplicates score low, unrelated images score high.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use img_hash::{HashAlg, HasherConfig, ImageHash};
use tracing::{debug, warn};

/// Hash edge length; 8x8 bits gives the 64-bit hash the matcher expects.
const HASH_SIZE: u32 = 8;

/// Maximum Hamming distance at which two images count as the same picture.
pub const MATCH_THRESHOLD: u32 = 10;

/// Download attempts before an image is treated as permanently unavailable.
const DOWNLOAD_ATTEMPTS: u32 = 3;

/// A fixed-size perceptual hash of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFingerprint(ImageHash<Box<[u8]>>);

impl ImageFingerprint {
    /// Compute the fingerprint of an encoded image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be decoded.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        // Use img_hash's re-exported image crate for compatibility
        let img = img_hash::image::load_from_memory(data).context("Failed to decode image")?;
        Ok(Self::from_image(&img))
    }

    /// Compute the fingerprint of a decoded image.
    #[must_use]
    pub fn from_image(img: &img_hash::image::DynamicImage) -> Self {
        let hasher = HasherConfig::new()
            .hash_size(HASH_SIZE, HASH_SIZE)
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .to_hasher();

        Self(hasher.hash_image(img))
    }

    /// Parse a fingerprint from its base64 form.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid hash.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let hash =
            ImageHash::from_base64(encoded).map_err(|e| anyhow!("Failed to parse hash: {e:?}"))?;
        Ok(Self(hash))
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        self.0.to_base64()
    }

    /// Hamming distance to another fingerprint; 0 means perceptually identical.
    #[must_use]
    pub fn distance(&self, other: &Self) -> u32 {
        self.0.dist(&other.0)
    }
}

/// Anything carrying a precomputed fingerprint that can be matched against.
pub trait Fingerprinted {
    fn fingerprint(&self) -> &ImageFingerprint;
}

/// Find the first candidate within `threshold` of `target`.
///
/// This is deliberately a first-match linear scan rather than a global
/// minimum: when several feed images are similar only within the acceptable
/// window, first-encountered order keeps the pairing stable across runs.
pub fn best_match<'a, T: Fingerprinted>(
    target: &ImageFingerprint,
    candidates: &'a [T],
    threshold: u32,
) -> Option<&'a T> {
    for candidate in candidates {
        let distance = target.distance(candidate.fingerprint());
        debug!(distance, threshold, "Fingerprint comparison");
        if distance <= threshold {
            return Some(candidate);
        }
    }
    None
}

/// Download an image and fingerprint it.
///
/// Connection failures and 5xx responses are retried with linear backoff
/// (1s, 2s, 3s). Other error statuses and undecodable bodies fail
/// immediately; the caller is expected to skip the image.
///
/// # Errors
///
/// Returns an error once the download attempts are exhausted or the image
/// cannot be decoded.
pub async fn fingerprint_from_url(
    client: &reqwest::Client,
    image_url: &str,
) -> Result<ImageFingerprint> {
    let mut last_err = None;

    for attempt in 1..=DOWNLOAD_ATTEMPTS {
        let response = match client.get(image_url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    attempt,
                    max = DOWNLOAD_ATTEMPTS,
                    url = %image_url,
                    "Image download failed: {e}"
                );
                last_err = Some(anyhow::Error::from(e));
                tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
                continue;
            }
        };

        let status = response.status();
        if status.is_server_error() {
            warn!(
                attempt,
                max = DOWNLOAD_ATTEMPTS,
                url = %image_url,
                status = status.as_u16(),
                "Image download failed"
            );
            last_err = Some(anyhow!("failed to download image: status {status}"));
            tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
            continue;
        }
        if !status.is_success() {
            bail!("failed to download image: status {status}");
        }

        let data = response.bytes().await.context("Failed to read image body")?;
        return ImageFingerprint::from_bytes(&data);
    }

    Err(last_err.unwrap_or_else(|| anyhow!("image download failed")))
        .with_context(|| format!("after {DOWNLOAD_ATTEMPTS} attempts: {image_url}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Candidate {
        name: &'static str,
        hash: ImageFingerprint,
    }

    impl Fingerprinted for Candidate {
        fn fingerprint(&self) -> &ImageFingerprint {
            &self.hash
        }
    }

    // 8 bytes = 64 bits, base64 encoded as img_hash does.
    const ZEROS: &str = "AAAAAAAAAAA=";
    // One bit set -> distance 1 from ZEROS.
    const ONE_BIT: &str = "AQAAAAAAAAA=";
    // All bits set -> distance 64 from ZEROS.
    const ALL_BITS: &str = "//////////8=";

    fn fp(encoded: &str) -> ImageFingerprint {
        ImageFingerprint::from_base64(encoded).unwrap()
    }

    #[test]
    fn distance_counts_differing_bits() {
        assert_eq!(fp(ZEROS).distance(&fp(ZEROS)), 0);
        assert_eq!(fp(ZEROS).distance(&fp(ONE_BIT)), 1);
        assert_eq!(fp(ZEROS).distance(&fp(ALL_BITS)), 64);
    }

    #[test]
    fn best_match_returns_first_within_threshold() {
        let candidates = vec![
            Candidate {
                name: "far",
                hash: fp(ALL_BITS),
            },
            Candidate {
                name: "close-a",
                hash: fp(ONE_BIT),
            },
            Candidate {
                name: "close-b",
                hash: fp(ZEROS),
            },
        ];

        // Both close-a and close-b are within threshold; iteration order wins.
        let matched = best_match(&fp(ZEROS), &candidates, MATCH_THRESHOLD).unwrap();
        assert_eq!(matched.name, "close-a");
    }

    #[test]
    fn best_match_returns_none_beyond_threshold() {
        let candidates = vec![Candidate {
            name: "far",
            hash: fp(ALL_BITS),
        }];
        assert!(best_match(&fp(ZEROS), &candidates, MATCH_THRESHOLD).is_none());
    }

    #[test]
    fn fingerprints_decoded_images() {
        // 1x1 white pixel PNG
        let white_pixel = [
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
            0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00,
            0x00, 0x90, 0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08,
            0xD7, 0x63, 0xF8, 0xFF, 0xFF, 0x3F, 0x00, 0x05, 0xFE, 0x02, 0xFE, 0xDC, 0xCC, 0x59,
            0xE7, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
        ];

        let hash = ImageFingerprint::from_bytes(&white_pixel).unwrap();
        assert_eq!(hash.distance(&hash), 0);

        let roundtrip = ImageFingerprint::from_base64(&hash.to_base64()).unwrap();
        assert_eq!(hash.distance(&roundtrip), 0);
    }

    #[test]
    fn rejects_undecodable_bytes() {
        assert!(ImageFingerprint::from_bytes(b"not an image").is_err());
    }
}
