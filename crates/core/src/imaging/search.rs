//! Quality search toward a byte budget.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::codec::{ImageCodec, ImageCodecError, ImageFormat};
use crate::config::{ImageSearchConfig, SearchStrategy};

/// One encode tried during the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityAttempt {
    pub quality: u8,
    pub size_bytes: u64,
}

/// Why the engine copied the input through instead of searching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyReason {
    /// The format has no quality parameter.
    UnsupportedFormat(String),
    /// Decoding or encoding failed part way.
    CodecFailure(String),
    /// The configured quality range has no rungs.
    EmptyLadder,
}

impl std::fmt::Display for CopyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedFormat(ext) => {
                write!(f, "size targeting is not supported for .{} images", ext)
            }
            Self::CodecFailure(reason) => write!(f, "image encoder failed: {}", reason),
            Self::EmptyLadder => f.write_str("no quality levels are configured"),
        }
    }
}

/// Result of searching the quality ladder.
#[derive(Debug, Clone)]
pub enum ImageCompression {
    /// An encoding was produced. `within_budget` is false when even the lowest
    /// quality overshot; `bytes` is then the lowest-quality encoding.
    Encoded {
        quality: u8,
        bytes: Vec<u8>,
        within_budget: bool,
        attempts: Vec<QualityAttempt>,
    },
    /// The caller should copy the input unchanged.
    CopyThrough { reason: CopyReason },
}

/// Searches lossy image quality for the largest encoding that fits a budget.
pub struct ImageSizeSearch {
    codec: Arc<dyn ImageCodec>,
    config: ImageSearchConfig,
}

impl ImageSizeSearch {
    pub fn new(codec: Arc<dyn ImageCodec>, config: ImageSearchConfig) -> Self {
        Self { codec, config }
    }

    /// Decodes `input` and searches `ladder` for the highest quality whose encoding
    /// is at most `target_bytes`. Blocking; run it off the async executor.
    pub fn compress(
        &self,
        input: &Path,
        extension: &str,
        ladder: &[u8],
        target_bytes: u64,
    ) -> ImageCompression {
        let format = match ImageFormat::from_extension(extension) {
            Some(format) if format.accepts_quality() && self.codec.supports_quality(format) => {
                format
            }
            _ => {
                info!(extension, "Format has no quality parameter, copying through");
                return ImageCompression::CopyThrough {
                    reason: CopyReason::UnsupportedFormat(extension.to_string()),
                };
            }
        };
        if ladder.is_empty() {
            warn!(extension, "Quality ladder is empty, copying through");
            return ImageCompression::CopyThrough {
                reason: CopyReason::EmptyLadder,
            };
        }

        let image = match self.codec.decode(input) {
            Ok(image) => image,
            Err(e) => {
                warn!(input = %input.display(), error = %e, "Decode failed, copying through");
                return ImageCompression::CopyThrough {
                    reason: CopyReason::CodecFailure(e.to_string()),
                };
            }
        };

        match self.search(&image, format, ladder, target_bytes) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Encode failed during quality search, copying through");
                ImageCompression::CopyThrough {
                    reason: CopyReason::CodecFailure(e.to_string()),
                }
            }
        }
    }

    /// Runs the configured search strategy down `ladder` over an already decoded image.
    pub fn search(
        &self,
        image: &DynamicImage,
        format: ImageFormat,
        ladder: &[u8],
        target_bytes: u64,
    ) -> Result<ImageCompression, ImageCodecError> {
        if ladder.is_empty() {
            return Ok(ImageCompression::CopyThrough {
                reason: CopyReason::EmptyLadder,
            });
        }
        let mut probe = LadderProbe::new(self.codec.as_ref(), image, format, ladder);

        let chosen = match self.config.strategy {
            SearchStrategy::Linear => probe.linear(target_bytes)?,
            SearchStrategy::Binary => {
                let chosen = probe.bisect(target_bytes)?;
                if probe.is_monotonic() {
                    chosen
                } else {
                    warn!("Encoded sizes are not monotonic in quality, rescanning linearly");
                    probe.linear(target_bytes)?
                }
            }
        };

        Ok(probe.finish(chosen, target_bytes))
    }
}

/// Encodes rungs of the ladder on demand, caching results by rung index.
struct LadderProbe<'a> {
    codec: &'a dyn ImageCodec,
    image: &'a DynamicImage,
    format: ImageFormat,
    ladder: &'a [u8],
    encoded: BTreeMap<usize, Vec<u8>>,
    attempts: Vec<QualityAttempt>,
}

impl<'a> LadderProbe<'a> {
    fn new(
        codec: &'a dyn ImageCodec,
        image: &'a DynamicImage,
        format: ImageFormat,
        ladder: &'a [u8],
    ) -> Self {
        Self {
            codec,
            image,
            format,
            ladder,
            encoded: BTreeMap::new(),
            attempts: Vec::new(),
        }
    }

    fn size_at(&mut self, index: usize) -> Result<u64, ImageCodecError> {
        if let Some(bytes) = self.encoded.get(&index) {
            return Ok(bytes.len() as u64);
        }
        let quality = self.ladder[index];
        let bytes = self.codec.encode(self.image, self.format, Some(quality))?;
        let size_bytes = bytes.len() as u64;
        debug!(quality, size_bytes, "Tried quality");
        self.attempts.push(QualityAttempt {
            quality,
            size_bytes,
        });
        self.encoded.insert(index, bytes);
        Ok(size_bytes)
    }

    /// First rung, scanning from the top, that fits. `None` when nothing fits.
    fn linear(&mut self, target_bytes: u64) -> Result<Option<usize>, ImageCodecError> {
        for index in 0..self.ladder.len() {
            if self.size_at(index)? <= target_bytes {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Lower-bound bisection for the first fitting rung, assuming sizes shrink down the ladder.
    ///
    /// The top rung is always encoded first so the monotonicity check has an anchor.
    fn bisect(&mut self, target_bytes: u64) -> Result<Option<usize>, ImageCodecError> {
        if self.size_at(0)? <= target_bytes {
            return Ok(Some(0));
        }
        let (mut lo, mut hi) = (1, self.ladder.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.size_at(mid)? <= target_bytes {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Ok((lo < self.ladder.len()).then_some(lo))
    }

    /// Whether every size observed so far is non-increasing down the ladder.
    fn is_monotonic(&self) -> bool {
        let sizes: Vec<usize> = self.encoded.values().map(Vec::len).collect();
        sizes.windows(2).all(|w| w[0] >= w[1])
    }

    fn finish(mut self, chosen: Option<usize>, target_bytes: u64) -> ImageCompression {
        let (index, within_budget) = match chosen {
            Some(index) => (index, true),
            None => (self.ladder.len().saturating_sub(1), false),
        };

        // Both search paths encode the lowest rung before reporting no fit.
        let bytes = self.encoded.remove(&index).unwrap_or_default();
        let quality = self.ladder.get(index).copied().unwrap_or_default();

        if within_budget {
            info!(quality, size_bytes = bytes.len(), target_bytes, "Found quality within budget");
        } else {
            warn!(
                quality,
                size_bytes = bytes.len(),
                target_bytes,
                "Lowest quality still exceeds budget"
            );
        }

        ImageCompression::Encoded {
            quality,
            bytes,
            within_budget,
            attempts: self.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockImageCodec;
    use image::RgbImage;

    fn blank() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(4, 4))
    }

    fn engine(codec: MockImageCodec, strategy: SearchStrategy) -> ImageSizeSearch {
        ImageSizeSearch::new(
            Arc::new(codec),
            ImageSearchConfig {
                strategy,
                ..Default::default()
            },
        )
    }

    fn ladder() -> Vec<u8> {
        ImageSearchConfig::default().quality_ladder()
    }

    fn unwrap_encoded(result: ImageCompression) -> (u8, Vec<u8>, bool, Vec<QualityAttempt>) {
        match result {
            ImageCompression::Encoded {
                quality,
                bytes,
                within_budget,
                attempts,
            } => (quality, bytes, within_budget, attempts),
            other => panic!("expected encoding, got {:?}", other),
        }
    }

    #[test]
    fn test_linear_returns_highest_fitting_quality() {
        // size = quality * 100: 95 -> 9500, 60 -> 6000, 55 -> 5500
        let search = engine(MockImageCodec::linear(100), SearchStrategy::Linear);
        let (quality, bytes, within, attempts) =
            unwrap_encoded(search.search(&blank(), ImageFormat::Jpeg, &ladder(), 6000).unwrap());
        assert_eq!(quality, 60);
        assert_eq!(bytes.len(), 6000);
        assert!(within);
        // 95, 90, ..., 60 tried in order and nothing below
        assert_eq!(attempts.len(), 8);
        assert_eq!(attempts.first().unwrap().quality, 95);
        assert_eq!(attempts.last().unwrap().quality, 60);
    }

    #[test]
    fn test_budget_above_top_quality_stops_at_first_try() {
        let search = engine(MockImageCodec::linear(100), SearchStrategy::Linear);
        let (quality, _, within, attempts) = unwrap_encoded(
            search
                .search(&blank(), ImageFormat::Jpeg, &ladder(), 1_000_000)
                .unwrap(),
        );
        assert_eq!(quality, 95);
        assert!(within);
        assert_eq!(attempts.len(), 1);
    }

    #[test]
    fn test_exhausted_ladder_keeps_lowest_quality() {
        let search = engine(MockImageCodec::linear(100), SearchStrategy::Linear);
        let (quality, bytes, within, attempts) =
            unwrap_encoded(search.search(&blank(), ImageFormat::Jpeg, &ladder(), 500).unwrap());
        assert_eq!(quality, 10);
        assert_eq!(bytes.len(), 1000);
        assert!(!within);
        assert_eq!(attempts.len(), 18);
    }

    #[test]
    fn test_binary_matches_linear_on_monotonic_codec() {
        for target in [500, 999, 1000, 4321, 6000, 9499, 9500, 20_000] {
            let linear = engine(MockImageCodec::linear(100), SearchStrategy::Linear);
            let binary = engine(MockImageCodec::linear(100), SearchStrategy::Binary);
            let (lq, lb, lw, _) = unwrap_encoded(
                linear
                    .search(&blank(), ImageFormat::Jpeg, &ladder(), target)
                    .unwrap(),
            );
            let (bq, bb, bw, battempts) = unwrap_encoded(
                binary
                    .search(&blank(), ImageFormat::Jpeg, &ladder(), target)
                    .unwrap(),
            );
            assert_eq!((lq, lb.len(), lw), (bq, bb.len(), bw), "target {}", target);
            assert!(battempts.len() <= 6, "target {} took {}", target, battempts.len());
        }
    }

    #[test]
    fn test_binary_falls_back_when_sizes_not_monotonic() {
        // A spike at quality 50 that bisection would trip over.
        let codec = MockImageCodec::with_sizes(|quality| {
            if quality == 50 {
                20_000
            } else {
                quality as usize * 100
            }
        });
        let binary = engine(codec, SearchStrategy::Binary);
        let (quality, _, within, _) =
            unwrap_encoded(binary.search(&blank(), ImageFormat::Jpeg, &ladder(), 8000).unwrap());
        assert_eq!(quality, 80);
        assert!(within);
    }

    #[test]
    fn test_encode_failure_propagates_from_search() {
        let search = engine(MockImageCodec::failing_encode(), SearchStrategy::Linear);
        assert!(search.search(&blank(), ImageFormat::Jpeg, &ladder(), 1000).is_err());
    }

    #[test]
    fn test_compress_png_is_copy_through() {
        let search = engine(MockImageCodec::linear(100), SearchStrategy::Linear);
        match search.compress(Path::new("/in.png"), "png", &ladder(), 1000) {
            ImageCompression::CopyThrough {
                reason: CopyReason::UnsupportedFormat(ext),
            } => assert_eq!(ext, "png"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_compress_codec_failure_is_copy_through() {
        let search = engine(MockImageCodec::failing_encode(), SearchStrategy::Linear);
        let result = search.compress(Path::new("/in.jpg"), "jpg", &ladder(), 1000);
        assert!(matches!(
            result,
            ImageCompression::CopyThrough {
                reason: CopyReason::CodecFailure(_)
            }
        ));
    }

    #[test]
    fn test_empty_ladder_is_copy_through() {
        let codec = MockImageCodec::linear(100);
        let search = engine(codec.clone(), SearchStrategy::Binary);

        let result = search.search(&blank(), ImageFormat::Jpeg, &[], 1000).unwrap();
        assert!(matches!(
            result,
            ImageCompression::CopyThrough {
                reason: CopyReason::EmptyLadder
            }
        ));
        let result = search.compress(Path::new("/in.jpg"), "jpg", &[], 1000);
        assert!(matches!(
            result,
            ImageCompression::CopyThrough {
                reason: CopyReason::EmptyLadder
            }
        ));
        assert_eq!(codec.encode_calls(), 0);
    }

    #[test]
    fn test_search_walks_the_given_ladder() {
        let search = engine(MockImageCodec::linear(100), SearchStrategy::Linear);
        let (quality, _, within, attempts) = unwrap_encoded(
            search
                .search(&blank(), ImageFormat::Jpeg, &[80, 40, 20], 5000)
                .unwrap(),
        );
        assert_eq!(quality, 40);
        assert!(within);
        assert_eq!(attempts.len(), 2);
    }
}
