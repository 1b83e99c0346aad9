//! Size-targeted encoding.
//!
//! Finds a quality whose encoded output fits a byte budget by binary search
//! over the encoder. The search runs a fixed number of probes instead of
//! iterating to a tolerance, so its cost is bounded by
//! `probe_budget + 1` encodes no matter the image or target.
//!
//! Each probe moves a bound `bracket_step` past the probed quality rather
//! than onto it: a probe that fits raises the lower bound, one that
//! overshoots lowers the upper bound. With the default settings (12 probes,
//! 0.02 step) the returned quality can sit up to one final bracket width
//! below the true boundary.
//!
//! Moving the lower bound on a fit is intentional even though a plain
//! reading of the halving rule suggests lowering the upper bound there.
//! Lowering `high` on a fit walks the search toward the smallest quality
//! and discards the largest one that fits, so keep this direction.

use serde::Serialize;
use tracing::debug;

use crate::decode::RasterImage;
use crate::encode::{EncodeResult, Encoder, RasterSurface};
use crate::error::ConvertError;
use crate::settings::{clamp_quality, CompressionSettings, TargetSize, MAX_QUALITY, MIN_QUALITY};

/// Result of a size-targeted encode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub result: EncodeResult,
    /// Quality of the accepted probe, clamped to `[0.05, 1.0]`.
    pub quality: f32,
    /// Encodes performed, including the fast-path or fallback encode.
    pub probes: u32,
    /// Whether the accepted result fits the budget.
    pub within_budget: bool,
}

/// Binary search over an [`Encoder`] for the highest quality under a budget.
pub struct SizeTargetingSearch<'a, S> {
    encoder: &'a Encoder<S>,
    settings: &'a CompressionSettings,
}

impl<'a, S: RasterSurface> SizeTargetingSearch<'a, S> {
    pub fn new(encoder: &'a Encoder<S>, settings: &'a CompressionSettings) -> Self {
        Self { encoder, settings }
    }

    /// Encode `image` so the result fits `target` where achievable.
    ///
    /// When `original_size` already fits, the image is re-encoded once at
    /// the default quality. Otherwise the search keeps the last probe that
    /// fit; if none did, it encodes once more at the final lower bound and
    /// accepts that result regardless of size.
    ///
    /// # Errors
    ///
    /// Propagates the first encoder failure. Capability does not depend on
    /// quality, so a failed probe means every probe would fail.
    pub fn search(
        &self,
        image: &RasterImage,
        original_size: u64,
        target: TargetSize,
    ) -> Result<SearchOutcome, ConvertError> {
        let target_bytes = target.bytes();
        let formats = self.settings.formats;

        if original_size <= target_bytes {
            let quality = self.settings.default_quality;
            let result = self.encoder.encode(image, formats, quality)?;
            debug!(
                original_size,
                target_bytes,
                byte_size = result.byte_size(),
                "source already within budget"
            );
            return Ok(SearchOutcome {
                within_budget: result.byte_size() <= target_bytes,
                result,
                quality: clamp_quality(quality),
                probes: 1,
            });
        }

        let step = self.settings.bracket_step;
        let mut low = MIN_QUALITY;
        let mut high = MAX_QUALITY;
        let mut best: Option<(EncodeResult, f32)> = None;
        let mut probes = 0;

        for _ in 0..self.settings.probe_budget {
            let mid = (low + high) / 2.0;
            let result = self.encoder.encode(image, formats, mid)?;
            probes += 1;

            let fits = result.byte_size() <= target_bytes;
            debug!(
                probe = probes,
                quality = mid,
                byte_size = result.byte_size(),
                target_bytes,
                fits,
                "size search probe"
            );

            if fits {
                best = Some((result, mid));
                low = mid + step;
            } else {
                high = mid - step;
            }
        }

        let (result, quality) = match best {
            Some(found) => found,
            None => {
                let result = self.encoder.encode(image, formats, low)?;
                probes += 1;
                debug!(
                    quality = low,
                    byte_size = result.byte_size(),
                    target_bytes,
                    "no probe fit the budget, accepting final lower bound"
                );
                (result, low)
            }
        };

        Ok(SearchOutcome {
            within_budget: result.byte_size() <= target_bytes,
            result,
            quality: clamp_quality(quality),
            probes,
        })
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::testing::{gradient_image, FakeSurface};
    use proptest::prelude::*;

    proptest! {
        /// Property: the search never exceeds its probe budget plus one fallback.
        #[test]
        fn prop_encode_count_is_bounded(
            original in 0u64..50_000,
            target in 0u64..20_000,
        ) {
            let surface = FakeSurface::new();
            let encoder = Encoder::new(&surface);
            let settings = CompressionSettings::default();
            let outcome = SizeTargetingSearch::new(&encoder, &settings)
                .search(&gradient_image(2, 2), original, TargetSize::from_bytes(target))
                .unwrap();

            prop_assert!(outcome.probes <= 13);
            prop_assert_eq!(outcome.probes as usize, surface.probes());
            if original > target {
                prop_assert!(outcome.probes >= 12);
            } else {
                prop_assert_eq!(outcome.probes, 1);
            }
        }

        /// Property: when the smallest quality fits, the result fits too.
        #[test]
        fn prop_never_overshoots_achievable_budget(target in 1_500u64..=11_000) {
            prop_assume!(FakeSurface::size_for(MIN_QUALITY) <= target);

            let surface = FakeSurface::new();
            let encoder = Encoder::new(&surface);
            let settings = CompressionSettings::default();
            let outcome = SizeTargetingSearch::new(&encoder, &settings)
                .search(&gradient_image(2, 2), u64::MAX, TargetSize::from_bytes(target))
                .unwrap();

            prop_assert!(outcome.within_budget);
            prop_assert!(outcome.result.byte_size() <= target);
            prop_assert!((MIN_QUALITY..=MAX_QUALITY).contains(&outcome.quality));
        }
    }
}
