// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Evaluation parameters for the detection pipeline.

use crate::Error;
use serde::Deserialize;
use std::time::Duration;

/// Policy for the fixed-size synthetic box applied to ground-truth results.
///
/// The labeling workflows this engine monitors annotate small, sparse objects
/// where a point or a loosely-sized rectangle marks the object location. The
/// evaluation therefore replaces the annotated extent with a fixed-size box
/// before matching. Whether that replacement applies to every ground-truth
/// result or only to point-style results is a per-deployment choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyntheticBoxPolicy {
    /// Every ground-truth box gets the synthetic size.
    #[default]
    AllBoxes,
    /// Only keypoint results get the synthetic size; rectangle results keep
    /// their annotated (scaled) extents.
    KeypointsOnly,
}

/// Parameters of one evaluation cycle.
///
/// The poller reads the current configuration at the start of each fetch
/// cycle, so changes take effect on the next cycle rather than retroactively.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Minimum IoU for a prediction to match a ground-truth box (`0..=1`).
    pub iou_threshold: f64,
    /// Minimum model confidence for a prediction to participate (`0..=1`).
    pub score_threshold: f64,
    /// Synthetic box width in pixels.
    pub box_width: f64,
    /// Synthetic box height in pixels.
    pub box_height: f64,
    /// Which ground-truth results receive the synthetic size.
    pub synthetic_boxes: SyntheticBoxPolicy,
    /// Bulk page size for the task listing request. Sized to exceed the
    /// expected task count so one request retrieves the full project.
    pub page_size: u32,
    /// Seconds between automatic refresh cycles.
    pub refresh_interval_secs: u64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.5,
            score_threshold: 0.5,
            box_width: 40.0,
            box_height: 40.0,
            synthetic_boxes: SyntheticBoxPolicy::default(),
            page_size: 100_000,
            refresh_interval_secs: 15,
        }
    }
}

impl EvalConfig {
    /// Load the configuration from an optional `labelwatch.toml` file in the
    /// working directory, overridden by `LABELWATCH_`-prefixed environment
    /// variables (e.g. `LABELWATCH_IOU_THRESHOLD=0.6`).
    pub fn load() -> Result<Self, Error> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("labelwatch").required(false))
            .add_source(config::Environment::with_prefix("LABELWATCH").try_parsing(true))
            .build()?;

        let config: EvalConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(Error::InvalidParameters(format!(
                "iou_threshold must be within 0..=1, got {}",
                self.iou_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(Error::InvalidParameters(format!(
                "score_threshold must be within 0..=1, got {}",
                self.score_threshold
            )));
        }
        if self.box_width <= 0.0 || self.box_height <= 0.0 {
            return Err(Error::InvalidParameters(format!(
                "synthetic box size must be positive, got {}x{}",
                self.box_width, self.box_height
            )));
        }
        if self.page_size == 0 {
            return Err(Error::InvalidParameters(
                "page_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EvalConfig::default();
        assert_eq!(config.iou_threshold, 0.5);
        assert_eq!(config.score_threshold, 0.5);
        assert_eq!(config.box_width, 40.0);
        assert_eq!(config.box_height, 40.0);
        assert_eq!(config.synthetic_boxes, SyntheticBoxPolicy::AllBoxes);
        assert_eq!(config.page_size, 100_000);
        assert_eq!(config.refresh_interval(), Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = EvalConfig {
            iou_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EvalConfig {
            score_threshold: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EvalConfig {
            box_width: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EvalConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        // Missing fields fall back to defaults
        let config: EvalConfig = serde_json::from_str(
            r#"{"iou_threshold": 0.75, "synthetic_boxes": "keypoints-only"}"#,
        )
        .unwrap();
        assert_eq!(config.iou_threshold, 0.75);
        assert_eq!(config.score_threshold, 0.5);
        assert_eq!(config.synthetic_boxes, SyntheticBoxPolicy::KeypointsOnly);
    }
}
