// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Box extraction: turns one task's annotation and prediction records into
//! comparable pixel-space rectangles.

use crate::{
    api::{RawTask, ResultItem, ResultKind},
    config::{EvalConfig, SyntheticBoxPolicy},
    geometry::Rect,
};

/// Pixel-space rectangles extracted from one task, ready for matching.
#[derive(Debug, Clone)]
pub struct TaskBoxes {
    /// Decoded display name of the task's source image.
    pub image_name: String,
    /// Human-annotated ground-truth boxes, in annotation order.
    pub ground_truth: Vec<Rect>,
    /// Model-predicted boxes that passed the score threshold, in
    /// prediction order.
    pub predictions: Vec<Rect>,
}

/// Extract ground-truth and predicted rectangles from one task.
///
/// The denormalization scale is taken from `original_width`/
/// `original_height` of the first result of the first annotation; a task's
/// scale is assumed uniform across all its results. When no annotation
/// carries a scale, coordinates are treated as already pixel-space and boxes
/// keep their own extents.
///
/// When the scale is known, result coordinates are percentages and are
/// converted with `x * width / 100`, `y * height / 100`. Ground-truth boxes
/// then receive the fixed synthetic size per the configured
/// [`SyntheticBoxPolicy`], and keypoint results are recentered so the
/// synthetic box is centered on the point rather than anchored at it.
///
/// Prediction results are filtered to `score >= score_threshold` before any
/// conversion; a result without a score never participates.
pub fn extract_boxes(task: &RawTask, config: &EvalConfig) -> TaskBoxes {
    let scale = task
        .annotations
        .first()
        .and_then(|annotation| annotation.result.first())
        .and_then(|item| match (item.original_width, item.original_height) {
            (Some(width), Some(height)) => Some((width, height)),
            _ => None,
        });

    let ground_truth = task
        .annotations
        .iter()
        .flat_map(|annotation| annotation.result.iter())
        .map(|item| to_rect(item, scale, config, true))
        .collect();

    let predictions = task
        .predictions
        .iter()
        .flat_map(|prediction| prediction.result.iter())
        .filter(|item| item.score.is_some_and(|s| s >= config.score_threshold))
        .map(|item| to_rect(item, scale, config, false))
        .collect();

    TaskBoxes {
        image_name: task.image_name(),
        ground_truth,
        predictions,
    }
}

fn to_rect(
    item: &ResultItem,
    scale: Option<(f64, f64)>,
    config: &EvalConfig,
    ground_truth: bool,
) -> Rect {
    let value = item.value;

    let Some((image_width, image_height)) = scale else {
        // No scale known: coordinates are already pixel-space
        return Rect::new(value.x, value.y, value.width, value.height);
    };

    let mut x = value.x * image_width / 100.0;
    let mut y = value.y * image_height / 100.0;

    let (width, height) = match config.synthetic_boxes {
        SyntheticBoxPolicy::AllBoxes => (config.box_width, config.box_height),
        SyntheticBoxPolicy::KeypointsOnly if item.kind == ResultKind::KeypointLabels => {
            (config.box_width, config.box_height)
        }
        SyntheticBoxPolicy::KeypointsOnly => (
            value.width * image_width / 100.0,
            value.height * image_height / 100.0,
        ),
    };

    // Point labels mark the object location, not its top-left corner
    if ground_truth && item.kind == ResultKind::KeypointLabels {
        x -= config.box_width / 2.0;
        y -= config.box_height / 2.0;
    }

    Rect::new(x, y, width, height)
}
