// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Detection matching and corpus-wide aggregation.
//!
//! Matching is a deliberately greedy, first-fit, order-dependent pass: each
//! predicted box claims the first unmatched ground-truth box it overlaps at
//! or above the IoU threshold, in input order. This reproduces the reference
//! behavior exactly; it is NOT optimal bipartite matching and is not meant to
//! be.

use crate::{
    api::RawTask,
    config::EvalConfig,
    extract::extract_boxes,
    geometry::{Rect, iou},
};
use std::ops::{Add, AddAssign};

/// Match outcome counts for one image or an entire corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Predictions that matched a ground-truth box.
    pub true_positives: usize,
    /// Predictions that matched nothing.
    pub false_positives: usize,
    /// Ground-truth boxes no prediction claimed.
    pub false_negatives: usize,
}

impl Add for Counts {
    type Output = Counts;

    fn add(self, other: Counts) -> Counts {
        Counts {
            true_positives: self.true_positives + other.true_positives,
            false_positives: self.false_positives + other.false_positives,
            false_negatives: self.false_negatives + other.false_negatives,
        }
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, other: Counts) {
        *self = *self + other;
    }
}

/// Match predicted boxes against ground-truth boxes with a single greedy
/// pass.
///
/// For each prediction, in input order, the ground-truth list is scanned in
/// input order; the first unmatched box whose IoU reaches `iou_threshold`
/// records a true positive and is marked matched. A prediction that claims
/// nothing is a false positive, and every ground-truth box left unmatched at
/// the end is a false negative.
///
/// The result is deterministic for fixed, ordered inputs and always satisfies
/// `TP + FP == |predictions|` and `TP + FN == |ground_truth|`.
pub fn evaluate_detections(
    ground_truth: &[Rect],
    predictions: &[Rect],
    iou_threshold: f64,
) -> Counts {
    let mut matched = vec![false; ground_truth.len()];
    let mut true_positives = 0;
    let mut false_positives = 0;

    for prediction in predictions {
        let hit = ground_truth
            .iter()
            .enumerate()
            .find(|(idx, truth)| !matched[*idx] && iou(prediction, truth) >= iou_threshold);

        match hit {
            Some((idx, _)) => {
                matched[idx] = true;
                true_positives += 1;
            }
            None => false_positives += 1,
        }
    }

    let matched_count = matched.iter().filter(|&&m| m).count();

    Counts {
        true_positives,
        false_positives,
        false_negatives: ground_truth.len() - matched_count,
    }
}

/// Match outcome for one task's image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResult {
    /// Decoded display name of the source image.
    pub image_name: String,
    pub counts: Counts,
}

/// Corpus-wide statistics derived from the current result set.
///
/// `precision` and `recall` use plain division: when the denominator is zero
/// (no predictions, or no ground truth) the value is `NaN` and is surfaced
/// as-is; renderers decide how to display it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CorpusStats {
    pub totals: Counts,
    pub precision: f64,
    pub recall: f64,
    /// Number of labeled tasks that contributed to this cycle.
    pub tasks_completed: usize,
}

impl CorpusStats {
    /// Reduce per-image counts into corpus totals and derived rates.
    pub fn from_results(results: &[ImageResult]) -> Self {
        let totals = results
            .iter()
            .fold(Counts::default(), |acc, result| acc + result.counts);

        let tp = totals.true_positives as f64;
        let precision = tp / (totals.true_positives + totals.false_positives) as f64;
        let recall = tp / (totals.true_positives + totals.false_negatives) as f64;

        CorpusStats {
            totals,
            precision,
            recall,
            tasks_completed: results.len(),
        }
    }
}

/// One complete published result set: the unit of atomic publication.
///
/// A snapshot is built in full by a fetch cycle and replaces the previous
/// snapshot wholesale; a failed or cancelled cycle never publishes one.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub project_name: String,
    pub stats: CorpusStats,
    pub images: Vec<ImageResult>,
}

impl Snapshot {
    /// Case-insensitive substring filter over image names.
    ///
    /// Returns a filtered view; the underlying result set is never mutated.
    /// An empty query matches everything.
    pub fn filter_images(&self, query: &str) -> Vec<&ImageResult> {
        let query = query.to_lowercase();
        self.images
            .iter()
            .filter(|result| result.image_name.to_lowercase().contains(&query))
            .collect()
    }
}

/// Run extraction and matching for a single task.
pub fn evaluate_task(task: &RawTask, config: &EvalConfig) -> ImageResult {
    let boxes = extract_boxes(task, config);
    let counts = evaluate_detections(&boxes.ground_truth, &boxes.predictions, config.iou_threshold);
    ImageResult {
        image_name: boxes.image_name,
        counts,
    }
}

/// Evaluate every task in a fetch cycle and reduce to corpus statistics.
pub fn evaluate_corpus(tasks: &[RawTask], config: &EvalConfig) -> (Vec<ImageResult>, CorpusStats) {
    let results: Vec<ImageResult> = tasks
        .iter()
        .map(|task| evaluate_task(task, config))
        .collect();
    let stats = CorpusStats::from_results(&results);
    (results, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Rect {
        Rect::new(x, y, w, h)
    }

    #[test]
    fn test_overlapping_pair_matches() {
        // IoU of these two 10x10 boxes offset by (1, 1) is 81/119 ~ 0.68
        let ground_truth = vec![rect(0.0, 0.0, 10.0, 10.0)];
        let predictions = vec![rect(1.0, 1.0, 10.0, 10.0)];

        let counts = evaluate_detections(&ground_truth, &predictions, 0.5);
        assert_eq!(counts.true_positives, 1);
        assert_eq!(counts.false_positives, 0);
        assert_eq!(counts.false_negatives, 0);
    }

    #[test]
    fn test_prediction_without_ground_truth_is_false_positive() {
        let counts = evaluate_detections(&[], &[rect(0.0, 0.0, 5.0, 5.0)], 0.5);
        assert_eq!(counts.true_positives, 0);
        assert_eq!(counts.false_positives, 1);
        assert_eq!(counts.false_negatives, 0);
    }

    #[test]
    fn test_unmatched_ground_truth_is_false_negative() {
        let ground_truth = vec![rect(0.0, 0.0, 5.0, 5.0), rect(100.0, 100.0, 5.0, 5.0)];
        let counts = evaluate_detections(&ground_truth, &[], 0.5);
        assert_eq!(counts.true_positives, 0);
        assert_eq!(counts.false_positives, 0);
        assert_eq!(counts.false_negatives, 2);
    }

    #[test]
    fn test_first_prediction_wins() {
        // Two predictions both overlap the single ground-truth box; the
        // first claims it and the second becomes a false positive.
        let ground_truth = vec![rect(0.0, 0.0, 10.0, 10.0)];
        let predictions = vec![rect(0.0, 0.0, 10.0, 10.0), rect(1.0, 1.0, 10.0, 10.0)];

        let counts = evaluate_detections(&ground_truth, &predictions, 0.5);
        assert_eq!(counts.true_positives, 1);
        assert_eq!(counts.false_positives, 1);
        assert_eq!(counts.false_negatives, 0);
    }

    #[test]
    fn test_count_invariants() {
        let ground_truth = vec![
            rect(0.0, 0.0, 10.0, 10.0),
            rect(30.0, 30.0, 10.0, 10.0),
            rect(60.0, 60.0, 10.0, 10.0),
        ];
        let predictions = vec![
            rect(1.0, 1.0, 10.0, 10.0),
            rect(90.0, 90.0, 10.0, 10.0),
            rect(31.0, 31.0, 10.0, 10.0),
            rect(200.0, 200.0, 10.0, 10.0),
        ];

        let counts = evaluate_detections(&ground_truth, &predictions, 0.5);
        assert_eq!(
            counts.true_positives + counts.false_positives,
            predictions.len()
        );
        assert_eq!(
            counts.true_positives + counts.false_negatives,
            ground_truth.len()
        );
    }

    #[test]
    fn test_determinism() {
        let ground_truth = vec![rect(0.0, 0.0, 10.0, 10.0), rect(5.0, 5.0, 10.0, 10.0)];
        let predictions = vec![rect(2.0, 2.0, 10.0, 10.0), rect(6.0, 6.0, 10.0, 10.0)];

        let first = evaluate_detections(&ground_truth, &predictions, 0.3);
        for _ in 0..10 {
            assert_eq!(
                evaluate_detections(&ground_truth, &predictions, 0.3),
                first
            );
        }
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        // Identical boxes have IoU exactly 1.0
        let boxes = vec![rect(0.0, 0.0, 10.0, 10.0)];
        let counts = evaluate_detections(&boxes, &boxes, 1.0);
        assert_eq!(counts.true_positives, 1);
    }

    fn image_result(name: &str, tp: usize, fp: usize, fn_: usize) -> ImageResult {
        ImageResult {
            image_name: name.to_string(),
            counts: Counts {
                true_positives: tp,
                false_positives: fp,
                false_negatives: fn_,
            },
        }
    }

    #[test]
    fn test_corpus_stats_precision_recall() {
        let results = vec![
            image_result("a.jpg", 5, 1, 0),
            image_result("b.jpg", 3, 1, 0),
        ];

        let stats = CorpusStats::from_results(&results);
        assert_eq!(stats.totals.true_positives, 8);
        assert_eq!(stats.totals.false_positives, 2);
        assert_eq!(stats.totals.false_negatives, 0);
        assert_eq!(stats.tasks_completed, 2);
        assert!((stats.precision - 0.8).abs() < 1e-12);
        assert!((stats.recall - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_corpus_stats_zero_denominators_are_nan() {
        let stats = CorpusStats::from_results(&[image_result("empty.jpg", 0, 0, 0)]);
        assert!(stats.precision.is_nan());
        assert!(stats.recall.is_nan());

        // No predictions at all: precision undefined, recall well-defined
        let stats = CorpusStats::from_results(&[image_result("misses.jpg", 0, 0, 3)]);
        assert!(stats.precision.is_nan());
        assert_eq!(stats.recall, 0.0);
    }

    #[test]
    fn test_snapshot_filter_is_case_insensitive_and_non_destructive() {
        let snapshot = Snapshot {
            project_name: "Whales".to_string(),
            stats: CorpusStats::default(),
            images: vec![
                image_result("Humpback 01.jpg", 1, 0, 0),
                image_result("orca 02.jpg", 0, 1, 0),
                image_result("humpback 03.jpg", 2, 0, 1),
            ],
        };

        let filtered = snapshot.filter_images("HUMP");
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].image_name, "Humpback 01.jpg");
        assert_eq!(filtered[1].image_name, "humpback 03.jpg");

        // Filtering never mutates the underlying set
        assert_eq!(snapshot.images.len(), 3);

        // Empty query matches everything
        assert_eq!(snapshot.filter_images("").len(), 3);

        // No match yields an empty view
        assert!(snapshot.filter_images("beluga").is_empty());
    }
}
