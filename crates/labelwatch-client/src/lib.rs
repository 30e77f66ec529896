// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! # LabelWatch Client Library
//!
//! The LabelWatch Client Library provides a Rust client for monitoring
//! object-detection annotation projects on a Label Studio-style annotation
//! server. It periodically pulls annotation-task data and computes detection
//! accuracy metrics (true positives, false positives, false negatives,
//! precision, recall) by matching human-drawn ground-truth boxes against
//! model-predicted boxes via Intersection-over-Union.
//!
//! ## Features
//!
//! - **Typed Payloads**: Annotation and prediction records are validated once
//!   at the API boundary into a fully-typed model
//! - **Detection Evaluation**: IoU-based greedy matching with per-image and
//!   corpus-wide aggregation
//! - **Polling Engine**: Cancellable refresh cycles with single-flight
//!   discipline; stale responses never overwrite newer results
//! - **Key Management**: API key persistence with pluggable storage backends
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use labelwatch_client::{Client, Error, EvalConfig, NullIndicator, Poller, ProjectID};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let client = Client::new("http://localhost:8080")?.with_key("api-key")?;
//!
//!     let poller = Poller::spawn(
//!         client,
//!         ProjectID::from(1),
//!         EvalConfig::default(),
//!         NullIndicator,
//!     );
//!
//!     let mut snapshots = poller.subscribe();
//!     snapshots.changed().await.ok();
//!     if let Some(snapshot) = snapshots.borrow().clone() {
//!         println!(
//!             "{}: precision {:.2} recall {:.2}",
//!             snapshot.project_name, snapshot.stats.precision, snapshot.stats.recall
//!         );
//!     }
//!
//!     poller.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod api;
mod client;
mod config;
mod error;
mod eval;
mod extract;
mod geometry;
mod poller;
mod retry;
mod storage;

pub use crate::{
    api::{
        AnnotationRecord, PercentBox, PredictionRecord, Project, ProjectID, RawTask, ResultItem,
        ResultKind, TaskData, TaskID,
    },
    client::Client,
    config::{EvalConfig, SyntheticBoxPolicy},
    error::Error,
    eval::{
        Counts, CorpusStats, ImageResult, Snapshot, evaluate_corpus, evaluate_detections,
        evaluate_task,
    },
    extract::{TaskBoxes, extract_boxes},
    geometry::{Rect, iou},
    poller::{
        NullIndicator, Poller, REGION_KEY_STATS, REGION_TABLE, StatusIndicator, TaskSource,
    },
    retry::{RetryScope, classify_url},
    storage::{FileKeyStorage, KeyStorage, MemoryKeyStorage, StorageError},
};
