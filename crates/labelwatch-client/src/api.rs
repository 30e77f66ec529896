// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Typed payload model for the annotation server REST API.
//!
//! The server's task payloads are loosely structured JSON: depending on the
//! labeling configuration, tasks may omit the annotation or prediction lists
//! entirely, and individual results may lack scores or original image
//! dimensions. Every optional field is defaulted here, at the
//! deserialization boundary, so the downstream extraction and evaluation
//! stages operate on a fully-typed, total model and a single malformed task
//! degrades to zero boxes instead of failing a whole fetch cycle.

use crate::Error;
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// Unique identifier for a project on the annotation server.
///
/// Project IDs are plain integers in the server API and in URLs.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProjectID(u64);

impl Display for ProjectID {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ProjectID {
    fn from(id: u64) -> Self {
        ProjectID(id)
    }
}

impl From<ProjectID> for u64 {
    fn from(val: ProjectID) -> Self {
        val.0
    }
}

impl ProjectID {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl FromStr for ProjectID {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .parse::<u64>()
            .map_err(|_| Error::InvalidParameters(format!("Invalid project ID: {}", s)))?;
        Ok(ProjectID(id))
    }
}

impl TryFrom<&str> for ProjectID {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        ProjectID::from_str(s)
    }
}

impl TryFrom<String> for ProjectID {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ProjectID::from_str(&s)
    }
}

/// Unique identifier for an annotation task within a project.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TaskID(u64);

impl Display for TaskID {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaskID {
    fn from(id: u64) -> Self {
        TaskID(id)
    }
}

impl From<TaskID> for u64 {
    fn from(val: TaskID) -> Self {
        val.0
    }
}

impl TaskID {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Project information returned by the annotation server.
///
/// Projects group annotation tasks for one labeling effort. Only the fields
/// the monitoring pipeline consumes are modeled; everything else in the
/// server payload is ignored.
#[derive(Deserialize, Clone, Debug)]
pub struct Project {
    id: ProjectID,
    title: String,
    #[serde(default)]
    description: Option<String>,
}

impl Display for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {}", self.id(), self.title())
    }
}

impl Project {
    pub fn id(&self) -> ProjectID {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Paginated envelope for project listings.
#[derive(Deserialize, Debug)]
pub(crate) struct ProjectPage {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub results: Vec<Project>,
}

/// One annotation task as returned by the task listing endpoint.
///
/// A task pairs one source image with the human annotations and model
/// predictions recorded against it. Tasks that have not been labeled yet
/// (`is_labeled == false`) carry no useful ground truth and are skipped by
/// the poller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTask {
    pub id: TaskID,
    /// Whether a human has completed labeling this task.
    #[serde(default)]
    pub is_labeled: bool,
    #[serde(default)]
    pub data: TaskData,
    /// Human annotations. Missing on unlabeled or malformed tasks.
    #[serde(default)]
    pub annotations: Vec<AnnotationRecord>,
    /// Model predictions. Missing when no model has run on the task.
    #[serde(default)]
    pub predictions: Vec<PredictionRecord>,
    /// Completion timestamp, used only for ordering.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RawTask {
    /// Display name of the task's source image: the final path segment of
    /// the image URL, percent-decoded.
    pub fn image_name(&self) -> String {
        let raw = self
            .data
            .image
            .rsplit('/')
            .next()
            .unwrap_or(self.data.image.as_str());
        percent_decode_str(raw).decode_utf8_lossy().into_owned()
    }
}

/// Task payload attributes. Only the image reference is consumed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskData {
    /// URL-like reference to the task's source image.
    #[serde(default)]
    pub image: String,
}

/// One human annotation pass over a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotationRecord {
    /// Individual labeled regions. Missing lists deserialize as empty.
    #[serde(default)]
    pub result: Vec<ResultItem>,
}

/// One model prediction pass over a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Individual predicted regions. Missing lists deserialize as empty.
    #[serde(default)]
    pub result: Vec<ResultItem>,
}

/// Semantic kind of a single annotation or prediction result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultKind {
    /// Rectangle region anchored at its top-left corner.
    #[serde(rename = "rectanglelabels")]
    RectangleLabels,
    /// Point label; boxes synthesized from these are centered on the point.
    #[serde(rename = "keypointlabels")]
    KeypointLabels,
    /// Any other labeling type (polygons, choices, relations, ...).
    #[default]
    #[serde(other, rename = "other")]
    Other,
}

/// A single labeled or predicted region within a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultItem {
    #[serde(rename = "type", default)]
    pub kind: ResultKind,
    /// Model confidence, present on prediction results only.
    #[serde(default)]
    pub score: Option<f64>,
    /// Pixel width of the source image the percentages are relative to.
    #[serde(default)]
    pub original_width: Option<f64>,
    /// Pixel height of the source image the percentages are relative to.
    #[serde(default)]
    pub original_height: Option<f64>,
    #[serde(default)]
    pub value: PercentBox,
}

/// Region geometry as percentages of the source image dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentBox {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}
