// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar};
use inquire::{Password, PasswordDisplayMode};
use labelwatch_client::{
    Client, Error, EvalConfig, Poller, ProjectID, Snapshot, StatusIndicator,
};
use log::debug;
use std::{collections::HashMap, sync::Mutex, time::Duration};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Annotation server base URL
    #[clap(long, env = "LABELWATCH_SERVER", default_value = "http://localhost:8080")]
    server: String,

    /// Annotation server API key
    #[clap(long, env = "LABELWATCH_API_KEY")]
    key: Option<String>,

    /// Client Command
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Store the annotation server API key.  The key is verified against the
    /// server before being written to the application configuration
    /// directory; if no key is provided it is prompted for interactively.
    Login,
    /// Logout by removing the API key from the application configuration
    /// directory.
    Logout,
    /// List annotation projects available on the server.
    Projects {
        /// Filter projects by title
        #[clap(long)]
        name: Option<String>,
    },
    /// Monitor detection accuracy for a project.  The project's labeled
    /// tasks are fetched on a refresh cadence and the ground-truth boxes are
    /// matched against model predictions; corpus statistics and the
    /// per-image table are reprinted on every refresh.
    Watch {
        /// Project ID
        project_id: String,

        /// Minimum IoU for a prediction to match a ground-truth box (0-1)
        #[clap(long)]
        iou_threshold: Option<f64>,

        /// Minimum prediction confidence to participate in matching (0-1)
        #[clap(long)]
        score_threshold: Option<f64>,

        /// Synthetic ground-truth box width in pixels
        #[clap(long)]
        box_width: Option<f64>,

        /// Synthetic ground-truth box height in pixels
        #[clap(long)]
        box_height: Option<f64>,

        /// Seconds between refresh cycles
        #[clap(long)]
        interval: Option<u64>,

        /// Only show images whose name contains this text
        #[clap(long)]
        filter: Option<String>,

        /// Run a single fetch cycle and exit
        #[clap(long)]
        once: bool,
    },
}

/// Terminal spinners for the poller's busy regions.
struct SpinnerIndicator {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl SpinnerIndicator {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }
}

impl StatusIndicator for SpinnerIndicator {
    fn begin(&self, region: &str) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_message(format!("refreshing {}", region));
        bar.enable_steady_tick(Duration::from_millis(120));
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(region.to_string(), bar);
        }
    }

    fn end(&self, region: &str) {
        if let Ok(mut bars) = self.bars.lock()
            && let Some(bar) = bars.remove(region)
        {
            bar.finish_and_clear();
        }
    }
}

// Command handler functions

async fn handle_login(client: &Client, key: Option<String>) -> Result<(), Error> {
    let key = match key {
        Some(key) => key,
        None => Password::new("Annotation Server API Key")
            .with_display_mode(PasswordDisplayMode::Masked)
            .without_confirmation()
            .prompt()
            .unwrap(),
    };

    // Verify against the server before persisting the key
    let probe = client.clone().with_no_storage().with_key(&key)?;
    probe.verify_key().await?;

    client.with_key(&key)?;
    println!("API key verified against {}", client.url());
    Ok(())
}

async fn handle_logout(client: &Client) -> Result<(), Error> {
    client.logout().await?;
    println!("API key removed");
    Ok(())
}

async fn handle_projects(client: &Client, name: Option<String>) -> Result<(), Error> {
    let projects = client.projects(name.as_deref()).await?;
    for project in projects {
        match project.description() {
            Some(description) if !description.is_empty() => {
                println!("[{}] {}: {}", project.id(), project.title(), description)
            }
            _ => println!("[{}] {}", project.id(), project.title()),
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_watch(
    client: &Client,
    project_id: String,
    iou_threshold: Option<f64>,
    score_threshold: Option<f64>,
    box_width: Option<f64>,
    box_height: Option<f64>,
    interval: Option<u64>,
    filter: Option<String>,
    once: bool,
) -> Result<(), Error> {
    let project: ProjectID = project_id.try_into()?;

    let mut config = EvalConfig::load()?;
    if let Some(iou_threshold) = iou_threshold {
        config.iou_threshold = iou_threshold;
    }
    if let Some(score_threshold) = score_threshold {
        config.score_threshold = score_threshold;
    }
    if let Some(box_width) = box_width {
        config.box_width = box_width;
    }
    if let Some(box_height) = box_height {
        config.box_height = box_height;
    }
    if let Some(interval) = interval {
        config.refresh_interval_secs = interval;
    }
    config.validate()?;

    debug!("Watching project {} with {:?}", project, config);

    let poller = Poller::spawn(client.clone(), project, config, SpinnerIndicator::new());
    let mut snapshots = poller.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    print_snapshot(&snapshot, filter.as_deref());
                    if once {
                        break;
                    }
                }
            }
        }
    }

    poller.shutdown().await
}

fn print_snapshot(snapshot: &Snapshot, filter: Option<&str>) {
    let stats = &snapshot.stats;

    println!();
    if snapshot.project_name.is_empty() {
        println!("{} tasks completed", stats.tasks_completed);
    } else {
        println!(
            "{}: {} tasks completed",
            snapshot.project_name, stats.tasks_completed
        );
    }
    println!(
        "TP: {}  FP: {}  FN: {}  Precision: {}  Recall: {}",
        stats.totals.true_positives,
        stats.totals.false_positives,
        stats.totals.false_negatives,
        rate(stats.precision),
        rate(stats.recall),
    );

    println!("{:<48} {:>6} {:>6} {:>6}", "Image", "TP", "FP", "FN");
    for row in snapshot.filter_images(filter.unwrap_or("")) {
        println!(
            "{:<48} {:>6} {:>6} {:>6}",
            row.image_name,
            row.counts.true_positives,
            row.counts.false_positives,
            row.counts.false_negatives,
        );
    }
}

/// Precision/recall are NaN when their denominator is zero; show them as
/// undefined rather than propagating "NaN" into the table.
fn rate(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else {
        format!("{:.3}", value)
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let client = Client::new(&args.server)?;
    let client = match &args.key {
        Some(key) => client.with_key(key)?,
        None => client,
    };

    match args.cmd {
        Command::Login => handle_login(&client, args.key).await,
        Command::Logout => handle_logout(&client).await,
        Command::Projects { name } => handle_projects(&client, name).await,
        Command::Watch {
            project_id,
            iou_threshold,
            score_threshold,
            box_width,
            box_height,
            interval,
            filter,
            once,
        } => {
            handle_watch(
                &client,
                project_id,
                iou_threshold,
                score_threshold,
                box_width,
                box_height,
                interval,
                filter,
                once,
            )
            .await
        }
    }
}
