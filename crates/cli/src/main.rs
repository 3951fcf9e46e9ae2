//! fieldops CLI - location-gated field work management.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use fieldops_core::{
    AttendanceRecord, Geofence, GeofenceId, RequiredLocation, Requester, Task, TaskFilter, TaskId,
    TaskStatus, Time, UserId,
};
use fieldops_engine::{FieldService, LocationUpdate, ServiceError, Violation};
use fieldops_geo::{GeoPoint, Shape};
use fieldops_jobs::CarryoverScheduler;
use fieldops_outbox::{Outbox, WebhookSink};
use fieldops_store::JsonStore;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "fieldops")]
#[command(about = "Location-gated task and attendance engine", long_about = None)]
struct Cli {
    /// Data directory for the JSON store
    #[arg(long, default_value = ".fieldops", global = true)]
    data_dir: PathBuf,

    /// POST events to this URL instead of dropping them
    #[arg(long, global = true)]
    webhook: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage geofenced regions
    Geofence {
        #[command(subcommand)]
        command: GeofenceCommands,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Manual check-in at the given coordinates
    Checkin {
        /// Worker checking in
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lng: f64,
        /// Reported accuracy in meters
        #[arg(long, default_value = "10")]
        accuracy: f64,
    },
    /// Manual check-out at the given coordinates
    Checkout {
        /// Worker checking out
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lng: f64,
        /// Reported accuracy in meters
        #[arg(long, default_value = "10")]
        accuracy: f64,
    },
    /// Report one location sample
    Ping {
        /// Reporting worker
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lng: f64,
        /// Reported accuracy in meters
        #[arg(long, default_value = "10")]
        accuracy: f64,
        /// Battery charge in 0..=1
        #[arg(long)]
        battery: Option<f32>,
    },
    /// Replay a JSON file of location samples
    Replay {
        /// Path to a JSON array of samples
        file: PathBuf,
    },
    /// Carry overdue tasks forward
    Carryover {
        #[command(subcommand)]
        command: CarryoverCommands,
    },
    /// Show one worker's current situation
    Status {
        /// Worker to report on
        #[arg(long)]
        user: UserId,
    },
    /// List a worker's attendance records
    Attendance {
        /// Worker to report on
        #[arg(long)]
        user: UserId,
    },
}

#[derive(Subcommand)]
enum GeofenceCommands {
    /// Add a region (circle, or polygon via repeated --vertex)
    Add {
        /// Region name
        name: String,
        /// Circle center latitude
        #[arg(long)]
        lat: Option<f64>,
        /// Circle center longitude
        #[arg(long)]
        lng: Option<f64>,
        /// Circle radius in meters
        #[arg(long)]
        radius: Option<f64>,
        /// Polygon vertex as "lat,lng"; repeat three or more times
        #[arg(long = "vertex")]
        vertices: Vec<String>,
        /// Take attendance on enter/exit
        #[arg(long)]
        attendance: bool,
        /// Auto-assign nearby tasks on enter
        #[arg(long)]
        auto_assign: bool,
    },
    /// List regions
    List,
    /// Remove a region
    Remove {
        /// Region ID
        id: GeofenceId,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Add a task
    Add {
        /// Task title
        title: String,
        /// Detailed description
        #[arg(long, default_value = "")]
        description: String,
        /// Due date, YYYY-MM-DD
        #[arg(long)]
        due: Option<NaiveDate>,
        /// Required location latitude
        #[arg(long)]
        lat: Option<f64>,
        /// Required location longitude
        #[arg(long)]
        lng: Option<f64>,
        /// Permitted radius around the required location, meters
        #[arg(long, default_value = "100")]
        radius: f64,
        /// Reject transitions outside the radius
        #[arg(long)]
        strict: bool,
        /// Region that auto-assigns this task on entry
        #[arg(long)]
        geofence: Option<GeofenceId>,
        /// Completion needs an administrator's approval
        #[arg(long)]
        approval: bool,
    },
    /// List tasks
    List {
        /// Filter by status (not_started, in_progress, paused, completed)
        #[arg(long)]
        status: Option<String>,
        /// Filter by assignee
        #[arg(long)]
        user: Option<UserId>,
    },
    /// Show task details
    Show {
        /// Task ID
        id: TaskId,
    },
    /// Hand a task to a worker
    Assign {
        /// Task ID
        id: TaskId,
        /// Worker receiving the task
        #[arg(long)]
        to: UserId,
        /// Administrator making the call
        #[arg(long)]
        by: UserId,
    },
    /// Begin work on a task
    Start {
        /// Task ID
        id: TaskId,
        #[command(flatten)]
        actor: Actor,
    },
    /// Pause work on a task
    Pause {
        /// Task ID
        id: TaskId,
        #[command(flatten)]
        actor: Actor,
    },
    /// Resume a paused task
    Resume {
        /// Task ID
        id: TaskId,
        #[command(flatten)]
        actor: Actor,
    },
    /// Complete a task
    Complete {
        /// Task ID
        id: TaskId,
        #[command(flatten)]
        actor: Actor,
    },
}

/// Who performs a lifecycle transition, and from where.
#[derive(clap::Args)]
struct Actor {
    /// Acting user
    #[arg(long)]
    user: UserId,
    /// Current latitude
    #[arg(long)]
    lat: Option<f64>,
    /// Current longitude
    #[arg(long)]
    lng: Option<f64>,
    /// Act as an administrator
    #[arg(long)]
    admin: bool,
}

impl Actor {
    fn requester(&self) -> Requester {
        if self.admin {
            Requester::admin(self.user)
        } else {
            Requester::worker(self.user)
        }
    }
}

#[derive(Subcommand)]
enum CarryoverCommands {
    /// Run one carryover batch
    Run {
        /// Carry over as of this date instead of today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Keep running the daily schedule until interrupted
    Watch,
}

/// One record in a replay file.
#[derive(Deserialize)]
struct ReplaySample {
    user_id: UserId,
    lat: f64,
    lng: f64,
    accuracy_m: f64,
    #[serde(default)]
    battery_level: Option<f32>,
    captured_at: Time,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let store = Arc::new(JsonStore::new(&cli.data_dir).await?);
    let outbox = match &cli.webhook {
        Some(url) => Outbox::new(Arc::new(WebhookSink::new(url.clone()))),
        None => Outbox::disabled(),
    };
    let service = FieldService::new(store.clone(), outbox.clone());

    match cli.command {
        Commands::Geofence { command } => match command {
            GeofenceCommands::Add {
                name,
                lat,
                lng,
                radius,
                vertices,
                attendance,
                auto_assign,
            } => {
                let shape = build_shape(lat, lng, radius, &vertices)?;
                let mut fence = Geofence::new(name, shape);
                fence.allow_attendance = attendance;
                fence.auto_assign_tasks = auto_assign;
                let fence = service.add_geofence(fence).await.map_err(fail)?;
                println!("Added geofence: {} - {}", fence.id, fence.name);
            }
            GeofenceCommands::List => {
                let fences = service.list_geofences().await.map_err(fail)?;
                println!("Geofences ({})", fences.len());
                for fence in fences {
                    println!(
                        "  {} | {} | attendance={} auto_assign={} active={}",
                        fence.id,
                        fence.name,
                        fence.allow_attendance,
                        fence.auto_assign_tasks,
                        fence.is_active,
                    );
                }
            }
            GeofenceCommands::Remove { id } => {
                service.remove_geofence(id).await.map_err(fail)?;
                println!("Removed geofence {id}");
            }
        },
        Commands::Task { command } => run_task_command(&service, command).await?,
        Commands::Checkin {
            user,
            lat,
            lng,
            accuracy,
        } => {
            let result = service
                .check_in(user, lat, lng, accuracy)
                .await
                .map_err(fail)?;
            println!("Checked in: {}", describe_record(&result.attendance));
            if !result.location_valid {
                println!("  Warning: outside every attendance region");
            }
        }
        Commands::Checkout {
            user,
            lat,
            lng,
            accuracy,
        } => {
            let result = service
                .check_out(user, lat, lng, accuracy)
                .await
                .map_err(fail)?;
            println!("Checked out: {}", describe_record(&result.attendance));
            if !result.location_valid {
                println!("  Warning: outside every attendance region");
            }
        }
        Commands::Ping {
            user,
            lat,
            lng,
            accuracy,
            battery,
        } => {
            let update = service
                .location_update(user, lat, lng, accuracy, battery, Utc::now())
                .await
                .map_err(fail)?;
            print_update(user, &update);
        }
        Commands::Replay { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let samples: Vec<ReplaySample> =
                serde_json::from_str(&raw).context("parsing replay file")?;

            let total = samples.len();
            for sample in samples {
                let update = service
                    .location_update(
                        sample.user_id,
                        sample.lat,
                        sample.lng,
                        sample.accuracy_m,
                        sample.battery_level,
                        sample.captured_at,
                    )
                    .await
                    .map_err(fail)?;
                print_update(sample.user_id, &update);
            }
            info!("replayed {total} samples");
        }
        Commands::Carryover { command } => {
            let scheduler = CarryoverScheduler::new(store.clone(), outbox.clone());
            match command {
                CarryoverCommands::Run { date } => {
                    let today = date.unwrap_or_else(|| scheduler.local_date(Utc::now()));
                    let report = scheduler.run_once(today).await?;
                    println!(
                        "Carryover for {today}: {} processed, {} skipped, {} failed",
                        report.processed, report.skipped, report.failed,
                    );
                }
                CarryoverCommands::Watch => {
                    let shutdown = CancellationToken::new();
                    let token = shutdown.clone();
                    tokio::spawn(async move {
                        if tokio::signal::ctrl_c().await.is_ok() {
                            token.cancel();
                        }
                    });
                    scheduler.run(shutdown).await;
                }
            }
        }
        Commands::Status { user } => {
            let status = service.worker_status(user, Utc::now()).await.map_err(fail)?;
            println!("Worker {user}");
            if status.current_geofences.is_empty() {
                println!("  Inside: no region");
            } else {
                for id in &status.current_geofences {
                    println!("  Inside: {id}");
                }
            }
            println!("  Day: {}", status.phase);
            if let Some(record) = &status.attendance {
                println!("  Attendance: {}", describe_record(record));
            }
            if let Some(sample) = &status.last_sample {
                println!(
                    "  Last seen: {} at {}",
                    sample.point,
                    sample.captured_at.format("%Y-%m-%d %H:%M"),
                );
            }
            println!("  Tasks ({})", status.tasks.len());
            for task in &status.tasks {
                println!("    {} | {} | {}", task.id, task.status, task.title);
            }
        }
        Commands::Attendance { user } => {
            let records = service.attendance_history(user).await.map_err(fail)?;
            println!("Attendance for {user} ({} days)", records.len());
            for record in records {
                println!("  {} | {}", record.date, describe_record(&record));
            }
        }
    }

    Ok(())
}

async fn run_task_command(service: &FieldService, command: TaskCommands) -> Result<()> {
    match command {
        TaskCommands::Add {
            title,
            description,
            due,
            lat,
            lng,
            radius,
            strict,
            geofence,
            approval,
        } => {
            let mut task = Task::new(title);
            task.description = description;
            task.due_date = due;
            task.approval_required = approval;
            if let (Some(lat), Some(lng)) = (lat, lng) {
                task.required_location = Some(RequiredLocation {
                    point: GeoPoint::new(lat, lng)?,
                    radius_m: radius,
                    strict,
                    geofence_id: geofence,
                });
            }
            let task = service.create_task(task).await.map_err(fail)?;
            println!("Added task: {} - {}", task.id, task.title);
        }
        TaskCommands::List { status, user } => {
            let filter = TaskFilter {
                status: status.as_deref().and_then(parse_status).map(|s| vec![s]),
                assigned_to: user,
                ..Default::default()
            };
            let tasks = service.list_tasks(&filter).await.map_err(fail)?;

            println!("Tasks ({})", tasks.len());
            for task in tasks {
                let assignee = task
                    .assigned_to
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "unassigned".into());
                println!(
                    "  {} | {} | {} - {}",
                    task.id, task.status, assignee, task.title,
                );
            }
        }
        TaskCommands::Show { id } => {
            let Some(task) = service.get_task(id).await.map_err(fail)? else {
                println!("Task not found");
                return Ok(());
            };

            println!("Task: {}", task.id);
            println!("  Title: {}", task.title);
            if !task.description.is_empty() {
                println!("  Description: {}", task.description);
            }
            println!("  Status: {}", task.status);
            match task.assigned_to {
                Some(user) => println!("  Assigned to: {user}"),
                None => println!("  Assigned to: nobody"),
            }
            if let Some(due) = task.due_date {
                println!("  Due: {due}");
            }
            if let Some(required) = &task.required_location {
                println!(
                    "  Required location: ({}, {}) within {} m{}",
                    required.point.lat,
                    required.point.lng,
                    required.radius_m,
                    if required.strict { ", strict" } else { "" },
                );
            }
            println!("  Worked: {} min", task.actual_minutes);
            println!("  Sessions: {}", task.time_tracking.sessions.len());
            if !task.tags.is_empty() {
                println!("  Tags: {}", task.tags.join(", "));
            }
            println!("  Created: {}", task.created_at);
        }
        TaskCommands::Assign { id, to, by } => {
            let task = service
                .assign_task(id, to, &Requester::admin(by))
                .await
                .map_err(fail)?;
            println!("Assigned {} to {}", task.id, to);
        }
        TaskCommands::Start { id, actor } => {
            let task = service
                .start_task(id, &actor.requester(), actor.lat, actor.lng)
                .await
                .map_err(fail)?;
            println!("{} -> {}", task.id, task.status);
        }
        TaskCommands::Pause { id, actor } => {
            let task = service
                .pause_task(id, &actor.requester(), actor.lat, actor.lng)
                .await
                .map_err(fail)?;
            println!("{} -> {} ({} min worked)", task.id, task.status, task.actual_minutes);
        }
        TaskCommands::Resume { id, actor } => {
            let task = service
                .resume_task(id, &actor.requester(), actor.lat, actor.lng)
                .await
                .map_err(fail)?;
            println!("{} -> {}", task.id, task.status);
        }
        TaskCommands::Complete { id, actor } => {
            let task = service
                .complete_task(id, &actor.requester(), actor.lat, actor.lng)
                .await
                .map_err(fail)?;
            println!(
                "{} -> {} ({} min worked{})",
                task.id,
                task.status,
                task.actual_minutes,
                if task.approval_required && !task.is_approved {
                    ", awaiting approval"
                } else {
                    ""
                },
            );
        }
    }
    Ok(())
}

fn build_shape(
    lat: Option<f64>,
    lng: Option<f64>,
    radius: Option<f64>,
    vertices: &[String],
) -> Result<Shape> {
    if !vertices.is_empty() {
        let mut points = Vec::with_capacity(vertices.len());
        for vertex in vertices {
            points.push(parse_vertex(vertex)?);
        }
        return Ok(Shape::Polygon { vertices: points });
    }
    match (lat, lng, radius) {
        (Some(lat), Some(lng), Some(radius)) => Ok(Shape::Circle {
            center: GeoPoint::new(lat, lng)?,
            radius_m: radius,
        }),
        _ => anyhow::bail!("a circular region needs --lat, --lng and --radius"),
    }
}

fn parse_vertex(s: &str) -> Result<GeoPoint> {
    let (lat, lng) = s
        .split_once(',')
        .with_context(|| format!("vertex {s:?} is not \"lat,lng\""))?;
    let lat: f64 = lat.trim().parse().context("vertex latitude")?;
    let lng: f64 = lng.trim().parse().context("vertex longitude")?;
    Ok(GeoPoint::new(lat, lng)?)
}

fn parse_status(s: &str) -> Option<TaskStatus> {
    match s.to_lowercase().as_str() {
        "not_started" => Some(TaskStatus::NotStarted),
        "in_progress" => Some(TaskStatus::InProgress),
        "paused" => Some(TaskStatus::Paused),
        "completed" => Some(TaskStatus::Completed),
        _ => None,
    }
}

fn describe_record(record: &AttendanceRecord) -> String {
    let mut parts = vec![record.status.to_string()];
    if let Some(check_in) = &record.check_in {
        parts.push(format!("in {}", check_in.time.format("%H:%M")));
    }
    if let Some(check_out) = &record.check_out {
        parts.push(format!("out {}", check_out.time.format("%H:%M")));
        parts.push(format!(
            "{:.2} h worked, {:.2} h overtime",
            record.total_hours, record.overtime_hours,
        ));
    }
    parts.join(", ")
}

fn print_update(user: UserId, update: &LocationUpdate) {
    println!(
        "{} | inside {} region(s) | entered {} | exited {}",
        user,
        update.current_geofences.len(),
        update.entered.len(),
        update.exited.len(),
    );
    for violation in &update.violations {
        match violation {
            Violation::PoorAccuracy {
                accuracy_m,
                threshold_m,
            } => println!("  violation: accuracy {accuracy_m:.0} m exceeds {threshold_m:.0} m"),
            Violation::OutsideWorkingHours { geofence_id } => {
                println!("  violation: outside working hours of {geofence_id}")
            }
        }
    }
}

fn fail(err: ServiceError) -> anyhow::Error {
    anyhow::anyhow!("{err} (status {})", err.status_code())
}
