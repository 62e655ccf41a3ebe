// src/ui.rs
use crate::config::{MAX_LINKS, MAX_STEPS_PER_REQUEST, TRAIL_CAPACITY}; // Request limits and trail size
use crate::error::PendulumError; // Core error type, mapped to 400 responses below
use crate::logic::{Energy, Simulation, Snapshot}; // Session that owns chain, drag work and trail
use crate::model::Chain; // Validated link chain (deserializes through Link::new)
use actix_web::{http::StatusCode, web, HttpResponse, ResponseError, Result}; // Actix-web handler types
use base64::{engine::general_purpose, Engine as _}; // Base64 encoder for embedding image data
use image::ImageFormat; // Image encoding utilities for PNG output
use plotters::prelude::*; // Plotters plotting library prelude
use serde::{Deserialize, Serialize}; // Serde traits for JSON (de)serialization
use std::io::{self, Cursor}; // IO utilities and Cursor for in-memory byte writing
use std::sync::{Mutex, MutexGuard}; // Shared session guard
use tracing::{info, warn}; // Structured logging

/// Session shared by every request; the mutex serializes stepping and edits.
pub type SharedSimulation = web::Data<Mutex<Simulation>>;

#[derive(Serialize)]
struct ErrorBody {
    success: bool, // Always false
    error: String, // Human-readable reason
}

impl ResponseError for PendulumError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            success: false,
            error: self.to_string(),
        })
    }
}

/// Another request panicked while holding the session lock.
#[derive(Debug, thiserror::Error)]
#[error("simulation state poisoned")]
struct Poisoned;

impl ResponseError for Poisoned {}

fn rejected(err: PendulumError) -> actix_web::Error {
    warn!(error = %err, "request rejected");
    err.into()
}

fn lock(sim: &SharedSimulation) -> Result<MutexGuard<'_, Simulation>> {
    sim.lock().map_err(|_| Poisoned.into())
}

fn check_frames(frames: usize) -> Result<usize> {
    if (1..=MAX_STEPS_PER_REQUEST).contains(&frames) {
        Ok(frames)
    } else {
        Err(rejected(PendulumError::invalid_parameter(format!(
            "frames must be in 1..={MAX_STEPS_PER_REQUEST}, got {frames}"
        ))))
    }
}

/// Registers every API route under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/state", web::get().to(state_handler))
            .route("/step", web::post().to(step_handler))
            .route("/reset", web::post().to(reset_handler))
            .route("/links", web::post().to(add_link_handler))
            .route("/links", web::delete().to(remove_link_handler))
            .route("/links/{index}", web::put().to(update_link_handler))
            .route("/drag", web::put().to(drag_handler))
            .route("/simulate", web::post().to(simulate_handler)),
    );
}

pub async fn state_handler(sim: SharedSimulation) -> Result<web::Json<Snapshot>> {
    Ok(web::Json(lock(&sim)?.snapshot()))
}

#[derive(Deserialize)]
pub struct StepQuery {
    #[serde(default = "one_frame")]
    frames: usize, // Frames to advance the shared session
}

fn one_frame() -> usize {
    1
}

pub async fn step_handler(
    sim: SharedSimulation,
    query: web::Query<StepQuery>,
) -> Result<web::Json<Snapshot>> {
    let frames = check_frames(query.frames)?;

    // Stepping is CPU-bound; the lock is taken on the blocking pool, not an async worker
    let sim = sim.into_inner();
    let stepped = tokio::task::spawn_blocking(move || {
        let mut sim = sim.lock().map_err(|_| Poisoned)?;
        Ok::<_, Poisoned>(sim.advance_by(frames).map(|()| sim.snapshot()))
    })
    .await
    .map_err(actix_web::error::ErrorInternalServerError)??;

    Ok(web::Json(stepped.map_err(rejected)?))
}

pub async fn reset_handler(sim: SharedSimulation) -> Result<web::Json<Snapshot>> {
    let mut sim = lock(&sim)?;
    sim.reset().map_err(rejected)?;
    Ok(web::Json(sim.snapshot()))
}

pub async fn add_link_handler(sim: SharedSimulation) -> Result<web::Json<Snapshot>> {
    let mut sim = lock(&sim)?;
    sim.add_link().map_err(rejected)?;
    Ok(web::Json(sim.snapshot()))
}

pub async fn remove_link_handler(sim: SharedSimulation) -> Result<web::Json<Snapshot>> {
    let mut sim = lock(&sim)?;
    sim.remove_link(); // No-op on a single link
    Ok(web::Json(sim.snapshot()))
}

#[derive(Deserialize)]
pub struct LinkUpdate {
    mass: Option<f64>,   // New mass, must be > 0
    length: Option<f64>, // New length, must be > 0
}

pub async fn update_link_handler(
    sim: SharedSimulation,
    index: web::Path<usize>,
    update: web::Json<LinkUpdate>,
) -> Result<web::Json<Snapshot>> {
    let mut sim = lock(&sim)?;
    sim.update_link(index.into_inner(), update.mass, update.length)
        .map_err(rejected)?;
    Ok(web::Json(sim.snapshot()))
}

#[derive(Deserialize)]
pub struct DragSettings {
    enabled: bool,      // Air resistance on/off
    coeff: Option<f64>, // Keeps the current coefficient when absent
}

pub async fn drag_handler(
    sim: SharedSimulation,
    settings: web::Json<DragSettings>,
) -> Result<web::Json<Snapshot>> {
    let mut sim = lock(&sim)?;
    sim.set_drag(settings.enabled, settings.coeff)
        .map_err(rejected)?;
    Ok(web::Json(sim.snapshot()))
}

#[derive(Deserialize)]
pub struct SimParams {
    links: Option<Chain>,    // Explicit starting chain; wins over n
    n: Option<usize>,        // Default chain size when no links are given
    #[serde(default)]
    use_drag: bool,          // Air resistance on/off
    drag_coeff: Option<f64>, // Defaults to the session default
    steps: usize,            // Number of frames to simulate
}

#[derive(Serialize)]
struct SimResponse {
    success: bool,            // Whether the simulation succeeded
    trajectory_image: String, // Base64-encoded PNG: end-bob trail and energy over time
    links: Chain,             // Chain after the last frame
    energy: Vec<Energy>,      // Per-frame energy; work_drag is cumulative
    trail: Vec<(f64, f64)>,   // Last TRAIL_CAPACITY end-bob positions
}

/// Runs a fresh session for `steps` frames and returns the series plus a rendered plot.
pub async fn simulate_handler(params: web::Json<SimParams>) -> Result<HttpResponse> {
    let params = params.into_inner();
    let steps = check_frames(params.steps)?;

    // Build the starting session from explicit links or the default formula
    let mut sim = match params.links {
        Some(chain) if chain.len() > MAX_LINKS => {
            return Err(rejected(PendulumError::invalid_parameter(format!(
                "at most {MAX_LINKS} links per simulation, got {}",
                chain.len()
            ))));
        }
        Some(chain) => Simulation::from_chain(chain),
        None => Simulation::new(params.n.unwrap_or(2)).map_err(rejected)?,
    };
    sim.set_drag(params.use_drag, params.drag_coeff)
        .map_err(rejected)?;

    // Stepping is CPU-bound; keep it off the async workers
    let (sim, frames) = tokio::task::spawn_blocking(move || {
        let frames = sim.run(steps)?;
        Ok::<_, PendulumError>((sim, frames))
    })
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?
    .map_err(rejected)?;
    let energy: Vec<Energy> = frames.iter().map(|f| f.energy).collect();
    let times: Vec<f64> = frames.iter().map(|f| f.time).collect();
    let trail: Vec<(f64, f64)> = sim.trail().iter().copied().collect();

    // Plot reach is the fully stretched chain
    let reach: f64 = sim.chain().links().iter().map(|l| l.length()).sum();
    let trajectory_image = render_plot(&trail, &times, &energy, reach * 1.05)?;

    info!(
        links = sim.chain().len(),
        steps,
        use_drag = sim.use_drag(),
        work_drag = sim.work_drag_total(),
        "batch simulation finished"
    );

    Ok(HttpResponse::Ok().json(SimResponse {
        success: true,
        trajectory_image,
        links: sim.chain().clone(),
        energy,
        trail,
    }))
}

/// Pads a degenerate range so plotters always gets a non-empty axis.
fn padded_range(values: impl Iterator<Item = f64>) -> std::ops::Range<f64> {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return -1.0..1.0;
    }
    let pad = ((hi - lo) * 0.05).max(1.0);
    (lo - pad)..(hi + pad)
}

/// Renders the end-bob trail (left) and kinetic/potential/total energy (right) into a PNG data URL.
pub fn render_plot(
    trail: &[(f64, f64)],
    times: &[f64],
    energy: &[Energy],
    limit: f64,
) -> io::Result<String> {
    // Image size in pixels: two square panels side by side
    const W: u32 = 1000;
    const H: u32 = 500;

    // Allocate RGB pixel buffer (3 bytes per pixel)
    let mut pixel_buffer = vec![0u8; (W * H * 3) as usize];

    {
        let root = BitMapBackend::with_buffer(&mut pixel_buffer, (W, H)).into_drawing_area();
        root.fill(&WHITE).map_err(io::Error::other)?;
        let (left, right) = root.split_horizontally((W / 2) as i32);

        // Trail panel; y is flipped so the pendulum hangs downward on screen
        let mut chart = ChartBuilder::on(&left)
            .caption(
                format!("End-bob trail (last {TRAIL_CAPACITY})"),
                ("sans-serif", 20).into_font(),
            )
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(-limit..limit, -limit..limit)
            .map_err(io::Error::other)?;
        chart.configure_mesh().draw().map_err(io::Error::other)?;
        chart
            .draw_series(LineSeries::new(
                trail.iter().map(|&(x, y)| (x, -y)),
                GREEN.mix(0.8).stroke_width(2),
            ))
            .map_err(io::Error::other)?;

        // Energy panel
        let t_end = times.last().copied().unwrap_or(1.0);
        let y_range = padded_range(
            energy
                .iter()
                .flat_map(|e| [e.kinetic, e.potential, e.mechanical()]),
        );
        let mut chart = ChartBuilder::on(&right)
            .caption("Energy (J)", ("sans-serif", 20).into_font())
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(60)
            .build_cartesian_2d(0.0..t_end, y_range)
            .map_err(io::Error::other)?;
        chart.configure_mesh().draw().map_err(io::Error::other)?;

        let series: [(&str, RGBColor, fn(&Energy) -> f64); 3] = [
            ("kinetic", BLUE, |e| e.kinetic),
            ("potential", RED, |e| e.potential),
            ("total", BLACK, Energy::mechanical),
        ];
        for (label, color, value) in series {
            chart
                .draw_series(LineSeries::new(
                    times.iter().zip(energy).map(|(&t, e)| (t, value(e))),
                    color.stroke_width(1),
                ))
                .map_err(io::Error::other)?
                .label(label)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(io::Error::other)?;

        root.present().map_err(io::Error::other)?;
    }

    // Create an image buffer from raw RGB pixels
    let img_buffer = image::ImageBuffer::from_raw(W, H, pixel_buffer)
        .ok_or_else(|| io::Error::other("Failed to create image buffer"))?;
    let dynamic_image = image::DynamicImage::ImageRgb8(img_buffer);

    // Encode raw RGB pixels into PNG format
    let mut png_buffer = Cursor::new(Vec::new());
    dynamic_image
        .write_to(&mut png_buffer, ImageFormat::Png)
        .map_err(|e| io::Error::other(e.to_string()))?;

    // Convert PNG bytes into a Base64 data URL
    Ok(format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(png_buffer.into_inner())
    ))
}
