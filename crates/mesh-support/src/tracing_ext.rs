//! Tracing helpers for the sampling pipeline.
//!
//! The library never installs a subscriber. To see the stage timings and
//! mesh state logs, initialize one in the application:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=mesh_support=debug for per-stage statistics
//! ```
//!
//! Targets:
//! - `mesh_support::timing`: stage start (DEBUG) and duration (INFO)
//! - `mesh_support::mesh_state`: mesh dimensions between stages (DEBUG)
//! - `mesh_support::widths`: thickness distribution (DEBUG)

use std::time::Instant;
use tracing::{Span, debug, info};

use crate::Mesh;
use crate::width::is_measured;

/// Logs the duration of a pipeline stage when dropped.
///
/// ```rust,ignore
/// let _timer = OperationTimer::new("subdivide");
/// // ... work ...
/// // duration logged here
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    /// Start timing `name`.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("support_stage", stage = name);
        debug!(target: "mesh_support::timing", stage = name, "Starting stage");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Start timing `name` on a mesh of the given size.
    pub fn with_context(name: &'static str, face_count: usize, vertex_count: usize) -> Self {
        let span = tracing::info_span!(
            "support_stage",
            stage = name,
            faces = face_count,
            vertices = vertex_count
        );
        debug!(
            target: "mesh_support::timing",
            stage = name,
            faces = face_count,
            vertices = vertex_count,
            "Starting stage"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "mesh_support::timing",
            stage = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Stage completed"
        );
    }
}

/// Log mesh size and extent at debug level.
pub fn log_mesh_stats(mesh: &Mesh, context: &str) {
    let (min_bounds, max_bounds) = mesh.bounds().unwrap_or_default();
    let dims = max_bounds - min_bounds;

    debug!(
        target: "mesh_support::mesh_state",
        context = context,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        dimensions = format!("{:.2} x {:.2} x {:.2}", dims.x, dims.y, dims.z),
        min_edge = format!("{:.4}", mesh.min_edge_length().unwrap_or(0.0)),
        "Mesh state"
    );
}

/// Log the distribution of measured thickness values at debug level.
pub fn log_width_stats(widths: &[f64]) {
    let measured: Vec<f64> = widths.iter().copied().filter(|&w| is_measured(w)).collect();
    let min = measured.iter().copied().fold(f64::INFINITY, f64::min);
    let max = measured.iter().copied().fold(0.0, f64::max);
    let mean = if measured.is_empty() {
        0.0
    } else {
        measured.iter().sum::<f64>() / measured.len() as f64
    };

    debug!(
        target: "mesh_support::widths",
        measured = measured.len(),
        unmeasured = widths.len() - measured.len(),
        min = format!("{:.4}", if measured.is_empty() { 0.0 } else { min }),
        max = format!("{:.4}", max),
        mean = format!("{:.4}", mean),
        "Thickness distribution"
    );
}
