//! Render telemetry and the pass loop.

use serde::Serialize;

use crate::util::{Error, Result};

use super::renderer::Renderer;

/// One progress report. Presentation is up to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Statistics {
    /// Fraction of passes completed, in `[0, 1]`.
    pub progress: f64,
    pub elapsed_seconds: f64,
    /// `None` while the estimate is still warming up.
    pub remaining_seconds: Option<f64>,
    pub triangle_count: u64,
}

/// Receiver of progress ticks and failures.
pub trait ProgressSink {
    fn report(&mut self, stats: &Statistics);

    /// The render failed. The last report stays the latest good snapshot.
    fn failed(&mut self, _error: &Error) {}
}

/// Sink that logs through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn report(&mut self, stats: &Statistics) {
        match stats.remaining_seconds {
            Some(eta) => tracing::info!(
                "progress {:5.1}%  elapsed {:.1}s  remaining {:.1}s  ({} triangles)",
                stats.progress * 100.0,
                stats.elapsed_seconds,
                eta,
                stats.triangle_count
            ),
            None => tracing::info!(
                "progress {:5.1}%  elapsed {:.1}s  remaining --  ({} triangles)",
                stats.progress * 100.0,
                stats.elapsed_seconds,
                stats.triangle_count
            ),
        }
    }

    fn failed(&mut self, error: &Error) {
        tracing::error!("render failed: {error}");
    }
}

/// Run every pass of `renderer`, then finish it.
///
/// The sink gets a report before the first pass and after each pass. On
/// failure the sink is told, the renderer is released without output and
/// the error is returned.
pub fn run(mut renderer: Renderer, sink: &mut dyn ProgressSink) -> Result<Statistics> {
    let mut stats = renderer.statistics();
    sink.report(&stats);

    let outcome = loop {
        match renderer.execute() {
            Ok(done) => {
                stats = renderer.statistics();
                sink.report(&stats);
                if done {
                    break Ok(());
                }
            }
            Err(e) => break Err(e),
        }
    };

    let result = outcome.and_then(|()| renderer.finish());
    if let Err(e) = &result {
        sink.failed(e);
    }
    result.map(|()| stats)
}
