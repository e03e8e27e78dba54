use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use lime_rt::engine::progress::{PassReport, Progress, ProgressCallback};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

/// Renders engine progress events on stderr.
#[derive(Clone)]
pub struct CliProgressHandler {
    pb: Arc<Mutex<ProgressBar>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let pb = ProgressBar::new(0)
            .with_style(Self::spinner_style())
            .with_message("Initializing...");
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.finish_and_clear();

        Self {
            pb: Arc::new(Mutex::new(pb)),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let pb = self.pb.clone();

        Box::new(move |progress: Progress| {
            let Ok(pb) = pb.lock() else {
                warn!("Progress bar mutex was poisoned. Cannot update progress.");
                return;
            };

            match progress {
                Progress::PhaseStart { name } => {
                    pb.reset();
                    pb.set_length(0);
                    pb.set_style(Self::spinner_style());
                    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                    pb.set_message(name.to_string());
                }
                Progress::PhaseFinish => {
                    pb.disable_steady_tick();
                    pb.finish_with_message("✓ Done");
                }
                Progress::TaskStart { total } => {
                    pb.disable_steady_tick();
                    pb.reset();
                    pb.set_length(total);
                    pb.set_position(0);
                    pb.set_style(Self::bar_style());
                }
                Progress::TaskIncrement => pb.inc(1),
                Progress::TaskFinish => {
                    let length = pb.length().unwrap_or(0);
                    if pb.position() < length {
                        pb.set_position(length);
                    }
                }
                Progress::PassComplete(report) => {
                    pb.println(Self::format_pass(&report));
                    pb.set_message(format!("Pass {}", report.pass + 1));
                }
                Progress::Message(msg) => pb.println(format!("  {}", msg)),
            }
        })
    }

    pub fn format_pass(report: &PassReport) -> String {
        let changes: Vec<String> = report.max_change.iter().map(|c| format!("{:.2e}", c)).collect();
        format!(
            "  pass {:>3}: {:5.1}% converged, max change [{}], {} rays{}",
            report.pass,
            report.fraction_converged * 100.0,
            changes.join(", "),
            report.total_rays,
            if report.failed_solves > 0 {
                format!(", {} failed solves", report.failed_solves)
            } else {
                String::new()
            }
        )
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .expect("Failed to create spinner style template")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<20} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .expect("Failed to create bar style template")
            .with_key("eta", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
            })
            .progress_chars("##-")
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_initializes_in_a_clean_state() {
        let handler = CliProgressHandler::new();
        let pb = handler.pb.lock().unwrap();
        assert_eq!(pb.length(), Some(0));
        assert!(pb.is_finished());
    }

    #[test]
    fn callback_tracks_point_updates_of_a_pass() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        callback(Progress::PhaseStart { name: "Iterating" });
        assert_eq!(handler.pb.lock().unwrap().message(), "Iterating");

        callback(Progress::TaskStart { total: 40 });
        callback(Progress::TaskIncrement);
        callback(Progress::TaskIncrement);
        {
            let pb = handler.pb.lock().unwrap();
            assert_eq!(pb.length(), Some(40));
            assert_eq!(pb.position(), 2);
        }

        callback(Progress::TaskFinish);
        assert_eq!(handler.pb.lock().unwrap().position(), 40);

        callback(Progress::PhaseFinish);
        assert_eq!(handler.pb.lock().unwrap().message(), "✓ Done");
    }

    #[test]
    fn pass_summary_lists_every_species() {
        let line = CliProgressHandler::format_pass(&PassReport {
            pass: 4,
            fraction_converged: 0.625,
            max_change: vec![1e-3, 2.5e-7],
            failed_solves: 2,
            total_rays: 1800,
        });
        assert!(line.contains("pass   4"));
        assert!(line.contains("62.5%"));
        assert!(line.contains("1.00e-3, 2.50e-7"));
        assert!(line.contains("2 failed solves"));
    }
}
