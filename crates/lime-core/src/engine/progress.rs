/// Summary of one completed convergence pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    /// One-based pass number.
    pub pass: usize,
    /// Fraction of interior points converged in this pass.
    pub fraction_converged: f64,
    /// Largest relative population change of each species over all points.
    pub max_change: Vec<f64>,
    pub failed_solves: usize,
    pub total_rays: usize,
}

#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total: u64 },
    TaskIncrement,
    TaskFinish,

    PassComplete(PassReport),

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reporter_forwards_events_to_callback() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::PassComplete(report) = event {
                seen.lock().unwrap().push(report.pass);
            }
        }));
        reporter.report(Progress::PhaseStart { name: "Iterating" });
        reporter.report(Progress::PassComplete(PassReport {
            pass: 3,
            fraction_converged: 0.25,
            max_change: vec![0.1],
            failed_solves: 0,
            total_rays: 90,
        }));
        drop(reporter);
        assert_eq!(seen.into_inner().unwrap(), vec![3]);
    }

    #[test]
    fn silent_reporter_ignores_events() {
        ProgressReporter::new().report(Progress::Message("ignored".into()));
    }
}
