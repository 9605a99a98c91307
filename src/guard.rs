//! Deadline for model fitting

use crate::error::PipelineError;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Run `job` on its own thread and wait at most `timeout` for the result.
///
/// On timeout the worker is detached and its result is discarded once it
/// finishes.
pub fn run_with_timeout<T, F>(label: &str, timeout: Duration, job: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name(format!("{}-fit", label))
        .spawn(move || {
            // Receiver is gone after a timeout
            let _ = tx.send(job());
        })
        .map_err(|e| PipelineError::model(format!("cannot spawn {} worker: {}", label, e)))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(PipelineError::Model(format!(
            "{} fit did not finish within {:?}",
            label, timeout
        ))),
        Err(RecvTimeoutError::Disconnected) => Err(PipelineError::Model(format!(
            "{} fit worker exited without a result",
            label
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_job_result() {
        let result = run_with_timeout("test", Duration::from_secs(5), || Ok(7));
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_propagates_job_error() {
        let result: Result<(), _> = run_with_timeout("test", Duration::from_secs(5), || {
            Err(PipelineError::model("bad fit"))
        });
        assert!(matches!(result, Err(PipelineError::Model(msg)) if msg == "bad fit"));
    }

    #[test]
    fn test_times_out() {
        let result = run_with_timeout("slow", Duration::from_millis(10), || {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        });
        assert!(matches!(result, Err(PipelineError::Model(msg)) if msg.contains("did not finish")));
    }

    #[test]
    fn test_panicking_job() {
        let result: Result<(), _> =
            run_with_timeout("panic", Duration::from_secs(5), || panic!("boom"));
        assert!(matches!(result, Err(PipelineError::Model(_))));
    }
}
