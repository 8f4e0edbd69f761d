use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Cooperative cancellation flag handed to deadline workers.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum WorkerError {
    DeadlineExceeded,
    /// The worker panicked or dropped its result.
    Lost,
}

/// Runs `job` on a worker thread and waits at most `deadline` for it.
///
/// On expiry the worker's token is cancelled and the caller gets
/// `DeadlineExceeded`; a worker that ignores its token keeps running
/// detached until it returns on its own.
pub fn run_with_deadline<T, F>(deadline: Duration, job: F) -> Result<T, WorkerError>
where
    T: Send + 'static,
    F: FnOnce(CancelToken) -> T + Send + 'static,
{
    let (tx, rx) = channel();
    let token = CancelToken::new();
    let worker_token = token.clone();

    thread::spawn(move || {
        let _ = tx.send(job(worker_token));
    });

    match rx.recv_timeout(deadline) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => {
            token.cancel();
            Err(WorkerError::DeadlineExceeded)
        }
        Err(RecvTimeoutError::Disconnected) => Err(WorkerError::Lost),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn returns_value_within_deadline() {
        assert_eq!(run_with_deadline(Duration::from_secs(1), |_| 42), Ok(42));
    }

    #[test]
    fn deadline_cancels_worker() {
        let (seen_tx, seen_rx) = channel();
        let started = Instant::now();
        let result = run_with_deadline(Duration::from_millis(50), move |token| {
            while !token.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            let _ = seen_tx.send(());
        });
        assert_eq!(result, Err(WorkerError::DeadlineExceeded));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(seen_rx.recv_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn panicking_worker_is_lost() {
        let result: Result<(), _> = run_with_deadline(Duration::from_secs(1), |_| panic!("boom"));
        assert_eq!(result, Err(WorkerError::Lost));
    }
}
