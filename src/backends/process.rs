use crate::error::BackendError;
use std::io::ErrorKind;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Runs `command` to completion, killing it once `timeout` elapses.
///
/// A missing program maps to `Unavailable` so the chain can tell "not
/// installed" apart from "installed but failed".
pub fn run_bounded(command: &mut Command, timeout: Duration) -> Result<(), BackendError> {
    let program = command.get_program().to_string_lossy().into_owned();

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => BackendError::Unavailable(format!("{} not found", program)),
            _ => BackendError::Io(e),
        })?;

    match child.wait_timeout(timeout)? {
        Some(status) if status.success() => Ok(()),
        Some(status) => {
            tracing::debug!("{} exited with {}", program, status);
            Err(BackendError::ExitStatus(status.code()))
        }
        None => {
            // Timeout occurred, kill the process
            let _ = child.kill();
            let _ = child.wait();
            Err(BackendError::TimedOut(timeout))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn success_and_failure_status() {
        assert!(run_bounded(&mut Command::new("true"), Duration::from_secs(5)).is_ok());
        assert!(matches!(
            run_bounded(&mut Command::new("false"), Duration::from_secs(5)),
            Err(BackendError::ExitStatus(Some(1)))
        ));
    }

    #[test]
    fn missing_program_is_unavailable() {
        let result = run_bounded(
            &mut Command::new("voxloop-definitely-not-installed"),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
    }

    #[test]
    fn chatty_stderr_does_not_stall() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("head -c 262144 /dev/zero >&2");
        let started = std::time::Instant::now();
        assert!(run_bounded(&mut cmd, Duration::from_secs(5)).is_ok());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn slow_program_is_killed() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let started = std::time::Instant::now();
        let result = run_bounded(&mut cmd, Duration::from_millis(100));
        assert!(matches!(result, Err(BackendError::TimedOut(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
