use crate::host::HostFamily;
use std::process::{Command, Stdio};
use tracing::warn;

/// Fire-and-forget URL opener.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str);
}

/// Hands URLs to the desktop's default browser.
pub struct SystemBrowser {
    host: HostFamily,
}

impl SystemBrowser {
    pub fn new(host: HostFamily) -> Self {
        Self { host }
    }

    fn command(&self, url: &str) -> Command {
        match self.host {
            HostFamily::Windows => {
                let mut cmd = Command::new("cmd");
                // empty title argument so `start` does not treat the URL as one
                cmd.args(["/C", "start", ""]).arg(url);
                cmd
            }
            HostFamily::MacOs => {
                let mut cmd = Command::new("open");
                cmd.arg(url);
                cmd
            }
            HostFamily::Posix | HostFamily::Other => {
                let mut cmd = Command::new("xdg-open");
                cmd.arg(url);
                cmd
            }
        }
    }
}

impl UrlOpener for SystemBrowser {
    fn open(&self, url: &str) {
        let spawned = self
            .command(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        if let Err(e) = spawned {
            warn!("could not open {}: {}", url, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launcher_per_family() {
        let url = "https://example.com/?q=a+b";
        let program = |host| {
            SystemBrowser::new(host)
                .command(url)
                .get_program()
                .to_string_lossy()
                .into_owned()
        };
        assert_eq!(program(HostFamily::Posix), "xdg-open");
        assert_eq!(program(HostFamily::MacOs), "open");
        assert_eq!(program(HostFamily::Windows), "cmd");
    }
}
