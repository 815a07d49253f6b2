//! Local transport: spawn the service process against an on-disk
//! repository (`file://` URLs and bare paths).

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};

use crate::{GitUrl, Service, Transport, TransportError};

/// A spawned local `git-upload-pack`/`git-receive-pack`.
pub struct LocalTransport {
    child: Child,
}

impl Transport for LocalTransport {
    fn reader(&mut self) -> &mut dyn Read {
        self.child.stdout.as_mut().expect("stdout captured at spawn")
    }

    fn writer(&mut self) -> &mut dyn Write {
        self.child.stdin.as_mut().expect("stdin captured at spawn")
    }

    fn close(mut self: Box<Self>) -> Result<(), TransportError> {
        drop(self.child.stdin.take());
        let status = self.child.wait()?;
        if !status.success() {
            return Err(TransportError::ConnectionFailed(format!(
                "{} exited with code {}",
                "local service process",
                status.code().unwrap_or(-1)
            )));
        }
        Ok(())
    }

    fn cancel(&mut self) {
        let _ = self.child.kill();
    }
}

/// Spawn the service for a local repository path.
pub fn connect(url: &GitUrl, service: Service) -> Result<Box<dyn Transport>, TransportError> {
    let child = Command::new(service.as_str())
        .arg(&url.path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "failed to spawn {}: {e}",
                service.as_str()
            ))
        })?;

    Ok(Box::new(LocalTransport { child }))
}
