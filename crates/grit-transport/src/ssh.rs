//! SSH transport: an `ssh` subprocess running the remote service.
//!
//! Authentication (keys, agents, prompts) belongs to the ssh client and
//! its configuration; this code only wires the pipes.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};

use crate::{GitUrl, Service, Transport, TransportError};

pub struct SshTransport {
    child: Child,
}

impl Transport for SshTransport {
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
            // ssh exits non-zero for reasons that are not git errors
            // (the remote closing after a completed push, say); only the
            // hard failure codes surface.
            let code = status.code().unwrap_or(-1);
            if code == 128 || code == 255 {
                return Err(TransportError::Ssh(format!(
                    "ssh exited with code {code}"
                )));
            }
        }
        Ok(())
    }

    fn cancel(&mut self) {
        let _ = self.child.kill();
    }
}

/// The ssh client to run: `GIT_SSH_COMMAND`, then `GIT_SSH`, then `ssh`.
fn resolve_ssh_command() -> String {
    std::env::var("GIT_SSH_COMMAND")
        .or_else(|_| std::env::var("GIT_SSH"))
        .unwrap_or_else(|_| "ssh".to_string())
}

/// Connect to a remote repository over SSH.
pub fn connect(url: &GitUrl, service: Service) -> Result<Box<dyn Transport>, TransportError> {
    let host = url
        .host
        .as_deref()
        .ok_or_else(|| TransportError::InvalidUrl("SSH URL requires a host".into()))?;

    let ssh_cmd = resolve_ssh_command();

    let mut cmd = if ssh_cmd.contains(' ') {
        // A composite GIT_SSH_COMMAND goes through the shell.
        let mut shell_cmd = ssh_cmd.clone();
        if let Some(port) = url.port {
            shell_cmd.push_str(&format!(" -p {port}"));
        }
        match &url.user {
            Some(user) => shell_cmd.push_str(&format!(" {user}@{host}")),
            None => shell_cmd.push_str(&format!(" {host}")),
        }
        shell_cmd.push_str(&format!(" {} '{}'", service.as_str(), url.path));

        let mut c = Command::new("sh");
        c.arg("-c").arg(shell_cmd);
        c
    } else {
        let mut c = Command::new(&ssh_cmd);
        if let Some(port) = url.port {
            c.arg("-p").arg(port.to_string());
        }
        match &url.user {
            Some(user) => c.arg(format!("{user}@{host}")),
            None => c.arg(host),
        };
        c.arg(service.as_str());
        c.arg(&url.path);
        c
    };

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let child = cmd
        .spawn()
        .map_err(|e| TransportError::Ssh(format!("failed to spawn ssh: {e}")))?;

    Ok(Box::new(SshTransport { child }))
}
