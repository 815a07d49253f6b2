//! Smart HTTP transport.
//!
//! One GET to `<repo>/info/refs?service=...` retrieves the ref
//! advertisement; each later request round is a POST to the service
//! endpoint carrying the buffered client bytes. TLS, proxies, and
//! authentication are delegated to the `curl` binary, the same way the
//! ssh transport delegates to `ssh`.

use std::io::{Cursor, Read, Write};

use crate::{GitUrl, Service, Transport, TransportError};

pub struct HttpTransport {
    base_url: String,
    service: Service,
    /// Bytes buffered for the next POST.
    write_buf: Vec<u8>,
    /// The current response being read. Starts as the info/refs
    /// advertisement (which keeps its `# service=` announcement prefix
    /// for the protocol layer to skip).
    read_buf: Cursor<Vec<u8>>,
    canceled: bool,
}

impl HttpTransport {
    fn service_url(&self) -> String {
        format!("{}/{}", self.base_url, self.service.as_str())
    }
}

impl Transport for HttpTransport {
    fn reader(&mut self) -> &mut dyn Read {
        &mut self.read_buf
    }

    fn writer(&mut self) -> &mut dyn Write {
        &mut self.write_buf
    }

    fn finish_request(&mut self) -> Result<(), TransportError> {
        if self.canceled {
            return Err(TransportError::ConnectionFailed("canceled".into()));
        }
        let body = std::mem::take(&mut self.write_buf);
        let content_type = format!("application/x-{}-request", self.service.as_str());
        let accept = format!("application/x-{}-result", self.service.as_str());
        let response = http_post(&self.service_url(), &content_type, &accept, &body)?;
        self.read_buf = Cursor::new(response);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), TransportError> {
        Ok(())
    }

    fn cancel(&mut self) {
        self.canceled = true;
        self.write_buf.clear();
        self.read_buf = Cursor::new(Vec::new());
    }

    fn is_stateless(&self) -> bool {
        true
    }
}

/// Connect over smart HTTP: performs the info/refs discovery GET.
pub fn connect(url: &GitUrl, service: Service) -> Result<Box<dyn Transport>, TransportError> {
    let base_url = format!(
        "{}://{}{}{}",
        url.scheme,
        url.host.as_deref().unwrap_or(""),
        url.port.map(|p| format!(":{p}")).unwrap_or_default(),
        url.path
    );

    let advert_url = format!("{}/info/refs?service={}", base_url, service.as_str());
    let advertisement = http_get(&advert_url)?;

    Ok(Box::new(HttpTransport {
        base_url,
        service,
        write_buf: Vec::new(),
        read_buf: Cursor::new(advertisement),
        canceled: false,
    }))
}

/// Blocking GET via the curl binary.
fn http_get(url: &str) -> Result<Vec<u8>, TransportError> {
    let output = std::process::Command::new("curl")
        .args(["-sfL", url])
        .output()
        .map_err(|e| TransportError::ConnectionFailed(format!("curl not found: {e}")))?;

    if !output.status.success() {
        return Err(TransportError::Http {
            status: 0,
            message: format!(
                "GET {url} failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ),
        });
    }
    Ok(output.stdout)
}

/// Blocking POST via the curl binary, body on stdin.
fn http_post(
    url: &str,
    content_type: &str,
    accept: &str,
    body: &[u8],
) -> Result<Vec<u8>, TransportError> {
    use std::process::{Command, Stdio};

    let mut child = Command::new("curl")
        .args([
            "-sf",
            "-X",
            "POST",
            "-H",
            &format!("Content-Type: {content_type}"),
            "-H",
            &format!("Accept: {accept}"),
            "--data-binary",
            "@-",
            url,
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| TransportError::ConnectionFailed(format!("curl not found: {e}")))?;

    if let Some(ref mut stdin) = child.stdin {
        stdin.write_all(body)?;
    }
    drop(child.stdin.take());

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(TransportError::Http {
            status: 0,
            message: format!(
                "POST {url} failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ),
        });
    }
    Ok(output.stdout)
}
