use std::io::Write;
use std::time::Duration;

use tracing::debug;

use crate::error::{DatasetError, Result};

/// Source of remote bytes. Implementations stream the body of `url` into
/// `sink` and return the number of bytes written.
pub trait Transport {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64>;
}

/// Closures can stand in for the network, e.g. to serve files from memory.
impl<F> Transport for F
where
    F: Fn(&str, &mut dyn Write) -> Result<u64>,
{
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64> {
        self(url, sink)
    }
}

/// Plain HTTP(S) GET with no authentication.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<HttpTransport> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DatasetError::Config(format!("building HTTP client: {e}")))?;

        Ok(HttpTransport { client })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64> {
        let http_err = |source: reqwest::Error| DatasetError::Http {
            url: url.to_string(),
            source,
        };

        let mut response = self.client.get(url).send().map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(DatasetError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let written = response.copy_to(sink).map_err(http_err)?;
        debug!(url, bytes = written, "Response body received");

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_acts_as_transport() {
        let transport = |url: &str, sink: &mut dyn Write| -> Result<u64> {
            sink.write_all(url.as_bytes())
                .map_err(|e| DatasetError::io("writing", e))?;
            Ok(url.len() as u64)
        };

        let mut body = Vec::new();
        let written = transport.fetch("http://host/file.gz", &mut body).unwrap();

        assert_eq!(written, 19);
        assert_eq!(body, b"http://host/file.gz");
    }
}
