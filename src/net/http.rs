//! HTTP GET helper
//!
//! A single plain-HTTP GET request over the outbound connector, used by the
//! Telnet `curl` command. No redirects, no chunked decoding, no TLS.

use std::time::Duration;

use crate::error::{ConnectionError, HttpError};
use crate::net::connector::Connector;

/// Longest silence tolerated while waiting for the reply.
pub const HTTP_REPLY_TIMEOUT: Duration = Duration::from_secs(3);

const HEADER_BUFFER_SIZE: usize = 4096;
const BODY_CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Status line and headers, as received.
    pub header: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Url {
    host: String,
    port: u16,
    path: String,
}

fn parse_url(url: &str) -> Result<Url, HttpError> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| HttpError::InvalidUrl(url.to_string()))?;
    let (authority, path) = match rest.find('/') {
        Some(slash) => (&rest[..slash], &rest[slash..]),
        None => (rest, "/"),
    };
    if authority.is_empty() {
        return Err(HttpError::InvalidUrl(url.to_string()));
    }
    let invalid = || HttpError::InvalidUrl(url.to_string());
    let parse_port = |port: &str| port.parse::<u16>().map_err(|_| invalid());
    let (host, port) = match authority.strip_prefix('[') {
        Some(bracketed) => {
            let (host, after) = bracketed.split_once(']').ok_or_else(invalid)?;
            match after.strip_prefix(':') {
                Some(port) => (host, parse_port(port)?),
                None if after.is_empty() => (host, 80),
                None => return Err(invalid()),
            }
        }
        None => match authority.split_once(':') {
            Some((host, port)) => (host, parse_port(port)?),
            None => (authority, 80),
        },
    };
    Ok(Url {
        host: host.to_string(),
        port,
        path: path.to_string(),
    })
}

/// Fetches `url` and reads the response until the server closes the
/// connection. A server that stays silent for `HTTP_REPLY_TIMEOUT` fails
/// the request.
pub async fn http_get(connector: &Connector, url: &str) -> Result<HttpResponse, HttpError> {
    let url = parse_url(url)?;
    let mut connection = connector.connect(&url.host, url.port).await?;
    connection.set_idle_timeout(HTTP_REPLY_TIMEOUT);

    let request = format!(
        "GET {} HTTP/1.0\r\nHost: {}\r\nUser-Agent: lwnet\r\nConnection: close\r\n\r\n",
        url.path, url.host
    );
    connection.send_string(&request).await?;

    let mut header = vec![0u8; HEADER_BUFFER_SIZE];
    let n = connection.recv_string(&mut header, b"\r\n\r\n").await?;
    if n == header.len() {
        return Err(HttpError::MalformedResponse);
    }
    let header = String::from_utf8_lossy(&header[..n]).into_owned();
    let status = parse_status(&header).ok_or(HttpError::MalformedResponse)?;

    let mut body = Vec::new();
    let mut chunk = [0u8; BODY_CHUNK_SIZE];
    loop {
        match connection.recv(&mut chunk).await {
            Ok(n) => body.extend_from_slice(&chunk[..n]),
            Err(ConnectionError::PeerClosed) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(HttpResponse {
        status,
        header,
        body,
    })
}

fn parse_status(header: &str) -> Option<u16> {
    let status_line = header.lines().next()?;
    let mut parts = status_line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}
