//! Raw tunnel relay for hijacked CONNECT streams.
//!
//! Used when a matching destination asks for a plaintext tunnel: instead of
//! TLS interception, the client's bytes are framed into whole HTTP/1.1
//! messages with httparse, forwarded verbatim over a raw TCP connection to
//! the upstream, and the upstream's replies are streamed back the same way.
//! The loop runs until either side errors or closes.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Maximum number of headers accepted in a relayed message.
const MAX_HEADERS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageKind {
    Request,
    Response,
}

/// Framing information extracted from a parsed message head.
struct Framing {
    header_len: usize,
    content_length: Option<usize>,
    chunked: bool,
    no_body: bool,
}

/// Relays whole HTTP messages between a hijacked client stream and a fresh
/// TCP connection to `upstream_addr`, until I/O fails or either side closes.
pub async fn relay<C>(client: C, upstream_addr: &str) -> std::io::Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let upstream = TcpStream::connect(upstream_addr).await?;
    tracing::debug!(upstream = %upstream_addr, "tunnel relay established");

    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut upstream_rd, mut upstream_wr) = tokio::io::split(upstream);

    loop {
        let Some(message) = read_message(&mut client_rd, MessageKind::Request).await? else {
            break;
        };
        upstream_wr.write_all(&message).await?;
        upstream_wr.flush().await?;

        let Some(reply) = read_message(&mut upstream_rd, MessageKind::Response).await? else {
            break;
        };
        client_wr.write_all(&reply).await?;
        client_wr.flush().await?;
    }

    Ok(())
}

/// Reads one whole HTTP message. Returns `None` on a clean EOF before any
/// bytes arrive; a mid-message close yields whatever was received so the
/// remnant can still be forwarded.
async fn read_message<R>(reader: &mut R, kind: MessageKind) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(8192);
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Ok(Some(buf));
        }
        buf.extend_from_slice(&chunk[..n]);

        if message_complete(&buf, kind)? {
            return Ok(Some(buf));
        }
    }
}

/// Checks whether the buffer holds one complete message of the given kind.
///
/// A response with neither content-length nor chunked framing can only end
/// with the connection, so it is never "complete" here and gets flushed by
/// the EOF path above.
pub(crate) fn message_complete(buf: &[u8], kind: MessageKind) -> std::io::Result<bool> {
    let Some(framing) = parse_framing(buf, kind)? else {
        return Ok(false);
    };

    if framing.no_body {
        return Ok(buf.len() >= framing.header_len);
    }
    if framing.chunked {
        return Ok(chunked_complete(&buf[framing.header_len..]));
    }
    if let Some(content_length) = framing.content_length {
        return Ok(buf.len() >= framing.header_len + content_length);
    }

    match kind {
        // Requests without length information carry no body.
        MessageKind::Request => Ok(true),
        MessageKind::Response => Ok(false),
    }
}

fn parse_framing(buf: &[u8], kind: MessageKind) -> std::io::Result<Option<Framing>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];

    let (status, parsed_headers, no_body) = match kind {
        MessageKind::Request => {
            let mut req = httparse::Request::new(&mut headers);
            let status = req
                .parse(buf)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            (status, req.headers, false)
        }
        MessageKind::Response => {
            let mut resp = httparse::Response::new(&mut headers);
            let status = resp
                .parse(buf)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let no_body = matches!(resp.code, Some(100..=199) | Some(204) | Some(304));
            (status, resp.headers, no_body)
        }
    };

    let httparse::Status::Complete(header_len) = status else {
        return Ok(None);
    };

    let mut content_length = None;
    let mut chunked = false;
    for header in parsed_headers.iter() {
        if header.name.eq_ignore_ascii_case("content-length") {
            content_length = String::from_utf8_lossy(header.value).trim().parse().ok();
        }
        if header.name.eq_ignore_ascii_case("transfer-encoding")
            && String::from_utf8_lossy(header.value)
                .to_lowercase()
                .contains("chunked")
        {
            chunked = true;
        }
    }

    Ok(Some(Framing {
        header_len,
        content_length,
        chunked,
        no_body,
    }))
}

/// Checks whether a chunked body has reached its terminating chunk.
fn chunked_complete(body: &[u8]) -> bool {
    if body.len() >= 5 && &body[body.len() - 5..] == b"0\r\n\r\n" {
        return true;
    }

    body.windows(3)
        .position(|w| w == b"0\r\n")
        .map(|pos| {
            let after = &body[pos + 3..];
            after.windows(2).any(|w| w == b"\r\n")
        })
        .unwrap_or(false)
}
