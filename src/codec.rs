//! Content-Length framed JSON-RPC transport.
//!
//! LSP frames are `Content-Length: N\r\n\r\n` followed by exactly N bytes of
//! JSON. Header names are matched case-insensitively and unknown headers
//! (e.g. `Content-Type`) are skipped.

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on a single frame body; a server claiming more is broken.
const FRAME_LIMIT: usize = 8 * 1024 * 1024;

/// Reads framed JSON-RPC messages from a server's stdout.
pub(crate) struct MessageReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            inner: BufReader::new(source),
        }
    }

    /// Next message, or `Ok(None)` on clean EOF at a frame boundary.
    pub async fn next(&mut self) -> Result<Option<serde_json::Value>> {
        let Some(len) = self.header_block().await? else {
            return Ok(None);
        };
        if len > FRAME_LIMIT {
            bail!("frame of {len} bytes exceeds the {FRAME_LIMIT} byte limit");
        }

        let mut body = vec![0u8; len];
        self.inner
            .read_exact(&mut body)
            .await
            .context("reading frame body")?;

        serde_json::from_slice(&body)
            .context("decoding frame body")
            .map(Some)
    }

    /// Consume headers up to the blank separator line and return the
    /// `Content-Length` value.
    ///
    /// `Ok(None)` only for EOF before any header byte was read; EOF inside a
    /// header block means the server died mid-frame and is an error.
    async fn header_block(&mut self) -> Result<Option<usize>> {
        let mut line = String::new();
        let mut length = None;
        let mut mid_block = false;

        loop {
            line.clear();
            let n = self
                .inner
                .read_line(&mut line)
                .await
                .context("reading frame header")?;
            if n == 0 {
                if mid_block {
                    bail!("connection closed inside a frame header");
                }
                return Ok(None);
            }
            mid_block = true;

            let header = line.trim();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':')
                && name.trim().eq_ignore_ascii_case("content-length")
            {
                length = Some(
                    value
                        .trim()
                        .parse::<usize>()
                        .context("invalid Content-Length value")?,
                );
            }
        }

        match length {
            Some(n) => Ok(Some(n)),
            None => bail!("frame headers missing Content-Length"),
        }
    }
}

/// Writes framed JSON-RPC messages to a server's stdin.
pub(crate) struct MessageWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { inner: sink }
    }

    pub async fn send(&mut self, frame: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec(frame).context("encoding frame body")?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.inner
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.inner
            .write_all(&body)
            .await
            .context("writing frame body")?;
        self.inner.flush().await.context("flushing frame")
    }
}
