//! Length-prefixed transport for the Firefox Remote Debugging Protocol.
//!
//! Every packet is framed as the decimal byte length of its JSON body, a
//! colon, then the body: `17:{"to":"root",...}`.

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{BoxFuture, Transport, TransportParts, TransportReceiver};
use crate::error::{Error, Result};

/// Longest accepted length prefix, in bytes.
const MAX_HEADER_LEN: usize = 20;

/// Largest accepted frame body, in bytes.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Encodes one message as a `<len>:<json>` frame.
pub fn encode_frame(message: &Value) -> Result<Vec<u8>> {
	let body = serde_json::to_vec(message)?;
	let mut frame = format!("{}:", body.len()).into_bytes();
	frame.extend_from_slice(&body);
	Ok(frame)
}

/// Reads one frame body. Returns `None` on a clean end of stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
	R: AsyncBufRead + Unpin,
{
	let mut header = Vec::with_capacity(8);
	loop {
		let byte = match reader.read_u8().await {
			Ok(byte) => byte,
			Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof && header.is_empty() => return Ok(None),
			Err(e) => return Err(e.into()),
		};
		if byte == b':' {
			break;
		}
		header.push(byte);
		if header.len() > MAX_HEADER_LEN {
			return Err(Error::Transport(format!("frame header too long: {:?}", String::from_utf8_lossy(&header))));
		}
	}

	let header = std::str::from_utf8(&header).map_err(|_| Error::Transport("frame header is not UTF-8".into()))?;
	if header.starts_with("bulk") {
		return Err(Error::Transport("bulk packets are not supported".into()));
	}
	let length: usize = header
		.trim()
		.parse()
		.map_err(|_| Error::Transport(format!("invalid frame length: {header:?}")))?;
	if length > MAX_FRAME_LEN {
		return Err(Error::Transport(format!("frame of {length} bytes exceeds the {MAX_FRAME_LEN} byte limit")));
	}

	let mut body = vec![0u8; length];
	reader.read_exact(&mut body).await?;
	Ok(Some(body))
}

/// Constructors for the framed transport.
pub struct FramedTransport;

impl FramedTransport {
	/// Connects to a Firefox debugger server.
	pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TransportParts> {
		let address = format!("{host}:{port}");
		let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
			.await
			.map_err(|_| Error::ConnectionFailed {
				address: address.clone(),
				reason: format!("no TCP connection within {}ms", timeout.as_millis()),
			})?
			.map_err(|e| Error::ConnectionFailed {
				address: address.clone(),
				reason: e.to_string(),
			})?;
		stream.set_nodelay(true)?;

		debug!(target = "extdev", %address, "debugger server socket connected");
		let (read_half, write_half) = stream.into_split();
		Ok(Self::new(write_half, read_half, address))
	}

	/// Wraps any byte stream pair.
	pub fn new<W, R>(writer: W, reader: R, address: impl Into<String>) -> TransportParts
	where
		W: AsyncWrite + Unpin + Send + 'static,
		R: AsyncRead + Unpin + Send + 'static,
	{
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		TransportParts {
			sender: Box::new(FramedTransportSender { writer }),
			receiver: Box::new(FramedTransportReceiver {
				reader: BufReader::new(reader),
				message_tx,
			}),
			message_rx,
			address: address.into(),
		}
	}
}

/// Outbound half.
pub struct FramedTransportSender<W> {
	writer: W,
}

impl<W> Transport for FramedTransportSender<W>
where
	W: AsyncWrite + Unpin + Send + 'static,
{
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			let frame = encode_frame(&message)?;
			self.writer.write_all(&frame).await?;
			self.writer.flush().await?;
			Ok(())
		})
	}

	fn close(&mut self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			self.writer.shutdown().await?;
			Ok(())
		})
	}
}

/// Inbound half.
pub struct FramedTransportReceiver<R> {
	reader: BufReader<R>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<R> TransportReceiver for FramedTransportReceiver<R>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	fn run(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			let mut this = *self;
			while let Some(body) = read_frame(&mut this.reader).await? {
				match serde_json::from_slice::<Value>(&body) {
					Ok(value) => {
						if this.message_tx.send(value).is_err() {
							break;
						}
					}
					Err(e) => warn!(target = "extdev", error = %e, "dropping undecodable debugger packet"),
				}
			}
			Ok(())
		})
	}
}
