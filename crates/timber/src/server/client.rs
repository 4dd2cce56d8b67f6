//! Client for talking to a Timber server over TCP.
//!
//! Non-streaming requests can be repeated on one [`Client`]. Streaming
//! requests consume it and return a [`ByteStream`]; dropping the stream
//! closes the connection, which ends a follow on the server.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use protocol::{
    decode_line, encode_line, Credentials, ErrorCode, FileNode, HeadRequest, IdentityInfo,
    Operation, PathRequest, ProtocolError, Request, Response, TailRequest,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Default timeout for connecting and for response headers in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Read size for stream bodies.
const STREAM_CHUNK_SIZE: usize = 8 * 1024;

/// Errors returned by [`Client`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server rejected the request.
    #[error("{code:?}: {message}")]
    Server { code: ErrorCode, message: String },

    /// The server answered with a different response type.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The server closed the connection before answering.
    #[error("server closed the connection")]
    ConnectionClosed,

    /// The server did not answer in time.
    #[error("operation timed out")]
    Timeout,
}

/// A connection to a Timber server.
pub struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    credentials: Credentials,
    timeout: Duration,
}

impl Client {
    /// Connect to the server at `addr`.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        credentials: Credentials,
    ) -> Result<Self, ClientError> {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout)??;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            credentials,
            timeout,
        })
    }

    /// Set the timeout for response headers.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send an operation and wait for the response header.
    pub async fn send(&mut self, operation: Operation) -> Result<Response, ClientError> {
        tokio::time::timeout(self.timeout, self.send_internal(operation))
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    async fn send_internal(&mut self, operation: Operation) -> Result<Response, ClientError> {
        let request = Request::new(self.credentials.clone(), operation);
        self.writer.write_all(&encode_line(&request)?).await?;
        self.writer.flush().await?;

        let mut line = Vec::new();
        if self.reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(decode_line(&line)?)
    }

    /// The authenticated identity and its resolved patterns.
    pub async fn me(&mut self) -> Result<IdentityInfo, ClientError> {
        match self.send(Operation::Me).await? {
            Response::Identity(info) => Ok(info),
            other => Err(unexpected(other)),
        }
    }

    /// Whether `path` may be read.
    pub async fn check(&mut self, path: &str) -> Result<bool, ClientError> {
        let operation = Operation::Check(PathRequest {
            path: path.to_string(),
        });
        match self.send(operation).await? {
            Response::Check(result) => Ok(result.allowed),
            other => Err(unexpected(other)),
        }
    }

    /// Every entry matched by the caller's patterns.
    pub async fn list(&mut self) -> Result<Vec<FileNode>, ClientError> {
        match self.send(Operation::List).await? {
            Response::Listing(listing) => Ok(listing.nodes),
            other => Err(unexpected(other)),
        }
    }

    /// Stream the first lines of a file.
    pub async fn head(self, path: &str, lines: Option<i64>) -> Result<ByteStream, ClientError> {
        self.open_stream(Operation::Head(HeadRequest {
            path: path.to_string(),
            lines,
        }))
        .await
    }

    /// Stream the last lines of a file, then appended data if `follow` is set.
    pub async fn tail(
        self,
        path: &str,
        lines: Option<i64>,
        follow: bool,
    ) -> Result<ByteStream, ClientError> {
        self.open_stream(Operation::Tail(TailRequest {
            path: path.to_string(),
            lines,
            follow,
        }))
        .await
    }

    /// Stream a whole file.
    pub async fn cat(self, path: &str) -> Result<ByteStream, ClientError> {
        self.open_stream(Operation::Cat(PathRequest {
            path: path.to_string(),
        }))
        .await
    }

    async fn open_stream(mut self, operation: Operation) -> Result<ByteStream, ClientError> {
        match self.send(operation).await? {
            Response::Stream => Ok(ByteStream {
                reader: self.reader,
                _writer: self.writer,
            }),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> ClientError {
    match response {
        Response::Error(e) => ClientError::Server {
            code: e.code,
            message: e.message,
        },
        other => ClientError::UnexpectedResponse(format!("{:?}", other)),
    }
}

/// Raw bytes following a [`Response::Stream`] header.
pub struct ByteStream {
    reader: BufReader<OwnedReadHalf>,
    // Held so the server does not see a disconnect while we read.
    _writer: OwnedWriteHalf,
}

impl ByteStream {
    /// Next chunk of data, or `None` once the server closed the stream.
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>, ClientError> {
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        let n = self.reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }

    /// Copy the whole stream to `writer`, flushing after every chunk.
    pub async fn copy_to<W: AsyncWrite + Unpin>(&mut self, writer: &mut W) -> Result<u64, ClientError> {
        let mut copied = 0u64;
        while let Some(chunk) = self.read_chunk().await? {
            writer.write_all(&chunk).await?;
            writer.flush().await?;
            copied += chunk.len() as u64;
        }
        Ok(copied)
    }

    /// Read until the server closes the stream.
    pub async fn read_to_end(mut self) -> Result<Vec<u8>, ClientError> {
        let mut data = Vec::new();
        self.reader.read_to_end(&mut data).await?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{CheckResult, ErrorMessage};
    use tokio::net::TcpListener;

    /// Accept one connection, check each request and answer with the given responses.
    async fn fake_server(responses: Vec<(Operation, Response, Option<&'static [u8]>)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            for (expected, response, body) in responses {
                let mut line = Vec::new();
                reader.read_until(b'\n', &mut line).await.unwrap();
                let request: Request = decode_line(&line).unwrap();
                assert_eq!(request.credentials.username, "alice");
                assert_eq!(request.operation, expected);
                write_half.write_all(&encode_line(&response).unwrap()).await.unwrap();
                if let Some(body) = body {
                    write_half.write_all(body).await.unwrap();
                }
            }
        });
        addr
    }

    fn creds() -> Credentials {
        Credentials::new("alice", "secret")
    }

    #[tokio::test]
    async fn test_connect_fails_without_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(Client::connect(addr, creds()).await.is_err());
    }

    #[tokio::test]
    async fn test_check_and_errors() {
        let check = Operation::Check(PathRequest {
            path: "/var/log/app.log".to_string(),
        });
        let addr = fake_server(vec![
            (
                check.clone(),
                Response::Check(CheckResult {
                    path: "/var/log/app.log".to_string(),
                    allowed: true,
                }),
                None,
            ),
            (
                Operation::Me,
                Response::Error(ErrorMessage {
                    code: ErrorCode::Unauthorized,
                    message: "invalid credentials".to_string(),
                }),
                None,
            ),
            (Operation::List, Response::Stream, None),
        ])
        .await;

        let mut client = Client::connect(addr, creds()).await.unwrap();
        assert!(client.check("/var/log/app.log").await.unwrap());
        assert!(matches!(
            client.me().await,
            Err(ClientError::Server {
                code: ErrorCode::Unauthorized,
                ..
            })
        ));
        assert!(matches!(
            client.list().await,
            Err(ClientError::UnexpectedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_body() {
        let head = Operation::Head(HeadRequest {
            path: "/var/log/app.log".to_string(),
            lines: Some(2),
        });
        let addr = fake_server(vec![(head, Response::Stream, Some(&b"one\ntwo\n"[..]))]).await;

        let client = Client::connect(addr, creds()).await.unwrap();
        let stream = client.head("/var/log/app.log", Some(2)).await.unwrap();
        assert_eq!(stream.read_to_end().await.unwrap(), b"one\ntwo\n");
    }
}
