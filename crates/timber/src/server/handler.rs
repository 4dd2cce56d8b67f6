//! Per-connection request handling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use protocol::{
    decode_line, encode_line, CheckResult, ErrorCode, IdentityInfo, Listing, Operation,
    ProtocolError, Request, Response, MAX_REQUEST_LINE,
};
use tokio::fs::File;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ServerError, ServerState};
use crate::access::{authorize, ResolvedAccess};
use crate::files::{
    self, copy_all, head, open_file, tail, validate_line_count, FileError, FollowStream,
    HeadLines, TailLines,
};

/// What the connection does after a request.
enum Flow {
    Continue,
    Close,
}

/// A streaming operation that passed every check and is ready to send.
enum StreamBody {
    Head(HeadLines<File>),
    Tail {
        file: File,
        lines: TailLines,
        follow: bool,
    },
    Cat(File),
}

/// Serve one client until it disconnects, a stream ends or the server shuts
/// down.
pub async fn handle_connection<S>(stream: S, state: Arc<ServerState>, shutdown: CancellationToken)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    debug!("connection opened");
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = read_request_line(&mut reader) => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read request");
                let response = Response::error(ErrorCode::InvalidRequest, e.to_string());
                let _ = send_response(&mut writer, &response).await;
                break;
            }
        };

        let request: Request = match decode_line(&line) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "malformed request");
                let response = Response::error(ErrorCode::InvalidRequest, e.to_string());
                if send_response(&mut writer, &response).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let operation = request.operation.name();
        let started = Instant::now();
        match handle_request(request, &state, &mut reader, &mut writer, &shutdown).await {
            Ok(flow) => {
                debug!(
                    operation,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request completed"
                );
                if matches!(flow, Flow::Close) {
                    break;
                }
            }
            Err(e) => {
                warn!(operation, error = %e, "request failed");
                break;
            }
        }
    }
    debug!("connection closed");
}

/// Read one request line, bounded by [`MAX_REQUEST_LINE`].
async fn read_request_line<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ServerError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = reader
        .take(MAX_REQUEST_LINE as u64 + 1)
        .read_until(b'\n', &mut line)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if line.len() > MAX_REQUEST_LINE {
        return Err(ProtocolError::LineTooLong {
            size: line.len(),
            max: MAX_REQUEST_LINE,
        }
        .into());
    }
    Ok(Some(line))
}

async fn send_response<W>(writer: &mut W, response: &Response) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_line(response)?).await?;
    writer.flush().await?;
    Ok(())
}

async fn handle_request<R, W>(
    request: Request,
    state: &ServerState,
    reader: &mut R,
    writer: &mut W,
    shutdown: &CancellationToken,
) -> Result<Flow, ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(identity) = state.access().authenticate(&request.credentials) else {
        warn!(user = %request.credentials.username, "authentication failed");
        let response = Response::error(ErrorCode::Unauthorized, "invalid credentials");
        send_response(writer, &response).await?;
        return Ok(Flow::Continue);
    };
    let access = state.access().resolve(identity);
    debug!(
        user = identity.name(),
        operation = request.operation.name(),
        "authenticated"
    );

    let response = match &request.operation {
        Operation::Me => Response::Identity(IdentityInfo {
            name: identity.name().to_string(),
            access: access.into_patterns(),
        }),
        Operation::Check(req) => Response::Check(CheckResult {
            path: req.path.clone(),
            allowed: authorize(&access, &req.path),
        }),
        Operation::List => match tokio::task::spawn_blocking(move || files::list(&access)).await {
            Ok(nodes) => Response::Listing(Listing { nodes }),
            Err(e) => {
                warn!(error = %e, "listing task failed");
                Response::error(ErrorCode::Internal, "listing failed")
            }
        },
        Operation::Head(_) | Operation::Tail(_) | Operation::Cat(_) => {
            let cancel = shutdown.child_token();
            let body = match prepare_stream(&request.operation, &access, &cancel).await {
                Ok(body) => body,
                Err(e) => {
                    debug!(error = %e, "stream rejected");
                    send_response(writer, &error_response(&e)).await?;
                    return Ok(Flow::Continue);
                }
            };

            send_response(writer, &Response::Stream).await?;
            let deadline = match body {
                StreamBody::Tail { follow: true, .. } => state.follow_timeout(),
                _ => None,
            };
            run_stream(body, reader, writer, &cancel, deadline).await;
            return Ok(Flow::Close);
        }
    };

    send_response(writer, &response).await?;
    Ok(Flow::Continue)
}

/// Authorize the path, validate parameters and open the file.
///
/// For tails the initial lines are read here, so a failure still becomes an
/// error response instead of a truncated stream.
async fn prepare_stream(
    operation: &Operation,
    access: &ResolvedAccess,
    cancel: &CancellationToken,
) -> files::Result<StreamBody> {
    let path = operation.path().unwrap_or_default();
    if !authorize(access, path) {
        return Err(FileError::AccessDenied(path.to_string()));
    }

    match operation {
        Operation::Head(req) => {
            let lines = validate_line_count(req.line_count())?;
            let file = open_file(&req.path).await?;
            Ok(StreamBody::Head(head(file, lines)?))
        }
        Operation::Tail(req) => {
            let count = validate_line_count(req.line_count())?;
            let mut file = open_file(&req.path).await?;
            let lines = tail(&mut file, count, cancel).await?;
            Ok(StreamBody::Tail {
                file,
                lines,
                follow: req.follow,
            })
        }
        Operation::Cat(req) => Ok(StreamBody::Cat(open_file(&req.path).await?)),
        Operation::Me | Operation::Check(_) | Operation::List => {
            Err(FileError::AccessDenied(path.to_string()))
        }
    }
}

/// Send a stream body while watching for client disconnect and the optional
/// follow deadline. Either one cancels the body.
async fn run_stream<R, W>(
    body: StreamBody,
    reader: &mut R,
    writer: &mut W,
    cancel: &CancellationToken,
    deadline: Option<Duration>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let follows = matches!(body, StreamBody::Tail { follow: true, .. });
    let send = write_body(body, writer, cancel);
    tokio::pin!(send);

    let result = tokio::select! {
        result = &mut send => result,
        _ = wait_for_disconnect(reader, follows) => {
            debug!("client disconnected, cancelling stream");
            cancel.cancel();
            send.await
        }
        _ = wait_for_deadline(deadline) => {
            info!("follow deadline reached");
            cancel.cancel();
            send.await
        }
    };

    match result {
        Ok(bytes) => debug!(bytes, "stream finished"),
        Err(FileError::Cancelled) => debug!("stream cancelled"),
        Err(e) => warn!(error = %e, "stream failed"),
    }
}

async fn write_body<W>(body: StreamBody, writer: &mut W, cancel: &CancellationToken) -> files::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    match body {
        StreamBody::Head(lines) => lines.copy_to(writer, cancel).await,
        StreamBody::Tail {
            file,
            lines,
            follow,
        } => {
            for line in &lines.lines {
                writer.write_all(line).await?;
            }
            writer.flush().await?;

            let mut sent = lines.byte_len() as u64;
            if follow {
                let mut stream = FollowStream::new(file, lines.end_offset);
                sent += stream.run(writer, cancel).await?;
            }
            Ok(sent)
        }
        StreamBody::Cat(mut file) => copy_all(&mut file, writer, cancel).await,
    }
}

/// Resolves once the peer goes away.
///
/// A read error always counts. End of input only counts when `eof_ends` is
/// set: a client that half-closes after its request is still reading, so a
/// finite body keeps going and a dead peer shows up as a failed write.
async fn wait_for_disconnect<R: AsyncRead + Unpin>(reader: &mut R, eof_ends: bool) {
    let mut buf = [0u8; 256];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) if eof_ends => return,
            Ok(0) => break,
            Ok(_) => continue,
            Err(_) => return,
        }
    }
    std::future::pending::<()>().await
}

async fn wait_for_deadline(deadline: Option<Duration>) {
    match deadline {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending().await,
    }
}

/// Map a file operation error to the response sent to the client.
pub fn error_response(error: &FileError) -> Response {
    let code = match error {
        FileError::AccessDenied(_) | FileError::PermissionDenied(_) => ErrorCode::PermissionDenied,
        FileError::NotFound(_) => ErrorCode::NotFound,
        FileError::InvalidLineCount(_) | FileError::IsADirectory(_) => ErrorCode::InvalidRequest,
        FileError::Cancelled | FileError::Io(_) => ErrorCode::Internal,
    };
    Response::error(code, error.to_string())
}
