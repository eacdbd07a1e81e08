// SPDX-License-Identifier: MIT OR Apache-2.0
//! Task-per-stream pump backend.

use crate::backend::{BackendKind, ChildStreams, PumpOptions, RawChunk, StreamBackend};
use async_trait::async_trait;
use runlet_core::StreamSource;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::warn;

/// One reader task per pipe, funnelled through an internal channel.
///
/// Each reader pulls bounded chunks until its pipe closes, then signals
/// with an `Eof`. The coordinating loop re-checks child liveness
/// whenever the channel stays quiet for a poll interval, and performs a
/// final drain once the child is gone and both readers have finished.
pub struct TaskPerStreamBackend;

#[async_trait]
impl StreamBackend for TaskPerStreamBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::TaskPerStream
    }

    async fn pump(
        &self,
        child: &mut Child,
        io: ChildStreams,
        tx: mpsc::Sender<RawChunk>,
        opts: PumpOptions,
    ) -> io::Result<()> {
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<RawChunk>(64);
        let mut stdout_task = tokio::spawn(read_pipe(
            io.stdout,
            StreamSource::Stdout,
            chunk_tx.clone(),
            opts.chunk_size,
        ));
        let mut stderr_task = tokio::spawn(read_pipe(
            io.stderr,
            StreamSource::Stderr,
            chunk_tx,
            opts.chunk_size,
        ));

        let mut open_streams = 2u8;
        while open_streams > 0 {
            match tokio::time::timeout(opts.poll_interval, chunk_rx.recv()).await {
                Ok(Some(chunk)) => {
                    if matches!(chunk, RawChunk::Eof { .. }) {
                        open_streams -= 1;
                    }
                    if tx.send(chunk).await.is_err() {
                        // Consumer gone; dropping our receiver stops the
                        // readers on their next send.
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    // Quiet pipes. Once the child has exited and both
                    // readers are done, everything left is already
                    // queued; forward it and stop.
                    if child.try_wait()?.is_some()
                        && stdout_task.is_finished()
                        && stderr_task.is_finished()
                    {
                        while let Ok(chunk) = chunk_rx.try_recv() {
                            if matches!(chunk, RawChunk::Eof { .. }) {
                                open_streams = open_streams.saturating_sub(1);
                            }
                            if tx.send(chunk).await.is_err() {
                                break;
                            }
                        }
                        break;
                    }
                }
            }
        }

        for task in [&mut stdout_task, &mut stderr_task] {
            if tokio::time::timeout(Duration::from_millis(500), &mut *task)
                .await
                .is_err()
            {
                // A reader can wedge on a pipe inherited by a grandchild
                // that outlives the child.
                task.abort();
            }
        }
        Ok(())
    }
}

async fn read_pipe<R>(mut pipe: R, source: StreamSource, tx: mpsc::Sender<RawChunk>, chunk_size: usize)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = RawChunk::Data {
                    source,
                    bytes: buf[..n].to_vec(),
                };
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                warn!(%source, %error, "pipe read failed");
                break;
            }
        }
    }
    let _ = tx.send(RawChunk::Eof { source }).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
