// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-task multiplexing pump backend.

use crate::backend::{BackendKind, ChildStreams, PumpOptions, RawChunk, StreamBackend};
use async_trait::async_trait;
use runlet_core::StreamSource;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::warn;

/// Both pipes drained from one task.
///
/// Reads race inside `select!`; a quiet interval triggers a liveness
/// check, and once the exit is observed each still-open pipe gets one
/// bounded final drain so a pipe inherited by a grandchild cannot stall
/// the run indefinitely.
pub struct MultiplexedBackend;

#[async_trait]
impl StreamBackend for MultiplexedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Multiplexed
    }

    async fn pump(
        &self,
        child: &mut Child,
        io: ChildStreams,
        tx: mpsc::Sender<RawChunk>,
        opts: PumpOptions,
    ) -> io::Result<()> {
        let ChildStreams {
            mut stdout,
            mut stderr,
        } = io;
        let cap = opts.chunk_size.max(1);
        let mut out_buf = vec![0u8; cap];
        let mut err_buf = vec![0u8; cap];
        let mut out_open = true;
        let mut err_open = true;

        while out_open || err_open {
            tokio::select! {
                result = stdout.read(&mut out_buf), if out_open => {
                    out_open = forward_read(result, &out_buf, StreamSource::Stdout, &tx).await;
                }
                result = stderr.read(&mut err_buf), if err_open => {
                    err_open = forward_read(result, &err_buf, StreamSource::Stderr, &tx).await;
                }
                () = tokio::time::sleep(opts.poll_interval) => {
                    if child.try_wait()?.is_some() {
                        // Exit observed with both pipes quiet for a full
                        // interval: one bounded drain each, then finish.
                        if out_open {
                            final_drain(&mut stdout, &mut out_buf, StreamSource::Stdout, &tx, opts.poll_interval).await;
                            out_open = false;
                        }
                        if err_open {
                            final_drain(&mut stderr, &mut err_buf, StreamSource::Stderr, &tx, opts.poll_interval).await;
                            err_open = false;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Forward one read outcome; returns whether the stream is still open.
async fn forward_read(
    result: io::Result<usize>,
    buf: &[u8],
    source: StreamSource,
    tx: &mpsc::Sender<RawChunk>,
) -> bool {
    match result {
        Ok(0) => {
            let _ = tx.send(RawChunk::Eof { source }).await;
            false
        }
        Ok(n) => {
            tx.send(RawChunk::Data {
                source,
                bytes: buf[..n].to_vec(),
            })
            .await
            .is_ok()
        }
        Err(error) => {
            warn!(%source, %error, "pipe read failed");
            let _ = tx.send(RawChunk::Eof { source }).await;
            false
        }
    }
}

/// Best-effort drain after child exit, bounded per read; always closes
/// the stream with an `Eof`.
async fn final_drain<R>(
    pipe: &mut R,
    buf: &mut [u8],
    source: StreamSource,
    tx: &mpsc::Sender<RawChunk>,
    budget: Duration,
) where
    R: AsyncRead + Unpin,
{
    loop {
        match tokio::time::timeout(budget, pipe.read(buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                if tx
                    .send(RawChunk::Data {
                        source,
                        bytes: buf[..n].to_vec(),
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(Err(error)) => {
                warn!(%source, %error, "pipe read failed during final drain");
                break;
            }
            Err(_) => break,
        }
    }
    let _ = tx.send(RawChunk::Eof { source }).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
