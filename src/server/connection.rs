//! Per-connection task
//!
//! One `Connection` drives one device transport. A single `select!` loop
//! reads frames, sends keepalives, checks for idleness and releases delayed
//! outbound frames, so no timer can outlive the connection.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf,
};
use tokio::sync::watch;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use crate::dispatch::{Outbound, SignalDispatcher};
use crate::error::{Error, Result};
use crate::protocol::codec::{FrameBuffer, FrameCodec};
use crate::protocol::frame::{Frame, PayloadType};
use crate::server::config::ServerConfig;
use crate::server::handler::{FrameDirection, N9mHandler};
use crate::session::state::ConnectionState;
use crate::stream::RouteOutcome;

/// Frame waiting for its send time
#[derive(Debug)]
struct Pending {
    due: Instant,
    frame: Frame,
}

/// A single device connection
pub struct Connection<H: N9mHandler, S> {
    state: ConnectionState,
    config: Arc<ServerConfig>,
    dispatcher: Arc<SignalDispatcher<H>>,
    reader: ReadHalf<S>,
    writer: BufWriter<WriteHalf<S>>,
    frames: FrameBuffer,
    codec: FrameCodec,
    write_buf: BytesMut,
    /// Delayed frames ordered by due time
    pending: VecDeque<Pending>,
    /// Server shutdown flag
    stop: Option<watch::Receiver<bool>>,
}

impl<H, S> Connection<H, S>
where
    H: N9mHandler,
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        id: u64,
        stream: S,
        peer_addr: SocketAddr,
        config: Arc<ServerConfig>,
        dispatcher: Arc<SignalDispatcher<H>>,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let codec = FrameCodec::new(config.header_profile.clone());

        Self {
            state: ConnectionState::new(id, peer_addr),
            writer: BufWriter::with_capacity(config.write_buffer_size, writer),
            frames: FrameBuffer::with_capacity(codec.clone(), config.read_buffer_size),
            write_buf: BytesMut::with_capacity(4096),
            pending: VecDeque::new(),
            stop: None,
            codec,
            reader,
            config,
            dispatcher,
        }
    }

    /// Close the connection once `stop` turns true
    pub fn with_shutdown(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Run the connection until the device leaves or an error occurs
    ///
    /// Session cleanup runs on every exit path.
    pub async fn run(&mut self) -> Result<()> {
        if !self
            .dispatcher
            .handler()
            .on_connection(&self.state.context())
            .await
        {
            tracing::info!(
                connection = self.state.id,
                peer = %self.state.peer_addr,
                "Connection rejected by handler"
            );
            self.shutdown().await;
            return Ok(());
        }

        let result = self.serve().await;
        self.shutdown().await;
        result
    }

    async fn serve(&mut self) -> Result<()> {
        let keepalive_period = self.config.keepalive_interval;
        let idle_period = self.config.idle_check_interval;

        let mut keepalive = interval_at(Instant::now() + keepalive_period, keepalive_period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut idle_check = interval_at(Instant::now() + idle_period, idle_period);
        idle_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let next_due = self.pending.front().map(|p| p.due);

            tokio::select! {
                read = self.reader.read_buf(self.frames.buffer_mut()) => {
                    let n = read?;
                    if n == 0 {
                        tracing::debug!(connection = self.state.id, "Device closed connection");
                        return Ok(());
                    }
                    self.state.on_bytes_received(n);

                    while let Some(frame) = self.frames.next_frame()? {
                        self.handle_frame(frame).await?;
                    }
                    self.writer.flush().await?;
                }

                _ = keepalive.tick() => {
                    self.send_keepalive().await?;
                }

                _ = idle_check.tick() => {
                    if self.state.idle_for() > self.config.idle_timeout {
                        tracing::info!(
                            connection = self.state.id,
                            session_id = self.state.session_id().unwrap_or_default(),
                            idle_ms = self.state.idle_for().as_millis() as u64,
                            "Connection idle, closing"
                        );
                        return Ok(());
                    }
                }

                _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    self.send_due().await?;
                }

                _ = stop_requested(&mut self.stop) => {
                    tracing::debug!(
                        connection = self.state.id,
                        session_id = self.state.session_id().unwrap_or_default(),
                        "Server shutting down, closing"
                    );
                    return Ok(());
                }
            }
        }
    }

    /// Handle one decoded frame
    async fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        match frame.payload_type {
            PayloadType::Signal => {
                self.state.stats.signal_frames += 1;
                let dispatcher = Arc::clone(&self.dispatcher);

                match dispatcher.dispatch(&mut self.state, &frame).await {
                    Ok(outbound) => {
                        for out in outbound {
                            self.schedule(out).await?;
                        }
                    }
                    Err(e) => {
                        self.state.protocol_errors += 1;
                        self.state.stats.protocol_errors += 1;
                        tracing::warn!(
                            connection = self.state.id,
                            channel = frame.channel,
                            errors = self.state.protocol_errors,
                            error = %e,
                            "Signal rejected"
                        );

                        let max = self.config.max_protocol_errors;
                        if max > 0 && self.state.protocol_errors > max {
                            return Err(Error::Protocol(e));
                        }
                    }
                }
            }
            PayloadType::Metadata => {
                self.state.stats.metadata_frames += 1;
                let session_id = self.state.session_id().unwrap_or_default();
                self.dispatcher
                    .audit(session_id, FrameDirection::Inbound, &frame);
            }
            PayloadType::Media => {
                self.state.stats.media_frames += 1;
                let Some(session_id) = self.state.session_id() else {
                    self.state.stats.dropped_frames += 1;
                    tracing::debug!(
                        connection = self.state.id,
                        channel = frame.channel,
                        "Media before registration dropped"
                    );
                    return Ok(());
                };

                let outcome = self
                    .dispatcher
                    .demuxer()
                    .route(session_id, frame.channel, frame.payload)
                    .await;
                if outcome != RouteOutcome::Delivered {
                    self.state.stats.dropped_frames += 1;
                }
            }
            PayloadType::Reserved(kind) => {
                self.state.stats.ignored_frames += 1;
                tracing::trace!(connection = self.state.id, payload_type = kind, "Frame ignored");
            }
        }

        Ok(())
    }

    /// Send now or queue for later
    async fn schedule(&mut self, out: Outbound) -> Result<()> {
        if out.delay.is_zero() {
            return self.write_frame(&out.frame).await;
        }

        let due = Instant::now() + out.delay;
        let at = self.pending.partition_point(|p| p.due <= due);
        self.pending.insert(
            at,
            Pending {
                due,
                frame: out.frame,
            },
        );
        Ok(())
    }

    /// Send every delayed frame that is due
    async fn send_due(&mut self) -> Result<()> {
        let now = Instant::now();
        while self.pending.front().is_some_and(|p| p.due <= now) {
            if let Some(pending) = self.pending.pop_front() {
                self.write_frame(&pending.frame).await?;
            }
        }
        self.writer.flush().await?;
        Ok(())
    }

    async fn send_keepalive(&mut self) -> Result<()> {
        let Some(session_id) = self.state.session_id().filter(|_| self.state.is_owner()) else {
            return Ok(());
        };

        let frame = self.dispatcher.keepalive_request(session_id);
        tracing::trace!(connection = self.state.id, "Keepalive sent");

        self.write_frame(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Encode a frame into the write buffer and audit it
    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_buf.clear();
        self.codec.encode_into(frame, &mut self.write_buf)?;
        self.writer.write_all(&self.write_buf).await?;
        self.state.stats.bytes_sent += self.write_buf.len() as u64;

        let session_id = self.state.session_id().unwrap_or_default();
        self.dispatcher
            .audit(session_id, FrameDirection::Outbound, frame);
        Ok(())
    }

    /// Release the session and notify the handler
    async fn shutdown(&mut self) {
        let session_id = self.state.close();
        self.pending.clear();

        if let Some(session_id) = session_id {
            let released = self
                .dispatcher
                .registry()
                .release(&session_id, self.state.id)
                .await;

            if let Some(entry) = released {
                let sinks = self.dispatcher.demuxer().close_session(&entry).await;
                tracing::info!(
                    connection = self.state.id,
                    session_id = %session_id,
                    sinks = sinks,
                    "Session released"
                );
            }
        }

        self.dispatcher
            .handler()
            .on_disconnect(&self.state.context())
            .await;

        if let Err(e) = self.writer.shutdown().await {
            tracing::trace!(connection = self.state.id, error = %e, "Transport shutdown failed");
        }
    }
}

/// Resolves once the server asks connections to stop
///
/// Never resolves without a shutdown flag or after its sender is gone.
async fn stop_requested(stop: &mut Option<watch::Receiver<bool>>) {
    if let Some(stop) = stop {
        if stop.wait_for(|stopped| *stopped).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}
