//! The collector runtime: one UDP reader feeding a bounded queue drained by
//! a pool of decode workers.
//!
//! The reader never blocks for more than [`READ_TIMEOUT`] so it can observe
//! the shutdown flag, and it never waits on the queue: UDP is lossy, so a
//! full queue drops the datagram instead of backpressuring the socket.
//! Workers share the decoder (and with it the template cache) and hand every
//! event to the sink. A worker survives anything a datagram can throw at it.

use crate::config::CollectorConfig;
use crate::decoder::Decoder;
use crate::error::Result;
use crate::event::EventSink;
use crate::metrics::DecoderMetricsSnapshot;

use log::{debug, error, info};

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Upper bound on how long the reader blocks before re-checking shutdown.
const READ_TIMEOUT: Duration = Duration::from_millis(500);
/// Pause after a socket error before the read loop restarts.
const SOCKET_ERROR_BACKOFF: Duration = Duration::from_secs(1);

type WorkItem = (Vec<u8>, SocketAddr);

pub struct Collector {
    socket: UdpSocket,
    decoder: Arc<Decoder>,
    sink: Arc<dyn EventSink>,
    config: CollectorConfig,
    dropped: AtomicU64,
}

impl Collector {
    /// Validates the configuration, loads the catalogs and binds the
    /// socket. All configuration problems surface here, before any thread
    /// is spawned.
    pub fn new(config: CollectorConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        config.validate()?;
        let decoder = Arc::new(Decoder::new(&config)?);
        let socket = UdpSocket::bind(config.bind_addr()?)?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        Ok(Self {
            socket,
            decoder,
            sink,
            config,
            dropped: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn decoder(&self) -> &Arc<Decoder> {
        &self.decoder
    }

    pub fn metrics(&self) -> DecoderMetricsSnapshot {
        self.decoder.metrics()
    }

    /// Datagrams dropped because the worker queue was full.
    pub fn dropped_datagrams(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Runs the read loop until `shutdown` is set, then drains the queue,
    /// joins the workers and returns. The socket closes when the collector
    /// is dropped.
    pub fn run(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let (tx, rx) = sync_channel::<WorkItem>(self.config.queue_size);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let rx = Arc::clone(&rx);
            let decoder = Arc::clone(&self.decoder);
            let sink = Arc::clone(&self.sink);
            let worker = thread::Builder::new()
                .name(format!("netflow-worker-{id}"))
                .spawn(move || worker_loop(rx, decoder, sink))?;
            workers.push(worker);
        }

        self.read_loop(&tx, &shutdown);

        // Disconnect the channel so workers exit once the queue is drained.
        drop(tx);
        for worker in workers {
            let _ = worker.join();
        }
        info!("netflow collector stopped");
        Ok(())
    }

    fn read_loop(&self, tx: &SyncSender<WorkItem>, shutdown: &AtomicBool) {
        let mut buf = vec![0u8; self.config.buffer_size];
        while !shutdown.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, peer)) => match tx.try_send((buf[..len].to_vec(), peer)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        debug!("worker queue full, dropping {len} byte datagram from {peer}");
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                },
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    error!("socket receive error: {e}, restarting read loop");
                    thread::sleep(SOCKET_ERROR_BACKOFF);
                }
            }
        }
    }
}

fn worker_loop(rx: Arc<Mutex<Receiver<WorkItem>>>, decoder: Arc<Decoder>, sink: Arc<dyn EventSink>) {
    loop {
        // Hold the lock only while receiving so other workers keep draining
        // while this one decodes.
        let item = match rx.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => break,
        };
        let Ok((payload, peer)) = item else {
            break;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(&payload, peer))) {
            Ok(events) => {
                for event in events {
                    sink.emit(event);
                }
            }
            Err(_) => error!("decoder panicked on a datagram from {peer}, continuing"),
        }
    }
}
