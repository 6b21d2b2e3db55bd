//! Background tile synthesis with cancellation
//!
//! Requests go to a single worker thread over a channel and completed tiles
//! come back on a second channel, polled once per frame. Every request
//! carries a ticket and a shared cancellation flag: cancelling sets the flag
//! so the worker skips requests it has not started, and forgets the ticket
//! so a result that was already in flight is dropped by `poll` instead of
//! reaching the cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::cache::{synthesize_tile, TileImage};
use super::source::TileSource;
use super::tile::TileCoord;
use crate::error::{StreamError, StreamResult};

/// Result of a tile load operation
#[derive(Debug)]
pub enum TileLoadResult {
    Success(TileImage),
    Failed(TileCoord, StreamError),
}

impl TileLoadResult {
    pub fn coord(&self) -> TileCoord {
        match self {
            TileLoadResult::Success(tile) => tile.coord,
            TileLoadResult::Failed(coord, _) => *coord,
        }
    }
}

/// Tile loading request
#[derive(Debug)]
struct TileRequest {
    coord: TileCoord,
    lod: u8,
    ticket: u64,
    cancelled: Arc<AtomicBool>,
}

/// In-flight request as seen from the streaming thread
#[derive(Debug)]
struct PendingLoad {
    ticket: u64,
    lod: u8,
    cancelled: Arc<AtomicBool>,
}

/// Tile loader backed by one worker thread
pub struct TileLoader {
    result_rx: Receiver<(u64, TileLoadResult)>,
    request_tx: Sender<TileRequest>,
    pending: HashMap<TileCoord, PendingLoad>,
    next_ticket: u64,
    _worker_handle: Option<JoinHandle<()>>,
}

impl TileLoader {
    /// Spawn the worker; it crops `tile_size` tiles out of `source`
    pub fn new(source: Arc<dyn TileSource>, tile_size: u32) -> Self {
        let (request_tx, request_rx) = mpsc::channel::<TileRequest>();
        let (result_tx, result_rx) = mpsc::channel::<(u64, TileLoadResult)>();

        let _worker_handle = Some(std::thread::spawn(move || {
            Self::worker_thread(request_rx, result_tx, source, tile_size);
        }));

        Self {
            result_rx,
            request_tx,
            pending: HashMap::new(),
            next_ticket: 0,
            _worker_handle,
        }
    }

    /// Queue `coord` for synthesis at `lod`. A tile already in flight is
    /// not requested twice.
    pub fn request(&mut self, coord: TileCoord, lod: u8) -> StreamResult<()> {
        if self.pending.contains_key(&coord) {
            return Ok(());
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let cancelled = Arc::new(AtomicBool::new(false));

        let request = TileRequest {
            coord,
            lod,
            ticket,
            cancelled: Arc::clone(&cancelled),
        };

        self.request_tx
            .send(request)
            .map_err(|_| StreamError::LoaderDisconnected)?;

        self.pending.insert(
            coord,
            PendingLoad {
                ticket,
                lod,
                cancelled,
            },
        );
        Ok(())
    }

    /// Cancel the in-flight request for `coord`; its result is discarded
    pub fn cancel(&mut self, coord: TileCoord) -> bool {
        match self.pending.remove(&coord) {
            Some(load) => {
                load.cancelled.store(true, Ordering::Release);
                log::debug!("Cancelled tile {:?} (ticket {})", coord, load.ticket);
                true
            }
            None => false,
        }
    }

    /// Next completed load that is still wanted
    pub fn poll(&mut self) -> Option<TileLoadResult> {
        loop {
            let (ticket, result) = match self.result_rx.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            };

            let coord = result.coord();
            match self.pending.get(&coord) {
                Some(load) if load.ticket == ticket => {
                    self.pending.remove(&coord);
                    return Some(result);
                }
                _ => {
                    log::debug!("Discarded stale tile {:?} (ticket {})", coord, ticket);
                }
            }
        }
    }

    /// Check if a tile is currently being loaded
    pub fn is_loading(&self, coord: &TileCoord) -> bool {
        self.pending.contains_key(coord)
    }

    /// LOD an in-flight tile was requested at
    pub fn pending_lod(&self, coord: &TileCoord) -> Option<u8> {
        self.pending.get(coord).map(|load| load.lod)
    }

    /// Get number of pending requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Cancel every pending request
    pub fn clear_pending(&mut self) {
        for (_, load) in self.pending.drain() {
            load.cancelled.store(true, Ordering::Release);
        }
    }

    fn worker_thread(
        request_rx: Receiver<TileRequest>,
        result_tx: Sender<(u64, TileLoadResult)>,
        source: Arc<dyn TileSource>,
        tile_size: u32,
    ) {
        while let Ok(request) = request_rx.recv() {
            if request.cancelled.load(Ordering::Acquire) {
                continue;
            }

            let result = match synthesize_tile(source.as_ref(), request.coord, tile_size, request.lod) {
                Ok(tile) => TileLoadResult::Success(tile),
                Err(e) => TileLoadResult::Failed(request.coord, e),
            };

            if request.cancelled.load(Ordering::Acquire) {
                continue;
            }

            if result_tx.send((request.ticket, result)).is_err() {
                break; // Receiver dropped, exit thread
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::source::tests::gradient;
    use crate::stream::source::ImageSource;
    use std::time::{Duration, Instant};

    fn loader(width: u32) -> TileLoader {
        let source: Arc<dyn TileSource> = Arc::new(ImageSource::new(gradient(width, width)));
        TileLoader::new(source, 256)
    }

    /// Poll until a result arrives or the timeout expires
    fn wait(loader: &mut TileLoader) -> Option<TileLoadResult> {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if let Some(result) = loader.poll() {
                return Some(result);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[test]
    fn test_request_completes() {
        let mut loader = loader(512);
        let coord = TileCoord::new(1, 0);
        loader.request(coord, 1).unwrap();
        assert!(loader.is_loading(&coord));
        assert_eq!(loader.pending_lod(&coord), Some(1));

        match wait(&mut loader) {
            Some(TileLoadResult::Success(tile)) => {
                assert_eq!(tile.coord, coord);
                assert_eq!(tile.lod, 1);
                assert_eq!(tile.dimensions(), (128, 128));
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(loader.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_request_is_ignored() {
        let mut loader = loader(512);
        let coord = TileCoord::new(0, 0);
        loader.request(coord, 0).unwrap();
        loader.request(coord, 0).unwrap();
        assert_eq!(loader.pending_count(), 1);

        assert!(wait(&mut loader).is_some());
        assert!(loader.poll().is_none());
    }

    #[test]
    fn test_cancelled_result_is_discarded() {
        let mut loader = loader(512);
        let cancelled = TileCoord::new(0, 0);
        let kept = TileCoord::new(1, 1);

        loader.request(cancelled, 0).unwrap();
        assert!(loader.cancel(cancelled));
        assert!(!loader.cancel(cancelled));
        loader.request(kept, 0).unwrap();

        // Single worker, FIFO: once `kept` arrives `cancelled` was handled
        let result = wait(&mut loader).unwrap();
        assert_eq!(result.coord(), kept);
        assert!(loader.poll().is_none());
        assert!(!loader.is_loading(&cancelled));
    }

    #[test]
    fn test_rerequest_after_cancel_uses_new_ticket() {
        let mut loader = loader(512);
        let coord = TileCoord::new(1, 0);

        loader.request(coord, 0).unwrap();
        loader.cancel(coord);
        loader.request(coord, 2).unwrap();

        let result = wait(&mut loader).unwrap();
        match result {
            TileLoadResult::Success(tile) => assert_eq!(tile.lod, 2),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_missing_source_reports_failure() {
        let source: Arc<dyn TileSource> = Arc::new(ImageSource::unresident(512, 512));
        let mut loader = TileLoader::new(source, 256);
        loader.request(TileCoord::new(0, 0), 0).unwrap();

        match wait(&mut loader) {
            Some(TileLoadResult::Failed(_, StreamError::MissingSourceData)) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_clear_pending() {
        let mut loader = loader(1024);
        for column in 0..4 {
            loader.request(TileCoord::new(column, 0), 0).unwrap();
        }
        loader.clear_pending();
        assert_eq!(loader.pending_count(), 0);

        std::thread::sleep(Duration::from_millis(50));
        assert!(loader.poll().is_none());
    }
}
