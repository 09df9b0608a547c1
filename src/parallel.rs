//! Parallel processing strategies for dump scanning.
//!
//! - Batch-parallel (std::thread on batches of pages)
//! - Channel-pipeline (producer-consumer with mpsc channels)
//!
//! Both write records in input order, same as the sequential run.

use std::collections::BTreeMap;
use std::io::{BufRead, BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, warn};

use crate::dump::{
    scan_pages, update_stats_from_result, write_record, PageScanner, ProcessedPage, Stats,
};
use crate::extract::WarningSink;

/// Configuration for parallel processing
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Number of threads to use
    pub num_threads: usize,
    /// Batch size for batch-parallel processing
    pub batch_size: usize,
    /// Channel buffer size for pipeline processing
    pub channel_buffer: usize,
    /// Number of worker threads for pipeline
    pub num_workers: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        let cpus = thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4);
        Self {
            num_threads: cpus,
            batch_size: 1000,
            channel_buffer: 10000,
            num_workers: cpus.saturating_sub(1).max(1),
        }
    }
}

/// Write one processed page, returning true once `limit` records are out.
fn write_result<W: Write>(
    result: ProcessedPage,
    stats: &mut Stats,
    writer: &mut W,
    limit: Option<usize>,
) -> std::io::Result<bool> {
    update_stats_from_result(stats, &result);

    if let Some(record) = &result.record {
        write_record(writer, record)?;
        stats.records_written += 1;
    }
    Ok(limit.is_some_and(|l| stats.records_written >= l))
}

/// Strategy 1: Batch-Parallel Processing using std::thread
/// Collects pages into batches, then processes each batch using a thread pool
pub fn process_batch_parallel<S, W>(
    reader: impl BufRead,
    writer: &mut BufWriter<W>,
    scanner: Arc<PageScanner<S>>,
    config: &ParallelConfig,
    page_limit: Option<usize>,
) -> std::io::Result<Stats>
where
    S: WarningSink + Send + Sync + 'static,
    W: Write,
{
    let start_time = Instant::now();
    let mut stats = Stats::default();
    let mut batch: Vec<String> = Vec::with_capacity(config.batch_size);
    let mut page_id: usize = 0;
    let mut write_error = None;

    scan_pages(reader, |page_xml| {
        batch.push(page_xml);
        page_id += 1;
        let hit_page_limit = page_limit.is_some_and(|l| page_id >= l);

        if batch.len() >= config.batch_size || hit_page_limit {
            let base_id = page_id - batch.len();
            let results = process_batch_threaded(&batch, base_id, &scanner, config.num_threads);
            batch.clear();

            for result in results {
                if let Err(e) = write_result(result, &mut stats, &mut *writer, None) {
                    write_error = Some(e);
                    return false;
                }
            }
        }
        !hit_page_limit
    })?;

    if let Some(e) = write_error {
        return Err(e);
    }

    // Process remaining batch
    if !batch.is_empty() {
        let base_id = page_id - batch.len();
        for result in process_batch_threaded(&batch, base_id, &scanner, config.num_threads) {
            write_result(result, &mut stats, writer, None)?;
        }
    }

    writer.flush()?;
    stats.elapsed = start_time.elapsed();
    Ok(stats)
}

/// Process a batch of pages using multiple threads
fn process_batch_threaded<S>(
    batch: &[String],
    base_id: usize,
    scanner: &Arc<PageScanner<S>>,
    num_threads: usize,
) -> Vec<ProcessedPage>
where
    S: WarningSink + Send + Sync + 'static,
{
    if batch.is_empty() {
        return vec![];
    }

    let num_threads = num_threads.min(batch.len()).max(1);
    let chunk_size = batch.len().div_ceil(num_threads);

    let chunks: Vec<Vec<(usize, String)>> = batch
        .chunks(chunk_size)
        .enumerate()
        .map(|(n, chunk)| {
            chunk
                .iter()
                .enumerate()
                .map(|(i, xml)| (base_id + n * chunk_size + i, xml.clone()))
                .collect()
        })
        .collect();

    let handles: Vec<JoinHandle<Vec<ProcessedPage>>> = chunks
        .into_iter()
        .map(|chunk| {
            let scanner = Arc::clone(scanner);
            thread::spawn(move || {
                chunk
                    .into_iter()
                    .map(|(pid, xml)| scanner.process_page_xml(&xml, pid))
                    .collect()
            })
        })
        .collect();

    // Chunks are joined in order, so results stay in page order.
    let mut results = Vec::with_capacity(batch.len());
    for handle in handles {
        match handle.join() {
            Ok(chunk_results) => results.extend(chunk_results),
            Err(_) => warn!("batch worker panicked, its pages are lost"),
        }
    }

    results
}

/// Strategy 2: Channel-Pipeline Processing using std::sync::mpsc
/// Producer thread reads XML, worker threads process pages, writer collects results
/// Results are buffered and sorted by page_id to ensure deterministic output order
pub fn process_channel_pipeline<S, W>(
    reader: impl BufRead + Send + 'static,
    writer: W,
    scanner: Arc<PageScanner<S>>,
    config: &ParallelConfig,
    limit: Option<usize>,
    page_limit: Option<usize>,
) -> std::io::Result<Stats>
where
    S: WarningSink + Send + Sync + 'static,
    W: Write,
{
    let (page_tx, page_rx): (SyncSender<(usize, String)>, Receiver<(usize, String)>) =
        sync_channel(config.channel_buffer);
    let (result_tx, result_rx): (SyncSender<ProcessedPage>, Receiver<ProcessedPage>) =
        sync_channel(config.channel_buffer);

    let stop = Arc::new(AtomicBool::new(false));
    let start_time = Instant::now();

    let reader_stop = Arc::clone(&stop);
    let reader_handle =
        thread::spawn(move || read_pages_to_channel(reader, page_tx, &reader_stop, page_limit));

    let page_rx = Arc::new(Mutex::new(page_rx));
    let worker_handles: Vec<JoinHandle<()>> = (0..config.num_workers)
        .map(|_| {
            let rx = Arc::clone(&page_rx);
            let tx = result_tx.clone();
            let stop = Arc::clone(&stop);
            let scanner = Arc::clone(&scanner);
            thread::spawn(move || process_pages_worker(rx, tx, &scanner, &stop))
        })
        .collect();

    // Only workers hold the page receiver, so the reader unblocks once they exit.
    drop(page_rx);
    // Drop extra sender so channel closes when workers finish
    drop(result_tx);

    let written = write_results_sorted(result_rx, writer, limit, &stop);
    if written.is_err() {
        stop.store(true, Ordering::SeqCst);
    }

    let read = reader_handle.join().unwrap_or_else(|_| {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "page reader thread panicked",
        ))
    });
    for handle in worker_handles {
        handle.join().ok();
    }
    debug!(pages_read = ?read.as_ref().ok(), "channel pipeline finished");

    let mut stats = written?;
    read?;
    stats.elapsed = start_time.elapsed();
    Ok(stats)
}

fn read_pages_to_channel(
    reader: impl BufRead,
    tx: SyncSender<(usize, String)>,
    stop: &AtomicBool,
    page_limit: Option<usize>,
) -> std::io::Result<usize> {
    let mut page_id: usize = 0;

    scan_pages(reader, |page_xml| {
        if stop.load(Ordering::Relaxed) || tx.send((page_id, page_xml)).is_err() {
            return false;
        }
        page_id += 1;
        !page_limit.is_some_and(|l| page_id >= l)
    })?;

    Ok(page_id)
}

fn process_pages_worker<S: WarningSink>(
    rx: Arc<Mutex<Receiver<(usize, String)>>>,
    tx: SyncSender<ProcessedPage>,
    scanner: &PageScanner<S>,
    stop: &AtomicBool,
) {
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let item = {
            let lock = rx.lock().ok();
            lock.and_then(|guard| guard.recv().ok())
        };

        match item {
            Some((page_id, xml)) => {
                let result = scanner.process_page_xml(&xml, page_id);
                if tx.send(result).is_err() {
                    break;
                }
            }
            None => break,
        }
    }
}

/// Write results in deterministic order using a streaming reorder buffer.
///
/// Uses a BTreeMap to buffer out-of-order results while writing in-order results
/// immediately.
fn write_results_sorted<W: Write>(
    rx: Receiver<ProcessedPage>,
    writer: W,
    limit: Option<usize>,
    stop: &AtomicBool,
) -> std::io::Result<Stats> {
    let mut writer = BufWriter::with_capacity(256 * 1024, writer);
    let mut stats = Stats::default();

    let mut pending: BTreeMap<usize, ProcessedPage> = BTreeMap::new();
    let mut next_expected: usize = 0;

    for result in rx {
        pending.insert(result.page_id, result);

        while let Some(ready) = pending.remove(&next_expected) {
            if write_result(ready, &mut stats, &mut writer, limit)? {
                stop.store(true, Ordering::SeqCst);
                writer.flush()?;
                return Ok(stats);
            }
            next_expected += 1;
        }
    }

    // Anything left means a worker dropped a page; write the rest in order.
    if !pending.is_empty() {
        warn!(missing_from = next_expected, buffered = pending.len(), "pipeline ended with gaps");
    }
    for (_, result) in pending {
        if write_result(result, &mut stats, &mut writer, limit)? {
            break;
        }
    }

    writer.flush()?;
    Ok(stats)
}
