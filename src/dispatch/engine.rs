//! Bounded-parallel download engine.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::error::DispatchError;
use super::filename::resolve_filename;
use super::task::{DownloadTask, PlannedTask};
use crate::fetch::{BodyMode, FetchError, Fetcher, ResponseBody};

/// Buffer size of the file writer.
const WRITE_BUFFER_BYTES: usize = 8 * 1024;

/// Counts for one [`Dispatcher::run_all_with_report`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Files written.
    pub completed: usize,
    /// Tasks that failed (including panicked tasks).
    pub failed: usize,
    /// Degenerate entries skipped.
    pub skipped: usize,
}

impl DispatchReport {
    /// True when no task failed. Skipped entries count as success.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Default)]
struct DispatchStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl DispatchStats {
    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Runs download tasks concurrently, at most `max_workers` at a time.
///
/// The worker cap is shared by every `run_all` call on the same dispatcher.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    fetcher: Fetcher,
    semaphore: Arc<Semaphore>,
    max_workers: usize,
    timeout: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher. `max_workers` is raised to 1 if zero.
    #[must_use]
    pub fn new(fetcher: Fetcher, max_workers: usize, timeout: Duration) -> Self {
        let max_workers = max_workers.max(1);
        debug!(max_workers, "creating dispatcher");
        Self {
            fetcher,
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            timeout,
        }
    }

    /// The worker cap.
    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Runs every task and returns true iff none failed.
    pub async fn run_all(&self, tasks: Vec<PlannedTask>) -> bool {
        self.run_all_with_report(tasks).await.all_succeeded()
    }

    /// Runs every task and returns per-outcome counts.
    ///
    /// Failures never cancel siblings; every task runs to completion.
    #[instrument(skip(self, tasks), fields(task_count = tasks.len()))]
    pub async fn run_all_with_report(&self, tasks: Vec<PlannedTask>) -> DispatchReport {
        let stats = Arc::new(DispatchStats::default());
        let claimed: Arc<Mutex<HashSet<PathBuf>>> = Arc::new(Mutex::new(HashSet::new()));
        let mut skipped = 0;
        let mut handles = Vec::new();

        for (index, planned) in tasks.into_iter().enumerate() {
            let task = match planned {
                PlannedTask::Download(task) => task,
                PlannedTask::Skip(entry) => {
                    warn!(title_id = %entry.title_id, reason = %entry.reason, "skipping entry");
                    skipped += 1;
                    continue;
                }
            };

            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                error!(label = %task.label, "worker pool closed");
                stats.increment_failed();
                continue;
            };

            let fetcher = self.fetcher.clone();
            let stats = Arc::clone(&stats);
            let claimed = Arc::clone(&claimed);
            let timeout = self.timeout;

            handles.push(tokio::spawn(async move {
                let _permit = permit;

                match download_task(&fetcher, &task, timeout, index, &claimed).await {
                    Ok(path) => {
                        info!(
                            title_id = %task.title_id,
                            label = %task.label,
                            path = %path.display(),
                            "download completed"
                        );
                        stats.increment_completed();
                    }
                    Err(e) => {
                        error!(
                            title_id = %task.title_id,
                            label = %task.label,
                            url = %task.url,
                            error = %e,
                            "download failed"
                        );
                        stats.increment_failed();
                    }
                }
            }));
        }

        debug!(spawned = handles.len(), "waiting for downloads to complete");
        await_workers(handles, &stats).await;

        let report = DispatchReport {
            completed: stats.completed.load(Ordering::SeqCst),
            failed: stats.failed.load(Ordering::SeqCst),
            skipped,
        };
        info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            "dispatch complete"
        );
        report
    }
}

/// Joins every worker; a panicked worker counts as a failure.
async fn await_workers(handles: Vec<JoinHandle<()>>, stats: &DispatchStats) {
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "download task panicked");
            stats.increment_failed();
        }
    }
}

/// Fetches one binary and writes it under `task.dest_dir`.
///
/// The body goes to a hidden `.part` file unique to this task and is renamed
/// into place once complete. On failure only that `.part` file is removed.
async fn download_task(
    fetcher: &Fetcher,
    task: &DownloadTask,
    timeout: Duration,
    index: usize,
    claimed: &Mutex<HashSet<PathBuf>>,
) -> Result<PathBuf, DispatchError> {
    let response = fetcher
        .fetch(&task.url, BodyMode::Streaming, timeout)
        .await
        .into_result()
        .map_err(|(source, attempts)| DispatchError::Fetch {
            label: task.label.clone(),
            attempts,
            source,
        })?;

    let filename = resolve_filename(
        response.content_disposition(),
        response.content_type(),
        &task.fallback,
    );

    tokio::fs::create_dir_all(&task.dest_dir)
        .await
        .map_err(|source| DispatchError::CreateDir {
            path: task.dest_dir.clone(),
            source,
        })?;

    let file_path = task.dest_dir.join(&filename);
    let first_claim = claimed
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(file_path.clone());
    if !first_claim {
        warn!(
            title_id = %task.title_id,
            label = %task.label,
            path = %file_path.display(),
            "another download in this batch uses the same file name; last one written wins"
        );
    }

    let part_path = task.dest_dir.join(format!(".{filename}.{index}.part"));
    let url = response.url().to_string();
    let mut file = File::create(&part_path)
        .await
        .map_err(|e| DispatchError::io(&part_path, e))?;

    let result = stream_to_file(
        &mut file,
        response.into_body(),
        &url,
        &part_path,
        &task.label,
    )
    .await;
    drop(file);

    let result = match result {
        Ok(bytes_written) => tokio::fs::rename(&part_path, &file_path)
            .await
            .map(|()| bytes_written)
            .map_err(|e| DispatchError::io(&file_path, e)),
        Err(e) => Err(e),
    };

    match result {
        Ok(bytes_written) => {
            debug!(path = %file_path.display(), bytes_written, "file written");
            Ok(file_path)
        }
        Err(e) => {
            debug!(path = %part_path.display(), "cleaning up partial file after error");
            let _ = tokio::fs::remove_file(&part_path).await;
            Err(e)
        }
    }
}

async fn stream_to_file(
    file: &mut File,
    body: ResponseBody,
    url: &str,
    file_path: &Path,
    label: &str,
) -> Result<u64, DispatchError> {
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
    let mut bytes_written: u64 = 0;

    match body {
        ResponseBody::Buffered(bytes) => {
            writer
                .write_all(&bytes)
                .await
                .map_err(|e| DispatchError::io(file_path, e))?;
            bytes_written = bytes.len() as u64;
        }
        ResponseBody::Streaming(response) => {
            let mut stream = response.bytes_stream();
            while let Some(chunk_result) = stream.next().await {
                let chunk = chunk_result.map_err(|e| DispatchError::Stream {
                    label: label.to_string(),
                    source: FetchError::from_body(url, e),
                })?;
                writer
                    .write_all(&chunk)
                    .await
                    .map_err(|e| DispatchError::io(file_path, e))?;
                bytes_written += chunk.len() as u64;
            }
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| DispatchError::io(file_path, e))?;

    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    use super::*;
    use crate::config::Endpoints;
    use crate::dispatch::task::{SkipReason, SkippedEntry, cover_tasks};
    use crate::dispatch::FallbackName;
    use crate::fetch::BackoffPolicy;
    use crate::layout::OutputLayout;
    use crate::metadata::CoverDescriptor;
    use crate::test_support::RecordingSleeper;
    use crate::test_support::socket_guard::{
        should_skip_socket_bound_test, start_mock_server_or_skip,
    };

    fn dispatcher(max_workers: usize) -> Dispatcher {
        let fetcher = Fetcher::new(BackoffPolicy::default(), Duration::from_secs(5))
            .unwrap()
            .with_sleeper(Arc::new(RecordingSleeper::default()));
        Dispatcher::new(fetcher, max_workers, Duration::from_secs(5))
    }

    fn cover(id: &str) -> CoverDescriptor {
        CoverDescriptor {
            cover_id: Some(id.to_string()),
            ..CoverDescriptor::default()
        }
    }

    #[tokio::test]
    async fn test_run_all_counts_failures_without_short_circuit() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        for id in ["ok1", "ok2", "ok3"] {
            Mock::given(method("GET"))
                .and(path("/Resources/Lib/Cover.php"))
                .and(query_param("cid", id))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("Content-Type", "image/png")
                        .set_body_bytes(id.as_bytes().to_vec()),
                )
                .mount(&server)
                .await;
        }
        for id in ["bad1", "bad2"] {
            Mock::given(method("GET"))
                .and(path("/Resources/Lib/Cover.php"))
                .and(query_param("cid", id))
                .respond_with(ResponseTemplate::new(404))
                .expect(3)
                .mount(&server)
                .await;
        }

        let layout = OutputLayout::new(temp_dir.path());
        let covers: Vec<_> = ["ok1", "bad1", "ok2", "bad2", "ok3"]
            .into_iter()
            .map(cover)
            .collect();
        let tasks = cover_tasks("T", &covers, &Endpoints::with_base(&server.uri()), &layout);

        let report = dispatcher(2).run_all_with_report(tasks).await;

        assert_eq!(
            report,
            DispatchReport {
                completed: 3,
                failed: 2,
                skipped: 0
            }
        );
        assert!(!report.all_succeeded());
        let covers_dir = layout.covers_dir("T");
        let mut written: Vec<_> = std::fs::read_dir(&covers_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        written.sort();
        assert_eq!(written, vec!["ok1.png", "ok2.png", "ok3.png"]);
        assert_eq!(std::fs::read(covers_dir.join("ok2.png")).unwrap(), b"ok2");
    }

    #[tokio::test]
    async fn test_run_all_uses_content_disposition_name() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/Resources/Lib/Cover.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Disposition", r#"attachment; filename="front.jpg""#)
                    .insert_header("Content-Type", "image/png")
                    .set_body_bytes(vec![1_u8, 2, 3]),
            )
            .mount(&server)
            .await;

        let layout = OutputLayout::new(temp_dir.path());
        let tasks = cover_tasks(
            "ABCDEF01",
            &[cover("c1")],
            &Endpoints::with_base(&server.uri()),
            &layout,
        );

        assert!(dispatcher(4).run_all(tasks).await);
        let written = layout.covers_dir("ABCDEF01").join("front.jpg");
        assert_eq!(std::fs::read(written).unwrap(), vec![1_u8, 2, 3]);
    }

    #[tokio::test]
    async fn test_update_fallback_name_and_nested_directories() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/Resources/Lib/TitleUpdate.php"))
            .and(query_param("tuid", "T1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"patch".to_vec()))
            .mount(&server)
            .await;

        let layout = OutputLayout::new(temp_dir.path());
        let dest_dir = layout.update_dir("555308C5", "10", 3);
        let task = DownloadTask {
            title_id: "555308C5".to_string(),
            label: "update T1".to_string(),
            url: Endpoints::with_base(&server.uri()).update_fetch_url("T1"),
            dest_dir: dest_dir.clone(),
            fallback: FallbackName::Update {
                title_update_id: "T1".to_string(),
            },
        };

        assert!(dispatcher(1).run_all(vec![PlannedTask::Download(task)]).await);
        assert_eq!(
            std::fs::read(dest_dir.join("update_T1.bin")).unwrap(),
            b"patch"
        );
    }

    #[tokio::test]
    async fn test_skipped_entries_count_as_success_without_network() {
        let report = dispatcher(4)
            .run_all_with_report(vec![PlannedTask::Skip(SkippedEntry {
                title_id: "X".to_string(),
                reason: SkipReason::MissingCoverId,
            })])
            .await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.completed, 0);
        assert!(report.all_succeeded());
    }

    #[tokio::test]
    async fn test_empty_task_list_succeeds() {
        assert!(dispatcher(4).run_all(Vec::new()).await);
    }

    #[tokio::test]
    async fn test_create_dir_failure_fails_task() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/Resources/Lib/Cover.php"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"img".to_vec()))
            .mount(&server)
            .await;
        // A regular file where the title directory should go.
        std::fs::write(temp_dir.path().join("BLOCKED"), b"file").unwrap();

        let layout = OutputLayout::new(temp_dir.path());
        let tasks = cover_tasks(
            "BLOCKED",
            &[cover("c1")],
            &Endpoints::with_base(&server.uri()),
            &layout,
        );

        assert!(!dispatcher(4).run_all(tasks).await);
    }

    struct ConcurrencyGauge {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Respond for ConcurrencyGauge {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            self.active.fetch_sub(1, Ordering::SeqCst);
            ResponseTemplate::new(200).set_body_bytes(b"x".to_vec())
        }
    }

    #[tokio::test]
    async fn test_worker_cap_bounds_in_flight_requests() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let peak = Arc::new(AtomicUsize::new(0));
        Mock::given(method("GET"))
            .and(path("/Resources/Lib/Cover.php"))
            .respond_with(ConcurrencyGauge {
                active: Arc::new(AtomicUsize::new(0)),
                peak: Arc::clone(&peak),
            })
            .mount(&server)
            .await;

        let layout = OutputLayout::new(temp_dir.path());
        let covers: Vec<_> = (0..8).map(|i| cover(&format!("c{i}"))).collect();
        let tasks = cover_tasks("T", &covers, &Endpoints::with_base(&server.uri()), &layout);

        assert!(dispatcher(2).run_all(tasks).await);
        assert!(peak.load(Ordering::SeqCst) <= 2, "peak was {peak:?}");
    }

    #[test]
    fn test_zero_workers_is_raised_to_one() {
        assert_eq!(dispatcher(0).max_workers(), 1);
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    /// Canned cover response keyed on the `cid` query value.
    ///
    /// A cid ending in `cut` announces 100 bytes and closes after 3. A cid
    /// starting with `shared` is served as `cover.jpg`.
    fn canned_cover_response(request: &str) -> String {
        let cid = request
            .split_once("cid=")
            .and_then(|(_, rest)| rest.split([' ', '&']).next())
            .unwrap_or("");
        let disposition = if cid.starts_with("shared") {
            "Content-Disposition: attachment; filename=\"cover.jpg\"\r\n"
        } else {
            ""
        };
        let (length, body) = if cid.ends_with("cut") {
            (100, "abc")
        } else {
            (cid.len(), cid)
        };
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\n{disposition}\
             Content-Length: {length}\r\nConnection: close\r\n\r\n{body}"
        )
    }

    /// Plain TCP server answering with [`canned_cover_response`]; wiremock
    /// cannot close a connection mid-body.
    async fn start_cutoff_server_or_skip() -> Option<String> {
        if should_skip_socket_bound_test() {
            return None;
        }
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0_u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let response = canned_cover_response(&String::from_utf8_lossy(&request));
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        Some(format!("http://{addr}"))
    }

    #[tokio::test]
    async fn test_stream_error_removes_partial_file_and_siblings_finish() {
        let Some(base) = start_cutoff_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let layout = OutputLayout::new(temp_dir.path());
        let covers: Vec<_> = ["whole", "cut", "other"].into_iter().map(cover).collect();
        let tasks = cover_tasks("T", &covers, &Endpoints::with_base(&base), &layout);

        let report = dispatcher(3).run_all_with_report(tasks).await;

        assert_eq!(
            report,
            DispatchReport {
                completed: 2,
                failed: 1,
                skipped: 0
            }
        );
        let covers_dir = layout.covers_dir("T");
        assert_eq!(file_names(&covers_dir), vec!["other.png", "whole.png"]);
        assert_eq!(std::fs::read(covers_dir.join("whole.png")).unwrap(), b"whole");
    }

    #[tokio::test]
    async fn test_failed_task_keeps_sibling_file_with_same_name() {
        let Some(base) = start_cutoff_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let layout = OutputLayout::new(temp_dir.path());
        let covers: Vec<_> = ["shared-whole", "shared-cut"]
            .into_iter()
            .map(cover)
            .collect();
        let tasks = cover_tasks("T", &covers, &Endpoints::with_base(&base), &layout);

        let report = dispatcher(2).run_all_with_report(tasks).await;

        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        let covers_dir = layout.covers_dir("T");
        assert_eq!(file_names(&covers_dir), vec!["cover.jpg"]);
        assert_eq!(
            std::fs::read(covers_dir.join("cover.jpg")).unwrap(),
            b"shared-whole"
        );
    }

    #[tokio::test]
    async fn test_panicked_worker_counts_as_failed() {
        let stats = DispatchStats::default();
        let finished: JoinHandle<()> = tokio::spawn(async {});
        let panicked: JoinHandle<()> = tokio::spawn(async {
            panic!("worker blew up");
        });

        await_workers(vec![finished, panicked], &stats).await;

        assert_eq!(stats.failed.load(Ordering::SeqCst), 1);
        assert_eq!(stats.completed.load(Ordering::SeqCst), 0);
    }
}
