// SPDX-License-Identifier: MIT

//! Process supervisor: owns one descriptor's full lifecycle as a single
//! cooperative task — fetch → unpack → parse → spawn → run →
//! restart/terminate.
//!
//! The task and its [`SupervisorHandle`] share state through a
//! `watch::Sender<ProcessState>` (cheap, lock-free reads of the current
//! state) plus a small `parking_lot::Mutex` for the fields that change
//! independently of state (`last_error`, `pid`, `updated_at_ms`).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use outpost_core::{Clock, Manifest, ProcessSnapshot, ProcessSpec, ProcessState, MANIFEST_FILENAME};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveFetcher, FetchError};
use crate::backoff::{BackoffConfig, RestartCounter};
use crate::log_hub::{Channel, LogHub};

#[derive(Debug, thiserror::Error)]
enum LifecycleError {
    #[error("{0}")]
    Fetch(#[from] FetchError),
    #[error("{0}")]
    Parse(#[from] outpost_core::ManifestParseError),
}

/// Tunables that apply to every supervisor spawned by this agent.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub backoff: BackoffConfig,
    pub termination_grace: Duration,
    pub scratch_root: PathBuf,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            termination_grace: Duration::from_secs(10),
            scratch_root: std::env::temp_dir().join("outpost"),
        }
    }
}

struct Mutable {
    last_error: Option<String>,
    pid: Option<u32>,
    updated_at_ms: u64,
}

struct Shared<C> {
    spec: ProcessSpec,
    clock: C,
    created_at_ms: u64,
    mutable: Mutex<Mutable>,
    state_tx: watch::Sender<ProcessState>,
    log_hub: LogHub,
    cancel: CancellationToken,
}

impl<C: Clock> Shared<C> {
    fn touch(&self) -> u64 {
        let ts = self.clock.epoch_ms();
        self.mutable.lock().updated_at_ms = ts;
        ts
    }

    fn set_state(&self, state: ProcessState) {
        self.touch();
        let _ = self.state_tx.send(state);
        tracing::debug!(slug = %self.spec.slug, %state, "supervisor state transition");
    }

    fn fail(&self, detail: impl Into<String>) {
        let detail = detail.into();
        self.touch();
        self.mutable.lock().last_error = Some(detail.clone());
        let _ = self.state_tx.send(ProcessState::Failed);
        tracing::warn!(slug = %self.spec.slug, error = %detail, "supervisor entered failed state");
    }

    fn set_pid(&self, pid: Option<u32>) {
        self.mutable.lock().pid = pid;
    }

    fn current_state(&self) -> ProcessState {
        *self.state_tx.borrow()
    }

    fn snapshot(&self) -> ProcessSnapshot {
        let mutable = self.mutable.lock();
        ProcessSnapshot {
            spec: self.spec.clone(),
            state: self.current_state(),
            last_error: mutable.last_error.clone(),
            pid: mutable.pid,
            created_at_ms: self.created_at_ms,
            updated_at_ms: mutable.updated_at_ms,
        }
    }
}

/// Handle returned to the registry: read access to the descriptor's
/// current snapshot, the log hub, and the means to request deletion.
pub struct SupervisorHandle<C: Clock> {
    shared: Arc<Shared<C>>,
    state_rx: watch::Receiver<ProcessState>,
}

impl<C: Clock> SupervisorHandle<C> {
    pub fn snapshot(&self) -> ProcessSnapshot {
        self.shared.snapshot()
    }

    pub fn log_hub(&self) -> &LogHub {
        &self.shared.log_hub
    }

    /// Signal deletion and wait until the supervisor has acknowledged it
    /// (entered `terminating` or `deleted`) — not necessarily until the
    /// child has actually exited.
    pub async fn request_delete(&self) {
        if self.shared.current_state().is_terminal() {
            return;
        }
        self.shared.cancel.cancel();

        let mut rx = self.state_rx.clone();
        loop {
            let state = *rx.borrow();
            if state.is_terminal() || state == ProcessState::Terminating {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Wait until the supervisor has fully finished (`deleted`). Several
    /// callers may await this concurrently — the registry's reaper and,
    /// during agent shutdown, the binary's drain loop.
    pub async fn await_deleted(&self) {
        let mut rx = self.state_rx.clone();
        loop {
            if rx.borrow().is_terminal() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Spawn a new supervisor task for `spec` and return its handle. The task
/// starts in `pending` and immediately begins the fetch/unpack/parse
/// pipeline.
pub fn spawn_supervisor<C: Clock>(
    spec: ProcessSpec,
    clock: C,
    fetcher: Arc<dyn ArchiveFetcher>,
    config: SupervisorConfig,
    tail_capacity: usize,
    queue_capacity: usize,
) -> SupervisorHandle<C> {
    let created_at_ms = clock.epoch_ms();
    let (state_tx, state_rx) = watch::channel(ProcessState::Pending);
    let shared = Arc::new(Shared {
        spec,
        clock,
        created_at_ms,
        mutable: Mutex::new(Mutable { last_error: None, pid: None, updated_at_ms: created_at_ms }),
        state_tx,
        log_hub: LogHub::new(tail_capacity, queue_capacity),
        cancel: CancellationToken::new(),
    });

    let task_shared = shared.clone();
    tokio::spawn(async move {
        run(task_shared, fetcher, config).await;
    });

    SupervisorHandle { shared, state_rx }
}

async fn run<C: Clock>(shared: Arc<Shared<C>>, fetcher: Arc<dyn ArchiveFetcher>, config: SupervisorConfig) {
    let scratch_dir = config.scratch_root.join(shared.spec.slug.as_str());

    let manifest = tokio::select! {
        _ = shared.cancel.cancelled() => {
            finish_deleted(&shared, &scratch_dir).await;
            return;
        }
        result = fetch_and_parse(&shared, &fetcher, &scratch_dir) => {
            match result {
                Ok(manifest) => manifest,
                Err(e) => {
                    shared.fail(e.to_string());
                    wait_for_delete_while_failed(&shared, &scratch_dir).await;
                    return;
                }
            }
        }
    };

    let Some(command) = manifest.get(&shared.spec.process_type).map(str::to_owned) else {
        shared.fail(format!(
            "unknown-process-type: manifest has no entry for {:?}",
            shared.spec.process_type
        ));
        wait_for_delete_while_failed(&shared, &scratch_dir).await;
        return;
    };

    let argv = match outpost_core::argv::split(&command) {
        Ok(argv) if !argv.is_empty() => argv,
        Ok(_) => {
            shared.fail("spawn-error: manifest command is empty");
            wait_for_delete_while_failed(&shared, &scratch_dir).await;
            return;
        }
        Err(e) => {
            shared.fail(format!("spawn-error: {e}"));
            wait_for_delete_while_failed(&shared, &scratch_dir).await;
            return;
        }
    };
    let (program, args) = argv.split_at(1);
    let program = &program[0];

    let mut restarts = RestartCounter::default();
    let mut rng = rand::thread_rng();

    loop {
        if shared.cancel.is_cancelled() {
            finish_deleted(&shared, &scratch_dir).await;
            return;
        }

        shared.set_state(ProcessState::Running);
        let mut child = match spawn_child(&shared.spec, &scratch_dir, program, args) {
            Ok(child) => child,
            Err(e) => {
                shared.fail(format!("spawn-error: {e}"));
                if !wait_backoff(&shared, &mut restarts, &config, &mut rng).await {
                    finish_deleted(&shared, &scratch_dir).await;
                }
                continue;
            }
        };
        shared.set_pid(child.id());
        let started_at = shared.clock.now();

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let pump_out =
            stdout.map(|s| tokio::spawn(pump(s, Channel::Stdout, shared.log_hub.clone())));
        let pump_err =
            stderr.map(|s| tokio::spawn(pump(s, Channel::Stderr, shared.log_hub.clone())));

        let outcome = tokio::select! {
            _ = shared.cancel.cancelled() => {
                shared.set_state(ProcessState::Terminating);
                terminate_child(&mut child, config.termination_grace).await;
                await_pumps(pump_out, pump_err).await;
                finish_deleted(&shared, &scratch_dir).await;
                return;
            }
            status = child.wait() => status,
        };

        await_pumps(pump_out, pump_err).await;
        shared.set_pid(None);

        match outcome {
            Ok(status) => {
                tracing::info!(slug = %shared.spec.slug, ?status, "child exited");
            }
            Err(e) => {
                shared.fail(format!("spawn-error: wait failed: {e}"));
            }
        }

        restarts.record_exit(shared.clock.now().saturating_duration_since(started_at), &config.backoff);
        if !wait_backoff(&shared, &mut restarts, &config, &mut rng).await {
            finish_deleted(&shared, &scratch_dir).await;
            return;
        }
    }
}

/// Sleep the next backoff delay, racing it against cancellation. Returns
/// `false` if cancellation won the race (caller should finish deleting).
async fn wait_backoff<C: Clock>(
    shared: &Arc<Shared<C>>,
    restarts: &mut RestartCounter,
    config: &SupervisorConfig,
    rng: &mut impl rand::Rng,
) -> bool {
    shared.set_state(ProcessState::Restarting);
    let delay = restarts.next_delay(&config.backoff, rng);
    tokio::select! {
        _ = shared.cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn fetch_and_parse<C: Clock>(
    shared: &Arc<Shared<C>>,
    fetcher: &Arc<dyn ArchiveFetcher>,
    dir: &Path,
) -> Result<Manifest, LifecycleError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| LifecycleError::Fetch(FetchError::new(
            crate::archive::FetchErrorCategory::Io,
            e.to_string(),
        )))?;

    shared.set_state(ProcessState::Fetching);
    fetcher.fetch(&shared.spec.source_url, dir).await?;

    // archive.rs's fetcher already performs download+extract as one
    // operation; this transition acknowledges the merged C1 step the
    // state table permits ("within C1; merged state is fine").
    shared.set_state(ProcessState::Unpacking);
    shared.set_state(ProcessState::Parsing);

    let manifest_path = dir.join(MANIFEST_FILENAME);
    let text = tokio::fs::read_to_string(&manifest_path).await.map_err(|_| {
        LifecycleError::Parse(outpost_core::ManifestParseError::NotFound(
            manifest_path.display().to_string(),
        ))
    })?;
    let manifest = Manifest::parse(&text)?;
    Ok(manifest)
}

fn spawn_child(
    spec: &ProcessSpec,
    scratch_dir: &Path,
    program: &str,
    args: &[String],
) -> std::io::Result<Child> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(scratch_dir)
        .envs(std::env::vars())
        .envs(spec.env.clone())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    command.spawn()
}

/// Reads lines from a child's pipe and publishes each to the log hub.
/// Splits on LF; a lone trailing CR before the LF is dropped, so CRLF-
/// and LF-terminated output both yield clean lines.
async fn pump(stream: impl AsyncRead + Unpin, channel: Channel, hub: LogHub) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                hub.publish(channel, String::from_utf8_lossy(&buf).into_owned());
            }
            Err(_) => break,
        }
    }
}

async fn await_pumps(pump_out: Option<JoinHandle<()>>, pump_err: Option<JoinHandle<()>>) {
    if let Some(h) = pump_out {
        let _ = h.await;
    }
    if let Some(h) = pump_err {
        let _ = h.await;
    }
}

/// Send SIGTERM, wait up to `grace`, then SIGKILL unconditionally.
async fn terminate_child(child: &mut Child, grace: Duration) {
    if let Some(pid) = child.id() {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }

    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

/// A descriptor in `failed` stays around (and keeps serving its log tail)
/// until an operator deletes it — there's no child process left to
/// supervise, so just wait on the cancellation token the way the main
/// loop does.
async fn wait_for_delete_while_failed<C: Clock>(shared: &Arc<Shared<C>>, scratch_dir: &Path) {
    shared.cancel.cancelled().await;
    finish_deleted(shared, scratch_dir).await;
}

async fn finish_deleted<C: Clock>(shared: &Arc<Shared<C>>, scratch_dir: &Path) {
    shared.log_hub.close();
    shared.set_state(ProcessState::Deleted);
    let _ = tokio::fs::remove_dir_all(scratch_dir).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::FetchErrorCategory;
    use async_trait::async_trait;
    use outpost_core::{FakeClock, Slug};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn spec(process_type: &str) -> ProcessSpec {
        ProcessSpec {
            slug: Slug::derive("app", "node").unwrap(),
            app: "app".to_string(),
            node: "node".to_string(),
            process_type: process_type.to_string(),
            source_url: "http://example.invalid/app.zip".to_string(),
            env: BTreeMap::new(),
        }
    }

    struct ManifestFetcher {
        body: &'static str,
    }

    #[async_trait]
    impl ArchiveFetcher for ManifestFetcher {
        async fn fetch(&self, _url: &str, dest_dir: &Path) -> Result<(), FetchError> {
            tokio::fs::write(dest_dir.join(MANIFEST_FILENAME), self.body).await.unwrap();
            Ok(())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl ArchiveFetcher for FailingFetcher {
        async fn fetch(&self, _url: &str, _dest_dir: &Path) -> Result<(), FetchError> {
            Err(FetchError::new(FetchErrorCategory::HttpStatus, "HTTP 404"))
        }
    }

    struct CountingFetcher {
        body: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ArchiveFetcher for CountingFetcher {
        async fn fetch(&self, _url: &str, dest_dir: &Path) -> Result<(), FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(dest_dir.join(MANIFEST_FILENAME), self.body).await.unwrap();
            Ok(())
        }
    }

    fn test_config(root: &Path) -> SupervisorConfig {
        SupervisorConfig {
            backoff: BackoffConfig {
                base: Duration::from_millis(5),
                cap: Duration::from_millis(20),
                reset_window: Duration::from_secs(60),
            },
            termination_grace: Duration::from_millis(200),
            scratch_root: root.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn fetch_error_is_terminal_failed_without_restart() {
        let scratch = tempfile::tempdir().unwrap();
        let handle = spawn_supervisor(
            spec("web"),
            FakeClock::new(),
            Arc::new(FailingFetcher),
            test_config(scratch.path()),
            64,
            16,
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        let snap = handle.snapshot();
        assert_eq!(snap.state, ProcessState::Failed);
        assert!(snap.last_error.unwrap().contains("404"));
        handle.request_delete().await;
        handle.await_deleted().await;
    }

    #[tokio::test]
    async fn unknown_process_type_is_terminal_with_no_retry() {
        let scratch = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = spawn_supervisor(
            spec("worker"),
            FakeClock::new(),
            Arc::new(CountingFetcher { body: "web: echo hi\n", calls: calls.clone() }),
            test_config(scratch.path()),
            64,
            16,
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        let snap = handle.snapshot();
        assert_eq!(snap.state, ProcessState::Failed);
        assert!(snap.last_error.unwrap().contains("unknown-process-type"));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "must not retry the fetch");
        handle.request_delete().await;
        handle.await_deleted().await;
    }

    #[tokio::test(start_paused = true)]
    async fn child_that_exits_restarts_with_backoff() {
        let scratch = tempfile::tempdir().unwrap();
        let handle = spawn_supervisor(
            spec("web"),
            FakeClock::new(),
            Arc::new(ManifestFetcher { body: "web: /bin/true\n" }),
            test_config(scratch.path()),
            64,
            16,
        );

        // Advance paused time enough for fetch, spawn, exit, and at least
        // one backoff sleep to elapse.
        tokio::time::advance(Duration::from_millis(500)).await;
        let snap = handle.snapshot();
        assert!(
            matches!(snap.state, ProcessState::Restarting | ProcessState::Running),
            "expected the supervisor to still be cycling, got {:?}",
            snap.state
        );
        handle.request_delete().await;
        handle.await_deleted().await;
    }

    #[tokio::test]
    async fn delete_during_run_reaches_deleted_and_removes_scratch_dir() {
        let scratch = tempfile::tempdir().unwrap();
        let handle = spawn_supervisor(
            spec("web"),
            FakeClock::new(),
            Arc::new(ManifestFetcher { body: "web: /bin/sleep 5\n" }),
            test_config(scratch.path()),
            64,
            16,
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.request_delete().await;
        handle.await_deleted().await;

        let snap = handle.snapshot();
        assert_eq!(snap.state, ProcessState::Deleted);
        assert!(!scratch.path().join("app.node").exists());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let scratch = tempfile::tempdir().unwrap();
        let handle = spawn_supervisor(
            spec("web"),
            FakeClock::new(),
            Arc::new(FailingFetcher),
            test_config(scratch.path()),
            64,
            16,
        );

        handle.request_delete().await;
        handle.request_delete().await;
        handle.await_deleted().await;
    }

    #[tokio::test]
    async fn subscriber_sees_child_output() {
        let scratch = tempfile::tempdir().unwrap();
        let handle = spawn_supervisor(
            spec("web"),
            FakeClock::new(),
            Arc::new(ManifestFetcher { body: "web: /bin/echo hello-from-child\n" }),
            test_config(scratch.path()),
            64,
            16,
        );

        let mut subscriber = handle.log_hub().subscribe();
        let event = tokio::time::timeout(Duration::from_secs(2), subscriber.next())
            .await
            .expect("timed out waiting for output")
            .expect("hub closed unexpectedly");
        assert_eq!(
            event,
            crate::log_hub::LogEvent::line(Channel::Stdout, "hello-from-child")
        );

        handle.request_delete().await;
        handle.await_deleted().await;
    }
}
