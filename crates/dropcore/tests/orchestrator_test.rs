//! End-to-end flows through the orchestrator with a scripted fake worker.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use dropcore::core::validation::YoutubeUrlValidator;
use dropcore::{
    Advance, Category, DeliveryMode, MenuOption, NotificationSink, Orchestrator, OrchestratorConfig, PendingJob,
    SessionEvent, SessionStage, SinkError, UserId,
};

const USER: UserId = UserId(1001);
const SOURCE: &str = "https://youtu.be/abc123";

/// Everything the orchestrator pushed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Sent {
    Text(String),
    File(String),
    Menu(String, Vec<MenuOption>),
}

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<Sent>>,
    reject_files: Vec<&'static str>,
}

impl RecordingSink {
    fn files(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::File(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send_text(&self, _recipient: UserId, text: &str) -> Result<(), SinkError> {
        self.sent.lock().unwrap().push(Sent::Text(text.to_string()));
        Ok(())
    }

    async fn send_file(&self, _recipient: UserId, path: &Path, _caption: &str) -> Result<(), SinkError> {
        assert!(path.exists(), "artifact must still exist while being delivered");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if self.reject_files.contains(&name.as_str()) {
            return Err(SinkError::TooLarge { size: 1, limit: 0 });
        }
        self.sent.lock().unwrap().push(Sent::File(name));
        Ok(())
    }

    async fn present_menu(&self, _recipient: UserId, prompt: &str, options: &[MenuOption]) -> Result<(), SinkError> {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Menu(prompt.to_string(), options.to_vec()));
        Ok(())
    }
}

/// Temp downloads root plus a fake worker script.
///
/// The script finds `--output <dir>/template`, then runs `body` with `$dir` set
/// to the job's working directory.
struct Harness {
    _tmp: TempDir,
    downloads: PathBuf,
    sink: Arc<RecordingSink>,
    orchestrator: Arc<Orchestrator>,
}

impl Harness {
    fn new(body: &str) -> Self {
        Self::with_sink(body, RecordingSink::default(), Duration::from_secs(30))
    }

    fn with_sink(body: &str, sink: RecordingSink, timeout: Duration) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let downloads = tmp.path().join("downloads");
        std::fs::create_dir_all(&downloads).unwrap();

        let script = tmp.path().join("fake-worker.sh");
        let contents = format!(
            r#"out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    --) shift; break ;;
    *) shift ;;
  esac
done
dir=$(dirname "$out")
{body}
"#
        );
        std::fs::write(&script, contents).unwrap();

        // Run through /bin/sh so the script never needs the exec bit.
        let config = OrchestratorConfig {
            worker_program: "/bin/sh".to_string(),
            worker_leading_args: vec![script.to_string_lossy().into_owned()],
            downloads_root: downloads.clone(),
            worker_timeout: timeout,
            ..OrchestratorConfig::default()
        };

        let sink = Arc::new(sink);
        let orchestrator = Arc::new(Orchestrator::new(
            &config,
            Arc::new(YoutubeUrlValidator),
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
        ));

        Self {
            _tmp: tmp,
            downloads,
            sink,
            orchestrator,
        }
    }

    async fn choose(&self, category: Category) {
        self.orchestrator
            .advance(USER, SessionEvent::SourceSubmitted(SOURCE.to_string()))
            .await;
        self.orchestrator
            .advance(USER, SessionEvent::CategoryChosen(category))
            .await;
    }

    fn leftover_dirs(&self) -> usize {
        std::fs::read_dir(&self.downloads).unwrap().count()
    }

    /// Applies the locked part of a direct download and hands back the job.
    async fn begin_download(&self) -> PendingJob {
        match self
            .orchestrator
            .begin(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload))
            .await
        {
            Advance::Job(job) => job,
            Advance::Reply(prompt) => panic!("expected a job, got {:?}", prompt),
        }
    }

    async fn wait_for_stage(&self, stage: SessionStage) {
        for _ in 0..200 {
            if self.orchestrator.stage_of(USER).await == stage {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session never reached {:?}", stage);
    }
}

#[tokio::test]
async fn test_audio_direct_download_delivers_one_file() {
    let h = Harness::new(r#"echo audio > "$dir/abc123.m4a""#);

    let prompt = h
        .orchestrator
        .advance(USER, SessionEvent::SourceSubmitted(SOURCE.to_string()))
        .await;
    assert_eq!(prompt.options.len(), 5);
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::AwaitingCategory);

    let prompt = h
        .orchestrator
        .advance(USER, SessionEvent::CategoryChosen(Category::Audio))
        .await;
    assert_eq!(
        prompt.options,
        vec![
            MenuOption::Mode(DeliveryMode::DirectDownload),
            MenuOption::Mode(DeliveryMode::ObtainCommand),
            MenuOption::Back
        ]
    );

    let prompt = h
        .orchestrator
        .advance(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload))
        .await;

    assert_eq!(h.sink.files(), vec!["abc123.m4a"]);
    assert!(prompt.text.contains("Sent 1 file"));
    assert!(prompt.options.contains(&MenuOption::Category(Category::Audio)));
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::AwaitingCategory);
    assert_eq!(h.leftover_dirs(), 0);

    let session = h.orchestrator.store().snapshot(USER).await.unwrap();
    assert_eq!(session.source_ref.as_deref(), Some(SOURCE));
    assert!(session.selected_category.is_none());
    assert!(session.active_job.is_none());
}

#[tokio::test]
async fn test_invalid_source_stays_awaiting_source() {
    let h = Harness::new("exit 0");
    let prompt = h
        .orchestrator
        .advance(USER, SessionEvent::SourceSubmitted("not a url".to_string()))
        .await;
    assert!(prompt.text.contains("valid YouTube link"));
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::AwaitingSource);
}

#[tokio::test]
async fn test_video_offers_only_command_and_back() {
    let h = Harness::new("exit 0");
    h.orchestrator
        .advance(USER, SessionEvent::SourceSubmitted(SOURCE.to_string()))
        .await;
    let prompt = h
        .orchestrator
        .advance(USER, SessionEvent::CategoryChosen(Category::Video))
        .await;
    assert_eq!(
        prompt.options,
        vec![MenuOption::Mode(DeliveryMode::ObtainCommand), MenuOption::Back]
    );
}

#[tokio::test]
async fn test_worker_failure_reports_stderr_and_cleans_up() {
    let h = Harness::new(r#"echo partial > "$dir/abc123.part"; echo "network error" >&2; exit 1"#);
    h.choose(Category::Thumbnail).await;

    let prompt = h
        .orchestrator
        .advance(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload))
        .await;

    assert!(prompt.text.contains("network error"));
    assert!(h.sink.files().is_empty());
    assert_eq!(h.leftover_dirs(), 0);
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::AwaitingCategory);
}

#[tokio::test]
async fn test_obtain_command_keeps_stage_and_spawns_nothing() {
    let h = Harness::new(r#"echo should-not-run > "$dir/x.txt""#);
    h.choose(Category::Thumbnail).await;

    let prompt = h
        .orchestrator
        .advance(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::ObtainCommand))
        .await;

    let command = prompt.command.clone().unwrap();
    assert!(command.contains("--write-thumbnail"));
    assert!(command.contains("--skip-download"));
    assert!(command.contains("abc123"));
    assert!(prompt.options.contains(&MenuOption::Back));
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::AwaitingDeliveryMode);
    assert_eq!(h.leftover_dirs(), 0);
}

#[tokio::test]
async fn test_stage_transitions() {
    let h = Harness::new(r#"echo img > "$dir/abc123.webp""#);
    let orch = &h.orchestrator;

    // (event, expected stage afterwards)
    let steps = vec![
        (SessionEvent::CategoryChosen(Category::Audio), SessionStage::AwaitingSource),
        (SessionEvent::QualityChosen("720p".to_string()), SessionStage::AwaitingSource),
        (SessionEvent::BackRequested, SessionStage::AwaitingSource),
        (SessionEvent::SourceSubmitted(SOURCE.to_string()), SessionStage::AwaitingCategory),
        (SessionEvent::QualityChosen("720p".to_string()), SessionStage::AwaitingCategory),
        (
            SessionEvent::DeliveryModeChosen(DeliveryMode::ObtainCommand),
            SessionStage::AwaitingCategory,
        ),
        (SessionEvent::CategoryChosen(Category::Subtitles), SessionStage::AwaitingDeliveryMode),
        (SessionEvent::CategoryChosen(Category::Audio), SessionStage::AwaitingDeliveryMode),
        (SessionEvent::BackRequested, SessionStage::AwaitingCategory),
        (SessionEvent::SourceSubmitted("nope".to_string()), SessionStage::AwaitingCategory),
        (SessionEvent::CategoryChosen(Category::All), SessionStage::AwaitingDeliveryMode),
        (SessionEvent::QualityChosen("720p".to_string()), SessionStage::AwaitingDeliveryMode),
        (SessionEvent::BackRequested, SessionStage::AwaitingCategory),
        (SessionEvent::CategoryChosen(Category::Video), SessionStage::AwaitingDeliveryMode),
        (SessionEvent::QualityChosen("720p".to_string()), SessionStage::AwaitingDeliveryMode),
        (SessionEvent::QualityChosen("999p".to_string()), SessionStage::AwaitingDeliveryMode),
        (
            SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload),
            SessionStage::AwaitingDeliveryMode,
        ),
        (SessionEvent::BackRequested, SessionStage::AwaitingCategory),
        (SessionEvent::CategoryChosen(Category::Thumbnail), SessionStage::AwaitingDeliveryMode),
        (
            SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload),
            SessionStage::AwaitingCategory,
        ),
        (SessionEvent::ResetRequested, SessionStage::AwaitingSource),
    ];

    for (i, (event, expected)) in steps.into_iter().enumerate() {
        orch.advance(USER, event.clone()).await;
        assert_eq!(orch.stage_of(USER).await, expected, "step {} ({:?})", i, event);
    }
    assert_eq!(h.sink.files(), vec!["abc123.webp"]);
}

#[tokio::test]
async fn test_direct_download_passes_through_executing() {
    let h = Harness::new(r#"echo img > "$dir/abc123.webp""#);
    h.choose(Category::Thumbnail).await;
    h.orchestrator
        .advance(USER, SessionEvent::QualityChosen("720p".to_string()))
        .await;
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::AwaitingDeliveryMode);

    let job = h.begin_download().await;
    assert_eq!(job.user_id(), USER);
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::Executing);
    let session = h.orchestrator.store().snapshot(USER).await.unwrap();
    assert_eq!(session.active_job.map(|active| active.id), Some(job.id()));

    let prompt = h.orchestrator.run(job).await;
    assert!(prompt.text.contains("Sent 1 file"));
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::AwaitingCategory);
    assert_eq!(h.leftover_dirs(), 0);
}

#[tokio::test]
async fn test_event_without_session_asks_to_start_again() {
    let h = Harness::new("exit 0");
    let prompt = h
        .orchestrator
        .advance(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload))
        .await;
    assert!(prompt.text.contains("start again"));
    assert!(!prompt.has_menu());
}

#[tokio::test]
async fn test_stale_choice_re_emits_current_menu() {
    let h = Harness::new("exit 0");
    h.choose(Category::Audio).await;
    let prompt = h
        .orchestrator
        .advance(USER, SessionEvent::CategoryChosen(Category::Video))
        .await;
    assert!(prompt.text.contains("not available right now"));
    assert!(prompt.options.contains(&MenuOption::Mode(DeliveryMode::DirectDownload)));
    let session = h.orchestrator.store().snapshot(USER).await.unwrap();
    assert_eq!(session.selected_category, Some(Category::Audio));
}

#[tokio::test]
async fn test_second_job_while_executing_is_busy() {
    let h = Harness::new(r#"sleep 1; echo img > "$dir/abc123.webp""#);
    h.choose(Category::Thumbnail).await;

    let orch = Arc::clone(&h.orchestrator);
    let first = tokio::spawn(async move {
        orch.advance(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload))
            .await
    });
    h.wait_for_stage(SessionStage::Executing).await;

    let busy = h
        .orchestrator
        .advance(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload))
        .await;
    assert!(busy.text.contains("Busy"));
    let busy_category = h
        .orchestrator
        .advance(USER, SessionEvent::CategoryChosen(Category::Audio))
        .await;
    assert!(busy_category.text.contains("Busy"));
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::Executing);

    let done = first.await.unwrap();
    assert!(done.text.contains("Sent 1 file"));
    assert_eq!(h.sink.files(), vec!["abc123.webp"]);
    assert_eq!(h.leftover_dirs(), 0);
}

#[tokio::test]
async fn test_events_after_begin_see_the_running_job() {
    let h = Harness::new(r#"echo img > "$dir/abc123.webp""#);
    h.choose(Category::Thumbnail).await;

    // The download is registered before anything runs, so a later tap cannot overtake it.
    let job = h.begin_download().await;
    let back = h.orchestrator.advance(USER, SessionEvent::BackRequested).await;
    assert!(back.text.contains("Busy"));
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::Executing);

    let orch = Arc::clone(&h.orchestrator);
    let prompt = tokio::spawn(async move { orch.run(job).await }).await.unwrap();
    assert!(prompt.text.contains("Sent 1 file"));
    assert_eq!(h.sink.files(), vec!["abc123.webp"]);
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::AwaitingCategory);
}

#[tokio::test]
async fn test_dropped_download_releases_session() {
    let h = Harness::new("exec sleep 30");
    h.choose(Category::Audio).await;

    let started = std::time::Instant::now();
    let abandoned = tokio::time::timeout(
        Duration::from_millis(300),
        h.orchestrator
            .advance(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload)),
    )
    .await;
    assert!(abandoned.is_err());

    h.wait_for_stage(SessionStage::AwaitingCategory).await;
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(h.orchestrator.store().snapshot(USER).await.unwrap().active_job.is_none());
    assert_eq!(h.leftover_dirs(), 0);

    let prompt = h
        .orchestrator
        .advance(USER, SessionEvent::CategoryChosen(Category::Thumbnail))
        .await;
    assert!(!prompt.text.contains("Busy"));
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::AwaitingDeliveryMode);
}

#[tokio::test]
async fn test_dropped_pending_job_releases_session() {
    let h = Harness::new("exec sleep 30");
    h.choose(Category::Subtitles).await;

    let job = h.begin_download().await;
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::Executing);
    drop(job);

    h.wait_for_stage(SessionStage::AwaitingCategory).await;
    assert_eq!(h.leftover_dirs(), 0);
}

#[tokio::test]
async fn test_other_users_are_not_blocked() {
    let h = Harness::new(r#"sleep 2; echo img > "$dir/abc123.webp""#);
    h.choose(Category::Thumbnail).await;

    let orch = Arc::clone(&h.orchestrator);
    let first = tokio::spawn(async move {
        orch.advance(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload))
            .await
    });
    h.wait_for_stage(SessionStage::Executing).await;

    let other = UserId(2002);
    let started = std::time::Instant::now();
    let prompt = h
        .orchestrator
        .advance(other, SessionEvent::SourceSubmitted(SOURCE.to_string()))
        .await;
    assert!(prompt.has_menu());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(h.orchestrator.stage_of(other).await, SessionStage::AwaitingCategory);

    first.await.unwrap();
}

#[tokio::test]
async fn test_reset_cancels_running_job() {
    let h = Harness::new(r#"echo part > "$dir/abc123.part"; exec sleep 30"#);
    h.choose(Category::All).await;

    let orch = Arc::clone(&h.orchestrator);
    let first = tokio::spawn(async move {
        orch.advance(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload))
            .await
    });
    h.wait_for_stage(SessionStage::Executing).await;

    let started = std::time::Instant::now();
    h.orchestrator.advance(USER, SessionEvent::ResetRequested).await;
    let prompt = first.await.unwrap();

    assert!(prompt.text.contains("cancelled"));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(h.sink.files().is_empty());
    assert_eq!(h.leftover_dirs(), 0);
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::AwaitingSource);
}

#[tokio::test]
async fn test_worker_timeout_is_a_failure() {
    let h = Harness::with_sink("exec sleep 30", RecordingSink::default(), Duration::from_millis(300));
    h.choose(Category::Subtitles).await;

    let prompt = h
        .orchestrator
        .advance(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload))
        .await;

    assert!(prompt.text.contains("timed out"));
    assert_eq!(h.leftover_dirs(), 0);
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::AwaitingCategory);
}

#[tokio::test]
async fn test_success_without_files_is_anomaly() {
    let h = Harness::new("exit 0");
    h.choose(Category::Subtitles).await;

    let prompt = h
        .orchestrator
        .advance(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload))
        .await;

    assert!(prompt.text.contains("produced no files"));
    assert!(prompt.has_menu());
    assert_eq!(h.orchestrator.stage_of(USER).await, SessionStage::AwaitingCategory);
}

#[tokio::test]
async fn test_rejected_artifact_does_not_stop_the_rest() {
    let sink = RecordingSink {
        reject_files: vec!["abc123.webp"],
        ..Default::default()
    };
    let body = r#"echo a > "$dir/abc123.ar.vtt"; echo b > "$dir/abc123.m4a"; echo c > "$dir/abc123.webp""#;
    let h = Harness::with_sink(body, sink, Duration::from_secs(30));
    h.choose(Category::All).await;

    let prompt = h
        .orchestrator
        .advance(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload))
        .await;

    assert_eq!(h.sink.files(), vec!["abc123.ar.vtt", "abc123.m4a"]);
    assert!(prompt.text.contains("abc123.webp"));
    assert_eq!(h.leftover_dirs(), 0);
}

#[tokio::test]
async fn test_progress_texts_are_sent() {
    let h = Harness::new(r#"echo img > "$dir/abc123.jpg""#);
    h.choose(Category::Thumbnail).await;
    h.orchestrator
        .advance(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload))
        .await;
    assert_eq!(
        h.sink.texts(),
        vec![
            "Processing your request...".to_string(),
            "Download successful. Sending files...".to_string()
        ]
    );
}

#[tokio::test]
async fn test_shutdown_cancels_jobs() {
    let h = Harness::new("exec sleep 30");
    h.choose(Category::Audio).await;

    let orch = Arc::clone(&h.orchestrator);
    let first = tokio::spawn(async move {
        orch.advance(USER, SessionEvent::DeliveryModeChosen(DeliveryMode::DirectDownload))
            .await
    });
    h.wait_for_stage(SessionStage::Executing).await;

    h.orchestrator.shutdown().await;
    let prompt = first.await.unwrap();
    assert!(prompt.text.contains("cancelled"));
    assert_eq!(h.leftover_dirs(), 0);
}
