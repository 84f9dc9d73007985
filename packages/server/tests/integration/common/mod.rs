use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::SubmissionStatus;
use common::grading::{GradeMetadata, GradeRequest, GradeResponse, GradeResultItem};
use common::retry::RetryPolicy;
use common::storage::filesystem::FilesystemBlobStore;
use common::storage::{BlobStore, BoxReader, StorageError};
use mq::{GradePublisher, MqError};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tempfile::TempDir;

use grading_server::config::{
    AppConfig, DatabaseConfig, GradingConfig, ReaperConfig, StorageConfig,
};
use grading_server::entity::workspace_participant::{self, WorkspaceRole};
use grading_server::entity::{assignment, submission, testcase};
use grading_server::permissions::ParticipantPermissions;
use grading_server::services::assignment::{NewAssignment, TestcaseFile, create_assignment};
use grading_server::services::submission::{NewSubmission, create_submission};
use grading_server::state::AppState;

pub const WORKSPACE: i32 = 1;
pub const OWNER: i32 = 100;
pub const ADMIN: i32 = 101;
pub const ALICE: i32 = 200;
pub const BOB: i32 = 201;
pub const CAROL: i32 = 202;

pub const URL_PREFIX: &str = "http://blobs.test";

/// Grade publisher that records every request and can be told to fail.
#[derive(Default)]
pub struct RecordingPublisher {
    requests: Mutex<Vec<GradeRequest>>,
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
}

impl RecordingPublisher {
    pub fn set_failing(&self, failing: bool) {
        let left = if failing { usize::MAX } else { 0 };
        self.failures_left.store(left, Ordering::SeqCst);
    }

    /// Fail the next `n` publishes, then succeed.
    pub fn fail_times(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<GradeRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GradePublisher for RecordingPublisher {
    async fn publish(&self, request: &GradeRequest) -> Result<(), MqError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(MqError::Internal("broker unavailable".into()));
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

/// Blob store whose writes always fail.
#[derive(Default)]
pub struct BrokenBlobStore {
    pub uploads: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl BlobStore for BrokenBlobStore {
    async fn upload(&self, _reader: BoxReader, _offset: u64, _path: &str) -> Result<(), StorageError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Io(io::Error::other("disk unavailable")))
    }

    async fn read_stream(&self, path: &str) -> Result<BoxReader, StorageError> {
        Err(StorageError::NotFound(path.to_string()))
    }

    async fn exists(&self, _path: &str) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn delete_directory(&self, path: &str) -> Result<(), StorageError> {
        self.deleted.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

/// Filesystem blob store whose writes can be switched off mid-test.
pub struct SwitchableBlobStore {
    inner: FilesystemBlobStore,
    failing: AtomicBool,
}

impl SwitchableBlobStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for SwitchableBlobStore {
    async fn upload(&self, reader: BoxReader, offset: u64, path: &str) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::other("disk unavailable")));
        }
        self.inner.upload(reader, offset, path).await
    }

    async fn read_stream(&self, path: &str) -> Result<BoxReader, StorageError> {
        self.inner.read_stream(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        self.inner.exists(path).await
    }

    async fn delete_directory(&self, path: &str) -> Result<(), StorageError> {
        self.inner.delete_directory(path).await
    }
}

/// A grading service backed by a temporary SQLite database and blob directory.
pub struct TestApp {
    pub state: AppState,
    pub db: DatabaseConnection,
    pub publisher: Arc<RecordingPublisher>,
    blobs: Option<Arc<SwitchableBlobStore>>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(None, |_| {}).await
    }

    /// Spawn with an optional replacement blob store and config tweaks.
    pub async fn spawn_with(
        blob_store: Option<Arc<dyn BlobStore>>,
        configure: impl FnOnce(&mut AppConfig),
    ) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("grader.db").display());

        let mut config = AppConfig {
            database: DatabaseConfig {
                url: db_url,
                max_connections: 5,
                min_connections: 1,
            },
            mq: Default::default(),
            storage: StorageConfig {
                base_path: dir.path().join("blobs"),
                url_prefix: URL_PREFIX.to_string(),
                max_blob_bytes: 1024 * 1024,
            },
            grading: GradingConfig::default(),
            retry: RetryPolicy::new(3, 0, 0),
            reaper: ReaperConfig::default(),
        };
        configure(&mut config);

        let db = grading_server::database::init_db(&config.database)
            .await
            .expect("Failed to initialize test database");
        grading_server::database::ensure_indexes(&db)
            .await
            .expect("Failed to create indexes");

        let (blob_store, blobs): (Arc<dyn BlobStore>, Option<Arc<SwitchableBlobStore>>) = match blob_store {
            Some(store) => (store, None),
            None => {
                let inner = FilesystemBlobStore::new(
                    config.storage.base_path.clone(),
                    config.storage.max_blob_bytes,
                )
                .await
                .expect("Failed to create blob store");
                let switchable = Arc::new(SwitchableBlobStore {
                    inner,
                    failing: AtomicBool::new(false),
                });
                let store: Arc<dyn BlobStore> = switchable.clone();
                (store, Some(switchable))
            }
        };

        let publisher = Arc::new(RecordingPublisher::default());
        let state = AppState {
            db: db.clone(),
            blob_store,
            publisher: publisher.clone(),
            permissions: Arc::new(ParticipantPermissions::new(db.clone())),
            config,
        };

        let app = Self {
            state,
            db,
            publisher,
            blobs,
            _dir: dir,
        };
        app.add_participant(WORKSPACE, OWNER, WorkspaceRole::Owner).await;
        app.add_participant(WORKSPACE, ADMIN, WorkspaceRole::Admin).await;
        for user in [ALICE, BOB, CAROL] {
            app.add_participant(WORKSPACE, user, WorkspaceRole::Member).await;
        }
        app
    }

    /// Make every blob write fail (or succeed again).
    pub fn fail_uploads(&self, failing: bool) {
        self.blobs
            .as_ref()
            .expect("fail_uploads needs the default blob store")
            .set_failing(failing);
    }

    /// Read a blob a grade request points at.
    pub async fn read_url(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let path = url.strip_prefix(URL_PREFIX).unwrap_or(url);
        self.state.blob_store.read(path).await
    }

    pub async fn add_participant(&self, workspace_id: i32, user_id: i32, role: WorkspaceRole) {
        workspace_participant::ActiveModel {
            workspace_id: Set(workspace_id),
            user_id: Set(user_id),
            role: Set(role),
            joined_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await
        .expect("Failed to insert participant");
    }

    /// Create a published assignment with `count` testcases through the service.
    pub async fn create_assignment(&self, max_score: f64, count: usize) -> assignment::Model {
        let new = new_assignment(max_score, count, None);
        let (assignment, _) = create_assignment(&self.state, OWNER, WORKSPACE, new)
            .await
            .expect("Failed to create assignment");
        assignment
    }

    /// Insert an assignment and testcase rows directly, without any blobs.
    pub async fn insert_assignment(
        &self,
        max_score: f64,
        count: usize,
        due_date: Option<DateTime<Utc>>,
    ) -> assignment::Model {
        let assignment = assignment::ActiveModel {
            workspace_id: Set(WORKSPACE),
            name: Set("raw".into()),
            description: Set(String::new()),
            memory_limit: Set(65536),
            time_limit: Set(1000),
            max_score: Set(max_score),
            is_auto_trim_enabled: Set(true),
            publish_date: Set(Utc::now() - Duration::days(1)),
            due_date: Set(due_date),
            is_deleted: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .expect("Failed to insert assignment");

        for position in 1..=count as i32 {
            testcase::ActiveModel {
                assignment_id: Set(assignment.id),
                position: Set(position),
                generation: Set("raw".into()),
                input_file_url: Set(format!("/raw/{position}.in")),
                output_file_url: Set(format!("/raw/{position}.out")),
                is_deleted: Set(false),
                created_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(&self.db)
            .await
            .expect("Failed to insert testcase");
        }

        assignment
    }

    /// Insert an already-graded submission row.
    pub async fn insert_submission(
        &self,
        assignment_id: i32,
        user_id: i32,
        status: SubmissionStatus,
        score: f64,
        submitted_at: DateTime<Utc>,
    ) -> submission::Model {
        submission::ActiveModel {
            assignment_id: Set(assignment_id),
            user_id: Set(user_id),
            language: Set("c".into()),
            file_url: Set(String::new()),
            status: Set(status),
            score: Set(score),
            compilation_log: Set(String::new()),
            error_code: Set(None),
            error_message: Set(None),
            submitted_at: Set(submitted_at),
            graded_at: Set(None),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .expect("Failed to insert submission")
    }

    pub async fn submit(
        &self,
        user_id: i32,
        assignment_id: i32,
        source: &str,
    ) -> grading_server::error::AppResult<submission::Model> {
        let artifact: BoxReader = Box::new(io::Cursor::new(source.as_bytes().to_vec()));
        create_submission(
            &self.state,
            NewSubmission {
                user_id,
                workspace_id: WORKSPACE,
                assignment_id,
                language: "c".into(),
            },
            artifact,
        )
        .await
    }
}

pub fn new_assignment(
    max_score: f64,
    count: usize,
    due_date: Option<DateTime<Utc>>,
) -> NewAssignment {
    NewAssignment {
        name: "Sum of two numbers".into(),
        description: "Read a and b, print a + b.".into(),
        memory_limit: 65536,
        time_limit: 1000,
        max_score,
        is_auto_trim_enabled: true,
        publish_date: Utc::now() - Duration::hours(1),
        due_date,
        detail: None,
        testcases: (1..=count)
            .map(|i| TestcaseFile {
                input: format!("{i} {i}\n").into_bytes(),
                output: format!("{}\n", i * 2).into_bytes(),
            })
            .collect(),
    }
}

/// Build a grade response for `request` with the given pass pattern.
pub fn response_for(request: &GradeRequest, passes: &[bool], compile_output: &str) -> GradeResponse {
    GradeResponse {
        compile_output: compile_output.to_string(),
        status: String::new(),
        results: passes
            .iter()
            .map(|&pass| GradeResultItem {
                hash: if pass { "ok".into() } else { "diff".into() },
                pass,
                time: 12,
                memory: 2048,
            })
            .collect(),
        metadata: GradeMetadata {
            assignment_id: request.metadata.assignment_id,
            submission_id: request.metadata.submission_id,
            testcase_ids: request.metadata.testcase_ids.clone(),
            start_time: request.metadata.start_time,
        },
    }
}
