//! Integration tests for provisioning, dispatch, scheduling, and log
//! tailing against in-memory provider fakes.
//!
//! The fakes count resource creations so the tests can assert
//! idempotence (re-running setup creates nothing new) and cleanliness
//! (failed validation never touches a provider).

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use skyrun_core::dispatch::JobDispatcher;
use skyrun_core::infra::{InfrastructureManager, ProvisionOptions};
use skyrun_core::logs::{FetchOptions, LogTailer, TailOptions};
use skyrun_core::packager::CodePackager;
use skyrun_core::provider::{
    Capacity, ComputeProvider, ImageBuilder, LaunchSpec, LogPage, LogQuery, LogStore, ObjectStore,
    TaskDefinitionSpec, TriggerProvider, TriggerRule,
};
use skyrun_core::scheduler::Scheduler;
use skyrun_store::{ConfigStore, MemoryStore};
use skyrun_types::{
    Error, JobRequest, LogEvent, ResourceSpec, Result, ScheduleExpression, TaskRun, TaskStatus,
    TriggerPayload,
};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeObjectStore {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    bucket_creates: AtomicU32,
}

impl FakeObjectStore {
    fn object_count(&self) -> usize {
        self.buckets.lock().unwrap().values().map(BTreeMap::len).sum()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        let mut buckets = self.buckets.lock().unwrap();
        if !buckets.contains_key(bucket) {
            buckets.insert(bucket.to_string(), BTreeMap::new());
            self.bucket_creates.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let mut buckets = self.buckets.lock().unwrap();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::provider(format!("no such bucket '{bucket}'")))?;
        objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let buckets = self.buckets.lock().unwrap();
        Ok(buckets.get(bucket).is_some_and(|objects| objects.contains_key(key)))
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let buckets = self.buckets.lock().unwrap();
        Ok(buckets
            .get(bucket)
            .map(|objects| {
                objects.keys().filter(|k| k.starts_with(prefix)).cloned().collect()
            })
            .unwrap_or_default())
    }

    async fn purge_bucket(&self, bucket: &str) -> Result<()> {
        let mut buckets = self.buckets.lock().unwrap();
        if let Some(objects) = buckets.get_mut(bucket) {
            objects.clear();
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut buckets = self.buckets.lock().unwrap();
        buckets
            .remove(bucket)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("bucket '{bucket}'")))
    }
}

struct FakeTask {
    id: String,
    spec: LaunchSpec,
    status: TaskStatus,
}

#[derive(Default)]
struct FakeCompute {
    clusters: Mutex<BTreeSet<String>>,
    repositories: Mutex<BTreeSet<String>>,
    roles: Mutex<BTreeSet<String>>,
    task_definitions: Mutex<BTreeMap<String, u32>>,
    tasks: Mutex<Vec<FakeTask>>,
    valid_networks: Mutex<Vec<(String, String)>>,
    cluster_creates: AtomicU32,
    repository_creates: AtomicU32,
    role_creates: AtomicU32,
    next_task: AtomicU32,
    fail_submission: AtomicBool,
}

#[async_trait]
impl ComputeProvider for FakeCompute {
    async fn ensure_cluster(&self, name: &str) -> Result<String> {
        if self.clusters.lock().unwrap().insert(name.to_string()) {
            self.cluster_creates.fetch_add(1, Ordering::SeqCst);
        }
        Ok(name.to_string())
    }

    async fn delete_cluster(&self, name: &str) -> Result<()> {
        if self.clusters.lock().unwrap().remove(name) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("cluster '{name}'")))
        }
    }

    async fn ensure_repository(&self, name: &str) -> Result<String> {
        if self.repositories.lock().unwrap().insert(name.to_string()) {
            self.repository_creates.fetch_add(1, Ordering::SeqCst);
        }
        Ok(format!("123456789.dkr.example.com/{name}"))
    }

    async fn delete_repository(&self, name: &str) -> Result<()> {
        if self.repositories.lock().unwrap().remove(name) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("repository '{name}'")))
        }
    }

    async fn ensure_task_role(&self, name: &str) -> Result<String> {
        if self.roles.lock().unwrap().insert(name.to_string()) {
            self.role_creates.fetch_add(1, Ordering::SeqCst);
        }
        Ok(format!("arn:aws:iam::123456789:role/{name}"))
    }

    async fn delete_task_role(&self, name: &str) -> Result<()> {
        if self.roles.lock().unwrap().remove(name) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("role '{name}'")))
        }
    }

    async fn default_network(&self) -> Result<(String, String)> {
        Ok(("vpc-default".to_string(), "subnet-default".to_string()))
    }

    async fn validate_network(&self, vpc_id: &str, subnet_id: &str) -> Result<()> {
        let valid = self.valid_networks.lock().unwrap();
        if valid.iter().any(|(v, s)| v == vpc_id && s == subnet_id) {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "subnet '{subnet_id}' does not belong to vpc '{vpc_id}'"
            )))
        }
    }

    async fn register_task_definition(&self, spec: &TaskDefinitionSpec) -> Result<String> {
        let mut definitions = self.task_definitions.lock().unwrap();
        let revision = definitions.entry(spec.family.clone()).or_insert(0);
        *revision += 1;
        Ok(format!("arn:aws:ecs:task-definition/{}:{}", spec.family, revision))
    }

    async fn deregister_task_family(&self, family: &str) -> Result<()> {
        if self.task_definitions.lock().unwrap().remove(family).is_some() {
            Ok(())
        } else {
            Err(Error::NotFound(format!("task family '{family}'")))
        }
    }

    async fn run_task(&self, spec: &LaunchSpec) -> Result<String> {
        if self.fail_submission.load(Ordering::SeqCst) {
            return Err(Error::provider("no capacity available"));
        }
        let id = format!("task{:04}", self.next_task.fetch_add(1, Ordering::SeqCst));
        self.tasks.lock().unwrap().push(FakeTask {
            id: id.clone(),
            spec: spec.clone(),
            status: TaskStatus::Running,
        });
        Ok(id)
    }

    async fn list_tasks(&self, _cluster: &str) -> Result<Vec<TaskRun>> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .map(|task| TaskRun {
                id: task.id.clone(),
                status: task.status.clone(),
                script: task.spec.command.get(2).cloned(),
                created_at_ms: None,
            })
            .collect())
    }

    async fn stop_task(&self, _cluster: &str, task_id: &str) -> Result<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| Error::NotFound(format!("task '{task_id}'")))?;
        task.status = TaskStatus::Stopped;
        Ok(())
    }
}

#[derive(Default)]
struct FakeTriggers {
    invokers: Mutex<BTreeMap<String, String>>,
    rules: Mutex<BTreeMap<String, (String, String, String)>>,
}

impl FakeTriggers {
    fn insert_foreign_rule(&self, name: &str, schedule: &str, payload: &str) {
        self.rules.lock().unwrap().insert(
            name.to_string(),
            (schedule.to_string(), payload.to_string(), "arn:foreign".to_string()),
        );
    }
}

#[async_trait]
impl TriggerProvider for FakeTriggers {
    async fn ensure_invoker(
        &self,
        name: &str,
        _role_arn: &str,
        _env_vars: &[(String, String)],
    ) -> Result<String> {
        let arn = format!("arn:aws:lambda:function/{name}");
        self.invokers.lock().unwrap().insert(name.to_string(), arn.clone());
        Ok(arn)
    }

    async fn delete_invoker(&self, name: &str) -> Result<()> {
        if self.invokers.lock().unwrap().remove(name).is_some() {
            Ok(())
        } else {
            Err(Error::NotFound(format!("function '{name}'")))
        }
    }

    async fn put_trigger(
        &self,
        name: &str,
        schedule: &ScheduleExpression,
        payload: &str,
        target_arn: &str,
    ) -> Result<String> {
        self.rules.lock().unwrap().insert(
            name.to_string(),
            (schedule.to_string(), payload.to_string(), target_arn.to_string()),
        );
        Ok(format!("arn:aws:events:rule/{name}"))
    }

    async fn trigger_exists(&self, name: &str) -> Result<bool> {
        Ok(self.rules.lock().unwrap().contains_key(name))
    }

    async fn list_triggers(&self, prefix: &str) -> Result<Vec<TriggerRule>> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, (schedule, payload, _))| TriggerRule {
                name: name.clone(),
                arn: format!("arn:aws:events:rule/{name}"),
                schedule: schedule.clone(),
                payload: Some(payload.clone()),
            })
            .collect())
    }

    async fn delete_trigger(&self, name: &str) -> Result<()> {
        if self.rules.lock().unwrap().remove(name).is_some() {
            Ok(())
        } else {
            Err(Error::NotFound(format!("rule '{name}'")))
        }
    }
}

/// Log store that serves pre-scripted pages. `query` with no token
/// starts at page zero; tokens are page indices.
#[derive(Default)]
struct PagedLogs {
    groups: Mutex<BTreeSet<String>>,
    pages: Mutex<Vec<Vec<LogEvent>>>,
}

#[async_trait]
impl LogStore for PagedLogs {
    async fn ensure_group(&self, group: &str) -> Result<()> {
        self.groups.lock().unwrap().insert(group.to_string());
        Ok(())
    }

    async fn delete_group(&self, group: &str) -> Result<()> {
        if self.groups.lock().unwrap().remove(group) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("log group '{group}'")))
        }
    }

    async fn query(&self, query: &LogQuery) -> Result<LogPage> {
        let pages = self.pages.lock().unwrap();
        let index: usize = query
            .next_token
            .as_deref()
            .map_or(0, |token| token.parse().unwrap());
        let events = pages.get(index).cloned().unwrap_or_default();
        let next_token =
            (index + 1 < pages.len()).then(|| (index + 1).to_string());
        Ok(LogPage { events, next_token })
    }
}

/// Log store that serves one pre-scripted batch per poll.
#[derive(Default)]
struct PollingLogs {
    batches: Mutex<VecDeque<Vec<LogEvent>>>,
}

#[async_trait]
impl LogStore for PollingLogs {
    async fn ensure_group(&self, _group: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_group(&self, _group: &str) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _query: &LogQuery) -> Result<LogPage> {
        let events = self.batches.lock().unwrap().pop_front().unwrap_or_default();
        Ok(LogPage { events, next_token: None })
    }
}

#[derive(Default)]
struct FakeImages {
    builds: AtomicU32,
    fail_next: AtomicBool,
}

#[async_trait]
impl ImageBuilder for FakeImages {
    async fn build_and_push(
        &self,
        _repository_uri: &str,
        _region: &str,
        _extra_commands: &[String],
    ) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::provider("docker daemon unreachable"));
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test rig
// ---------------------------------------------------------------------------

struct Rig {
    store: Arc<MemoryStore>,
    objects: Arc<FakeObjectStore>,
    compute: Arc<FakeCompute>,
    triggers: Arc<FakeTriggers>,
    logs: Arc<PagedLogs>,
    images: Arc<FakeImages>,
}

impl Rig {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            objects: Arc::new(FakeObjectStore::default()),
            compute: Arc::new(FakeCompute::default()),
            triggers: Arc::new(FakeTriggers::default()),
            logs: Arc::new(PagedLogs::default()),
            images: Arc::new(FakeImages::default()),
        }
    }

    fn infra(&self) -> InfrastructureManager {
        InfrastructureManager::new(
            self.store.clone(),
            self.objects.clone(),
            self.compute.clone(),
            self.triggers.clone(),
            self.logs.clone(),
            self.images.clone(),
        )
    }

    fn dispatcher(&self) -> JobDispatcher {
        JobDispatcher::new(
            self.store.clone(),
            self.compute.clone(),
            CodePackager::new(self.objects.clone()),
        )
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.store.clone(),
            self.triggers.clone(),
            CodePackager::new(self.objects.clone()),
        )
    }

    async fn provision(&self, environment: &str) {
        self.infra()
            .provision(environment, &ProvisionOptions::default())
            .await
            .expect("provision failed");
    }
}

fn write_script(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let script = dir.path().join("train.py");
    std::fs::write(&script, b"print('training')\n").unwrap();
    script
}

fn request(script: &Path) -> JobRequest {
    JobRequest::new(script, "dev")
}

fn event(stream: &str, id: &str, ts: i64) -> LogEvent {
    LogEvent {
        stream: stream.into(),
        event_id: id.into(),
        timestamp_ms: ts,
        message: format!("{stream}/{id}"),
    }
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn provision_is_idempotent() {
    let rig = Rig::new();
    let first = rig.infra().provision("dev", &ProvisionOptions::default()).await.unwrap();
    assert!(first.initialized);
    assert!(first.bucket.is_some());

    let second = rig.infra().provision("dev", &ProvisionOptions::default()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(rig.objects.bucket_creates.load(Ordering::SeqCst), 1);
    assert_eq!(rig.compute.cluster_creates.load(Ordering::SeqCst), 1);
    assert_eq!(rig.compute.repository_creates.load(Ordering::SeqCst), 1);
    assert_eq!(rig.compute.role_creates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn provision_resumes_after_failed_step() {
    let rig = Rig::new();
    rig.images.fail_next.store(true, Ordering::SeqCst);

    let err = rig.infra().provision("dev", &ProvisionOptions::default()).await.unwrap_err();
    match err {
        Error::Provisioning { step, .. } => {
            assert_eq!(step, skyrun_types::ProvisionStep::Image);
        }
        other => panic!("expected provisioning error, got {other}"),
    }

    // Earlier steps were saved; the environment is not yet usable.
    let partial = rig.store.load_environment("dev").unwrap().unwrap();
    assert!(partial.bucket.is_some());
    assert!(partial.repository_uri.is_some());
    assert!(!partial.initialized);

    // Re-running completes without duplicating what exists.
    let config = rig.infra().provision("dev", &ProvisionOptions::default()).await.unwrap();
    assert!(config.initialized);
    assert_eq!(config.bucket, partial.bucket);
    assert_eq!(rig.objects.bucket_creates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn provision_with_explicit_network_validates_it() {
    let rig = Rig::new();
    rig.compute
        .valid_networks
        .lock()
        .unwrap()
        .push(("vpc-custom".into(), "subnet-custom".into()));

    let opts = ProvisionOptions {
        vpc_id: Some("vpc-custom".into()),
        subnet_id: Some("subnet-custom".into()),
        ..Default::default()
    };
    let config = rig.infra().provision("dev", &opts).await.unwrap();
    assert_eq!(config.subnet_id.as_deref(), Some("subnet-custom"));

    let bad = ProvisionOptions {
        vpc_id: Some("vpc-custom".into()),
        subnet_id: Some("subnet-elsewhere".into()),
        ..Default::default()
    };
    assert!(rig.infra().provision("dev2", &bad).await.is_err());
}

#[tokio::test]
async fn provision_rejects_vpc_without_subnet() {
    let rig = Rig::new();
    let opts = ProvisionOptions { vpc_id: Some("vpc-1".into()), ..Default::default() };
    let err = rig.infra().provision("dev", &opts).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    // Rejected before any provider call.
    assert_eq!(rig.objects.bucket_creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn teardown_returns_everything_to_empty() {
    let rig = Rig::new();
    rig.provision("dev").await;

    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir);
    rig.scheduler().create("nightly", "rate(1 day)", &request(&script)).await.unwrap();

    rig.infra().teardown("dev").await.unwrap();

    assert!(rig.store.list_environments().unwrap().is_empty());
    assert!(rig.objects.buckets.lock().unwrap().is_empty());
    assert!(rig.compute.clusters.lock().unwrap().is_empty());
    assert!(rig.compute.repositories.lock().unwrap().is_empty());
    assert!(rig.compute.roles.lock().unwrap().is_empty());
    assert!(rig.triggers.rules.lock().unwrap().is_empty());
    assert!(rig.triggers.invokers.lock().unwrap().is_empty());
    assert!(rig.logs.groups.lock().unwrap().is_empty());
}

#[tokio::test]
async fn teardown_twice_reports_not_found() {
    let rig = Rig::new();
    rig.provision("dev").await;
    rig.infra().teardown("dev").await.unwrap();
    assert!(matches!(rig.infra().teardown("dev").await, Err(Error::NotFound(_))));
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispatch_on_uninitialized_environment_uploads_nothing() {
    let rig = Rig::new();
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir);

    let err = rig.dispatcher().run(&request(&script)).await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert_eq!(rig.objects.object_count(), 0);
}

#[tokio::test]
async fn dispatch_after_provision_runs_one_task() {
    let rig = Rig::new();
    rig.provision("dev").await;
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir);

    let mut req = request(&script);
    req.method = Some("main".into());
    req.params = Some(serde_json::json!({"epochs": 2}));
    let job_id = rig.dispatcher().run(&req).await.unwrap();
    assert!(job_id.starts_with("job-"));

    // Exactly one new bundle, under the per-script prefix.
    let config = rig.store.load_environment("dev").unwrap().unwrap();
    let bucket = config.bucket.unwrap();
    let keys = rig.objects.list_keys(&bucket, "jobs/dev/train/").await.unwrap();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].ends_with(".zip"));

    // The launch carried the positional contract and sizes.
    let tasks = rig.compute.tasks.lock().unwrap();
    assert_eq!(tasks.len(), 1);
    let spec = &tasks[0].spec;
    assert_eq!(spec.command[0], bucket);
    assert_eq!(spec.command[1], keys[0]);
    assert_eq!(spec.command[2], "train.py");
    assert_eq!(spec.command[3], "main");
    assert_eq!(spec.cpu_units, 256);
    assert_eq!(spec.memory_mb, 512);
    assert_eq!(spec.capacity, Capacity::OnDemand);
}

#[tokio::test]
async fn dispatch_spot_flag_selects_spot_capacity() {
    let rig = Rig::new();
    rig.provision("dev").await;
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir);

    let mut req = request(&script);
    req.use_spot = true;
    rig.dispatcher().run(&req).await.unwrap();
    assert_eq!(rig.compute.tasks.lock().unwrap()[0].spec.capacity, Capacity::Spot);
}

#[tokio::test]
async fn dispatch_log_group_override_reaches_launch() {
    let rig = Rig::new();
    rig.provision("dev").await;
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir);

    let mut req = request(&script);
    req.log_group = Some("/custom/experiments".into());
    rig.dispatcher().run(&req).await.unwrap();

    let tasks = rig.compute.tasks.lock().unwrap();
    assert_eq!(tasks[0].spec.log_group.as_deref(), Some("/custom/experiments"));

    drop(tasks);
    // Without the flag nothing extra is attached.
    rig.dispatcher().run(&request(&script)).await.unwrap();
    assert_eq!(rig.compute.tasks.lock().unwrap()[1].spec.log_group, None);
}

#[tokio::test]
async fn dispatch_invalid_resources_rejected_before_upload() {
    let rig = Rig::new();
    rig.provision("dev").await;
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir);
    let uploaded_before = rig.objects.object_count();

    let mut req = request(&script);
    req.resources = ResourceSpec { vcpus: 0.25, memory_mb: 8192 };
    let err = rig.dispatcher().run(&req).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(rig.objects.object_count(), uploaded_before);
}

#[tokio::test]
async fn dispatch_submission_failure_is_not_retried() {
    let rig = Rig::new();
    rig.provision("dev").await;
    rig.compute.fail_submission.store(true, Ordering::SeqCst);
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir);

    let err = rig.dispatcher().run(&request(&script)).await.unwrap_err();
    assert!(matches!(err, Error::Dispatch(_)));
    assert!(rig.compute.tasks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn stop_task_accepts_job_id() {
    let rig = Rig::new();
    rig.provision("dev").await;
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir);

    let job_id = rig.dispatcher().run(&request(&script)).await.unwrap();
    rig.dispatcher().stop_task("dev", &job_id).await.unwrap();

    let tasks = rig.dispatcher().list_tasks("dev").await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Stopped);
    assert_eq!(tasks[0].script.as_deref(), Some("train.py"));
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn schedule_lifecycle_create_list_delete() {
    let rig = Rig::new();
    rig.provision("dev").await;
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir);

    let job = rig
        .scheduler()
        .create("nightly", "cron(0 3 * * ? *)", &request(&script))
        .await
        .unwrap();
    assert!(job.key.starts_with("scheduled/dev/nightly/"));

    let listed = rig.scheduler().list("dev").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "nightly");
    assert_eq!(listed[0].schedule, ScheduleExpression::parse("cron(0 3 * * ? *)").unwrap());
    assert_eq!(listed[0].key, job.key);

    rig.scheduler().delete("dev", "nightly").await.unwrap();
    assert!(rig.scheduler().list("dev").await.unwrap().is_empty());
    assert!(matches!(
        rig.scheduler().delete("dev", "nightly").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn schedule_malformed_expression_creates_nothing() {
    let rig = Rig::new();
    rig.provision("dev").await;
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir);
    let uploaded_before = rig.objects.object_count();

    let err = rig
        .scheduler()
        .create("bad", "every 5 minutes", &request(&script))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(rig.triggers.rules.lock().unwrap().is_empty());
    assert_eq!(rig.objects.object_count(), uploaded_before);
}

#[tokio::test]
async fn schedule_duplicate_name_is_rejected() {
    let rig = Rig::new();
    rig.provision("dev").await;
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir);

    rig.scheduler().create("nightly", "rate(1 day)", &request(&script)).await.unwrap();
    let uploaded_after_first = rig.objects.object_count();

    let err = rig
        .scheduler()
        .create("nightly", "rate(2 days)", &request(&script))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
    // The collision is detected before a second bundle is uploaded.
    assert_eq!(rig.objects.object_count(), uploaded_after_first);
}

#[tokio::test]
async fn schedule_list_skips_foreign_triggers() {
    let rig = Rig::new();
    rig.provision("dev").await;
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir);

    rig.scheduler().create("nightly", "rate(1 day)", &request(&script)).await.unwrap();
    rig.triggers.insert_foreign_rule(
        "skyrun-dev-imposter",
        "rate(1 hour)",
        "{\"detail-type\":\"Scheduled Event\"}",
    );
    rig.triggers.insert_foreign_rule("unrelated-rule", "rate(1 hour)", "{}");

    let listed = rig.scheduler().list("dev").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "nightly");
}

#[tokio::test]
async fn schedule_payload_honors_contract() {
    let rig = Rig::new();
    rig.provision("dev").await;
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir);

    let mut req = request(&script);
    req.use_spot = true;
    req.resources = ResourceSpec { vcpus: 0.5, memory_mb: 1024 };
    rig.scheduler().create("nightly", "rate(12 hours)", &req).await.unwrap();

    let rules = rig.triggers.rules.lock().unwrap();
    let (schedule, payload, target) = rules.get("skyrun-dev-nightly").unwrap();
    assert_eq!(schedule, "rate(12 hours)");
    assert!(target.contains("skyrun-dev-scheduler"));
    let payload: TriggerPayload = serde_json::from_str(payload).unwrap();
    assert_eq!(payload.version, 1);
    assert_eq!(payload.script, "train.py");
    assert_eq!(payload.memory_mb, 1024);
    assert!(payload.use_spot);
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_drains_pages_and_merges_streams() {
    let rig = Rig::new();
    *rig.logs.pages.lock().unwrap() = vec![
        vec![event("stream-b", "b1", 200), event("stream-a", "a1", 100)],
        vec![event("stream-a", "a2", 300), event("stream-a", "a1", 100)],
        vec![event("stream-a", "a0", 200)],
    ];

    let tailer = LogTailer::new(rig.logs.clone());
    let events = tailer
        .fetch(&FetchOptions { group: "/skyrun/dev".into(), ..Default::default() })
        .await
        .unwrap();

    let order: Vec<_> = events.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(order, vec!["stream-a/a1", "stream-a/a0", "stream-b/b1", "stream-a/a2"]);
    // Timestamps never decrease.
    assert!(events.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
}

#[tokio::test]
async fn fetch_restricts_to_task_streams() {
    let rig = Rig::new();
    *rig.logs.pages.lock().unwrap() = vec![vec![
        event("skyrun/main/task0001", "e1", 100),
        event("skyrun/main/task0002", "e2", 200),
    ]];

    let tailer = LogTailer::new(rig.logs.clone());
    let events = tailer
        .fetch(&FetchOptions {
            group: "/skyrun/dev".into(),
            task_id: Some("task0001".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].stream, "skyrun/main/task0001");
}

#[tokio::test(start_paused = true)]
async fn tail_delivers_every_event_exactly_once_in_order() {
    let base = chrono::Utc::now().timestamp_millis();
    let logs = Arc::new(PollingLogs::default());
    *logs.batches.lock().unwrap() = VecDeque::from(vec![
        vec![event("s", "e1", base + 100), event("s", "e2", base + 200)],
        // Second poll replays the boundary event and adds new ones.
        vec![
            event("s", "e2", base + 200),
            event("s", "e3", base + 200),
            event("s", "e4", base + 300),
        ],
    ]);

    let tailer = LogTailer::new(logs);
    let cancel = CancellationToken::new();
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tailer
                .tail(&TailOptions { group: "/skyrun/dev".into(), ..Default::default() }, cancel, tx)
                .await
        })
    };

    let mut received = Vec::new();
    for _ in 0..4 {
        received.push(rx.recv().await.expect("tail closed early"));
    }
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let ids: Vec<_> = received.iter().map(|e| e.event_id.as_str()).collect();
    assert_eq!(ids, vec!["e1", "e2", "e3", "e4"]);
    assert!(received.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
}

#[tokio::test(start_paused = true)]
async fn tail_stops_when_cancelled() {
    let logs = Arc::new(PollingLogs::default());
    let tailer = LogTailer::new(logs);
    let cancel = CancellationToken::new();
    let (tx, _rx) = tokio::sync::mpsc::channel(1);

    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tailer
                .tail(&TailOptions { group: "g".into(), ..Default::default() }, cancel, tx)
                .await
        })
    };
    cancel.cancel();
    handle.await.unwrap().unwrap();
}
