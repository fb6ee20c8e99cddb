// ABOUTME: Test support utilities.
// ABOUTME: Scripted collaborator fakes and a temp-dir installation fixture.

use async_trait::async_trait;
use nonempty::NonEmpty;
use parking_lot::Mutex;
use pg_upgrader::config::Config;
use pg_upgrader::diagnostics::Diagnostics;
use pg_upgrader::output::{Output, OutputMode};
use pg_upgrader::process::{CommandOutput, CommandSpec, ExecutionError, ProcessError, ProcessRunner};
use pg_upgrader::services::{
    ClusterError, ClusterRole, ClusterRoleDetector, ConfigSystem, ServiceControl, ServiceError,
    ServiceStatus,
};
use pg_upgrader::types::ServiceName;
use pg_upgrader::upgrade::{DirectoryPaths, Host, Orchestrator};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;
use tempfile::TempDir;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter =
            EnvFilter::from_default_env().add_directive("pg_upgrader=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Executables installed for every fake PostgreSQL version.
pub const TOOLS: &[&str] = &["pg_ctl", "initdb", "pg_upgrade", "psql", "pg_isready", "vacuumdb"];

pub const LOCALE_ROW: &str = "en_US.UTF-8|en_US.UTF-8|UTF8\n";

#[allow(dead_code)]
pub fn service(name: &str) -> ServiceName {
    ServiceName::new(name).unwrap()
}

/// A temp dir on a different filesystem than the fixture, when the host has
/// one (`/dev/shm` is tmpfs on Linux); otherwise an ordinary temp dir.
#[allow(dead_code)]
pub fn foreign_tempdir() -> TempDir {
    tempfile::tempdir_in("/dev/shm")
        .or_else(|_| tempfile::tempdir())
        .unwrap()
}

#[allow(dead_code)]
pub fn quiet() -> Output {
    Output::new(OutputMode::Quiet)
}

// =============================================================================
// Filesystem fixture
// =============================================================================

/// A temp-dir installation: two versioned install dirs, shared bin links
/// pointing at the running version, a live data directory and a manifest.
pub struct Fixture {
    pub dir: TempDir,
    pub config: Config,
}

#[allow(dead_code)]
impl Fixture {
    pub fn new() -> Self {
        Self::with_versions(11, 12)
    }

    pub fn with_versions(running: u32, target: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        for major in [running, target] {
            let bin = root.join("install").join(major.to_string()).join("bin");
            fs::create_dir_all(&bin).unwrap();
            for tool in TOOLS {
                fs::write(bin.join(tool), "").unwrap();
            }
        }

        fs::create_dir_all(root.join("bin")).unwrap();
        for tool in TOOLS {
            symlink(
                root.join("install")
                    .join(running.to_string())
                    .join("bin")
                    .join(tool),
                root.join("bin").join(tool),
            )
            .unwrap();
        }

        let data = root.join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("PG_VERSION"), format!("{running}\n")).unwrap();
        fs::write(data.join("base"), "old cluster").unwrap();

        let mut config = Config::default();
        config.paths.data_dir = data;
        config.paths.install_root = root.join("install");
        config.paths.bin_dir = root.join("bin");
        config.paths.manifest = root.join("version-manifest.json");
        config.paths.state_dir = root.join("state");
        config.deploy_page = NonEmpty::new("deploy-page".to_string());
        config.supervisor = NonEmpty::new("sv".to_string());
        config.services.managed = NonEmpty::from((
            service("postgresql"),
            vec![service("nginx"), service("puma"), service("sidekiq")],
        ));
        config.services.keep_running = vec![service("nginx"), service("puma")];
        config.timeouts.start_attempts = 3;
        config.timeouts.start_interval = Duration::from_millis(1);
        config.timeouts.settle_wait = Duration::from_millis(20);

        let fixture = Self { dir, config };
        fixture.write_manifest(&format!("{running}.9"), Some(&format!("{target}.4")));
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config.paths.data_dir.clone()
    }

    /// `<data_dir>.<major>`
    pub fn scratch(&self, major: u32) -> PathBuf {
        self.root().join(format!("data.{major}"))
    }

    pub fn paths(&self) -> DirectoryPaths {
        DirectoryPaths::from_config(&self.config, None)
    }

    pub fn write_manifest(&self, default: &str, new: Option<&str>) {
        let mut json = format!(r#"{{"postgresql": {{"described_version": "{default}"}}"#);
        if let Some(new) = new {
            json.push_str(&format!(r#", "postgresql_new": {{"described_version": "{new}"}}"#));
        }
        json.push('}');
        fs::write(&self.config.paths.manifest, json).unwrap();
    }

    /// Major version stamped into the live data directory.
    pub fn data_major(&self) -> u32 {
        fs::read_to_string(self.data_dir().join("PG_VERSION"))
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    }

    /// Major version the shared `pg_ctl` link points into.
    pub fn linked_major(&self) -> u32 {
        let target = fs::read_link(self.config.paths.bin_dir.join("pg_ctl")).unwrap();
        target
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .unwrap()
            .parse()
            .unwrap()
    }

    /// Pretend an earlier upgrade to `major` happened without keeping the
    /// old data directory.
    pub fn simulate_upgraded_without_backup(&self, major: u32) {
        fs::write(self.data_dir().join("PG_VERSION"), format!("{major}\n")).unwrap();
        pg_upgrader::upgrade::binaries::link_version(&self.paths(), major).unwrap();
    }

    pub fn lock_path(&self) -> PathBuf {
        self.config.paths.state_dir.join("pg-upgrade.lock")
    }
}

// =============================================================================
// Process runner
// =============================================================================

/// Records every command and simulates the PostgreSQL tools on the fixture.
///
/// Scripted responses are keyed by a path suffix matched against the program
/// (`"pg_upgrade"`, `"12/bin/pg_isready"`).
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<CommandSpec>>,
    responses: Mutex<Vec<(String, CommandOutput)>>,
    hangs: Mutex<BTreeSet<String>>,
    discard_new_cluster: Mutex<bool>,
}

#[allow(dead_code)]
impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, program: &str, exit_code: i32, stderr: &str) {
        self.respond(
            program,
            CommandOutput {
                exit_code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        );
    }

    pub fn respond(&self, program: &str, output: CommandOutput) {
        self.responses.lock().push((program.to_string(), output));
    }

    /// Never return from this program, as a stuck tool would.
    pub fn hang(&self, program: &str) {
        self.hangs.lock().insert(program.to_string());
    }

    /// Make `pg_upgrade` remove its output directory, so the swap fails.
    pub fn discard_new_cluster(&self) {
        *self.discard_new_cluster.lock() = true;
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Program names in call order.
    pub fn programs(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| c.program_name().to_string())
            .collect()
    }

    pub fn ran(&self, program: &str) -> bool {
        self.calls().iter().any(|c| c.program.ends_with(program))
    }

    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.program.ends_with(program))
            .collect()
    }

    /// How many times `program` ran with `arg` among its arguments.
    pub fn count(&self, program: &str, arg: &str) -> usize {
        self.calls_to(program)
            .iter()
            .filter(|c| c.args.iter().any(|a| a == arg))
            .count()
    }

    /// Index of the first call to `program`.
    pub fn position(&self, program: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.program.ends_with(program))
    }

    fn scripted(&self, spec: &CommandSpec) -> Option<CommandOutput> {
        self.responses
            .lock()
            .iter()
            .find(|(key, _)| spec.program.ends_with(key))
            .map(|(_, output)| output.clone())
    }

    fn simulate(&self, spec: &CommandSpec) -> String {
        match spec.program_name() {
            "initdb" => {
                let dir = arg_after(spec, "-D");
                fs::create_dir_all(&dir).unwrap();
                fs::write(dir.join("PG_VERSION"), format!("{}\n", major_of(&spec.program))).unwrap();
                String::new()
            }
            "pg_upgrade" => {
                let dir = arg_after(spec, "-D");
                if *self.discard_new_cluster.lock() {
                    let _ = fs::remove_dir_all(&dir);
                } else {
                    fs::write(dir.join("base"), "migrated cluster").unwrap();
                }
                String::new()
            }
            "psql" => LOCALE_ROW.to_string(),
            "du" => format!("1024\t{}\n", spec.args.last().cloned().unwrap_or_default()),
            "df" => "Filesystem 1024-blocks Used Available Capacity Mounted on\n\
                     /dev/fake 100000000 1000 99999000 1% /\n"
                .to_string(),
            _ => String::new(),
        }
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        self.calls.lock().push(spec.clone());

        let hangs = self
            .hangs
            .lock()
            .iter()
            .any(|key| spec.program.ends_with(key));
        if hangs {
            std::future::pending::<()>().await;
        }

        if let Some(output) = self.scripted(spec) {
            return Ok(output);
        }

        Ok(CommandOutput {
            exit_code: 0,
            stdout: self.simulate(spec),
            stderr: String::new(),
        })
    }
}

fn arg_after(spec: &CommandSpec, flag: &str) -> PathBuf {
    let index = spec.args.iter().position(|a| a == flag).unwrap();
    PathBuf::from(&spec.args[index + 1])
}

/// `<install_root>/<major>/bin/<tool>` -> `<major>`
fn major_of(program: &Path) -> String {
    program
        .parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .unwrap()
        .to_string()
}

// =============================================================================
// Service control
// =============================================================================

/// In-memory supervisor. Unknown services are down.
#[derive(Default)]
pub struct FakeServices {
    status: Mutex<BTreeMap<ServiceName, ServiceStatus>>,
    calls: Mutex<Vec<String>>,
    failing_starts: Mutex<BTreeSet<ServiceName>>,
}

#[allow(dead_code)]
impl FakeServices {
    pub fn running(names: &[&str]) -> Arc<Self> {
        let services = Self::default();
        for name in names {
            services.status.lock().insert(service(name), ServiceStatus::Up);
        }
        Arc::new(services)
    }

    pub fn fail_start(&self, name: &str) {
        self.failing_starts.lock().insert(service(name));
    }

    pub fn set(&self, name: &str, status: ServiceStatus) {
        self.status.lock().insert(service(name), status);
    }

    pub fn status_of(&self, name: &str) -> ServiceStatus {
        self.status
            .lock()
            .get(&service(name))
            .copied()
            .unwrap_or(ServiceStatus::Down)
    }

    /// `"start <name>"` / `"stop <name>"` in call order; status queries are
    /// not recorded.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }
}

#[async_trait]
impl ServiceControl for FakeServices {
    async fn start(&self, name: &ServiceName) -> Result<(), ServiceError> {
        self.calls.lock().push(format!("start {name}"));
        if self.failing_starts.lock().contains(name) {
            return Err(ServiceError::Start {
                service: name.clone(),
                source: ExecutionError::failed("start", "supervisor refused"),
            });
        }
        self.status.lock().insert(name.clone(), ServiceStatus::Up);
        Ok(())
    }

    async fn stop(&self, name: &ServiceName) -> Result<(), ServiceError> {
        self.calls.lock().push(format!("stop {name}"));
        self.status.lock().insert(name.clone(), ServiceStatus::Down);
        Ok(())
    }

    async fn status(&self, name: &ServiceName) -> Result<ServiceStatus, ServiceError> {
        Ok(self
            .status
            .lock()
            .get(name)
            .copied()
            .unwrap_or(ServiceStatus::Down))
    }
}

// =============================================================================
// Cluster role and configuration system
// =============================================================================

#[derive(Default)]
pub struct FakeCluster {
    pub primary: Mutex<bool>,
    unregistered: Mutex<usize>,
}

#[allow(dead_code)]
impl FakeCluster {
    pub fn new(primary: bool) -> Arc<Self> {
        Arc::new(Self {
            primary: Mutex::new(primary),
            unregistered: Mutex::new(0),
        })
    }

    pub fn unregister_calls(&self) -> usize {
        *self.unregistered.lock()
    }
}

#[async_trait]
impl ClusterRole for FakeCluster {
    async fn is_primary(&self) -> Result<bool, ClusterError> {
        Ok(*self.primary.lock())
    }

    async fn unregister_secondary(&self) -> Result<(), ClusterError> {
        *self.unregistered.lock() += 1;
        Ok(())
    }
}

/// Counts reconfigure runs; can fail a specific (1-based) call.
#[derive(Default)]
pub struct FakeConfigSystem {
    calls: Mutex<usize>,
    fail_call: Mutex<Option<usize>>,
}

#[allow(dead_code)]
impl FakeConfigSystem {
    pub fn fail_call(&self, call: usize) {
        *self.fail_call.lock() = Some(call);
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl ConfigSystem for FakeConfigSystem {
    async fn reconfigure(&self) -> Result<(), ExecutionError> {
        let mut calls = self.calls.lock();
        *calls += 1;
        if *self.fail_call.lock() == Some(*calls) {
            return Err(ExecutionError::failed("reconfigure", "template rendering failed"));
        }
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A fixture plus fakes for every collaborator.
pub struct Harness {
    pub fixture: Fixture,
    pub runner: Arc<FakeRunner>,
    pub services: Arc<FakeServices>,
    pub cluster: Arc<FakeCluster>,
    pub config_system: Arc<FakeConfigSystem>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_fixture(Fixture::new())
    }

    pub fn with_fixture(fixture: Fixture) -> Self {
        init_tracing();
        Self {
            fixture,
            runner: FakeRunner::new(),
            services: FakeServices::running(&["postgresql", "nginx", "puma", "sidekiq"]),
            cluster: FakeCluster::new(true),
            config_system: Arc::new(FakeConfigSystem::default()),
        }
    }

    /// Turn on HA with this node in the given role.
    pub fn ha(mut self, primary: bool) -> Self {
        self.fixture.config.ha.enabled = true;
        *self.cluster.primary.lock() = primary;
        self.services.set("repmgrd", ServiceStatus::Up);
        self
    }

    pub fn host(&self) -> Host {
        Host {
            runner: self.runner.clone(),
            services: self.services.clone(),
            config_system: self.config_system.clone(),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        let cluster = ClusterRoleDetector::new(self.fixture.config.ha.enabled, self.cluster.clone());
        Orchestrator::new(self.fixture.config.clone(), self.host(), cluster)
    }

    /// Times the deploy page was taken down.
    pub fn maintenance_exits(&self) -> usize {
        self.runner.count("deploy-page", "down")
    }

    pub fn maintenance_entries(&self) -> usize {
        self.runner.count("deploy-page", "up")
    }
}

#[allow(dead_code)]
pub fn diagnostics() -> Diagnostics {
    Diagnostics::default()
}
