use evidenceflow::backend::ExecContext;
use evidenceflow::core::TaskStatus;
use evidenceflow::{
    plugins, BackendOptions, PluginRegistry, Runner, Task, TaskError, Workflow, WorkflowError,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    store: String,
    plugin_dir: PathBuf,
}

fn setup() -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("example1.store");
    let plugin_dir = dir.path().join("plugins");
    std::fs::create_dir_all(&plugin_dir).unwrap();
    evidenceflow::store::open(&store).unwrap();
    Fixture {
        store: store.to_string_lossy().into_owned(),
        plugin_dir,
        _dir: dir,
    }
}

#[cfg(unix)]
fn write_executable(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

async fn run_single(fixture: &Fixture, task: Task) -> Result<(), WorkflowError> {
    let mut workflow = Workflow::default().with_task(" testtask", task);
    workflow.setup_graph()?;
    let result = workflow
        .run(&fixture.store, &fixture.plugin_dir, &plugins::builtin(), None)
        .await?;
    result.check()
}

#[tokio::test]
async fn test_builtin_plugin() {
    let fixture = setup();
    run_single(&fixture, Task::plugin("example")).await.unwrap();
}

#[tokio::test]
async fn test_missing_plugin() {
    let fixture = setup();
    let mut workflow = Workflow::default().with_task("t", Task::plugin("foo"));
    let result = workflow
        .run(&fixture.store, &fixture.plugin_dir, &plugins::builtin(), None)
        .await
        .unwrap();

    assert!(matches!(
        result.get("t").unwrap().error(),
        Some(TaskError::PluginNotFound(name)) if name == "foo"
    ));
    assert!(matches!(
        result.check(),
        Err(WorkflowError::TasksFailed { failed: 1, total: 1, .. })
    ));
}

#[tokio::test]
async fn test_unknown_type_does_not_stop_siblings() {
    let fixture = setup();
    let mut workflow = Workflow::default()
        .with_task("bad", Task::new("foo").with_command("foo"))
        .with_task("good", Task::plugin("example"));
    let result = workflow
        .run(&fixture.store, &fixture.plugin_dir, &plugins::builtin(), None)
        .await
        .unwrap();

    assert!(result.get("good").unwrap().is_success());
    assert!(matches!(
        result.get("bad").unwrap().error(),
        Some(TaskError::UnknownTaskType(t)) if t == "foo"
    ));
    assert_eq!(result.failed(), vec!["bad"]);
}

#[tokio::test]
async fn test_graph_errors_run_nothing() {
    let fixture = setup();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    let registry = PluginRegistry::new().with("count", move |_: &str| -> anyhow::Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let mut cyclic = Workflow::default()
        .with_task("free", Task::plugin("count"))
        .with_task("a", Task::plugin("count").requires(["b"]))
        .with_task("b", Task::plugin("count").requires(["a"]));
    let err = cyclic
        .run(&fixture.store, &fixture.plugin_dir, &registry, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::CyclicDependency { .. }));

    let mut dangling = Workflow::default().with_task("a", Task::plugin("count").requires(["ghost"]));
    let err = dangling
        .run(&fixture.store, &fixture.plugin_dir, &registry, None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        WorkflowError::UnknownDependency {
            task: "a".to_string(),
            dependency: "ghost".to_string(),
        }
    );

    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_independent_tasks_overlap() {
    let fixture = setup();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (a, p) = (active.clone(), peak.clone());
    let registry = PluginRegistry::new().with("slow", move |_: &str| -> anyhow::Result<()> {
        let now = a.fetch_add(1, Ordering::SeqCst) + 1;
        p.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(200));
        a.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    });

    let mut workflow = Workflow::default()
        .with_task("one", Task::plugin("slow"))
        .with_task("two", Task::plugin("slow"))
        .with_task("three", Task::plugin("slow"));
    let result = workflow
        .run(&fixture.store, &fixture.plugin_dir, &registry, None)
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(peak.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_max_parallel_limits_concurrency() {
    let fixture = setup();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (a, p) = (active.clone(), peak.clone());
    let registry = PluginRegistry::new().with("slow", move |_: &str| -> anyhow::Result<()> {
        let now = a.fetch_add(1, Ordering::SeqCst) + 1;
        p.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        a.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    });

    let mut workflow = Workflow::default()
        .with_task("one", Task::plugin("slow"))
        .with_task("two", Task::plugin("slow"))
        .with_task("three", Task::plugin("slow"));
    workflow.max_parallel = Some(1);
    let result = workflow
        .run(&fixture.store, &fixture.plugin_dir, &registry, None)
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dependents_start_after_dependencies_end() {
    let fixture = setup();
    let log = Arc::new(Mutex::new(Vec::<String>::new()));

    let mut registry = PluginRegistry::new();
    for name in ["a", "b", "c"] {
        let log = log.clone();
        registry.register(name, move |_: &str| -> anyhow::Result<()> {
            log.lock().unwrap().push(format!("start {}", name));
            std::thread::sleep(Duration::from_millis(30));
            log.lock().unwrap().push(format!("end {}", name));
            Ok(())
        });
    }

    let mut workflow = Workflow::default()
        .with_task("c", Task::plugin("c").requires(["a", "b"]))
        .with_task("a", Task::plugin("a"))
        .with_task("b", Task::plugin("b"));
    let result = workflow
        .run(&fixture.store, &fixture.plugin_dir, &registry, None)
        .await
        .unwrap();
    assert!(result.is_success());

    let log = log.lock().unwrap();
    let pos = |entry: &str| log.iter().position(|e| e == entry).unwrap();
    assert!(pos("start c") > pos("end a"));
    assert!(pos("start c") > pos("end b"));
}

#[tokio::test]
async fn test_failure_propagates_as_dependency_failed() {
    let fixture = setup();
    let registry = PluginRegistry::new()
        .with("ok", |_: &str| -> anyhow::Result<()> { Ok(()) })
        .with("fail", |_: &str| -> anyhow::Result<()> {
            anyhow::bail!("parse error")
        });

    let mut workflow = Workflow::default()
        .with_task("extract", Task::plugin("fail"))
        .with_task("index", Task::plugin("ok").requires(["extract"]))
        .with_task("report", Task::plugin("ok").requires(["index"]))
        .with_task("hashes", Task::plugin("ok"));
    let result = workflow
        .run(&fixture.store, &fixture.plugin_dir, &registry, None)
        .await
        .unwrap();

    let statuses: HashMap<&str, TaskStatus> = result
        .outcomes
        .iter()
        .map(|(name, o)| (name.as_str(), o.status()))
        .collect();
    assert_eq!(statuses["extract"], TaskStatus::Failed);
    assert_eq!(statuses["index"], TaskStatus::Skipped);
    assert_eq!(statuses["report"], TaskStatus::Skipped);
    assert_eq!(statuses["hashes"], TaskStatus::Done);

    match result.check() {
        Err(WorkflowError::TasksFailed { failed, total, details }) => {
            assert_eq!((failed, total), (3, 4));
            assert!(details.contains("parse error"));
            assert!(details.contains("dependency 'index' failed"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_directory_plugin_gets_arguments_and_store() {
    let fixture = setup();
    write_executable(
        &fixture.plugin_dir.join("hashes"),
        "#!/bin/sh\nfor last; do :; done\necho \"$@\" > \"$last/args.txt\"\necho '{\"type\":\"hash\"}'\n",
    );

    let mut workflow = Workflow::default().with_task(
        "hashes",
        Task::plugin("hashes").with_argument("algorithm", "sha1"),
    );
    let result = workflow
        .run(&fixture.store, &fixture.plugin_dir, &plugins::builtin(), None)
        .await
        .unwrap();
    result.check().unwrap();

    let out = result.get("hashes").unwrap().output().unwrap();
    assert_eq!(out.stdout.trim(), "{\"type\":\"hash\"}");
    let args = std::fs::read_to_string(Path::new(&fixture.store).join("args.txt")).unwrap();
    assert_eq!(args.trim(), format!("--algorithm=sha1 {}", fixture.store));
}

#[cfg(unix)]
#[tokio::test]
async fn test_script_task() {
    let fixture = setup();
    let scripts = TempDir::new().unwrap();
    write_executable(
        &scripts.path().join("evidenceflow-import"),
        "#!/bin/sh\necho \"imported into $1\" >&2\necho done\n",
    );

    let mut workflow = Workflow::default().with_task("import", Task::script("import"));
    let ctx = ExecContext::new(fixture.store.as_str(), &fixture.plugin_dir, plugins::builtin())
        .with_scripts_dir(scripts.path());
    let result = workflow.run_with(&Runner::new(ctx)).await.unwrap();

    result.check().unwrap();
    assert_eq!(result.get("import").unwrap().output().unwrap().stdout, "done\n");
}

#[tokio::test]
#[ignore = "needs a docker daemon"]
async fn test_docker() {
    let fixture = setup();
    run_single(&fixture, Task::docker("alpine", "true")).await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_dockerfile_builds_then_runs_with_host_override() {
    let fixture = setup();
    let dir = TempDir::new().unwrap();
    let recipes = dir.path().join("recipes");
    std::fs::create_dir_all(recipes.join("plaso")).unwrap();
    std::fs::write(recipes.join("plaso/Dockerfile"), "FROM alpine\n").unwrap();

    let calls = dir.path().join("calls.log");
    let engine = dir.path().join("engine");
    write_executable(
        &engine,
        &format!("#!/bin/sh\necho \"$@\" >> '{}'\n", calls.display()),
    );

    let options = BackendOptions {
        engine: engine.to_string_lossy().into_owned(),
        host: Some("tcp://h:1".to_string()),
        dockerfiles_dir: Some(recipes.clone()),
        ..BackendOptions::default()
    };
    let mut workflow = Workflow::default().with_task("plaso", Task::dockerfile("plaso"));
    let result = workflow
        .run(&fixture.store, &fixture.plugin_dir, &plugins::builtin(), Some(&options))
        .await
        .unwrap();
    result.check().unwrap();

    let log = std::fs::read_to_string(&calls).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    let store = Path::new(&fixture.store);
    assert_eq!(
        lines,
        vec![
            format!(
                "-H tcp://h:1 build -t evidenceflow/plaso:latest {}",
                recipes.join("plaso").display()
            ),
            format!(
                "-H tcp://h:1 run --rm -v {}:/store -w /store evidenceflow/plaso:latest /store/example1.store",
                store.parent().unwrap().display()
            ),
        ]
    );
}

/// Needs a docker daemon, a `plaso` recipe in the default dockerfiles
/// directory and the example store at `EVIDENCEFLOW_TEST_STORE`.
#[tokio::test]
#[ignore = "needs a docker daemon and the example store"]
async fn test_dockerfile_plaso() {
    let store = std::env::var("EVIDENCEFLOW_TEST_STORE").unwrap();
    let plugin_dir = TempDir::new().unwrap();
    let mut workflow = Workflow::default().with_task(" testtask", Task::dockerfile("plaso"));
    workflow
        .run(&store, plugin_dir.path(), &plugins::builtin(), None)
        .await
        .unwrap()
        .check()
        .unwrap();

    let events = evidenceflow::store::open(&store).unwrap().select("event").unwrap();
    assert_eq!(events.len(), 72);
}

#[tokio::test]
async fn test_workflow_from_yaml_file() {
    let fixture = setup();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("workflow.yml");
    std::fs::write(
        &path,
        "tasks:\n  first:\n    type: plugin\n    command: example\n  second:\n    type: plugin\n    command: example\n    requires: [first]\n",
    )
    .unwrap();

    let mut workflow = Workflow::from_file(&path).unwrap();
    assert_eq!(workflow.setup_graph().unwrap().ordered_names(), vec!["first", "second"]);
    let result = workflow
        .run(&fixture.store, &fixture.plugin_dir, &plugins::builtin(), None)
        .await
        .unwrap();
    assert!(result.is_success());
}
