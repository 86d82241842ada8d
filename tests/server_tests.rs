#![cfg(unix)]

use async_trait::async_trait;
use mcs_manager::config::{Config, ServerConfig};
use mcs_manager::error::{Error, LaunchError, Result};
use mcs_manager::events::{EventBus, EventKind, EventSubscriber, ServerEvent};
use mcs_manager::server::{
    JsonStore, MemoryStore, ServerId, ServerState, ServerStore, Supervisor,
};
use mockall::mock;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// Stand-in for a game server: prints a readiness line, then answers console
// commands until told to stop.
const FAKE_SERVER: &str = r#"
echo "Starting minecraft server version 1.21"
echo "Loading libraries" >&2
echo "[12:00:00] [Server thread/INFO]: Done (0.42s)! For help, type \"help\""
while IFS= read -r line; do
  case "$line" in
    stop) echo "Stopping the server"; exit 0 ;;
    crash) echo "Exception in server tick loop" >&2; exit 3 ;;
    list) echo "[12:00:01] [Server thread/INFO]: There are 2 of a max of 10 players online: a, b" ;;
    *) echo "[12:00:01] [Server thread/INFO]: Unknown command $line" ;;
  esac
done
"#;

// Becomes ready but never reacts to the stop command
const STUBBORN_SERVER: &str = r#"
echo "Done (0.1s)!"
while IFS= read -r line; do :; done
"#;

// Never prints a readiness line
const SILENT_SERVER: &str = r#"
while IFS= read -r line; do
  if [ "$line" = stop ]; then exit 0; fi
done
"#;

const FAILING_SERVER: &str = r#"
echo "Failed to bind to port" >&2
exit 1
"#;

mock! {
    pub Store {}

    #[async_trait]
    impl ServerStore for Store {
        async fn load_all(&self) -> Result<Vec<ServerConfig>>;
        async fn save_all(&self, servers: &[ServerConfig]) -> Result<()>;
    }
}

fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.root = root.to_path_buf();
    config.supervisor.ready_grace_secs = 10;
    config.supervisor.stop_timeout_secs = 5;
    config.supervisor.info_interval_secs = 0;
    config
}

async fn supervisor_with(config: &Config) -> (Arc<Supervisor>, EventBus) {
    let bus = EventBus::new(1024);
    let supervisor = Supervisor::new(config, bus.clone(), Arc::new(MemoryStore::new()))
        .await
        .unwrap();
    (Arc::new(supervisor), bus)
}

fn script(name: &str, body: &str) -> ServerConfig {
    ServerConfig {
        name: name.to_string(),
        command: Some("sh".to_string()),
        args: vec!["-c".to_string(), body.to_string()],
        ..ServerConfig::default()
    }
}

async fn create(supervisor: &Supervisor, name: &str, body: &str) -> ServerId {
    supervisor.create(script(name, body)).await.unwrap().config.id
}

/// Wait for the first event matching `pred`
async fn wait_for<F>(subscriber: &mut EventSubscriber, pred: F) -> ServerEvent
where
    F: Fn(&ServerEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = subscriber.recv().await.expect("bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Everything already queued for the subscriber
fn queued(subscriber: &mut EventSubscriber) -> Vec<ServerEvent> {
    std::iter::from_fn(|| subscriber.try_recv()).collect()
}

fn count(events: &[ServerEvent], event_type: &str) -> usize {
    events.iter().filter(|e| e.event_type() == event_type).count()
}

#[tokio::test]
async fn test_start_and_graceful_stop() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, bus) = supervisor_with(&test_config(root.path())).await;
    let id = create(&supervisor, "alpha", FAKE_SERVER).await;
    let mut events = bus.subscribe();

    let info = supervisor.start(&id).await.unwrap();
    assert_eq!(info.state, ServerState::Running);
    assert!(info.pid > 0);

    let info = supervisor.stop(&id, true).await.unwrap();
    assert_eq!(info.state, ServerState::Stopped);
    assert_eq!(info.pid, 0);
    assert!(info.last_exit_err.is_empty());

    let events = queued(&mut events);
    assert_eq!(count(&events, "server.started"), 1);
    assert_eq!(count(&events, "server.stopped"), 1);
    assert_eq!(count(&events, "server.crashed"), 0);

    let position = |pred: &dyn Fn(&ServerEvent) -> bool| events.iter().position(pred).unwrap();
    let started = position(&|e| e.event_type() == "server.started");
    let stopped = position(&|e| e.event_type() == "server.stopped");
    let last_line = position(&|e| {
        matches!(&e.kind, EventKind::Log(line) if line.line == "Stopping the server")
    });
    assert!(started < last_line);
    assert!(last_line < stopped);

    let logs: Vec<String> = supervisor
        .logs(&id)
        .unwrap()
        .into_iter()
        .map(|l| l.line)
        .collect();
    assert!(logs.iter().any(|l| l == "Starting minecraft server version 1.21"));
    assert!(logs.iter().any(|l| l == "Loading libraries"));
    assert_eq!(logs.last().map(String::as_str), Some("Stopping the server"));
}

#[tokio::test]
async fn test_start_on_running_server_does_not_launch_twice() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, bus) = supervisor_with(&test_config(root.path())).await;
    let id = create(&supervisor, "alpha", FAKE_SERVER).await;

    let first = supervisor.start(&id).await.unwrap();
    let mut events = bus.subscribe();
    let second = supervisor.start(&id).await.unwrap();

    assert_eq!(first.pid, second.pid);
    assert_eq!(second.state, ServerState::Running);
    assert_eq!(count(&queued(&mut events), "server.started"), 0);

    supervisor.stop(&id, true).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_start_conflicts() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, _bus) = supervisor_with(&test_config(root.path())).await;
    let id = create(&supervisor, "alpha", FAKE_SERVER).await;

    let (a, b) = tokio::join!(supervisor.start(&id), supervisor.start(&id));

    let conflicts = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(Error::Conflict(_))))
        .count();
    let started = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(conflicts, 1);
    assert_eq!(started, 1);

    supervisor.stop(&id, true).await.unwrap();
}

#[tokio::test]
async fn test_different_servers_start_in_parallel() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, _bus) = supervisor_with(&test_config(root.path())).await;
    let a = create(&supervisor, "alpha", FAKE_SERVER).await;
    let b = create(&supervisor, "beta", FAKE_SERVER).await;

    let (ra, rb) = tokio::join!(supervisor.start(&a), supervisor.start(&b));
    assert_eq!(ra.unwrap().state, ServerState::Running);
    assert_eq!(rb.unwrap().state, ServerState::Running);

    supervisor.shutdown_all().await;
    assert!(supervisor.list_all().iter().all(|s| s.state == ServerState::Stopped));
}

#[tokio::test]
async fn test_unsolicited_exit_is_a_crash() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, bus) = supervisor_with(&test_config(root.path())).await;
    let id = create(&supervisor, "alpha", FAKE_SERVER).await;
    supervisor.start(&id).await.unwrap();
    let mut events = bus.subscribe();

    supervisor.send_command(&id, "crash").await.unwrap();
    let crashed = wait_for(&mut events, |e| e.kind.is_terminal()).await;

    assert_eq!(crashed.event_type(), "server.crashed");
    let info = crashed.kind.info().unwrap();
    assert_eq!(info.state, ServerState::Crashed);
    assert!(!info.last_exit_err.is_empty());
    assert!(info.last_exit_err.contains('3'), "{}", info.last_exit_err);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let rest = queued(&mut events);
    assert_eq!(count(&rest, "server.crashed"), 0);
    assert_eq!(count(&rest, "server.stopped"), 0);

    let info = supervisor.get_by_id(&id).unwrap();
    assert_eq!(info.state, ServerState::Crashed);
    assert_eq!(info.pid, 0);
}

#[tokio::test]
async fn test_crashed_server_can_start_again() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, bus) = supervisor_with(&test_config(root.path())).await;
    let id = create(&supervisor, "alpha", FAKE_SERVER).await;
    supervisor.start(&id).await.unwrap();

    let mut events = bus.subscribe();
    supervisor.send_command(&id, "crash").await.unwrap();
    wait_for(&mut events, |e| e.event_type() == "server.crashed").await;

    let info = supervisor.start(&id).await.unwrap();
    assert_eq!(info.state, ServerState::Running);
    assert!(info.last_exit_err.is_empty());

    supervisor.stop(&id, true).await.unwrap();
}

#[tokio::test]
async fn test_forced_stop_reports_exited() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, bus) = supervisor_with(&test_config(root.path())).await;
    let id = create(&supervisor, "alpha", STUBBORN_SERVER).await;
    supervisor.start(&id).await.unwrap();
    let mut events = bus.subscribe();

    let info = supervisor.stop(&id, false).await.unwrap();
    assert_eq!(info.state, ServerState::Stopped);

    let events = queued(&mut events);
    assert_eq!(count(&events, "server.exited"), 1);
    assert_eq!(count(&events, "server.crashed"), 0);
}

#[tokio::test]
async fn test_graceful_stop_timeout_kills_and_crashes() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.supervisor.stop_timeout_secs = 1;
    let (supervisor, bus) = supervisor_with(&config).await;
    let id = create(&supervisor, "alpha", STUBBORN_SERVER).await;
    supervisor.start(&id).await.unwrap();
    let mut events = bus.subscribe();

    let info = supervisor.stop(&id, true).await.unwrap();
    assert_eq!(info.state, ServerState::Crashed);
    assert!(info.last_exit_err.contains("did not stop within 1s"), "{}", info.last_exit_err);

    let events = queued(&mut events);
    assert_eq!(count(&events, "server.crashed"), 1);
    assert_eq!(count(&events, "server.stopped"), 0);
}

#[tokio::test]
async fn test_exit_during_startup_is_a_launch_error() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, bus) = supervisor_with(&test_config(root.path())).await;
    let id = create(&supervisor, "alpha", FAILING_SERVER).await;
    let mut events = bus.subscribe();

    let err = supervisor.start(&id).await.unwrap_err();
    assert!(
        matches!(err, Error::Launch(LaunchError::ExitedDuringStartup(_))),
        "{err}"
    );
    assert_eq!(supervisor.get_by_id(&id).unwrap().state, ServerState::Crashed);

    let events = queued(&mut events);
    assert_eq!(count(&events, "server.crashed"), 1);
    assert_eq!(count(&events, "server.started"), 0);
}

#[tokio::test]
async fn test_running_after_grace_period_without_marker() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.supervisor.ready_grace_secs = 1;
    let (supervisor, bus) = supervisor_with(&config).await;
    let id = create(&supervisor, "alpha", SILENT_SERVER).await;
    let mut events = bus.subscribe();

    let info = supervisor.start(&id).await.unwrap();
    assert_eq!(info.state, ServerState::Running);
    assert_eq!(count(&queued(&mut events), "server.started"), 1);

    supervisor.stop(&id, true).await.unwrap();
}

#[tokio::test]
async fn test_missing_directory_fails_launch_and_stays_stopped() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, _bus) = supervisor_with(&test_config(root.path())).await;
    let id = create(&supervisor, "alpha", FAKE_SERVER).await;
    let path = supervisor.get_by_id(&id).unwrap().config.path;
    std::fs::remove_dir_all(&path).unwrap();

    let err = supervisor.start(&id).await.unwrap_err();
    assert!(matches!(err, Error::Launch(LaunchError::MissingPath(_))), "{err}");
    assert_eq!(supervisor.get_by_id(&id).unwrap().state, ServerState::Stopped);
}

#[tokio::test]
async fn test_delete_requires_stopped() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, _bus) = supervisor_with(&test_config(root.path())).await;
    let id = create(&supervisor, "alpha", FAKE_SERVER).await;
    let path = supervisor.get_by_id(&id).unwrap().config.path;
    supervisor.start(&id).await.unwrap();

    let err = supervisor.delete(&id).await.unwrap_err();
    assert!(matches!(err, Error::Precondition(_)), "{err}");
    let info = supervisor.get_by_id(&id).unwrap();
    assert_eq!(info.config.name, "alpha");
    assert_eq!(info.state, ServerState::Running);

    supervisor.stop(&id, true).await.unwrap();
    supervisor.delete(&id).await.unwrap();

    assert!(matches!(supervisor.get_by_id(&id), Err(Error::ServerNotFound(_))));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_delete_rejects_crashed_server() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, _bus) = supervisor_with(&test_config(root.path())).await;
    let id = create(&supervisor, "alpha", FAILING_SERVER).await;
    let _ = supervisor.start(&id).await;

    let err = supervisor.delete(&id).await.unwrap_err();
    assert!(matches!(err, Error::Precondition(_)), "{err}");
    assert!(supervisor.get_by_id(&id).is_ok());
}

#[tokio::test]
async fn test_restart_replaces_process() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, bus) = supervisor_with(&test_config(root.path())).await;
    let id = create(&supervisor, "alpha", FAKE_SERVER).await;
    let before = supervisor.start(&id).await.unwrap();
    let mut events = bus.subscribe();

    let after = supervisor.restart(&id).await.unwrap();
    assert_eq!(after.state, ServerState::Running);
    assert_ne!(before.pid, after.pid);

    let events = queued(&mut events);
    let stopped = events.iter().position(|e| e.event_type() == "server.stopped");
    let started = events.iter().position(|e| e.event_type() == "server.started");
    assert!(stopped.unwrap() < started.unwrap());
    assert_eq!(count(&events, "server.crashed"), 0);

    supervisor.stop(&id, true).await.unwrap();
}

#[tokio::test]
async fn test_send_command_requires_running() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, _bus) = supervisor_with(&test_config(root.path())).await;
    let id = create(&supervisor, "alpha", FAKE_SERVER).await;

    let err = supervisor.send_command(&id, "list").await.unwrap_err();
    assert!(matches!(err, Error::NotRunning(_)), "{err}");
}

#[tokio::test]
async fn test_console_output_updates_player_count() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, bus) = supervisor_with(&test_config(root.path())).await;
    let id = create(&supervisor, "alpha", FAKE_SERVER).await;
    supervisor.start(&id).await.unwrap();
    let mut events = bus.subscribe();

    supervisor.send_command(&id, "list").await.unwrap();
    let event = wait_for(&mut events, |e| {
        matches!(&e.kind, EventKind::Info(info) if info.players.is_some_and(|p| p.current == 2))
    })
    .await;

    let players = event.kind.info().and_then(|info| info.players).unwrap();
    assert_eq!(players.max, 10);
    assert_eq!(supervisor.get_by_id(&id).unwrap().players, Some(players));

    supervisor.stop(&id, true).await.unwrap();
    assert_eq!(supervisor.get_by_id(&id).unwrap().players, None);
}

#[tokio::test]
async fn test_log_ring_keeps_latest_lines() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.supervisor.log_capacity = 5;
    let (supervisor, _bus) = supervisor_with(&config).await;
    let id = create(
        &supervisor,
        "alpha",
        r#"for i in 1 2 3 4 5 6 7 8 9 10; do echo "line $i"; done
echo "Done (1s)!"
while IFS= read -r line; do [ "$line" = stop ] && exit 0; done"#,
    )
    .await;

    supervisor.start(&id).await.unwrap();
    supervisor.stop(&id, true).await.unwrap();

    let lines: Vec<String> = supervisor
        .logs(&id)
        .unwrap()
        .into_iter()
        .map(|l| l.line)
        .collect();
    assert_eq!(lines, vec!["line 7", "line 8", "line 9", "line 10", "Done (1s)!"]);
    assert_eq!(
        supervisor.logs_text(&id).unwrap(),
        "line 7\nline 8\nline 9\nline 10\nDone (1s)!\n"
    );
}

#[tokio::test]
async fn test_create_fills_defaults() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, bus) = supervisor_with(&test_config(root.path())).await;
    let mut events = bus.subscribe();

    let info = supervisor
        .create(ServerConfig {
            eula: true,
            ..ServerConfig::default()
        })
        .await
        .unwrap();

    assert_eq!(info.config.id.as_str().len(), 12);
    assert_eq!(info.config.name, info.config.id.as_str());
    assert_eq!(info.config.path, root.path().join(info.config.id.as_str()));
    assert_ne!(info.config.port, 0);
    assert_eq!(info.config.memory_mb, 2048);
    assert_eq!(info.config.version, "latest");
    assert_eq!(info.state, ServerState::Stopped);

    let eula = std::fs::read_to_string(info.config.path.join("eula.txt")).unwrap();
    assert_eq!(eula.trim(), "eula=true");
    let props = std::fs::read_to_string(info.config.path.join("server.properties")).unwrap();
    assert!(props.contains(&format!("server-port={}", info.config.port)));

    assert_eq!(count(&queued(&mut events), "server.info"), 1);
}

#[tokio::test]
async fn test_list_all_is_sorted_by_name() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, _bus) = supervisor_with(&test_config(root.path())).await;
    for name in ["charlie", "alpha", "bravo"] {
        create(&supervisor, name, FAKE_SERVER).await;
    }

    let names: Vec<String> = supervisor
        .list_all()
        .into_iter()
        .map(|s| s.config.name)
        .collect();
    assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
}

#[tokio::test]
async fn test_unknown_server_is_not_found() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, _bus) = supervisor_with(&test_config(root.path())).await;
    let id = ServerId::new("missing");

    assert!(matches!(supervisor.start(&id).await, Err(Error::ServerNotFound(_))));
    assert!(matches!(supervisor.stop(&id, true).await, Err(Error::ServerNotFound(_))));
    assert!(matches!(supervisor.delete(&id).await, Err(Error::ServerNotFound(_))));
    assert!(matches!(supervisor.logs(&id), Err(Error::ServerNotFound(_))));
}

#[tokio::test]
async fn test_servers_survive_a_restart_of_the_supervisor() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());

    let first = Supervisor::new(&config, EventBus::default(), Arc::new(JsonStore::new(root.path())))
        .await
        .unwrap();
    let id = create(&first, "alpha", FAKE_SERVER).await;
    drop(first);

    let second = Supervisor::new(&config, EventBus::default(), Arc::new(JsonStore::new(root.path())))
        .await
        .unwrap();
    let info = second.get_by_id(&id).unwrap();
    assert_eq!(info.config.name, "alpha");
    assert_eq!(info.state, ServerState::Stopped);
}

#[tokio::test]
async fn test_store_is_loaded_once_and_saved_on_create_and_delete() {
    let root = tempfile::tempdir().unwrap();
    let mut store = MockStore::new();
    store.expect_load_all().times(1).returning(|| Ok(Vec::new()));
    store.expect_save_all().times(2).returning(|_| Ok(()));

    let supervisor = Supervisor::new(&test_config(root.path()), EventBus::default(), Arc::new(store))
        .await
        .unwrap();
    let id = create(&supervisor, "alpha", FAKE_SERVER).await;
    supervisor.delete(&id).await.unwrap();
}

#[tokio::test]
async fn test_store_failure_does_not_fail_create() {
    let root = tempfile::tempdir().unwrap();
    let mut store = MockStore::new();
    store.expect_load_all().returning(|| Ok(Vec::new()));
    store
        .expect_save_all()
        .returning(|_| Err(Error::Store("disk full".to_string())));

    let supervisor = Supervisor::new(&test_config(root.path()), EventBus::default(), Arc::new(store))
        .await
        .unwrap();
    let id = create(&supervisor, "alpha", FAKE_SERVER).await;
    assert!(supervisor.get_by_id(&id).is_ok());
}

#[tokio::test]
async fn test_graceful_stop_is_not_blocked_by_a_stuck_command() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.supervisor.stop_timeout_secs = 1;
    let (supervisor, _bus) = supervisor_with(&config).await;
    // Never reads stdin, so a large enough write fills the pipe and stalls
    let id = create(&supervisor, "alpha", "echo 'Done (0.1s)!'; exec sleep 1000").await;
    supervisor.start(&id).await.unwrap();

    let stuck = {
        let supervisor = supervisor.clone();
        let id = id.clone();
        tokio::spawn(async move { supervisor.send_command(&id, &"x".repeat(1 << 20)).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let info = tokio::time::timeout(Duration::from_secs(8), supervisor.stop(&id, true))
        .await
        .expect("stop hung behind the pending command")
        .unwrap();
    assert_eq!(info.state, ServerState::Crashed);
    assert!(info.last_exit_err.contains("did not stop within 1s"), "{}", info.last_exit_err);

    let pending = tokio::time::timeout(Duration::from_secs(8), stuck)
        .await
        .expect("command write never finished")
        .unwrap();
    assert!(pending.is_err());

    let err = supervisor.send_command(&id, "list").await.unwrap_err();
    assert!(matches!(err, Error::NotRunning(_)), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_are_all_persisted() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let supervisor = Arc::new(
        Supervisor::new(&config, EventBus::default(), Arc::new(JsonStore::new(root.path())))
            .await
            .unwrap(),
    );

    let tasks: Vec<_> = (0..16)
        .map(|n| {
            let supervisor = supervisor.clone();
            tokio::spawn(async move {
                supervisor
                    .create(script(&format!("server-{n:02}"), FAKE_SERVER))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = JsonStore::new(root.path()).load_all().await.unwrap();
    assert_eq!(stored.len(), 16);
    let leftovers = std::fs::read_dir(root.path())
        .unwrap()
        .filter(|entry| {
            entry
                .as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .ends_with(".tmp")
        })
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_with_the_same_id_conflict() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, _bus) = supervisor_with(&test_config(root.path())).await;

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let supervisor = supervisor.clone();
            tokio::spawn(async move {
                supervisor
                    .create(ServerConfig {
                        id: ServerId::new("shared"),
                        ..script("twin", FAKE_SERVER)
                    })
                    .await
            })
        })
        .collect();

    let mut created = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(Error::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((created, conflicts), (1, 1));
    assert_eq!(supervisor.list_all().len(), 1);
}

#[tokio::test]
async fn test_console_log_outlives_the_supervisor() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());

    let first = Supervisor::new(&config, EventBus::default(), Arc::new(JsonStore::new(root.path())))
        .await
        .unwrap();
    let id = create(&first, "alpha", FAKE_SERVER).await;
    first.start(&id).await.unwrap();
    first.send_command(&id, "list").await.unwrap();
    first.stop(&id, true).await.unwrap();
    let path = first.get_by_id(&id).unwrap().config.path;
    drop(first);

    let log = std::fs::read_to_string(path.join("mcs.log")).unwrap();
    assert!(log.contains("Loading libraries"), "{log}");
    assert!(log.contains("There are 2 of a max of 10 players online"), "{log}");
    assert!(log.contains("Stopping the server\n"), "{log}");

    let second = Supervisor::new(&config, EventBus::default(), Arc::new(JsonStore::new(root.path())))
        .await
        .unwrap();
    let lines: Vec<String> = second
        .logs(&id)
        .unwrap()
        .into_iter()
        .map(|l| l.line)
        .collect();
    assert!(lines.contains(&"Starting minecraft server version 1.21".to_string()));
    assert!(lines.contains(&"Stopping the server".to_string()));
    assert_eq!(second.get_by_id(&id).unwrap().state, ServerState::Stopped);
}

#[tokio::test]
async fn test_overlong_console_lines_are_split() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, _bus) = supervisor_with(&test_config(root.path())).await;
    let id = create(
        &supervisor,
        "alpha",
        r#"head -c 10000 /dev/zero | tr '\0' 'a'; echo
echo "Done (1s)!"
while IFS= read -r line; do [ "$line" = stop ] && exit 0; done"#,
    )
    .await;

    supervisor.start(&id).await.unwrap();
    supervisor.stop(&id, true).await.unwrap();

    let lens: Vec<usize> = supervisor
        .logs(&id)
        .unwrap()
        .into_iter()
        .map(|l| l.line.len())
        .collect();
    assert_eq!(lens, vec![4096, 4096, 1808, "Done (1s)!".len()]);
}

/// Serves `body` at `/server.jar` once per connection, 404 for anything else
async fn jar_host(body: &'static [u8]) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let found = request.starts_with(b"GET /server.jar ");
            let (status, payload) = if found {
                ("200 OK", body)
            } else {
                ("404 Not Found", &b"missing"[..])
            };
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                payload.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(payload).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_create_downloads_the_server_jar() {
    const JAR: &[u8] = b"PK\x03\x04 not really a jar";
    let host = jar_host(JAR).await;
    let root = tempfile::tempdir().unwrap();
    let (supervisor, _bus) = supervisor_with(&test_config(root.path())).await;

    let info = supervisor
        .create(ServerConfig {
            name: "vanilla".to_string(),
            jar_url: Some(format!("{}/server.jar", host)),
            ..ServerConfig::default()
        })
        .await
        .unwrap();

    let jar = std::fs::read(info.config.path.join("server.jar")).unwrap();
    assert_eq!(jar, JAR);
    let parts = std::fs::read_dir(&info.config.path)
        .unwrap()
        .filter(|entry| {
            entry
                .as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .ends_with(".part")
        })
        .count();
    assert_eq!(parts, 0);
}

#[tokio::test]
async fn test_failed_download_fails_create() {
    let host = jar_host(b"unused").await;
    let root = tempfile::tempdir().unwrap();
    let (supervisor, _bus) = supervisor_with(&test_config(root.path())).await;

    let err = supervisor
        .create(ServerConfig {
            name: "vanilla".to_string(),
            jar_url: Some(format!("{}/missing.jar", host)),
            ..ServerConfig::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Download(_)), "{err}");
    assert!(supervisor.list_all().is_empty());
}

#[tokio::test]
async fn test_existing_jar_is_not_downloaded_again() {
    let root = tempfile::tempdir().unwrap();
    let (supervisor, _bus) = supervisor_with(&test_config(root.path())).await;
    let dir = root.path().join("custom");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("server.jar"), b"local build").unwrap();

    // Nothing listens on port 9, so a download attempt would fail
    supervisor
        .create(ServerConfig {
            name: "custom".to_string(),
            path: dir.clone(),
            jar_url: Some("http://127.0.0.1:9/server.jar".to_string()),
            ..ServerConfig::default()
        })
        .await
        .unwrap();
    assert_eq!(std::fs::read(dir.join("server.jar")).unwrap(), b"local build");
}
