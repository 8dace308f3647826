//! Snapshot, restore and storage

mod common;

use common::{studio_inventory, MemoryStorage, RecordingEngine, HEADPHONES, MIC, PRISM, SPEAKERS};
use spectrum_control::config::ControlConfig;
use spectrum_control::engine::{command_channel, Engine, EngineCommand};
use spectrum_control::graph::{DeviceBinding, NodeSpec, Position};
use spectrum_control::routing::SendRoute;
use spectrum_control::state::{
    EngineStorage, JsonFileStorage, MasterState, PersistenceAdapter, SessionState, Storage,
    Viewport, STATE_VERSION,
};
use spectrum_control::{Console, SharedConsole, StateError};
use std::sync::Arc;

/// A mic and a Prism feed into an FX bus with one effect, out to both
/// outputs.
fn saved_session() -> SessionState {
    let (queue, _worker) = command_channel();
    let mut console = Console::from_config(queue, &ControlConfig::default());
    let mic = console
        .add_node(NodeSpec::device_source(DeviceBinding::new(MIC, "Mic", "USB"), 2))
        .unwrap();
    let music = console
        .add_node(NodeSpec::channel_feed(
            DeviceBinding::new(PRISM, "Prism", "Virtual"),
            0,
            2,
        ))
        .unwrap();
    let bus = console
        .add_node(NodeSpec::bus("FX", 2).with_bus_id("bus_fx000001"))
        .unwrap();
    let reverb = console.add_plugin(bus.id, "aufx:rvb", "Reverb").unwrap();
    console
        .set_plugin_state(bus.id, &reverb.instance_id, Some(vec![1, 2, 3]))
        .unwrap();
    let speakers = console
        .add_node(NodeSpec::sink(
            DeviceBinding::new(SPEAKERS, "Speakers", "Built-In"),
            0,
            2,
        ))
        .unwrap();
    let phones = console
        .add_node(NodeSpec::sink(
            DeviceBinding::new(HEADPHONES, "Headphones", "USB"),
            0,
            2,
        ))
        .unwrap();
    console
        .set_node_position(bus.id, Position { x: 120.0, y: 40.0 })
        .unwrap();

    console.connect_stereo(mic.id, 0, bus.id, 0, 60.0).unwrap();
    console.connect_stereo(music.id, 0, bus.id, 0, 74.3).unwrap();
    console.connect_stereo(bus.id, 0, speakers.id, 0, 74.3).unwrap();
    console.connect_stereo(bus.id, 0, phones.id, 0, 50.0).unwrap();
    console.set_viewport(Viewport {
        pan_x: -20.0,
        pan_y: 15.0,
        zoom: 0.75,
    });
    console.set_master(MasterState {
        volume: 61.2,
        muted: false,
    });
    console.snapshot()
}

fn adapter(
    engine: Arc<RecordingEngine>,
    storage: Arc<dyn Storage>,
) -> (PersistenceAdapter, SharedConsole) {
    let (queue, _worker) = command_channel();
    let console = Console::from_config(queue, &ControlConfig::default()).into_shared();
    let engine: Arc<dyn Engine> = engine;
    (
        PersistenceAdapter::new(Arc::clone(&console), engine, storage),
        console,
    )
}

#[tokio::test]
async fn restore_replays_buses_then_io_then_sends() {
    let engine = RecordingEngine::new(studio_inventory());
    let (persistence, console) = adapter(Arc::clone(&engine), Arc::new(MemoryStorage::default()));

    let summary = persistence.restore(saved_session()).await.unwrap();
    assert_eq!(summary.nodes, 5);
    assert_eq!(summary.connections, 8);
    assert_eq!(summary.unavailable, 0);
    assert_eq!(summary.replay.sends_issued, 8);
    assert_eq!(summary.replay.buses_registered, 1);

    let calls = engine.calls();
    let phase = |c: &EngineCommand| match c {
        EngineCommand::AddBus { .. } | EngineCommand::AddEffect { .. } => 0,
        EngineCommand::StartCapture { .. }
        | EngineCommand::StartOutput { .. }
        | EngineCommand::SetOutputVolume { .. } => 1,
        EngineCommand::AddSend { .. } => 2,
        other => panic!("unexpected call {:?}", other),
    };
    let phases: Vec<_> = calls.iter().map(phase).collect();
    let mut sorted = phases.clone();
    sorted.sort();
    assert_eq!(phases, sorted, "calls out of phase order: {:?}", calls);
    assert_eq!(
        calls[0],
        EngineCommand::AddBus {
            bus_id: "bus_fx000001".into(),
            channel_count: 2
        }
    );
    assert!(matches!(calls[1], EngineCommand::AddEffect { .. }));

    let console = console.lock();
    assert_eq!(console.viewport().zoom, 0.75);
    assert_eq!(console.master().volume, 61.2);
    let bus = console.store().find_bus("bus_fx000001").unwrap();
    assert_eq!(bus.position, Position { x: 120.0, y: 40.0 });
    assert_eq!(bus.plugins()[0].state.as_deref(), Some(&[1u8, 2, 3][..]));
}

#[tokio::test]
async fn restore_settles_availability_before_replay() {
    let mut inventory = studio_inventory();
    // Headphones unplugged, Mic came back under a new id
    inventory.outputs.retain(|d| d.device_id != HEADPHONES);
    inventory.inputs[1].device_id = 33;
    let engine = RecordingEngine::new(inventory);
    let (persistence, console) = adapter(Arc::clone(&engine), Arc::new(MemoryStorage::default()));

    let summary = persistence.restore(saved_session()).await.unwrap();
    assert_eq!(summary.nodes, 5);
    assert_eq!(summary.connections, 8);
    assert_eq!(summary.unavailable, 1);
    // bus → headphones pair is deferred
    assert_eq!(summary.replay.sends_issued, 6);

    let calls = engine.calls();
    assert!(!calls.contains(&EngineCommand::StartOutput {
        device_id: HEADPHONES
    }));
    assert!(calls.contains(&EngineCommand::StartCapture { device_id: 33 }));
    assert!(!calls.contains(&EngineCommand::StartCapture { device_id: MIC }));

    let console = console.lock();
    let phones = console
        .store()
        .nodes()
        .find(|n| n.label == "Headphones")
        .unwrap();
    assert!(!phones.available);
    assert_eq!(console.store().connections_touching(phones.id).count(), 2);
}

#[tokio::test]
async fn engine_failures_are_logged_not_fatal() {
    let engine = RecordingEngine::new(studio_inventory());
    engine.fail_matching("add_bus");
    let (persistence, console) = adapter(Arc::clone(&engine), Arc::new(MemoryStorage::default()));

    let summary = persistence.restore(saved_session()).await.unwrap();
    assert_eq!(summary.replay.buses_failed, 1);
    // graph is not rolled back
    assert_eq!(console.lock().store().connection_count(), 8);
    assert!(engine
        .calls()
        .iter()
        .any(|c| matches!(c, EngineCommand::AddSend { .. })));
}

#[tokio::test]
async fn restore_runs_once_per_process() {
    let engine = RecordingEngine::new(studio_inventory());
    let (persistence, _console) = adapter(Arc::clone(&engine), Arc::new(MemoryStorage::default()));

    persistence.restore(saved_session()).await.unwrap();
    engine.clear();
    let second = persistence.restore(saved_session()).await;
    assert!(matches!(second, Err(StateError::AlreadyRestored)));
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn newer_state_version_is_refused() {
    let engine = RecordingEngine::new(studio_inventory());
    let (persistence, _console) = adapter(engine, Arc::new(MemoryStorage::default()));
    let mut state = saved_session();
    state.version = STATE_VERSION + 1;
    assert!(matches!(
        persistence.restore(state).await,
        Err(StateError::UnsupportedVersion(_))
    ));
}

#[tokio::test]
async fn restore_saved_reads_storage() {
    let engine = RecordingEngine::new(studio_inventory());
    let storage = MemoryStorage::with_state(saved_session());
    let (persistence, console) = adapter(engine, storage);

    let summary = persistence.restore_saved().await.unwrap().unwrap();
    assert_eq!(summary.nodes, 5);
    assert_eq!(console.lock().store().node_count(), 5);

    let empty = RecordingEngine::new(studio_inventory());
    let (persistence, _console) = adapter(empty, Arc::new(MemoryStorage::default()));
    assert!(persistence.restore_saved().await.unwrap().is_none());
}

#[tokio::test]
async fn snapshot_survives_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let storage = JsonFileStorage::new(dir.path().join("graph_state.json"));
    let state = saved_session();
    storage.save(&state).await.unwrap();
    let loaded = storage.load().await.unwrap().unwrap();
    assert_eq!(loaded, state);
}

#[tokio::test]
async fn empty_snapshot_never_clobbers_saved_graph() {
    let dir = tempfile::tempdir().unwrap();
    let storage = JsonFileStorage::new(dir.path().join("graph_state.json"));
    let state = saved_session();
    storage.save(&state).await.unwrap();

    let (queue, _worker) = command_channel();
    let blank = Console::from_config(queue, &ControlConfig::default()).snapshot();
    assert!(blank.is_empty());
    storage.save(&blank).await.unwrap();

    assert_eq!(storage.load().await.unwrap().unwrap().nodes.len(), 5);
}

#[tokio::test]
async fn engine_blob_storage() {
    let engine = RecordingEngine::new(studio_inventory());
    let storage = EngineStorage::new(engine);
    assert!(storage.load().await.unwrap().is_none());
    let state = saved_session();
    storage.save(&state).await.unwrap();
    assert_eq!(storage.load().await.unwrap().unwrap(), state);
}

#[tokio::test]
async fn edits_made_during_restore_run_after_the_replay() {
    let engine = RecordingEngine::new(studio_inventory());
    let shared: Arc<dyn Engine> = Arc::clone(&engine) as Arc<dyn Engine>;
    let (queue, worker) = command_channel();
    let worker = tokio::spawn(worker.run(Arc::clone(&shared)));
    let console = Console::from_config(queue, &ControlConfig::default()).into_shared();
    let persistence = PersistenceAdapter::new(
        Arc::clone(&console),
        shared,
        Arc::new(MemoryStorage::default()),
    );

    // disconnect the first restored send as soon as the graph is back
    let edit = async {
        loop {
            let first = console.lock().store().connections().first().cloned();
            if let Some(connection) = first {
                console.lock().disconnect(connection.id).unwrap();
                return connection;
            }
            tokio::task::yield_now().await;
        }
    };
    let (summary, removed) = tokio::join!(persistence.restore(saved_session()), edit);
    assert_eq!(summary.unwrap().replay.sends_issued, 8);

    let route = SendRoute::InputToBus {
        input: MIC,
        input_channel: 0,
        bus_id: "bus_fx000001".into(),
        bus_channel: 0,
    };
    assert_eq!((removed.from_channel, removed.to_channel), (0, 0));
    let removal = EngineCommand::RemoveSend {
        route: route.clone(),
    };
    for _ in 0..100 {
        if engine.calls().contains(&removal) {
            break;
        }
        tokio::task::yield_now().await;
    }

    let calls = engine.calls();
    let added = calls
        .iter()
        .position(|c| matches!(c, EngineCommand::AddSend { route: r, .. } if *r == route))
        .expect("send replayed");
    let dropped = calls
        .iter()
        .position(|c| *c == removal)
        .expect("edit reached the engine");
    assert!(added < dropped, "edit overtook the replay: {:?}", calls);
    assert!(matches!(calls[0], EngineCommand::AddBus { .. }));
    worker.abort();
}
