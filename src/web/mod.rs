use std::{
    collections::VecDeque,
    convert::Infallible,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::{net::TcpListener, sync::broadcast};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{error, info};

use crate::{
    engine::{EngineBuilder, StopHandle},
    scenario::Scenario,
    snapshot::SnapshotWriter,
    world::SimulationSnapshot,
};

#[derive(Clone, Serialize)]
pub struct Frame {
    pub snapshot: SimulationSnapshot,
    pub completed: bool,
}

#[derive(Clone, Serialize)]
pub struct StateEnvelope {
    pub scenario: String,
    pub total_days: u32,
    pub frame: Option<Frame>,
    pub completed: bool,
}

#[derive(Clone)]
struct AppState {
    broadcaster: broadcast::Sender<String>,
    latest_frame: Arc<Mutex<Option<Frame>>>,
    frames: Arc<Mutex<VecDeque<Frame>>>,
    total_days: u32,
    scenario_name: String,
    simulation_done: Arc<AtomicBool>,
}

pub struct WebServerConfig {
    pub scenario: Scenario,
    pub days: u32,
    pub parallel: bool,
    pub snapshot_interval: u32,
    pub snapshot_dir: PathBuf,
    pub host: String,
    pub port: u16,
}

// A poisoned lock only means a publisher panicked mid-update; the frame
// data itself is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Oldest frames are dropped past this many.
const FRAME_HISTORY: usize = 512;

/// Every frame goes to `latest` and the SSE stream. Only frames on the
/// snapshot cadence (`keep`) and the final frame enter the history.
fn publish(
    frame: Frame,
    keep: bool,
    latest: &Mutex<Option<Frame>>,
    frames: &Mutex<VecDeque<Frame>>,
    tx: &broadcast::Sender<String>,
) {
    *lock(latest) = Some(frame.clone());
    if keep || frame.completed {
        let mut guard = lock(frames);
        match guard.back_mut() {
            Some(last) if frame.completed && last.snapshot.date == frame.snapshot.date => {
                *last = frame.clone();
            }
            _ => {
                if guard.len() == FRAME_HISTORY {
                    guard.pop_front();
                }
                guard.push_back(frame.clone());
            }
        }
    }
    if let Ok(payload) = serde_json::to_string(&frame) {
        let _ = tx.send(payload);
    }
}

pub async fn run(config: WebServerConfig) -> Result<()> {
    let WebServerConfig {
        scenario,
        days,
        parallel,
        snapshot_interval,
        snapshot_dir,
        host,
        port,
    } = config;

    let scenario_name = scenario.name.clone();
    let engine = EngineBuilder::from_scenario(scenario)?
        .parallel(parallel)
        .build()?;
    let stop: StopHandle = engine.stop_handle();

    let (tx, _) = broadcast::channel::<String>(512);
    let latest_frame: Arc<Mutex<Option<Frame>>> = Arc::new(Mutex::new(None));
    let frames: Arc<Mutex<VecDeque<Frame>>> = Arc::new(Mutex::new(VecDeque::new()));
    let simulation_done = Arc::new(AtomicBool::new(false));

    let latest_for_sim = latest_frame.clone();
    let frames_for_sim = frames.clone();
    let done_for_sim = simulation_done.clone();
    let tx_for_sim = tx.clone();

    let sim_handle = tokio::task::spawn_blocking(move || -> Result<()> {
        let mut writer = SnapshotWriter::new(&snapshot_dir, snapshot_interval);
        let initial = engine.initialize()?;
        let final_state = engine.run_with_hook(&initial, days, |state| -> Result<()> {
            let written = writer.maybe_write(state)?.is_some();
            let frame = Frame {
                snapshot: state.snapshot(),
                completed: false,
            };
            publish(frame, written, &latest_for_sim, &frames_for_sim, &tx_for_sim);
            Ok(())
        })?;

        done_for_sim.store(true, Ordering::SeqCst);
        let frame = Frame {
            snapshot: final_state.snapshot(),
            completed: true,
        };
        publish(frame, true, &latest_for_sim, &frames_for_sim, &tx_for_sim);
        Ok(())
    });

    let state = Arc::new(AppState {
        broadcaster: tx.clone(),
        latest_frame,
        frames,
        total_days: days,
        scenario_name: scenario_name.clone(),
        simulation_done,
    });

    let label = scenario_name.clone();
    tokio::spawn(async move {
        match sim_handle.await {
            Ok(Ok(())) => info!(scenario = %label, "simulation completed"),
            Ok(Err(err)) => error!(scenario = %label, "simulation error: {err:?}"),
            Err(err) => error!(scenario = %label, "simulation task failed: {err:?}"),
        }
    });

    let router = Router::new()
        .route("/api/state", get(latest_state))
        .route("/api/frames", get(all_frames))
        .route("/api/events", get(stream_events))
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    info!("observer for '{scenario_name}' live at http://{addr} (Ctrl+C to stop)");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(stop))
        .await?;

    Ok(())
}

async fn shutdown_signal(stop: StopHandle) {
    let _ = tokio::signal::ctrl_c().await;
    stop.stop();
    info!("shutting down observer");
}

async fn latest_state(State(state): State<Arc<AppState>>) -> Json<StateEnvelope> {
    let frame = lock(&state.latest_frame).clone();
    Json(StateEnvelope {
        scenario: state.scenario_name.clone(),
        total_days: state.total_days,
        frame,
        completed: state.simulation_done.load(Ordering::SeqCst),
    })
}

#[derive(Serialize)]
struct FramesResponse {
    scenario: String,
    total_days: u32,
    completed: bool,
    frames: Vec<Frame>,
}

async fn all_frames(State(state): State<Arc<AppState>>) -> Json<FramesResponse> {
    let frames = lock(&state.frames).iter().cloned().collect();
    Json(FramesResponse {
        scenario: state.scenario_name.clone(),
        total_days: state.total_days,
        completed: state.simulation_done.load(Ordering::SeqCst),
        frames,
    })
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(payload) => Some(Ok(Event::default().data(payload))),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(2))
            .text("keep-alive"),
    )
}
