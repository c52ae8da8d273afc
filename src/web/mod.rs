//! JSON/SSE feed of a running simulation.

use std::{
    convert::Infallible,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
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

use crate::{
    engine::{EngineBuilder, EngineSettings},
    report::{presentation_table, Grouping, PresentationRow},
    scenario::Scenario,
    world::WorldSnapshot,
};

#[derive(Clone, Serialize)]
pub struct UiFrame {
    pub snapshot: WorldSnapshot,
    pub completed: bool,
}

#[derive(Clone, Serialize)]
pub struct StateEnvelope {
    pub scenario: String,
    pub total_years: usize,
    pub frame: Option<UiFrame>,
    pub completed: bool,
}

#[derive(Clone)]
struct AppState {
    broadcaster: broadcast::Sender<String>,
    latest_frame: Arc<Mutex<Option<UiFrame>>>,
    frames: Arc<Mutex<Vec<UiFrame>>>,
    table: Arc<Mutex<Vec<PresentationRow>>>,
    total_years: usize,
    scenario_name: String,
    simulation_done: Arc<AtomicBool>,
}

pub struct WebServerConfig {
    pub scenario: Scenario,
    pub years: usize,
    pub snapshot_interval: usize,
    pub snapshot_dir: PathBuf,
    pub grouping: Grouping,
    pub host: String,
    pub port: u16,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub async fn run(config: WebServerConfig) -> Result<()> {
    let WebServerConfig {
        scenario,
        years,
        snapshot_interval,
        snapshot_dir,
        grouping,
        host,
        port,
    } = config;

    let scenario_name = scenario.name.clone();
    let mut world = scenario.build_world(years)?;
    let settings = EngineSettings {
        scenario_name: scenario_name.clone(),
        snapshot_interval_years: snapshot_interval,
        snapshot_dir,
    };
    let mut engine = EngineBuilder::new(settings)
        .with_standard_systems(scenario.policy)
        .build();

    let (tx, _) = broadcast::channel::<String>(512);
    let state = Arc::new(AppState {
        broadcaster: tx.clone(),
        latest_frame: Arc::new(Mutex::new(None)),
        frames: Arc::new(Mutex::new(Vec::new())),
        table: Arc::new(Mutex::new(Vec::new())),
        total_years: years,
        scenario_name: scenario_name.clone(),
        simulation_done: Arc::new(AtomicBool::new(false)),
    });

    let sim_state = state.clone();
    let sim_handle = tokio::task::spawn_blocking(move || -> Result<()> {
        let publish = |frame: UiFrame| {
            *lock(&sim_state.latest_frame) = Some(frame.clone());
            if let Ok(payload) = serde_json::to_string(&frame) {
                let _ = sim_state.broadcaster.send(payload);
            }
        };

        engine.run_with_hook(&mut world, years, |snapshot| {
            let frame = UiFrame {
                snapshot,
                completed: false,
            };
            lock(&sim_state.frames).push(frame.clone());
            publish(frame);
        })?;

        *lock(&sim_state.table) = presentation_table(&world, grouping);
        sim_state.simulation_done.store(true, Ordering::SeqCst);

        let final_frame = lock(&sim_state.latest_frame).clone();
        if let Some(mut frame) = final_frame {
            frame.completed = true;
            if let Some(last) = lock(&sim_state.frames).last_mut() {
                *last = frame.clone();
            }
            publish(frame);
        }
        Ok(())
    });

    let label = scenario_name.clone();
    tokio::spawn(async move {
        match sim_handle.await {
            Ok(Ok(())) => tracing::info!(scenario = %label, "simulation completed"),
            Ok(Err(err)) => tracing::error!(scenario = %label, error = ?err, "simulation error"),
            Err(err) => tracing::error!(scenario = %label, error = ?err, "simulation task failed"),
        }
    });

    let router = Router::new()
        .route("/api/state", get(latest_state))
        .route("/api/frames", get(all_frames))
        .route("/api/table", get(table))
        .route("/api/events", get(stream_events))
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    tracing::info!(%addr, scenario = %scenario_name, "serving simulation feed");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down simulation feed");
}

async fn latest_state(State(state): State<Arc<AppState>>) -> Json<StateEnvelope> {
    let frame = lock(&state.latest_frame).clone();
    Json(StateEnvelope {
        scenario: state.scenario_name.clone(),
        total_years: state.total_years,
        frame,
        completed: state.simulation_done.load(Ordering::SeqCst),
    })
}

#[derive(Serialize)]
struct FramesResponse {
    scenario: String,
    total_years: usize,
    completed: bool,
    frames: Vec<UiFrame>,
}

async fn all_frames(State(state): State<Arc<AppState>>) -> Json<FramesResponse> {
    let frames = lock(&state.frames).clone();
    Json(FramesResponse {
        scenario: state.scenario_name.clone(),
        total_years: state.total_years,
        completed: state.simulation_done.load(Ordering::SeqCst),
        frames,
    })
}

#[derive(Serialize)]
struct TableResponse {
    scenario: String,
    completed: bool,
    rows: Vec<PresentationRow>,
}

async fn table(State(state): State<Arc<AppState>>) -> Json<TableResponse> {
    Json(TableResponse {
        scenario: state.scenario_name.clone(),
        completed: state.simulation_done.load(Ordering::SeqCst),
        rows: lock(&state.table).clone(),
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
