pub mod audio;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod scheduler;
pub mod state;

use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{mpsc, watch},
    time::{Instant, MissedTickBehavior},
};

use audio::{engine::OutputEngine, mic_input::MicInput, ChannelId};
use commands::StudioCommand;
use config::StudioConfig;
use error::StudioError;
use gateway::{PlaybackSnapshot, PlaybackSync, RestStore};
use state::{Studio, StudioEvent};

/// Headless studio: NDJSON commands on stdin, replies and events on stdout.
pub fn run() -> Result<(), StudioError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let config = StudioConfig::load(&args)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(drive(config))
}

async fn drive(config: StudioConfig) -> Result<(), StudioError> {
    // ── Audio ────────────────────────────────────────────────────────────────
    let engine = OutputEngine::new(&config.output)?;
    let mut studio = Studio::new(config.clone(), engine.clone());
    if let Some(analyser) = engine.take_analyser(ChannelId::Music) {
        studio.set_analyser(Box::new(analyser));
    }
    if config.mic.enabled {
        let mic = MicInput::new();
        match mic.start(&config.mic) {
            Ok(()) => studio.attach_mic(mic),
            // Non-fatal: no mic ducking, no recording
            Err(e) => log::warn!("Microphone unavailable: {e}"),
        }
    }

    // ── Backend ──────────────────────────────────────────────────────────────
    let store = if config.backend.is_configured() {
        Some(RestStore::new(config.backend.clone())?)
    } else {
        log::warn!("No backend configured; catalog is empty and playback sync is off");
        None
    };
    if let Some(store) = &store {
        if let Err(e) = reload_catalog(store, &mut studio).await {
            log::warn!("Initial catalog fetch failed (continuing): {e}");
        }
    }
    let sync_tx = store.clone().map(spawn_sync);

    // ── Main loop ────────────────────────────────────────────────────────────
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(64);
    tokio::spawn(read_commands(cmd_tx));

    let mut ticker = tokio::time::interval(config.scheduler.tick());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_tick = Instant::now();
    log::info!("Studio ready (tick {:?})", config.scheduler.tick());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let out = studio.tick(now - last_tick);
                last_tick = now;
                emit_events(&out.events);
                if let (Some(tx), Some(snap)) = (&sync_tx, out.sync) {
                    tx.send_replace(Some(snap));
                }
            }
            line = cmd_rx.recv() => {
                let Some(line) = line else {
                    log::info!("stdin closed; shutting down");
                    break;
                };
                let reply = handle_line(&mut studio, store.as_ref(), &line).await;
                print_reply(reply);
                emit_events(&studio.take_events());
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted; shutting down");
                break;
            }
        }
    }

    if studio.is_recording() {
        studio.stop_recording();
    }
    engine.shutdown();
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

async fn reload_catalog(store: &RestStore, studio: &mut Studio<OutputEngine>) -> Result<usize, StudioError> {
    let tracks = store.fetch_tracks().await?;
    let count = tracks.len();
    studio.set_catalog(tracks);
    Ok(count)
}

async fn handle_line(studio: &mut Studio<OutputEngine>, store: Option<&RestStore>, line: &str) -> Result<Value, String> {
    match StudioCommand::parse(line)? {
        StudioCommand::ReloadCatalog => {
            let store = store.ok_or("No backend configured")?;
            let count = reload_catalog(store, studio).await.map_err(|e| e.to_string())?;
            Ok(json!({ "tracks": count }))
        }
        command => commands::apply(studio, command),
    }
}

/// Writer task for the playback row. The watch channel only ever holds the
/// newest snapshot, so a slow or dead backend never builds a backlog.
fn spawn_sync(store: RestStore) -> watch::Sender<Option<PlaybackSnapshot>> {
    let (tx, mut rx) = watch::channel(None);
    tokio::spawn(async move {
        let mut sync = PlaybackSync::new();
        while rx.changed().await.is_ok() {
            let latest = rx.borrow_and_update().clone();
            if let Some(snap) = latest {
                sync.push(&store, snap).await;
            }
        }
    });
    tx
}

async fn read_commands(tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::error!("stdin read failed: {e}");
                break;
            }
        }
    }
}

fn print_reply(reply: Result<Value, String>) {
    let line = match reply {
        Ok(data) => json!({ "kind": "reply", "ok": true, "data": data }),
        Err(error) => json!({ "kind": "reply", "ok": false, "error": error }),
    };
    println!("{line}");
}

fn emit_events(events: &[StudioEvent]) {
    for event in events {
        println!("{}", json!({ "kind": "event", "event": event }));
    }
}
