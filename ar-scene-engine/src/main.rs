use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ar_scene_engine::config::ArSceneConfig;
use ar_scene_engine::engine::capture::ScreenCapture;
use ar_scene_engine::engine::node_factory::NodeBuilds;
use ar_scene_engine::engine::reconcile::PlaneVisualization;
use ar_scene_engine::rpc::channel::RpcChannel;
use ar_scene_engine::sim::{SimulatedSession, SolidColorCapture};
use ar_scene_engine::{ArScenePlugin, create_headless_app_with};
use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const CAPTURE_SIZE: (u32, u32) = (640, 480);

/// Host side of the stdio bridge.
#[derive(Resource)]
struct StdioBridge {
    channel: RpcChannel,
    stdin_closed: Arc<AtomicBool>,
}

fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };
    create_app(config).run();
}

/// Optional JSON config file as the first argument.
fn load_config() -> Result<ArSceneConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => Ok(ArSceneConfig::from_json_str(&std::fs::read_to_string(path)?)?),
        None => Ok(ArSceneConfig::default()),
    }
}

/// Headless scene core speaking JSON-RPC over stdin/stdout against a
/// simulated tracking session.
fn create_app(config: ArSceneConfig) -> App {
    let channel = RpcChannel::new();
    let stdin_closed = Arc::new(AtomicBool::new(false));
    spawn_stdin_reader(channel.clone(), stdin_closed.clone());

    let (width, height) = CAPTURE_SIZE;
    let plugin = ArScenePlugin::new(
        SimulatedSession::new(),
        SolidColorCapture::new(width, height, [32, 32, 32, 255]),
    )
    .with_config(config)
    .with_channel(channel.clone());

    let mut app = create_headless_app_with(
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(FRAME_INTERVAL)),
        plugin,
    );
    app.add_plugins(LogPlugin::default())
        .insert_resource(StdioBridge {
            channel,
            stdin_closed,
        })
        .add_systems(Startup, spawn_plane_visualization)
        .add_systems(Last, forward_outbound);
    app
}

fn spawn_stdin_reader(channel: RpcChannel, closed: Arc<AtomicBool>) {
    let spawned = std::thread::Builder::new()
        .name("stdin-rpc".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => channel.submit(line),
                    Err(_) => break,
                }
            }
            closed.store(true, Ordering::Release);
        });
    if let Err(e) = spawned {
        eprintln!("Failed to start stdin reader: {e}");
    }
}

fn spawn_plane_visualization(mut commands: Commands) {
    commands.spawn((
        Name::new("plane_visualization"),
        PlaneVisualization,
        Transform::default(),
        Visibility::default(),
    ));
}

/// Print every outbound message; exit once stdin is closed and no build or
/// capture is still owed a response.
fn forward_outbound(
    bridge: Res<StdioBridge>,
    builds: Res<NodeBuilds>,
    capture: Res<ScreenCapture>,
    mut exit: EventWriter<AppExit>,
) {
    let messages = bridge.channel.drain_outbound();
    if !messages.is_empty() {
        let mut stdout = std::io::stdout().lock();
        for message in messages {
            if let Err(e) = writeln!(stdout, "{message}") {
                error!("Failed to write to stdout: {}", e);
            }
        }
        let _ = stdout.flush();
    }

    let settled = builds.pending_count() == 0 && capture.in_flight() == 0;
    if settled && bridge.stdin_closed.load(Ordering::Acquire) {
        info!("stdin closed, shutting down");
        exit.write(AppExit::Success);
    }
}
