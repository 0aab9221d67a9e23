//! Command-driven AR scene core.
//!
//! A remote declarative UI drives a live AR scene over JSON-RPC: it adds and
//! removes nodes, anchors them to tracked poses, enables gestures on them and
//! receives tracking events back. Rendering and tracking stay external; this
//! crate is the synchronisation layer between them, built as a Bevy plugin.
//!
//! ```rust,ignore
//! let channel = RpcChannel::new();
//! let mut app = App::new();
//! app.add_plugins((DefaultPlugins, ArScenePlugin::new(session, capture).with_channel(channel.clone())));
//! channel.submit(r#"{"jsonrpc":"2.0","method":"resume","id":1}"#);
//! ```

use std::sync::Mutex;

use bevy::app::Plugins;
use bevy::prelude::*;

pub mod config;
pub mod engine;
pub mod error;
pub mod rpc;
pub mod sim;
pub mod tools;

use config::ArSceneConfig;
use engine::anchors::{release_anchor_on_remove, sync_anchor_poses};
use engine::capture::{FrameCapture, ScreenCapture, apply_capture_commands, collect_captures};
use engine::lifecycle::{SessionFailed, SessionLifecycle, apply_session_commands, session_running};
use engine::node_factory::{NodeBuilds, finish_node_builds};
use engine::reconcile::{
    FaceBindingEvent, FaceResources, apply_face_commands, reconcile_faces, reconcile_planes,
    sync_plane_visualization,
};
use engine::renderable::{RenderableBuilder, RenderableFactory};
use engine::scene_graph::{ArScene, apply_node_commands, forget_removed_node};
use engine::session::{ArSession, CurrentFrame, TrackingSession, acquire_frame, camera_is_tracking};
use engine::spin::spin_nodes;
use rpc::channel::{RpcChannel, RpcPlugin};
use tools::gestures::GesturesPlugin;

/// Ordered stages of one update. Chained, so each stage sees the previous
/// stage's commands applied.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArSceneSet {
    Ingest,
    Session,
    Commands,
    Builds,
    Interaction,
    Reconcile,
    Flush,
}

/// Installs the scene core on an app that already provides asset storage
/// for meshes, materials and images.
pub struct ArScenePlugin {
    pub config: ArSceneConfig,
    pub channel: RpcChannel,
    pub renderables: RenderableFactory,
    backends: Mutex<Option<(ArSession, ScreenCapture)>>,
}

impl ArScenePlugin {
    pub fn new(session: impl TrackingSession, capture: impl FrameCapture) -> Self {
        Self {
            config: ArSceneConfig::default(),
            channel: RpcChannel::new(),
            renderables: RenderableFactory::default(),
            backends: Mutex::new(Some((ArSession::new(session), ScreenCapture::new(capture)))),
        }
    }

    pub fn with_config(mut self, config: ArSceneConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_channel(mut self, channel: RpcChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_renderable_builder(mut self, builder: impl RenderableBuilder) -> Self {
        self.renderables = RenderableFactory(std::sync::Arc::new(builder));
        self
    }
}

impl Plugin for ArScenePlugin {
    fn build(&self, app: &mut App) {
        let backends = self
            .backends
            .lock()
            .ok()
            .and_then(|mut backends| backends.take());
        let Some((session, capture)) = backends else {
            error!("ArScenePlugin backends already taken; plugin built twice?");
            return;
        };

        app.insert_resource(self.config.clone())
            .insert_resource(self.renderables.clone())
            .insert_resource(session)
            .insert_resource(capture)
            .init_resource::<SessionLifecycle>()
            .init_resource::<CurrentFrame>()
            .init_resource::<ArScene>()
            .init_resource::<NodeBuilds>()
            .init_resource::<FaceResources>()
            .add_event::<SessionFailed>()
            .add_event::<FaceBindingEvent>()
            .add_plugins((
                RpcPlugin {
                    channel: self.channel.clone(),
                },
                GesturesPlugin,
            ))
            .add_observer(forget_removed_node)
            .add_observer(release_anchor_on_remove)
            .configure_sets(
                Update,
                (
                    ArSceneSet::Ingest,
                    ArSceneSet::Session,
                    ArSceneSet::Commands,
                    ArSceneSet::Builds,
                    ArSceneSet::Interaction,
                    ArSceneSet::Reconcile,
                    ArSceneSet::Flush,
                )
                    .chain(),
            )
            .add_systems(
                Update,
                (
                    apply_session_commands,
                    acquire_frame.run_if(session_running),
                )
                    .chain()
                    .in_set(ArSceneSet::Session),
            )
            .add_systems(
                Update,
                (apply_node_commands, apply_face_commands, apply_capture_commands)
                    .in_set(ArSceneSet::Commands),
            )
            .add_systems(
                Update,
                (finish_node_builds, collect_captures).in_set(ArSceneSet::Builds),
            )
            .add_systems(
                Update,
                (
                    sync_anchor_poses.run_if(session_running),
                    (reconcile_planes, reconcile_faces)
                        .run_if(session_running.and(camera_is_tracking)),
                    spin_nodes,
                    sync_plane_visualization,
                )
                    .in_set(ArSceneSet::Reconcile),
            );

        info!("AR scene core ready");
    }
}

/// Headless app with the asset storage the core needs, for hosts without a
/// renderer and for tests.
pub fn create_headless_app(plugin: ArScenePlugin) -> App {
    create_headless_app_with(MinimalPlugins, plugin)
}

/// Same as [`create_headless_app`] with a custom base plugin set, e.g.
/// `MinimalPlugins` with a configured schedule runner.
pub fn create_headless_app_with<M>(base: impl Plugins<M>, plugin: ArScenePlugin) -> App {
    let mut app = App::new();
    app.add_plugins(base)
        .add_plugins(AssetPlugin::default())
        .init_asset::<Mesh>()
        .init_asset::<StandardMaterial>()
        .init_asset::<Image>()
        .init_asset::<Scene>()
        .add_plugins(plugin);
    app
}
