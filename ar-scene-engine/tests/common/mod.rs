#![allow(dead_code)]

use std::time::Duration;

use ar_scene_engine::config::ArSceneConfig;
use ar_scene_engine::engine::renderable::{PrimitiveRenderableBuilder, RenderableBuilder};
use ar_scene_engine::engine::scene_graph::ArScene;
use ar_scene_engine::rpc::channel::RpcChannel;
use ar_scene_engine::sim::{SimHandle, SimulatedSession, SolidColorCapture};
use ar_scene_engine::{ArScenePlugin, create_headless_app};
use bevy::prelude::*;
use serde_json::{Value, json};

const MAX_UPDATES: usize = 500;

/// Headless app plus the host-side ends of its channel and simulated session.
pub struct Harness {
    pub app: App,
    pub channel: RpcChannel,
    pub sim: SimHandle,
    pub messages: Vec<Value>,
    next_id: u64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(default_config())
    }

    pub fn with_config(config: ArSceneConfig) -> Self {
        Self::build(config, None::<PrimitiveRenderableBuilder>)
    }

    pub fn with_builder(builder: impl RenderableBuilder) -> Self {
        Self::build(default_config(), Some(builder))
    }

    fn build<B: RenderableBuilder>(config: ArSceneConfig, builder: Option<B>) -> Self {
        let session = SimulatedSession::new();
        let sim = session.handle();
        let channel = RpcChannel::new();
        let mut plugin = ArScenePlugin::new(session, SolidColorCapture::new(4, 4, [0, 0, 0, 255]))
            .with_config(config)
            .with_channel(channel.clone());
        if let Some(builder) = builder {
            plugin = plugin.with_renderable_builder(builder);
        }
        let app = create_headless_app(plugin);
        Self {
            app,
            channel,
            sim,
            messages: Vec::new(),
            next_id: 1,
        }
    }

    /// Queue a request without waiting; returns its id.
    pub fn send(&mut self, method: &str, params: Value) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.channel.submit(
            json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": id }).to_string(),
        );
        id
    }

    pub fn update(&mut self) {
        self.app.update();
        for raw in self.channel.drain_outbound() {
            self.messages
                .push(serde_json::from_str(&raw).expect("outbound message is JSON"));
        }
    }

    /// Update until the response to `id` has been flushed.
    pub fn wait_for(&mut self, id: u64) -> Value {
        for _ in 0..MAX_UPDATES {
            if let Some(response) = self.response(id) {
                return response;
            }
            self.update();
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("no response to request {id}");
    }

    /// Send a request and wait for its response.
    pub fn call(&mut self, method: &str, params: Value) -> Value {
        let id = self.send(method, params);
        self.wait_for(id)
    }

    pub fn response(&self, id: u64) -> Option<Value> {
        self.messages
            .iter()
            .find(|message| message.get("id") == Some(&json!(id)))
            .cloned()
    }

    pub fn notifications(&self, method: &str) -> Vec<Value> {
        self.messages
            .iter()
            .filter(|message| message.get("id").is_none() && message["method"] == method)
            .map(|message| message["params"].clone())
            .collect()
    }

    pub fn resume(&mut self) {
        let response = self.call("resume", Value::Null);
        assert!(response["error"].is_null(), "resume failed: {response}");
        // One more frame so the first tracking frame has been sampled.
        self.update();
    }

    pub fn entity(&self, name: &str) -> Option<Entity> {
        self.app.world().resource::<ArScene>().get(name)
    }

    pub fn get<C: Component>(&self, entity: Entity) -> Option<&C> {
        self.app.world().get::<C>(entity)
    }

    pub fn parent_of(&self, entity: Entity) -> Option<Entity> {
        self.get::<ChildOf>(entity).map(ChildOf::parent)
    }
}

pub fn default_config() -> ArSceneConfig {
    ArSceneConfig {
        enable_tap_recognizer: true,
        enable_update_listener: true,
        ..ArSceneConfig::default()
    }
}

pub fn error_code(response: &Value) -> Option<i64> {
    response["error"]["code"].as_i64()
}

pub fn sphere(name: &str) -> Value {
    json!({
        "name": name,
        "shape": { "dartType": "ArCoreSphere", "radius": 0.1 },
    })
}
