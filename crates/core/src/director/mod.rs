use std::{collections::BTreeMap, sync::Arc};

use crate::{
    client::DeviceClient,
    config::{AppConfig, EngineSettings},
    engine::{Scene, SceneHandle, SceneState},
    scenes::SceneConfig,
};

/// Keeps named scenes running against one shared device client.
///
/// Scenes are independent: two scenes addressing the same light simply race.
pub struct SceneDirector {
    client: Arc<dyn DeviceClient>,
    settings: EngineSettings,
    scenes: BTreeMap<String, SceneHandle>,
}

impl SceneDirector {
    pub fn new(client: Arc<dyn DeviceClient>, settings: EngineSettings) -> Self {
        Self {
            client,
            settings,
            scenes: BTreeMap::new(),
        }
    }

    /// Starts every scene listed in `config`.
    pub fn from_config(client: Arc<dyn DeviceClient>, config: &AppConfig) -> Self {
        let mut director = Self::new(client, config.engine);
        for (name, scene) in &config.scenes {
            director.start(name.clone(), scene);
        }
        director
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Builds and starts a configured scene, replacing any scene already
    /// running under `name`.
    pub fn start(&mut self, name: impl Into<String>, config: &SceneConfig) -> &SceneHandle {
        self.start_scene(name, config.build())
    }

    pub fn start_scene(&mut self, name: impl Into<String>, scene: Box<dyn Scene>) -> &SceneHandle {
        let name = name.into();
        if let Some(previous) = self.scenes.remove(&name) {
            tracing::info!(scene = %name, "replacing running scene");
            previous.stop();
        }

        tracing::info!(scene = %name, kind = scene.kind(), "starting scene");
        let handle = SceneHandle::start(
            name.clone(),
            scene,
            Arc::clone(&self.client),
            self.settings,
        );
        self.scenes.entry(name).or_insert(handle)
    }

    /// Stops the named scene. Returns `false` if no such scene was known.
    pub fn stop(&mut self, name: &str) -> bool {
        match self.scenes.remove(name) {
            Some(handle) => {
                handle.stop();
                true
            }
            None => false,
        }
    }

    /// Stops every scene and waits for their tasks to exit.
    pub async fn stop_all(&mut self) {
        let handles = std::mem::take(&mut self.scenes);
        for handle in handles.values() {
            handle.stop();
        }
        for (_, handle) in handles {
            handle.stopped().await;
        }
    }

    /// Names of scenes that have not stopped.
    pub fn running(&self) -> Vec<&str> {
        self.scenes
            .values()
            .filter(|handle| handle.state() != SceneState::Stopped)
            .map(SceneHandle::name)
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&SceneHandle> {
        self.scenes.get(name)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

impl std::fmt::Debug for SceneDirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneDirector")
            .field("settings", &self.settings)
            .field("scenes", &self.scenes)
            .finish()
    }
}
