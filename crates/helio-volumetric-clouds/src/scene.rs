//! Scene lookup: how the feature finds the clouds box
//!
//! The host owns its scene; the effect only needs to look a single object up by
//! name and read its position and local scale each frame.

use glam::Vec3;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Transform of a scene object, read every frame
pub trait SceneTransform: Send + Sync {
    /// World-space position
    fn position(&self) -> Vec3;
    /// Local scale; for the clouds box this is the full box size
    fn local_scale(&self) -> Vec3;
}

/// Name-based lookup of active scene objects
pub trait SceneLookup {
    fn find(&self, name: &str) -> Option<Arc<dyn SceneTransform>>;
}

/// A movable transform shared between the scene and whoever cached it
#[derive(Debug)]
pub struct Transform {
    state: RwLock<TransformState>,
}

#[derive(Copy, Clone, Debug)]
struct TransformState {
    position: Vec3,
    scale: Vec3,
}

impl Transform {
    pub fn new(position: Vec3, scale: Vec3) -> Self {
        Self {
            state: RwLock::new(TransformState { position, scale }),
        }
    }

    pub fn set_position(&self, position: Vec3) {
        self.state.write().position = position;
    }

    pub fn set_scale(&self, scale: Vec3) {
        self.state.write().scale = scale;
    }
}

impl SceneTransform for Transform {
    fn position(&self) -> Vec3 {
        self.state.read().position
    }

    fn local_scale(&self) -> Vec3 {
        self.state.read().scale
    }
}

/// Minimal named-object scene
///
/// Enough for demos and tests; real hosts implement [`SceneLookup`] over their
/// own scene graph.
#[derive(Default)]
pub struct Scene {
    objects: HashMap<String, Arc<Transform>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an object and return its shared transform
    pub fn spawn(&mut self, name: impl Into<String>, position: Vec3, scale: Vec3) -> Arc<Transform> {
        let transform = Arc::new(Transform::new(position, scale));
        self.objects.insert(name.into(), transform.clone());
        transform
    }

    /// Remove an object; returns whether it existed
    pub fn despawn(&mut self, name: &str) -> bool {
        self.objects.remove(name).is_some()
    }

    /// Rename an object; returns whether it existed
    pub fn rename(&mut self, from: &str, to: impl Into<String>) -> bool {
        match self.objects.remove(from) {
            Some(transform) => {
                self.objects.insert(to.into(), transform);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl SceneLookup for Scene {
    fn find(&self, name: &str) -> Option<Arc<dyn SceneTransform>> {
        self.objects
            .get(name)
            .map(|t| t.clone() as Arc<dyn SceneTransform>)
    }
}
