//! Frame composition: every model sits behind one placeholder boundary.
//! While any of them is loading the frame shows the half-transparent
//! placeholder cube; once all have loaded the frame shows the models.

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use asset::Model;
use cache::{LoadFailure, ReadError, ResourceCache, Suspension};

pub type ModelCache = ResourceCache<PathBuf, Model>;

/// Result of one composition pass.
#[derive(Debug)]
pub enum Frame {
    /// At least one model is loading; wait on these and compose again.
    Placeholder(Vec<Suspension>),
    Models(Vec<Arc<Model>>),
}

pub struct Viewer {
    cache: ModelCache,
    models: Vec<PathBuf>,
    placeholder: Model,
    frames: usize,
}

impl Viewer {
    pub fn new(cache: ModelCache, models: Vec<PathBuf>) -> Self {
        Self {
            cache,
            models,
            placeholder: Model::placeholder(),
            frames: 0,
        }
    }

    pub fn preload(&self) {
        for stem in &self.models {
            self.cache.preload(stem);
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Reads every model. All of them are read even after the first
    /// suspension so their loads run side by side.
    pub fn compose(&self) -> Result<Frame, LoadFailure> {
        let mut ready = Vec::with_capacity(self.models.len());
        let mut waiting = Vec::new();
        for stem in &self.models {
            match self.cache.read(stem) {
                Ok(model) => ready.push(model),
                Err(ReadError::Suspended(suspension)) => waiting.push(suspension),
                Err(ReadError::Failed(failure)) => return Err(failure),
            }
        }
        if waiting.is_empty() {
            Ok(Frame::Models(ready))
        } else {
            Ok(Frame::Placeholder(waiting))
        }
    }

    /// Composes frames until every model is on screen. A failed load ends
    /// the loop with that failure.
    pub fn run(&mut self) -> Result<Vec<Arc<Model>>> {
        loop {
            self.frames += 1;
            match self.compose()? {
                Frame::Models(models) => {
                    for model in &models {
                        log_model(model);
                    }
                    log::info!(
                        "Frame {}: {} model(s) on screen",
                        self.frames,
                        models.len()
                    );
                    return Ok(models);
                }
                Frame::Placeholder(waiting) => {
                    log::info!(
                        "Frame {}: placeholder ({} triangles, opacity {}) while {} model(s) load",
                        self.frames,
                        self.placeholder.triangle_count(),
                        self.placeholder_opacity(),
                        waiting.len()
                    );
                    for suspension in waiting {
                        log::debug!("Waiting on {}", suspension.key());
                        pollster::block_on(suspension);
                    }
                }
            }
        }
    }

    fn placeholder_opacity(&self) -> f32 {
        self.placeholder
            .parts
            .first()
            .map_or(1.0, |part| part.material.opacity)
    }
}

fn log_model(model: &Model) {
    match model.world_bounds() {
        Some((lo, hi)) => log::info!(
            "'{}': {} triangles, {} texture(s), bounds {:?}..{:?}",
            model.name,
            model.triangle_count(),
            model.texture_count(),
            lo,
            hi
        ),
        None => log::info!("'{}': empty", model.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Mutex, mpsc};

    use asset::{mesh::MeshData, mtl::MaterialLibrary};
    use corelib::transform::Transform;

    fn cube_model(name: &str) -> Model {
        Model {
            name: name.to_string(),
            mesh: MeshData::cube(2.0),
            parts: Vec::new(),
            materials: MaterialLibrary::default(),
            transform: Transform::from_scale(0.5),
        }
    }

    fn stems(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn shows_placeholder_until_loaded() {
        let (tx, rx) = mpsc::channel::<()>();
        let gate = Mutex::new(rx);
        let cache = ModelCache::new(move |stem: &PathBuf| -> anyhow::Result<Model> {
            gate.lock().unwrap().recv()?;
            Ok(cube_model(&stem.display().to_string()))
        });
        let mut viewer = Viewer::new(cache, stems(&["a"]));

        assert!(matches!(viewer.compose(), Ok(Frame::Placeholder(w)) if w.len() == 1));
        assert!(viewer.placeholder.parts[0].material.is_transparent());
        assert_eq!(viewer.placeholder_opacity(), 0.5);

        tx.send(()).unwrap();
        let models = viewer.run().unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "a");
        assert_eq!(viewer.cache().loads_started(), 1);
        assert!(viewer.frames() >= 1);
    }

    #[test]
    fn models_keep_configured_order() {
        let cache = ModelCache::new(|stem: &PathBuf| -> anyhow::Result<Model> {
            Ok(cube_model(&stem.display().to_string()))
        });
        let mut viewer = Viewer::new(cache, stems(&["b", "a", "b"]));
        viewer.preload();

        let models = viewer.run().unwrap();
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["b", "a", "b"]);
        assert!(Arc::ptr_eq(&models[0], &models[2]));
        assert_eq!(viewer.cache().loads_started(), 2);
    }

    #[test]
    fn failed_model_reaches_the_caller() {
        let cache = ModelCache::new(|stem: &PathBuf| -> anyhow::Result<Model> {
            if stem.ends_with("broken") {
                anyhow::bail!("geometry missing");
            }
            Ok(cube_model("ok"))
        });
        let mut viewer = Viewer::new(cache, stems(&["ok", "broken"]));

        let err = viewer.run().unwrap_err();
        assert!(format!("{err:#}").contains("geometry missing"));
        assert!(matches!(viewer.compose(), Err(f) if f.key().contains("broken")));
    }
}
