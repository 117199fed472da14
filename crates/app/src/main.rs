//! Entry point for the OBJ/MTL viewer.
//! Loads every configured model through the resource cache and composes
//! frames until they are all on screen.

mod config;
mod scene;

use std::path::PathBuf;

use anyhow::Result;
use asset::ModelLoader;

use crate::{
    config::ViewerConfig,
    scene::{ModelCache, Viewer},
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ViewerConfig::from_args(std::env::args().skip(1));
    log::info!(
        "Starting objview. models={:?}, scale={}, preload={}",
        config.models,
        config.scale,
        config.preload
    );

    let loader = ModelLoader::with_scale(config.scale);
    let cache = ModelCache::new(move |stem: &PathBuf| loader.load(stem));

    let mut viewer = Viewer::new(cache, config.models);
    if config.preload {
        viewer.preload();
    }
    let models = viewer.run()?;

    log::info!(
        "{} model(s) on screen after {} frame(s) and {} load(s). Bye!",
        models.len(),
        viewer.frames(),
        viewer.cache().loads_started()
    );
    Ok(())
}
