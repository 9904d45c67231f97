use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use asset_core::GameProfile;
use harvest_logging::{harvest_info, harvest_warn};

use crate::providers::slugify;

/// Source of per-game guardrail profiles. A missing profile means "no checks".
pub trait ProfileLoader: Send + Sync {
    fn load(&self, subject_title: &str) -> Option<GameProfile>;
}

/// In-memory profiles keyed by title slug.
#[derive(Debug, Clone, Default)]
pub struct StaticProfileLoader {
    profiles: HashMap<String, GameProfile>,
}

impl StaticProfileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, subject_title: &str, profile: GameProfile) -> Self {
        self.profiles.insert(slugify(subject_title), profile);
        self
    }
}

impl ProfileLoader for StaticProfileLoader {
    fn load(&self, subject_title: &str) -> Option<GameProfile> {
        self.profiles.get(&slugify(subject_title)).cloned()
    }
}

/// Reads `<dir>/<slug>.ron`.
#[derive(Debug, Clone)]
pub struct DirectoryProfileLoader {
    dir: PathBuf,
}

impl DirectoryProfileLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn profile_path(&self, subject_title: &str) -> PathBuf {
        self.dir.join(format!("{}.ron", slugify(subject_title)))
    }
}

impl ProfileLoader for DirectoryProfileLoader {
    fn load(&self, subject_title: &str) -> Option<GameProfile> {
        let path = self.profile_path(subject_title);
        read_profile(&path)
    }
}

fn read_profile(path: &Path) -> Option<GameProfile> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            harvest_warn!("Failed to read game profile {:?}: {}", path, err);
            return None;
        }
    };
    match ron::from_str::<GameProfile>(&content) {
        Ok(profile) => {
            harvest_info!("Loaded game profile from {:?}", path);
            Some(profile)
        }
        Err(err) => {
            harvest_warn!("Failed to parse game profile {:?}: {}", path, err);
            None
        }
    }
}
