//! Overlay asset cache.
//!
//! Assets are resolved by name to `{dir}/{name}.png` across an ordered list
//! of directories, decoded once and kept for the life of the cache. Lookups
//! that find nothing are not remembered, so a file dropped in later is
//! picked up on the next request.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use image::DynamicImage;
use tracing::{debug, info, warn};

use facefx_models::is_valid_asset_name;

use crate::config::MediaConfig;
use crate::imaging;
use crate::metrics;

/// A decoded overlay image.
#[derive(Debug, Clone)]
pub struct OverlayAsset {
    name: String,
    path: PathBuf,
    image: DynamicImage,
}

impl OverlayAsset {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the asset was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Width over height.
    pub fn aspect_ratio(&self) -> f64 {
        self.image.width() as f64 / self.image.height().max(1) as f64
    }

    pub fn has_alpha(&self) -> bool {
        self.image.color().has_alpha()
    }
}

/// Name-keyed cache of decoded overlay assets.
pub struct AssetCache {
    search_dirs: Vec<PathBuf>,
    assets: RwLock<HashMap<String, Arc<OverlayAsset>>>,
}

impl AssetCache {
    /// Cache probing `search_dirs` in order.
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs,
            assets: RwLock::new(HashMap::new()),
        }
    }

    /// Cache over the configured override and fallback sticker directories.
    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(config.sticker_search_dirs())
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Number of cached assets.
    pub fn len(&self) -> usize {
        self.assets.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an asset, loading it on first use.
    ///
    /// `None` covers every reason the asset cannot be used: an unsafe name,
    /// no matching file, an undecodable file, or a channel layout other than
    /// RGB/RGBA.
    pub fn resolve(&self, name: &str) -> Option<Arc<OverlayAsset>> {
        if !is_valid_asset_name(name) {
            warn!(name = %name, "Rejected overlay asset name");
            metrics::record_asset_lookup("rejected");
            return None;
        }

        if let Some(asset) = self
            .assets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            metrics::record_asset_lookup("hit");
            return Some(Arc::clone(asset));
        }

        // Loaded without holding the lock
        let Some(loaded) = self.load(name) else {
            metrics::record_asset_lookup("miss");
            return None;
        };

        let mut assets = self.assets.write().unwrap_or_else(|e| e.into_inner());
        // A concurrent caller may have loaded it first; keep the cached instance
        let asset = assets
            .entry(name.to_string())
            .or_insert_with(|| {
                metrics::record_asset_lookup("load");
                Arc::new(loaded)
            });
        Some(Arc::clone(asset))
    }

    fn load(&self, name: &str) -> Option<OverlayAsset> {
        let file_name = format!("{name}.png");
        for dir in &self.search_dirs {
            let path = dir.join(&file_name);
            if !path.is_file() {
                continue;
            }

            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Overlay asset unreadable, trying next directory");
                    continue;
                }
            };

            let image = match imaging::decode(&bytes) {
                Ok(image) => image,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Overlay asset undecodable, trying next directory");
                    continue;
                }
            };

            let channels = image.color().channel_count();
            if !(3..=4).contains(&channels) {
                warn!(
                    path = %path.display(),
                    channels = channels,
                    "Overlay asset must be RGB or RGBA, treating as absent"
                );
                return None;
            }

            info!(
                name = %name,
                path = %path.display(),
                width = image.width(),
                height = image.height(),
                "Loaded overlay asset"
            );
            return Some(OverlayAsset {
                name: name.to_string(),
                path,
                image,
            });
        }

        debug!(name = %name, dirs = self.search_dirs.len(), "Overlay asset not found");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_rgba(dir: &Path, name: &str, color: [u8; 4]) -> PathBuf {
        let path = dir.join(format!("{name}.png"));
        RgbaImage::from_pixel(6, 3, Rgba(color)).save(&path).unwrap();
        path
    }

    #[test]
    fn test_resolve_and_cache() {
        let dir = TempDir::new().unwrap();
        let path = write_rgba(dir.path(), "crown", [255, 200, 0, 255]);
        let cache = AssetCache::new(vec![dir.path().to_path_buf()]);

        let first = cache.resolve("crown").unwrap();
        assert_eq!(first.dimensions(), (6, 3));
        assert!(first.has_alpha());
        assert_eq!(first.aspect_ratio(), 2.0);

        // A hit never goes back to disk
        std::fs::remove_file(&path).unwrap();
        let second = cache.resolve("crown").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_miss_does_not_take_the_write_lock() {
        let dir = TempDir::new().unwrap();
        let cache = AssetCache::new(vec![dir.path().to_path_buf()]);

        // With readers active, an unknown name must still resolve promptly
        let _reader = cache.assets.read().unwrap();
        assert!(cache.resolve("halo").is_none());
    }

    #[test]
    fn test_concurrent_loads_share_one_instance() {
        let dir = TempDir::new().unwrap();
        write_rgba(dir.path(), "crown", [255, 200, 0, 255]);
        let cache = Arc::new(AssetCache::new(vec![dir.path().to_path_buf()]));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.resolve("crown").unwrap())
            })
            .collect();
        let assets: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(cache.len(), 1);
        let cached = cache.resolve("crown").unwrap();
        assert!(assets.iter().all(|a| Arc::ptr_eq(a, &cached)));
    }

    #[test]
    fn test_override_dir_wins() {
        let override_dir = TempDir::new().unwrap();
        let builtin = TempDir::new().unwrap();
        write_rgba(override_dir.path(), "crown", [1, 1, 1, 255]);
        write_rgba(builtin.path(), "crown", [2, 2, 2, 255]);

        let cache = AssetCache::new(vec![
            override_dir.path().to_path_buf(),
            builtin.path().to_path_buf(),
        ]);
        let asset = cache.resolve("crown").unwrap();
        assert!(asset.path().starts_with(override_dir.path()));
    }

    #[test]
    fn test_falls_through_to_later_dir() {
        let empty = TempDir::new().unwrap();
        let builtin = TempDir::new().unwrap();
        write_rgba(builtin.path(), "glasses", [0, 0, 0, 128]);

        let cache = AssetCache::new(vec![empty.path().to_path_buf(), builtin.path().to_path_buf()]);
        assert!(cache.resolve("glasses").is_some());
    }

    #[test]
    fn test_missing_is_absent_and_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = AssetCache::new(vec![dir.path().to_path_buf()]);
        assert!(cache.resolve("halo").is_none());
        assert!(cache.is_empty());

        write_rgba(dir.path(), "halo", [9, 9, 9, 255]);
        assert!(cache.resolve("halo").is_some());
    }

    #[test]
    fn test_grayscale_is_absent() {
        let dir = TempDir::new().unwrap();
        GrayImage::from_pixel(4, 4, Luma([128]))
            .save(dir.path().join("mono.png"))
            .unwrap();
        let cache = AssetCache::new(vec![dir.path().to_path_buf()]);
        assert!(cache.resolve("mono").is_none());
    }

    #[test]
    fn test_unsafe_names_never_touch_disk() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("inner");
        std::fs::create_dir(&nested).unwrap();
        write_rgba(dir.path(), "secret", [0, 0, 0, 255]);

        let cache = AssetCache::new(vec![nested]);
        assert!(cache.resolve("../secret").is_none());
        assert!(cache.resolve("").is_none());
        assert!(cache.resolve(&"a".repeat(65)).is_none());
    }
}
