use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use image::ImageReader;
use thiserror::Error;
use tracing::debug;

use crate::app::Bitmap;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to open image {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("decoded image {path} has inconsistent dimensions")]
    Dimensions { path: PathBuf },
    #[error("no image registered for {path}")]
    Missing { path: PathBuf },
}

/// Produces a decoded bitmap for a path.
pub trait AssetLoader {
    fn load_bitmap(&self, path: &Path) -> Result<Bitmap, AssetError>;
}

/// Decodes image files from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageAssetLoader;

impl AssetLoader for ImageAssetLoader {
    fn load_bitmap(&self, path: &Path) -> Result<Bitmap, AssetError> {
        decode_image(path)
    }
}

pub(crate) fn decode_image(path: &Path) -> Result<Bitmap, AssetError> {
    let reader = ImageReader::open(path).map_err(|source| AssetError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = reader.decode().map_err(|source| AssetError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let image = decoded.to_rgba8();
    let (width, height) = image.dimensions();
    Bitmap::from_rgba(width, height, image.into_raw()).ok_or_else(|| AssetError::Dimensions {
        path: path.to_path_buf(),
    })
}

/// In-memory loader, keyed by path. Handy for headless hosts and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryAssetLoader {
    bitmaps: HashMap<PathBuf, Bitmap>,
}

impl MemoryAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bitmap(mut self, path: impl Into<PathBuf>, bitmap: Bitmap) -> Self {
        self.insert(path, bitmap);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, bitmap: Bitmap) {
        self.bitmaps.insert(path.into(), bitmap);
    }
}

impl AssetLoader for MemoryAssetLoader {
    fn load_bitmap(&self, path: &Path) -> Result<Bitmap, AssetError> {
        self.bitmaps
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::Missing {
                path: path.to_path_buf(),
            })
    }
}

/// Decodes each path once and shares the bitmap between actors.
pub struct AssetCache {
    loader: Box<dyn AssetLoader>,
    bitmaps: HashMap<PathBuf, Rc<Bitmap>>,
}

impl AssetCache {
    pub fn new(loader: Box<dyn AssetLoader>) -> Self {
        Self {
            loader,
            bitmaps: HashMap::new(),
        }
    }

    pub fn bitmap(&mut self, path: &Path) -> Result<Rc<Bitmap>, AssetError> {
        if let Some(bitmap) = self.bitmaps.get(path) {
            return Ok(Rc::clone(bitmap));
        }
        let bitmap = Rc::new(self.loader.load_bitmap(path)?);
        debug!(
            path = %path.display(),
            width = bitmap.width(),
            height = bitmap.height(),
            "image_loaded"
        );
        self.bitmaps.insert(path.to_path_buf(), Rc::clone(&bitmap));
        Ok(bitmap)
    }

    pub fn len(&self) -> usize {
        self.bitmaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmaps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn decodes_png_into_top_down_rgba() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("hero.png");
        let mut image = RgbaImage::new(2, 3);
        image.put_pixel(1, 0, Rgba([10, 20, 30, 255]));
        image.save(&path).expect("save png");

        let bitmap = ImageAssetLoader.load_bitmap(&path).expect("load");
        assert_eq!((bitmap.width(), bitmap.height()), (2, 3));
        assert_eq!(bitmap.pixel(1, 0), Some([10, 20, 30, 255]));
        assert_eq!(bitmap.pixel(0, 2), Some([0, 0, 0, 0]));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let error = ImageAssetLoader
            .load_bitmap(&temp.path().join("absent.png"))
            .expect_err("must fail");
        assert!(matches!(error, AssetError::Open { .. }));
    }

    #[test]
    fn garbage_file_is_a_decode_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("broken.png");
        std::fs::write(&path, b"not an image").expect("write");
        let error = ImageAssetLoader.load_bitmap(&path).expect_err("must fail");
        assert!(matches!(error, AssetError::Decode { .. }));
    }

    #[test]
    fn cache_shares_bitmaps_per_path() {
        let loader =
            MemoryAssetLoader::new().with_bitmap("a.png", Bitmap::filled(1, 1, [1, 1, 1, 255]));
        let mut cache = AssetCache::new(Box::new(loader));
        let first = cache.bitmap(Path::new("a.png")).expect("first");
        let second = cache.bitmap(Path::new("a.png")).expect("second");
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert!(matches!(
            cache.bitmap(Path::new("b.png")),
            Err(AssetError::Missing { .. })
        ));
    }
}
