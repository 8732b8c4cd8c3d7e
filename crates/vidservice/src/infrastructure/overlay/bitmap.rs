//! File-backed overlay assets.
//!
//! HUD pictures are mapped read-only rather than read into a buffer; the
//! compositor copies straight from the page cache into display memory.

use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;
use tracing::trace;

use crate::application::overlay::AssetStore;

/// Loads overlay assets by memory-mapping the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappedAssetStore;

impl MappedAssetStore {
    pub fn new() -> Self {
        Self
    }
}

impl AssetStore for MappedAssetStore {
    type Asset = Mmap;

    fn load(&self, path: &Path) -> io::Result<Mmap> {
        let file = File::open(path)?;
        // SAFETY: HUD assets live on a read-only boot partition and are not
        // modified while mapped.
        let map = unsafe { Mmap::map(&file)? };
        trace!(path = %path.display(), len = map.len(), "overlay asset mapped");
        Ok(map)
    }
}
