use anyhow::Context;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Named blob persistence. Block layout and wear levelling belong to the implementation.
pub trait Storage {
    fn save(&mut self, name: &str, data: &[u8]) -> anyhow::Result<()>;
    /// Replaces the contents of `data` with the blob.
    fn load(&mut self, name: &str, data: &mut Vec<u8>) -> anyhow::Result<()>;
}

/// One file per blob under a base directory.
pub struct FileStorage {
    base: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(base: P) -> anyhow::Result<Self> {
        let base = base.as_ref().to_path_buf();
        std::fs::create_dir_all(&base)
            .with_context(|| format!("Failed to create {}", base.display()))?;
        Ok(FileStorage { base })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.base.join(name.trim_start_matches('/'))
    }
}

impl Storage for FileStorage {
    fn save(&mut self, name: &str, data: &[u8]) -> anyhow::Result<()> {
        let path = self.path(name);
        let mut file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        file.write_all(data)?;
        file.flush()?;
        log::debug!("Saved {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    fn load(&mut self, name: &str, data: &mut Vec<u8>) -> anyhow::Result<()> {
        let path = self.path(name);
        let mut file = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        data.clear();
        file.read_to_end(data)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blobs.contains_key(name)
    }
}

impl Storage for MemoryStorage {
    fn save(&mut self, name: &str, data: &[u8]) -> anyhow::Result<()> {
        self.blobs.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn load(&mut self, name: &str, data: &mut Vec<u8>) -> anyhow::Result<()> {
        let blob = self
            .blobs
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("No blob named {}", name))?;
        data.clear();
        data.extend_from_slice(blob);
        Ok(())
    }
}
