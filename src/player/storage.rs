use crate::core::{PlayerError, Result};
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

/// 可定位的文件输入（open/seek/read-exact/length，drop 即 close）
pub trait SeekableInput: Send {
    fn seek_to(&mut self, offset: u64) -> Result<()>;

    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()>;

    fn length(&self) -> Result<u64>;
}

/// 文件/存储访问层
pub trait MediaStorage: Send + Sync {
    fn open(&self, path: &str) -> Result<Box<dyn SeekableInput>>;
}

struct FileInput {
    file: File,
}

impl SeekableInput for FileInput {
    fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn length(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// 主机目录映射（去掉 "ms0:" / "disc0:" 之类的设备前缀）
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let relative = match path.split_once(':') {
            Some((device, rest)) if !device.contains('/') => rest,
            _ => path,
        };
        self.root.join(relative.trim_start_matches('/'))
    }
}

impl MediaStorage for LocalStorage {
    fn open(&self, path: &str) -> Result<Box<dyn SeekableInput>> {
        let host_path = self.resolve(path);
        debug!("📁 打开文件 '{}' -> {}", path, host_path.display());
        let file = File::open(&host_path)?;
        Ok(Box::new(FileInput { file }))
    }
}

struct MemoryInput {
    cursor: Cursor<Arc<[u8]>>,
}

impl SeekableInput for MemoryInput {
    fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.cursor.set_position(offset);
        Ok(())
    }

    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.cursor.read_exact(buf)?;
        Ok(())
    }

    fn length(&self) -> Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }
}

/// 内存文件系统
#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, data: Vec<u8>) {
        self.files.write().insert(path.to_string(), Arc::from(data));
    }
}

impl MediaStorage for MemoryStorage {
    fn open(&self, path: &str) -> Result<Box<dyn SeekableInput>> {
        let data = self
            .files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| PlayerError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string())))?;
        Ok(Box::new(MemoryInput {
            cursor: Cursor::new(data),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_read() {
        let storage = MemoryStorage::new();
        storage.insert("ms0:/a.pmf", vec![1, 2, 3, 4]);
        let mut input = storage.open("ms0:/a.pmf").unwrap();
        assert_eq!(input.length().unwrap(), 4);
        input.seek_to(2).unwrap();
        let mut buf = [0u8; 2];
        input.read_exact_into(&mut buf).unwrap();
        assert_eq!(buf, [3, 4]);
        assert!(input.read_exact_into(&mut buf).is_err());
        assert!(storage.open("ms0:/missing.pmf").is_err());
    }

    #[test]
    fn test_local_storage_strips_device() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("PSP")).unwrap();
        std::fs::write(dir.path().join("PSP/movie.pmf"), [9u8; 16]).unwrap();
        let storage = LocalStorage::new(dir.path());
        let input = storage.open("ms0:/PSP/movie.pmf").unwrap();
        assert_eq!(input.length().unwrap(), 16);
    }
}
