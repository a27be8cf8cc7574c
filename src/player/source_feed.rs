use crate::core::psmf::{self, SECTOR_LENGTH};
use crate::core::{PlayerError, Result};
use crate::player::storage::MediaStorage;
use log::{debug, info};

/// 容器文件数据源 - 加载后不可变的字节快照 + 单调递增的读游标
pub struct SourceFeed {
    path: String,
    data: Vec<u8>,
    cursor: usize,
}

impl SourceFeed {
    /// 从存储层加载文件（从 offset 开始的剩余部分）
    ///
    /// use_header_length 为 true 时，若头部扇区带有 PSMF 魔数，
    /// 长度取 streamSize + streamOffset 而不是文件自身长度。
    /// 有些文件头部记录的大小不正确：固件在 SetPsmf 入口忽略它，在 SetPsmfOffset 入口却采用它
    pub fn load(storage: &dyn MediaStorage, path: &str, offset: u32, use_header_length: bool) -> Result<Self> {
        info!("📂 加载 PSMF 文件 '{}'", path);

        let mut input = storage.open(path)?;
        input.seek_to(offset as u64)?;

        let available = input.length()?.saturating_sub(offset as u64);
        let mut length = available;
        if use_header_length {
            let mut header = vec![0u8; SECTOR_LENGTH];
            input.read_exact_into(&mut header)?;
            if let Some(header_length) = psmf::header_length(&header) {
                debug!("PSMF 头部长度 0x{:X}（文件长度 0x{:X}）", header_length, available);
                length = header_length;
            }
        }

        // 头部声明的长度超过文件实际内容时无法读满
        if length > available {
            return Err(PlayerError::IoError(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("'{}' 声明长度 0x{:X} 超过实际长度 0x{:X}", path, length, available),
            )));
        }

        let size = usize::try_from(length).map_err(|_| allocation_failed(length))?;
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| allocation_failed(length))?;
        data.resize(size, 0);

        input.seek_to(offset as u64)?;
        input.read_exact_into(&mut data)?;

        Ok(Self {
            path: path.to_string(),
            data,
            cursor: 0,
        })
    }

    pub fn from_bytes(path: &str, data: Vec<u8>) -> Self {
        Self {
            path: path.to_string(),
            data,
            cursor: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// 定位到首个数据包（容器分析之后）
    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor.min(self.data.len());
    }

    pub fn unread_bytes(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.unread_bytes() == 0
    }

    /// 游标处最多 max_len 字节（不移动游标）
    pub fn peek(&self, max_len: usize) -> &[u8] {
        let end = self.cursor + max_len.min(self.unread_bytes());
        &self.data[self.cursor..end]
    }

    pub fn advance(&mut self, len: usize) {
        self.cursor = (self.cursor + len).min(self.data.len());
    }
}

fn allocation_failed(length: u64) -> PlayerError {
    PlayerError::AllocationFailed {
        name: "SourceFeed".to_string(),
        size: u32::try_from(length).unwrap_or(u32::MAX),
    }
}
