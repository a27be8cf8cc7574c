use crate::core::{PlayerError, Result};
use crate::player::storage::MediaStorage;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// 地址掩码（去掉缓存/非缓存位）
pub const ADDRESS_MASK: u32 = 0x3FFF_FFFF;

/// 模拟内存（含原始内存拷贝原语）
pub trait EmulatedMemory: Send + Sync {
    fn is_address_good(&self, addr: u32) -> bool;

    fn write(&self, addr: u32, data: &[u8]) -> Result<()>;

    fn read(&self, addr: u32, len: usize) -> Result<Vec<u8>>;

    fn fill(&self, addr: u32, value: u8, len: usize) -> Result<()>;

    fn read32(&self, addr: u32) -> Result<u32> {
        let bytes = self.read(addr, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn write32(&self, addr: u32, value: u32) -> Result<()> {
        self.write(addr, &value.to_le_bytes())
    }
}

/// 内存分区
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionId {
    Kernel,
    User,
}

/// 分配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocPolicy {
    Low,
    High,
}

/// 已分配的内存块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemBlock {
    pub name: String,
    pub partition: PartitionId,
    pub addr: u32,
    pub size: u32,
}

/// 系统内存分配器
pub trait SysMemAllocator: Send + Sync {
    fn malloc(&self, partition: PartitionId, name: &str, policy: AllocPolicy, size: u32) -> Option<MemBlock>;

    fn free(&self, block: &MemBlock);
}

/// 纹理缓存（显示缓冲区作为纹理时需要失效/登记）
pub trait TextureCache: Send + Sync {
    fn reset_video_textures(&self);

    /// 登记一段不缓存的视频纹理区域 [start, end)
    fn add_video_texture(&self, start: u32, end: u32);
}

/// 线程调度器
///
/// delay_thread 只是向宿主提交一次让出请求，真正的挂起由宿主完成
pub trait ThreadScheduler: Send + Sync {
    fn delay_thread(&self, micros: u32, handle_callbacks: bool);
}

/// 会话依赖的宿主服务
#[derive(Clone)]
pub struct HostServices {
    pub memory: Arc<dyn EmulatedMemory>,
    pub allocator: Arc<dyn SysMemAllocator>,
    pub textures: Arc<dyn TextureCache>,
    pub scheduler: Arc<dyn ThreadScheduler>,
    pub storage: Arc<dyn MediaStorage>,
}

// ============= 参考实现 =============

/// 单块连续 RAM
pub struct FlatMemory {
    base: u32,
    data: RwLock<Vec<u8>>,
}

impl FlatMemory {
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base: base & ADDRESS_MASK,
            data: RwLock::new(vec![0u8; size]),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.data.read().len()
    }

    fn range(&self, addr: u32, len: usize) -> Result<std::ops::Range<usize>> {
        let addr = addr & ADDRESS_MASK;
        let size = self.size();
        if addr < self.base {
            return Err(PlayerError::Other(format!("非法地址 0x{:08X}", addr)));
        }
        let start = (addr - self.base) as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= size)
            .ok_or_else(|| PlayerError::Other(format!("越界访问 0x{:08X}+0x{:X}", addr, len)))?;
        Ok(start..end)
    }
}

impl EmulatedMemory for FlatMemory {
    fn is_address_good(&self, addr: u32) -> bool {
        let addr = addr & ADDRESS_MASK;
        addr >= self.base && ((addr - self.base) as usize) < self.size()
    }

    fn write(&self, addr: u32, data: &[u8]) -> Result<()> {
        let range = self.range(addr, data.len())?;
        self.data.write()[range].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, addr: u32, len: usize) -> Result<Vec<u8>> {
        let range = self.range(addr, len)?;
        Ok(self.data.read()[range].to_vec())
    }

    fn fill(&self, addr: u32, value: u8, len: usize) -> Result<()> {
        let range = self.range(addr, len)?;
        self.data.write()[range].fill(value);
        Ok(())
    }
}

/// 线性分配器（按地址顺序找空洞，Low 从低地址开始，High 从高地址开始）
pub struct LinearAllocator {
    start: u32,
    end: u32,
    blocks: Mutex<Vec<MemBlock>>,
}

const ALLOC_ALIGNMENT: u32 = 0x100;

impl LinearAllocator {
    pub fn new(start: u32, size: u32) -> Self {
        Self {
            start,
            end: start + size,
            blocks: Mutex::new(Vec::new()),
        }
    }

    pub fn allocated(&self) -> Vec<MemBlock> {
        self.blocks.lock().clone()
    }

    fn gaps(&self, blocks: &[MemBlock]) -> Vec<(u32, u32)> {
        let mut gaps = Vec::new();
        let mut cursor = self.start;
        for block in blocks {
            if block.addr > cursor {
                gaps.push((cursor, block.addr));
            }
            cursor = cursor.max(block.addr + block.size);
        }
        if cursor < self.end {
            gaps.push((cursor, self.end));
        }
        gaps
    }
}

impl SysMemAllocator for LinearAllocator {
    fn malloc(&self, partition: PartitionId, name: &str, policy: AllocPolicy, size: u32) -> Option<MemBlock> {
        let size = size.checked_add(ALLOC_ALIGNMENT - 1)? & !(ALLOC_ALIGNMENT - 1);
        let mut blocks = self.blocks.lock();
        let gaps = self.gaps(&blocks);
        let addr = match policy {
            AllocPolicy::Low => gaps.iter().find(|(s, e)| e - s >= size).map(|(s, _)| *s),
            AllocPolicy::High => gaps
                .iter()
                .rev()
                .find(|(s, e)| e - s >= size)
                .map(|(_, e)| (e - size) & !(ALLOC_ALIGNMENT - 1)),
        }?;

        let block = MemBlock {
            name: name.to_string(),
            partition,
            addr,
            size,
        };
        debug!("📦 分配内存 {} 0x{:08X}+0x{:X}", name, addr, size);
        blocks.push(block.clone());
        blocks.sort_by_key(|b| b.addr);
        Some(block)
    }

    fn free(&self, block: &MemBlock) {
        let mut blocks = self.blocks.lock();
        if let Some(index) = blocks.iter().position(|b| b.addr == block.addr) {
            blocks.remove(index);
            debug!("🗑️  释放内存 {} 0x{:08X}", block.name, block.addr);
        }
    }
}

/// 记录纹理登记情况
#[derive(Default)]
pub struct TextureRegistry {
    inner: Mutex<TextureRegistryInner>,
}

#[derive(Default)]
struct TextureRegistryInner {
    ranges: Vec<(u32, u32)>,
    resets: usize,
}

impl TextureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ranges(&self) -> Vec<(u32, u32)> {
        self.inner.lock().ranges.clone()
    }

    pub fn reset_count(&self) -> usize {
        self.inner.lock().resets
    }
}

impl TextureCache for TextureRegistry {
    fn reset_video_textures(&self) {
        let mut inner = self.inner.lock();
        inner.ranges.clear();
        inner.resets += 1;
    }

    fn add_video_texture(&self, start: u32, end: u32) {
        trace!("登记视频纹理 0x{:08X}-0x{:08X}", start, end);
        let mut inner = self.inner.lock();
        if !inner.ranges.contains(&(start, end)) {
            inner.ranges.push((start, end));
        }
    }
}

/// 一次让出请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YieldRequest {
    pub micros: u32,
    pub handle_callbacks: bool,
}

/// 通过通道把让出请求交给宿主调度循环
pub struct ChannelScheduler {
    tx: Sender<YieldRequest>,
}

impl ChannelScheduler {
    pub fn new() -> (Self, Receiver<YieldRequest>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl ThreadScheduler for ChannelScheduler {
    fn delay_thread(&self, micros: u32, handle_callbacks: bool) {
        let request = YieldRequest {
            micros,
            handle_callbacks,
        };
        if self.tx.send(request).is_err() {
            debug!("调度器接收端已关闭，忽略让出请求 {:?}", request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_memory_bounds() {
        let mem = FlatMemory::new(0x0800_0000, 0x1000);
        assert!(mem.is_address_good(0x0800_0000));
        assert!(mem.is_address_good(0x4800_0FFF)); // 非缓存镜像
        assert!(!mem.is_address_good(0x0800_1000));
        assert!(!mem.is_address_good(0));
        mem.write32(0x0800_0010, 0xDEAD_BEEF).unwrap();
        assert_eq!(mem.read32(0x0800_0010).unwrap(), 0xDEAD_BEEF);
        assert!(mem.write(0x0800_0FFE, &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_allocator_low_high() {
        let alloc = LinearAllocator::new(0x0880_0000, 0x10000);
        let low = alloc.malloc(PartitionId::Kernel, "a", AllocPolicy::Low, 0x1000).unwrap();
        let high = alloc.malloc(PartitionId::Kernel, "b", AllocPolicy::High, 0x1000).unwrap();
        assert_eq!(low.addr, 0x0880_0000);
        assert_eq!(high.addr, 0x0880_F000);
        assert!(alloc.malloc(PartitionId::Kernel, "c", AllocPolicy::Low, 0x20000).is_none());
        alloc.free(&low);
        alloc.free(&high);
        assert!(alloc.allocated().is_empty());
    }

    #[test]
    fn test_channel_scheduler() {
        let (scheduler, rx) = ChannelScheduler::new();
        scheduler.delay_thread(100_000, true);
        assert_eq!(
            rx.try_recv().unwrap(),
            YieldRequest {
                micros: 100_000,
                handle_callbacks: true
            }
        );
    }
}
