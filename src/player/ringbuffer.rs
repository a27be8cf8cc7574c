use crate::core::Result;
use crate::player::host::EmulatedMemory;
use crate::player::source_feed::SourceFeed;
use log::trace;

/// 环形缓冲区包大小（字节）
pub const RINGBUFFER_PACKET_SIZE: u32 = 2048;

/// 环形缓冲区 - 固定大小的包，解耦文件读取与解码消费
///
/// 数据本体位于模拟内存 [data_addr, data_addr + packets * packet_size)。
/// 写端（补充数据）由播放器驱动，读端由解码桥推进
#[derive(Debug, Clone)]
pub struct RingBuffer {
    packets: u32,
    packet_size: u32,
    data_addr: u32,
    put_position: u32,
    read_position: u32,
    packets_in: u32,
    // 解码端已读取、尚未按整包归还的字节
    read_bytes: u32,
    has_audio: bool,
    has_video: bool,
}

impl RingBuffer {
    pub fn new(packets: u32, data_addr: u32) -> Self {
        Self {
            packets,
            packet_size: RINGBUFFER_PACKET_SIZE,
            data_addr,
            put_position: 0,
            read_position: 0,
            packets_in: 0,
            read_bytes: 0,
            has_audio: false,
            has_video: false,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.packets
    }

    pub fn packet_size(&self) -> u32 {
        self.packet_size
    }

    pub fn data_addr(&self) -> u32 {
        self.data_addr
    }

    pub fn byte_size(&self) -> u32 {
        self.packets * self.packet_size
    }

    pub fn set_has_audio(&mut self, has_audio: bool) {
        self.has_audio = has_audio;
    }

    pub fn set_has_video(&mut self, has_video: bool) {
        self.has_video = has_video;
    }

    pub fn has_audio(&self) -> bool {
        self.has_audio
    }

    pub fn has_video(&self) -> bool {
        self.has_video
    }

    pub fn packets_in_ringbuffer(&self) -> u32 {
        self.packets_in
    }

    pub fn free_packets(&self) -> u32 {
        self.packets - self.packets_in
    }

    /// 不回绕情况下可连续写入的包数
    pub fn put_sequential_packets(&self) -> u32 {
        self.free_packets().min(self.packets - self.put_position)
    }

    pub fn put_data_addr(&self) -> u32 {
        self.data_addr + self.put_position * self.packet_size
    }

    pub fn add_packets(&mut self, count: u32) {
        let count = count.min(self.free_packets());
        self.put_position = (self.put_position + count) % self.packets;
        self.packets_in += count;
    }

    // ============= 读端（解码桥使用） =============

    pub fn read_data_addr(&self) -> u32 {
        self.data_addr + self.read_position * self.packet_size + self.read_bytes
    }

    /// 不回绕情况下可连续读取的字节数
    pub fn read_sequential_bytes(&self) -> u32 {
        let packets = self.packets_in.min(self.packets - self.read_position);
        (packets * self.packet_size).saturating_sub(self.read_bytes)
    }

    /// 解码端读取了 len 字节
    pub fn mark_read(&mut self, len: u32) {
        self.read_bytes = (self.read_bytes + len).min(self.packets_in * self.packet_size);
    }

    /// 把解码端已完整读取的包归还给写端
    pub fn notify_consumed(&mut self) {
        let full_packets = self.read_bytes / self.packet_size;
        if full_packets > 0 {
            self.consume_packets(full_packets);
            self.read_bytes -= full_packets * self.packet_size;
        }
    }

    pub fn consume_packets(&mut self, count: u32) {
        let count = count.min(self.packets_in);
        self.read_position = (self.read_position + count) % self.packets;
        self.packets_in -= count;
    }

    /// 丢弃所有已排队的包
    pub fn consume_all_packets(&mut self) {
        self.packets_in = 0;
        self.read_bytes = 0;
        self.read_position = self.put_position;
    }

    /// 用数据源补充环形缓冲区
    ///
    /// 复制 min(可连续写入字节, 数据源剩余字节)，按整包计入，
    /// 游标按实际复制的字节推进。返回新增包数，数据源耗尽时为 0
    pub fn fill_from(&mut self, feed: &mut SourceFeed, memory: &dyn EmulatedMemory) -> Result<u32> {
        self.notify_consumed();

        let sequential_packets = self.put_sequential_packets();
        if sequential_packets == 0 || feed.is_exhausted() {
            return Ok(0);
        }

        let addr = self.put_data_addr();
        let chunk = feed.peek((sequential_packets * self.packet_size) as usize);
        let size = chunk.len() as u32;
        trace!(
            "填充环形缓冲区 0x{:08X}, size=0x{:X}, 文件偏移 0x{:X}/0x{:X}",
            addr,
            size,
            feed.cursor(),
            feed.len()
        );
        memory.write(addr, chunk)?;

        let added = size.div_ceil(self.packet_size);
        self.add_packets(added);
        feed.advance(size as usize);
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::host::FlatMemory;

    const BASE: u32 = 0x0880_0000;

    #[test]
    fn test_sequential_packets_wrap() {
        let mut ring = RingBuffer::new(8, BASE);
        assert_eq!(ring.put_sequential_packets(), 8);
        ring.add_packets(6);
        assert_eq!(ring.put_sequential_packets(), 2);
        ring.consume_packets(4);
        // 写位置在 6，只能连续写到末尾
        assert_eq!(ring.put_sequential_packets(), 2);
        ring.add_packets(2);
        assert_eq!(ring.put_data_addr(), BASE);
        assert_eq!(ring.put_sequential_packets(), 4);
    }

    #[test]
    fn test_fill_rounds_packets_but_advances_exact_bytes() {
        let memory = FlatMemory::new(BASE, 0x10000);
        let mut ring = RingBuffer::new(8, BASE);
        let mut feed = SourceFeed::from_bytes("x", (0..5000u32).map(|i| i as u8).collect());

        let added = ring.fill_from(&mut feed, &memory).unwrap();
        assert_eq!(added, 3);
        assert_eq!(feed.cursor(), 5000);
        assert_eq!(ring.packets_in_ringbuffer(), 3);
        assert_eq!(memory.read(BASE + 4999, 1).unwrap(), vec![(4999u32 as u8)]);

        // 数据源耗尽后不再补充
        assert_eq!(ring.fill_from(&mut feed, &memory).unwrap(), 0);
        assert_eq!(ring.packets_in_ringbuffer(), 3);
    }

    #[test]
    fn test_fill_limited_by_free_slots() {
        let memory = FlatMemory::new(BASE, 0x10000);
        let mut ring = RingBuffer::new(4, BASE);
        let mut feed = SourceFeed::from_bytes("x", vec![1u8; 6 * 2048]);
        assert_eq!(ring.fill_from(&mut feed, &memory).unwrap(), 4);
        assert_eq!(feed.unread_bytes(), 2 * 2048);
        assert_eq!(ring.fill_from(&mut feed, &memory).unwrap(), 0);

        // 解码端读完两个包后可以继续补充
        ring.mark_read(2 * 2048);
        assert_eq!(ring.fill_from(&mut feed, &memory).unwrap(), 2);
        assert!(feed.is_exhausted());
    }

    #[test]
    fn test_consume_all() {
        let mut ring = RingBuffer::new(4, BASE);
        ring.add_packets(3);
        ring.mark_read(100);
        ring.consume_all_packets();
        assert_eq!(ring.packets_in_ringbuffer(), 0);
        assert_eq!(ring.read_sequential_bytes(), 0);
        assert_eq!(ring.read_data_addr(), ring.put_data_addr());
    }
}
