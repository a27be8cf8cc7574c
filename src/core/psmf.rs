// PSMF 容器头部字段

/// "PSMF"（按小端读取）
pub const PSMF_MAGIC: u32 = 0x464D_5350;
pub const PSMF_MAGIC_OFFSET: usize = 0x0;
pub const PSMF_STREAM_OFFSET_OFFSET: usize = 0x8;
pub const PSMF_STREAM_SIZE_OFFSET: usize = 0xC;
pub const PSMF_FIRST_TIMESTAMP_OFFSET: usize = 0x54;
pub const PSMF_LAST_TIMESTAMP_OFFSET: usize = 0x5A;
pub const PSMF_STREAM_COUNT_OFFSET: usize = 0x80;
pub const PSMF_STREAM_TABLE_OFFSET: usize = 0x82;
const PSMF_STREAM_ENTRY_SIZE: usize = 16;
/// 头部扇区长度
pub const SECTOR_LENGTH: usize = 2048;

/// 容器分析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsmfHeader {
    /// 首个数据包相对文件起点的偏移
    pub stream_offset: u32,
    pub stream_size: u32,
    pub first_timestamp: i64,
    /// 头部声明的结束时间戳（可能不准确，不用于判断播放结束）
    pub last_timestamp: i64,
    pub avc_streams: i32,
    pub atrac_streams: i32,
    pub pcm_streams: i32,
}

impl Default for PsmfHeader {
    fn default() -> Self {
        Self {
            stream_offset: 0,
            stream_size: 0,
            first_timestamp: 0,
            last_timestamp: 0,
            avc_streams: 1,
            atrac_streams: 1,
            pcm_streams: 0,
        }
    }
}

fn read_le32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_be32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_be16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// 6 字节大端时间戳
fn read_timestamp(data: &[u8], offset: usize) -> Option<i64> {
    let bytes = data.get(offset..offset + 6)?;
    Some(bytes.iter().fold(0i64, |acc, &b| (acc << 8) | b as i64))
}

pub fn has_magic(data: &[u8]) -> bool {
    read_le32(data, PSMF_MAGIC_OFFSET) == Some(PSMF_MAGIC)
}

/// 从头部扇区推导文件长度（streamSize + streamOffset）
///
/// 魔数不匹配时返回 None，调用方使用文件自身长度
pub fn header_length(sector: &[u8]) -> Option<u64> {
    if !has_magic(sector) {
        return None;
    }
    let size = read_be32(sector, PSMF_STREAM_SIZE_OFFSET)?;
    let offset = read_be32(sector, PSMF_STREAM_OFFSET_OFFSET)?;
    Some(size as u64 + offset as u64)
}

/// 分析容器头部
pub fn analyse(data: &[u8]) -> PsmfHeader {
    let mut header = PsmfHeader::default();
    if !has_magic(data) {
        return header;
    }

    header.stream_offset = read_be32(data, PSMF_STREAM_OFFSET_OFFSET).unwrap_or(0);
    header.stream_size = read_be32(data, PSMF_STREAM_SIZE_OFFSET).unwrap_or(0);
    header.first_timestamp = read_timestamp(data, PSMF_FIRST_TIMESTAMP_OFFSET).unwrap_or(0);
    header.last_timestamp = read_timestamp(data, PSMF_LAST_TIMESTAMP_OFFSET).unwrap_or(0);

    let count = read_be16(data, PSMF_STREAM_COUNT_OFFSET).unwrap_or(0) as usize;
    let (mut avc, mut atrac, mut pcm) = (0, 0, 0);
    for i in 0..count {
        let entry = PSMF_STREAM_TABLE_OFFSET + i * PSMF_STREAM_ENTRY_SIZE;
        let (Some(&stream_id), Some(&private_id)) = (data.get(entry), data.get(entry + 1)) else {
            break;
        };
        match (stream_id, private_id) {
            (0xE0..=0xEF, _) => avc += 1,
            (0xBD, 0x00..=0x0F) => atrac += 1,
            (0xBD, 0x40..=0x4F) => pcm += 1,
            _ => {}
        }
    }
    if avc + atrac + pcm > 0 {
        header.avc_streams = avc;
        header.atrac_streams = atrac;
        header.pcm_streams = pcm;
    }

    header
}

/// 构造一个最小的 PSMF 头部扇区（测试和演示用）
pub fn build_header(stream_offset: u32, stream_size: u32, first_timestamp: i64, last_timestamp: i64) -> Vec<u8> {
    let mut sector = vec![0u8; SECTOR_LENGTH];
    sector[PSMF_MAGIC_OFFSET..PSMF_MAGIC_OFFSET + 4].copy_from_slice(&PSMF_MAGIC.to_le_bytes());
    sector[4..8].copy_from_slice(b"0015");
    sector[PSMF_STREAM_OFFSET_OFFSET..PSMF_STREAM_OFFSET_OFFSET + 4]
        .copy_from_slice(&stream_offset.to_be_bytes());
    sector[PSMF_STREAM_SIZE_OFFSET..PSMF_STREAM_SIZE_OFFSET + 4]
        .copy_from_slice(&stream_size.to_be_bytes());
    sector[PSMF_FIRST_TIMESTAMP_OFFSET..PSMF_FIRST_TIMESTAMP_OFFSET + 6]
        .copy_from_slice(&first_timestamp.to_be_bytes()[2..]);
    sector[PSMF_LAST_TIMESTAMP_OFFSET..PSMF_LAST_TIMESTAMP_OFFSET + 6]
        .copy_from_slice(&last_timestamp.to_be_bytes()[2..]);
    // 一路 AVC + 一路 ATRAC
    sector[PSMF_STREAM_COUNT_OFFSET..PSMF_STREAM_COUNT_OFFSET + 2].copy_from_slice(&2u16.to_be_bytes());
    sector[PSMF_STREAM_TABLE_OFFSET] = 0xE0;
    sector[PSMF_STREAM_TABLE_OFFSET + PSMF_STREAM_ENTRY_SIZE] = 0xBD;
    sector
}
