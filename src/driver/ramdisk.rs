//! 内存盘
//!
//! 以内存中的块数组充当磁盘，传输同步完成。
//! 同时记录读写次数，便于观察块缓存实际发出了多少次磁盘访问。

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::consts::fs::BSIZE;
use crate::fs::{Buf, BufData, Disk};
use crate::spinlock::SpinLock;

/// 容量为 `N` 个块的内存盘。
///
/// 设备号被忽略：所有设备共用同一组块。
pub struct RamDisk<const N: usize> {
    blocks: SpinLock<[BufData; N]>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl<const N: usize> RamDisk<N> {
    /// 创建一个全零的内存盘
    pub const fn new() -> Self {
        const EMPTY: BufData = BufData::new();
        Self {
            blocks: SpinLock::new([EMPTY; N], "ramdisk"),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// 已完成的读操作次数
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// 已完成的写操作次数
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// 直接读取某个块的内容，不计入读操作次数；块号超出容量时返回 `None`
    pub fn peek(&self, blockno: usize) -> Option<[u8; BSIZE]> {
        self.blocks.lock().get(blockno).map(|b| **b)
    }
}

impl<const N: usize> Disk for RamDisk<N> {
    /// 在缓冲块与对应的内存块之间复制数据
    ///
    /// # 可能的错误
    /// 块号超出容量时 panic。
    fn rw(&self, buf: &mut Buf<'_, Self>, writing: bool) {
        let blockno = buf.read_blockno() as usize;
        let mut blocks = self.blocks.lock();
        let block = match blocks.get_mut(blockno) {
            Some(block) => block,
            None => panic!("ramdisk: block {} out of range", blockno),
        };

        if writing {
            block.copy_from_slice(&buf.data()[..]);
            self.writes.fetch_add(1, Ordering::Relaxed);
        } else {
            buf.data_mut().copy_from_slice(&block[..]);
            self.reads.fetch_add(1, Ordering::Relaxed);
        }
    }
}
