//! 系统参数常量

/// 最大 CPU（hart）数量
pub const NCPU: usize = 8;

/// QEMU virt 平台上 UART0 的物理地址
pub const UART0: usize = 0x1000_0000;

/// 文件系统与块缓存相关的常量
pub mod fs {
    /// 单次文件系统操作最多写入的块数
    pub const MAXOPBLOCKS: usize = 10;

    /// 磁盘日志中数据块的最大数量
    pub const LOGSIZE: usize = MAXOPBLOCKS * 3;

    /// 块缓存中缓冲块的数量
    ///
    /// 上层保证同一时刻持有的缓冲块不超过该值，因此缓存耗尽被视为致命错误。
    pub const NBUF: usize = MAXOPBLOCKS * 3;

    /// 磁盘块大小（字节）
    pub const BSIZE: usize = 512;

    /// 文件系统镜像的总块数
    pub const FSSIZE: usize = 1000;

    /// 根文件系统所在的设备号
    pub const ROOTDEV: u32 = 1;
}
