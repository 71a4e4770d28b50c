//! 文件系统的块缓存层
//!
//! 上层（日志、inode 等）通过 [`Bcache`] 读写磁盘块，
//! 具体的磁盘由实现了 [`Disk`] 的驱动提供。

mod bio;

pub use bio::{Bcache, Buf, BufData, BufFlags, Disk};
