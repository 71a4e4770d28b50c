//! 设备驱动模块，包含控制台输出与内存盘

use core::sync::atomic::AtomicBool;

pub mod console;
pub mod ramdisk;
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
mod uart;

/// 用于表示是否有任何执行单元触发了 panic。
pub(crate) static PANICKED: AtomicBool = AtomicBool::new(false);
