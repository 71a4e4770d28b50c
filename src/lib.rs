//! xv6 风格内核的同步原语与块缓存
//!
//! - [`spinlock`]：带持有者跟踪与中断嵌套的自旋锁；
//! - [`sleeplock`]：持有期间允许阻塞的睡眠锁；
//! - [`fs`]：固定容量、按 LRU 回收的磁盘块缓存；
//! - [`process`]：执行单元编号、中断开关与 `push_off`/`pop_off`；
//! - [`driver`]：控制台输出与内存盘。
//!
//! 在 `riscv64` 裸机目标上编译为 `no_std`，直接读写 `tp` 与 `sstatus`；
//! 其他目标上每个线程被视为一个执行单元，便于在宿主机上运行测试。

#![cfg_attr(all(target_arch = "riscv64", target_os = "none"), no_std)]
#![warn(rust_2018_idioms)]

#[macro_use]
extern crate bitflags;

#[macro_use]
pub mod printf;

pub mod consts;
pub mod driver;
pub mod fs;
pub mod process;
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
mod register;
pub mod sleeplock;
pub mod spinlock;
