//! 执行单元管理模块
//!
//! 执行单元即一个可独立调度的控制流（裸机上是一个 hart，宿主模拟环境中是一个线程）。
//! 本模块向上层提供三类原语：
//! - 当前执行单元编号与中断开关：[`cpu_id`]、[`intr_get`]、[`intr_on`]、[`intr_off`]；
//! - 可嵌套的关中断计数：[`push_off`]、[`pop_off`]；
//! - 睡眠锁所依赖的通道睡眠 / 唤醒：[`sleep`]、[`wakeup`]。

mod cpu;

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
#[path = "hart_riscv.rs"]
mod hart;

#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
#[path = "hart_sim.rs"]
mod hart;

pub use cpu::{noff, pop_off, push_off};
pub use hart::{cpu_id, intr_get, intr_off, intr_on, sleep, wakeup};

use cpu::Cpu;
