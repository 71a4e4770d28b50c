//! 裸机 RISC-V 上的执行单元原语
//!
//! hart 编号保存在 `tp` 寄存器中，中断开关对应 `sstatus.SIE`。

use array_macro::array;

use crate::consts::NCPU;
use crate::register::{sstatus, tp};
use crate::spinlock::SpinLockGuard;
use super::Cpu;

/// 全局 CPU 管理器实例，每个 hart 占用表中的一项。
static CPU_MANAGER: CpuManager = CpuManager::new();

/// CPU 管理器，维护系统中所有 hart 的中断嵌套状态。
struct CpuManager {
    table: [Cpu; NCPU],
}

// 表中每一项只由对应的 hart 在关中断时访问
unsafe impl Sync for CpuManager {}

impl CpuManager {
    const fn new() -> Self {
        Self {
            table: array![_ => Cpu::new(); NCPU],
        }
    }

    /// 返回当前 hart 的 cpu 结构体的引用。
    /// 必须禁用中断。
    fn my_cpu(&self) -> &Cpu {
        &self.table[cpu_id()]
    }
}

/// 当前 hart 的编号。
///
/// 只有在关中断时读取才可靠：开中断后当前控制流可能被迁移到另一个 hart。
#[inline]
pub fn cpu_id() -> usize {
    unsafe { tp::read() }
}

#[inline]
pub fn intr_get() -> bool {
    sstatus::intr_get()
}

#[inline]
pub fn intr_on() {
    sstatus::intr_on();
}

#[inline]
pub fn intr_off() {
    sstatus::intr_off();
}

pub(super) fn with_cpu<R>(f: impl FnOnce(&Cpu) -> R) -> R {
    f(CPU_MANAGER.my_cpu())
}

/// 在通道 `chan` 上睡眠，并释放传入的自旋锁守卫。
///
/// 本层不包含调度器：释放锁后仅提示处理器让出流水线，随即返回，
/// 由调用者重新获取锁并检查条件。
pub fn sleep<T: ?Sized>(_chan: usize, guard: SpinLockGuard<'_, T>) {
    drop(guard);
    core::hint::spin_loop();
}

/// 唤醒在通道 `chan` 上睡眠的 hart。
///
/// 睡眠方从不真正挂起，因此这里无事可做。
pub fn wakeup(_chan: usize) {}
