//! 宿主环境下的执行单元模拟
//!
//! 每个宿主线程被视为一个独立的执行单元：线程局部槽位中保存其编号、
//! 一个模拟的 `sstatus` 寄存器（只使用 SIE 位）以及该单元的 [`Cpu`] 嵌套状态。
//! 通道睡眠借助宿主的条件变量实现，真正挂起线程而不是忙等。

use core::cell::Cell;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

use bit_field::BitField;

use crate::spinlock::SpinLockGuard;
use super::Cpu;

/// 模拟 sstatus 中的 SIE 位（supervisor interrupt enable）
const SIE: usize = 1;

/// 下一个可分配的执行单元编号
static NEXT_HART: AtomicUsize = AtomicUsize::new(0);

struct Hart {
    id: usize,
    sstatus: Cell<usize>,
    cpu: Cpu,
}

std::thread_local! {
    // 执行单元启动时中断处于开启状态
    static HART: Hart = Hart {
        id: NEXT_HART.fetch_add(1, Ordering::Relaxed),
        sstatus: Cell::new(1 << SIE),
        cpu: Cpu::new(),
    };
}

/// 当前执行单元的编号，在该单元的整个生命周期内保持不变。
pub fn cpu_id() -> usize {
    HART.with(|h| h.id)
}

/// 检查当前执行单元的中断是否开启
pub fn intr_get() -> bool {
    HART.with(|h| h.sstatus.get().get_bit(SIE))
}

/// 开启当前执行单元的中断
pub fn intr_on() {
    HART.with(|h| {
        let mut x = h.sstatus.get();
        x.set_bit(SIE, true);
        h.sstatus.set(x);
    });
}

/// 关闭当前执行单元的中断
pub fn intr_off() {
    HART.with(|h| {
        let mut x = h.sstatus.get();
        x.set_bit(SIE, false);
        h.sstatus.set(x);
    });
}

pub(super) fn with_cpu<R>(f: impl FnOnce(&Cpu) -> R) -> R {
    HART.with(|h| f(&h.cpu))
}

// 所有通道共用一个条件变量，被唤醒者需自行重新检查等待条件。
static SLEEPING: Mutex<()> = Mutex::new(());
static WAKEUP: Condvar = Condvar::new();

/// 在通道 `chan` 上睡眠，并释放传入的自旋锁守卫。
///
/// 先取得 `SLEEPING` 再释放 `guard`，而 [`wakeup`] 同样需要 `SLEEPING`，
/// 因此在释放 `guard` 与开始等待之间发出的唤醒不会丢失。
/// 返回时不再持有 `guard` 对应的锁，调用者需要重新获取并检查条件。
pub fn sleep<T: ?Sized>(_chan: usize, guard: SpinLockGuard<'_, T>) {
    let sleeping = SLEEPING.lock().unwrap_or_else(PoisonError::into_inner);
    drop(guard);
    drop(WAKEUP.wait(sleeping).unwrap_or_else(PoisonError::into_inner));
}

/// 唤醒在通道 `chan` 上睡眠的执行单元
pub fn wakeup(_chan: usize) {
    let _sleeping = SLEEPING.lock().unwrap_or_else(PoisonError::into_inner);
    WAKEUP.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn threads_are_distinct_units() {
        let me = cpu_id();
        assert_eq!(me, cpu_id());
        let other = thread::spawn(cpu_id).join().unwrap();
        assert_ne!(me, other);
    }

    #[test]
    fn unit_starts_with_interrupts_on() {
        assert!(thread::spawn(intr_get).join().unwrap());
        intr_off();
        assert!(!intr_get());
        // 其他执行单元不受影响
        assert!(thread::spawn(intr_get).join().unwrap());
    }
}
