//! 睡眠锁模块
//! 提供基于执行单元休眠/唤醒机制的同步原语，适用于可能长时间持有的锁。
//!
//! 当锁被占用时，尝试获取锁的执行单元会进入休眠状态，避免忙等待。
//! 块缓存用它保护每个缓冲块，持锁期间可能跨越磁盘 I/O。

use core::cell::{Cell, UnsafeCell};
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut, Drop};

use crate::process::{cpu_id, sleep, wakeup};
use crate::spinlock::SpinLock;

/// 睡眠锁结构，提供阻塞式同步机制
///
/// 与自旋锁不同，当锁被占用时，尝试获取的执行单元会进入休眠状态，
/// 直到锁被释放后被唤醒。
///
/// # 字段说明
/// - `lock`: 内部自旋锁，保护`locked`与`owner`的访问
/// - `locked`: 表示锁是否已被占用
/// - `owner`: 持有者的执行单元编号（-1表示无人持有）
/// - `name`: 锁的标识名称，用于调试
/// - `data`: 被保护的数据，通过`UnsafeCell`实现内部可变性
pub struct SleepLock<T: ?Sized> {
    lock: SpinLock<()>,
    locked: Cell<bool>,
    owner: Cell<isize>,
    name: &'static str,
    data: UnsafeCell<T>,
}

// 为SleepLock实现Sync，允许跨执行单元共享（要求T是Send）
unsafe impl<T: ?Sized + Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    /// 创建一个新的睡眠锁实例
    ///
    /// # 参数
    /// - `data`: 需要被保护的数据
    /// - `name`: 锁的标识名称
    pub const fn new(data: T, name: &'static str) -> Self {
        Self {
            lock: SpinLock::new((), "sleeplock"),
            locked: Cell::new(false),
            owner: Cell::new(-1),
            name,
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SleepLock<T> {
    /// 获取睡眠锁（可能阻塞执行单元）
    ///
    /// # 流程解释
    /// 1. 获取内部自旋锁保护临界区
    /// 2. 检查`locked`状态：
    ///   - 如果已锁定：调用`sleep()`让当前执行单元休眠，醒来后重新获取内部锁再检查
    ///   - 如果未锁定：设置`locked=true`并记录持有者
    /// 3. 释放内部自旋锁，返回守卫
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        let mut guard = self.lock.lock();

        while self.locked.get() {
            sleep(self.chan(), guard);
            guard = self.lock.lock();
        }

        self.locked.set(true);
        self.owner.set(cpu_id() as isize);
        drop(guard);

        SleepLockGuard {
            lock: self,
            data: unsafe { &mut *self.data.get() },
            _not_send: PhantomData,
        }
    }

    /// 检查当前执行单元是否持有该睡眠锁
    pub fn holding(&self) -> bool {
        let guard = self.lock.lock();
        let r = self.locked.get() && self.owner.get() == cpu_id() as isize;
        drop(guard);
        r
    }

    /// 锁的名称
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 释放锁（内部方法，由守卫的Drop调用）
    ///
    /// # 流程解释
    /// 1. 获取内部自旋锁
    /// 2. 设置`locked=false`表示锁已释放
    /// 3. 唤醒等待该锁的执行单元
    /// 4. 释放内部自旋锁
    fn unlock(&self) {
        let guard = self.lock.lock();
        self.locked.set(false);
        self.owner.set(-1);
        wakeup(self.chan());
        drop(guard);
    }

    /// 等待该锁时使用的睡眠通道
    fn chan(&self) -> usize {
        self.locked.as_ptr() as usize
    }
}

/// 睡眠锁守卫，提供对受保护数据的访问
///
/// 当守卫存在时，表示锁已被持有。
/// 守卫离开作用域时自动释放锁，确保锁的释放。
pub struct SleepLockGuard<'a, T: ?Sized> {
    lock: &'a SleepLock<T>,
    data: &'a mut T,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T: ?Sized> SleepLockGuard<'a, T> {
    /// 检查当前执行单元是否持有该守卫对应的锁
    pub fn holding(&self) -> bool {
        self.lock.holding()
    }
}

impl<'a, T: ?Sized> Deref for SleepLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &*self.data
    }
}

impl<'a, T: ?Sized> DerefMut for SleepLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut *self.data
    }
}

impl<'a, T: ?Sized> Drop for SleepLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn holding_follows_owner() {
        let l = SleepLock::new(0u8, "holding");
        assert!(!l.holding());
        let guard = l.lock();
        assert!(guard.holding());
        thread::scope(|s| {
            s.spawn(|| assert!(!l.holding()));
        });
        drop(guard);
        assert!(!l.holding());
        assert_eq!(l.name(), "holding");
    }

    #[test]
    fn waiter_sleeps_until_release() {
        let l = SleepLock::new(0u32, "wait");
        let acquired = AtomicBool::new(false);
        let mut guard = l.lock();
        thread::scope(|s| {
            s.spawn(|| {
                let mut g = l.lock();
                acquired.store(true, Ordering::SeqCst);
                assert_eq!(*g, 1);
                *g = 2;
            });
            thread::sleep(Duration::from_millis(50));
            assert!(!acquired.load(Ordering::SeqCst));
            *guard = 1;
            drop(guard);
        });
        assert!(acquired.load(Ordering::SeqCst));
        assert_eq!(*l.lock(), 2);
    }
}
