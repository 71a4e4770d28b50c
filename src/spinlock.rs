//! 自旋锁模块
//! 自旋锁将数据包裹在自身内部以保护这些数据。

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut, Drop};
use core::panic::Location;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicIsize, AtomicPtr, Ordering};

use crate::process::{cpu_id, pop_off, push_off};

/// 表示一个自旋锁结构，用于在多核环境下保护共享数据。
///
/// `SpinLock` 提供了互斥访问内部数据的能力，通过忙等待（busy-waiting）实现锁机制。
/// 当锁被占用时，尝试获取锁的执行单元将在循环中等待，直到锁被释放。
/// 持锁期间当前执行单元的中断保持关闭，避免中断处理程序在同一单元上重入并死锁在同一把锁上。
/// 该锁还跟踪持有锁的执行单元编号与加锁位置，用于调试和重入检测。
///
/// # 字段说明
/// - `lock`: 原子布尔值，表示锁的状态（`false`=未锁定，`true`=已锁定）；
/// - `name`: 锁的名称，用于调试和标识；
/// - `cpuid`: 当前持有锁的执行单元编号（-1表示无人持有）；
/// - `site`: 加锁时调用者的源码位置（空指针表示无人持有）；
/// - `data`: 被保护的数据，通过`UnsafeCell`实现内部可变性。
#[derive(Debug)]
pub struct SpinLock<T: ?Sized> {
    lock: AtomicBool,
    name: &'static str,
    cpuid: AtomicIsize,
    site: AtomicPtr<Location<'static>>,
    data: UnsafeCell<T>,
}

// 为SpinLock实现Sync trait，允许跨执行单元共享（要求T是Send）
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// 创建一个新的自旋锁实例。
    ///
    /// 锁初始处于未锁定状态，且没有持有者。
    /// 该函数是 `const fn`，因此自旋锁可以直接放在 `static` 中。
    ///
    /// # 参数
    /// - `data`: 需要被保护的数据；
    /// - `name`: 锁的标识名称，用于调试。
    pub const fn new(data: T, name: &'static str) -> Self {
        Self {
            lock: AtomicBool::new(false),
            name,
            cpuid: AtomicIsize::new(-1),
            site: AtomicPtr::new(ptr::null_mut()),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// 获取自旋锁并返回一个守卫对象。
    ///
    /// # 功能说明
    /// 通过忙等待获取锁的所有权，返回一个守卫对象。
    /// 守卫对象实现了`Deref`和`DerefMut`，允许直接访问被保护数据。
    /// 当守卫对象离开作用域时，自动释放锁。
    ///
    /// # 流程解释
    /// 1. 调用`push_off()`禁用中断（防止死锁）；
    /// 2. 检查是否已持有锁（防止重入）；
    /// 3. 通过原子操作忙等待直到获取锁，获取成功即建立 Acquire 顺序；
    /// 4. 记录当前执行单元编号与调用位置；
    /// 5. 返回守卫对象。
    ///
    /// # 示例
    /// ```ignore
    /// let lock = SpinLock::new(0, "test");
    /// {
    ///     let mut guard = lock.lock(); // 获取锁
    ///     *guard = 42; // 修改受保护数据
    /// } // 守卫离开作用域，自动释放锁
    /// ```
    ///
    /// # 可能的错误
    /// 当前执行单元已经持有该锁时直接 panic，而不是自旋死锁。
    #[track_caller]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        self.acquire(Location::caller());
        SpinLockGuard {
            lock: self,
            data: unsafe { &mut *self.data.get() },
            _not_send: PhantomData,
        }
    }

    /// 检查当前执行单元是否持有此锁。
    ///
    /// 自身用 `push_off`/`pop_off` 包裹，可以在任何上下文中调用。
    pub fn holding(&self) -> bool {
        push_off();
        let r = unsafe { self.holding_raw() };
        pop_off();
        r
    }

    /// 锁的名称
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 当前持有者加锁时的源码位置；无人持有时返回 `None`。
    pub fn acquired_at(&self) -> Option<&'static Location<'static>> {
        let site = self.site.load(Ordering::Relaxed);
        unsafe { site.as_ref() }
    }

    /// 独占借用时无需加锁即可访问数据，用于初始化阶段。
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// 检查当前执行单元是否持有此锁（内部方法）。
    ///
    /// # 安全性
    /// 必须在禁用中断的上下文中调用，否则读到的执行单元编号可能已经失效。
    unsafe fn holding_raw(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
            && self.cpuid.load(Ordering::Relaxed) == cpu_id() as isize
    }

    /// 获取锁的核心实现（内部方法）。
    fn acquire(&self, site: &'static Location<'static>) {
        push_off();
        if unsafe { self.holding_raw() } {
            match self.acquired_at() {
                Some(at) => panic!("spinlock {} acquire: already held since {}", self.name, at),
                None => panic!("spinlock {} acquire", self.name),
            }
        }
        while self.lock.compare_exchange_weak(false, true,
            Ordering::Acquire, Ordering::Relaxed).is_err() {
            core::hint::spin_loop();
        }
        self.cpuid.store(cpu_id() as isize, Ordering::Relaxed);
        self.site.store(site as *const Location<'static> as *mut _, Ordering::Relaxed);
    }

    /// 释放锁的核心实现（内部方法）。
    ///
    /// # 流程解释
    /// 1. 验证当前执行单元确实持有锁；
    /// 2. 清除持有者编号与加锁位置；
    /// 3. 以 Release 顺序存储`false`释放锁，临界区内的写入对下一个持有者可见；
    /// 4. 调用`pop_off()`恢复中断状态。
    fn release(&self) {
        if unsafe { !self.holding_raw() } {
            panic!("spinlock {} release", self.name);
        }
        self.site.store(ptr::null_mut(), Ordering::Relaxed);
        self.cpuid.store(-1, Ordering::Relaxed);
        self.lock.store(false, Ordering::Release);
        pop_off();
    }

    /// 手动释放锁的特殊接口。
    ///
    /// 提供一种不通过守卫对象释放锁的方式，正常情况下应使用守卫模式自动管理锁生命周期。
    ///
    /// # 安全性
    /// - 当前执行单元必须持有该锁，否则 panic；
    /// - 对应的守卫必须已经被 `mem::forget`，释放后不得再访问受保护数据。
    pub unsafe fn unlock(&self) {
        self.release();
    }
}

/// 自旋锁守卫对象，提供对受保护数据的访问。
///
/// 当守卫对象存在时，表示锁已被持有。
/// 守卫离开作用域时自动释放锁，确保锁的释放。
/// 守卫不能被转移到其他执行单元，释放必须发生在加锁的单元上。
pub struct SpinLockGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
    data: &'a mut T,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T: ?Sized> Deref for SpinLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &*self.data
    }
}

impl<'a, T: ?Sized> DerefMut for SpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut *self.data
    }
}

impl<'a, T: ?Sized> Drop for SpinLockGuard<'a, T> {
    /// 当守卫离开作用域时自动释放锁，
    /// 并恢复中断状态（通过`pop_off`）
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl<'a, T: ?Sized> SpinLockGuard<'a, T> {
    /// 检查当前执行单元是否持有此锁，用于调试验证。
    pub fn holding(&self) -> bool {
        self.lock.holding()
    }
}
