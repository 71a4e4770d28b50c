//! 缓存层
//!
//! 块缓存由固定数量的缓冲块组成，每个缓冲块缓存一个磁盘块的内容。
//! 缓存磁盘块可以减少磁盘读取，也为多个执行单元共同使用的磁盘块提供了同步点。
//!
//! 接口约定：
//! - 调用 `bread` 获取某个磁盘块的缓冲块；
//! - 修改缓冲块数据后，调用 `bwrite` 将其写回磁盘；
//! - 使用完毕后调用 `release`（或直接丢弃 `Buf`）释放缓冲块；
//! - 同一时刻只有一个执行单元能使用某个缓冲块，不要长时间持有。
//!
//! 缓冲块内部使用两个状态标志：
//! - `VALID`：缓冲块数据已从磁盘读入；
//! - `DIRTY`：缓冲块数据已被修改，需要写回磁盘。
//!
//! 锁的分工：缓存自旋锁保护链表、引用计数与块标识；
//! 每个缓冲块的睡眠锁保护块数据与状态标志，并保证独占使用。

use array_macro::array;

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU8, Ordering};

use crate::consts::fs::{BSIZE, NBUF};
use crate::sleeplock::{SleepLock, SleepLockGuard};
use crate::spinlock::SpinLock;

bitflags! {
    /// 缓冲块状态标志
    pub struct BufFlags: u8 {
        /// 缓冲块数据已从磁盘读入
        const VALID = 1 << 1;
        /// 缓冲块数据已被修改，需要写回磁盘
        const DIRTY = 1 << 2;
    }
}

/// 块缓存所使用的磁盘。
///
/// `rw` 同步完成一次传输后才返回：读取时填充缓冲块数据，写入时数据即视为已持久化。
/// 调用时调用者持有缓冲块的睡眠锁，但不持有缓存自旋锁。
pub trait Disk: Sync + Sized {
    /// 执行磁盘读写操作
    ///
    /// # 参数
    /// - `buf`: 要读写的缓冲区
    /// - `writing`: 操作类型（true=写，false=读）
    fn rw(&self, buf: &mut Buf<'_, Self>, writing: bool);
}

/// 缓冲区缓存（Buffer Cache）结构体，用于块设备的读写缓存。
///
/// `Bcache` 提供了一个固定大小的内存缓冲区池，用于缓存磁盘块数据。
/// 它按 LRU（最近最少使用）策略维护块缓冲的使用顺序，
/// 并通过自旋锁与睡眠锁机制实现并发安全的数据访问。
///
/// `new` 是 `const fn`，内核通常将其放在 `static` 中，
/// 在启动阶段调用一次 [`Bcache::binit`]。
pub struct Bcache<D: Disk> {
    /// 控制 LRU 缓存元信息的自旋锁。
    ///
    /// 保护 `BufLru`，即缓冲块链表、引用计数、块号与设备号等元数据。
    ctrl: SpinLock<BufLru>,

    /// 缓冲块数组，与 `BufLru::inner` 按下标一一对应。
    bufs: [BufInner; NBUF],

    /// 执行实际传输的磁盘
    disk: D,
}

impl<D: Disk> Bcache<D> {
    pub const fn new(disk: D) -> Self {
        Self {
            ctrl: SpinLock::new(BufLru::new(), "bcache"),
            bufs: array![_ => BufInner::new(); NBUF],
            disk,
        }
    }

    /// 初始化缓冲区缓存。
    ///
    /// # 功能说明
    /// 将所有缓冲块依次插入哨兵节点之后，构成一个环形双向链表。
    /// 插入顺序使得下标为 0 的缓冲块位于 LRU 端，最先被回收。
    ///
    /// # 可能的错误
    /// 重复调用会 panic。
    pub fn binit(&self) {
        let mut ctrl = self.ctrl.lock();
        if ctrl.head.next != HEAD {
            panic!("binit: already initialized");
        }
        for index in 0..NBUF {
            ctrl.push_front(index);
        }
        drop(ctrl);

        #[cfg(feature = "verbose_init_info")]
        println!("bcache: {} buffers, {} bytes each", NBUF, BSIZE);
    }

    /// 获取指定设备与块号对应的缓冲块，返回时调用者已独占持有它。
    ///
    /// # 流程解释
    /// - 锁住 `BufLru`，从 MRU 端开始查找是否已缓存该块；
    ///   - 若命中，引用计数加一；
    ///   - 若未命中，从 LRU 端开始寻找引用计数为 0 且未被标记为脏的缓冲块，
    ///     改写其块标识并清空状态标志，引用计数置为 1；
    /// - 释放 `BufLru` 的锁之后，再获取该缓冲块的睡眠锁（可能休眠）。
    ///
    /// 该函数不涉及磁盘读写，调用者需根据 `VALID` 标志判断是否需要从磁盘加载数据。
    ///
    /// # 可能的错误
    /// 所有缓冲块都在被引用或为脏时无法替换，触发 panic（`"bget: no buffers"`）。
    pub fn bget(&self, dev: u32, blockno: u32) -> Buf<'_, D> {
        let mut ctrl = self.ctrl.lock();

        let index = match ctrl.find_cached(dev, blockno) {
            Some(index) => index,
            None => {
                // 引用计数为 0 但带有 DIRTY 的缓冲块可能还在上层日志的事务中，不能回收
                let dirty = |i: usize| self.bufs[i].flags().contains(BufFlags::DIRTY);
                match ctrl.recycle(dev, blockno, dirty) {
                    Some(index) => {
                        self.bufs[index].flags.store(0, Ordering::Relaxed);
                        index
                    }
                    None => panic!("bget: no buffers"),
                }
            }
        };
        drop(ctrl);

        Buf {
            index,
            dev,
            blockno,
            cache: self,
            data: ManuallyDrop::new(self.bufs[index].data.lock()),
        }
    }

    /// 返回包含指定块数据的缓冲块。
    ///
    /// 若缓冲块尚未包含有效数据，先从磁盘读入；命中有效缓存时不发生任何磁盘访问。
    pub fn bread(&self, dev: u32, blockno: u32) -> Buf<'_, D> {
        let mut b = self.bget(dev, blockno);
        if !b.is_valid() {
            self.disk.rw(&mut b, false);
            b.inner().flags.fetch_or(BufFlags::VALID.bits(), Ordering::Relaxed);
        }
        b
    }

    /// 缓存使用的磁盘
    pub fn disk(&self) -> &D {
        &self.disk
    }

    /// 释放缓冲块的引用，若不再被引用则将其移动到 MRU 端。
    ///
    /// 调用前缓冲块的睡眠锁必须已经释放。
    fn brelse(&self, index: usize) {
        self.ctrl.lock().move_if_no_ref(index);
    }
}

/// 已被独占持有的缓冲块。
///
/// `Buf` 同时是持有凭证：它内部持有缓冲块的睡眠锁守卫，
/// 只有通过 `bget`/`bread` 才能得到它，`bwrite` 与释放都以它为参数，
/// 因此“必须先持有缓冲块才能写回或释放”在类型层面得到保证。
/// 释放时（`release` 或丢弃）先释放睡眠锁，再在缓存自旋锁下减少引用计数。
///
/// `Buf` 不能被转移到其他执行单元。
pub struct Buf<'a, D: Disk> {
    /// 缓冲块在缓存数组中的下标
    index: usize,
    dev: u32,
    blockno: u32,
    cache: &'a Bcache<D>,
    /// 缓冲块数据的睡眠锁守卫，在 `Drop` 中先于引用计数释放
    data: ManuallyDrop<SleepLockGuard<'a, BufData>>,
}

impl<'a, D: Disk> Buf<'a, D> {
    pub fn read_dev(&self) -> u32 {
        self.dev
    }

    pub fn read_blockno(&self) -> u32 {
        self.blockno
    }

    /// 当前的状态标志
    pub fn flags(&self) -> BufFlags {
        self.inner().flags()
    }

    pub fn is_valid(&self) -> bool {
        self.flags().contains(BufFlags::VALID)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags().contains(BufFlags::DIRTY)
    }

    pub fn data(&self) -> &BufData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut BufData {
        &mut self.data
    }

    /// 将缓冲块数据写回磁盘。
    ///
    /// 设置 `DIRTY` 标志后同步调用一次磁盘写，返回时写入已完成。
    /// 块缓存自身从不清除 `DIRTY`，由负责写回的上层（日志层或驱动）调用 [`Buf::clear_dirty`]。
    pub fn bwrite(&mut self) {
        if !self.data.holding() {
            panic!("bwrite");
        }
        self.inner().flags.fetch_or(BufFlags::DIRTY.bits(), Ordering::Relaxed);

        #[cfg(feature = "kernel_warning")]
        if !self.is_valid() {
            println!("kernel warning: bwrite: block {} on dev {} was never read", self.blockno, self.dev);
        }

        let cache = self.cache;
        cache.disk.rw(self, true);
    }

    /// 清除 `DIRTY` 标志，使引用计数归零后的缓冲块重新可以被回收。
    pub fn clear_dirty(&mut self) {
        self.inner().flags.fetch_and(!BufFlags::DIRTY.bits(), Ordering::Relaxed);
    }

    /// 释放缓冲块，之后不得再使用它。
    pub fn release(self) {
        drop(self);
    }

    fn inner(&self) -> &'a BufInner {
        &self.cache.bufs[self.index]
    }
}

impl<'a, D: Disk> Drop for Buf<'a, D> {
    fn drop(&mut self) {
        if !self.data.holding() {
            panic!("brelse");
        }
        unsafe { ManuallyDrop::drop(&mut self.data) };
        self.cache.brelse(self.index);
    }
}

/// 链表哨兵节点的下标
const HEAD: usize = NBUF;

/// 双向链表中的前后链接，以缓冲块下标表示，`HEAD` 表示哨兵节点
#[derive(Clone, Copy)]
struct Link {
    prev: usize,
    next: usize,
}

/// 缓冲区缓存的 LRU 链表控制结构。
///
/// 所有缓冲块与哨兵节点 `head` 组成一个环形双向链表：
/// `head.next` 是最近释放的缓冲块（MRU），`head.prev` 是最久未释放的缓冲块（LRU）。
/// 每个缓冲块在链表中恰好出现一次。
struct BufLru {
    inner: [BufCtrl; NBUF],
    head: Link,
}

impl BufLru {
    const fn new() -> Self {
        Self {
            inner: array![_ => BufCtrl::new(); NBUF],
            head: Link { prev: HEAD, next: HEAD },
        }
    }

    fn link(&mut self, i: usize) -> &mut Link {
        if i == HEAD {
            &mut self.head
        } else {
            &mut self.inner[i].link
        }
    }

    /// 将缓冲块 `i` 插入到哨兵节点之后
    fn push_front(&mut self, i: usize) {
        let first = self.head.next;
        self.inner[i].link = Link { prev: HEAD, next: first };
        self.link(first).prev = i;
        self.head.next = i;
    }

    /// 将缓冲块 `i` 从链表中摘除
    fn unlink(&mut self, i: usize) {
        let Link { prev, next } = self.inner[i].link;
        self.link(next).prev = prev;
        self.link(prev).next = next;
    }

    /// 从 MRU 端开始查找 `(dev, blockno)`，命中时引用计数加一并返回下标。
    fn find_cached(&mut self, dev: u32, blockno: u32) -> Option<usize> {
        let mut i = self.head.next;
        while i != HEAD {
            let b = &mut self.inner[i];
            if b.tag == Some((dev, blockno)) {
                b.refcnt += 1;
                return Some(i);
            }
            i = b.link.next;
        }
        None
    }

    /// 从 LRU 端开始寻找可回收的缓冲块。
    ///
    /// 可回收意味着引用计数为 0 且 `dirty(i)` 为假。
    /// 找到后将其改写为 `(dev, blockno)`，引用计数置为 1，返回下标。
    fn recycle(&mut self, dev: u32, blockno: u32, dirty: impl Fn(usize) -> bool) -> Option<usize> {
        let mut i = self.head.prev;
        while i != HEAD {
            let b = &mut self.inner[i];
            if b.refcnt == 0 && !dirty(i) {
                b.tag = Some((dev, blockno));
                b.refcnt = 1;
                return Some(i);
            }
            i = b.link.prev;
        }
        None
    }

    /// 引用计数减一，若归零则将该缓冲块移到 MRU 端。
    fn move_if_no_ref(&mut self, i: usize) {
        let b = &mut self.inner[i];
        b.refcnt = match b.refcnt.checked_sub(1) {
            Some(refcnt) => refcnt,
            None => panic!("brelse: buffer {} not referenced", i),
        };
        if b.refcnt == 0 {
            self.unlink(i);
            self.push_front(i);
        }
    }
}

/// 缓冲块控制结构，记录块标识与引用计数，并构成 LRU 链表。
struct BufCtrl {
    /// `(dev, blockno)`；从未被使用过的缓冲块没有标识
    tag: Option<(u32, u32)>,
    /// 当前持有该缓冲块的 `Buf` 数量（含等待其睡眠锁的）
    refcnt: usize,
    link: Link,
}

impl BufCtrl {
    const fn new() -> Self {
        Self {
            tag: None,
            refcnt: 0,
            link: Link { prev: HEAD, next: HEAD },
        }
    }
}

/// 缓冲块的数据部分，包含实际的磁盘块内容及其状态标志。
struct BufInner {
    /// `BufFlags` 的位表示。
    ///
    /// 回收时在缓存自旋锁下被清空（此时没有人持有该缓冲块），
    /// 其余时候只在持有 `data` 的睡眠锁时修改。
    flags: AtomicU8,

    /// 缓冲块的实际数据，受睡眠锁保护。
    data: SleepLock<BufData>,
}

impl BufInner {
    const fn new() -> Self {
        Self {
            flags: AtomicU8::new(0),
            data: SleepLock::new(BufData::new(), "buffer"),
        }
    }

    fn flags(&self) -> BufFlags {
        BufFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed))
    }
}

/// 一个磁盘块大小的数据。
///
/// BufData 的对齐方式应足以满足可能由此结构体转换而来的其他结构体的需求。
#[repr(C, align(8))]
pub struct BufData([u8; BSIZE]);

impl BufData {
    pub const fn new() -> Self {
        Self([0; BSIZE])
    }
}

impl Deref for BufData {
    type Target = [u8; BSIZE];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for BufData {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ramdisk::RamDisk;
    use core::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    type TestCache = Bcache<RamDisk<64>>;

    fn cache() -> TestCache {
        let cache = Bcache::new(RamDisk::new());
        cache.binit();
        cache
    }

    fn refcnt(cache: &TestCache, index: usize) -> usize {
        cache.ctrl.lock().inner[index].refcnt
    }

    /// 依次读入并释放块 0..NBUF，返回各块所在的缓冲块下标。
    /// 完成后块 0 位于 LRU 端，块 NBUF-1 位于 MRU 端。
    fn fill(cache: &TestCache, dirty: impl Fn(u32) -> bool) -> Vec<usize> {
        (0..NBUF as u32)
            .map(|blockno| {
                let mut b = cache.bread(1, blockno);
                if dirty(blockno) {
                    b.bwrite();
                }
                b.index
            })
            .collect()
    }

    #[test]
    fn list_links_every_buffer_once() {
        let cache = cache();
        let ctrl = cache.ctrl.lock();
        let mut seen = [false; NBUF];
        let mut prev = HEAD;
        let mut i = ctrl.head.next;
        while i != HEAD {
            assert!(!seen[i]);
            seen[i] = true;
            assert_eq!(ctrl.inner[i].link.prev, prev);
            prev = i;
            i = ctrl.inner[i].link.next;
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(ctrl.head.prev, prev);
        assert_eq!(ctrl.head.prev, 0);
    }

    #[test]
    #[should_panic(expected = "binit: already initialized")]
    fn binit_twice() {
        let cache = cache();
        cache.binit();
    }

    #[test]
    fn cache_hit_avoids_io() {
        let cache = cache();
        let mut b = cache.bread(1, 3);
        assert!(b.is_valid());
        assert!(!b.is_dirty());
        assert_eq!((b.read_dev(), b.read_blockno()), (1, 3));
        b.data_mut()[0] = 0x42;
        let index = b.index;
        b.release();
        assert_eq!(cache.disk().reads(), 1);

        let b = cache.bread(1, 3);
        assert_eq!(b.index, index);
        assert_eq!(b.data()[0], 0x42);
        assert_eq!(cache.disk().reads(), 1);
    }

    #[test]
    fn same_block_number_on_other_device_misses() {
        let cache = cache();
        let a = cache.bread(1, 3);
        let b = cache.bread(2, 3);
        assert_ne!(a.index, b.index);
        assert_eq!(cache.disk().reads(), 2);
    }

    #[test]
    fn bwrite_sets_dirty_and_writes_each_time() {
        let cache = cache();
        let mut b = cache.bread(1, 5);
        b.data_mut().fill(0x11);
        b.bwrite();
        assert!(b.is_dirty());
        assert!(b.is_valid());
        assert_eq!(cache.disk().writes(), 1);
        b.bwrite();
        assert!(b.is_dirty());
        assert_eq!(cache.disk().writes(), 2);

        let mut fresh = cache.bget(1, 6);
        assert!(!fresh.is_valid());
        fresh.bwrite();
        assert_eq!(fresh.flags(), BufFlags::DIRTY);
        assert_eq!(cache.disk().writes(), 3);
    }

    #[test]
    fn evicts_least_recently_released_first() {
        let cache = cache();
        let slots = fill(&cache, |_| false);
        let reads = cache.disk().reads();

        for (k, newblock) in (NBUF as u32..NBUF as u32 + 3).enumerate() {
            let b = cache.bread(1, newblock);
            assert_eq!(b.index, slots[k]);
            assert!(b.is_valid());
        }
        assert_eq!(cache.disk().reads(), reads + 3);

        // 块 3 仍在缓存中，块 0 已被替换
        drop(cache.bread(1, 3));
        assert_eq!(cache.disk().reads(), reads + 3);
        drop(cache.bread(1, 0));
        assert_eq!(cache.disk().reads(), reads + 4);
    }

    #[test]
    fn release_moves_to_mru() {
        let cache = cache();
        let slots = fill(&cache, |_| false);
        // 重新使用块 0，使块 1 成为 LRU
        drop(cache.bread(1, 0));
        let b = cache.bread(1, NBUF as u32);
        assert_eq!(b.index, slots[1]);
    }

    #[test]
    fn dirty_lru_buffer_is_skipped() {
        let cache = cache();
        let slots = fill(&cache, |blockno| blockno == 0);
        let reads = cache.disk().reads();

        let b = cache.bread(1, NBUF as u32);
        assert_eq!(b.index, slots[1]);
        drop(b);

        let b = cache.bread(1, 0);
        assert_eq!(b.index, slots[0]);
        assert!(b.is_dirty());
        assert_eq!(cache.disk().reads(), reads + 1);
    }

    #[test]
    #[should_panic(expected = "bget: no buffers")]
    fn all_dirty_exhausts() {
        let cache = cache();
        fill(&cache, |_| true);
        cache.bread(1, NBUF as u32);
    }

    #[test]
    #[should_panic(expected = "bget: no buffers")]
    fn held_buffers_exhaust() {
        let cache = cache();
        let held: Vec<_> = (0..NBUF as u32).map(|blockno| cache.bread(1, blockno)).collect();
        assert_eq!(held.len(), NBUF);
        cache.bget(1, NBUF as u32);
    }

    #[test]
    fn cleared_buffer_round_trips_through_disk() {
        let cache = cache();
        let mut b = cache.bread(1, 0);
        b.data_mut().fill(0xa5);
        b.bwrite();
        b.clear_dirty();
        assert!(!b.is_dirty());
        b.release();

        // 用其他块把块 0 挤出缓存
        for blockno in 1..=NBUF as u32 {
            drop(cache.bread(1, blockno));
        }
        let reads = cache.disk().reads();
        let b = cache.bread(1, 0);
        assert_eq!(cache.disk().reads(), reads + 1);
        assert!(b.data().iter().all(|&x| x == 0xa5));
    }

    #[test]
    fn concurrent_acquire_shares_one_buffer() {
        let cache = cache();
        let entered = AtomicBool::new(false);
        let mut first = cache.bread(1, 7);
        let index = first.index;

        thread::scope(|s| {
            let waiter = s.spawn(|| {
                let b = cache.bread(1, 7);
                entered.store(true, Ordering::SeqCst);
                (b.index, b.data()[0], b.is_valid())
            });

            // 第二个调用者已在缓存锁下加了引用，但还拿不到睡眠锁
            while refcnt(&cache, index) != 2 {
                thread::yield_now();
            }
            thread::sleep(Duration::from_millis(20));
            assert!(!entered.load(Ordering::SeqCst));

            first.data_mut()[0] = 0x5a;
            first.release();

            let (i, byte, valid) = waiter.join().unwrap();
            assert_eq!(i, index);
            assert_eq!(byte, 0x5a);
            assert!(valid);
        });

        assert!(entered.load(Ordering::SeqCst));
        assert_eq!(refcnt(&cache, index), 0);
        assert_eq!(cache.disk().reads(), 1);
    }

    #[test]
    fn waiting_reference_blocks_eviction() {
        let cache = cache();
        let slots = fill(&cache, |_| false);
        let first = cache.bread(1, 0);

        thread::scope(|s| {
            let waiter = s.spawn(|| cache.bread(1, 0).index);
            while refcnt(&cache, slots[0]) != 2 {
                thread::yield_now();
            }
            // 持有者释放后由等待者接手同一缓冲块
            drop(first);
            let i = waiter.join().unwrap();
            assert_eq!(i, slots[0]);
        });

        let b = cache.bread(1, NBUF as u32);
        assert_eq!(b.index, slots[1]);
    }
}
