//! 每个执行单元私有的中断嵌套状态

use core::cell::Cell;

use super::hart::{intr_get, intr_off, intr_on, with_cpu};

/// CPU 结构体，保存单个执行单元的关中断嵌套状态。
///
/// 该结构体只由所属执行单元在关中断的情况下访问，从不在执行单元之间共享，
/// 因此不需要额外的锁保护。
pub struct Cpu {
    /// 关闭中断的嵌套计数，表示当前中断被禁止的层数。
    /// 每调用一次 `push_off` 计数加 1，每调用一次 `pop_off` 计数减 1。
    noff: Cell<u8>,

    /// 记录最外层 `push_off` 之前的中断使能状态，用于恢复中断。
    intena: Cell<bool>,
}

impl Cpu {
    pub(super) const fn new() -> Self {
        Self {
            noff: Cell::new(0),
            intena: Cell::new(false),
        }
    }
}

/// # 功能说明
/// 关闭当前执行单元的中断，并记录中断关闭的嵌套次数。
/// 与 `intr_off()` 类似，但支持成对使用，
/// 多次调用 `push_off()` 需要相应次数的 `pop_off()` 才能恢复中断状态。
/// 如果中断原本就是关闭状态，调用后保持关闭。
///
/// # 流程解释
/// 1. 读取当前中断使能状态 `old`。
/// 2. 关闭中断。
/// 3. 若嵌套计数 `noff` 为 0，说明这是最外层的关闭，
///    将原始中断状态保存到 `intena`，用于后续恢复。
/// 4. 将嵌套计数 `noff` 自增 1。
pub fn push_off() {
    let old = intr_get();
    intr_off();
    with_cpu(|c| {
        if c.noff.get() == 0 {
            c.intena.set(old);
        }
        c.noff.set(c.noff.get() + 1);
    });
}

/// # 功能说明
/// 解除之前通过 `push_off()` 关闭的中断，
/// 只有所有嵌套的关闭操作都对应调用后，
/// 并且最外层 `push_off()` 之前中断是开启的，才真正重新开启中断。
///
/// # 可能的错误
/// - 如果在中断已开启时调用，会 panic；
/// - 如果调用次数与 `push_off()` 不匹配，会 panic。
pub fn pop_off() {
    if intr_get() {
        panic!("pop_off(): interruptable");
    }
    let restore = with_cpu(|c| {
        let noff = match c.noff.get().checked_sub(1) {
            Some(noff) => noff,
            None => panic!("pop_off(): count not match"),
        };
        c.noff.set(noff);
        noff == 0 && c.intena.get()
    });
    if restore {
        intr_on();
    }
}

/// 当前执行单元的关中断嵌套层数
pub fn noff() -> u8 {
    push_off();
    // 减去本函数自身的一层
    let depth = with_cpu(|c| c.noff.get()) - 1;
    pop_off();
    depth
}
