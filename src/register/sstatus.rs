//! 监督状态寄存器 (sstatus) 操作模块

use core::arch::asm;

use bit_field::BitField;

/// supervisor interrupt enable 位的下标
const SIE: usize = 1;

/// 读取 sstatus 寄存器的当前值
#[inline]
pub fn read() -> usize {
    let ret: usize;
    unsafe { asm!("csrr {}, sstatus", out(reg) ret); }
    ret
}

/// 写入 sstatus 寄存器
///
/// # 注意事项
/// 直接修改整个寄存器可能影响多个状态位，
/// 建议使用特定功能函数进行部分修改
#[inline]
pub fn write(x: usize) {
    unsafe { asm!("csrw sstatus, {}", in(reg) x); }
}

/// 启用监督模式全局中断 (SIE)
///
/// 还需在 `sie` 寄存器中启用具体中断类型，且中断需已委托到监督模式。
#[inline]
pub fn intr_on() {
    let mut x = read();
    x.set_bit(SIE, true);
    write(x);
}

/// 禁用监督模式全局中断 (SIE)
#[inline]
pub fn intr_off() {
    let mut x = read();
    x.set_bit(SIE, false);
    write(x);
}

/// 检查全局中断是否已启用
#[inline]
pub fn intr_get() -> bool {
    read().get_bit(SIE)
}
