//! 16550 串口的同步输出

use core::ptr;
use core::sync::atomic::Ordering;

use crate::consts::UART0;
use crate::process::{pop_off, push_off};

use super::PANICKED;

/// 寄存器访问宏
///
/// 将寄存器偏移量转换为物理地址
macro_rules! Reg {
    ($reg: expr) => {
        UART0 + $reg
    };
}

macro_rules! ReadReg {
    ($reg: expr) => {
        unsafe { ptr::read_volatile(Reg!($reg) as *const u8) }
    };
}

macro_rules! WriteReg {
    ($reg: expr, $value: expr) => {
        unsafe {
            ptr::write_volatile(Reg!($reg) as *mut u8, $value);
        }
    };
}

/// 初始化 UART 设备
///
/// # 功能说明
/// 配置 UART 设备参数：关闭中断，设置 38.4K 波特率与 8N1 数据格式，启用 FIFO。
/// 输出只使用同步方式，因此不开启任何 UART 中断。
pub(super) fn init() {
    // 禁用中断
    WriteReg!(IER, 0x00);

    // 用于设置波特率的特殊模式
    WriteReg!(LCR, 0x80);

    // 38.4K 波特率的最低有效位
    WriteReg!(0, 0x03);

    // 38.4K 波特率的最高有效位
    WriteReg!(1, 0x00);

    // 退出设置波特率模式，
    // 并将字长设置为 8 位，无校验。
    WriteReg!(LCR, 0x03);

    //  重置并启用 FIFO
    WriteReg!(FCR, 0x07);
}

/// 同步阻塞方式输出字符
///
/// # 注意
/// 其他执行单元已经 panic 时进入死循环，不再输出
pub(super) fn putc_sync(c: u8) {
    push_off();
    if PANICKED.load(Ordering::Relaxed) {
        loop {}
    }
    while !is_idle() {}
    WriteReg!(THR, c);
    pop_off();
}

// 16550 UART 寄存器偏移量定义
// reference: http://byterunner.com/16550.html
const THR: usize = 0;       // 传输保持寄存器 (写操作)
const IER: usize = 1;       // 中断使能寄存器
const FCR: usize = 2;       // FIFO 控制寄存器
const LCR: usize = 3;       // 线路控制寄存器
const LSR: usize = 5;       // 线路状态寄存器

/// 检查 UART 是否空闲（LSR[5] 表示传输保持寄存器为空）
#[inline]
fn is_idle() -> bool {
    ReadReg!(LSR) & (1 << 5) > 0
}
