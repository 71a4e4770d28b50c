//! 定义操作所需RISC-V寄存器的接口

pub mod sstatus;

/// 线程指针寄存器 (tp) 操作
///
/// 启动代码把当前 hart 的编号存入 tp，供 `cpu_id()` 使用。
pub mod tp {
    /// 读取 tp 寄存器值
    #[inline]
    pub unsafe fn read() -> usize {
        let ret: usize;
        core::arch::asm!("mv {}, tp", out(reg) ret);
        ret
    }
}
