//! 控制台输出
//!
//! 裸机上逐字节同步写入串口；宿主环境下写入进程的标准输出。

/// 初始化控制台驱动
///
/// # 安全性
/// 必须仅在系统启动时调用一次
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub unsafe fn init() {
    super::uart::init();
}

/// 向控制台输出一个字符串
///
/// 调用者负责多个执行单元之间的输出排序，见 `printf`。
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub fn puts(s: &str) {
    for c in s.bytes() {
        super::uart::putc_sync(c);
    }
}

/// 向控制台输出一个字符串
///
/// 标准输出不可写时静默丢弃，控制台输出不影响调用者。
#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
pub fn puts(s: &str) {
    use std::io::Write;

    let _ = std::io::stdout().lock().write_all(s.as_bytes());
}
