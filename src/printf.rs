//! 定义系统内核的输出方法

use core::fmt;
use core::sync::atomic::Ordering;

use crate::driver::{console, PANICKED};
use crate::spinlock::SpinLock;

/// 零大小类型（ZST）的打印结构体，用于在多个执行单元之间对打印操作进行排序。
struct Print;

impl fmt::Write for Print {
    /// 将字符串写入控制台
    fn write_str(&mut self, s: &str) -> fmt::Result {
        console::puts(s);
        Ok(())
    }
}

/// 核心打印函数（被宏调用）
///
/// # 功能说明
/// 根据系统状态决定是否加锁输出：
/// - 当系统处于panic状态时，直接输出（不加锁）
/// - 正常状态下使用自旋锁保证多个执行单元的输出不交错
///
/// # 参数
/// - `args`: 格式化参数
///
/// # 注意
/// 此函数被声明为pub，因为需要在宏中调用
#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    use fmt::Write;
    static PRINT: SpinLock<()> = SpinLock::new((), "print");

    // 格式化错误被忽略
    if PANICKED.load(Ordering::Relaxed) {
        // no need to lock
        let _ = Print.write_fmt(args);
    } else {
        let guard = PRINT.lock();
        let _ = Print.write_fmt(args);
        drop(guard);
    }
}

/// 在终端输出一串字符
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::printf::_print(format_args!($($arg)*));
    };
}

/// 在终端输出一行字符
#[macro_export]
macro_rules! println {
    () => {$crate::print!("\n")};
    ($fmt:expr) => {$crate::print!(concat!($fmt, "\n"))};
    ($fmt:expr, $($arg:tt)*) => {
        $crate::print!(concat!($fmt, "\n"), $($arg)*)
    };
}

/// 全局panic处理函数
///
/// # 功能说明
/// 1. 打印panic信息
/// 2. 设置全局panic状态标志，其他执行单元的控制台输出随之停止
/// 3. 挂起当前执行单元（无限循环）
///
/// 宿主环境下沿用标准库的 panic 机制。
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    crate::println!("{}", info);
    PANICKED.store(true, Ordering::Relaxed);
    loop {}
}

#[cfg(test)]
mod tests {
    use std::thread;

    #[test]
    fn println_from_many_units() {
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for i in 0..3 {
                        println!("println_mul_hart{}: hart {}", i, crate::process::cpu_id());
                    }
                });
            }
        });
        print!("");
        println!();
    }
}
