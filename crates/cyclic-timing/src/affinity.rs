//! CPU 亲和性能力接口
//!
//! 把当前线程绑定到最空闲的逻辑核心，并在退出时恢复原始亲和性。
//!
//! - 负载采样：`sysinfo`（约 200ms 采样窗口，只在启动时付出一次）
//! - 绑定：`core_affinity`
//! - 保存/恢复原始掩码：Linux 上使用 `sched_getaffinity` / `sched_setaffinity`，
//!   其他平台恢复为空操作（仅记录日志）

use std::time::Duration;
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::{debug, warn};

/// 负载采样窗口
const SAMPLE_WINDOW: Duration = Duration::from_millis(200);

/// CPU 亲和性能力
///
/// 定时器线程只通过这个 trait 使用亲和性，平台细节由实现负责。
pub trait CpuAffinity: Send {
    /// 把当前线程绑定到最空闲的核心
    ///
    /// 返回绑定的核心编号；失败返回 `None`，线程保持原状。
    fn pin_to_least_busy_core(&mut self) -> Option<usize>;

    /// 恢复绑定前的亲和性
    fn restore(&mut self);
}

/// 基于操作系统的亲和性实现
#[derive(Default)]
pub struct SystemCpuAffinity {
    pinned: Option<usize>,
    #[cfg(target_os = "linux")]
    original: Option<libc::cpu_set_t>,
}

impl SystemCpuAffinity {
    /// 创建（不做任何系统调用）
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前绑定的核心
    pub fn pinned_core(&self) -> Option<usize> {
        self.pinned
    }

    /// 逻辑核心数量
    pub fn core_count() -> usize {
        core_affinity::get_core_ids().map(|ids| ids.len()).unwrap_or(1)
    }

    /// 采样各核心负载并返回最空闲的核心
    ///
    /// 采样失败时回退到核心 0。
    pub fn find_least_busy_core() -> usize {
        let Some(core_ids) = core_affinity::get_core_ids() else {
            return 0;
        };

        let mut sys = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()),
        );
        std::thread::sleep(SAMPLE_WINDOW.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        sys.refresh_cpu_usage();

        let usages: Vec<f32> = sys.cpus().iter().map(|cpu| cpu.cpu_usage()).collect();
        least_busy(&usages, core_ids.iter().map(|id| id.id)).unwrap_or(0)
    }

    #[cfg(target_os = "linux")]
    fn save_original(&mut self) {
        // SAFETY: cpu_set_t 是纯数据结构，全零是合法的空集合；
        // pid 0 表示调用线程
        let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        let rc = unsafe {
            libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set)
        };
        if rc == 0 {
            self.original = Some(set);
        } else {
            warn!(
                "sched_getaffinity failed: {}",
                std::io::Error::last_os_error()
            );
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn save_original(&mut self) {}
}

impl CpuAffinity for SystemCpuAffinity {
    fn pin_to_least_busy_core(&mut self) -> Option<usize> {
        self.save_original();

        let core = Self::find_least_busy_core();
        if core_affinity::set_for_current(core_affinity::CoreId { id: core }) {
            debug!("Thread pinned to CPU core {}", core);
            self.pinned = Some(core);
            Some(core)
        } else {
            warn!("Failed to pin thread to CPU core {}", core);
            None
        }
    }

    fn restore(&mut self) {
        if self.pinned.take().is_none() {
            return;
        }

        #[cfg(target_os = "linux")]
        if let Some(set) = self.original.take() {
            // SAFETY: set 由 sched_getaffinity 填充
            let rc = unsafe {
                libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
            };
            if rc != 0 {
                warn!(
                    "sched_setaffinity failed: {}",
                    std::io::Error::last_os_error()
                );
            }
        }

        #[cfg(not(target_os = "linux"))]
        debug!("CPU affinity restore is not supported on this platform");
    }
}

/// RAII 亲和性守卫：创建时绑定，析构时恢复
pub struct AffinityGuard<A: CpuAffinity> {
    affinity: A,
    core: Option<usize>,
}

impl<A: CpuAffinity> AffinityGuard<A> {
    /// 绑定当前线程到最空闲的核心
    pub fn pin_least_busy(mut affinity: A) -> Self {
        let core = affinity.pin_to_least_busy_core();
        Self { affinity, core }
    }

    /// 绑定的核心（失败为 `None`）
    pub fn core(&self) -> Option<usize> {
        self.core
    }
}

impl<A: CpuAffinity> Drop for AffinityGuard<A> {
    fn drop(&mut self) {
        self.affinity.restore();
    }
}

/// 在可用核心中选择负载最低的一个
///
/// `usages[i]` 是逻辑核心 i 的使用率；没有采样数据的核心被忽略。
fn least_busy(usages: &[f32], available: impl Iterator<Item = usize>) -> Option<usize> {
    available
        .filter_map(|id| usages.get(id).map(|usage| (id, *usage)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
}
