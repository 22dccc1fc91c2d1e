// 该文件是 BINtrack 项目的一部分。
// src/guard.rs - 防止同一图像重复检测
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 BINtrack contributors

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use tracing::debug;

/// 调用方持有的检测闸门。
///
/// 每张新图像对应一个闸门；检测进行中再次触发时直接忽略，不会取消正在进行的检测。
#[derive(Debug, Default, Clone)]
pub struct DetectionGate {
  running: Arc<AtomicBool>,
}

impl DetectionGate {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::Acquire)
  }

  pub fn try_acquire(&self) -> Option<DetectionGuard> {
    if self
      .running
      .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
      .is_ok()
    {
      Some(DetectionGuard {
        flag: Arc::clone(&self.running),
      })
    } else {
      debug!("检测进行中，忽略重复触发");
      None
    }
  }

  /// 闸门空闲时执行 `f`，否则返回 `None`
  pub fn run<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
    let _guard = self.try_acquire()?;
    Some(f())
  }
}

/// 离开作用域时释放闸门
#[derive(Debug)]
pub struct DetectionGuard {
  flag: Arc<AtomicBool>,
}

impl Drop for DetectionGuard {
  fn drop(&mut self) {
    self.flag.store(false, Ordering::Release);
  }
}
