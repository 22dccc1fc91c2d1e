// 该文件是 BINtrack 项目的一部分。
// src/task.rs - 检测任务
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

use std::{
  sync::mpsc::{self, Receiver},
  thread,
  time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{
  model::{DetectionResult, Model},
  output::Render,
};

/// 统计平均耗时时跳过的预热次数
const WARMUP_RUNS: usize = 2;

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 检测并渲染一次提交，检测失败按未检测到处理
fn detect_and_render<F, M, O>(
  frame: &F,
  model: &M,
  output: &O,
) -> anyhow::Result<(DetectionResult, Duration)>
where
  M: Model<Input = F, Output = DetectionResult>,
  M::Error: std::fmt::Display,
  O: Render<F, DetectionResult>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  let now = Instant::now();
  let result = model.infer_or_default(frame);
  let elapsed = now.elapsed();
  output.render_result(frame, &result)?;
  Ok((result, elapsed))
}

pub struct OneShotTask;

impl<F, I, M, O> Task<I, M, O> for OneShotTask
where
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = DetectionResult>,
  M::Error: std::fmt::Display,
  O: Render<F, DetectionResult>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = DetectionResult;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始检测...");
    let (result, elapsed) = detect_and_render(&frame, &model, &output)?;
    info!(
      "检测完成，耗时: {:.2?}, is_bin={}, 最高置信度={:.3}",
      elapsed, result.is_bin, result.highest_confidence
    );

    Ok(result)
  }
}

/// 重复检测同一张图像，用于测量耗时并确认结果稳定
pub struct RepeatShotTask {
  times: usize,
}

#[derive(Debug, Clone)]
pub struct RepeatShotReport {
  pub runs: usize,
  pub average: Duration,
  /// 所有轮次结果是否一致
  pub consistent: bool,
  pub last: DetectionResult,
}

impl RepeatShotTask {
  pub fn new(times: usize) -> Self {
    RepeatShotTask { times }
  }
}

fn average_time(times: &[Duration]) -> Duration {
  let measured = if times.len() > WARMUP_RUNS {
    &times[WARMUP_RUNS..]
  } else {
    times
  };
  if measured.is_empty() {
    return Duration::ZERO;
  }
  measured.iter().sum::<Duration>() / measured.len() as u32
}

impl<F, I, M, O> Task<I, M, O> for RepeatShotTask
where
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = DetectionResult>,
  M::Error: std::fmt::Display,
  O: Render<F, DetectionResult>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = RepeatShotReport;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    if self.times == 0 {
      anyhow::bail!("重复次数必须大于 0");
    }

    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始重复检测 {} 次...", self.times);

    let mut times = Vec::with_capacity(self.times);
    let mut first: Option<DetectionResult> = None;
    let mut consistent = true;
    let mut last = DetectionResult::negative();
    for i in 0..self.times {
      let (result, elapsed) = detect_and_render(&frame, &model, &output)?;
      info!("({})检测完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);

      match &first {
        Some(expected) if *expected != result => {
          warn!("({})检测结果与第一次不一致", i);
          consistent = false;
        }
        Some(_) => {}
        None => first = Some(result.clone()),
      }
      last = result;
    }

    let average = average_time(&times);
    warn!("平均检测时间: {:.2?}", average);

    Ok(RepeatShotReport {
      runs: self.times,
      average,
      consistent,
      last,
    })
  }
}

/// 连续处理输入中的所有图像，直到输入耗尽、达到指定数量或收到中断信号
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  interrupt: Option<Receiver<()>>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ContinuousSummary {
  pub processed: usize,
  pub bins: usize,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 每处理完一张图像检查一次中断信号
  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .is_some_and(|rx| rx.try_recv().is_ok())
  }
}

/// 注册进程级 Ctrl-C 处理器，每个进程只应调用一次
pub fn install_interrupt_handler() -> Result<Receiver<()>, ctrlc::Error> {
  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(rx)
}

impl<F, I, M, O> Task<I, M, O> for ContinuousTask
where
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = DetectionResult>,
  M::Error: std::fmt::Display,
  O: Render<F, DetectionResult>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = ContinuousSummary;
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");

    let limit = self.frame_number.unwrap_or(usize::MAX);
    let mut summary = ContinuousSummary::default();
    for frame in input.take(limit) {
      info!("处理第 {} 张图像", summary.processed + 1);
      let (result, elapsed) = detect_and_render(&frame, &model, &output)?;
      info!("检测完成，耗时: {:.2?}, is_bin={}", elapsed, result.is_bin);

      summary.processed += 1;
      if result.is_bin {
        summary.bins += 1;
      }

      // 只在两次检测之间响应中断
      if self.interrupted() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    if self.frame_number == Some(summary.processed) {
      info!("达到指定数量 {}, 退出任务循环", summary.processed);
    }
    info!(
      "任务完成，共处理 {} 张图像，其中 {} 张检测到垃圾桶",
      summary.processed, summary.bins
    );
    Ok(summary)
  }
}
