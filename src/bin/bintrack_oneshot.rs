// 该文件是 BINtrack 项目的一部分。
// src/bin/bintrack_oneshot.rs - 检测单张图像
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use bintrack::{
  FromUrl,
  input::InputWrapper,
  model::BinDetectorBuilder,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};

/// BINtrack 垃圾桶检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型，例如 onnx:///models/bin.onnx?threshold=0.2
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，image:// 或 folder://
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，image://、folder:// 或 json://
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let model = BinDetectorBuilder::from_url(&args.model)?.build()?;
  let output = OutputWrapper::from_url(&args.output)?;

  let result = OneShotTask.run_task(input.into_submissions(), model, output)?;
  info!(
    "is_bin={}, 检测数={}, 最高置信度={:.3}",
    result.is_bin,
    result.detections.len(),
    result.highest_confidence
  );

  Ok(())
}
