// 该文件是 BINtrack 项目的一部分。
// src/model.rs - 模型
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

use serde::{Deserialize, Serialize};
use tracing::error;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;

  /// 推理失败时记录错误并返回默认输出，错误不向调用方传播
  fn infer_or_default(&self, input: &Self::Input) -> Self::Output
  where
    Self::Output: Default,
    Self::Error: std::fmt::Display,
  {
    match self.infer(input) {
      Ok(output) => output,
      Err(e) => {
        error!("推理失败，返回默认结果: {}", e);
        Self::Output::default()
      }
    }
  }
}

/// 单类别模型的唯一标签
pub const BIN_LABEL: &str = "bin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub label: String,
  pub confidence: f32,
  pub bbox: [f32; 4], // [x, y, width, height]，原图像素坐标
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
  pub is_bin: bool,
  pub detections: Vec<Detection>,
  pub highest_confidence: f32,
}

impl DetectionResult {
  /// 未检测到垃圾桶，所有失败路径都收敛到这个结果
  pub fn negative() -> Self {
    DetectionResult {
      is_bin: false,
      detections: Vec::new(),
      highest_confidence: 0.0,
    }
  }

  pub fn from_detections(detections: Vec<Detection>, threshold: f32) -> Self {
    let highest_confidence = detections
      .iter()
      .map(|d| d.confidence)
      .fold(0.0f32, f32::max);
    let is_bin = !detections.is_empty() && highest_confidence > threshold;

    DetectionResult {
      is_bin,
      detections,
      highest_confidence,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }
}

impl Default for DetectionResult {
  fn default() -> Self {
    Self::negative()
  }
}

mod bin_detector;
mod decode;
mod session;

pub use self::bin_detector::{
  BIN_CONFIDENCE_THRESHOLD, BinDetector, BinDetectorBuilder, BinDetectorBuilderError, DetectError,
  DetectorConfig, MAX_DETECTIONS,
};
pub use self::decode::{BoxCandidate, BoxTensorView, DecodeFormatError, decode};
pub use self::session::{InferenceBackend, InferenceError, OnnxBackend, RawOutput};
