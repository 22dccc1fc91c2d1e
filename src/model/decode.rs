// 该文件是 BINtrack 项目的一部分。
// src/model/decode.rs - 单类别检测输出解码
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

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{BIN_LABEL, Detection, DetectorConfig, RawOutput};

const OUTPUT_RANK: usize = 3;
/// cx, cy, w, h, confidence
const BOX_CHANNELS: usize = 5;

const CHANNEL_CX: usize = 0;
const CHANNEL_CY: usize = 1;
const CHANNEL_W: usize = 2;
const CHANNEL_H: usize = 3;
const CHANNEL_CONF: usize = 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeFormatError {
  #[error("输出维度应为 3, 实际形状 {0:?}")]
  Rank(Vec<usize>),
  #[error("输出通道数应为 5, 实际为 {0}")]
  Channels(usize),
  #[error("输出数据长度不匹配: 期望 {expected}, 实际 {actual}")]
  Length { expected: usize, actual: usize },
}

/// 归一化的中心点框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxCandidate {
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
  pub confidence: f32,
}

impl BoxCandidate {
  /// 坐标与尺寸均为有限值
  pub fn is_finite(&self) -> bool {
    [self.cx, self.cy, self.w, self.h].iter().all(|v| v.is_finite())
  }
}

/// `[1, 5, N]` 输出的只读视图，构造时校验形状，之后按 `[c * N + i]` 取值
#[derive(Debug, Clone, Copy)]
pub struct BoxTensorView<'a> {
  data: &'a [f32],
  num_boxes: usize,
}

impl<'a> BoxTensorView<'a> {
  pub fn try_new(raw: &'a RawOutput) -> Result<Self, DecodeFormatError> {
    let shape = raw.shape();
    if shape.len() != OUTPUT_RANK {
      return Err(DecodeFormatError::Rank(shape.to_vec()));
    }
    if shape[1] != BOX_CHANNELS {
      return Err(DecodeFormatError::Channels(shape[1]));
    }

    let expected: usize = shape.iter().product();
    if raw.data().len() != expected {
      return Err(DecodeFormatError::Length {
        expected,
        actual: raw.data().len(),
      });
    }

    // 批大小大于 1 时只读第一批
    let num_boxes = if shape[0] == 0 { 0 } else { shape[2] };
    Ok(BoxTensorView {
      data: &raw.data()[..BOX_CHANNELS * num_boxes],
      num_boxes,
    })
  }

  pub fn num_boxes(&self) -> usize {
    self.num_boxes
  }

  fn at(&self, channel: usize, index: usize) -> f32 {
    self.data[channel * self.num_boxes + index]
  }

  pub fn candidate(&self, index: usize) -> Option<BoxCandidate> {
    if index >= self.num_boxes {
      return None;
    }
    Some(BoxCandidate {
      cx: self.at(CHANNEL_CX, index),
      cy: self.at(CHANNEL_CY, index),
      w: self.at(CHANNEL_W, index),
      h: self.at(CHANNEL_H, index),
      confidence: self.at(CHANNEL_CONF, index),
    })
  }

  pub fn candidates(&self) -> impl Iterator<Item = BoxCandidate> + '_ {
    (0..self.num_boxes).filter_map(|i| self.candidate(i))
  }
}

/// 解码模型输出为原图像素坐标下的检测框。
///
/// 输出格式无法识别时记录警告并返回空列表。不做 NMS，重叠框原样保留。
pub fn decode(
  raw: &RawOutput,
  img_width: u32,
  img_height: u32,
  config: &DetectorConfig,
) -> Vec<Detection> {
  let view = match BoxTensorView::try_new(raw) {
    Ok(view) => view,
    Err(e) => {
      warn!("无法识别的模型输出格式: {}", e);
      return Vec::new();
    }
  };

  let (img_w, img_h) = (img_width as f32, img_height as f32);
  let threshold = config.confidence_threshold;

  let mut detections: Vec<Detection> = view
    .candidates()
    // NaN 置信度同样丢弃
    .filter(|c| c.confidence >= threshold)
    .filter(|c| {
      let finite = c.is_finite();
      if !finite {
        debug!("丢弃坐标非有限值的候选框: {:?}", c);
      }
      finite
    })
    .map(|c| Detection {
      label: BIN_LABEL.to_string(),
      confidence: c.confidence,
      bbox: [
        (c.cx - c.w / 2.0) * img_w,
        (c.cy - c.h / 2.0) * img_h,
        c.w * img_w,
        c.h * img_h,
      ],
    })
    .collect();

  debug!(
    "{} 个候选框中 {} 个超过阈值 {}",
    view.num_boxes(),
    detections.len(),
    threshold
  );

  if detections.len() > config.max_detections {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections.truncate(config.max_detections);
  }

  detections
}
