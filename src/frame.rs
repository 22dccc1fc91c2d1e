// 该文件是 BINtrack 项目的一部分。
// src/frame.rs - NCHW 平面张量与预处理
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

use image::{DynamicImage, imageops::FilterType};
use ndarray::Array4;
use thiserror::Error;
use tracing::debug;

/// 垃圾桶模型的输入宽度
pub const MODEL_INPUT_W: u32 = 640;
/// 垃圾桶模型的输入高度
pub const MODEL_INPUT_H: u32 = 640;

const RGB_CHANNELS: usize = 3;
const PIXEL_SCALE: f32 = 255.0;

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  Decode(#[from] image::ImageError),
  #[error("图像尺寸无效: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
  #[error("张量形状错误: {0}")]
  Shape(#[from] ndarray::ShapeError),
}

/// 批大小为 1 的 RGB 平面张量，布局 [1, 3, H, W]，取值范围 [0, 1]
#[derive(Debug, Clone)]
pub struct PlanarFrame {
  data: Array4<f32>,
}

impl PlanarFrame {
  pub fn batch(&self) -> usize {
    self.data.shape()[0]
  }

  pub fn channels(&self) -> usize {
    self.data.shape()[1]
  }

  pub fn height(&self) -> usize {
    self.data.shape()[2]
  }

  pub fn width(&self) -> usize {
    self.data.shape()[3]
  }

  pub fn shape(&self) -> [usize; 4] {
    [self.batch(), self.channels(), self.height(), self.width()]
  }

  pub fn as_array(&self) -> &Array4<f32> {
    &self.data
  }

  /// 读取某个通道在 (x, y) 处的值
  pub fn value(&self, channel: usize, x: usize, y: usize) -> Option<f32> {
    self.data.get([0, channel, y, x]).copied()
  }
}

/// 将图像直接拉伸到目标尺寸（不保持宽高比），丢弃 alpha 通道，
/// 按通道重新排列为平面 RGB，并除以 255 归一化。
pub fn preprocess(
  image: &DynamicImage,
  target_width: u32,
  target_height: u32,
) -> Result<PlanarFrame, PreprocessError> {
  if image.width() == 0 || image.height() == 0 {
    return Err(PreprocessError::EmptyImage {
      width: image.width(),
      height: image.height(),
    });
  }
  if target_width == 0 || target_height == 0 {
    return Err(PreprocessError::EmptyImage {
      width: target_width,
      height: target_height,
    });
  }

  debug!(
    "预处理图像: {}x{} -> {}x{}",
    image.width(),
    image.height(),
    target_width,
    target_height
  );

  // 缩放后的 RGBA 画布只在本函数内存活
  let resized = image
    .resize_exact(target_width, target_height, FilterType::Triangle)
    .into_rgba8();

  let width = target_width as usize;
  let height = target_height as usize;
  let plane = width * height;
  let mut data = vec![0f32; RGB_CHANNELS * plane];

  for (idx, pixel) in resized.pixels().enumerate() {
    for c in 0..RGB_CHANNELS {
      data[c * plane + idx] = pixel[c] as f32 / PIXEL_SCALE;
    }
  }

  let data = Array4::from_shape_vec((1, RGB_CHANNELS, height, width), data)?;
  Ok(PlanarFrame { data })
}
