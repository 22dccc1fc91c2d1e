// 该文件是 BINtrack 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::model::{Detection, DetectionResult};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BIN_COLOR: [u8; 3] = [0, 200, 0]; // 判定为垃圾桶
const WEAK_COLOR: [u8; 3] = [255, 160, 0]; // 有候选框但整体未通过判定

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  font: Option<FontArc>,
  bin_color: [u8; 3],
  weak_color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      font: None,
      bin_color: BIN_COLOR,
      weak_color: WEAK_COLOR,
    }
  }
}

impl Draw {
  /// 加载字体后才绘制文字标签，否则只画边框
  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let data = std::fs::read(path.as_ref())?;
    let font = FontArc::try_from_vec(data)?;
    debug!("已加载标签字体: {}", path.as_ref().display());
    Ok(Self {
      font: Some(font),
      ..Self::default()
    })
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 在图像副本上绘制所有检测框
  pub fn draw_detections(&self, image: &DynamicImage, result: &DetectionResult) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let color = if result.is_bin {
      self.bin_color
    } else {
      self.weak_color
    };
    for detection in result.detections.iter() {
      self.draw_bbox_with_label(&mut canvas, detection, color);
    }
    canvas
  }

  // bbox 为原图像素坐标 [x, y, width, height]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &Detection, color: [u8; 3]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let [x, y, bw, bh] = detection.bbox;

    let x_min = (x.floor() as i32).clamp(0, w - 1);
    let y_min = (y.floor() as i32).clamp(0, h - 1);
    let x_max = ((x + bw).ceil() as i32).clamp(0, w - 1);
    let y_max = ((y + bh).ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 绘制边框（加粗为2像素）
    let (box_w, box_h) = ((x_max - x_min + 1) as u32, (y_max - y_min + 1) as u32);
    draw_hollow_rect_mut(
      image,
      Rect::at(x_min, y_min).of_size(box_w, box_h),
      Rgb(color),
    );
    if box_w > 2 && box_h > 2 {
      draw_hollow_rect_mut(
        image,
        Rect::at(x_min + 1, y_min + 1).of_size(box_w - 2, box_h - 2),
        Rgb(color),
      );
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.2}", detection.label, detection.confidence);
    let text_width = (label.len() as f32 * self.label_char_width) as i32;
    let text_height = self.label_text_height;

    // 标签放在边框上方，并保持在图像内
    let label_x = x_min;
    let label_y = (y_min - text_height).max(0);
    let label_width = text_width.min(w - label_x).max(0) as u32;
    let label_height = text_height as u32;

    if label_width > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width, label_height);
      draw_filled_rect_mut(image, rect, Rgb(color));
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + self.label_text_vertical_padding,
        PxScale::from(self.font_size),
        font,
        &label,
      );
    }
  }
}
