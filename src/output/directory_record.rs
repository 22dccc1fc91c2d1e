// 该文件是 BINtrack 项目的一部分。
// src/output/directory_record.rs - 按日期归档的目录记录输出
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
  path::{Path, PathBuf},
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{DateTime, Datelike, Utc};
use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  input::Submission,
  model::DetectionResult,
  output::{Render, draw::Draw},
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

pub enum DrawWrapper {
  /// 保存标注后的图像
  Draw(Box<Draw>),
  /// 保存原图
  Record,
}

impl DrawWrapper {
  fn save_image(
    &self,
    path: &Path,
    image: &DynamicImage,
    result: &DetectionResult,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw(draw) => draw.draw_detections(image, result).save(path)?,
      DrawWrapper::Record => image.to_rgb8().save(path)?,
    };
    Ok(())
  }
}

/// 记录 JSON 的内容
#[derive(serde::Serialize)]
struct RecordEntry<'a> {
  name: &'a str,
  #[serde(flatten)]
  result: &'a DetectionResult,
}

/// 目录输出，例如 `folder:///var/bintrack/records?record&always`。
///
/// 每次提交写入 `YYYY/MM/DD/HH-MM-SS-XXXX.png` 与同名 `.json`。
/// 默认只记录判定为垃圾桶的提交，`always` 时全部记录；`record` 时保存原图而非标注图。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let draw = if uri.query_pairs().any(|(k, _)| k == "record") {
      DrawWrapper::Record
    } else {
      DrawWrapper::Draw(Box::default())
    };
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: url_path(uri),
      draw,
      frame_counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self, now: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<Submission, DetectionResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    submission: &Submission,
    result: &DetectionResult,
  ) -> Result<(), Self::Error> {
    if !self.always && !result.is_bin {
      debug!("{} 未检测到垃圾桶，跳过记录", submission.name);
      return Ok(());
    }

    let path = self.frame_path(Utc::now())?;
    match submission.source.load() {
      Ok(image) => self.draw.save_image(&path, &image, result)?,
      Err(e) => warn!("无法读取 {} 的原图，只记录检测结果: {}", submission.name, e),
    }

    let entry = RecordEntry {
      name: &submission.name,
      result,
    };
    std::fs::write(path.with_extension("json"), serde_json::to_vec_pretty(&entry)?)?;
    debug!("已记录 {} 到 {}", submission.name, path.display());

    Ok(())
  }
}
