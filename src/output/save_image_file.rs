// 该文件是 BINtrack 项目的一部分。
// src/output/save_image_file.rs - 保存标注后的图像文件
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::Submission,
  model::DetectionResult,
  output::{
    Render,
    draw::{Draw, DrawError},
  },
  url_path,
};

/// 保存标注图像，例如 `image:///tmp/out.png?font=/usr/share/fonts/DejaVuSans.ttf`
pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("绘制器初始化错误: {0}")]
  DrawError(DrawError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let draw = match uri.query_pairs().find(|(k, _)| k == "font") {
      Some((_, font)) => {
        Draw::with_font_file(&*font).map_err(SaveImageFileError::DrawError)?
      }
      None => Draw::default(),
    };

    Ok(SaveImageFileOutput {
      path: url_path(uri),
      draw,
    })
  }
}

impl SaveImageFileOutput {
  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;

    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<Submission, DetectionResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(
    &self,
    submission: &Submission,
    result: &DetectionResult,
  ) -> Result<(), Self::Error> {
    // 原图无法读取时检测结果已按未检测到处理，这里只跳过绘制
    let source = match submission.source.load() {
      Ok(source) => source,
      Err(e) => {
        warn!("无法读取 {} 的原图，跳过保存: {}", submission.name, e);
        return Ok(());
      }
    };
    let image = self.draw.draw_detections(&source, result);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use image::DynamicImage;

  use super::*;
  use crate::{
    input::ImageSource,
    model::{BIN_LABEL, Detection},
  };

  #[test]
  fn writes_annotated_copy_and_creates_parents() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested/out.png");
    let url = Url::parse(&format!("image://{}", target.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();

    let submission = Submission {
      name: "memory".to_string(),
      source: ImageSource::from(DynamicImage::new_rgb8(32, 24)),
    };
    let result = DetectionResult::from_detections(
      vec![Detection {
        label: BIN_LABEL.to_string(),
        confidence: 0.9,
        bbox: [4.0, 4.0, 10.0, 10.0],
      }],
      0.2,
    );
    output.render_result(&submission, &result).unwrap();

    let saved = image::open(&target).unwrap();
    assert_eq!((saved.width(), saved.height()), (32, 24));
  }

  #[test]
  fn unreadable_source_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.png");
    let url = Url::parse(&format!("image://{}", target.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();
    let submission = Submission::from_path(dir.path().join("missing.jpg"));

    output
      .render_result(&submission, &DetectionResult::negative())
      .unwrap();
    assert!(!target.exists());
  }
}
