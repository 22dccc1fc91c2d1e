// 该文件是 BINtrack 项目的一部分。
// src/input/read_image_file.rs - 单个图像文件输入
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
use tracing::error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::Submission, url_path};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("图像路径为空")]
  EmptyPath,
}

/// 单张图片输入，例如 `image:///data/report/bin.jpg`。
///
/// 文件在检测时才读取和解码，读取失败按预处理错误处理。
pub struct ImageFileInput {
  submission: Option<Submission>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!("输入方案不匹配: 期望 '{}', 实际 '{}'", Self::SCHEME, url.scheme());
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = url_path(url);
    if path.as_os_str().is_empty() || path.as_os_str() == "/" {
      return Err(ImageFileInputError::EmptyPath);
    }

    Ok(ImageFileInput {
      submission: Some(Submission::from_path(path)),
    })
  }
}

impl ImageFileInput {
  pub fn into_submissions(self) -> ImageFileSubmissions {
    ImageFileSubmissions { inner: self }
  }
}

pub struct ImageFileSubmissions {
  inner: ImageFileInput,
}

impl Iterator for ImageFileSubmissions {
  type Item = Submission;

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.submission.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::ImageSource;

  #[test]
  fn yields_exactly_one_submission() {
    let url = Url::parse("image:///srv/uploads/bin-001.jpg").unwrap();
    let mut submissions = ImageFileInput::from_url(&url).unwrap().into_submissions();

    let first = submissions.next().unwrap();
    assert_eq!(first.name, "bin-001.jpg");
    assert!(matches!(first.source, ImageSource::Path(ref p) if p.ends_with("bin-001.jpg")));
    assert!(submissions.next().is_none());
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("folder:///srv/uploads").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
