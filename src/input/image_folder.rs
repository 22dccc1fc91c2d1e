// 该文件是 BINtrack 项目的一部分。
// src/input/image_folder.rs - 图像目录输入
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::Submission, url_path};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum ImageFolderInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 目录输入，例如 `folder:///srv/uploads`。
///
/// 只读取目录第一层的图片文件，按文件名排序。
pub struct ImageFolderInput {
  entries: Vec<PathBuf>,
}

impl FromUrlWithScheme for ImageFolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageFolderInput {
  type Error = ImageFolderInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!("输入方案不匹配: 期望 '{}', 实际 '{}'", Self::SCHEME, url.scheme());
      return Err(ImageFolderInputError::SchemaMismatch);
    }

    let directory = url_path(url);
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let path = entry?.path();
      if path.is_file() && is_image_file(&path) {
        entries.push(path);
      }
    }
    entries.sort();

    debug!("目录 {} 中共有 {} 张图片", directory.display(), entries.len());

    Ok(ImageFolderInput { entries })
  }
}

fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      let ext = ext.to_ascii_lowercase();
      IMAGE_EXTENSIONS.contains(&ext.as_str())
    })
    .unwrap_or(false)
}

impl ImageFolderInput {
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn into_submissions(self) -> ImageFolderSubmissions {
    ImageFolderSubmissions {
      entries: self.entries.into_iter(),
    }
  }
}

pub struct ImageFolderSubmissions {
  entries: std::vec::IntoIter<PathBuf>,
}

impl Iterator for ImageFolderSubmissions {
  type Item = Submission;

  fn next(&mut self) -> Option<Self::Item> {
    self.entries.next().map(Submission::from_path)
  }
}
