// 该文件是 BINtrack 项目的一部分。
// src/input.rs - 图像提交输入
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

use std::{borrow::Cow, io::Cursor, path::PathBuf};

use image::{DynamicImage, ImageReader};
use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, frame::PreprocessError};

mod image_folder;
mod read_image_file;

pub use self::image_folder::{ImageFolderInput, ImageFolderInputError};
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// 图像来源。读取与解码属于预处理阶段，失败时返回 [`PreprocessError`]。
#[derive(Debug, Clone)]
pub enum ImageSource {
  Path(PathBuf),
  Bytes(Vec<u8>),
  Decoded(DynamicImage),
}

impl ImageSource {
  pub fn load(&self) -> Result<Cow<'_, DynamicImage>, PreprocessError> {
    match self {
      ImageSource::Path(path) => {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        Ok(Cow::Owned(image))
      }
      ImageSource::Bytes(bytes) => {
        let image = ImageReader::new(Cursor::new(bytes))
          .with_guessed_format()?
          .decode()?;
        Ok(Cow::Owned(image))
      }
      ImageSource::Decoded(image) => Ok(Cow::Borrowed(image)),
    }
  }
}

impl From<DynamicImage> for ImageSource {
  fn from(image: DynamicImage) -> Self {
    ImageSource::Decoded(image)
  }
}

impl From<PathBuf> for ImageSource {
  fn from(path: PathBuf) -> Self {
    ImageSource::Path(path)
  }
}

impl From<Vec<u8>> for ImageSource {
  fn from(bytes: Vec<u8>) -> Self {
    ImageSource::Bytes(bytes)
  }
}

/// 一次待检测的图像提交
#[derive(Debug, Clone)]
pub struct Submission {
  pub name: String,
  pub source: ImageSource,
}

impl Submission {
  pub fn from_path(path: PathBuf) -> Self {
    let name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.display().to_string());
    Submission {
      name,
      source: ImageSource::Path(path),
    }
  }
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("图像目录输入错误: {0}")]
  ImageFolderInputError(#[from] ImageFolderInputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum InputWrapper {
  ImageFile(ImageFileInput),
  ImageFolder(ImageFolderInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?)),
      ImageFolderInput::SCHEME => Ok(InputWrapper::ImageFolder(ImageFolderInput::from_url(url)?)),
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl InputWrapper {
  pub fn into_submissions(self) -> InputWrapperIter {
    match self {
      InputWrapper::ImageFile(input) => InputWrapperIter::ImageFile(input.into_submissions()),
      InputWrapper::ImageFolder(input) => InputWrapperIter::ImageFolder(input.into_submissions()),
    }
  }
}

pub enum InputWrapperIter {
  ImageFile(self::read_image_file::ImageFileSubmissions),
  ImageFolder(self::image_folder::ImageFolderSubmissions),
}

impl Iterator for InputWrapperIter {
  type Item = Submission;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapperIter::ImageFile(input) => input.next(),
      InputWrapperIter::ImageFolder(input) => input.next(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgba, RgbaImage};

  fn png_bytes() -> Vec<u8> {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255])));
    let mut bytes = Vec::new();
    image
      .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
      .unwrap();
    bytes
  }

  #[test]
  fn bytes_are_decoded() {
    let source = ImageSource::from(png_bytes());
    let image = source.load().unwrap();
    assert_eq!((image.width(), image.height()), (3, 2));
  }

  #[test]
  fn garbage_bytes_fail_to_decode() {
    let source = ImageSource::from(b"not an image".to_vec());
    assert!(matches!(source.load(), Err(PreprocessError::Decode(_))));
  }

  #[test]
  fn missing_file_is_an_io_error() {
    let source = ImageSource::from(PathBuf::from("/definitely/not/here.png"));
    assert!(matches!(source.load(), Err(PreprocessError::Io(_))));
  }

  #[test]
  fn decoded_image_is_borrowed() {
    let source = ImageSource::from(DynamicImage::new_rgba8(2, 2));
    assert!(matches!(source.load().unwrap(), Cow::Borrowed(_)));
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = url::Url::parse("camera:///dev/video0").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch)
    ));
  }
}
