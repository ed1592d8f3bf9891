// 该文件是 Shanan （山南西风） 项目的一部分。
// src/feature/image_file.rs - 图像文件输入特征
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::{ImageReader, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  feature::{AspectMode, Feature, FeatureError, FeatureType, ImageFeature, ImageType},
  tensor::{ElementType, Tensor},
};

#[derive(Error, Debug)]
pub enum ImageFileFeatureError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 从文件读取的 RGB 图像，按需缩放为模型输入
#[derive(Debug, Clone)]
pub struct ImageFileFeature {
  image: RgbImage,
  aspect_mode: AspectMode,
}

impl FromUrlWithScheme for ImageFileFeature {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileFeature {
  type Error = ImageFileFeatureError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileFeatureError::SchemeMismatch(url.scheme().to_string()));
    }

    let image = ImageReader::open(url.path())?.decode()?;
    debug!("读取图像 {}: {}x{}", url.path(), image.width(), image.height());

    Ok(ImageFileFeature::from(image.to_rgb8()))
  }
}

impl From<RgbImage> for ImageFileFeature {
  fn from(image: RgbImage) -> Self {
    ImageFileFeature {
      image,
      aspect_mode: AspectMode::default(),
    }
  }
}

impl ImageFileFeature {
  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  fn resize(&self, width: u32, height: u32) -> RgbImage {
    let (src_w, src_h) = self.image.dimensions();

    match self.aspect_mode {
      AspectMode::ScaleToFit => {
        image::imageops::resize(&self.image, width, height, FilterType::Triangle)
      }
      AspectMode::AspectFit => {
        let scale = (width as f32 / src_w as f32).min(height as f32 / src_h as f32);
        let fit_w = ((src_w as f32 * scale).round() as u32).clamp(1, width);
        let fit_h = ((src_h as f32 * scale).round() as u32).clamp(1, height);
        let resized = image::imageops::resize(&self.image, fit_w, fit_h, FilterType::Triangle);

        // 居中放置，其余部分保持为零填充
        let mut canvas = RgbImage::new(width, height);
        let x = (width - fit_w) / 2;
        let y = (height - fit_h) / 2;
        image::imageops::overlay(&mut canvas, &resized, x as i64, y as i64);
        canvas
      }
      AspectMode::AspectFill => {
        // 先在原图上按目标宽高比居中裁剪，再缩放，避免放大整幅图像
        let (crop_w, crop_h) = if src_w as u64 * height as u64 > src_h as u64 * width as u64 {
          let crop_w = (src_h as f64 * width as f64 / height as f64).round() as u32;
          (crop_w.clamp(1, src_w), src_h)
        } else {
          let crop_h = (src_w as f64 * height as f64 / width as f64).round() as u32;
          (src_w, crop_h.clamp(1, src_h))
        };
        let x = (src_w - crop_w) / 2;
        let y = (src_h - crop_h) / 2;
        let cropped = image::imageops::crop_imm(&self.image, x, y, crop_w, crop_h).to_image();
        image::imageops::resize(&cropped, width, height, FilterType::Triangle)
      }
    }
  }
}

impl ImageFeature for ImageFileFeature {
  fn aspect_mode(&self) -> AspectMode {
    self.aspect_mode
  }

  fn set_aspect_mode(&mut self, mode: AspectMode) {
    self.aspect_mode = mode;
  }
}

impl Feature for ImageFileFeature {
  fn feature_type(&self) -> FeatureType {
    let (width, height) = self.image.dimensions();
    FeatureType::Image(ImageType::rgb(
      width as usize,
      height as usize,
      ElementType::UInt8,
    ))
  }

  fn create(&self, target: &FeatureType) -> Result<Tensor, FeatureError> {
    let incompatible = || FeatureError::Incompatible {
      expected: target.clone(),
      actual: self.feature_type(),
    };

    let image_type = match target {
      FeatureType::Image(image_type) if image_type.channels == 3 => *image_type,
      _ => return Err(incompatible()),
    };
    if image_type.width == 0
      || image_type.height == 0
      || self.image.width() == 0
      || self.image.height() == 0
    {
      return Err(incompatible());
    }

    let resized = self.resize(image_type.width as u32, image_type.height as u32);
    debug!(
      "图像 {}x{} 以 {:?} 模式缩放为 {}x{}",
      self.image.width(),
      self.image.height(),
      self.aspect_mode,
      image_type.width,
      image_type.height
    );

    // NHWC 像素转为 NCHW 平面布局
    let plane = image_type.width * image_type.height;
    let shape = image_type.shape();
    match image_type.element {
      ElementType::UInt8 => {
        let mut data = vec![0u8; plane * 3];
        for (idx, pixel) in resized.pixels().enumerate() {
          for c in 0..3 {
            data[c * plane + idx] = pixel[c];
          }
        }
        Ok(Tensor::from_u8(shape, data)?)
      }
      ElementType::Float32 => {
        let mut data = vec![0f32; plane * 3];
        for (idx, pixel) in resized.pixels().enumerate() {
          for c in 0..3 {
            data[c * plane + idx] = pixel[c] as f32 / 255.0;
          }
        }
        Ok(Tensor::from_f32(shape, data)?)
      }
      other => Err(FeatureError::UnsupportedElement(other)),
    }
  }

  fn as_image_mut(&mut self) -> Option<&mut dyn ImageFeature> {
    Some(self)
  }
}
