// 该文件是 Shanan （山南西风） 项目的一部分。
// src/feature.rs - 模型输入特征定义
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

use thiserror::Error;

use crate::tensor::{ElementType, Tensor, TensorData, TensorError};

#[cfg(feature = "read_image_file")]
mod image_file;
#[cfg(feature = "read_image_file")]
pub use self::image_file::{ImageFileFeature, ImageFileFeatureError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayType {
  pub shape: Vec<usize>,
  pub element: ElementType,
}

/// 平面布局图像类型，对应形状 `[1, channels, height, width]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageType {
  pub width: usize,
  pub height: usize,
  pub channels: usize,
  pub element: ElementType,
}

impl ImageType {
  pub fn rgb(width: usize, height: usize, element: ElementType) -> Self {
    ImageType {
      width,
      height,
      channels: 3,
      element,
    }
  }

  pub fn shape(&self) -> Vec<usize> {
    vec![1, self.channels, self.height, self.width]
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureType {
  Array(ArrayType),
  Image(ImageType),
  Text,
}

impl FeatureType {
  /// 数组或图像特征的形状；非数组特征返回 `None`
  pub fn shape(&self) -> Option<Vec<usize>> {
    match self {
      FeatureType::Array(array) => Some(array.shape.clone()),
      FeatureType::Image(image) => Some(image.shape()),
      FeatureType::Text => None,
    }
  }

  pub fn element(&self) -> Option<ElementType> {
    match self {
      FeatureType::Array(array) => Some(array.element),
      FeatureType::Image(image) => Some(image.element),
      FeatureType::Text => None,
    }
  }
}

/// 图像缩放模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectMode {
  /// 拉伸到目标尺寸
  #[default]
  ScaleToFit,
  /// 保持宽高比，居中裁剪
  AspectFill,
  /// 保持宽高比，填充边缘
  AspectFit,
}

#[derive(Error, Debug)]
pub enum FeatureError {
  #[error("特征类型不兼容: 期望 {expected:?}, 实际 {actual:?}")]
  Incompatible {
    expected: FeatureType,
    actual: FeatureType,
  },
  #[error("不支持的元素类型: {0}")]
  UnsupportedElement(ElementType),
  #[error("张量错误: {0}")]
  TensorError(#[from] TensorError),
}

pub trait ImageFeature {
  fn aspect_mode(&self) -> AspectMode;
  fn set_aspect_mode(&mut self, mode: AspectMode);
}

/// 可以按目标类型实体化为张量的输入值
pub trait Feature {
  fn feature_type(&self) -> FeatureType;
  fn create(&self, target: &FeatureType) -> Result<Tensor, FeatureError>;

  fn as_image_mut(&mut self) -> Option<&mut dyn ImageFeature> {
    None
  }
}

impl<F: Feature + ?Sized> Feature for Box<F> {
  fn feature_type(&self) -> FeatureType {
    (**self).feature_type()
  }

  fn create(&self, target: &FeatureType) -> Result<Tensor, FeatureError> {
    (**self).create(target)
  }

  fn as_image_mut(&mut self) -> Option<&mut dyn ImageFeature> {
    (**self).as_image_mut()
  }
}

pub trait ArrayElement: Copy {
  const ELEMENT: ElementType;
  fn into_tensor_data(data: Box<[Self]>) -> TensorData;
}

impl ArrayElement for f32 {
  const ELEMENT: ElementType = ElementType::Float32;

  fn into_tensor_data(data: Box<[Self]>) -> TensorData {
    TensorData::Float32(data)
  }
}

impl ArrayElement for i32 {
  const ELEMENT: ElementType = ElementType::Int32;

  fn into_tensor_data(data: Box<[Self]>) -> TensorData {
    TensorData::Int32(data)
  }
}

/// 内存中的多维数组特征
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayFeature<T> {
  data: Box<[T]>,
  shape: Vec<usize>,
}

impl<T: ArrayElement> ArrayFeature<T> {
  pub fn new(data: Vec<T>, shape: Vec<usize>) -> Result<Self, FeatureError> {
    let expected = shape.iter().product::<usize>();
    if expected != data.len() {
      return Err(
        TensorError::LengthMismatch {
          shape,
          expected,
          actual: data.len(),
        }
        .into(),
      );
    }

    Ok(ArrayFeature {
      data: data.into_boxed_slice(),
      shape,
    })
  }
}

impl<T: ArrayElement> Feature for ArrayFeature<T> {
  fn feature_type(&self) -> FeatureType {
    FeatureType::Array(ArrayType {
      shape: self.shape.clone(),
      element: T::ELEMENT,
    })
  }

  fn create(&self, target: &FeatureType) -> Result<Tensor, FeatureError> {
    // 只支持同元素类型、同元素数量的重塑，不做缩放
    let shape = match target.shape() {
      Some(shape)
        if target.element() == Some(T::ELEMENT)
          && shape.iter().product::<usize>() == self.data.len() =>
      {
        shape
      }
      _ => {
        return Err(FeatureError::Incompatible {
          expected: target.clone(),
          actual: self.feature_type(),
        });
      }
    };

    Ok(Tensor::new(shape, T::into_tensor_data(self.data.clone()))?)
  }
}
