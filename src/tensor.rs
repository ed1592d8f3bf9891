// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tensor.rs - 张量句柄与带边界检查的张量视图
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

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 张量元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
  Float32,
  Int32,
  UInt8,
}

impl fmt::Display for ElementType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ElementType::Float32 => write!(f, "float32"),
      ElementType::Int32 => write!(f, "int32"),
      ElementType::UInt8 => write!(f, "uint8"),
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
  #[error("张量已释放")]
  Released,
  #[error("元素类型不匹配: 期望 {expected}, 实际 {actual}")]
  TypeMismatch {
    expected: ElementType,
    actual: ElementType,
  },
  #[error("数据长度与形状不匹配: 形状 {shape:?} 需要 {expected} 个元素, 实际 {actual} 个")]
  LengthMismatch {
    shape: Vec<usize>,
    expected: usize,
    actual: usize,
  },
  #[error("张量维数不匹配: 期望 {expected}, 实际 {actual}")]
  RankMismatch { expected: usize, actual: usize },
  #[error("索引越界: 第 {axis} 维索引 {index}, 维度大小 {dim}")]
  OutOfBounds { axis: usize, index: usize, dim: usize },
}

/// 推理引擎持有的张量句柄
///
/// `release` 之后所有读取都必须返回 [`TensorError::Released`]，并且 `release`
/// 可以重复调用。
pub trait TensorHandle {
  fn shape(&self) -> Result<&[usize], TensorError>;
  fn as_f32(&self) -> Result<&[f32], TensorError>;
  fn as_i32(&self) -> Result<&[i32], TensorError>;
  fn release(&mut self);

  fn view_f32(&self) -> Result<TensorView<'_, f32>, TensorError> {
    TensorView::new(self.shape()?, self.as_f32()?)
  }

  fn view_i32(&self) -> Result<TensorView<'_, i32>, TensorError> {
    TensorView::new(self.shape()?, self.as_i32()?)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
  Float32(Box<[f32]>),
  Int32(Box<[i32]>),
  UInt8(Box<[u8]>),
}

impl TensorData {
  pub fn element_type(&self) -> ElementType {
    match self {
      TensorData::Float32(_) => ElementType::Float32,
      TensorData::Int32(_) => ElementType::Int32,
      TensorData::UInt8(_) => ElementType::UInt8,
    }
  }

  pub fn len(&self) -> usize {
    match self {
      TensorData::Float32(data) => data.len(),
      TensorData::Int32(data) => data.len(),
      TensorData::UInt8(data) => data.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// 主机内存中的连续张量，形状与数据一起持有
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
  shape: Box<[usize]>,
  element_type: ElementType,
  data: Option<TensorData>,
}

impl Tensor {
  pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self, TensorError> {
    let expected = shape.iter().product::<usize>();
    if expected != data.len() {
      return Err(TensorError::LengthMismatch {
        shape,
        expected,
        actual: data.len(),
      });
    }

    Ok(Tensor {
      shape: shape.into_boxed_slice(),
      element_type: data.element_type(),
      data: Some(data),
    })
  }

  pub fn from_f32(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, TensorError> {
    Self::new(shape, TensorData::Float32(data.into_boxed_slice()))
  }

  pub fn from_i32(shape: Vec<usize>, data: Vec<i32>) -> Result<Self, TensorError> {
    Self::new(shape, TensorData::Int32(data.into_boxed_slice()))
  }

  pub fn from_u8(shape: Vec<usize>, data: Vec<u8>) -> Result<Self, TensorError> {
    Self::new(shape, TensorData::UInt8(data.into_boxed_slice()))
  }

  pub fn element_type(&self) -> ElementType {
    self.element_type
  }

  pub fn is_released(&self) -> bool {
    self.data.is_none()
  }

  pub fn data(&self) -> Result<&TensorData, TensorError> {
    self.data.as_ref().ok_or(TensorError::Released)
  }
}

impl TensorHandle for Tensor {
  fn shape(&self) -> Result<&[usize], TensorError> {
    self.data()?;
    Ok(&self.shape)
  }

  fn as_f32(&self) -> Result<&[f32], TensorError> {
    match self.data()? {
      TensorData::Float32(data) => Ok(data),
      other => Err(TensorError::TypeMismatch {
        expected: ElementType::Float32,
        actual: other.element_type(),
      }),
    }
  }

  fn as_i32(&self) -> Result<&[i32], TensorError> {
    match self.data()? {
      TensorData::Int32(data) => Ok(data),
      other => Err(TensorError::TypeMismatch {
        expected: ElementType::Int32,
        actual: other.element_type(),
      }),
    }
  }

  fn release(&mut self) {
    self.data = None;
  }
}

/// 只读张量视图，所有访问都先按形状做边界检查
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a, T> {
  shape: &'a [usize],
  data: &'a [T],
}

impl<'a, T: Copy> TensorView<'a, T> {
  pub fn new(shape: &'a [usize], data: &'a [T]) -> Result<Self, TensorError> {
    let expected = shape.iter().product::<usize>();
    if expected != data.len() {
      return Err(TensorError::LengthMismatch {
        shape: shape.to_vec(),
        expected,
        actual: data.len(),
      });
    }
    Ok(TensorView { shape, data })
  }

  pub fn shape(&self) -> &'a [usize] {
    self.shape
  }

  pub fn rank(&self) -> usize {
    self.shape.len()
  }

  pub fn expect_rank(&self, rank: usize) -> Result<(), TensorError> {
    if self.rank() != rank {
      return Err(TensorError::RankMismatch {
        expected: rank,
        actual: self.rank(),
      });
    }
    Ok(())
  }

  pub fn dim(&self, axis: usize) -> Result<usize, TensorError> {
    self
      .shape
      .get(axis)
      .copied()
      .ok_or(TensorError::RankMismatch {
        expected: axis + 1,
        actual: self.rank(),
      })
  }

  pub fn get(&self, index: &[usize]) -> Result<T, TensorError> {
    self.expect_rank(index.len())?;

    // 行主序偏移
    let mut offset = 0usize;
    for (axis, (&i, &dim)) in index.iter().zip(self.shape).enumerate() {
      if i >= dim {
        return Err(TensorError::OutOfBounds {
          axis,
          index: i,
          dim,
        });
      }
      offset = offset * dim + i;
    }

    Ok(self.data[offset])
  }
}

/// 作用域张量：离开作用域时必定释放底层句柄
pub struct ScopedTensor<H: TensorHandle> {
  inner: H,
}

impl<H: TensorHandle> ScopedTensor<H> {
  pub fn new(inner: H) -> Self {
    ScopedTensor { inner }
  }
}

impl<H: TensorHandle> Deref for ScopedTensor<H> {
  type Target = H;

  fn deref(&self) -> &Self::Target {
    &self.inner
  }
}

impl<H: TensorHandle> TensorHandle for ScopedTensor<H> {
  fn shape(&self) -> Result<&[usize], TensorError> {
    self.inner.shape()
  }

  fn as_f32(&self) -> Result<&[f32], TensorError> {
    self.inner.as_f32()
  }

  fn as_i32(&self) -> Result<&[i32], TensorError> {
    self.inner.as_i32()
  }

  fn release(&mut self) {
    self.inner.release();
  }
}

impl<H: TensorHandle> Drop for ScopedTensor<H> {
  fn drop(&mut self) {
    self.inner.release();
  }
}
