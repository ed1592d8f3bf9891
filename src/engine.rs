// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine.rs - 推理引擎接口
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

use crate::{
  feature::FeatureType,
  tensor::{Tensor, TensorHandle},
};

mod replay;
pub use self::replay::{ReplayEngine, ReplayError};

/// 已加载模型的输入输出描述
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelDescriptor {
  pub inputs: Vec<FeatureType>,
  pub outputs: Vec<FeatureType>,
}

/// 不透明的推理引擎
///
/// 输入顺序为 (图像, 原始尺寸)，输出顺序由模型约定。引擎本身是否可重入由实现
/// 负责保证。
pub trait InferenceEngine {
  type Output: TensorHandle;
  type Error: std::error::Error + Send + Sync + 'static;

  fn descriptor(&self) -> &ModelDescriptor;
  fn predict(&self, image: &Tensor, size: &Tensor) -> Result<Vec<Self::Output>, Self::Error>;
}
