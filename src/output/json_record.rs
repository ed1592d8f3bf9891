// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/json_record.rs - 检测结果 JSON 记录
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

use std::{fs::File, io::BufWriter, path::Path};

use serde::Serialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::Detection, output::Render};

#[derive(Error, Debug)]
pub enum JsonRecordError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

#[derive(Serialize)]
struct DetectionRecord<'a> {
  count: usize,
  detections: &'a [Detection],
}

/// 把每次预测结果写成一个 JSON 文件，后写入的覆盖先写入的
pub struct JsonRecordOutput {
  path: String,
}

impl FromUrlWithScheme for JsonRecordOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonRecordOutput {
  type Error = JsonRecordError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonRecordError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(JsonRecordOutput {
      path: url.path().to_string(),
    })
  }
}

impl<F> Render<F, Vec<Detection>> for JsonRecordOutput {
  type Error = JsonRecordError;

  fn render_result(&self, _frame: &F, result: &Vec<Detection>) -> Result<(), Self::Error> {
    if let Some(parent) = Path::new(&self.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let record = DetectionRecord {
      count: result.len(),
      detections: result,
    };
    let writer = BufWriter::new(File::create(&self.path)?);
    serde_json::to_writer_pretty(writer, &record)?;

    info!("保存 {} 个检测结果到文件: {}", result.len(), self.path);
    Ok(())
  }
}
