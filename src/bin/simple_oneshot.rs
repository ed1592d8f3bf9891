// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/simple_oneshot.rs - 单次推理
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_tinyyolo::{
  FromUrl,
  engine::ReplayEngine,
  feature::ImageFileFeature,
  model::{LabelSet, TinyYoloV3Builder},
  output::OutputWrapper,
  task::{OneShotTask, Task},
};
use tracing::info;

/// Shanan TinyYOLOv3 单次推理参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理引擎，例如 replay:///path/to/outputs.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像，例如 image:///path/to/input.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 json:///path/to/result.json 或 image:///path/to/result.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 类别标签，labels:coco 或 labels:///path/to/labels.txt
  #[arg(long, value_name = "LABELS", default_value = "labels:coco")]
  pub labels: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("类别标签: {}", args.labels);

  let input_image = ImageFileFeature::from_url(&args.input)?;
  let labels = LabelSet::from_url(&args.labels)?;
  let engine = ReplayEngine::from_url(&args.model)?;
  let model = TinyYoloV3Builder::new(engine).labels(labels).build()?;
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask.run_task(std::iter::once(input_image), model, output)?;

  Ok(())
}
