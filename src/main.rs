// 该文件是 Poubelle 项目的一部分。
// src/main.rs - 项目主程序
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Poubelle 项目贡献者

mod args;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use poubelle::{
  FromUrl,
  artifact::{ArtifactHeader, Checkpoint, TrustPolicy, read_header},
  config::Config,
  input::ImageFileInput,
  loader::{ModelLoader, TracingReport},
  model::OnnxBackend,
  output::{SaveImageFileOutput, draw::Draw},
  task::{OneShotTask, Task},
  web::{self, AppContext},
};

use args::{Args, Command};

fn build_loader(config: &Config) -> ModelLoader {
  let backend = Arc::new(OnnxBackend::new(config.inference.intra_threads));
  ModelLoader::from_config(config, backend)
}

fn run_detect(
  config: &Config,
  input: &url::Url,
  output: &url::Url,
  model: Option<PathBuf>,
  json: bool,
) -> Result<()> {
  let path = model.unwrap_or_else(|| config.model.path.clone());
  let outcome = build_loader(config).load(&path, &TracingReport);
  let detector = outcome.detector().ok_or_else(|| {
    anyhow::anyhow!(
      "模型加载失败，请将有效的模型文件放置在 {}:\n  {}",
      path.display(),
      outcome.diagnostics().join("\n  ")
    )
  })?;

  let input = ImageFileInput::from_url(input)?;
  let output = SaveImageFileOutput::from_url(output)?.with_draw(Draw::from_config(&config.render)?);
  let report = OneShotTask.run_task(input, &*detector, &output)?;

  if json {
    println!("{}", serde_json::to_string_pretty(&report.result)?);
  } else {
    println!(
      "检测到 {} 个物体 (推理 {:.2?}, 渲染 {:.2?}):",
      report.result.len(),
      report.inference,
      report.render
    );
    for (i, item) in report.result.items.iter().enumerate() {
      println!(
        "  #{} {} {}% [{:.3}, {:.3}, {:.3}, {:.3}]",
        i + 1,
        item.label,
        (item.score * 100.0) as u32,
        item.bbox[0],
        item.bbox[1],
        item.bbox[2],
        item.bbox[3]
      );
    }
  }
  Ok(())
}

fn run_inspect(config: &Config, model: Option<PathBuf>) -> Result<()> {
  let path = model.unwrap_or_else(|| config.model.path.clone());
  let bytes = std::fs::read(&path).with_context(|| format!("读取 {} 失败", path.display()))?;
  let header = read_header(&bytes)?;

  println!("产物: {}", path.display());
  println!("  根类型: {}", header.root);
  println!("  任务: {}", header.task);
  println!("  输入尺寸: {}", header.imgsz);
  println!("  类别: {:?}", header.names);
  println!("  参数: {} 个", header.params.len());
  println!("  引用类型: {} 个", header.objects.len());

  let strict = TrustPolicy::strict().untrusted(header.referenced_types());
  let allow_list = TrustPolicy::with_trusted(config.loader.trusted_types.iter().cloned())
    .untrusted(header.referenced_types());
  if strict.is_empty() {
    println!("严格策略可直接加载");
  } else if allow_list.is_empty() {
    println!("需要允许列表，当前配置已覆盖全部 {} 个自定义类型", strict.len());
  } else {
    println!("当前允许列表未覆盖以下类型:");
    for ident in allow_list {
      println!("  - {}", ident);
    }
  }
  Ok(())
}

fn run_pack(payload: PathBuf, header: PathBuf, output: PathBuf) -> Result<()> {
  let payload = std::fs::read(&payload).with_context(|| format!("读取 {} 失败", payload.display()))?;
  let header: ArtifactHeader = serde_json::from_slice(
    &std::fs::read(&header).with_context(|| format!("读取 {} 失败", header.display()))?,
  )?;
  Checkpoint::new(header, payload).write_to(&output)?;
  info!("模型产物已写入: {}", output.display());
  Ok(())
}

fn main() -> Result<()> {
  let args = Args::parse();

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
    )
    .with_target(false)
    .init();

  let mut config = Config::load_or_default(&args.config)?;

  match args.command {
    Command::Serve { bind } => {
      if let Some(bind) = bind {
        config.server.bind = bind;
      }
      let draw = Draw::from_config(&config.render)?;
      let loader = build_loader(&config);
      let state = Arc::new(AppContext::new(config, loader, draw));
      let runtime = tokio::runtime::Runtime::new()?;
      runtime.block_on(web::serve(state))?;
    }
    Command::Detect {
      input,
      output,
      model,
      json,
    } => run_detect(&config, &input, &output, model, json)?,
    Command::Inspect { model } => run_inspect(&config, model)?,
    Command::Pack {
      payload,
      header,
      output,
    } => run_pack(payload, header, output)?,
  }

  Ok(())
}
