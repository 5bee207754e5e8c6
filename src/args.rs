// 该文件是 Poubelle 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use url::Url;

/// Poubelle 垃圾桶检测演示
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 配置文件路径，不存在时使用默认配置
  #[arg(long, global = true, default_value = poubelle::config::Config::default_path(), value_name = "FILE")]
  pub config: PathBuf,

  /// 日志级别，RUST_LOG 优先
  #[arg(long, global = true, default_value = "info", value_name = "LEVEL")]
  pub log_level: String,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 启动浏览器演示服务
  Serve {
    /// 覆盖配置中的监听地址
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
  },
  /// 对单张图像执行检测
  Detect {
    /// 输入图像，例如 image:///data/bac.jpg
    #[arg(long, value_name = "SOURCE")]
    input: Url,
    /// 标注结果输出，例如 image:///data/bac_annote.png
    #[arg(long, value_name = "OUTPUT")]
    output: Url,
    /// 覆盖配置中的模型路径
    #[arg(long, value_name = "MODEL")]
    model: Option<PathBuf>,
    /// 以 JSON 打印检测结果
    #[arg(long)]
    json: bool,
  },
  /// 查看模型产物头部与允许列表覆盖情况
  Inspect {
    #[arg(long, value_name = "MODEL")]
    model: Option<PathBuf>,
  },
  /// 由 ONNX 计算图与头部 JSON 打包模型产物
  Pack {
    #[arg(long, value_name = "FILE")]
    payload: PathBuf,
    #[arg(long, value_name = "FILE")]
    header: PathBuf,
    #[arg(long, value_name = "FILE")]
    output: PathBuf,
  },
}
