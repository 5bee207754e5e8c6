// 该文件是 Poubelle 项目的一部分。
// src/web.rs - 浏览器演示服务
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
use std::sync::Arc;

use axum::{
  Router,
  extract::DefaultBodyLimit,
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::input::ImageFileInputError;
use crate::loader::{DetectorCache, LoadOutcome, ModelLoader, TracingReport};
use crate::model::DetectorError;
use crate::output::draw::Draw;

pub mod handlers;
pub mod ui;

#[derive(Error, Debug)]
pub enum WebError {
  #[error("请求无效: {0}")]
  InvalidInput(String),
  #[error("模型不可用: {0}")]
  ModelUnavailable(String),
  #[error("模型文件不存在: {}", .0.display())]
  ArtifactNotFound(PathBuf),
  #[error("图像解码失败: {0}")]
  Image(#[from] ImageFileInputError),
  #[error("推理失败: {0}")]
  Inference(#[from] DetectorError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("内部错误: {0}")]
  Internal(String),
}

impl WebError {
  pub fn status_code(&self) -> StatusCode {
    match self {
      WebError::InvalidInput(_) => StatusCode::BAD_REQUEST,
      WebError::Image(_) => StatusCode::UNPROCESSABLE_ENTITY,
      WebError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      WebError::ArtifactNotFound(_) => StatusCode::NOT_FOUND,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  pub fn error_code(&self) -> &'static str {
    match self {
      WebError::InvalidInput(_) => "INVALID_INPUT",
      WebError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
      WebError::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
      WebError::Image(_) => "IMAGE_DECODE_ERROR",
      WebError::Inference(_) => "INFERENCE_ERROR",
      WebError::Io(_) => "IO_ERROR",
      WebError::Internal(_) => "INTERNAL_ERROR",
    }
  }
}

impl IntoResponse for WebError {
  fn into_response(self) -> Response {
    let status = self.status_code();
    let body = serde_json::json!({
      "error": {
        "code": self.error_code(),
        "message": self.to_string(),
      }
    });

    error!("请求失败: {} ({})", self, status);

    (status, axum::Json(body)).into_response()
  }
}

/// 应用上下文：配置、加载器、缓存与绘制器在进程内共享
pub struct AppContext {
  pub config: Config,
  pub loader: ModelLoader,
  pub cache: DetectorCache,
  pub draw: Draw,
}

pub type AppState = Arc<AppContext>;

impl AppContext {
  pub fn new(config: Config, loader: ModelLoader, draw: Draw) -> Self {
    Self {
      config,
      loader,
      cache: DetectorCache::new(),
      draw,
    }
  }

  /// 会阻塞，异步上下文中需放进 `spawn_blocking`
  pub fn outcome(&self) -> Arc<LoadOutcome> {
    self
      .cache
      .get_or_load(&self.loader, &self.config.model.path, &TracingReport)
  }

  pub fn reload(&self) -> Arc<LoadOutcome> {
    self.cache.invalidate();
    self.outcome()
  }
}

pub(crate) async fn blocking<T, F>(f: F) -> Result<T, WebError>
where
  F: FnOnce() -> T + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| WebError::Internal(format!("后台任务失败: {}", e)))
}

pub fn router(state: AppState) -> Router {
  let limit = state.config.server.max_upload_bytes;
  Router::new()
    .route("/", get(ui::index_handler))
    .route("/health", get(handlers::health))
    .route(
      "/api/model",
      get(handlers::model_status).post(handlers::upload_model),
    )
    .route("/api/model/download", get(handlers::download_model))
    .route("/api/detect", post(handlers::detect))
    .layer(DefaultBodyLimit::disable())
    .layer(RequestBodyLimitLayer::new(limit))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

pub async fn serve(state: AppState) -> Result<(), WebError> {
  let bind = state.config.server.bind.clone();

  // 启动时预加载，失败只记录诊断
  let warm = state.clone();
  let outcome = blocking(move || warm.outcome()).await?;
  if outcome.is_loaded() {
    info!("模型已就绪: {}", outcome.path().display());
  } else {
    info!("模型未加载，服务以降级模式启动");
  }

  let listener = TcpListener::bind(&bind).await?;
  info!("服务启动于 http://{}", bind);
  info!("  GET  /                    - 页面");
  info!("  POST /api/detect          - 图像检测");
  info!("  GET  /api/model           - 模型状态");
  info!("  POST /api/model           - 上传模型");
  info!("  GET  /api/model/download  - 下载模型");
  info!("  GET  /health              - 健康检查");

  axum::serve(listener, router(state)).await?;
  Ok(())
}
