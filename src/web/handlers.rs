// 该文件是 Poubelle 项目的一部分。
// src/web/handlers.rs - 接口处理
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

use std::ffi::OsString;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Instant;

use axum::{
  body::Bytes,
  extract::{Multipart, State},
  http::header,
  response::{IntoResponse, Json},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbImage};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::input::ImageFileInput;
use crate::loader::LoadOutcome;
use crate::model::{DetectItem, Model};
use crate::web::{AppState, WebError, blocking};

#[derive(Debug, Serialize)]
pub struct ModelStatus {
  pub path: String,
  pub exists: bool,
  pub loaded: bool,
  pub names: Vec<String>,
  pub strategies: Vec<&'static str>,
  pub loaded_by: Option<&'static str>,
  pub fallbacks_used: usize,
  pub diagnostics: Vec<String>,
}

impl ModelStatus {
  fn new(state: &AppState, outcome: &LoadOutcome) -> Self {
    let detector = outcome.detector();
    Self {
      path: state.config.model.path.display().to_string(),
      exists: state.config.model.path.exists(),
      loaded: detector.is_some(),
      names: detector.map(|d| d.names().to_vec()).unwrap_or_default(),
      strategies: state.loader.strategy_names(),
      loaded_by: outcome
        .attempts()
        .iter()
        .find(|a| a.error.is_none())
        .map(|a| a.strategy),
      fallbacks_used: outcome.fallbacks_used(),
      diagnostics: outcome.diagnostics(),
    }
  }
}

#[derive(Debug, Serialize)]
pub struct DetectionView {
  pub index: usize,
  pub class_id: u32,
  pub label: String,
  pub confidence: f32,
  pub percent: u32,
  pub bbox: [f32; 4],
}

impl DetectionView {
  fn new(index: usize, item: &DetectItem) -> Self {
    Self {
      index,
      class_id: item.class_id,
      label: item.label.clone(),
      confidence: item.score,
      percent: (item.score.clamp(0.0, 1.0) * 100.0) as u32,
      bbox: item.bbox,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
  pub width: u32,
  pub height: u32,
  pub elapsed_ms: f64,
  pub timestamp: String,
  pub count: usize,
  pub detections: Vec<DetectionView>,
  /// 编码失败时为空，页面回退展示原图
  pub annotated: Option<String>,
}

pub async fn health() -> Json<serde_json::Value> {
  Json(json!({
    "status": "healthy",
    "timestamp": chrono::Utc::now().to_rfc3339(),
    "version": env!("CARGO_PKG_VERSION"),
  }))
}

pub async fn model_status(State(state): State<AppState>) -> Result<Json<ModelStatus>, WebError> {
  let ctx = state.clone();
  let outcome = blocking(move || ctx.outcome()).await?;
  Ok(Json(ModelStatus::new(&state, &outcome)))
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Bytes, WebError> {
  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| WebError::InvalidInput(format!("读取表单字段失败: {}", e)))?
  {
    if field.name() != Some("file") {
      continue;
    }
    let data = field
      .bytes()
      .await
      .map_err(|e| WebError::InvalidInput(format!("读取文件内容失败: {}", e)))?;
    if data.is_empty() {
      return Err(WebError::InvalidInput("上传的文件为空".to_string()));
    }
    debug!("收到文件: {} 字节", data.len());
    return Ok(data);
  }
  Err(WebError::InvalidInput("缺少 file 字段".to_string()))
}

fn staging_path(path: &Path) -> PathBuf {
  let mut name = path.file_name().map(OsString::from).unwrap_or_default();
  name.push(".upload");
  path.with_file_name(name)
}

pub async fn upload_model(
  State(state): State<AppState>,
  mut multipart: Multipart,
) -> Result<Json<ModelStatus>, WebError> {
  let data = read_file_field(&mut multipart).await?;
  let path = state.config.model.path.clone();

  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    tokio::fs::create_dir_all(parent).await?;
  }
  // 先写临时文件再替换，中断的上传不会留下半截产物
  let staging = staging_path(&path);
  if let Err(e) = tokio::fs::write(&staging, &data).await {
    let _ = tokio::fs::remove_file(&staging).await;
    return Err(e.into());
  }
  if let Err(e) = tokio::fs::rename(&staging, &path).await {
    let _ = tokio::fs::remove_file(&staging).await;
    return Err(e.into());
  }
  info!("模型文件已更新: {} ({} 字节)", path.display(), data.len());

  let ctx = state.clone();
  let outcome = blocking(move || ctx.reload()).await?;
  Ok(Json(ModelStatus::new(&state, &outcome)))
}

pub async fn download_model(State(state): State<AppState>) -> Result<impl IntoResponse, WebError> {
  let path = &state.config.model.path;
  let data = match tokio::fs::read(path).await {
    Ok(data) => data,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      return Err(WebError::ArtifactNotFound(path.clone()));
    }
    Err(e) => return Err(e.into()),
  };

  Ok((
    [
      (header::CONTENT_TYPE, "application/octet-stream"),
      (
        header::CONTENT_DISPOSITION,
        "attachment; filename=\"best.ckpt\"",
      ),
    ],
    data,
  ))
}

fn encode_png(image: &RgbImage) -> Result<String, image::ImageError> {
  let mut buffer = Cursor::new(Vec::new());
  image.write_to(&mut buffer, ImageFormat::Png)?;
  Ok(format!(
    "data:image/png;base64,{}",
    STANDARD.encode(buffer.into_inner())
  ))
}

pub async fn detect(
  State(state): State<AppState>,
  mut multipart: Multipart,
) -> Result<Json<DetectResponse>, WebError> {
  let data = read_file_field(&mut multipart).await?;

  let response = blocking(move || -> Result<DetectResponse, WebError> {
    let outcome = state.outcome();
    let Some(detector) = outcome.detector() else {
      return Err(WebError::ModelUnavailable(format!(
        "请将有效的模型文件放置在 {} 或通过页面上传",
        state.config.model.path.display()
      )));
    };

    let image = ImageFileInput::from_bytes(&data)?
      .next()
      .ok_or_else(|| WebError::Internal("图像为空".to_string()))?;

    let start = Instant::now();
    let result = detector.infer(&image)?;
    let elapsed = start.elapsed();
    info!(
      "检测完成: {} 个物体, 耗时 {:.2?}",
      result.len(),
      elapsed
    );

    let annotated = state.draw.annotate(&image, &result);
    let annotated = match encode_png(&annotated) {
      Ok(url) => Some(url),
      Err(e) => {
        warn!("标注图像编码失败: {}", e);
        None
      }
    };

    let detections: Vec<DetectionView> = result
      .items
      .iter()
      .enumerate()
      .map(|(i, item)| DetectionView::new(i + 1, item))
      .collect();

    Ok(DetectResponse {
      width: image.width(),
      height: image.height(),
      elapsed_ms: elapsed.as_secs_f64() * 1000.0,
      timestamp: chrono::Utc::now().to_rfc3339(),
      count: detections.len(),
      detections,
      annotated,
    })
  })
  .await??;

  Ok(Json(response))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
  };
  use ndarray::{Array3, Array4, ArrayD};
  use tempfile::TempDir;
  use tower::ServiceExt;

  use crate::artifact::{ArtifactHeader, Checkpoint};
  use crate::config::Config;
  use crate::loader::{DirectLoad, ModelLoader};
  use crate::model::{DetectorBackend, EngineError, InferenceEngine};
  use crate::output::draw::Draw;
  use crate::web::{AppContext, router};

  const BOUNDARY: &str = "poubelle-form-boundary";

  /// 在第二个锚点输出一个 “pleine” 框
  struct FakeEngine;

  impl InferenceEngine for FakeEngine {
    fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>, EngineError> {
      assert_eq!(input.shape(), &[1, 3, 32, 32]);
      let mut out = Array3::<f32>::zeros((1, 6, 4));
      for (c, v) in [16.0, 16.0, 8.0, 8.0, 0.1, 0.876].into_iter().enumerate() {
        out[[0, c, 1]] = v;
      }
      Ok(out.into_dyn())
    }
  }

  struct FakeBackend;

  impl DetectorBackend for FakeBackend {
    fn create_engine(&self, _: &Checkpoint) -> Result<Box<dyn InferenceEngine>, EngineError> {
      Ok(Box::new(FakeEngine))
    }
  }

  fn app(dir: &TempDir) -> (Router, PathBuf) {
    let mut config = Config::default();
    config.model.path = dir.path().join("models").join("best.ckpt");
    let path = config.model.path.clone();
    let loader =
      ModelLoader::new(Arc::new(FakeBackend), config.inference.params()).with_strategy(DirectLoad);
    let state = Arc::new(AppContext::new(config, loader, Draw::default()));
    (router(state), path)
  }

  fn artifact() -> Vec<u8> {
    let mut header = ArtifactHeader::new("collections.OrderedDict");
    header.objects = vec!["torch._utils._rebuild_tensor_v2".to_string()];
    header.names = vec!["vide".to_string(), "pleine".to_string()];
    header.imgsz = 32;
    Checkpoint::new(header, b"graph".to_vec()).encode().unwrap()
  }

  fn png(width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    RgbImage::new(width, height)
      .write_to(&mut buffer, ImageFormat::Png)
      .unwrap();
    buffer.into_inner()
  }

  fn upload(uri: &str, data: &[u8]) -> Request<Body> {
    let mut body = format!(
      "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"best.ckpt\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
      .method("POST")
      .uri(uri)
      .header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
      )
      .body(Body::from(body))
      .unwrap()
  }

  fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
  }

  async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
      .await
      .unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  #[tokio::test]
  async fn detect_without_model_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let (app, path) = app(&dir);

    let response = app.oneshot(upload("/api/detect", &png(8, 8))).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "MODEL_UNAVAILABLE");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains(&path.display().to_string()), "{}", message);
  }

  #[tokio::test]
  async fn empty_upload_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (app, path) = app(&dir);

    let response = app.oneshot(upload("/api/model", b"")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "INVALID_INPUT");
    assert!(!path.exists());
  }

  #[tokio::test]
  async fn upload_replaces_artifact_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let (app, path) = app(&dir);

    // 首次查询缓存了失败结果，上传后必须重新加载
    let status = body_json(app.clone().oneshot(get("/api/model")).await.unwrap()).await;
    assert_eq!(status["loaded"], false);
    assert_eq!(status["exists"], false);

    let data = artifact();
    let response = app
      .clone()
      .oneshot(upload("/api/model", &data))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["loaded"], true);
    assert_eq!(status["loaded_by"], "direct");
    assert_eq!(status["fallbacks_used"], 0);

    assert_eq!(std::fs::read(&path).unwrap(), data);
    assert!(!staging_path(&path).exists());

    let status = body_json(app.oneshot(get("/api/model")).await.unwrap()).await;
    assert_eq!(status["loaded"], true);
    assert_eq!(status["names"], serde_json::json!(["vide", "pleine"]));
  }

  #[tokio::test]
  async fn download_is_not_found_until_uploaded() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = app(&dir);

    let response = app
      .clone()
      .oneshot(get("/api/model/download"))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "ARTIFACT_NOT_FOUND");

    let data = artifact();
    app
      .clone()
      .oneshot(upload("/api/model", &data))
      .await
      .unwrap();
    let response = app.oneshot(get("/api/model/download")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
      response.headers()[header::CONTENT_DISPOSITION],
      "attachment; filename=\"best.ckpt\""
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
      .await
      .unwrap();
    assert_eq!(bytes.as_ref(), data.as_slice());
  }

  #[tokio::test]
  async fn detect_returns_detections_and_annotation() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = app(&dir);
    app
      .clone()
      .oneshot(upload("/api/model", &artifact()))
      .await
      .unwrap();

    let response = app.oneshot(upload("/api/detect", &png(64, 32))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["width"], 64);
    assert_eq!(body["height"], 32);
    assert_eq!(body["count"], 1);
    let detection = &body["detections"][0];
    assert_eq!(detection["index"], 1);
    assert_eq!(detection["label"], "pleine");
    assert_eq!(detection["percent"], 87);
    assert!(
      body["annotated"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,")
    );
  }

  #[test]
  fn percent_is_truncated_and_clamped() {
    let item = |score: f32| DetectItem {
      class_id: 0,
      label: "vide".to_string(),
      score,
      bbox: [0.0, 0.0, 1.0, 1.0],
    };
    assert_eq!(DetectionView::new(1, &item(0.999)).percent, 99);
    assert_eq!(DetectionView::new(1, &item(0.5)).percent, 50);
    assert_eq!(DetectionView::new(1, &item(1.2)).percent, 100);
    assert_eq!(DetectionView::new(1, &item(-0.1)).percent, 0);
  }
}
