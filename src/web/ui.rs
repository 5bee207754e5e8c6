// 该文件是 Poubelle 项目的一部分。
// src/web/ui.rs - 演示页面
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

use axum::response::{Html, IntoResponse};

/// 首页处理器
pub async fn index_handler() -> impl IntoResponse {
  Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="fr">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Détection Intelligente de Poubelles</title>
  <style>
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body {
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
      background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
      min-height: 100vh;
      color: #2d3748;
    }
    .layout { display: flex; gap: 1.5rem; max-width: 1200px; margin: 0 auto; padding: 1.5rem; }
    aside { width: 280px; color: white; }
    main { flex: 1; }
    .main-header { text-align: center; color: white; padding: 2rem 1rem; }
    .main-title { font-size: 2.2rem; font-weight: 700; }
    .main-subtitle { opacity: 0.9; margin-top: 0.5rem; }
    .card { background: white; border-radius: 14px; padding: 1.5rem; margin-bottom: 1.5rem;
            box-shadow: 0 8px 24px rgba(0,0,0,0.12); }
    .panel { background: rgba(255,255,255,0.12); border-radius: 10px; padding: 1rem; margin-bottom: 1rem; }
    .columns { display: flex; gap: 1.5rem; }
    .columns > div { flex: 1; }
    img { max-width: 100%; border-radius: 8px; }
    button { background: #667eea; color: white; border: none; border-radius: 8px; padding: 0.8rem 1.2rem;
             font-size: 1rem; cursor: pointer; width: 100%; }
    button:disabled { opacity: 0.5; cursor: wait; }
    .detection { margin: 1rem 0; padding: 1rem; background: #f8f9fa; border-radius: 10px; }
    .detection-head { display: flex; justify-content: space-between; align-items: center; }
    .detection-badge { background: #764ba2; color: white; border-radius: 999px; padding: 0.2rem 0.8rem; }
    .confidence-bar { height: 8px; border-radius: 4px; margin-top: 0.6rem;
                      background: linear-gradient(90deg, #48bb78, #38a169); }
    .warning { color: #c05621; }
    .error { color: #c53030; }
    .ok { color: #c6f6d5; }
    code { background: rgba(0,0,0,0.2); padding: 0 0.3rem; border-radius: 4px; }
    a { color: white; }
  </style>
</head>
<body>
  <div class="main-header">
    <div class="main-title">🗑️ Détection Intelligente de Poubelles</div>
    <div class="main-subtitle">YOLO · Classification Automatique (Vide/Pleine)</div>
  </div>
  <div class="layout">
    <aside>
      <h2>🛠️ Configuration</h2>
      <div class="panel" id="model-status">Chargement…</div>
      <div class="panel">
        <label for="model-file">📤 Uploader un modèle</label>
        <input type="file" id="model-file" accept=".ckpt">
        <button id="model-upload">Envoyer</button>
      </div>
      <div class="panel"><a href="/api/model/download" id="model-download">💾 Télécharger le modèle</a></div>
    </aside>
    <main>
      <div class="card">
        <h3>📸 Upload d'Image</h3>
        <input type="file" id="image-file" accept="image/png,image/jpeg">
      </div>
      <div class="columns">
        <div class="card"><h3>🖼️ Image Originale</h3><img id="original" alt=""></div>
        <div class="card"><h3>📊 Résultats de l'Analyse</h3><img id="annotated" alt=""></div>
      </div>
      <div class="card"><button id="analyze" disabled>🔍 Lancer l'Analyse IA</button></div>
      <div class="card">
        <h3>🔍 Détails des Détections</h3>
        <div id="stats"></div>
        <div id="detections"></div>
      </div>
    </main>
  </div>
  <script>
    const $ = (id) => document.getElementById(id);

    function escapeHtml(text) {
      const div = document.createElement('div');
      div.textContent = text;
      return div.innerHTML;
    }

    function renderStatus(status) {
      let html;
      if (status.loaded) {
        html = `<div class="ok">✅ Modèle chargé</div><div>Classes : ${status.names.map(escapeHtml).join(', ')}</div>`;
        if (status.loaded_by) html += `<div>Stratégie : ${escapeHtml(status.loaded_by)}</div>`;
      } else if (!status.exists) {
        html = `<div>📋 Modèle introuvable</div><div>Placez <code>${escapeHtml(status.path)}</code> ou uploadez ci-dessous.</div>`;
      } else {
        html = `<div>⚠️ Modèle non chargé</div>`;
      }
      for (const line of status.diagnostics) html += `<div><small>${escapeHtml(line)}</small></div>`;
      $('model-status').innerHTML = html;
      $('model-download').style.display = status.exists ? 'inline' : 'none';
    }

    async function refreshStatus() {
      const res = await fetch('/api/model');
      if (res.ok) renderStatus(await res.json());
    }

    async function errorMessage(res) {
      try { return (await res.json()).error.message; } catch (_) { return res.statusText; }
    }

    $('model-upload').addEventListener('click', async () => {
      const file = $('model-file').files[0];
      if (!file) return;
      const form = new FormData();
      form.append('file', file);
      const res = await fetch('/api/model', { method: 'POST', body: form });
      if (res.ok) renderStatus(await res.json());
      else $('model-status').innerHTML = `<div class="error">❌ ${escapeHtml(await errorMessage(res))}</div>`;
    });

    $('image-file').addEventListener('change', () => {
      const file = $('image-file').files[0];
      $('analyze').disabled = !file;
      $('annotated').removeAttribute('src');
      $('detections').innerHTML = '';
      $('stats').textContent = '';
      if (file) $('original').src = URL.createObjectURL(file);
    });

    $('analyze').addEventListener('click', async () => {
      const file = $('image-file').files[0];
      if (!file) return;
      const form = new FormData();
      form.append('file', file);
      $('analyze').disabled = true;
      $('stats').textContent = "🔄 Analyse en cours... L'IA scanne l'image";
      try {
        const res = await fetch('/api/detect', { method: 'POST', body: form });
        if (!res.ok) {
          $('stats').innerHTML = `<span class="error">🚫 ${escapeHtml(await errorMessage(res))}</span>`;
          return;
        }
        const data = await res.json();
        $('annotated').src = data.annotated || $('original').src;
        $('stats').textContent = `${data.count} détection(s) · ${data.elapsed_ms.toFixed(1)} ms`;
        if (data.count === 0) {
          $('detections').innerHTML = '<div class="warning">❌ Aucune poubelle détectée</div>';
          return;
        }
        $('detections').innerHTML = data.detections.map((d) => `
          <div class="detection">
            <div class="detection-head">
              <span class="detection-badge">#${d.index} • ${escapeHtml(d.label)}</span>
              <strong>${d.percent}%</strong>
            </div>
            <div class="confidence-bar" style="width: ${d.percent}%;"></div>
          </div>`).join('');
      } catch (e) {
        $('stats').innerHTML = `<span class="error">❌ Erreur d'analyse: ${escapeHtml(String(e))}</span>`;
      } finally {
        $('analyze').disabled = false;
      }
    });

    refreshStatus();
  </script>
</body>
</html>
"#;
