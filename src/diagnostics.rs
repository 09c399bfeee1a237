//! 运行过程中的中间产物落盘

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::DiagnosticsConfig;

/// 以 `{kind}_{毫秒时间戳}_{序号}.json` 的形式写入诊断产物，写入失败只记录告警
#[derive(Debug, Default)]
pub struct Diagnostics {
    log_dir: Option<PathBuf>,
    seq: AtomicU64,
}

impl Diagnostics {
    pub fn new(config: &DiagnosticsConfig) -> Self {
        Self {
            log_dir: config.enabled.then(|| config.log_dir.clone()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    pub async fn record<T: Serialize>(&self, kind: &str, data: &T) {
        let Some(dir) = &self.log_dir else {
            return;
        };

        match self.write(dir, kind, data).await {
            Ok(path) => debug!("[{}] Saved to {}", kind, path.display()),
            Err(e) => warn!("⚠️ 诊断产物 {} 写入失败: {:#}", kind, e),
        }
    }

    async fn write<T: Serialize>(&self, dir: &Path, kind: &str, data: &T) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .context(format!("Failed to create log dir: {:?}", dir))?;

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!(
            "{}_{}_{}.json",
            kind,
            chrono::Utc::now().timestamp_millis(),
            seq
        ));
        let content = serde_json::to_string_pretty(data)?;
        tokio::fs::write(&path, content)
            .await
            .context(format!("Failed to write {:?}", path))?;
        Ok(path)
    }
}
