//! `llama-server` (llama.cpp) backend.
//!
//! The server runs as a child process bound to localhost and is queried
//! through its OpenAI-compatible chat endpoint. One process is kept alive
//! across jobs and replaced when the configured model path changes.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::model::{ExtractionModel, ModelLoader, ModelRequest};
use crate::core::RechnungError;

const GGUF_MAGIC: &[u8; 4] = b"GGUF";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How to start and query `llama-server`.
#[derive(Debug, Clone)]
pub struct LlamaServerConfig {
    /// Executable name or path.
    pub binary: PathBuf,
    pub host: String,
    pub port: u16,
    pub ctx_size: u32,
    /// Time allowed from spawn until the server answers `/health`.
    pub startup_timeout: Duration,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Extra arguments appended to the command line.
    pub extra_args: Vec<String>,
}

impl Default for LlamaServerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("llama-server"),
            host: "127.0.0.1".into(),
            port: 7001,
            ctx_size: 8192,
            startup_timeout: Duration::from_secs(120),
            temperature: 0.7,
            max_tokens: 4096,
            extra_args: Vec::new(),
        }
    }
}

impl LlamaServerConfig {
    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Starts `llama-server` on demand and hands out clients for it.
pub struct LlamaServerLoader {
    config: LlamaServerConfig,
    client: Client,
    running: Mutex<Option<RunningServer>>,
}

struct RunningServer {
    model_path: PathBuf,
    child: Child,
    model: Arc<LlamaServerModel>,
}

impl LlamaServerLoader {
    pub fn new(config: LlamaServerConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            running: Mutex::new(None),
        }
    }

    async fn spawn(&self, model_path: &Path) -> Result<RunningServer, RechnungError> {
        let mut command = Command::new(&self.config.binary);
        command
            .arg("--model")
            .arg(model_path)
            .arg("--host")
            .arg(&self.config.host)
            .arg("--port")
            .arg(self.config.port.to_string())
            .arg("--ctx-size")
            .arg(self.config.ctx_size.to_string())
            .args(&self.config.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        info!(
            binary = %self.config.binary.display(),
            model = %model_path.display(),
            port = self.config.port,
            "starting llama-server"
        );
        let mut child = command.spawn().map_err(|e| {
            RechnungError::ExtractionUnavailable(format!(
                "cannot start {}: {e}",
                self.config.binary.display()
            ))
        })?;

        if let Err(e) = self.wait_until_ready(&mut child).await {
            let _ = child.kill().await;
            return Err(e);
        }
        info!(port = self.config.port, "llama-server ready");

        Ok(RunningServer {
            model_path: model_path.to_path_buf(),
            child,
            model: Arc::new(LlamaServerModel {
                client: self.client.clone(),
                base_url: self.config.base_url(),
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            }),
        })
    }

    /// Poll until the port accepts connections and `/health` answers 200.
    async fn wait_until_ready(&self, child: &mut Child) -> Result<(), RechnungError> {
        let deadline = tokio::time::Instant::now() + self.config.startup_timeout;
        let address = (self.config.host.as_str(), self.config.port);
        let health = format!("{}/health", self.config.base_url());

        loop {
            if let Ok(Some(status)) = child.try_wait() {
                return Err(RechnungError::ExtractionUnavailable(format!(
                    "llama-server exited during startup ({status})"
                )));
            }
            if TcpStream::connect(address).await.is_ok() {
                match self.client.get(&health).send().await {
                    Ok(resp) if resp.status().is_success() => return Ok(()),
                    Ok(resp) => debug!(status = %resp.status(), "llama-server still loading"),
                    Err(e) => debug!(error = %e, "llama-server health check failed"),
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(RechnungError::ExtractionUnavailable(format!(
                    "llama-server not ready on {}:{} after {}s",
                    self.config.host,
                    self.config.port,
                    self.config.startup_timeout.as_secs()
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl ModelLoader for LlamaServerLoader {
    async fn load(&self, model_path: &Path) -> Result<Arc<dyn ExtractionModel>, RechnungError> {
        check_model_file(model_path).await?;

        let mut running = self.running.lock().await;
        if let Some(server) = running.as_mut() {
            let alive = matches!(server.child.try_wait(), Ok(None));
            if alive && server.model_path == model_path {
                return Ok(server.model.clone());
            }
            if alive {
                info!(
                    old = %server.model_path.display(),
                    new = %model_path.display(),
                    "model path changed, restarting llama-server"
                );
                let _ = server.child.kill().await;
            } else {
                warn!("llama-server exited, restarting");
            }
        }
        *running = None;

        let server = self.spawn(model_path).await?;
        let model = server.model.clone();
        *running = Some(server);
        Ok(model)
    }
}

/// The artifact must exist and carry the GGUF magic.
async fn check_model_file(path: &Path) -> Result<(), RechnungError> {
    if path.as_os_str().is_empty() {
        return Err(RechnungError::ExtractionUnavailable(
            "no model path configured".into(),
        ));
    }
    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        RechnungError::ExtractionUnavailable(format!("model {}: {e}", path.display()))
    })?;
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).await.map_err(|e| {
        RechnungError::ExtractionUnavailable(format!("model {}: {e}", path.display()))
    })?;
    if &magic != GGUF_MAGIC {
        return Err(RechnungError::ExtractionUnavailable(format!(
            "model {} is not a GGUF file",
            path.display()
        )));
    }
    Ok(())
}

/// Chat client for one running server.
struct LlamaServerModel {
    client: Client,
    base_url: String,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Vec<Content>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Content {
    Text { r#type: String, text: String },
    Image { r#type: String, image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn chat_request(request: &ModelRequest, temperature: f64, max_tokens: u32) -> ChatRequest {
    let mut content = vec![Content::Text {
        r#type: "text".into(),
        text: request.prompt.clone(),
    }];
    for image in &request.images {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image.data);
        content.push(Content::Image {
            r#type: "image_url".into(),
            image_url: ImageUrl {
                url: format!("data:{};base64,{encoded}", image.mime),
            },
        });
    }
    ChatRequest {
        model: "local".into(),
        messages: vec![
            Message {
                role: "system".into(),
                content: vec![Content::Text {
                    r#type: "text".into(),
                    text: request.system.clone(),
                }],
            },
            Message {
                role: "user".into(),
                content,
            },
        ],
        max_tokens,
        temperature,
    }
}

#[async_trait]
impl ExtractionModel for LlamaServerModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String, RechnungError> {
        let body = chat_request(request, self.temperature, self.max_tokens);
        let unavailable = |e: reqwest::Error| {
            RechnungError::ExtractionUnavailable(format!("llama-server request failed: {e}"))
        };
        let response: ChatResponse = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!(chars = content.len(), "llama-server answered");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::model::{PageImage, build_request};

    #[tokio::test]
    async fn missing_model_is_unavailable() {
        let err = check_model_file(Path::new("/nonexistent/model.gguf"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "extraction_unavailable");

        let err = check_model_file(Path::new("")).await.unwrap_err();
        assert!(err.to_string().contains("no model path"));
    }

    #[tokio::test]
    async fn non_gguf_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        std::fs::write(&path, b"PK\x03\x04 not a model").unwrap();
        let err = check_model_file(&path).await.unwrap_err();
        assert!(err.to_string().contains("not a GGUF file"));

        std::fs::write(&path, b"GGUF\x03\x00\x00\x00").unwrap();
        assert!(check_model_file(&path).await.is_ok());
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gguf");
        std::fs::write(&path, b"GGUF\x03\x00\x00\x00").unwrap();
        let loader = LlamaServerLoader::new(LlamaServerConfig {
            binary: dir.path().join("no-such-llama-server"),
            ..LlamaServerConfig::default()
        });
        let err = loader.load(&path).await.err().unwrap();
        assert_eq!(err.kind(), "extraction_unavailable");
    }

    #[test]
    fn chat_request_carries_images_as_data_urls() {
        let request = build_request(None, vec![PageImage::new("image/png", vec![1, 2, 3])]);
        let body = serde_json::to_value(chat_request(&request, 0.7, 4096)).unwrap();
        assert_eq!(body["model"], "local");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["messages"][0]["role"], "system");
        let user = &body["messages"][1]["content"];
        assert_eq!(user[0]["type"], "text");
        assert_eq!(user[1]["type"], "image_url");
        assert_eq!(user[1]["image_url"]["url"], "data:image/png;base64,AQID");
    }
}
