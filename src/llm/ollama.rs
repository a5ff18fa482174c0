use super::*;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Ollama provider implementation
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider with the given base URL and model
    pub fn new(base_url: String, model: String) -> LlmResult<Self> {
        // Only connecting is bounded here; generation time is bounded per request
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;

        Ok(Self {
            base_url,
            model,
            client,
        })
    }

    fn build_request(&self, request: &GenerateRequest, stream: bool) -> OllamaGenerateRequest {
        OllamaGenerateRequest {
            model: self.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system_prompt.clone(),
            stream,
            options: request.max_tokens.map(|num_predict| OllamaOptions {
                num_predict: Some(num_predict),
            }),
        }
    }

    async fn send(&self, request: &GenerateRequest, stream: bool) -> LlmResult<reqwest::Response> {
        let ollama_request = self.build_request(request, stream);
        let url = format!("{}/api/generate", self.base_url);

        let response = tokio::time::timeout(
            request.timeout,
            self.client.post(&url).json(&ollama_request).send(),
        )
        .await
        .map_err(|_| LlmError::Timeout(request.timeout))?
        .map_err(|e| LlmError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ApiError(format!(
                "Ollama API returned status: {}",
                response.status()
            )));
        }

        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

struct NdjsonState<S> {
    bytes: S,
    /// Raw bytes of the line being assembled; decoded once complete
    buffer: Vec<u8>,
    finished: bool,
}

/// Turn Ollama's newline-delimited JSON body into text fragments
fn ndjson_fragments<S, B, E>(bytes: S) -> impl Stream<Item = LlmResult<String>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = NdjsonState {
        bytes,
        buffer: Vec::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = state.buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let item = match serde_json::from_str::<OllamaGenerateResponse>(line) {
                    Ok(chunk) => {
                        if let Some(error) = chunk.error {
                            state.finished = true;
                            state.buffer.clear();
                            Err(LlmError::ApiError(error))
                        } else {
                            if chunk.done {
                                state.finished = true;
                                state.buffer.clear();
                            }
                            Ok(chunk.response)
                        }
                    }
                    Err(e) => {
                        state.finished = true;
                        state.buffer.clear();
                        Err(LlmError::ParseError(e.to_string()))
                    }
                };
                return Some((item, state));
            }

            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(LlmError::ApiError(e.to_string())), state));
                }
                None => {
                    state.finished = true;
                    // Flush a trailing line without newline
                    if state.buffer.iter().any(|b| !b.is_ascii_whitespace()) {
                        state.buffer.push(b'\n');
                    }
                }
            }
        }
    })
    .filter(|item| futures::future::ready(!matches!(item, Ok(text) if text.is_empty())))
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
        let start = Instant::now();
        let response = self.send(&request, false).await?;

        let ollama_response: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        if let Some(error) = ollama_response.error {
            return Err(LlmError::ApiError(error));
        }

        let latency_ms = start.elapsed().as_millis() as u64;

        Ok(GenerateResponse {
            text: ollama_response.response.trim().to_string(),
            metadata: ResponseMetadata {
                provider: "ollama".to_string(),
                model: self.model.clone(),
                tokens_used: None, // Ollama doesn't return token counts in this API
                latency_ms,
            },
        })
    }

    async fn generate_stream(&self, request: GenerateRequest) -> LlmResult<TextStream> {
        let response = self.send(&request, true).await?;
        Ok(ndjson_fragments(Box::pin(response.bytes_stream())).boxed())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, String>> + Unpin {
        let parts: Vec<Result<Vec<u8>, String>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(parts)
    }

    #[tokio::test]
    async fn test_ndjson_split_across_chunks() {
        let stream = ndjson_fragments(body(&[
            "{\"response\":\"Is it \",\"done\":false}\n{\"resp",
            "onse\":\"Sta\",\"done\":false}\n",
            "{\"response\":\"lin?\",\"done\":false}\n{\"response\":\"\",\"done\":true}\n",
        ]));
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments, vec!["Is it ", "Sta", "lin?"]);
    }

    #[tokio::test]
    async fn test_ndjson_multibyte_char_split_across_chunks() {
        let line = "{\"response\":\"Café\",\"done\":true}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let parts: Vec<Result<Vec<u8>, String>> =
            vec![Ok(line[..split].to_vec()), Ok(line[split..].to_vec())];

        let fragments: Vec<String> = ndjson_fragments(futures::stream::iter(parts))
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["Café"]);
    }

    #[tokio::test]
    async fn test_ndjson_trailing_line_without_newline() {
        let stream = ndjson_fragments(body(&["{\"response\":\"Lenin\",\"done\":true}"]));
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments, vec!["Lenin"]);
    }

    #[tokio::test]
    async fn test_ndjson_error_terminates_stream() {
        let stream = ndjson_fragments(body(&[
            "{\"response\":\"Is\",\"done\":false}\n",
            "{\"error\":\"model not found\"}\n",
            "{\"response\":\"ignored\",\"done\":false}\n",
        ]));
        let items: Vec<LlmResult<String>> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[1], Err(LlmError::ApiError(msg)) if msg == "model not found"));
    }

    #[tokio::test]
    async fn test_ndjson_transport_error() {
        let parts: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"{\"response\":\"Is\",\"done\":false}\n".to_vec()),
            Err("connection reset".to_string()),
        ];
        let items: Vec<LlmResult<String>> =
            ndjson_fragments(futures::stream::iter(parts)).collect().await;
        assert!(matches!(items.as_slice(), [Ok(_), Err(LlmError::ApiError(_))]));
    }

    #[tokio::test]
    #[ignore] // Only run with Ollama running locally
    async fn test_ollama_stream() {
        let provider =
            OllamaProvider::new("http://localhost:11434".to_string(), "llama3.2".to_string())
                .unwrap();

        let request = GenerateRequest {
            prompt: "Guess the animal: long neck, eats leaves.".to_string(),
            system_prompt: None,
            max_tokens: Some(50),
            timeout: Duration::from_secs(30),
        };

        let stream = provider.generate_stream(request).await.unwrap();
        let text: String = stream.map(|f| f.unwrap()).collect::<Vec<_>>().await.concat();
        assert!(!text.is_empty());
        println!("Generated text: {}", text);
    }
}
