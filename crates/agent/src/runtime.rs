use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

/// Lazily produced response chunks. The producer and the proxy share one
/// async model, so no bridging layer sits between them.
pub type ChunkStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Streams the agent's response for one message within a thread.
    async fn run(&self, message: &str, thread_id: &str) -> Result<ChunkStream>;

    /// Buffers the full response. Debugging convenience over `run`.
    async fn run_sync(&self, message: &str, thread_id: &str) -> Result<String> {
        let chunks: Vec<String> = self.run(message, thread_id).await?.try_collect().await?;
        Ok(chunks.concat())
    }
}

/// Development agent: echoes the inbound message word by word.
#[derive(Default)]
pub struct EchoAgent;

#[async_trait]
impl AgentRuntime for EchoAgent {
    async fn run(&self, message: &str, _thread_id: &str) -> Result<ChunkStream> {
        let words: Vec<String> =
            message.split_whitespace().map(|word| format!("{word} ")).collect();
        Ok(stream::iter(words).map(Ok).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentRuntime, EchoAgent};

    #[tokio::test]
    async fn echo_agent_streams_the_message_back() {
        let agent = EchoAgent;
        let response = agent.run_sync("hello streaming world", "t-1").await.expect("run_sync");
        assert_eq!(response.trim_end(), "hello streaming world");
    }
}
