//! Mock 讲解客户端（用于测试与离线运行，无需后端）
//!
//! 根据输入文本与层级生成确定性的讲解；可脚本化失败次数、固定响应和延迟，并统计调用次数。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::ExplainClient;
use crate::core::ExplainError;
use crate::model::{Concept, ExplanationResult, Layer, Level, Paper, Topic};

#[derive(Debug, Default)]
pub struct MockExplainClient {
    papers: Vec<Paper>,
    fixed: Option<ExplanationResult>,
    latency: Option<Duration>,
    /// 剩余需要失败的次数（usize::MAX 表示一直失败）
    explain_failures: AtomicUsize,
    list_failures: AtomicUsize,
    explain_calls: AtomicUsize,
    list_calls: AtomicUsize,
    requests: Mutex<Vec<(String, Level)>>,
}

impl MockExplainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置几篇示例论文，便于离线浏览
    pub fn with_sample_papers() -> Self {
        Self::new().with_papers(sample_papers())
    }

    pub fn with_papers(mut self, papers: Vec<Paper>) -> Self {
        self.papers = papers;
        self
    }

    /// 所有 explain 都返回同一结果
    pub fn with_explanation(mut self, result: ExplanationResult) -> Self {
        self.fixed = Some(result);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn failing_explain(self, times: usize) -> Self {
        self.explain_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn failing_list(self, times: usize) -> Self {
        self.list_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn explain_calls(&self) -> usize {
        self.explain_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// 收到的 explain 请求（文本, 层级），按顺序
    pub fn requests(&self) -> Vec<(String, Level)> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[async_trait]
impl ExplainClient for MockExplainClient {
    async fn explain(&self, text: &str, level: Level) -> Result<ExplanationResult, ExplainError> {
        self.explain_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((text.to_string(), level));
        }
        self.simulate_latency().await;

        if Self::take_failure(&self.explain_failures) {
            return Err(ExplainError::remote("Mock explain failure"));
        }
        if let Some(fixed) = &self.fixed {
            return Ok(fixed.clone());
        }

        let headline: String = text.lines().next().unwrap_or_default().chars().take(60).collect();
        Ok(ExplanationResult {
            topics: vec![Topic {
                name: headline.clone(),
                concepts: vec![Concept {
                    name: "Overview".to_string(),
                    layer: Layer {
                        what: format!("What \"{headline}\" is, at {} level.", level.label()),
                        why: "Why it matters.".to_string(),
                        how: "How it works.".to_string(),
                    },
                    image: None,
                }],
            }],
            main_takeaway: format!("{headline} ({level})"),
        })
    }

    async fn list_subjects(&self) -> Result<Vec<Paper>, ExplainError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if Self::take_failure(&self.list_failures) {
            return Err(ExplainError::remote("Mock list failure"));
        }
        Ok(self.papers.clone())
    }
}

fn sample_papers() -> Vec<Paper> {
    vec![
        Paper {
            id: "2303.08774".to_string(),
            title: "GPT-4 Technical Report".to_string(),
            abstract_text: "We report the development of GPT-4, a large-scale, multimodal model."
                .to_string(),
            category: "cs".to_string(),
            authors: "OpenAI".to_string(),
            published: chrono::NaiveDate::from_ymd_opt(2023, 3, 15),
            abstract_url: "http://arxiv.org/abs/2303.08774".to_string(),
            pdf_url: "http://arxiv.org/pdf/2303.08774".to_string(),
        },
        Paper {
            id: "1706.03762".to_string(),
            title: "Attention Is All You Need".to_string(),
            abstract_text: "We propose a new simple network architecture, the Transformer."
                .to_string(),
            category: "cs".to_string(),
            authors: "Ashish Vaswani, Noam Shazeer, Niki Parmar".to_string(),
            published: chrono::NaiveDate::from_ymd_opt(2017, 6, 12),
            abstract_url: "http://arxiv.org/abs/1706.03762".to_string(),
            pdf_url: "http://arxiv.org/pdf/1706.03762".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_explain_is_deterministic() {
        let client = MockExplainClient::new();
        let a = client.explain("Quantum tunnelling", Level::Basic).await.unwrap();
        let b = client.explain("Quantum tunnelling", Level::Basic).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.main_takeaway, "Quantum tunnelling (Basic)");
        assert_eq!(client.explain_calls(), 2);
        assert_eq!(client.requests()[0], ("Quantum tunnelling".to_string(), Level::Basic));
    }

    #[tokio::test]
    async fn test_mock_scripted_list_failures() {
        let client = MockExplainClient::with_sample_papers().failing_list(1);
        assert!(client.list_subjects().await.is_err());
        let papers = client.list_subjects().await.unwrap();
        assert_eq!(papers.len(), 2);
        assert_eq!(client.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_always_failing() {
        let client = MockExplainClient::new().failing_explain(usize::MAX);
        for _ in 0..5 {
            assert!(client.explain("x", Level::College).await.is_err());
        }
    }
}
