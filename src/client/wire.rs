//! 与后端交换的信封格式
//!
//! 请求：单一端点，`{ action: "explain" | "arxiv", text?, level? }`。
//! 响应按防御性方式解析：缺字段取默认值、null 视为空、`{ "error": ... }` 视为远端失败，
//! 论文列表既接受裸数组也接受 `{ "papers": [...] }`，缺 id 的条目被跳过。

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::ExplainError;
use crate::model::{Concept, ExplanationResult, ImageRef, Layer, Level, Paper, Topic};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Explain,
    Arxiv,
}

#[derive(Debug, Serialize)]
pub struct ApiRequest<'a> {
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
}

impl<'a> ApiRequest<'a> {
    pub fn explain(text: &'a str, level: Level) -> Self {
        Self {
            action: Action::Explain,
            text: Some(text),
            level: Some(level),
        }
    }

    pub fn list_subjects() -> Self {
        Self {
            action: Action::Arxiv,
            text: None,
            level: None,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
struct WireLayer {
    #[serde(default, deserialize_with = "null_as_default")]
    what: String,
    #[serde(default, deserialize_with = "null_as_default")]
    why: String,
    #[serde(default, deserialize_with = "null_as_default")]
    how: String,
}

#[derive(Debug, Deserialize)]
struct WireConcept {
    #[serde(default, deserialize_with = "null_as_default")]
    concept: String,
    #[serde(default, deserialize_with = "null_as_default")]
    layer: WireLayer,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    image_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTopic {
    #[serde(default, deserialize_with = "null_as_default")]
    topic: String,
    #[serde(default, deserialize_with = "null_as_default")]
    concepts: Vec<WireConcept>,
}

#[derive(Debug, Deserialize)]
struct WireExplainResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    explanations: Vec<WireTopic>,
    #[serde(default, deserialize_with = "null_as_default")]
    main_takeaway: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePaper {
    #[serde(default, deserialize_with = "null_as_default")]
    id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    title: String,
    #[serde(rename = "abstract", default, deserialize_with = "null_as_default")]
    abstract_text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    authors: String,
    #[serde(default)]
    published: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    abstract_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pdf_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PaperListBody {
    List(Vec<WirePaper>),
    Wrapped { papers: Vec<WirePaper> },
    Error { error: String },
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// 只取日期部分，兼容 "2024-03-01" 与 "2024-03-01T12:00:00Z"
fn parse_published(raw: Option<String>) -> Option<NaiveDate> {
    let raw = raw?;
    let date = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

impl From<WireConcept> for Concept {
    fn from(c: WireConcept) -> Self {
        let url = non_empty(c.image_url);
        let prompt = non_empty(c.image_prompt);
        let image = if url.is_some() || prompt.is_some() {
            Some(ImageRef { url, prompt })
        } else {
            None
        };
        Concept {
            name: c.concept,
            layer: Layer {
                what: c.layer.what,
                why: c.layer.why,
                how: c.layer.how,
            },
            image,
        }
    }
}

impl From<WirePaper> for Paper {
    fn from(p: WirePaper) -> Self {
        Paper {
            id: p.id.trim().to_string(),
            title: p.title.trim().to_string(),
            abstract_text: p.abstract_text.trim().to_string(),
            category: p.category,
            authors: p.authors,
            published: parse_published(p.published),
            abstract_url: p.abstract_url,
            pdf_url: p.pdf_url,
        }
    }
}

/// 解析 explain 响应体
pub fn parse_explain_response(body: &str) -> Result<ExplanationResult, ExplainError> {
    let wire: WireExplainResponse = serde_json::from_str(body)
        .map_err(|e| ExplainError::remote(format!("Malformed explain response: {e}")))?;

    if let Some(err) = non_empty(wire.error) {
        return Err(ExplainError::RemoteFailure(err));
    }
    if wire.explanations.is_empty() && wire.main_takeaway.trim().is_empty() {
        return Err(ExplainError::remote("Explain response contained no explanation"));
    }

    Ok(ExplanationResult {
        topics: wire
            .explanations
            .into_iter()
            .map(|t| Topic {
                name: t.topic,
                concepts: t.concepts.into_iter().map(Concept::from).collect(),
            })
            .collect(),
        main_takeaway: wire.main_takeaway,
    })
}

/// 解析论文列表响应体
pub fn parse_paper_list(body: &str) -> Result<Vec<Paper>, ExplainError> {
    let wire: PaperListBody = serde_json::from_str(body)
        .map_err(|e| ExplainError::remote(format!("Malformed paper list: {e}")))?;

    let papers = match wire {
        PaperListBody::List(papers) | PaperListBody::Wrapped { papers } => papers,
        PaperListBody::Error { error } => return Err(ExplainError::RemoteFailure(error)),
    };

    let total = papers.len();
    let papers: Vec<Paper> = papers
        .into_iter()
        .map(Paper::from)
        .filter(|p| !p.id.is_empty())
        .collect();
    if papers.len() < total {
        tracing::warn!("Skipped {} papers without an id", total - papers.len());
    }
    Ok(papers)
}
