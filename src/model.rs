//! 领域模型：讲解对象（Subject）、理解层级（Level）、论文与讲解结果
//!
//! ExplanationResult 只由远端服务产出，编排器只存取、不修改。

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 理解层级；缓存时各层级互相独立，没有大小顺序
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    #[default]
    Basic,
    Elementary,
    #[serde(rename = "Middle School")]
    MiddleSchool,
    #[serde(rename = "High School")]
    HighSchool,
    College,
    Graduate,
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Basic,
        Level::Elementary,
        Level::MiddleSchool,
        Level::HighSchool,
        Level::College,
        Level::Graduate,
    ];

    /// 发给后端的取值
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Basic => "Basic",
            Level::Elementary => "Elementary",
            Level::MiddleSchool => "Middle School",
            Level::HighSchool => "High School",
            Level::College => "College",
            Level::Graduate => "Graduate",
        }
    }

    /// 界面上的短标签（K3 / K6 / ...）
    pub fn label(&self) -> &'static str {
        match self {
            Level::Basic => "K3",
            Level::Elementary => "K6",
            Level::MiddleSchool => "K9",
            Level::HighSchool => "K12",
            Level::College => "College",
            Level::Graduate => "Graduate",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 接受后端取值、短标签或去掉空格/下划线后的写法（"middle_school"、"k9"）
impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        Level::ALL
            .into_iter()
            .find(|level| {
                let wire: String = level
                    .as_str()
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .flat_map(char::to_lowercase)
                    .collect();
                wire == folded || level.label().to_lowercase() == folded
            })
            .ok_or_else(|| format!("Unknown level: {s}"))
    }
}

/// 两种工作模式：浏览论文列表 / 自定义文本
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Papers,
    Custom,
}

/// 论文条目（来自 list_subjects），除 id 外字段均可缺省
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub category: String,
    pub authors: String,
    pub published: Option<NaiveDate>,
    pub abstract_url: String,
    pub pdf_url: String,
}

impl Paper {
    /// 发送给讲解服务的正文：标题 + 空行 + 摘要
    pub fn explain_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.abstract_text)
    }
}

/// 讲解对象：自定义文本或论文
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Subject {
    CustomText { text: String },
    Paper(Paper),
}

impl Subject {
    pub fn custom(text: impl Into<String>) -> Self {
        Subject::CustomText { text: text.into() }
    }

    /// 缓存键；两类键分属不同命名空间，不会混淆
    pub fn key(&self) -> SubjectKey {
        match self {
            Subject::CustomText { text } => SubjectKey::Custom(normalize_text(text)),
            Subject::Paper(paper) => SubjectKey::Paper(paper.id.clone()),
        }
    }

    /// 实际发给 RemoteExplainClient 的文本
    pub fn request_text(&self) -> String {
        match self {
            Subject::CustomText { text } => normalize_text(text),
            Subject::Paper(paper) => paper.explain_text(),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Subject::CustomText { .. } => Mode::Custom,
            Subject::Paper(_) => Mode::Papers,
        }
    }
}

/// 带类型标签的缓存键
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum SubjectKey {
    Custom(String),
    Paper(String),
}

impl SubjectKey {
    pub fn as_str(&self) -> &str {
        match self {
            SubjectKey::Custom(s) | SubjectKey::Paper(s) => s,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKey::Custom(text) => {
                let preview: String = text.chars().take(32).collect();
                if preview.len() < text.len() {
                    write!(f, "custom:{preview}...")
                } else {
                    write!(f, "custom:{preview}")
                }
            }
            SubjectKey::Paper(id) => write!(f, "paper:{id}"),
        }
    }
}

/// 去首尾空白，内部连续空白折叠为单个空格
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 单个概念的三层讲解
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Layer {
    pub what: String,
    pub why: String,
    pub how: String,
}

/// 概念配图：可能只有生成提示词而尚无 URL
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub url: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Concept {
    pub name: String,
    pub layer: Layer,
    pub image: Option<ImageRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Topic {
    pub name: String,
    pub concepts: Vec<Concept>,
}

/// 完整讲解结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExplanationResult {
    pub topics: Vec<Topic>,
    pub main_takeaway: String,
}
