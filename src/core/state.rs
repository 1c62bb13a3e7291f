//! 状态定义：RequestState / SubjectListState 与投影给界面的 UiState
//!
//! 完整状态由 RequestOrchestrator 独占；观察者只拿到 UiState 快照。

use std::sync::Arc;

use serde::Serialize;

use crate::core::ErrorKind;
use crate::model::{ExplanationResult, Level, Mode, Paper};

/// 单次讲解请求的状态；每次转换整体替换
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub enum RequestState {
    #[default]
    Idle,
    Loading,
    Displaying(Arc<ExplanationResult>),
    Failed(ErrorKind),
}

impl RequestState {
    pub fn is_loading(&self) -> bool {
        matches!(self, RequestState::Loading)
    }

    pub fn result(&self) -> Option<&Arc<ExplanationResult>> {
        match self {
            RequestState::Displaying(result) => Some(result),
            _ => None,
        }
    }
}

/// 论文列表的状态，独立于讲解请求
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub enum SubjectListState {
    #[default]
    NotLoaded,
    Loading { attempts_remaining: u32 },
    Loaded(Vec<Paper>),
    Failed,
}

impl SubjectListState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SubjectListState::Loading { .. })
    }

    pub fn papers(&self) -> &[Paper] {
        match self {
            SubjectListState::Loaded(papers) => papers,
            _ => &[],
        }
    }
}

/// UI 看到的「投影」状态
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UiState {
    pub mode: Mode,
    pub level: Level,
    pub request: RequestState,
    pub subject_list: SubjectListState,
    /// 正在讲解 / 展示的论文；Custom 模式下恒为 None
    pub current_paper: Option<Paper>,
    /// 当前层级下已有缓存讲解的论文 id
    pub explained_paper_ids: Vec<String>,
    /// 当前讲解对象已有缓存的层级
    pub cached_levels: Vec<Level>,
    pub error_message: Option<String>,
    pub list_error_message: Option<String>,
}

impl UiState {
    pub fn is_busy(&self) -> bool {
        self.request.is_loading() || self.subject_list.is_loading()
    }

    pub fn is_paper_explained(&self, paper_id: &str) -> bool {
        self.explained_paper_ids.iter().any(|id| id == paper_id)
    }
}
