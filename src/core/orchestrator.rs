//! 请求编排器：缓存命中判断、请求状态机、过期结果丢弃
//!
//! RequestOrchestrator 本身不做 IO：需要网络时返回 ExplainJob / ListJob，
//! 由 session 运行时执行后再把结果连同 RequestToken 交回。
//! 只有 token 仍是当前 token 的完成结果才会改变状态。

use std::fmt;
use std::sync::Arc;

use crate::core::{
    ErrorKind, ExplainError, ExplanationCache, RequestState, RetryPolicy, SubjectListState,
    UiState,
};
use crate::model::{ExplanationResult, Level, Mode, Paper, Subject, SubjectKey};

/// 单调递增的请求令牌
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestToken(u64);

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 需要发起的讲解请求
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExplainJob {
    pub token: RequestToken,
    pub key: SubjectKey,
    pub level: Level,
    pub text: String,
}

/// 需要发起的论文列表请求（带重试策略）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListJob {
    pub token: RequestToken,
    pub policy: RetryPolicy,
}

#[derive(Clone, Debug)]
struct InFlight {
    token: RequestToken,
    key: SubjectKey,
    level: Level,
}

pub struct RequestOrchestrator {
    custom_cache: ExplanationCache,
    paper_cache: ExplanationCache,
    request: RequestState,
    subject_list: SubjectListState,
    mode: Mode,
    level: Level,
    /// Custom 模式下当前输入的文本（未归一化）
    custom_text: String,
    current_paper: Option<Paper>,
    in_flight: Option<InFlight>,
    list_in_flight: Option<RequestToken>,
    next_token: u64,
    retry_policy: RetryPolicy,
    disposed: bool,
}

impl RequestOrchestrator {
    pub fn new(mode: Mode, level: Level, retry_policy: RetryPolicy) -> Self {
        Self {
            custom_cache: ExplanationCache::new(),
            paper_cache: ExplanationCache::new(),
            request: RequestState::Idle,
            subject_list: SubjectListState::NotLoaded,
            mode,
            level,
            custom_text: String::new(),
            current_paper: None,
            in_flight: None,
            list_in_flight: None,
            next_token: 0,
            retry_policy,
            disposed: false,
        }
    }

    /// 为两个缓存设置主题数上限
    pub fn with_cache_limit(mut self, max_subjects: Option<usize>) -> Self {
        self.custom_cache = ExplanationCache::new().with_max_subjects(max_subjects);
        self.paper_cache = ExplanationCache::new().with_max_subjects(max_subjects);
        self
    }

    pub fn request_state(&self) -> &RequestState {
        &self.request
    }

    pub fn subject_list_state(&self) -> &SubjectListState {
        &self.subject_list
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// 当前有效的讲解请求令牌
    pub fn explain_token(&self) -> Option<RequestToken> {
        self.in_flight.as_ref().map(|in_flight| in_flight.token)
    }

    /// 当前有效的列表请求令牌
    pub fn list_token(&self) -> Option<RequestToken> {
        self.list_in_flight
    }

    pub fn is_explained(&self, key: &SubjectKey, level: Level) -> bool {
        self.cache(key).has(key.as_str(), level)
    }

    /// 请求讲解。缓存命中时同步切到 Displaying 并返回 None；未命中时切到 Loading 并返回待执行的任务。
    /// 空文本、或同一 (key, level) 已在 Loading 时不做任何事。
    pub fn request_explanation(&mut self, subject: Subject, level: Level) -> Option<ExplainJob> {
        if self.disposed {
            return None;
        }

        let key = subject.key();
        if key.is_empty() {
            tracing::debug!("Rejected explanation request with empty text");
            return None;
        }

        if let Some(in_flight) = &self.in_flight {
            if self.request.is_loading() && in_flight.key == key && in_flight.level == level {
                tracing::debug!("Request for {} at {} already in flight", key, level);
                return None;
            }
        }

        self.mode = subject.mode();
        self.level = level;
        match &subject {
            Subject::CustomText { text } => {
                self.custom_text = text.clone();
                self.current_paper = None;
            }
            Subject::Paper(paper) => self.current_paper = Some(paper.clone()),
        }

        if let Some(cached) = self.cache(&key).get(key.as_str(), level) {
            tracing::debug!("Cache hit for {} at {}", key, level);
            // 任何进行中的请求都已过期
            self.in_flight = None;
            self.request = RequestState::Displaying(cached);
            return None;
        }

        let token = self.next_token();
        tracing::info!("Requesting explanation {} for {} at {}", token, key, level);
        self.in_flight = Some(InFlight {
            token,
            key: key.clone(),
            level,
        });
        self.request = RequestState::Loading;
        Some(ExplainJob {
            token,
            key,
            level,
            text: subject.request_text(),
        })
    }

    /// 交回讲解结果；返回 false 表示结果已过期被丢弃
    pub fn complete_explanation(
        &mut self,
        token: RequestToken,
        result: Result<ExplanationResult, ExplainError>,
    ) -> bool {
        if self.disposed {
            return false;
        }
        let in_flight = match self.in_flight.take() {
            Some(in_flight) if in_flight.token == token => in_flight,
            other => {
                self.in_flight = other;
                tracing::debug!("Discarding stale explanation result {}", token);
                return false;
            }
        };

        match result {
            Ok(result) => {
                let result = Arc::new(result);
                let cache = self.cache_mut(&in_flight.key);
                // 已填充的槽位不被覆盖
                let shown = match cache.get(in_flight.key.as_str(), in_flight.level) {
                    Some(existing) => existing,
                    None => {
                        cache.put(in_flight.key.as_str(), in_flight.level, result.clone());
                        result
                    }
                };
                self.request = RequestState::Displaying(shown);
            }
            Err(e) => {
                tracing::warn!(
                    "Explanation {} for {} at {} failed: {}",
                    token,
                    in_flight.key,
                    in_flight.level,
                    e
                );
                self.request = RequestState::Failed(e.kind());
            }
        }
        true
    }

    /// 回到 Idle；进行中的请求随之过期
    pub fn reset(&mut self) {
        self.in_flight = None;
        self.request = RequestState::Idle;
    }

    /// 更新 Custom 模式的输入文本，不发请求
    pub fn set_custom_text(&mut self, text: impl Into<String>) {
        self.custom_text = text.into();
    }

    /// 切换层级：重置后按新层级重新评估当前模式下的讲解对象（命中缓存或发起请求）
    pub fn set_level(&mut self, level: Level) -> Option<ExplainJob> {
        if self.disposed || level == self.level {
            return None;
        }
        self.level = level;
        self.reset();

        let subject = match self.mode {
            Mode::Papers => self.current_paper.clone().map(Subject::Paper),
            Mode::Custom => Some(Subject::custom(self.custom_text.clone())),
        }?;
        self.request_explanation(subject, level)
    }

    /// 切换模式：重置请求状态，缓存保持不变；进入 Custom 时清掉当前论文
    pub fn switch_mode(&mut self, mode: Mode) {
        if self.disposed || mode == self.mode {
            return;
        }
        tracing::debug!("Switching mode to {:?}", mode);
        self.mode = mode;
        if mode == Mode::Custom {
            self.current_paper = None;
        }
        self.reset();
    }

    /// 从已加载的列表中选中论文并请求讲解
    pub fn select_paper(&mut self, paper_id: &str) -> Option<ExplainJob> {
        let paper = self
            .subject_list
            .papers()
            .iter()
            .find(|p| p.id == paper_id)
            .cloned();
        match paper {
            Some(paper) => self.request_explanation(Subject::Paper(paper), self.level),
            None => {
                tracing::warn!("Paper {} is not in the loaded list", paper_id);
                None
            }
        }
    }

    /// 加载论文列表。已加载（非空）、加载中或已失败时不做任何事；失败后需先 reset_subject_list
    pub fn load_subject_list(&mut self) -> Option<ListJob> {
        if self.disposed {
            return None;
        }
        match &self.subject_list {
            SubjectListState::Loaded(papers) if !papers.is_empty() => return None,
            SubjectListState::Loading { .. } | SubjectListState::Failed => return None,
            _ => {}
        }

        let token = self.next_token();
        tracing::info!("Loading subject list {}", token);
        self.list_in_flight = Some(token);
        self.subject_list = SubjectListState::Loading {
            attempts_remaining: self.retry_policy.max_attempts,
        };
        Some(ListJob {
            token,
            policy: self.retry_policy,
        })
    }

    /// 列表某次尝试失败、即将重试
    pub fn list_attempt_failed(&mut self, token: RequestToken, attempts_remaining: u32) -> bool {
        if self.disposed || self.list_in_flight != Some(token) {
            return false;
        }
        self.subject_list = SubjectListState::Loading { attempts_remaining };
        true
    }

    pub fn complete_subject_list(
        &mut self,
        token: RequestToken,
        result: Result<Vec<Paper>, ExplainError>,
    ) -> bool {
        if self.disposed || self.list_in_flight != Some(token) {
            tracing::debug!("Discarding stale subject list result {}", token);
            return false;
        }
        self.list_in_flight = None;
        self.subject_list = match result {
            Ok(papers) => {
                tracing::info!("Loaded {} papers", papers.len());
                SubjectListState::Loaded(papers)
            }
            Err(e) => {
                tracing::warn!("Subject list failed: {}", e);
                SubjectListState::Failed
            }
        };
        true
    }

    /// 显式重置列表状态，允许再次加载
    pub fn reset_subject_list(&mut self) {
        self.list_in_flight = None;
        self.subject_list = SubjectListState::NotLoaded;
    }

    /// 会话结束：之后所有完成结果都被忽略，缓存清空
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.in_flight = None;
        self.list_in_flight = None;
        self.request = RequestState::Idle;
        if self.subject_list.is_loading() {
            self.subject_list = SubjectListState::NotLoaded;
        }
        self.custom_cache.clear();
        self.paper_cache.clear();
    }

    pub fn snapshot(&self) -> UiState {
        let error_message = match &self.request {
            RequestState::Failed(kind) => Some(kind.user_message().to_string()),
            _ => None,
        };
        let list_error_message = match &self.subject_list {
            SubjectListState::Failed => Some(ErrorKind::Exhausted.user_message().to_string()),
            _ => None,
        };
        UiState {
            mode: self.mode,
            level: self.level,
            request: self.request.clone(),
            subject_list: self.subject_list.clone(),
            current_paper: self.current_paper.clone(),
            explained_paper_ids: self.paper_cache.keys_with_level(self.level),
            cached_levels: self.cached_levels(),
            error_message,
            list_error_message,
        }
    }

    /// 当前讲解对象已缓存的层级，按 Level::ALL 排序
    fn cached_levels(&self) -> Vec<Level> {
        let key = match self.mode {
            Mode::Papers => match &self.current_paper {
                Some(paper) => SubjectKey::Paper(paper.id.clone()),
                None => return Vec::new(),
            },
            Mode::Custom => Subject::custom(self.custom_text.as_str()).key(),
        };
        let cached = self.cache(&key).levels_for(key.as_str());
        Level::ALL
            .into_iter()
            .filter(|level| cached.contains(level))
            .collect()
    }

    fn next_token(&mut self) -> RequestToken {
        self.next_token += 1;
        RequestToken(self.next_token)
    }

    fn cache(&self, key: &SubjectKey) -> &ExplanationCache {
        match key {
            SubjectKey::Custom(_) => &self.custom_cache,
            SubjectKey::Paper(_) => &self.paper_cache,
        }
    }

    fn cache_mut(&mut self, key: &SubjectKey) -> &mut ExplanationCache {
        match key {
            SubjectKey::Custom(_) => &mut self.custom_cache,
            SubjectKey::Paper(_) => &mut self.paper_cache,
        }
    }
}

impl Default for RequestOrchestrator {
    fn default() -> Self {
        Self::new(Mode::default(), Level::default(), RetryPolicy::default())
    }
}
