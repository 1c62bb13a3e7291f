//! 会话集成测试：缓存、过期丢弃、重试上限、模式切换

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use explainer::core::{
    ErrorKind, ExplainError, RequestState, RetryPolicy, SessionOptions, SubjectListState,
};
use explainer::model::{ExplanationResult, Level, Mode, Paper, Subject, Topic};
use explainer::{spawn_session, ExplainClient, MockExplainClient};
use tokio::time::Instant;

/// 让所有就绪任务跑完（暂停时钟下只在运行时空闲时推进）
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn fixed_result() -> ExplanationResult {
    ExplanationResult {
        topics: vec![Topic {
            name: "T".into(),
            concepts: vec![],
        }],
        main_takeaway: "X".into(),
    }
}

fn paper(id: &str) -> Paper {
    Paper {
        id: id.into(),
        title: format!("Title {id}"),
        abstract_text: format!("Abstract {id}"),
        ..Default::default()
    }
}

/// 按文本设置响应延迟；takeaway 回显文本与层级
#[derive(Default)]
struct DelayedClient {
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl DelayedClient {
    fn with_delay(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExplainClient for DelayedClient {
    async fn explain(&self, text: &str, level: Level) -> Result<ExplanationResult, ExplainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(text) {
            tokio::time::sleep(*delay).await;
        }
        Ok(ExplanationResult {
            topics: vec![],
            main_takeaway: format!("{text}@{level}"),
        })
    }

    async fn list_subjects(&self) -> Result<Vec<Paper>, ExplainError> {
        Ok(vec![paper("p1"), paper("p2")])
    }
}

/// 统计同时进行中的讲解调用数；被取消的调用在 future 释放时计数减一
#[derive(Default)]
struct ConcurrencyClient {
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExplainClient for ConcurrencyClient {
    async fn explain(&self, text: &str, level: Level) -> Result<ExplanationResult, ExplainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.current);
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(ExplanationResult {
            topics: vec![],
            main_takeaway: format!("{text}@{level}"),
        })
    }

    async fn list_subjects(&self) -> Result<Vec<Paper>, ExplainError> {
        Ok(vec![])
    }
}

fn takeaway(state: &explainer::UiState) -> Option<String> {
    state.request.result().map(|r| r.main_takeaway.clone())
}

#[tokio::test(start_paused = true)]
async fn test_identical_request_served_from_cache() {
    let client = Arc::new(MockExplainClient::new().with_explanation(fixed_result()));
    let session = spawn_session(client.clone(), SessionOptions::default());

    session.request_explanation(Subject::custom("abc"), Level::Basic);
    let first = session
        .wait_until(|s| matches!(s.request, RequestState::Displaying(_)))
        .await
        .unwrap();
    assert_eq!(takeaway(&first).as_deref(), Some("X"));
    assert_eq!(client.requests(), vec![("abc".to_string(), Level::Basic)]);

    session.reset();
    session.wait_until(|s| s.request == RequestState::Idle).await.unwrap();

    session.request_explanation(Subject::custom("abc"), Level::Basic);
    let second = session
        .wait_until(|s| matches!(s.request, RequestState::Displaying(_)))
        .await
        .unwrap();
    assert_eq!(second.request, first.request);
    assert_eq!(client.explain_calls(), 1);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_custom_text_and_paper_id_never_alias() {
    let client = Arc::new(MockExplainClient::new());
    let session = spawn_session(client.clone(), SessionOptions::default());

    session.request_explanation(Subject::custom("2303.08774"), Level::Basic);
    session
        .wait_until(|s| matches!(s.request, RequestState::Displaying(_)))
        .await
        .unwrap();

    session.request_explanation(Subject::Paper(paper("2303.08774")), Level::Basic);
    let state = session
        .wait_until(|s| takeaway(s).is_some_and(|t| t.starts_with("Title")))
        .await
        .unwrap();

    assert_eq!(client.explain_calls(), 2);
    assert_eq!(client.requests()[1].0, "Title 2303.08774\n\nAbstract 2303.08774");
    assert!(state.is_paper_explained("2303.08774"));

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_stale_response_never_displayed() {
    let client = Arc::new(DelayedClient::default().with_delay("slow", Duration::from_secs(10)));
    let session = spawn_session(client.clone(), SessionOptions::default());

    session.request_explanation(Subject::custom("slow"), Level::Basic);
    session.wait_until(|s| s.request.is_loading()).await.unwrap();
    session.request_explanation(Subject::custom("fast"), Level::Graduate);

    let state = session
        .wait_until(|s| matches!(s.request, RequestState::Displaying(_)))
        .await
        .unwrap();
    assert_eq!(takeaway(&state).as_deref(), Some("fast@Graduate"));

    // "slow" 的请求已被取消，不会再改变状态
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(takeaway(&session.state()).as_deref(), Some("fast@Graduate"));

    // 过期结果也没有写入缓存
    session.request_explanation(Subject::custom("slow"), Level::Basic);
    session.wait_until(|s| s.request.is_loading()).await.unwrap();
    assert_eq!(client.calls(), 3);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_subject_list_retry_is_bounded() {
    let client = Arc::new(MockExplainClient::new().failing_list(usize::MAX));
    let session = spawn_session(client.clone(), SessionOptions::default());
    let start = Instant::now();

    session.load_subject_list();
    let state = session
        .wait_until(|s| s.subject_list == SubjectListState::Failed)
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(client.list_calls(), 3);
    assert!(elapsed >= Duration::from_millis(4000), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(4100), "elapsed {elapsed:?}");
    assert_eq!(
        state.list_error_message.as_deref(),
        Some(ErrorKind::Exhausted.user_message())
    );
    assert_ne!(state.list_error_message, state.error_message);

    session.load_subject_list();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(client.list_calls(), 3);

    session.reset_subject_list();
    session.load_subject_list();
    session
        .wait_until(|s| s.subject_list.is_loading())
        .await
        .unwrap();
    settle().await;
    assert_eq!(client.list_calls(), 4);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_subject_list_recovers_after_transient_failure() {
    let client = Arc::new(
        MockExplainClient::new()
            .with_papers(vec![paper("p1")])
            .failing_list(1),
    );
    let session = spawn_session(client.clone(), SessionOptions::default());
    let mut rx = session.subscribe();

    session.load_subject_list();
    rx.wait_for(|s| s.subject_list == SubjectListState::Loading { attempts_remaining: 2 })
        .await
        .unwrap();
    let state = session
        .wait_until(|s| matches!(s.subject_list, SubjectListState::Loaded(_)))
        .await
        .unwrap();

    assert_eq!(state.subject_list.papers().len(), 1);
    assert_eq!(client.list_calls(), 2);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_custom_retry_policy_from_options() {
    let client = Arc::new(MockExplainClient::new().failing_list(usize::MAX));
    let options = SessionOptions {
        retry: RetryPolicy::new(5, Duration::from_millis(100)),
        ..Default::default()
    };
    let session = spawn_session(client.clone(), options);

    session.load_subject_list();
    session
        .wait_until(|s| s.subject_list == SubjectListState::Failed)
        .await
        .unwrap();
    assert_eq!(client.list_calls(), 5);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_empty_text_makes_no_call_and_no_transition() {
    let client = Arc::new(MockExplainClient::new());
    let session = spawn_session(client.clone(), SessionOptions::default());
    let mut rx = session.subscribe();
    rx.borrow_and_update();

    session.explain_text("");
    session.request_explanation(Subject::custom("  \n "), Level::College);
    settle().await;

    assert!(!rx.has_changed().unwrap());
    assert_eq!(session.state().request, RequestState::Idle);
    assert_eq!(client.explain_calls(), 0);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_mode_switch_then_new_subject_replaces_prior_display() {
    let client = Arc::new(DelayedClient::default().with_delay("new", Duration::from_secs(5)));
    let session = spawn_session(client.clone(), SessionOptions::default());

    session.load_subject_list();
    session
        .wait_until(|s| !s.subject_list.papers().is_empty())
        .await
        .unwrap();
    session.select_paper("p1");
    session
        .wait_until(|s| matches!(s.request, RequestState::Displaying(_)))
        .await
        .unwrap();

    session.switch_mode(Mode::Custom);
    let state = session
        .wait_until(|s| s.mode == Mode::Custom)
        .await
        .unwrap();
    assert_eq!(state.request, RequestState::Idle);

    session.explain_text("new");
    let state = session.wait_until(|s| s.request.is_loading()).await.unwrap();
    assert!(state.request.result().is_none());

    let state = session
        .wait_until(|s| matches!(s.request, RequestState::Displaying(_)))
        .await
        .unwrap();
    assert_eq!(takeaway(&state).as_deref(), Some("new@Basic"));

    // 切回论文模式，缓存仍然命中
    session.switch_mode(Mode::Papers);
    session.select_paper("p1");
    let state = session
        .wait_until(|s| takeaway(s).is_some_and(|t| t.starts_with("Title p1")))
        .await
        .unwrap();
    assert_eq!(state.mode, Mode::Papers);
    assert_eq!(client.calls(), 2);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_level_change_reevaluates_current_subject() {
    let client = Arc::new(DelayedClient::default());
    let options = SessionOptions {
        mode: Mode::Custom,
        ..Default::default()
    };
    let session = spawn_session(client.clone(), options);

    session.explain_text("abc");
    session
        .wait_until(|s| takeaway(s).as_deref() == Some("abc@Basic"))
        .await
        .unwrap();

    session.set_level(Level::Graduate);
    session
        .wait_until(|s| takeaway(s).as_deref() == Some("abc@Graduate"))
        .await
        .unwrap();
    assert_eq!(client.calls(), 2);

    session.set_level(Level::Basic);
    let state = session
        .wait_until(|s| takeaway(s).as_deref() == Some("abc@Basic"))
        .await
        .unwrap();
    assert_eq!(state.level, Level::Basic);
    assert_eq!(client.calls(), 2);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_explanation_is_not_retried_automatically() {
    let client = Arc::new(MockExplainClient::new().failing_explain(1));
    let session = spawn_session(client.clone(), SessionOptions::default());

    session.explain_text("abc");
    let state = session
        .wait_until(|s| matches!(s.request, RequestState::Failed(_)))
        .await
        .unwrap();
    assert_eq!(state.request, RequestState::Failed(ErrorKind::RemoteFailure));
    assert_eq!(
        state.error_message.as_deref(),
        Some(ErrorKind::RemoteFailure.user_message())
    );

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(client.explain_calls(), 1);

    session.explain_text("abc");
    session
        .wait_until(|s| matches!(s.request, RequestState::Displaying(_)))
        .await
        .unwrap();
    assert_eq!(client.explain_calls(), 2);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_dropping_session_stops_pending_work() {
    let client = Arc::new(MockExplainClient::new().failing_list(usize::MAX));
    let session = spawn_session(client.clone(), SessionOptions::default());

    session.load_subject_list();
    session.wait_until(|s| s.subject_list.is_loading()).await.unwrap();
    settle().await;
    assert_eq!(client.list_calls(), 1);

    drop(session);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(client.list_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_request_is_cancelled() {
    let client = Arc::new(ConcurrencyClient::default());
    let options = SessionOptions {
        mode: Mode::Custom,
        ..Default::default()
    };
    let session = spawn_session(client.clone(), options);

    session.explain_text("abc");
    session.wait_until(|s| s.request.is_loading()).await.unwrap();
    settle().await;
    session.set_level(Level::College);
    settle().await;
    session.set_level(Level::Graduate);
    settle().await;
    session.explain_text("xyz");

    let state = session
        .wait_until(|s| matches!(s.request, RequestState::Displaying(_)))
        .await
        .unwrap();
    assert_eq!(takeaway(&state).as_deref(), Some("xyz@Graduate"));
    assert_eq!(client.calls.load(Ordering::SeqCst), 4);
    assert_eq!(client.peak.load(Ordering::SeqCst), 1);
    assert_eq!(client.current.load(Ordering::SeqCst), 0);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_subject_list_cancels_pending_load() {
    let client = Arc::new(MockExplainClient::new().failing_list(usize::MAX));
    let session = spawn_session(client.clone(), SessionOptions::default());

    session.load_subject_list();
    session.wait_until(|s| s.subject_list.is_loading()).await.unwrap();
    settle().await;
    assert_eq!(client.list_calls(), 1);

    session.reset_subject_list();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(client.list_calls(), 1);
    assert_eq!(session.state().subject_list, SubjectListState::NotLoaded);

    session.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_dispose_during_list_load_leaves_no_spinner() {
    let client = Arc::new(MockExplainClient::new().failing_list(usize::MAX));
    let session = spawn_session(client.clone(), SessionOptions::default());
    let rx = session.subscribe();

    session.load_subject_list();
    session.wait_until(|s| s.subject_list.is_loading()).await.unwrap();
    session.dispose().await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    let state = rx.borrow().clone();
    assert_eq!(state.subject_list, SubjectListState::NotLoaded);
    assert!(!state.is_busy());
}
