//! 会话运行时：驱动 RequestOrchestrator 的后台任务
//!
//! 单一写者：只有这个后台任务修改编排器。网络请求在独立 task 中执行，完成后带着
//! RequestToken 经通道回到后台任务，由编排器判断是否过期。
//! 三个通道：UI -> 会话的命令（mpsc）、会话 -> UI 的状态快照（watch）、任务 -> 会话的完成结果（mpsc）。

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::client::ExplainClient;
use crate::config::AppConfig;
use crate::core::{
    ExplainError, ExplainJob, ListJob, RequestOrchestrator, RequestToken, RetryPolicy,
    RetryScheduler, SessionSupervisor, UiState,
};
use crate::model::{ExplanationResult, Level, Mode, Paper, Subject};

/// 从界面发往会话的用户意图
#[derive(Debug, Clone)]
pub enum Command {
    RequestExplanation { subject: Subject, level: Level },
    /// 按会话当前层级讲解自定义文本
    ExplainText(String),
    /// 更新自定义文本输入（不触发请求）
    SetCustomText(String),
    SelectPaper(String),
    SetLevel(Level),
    SwitchMode(Mode),
    LoadSubjectList,
    ResetSubjectList,
    Reset,
    Shutdown,
}

/// 网络任务的完成结果
#[derive(Debug)]
enum Completion {
    Explanation {
        token: RequestToken,
        result: Result<ExplanationResult, ExplainError>,
    },
    ListAttemptFailed {
        token: RequestToken,
        attempts_remaining: u32,
    },
    SubjectList {
        token: RequestToken,
        result: Result<Vec<Paper>, ExplainError>,
    },
}

/// 正在执行的网络任务及其取消令牌；每类至多一个
#[derive(Default)]
struct ActiveJobs {
    explain: Option<(RequestToken, CancellationToken)>,
    list: Option<(RequestToken, CancellationToken)>,
}

impl ActiveJobs {
    /// 取消编排器已不再等待的任务
    fn sync(&mut self, orchestrator: &RequestOrchestrator) {
        cancel_if_stale(&mut self.explain, orchestrator.explain_token(), "explanation");
        cancel_if_stale(&mut self.list, orchestrator.list_token(), "subject list");
    }
}

fn cancel_if_stale(
    slot: &mut Option<(RequestToken, CancellationToken)>,
    current: Option<RequestToken>,
    what: &str,
) {
    if let Some((token, cancel)) = slot.take() {
        if Some(token) == current {
            *slot = Some((token, cancel));
        } else {
            tracing::debug!("Cancelling superseded {} request {}", what, token);
            cancel.cancel();
        }
    }
}

/// 会话初始参数
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub mode: Mode,
    pub level: Level,
    pub retry: RetryPolicy,
    pub cache_max_subjects: Option<usize>,
}

impl SessionOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            mode: cfg.session.default_mode,
            level: cfg.session.default_level,
            retry: cfg.retry.policy(),
            cache_max_subjects: cfg.cache.max_subjects,
        }
    }
}

/// 会话句柄：发送意图、订阅状态；drop 时结束会话
pub struct ExplainSession {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<UiState>,
    supervisor: SessionSupervisor,
    worker: Option<JoinHandle<()>>,
}

/// 创建会话并启动后台任务（需在 tokio 运行时中调用）
pub fn spawn_session(client: Arc<dyn ExplainClient>, options: SessionOptions) -> ExplainSession {
    let orchestrator = RequestOrchestrator::new(options.mode, options.level, options.retry)
        .with_cache_limit(options.cache_max_subjects);
    let supervisor = SessionSupervisor::new();

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (state_tx, state_rx) = watch::channel(orchestrator.snapshot());

    let span = tracing::info_span!("session", id = %supervisor.id());
    let worker = tokio::spawn(
        run_session(orchestrator, client, cmd_rx, state_tx, supervisor.clone()).instrument(span),
    );
    tracing::info!("Started explain session {}", supervisor.id());

    ExplainSession {
        cmd_tx,
        state_rx,
        supervisor,
        worker: Some(worker),
    }
}

impl ExplainSession {
    pub fn id(&self) -> Uuid {
        self.supervisor.id()
    }

    fn send(&self, cmd: Command) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::debug!("Session {} already closed, command dropped", self.id());
        }
    }

    pub fn request_explanation(&self, subject: Subject, level: Level) {
        self.send(Command::RequestExplanation { subject, level });
    }

    /// 便捷方法：按当前层级讲解自定义文本
    pub fn explain_text(&self, text: impl Into<String>) {
        self.send(Command::ExplainText(text.into()));
    }

    pub fn set_custom_text(&self, text: impl Into<String>) {
        self.send(Command::SetCustomText(text.into()));
    }

    pub fn select_paper(&self, paper_id: impl Into<String>) {
        self.send(Command::SelectPaper(paper_id.into()));
    }

    pub fn set_level(&self, level: Level) {
        self.send(Command::SetLevel(level));
    }

    pub fn switch_mode(&self, mode: Mode) {
        self.send(Command::SwitchMode(mode));
    }

    pub fn load_subject_list(&self) {
        self.send(Command::LoadSubjectList);
    }

    pub fn reset_subject_list(&self) {
        self.send(Command::ResetSubjectList);
    }

    pub fn reset(&self) {
        self.send(Command::Reset);
    }

    /// 当前快照
    pub fn state(&self) -> UiState {
        self.state_rx.borrow().clone()
    }

    /// 订阅状态变化；与任何 UI 框架无关
    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.state_rx.clone()
    }

    /// 等待满足条件的快照；会话已结束时返回 None
    pub async fn wait_until<F>(&self, mut predicate: F) -> Option<UiState>
    where
        F: FnMut(&UiState) -> bool,
    {
        let mut rx = self.state_rx.clone();
        let state = rx.wait_for(|s| predicate(s)).await.ok()?;
        Some(state.clone())
    }

    /// 结束会话并等待后台任务退出
    pub async fn dispose(mut self) {
        self.send(Command::Shutdown);
        self.supervisor.cancel();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                tracing::warn!("Session worker ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ExplainSession {
    fn drop(&mut self) {
        self.supervisor.cancel();
    }
}

async fn run_session(
    mut orchestrator: RequestOrchestrator,
    client: Arc<dyn ExplainClient>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<UiState>,
    supervisor: SessionSupervisor,
) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
    let cancel = supervisor.cancel_token();
    let mut jobs = ActiveJobs::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                if matches!(cmd, Command::Shutdown) {
                    break;
                }
                handle_command(&mut orchestrator, cmd, &client, &done_tx, &supervisor, &mut jobs);
            }
            Some(done) = done_rx.recv() => {
                apply_completion(&mut orchestrator, done);
                jobs.sync(&orchestrator);
            }
        }
        publish(&state_tx, &orchestrator);
    }

    supervisor.cancel();
    orchestrator.dispose();
    publish(&state_tx, &orchestrator);
    tracing::info!("Explain session {} closed", supervisor.id());
}

fn publish(state_tx: &watch::Sender<UiState>, orchestrator: &RequestOrchestrator) {
    let next = orchestrator.snapshot();
    state_tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

fn handle_command(
    orchestrator: &mut RequestOrchestrator,
    cmd: Command,
    client: &Arc<dyn ExplainClient>,
    done_tx: &mpsc::UnboundedSender<Completion>,
    supervisor: &SessionSupervisor,
    jobs: &mut ActiveJobs,
) {
    let mut list_job = None;
    let explain_job = match cmd {
        Command::RequestExplanation { subject, level } => {
            orchestrator.request_explanation(subject, level)
        }
        Command::ExplainText(text) => {
            let level = orchestrator.level();
            orchestrator.request_explanation(Subject::custom(text), level)
        }
        Command::SetCustomText(text) => {
            orchestrator.set_custom_text(text);
            None
        }
        Command::SelectPaper(id) => orchestrator.select_paper(&id),
        Command::SetLevel(level) => orchestrator.set_level(level),
        Command::SwitchMode(mode) => {
            orchestrator.switch_mode(mode);
            None
        }
        Command::LoadSubjectList => {
            list_job = orchestrator.load_subject_list();
            None
        }
        Command::ResetSubjectList => {
            orchestrator.reset_subject_list();
            None
        }
        Command::Reset => {
            orchestrator.reset();
            None
        }
        Command::Shutdown => None,
    };

    // 先取消被取代的任务，再登记新任务
    jobs.sync(orchestrator);

    if let Some(job) = explain_job {
        let cancel = supervisor.child_token();
        jobs.explain = Some((job.token, cancel.clone()));
        spawn_explain_job(job, client.clone(), done_tx.clone(), cancel);
    }
    if let Some(job) = list_job {
        let cancel = supervisor.child_token();
        jobs.list = Some((job.token, cancel.clone()));
        spawn_list_job(job, client.clone(), done_tx.clone(), cancel);
    }
}

fn apply_completion(orchestrator: &mut RequestOrchestrator, done: Completion) {
    match done {
        Completion::Explanation { token, result } => {
            orchestrator.complete_explanation(token, result);
        }
        Completion::ListAttemptFailed {
            token,
            attempts_remaining,
        } => {
            orchestrator.list_attempt_failed(token, attempts_remaining);
        }
        Completion::SubjectList { token, result } => {
            orchestrator.complete_subject_list(token, result);
        }
    }
}

fn spawn_explain_job(
    job: ExplainJob,
    client: Arc<dyn ExplainClient>,
    done_tx: mpsc::UnboundedSender<Completion>,
    cancel: CancellationToken,
) {
    tokio::spawn(
        async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = client.explain(&job.text, job.level) => result,
            };
            let _ = done_tx.send(Completion::Explanation {
                token: job.token,
                result,
            });
        }
        .in_current_span(),
    );
}

fn spawn_list_job(
    job: ListJob,
    client: Arc<dyn ExplainClient>,
    done_tx: mpsc::UnboundedSender<Completion>,
    cancel: CancellationToken,
) {
    tokio::spawn(
        async move {
            let token = job.token;
            let scheduler = RetryScheduler::new(job.policy);
            let fetch = scheduler.run_with_hook(
                || client.list_subjects(),
                |attempts_remaining, _| {
                    let _ = done_tx.send(Completion::ListAttemptFailed {
                        token,
                        attempts_remaining,
                    });
                },
            );
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = fetch => result,
            };
            let _ = done_tx.send(Completion::SubjectList { token, result });
        }
        .in_current_span(),
    );
}
