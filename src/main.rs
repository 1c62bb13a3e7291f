//! Explainer - 分层讲解客户端
//!
//! 入口：初始化日志、加载配置、创建会话；有文本参数时讲解该文本，否则加载并列出论文。
//!
//! 用法：`explainer [--level <level>] [--config <path>] [text...]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use explainer::config::{load_config, AppConfig};
use explainer::core::{spawn_session, RequestState, SessionOptions, SubjectListState};
use explainer::model::ExplanationResult;
use explainer::{observability, ExplainClient, HttpExplainClient, Level, MockExplainClient, Paper};

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    level: Option<Level>,
    config: Option<PathBuf>,
    text: Vec<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--level" | "-l" => {
                let value = args.next().context("--level requires a value")?;
                out.level = Some(value.parse::<Level>().map_err(|e| anyhow!(e))?);
            }
            "--config" | "-c" => {
                let value = args.next().context("--config requires a path")?;
                out.config = Some(PathBuf::from(value));
            }
            flag if flag.starts_with("--") => bail!("Unknown option: {flag}"),
            _ => out.text.push(arg),
        }
    }
    Ok(out)
}

fn print_explanation(result: &ExplanationResult) {
    for topic in &result.topics {
        println!("# {}", topic.name);
        for concept in &topic.concepts {
            println!("\n## {}", concept.name);
            println!("What: {}", concept.layer.what);
            println!("Why:  {}", concept.layer.why);
            println!("How:  {}", concept.layer.how);
            if let Some(url) = concept.image.as_ref().and_then(|i| i.url.as_deref()) {
                println!("Image: {url}");
            }
        }
        println!();
    }
    println!("Main takeaway: {}", result.main_takeaway);
}

fn print_papers(papers: &[Paper]) {
    for paper in papers {
        let published = paper
            .published
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("[{}] {} ({}, {})", paper.id, paper.title, paper.category, published);
        if !paper.pdf_url.is_empty() {
            println!("    {}", paper.pdf_url);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = parse_args(std::env::args().skip(1))?;
    let cfg = load_config(args.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let client: Arc<dyn ExplainClient> = if cfg.api.mock {
        tracing::info!("Using mock explain client");
        Arc::new(MockExplainClient::with_sample_papers())
    } else {
        tracing::info!("Using explain service at {}", cfg.api.endpoint);
        Arc::new(HttpExplainClient::from_config(&cfg.api))
    };

    let mut options = SessionOptions::from_config(&cfg);
    if let Some(level) = args.level {
        options.level = level;
    }
    let session = spawn_session(client, options);

    let text = args.text.join(" ");
    let outcome = if text.trim().is_empty() {
        session.load_subject_list();
        let state = session
            .wait_until(|s| {
                matches!(
                    s.subject_list,
                    SubjectListState::Loaded(_) | SubjectListState::Failed
                )
            })
            .await
            .context("Session closed unexpectedly")?;
        match &state.subject_list {
            SubjectListState::Loaded(papers) => {
                print_papers(papers);
                Ok(())
            }
            _ => Err(anyhow!(state.list_error_message.unwrap_or_default())),
        }
    } else {
        session.explain_text(text);
        let state = session
            .wait_until(|s| !s.is_busy() && s.request != RequestState::Idle)
            .await
            .context("Session closed unexpectedly")?;
        match &state.request {
            RequestState::Displaying(result) => {
                print_explanation(result);
                Ok(())
            }
            _ => Err(anyhow!(state.error_message.unwrap_or_default())),
        }
    };

    session.dispose().await;
    outcome
}
