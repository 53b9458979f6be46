//! 终端评分界面 - 编排层
//!
//! 逐行读取评分员输入的命令，交给 `GradingSession` 执行并打印结果。
//! 程序入口只负责组装依赖（评分后端、会话），不做任何评分判断。

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::clients::{GradingService, HttpGradingClient};
use crate::config::{Config, GradingBackend};
use crate::highlight::{coverage, Span, SpanKind};
use crate::models::Dimension;
use crate::orchestrator::session::GradingSession;
use crate::services::{LlmGrader, LlmGradingService, LlmService};
use crate::utils::logging::{log_startup, print_session_stats, truncate_text};
use crate::workflow::GradingItemWorkflow;

const HELP: &str = "\
命令:
  login <账号> <密码>          登录
  search <学号|a-b|a,b,c>      查询答卷
  score <编号> <科学> <批判>    填写专家分数（- 表示清空）
  note <编号> <理由...>        填写评分理由
  grade <编号>                 请求 AI 评分
  grade-all                    对所有已填分数的答卷请求 AI 评分
  edit <编号>                  重新修改专家输入
  confirm <编号>               确认最终分数（不可撤销）
  show [编号]                  查看列表或单份答卷
  logout                       注销
  quit                         退出";

/// 评分员命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { rater_id: String, password: String },
    Search(String),
    Score {
        index: usize,
        scientific: Option<i32>,
        critical: Option<i32>,
    },
    Note { index: usize, text: String },
    Grade(usize),
    GradeAll,
    Edit(usize),
    Confirm(usize),
    Show(Option<usize>),
    Logout,
    Help,
    Quit,
}

impl Command {
    /// 解析一行输入；空行返回 `Ok(None)`
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        let Some((name, rest)) = line
            .split_once(char::is_whitespace)
            .map(|(n, r)| (n, r.trim()))
            .or_else(|| (!line.is_empty()).then_some((line, "")))
        else {
            return Ok(None);
        };
        let args: Vec<&str> = rest.split_whitespace().collect();

        let command = match name.to_lowercase().as_str() {
            "login" => match args.as_slice() {
                [rater_id, password] => Command::Login {
                    rater_id: rater_id.to_string(),
                    password: password.to_string(),
                },
                _ => return Err("用法: login <账号> <密码>".to_string()),
            },
            "search" => {
                if rest.is_empty() {
                    return Err("用法: search <学号|a-b|a,b,c>".to_string());
                }
                Command::Search(rest.to_string())
            }
            "score" => match args.as_slice() {
                [index, scientific, critical] => Command::Score {
                    index: parse_index(index)?,
                    scientific: parse_score(scientific)?,
                    critical: parse_score(critical)?,
                },
                _ => return Err("用法: score <编号> <科学> <批判>".to_string()),
            },
            "note" => {
                let (index, text) = rest
                    .split_once(char::is_whitespace)
                    .map(|(i, t)| (i, t.trim()))
                    .unwrap_or((rest, ""));
                Command::Note {
                    index: parse_index(index)?,
                    text: text.to_string(),
                }
            }
            "grade" => Command::Grade(single_index(&args, "grade")?),
            "grade-all" => Command::GradeAll,
            "edit" => Command::Edit(single_index(&args, "edit")?),
            "confirm" => Command::Confirm(single_index(&args, "confirm")?),
            "show" => match args.as_slice() {
                [] => Command::Show(None),
                [index] => Command::Show(Some(parse_index(index)?)),
                _ => return Err("用法: show [编号]".to_string()),
            },
            "logout" => Command::Logout,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("未知命令: {}（输入 help 查看帮助）", other)),
        };
        Ok(Some(command))
    }
}

fn parse_index(s: &str) -> Result<usize, String> {
    s.parse().map_err(|_| format!("无效的编号: {}", s))
}

fn single_index(args: &[&str], name: &str) -> Result<usize, String> {
    match args {
        [index] => parse_index(index),
        _ => Err(format!("用法: {} <编号>", name)),
    }
}

fn parse_score(s: &str) -> Result<Option<i32>, String> {
    if s == "-" {
        return Ok(None);
    }
    s.parse()
        .map(Some)
        .map_err(|_| format!("无效的分数: {}", s))
}

/// 把高亮片段渲染为带标记的文本，如 `【S|原文】`
pub fn render_spans(spans: &[Span]) -> String {
    spans
        .iter()
        .map(|span| match span.kind {
            SpanKind::Plain => span.text.clone(),
            SpanKind::Evidence(dimension) => format!("【{}|{}】", dimension.marker(), span.text),
        })
        .collect()
}

fn describe_item(item: &GradingItemWorkflow) -> String {
    let expert = &item.expert().scores;
    let show = |v: Option<i32>| v.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
    let ai = item
        .ai_grade()
        .map(|g| {
            format!(
                " | AI {}/{}",
                g.result.scores.scientific, g.result.scores.critical
            )
        })
        .unwrap_or_default();
    format!(
        "#{} 学号 {} [{}] 专家 {}/{}{} | {}",
        item.ctx().item_index,
        item.ctx().student_id,
        item.phase(),
        show(expert.scientific),
        show(expert.critical),
        ai,
        truncate_text(item.answer(), 30)
    )
}

/// 应用主结构
pub struct App {
    config: Config,
    session: GradingSession,
}

impl App {
    /// 初始化应用：创建评分后端，按配置自动登录
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let remote: Arc<dyn GradingService> = Arc::new(HttpGradingClient::new(&config)?);
        let service: Arc<dyn GradingService> = match config.grading_backend {
            GradingBackend::Remote => remote,
            GradingBackend::Llm => {
                info!("🤖 使用本地大模型评分: {}", config.llm_model_name);
                let grader = LlmGrader::new(Arc::new(LlmService::new(&config)));
                Arc::new(LlmGradingService::new(remote, grader))
            }
        };

        let mut session = GradingSession::new(service, &config);

        if let (Some(rater_id), Some(password)) = (&config.rater_id, &config.rater_password) {
            if let Err(e) = session.login(rater_id, password).await {
                warn!("⚠️ 自动登录失败: {}", e);
            }
        }

        Ok(Self { config, session })
    }

    /// 运行命令循环，直到 quit 或输入结束
    pub async fn run(mut self) -> Result<()> {
        println!("{}", HELP);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };

            match Command::parse(&line) {
                Ok(None) => {}
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => self.execute(command).await,
                Err(message) => println!("{}", message),
            }
        }

        print_session_stats(&self.session.stats());
        Ok(())
    }

    async fn execute(&mut self, command: Command) {
        let outcome = match command {
            Command::Login { rater_id, password } => self
                .session
                .login(&rater_id, &password)
                .await
                .map(|rater| println!("欢迎，{}", rater.rater_id)),
            Command::Search(input) => self.session.search(&input).await.map(|_| self.print_list()),
            Command::Score {
                index,
                scientific,
                critical,
            } => self.session.set_scores(index, scientific, critical),
            Command::Note { index, text } => self.session.set_rationale(index, text),
            Command::Grade(index) => {
                let result = self.session.grade(index).await;
                if result.is_ok() {
                    self.print_item(index);
                }
                result
            }
            Command::GradeAll => {
                for (index, result) in self.session.grade_all_ready().await {
                    if let Err(e) = result {
                        println!("#{} 评分失败: {}", index, e);
                    }
                }
                self.print_list();
                Ok(())
            }
            Command::Edit(index) => self.session.edit(index),
            Command::Confirm(index) => self
                .session
                .confirm(index)
                .await
                .map(|_| println!("#{} 已确认", index)),
            Command::Show(None) => {
                self.print_list();
                Ok(())
            }
            Command::Show(Some(index)) => {
                self.print_item(index);
                Ok(())
            }
            Command::Logout => {
                print_session_stats(&self.session.stats());
                self.session.logout();
                Ok(())
            }
            Command::Help => {
                println!("{}", HELP);
                Ok(())
            }
            Command::Quit => Ok(()),
        };

        if let Err(e) = outcome {
            if e.is_validation() {
                println!("{}", e);
            } else {
                error!("❌ {}", e);
            }
        }
    }

    fn print_list(&self) {
        if self.session.items().is_empty() {
            println!("（没有答卷）");
            return;
        }
        for item in self.session.items() {
            println!("{}", describe_item(item));
        }
    }

    fn print_item(&self, index: usize) {
        let item = match self.session.item(index) {
            Ok(item) => item,
            Err(e) => {
                println!("{}", e);
                return;
            }
        };

        println!("{}", "─".repeat(60));
        println!("{}", describe_item(item));
        if !item.expert().rationale.is_empty() {
            println!("专家理由: {}", item.expert().rationale);
        }
        if let Some(grade) = item.ai_grade() {
            for dimension in Dimension::ALL {
                println!(
                    "[{}] {}: {}",
                    dimension.marker(),
                    dimension,
                    grade.result.scores.get(dimension)
                );
                for reason in grade.result.rationales.get(dimension) {
                    println!("    - {}", reason);
                }
            }
        }
        println!("{}", "─".repeat(60));

        let spans = item.annotated_answer();
        println!("{}", render_spans(&spans));
        if item.ai_grade().is_some() {
            let counts = coverage(&spans);
            println!(
                "高亮字数: {} {} / {} {}",
                Dimension::Scientific,
                counts.scientific,
                Dimension::Critical,
                counts.critical
            );
        }
        if self.config.verbose_logging {
            println!(
                "可用操作: 修改={} AI评分={} 重新修改={} 确认={}",
                item.can_edit_inputs(),
                item.can_request_ai(),
                item.can_request_edit(),
                item.can_confirm()
            );
        }
    }
}
