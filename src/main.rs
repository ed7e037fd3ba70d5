use anyhow::{bail, Context, Result};
use netchb_duty_runner::models::Section;
use netchb_duty_runner::services::result_store::{ResultStore, RestResultStore};
use netchb_duty_runner::services::AuthService;
use netchb_duty_runner::utils::logging;
use netchb_duty_runner::{models, parser, App, CancelFlag, Config};
use std::path::Path;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置（NETCHB_CONFIG 可指定路径）
    let config_path =
        std::env::var("NETCHB_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load(Path::new(&config_path))?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("search") => run_search(&config, &args[1..]).await,
        Some(_) => run_batch(config, &args).await,
        None => {
            bail!("用法: netchb_duty_runner <输入文件> [--sections=summary,entries,...] | search <MAWB> [条数]")
        }
    }
}

/// 批量处理：读输入文件 → 解析 → 跑管线
async fn run_batch(config: Config, args: &[String]) -> Result<()> {
    let input_path = &args[0];
    let sections = parse_sections_arg(&args[1..])?;

    // 操作员身份验证，不通过不跑批
    let email = std::env::var("OPERATOR_EMAIL").context("缺少环境变量 OPERATOR_EMAIL")?;
    let password = std::env::var("OPERATOR_PASSWORD").context("缺少环境变量 OPERATOR_PASSWORD")?;
    let auth = AuthService::new(&config.identity_url, &config.identity_service_key)?;
    auth.verify(&email, &password).await?;

    let text = std::fs::read_to_string(input_path)
        .with_context(|| format!("无法读取输入文件: {}", input_path))?;
    let outcome = parser::parse_batch_input(&text, &config.broker_codes());
    for diagnostic in &outcome.diagnostics {
        warn!("⚠️ 输入行被跳过: {}", diagnostic);
    }
    if outcome.items.is_empty() {
        bail!("输入文件里没有一条可处理的行");
    }
    info!(
        "✓ 解析完成: {} 条有效, {} 条跳过",
        outcome.items.len(),
        outcome.diagnostics.len()
    );

    // Ctrl+C 触发协作式取消
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("🛑 收到 Ctrl+C，将在任务边界停止");
                cancel.cancel();
            }
        });
    }

    let app = App::initialize(config).await?;
    let stats = app.run(outcome.items, &sections, cancel).await?;

    if stats.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// search 子命令：按 MAWB 查历史结果
async fn run_search(config: &Config, args: &[String]) -> Result<()> {
    let raw = args.first().context("用法: search <MAWB> [条数]")?;
    let mawb = models::work_item::normalize_mawb(raw)
        .with_context(|| format!("无效的 MAWB: {}", raw))?;
    let limit = args
        .get(1)
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(10);

    let store = RestResultStore::new(&config.storage_url, &config.identity_service_key)
        .map_err(|e| anyhow::anyhow!(e))?;
    let records = store
        .search(&mawb, limit)
        .await
        .map_err(|e| anyhow::anyhow!("查询失败: {}", e))?;

    if records.is_empty() {
        info!("没有找到 MAWB {} 的记录", models::work_item::format_mawb(&mawb));
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

/// 解析 --sections=a,b,c 参数；没有就处理全部 section
fn parse_sections_arg(args: &[String]) -> Result<Vec<Section>> {
    for arg in args {
        if let Some(list) = arg.strip_prefix("--sections=") {
            let mut sections = Vec::new();
            for name in list.split(',').filter(|s| !s.is_empty()) {
                let section = Section::from_name(name)
                    .with_context(|| format!("未知的 section: {}", name))?;
                sections.push(section);
            }
            return Ok(sections);
        }
    }
    Ok(Vec::new())
}
