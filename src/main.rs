use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use schema_ide::{EditorConfig, Issue, IssueLevel, SchemaError, SchemaSession, SchemaStore, SUPPORTED_EXTENSIONS};

#[derive(Parser)]
#[command(name = "schema-ide")]
#[command(about = "校验、规范化并格式化区块属性 schema JSON 文件")]
#[command(version)]
struct Cli {
    /// schema JSON 文件路径
    path: PathBuf,

    /// 静默模式(仅输出错误)
    #[arg(long, global = true)]
    quiet: bool,

    /// 输出详细日志
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand)]
enum Action {
    /// 校验文件并列出问题（存在错误时以非零状态退出）
    Validate,
    /// 规范化排序后以标准格式保存
    Format {
        /// 存在警告时仍然保存
        #[arg(long)]
        force: bool,
    },
    /// 只重写排序值并保存（不做校验）
    Normalize,
    /// 输出当前生效的属性字段顺序
    Keys,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    validate_input(&cli.path)?;
    let config = EditorConfig::load().context("加载配置失败")?;

    match cli.command {
        Action::Validate => handle_validate(&cli, config),
        Action::Format { force } => handle_format(&cli, config, force),
        Action::Normalize => handle_normalize(&cli, config),
        Action::Keys => handle_keys(&cli, config),
    }
}

/// 初始化日志（默认 warn，`--verbose` 时为 info，`RUST_LOG` 优先）
fn init_logging(cli: &Cli) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    Builder::new().filter_level(level).parse_default_env().init();
}

/// 验证输入文件
fn validate_input(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        bail!("输入文件不存在: {:?}", path);
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    if !SUPPORTED_EXTENSIONS.iter().any(|&ext| Some(ext) == extension.as_deref()) {
        bail!("输入文件必须是 JSON 文件");
    }

    Ok(())
}

fn open_session(cli: &Cli, config: EditorConfig) -> anyhow::Result<SchemaSession> {
    let mut session = SchemaSession::with_config(config);
    session
        .open(&cli.path)
        .with_context(|| format!("无法加载 schema: {:?}", cli.path))?;
    Ok(session)
}

fn print_issues(issues: &[Issue]) {
    for issue in issues {
        match issue.level {
            IssueLevel::Error => eprintln!("{}", issue),
            IssueLevel::Warning => println!("{}", issue),
        }
    }
}

fn handle_validate(cli: &Cli, config: EditorConfig) -> anyhow::Result<()> {
    let mut session = open_session(cli, config)?;
    let issues = session.validate();
    let errors = issues.iter().filter(|i| i.is_error()).count();

    if !cli.quiet || errors > 0 {
        print_issues(&issues);
    }
    if !cli.quiet {
        println!("校验完成: {} 个错误, {} 个警告", errors, issues.len() - errors);
    }
    if errors > 0 {
        bail!("schema 存在 {} 个错误", errors);
    }
    Ok(())
}

fn handle_format(cli: &Cli, config: EditorConfig, force: bool) -> anyhow::Result<()> {
    let mut session = open_session(cli, config)?;
    let quiet = cli.quiet;

    let saved = match session.save(|warnings| {
        if !quiet {
            print_issues(warnings);
        }
        if !force {
            eprintln!("存在 {} 条警告，使用 --force 仍然保存", warnings.len());
        }
        force
    }) {
        Ok(saved) => saved,
        Err(SchemaError::SaveBlocked { errors }) => {
            print_issues(&session.store().validate());
            bail!("保存被阻止: {} 个错误", errors);
        }
        Err(e) => return Err(e).context("保存失败"),
    };

    if saved && !quiet {
        println!("已格式化: {:?}", cli.path);
    }
    if !saved {
        bail!("未保存");
    }
    Ok(())
}

fn handle_normalize(cli: &Cli, config: EditorConfig) -> anyhow::Result<()> {
    let mut store = SchemaStore::with_config(config);
    store
        .load(&cli.path)
        .with_context(|| format!("无法加载 schema: {:?}", cli.path))?;

    let changed = store.normalize_orders_all();
    store.save().context("保存失败")?;

    if !cli.quiet {
        if changed {
            println!("排序值已重写: {:?}", cli.path);
        } else {
            println!("排序值无需修改，已按标准格式保存: {:?}", cli.path);
        }
    }
    Ok(())
}

fn handle_keys(cli: &Cli, config: EditorConfig) -> anyhow::Result<()> {
    let session = open_session(cli, config)?;
    for key in session.store().attribute_key_order() {
        println!("{}", key);
    }
    Ok(())
}
