use chapterforge::{RebuildConfig, Rebuilder, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// 📚 ChapterForge - EPUB章节重建工具
#[derive(Parser)]
#[command(name = "chapterforge")]
#[command(about = "按章节标题重新拆分EPUB正文，并同步清单、脊柱与目录")]
#[command(version)]
struct Args {
    /// 输入EPUB文件路径
    #[arg(help = "要重建的EPUB文件路径")]
    input: PathBuf,

    /// 输出EPUB文件路径
    #[arg(help = "重建后EPUB的输出路径")]
    output: PathBuf,

    /// 配置文件路径
    #[arg(short, long, value_name = "FILE", help = "YAML格式的重建配置文件")]
    config: Option<PathBuf>,

    /// 详细输出模式
    #[arg(short, long, help = "输出调试日志")]
    verbose: bool,

    /// 打印生效的配置
    #[arg(long, help = "打印生效的配置后继续执行")]
    print_config: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => RebuildConfig::from_file(path)?,
        None => RebuildConfig::default(),
    };
    let rebuilder = Rebuilder::new(config)?;
    if args.print_config {
        print!("{}", rebuilder.config().to_yaml()?);
    }

    let report = rebuilder.rebuild(&args.input, &args.output)?;

    if args.verbose {
        for (id, title) in &report.chapters {
            println!("  {}  {}", id, title);
        }
    }
    for warning in &report.warnings {
        println!("⚠️  {}", warning);
    }
    println!(
        "🎉 重建完成: {} 个章节，{} 个警告 -> {}",
        report.chapters.len(),
        report.warnings.len(),
        args.output.display()
    );
    Ok(())
}
