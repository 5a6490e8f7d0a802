//! Chips Kernel 命令行入口
//!
//! 薯片微内核的命令行工具。
//!
//! # 命令概览
//!
//! - `start` - 启动内核并加载配置中的模块目录
//! - `version` - 显示版本信息
//! - `check-config` - 验证配置文件
//!
//! # 使用示例
//!
//! ```bash
//! # 启动内核
//! chips-kernel start
//!
//! # 使用自定义配置文件启动
//! chips-kernel -c my-config.yaml start
//!
//! # 检查配置文件
//! chips-kernel check-config -c config.yaml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};

use chips_kernel::{
    ChipsKernel, EventBus, KernelConfig, Logger, LoggerConfig, StaticModuleLibrary,
};

/// Chips Kernel - 薯片微内核
#[derive(Parser)]
#[command(name = "chips-kernel")]
#[command(version, about = "薯片生态的可插拔模块微内核", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// 日志级别，覆盖配置文件 (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 开发模式（显示线程与源码位置）
    #[arg(long, global = true)]
    dev: bool,

    /// 子命令
    #[command(subcommand)]
    command: Option<Commands>,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 启动内核
    ///
    /// 以工作池和事件总线启动内核，加载配置中的模块目录。
    /// 按 Ctrl+C 可优雅关闭内核。
    Start,

    /// 查看版本信息
    Version,

    /// 验证配置文件
    ///
    /// 检查配置文件是否有效，并显示解析后的配置内容。
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// 启动内核
async fn run_start(config: KernelConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("启动薯片微内核...");

    let kernel = ChipsKernel::with_config(&config, Box::new(StaticModuleLibrary::new()))?;
    kernel
        .set_event_controller(Some(Arc::new(EventBus::new())), true)
        .await?;
    // 启动时加载配置中的模块目录，失败时内核已回滚
    if let Err(e) = kernel.start().await {
        warn!(error = %e, error_code = e.error_code(), "内核启动失败");
        return Err(Box::new(e));
    }

    let budget = kernel.thread_budget().await;
    println!();
    println!("薯片微内核已启动 (Chips Kernel Started)");
    println!("═══════════════════════════════════════");
    println!("  版本:     {}", chips_kernel::VERSION);
    println!("  工作池:   {} 线程", budget.total_pool_size);
    println!("  模块:     {}", kernel.active_modules().await.len());
    println!();
    println!("  按 Ctrl+C 优雅关闭内核");
    println!("═══════════════════════════════════════");
    println!();

    signal::ctrl_c().await?;

    println!();
    info!("收到关闭信号，正在优雅关闭...");
    let report = kernel.stop().await;
    for (subsystem, reason) in &report.failures {
        warn!(subsystem = %subsystem, reason = %reason, "停止时出现错误");
    }
    info!("薯片微内核已关闭");

    Ok(())
}

/// 检查配置文件
async fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("检查配置文件: {}", path.display());
    println!();

    if !path.exists() {
        println!("⚠️  警告: 配置文件不存在，将使用默认配置");
        println!();
        print_config(&KernelConfig::default());
        return Ok(());
    }

    let config = match KernelConfig::from_file(path).await {
        Ok(config) => config,
        Err(e) => {
            println!("❌ 配置文件无法解析: {}", e);
            return Err(Box::new(e));
        }
    };

    if let Err(e) = config.validate() {
        println!("❌ 配置文件无效: {}", e);
        return Err(Box::new(e));
    }

    println!("✅ 配置文件有效！");
    println!();
    print_config(&config);
    Ok(())
}

fn print_config(config: &KernelConfig) {
    println!("配置内容:");
    println!("────────────────────────────────────────");
    println!("  [内核]");
    println!("    辅助线程上限:   {}", config.max_aux_threads);
    match config.cpu_cores {
        Some(cores) => println!("    CPU 核心数:     {}", cores),
        None => println!("    CPU 核心数:     自动探测"),
    }
    match config.max_connections {
        Some(count) => println!("    最大连接数:     {}", count),
        None => println!("    最大连接数:     未设置"),
    }
    println!();
    println!("  [模块]");
    println!("    模块目录:       {:?}", config.module_dirs);
    println!();
    println!("  [日志]");
    println!("    日志级别:       {}", config.logging.level);
    println!("    文件输出:       {}", if config.logging.file_output { "是" } else { "否" });
    println!("    JSON 格式:      {}", if config.logging.json_format { "是" } else { "否" });
    println!("    轮转策略:       {}", config.logging.rotation);
    println!("────────────────────────────────────────");
}

/// 打印版本信息
fn print_version() {
    println!();
    println!("Chips Kernel - 薯片微内核");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", chips_kernel::VERSION);
    println!();
    println!("构建信息:");
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}

/// 加载配置文件，不存在时使用默认配置
async fn load_config(config_path: &Path) -> Result<KernelConfig, Box<dyn std::error::Error>> {
    if config_path.exists() {
        Ok(KernelConfig::from_file(config_path).await?)
    } else {
        Ok(KernelConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Start) | None => {
            let mut config = load_config(&cli.config).await?;
            if let Some(level) = cli.log_level {
                config.logging.level = level;
            }

            let mut logger_config = LoggerConfig::from_log_config(&config.logging);
            if cli.dev {
                logger_config.show_thread_ids = true;
                logger_config.show_file_line = true;
            }
            let _guard = Logger::init(logger_config)?;

            if cli.config.exists() {
                info!(path = %cli.config.display(), "已加载配置文件");
            } else {
                info!(path = %cli.config.display(), "配置文件不存在，使用默认配置");
            }

            run_start(config).await?;
        }

        Some(Commands::Version) => {
            print_version();
        }

        Some(Commands::CheckConfig { config }) => {
            let config_path = config.unwrap_or(cli.config);
            check_config(&config_path).await?;
        }
    }

    Ok(())
}
