//! 基本使用示例
//!
//! 本示例展示了薯片微内核的基本使用方法，包括：
//!
//! - 创建内核实例并接入事件总线
//! - 以工厂整批加载互相依赖的模块
//! - 按类型查询模块能力对象
//! - 级联卸载与关闭内核
//!
//! # 运行示例
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use chips_kernel::{
    ChipsKernel, Event, EventBus, KernelConfig, KernelContext, KernelModule, Logger, LoggerConfig,
    Module, ModuleApi, ModuleDescriptor, ModuleFactory, ModuleId, ModuleSource,
    StaticModuleLibrary,
};

// ============================================================================
// 示例模块
// ============================================================================

/// 计数器服务的能力对象
struct Counter {
    value: AtomicU64,
}

impl Counter {
    fn next(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// 提供 `counter` 类型能力的模块
struct CounterModule {
    counter: Arc<Counter>,
}

impl Module for CounterModule {
    fn id(&self) -> ModuleId {
        ModuleId::new("counter", "1.0.0")
    }

    fn as_kernel_module(self: Arc<Self>) -> Option<Arc<dyn KernelModule>> {
        Some(self)
    }
}

#[async_trait]
impl KernelModule for CounterModule {
    fn dependency_info(&self) -> Value {
        ModuleDescriptor::new("counter", "1.0.0", "counter").to_value()
    }

    async fn initialize(&self, _ctx: &KernelContext) -> chips_kernel::Result<()> {
        println!("  [counter] 初始化");
        Ok(())
    }

    async fn cleanup(&self, _ctx: &KernelContext) {
        println!("  [counter] 清理");
    }

    fn api(&self, _ctx: &KernelContext) -> Option<ModuleApi> {
        Some(self.counter.clone() as ModuleApi)
    }
}

/// 依赖 `counter` 类型的问候模块
struct GreeterModule;

impl Module for GreeterModule {
    fn id(&self) -> ModuleId {
        ModuleId::new("greeter", "1.0.0")
    }

    fn as_kernel_module(self: Arc<Self>) -> Option<Arc<dyn KernelModule>> {
        Some(self)
    }
}

#[async_trait]
impl KernelModule for GreeterModule {
    fn dependency_info(&self) -> Value {
        ModuleDescriptor::new("greeter", "1.0.0", "greeting")
            .depends_on_type("counter")
            .to_value()
    }

    async fn initialize(&self, ctx: &KernelContext) -> chips_kernel::Result<()> {
        let visits = ctx
            .module_api_by_type("counter")
            .and_then(|api| api.downcast::<Counter>().ok())
            .map(|counter| counter.next())
            .unwrap_or(0);
        println!("  [greeter] 初始化，计数器当前值 {}", visits);
        Ok(())
    }

    async fn cleanup(&self, _ctx: &KernelContext) {
        println!("  [greeter] 清理");
    }

    fn api(&self, _ctx: &KernelContext) -> Option<ModuleApi> {
        None
    }
}

/// 主函数
///
/// 演示薯片微内核的基本用法。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = Logger::try_init(LoggerConfig::builder().level("warn").build());

    println!("=== 薯片微内核基本使用示例 ===\n");

    // 1. 创建内核并接入事件总线
    println!("1. 创建内核...");
    let config = KernelConfig::builder().max_aux_threads(4).build();
    let kernel = ChipsKernel::with_config(&config, Box::new(StaticModuleLibrary::new()))?;

    let bus = Arc::new(EventBus::new());
    bus.subscribe(
        "demo",
        "kernel.*",
        Arc::new(|event: Event| println!("  [事件] {} {}", event.event_type, event.data)),
    )
    .await;
    kernel.set_event_controller(Some(bus.clone()), false).await?;

    let budget = kernel.thread_budget().await;
    println!(
        "   线程预算: 最低 {} 线程，工作池 {} 线程\n",
        budget.min_required_threads, budget.total_pool_size
    );

    // 2. 启动
    println!("2. 启动内核...");
    kernel.start().await?;
    println!("   状态: {}\n", kernel.state().await);

    // 3. 整批加载：问候模块排在前面，内核会先初始化计数器模块
    println!("3. 加载模块...");
    let counter = Arc::new(Counter {
        value: AtomicU64::new(0),
    });
    let counter_factory = {
        let counter = Arc::clone(&counter);
        ModuleFactory::new(move || {
            Ok(Arc::new(CounterModule {
                counter: Arc::clone(&counter),
            }) as Arc<dyn Module>)
        })
    };
    let greeter_factory = ModuleFactory::new(|| Ok(Arc::new(GreeterModule) as Arc<dyn Module>));

    let loaded = kernel
        .load_modules(vec![
            ModuleSource::Factory(greeter_factory),
            ModuleSource::Factory(counter_factory),
        ])
        .await?;
    let order: Vec<_> = loaded.iter().map(|d| d.name.as_str()).collect();
    println!("   初始化顺序: {:?}\n", order);

    // 4. 查询能力对象
    println!("4. 查询能力对象...");
    if let Some(counter) = kernel
        .module_api_by_type("counter")
        .await
        .and_then(|api| api.downcast::<Counter>().ok())
    {
        println!("   计数器: {}\n", counter.next());
    }

    // 5. 卸载计数器，问候模块失去依赖一并卸载
    println!("5. 卸载 counter...");
    let unloaded = kernel.unload_module("counter").await?;
    println!("   已卸载: {:?}", unloaded);
    println!("   剩余模块: {}\n", kernel.active_modules().await.len());

    // 6. 关闭
    println!("6. 关闭内核...");
    let report = kernel.stop().await;
    println!("   干净关闭: {}", report.is_clean());
    println!("   事件统计: {:?}", bus.stats());

    println!("\n=== 示例完成 ===");
    Ok(())
}
