//! 可观测性：tracing 订阅器初始化与日志脱敏

pub mod masking;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use masking::MaskingMode;

/// 安装全局 tracing 订阅器：默认 info，可通过 RUST_LOG 覆盖；重复调用时静默忽略
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
