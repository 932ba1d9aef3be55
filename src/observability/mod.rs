//! 可观测性：tracing 订阅器初始化
//!
//! 默认级别 info（debug=true 时为 debug），RUST_LOG 优先。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn default_level(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// 安装全局订阅器；重复调用时保留已安装的订阅器
pub fn init(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(debug)));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init(true);
        init(false);
        tracing::debug!("still logging");
        assert_eq!(default_level(true), "debug");
    }
}
