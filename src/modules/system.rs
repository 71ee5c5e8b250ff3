/*!
 * System Modules
 * `time` and `terminal`
 */

use super::catalog::NativeModule;
use crate::protocol::Value;
use crate::script::ScriptError;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Width reported when the environment does not say
const DEFAULT_TERMINAL_WIDTH: i64 = 80;

static EPOCH: OnceLock<Instant> = OnceLock::new();

pub(super) fn time_module() -> NativeModule {
    NativeModule::new("time")
        .function("sleep", |_, args| {
            args.expect("sleep", 1)?;
            let seconds = args.float(0)?;
            if !(0.0..=f64::from(u32::MAX)).contains(&seconds) {
                return Err(ScriptError::value("sleep length must be non-negative"));
            }
            std::thread::sleep(Duration::from_secs_f64(seconds));
            Ok(Value::None)
        })
        .function("monotonic", |_, args| {
            args.expect("monotonic", 0)?;
            let epoch = EPOCH.get_or_init(Instant::now);
            Ok(Value::Float(epoch.elapsed().as_secs_f64()))
        })
}

/// Bound to the controlling terminal, so isolated contexts cannot import it
pub(super) fn terminal_module() -> NativeModule {
    NativeModule::new("terminal")
        .with_isolate_safe(false)
        .function("width", |_, args| {
            args.expect("width", 0)?;
            let width = std::env::var("COLUMNS")
                .ok()
                .and_then(|c| c.trim().parse::<i64>().ok())
                .filter(|w| *w > 0)
                .unwrap_or(DEFAULT_TERMINAL_WIDTH);
            Ok(Value::Int(width))
        })
}
