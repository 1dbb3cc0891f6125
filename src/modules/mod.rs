//! Built-in command modules.

pub mod status;
pub mod todo;

use crate::commands::Module;

/// Every built-in module, in scan order.
pub fn builtin() -> Vec<Module> {
    vec![status::module(), todo::module()]
}

/// Compact duration: `1y2d3h4m5s`, zero units left out.
pub fn elapsed(seconds: u64) -> String {
    const UNITS: [(u64, &str); 5] = [
        (365 * 24 * 3600, "y"),
        (24 * 3600, "d"),
        (3600, "h"),
        (60, "m"),
        (1, "s"),
    ];
    if seconds == 0 {
        return "0s".to_string();
    }
    let mut left = seconds;
    let mut out = String::new();
    for (size, unit) in UNITS {
        let n = left / size;
        if n > 0 {
            out.push_str(&format!("{}{}", n, unit));
            left %= size;
        }
    }
    out
}
