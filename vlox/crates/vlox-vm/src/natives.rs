//! Native functions exposed to Lox programs.

use std::time::{SystemTime, UNIX_EPOCH};
use vlox_core::Value;

/// `clock()`: milliseconds since the Unix epoch, as a number.
pub(crate) fn clock(_args: &[Value]) -> Value {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as f64)
        .unwrap_or(0.0);
    Value::Number(millis)
}
