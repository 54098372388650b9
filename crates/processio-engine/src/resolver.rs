//! Computed variables: a read-only namespace resolved on the fly.
//!
//! Keys of the form `calculate_<Function>_<Argument>` never touch storage.
//! The function name runs up to the first `_` after the prefix; everything
//! after it is the argument and may itself contain `_` or `/`
//! (`calculate_UtcOffset_America/Port_of_Spain`).

use std::collections::HashMap;

use chrono::{DateTime, Offset, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Key prefix of the computed namespace.
pub const COMPUTED_PREFIX: &str = "calculate_";

/// A computed function: `(argument, now) -> value`.
type ComputeFn = fn(&str, DateTime<Utc>) -> EngineResult<Value>;

/// Whether `key` lies in the computed namespace.
pub fn is_computed(key: &str) -> bool {
    key.starts_with(COMPUTED_PREFIX)
}

/// Stateless dispatch table from function name to implementation.
#[derive(Clone)]
pub struct ComputedResolver {
    functions: HashMap<&'static str, ComputeFn>,
}

impl Default for ComputedResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputedResolver {
    /// A resolver with the built-in functions registered.
    pub fn new() -> Self {
        let mut resolver = Self {
            functions: HashMap::new(),
        };
        resolver.register("UtcOffset", utc_offset);
        resolver
    }

    /// Add or replace a function.
    fn register(&mut self, name: &'static str, function: ComputeFn) {
        self.functions.insert(name, function);
    }

    /// Compute the value of a prefixed key at `now`.
    pub fn resolve(&self, key: &str, now: DateTime<Utc>) -> EngineResult<Value> {
        let rest = key.strip_prefix(COMPUTED_PREFIX).ok_or_else(|| {
            EngineError::Validation(format!("{key} is not a computed variable key"))
        })?;
        let (name, argument) = rest.split_once('_').unwrap_or((rest, ""));

        let function = self
            .functions
            .get(name)
            .ok_or_else(|| EngineError::UnknownFunction {
                name: name.to_string(),
            })?;

        debug!(function = name, argument, "resolving computed variable");
        function(argument, now)
    }
}

/// Offset of the IANA time zone `argument` from UTC at `now`, in minutes.
fn utc_offset(argument: &str, now: DateTime<Utc>) -> EngineResult<Value> {
    let tz: Tz = argument.parse().map_err(|_| EngineError::InvalidArgument {
        function: "UtcOffset".to_string(),
        message: format!("unknown time zone: {argument:?}"),
    })?;
    let seconds = now.with_timezone(&tz).offset().fix().local_minus_utc();
    Ok(Value::from(i64::from(seconds / 60)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn winter() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn summer() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn fixed_offset_zones() {
        let r = ComputedResolver::new();
        assert_eq!(
            r.resolve("calculate_UtcOffset_Asia/Hong_Kong", winter()).unwrap(),
            json!(480)
        );
        assert_eq!(
            r.resolve("calculate_UtcOffset_US/Hawaii", summer()).unwrap(),
            json!(-600)
        );
        assert_eq!(r.resolve("calculate_UtcOffset_UTC", winter()).unwrap(), json!(0));
    }

    #[test]
    fn daylight_saving_follows_the_instant() {
        let r = ComputedResolver::new();
        let key = "calculate_UtcOffset_Europe/Berlin";
        assert_eq!(r.resolve(key, winter()).unwrap(), json!(60));
        assert_eq!(r.resolve(key, summer()).unwrap(), json!(120));
    }

    #[test]
    fn fractional_hour_zones() {
        let r = ComputedResolver::new();
        assert_eq!(
            r.resolve("calculate_UtcOffset_Asia/Kolkata", winter()).unwrap(),
            json!(330)
        );
    }

    #[test]
    fn argument_may_contain_underscores() {
        let r = ComputedResolver::new();
        assert_eq!(
            r.resolve("calculate_UtcOffset_America/Port_of_Spain", winter()).unwrap(),
            json!(-240)
        );
    }

    #[test]
    fn unknown_function_is_rejected() {
        let r = ComputedResolver::new();
        let err = r.resolve("calculate_Moonphase_today", winter()).unwrap_err();
        assert!(matches!(err, EngineError::UnknownFunction { ref name } if name == "Moonphase"));
        assert!(err.is_client_error());
    }

    #[test]
    fn unknown_time_zone_is_rejected() {
        let r = ComputedResolver::new();
        let err = r.resolve("calculate_UtcOffset_Mars/Olympus", winter()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));

        let err = r.resolve("calculate_UtcOffset", winter()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));
    }

    #[test]
    fn custom_functions_can_be_registered() {
        fn epoch(_: &str, now: DateTime<Utc>) -> EngineResult<Value> {
            Ok(Value::from(now.timestamp()))
        }
        let mut r = ComputedResolver::new();
        r.register("Epoch", epoch);
        assert_eq!(r.functions.len(), 2);
        assert_eq!(
            r.resolve("calculate_Epoch", winter()).unwrap(),
            json!(winter().timestamp())
        );
    }

    #[test]
    fn prefix_detection() {
        assert!(is_computed("calculate_UtcOffset_UTC"));
        assert!(!is_computed("calc_UtcOffset_UTC"));
        assert!(!is_computed("my_calculate_x"));
    }
}
