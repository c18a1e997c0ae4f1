//! Log-domain arithmetic for products of many small probabilities.
//!
//! Probabilities are kept as natural logs; sums use `log1p` so that adding
//! two log-probabilities never round-trips through a raw exponential.
//! `LOG_ZERO` is the representable stand-in for log(0).

/// Sentinel for log(0); anything at or below `LOG_LIMIT` is treated as zero.
pub const LOG_ZERO: f64 = -f64::MAX;

pub const LOG_LIMIT: f64 = LOG_ZERO / 100.0;

/// Beyond this many nats of separation the smaller term is below the
/// precision of the larger one and can be dropped.
pub const NATS: f64 = 40.0;

#[inline]
pub fn logsum_nocheck(x: f64, y: f64) -> f64 {
    if (x - y).abs() > NATS {
        if x > y { x } else { y }
    } else {
        x + (y - x).exp().ln_1p()
    }
}

/// log(exp(x) + exp(y)), safe against `LOG_ZERO` operands.
#[inline]
pub fn logsum(x: f64, y: f64) -> f64 {
    let temp = y - x;
    if temp > NATS || x < LOG_LIMIT {
        y
    } else if temp < -NATS || y < LOG_LIMIT {
        x
    } else {
        x + temp.exp().ln_1p()
    }
}

/// log(exp(x) - exp(y)); requires x > y.
#[inline]
pub fn logdiff(x: f64, y: f64) -> f64 {
    debug_assert!(x > y);
    let temp = y - x;
    if temp < -NATS || x < LOG_LIMIT {
        x
    } else {
        x + (-temp.exp()).ln_1p()
    }
}

#[inline]
pub fn logsum3(x: f64, y: f64, z: f64) -> f64 {
    logsum(x, logsum(y, z))
}

/// Clamp a raw log so that log(0) maps to the sentinel instead of -inf.
#[inline]
pub fn log_clamped(p: f64) -> f64 {
    if p > 0.0 { p.ln() } else { LOG_ZERO }
}
