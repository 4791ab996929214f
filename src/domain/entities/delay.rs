//! Fixed-precision time arithmetic.
//!
//! The constraints of the problem are expressed in terms of `delay`, a
//! 64-bit signed integer. Two sentinel values stand in for "not yet
//! reached" (`ASAP_NEG_INF`) and "unconstrained from above"
//! (`ALAP_POS_INF`); arithmetic on a sentinel must produce the same
//! sentinel rather than silently becoming finite.

pub type Delay = i64;

/// Earliest-start sentinel: a vertex with this ASAP time has not been
/// reached by any relaxation yet.
pub const ASAP_NEG_INF: Delay = Delay::MIN;

/// Latest-start sentinel: a vertex with this ALAP time is unconstrained
/// by any successor.
pub const ALAP_POS_INF: Delay = Delay::MAX;

/// Adds `weight` to `base`, propagating the ASAP sentinel untouched.
///
/// Used by the longest-path engine's relaxation step: `ASAP_NEG_INF + w`
/// must stay `ASAP_NEG_INF` for any finite `w`, positive or negative.
pub fn add_from_asap(base: Delay, weight: Delay) -> Delay {
    if base == ASAP_NEG_INF {
        ASAP_NEG_INF
    } else {
        base.saturating_add(weight)
    }
}

/// Adds `weight` to `base`, propagating the ALAP sentinel untouched.
pub fn add_from_alap(base: Delay, weight: Delay) -> Delay {
    if base == ALAP_POS_INF {
        ALAP_POS_INF
    } else {
        base.saturating_add(weight)
    }
}
