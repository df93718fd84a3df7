//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Wrap an angle in degrees into the canonical range (-180, 180].
///
/// Values outside the range are reflected through the wrap point, i.e.
/// `sign(a) * -1 * (360 - |a|)`, as many times as required. -180 itself is
/// mapped onto +180 so that the output range is half-open and the function is
/// idempotent.
pub fn wrap_deg_180<T>(angle_deg: T) -> T
where
    T: Float
{
    // Non-finite values can't be wrapped, let the caller see them
    let (half, full) = match (T::from(180.0), T::from(360.0)) {
        (Some(h), Some(f)) if angle_deg.is_finite() => (h, f),
        _ => return angle_deg
    };

    // Whole turns first, so huge values can't stall the reflection
    let mut a = angle_deg % full;
    while a.abs() > half {
        a = a.signum() * -T::one() * (full - a.abs());
    }

    if a == -half {
        half
    }
    else {
        a
    }
}

/// Get the shortest signed angular distance in degrees to travel from `from`
/// to `to`.
///
/// The result is in (-180, 180], positive meaning `to` lies in the direction
/// of increasing angle.
pub fn ang_dist_deg<T>(from: T, to: T) -> T
where
    T: Float
{
    wrap_deg_180(to - from)
}

/// Clamp a value to a symmetric limit, `|value| <= limit`.
pub fn clamp_abs<T>(value: T, limit: T) -> T
where
    T: Float
{
    value.max(-limit).min(limit)
}
