//! Integer rounding helpers shared by the table and the controller.

/// Integer division rounded to nearest, ties away from zero.
/// Uses 64-bit intermediates; `den == 0` yields 0.
#[inline]
pub fn div_round_nearest_i32(num: i32, den: i32) -> i32 {
    if den == 0 {
        return 0;
    }
    let n = i64::from(num);
    let d = i64::from(den);
    let half = d.abs() / 2;
    let q = if (n >= 0) == (d > 0) {
        (n.abs() + half) / d.abs()
    } else {
        -((n.abs() + half) / d.abs())
    };
    clamp_i64_to_i32(q)
}

#[inline]
pub fn clamp_i64_to_i32(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Round a float to i32, clamping and mapping non-finite input to 0.
#[inline]
pub fn round_f32_to_i32(x: f32) -> i32 {
    if !x.is_finite() {
        return 0;
    }
    let r = x.round();
    if r >= i32::MAX as f32 {
        i32::MAX
    } else if r <= i32::MIN as f32 {
        i32::MIN
    } else {
        r as i32
    }
}

/// Narrow to a stored table value; `i16::MIN` is reserved as the empty sentinel.
#[inline]
pub fn clamp_to_cell(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN) + 1, i32::from(i16::MAX)) as i16
}
