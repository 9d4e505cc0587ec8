/// Rotation sense for a step/dir driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards more resistance.
    Tighten,
    Loosen,
}

/// Next position when moving from `current` towards `target` by at most
/// `max_step` units.
#[inline]
pub fn approach(current: i32, target: i32, max_step: i32) -> i32 {
    let step = max_step.max(0);
    if target > current {
        current.saturating_add(step).min(target)
    } else {
        current.saturating_sub(step).max(target)
    }
}

/// Direction and whole number of driver steps from `current` to `target`.
/// Remainders smaller than one step are dropped.
#[inline]
pub fn steps_between(current: i32, target: i32, units_per_step: i32) -> (Direction, u32) {
    let per = i64::from(units_per_step.max(1));
    let delta = i64::from(target) - i64::from(current);
    let dir = if delta >= 0 {
        Direction::Tighten
    } else {
        Direction::Loosen
    };
    let steps = u32::try_from(delta.abs() / per).unwrap_or(u32::MAX);
    (dir, steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 100, 30, 30)]
    #[case(90, 100, 30, 100)]
    #[case(100, 0, 30, 70)]
    #[case(5, 5, 30, 5)]
    #[case(0, 100, -4, 0)]
    fn approach_is_speed_limited(
        #[case] current: i32,
        #[case] target: i32,
        #[case] step: i32,
        #[case] expected: i32,
    ) {
        assert_eq!(approach(current, target, step), expected);
    }

    #[test]
    fn steps_truncate_partial_steps() {
        assert_eq!(steps_between(0, 250, 100), (Direction::Tighten, 2));
        assert_eq!(steps_between(0, -250, 100), (Direction::Loosen, 2));
        assert_eq!(steps_between(i32::MIN, i32::MAX, 1).1, u32::MAX);
    }
}
