/// Next rail position of a motor moving `current` towards `target`.
///
/// A zero step reaches the target immediately.
pub fn step_towards(current: u8, target: u8, step: u8) -> u8 {
    if step == 0 {
        return target;
    }

    if current < target {
        current.saturating_add(step).min(target)
    } else {
        current.saturating_sub(step).max(target)
    }
}
