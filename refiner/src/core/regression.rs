//! Round-over-round regression checks.
//!
//! Every check compares the last two evaluation rounds in `history` and is a
//! no-op (returns `false`) until at least two rounds exist.

use crate::core::focus::FocusFactors;
use crate::core::state::RoundSnapshot;
use crate::core::types::{Dimension, Scores};

fn last_two(history: &[RoundSnapshot]) -> Option<(&Scores, &Scores)> {
    match history {
        [.., prev, curr] => Some((&prev.scores, &curr.scores)),
        _ => None,
    }
}

fn any_dropped<'a>(
    history: &[RoundSnapshot],
    dims: impl IntoIterator<Item = &'a Dimension>,
) -> bool {
    let Some((prev, curr)) = last_two(history) else {
        return false;
    };
    dims.into_iter().any(|dim| curr.get(*dim) < prev.get(*dim))
}

/// Any frozen focus factor scored lower than in the previous round.
pub fn first_iteration_focus_regressed(history: &[RoundSnapshot], focus: &FocusFactors) -> bool {
    match focus.frozen() {
        Some(frozen) => any_dropped(history, frozen.iter()),
        None => false,
    }
}

/// Any active focus factor scored lower than in the previous round.
pub fn active_focus_regressed(history: &[RoundSnapshot], focus: &FocusFactors) -> bool {
    any_dropped(history, focus.active())
}

/// No active focus factor improved since the previous round.
///
/// Vacuously true when no active factor remains.
pub fn active_focus_flattened(history: &[RoundSnapshot], focus: &FocusFactors) -> bool {
    let Some((prev, curr)) = last_two(history) else {
        return false;
    };
    focus
        .active()
        .iter()
        .all(|dim| curr.get(*dim) <= prev.get(*dim))
}

/// Any dimension outside the frozen focus set scored lower than in the previous round.
pub fn non_focus_regressed(history: &[RoundSnapshot], focus: &FocusFactors) -> bool {
    let non_focus: Vec<Dimension> = Dimension::ALL
        .into_iter()
        .filter(|dim| !focus.is_frozen(*dim))
        .collect();
    any_dropped(history, &non_focus)
}
