/// Implicit grouping of rapid, similar actions into one undo step.
use crate::action::{Action, ActionKind, LastAction};

/// Hard cap for merging consecutive text edits, applied on top of the
/// configurable grouping window.
pub const TEXT_EDIT_WINDOW_MS: u64 = 2000;

/// Decides whether `incoming` should merge into the entry recorded for `last`.
///
/// Only consecutive text edits of the same element on the same slide merge.
/// They must fall within the configured window and strictly within
/// [`TEXT_EDIT_WINDOW_MS`], so a window above two seconds does not stretch
/// text grouping.
pub fn can_group_with_last_action(
    last: Option<&LastAction>,
    incoming: &Action,
    now_ms: u64,
    window_ms: u64,
) -> bool {
    let Some(last) = last else {
        return false;
    };

    let time_diff = now_ms.saturating_sub(last.timestamp);
    if time_diff > window_ms {
        return false;
    }

    incoming.kind == ActionKind::ElementUpdate
        && last.kind == ActionKind::ElementUpdate
        && incoming.slide_id == last.slide_id
        && incoming.element_id == last.element_id
        && incoming.is_text_edit()
        && last.is_text_edit
        && time_diff < TEXT_EDIT_WINDOW_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_edit(ts: u64, slide: &str, element: &str) -> Action {
        Action::new(ActionKind::ElementUpdate, "Updated text")
            .at(ts)
            .on_slide(slide)
            .on_element(element)
            .text_edit(true)
    }

    fn last_of(action: &Action) -> LastAction {
        LastAction::from(action)
    }

    #[test]
    fn test_no_last_action_refuses() {
        let incoming = text_edit(100, "s1", "t1");
        assert!(!can_group_with_last_action(None, &incoming, 100, 1000));
    }

    #[test]
    fn test_same_element_text_edits_group() {
        let last = last_of(&text_edit(0, "s1", "t1"));
        let incoming = text_edit(400, "s1", "t1");
        assert!(can_group_with_last_action(Some(&last), &incoming, 400, 1000));
    }

    #[test]
    fn test_outer_window_exceeded_refuses() {
        let last = last_of(&text_edit(0, "s1", "t1"));
        let incoming = text_edit(1001, "s1", "t1");
        assert!(!can_group_with_last_action(Some(&last), &incoming, 1001, 1000));
    }

    #[test]
    fn test_outer_window_boundary_is_inclusive() {
        let last = last_of(&text_edit(0, "s1", "t1"));
        let incoming = text_edit(1000, "s1", "t1");
        assert!(can_group_with_last_action(Some(&last), &incoming, 1000, 1000));
    }

    #[test]
    fn test_text_window_caps_wide_outer_window() {
        let last = last_of(&text_edit(0, "s1", "t1"));
        let at_cap = text_edit(2000, "s1", "t1");
        let under_cap = text_edit(1999, "s1", "t1");
        assert!(!can_group_with_last_action(Some(&last), &at_cap, 2000, 5000));
        assert!(can_group_with_last_action(Some(&last), &under_cap, 1999, 5000));
    }

    #[test]
    fn test_different_element_refuses() {
        let last = last_of(&text_edit(0, "s1", "t1"));
        let incoming = text_edit(10, "s1", "t2");
        assert!(!can_group_with_last_action(Some(&last), &incoming, 10, 1000));
    }

    #[test]
    fn test_different_slide_refuses() {
        let last = last_of(&text_edit(0, "s1", "t1"));
        let incoming = text_edit(10, "s2", "t1");
        assert!(!can_group_with_last_action(Some(&last), &incoming, 10, 1000));
    }

    #[test]
    fn test_non_text_edit_refuses() {
        let last = last_of(&text_edit(0, "s1", "t1"));
        let moved = Action::new(ActionKind::ElementUpdate, "Moved element")
            .at(10)
            .on_slide("s1")
            .on_element("t1");
        assert!(!can_group_with_last_action(Some(&last), &moved, 10, 1000));

        let last_moved = last_of(&moved);
        let typed = text_edit(20, "s1", "t1");
        assert!(!can_group_with_last_action(Some(&last_moved), &typed, 20, 1000));
    }

    #[test]
    fn test_other_kinds_never_group() {
        let add = Action::new(ActionKind::ElementAdd, "Added text")
            .at(0)
            .on_slide("s1")
            .on_element("t1")
            .text_edit(true);
        let last = last_of(&add);
        let again = add.clone().at(5);
        assert!(!can_group_with_last_action(Some(&last), &again, 5, 1000));
    }

    #[test]
    fn test_clock_behind_last_action_counts_as_zero_elapsed() {
        let last = last_of(&text_edit(500, "s1", "t1"));
        let incoming = text_edit(400, "s1", "t1");
        assert!(can_group_with_last_action(Some(&last), &incoming, 400, 1000));
    }
}
