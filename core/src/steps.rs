use chrono::NaiveDate;

use crate::models::{CursorState, StepCursor};

/// Result of feeding one reading through the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub state: CursorState,
    pub cursor: StepCursor,
    /// Steps for the reading's day; replaces the stored count.
    pub day_steps: i64,
    pub counter_reset: bool,
    /// Prior tracked day and its final count, set on rollover.
    pub finalize: Option<(NaiveDate, i64)>,
}

fn fresh(total: i64, day: NaiveDate) -> StepCursor {
    StepCursor {
        cursor_day: day,
        baseline_total: total,
        last_total: total,
    }
}

/// Advance the cursor with a lifetime `total` observed on calendar `day`.
///
/// Devices report a counter that only grows until reboot. The cursor keeps
/// the counter seen at the start of the tracked day, so the day's steps are
/// the distance from that baseline.
#[must_use]
pub fn advance(prev: Option<StepCursor>, total: i64, day: NaiveDate) -> Transition {
    let Some(prev) = prev else {
        return Transition {
            state: CursorState::NoCursor,
            cursor: fresh(total, day),
            day_steps: 0,
            counter_reset: false,
            finalize: None,
        };
    };

    if prev.cursor_day != day {
        let carried = (prev.last_total - prev.baseline_total).max(0);
        return Transition {
            state: CursorState::DayRollover,
            cursor: fresh(total, day),
            day_steps: 0,
            counter_reset: false,
            finalize: Some((prev.cursor_day, carried)),
        };
    }

    let delta = total - prev.baseline_total;
    if delta < 0 {
        return Transition {
            state: CursorState::SameDay,
            cursor: fresh(total, day),
            day_steps: 0,
            counter_reset: true,
            finalize: None,
        };
    }

    Transition {
        state: CursorState::SameDay,
        cursor: StepCursor {
            last_total: total,
            ..prev
        },
        day_steps: delta,
        counter_reset: false,
        finalize: None,
    }
}
