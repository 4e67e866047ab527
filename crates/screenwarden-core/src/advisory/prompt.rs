use indoc::formatdoc;

use super::AdvisoryContext;

/// Render the context summary sent to the oracle.
pub fn build_prompt(ctx: &AdvisoryContext) -> String {
    let routine = if ctx.routine.is_empty() {
        "- (no routine items scheduled)".to_string()
    } else {
        ctx.routine
            .iter()
            .map(|item| {
                format!(
                    "- {} [{}] {}",
                    item.scheduled_time.format("%H:%M"),
                    if item.completed { "x" } else { " " },
                    item.activity
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    formatdoc! {"
        You are assessing digital fatigue for a {role}.

        Screen time today: {used} minutes
        Daily limit: {limit} minutes
        Current local time: {time}

        Today's routine ([x] = done):
        {routine}

        Reply with a single JSON object and nothing else:
        {{\"score\": <integer 0-100, higher means more fatigued>, \"recommendation\": \"<one or two sentences>\"}}
        ",
        role = ctx.role.as_str(),
        used = ctx.minutes_used(),
        limit = ctx.limit_min,
        time = ctx.now.format("%H:%M"),
        routine = routine,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Role, RoutineItem};
    use chrono::{Local, NaiveTime, TimeZone};

    #[test]
    fn prompt_lists_routine_in_given_order_with_completion() {
        let mut done = RoutineItem::new(NaiveTime::from_hms_opt(7, 0, 0).unwrap(), "Breakfast");
        done.completed = true;
        let pending = RoutineItem::new(NaiveTime::from_hms_opt(18, 30, 0).unwrap(), "Homework");
        let ctx = AdvisoryContext {
            usage_secs: 95 * 60 + 20,
            limit_min: 120,
            now: Local.with_ymd_and_hms(2026, 5, 4, 16, 5, 0).unwrap(),
            role: Role::Student,
            routine: vec![done, pending],
        };

        let prompt = build_prompt(&ctx);
        assert!(prompt.contains("for a student"));
        assert!(prompt.contains("Screen time today: 95 minutes"));
        assert!(prompt.contains("Daily limit: 120 minutes"));
        assert!(prompt.contains("Current local time: 16:05"));
        let breakfast = prompt.find("- 07:00 [x] Breakfast").unwrap();
        let homework = prompt.find("- 18:30 [ ] Homework").unwrap();
        assert!(breakfast < homework);
        assert!(prompt.contains("\"score\""));
    }

    #[test]
    fn prompt_handles_empty_routine() {
        let ctx = AdvisoryContext {
            usage_secs: 0,
            limit_min: 60,
            now: Local.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap(),
            role: Role::Worker,
            routine: Vec::new(),
        };
        assert!(build_prompt(&ctx).contains("(no routine items scheduled)"));
    }
}
