//! Property-based tests for the pure progression cores.
//!
//! Covered invariants:
//! - quiz scoring is deterministic, order-independent, and bounded
//!   (0 <= score <= max_score, 0.0 <= percentage <= 100.0)
//! - streak transitions only ever land on 1, n, or n+1, and the weekly
//!   bonus fires only on a changed transition that lands on exactly 7
//! - idle marking never flags the first screenshot and idle + active
//!   counts always partition the batch
//! - prerequisite gating unlocks exactly when every prerequisite is
//!   completed, regardless of ordering

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use intime_backend_rust::services::learning::is_topic_locked;
use intime_backend_rust::services::productivity::{
    idle_count, mark_idle_screenshots, Screenshot,
};
use intime_backend_rust::services::quiz::{
    score_attempt, AnswerValue, QuestionType, QuizQuestion, SubmittedAnswer,
};
use intime_backend_rust::services::streak::next_streak;

fn arb_question_type() -> impl Strategy<Value = QuestionType> {
    prop_oneof![
        Just(QuestionType::MultipleChoice),
        Just(QuestionType::TrueFalse),
        Just(QuestionType::FillBlank),
        Just(QuestionType::DragDrop),
    ]
}

fn arb_question(id: usize) -> impl Strategy<Value = QuizQuestion> {
    (arb_question_type(), "[a-z]{1,8}", 1i64..=10).prop_map(move |(qtype, correct, points)| {
        QuizQuestion {
            id: format!("q{id}"),
            question_type: qtype,
            question: format!("question {id}"),
            options: None,
            correct_answer: correct,
            points,
            explanation: None,
        }
    })
}

fn arb_questions() -> impl Strategy<Value = Vec<QuizQuestion>> {
    (1usize..=8).prop_flat_map(|n| {
        (0..n).map(arb_question).collect::<Vec<_>>()
    })
}

fn arb_answers(question_count: usize) -> impl Strategy<Value = Vec<SubmittedAnswer>> {
    proptest::collection::vec(
        (0..question_count.max(1), "[a-z]{0,8}"),
        0..=question_count.max(1),
    )
    .prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(idx, text)| SubmittedAnswer {
                question_id: format!("q{idx}"),
                answer: AnswerValue::Text(text),
            })
            .collect()
    })
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (2020i32..=2030, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    })
}

fn screenshot(id: usize, hash: &str) -> Screenshot {
    Screenshot {
        id: format!("s{id}"),
        captured_at: NaiveDate::from_ymd_opt(2026, 8, 27)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            + Duration::seconds(id as i64 * 30),
        screen_hash: hash.to_string(),
        application: None,
        window_title: None,
        idle_detected: false,
    }
}

proptest! {
    #[test]
    fn scoring_is_bounded_and_deterministic(
        questions in arb_questions(),
        answers_seed in arb_answers(8),
        passing in 0.0f64..=100.0,
    ) {
        let a = score_attempt(&questions, &answers_seed, passing);
        let b = score_attempt(&questions, &answers_seed, passing);

        prop_assert!(a.score >= 0);
        prop_assert!(a.score <= a.max_score);
        prop_assert!(a.percentage >= 0.0);
        prop_assert!(a.percentage <= 100.0);
        prop_assert_eq!(a.score, b.score);
        prop_assert_eq!(a.max_score, b.max_score);
        prop_assert_eq!(a.percentage, b.percentage);
        prop_assert_eq!(a.passed, b.passed);
        prop_assert_eq!(a.passed, a.percentage >= passing);
    }

    #[test]
    fn scoring_ignores_answer_order(
        questions in arb_questions(),
        answers in arb_answers(8),
    ) {
        let forward = score_attempt(&questions, &answers, 70.0);
        let mut reversed = answers.clone();
        reversed.reverse();
        let backward = score_attempt(&questions, &reversed, 70.0);

        prop_assert_eq!(forward.score, backward.score);
        prop_assert_eq!(forward.max_score, backward.max_score);
        prop_assert_eq!(forward.percentage, backward.percentage);
    }

    #[test]
    fn streak_lands_on_one_same_or_next(
        last_offset in proptest::option::of(0i64..=30),
        streak_days in 0i64..=400,
        today in arb_date(),
    ) {
        let last_activity = last_offset.map(|days| today - Duration::days(days));
        let t = next_streak(last_activity, streak_days, today);

        let valid = t.streak_days == 1
            || t.streak_days == streak_days
            || t.streak_days == streak_days + 1;
        prop_assert!(valid);
        prop_assert!(t.streak_days >= 1 || !t.changed);

        match last_offset {
            Some(0) => {
                prop_assert!(!t.changed);
                prop_assert_eq!(t.streak_days, streak_days);
            }
            Some(1) => {
                prop_assert!(t.changed);
                prop_assert_eq!(t.streak_days, streak_days + 1);
            }
            _ => {
                prop_assert!(t.changed);
                prop_assert_eq!(t.streak_days, 1);
            }
        }
    }

    #[test]
    fn weekly_bonus_only_on_changed_seven(
        last_offset in proptest::option::of(0i64..=30),
        streak_days in 0i64..=400,
        today in arb_date(),
    ) {
        let last_activity = last_offset.map(|days| today - Duration::days(days));
        let t = next_streak(last_activity, streak_days, today);

        prop_assert_eq!(t.earns_weekly_bonus(), t.changed && t.streak_days == 7);
    }

    #[test]
    fn idle_marking_partitions_the_batch(hashes in proptest::collection::vec("[ab]", 0..40)) {
        let mut screenshots: Vec<Screenshot> = hashes
            .iter()
            .enumerate()
            .map(|(i, h)| screenshot(i, h))
            .collect();

        mark_idle_screenshots(&mut screenshots);

        if let Some(first) = screenshots.first() {
            prop_assert!(!first.idle_detected);
        }

        let idle = idle_count(&screenshots);
        let active = screenshots.iter().filter(|s| !s.idle_detected).count();
        prop_assert_eq!(idle + active, screenshots.len());

        for i in 1..screenshots.len() {
            let expected = screenshots[i].screen_hash == screenshots[i - 1].screen_hash;
            prop_assert_eq!(screenshots[i].idle_detected, expected);
        }
    }

    #[test]
    fn prerequisite_gate_unlocks_exactly_at_full_completion(
        prerequisites in proptest::collection::vec("[a-e]", 0..6),
        completed in proptest::collection::hash_set("[a-e]", 0..6),
    ) {
        let completed: HashSet<String> = completed.into_iter().collect();
        let locked = is_topic_locked(&prerequisites, &completed);

        if prerequisites.is_empty() {
            prop_assert!(!locked);
        } else {
            let all_done = prerequisites.iter().all(|p| completed.contains(p));
            prop_assert_eq!(locked, !all_done);
        }
    }
}
