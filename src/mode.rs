use serde::{Deserialize, Serialize};

use crate::review::Ladder;

// Category weights. Lower weight = scheduled earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeWeights {
    pub allow_learn: bool,
    pub review: i64,
    pub drill: i64,
    pub learn: i64,
}

/// Urgency phase derived from days until the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StudyMode {
    Mastery,
    Accel,
    Crash,
}

impl StudyMode {
    pub fn for_days_left(days_left: Option<i64>) -> Self {
        match days_left {
            Some(d) if (0..=7).contains(&d) => StudyMode::Crash,
            Some(d) if (8..=30).contains(&d) => StudyMode::Accel,
            // unknown, far out, or the test already happened
            _ => StudyMode::Mastery,
        }
    }

    pub fn weights(&self) -> ModeWeights {
        match self {
            StudyMode::Mastery | StudyMode::Accel => ModeWeights {
                allow_learn: true,
                review: 1,
                drill: 2,
                learn: 3,
            },
            StudyMode::Crash => ModeWeights {
                allow_learn: false,
                review: 1,
                drill: 2,
                learn: 4,
            },
        }
    }

    pub fn ladder(&self) -> Ladder {
        match self {
            StudyMode::Mastery => Ladder::Mastery,
            StudyMode::Accel | StudyMode::Crash => Ladder::Crash,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StudyMode::Mastery => "MASTERY",
            StudyMode::Accel => "ACCEL",
            StudyMode::Crash => "CRASH",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "MASTERY" => Some(StudyMode::Mastery),
            "ACCEL" => Some(StudyMode::Accel),
            "CRASH" => Some(StudyMode::Crash),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod selection_tests {
        use super::*;

        #[test]
        fn unknown_and_far_out_share_mastery_weights() {
            let expected = StudyMode::Mastery.weights();
            assert_eq!(StudyMode::for_days_left(None), StudyMode::Mastery);
            for d in [31, 45, 90, 365, 10_000] {
                let mode = StudyMode::for_days_left(Some(d));
                assert_eq!(mode, StudyMode::Mastery, "days_left={}", d);
                assert_eq!(mode.weights(), expected);
            }
        }

        #[test]
        fn accel_window_boundaries() {
            assert_eq!(StudyMode::for_days_left(Some(30)), StudyMode::Accel);
            assert_eq!(StudyMode::for_days_left(Some(8)), StudyMode::Accel);
            assert_eq!(StudyMode::for_days_left(Some(7)), StudyMode::Crash);
        }

        #[test]
        fn crash_window_boundaries() {
            assert_eq!(StudyMode::for_days_left(Some(0)), StudyMode::Crash);
            assert_eq!(StudyMode::for_days_left(Some(7)), StudyMode::Crash);
        }

        #[test]
        fn past_test_date_falls_back_to_mastery() {
            assert_eq!(StudyMode::for_days_left(Some(-1)), StudyMode::Mastery);
        }
    }

    mod weight_tests {
        use super::*;

        #[test]
        fn accel_has_same_numbers_as_mastery() {
            assert_eq!(StudyMode::Accel.weights(), StudyMode::Mastery.weights());
            assert_ne!(StudyMode::Accel.as_str(), StudyMode::Mastery.as_str());
        }

        #[test]
        fn crash_disallows_learning_and_pushes_learn_back() {
            let w = StudyMode::Crash.weights();
            assert!(!w.allow_learn);
            assert_eq!((w.review, w.drill, w.learn), (1, 2, 4));
        }

        #[test]
        fn ladders_follow_mode() {
            assert_eq!(StudyMode::Mastery.ladder(), Ladder::Mastery);
            assert_eq!(StudyMode::Accel.ladder(), Ladder::Crash);
            assert_eq!(StudyMode::Crash.ladder(), Ladder::Crash);
        }
    }

    mod str_tests {
        use super::*;

        #[test]
        fn round_trips_names() {
            for mode in [StudyMode::Mastery, StudyMode::Accel, StudyMode::Crash] {
                assert_eq!(StudyMode::from_str(mode.as_str()), Some(mode));
            }
            assert_eq!(StudyMode::from_str("crash"), Some(StudyMode::Crash));
            assert_eq!(StudyMode::from_str("panic"), None);
        }
    }
}
