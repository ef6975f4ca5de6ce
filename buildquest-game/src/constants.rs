//! Centralized tuning constants for BuildQuest progression logic.
//!
//! Generation budgets, weight tables and reserved names live here so that
//! balance changes only happen through reviewed code, not through catalogs.

// Reserved names -----------------------------------------------------------
pub const NO_QUEST: &str = "No quest could be generated. This could mean that none of the prerequisites was met, please try again later.";
pub const LINES_QUEST_NAME: &str = "Lines over lines - Solve three Line Coverage Challenges";
pub const REJECT_REASON_UNSOLVABLE: &str = "Not solvable";

// Generation ---------------------------------------------------------------
pub(crate) const DEFAULT_CURRENT_QUESTS: usize = 1;
pub(crate) const DEFAULT_CURRENT_QUEST_TASKS: usize = 1;
pub(crate) const GENERATION_ATTEMPTS: usize = 3;
pub(crate) const LINES_QUEST_STEPS: usize = 3;
pub(crate) const QUEST_TASK_GOAL_MIN: u32 = 1;
pub(crate) const QUEST_TASK_GOAL_MAX: u32 = 10;
pub(crate) const COVERAGE_GOAL_SCALE: u32 = 5;
pub(crate) const MULTI_PARTICIPANT_THRESHOLD: usize = 1;

// Quest task weights -------------------------------------------------------
pub(crate) const WEIGHT_ADD_MORE_TESTS: u32 = 5;
pub(crate) const WEIGHT_COVER_MORE_BRANCHES: u32 = 5;
pub(crate) const WEIGHT_COVER_MORE_LINES: u32 = 5;
pub(crate) const WEIGHT_SOLVE_ACHIEVEMENT: u32 = 1;
pub(crate) const WEIGHT_SOLVE_CHALLENGES: u32 = 7;
pub(crate) const WEIGHT_SOLVE_WITHOUT_REJECTION: u32 = 6;
pub(crate) const WEIGHT_RECEIVE_CHALLENGE: u32 = 2;
pub(crate) const WEIGHT_SEND_CHALLENGE: u32 = 2;

// Challenge filter weights -------------------------------------------------
pub(crate) const WEIGHT_FILTER_ANY: u32 = 10;
pub(crate) const WEIGHT_FILTER_COVERAGE: u32 = 10;
pub(crate) const WEIGHT_KIND_CLASS: u32 = 2;
pub(crate) const WEIGHT_KIND_METHOD: u32 = 3;
pub(crate) const WEIGHT_KIND_LINE: u32 = 4;
pub(crate) const WEIGHT_KIND_BRANCH: u32 = 3;
pub(crate) const WEIGHT_KIND_MUTATION: u32 = 2;
pub(crate) const WEIGHT_KIND_SMELL: u32 = 2;
pub(crate) const WEIGHT_KIND_BUILD: u32 = 1;

// Challenge scoring --------------------------------------------------------
pub(crate) const LINE_SCORE_BASE: u32 = 2;
pub(crate) const LINE_SCORE_BONUS: u32 = 3;
pub(crate) const LINE_SCORE_COVERAGE_BONUS_THRESHOLD: f64 = 0.8;

// Quest tasks ---------------------------------------------------------------
pub(crate) const COVERAGE_TASK_SCORE_DIVISOR: u32 = 5;
pub(crate) const FIXED_TASK_SCORE: u32 = 1;
pub(crate) const PERCENT_CAP: u32 = 100;

// Detectors -----------------------------------------------------------------
pub const BUILTIN_DETECTOR_NAMESPACE: &str = "buildquest::detectors";
pub(crate) const DETECTOR_SEPARATOR: &str = "::";
pub(crate) const SOLVED_TIME_FORMAT: &str = "%-d %b %Y @ %I:%M %P";
pub(crate) const NOT_SOLVED_LABEL: &str = "Not solved";
