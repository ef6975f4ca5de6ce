use crate::challenge::{Challenge, ChallengeKey, ChallengeKind};
use crate::constants::{LINE_SCORE_BASE, LINE_SCORE_BONUS, LINE_SCORE_COVERAGE_BONUS_THRESHOLD};
use crate::context::{CoverageLine, EvaluationContext, LineStatus, SourceFile};
use crate::xml;

/// Cover one specific line of a class.
#[derive(Debug, Clone, PartialEq)]
pub struct LineCoverageChallenge {
    path: String,
    package: String,
    class_name: String,
    branch: String,
    line_number: u32,
    line_content: String,
    status: LineStatus,
    /// File coverage when the challenge was generated.
    coverage: f64,
    current_covered_branches: u32,
    max_covered_branches: u32,
    solved_covered_branches: u32,
    solved_coverage: f64,
    created: i64,
    solved: i64,
}

impl LineCoverageChallenge {
    #[must_use]
    pub fn new(file: &SourceFile, line: &CoverageLine, branch: &str, created: i64) -> Self {
        Self {
            path: file.path.clone(),
            package: file.package.clone(),
            class_name: file.class_name.clone(),
            branch: branch.to_string(),
            line_number: line.number,
            line_content: line.content.trim().to_string(),
            status: line.status,
            coverage: file.coverage,
            current_covered_branches: line.covered_branches,
            max_covered_branches: line.total_branches,
            solved_covered_branches: 0,
            solved_coverage: 0.0,
            created,
            solved: 0,
        }
    }

    #[must_use]
    pub const fn line_number(&self) -> u32 {
        self.line_number
    }

    #[must_use]
    pub fn line_content(&self) -> &str {
        &self.line_content
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    fn same_content(&self, line: &CoverageLine) -> bool {
        line.content.trim() == self.line_content
    }

    /// The reported line this challenge refers to, following the line if it moved.
    fn locate<'f>(&self, file: &'f SourceFile) -> Option<&'f CoverageLine> {
        if let Some(line) = file
            .lines
            .iter()
            .find(|line| line.number == self.line_number && self.same_content(line))
        {
            return Some(line);
        }
        file.lines
            .iter()
            .filter(|line| self.same_content(line))
            .min_by_key(|line| line.number.abs_diff(self.line_number))
    }

    fn try_solve(&mut self, line: &CoverageLine, file: &SourceFile, now: i64) -> bool {
        let covered = match line.status {
            LineStatus::Missed => return false,
            LineStatus::Covered => self.max_covered_branches.max(line.covered_branches),
            LineStatus::Partial => {
                if self.max_covered_branches > 1
                    && line.covered_branches <= self.current_covered_branches
                {
                    return false;
                }
                line.covered_branches
            }
        };
        self.solved_covered_branches = covered;
        self.solved_coverage = file.coverage;
        self.solved = now;
        true
    }
}

impl Challenge for LineCoverageChallenge {
    fn kind(&self) -> ChallengeKind {
        ChallengeKind::LineCoverage
    }

    fn key(&self) -> ChallengeKey {
        ChallengeKey::new(format!(
            "line:{}.{}:{}:{}:{}",
            self.package,
            self.class_name,
            self.line_number,
            self.status.label(),
            self.line_content
        ))
    }

    fn created(&self) -> i64 {
        self.created
    }

    fn solved(&self) -> i64 {
        self.solved
    }

    fn is_solved(&mut self, ctx: &EvaluationContext<'_>) -> bool {
        if self.solved != 0 {
            return true;
        }
        let Some(file) = ctx.file(&self.path) else {
            return false;
        };
        let Some(line) = self.locate(file) else {
            return false;
        };
        self.try_solve(line, file, ctx.now)
    }

    fn is_solvable(&self, ctx: &EvaluationContext<'_>) -> bool {
        if self.branch != ctx.branch {
            return true;
        }
        let Some(file) = ctx.file(&self.path) else {
            return true;
        };
        file.lines
            .iter()
            .any(|line| line.status.is_open() && self.same_content(line))
    }

    fn update(&mut self, ctx: &EvaluationContext<'_>) {
        if let Some(line) = ctx.file(&self.path).and_then(|file| self.locate(file)) {
            self.current_covered_branches = line.covered_branches;
            self.max_covered_branches = self.max_covered_branches.max(line.total_branches);
        }
    }

    fn score(&self) -> u32 {
        if self.coverage >= LINE_SCORE_COVERAGE_BONUS_THRESHOLD || self.status == LineStatus::Partial
        {
            LINE_SCORE_BONUS
        } else {
            LINE_SCORE_BASE
        }
    }

    fn escaped_string(&self) -> String {
        let prefix = if self.max_covered_branches > 1 {
            format!(
                "Write a test to cover more branches (currently {} of {} covered) of line ",
                self.current_covered_branches, self.max_covered_branches
            )
        } else {
            "Write a test to fully cover line ".to_string()
        };
        format!(
            "{prefix}{} in class {} in package {} (created for branch {})",
            self.line_number, self.class_name, self.package, self.branch
        )
    }

    fn to_xml(&self, reason: Option<&str>, indentation: usize) -> String {
        format!(
            "{}<LineCoverageChallenge{}{}/>",
            xml::pad(indentation),
            xml::attributes(&[
                ("created", self.created.to_string()),
                ("solved", self.solved.to_string()),
                ("class", self.class_name.clone()),
                ("package", self.package.clone()),
                ("coverage", self.coverage.to_string()),
                ("coverageAtSolved", self.solved_coverage.to_string()),
                ("lineNumber", self.line_number.to_string()),
                ("lineContent", self.line_content.clone()),
                ("coverageType", self.status.label().to_string()),
                ("solvedCoveredBranches", self.solved_covered_branches.to_string()),
            ]),
            xml::reason_attribute(reason)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::fixtures::{Harness, line, source_file};

    fn challenge_for(harness: &Harness, number: u32) -> LineCoverageChallenge {
        let file = &harness.files[0];
        let target = file.line(number).expect("line exists");
        LineCoverageChallenge::new(file, target, "main", 10)
    }

    #[test]
    fn solved_once_the_line_is_covered() {
        let mut harness = Harness::new(vec![source_file("src/Calc.java", 0.5, "alice", 3)]);
        let mut challenge = challenge_for(&harness, 3);
        assert!(!challenge.is_solved(&harness.ctx()));

        harness.files[0].lines[2].status = LineStatus::Covered;
        harness.now = 5_000;
        assert!(challenge.is_solved(&harness.ctx()));
        assert_eq!(challenge.solved(), 5_000);
        assert!(challenge.to_xml(None, 2).contains("coverageAtSolved=\"0.5\""));
    }

    #[test]
    fn follows_a_line_that_moved() {
        let mut harness = Harness::new(vec![source_file("src/Calc.java", 0.5, "alice", 3)]);
        let mut challenge = challenge_for(&harness, 3);
        let moved = harness.files[0].lines.remove(2);
        harness.files[0].lines.push(CoverageLine {
            number: 40,
            status: LineStatus::Covered,
            ..moved
        });
        assert!(challenge.is_solved(&harness.ctx()));
    }

    #[test]
    fn partial_coverage_needs_more_branches() {
        let mut file = source_file("src/Branchy.java", 0.3, "alice", 0);
        let mut branchy = line(9, "if (a && b) {", LineStatus::Partial);
        branchy.covered_branches = 1;
        branchy.total_branches = 4;
        file.lines.push(branchy);
        let mut harness = Harness::new(vec![file]);
        let mut challenge = challenge_for(&harness, 9);
        assert_eq!(challenge.score(), 3);
        assert!(!challenge.is_solved(&harness.ctx()));

        harness.files[0].lines.last_mut().expect("line").covered_branches = 2;
        assert!(challenge.is_solved(&harness.ctx()));
    }

    #[test]
    fn unsolvable_once_the_line_disappears() {
        let mut harness = Harness::new(vec![source_file("src/Calc.java", 0.5, "alice", 3)]);
        let challenge = challenge_for(&harness, 2);
        assert!(challenge.is_solvable(&harness.ctx()));
        harness.files[0].lines.remove(1);
        assert!(!challenge.is_solvable(&harness.ctx()));
    }

    #[test]
    fn identity_ignores_timestamps() {
        let harness = Harness::new(vec![source_file("src/Calc.java", 0.5, "alice", 3)]);
        let first = challenge_for(&harness, 2);
        let file = &harness.files[0];
        let second = LineCoverageChallenge::new(file, file.line(2).expect("line"), "main", 99);
        assert_eq!(first.key(), second.key());
        assert_ne!(first.key(), challenge_for(&harness, 3).key());
    }
}
