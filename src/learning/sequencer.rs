//! Module sequencing: which module is current, which are unlocked,
//! and when advancing past a module is permitted.

use crate::db::models::{Module, ProgressRecord, Test};

pub struct ModuleSequencer<'a> {
    modules: &'a [Module],
    tests: &'a [Test],
    progress: &'a [ProgressRecord],
}

impl<'a> ModuleSequencer<'a> {
    /// `modules` must already be ordered by `order_index`.
    pub fn new(modules: &'a [Module], tests: &'a [Test], progress: &'a [ProgressRecord]) -> Self {
        Self {
            modules,
            tests,
            progress,
        }
    }

    pub fn test_for(&self, module_id: &str) -> Option<&Test> {
        self.tests.iter().find(|t| t.module_id == module_id)
    }

    fn record_for(&self, module_id: &str) -> Option<&ProgressRecord> {
        self.progress.iter().find(|p| p.module_id == module_id)
    }

    /// True iff a progress record exists with a non-null completion
    /// timestamp.
    pub fn is_completed(&self, module_id: &str) -> bool {
        self.record_for(module_id)
            .map(|p| p.completed_at.is_some())
            .unwrap_or(false)
    }

    pub fn test_score(&self, module_id: &str) -> Option<i64> {
        self.record_for(module_id).and_then(|p| p.test_score)
    }

    /// A module is passed when it is complete and, if it has a test,
    /// the recorded score meets the passing threshold.
    pub fn module_passed(&self, index: usize) -> bool {
        let Some(module) = self.modules.get(index) else {
            return false;
        };
        if !self.is_completed(&module.id) {
            return false;
        }
        match self.test_for(&module.id) {
            Some(test) => self
                .test_score(&module.id)
                .map(|score| score >= test.passing_score)
                .unwrap_or(false),
            None => true,
        }
    }

    /// A module is unlocked iff every predecessor is passed. The first
    /// module is always unlocked.
    pub fn is_unlocked(&self, index: usize) -> bool {
        index < self.modules.len() && (0..index).all(|i| self.module_passed(i))
    }

    /// Advancing to the next module is only permitted once the current
    /// one is passed.
    pub fn can_advance_from(&self, index: usize) -> bool {
        self.module_passed(index) && index + 1 < self.modules.len()
    }

    /// The learner's current position: the first module not yet
    /// passed, or the last module once the course is finished.
    pub fn current_index(&self) -> usize {
        if self.modules.is_empty() {
            return 0;
        }
        (0..self.modules.len())
            .find(|&i| !self.module_passed(i))
            .unwrap_or(self.modules.len() - 1)
    }

    pub fn completed_count(&self) -> usize {
        self.modules
            .iter()
            .filter(|m| self.is_completed(&m.id))
            .count()
    }

    /// Aggregate percentage-complete: round(100 × completed / total),
    /// 0 for an empty course.
    pub fn percent_complete(&self) -> u32 {
        if self.modules.is_empty() {
            return 0;
        }
        ((100.0 * self.completed_count() as f64) / self.modules.len() as f64).round() as u32
    }

    /// All modules complete and all tests passed.
    pub fn course_complete(&self) -> bool {
        !self.modules.is_empty() && (0..self.modules.len()).all(|i| self.module_passed(i))
    }
}
