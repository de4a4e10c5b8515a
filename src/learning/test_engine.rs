//! Multiple-choice test engine.
//!
//! One question is presented at a time; the answer map records the
//! selected option per question index, later selections overwriting
//! earlier ones. Scoring is index-based: a recorded answer is correct
//! iff it equals the question's `correct` option index.

use std::collections::BTreeMap;

use crate::db::models::Question;

/// Final result of a submitted test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestOutcome {
    pub score: u32,
    pub correct: usize,
    pub total: usize,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Answering,
    Submitted,
}

#[derive(Debug)]
pub struct TestEngine {
    questions: Vec<Question>,
    passing_score: u32,
    current: usize,
    answers: BTreeMap<usize, usize>,
    outcome: Option<TestOutcome>,
}

impl TestEngine {
    pub fn new(questions: Vec<Question>, passing_score: u32) -> Self {
        Self {
            questions,
            passing_score,
            current: 0,
            answers: BTreeMap::new(),
            outcome: None,
        }
    }

    pub fn state(&self) -> EngineState {
        if self.outcome.is_some() {
            EngineState::Submitted
        } else {
            EngineState::Answering
        }
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    pub fn is_last_question(&self) -> bool {
        !self.questions.is_empty() && self.current == self.questions.len() - 1
    }

    pub fn answer_for(&self, index: usize) -> Option<usize> {
        self.answers.get(&index).copied()
    }

    pub fn answers(&self) -> &BTreeMap<usize, usize> {
        &self.answers
    }

    /// Jump the question pointer, clamped to the question sequence.
    pub fn seek(&mut self, index: usize) {
        if self.questions.is_empty() {
            self.current = 0;
        } else {
            self.current = index.min(self.questions.len() - 1);
        }
    }

    /// Record the selected option for the current question. Rejects
    /// out-of-bounds options.
    pub fn select(&mut self, option: usize) -> bool {
        let Some(question) = self.questions.get(self.current) else {
            return false;
        };
        if option >= question.options.len() {
            return false;
        }
        self.answers.insert(self.current, option);
        true
    }

    /// Restore a previously recorded answer map (for flows that thread
    /// answers through the client). Invalid entries are dropped.
    pub fn restore_answers(&mut self, answers: &BTreeMap<usize, usize>) {
        for (&q, &a) in answers {
            if let Some(question) = self.questions.get(q) {
                if a < question.options.len() {
                    self.answers.insert(q, a);
                }
            }
        }
    }

    /// Whether the current question has a recorded answer — the gate
    /// for Next/Submit.
    pub fn current_answered(&self) -> bool {
        self.answers.contains_key(&self.current)
    }

    /// Move forward. Refused until the current question is answered or
    /// when already on the last question.
    pub fn next(&mut self) -> bool {
        if !self.current_answered() || self.is_last_question() {
            return false;
        }
        self.current += 1;
        true
    }

    /// Move backward. Always permitted; never mutates answers.
    pub fn prev(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    /// Submit the test. Refused while the current question is
    /// unanswered; terminal once it succeeds.
    pub fn submit(&mut self) -> Option<TestOutcome> {
        if self.outcome.is_some() {
            return self.outcome;
        }
        if !self.questions.is_empty() && !self.current_answered() {
            return None;
        }
        let outcome = score_answers(&self.questions, &self.answers, self.passing_score);
        self.outcome = Some(outcome);
        self.outcome
    }

    pub fn outcome(&self) -> Option<TestOutcome> {
        self.outcome
    }
}

/// score = round(100 × correct / total); defined as 0 for an empty
/// question list.
pub fn score_answers(
    questions: &[Question],
    answers: &BTreeMap<usize, usize>,
    passing_score: u32,
) -> TestOutcome {
    let total = questions.len();
    let correct = questions
        .iter()
        .enumerate()
        .filter(|(i, q)| answers.get(i) == Some(&q.correct))
        .count();

    let score = if total == 0 {
        0
    } else {
        ((100.0 * correct as f64) / total as f64).round() as u32
    };

    TestOutcome {
        score,
        correct,
        total,
        passed: score >= passing_score,
    }
}

/// Encode an answer map as `q:a` pairs joined with commas, for
/// threading through form submissions.
pub fn encode_answers(answers: &BTreeMap<usize, usize>) -> String {
    answers
        .iter()
        .map(|(q, a)| format!("{}:{}", q, a))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse the wire form produced by [`encode_answers`]. Malformed
/// entries are skipped.
pub fn parse_answers(raw: &str) -> BTreeMap<usize, usize> {
    raw.split(',')
        .filter_map(|pair| {
            let (q, a) = pair.split_once(':')?;
            Some((q.trim().parse().ok()?, a.trim().parse().ok()?))
        })
        .collect()
}
