//! Local scoring: turns a submission into a `TestReport`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{OptionKey, QuestionStatus, TestDefinition};
use crate::submission::Submission;

const GENERAL_SUBJECT: &str = "General";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  Correct,
  Incorrect,
  Unattempted,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
  pub question_id: String,
  pub subject: Option<String>,
  pub selected: Option<OptionKey>,
  pub correct: OptionKey,
  pub final_status: QuestionStatus,
  pub outcome: Outcome,
  pub marks_awarded: f32,
  pub time_spent_secs: u64,
  pub explanation: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
  pub score: f32,
  pub max_score: f32,
  pub correct: usize,
  pub incorrect: usize,
  pub unattempted: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
  pub report_id: String,
  pub attempt_id: String,
  pub user_id: String,
  pub test_id: String,
  pub test_title: String,
  pub started_at: DateTime<Utc>,
  pub ended_at: DateTime<Utc>,
  pub elapsed_secs: i64,
  pub score: f32,
  pub max_score: f32,
  pub correct: usize,
  pub incorrect: usize,
  pub unattempted: usize,
  /// Correct answers over attempted answers, 0.0 when nothing was attempted.
  pub accuracy: f32,
  pub by_subject: BTreeMap<String, SubjectSummary>,
  pub outcomes: Vec<QuestionOutcome>,
}

/// Score `submission` against `test`. Answers for questions the test does not
/// know are ignored; questions missing from the submission count as
/// unattempted.
pub fn score_submission(test: &TestDefinition, submission: &Submission, report_id: String) -> TestReport {
  let mut outcomes = Vec::with_capacity(test.question_count());
  let mut by_subject: BTreeMap<String, SubjectSummary> = BTreeMap::new();
  let (mut score, mut correct, mut incorrect, mut unattempted) = (0.0f32, 0usize, 0usize, 0usize);

  for q in test.questions() {
    let submitted = submission.answers.iter().find(|a| a.question_id == q.id);
    let selected = submitted.and_then(|a| a.selected);
    let (outcome, marks) = match selected {
      None => (Outcome::Unattempted, 0.0),
      Some(k) if k == q.answer => (Outcome::Correct, q.marks),
      Some(_) => (Outcome::Incorrect, -q.negative_marks),
    };

    let subject = by_subject
      .entry(q.subject.clone().unwrap_or_else(|| GENERAL_SUBJECT.to_string()))
      .or_default();
    subject.max_score += q.marks;
    subject.score += marks;
    match outcome {
      Outcome::Correct => { correct += 1; subject.correct += 1; }
      Outcome::Incorrect => { incorrect += 1; subject.incorrect += 1; }
      Outcome::Unattempted => { unattempted += 1; subject.unattempted += 1; }
    }
    score += marks;

    outcomes.push(QuestionOutcome {
      question_id: q.id.clone(),
      subject: q.subject.clone(),
      selected,
      correct: q.answer,
      final_status: submitted.map(|a| a.status).unwrap_or(QuestionStatus::NotVisited),
      outcome,
      marks_awarded: marks,
      time_spent_secs: submitted.map(|a| a.time_spent_secs).unwrap_or(0),
      explanation: q.explanation.clone(),
    });
  }

  let attempted = correct + incorrect;
  let accuracy = if attempted == 0 { 0.0 } else { correct as f32 / attempted as f32 };

  TestReport {
    report_id,
    attempt_id: submission.attempt_id.clone(),
    user_id: submission.user_id.clone(),
    test_id: test.id.clone(),
    test_title: test.title.clone(),
    started_at: submission.started_at,
    ended_at: submission.ended_at,
    elapsed_secs: (submission.ended_at - submission.started_at).num_seconds().max(0),
    score,
    max_score: test.max_marks(),
    correct,
    incorrect,
    unattempted,
    accuracy,
    by_subject,
    outcomes,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::seeds::seed_tests;
  use crate::submission::SubmittedAnswer;

  fn answer(id: &str, selected: Option<OptionKey>) -> SubmittedAnswer {
    SubmittedAnswer {
      question_id: id.into(),
      selected,
      status: if selected.is_some() { QuestionStatus::Answered } else { QuestionStatus::Unanswered },
      time_spent_secs: 7,
    }
  }

  #[test]
  fn marks_with_negative_marking_and_subject_breakdown() {
    let test = seed_tests().into_iter().find(|t| t.id == "demo-jee").unwrap();
    let started_at = Utc::now();
    let submission = Submission {
      attempt_id: "a1".into(),
      user_id: "U1".into(),
      test_id: test.id.clone(),
      started_at,
      ended_at: started_at + chrono::Duration::seconds(95),
      answers: vec![
        answer("phy-1", Some(OptionKey::B)),  // correct
        answer("phy-2", Some(OptionKey::A)),  // wrong
        answer("chem-1", Some(OptionKey::B)), // correct
        answer("math-1", None),
      ],
    };

    let report = score_submission(&test, &submission, "r1".into());
    assert_eq!(report.correct, 2);
    assert_eq!(report.incorrect, 1);
    assert_eq!(report.unattempted, 5);
    assert_eq!(report.score, 4.0 + 4.0 - 1.0);
    assert_eq!(report.max_score, 32.0);
    assert_eq!(report.elapsed_secs, 95);
    assert!((report.accuracy - 2.0 / 3.0).abs() < 1e-6);

    let physics = &report.by_subject["Physics"];
    assert_eq!(physics.score, 3.0);
    assert_eq!(physics.max_score, 12.0);
    assert_eq!(report.outcomes.len(), 8);
    assert_eq!(report.outcomes[1].outcome, Outcome::Incorrect);
    assert_eq!(report.outcomes[7].final_status, QuestionStatus::NotVisited);
  }

  #[test]
  fn nothing_attempted_scores_zero() {
    let test = seed_tests().into_iter().find(|t| t.id == "demo-quick").unwrap();
    let now = Utc::now();
    let submission = Submission {
      attempt_id: "a1".into(),
      user_id: "U1".into(),
      test_id: test.id.clone(),
      started_at: now,
      ended_at: now,
      answers: Vec::new(),
    };
    let report = score_submission(&test, &submission, "r".into());
    assert_eq!(report.score, 0.0);
    assert_eq!(report.accuracy, 0.0);
    assert_eq!(report.unattempted, 5);
  }
}
