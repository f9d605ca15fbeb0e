//! In-memory attempt store.
//!
//! `Attempt` owns one user's answers for one test: an `AnswerRecord` per
//! question, the current position, the remaining time and the lifecycle
//! phase. Every status change goes through `QuestionStatus::on`; this type
//! only decides which question an event applies to and whether the phase
//! allows it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AnswerRecord, OptionKey, QuestionStatus, TestDefinition};
use crate::error::AttemptError;
use crate::navigation::{Position, QuestionOrder};
use crate::status::StatusEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  /// Created; instructions on screen, clock stopped.
  Instructions,
  /// Clock running, answers editable.
  Active,
  /// Clock hit zero; waiting for (or retrying) submission.
  TimeUp,
  /// Frozen into a report.
  Submitted,
}

/// User actions on a running attempt.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttemptEvent {
  Select { option: OptionKey },
  Navigate { index: usize },
  NavigateSection {
    section: usize,
    #[serde(rename = "indexInSection")]
    index_in_section: usize,
  },
  Next,
  Previous,
  ToggleMark,
  Clear,
}

/// Result of one clock tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
  /// Clock is not running (instructions, time up or submitted).
  Idle,
  Running { time_left_secs: u64 },
  /// This tick took the clock to zero.
  Expired,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
  pub not_visited: usize,
  pub unanswered: usize,
  pub answered: usize,
  pub marked_for_review: usize,
  pub answered_and_marked: usize,
}

#[derive(Clone, Debug)]
pub struct Attempt {
  order: QuestionOrder,
  test_id: String,
  user_id: String,
  started_at: DateTime<Utc>,
  time_left_secs: u64,
  position: usize,
  answers: HashMap<String, AnswerRecord>,
  phase: Phase,
}

impl Attempt {
  /// Fresh attempt: every question `NotVisited`, clock full and stopped.
  pub fn new(test: &TestDefinition, user_id: &str, now: DateTime<Utc>) -> Result<Self, AttemptError> {
    let order = QuestionOrder::from_test(test);
    if order.is_empty() {
      return Err(AttemptError::EmptyTest(test.id.clone()));
    }
    let answers = order
      .ids()
      .iter()
      .map(|id| (id.clone(), AnswerRecord::default()))
      .collect();
    Ok(Self {
      order,
      test_id: test.id.clone(),
      user_id: user_id.to_string(),
      started_at: now,
      time_left_secs: test.duration_secs,
      position: 0,
      answers,
      phase: Phase::Instructions,
    })
  }

  /// Rebuild a running attempt from persisted parts. Callers validate the
  /// parts first; answers missing from `answers` default to `NotVisited`.
  pub(crate) fn resume(
    test: &TestDefinition,
    user_id: &str,
    started_at: DateTime<Utc>,
    time_left_secs: u64,
    position: usize,
    mut answers: HashMap<String, AnswerRecord>,
  ) -> Result<Self, AttemptError> {
    let order = QuestionOrder::from_test(test);
    if order.is_empty() {
      return Err(AttemptError::EmptyTest(test.id.clone()));
    }
    if position >= order.len() {
      return Err(AttemptError::OutOfRange(position));
    }
    for id in order.ids() {
      answers.entry(id.clone()).or_default();
    }
    answers.retain(|id, _| order.contains(id));

    let mut attempt = Self {
      order,
      test_id: test.id.clone(),
      user_id: user_id.to_string(),
      started_at,
      time_left_secs,
      position,
      answers,
      phase: Phase::Active,
    };
    attempt.visit(position);
    Ok(attempt)
  }

  pub fn test_id(&self) -> &str { &self.test_id }
  pub fn user_id(&self) -> &str { &self.user_id }
  pub fn started_at(&self) -> DateTime<Utc> { self.started_at }
  pub fn time_left_secs(&self) -> u64 { self.time_left_secs }
  pub fn position(&self) -> usize { self.position }
  pub fn phase(&self) -> Phase { self.phase }
  pub fn order(&self) -> &QuestionOrder { &self.order }

  pub fn current_position(&self) -> Position {
    // position < len is an invariant of every constructor and move
    self.order.locate(self.position).unwrap_or(Position { section: 0, index_in_section: 0 })
  }

  pub fn current_question_id(&self) -> &str {
    self.order.question_id(self.position).unwrap_or_default()
  }

  pub fn record(&self, question_id: &str) -> Option<&AnswerRecord> {
    self.answers.get(question_id)
  }

  pub fn answers(&self) -> &HashMap<String, AnswerRecord> {
    &self.answers
  }

  /// Records in question order.
  pub fn ordered_records(&self) -> impl Iterator<Item = (&str, &AnswerRecord)> {
    self.order.ids().iter().filter_map(move |id| self.answers.get(id).map(|r| (id.as_str(), r)))
  }

  /// Accept the instructions: start the clock and visit the first question.
  pub fn begin(&mut self) -> Result<(), AttemptError> {
    self.begin_at(Utc::now())
  }

  /// `begin` with an explicit start time. The report's elapsed time counts
  /// from here, not from creation.
  pub fn begin_at(&mut self, now: DateTime<Utc>) -> Result<(), AttemptError> {
    match self.phase {
      Phase::Instructions => {
        self.phase = Phase::Active;
        self.started_at = now;
        self.visit(self.position);
        Ok(())
      }
      Phase::Active => Ok(()),
      Phase::TimeUp => Err(AttemptError::TimeUp),
      Phase::Submitted => Err(AttemptError::AlreadySubmitted),
    }
  }

  pub fn apply(&mut self, event: &AttemptEvent) -> Result<(), AttemptError> {
    self.ensure_active()?;
    match *event {
      AttemptEvent::Select { option } => {
        let record = self.current_record_mut();
        record.selected = Some(option);
        record.status = record.status.on(StatusEvent::Select);
      }
      AttemptEvent::ToggleMark => {
        let record = self.current_record_mut();
        record.status = record.status.on(StatusEvent::ToggleMark);
      }
      AttemptEvent::Clear => {
        let record = self.current_record_mut();
        record.selected = None;
        record.status = record.status.on(StatusEvent::Clear);
      }
      AttemptEvent::Navigate { index } => self.move_to(index)?,
      AttemptEvent::NavigateSection { section, index_in_section } => {
        let target = self
          .order
          .global_index(section, index_in_section)
          .ok_or(AttemptError::SectionOutOfRange { section, index: index_in_section })?;
        self.move_to(target)?;
      }
      AttemptEvent::Next => self.move_to(self.position + 1)?,
      AttemptEvent::Previous => {
        let target = self.position.checked_sub(1).ok_or(AttemptError::OutOfRange(0))?;
        self.move_to(target)?;
      }
    }
    Ok(())
  }

  /// One second of the clock. Time is charged to the question on screen.
  pub fn tick(&mut self) -> Tick {
    if self.phase != Phase::Active {
      return Tick::Idle;
    }
    if self.time_left_secs > 0 {
      self.time_left_secs -= 1;
      self.current_record_mut().time_spent_secs += 1;
    }
    if self.time_left_secs == 0 {
      self.phase = Phase::TimeUp;
      Tick::Expired
    } else {
      Tick::Running { time_left_secs: self.time_left_secs }
    }
  }

  pub fn mark_submitted(&mut self) {
    self.phase = Phase::Submitted;
  }

  pub fn status_counts(&self) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for record in self.answers.values() {
      match record.status {
        QuestionStatus::NotVisited => counts.not_visited += 1,
        QuestionStatus::Unanswered => counts.unanswered += 1,
        QuestionStatus::Answered => counts.answered += 1,
        QuestionStatus::MarkedForReview => counts.marked_for_review += 1,
        QuestionStatus::AnsweredAndMarked => counts.answered_and_marked += 1,
      }
    }
    counts
  }

  fn ensure_active(&self) -> Result<(), AttemptError> {
    match self.phase {
      Phase::Active => Ok(()),
      Phase::Instructions => Err(AttemptError::NotStarted),
      Phase::TimeUp => Err(AttemptError::TimeUp),
      Phase::Submitted => Err(AttemptError::AlreadySubmitted),
    }
  }

  fn move_to(&mut self, target: usize) -> Result<(), AttemptError> {
    if target >= self.order.len() {
      return Err(AttemptError::OutOfRange(target));
    }
    // Leaving a question that was never touched still counts as a visit.
    self.visit(self.position);
    self.visit(target);
    self.position = target;
    Ok(())
  }

  fn visit(&mut self, global: usize) {
    if let Some(id) = self.order.question_id(global) {
      if let Some(record) = self.answers.get_mut(id) {
        record.status = record.status.on(StatusEvent::Visit);
      }
    }
  }

  fn current_record_mut(&mut self) -> &mut AnswerRecord {
    let id = self.order.ids()[self.position].clone();
    self.answers.entry(id).or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::seeds::seed_tests;

  fn quick() -> TestDefinition {
    seed_tests().into_iter().find(|t| t.id == "demo-quick").unwrap()
  }

  fn started() -> Attempt {
    let mut a = Attempt::new(&quick(), "U1", Utc::now()).unwrap();
    a.begin().unwrap();
    a
  }

  fn status_of(a: &Attempt, id: &str) -> QuestionStatus {
    a.record(id).unwrap().status
  }

  #[test]
  fn begin_visits_only_the_first_question() {
    let mut a = Attempt::new(&quick(), "U1", Utc::now()).unwrap();
    assert!(a.answers().values().all(|r| r.status == QuestionStatus::NotVisited));
    a.begin().unwrap();
    assert_eq!(status_of(&a, "q1"), QuestionStatus::Unanswered);
    for id in ["q2", "q3", "q4", "q5"] {
      assert_eq!(status_of(&a, id), QuestionStatus::NotVisited);
    }
  }

  #[test]
  fn started_at_is_taken_when_instructions_are_accepted() {
    let created = Utc::now();
    let accepted = created + chrono::Duration::seconds(90);
    let mut a = Attempt::new(&quick(), "U1", created).unwrap();
    a.begin_at(accepted).unwrap();
    assert_eq!(a.started_at(), accepted);
    // A second begin does not move it.
    a.begin_at(accepted + chrono::Duration::seconds(5)).unwrap();
    assert_eq!(a.started_at(), accepted);
  }

  #[test]
  fn events_before_begin_are_rejected() {
    let mut a = Attempt::new(&quick(), "U1", Utc::now()).unwrap();
    assert_eq!(a.apply(&AttemptEvent::Next), Err(AttemptError::NotStarted));
    assert_eq!(a.tick(), Tick::Idle);
  }

  #[test]
  fn answer_then_mark_then_clear_on_question_three() {
    let mut a = started();
    a.apply(&AttemptEvent::Navigate { index: 2 }).unwrap();
    a.apply(&AttemptEvent::Select { option: OptionKey::B }).unwrap();
    assert_eq!(status_of(&a, "q3"), QuestionStatus::Answered);
    a.apply(&AttemptEvent::ToggleMark).unwrap();
    assert_eq!(status_of(&a, "q3"), QuestionStatus::AnsweredAndMarked);
    a.apply(&AttemptEvent::Clear).unwrap();
    let r = a.record("q3").unwrap();
    assert_eq!(r.status, QuestionStatus::MarkedForReview);
    assert_eq!(r.selected, None);
  }

  #[test]
  fn navigation_never_leaves_visited_questions_not_visited() {
    let mut a = started();
    a.apply(&AttemptEvent::Navigate { index: 3 }).unwrap();
    assert_eq!(status_of(&a, "q1"), QuestionStatus::Unanswered);
    assert_eq!(status_of(&a, "q4"), QuestionStatus::Unanswered);
    assert_eq!(status_of(&a, "q2"), QuestionStatus::NotVisited);
    a.apply(&AttemptEvent::Previous).unwrap();
    assert_eq!(a.position(), 2);
    assert_eq!(status_of(&a, "q3"), QuestionStatus::Unanswered);
  }

  #[test]
  fn navigation_keeps_answers() {
    let mut a = started();
    a.apply(&AttemptEvent::Select { option: OptionKey::A }).unwrap();
    a.apply(&AttemptEvent::Next).unwrap();
    a.apply(&AttemptEvent::Previous).unwrap();
    assert_eq!(status_of(&a, "q1"), QuestionStatus::Answered);
    assert_eq!(a.record("q1").unwrap().selected, Some(OptionKey::A));
  }

  #[test]
  fn moves_past_either_end_are_rejected() {
    let mut a = started();
    assert_eq!(a.apply(&AttemptEvent::Previous), Err(AttemptError::OutOfRange(0)));
    assert_eq!(a.apply(&AttemptEvent::Navigate { index: 5 }), Err(AttemptError::OutOfRange(5)));
    assert_eq!(
      a.apply(&AttemptEvent::NavigateSection { section: 0, index_in_section: 7 }),
      Err(AttemptError::SectionOutOfRange { section: 0, index: 7 })
    );
    assert_eq!(a.position(), 0);
  }

  #[test]
  fn clock_charges_current_question_and_floors_at_zero() {
    let mut test = quick();
    test.duration_secs = 3;
    let mut a = Attempt::new(&test, "U1", Utc::now()).unwrap();
    a.begin().unwrap();
    assert_eq!(a.tick(), Tick::Running { time_left_secs: 2 });
    a.apply(&AttemptEvent::Next).unwrap();
    assert_eq!(a.tick(), Tick::Running { time_left_secs: 1 });
    assert_eq!(a.tick(), Tick::Expired);
    assert_eq!(a.time_left_secs(), 0);
    assert_eq!(a.phase(), Phase::TimeUp);
    assert_eq!(a.tick(), Tick::Idle);
    assert_eq!(a.time_left_secs(), 0);
    assert_eq!(a.record("q1").unwrap().time_spent_secs, 1);
    assert_eq!(a.record("q2").unwrap().time_spent_secs, 2);
    assert_eq!(a.apply(&AttemptEvent::Clear), Err(AttemptError::TimeUp));
  }

  #[test]
  fn counts_cover_every_question() {
    let mut a = started();
    a.apply(&AttemptEvent::Select { option: OptionKey::C }).unwrap();
    a.apply(&AttemptEvent::Next).unwrap();
    a.apply(&AttemptEvent::ToggleMark).unwrap();
    let c = a.status_counts();
    assert_eq!(c.answered, 1);
    assert_eq!(c.marked_for_review, 1);
    assert_eq!(c.not_visited, 3);
    assert_eq!(c.unanswered + c.answered_and_marked, 0);
  }

  #[test]
  fn empty_test_is_rejected() {
    let mut test = quick();
    test.sections.clear();
    let err = Attempt::new(&test, "U1", Utc::now()).unwrap_err();
    assert_eq!(err, AttemptError::EmptyTest("demo-quick".into()));
  }
}
