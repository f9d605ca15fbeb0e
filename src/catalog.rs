//! Test catalog: config bank tests plus built-in seeds, indexed by id.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::{QuestionCfg, TestCfg};
use crate::domain::{OptionKey, Question, Section, TestDefinition};
use crate::seeds::seed_tests;

#[derive(Debug, Default)]
pub struct TestCatalog {
  by_id: HashMap<String, Arc<TestDefinition>>,
  order: Vec<String>,
}

impl TestCatalog {
  /// First occurrence of an id wins.
  pub fn from_tests(tests: Vec<TestDefinition>) -> Self {
    let mut catalog = Self::default();
    for t in tests {
      catalog.insert(t);
    }
    catalog
  }

  /// Config bank first, then seeds that do not clash with it.
  pub fn build(bank: &[TestCfg]) -> Self {
    let mut tests: Vec<TestDefinition> = bank.iter().map(test_from_cfg).collect();
    tests.extend(seed_tests());
    let catalog = Self::from_tests(tests);
    for t in catalog.list() {
      info!(target: "testprep_backend", test_id = %t.id, questions = t.question_count(), duration_secs = t.duration_secs, "Catalog test loaded");
    }
    catalog
  }

  fn insert(&mut self, mut t: TestDefinition) {
    drop_duplicate_questions(&mut t);
    if self.by_id.contains_key(&t.id) {
      warn!(target: "testprep_backend", test_id = %t.id, "Duplicate test id; keeping the first definition");
      return;
    }
    if t.question_count() == 0 {
      warn!(target: "testprep_backend", test_id = %t.id, "Test has no questions; it is listed but cannot be started");
    }
    self.order.push(t.id.clone());
    self.by_id.insert(t.id.clone(), Arc::new(t));
  }

  pub fn get(&self, id: &str) -> Option<Arc<TestDefinition>> {
    self.by_id.get(id).cloned()
  }

  pub fn list(&self) -> impl Iterator<Item = &Arc<TestDefinition>> {
    self.order.iter().filter_map(move |id| self.by_id.get(id))
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }
}

/// Question ids are unique across a test's sections; later repeats are skipped.
fn drop_duplicate_questions(t: &mut TestDefinition) {
  let mut seen = HashSet::new();
  let test_id = t.id.clone();
  for section in t.sections.iter_mut() {
    let name = section.name.clone();
    section.questions.retain(|q| {
      let fresh = seen.insert(q.id.clone());
      if !fresh {
        error!(target: "testprep_backend", %test_id, question_id = %q.id, section = %name, "Skipping question: duplicate id in test.");
      }
      fresh
    });
  }
}

fn test_from_cfg(cfg: &TestCfg) -> TestDefinition {
  let sections = cfg
    .sections
    .iter()
    .map(|s| Section {
      name: s.name.clone(),
      questions: s
        .questions
        .iter()
        .filter_map(|q| question_from_cfg(&cfg.id, q))
        .collect(),
    })
    .collect();

  TestDefinition {
    id: cfg.id.clone(),
    title: cfg.title.clone().unwrap_or_else(|| cfg.id.clone()),
    instructions: cfg.instructions.clone().unwrap_or_default(),
    duration_secs: cfg.duration_secs,
    sections,
  }
}

/// Bank entries need exactly four options and an A-D answer key.
fn question_from_cfg(test_id: &str, q: &QuestionCfg) -> Option<Question> {
  if q.options.len() != OptionKey::ALL.len() {
    error!(target: "testprep_backend", %test_id, question_id = %q.id, options = q.options.len(), "Skipping question: needs exactly four options.");
    return None;
  }
  let Some(answer) = OptionKey::parse(&q.answer) else {
    error!(target: "testprep_backend", %test_id, question_id = %q.id, answer = %q.answer, "Skipping question: answer must be A, B, C or D.");
    return None;
  };
  if q.content.trim().is_empty() && q.image.is_none() {
    error!(target: "testprep_backend", %test_id, question_id = %q.id, "Skipping question: no text or image.");
    return None;
  }
  Some(Question {
    id: q.id.clone(),
    content: q.content.clone(),
    image: q.image.clone(),
    options: q.options.clone(),
    answer,
    marks: q.marks,
    negative_marks: q.negative_marks,
    subject: q.subject.clone(),
    lesson: q.lesson.clone(),
    explanation: q.explanation.clone(),
  })
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::attempt::{Attempt, AttemptEvent};
  use crate::config::AppConfig;
  use crate::domain::QuestionStatus;

  const BANK: &str = r#"
[[tests]]
id = "bank-1"
title = "Bank test"
duration_secs = 600

[[tests.sections]]
name = "Biology"

[[tests.sections.questions]]
id = "bio-1"
content = "Powerhouse of the cell"
options = ["Nucleus", "Mitochondria", "Ribosome", "Golgi"]
answer = "b"
subject = "Biology"

[[tests.sections.questions]]
id = "bio-2"
content = "Only three options"
options = ["x", "y", "z"]
answer = "A"

[[tests]]
id = "empty"
duration_secs = 60

[[tests]]
id = "demo-quick"
title = "Overrides the seed"
duration_secs = 60
"#;

  #[test]
  fn bank_entries_are_validated_and_win_over_seeds() {
    let cfg: AppConfig = toml::from_str(BANK).unwrap();
    let catalog = TestCatalog::build(&cfg.tests);

    let bank = catalog.get("bank-1").unwrap();
    assert_eq!(bank.question_count(), 1);
    assert_eq!(bank.sections[0].questions[0].answer, OptionKey::B);
    assert_eq!(bank.sections[0].questions[0].marks, 1.0);

    assert_eq!(catalog.get("empty").unwrap().question_count(), 0);
    assert_eq!(catalog.get("demo-quick").unwrap().title, "Overrides the seed");
    assert!(catalog.get("demo-jee").is_some());

    let ids: Vec<&str> = catalog.list().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, ["bank-1", "empty", "demo-quick", "demo-jee"]);
  }

  const DUPLICATE_IDS: &str = r#"
[[tests]]
id = "dup"
duration_secs = 60

[[tests.sections]]
name = "One"

[[tests.sections.questions]]
id = "x"
content = "First"
options = ["a", "b", "c", "d"]
answer = "A"

[[tests.sections]]
name = "Two"

[[tests.sections.questions]]
id = "x"
content = "Second, same id"
options = ["a", "b", "c", "d"]
answer = "B"

[[tests.sections.questions]]
id = "y"
content = "Third"
options = ["a", "b", "c", "d"]
answer = "C"
"#;

  #[test]
  fn duplicate_question_ids_keep_only_the_first() {
    let cfg: AppConfig = toml::from_str(DUPLICATE_IDS).unwrap();
    let catalog = TestCatalog::build(&cfg.tests);
    let test = catalog.get("dup").unwrap();

    assert_eq!(test.question_count(), 2);
    assert_eq!(test.sections[0].questions[0].content, "First");
    let second: Vec<&str> = test.sections[1].questions.iter().map(|q| q.id.as_str()).collect();
    assert_eq!(second, ["y"]);

    // One record per question: answering the first leaves the rest alone.
    let mut attempt = Attempt::new(&test, "U1", Utc::now()).unwrap();
    attempt.begin().unwrap();
    attempt.apply(&AttemptEvent::Select { option: OptionKey::A }).unwrap();
    let palette: Vec<QuestionStatus> = attempt.ordered_records().map(|(_, r)| r.status).collect();
    assert_eq!(palette, [QuestionStatus::Answered, QuestionStatus::NotVisited]);
    let counts = attempt.status_counts();
    assert_eq!(counts.answered + counts.not_visited, test.question_count());
  }
}
