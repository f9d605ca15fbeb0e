//! Domain models used by the backend: questions, sections, tests, option keys,
//! per-question statuses and answer records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the four option slots every question carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionKey {
  A,
  B,
  C,
  D,
}

impl OptionKey {
  pub const ALL: [OptionKey; 4] = [OptionKey::A, OptionKey::B, OptionKey::C, OptionKey::D];

  /// Position of the option inside `Question::options`.
  pub fn index(self) -> usize {
    match self {
      OptionKey::A => 0,
      OptionKey::B => 1,
      OptionKey::C => 2,
      OptionKey::D => 3,
    }
  }

  /// Lenient parse used for config files ("b", " B ", "B" all work).
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_uppercase().as_str() {
      "A" => Some(OptionKey::A),
      "B" => Some(OptionKey::B),
      "C" => Some(OptionKey::C),
      "D" => Some(OptionKey::D),
      _ => None,
    }
  }
}

impl fmt::Display for OptionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      OptionKey::A => "A",
      OptionKey::B => "B",
      OptionKey::C => "C",
      OptionKey::D => "D",
    };
    f.write_str(s)
  }
}

/// Where a question is in the attempt, as shown on the palette.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
  NotVisited,
  Unanswered,
  Answered,
  MarkedForReview,
  AnsweredAndMarked,
}

impl Default for QuestionStatus {
  fn default() -> Self { QuestionStatus::NotVisited }
}

/// A single multiple-choice question. Read-only during an attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub id: String,
  pub content: String,
  #[serde(default)] pub image: Option<String>,
  /// Always four entries, indexed by `OptionKey::index`.
  pub options: Vec<String>,
  pub answer: OptionKey,
  pub marks: f32,
  #[serde(default)] pub negative_marks: f32,

  #[serde(default)] pub subject: Option<String>,
  #[serde(default)] pub lesson: Option<String>,
  #[serde(default)] pub explanation: Option<String>,
}

impl Question {
  pub fn option_text(&self, key: OptionKey) -> Option<&str> {
    self.options.get(key.index()).map(String::as_str)
  }
}

/// Named block of questions (e.g. one subject of a multi-subject exam).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Section {
  pub name: String,
  pub questions: Vec<Question>,
}

/// A fully authored test as delivered by the catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestDefinition {
  pub id: String,
  pub title: String,
  #[serde(default)] pub instructions: String,
  pub duration_secs: u64,
  pub sections: Vec<Section>,
}

impl TestDefinition {
  pub fn question_count(&self) -> usize {
    self.sections.iter().map(|s| s.questions.len()).sum()
  }

  pub fn questions(&self) -> impl Iterator<Item = &Question> {
    self.sections.iter().flat_map(|s| s.questions.iter())
  }

  pub fn question(&self, id: &str) -> Option<&Question> {
    self.questions().find(|q| q.id == id)
  }

  pub fn max_marks(&self) -> f32 {
    self.questions().map(|q| q.marks).sum()
  }
}

/// The user's live answer for one question.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
  pub selected: Option<OptionKey>,
  pub status: QuestionStatus,
  #[serde(default)] pub time_spent_secs: u64,
}
