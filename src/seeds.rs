//! Seed data: built-in tests that keep the service usable without a config bank.

use crate::domain::{OptionKey, Question, Section, TestDefinition};

fn q(
  id: &str,
  content: &str,
  options: [&str; 4],
  answer: OptionKey,
  subject: &str,
  explanation: &str,
) -> Question {
  Question {
    id: id.into(),
    content: content.into(),
    image: None,
    options: options.iter().map(|o| o.to_string()).collect(),
    answer,
    marks: 4.0,
    negative_marks: 1.0,
    subject: Some(subject.into()),
    lesson: None,
    explanation: Some(explanation.into()),
  }
}

/// Minimal set of built-in tests.
pub fn seed_tests() -> Vec<TestDefinition> {
  vec![
    TestDefinition {
      id: "demo-jee".into(),
      title: "Demo multi-subject mock".into(),
      instructions: "Each question carries 4 marks; 1 mark is deducted for a wrong answer. \
        Unattempted questions score zero. The test submits itself when the timer runs out."
        .into(),
      duration_secs: 30 * 60,
      sections: vec![
        Section {
          name: "Physics".into(),
          questions: vec![
            q("phy-1", "SI unit of force?", ["Joule", "Newton", "Watt", "Pascal"], OptionKey::B, "Physics",
              "1 N = 1 kg·m/s²."),
            q("phy-2", "Speed of light in vacuum is closest to", ["3×10⁶ m/s", "3×10⁸ m/s", "3×10¹⁰ m/s", "3×10⁵ m/s"],
              OptionKey::B, "Physics", "c ≈ 2.998×10⁸ m/s."),
            q("phy-3", "A body at rest stays at rest unless acted on by a net force. This is", ["Newton's first law", "Newton's second law", "Newton's third law", "Hooke's law"],
              OptionKey::A, "Physics", "Law of inertia."),
          ],
        },
        Section {
          name: "Chemistry".into(),
          questions: vec![
            q("chem-1", "Atomic number of carbon?", ["4", "6", "8", "12"], OptionKey::B, "Chemistry",
              "Carbon has six protons."),
            q("chem-2", "pH of pure water at 25 °C", ["0", "1", "7", "14"], OptionKey::C, "Chemistry",
              "Neutral water has [H⁺] = 10⁻⁷ M."),
            q("chem-3", "Which gas is most abundant in Earth's atmosphere?", ["Oxygen", "Argon", "Carbon dioxide", "Nitrogen"],
              OptionKey::D, "Chemistry", "Nitrogen is about 78% by volume."),
          ],
        },
        Section {
          name: "Mathematics".into(),
          questions: vec![
            q("math-1", "Derivative of x²", ["x", "2x", "x²/2", "2"], OptionKey::B, "Mathematics",
              "d/dx xⁿ = n·xⁿ⁻¹."),
            q("math-2", "log₁₀(1000)", ["2", "3", "10", "100"], OptionKey::B, "Mathematics",
              "10³ = 1000."),
          ],
        },
      ],
    },
    TestDefinition {
      id: "demo-quick".into(),
      title: "Quick five-question practice".into(),
      instructions: "Five questions, five minutes.".into(),
      duration_secs: 5 * 60,
      sections: vec![Section {
        name: "General".into(),
        questions: vec![
          q("q1", "2 + 2 =", ["4", "3", "5", "22"], OptionKey::A, "Mathematics", "Basic addition."),
          q("q2", "Capital of France", ["Berlin", "Paris", "Rome", "Madrid"], OptionKey::B, "General Knowledge",
            "Paris."),
          q("q3", "H₂O is", ["Salt", "Hydrogen", "Water", "Oxygen"], OptionKey::C, "Chemistry", "Two H, one O."),
          q("q4", "Largest planet", ["Mars", "Earth", "Venus", "Jupiter"], OptionKey::D, "General Knowledge",
            "Jupiter."),
          q("q5", "10 / 4 =", ["2", "2.5", "4", "40"], OptionKey::B, "Mathematics", "10 ÷ 4 = 2.5."),
        ],
      }],
    },
  ]
}
