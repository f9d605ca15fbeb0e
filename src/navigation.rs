//! Flattened question order across sections.
//!
//! A global index addresses questions in delivery order; `(section, index)`
//! pairs address them the way the section tabs of the client do.

use std::collections::HashSet;

use serde::Serialize;

use crate::domain::TestDefinition;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub section: usize,
    pub index_in_section: usize,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSpan {
    pub name: String,
    pub start: usize,
    pub len: usize,
}

#[derive(Clone, Debug)]
pub struct QuestionOrder {
    ids: Vec<String>,
    positions: Vec<Position>,
    sections: Vec<SectionSpan>,
}

impl QuestionOrder {
    pub fn from_test(test: &TestDefinition) -> Self {
        let mut ids = Vec::with_capacity(test.question_count());
        let mut positions = Vec::with_capacity(test.question_count());
        let mut sections = Vec::with_capacity(test.sections.len());

        for (s, section) in test.sections.iter().enumerate() {
            sections.push(SectionSpan {
                name: section.name.clone(),
                start: ids.len(),
                len: section.questions.len(),
            });
            for (i, q) in section.questions.iter().enumerate() {
                ids.push(q.id.clone());
                positions.push(Position { section: s, index_in_section: i });
            }
        }

        debug_assert!(
            {
                let mut seen = HashSet::new();
                ids.iter().all(|id| seen.insert(id))
            },
            "question ids must be unique within test {}",
            test.id
        );

        Self { ids, positions, sections }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn sections(&self) -> &[SectionSpan] {
        &self.sections
    }

    pub fn question_id(&self, global: usize) -> Option<&str> {
        self.ids.get(global).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|q| q == id)
    }

    /// Global index -> (section, index within section).
    pub fn locate(&self, global: usize) -> Option<Position> {
        self.positions.get(global).copied()
    }

    /// (section, index within section) -> global index.
    pub fn global_index(&self, section: usize, index_in_section: usize) -> Option<usize> {
        let span = self.sections.get(section)?;
        if index_in_section < span.len {
            Some(span.start + index_in_section)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeds::seed_tests;

    fn order() -> QuestionOrder {
        // demo-jee: Physics (3), Chemistry (3), Mathematics (2)
        let test = seed_tests().into_iter().find(|t| t.id == "demo-jee").unwrap();
        QuestionOrder::from_test(&test)
    }

    #[test]
    fn locate_and_global_index_agree() {
        let order = order();
        for g in 0..order.len() {
            let p = order.locate(g).unwrap();
            assert_eq!(order.global_index(p.section, p.index_in_section), Some(g));
        }
    }

    #[test]
    fn section_boundaries() {
        let order = order();
        assert_eq!(order.len(), 8);
        assert_eq!(order.locate(3), Some(Position { section: 1, index_in_section: 0 }));
        assert_eq!(order.global_index(2, 1), Some(7));
        assert_eq!(order.sections()[1].name, "Chemistry");
    }

    #[test]
    fn out_of_range_resolves_to_nothing() {
        let order = order();
        assert_eq!(order.locate(8), None);
        assert_eq!(order.global_index(0, 3), None);
        assert_eq!(order.global_index(9, 0), None);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "question ids must be unique")]
    fn repeated_question_id_is_refused() {
        let mut test = seed_tests().into_iter().find(|t| t.id == "demo-jee").unwrap();
        let first = test.sections[0].questions[0].clone();
        test.sections[2].questions.push(first);
        QuestionOrder::from_test(&test);
    }
}
