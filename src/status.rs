//! Question status transitions.
//!
//! Pure functions only: the attempt store calls these and never edits a
//! status directly. Edges:
//!
//! | event        | from                                  | to                  |
//! |--------------|---------------------------------------|---------------------|
//! | Visit        | NotVisited                            | Unanswered          |
//! | Select       | NotVisited, Unanswered, Answered      | Answered            |
//! | Select       | MarkedForReview, AnsweredAndMarked    | AnsweredAndMarked   |
//! | ToggleMark   | Answered                              | AnsweredAndMarked   |
//! | ToggleMark   | AnsweredAndMarked                     | Answered            |
//! | ToggleMark   | MarkedForReview                       | Unanswered          |
//! | ToggleMark   | NotVisited, Unanswered                | MarkedForReview     |
//! | Clear        | AnsweredAndMarked                     | MarkedForReview     |
//! | Clear        | anything else                         | Unanswered          |

use crate::domain::QuestionStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusEvent {
    Visit,
    Select,
    ToggleMark,
    Clear,
}

impl QuestionStatus {
    pub const ALL: [QuestionStatus; 5] = [
        QuestionStatus::NotVisited,
        QuestionStatus::Unanswered,
        QuestionStatus::Answered,
        QuestionStatus::MarkedForReview,
        QuestionStatus::AnsweredAndMarked,
    ];

    pub fn on(self, event: StatusEvent) -> QuestionStatus {
        use QuestionStatus::*;
        match event {
            StatusEvent::Visit => match self {
                NotVisited => Unanswered,
                other => other,
            },
            StatusEvent::Select => match self {
                NotVisited | Unanswered | Answered => Answered,
                MarkedForReview | AnsweredAndMarked => AnsweredAndMarked,
            },
            StatusEvent::ToggleMark => match self {
                Answered => AnsweredAndMarked,
                AnsweredAndMarked => Answered,
                MarkedForReview => Unanswered,
                NotVisited | Unanswered => MarkedForReview,
            },
            StatusEvent::Clear => match self {
                AnsweredAndMarked => MarkedForReview,
                _ => Unanswered,
            },
        }
    }

    pub fn has_answer(self) -> bool {
        matches!(self, QuestionStatus::Answered | QuestionStatus::AnsweredAndMarked)
    }

    pub fn is_marked(self) -> bool {
        matches!(self, QuestionStatus::MarkedForReview | QuestionStatus::AnsweredAndMarked)
    }
}
