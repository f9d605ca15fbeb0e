//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Answer keys never appear in anything sent while an attempt is running.

use serde::{Deserialize, Serialize};

use crate::attempt::{Attempt, AttemptEvent, Phase, StatusCounts};
use crate::domain::{OptionKey, Question, QuestionStatus, TestDefinition};
use crate::navigation::{Position, SectionSpan};
use crate::session::AttemptNotice;
use crate::submission::ReportRef;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    /// Subscribe to tick / expiry / submission notices of an attempt.
    Watch {
        #[serde(rename = "attemptId")]
        attempt_id: String,
    },
    Sync {
        #[serde(rename = "attemptId")]
        attempt_id: String,
    },
    Begin {
        #[serde(rename = "attemptId")]
        attempt_id: String,
    },
    Event {
        #[serde(rename = "attemptId")]
        attempt_id: String,
        event: AttemptEvent,
    },
    Submit {
        #[serde(rename = "attemptId")]
        attempt_id: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Attempt {
        attempt: AttemptView,
    },
    Tick {
        #[serde(rename = "attemptId")]
        attempt_id: String,
        #[serde(rename = "timeLeft")]
        time_left: u64,
    },
    Expired {
        #[serde(rename = "attemptId")]
        attempt_id: String,
    },
    Submitted {
        #[serde(rename = "attemptId")]
        attempt_id: String,
        report: ReportRef,
    },
    SubmitFailed {
        #[serde(rename = "attemptId")]
        attempt_id: String,
        message: String,
    },
    Error {
        message: String,
    },
}

impl ServerWsMessage {
    pub fn from_notice(attempt_id: &str, notice: AttemptNotice) -> Self {
        let attempt_id = attempt_id.to_string();
        match notice {
            AttemptNotice::Tick { time_left_secs } => ServerWsMessage::Tick { attempt_id, time_left: time_left_secs },
            AttemptNotice::Expired => ServerWsMessage::Expired { attempt_id },
            AttemptNotice::Submitted { report } => ServerWsMessage::Submitted { attempt_id, report },
            AttemptNotice::SubmitFailed { message } => ServerWsMessage::SubmitFailed { attempt_id, message },
        }
    }
}

/// Question as shown during an attempt: no answer key, no explanation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOut {
    pub id: String,
    pub content: String,
    pub image: Option<String>,
    pub options: Vec<OptionOut>,
    pub marks: f32,
    pub negative_marks: f32,
    pub subject: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OptionOut {
    pub key: OptionKey,
    pub text: String,
}

pub fn question_out(q: &Question) -> QuestionOut {
    QuestionOut {
        id: q.id.clone(),
        content: q.content.clone(),
        image: q.image.clone(),
        options: OptionKey::ALL
            .iter()
            .filter_map(|&key| q.option_text(key).map(|t| OptionOut { key, text: t.to_string() }))
            .collect(),
        marks: q.marks,
        negative_marks: q.negative_marks,
        subject: q.subject.clone(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentQuestion {
    pub position: Position,
    pub section_name: String,
    pub question: QuestionOut,
    pub selected: Option<OptionKey>,
    pub status: QuestionStatus,
}

/// One palette cell.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaletteEntry {
    pub question_id: String,
    pub status: QuestionStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptView {
    pub attempt_id: String,
    pub test_id: String,
    pub title: String,
    pub instructions: String,
    pub phase: Phase,
    pub resumed: bool,
    pub time_left_secs: u64,
    pub position: usize,
    pub current: CurrentQuestion,
    pub sections: Vec<SectionSpan>,
    pub palette: Vec<PaletteEntry>,
    pub counts: StatusCounts,
    pub report: Option<ReportRef>,
}

impl AttemptView {
    pub fn build(
        attempt_id: &str,
        test: &TestDefinition,
        attempt: &Attempt,
        report: Option<&ReportRef>,
        resumed: bool,
    ) -> Self {
        let position = attempt.current_position();
        let qid = attempt.current_question_id();
        let record = attempt.record(qid).cloned().unwrap_or_default();
        let section_name = attempt
            .order()
            .sections()
            .get(position.section)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        let question = test
            .sections
            .get(position.section)
            .and_then(|s| s.questions.get(position.index_in_section));

        Self {
            attempt_id: attempt_id.to_string(),
            test_id: test.id.clone(),
            title: test.title.clone(),
            instructions: test.instructions.clone(),
            phase: attempt.phase(),
            resumed,
            time_left_secs: attempt.time_left_secs(),
            position: attempt.position(),
            current: CurrentQuestion {
                position,
                section_name,
                question: question.map(question_out).unwrap_or_else(|| QuestionOut {
                    id: qid.to_string(),
                    content: String::new(),
                    image: None,
                    options: Vec::new(),
                    marks: 0.0,
                    negative_marks: 0.0,
                    subject: None,
                }),
                selected: record.selected,
                status: record.status,
            },
            sections: attempt.order().sections().to_vec(),
            palette: attempt
                .ordered_records()
                .map(|(id, r)| PaletteEntry { question_id: id.to_string(), status: r.status })
                .collect(),
            counts: attempt.status_counts(),
            report: report.cloned(),
        }
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSummaryOut {
    pub id: String,
    pub title: String,
    pub duration_secs: u64,
    pub question_count: usize,
    pub sections: Vec<String>,
}

pub fn test_summary(t: &TestDefinition) -> TestSummaryOut {
    TestSummaryOut {
        id: t.id.clone(),
        title: t.title.clone(),
        duration_secs: t.duration_secs,
        question_count: t.question_count(),
        sections: t.sections.iter().map(|s| s.name.clone()).collect(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionOut {
    pub name: String,
    pub questions: Vec<QuestionOut>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOut {
    pub id: String,
    pub title: String,
    pub instructions: String,
    pub duration_secs: u64,
    pub sections: Vec<SectionOut>,
}

pub fn test_out(t: &TestDefinition) -> TestOut {
    TestOut {
        id: t.id.clone(),
        title: t.title.clone(),
        instructions: t.instructions.clone(),
        duration_secs: t.duration_secs,
        sections: t
            .sections
            .iter()
            .map(|s| SectionOut { name: s.name.clone(), questions: s.questions.iter().map(question_out).collect() })
            .collect(),
    }
}

#[derive(Debug, Deserialize)]
pub struct StartAttemptIn {
    #[serde(rename = "testId")]
    pub test_id: String,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "userId", default)]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookIn {
    #[serde(default)]
    pub collection: Option<String>,
    pub test_id: String,
    pub question_id: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
