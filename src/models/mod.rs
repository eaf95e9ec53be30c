pub mod answer;
pub mod message;
pub mod quiz;
pub mod session;

pub use answer::{AnswerRecord, AnswerVerdict};
pub use message::{ClientMessage, ServerMessage};
pub use quiz::{CreateQuizRequest, Question, QuestionInput, QuestionPayload};
pub use session::{
    CreateQuizResponse, HostCommandRequest, Participant, ParticipantInfo, SessionSnapshot,
    SessionStatus,
};
