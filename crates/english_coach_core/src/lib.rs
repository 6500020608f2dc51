pub mod domain;
pub mod interview;
pub mod ports;
pub mod quota;
pub mod recovery;

pub use domain::{
    DailyWord, DebateSession, Difficulty, Flashcard, InterviewSession, InterviewSummary, Mistake,
    MistakeInput, MistakeStats, NewUser, Role, RoleplaySession, SentenceHistory, TutorSession,
    Turn, Usage, User,
};
pub use interview::{InterviewProgress, InterviewType, Mood, Phase};
pub use ports::{
    ContentGenerationService, DatabaseService, ExternalIdentityService, ExternalProfile,
    GenerationError, GenerationResult, PortError, PortResult,
};
pub use recovery::{recover, RecoveryError, Shape};
