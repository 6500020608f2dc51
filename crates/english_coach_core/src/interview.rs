//! crates/english_coach_core/src/interview.rs
//!
//! The interview conversation state machine.
//!
//! Progress is an explicit value (`InterviewProgress`) advanced by a pure
//! transition function. Callers persist the returned value instead of mutating
//! a live session record, so "compute next state" and "save" cannot interleave.

use serde::{Deserialize, Serialize};

/// Number of answered questions after which the interview moves to closing.
pub const CLOSING_AFTER: u32 = 9;
/// Number of answered questions after which the interview settles in its late phase.
pub const LATE_GAME_AFTER: u32 = 6;
/// Number of answered questions after which the interview leaves the intro.
pub const LEAVE_INTRO_AFTER: u32 = 2;
/// Answers with fewer words than this are treated as too short to evaluate.
pub const MIN_ANSWER_WORDS: usize = 15;

/// Fixed score given to a skipped ("I don't know") answer.
pub const SKIP_SCORE: f64 = 5.0;
/// Fixed score given to an answer that is too short to evaluate.
pub const SHORT_ANSWER_SCORE: f64 = 3.0;

//=========================================================================================
// Enumerations
//=========================================================================================

/// The kind of interview the candidate asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewType {
    #[default]
    General,
    Technical,
    Hr,
    Behavioral,
    Hybrid,
}

/// The phase the interview is currently in. The non-terminal phases double as
/// question categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Intro,
    Technical,
    Behavioral,
    Hr,
    Scenario,
    Closing,
}

/// Interviewer tone, injected into prompts. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Friendly,
    Neutral,
    Strict,
}

impl InterviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewType::General => "general",
            InterviewType::Technical => "technical",
            InterviewType::Hr => "hr",
            InterviewType::Behavioral => "behavioral",
            InterviewType::Hybrid => "hybrid",
        }
    }

    /// The phase entered when leaving the intro.
    pub fn early_phase(&self) -> Phase {
        match self {
            InterviewType::Hr => Phase::Hr,
            InterviewType::Behavioral => Phase::Behavioral,
            InterviewType::Technical | InterviewType::Hybrid | InterviewType::General => {
                Phase::Technical
            }
        }
    }

    /// The phase the interview settles into for the late game.
    pub fn late_phase(&self) -> Phase {
        match self {
            InterviewType::Technical | InterviewType::Hybrid => Phase::Technical,
            InterviewType::Hr => Phase::Hr,
            InterviewType::Behavioral | InterviewType::General => Phase::Behavioral,
        }
    }
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Intro => "intro",
            Phase::Technical => "technical",
            Phase::Behavioral => "behavioral",
            Phase::Hr => "hr",
            Phase::Scenario => "scenario",
            Phase::Closing => "closing",
        }
    }

    fn is_bookend(&self) -> bool {
        matches!(self, Phase::Intro | Phase::Closing)
    }
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Friendly => "friendly",
            Mood::Neutral => "neutral",
            Mood::Strict => "strict",
        }
    }

    /// Derives the interviewer mood from the latest turn score.
    pub fn from_score(score: f64) -> Self {
        if score < 5.0 {
            Mood::Strict
        } else if score >= 8.0 {
            Mood::Friendly
        } else {
            Mood::Neutral
        }
    }
}

//=========================================================================================
// Progress and transitions
//=========================================================================================

/// The mutable part of an interview session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InterviewProgress {
    #[serde(rename = "interviewPhase")]
    pub phase: Phase,
    #[serde(rename = "interviewerMood")]
    pub mood: Mood,
    #[serde(rename = "questionCount")]
    pub question_count: u32,
}

impl InterviewProgress {
    /// The phase the session will be in once the turn currently being answered
    /// is counted. Prompts for that turn are built against this phase.
    pub fn upcoming_phase(&self, interview_type: InterviewType) -> Phase {
        let count = self.question_count + 1;
        if count >= CLOSING_AFTER {
            Phase::Closing
        } else if count >= LATE_GAME_AFTER {
            interview_type.late_phase()
        } else if count >= LEAVE_INTRO_AFTER && self.phase == Phase::Intro {
            interview_type.early_phase()
        } else {
            self.phase
        }
    }

    /// Advances the session by one answered turn with the given score.
    pub fn advance(&self, interview_type: InterviewType, score: f64) -> InterviewProgress {
        InterviewProgress {
            phase: self.upcoming_phase(interview_type),
            mood: Mood::from_score(score),
            question_count: self.question_count + 1,
        }
    }
}

/// Categories the next question may be drawn from.
pub fn question_categories(interview_type: InterviewType, phase: Phase) -> &'static [Phase] {
    if phase.is_bookend() {
        return match phase {
            Phase::Intro => &[Phase::Intro],
            _ => &[Phase::Closing],
        };
    }
    match interview_type {
        InterviewType::Hr => &[Phase::Hr, Phase::Behavioral, Phase::Scenario],
        InterviewType::Hybrid => &[Phase::Technical, Phase::Hr, Phase::Behavioral, Phase::Scenario],
        _ => match phase {
            Phase::Technical => &[Phase::Technical],
            Phase::Behavioral => &[Phase::Behavioral],
            Phase::Hr => &[Phase::Hr],
            Phase::Scenario => &[Phase::Scenario],
            Phase::Intro => &[Phase::Intro],
            Phase::Closing => &[Phase::Closing],
        },
    }
}

/// Whether the next question may be generated from the candidate's resume.
/// Resume questions are about projects and skills, so hr interviews never get them.
pub fn allows_resume_questions(interview_type: InterviewType, phase: Phase) -> bool {
    if interview_type == InterviewType::Hr {
        return false;
    }
    matches!(phase, Phase::Intro | Phase::Technical) || interview_type == InterviewType::Hybrid
}

/// Whether a technical or project question may be asked next.
pub fn permits_technical(interview_type: InterviewType, phase: Phase) -> bool {
    question_categories(interview_type, phase).contains(&Phase::Technical)
        || allows_resume_questions(interview_type, phase)
}

/// The constraint injected into the evaluation prompt for the next question.
pub fn next_question_constraint(interview_type: InterviewType, phase: Phase) -> &'static str {
    match (interview_type, phase) {
        (InterviewType::Hr, _) => {
            "CRITICAL RULE - THIS IS AN HR INTERVIEW. You are FORBIDDEN from asking about code, \
             programming, frameworks, projects (even if the candidate mentions them), technical \
             skills or education details. Ask ONLY HR questions (motivation, strengths, weaknesses, \
             goals, salary, availability) or behavioral/scenario questions (teamwork, conflict, \
             hypothetical situations)."
        }
        (InterviewType::Hybrid, _) => {
            "This is a Hybrid interview. Your nextQuestion can be from ANY category: Technical, HR, \
             Behavioral, or Scenario."
        }
        (_, Phase::Behavioral) => {
            "CRITICAL: This is a Behavioral interview. Your nextQuestion MUST be behavioral: \
             teamwork, conflict resolution, leadership, work style, handling pressure. DO NOT ask \
             technical questions."
        }
        (_, Phase::Technical) => {
            "This is a Technical interview. Your nextQuestion should focus on technical skills, \
             projects, technologies, debugging, architecture."
        }
        (_, Phase::Intro) => {
            "This is the Introduction phase. Keep nextQuestion general and introductory."
        }
        (_, Phase::Closing) => {
            "This is the Closing phase. Your nextQuestion should invite the candidate's own \
             questions or wrap the interview up."
        }
        _ => "",
    }
}

//=========================================================================================
// Answer triage
//=========================================================================================

const SKIP_PHRASES: &[&str] = &[
    "next",
    "skip",
    "pass",
    "don't know",
    "dont know",
    "no idea",
    "cant answer",
    "can't answer",
    "unsure",
    "move on",
    "proceed",
    "idk",
];

/// How an answer is handled before any evaluation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerTriage {
    /// The candidate asked to skip or said they don't know.
    Skip,
    /// Too short to be worth evaluating.
    TooShort,
    /// Goes to the content generator for evaluation.
    Evaluate,
}

/// A fixed evaluation for answers that short-circuit the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct CannedEvaluation {
    pub score: f64,
    pub feedback: &'static str,
    pub next_questions: &'static [&'static str],
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace('\u{2019}', "'")
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether a short answer contains one of the skip phrases as whole words.
///
/// Answers of `MIN_ANSWER_WORDS` or more are never skips, however they phrase it.
pub fn is_skip(answer: &str) -> bool {
    if answer.split_whitespace().count() >= MIN_ANSWER_WORDS {
        return false;
    }
    let answer_words = words(answer);
    SKIP_PHRASES.iter().any(|phrase| {
        let phrase_words: Vec<&str> = phrase.split(' ').collect();
        answer_words
            .windows(phrase_words.len())
            .any(|window| window.iter().zip(&phrase_words).all(|(a, b)| a == b))
    })
}

pub fn triage_answer(answer: &str) -> AnswerTriage {
    if is_skip(answer) {
        AnswerTriage::Skip
    } else if answer.split_whitespace().count() < MIN_ANSWER_WORDS {
        AnswerTriage::TooShort
    } else {
        AnswerTriage::Evaluate
    }
}

const HR_FOLLOW_UPS: &[&str] = &[
    "What motivates you at work?",
    "Why do you want this job?",
    "Where do you see yourself in 5 years?",
    "What are your salary expectations?",
    "When can you start?",
];

const BEHAVIORAL_FOLLOW_UPS: &[&str] = &[
    "How do you handle pressure?",
    "Tell me about a time you worked in a team.",
    "How do you take feedback?",
    "Describe your work style.",
];

const GENERAL_FOLLOW_UPS: &[&str] = &["Let's move on. Tell me about your strengths."];

const ELABORATE_FOLLOW_UPS: &[&str] = &["Can you elaborate on that with a specific example?"];

/// The fixed evaluation for a triaged answer, or `None` when it must be evaluated.
pub fn canned_evaluation(
    triage: AnswerTriage,
    interview_type: InterviewType,
    phase: Phase,
) -> Option<CannedEvaluation> {
    match triage {
        AnswerTriage::Evaluate => None,
        AnswerTriage::TooShort => Some(CannedEvaluation {
            score: SHORT_ANSWER_SCORE,
            feedback: "Your answer is too short. Please explain in more detail.",
            next_questions: ELABORATE_FOLLOW_UPS,
        }),
        AnswerTriage::Skip => {
            let next_questions = if interview_type == InterviewType::Hr || phase == Phase::Hr {
                HR_FOLLOW_UPS
            } else if interview_type == InterviewType::Behavioral || phase == Phase::Behavioral {
                BEHAVIORAL_FOLLOW_UPS
            } else {
                GENERAL_FOLLOW_UPS
            };
            Some(CannedEvaluation {
                score: SKIP_SCORE,
                feedback: "No worries. Let's try a different question.",
                next_questions,
            })
        }
    }
}

//=========================================================================================
// Question bank
//=========================================================================================

/// Curated base questions the generator rephrases.
pub fn question_bank(category: Phase) -> &'static [&'static str] {
    match category {
        Phase::Intro => &[
            "Tell me about yourself.",
            "What is your background?",
            "Can you introduce yourself?",
            "What should I know about you?",
            "Describe your journey so far.",
        ],
        Phase::Technical => &[
            "Which backend or core technologies are you familiar with?",
            "Which SQL concepts are you confident in?",
            "How do you usually debug issues in your code?",
            "Which web technologies are you most confident in?",
            "Can you explain the projects you have worked on?",
            "Describe one project in detail.",
            "Which tech stack are you most comfortable with?",
        ],
        Phase::Behavioral => &[
            "How do you handle conflicts?",
            "Describe a time you showed leadership.",
            "How do you take feedback?",
            "Tell me about a challenge you overcame.",
            "How do you work in teams?",
            "What did you learn from a past failure?",
            "How do you handle pressure?",
            "Describe your work style.",
        ],
        Phase::Scenario => &[
            "What would you do if you are assigned a task you don't know how to complete?",
            "How would you respond if a project fails in production?",
            "What if a client demands an unrealistic deadline?",
            "What would you do if your senior is being unfair?",
        ],
        Phase::Hr => &[
            "Why do you want this job?",
            "Why our company?",
            "Where do you see yourself in 5 years?",
            "What are your strengths?",
            "What are your weaknesses?",
            "Why should we hire you?",
            "What motivates you?",
            "When can you start?",
        ],
        Phase::Closing => &[
            "Do you have any questions for us?",
            "Is there anything you would like to ask or clarify?",
            "Would you like to know more about the role or team?",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(interview_type: InterviewType, turns: u32, score: f64) -> Vec<InterviewProgress> {
        let mut progress = InterviewProgress::default();
        let mut seen = Vec::new();
        for _ in 0..turns {
            progress = progress.advance(interview_type, score);
            seen.push(progress);
        }
        seen
    }

    #[test]
    fn hr_interview_walks_intro_hr_closing() {
        let seen = walk(InterviewType::Hr, 10, 6.0);
        assert_eq!(seen[0].phase, Phase::Intro);
        assert_eq!(seen[1].phase, Phase::Hr);
        assert_eq!(seen[1].question_count, 2);
        assert_eq!(seen[5].phase, Phase::Hr);
        assert_eq!(seen[7].phase, Phase::Hr);
        assert_eq!(seen[8].phase, Phase::Closing);
        assert_eq!(seen[9].phase, Phase::Closing);
    }

    #[test]
    fn hr_interview_never_permits_technical_questions() {
        let mut progress = InterviewProgress::default();
        for _ in 0..12 {
            let phase = progress.upcoming_phase(InterviewType::Hr);
            assert!(!permits_technical(InterviewType::Hr, phase), "phase {:?}", phase);
            assert!(!permits_technical(InterviewType::Hr, progress.phase));
            progress = progress.advance(InterviewType::Hr, 7.0);
        }
    }

    #[test]
    fn general_interview_moves_to_behavioral_late() {
        let seen = walk(InterviewType::General, 6, 6.0);
        assert_eq!(seen[1].phase, Phase::Technical);
        assert_eq!(seen[5].phase, Phase::Behavioral);
    }

    #[test]
    fn intro_is_only_left_from_intro() {
        let progress = InterviewProgress {
            phase: Phase::Behavioral,
            mood: Mood::Neutral,
            question_count: 2,
        };
        let next = progress.advance(InterviewType::Technical, 6.0);
        assert_eq!(next.phase, Phase::Behavioral);
    }

    #[test]
    fn mood_follows_latest_score() {
        assert_eq!(Mood::from_score(4.9), Mood::Strict);
        assert_eq!(Mood::from_score(5.0), Mood::Neutral);
        assert_eq!(Mood::from_score(7.5), Mood::Neutral);
        assert_eq!(Mood::from_score(8.0), Mood::Friendly);
    }

    #[test]
    fn hybrid_draws_from_every_category_outside_bookends() {
        let categories = question_categories(InterviewType::Hybrid, Phase::Technical);
        assert_eq!(categories.len(), 4);
        assert_eq!(question_categories(InterviewType::Hybrid, Phase::Intro), &[Phase::Intro]);
    }

    #[test]
    fn skip_phrases_match_whole_words_only() {
        assert!(is_skip("I don't know"));
        assert!(is_skip("I don\u{2019}t know, sorry"));
        assert!(is_skip("Skip"));
        assert!(is_skip("idk"));
        assert!(!is_skip("The context of my last project was a payment gateway"));
        assert!(!is_skip("I passed the certification exam"));
    }

    #[test]
    fn full_answers_using_skip_words_are_evaluated() {
        let answer = "During the outage I would pass the failing build logs to the next on-call \
                      engineer and proceed with the rollback while keeping stakeholders informed.";
        assert!(!is_skip(answer));
        assert_eq!(triage_answer(answer), AnswerTriage::Evaluate);
        assert!(is_skip("Pass, next question please"));
    }

    #[test]
    fn triage_orders_skip_before_length() {
        assert_eq!(triage_answer("I don't know"), AnswerTriage::Skip);
        assert_eq!(triage_answer("I built an API."), AnswerTriage::TooShort);
        let long = "I led a small team that rebuilt our billing service, and along the way \
                    I learned a lot about testing and communication with stakeholders.";
        assert_eq!(triage_answer(long), AnswerTriage::Evaluate);
    }

    #[test]
    fn skip_evaluation_is_neutral_with_type_specific_follow_up() {
        let canned =
            canned_evaluation(AnswerTriage::Skip, InterviewType::Hr, Phase::Intro).unwrap();
        assert_eq!(canned.score, SKIP_SCORE);
        assert!(canned.next_questions.contains(&"Why do you want this job?"));

        let short =
            canned_evaluation(AnswerTriage::TooShort, InterviewType::General, Phase::Intro)
                .unwrap();
        assert_eq!(short.score, SHORT_ANSWER_SCORE);
        assert!(canned_evaluation(AnswerTriage::Evaluate, InterviewType::Hr, Phase::Hr).is_none());
    }

    #[test]
    fn progress_serializes_with_frontend_field_names() {
        let progress = InterviewProgress {
            phase: Phase::Hr,
            mood: Mood::Strict,
            question_count: 3,
        };
        let value = serde_json::to_value(progress).unwrap();
        assert_eq!(value["interviewPhase"], "hr");
        assert_eq!(value["interviewerMood"], "strict");
        assert_eq!(value["questionCount"], 3);
    }
}
