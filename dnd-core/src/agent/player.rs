//! Player character agents.
//!
//! Each agent plays exactly one party member, with that character's sheet
//! and personality baked into its system prompt.

use super::{AbortHandle, AgentCore, AgentError, Task, TaskError, TaskInputs, TextGenerator};
use crate::actions::{Intent, PlayerFeedback};
use crate::character::PartyMember;
use crate::config::{AgentSettings, RetryPolicy};
use crate::state::GameState;
use std::sync::Arc;

/// Questions a player may ask per turn.
pub const MAX_QUESTIONS: usize = 3;

const ASK_QUESTIONS: Task = Task::new(
    "ask_questions",
    "Ask the Dungeon Master about the current situation.",
    include_str!("prompts/player_ask_questions.txt"),
    "Up to three short questions separated by |",
);

const DECLARE_INTENT: Task = Task::new(
    "declare_intent",
    "Declare the action you are considering.",
    include_str!("prompts/player_declare_intent.txt"),
    "Your intended action and your reasoning",
);

const PROVIDE_FEEDBACK: Task = Task::new(
    "provide_feedback",
    "Give quick in-character feedback on {actor_name}'s intended action.",
    include_str!("prompts/player_provide_feedback.txt"),
    "Your support level and a short in-character reaction",
);

const MAKE_DECISION: Task = Task::new(
    "make_decision",
    "Make your final decision, considering the party's feedback.",
    include_str!("prompts/player_make_decision.txt"),
    "The action you attempt, possibly changed by the feedback",
);

/// An agent playing one character.
#[derive(Debug, Clone)]
pub struct PlayerAgent {
    member: PartyMember,
    core: AgentCore,
    lookback: usize,
}

impl PlayerAgent {
    pub fn new(
        member: PartyMember,
        generator: Arc<dyn TextGenerator>,
        settings: AgentSettings,
    ) -> Result<Self, TaskError> {
        let system = super::task::fill(
            "player_system",
            include_str!("prompts/player_system.txt"),
            &TaskInputs::new()
                .with("character", member.character.to_prompt())
                .with("personality", member.personality.to_prompt()),
        )?;
        Ok(Self {
            core: AgentCore::new(member.name(), system, settings, generator),
            member,
            lookback: 3,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.core = self.core.with_retry(retry);
        self
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.core = self.core.with_abort(abort);
        self
    }

    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn name(&self) -> &str {
        self.member.name()
    }

    pub fn member(&self) -> &PartyMember {
        &self.member
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    /// Ask up to [`MAX_QUESTIONS`] questions about the situation.
    pub async fn ask_questions(
        &self,
        state: &GameState,
        situation: &str,
    ) -> Result<Vec<String>, AgentError> {
        let inputs = TaskInputs::new()
            .with("situation", situation)
            .with("context", state.relevant_context(self.lookback));
        let reply = self.core.run_text(&ASK_QUESTIONS, &inputs).await?;
        Ok(split_questions(&reply))
    }

    /// Declare the action this character is considering.
    pub async fn declare_intent(
        &self,
        state: &GameState,
        situation: &str,
        qa_exchange: &str,
    ) -> Result<Intent, AgentError> {
        let inputs = TaskInputs::new()
            .with("situation", situation)
            .with("qa_exchange", qa_exchange)
            .with("context", state.relevant_context(self.lookback));
        let intent: Intent = self.core.run_structured(&DECLARE_INTENT, &inputs).await?;
        Ok(self.own(intent))
    }

    /// React to another party member's intended action.
    pub async fn provide_feedback(
        &self,
        situation: &str,
        actor: &PartyMember,
        intent: &Intent,
    ) -> Result<PlayerFeedback, AgentError> {
        let inputs = TaskInputs::new()
            .with("actor_name", actor.name())
            .with("actor", actor.character.to_prompt())
            .with("situation", situation)
            .with("intent", intent.describe());
        self.core.run_structured(&PROVIDE_FEEDBACK, &inputs).await
    }

    /// Settle on the action to attempt after hearing the party.
    pub async fn make_decision(
        &self,
        state: &GameState,
        situation: &str,
        intent: &Intent,
        feedback: &[(String, PlayerFeedback)],
    ) -> Result<Intent, AgentError> {
        let inputs = TaskInputs::new()
            .with("situation", situation)
            .with("intent", intent.describe())
            .with("party_feedback", format_party_feedback(feedback))
            .with("context", state.relevant_context(self.lookback));
        let decision: Intent = self.core.run_structured(&MAKE_DECISION, &inputs).await?;
        Ok(self.own(decision))
    }

    /// Intents always belong to the agent's character, whatever the model wrote.
    fn own(&self, mut intent: Intent) -> Intent {
        intent.character = self.name().to_string();
        intent
    }
}

/// Split a `|`-separated question list, keeping at most [`MAX_QUESTIONS`].
/// A bare `NONE` means no questions.
pub fn split_questions(reply: &str) -> Vec<String> {
    reply
        .split('|')
        .map(str::trim)
        .filter(|q| !q.is_empty() && !q.eq_ignore_ascii_case("none"))
        .take(MAX_QUESTIONS)
        .map(str::to_string)
        .collect()
}

/// Pair questions with the DM's line-by-line answers.
///
/// Extra answer lines are ignored; unanswered questions get a placeholder.
pub fn format_qa_exchange(questions: &[String], answers: &str) -> String {
    if questions.is_empty() {
        return "Questions and Answers:\nNo questions were asked.".to_string();
    }
    let mut answers = answers.lines().map(str::trim).filter(|a| !a.is_empty());
    let mut lines = vec!["Questions and Answers:".to_string()];
    for question in questions {
        let answer = answers.next().unwrap_or("No answer.");
        lines.push(format!("Q: {question}\nA: {answer}"));
    }
    lines.join("\n")
}

/// Render the party's feedback for the acting player.
pub fn format_party_feedback(feedback: &[(String, PlayerFeedback)]) -> String {
    if feedback.is_empty() {
        return "Nobody else weighed in.".to_string();
    }
    feedback
        .iter()
        .map(|(name, fb)| {
            let mut text = format!(
                "Feedback from {name}: {:?}. {}",
                fb.support_level, fb.reasoning
            );
            if let Some(suggestion) = &fb.suggestion {
                text.push_str(&format!(" Suggestion: {suggestion}"));
            }
            if !fb.concerns.is_empty() {
                text.push_str(&format!(" Concerns: {}", fb.concerns.join("; ")));
            }
            text
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::SupportLevel;
    use crate::scenario::Scenario;
    use crate::testing::ScriptedGenerator;

    fn agent(generator: &Arc<ScriptedGenerator>, seat: usize) -> (PlayerAgent, GameState) {
        let state = Scenario::crimson_crypt().into_state();
        let agent = PlayerAgent::new(
            state.party[seat].clone(),
            generator.clone(),
            AgentSettings::new(0.8),
        )
        .unwrap();
        (agent, state)
    }

    #[test]
    fn test_split_questions() {
        assert_eq!(
            split_questions(" Is it trapped? | Who else is here?|| Can I see the runes? | Extra?"),
            vec!["Is it trapped?", "Who else is here?", "Can I see the runes?"]
        );
        assert!(split_questions("  ").is_empty());
        assert!(split_questions("NONE").is_empty());
    }

    #[test]
    fn test_format_qa_exchange() {
        let questions = vec!["Is it trapped?".to_string(), "Is it dark?".to_string()];
        let qa = format_qa_exchange(&questions, "Not that you can see.\n\n");
        assert_eq!(
            qa,
            "Questions and Answers:\nQ: Is it trapped?\nA: Not that you can see.\nQ: Is it dark?\nA: No answer."
        );
        assert_eq!(
            format_qa_exchange(&[], ""),
            "Questions and Answers:\nNo questions were asked."
        );
    }

    #[test]
    fn test_format_party_feedback() {
        let feedback = vec![(
            "Brussae".to_string(),
            PlayerFeedback {
                support_level: SupportLevel::Concern,
                reasoning: "Too risky.".into(),
                suggestion: Some("Let me go first.".into()),
                concerns: vec![],
                character_perspective: String::new(),
            },
        )];
        assert_eq!(
            format_party_feedback(&feedback),
            "Feedback from Brussae: Concern. Too risky. Suggestion: Let me go first."
        );
    }

    #[test]
    fn test_system_prompt_carries_personality() {
        let generator = Arc::new(ScriptedGenerator::new());
        let (agent, _) = agent(&generator, 1);
        let system = agent.core().system_prompt();
        assert!(system.contains("Name: Shadowstep"));
        assert!(system.contains("- always checks for traps, even in safe places"));
        assert_eq!(agent.core().name(), "Shadowstep");
    }

    #[tokio::test]
    async fn test_declare_intent_claims_character() {
        let generator = Arc::new(ScriptedGenerator::new().with_reply(
            "declare_intent",
            r#"{"character": "Somebody Else", "action": "Check the door for traps", "reasoning": "Habit."}"#,
        ));
        let (agent, state) = agent(&generator, 1);
        let intent = agent
            .declare_intent(&state, "A sealed door.", "Questions and Answers:\nNo questions were asked.")
            .await
            .unwrap();
        assert_eq!(intent.character, "Shadowstep");
        assert_eq!(intent.action, "Check the door for traps");
    }

    #[tokio::test]
    async fn test_ask_questions_caps_count() {
        let generator = Arc::new(
            ScriptedGenerator::new().with_reply("ask_questions", "A? | B? | C? | D?"),
        );
        let (agent, state) = agent(&generator, 2);
        let questions = agent.ask_questions(&state, "A sealed door.").await.unwrap();
        assert_eq!(questions.len(), MAX_QUESTIONS);
    }

    #[tokio::test]
    async fn test_provide_feedback_names_actor() {
        let generator = Arc::new(ScriptedGenerator::new().with_reply(
            "provide_feedback",
            r#"{"support_level": "support", "reasoning": "Sound plan."}"#,
        ));
        let (agent, state) = agent(&generator, 0);
        let intent = Intent::new("Eldara", "Read the runes aloud");
        let feedback = agent
            .provide_feedback("Runes glow.", &state.party[2], &intent)
            .await
            .unwrap();
        assert_eq!(feedback.support_level, SupportLevel::Support);
        assert!(generator.requests()[0]
            .prompt
            .starts_with("Give quick in-character feedback on Eldara's intended action."));
    }
}
