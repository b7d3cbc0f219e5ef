// src/llm/content.rs

//! The `ContentEngine` contract: every piece of generated text the core
//! consumes comes through this trait, so tests (and alternative providers)
//! swap in without touching scheduler logic.

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::chat::ChatMessage;
use crate::roster::Character;
use crate::schedule::{StatusResolution, WeeklySchedule};
use crate::settings::PacingStyle;

use super::LlmClient;

/// Per-user generation hints carried into every message prompt.
#[derive(Debug, Clone)]
pub struct GenerationHints {
    pub pacing: PacingStyle,
    pub max_emojis: u32,
}

#[async_trait]
pub trait ContentEngine: Send + Sync {
    /// A character-initiated opener, colored by what the character is
    /// "doing" right now.
    async fn generate_proactive_message(
        &self,
        character: &Character,
        presence: &StatusResolution,
        hints: &GenerationHints,
    ) -> Result<String>;

    /// A nudge after the user read a message and went quiet.
    async fn generate_left_on_read_message(
        &self,
        character: &Character,
        last_read_message: &str,
        hints: &GenerationHints,
    ) -> Result<String>;

    /// Cumulative reducer: fold the prior summary and a batch of messages
    /// into one replacement summary. Stateless and retryable.
    async fn summarize_messages(
        &self,
        prior_summary: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<String>;

    /// A weekly timetable shaped by the character's persona.
    async fn generate_weekly_schedule(&self, character: &Character) -> Result<WeeklySchedule>;
}

pub struct LlmContentEngine {
    client: LlmClient,
}

impl LlmContentEngine {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: LlmClient::new()?,
        })
    }

    fn persona_system(character: &Character, hints: &GenerationHints) -> String {
        format!(
            "You are {name}. Stay fully in character.\n\
             Persona: {persona}\n\
             Current mood: {mood}\n\
             Texting style: {pacing}. Use at most {emojis} emoji.\n\
             Write like a real person texting: short, casual, no narration.",
            name = character.name,
            persona = character.persona,
            mood = character.mood,
            pacing = pacing_hint(hints.pacing),
            emojis = hints.max_emojis,
        )
    }
}

fn pacing_hint(pacing: PacingStyle) -> &'static str {
    match pacing {
        PacingStyle::Relaxed => "laid back, unhurried, low-key",
        PacingStyle::Balanced => "warm and natural, neither clingy nor distant",
        PacingStyle::Eager => "enthusiastic, quick to share, playful",
    }
}

#[async_trait]
impl ContentEngine for LlmContentEngine {
    async fn generate_proactive_message(
        &self,
        character: &Character,
        presence: &StatusResolution,
        hints: &GenerationHints,
    ) -> Result<String> {
        let activity = presence
            .activity
            .as_deref()
            .unwrap_or("nothing in particular");
        let prompt = format!(
            "You haven't heard from them in a while and feel like reaching out \
             first. You are currently {status} ({activity}). Send one short \
             opening text.",
            status = presence.status.as_str(),
            activity = activity,
        );

        self.client
            .complete(&Self::persona_system(character, hints), &prompt)
            .await
    }

    async fn generate_left_on_read_message(
        &self,
        character: &Character,
        last_read_message: &str,
        hints: &GenerationHints,
    ) -> Result<String> {
        let prompt = format!(
            "They read your last message but didn't reply:\n\
             \"{last}\"\n\
             Send one short, natural follow-up. Don't guilt-trip them.",
            last = last_read_message,
        );

        self.client
            .complete(&Self::persona_system(character, hints), &prompt)
            .await
    }

    async fn summarize_messages(
        &self,
        prior_summary: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<String> {
        let mut transcript = String::new();
        for message in messages {
            transcript.push_str(message.role.as_str());
            transcript.push_str(": ");
            transcript.push_str(&message.content);
            transcript.push('\n');
        }

        let prompt = match prior_summary {
            Some(prior) => format!(
                "Existing summary of the conversation so far:\n{prior}\n\n\
                 Newer messages:\n{transcript}\n\
                 Produce one updated summary that folds both together. Keep \
                 names, plans, feelings, and running jokes. Plain prose.",
            ),
            None => format!(
                "Summarize this conversation. Keep names, plans, feelings, \
                 and running jokes. Plain prose.\n\n{transcript}",
            ),
        };

        self.client
            .complete("You compress chat history into faithful summaries.", &prompt)
            .await
    }

    async fn generate_weekly_schedule(&self, character: &Character) -> Result<WeeklySchedule> {
        let system = "You design believable weekly routines for fictional people. \
                      Respond with JSON only, no prose.";
        let prompt = format!(
            "Create a weekly schedule for this person:\n{persona}\n\n\
             Respond with a JSON object keyed by lowercase day names \
             (\"monday\" through \"sunday\"). Each value is an array of blocks \
             {{\"start\": \"HH:MM\", \"end\": \"HH:MM\", \"status\": \
             \"online\"|\"away\"|\"busy\"|\"offline\", \"activity\": \"...\"}}. \
             Blocks within a day must not overlap; a block may cross midnight \
             when end < start.",
            persona = character.persona,
        );

        let raw = self.client.complete(system, &prompt).await?;
        // Models love to wrap JSON in fences; strip them before parsing.
        let trimmed = raw
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        serde_json::from_str(trimmed).context("Schedule response was not valid JSON")
    }
}
