use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{JudgingError, JudgingProvider, JudgingResult};

const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Judge backed by the Gemini `generateContent` API.
#[derive(Clone)]
pub struct GeminiJudge {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiJudge {
    /// Build a judge for `api_key`, using `model` or the default flash model.
    pub fn new(api_key: String, model: Option<String>) -> JudgingResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(JudgingError::ClientBuilder)?;
        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
        })
    }

    async fn generate(&self, guess: String, answer: String) -> JudgingResult<Value> {
        let url = format!("{API_BASE}/{}:generateContent", self.model);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt(&guess, &answer),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(JudgingError::Request)?;

        if !response.status().is_success() {
            return Err(JudgingError::Status(response.status().as_u16()));
        }

        let payload = response
            .json::<GenerateResponse>()
            .await
            .map_err(JudgingError::Request)?;

        let text = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| JudgingError::Parse("response has no candidate text".into()))?;

        serde_json::from_str(strip_fences(&text)).map_err(|err| JudgingError::Parse(err.to_string()))
    }
}

impl JudgingProvider for GeminiJudge {
    fn judge(&self, guess: &str, answer: &str) -> BoxFuture<'static, JudgingResult<Value>> {
        let judge = self.clone();
        let guess = guess.to_owned();
        let answer = answer.to_owned();
        Box::pin(async move { judge.generate(guess, answer).await })
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

fn prompt(guess: &str, answer: &str) -> String {
    format!(
        "You are a trivia game judge.\n\
         The correct movie or show is: \"{answer}\".\n\
         The player guessed: \"{guess}\".\n\
         \n\
         Rules:\n\
         1. If the guess is the exact title or a widely accepted distinct title for it, award 100 points.\n\
         2. If the guess is the correct franchise but not the specific title, award 50 points.\n\
         3. If the guess is wrong, award 0 points.\n\
         \n\
         Return ONLY a raw JSON object: {{\"score\": number, \"reason\": \"short explanation\"}}"
    )
}

/// Models occasionally wrap JSON in a markdown fence despite the mime type.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_mentions_both_sides() {
        let text = prompt("Jaws 2", "Jaws");
        assert!(text.contains("\"Jaws\""));
        assert!(text.contains("\"Jaws 2\""));
        assert!(text.contains("{\"score\": number"));
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        assert_eq!(strip_fences("```json\n{\"score\": 1}\n```"), "{\"score\": 1}");
        assert_eq!(strip_fences(" {\"score\": 1} "), "{\"score\": 1}");
    }
}
