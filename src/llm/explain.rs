use tracing::info;

use super::{InferenceClient, SamplingOptions};
use crate::error::{Error, Result};

pub fn build_explain_prompt(sql: &str) -> String {
    let mut prompt = String::from("### Task\n");
    prompt.push_str("Explain the following SQL query in simple, plain English:\n\n");
    prompt.push_str("```sql\n");
    prompt.push_str(sql.trim());
    prompt.push_str("\n```\n\n");
    prompt.push_str("### Instructions\n");
    prompt.push_str("- Break down what the query does step by step\n");
    prompt.push_str("- Explain any JOINs, WHERE conditions, GROUP BY, ORDER BY, etc.\n");
    prompt.push_str("- Mention which tables are being queried\n");
    prompt.push_str("- Explain what data is being retrieved\n");
    prompt.push_str("- Keep it clear and concise for non-technical users\n");
    prompt.push_str("- Do not include any markdown or code blocks in the response\n");
    prompt.push_str("- Provide only the explanation, no additional text\n\n");
    prompt.push_str("### Explanation\n");
    prompt
}

/// Ask the model for a plain-English reading of `sql`.
pub async fn explain_sql(client: &dyn InferenceClient, sql: &str) -> Result<String> {
    let prompt = build_explain_prompt(sql);
    info!(prompt_len = prompt.len(), "requesting SQL explanation");
    let explanation = client
        .generate(&prompt, &SamplingOptions::for_explanation())
        .await?;
    let explanation = explanation.trim();
    if explanation.is_empty() {
        return Err(Error::InferenceUnavailable("model returned no explanation".into()));
    }
    Ok(explanation.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeInference;

    #[test]
    fn test_prompt_embeds_statement_in_fence() {
        let prompt = build_explain_prompt("  SELECT * FROM users;  ");
        assert!(prompt.starts_with("### Task\n"));
        assert!(prompt.contains("```sql\nSELECT * FROM users;\n```"));
        assert!(prompt.ends_with("### Explanation\n"));
    }

    #[tokio::test]
    async fn test_explain_trims_model_output() {
        let client = FakeInference::replying("  Lists every user.\n");
        let text = explain_sql(&client, "SELECT * FROM users;").await.unwrap();
        assert_eq!(text, "Lists every user.");
        let seen = client.last_options().unwrap();
        assert_eq!(seen, SamplingOptions::for_explanation());
    }

    #[tokio::test]
    async fn test_explain_surfaces_unavailability() {
        let client = FakeInference::unavailable();
        let err = explain_sql(&client, "SELECT 1;").await.unwrap_err();
        assert!(matches!(err, Error::InferenceUnavailable(_)));

        let blank = FakeInference::replying("   ");
        assert!(explain_sql(&blank, "SELECT 1;").await.is_err());
    }
}
