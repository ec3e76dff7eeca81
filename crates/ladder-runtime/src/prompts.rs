//! Prompts for the judge.
//!
//! The judge is asked for a bare number so replies stay inside the 4-token
//! cap and parse without extraction heuristics.

/// System prompt establishing the judge as a strict grader.
pub const JUDGE_SYSTEM_PROMPT: &str = "Act as a strict grader. Return **only** a float between 0 and 1 \
representing how correct and complete the answer is.";

/// User message carrying the prompt and the draft under review.
pub fn judge_user_message(prompt: &str, draft: &str) -> String {
    format!("Prompt:\n{}\n\nAnswer:\n{}\n\nScore:", prompt, draft)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_demands_a_number() {
        assert!(JUDGE_SYSTEM_PROMPT.contains("strict grader"));
        assert!(JUDGE_SYSTEM_PROMPT.contains("between 0 and 1"));
    }

    #[test]
    fn test_user_message_layout() {
        let message = judge_user_message("2+2?", "4");
        assert_eq!(message, "Prompt:\n2+2?\n\nAnswer:\n4\n\nScore:");
    }
}
