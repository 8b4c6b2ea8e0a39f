//! Feedback prompts per writing kind

use truegul_core::WritingKind;

fn document_name(kind: WritingKind) -> &'static str {
    match kind {
        WritingKind::Essay => "essay",
        WritingKind::CoverLetter => "cover letter",
    }
}

/// System instructions for the feedback model
pub fn system_prompt(kind: WritingKind) -> String {
    let focus = match kind {
        WritingKind::Essay => {
            "thesis clarity, structure and flow of the argument, use of evidence, and style"
        }
        WritingKind::CoverLetter => {
            "relevance to the role, concrete achievements, tone, and a clear call to action"
        }
    };

    format!(
        "You are a writing coach reviewing a {}. Give concise, constructive feedback \
         in at most five sentences. Focus on {}. Do not rewrite the text.",
        document_name(kind),
        focus
    )
}

/// User turn: the score and the text under review
pub fn user_prompt(text: &str, kind: WritingKind, ai_probability: f64) -> String {
    let name = document_name(kind);
    let mut prompt = format!(
        "An AI detector estimates a {:.1}% probability that this {} was machine-generated.",
        ai_probability, name
    );
    if ai_probability >= 50.0 {
        prompt.push_str(&format!(
            " Suggest how the writer can make the {} sound more personal and authentic.",
            name
        ));
    }
    prompt.push_str(&format!("\n\n{}:\n{}", capitalize(name), text.trim()));
    prompt
}

/// Zephyr-style chat template used by TinyLlama chat checkpoints
pub fn chat_template(system: &str, user: &str) -> String {
    format!(
        "<|system|>\n{}</s>\n<|user|>\n{}</s>\n<|assistant|>\n",
        system, user
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminology_follows_kind() {
        assert!(system_prompt(WritingKind::Essay).contains("essay"));
        assert!(system_prompt(WritingKind::CoverLetter).contains("cover letter"));

        let prompt = user_prompt("Dear team,", WritingKind::CoverLetter, 12.0);
        assert!(prompt.contains("Cover letter:\nDear team,"));
        assert!(prompt.contains("12.0%"));
        assert!(!prompt.contains("authentic"));
    }

    #[test]
    fn test_high_score_asks_for_authenticity() {
        let prompt = user_prompt("Text.", WritingKind::Essay, 87.25);
        assert!(prompt.contains("87.2%") || prompt.contains("87.3%"));
        assert!(prompt.contains("authentic"));
    }

    #[test]
    fn test_chat_template() {
        let rendered = chat_template("sys", "hi");
        assert!(rendered.starts_with("<|system|>\nsys</s>"));
        assert!(rendered.ends_with("<|assistant|>\n"));
    }
}
