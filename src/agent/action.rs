//! Action parsing for LLM responses.
//!
//! The model's response is scanned for fenced blocks in priority
//! order: `answer`, then `recurse`, then code fences. When no fence
//! matches, heuristics classify the text as an implicit answer or as
//! bare code lines.

use serde::Deserialize;

/// Code fence languages accepted as a code action.
const CODE_FENCES: &[&str] = &["code", "javascript", "typescript", "js", "ts"];

/// Phrases that mark a fenceless response as an implicit answer.
const ANSWER_PHRASES: &[&str] = &[
    "The answer is",
    "Based on my analysis",
    "I found that",
    "The result is",
];

/// Line prefixes that mark fenceless text as code.
const CODE_PREFIXES: &[&str] = &["let ", "const ", "var ", "function ", "ctx.", "context.", "return "];

/// One parsed action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Terminate with an answer.
    Answer {
        /// Answer text.
        answer: String,
        /// Model-reported confidence in [0, 1].
        confidence: f64,
    },
    /// Run code in the sandbox.
    Code {
        /// Code body.
        code: String,
    },
    /// Spawn a sub-agent.
    Recurse {
        /// Sub-goal text.
        sub_goal: String,
        /// Optional expression evaluated in the sandbox to derive the
        /// sub-context; absent means "inherit the parent context".
        sub_context: Option<String>,
    },
}

#[derive(Deserialize)]
struct AnswerPayload {
    answer: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

const fn default_confidence() -> f64 {
    0.8
}

#[derive(Deserialize)]
struct RecursePayload {
    #[serde(alias = "subGoal")]
    sub_goal: String,
    #[serde(default, alias = "subContext")]
    sub_context: Option<String>,
}

/// Parses the model's response into an [`Action`].
///
/// Never fails: unparseable content degrades through the implicit
/// heuristics down to a plain answer with confidence 0.5.
#[must_use]
pub fn parse_action(response: &str) -> Action {
    if let Some(body) = fenced_block(response, &["answer"]) {
        return match serde_json::from_str::<AnswerPayload>(&body) {
            Ok(payload) => Action::Answer {
                answer: payload.answer,
                confidence: payload.confidence.clamp(0.0, 1.0),
            },
            // JSON failure: the block body is the answer.
            Err(_) => Action::Answer {
                answer: body,
                confidence: 0.8,
            },
        };
    }

    if let Some(body) = fenced_block(response, &["recurse"]) {
        return match serde_json::from_str::<RecursePayload>(&body) {
            Ok(payload) => Action::Recurse {
                sub_goal: payload.sub_goal,
                sub_context: payload.sub_context,
            },
            Err(_) => Action::Recurse {
                sub_goal: body,
                sub_context: None,
            },
        };
    }

    if let Some(body) = fenced_block(response, CODE_FENCES) {
        return Action::Code { code: body };
    }

    // Implicit answer phrasing.
    if ANSWER_PHRASES.iter().any(|p| response.contains(p)) {
        return Action::Answer {
            answer: response.trim().to_string(),
            confidence: 0.6,
        };
    }

    // Bare code lines.
    let code_lines: Vec<&str> = response
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            CODE_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        })
        .collect();
    if !code_lines.is_empty() {
        return Action::Code {
            code: code_lines.join("\n"),
        };
    }

    Action::Answer {
        answer: response.trim().to_string(),
        confidence: 0.5,
    }
}

/// Extracts the body of the first fence tagged with any of `tags`.
fn fenced_block(text: &str, tags: &[&str]) -> Option<String> {
    let mut search_from = 0usize;
    while let Some(rel) = text[search_from..].find("```") {
        let fence_start = search_from + rel;
        let after_ticks = fence_start + 3;
        let rest = &text[after_ticks..];

        let line_end = rest.find('\n')?;
        let tag = rest[..line_end].trim();

        let body_start = after_ticks + line_end + 1;
        let Some(close_rel) = text[body_start..].find("```") else {
            return None;
        };

        if tags.iter().any(|t| tag.eq_ignore_ascii_case(t)) {
            let body = &text[body_start..body_start + close_rel];
            return Some(body.trim_end_matches('\n').trim().to_string());
        }

        // Skip past this whole fence and keep scanning.
        search_from = body_start + close_rel + 3;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_block_json() {
        let response = "Here you go.\n```answer\n{\"answer\": \"11\", \"confidence\": 0.9}\n```\n";
        assert_eq!(
            parse_action(response),
            Action::Answer {
                answer: "11".to_string(),
                confidence: 0.9
            }
        );
    }

    #[test]
    fn test_answer_block_bad_json_uses_body() {
        let response = "```answer\nforty-two\n```";
        assert_eq!(
            parse_action(response),
            Action::Answer {
                answer: "forty-two".to_string(),
                confidence: 0.8
            }
        );
    }

    #[test]
    fn test_answer_takes_priority_over_code() {
        let response = "```code\nreturn 1\n```\n```answer\n{\"answer\": \"done\", \"confidence\": 1.0}\n```";
        assert!(matches!(parse_action(response), Action::Answer { .. }));
    }

    #[test]
    fn test_recurse_block() {
        let response =
            "```recurse\n{\"sub_goal\": \"count imports\", \"sub_context\": \"ctx.head(100)\"}\n```";
        assert_eq!(
            parse_action(response),
            Action::Recurse {
                sub_goal: "count imports".to_string(),
                sub_context: Some("ctx.head(100)".to_string()),
            }
        );
    }

    #[test]
    fn test_recurse_camel_case_payload() {
        let response = "```recurse\n{\"subGoal\": \"inspect exports\"}\n```";
        assert_eq!(
            parse_action(response),
            Action::Recurse {
                sub_goal: "inspect exports".to_string(),
                sub_context: None,
            }
        );
    }

    #[test]
    fn test_recurse_bad_json_is_sub_goal() {
        let response = "```recurse\njust look at the tests\n```";
        assert_eq!(
            parse_action(response),
            Action::Recurse {
                sub_goal: "just look at the tests".to_string(),
                sub_context: None,
            }
        );
    }

    #[test]
    fn test_code_fence_variants() {
        for lang in ["code", "javascript", "typescript", "js", "ts"] {
            let response = format!("```{lang}\nreturn ctx.length()\n```");
            assert_eq!(
                parse_action(&response),
                Action::Code {
                    code: "return ctx.length()".to_string()
                },
                "fence {lang} not recognized"
            );
        }
    }

    #[test]
    fn test_untagged_fence_is_not_code() {
        // A plain ``` fence has no recognized tag; falls through to
        // the implicit heuristics.
        let response = "```\nsome output\n```";
        assert!(matches!(parse_action(response), Action::Answer { .. }));
    }

    #[test]
    fn test_implicit_answer_phrase() {
        let action = parse_action("Based on my analysis the function is unused.");
        assert_eq!(
            action,
            Action::Answer {
                answer: "Based on my analysis the function is unused.".to_string(),
                confidence: 0.6
            }
        );
    }

    #[test]
    fn test_bare_code_lines_extracted() {
        let response = "I will check the length.\nlet n = ctx.length()\nreturn n";
        assert_eq!(
            parse_action(response),
            Action::Code {
                code: "let n = ctx.length()\nreturn n".to_string()
            }
        );
    }

    #[test]
    fn test_plain_text_is_low_confidence_answer() {
        let action = parse_action("It probably works fine.");
        assert_eq!(
            action,
            Action::Answer {
                answer: "It probably works fine.".to_string(),
                confidence: 0.5
            }
        );
    }

    #[test]
    fn test_confidence_clamped() {
        let response = "```answer\n{\"answer\": \"x\", \"confidence\": 7.5}\n```";
        if let Action::Answer { confidence, .. } = parse_action(response) {
            assert!((confidence - 1.0).abs() < f64::EPSILON);
        } else {
            unreachable!("expected answer");
        }
    }
}
