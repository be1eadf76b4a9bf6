//! Parser for role-tagged conversation transcripts.
//!
//! The input is a sequence of JSON objects of the form
//! `{"messages":[{"role":"user","content":"..."}, ...]}`. Objects may span
//! several lines and need no separator. Each `user` turn followed by the next
//! `assistant` turn of the same conversation yields one [`TrainingPair`].
//! Anything that does not fit is skipped and reported, never fatal.

use serde::Deserialize;

/// Speaker of one turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTurn {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

/// Turns stay raw JSON until paired so one bad turn only drops itself.
#[derive(Debug, Deserialize)]
struct RawConversation {
    messages: Vec<serde_json::Value>,
}

/// One prompt with the reply that answered it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainingPair {
    pub prompt: String,
    pub reply: String,
}

impl TrainingPair {
    pub fn new(prompt: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reply: reply.into(),
        }
    }
}

/// Something the parser dropped, with the 1-based line it started on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Skipped {
    pub line: usize,
    pub reason: String,
}

/// Outcome of parsing a transcript document.
#[derive(Clone, Debug, Default)]
pub struct TranscriptReport {
    pub pairs: Vec<TrainingPair>,
    pub conversations: usize,
    pub skipped: Vec<Skipped>,
}

/// A top-level `{ ... }` span of the document.
struct Chunk<'a> {
    line: usize,
    text: &'a str,
}

/// Split the document into brace-balanced top-level objects. Braces inside
/// string literals are ignored. Stray text between objects and an
/// unterminated trailing object are reported as skipped.
fn split_objects<'a>(input: &'a str, skipped: &mut Vec<Skipped>) -> Vec<Chunk<'a>> {
    let mut chunks = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;
    let mut start_line = 1;
    let mut line = 1;
    let mut stray_line: Option<usize> = None;

    for (idx, c) in input.char_indices() {
        if c == '\n' {
            line += 1;
        }
        if depth == 0 {
            if c == '{' {
                if let Some(at) = stray_line.take() {
                    skipped.push(Skipped {
                        line: at,
                        reason: "text outside of a conversation object".into(),
                    });
                }
                depth = 1;
                start = idx;
                start_line = line;
            } else if !c.is_whitespace() && stray_line.is_none() {
                stray_line = Some(line);
            }
            continue;
        }
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    chunks.push(Chunk {
                        line: start_line,
                        text: &input[start..=idx],
                    });
                }
            }
            _ => {}
        }
    }

    if let Some(at) = stray_line {
        skipped.push(Skipped {
            line: at,
            reason: "text outside of a conversation object".into(),
        });
    }
    if depth > 0 {
        skipped.push(Skipped {
            line: start_line,
            reason: "unterminated conversation object".into(),
        });
    }
    chunks
}

/// Extract (prompt, reply) pairs from a transcript document.
pub fn parse_transcripts(input: &str) -> TranscriptReport {
    let mut report = TranscriptReport::default();
    for chunk in split_objects(input, &mut report.skipped) {
        let conversation: RawConversation = match serde_json::from_str(chunk.text) {
            Ok(c) => c,
            Err(e) => {
                report.skipped.push(Skipped {
                    line: chunk.line,
                    reason: format!("malformed conversation: {e}"),
                });
                continue;
            }
        };
        report.conversations += 1;
        pair_turns(conversation, chunk.line, &mut report);
    }
    report.skipped.sort_by_key(|s| s.line);
    report
}

fn pair_turns(conversation: RawConversation, line: usize, report: &mut TranscriptReport) {
    let mut pending_user: Option<String> = None;
    for value in conversation.messages {
        let turn: RawTurn = match serde_json::from_value(value) {
            Ok(turn) => turn,
            Err(e) => {
                report.skipped.push(Skipped {
                    line,
                    reason: format!("malformed turn: {e}"),
                });
                continue;
            }
        };
        let Some(role) = Role::parse(&turn.role) else {
            report.skipped.push(Skipped {
                line,
                reason: format!("unknown role `{}`", turn.role),
            });
            continue;
        };
        let Some(content) = turn.content.map(|c| c.trim().to_string()) else {
            report.skipped.push(Skipped {
                line,
                reason: "turn without content".into(),
            });
            continue;
        };
        match role {
            Role::System => {}
            Role::User => {
                if pending_user.replace(content).is_some() {
                    report.skipped.push(Skipped {
                        line,
                        reason: "user turn without assistant reply".into(),
                    });
                }
            }
            Role::Assistant => match pending_user.take() {
                Some(prompt) => report.pairs.push(TrainingPair { prompt, reply: content }),
                None => report.skipped.push(Skipped {
                    line,
                    reason: "assistant turn without preceding user turn".into(),
                }),
            },
        }
    }
    if pending_user.is_some() {
        report.skipped.push(Skipped {
            line,
            reason: "user turn without assistant reply".into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_user_with_following_assistant() {
        let input = r#"{"messages":[
            {"role":"system","content":"be nice"},
            {"role":"user","content":" xin chào "},
            {"role":"assistant","content":"Xin chào! Mình là trợ lý ảo..."},
            {"role":"user","content":"bạn tên gì"},
            {"role":"assistant","content":"Mình là Bot."}
        ]}
        {"messages":[{"role":"user","content":"a {brace} \"quoted\""},{"role":"assistant","content":"b"}]}"#;
        let report = parse_transcripts(input);
        assert_eq!(report.conversations, 2);
        assert!(report.skipped.is_empty());
        assert_eq!(
            report.pairs,
            vec![
                TrainingPair::new("xin chào", "Xin chào! Mình là trợ lý ảo..."),
                TrainingPair::new("bạn tên gì", "Mình là Bot."),
                TrainingPair::new("a {brace} \"quoted\"", "b"),
            ]
        );
    }

    #[test]
    fn malformed_objects_are_skipped_not_fatal() {
        let input = "{\"messages\":[{\"role\":\"user\",\"content\":\"a\"},{\"role\":\"assistant\",\"content\":\"b\"}]}\n\
                     {\"messages\": 42}\n\
                     garbage\n\
                     {\"messages\":[{\"role\":\"user\",\"content\":\"c\"},{\"role\":\"assistant\",\"content\":\"d\"}]}\n";
        let report = parse_transcripts(input);
        assert_eq!(report.pairs.len(), 2);
        assert_eq!(report.conversations, 2);
        let lines: Vec<usize> = report.skipped.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![2, 3]);
    }

    #[test]
    fn unmatched_turns_are_reported() {
        let input = r#"{"messages":[
            {"role":"assistant","content":"orphan"},
            {"role":"user","content":"first"},
            {"role":"user","content":"second"},
            {"role":"robot","content":"beep"},
            {"role":"assistant","content":"answer"},
            {"role":"user"}
        ]}"#;
        let report = parse_transcripts(input);
        assert_eq!(report.pairs, vec![TrainingPair::new("second", "answer")]);
        assert_eq!(report.skipped.len(), 4);
    }

    #[test]
    fn malformed_turn_keeps_rest_of_conversation() {
        let input = r#"{"messages":[
            {"role":"user","content":"hi"},
            {"role":"assistant","content":"hello"},
            {"role":"user","content":5},
            {"content":"no role"},
            {"role":"assistant","content":"x"}
        ]}"#;
        let report = parse_transcripts(input);
        assert_eq!(report.conversations, 1);
        assert_eq!(report.pairs, vec![TrainingPair::new("hi", "hello")]);
        let reasons: Vec<&str> = report.skipped.iter().map(|s| s.reason.as_str()).collect();
        assert_eq!(reasons.len(), 3);
        assert!(reasons[0].starts_with("malformed turn"));
        assert!(reasons[1].starts_with("malformed turn"));
        assert_eq!(reasons[2], "assistant turn without preceding user turn");
    }

    #[test]
    fn unterminated_object_is_reported() {
        let report = parse_transcripts(r#"{"messages":[{"role":"user","content":"a"}"#);
        assert!(report.pairs.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, "unterminated conversation object");
    }

    #[test]
    fn empty_input_is_empty_report() {
        let report = parse_transcripts("  \n ");
        assert_eq!(report.conversations, 0);
        assert!(report.pairs.is_empty() && report.skipped.is_empty());
    }
}
