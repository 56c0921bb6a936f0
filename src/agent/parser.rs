//! ReAct output parser
//!
//! Turns one model completion into either a tool action or a final answer.

use lazy_static::lazy_static;
use regex::Regex;

use super::prompt::FINAL_ANSWER_MARKER;

lazy_static! {
    static ref ACTION_RE: Regex =
        Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
            .expect("action regex is valid");
    static ref ACTION_ONLY_RE: Regex =
        Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)").expect("action-only regex is valid");
    static ref ACTION_INPUT_RE: Regex =
        Regex::new(r"(?s)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
            .expect("action-input regex is valid");
}

/// One parsed step of the ReAct loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactStep {
    /// Call `tool` with `input`; `log` is the raw completion
    Action {
        tool: String,
        input: String,
        log: String,
    },
    /// The agent is done
    Finish { answer: String, log: String },
}

/// Why a completion could not be parsed
///
/// `observation` is what gets fed back to the model on the next step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub message: String,
    pub observation: String,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a ReAct-formatted completion
pub fn parse_react_output(text: &str) -> Result<ReactStep, ParseFailure> {
    let answer_at = text.find(FINAL_ANSWER_MARKER);

    if let Some(caps) = ACTION_RE.captures(text) {
        let action_at = caps.get(0).map_or(0, |m| m.start());
        match answer_at {
            // an answer written first wins over an action the model kept going with
            Some(pos) if pos < action_at => {
                let answer = text[pos + FINAL_ANSWER_MARKER.len()..action_at]
                    .split("\nThought")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                return Ok(ReactStep::Finish {
                    answer,
                    log: text.to_string(),
                });
            }
            Some(_) => {
                return Err(ParseFailure {
                    message: format!(
                        "Parsing LLM output produced both a final answer and a parse-able action: {}",
                        text
                    ),
                    observation: "Invalid Format: respond with either an Action or a Final Answer, \
                                  not both."
                        .to_string(),
                });
            }
            None => {}
        }
        let tool = caps[1].trim().to_string();
        let input = caps[2]
            .trim()
            .trim_matches(' ')
            .trim_matches('"')
            .to_string();
        return Ok(ReactStep::Action {
            tool,
            input,
            log: text.to_string(),
        });
    }

    if answer_at.is_some() {
        let answer = text
            .rsplit(FINAL_ANSWER_MARKER)
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        return Ok(ReactStep::Finish {
            answer,
            log: text.to_string(),
        });
    }

    if !ACTION_ONLY_RE.is_match(text) {
        return Err(ParseFailure {
            message: format!("Could not parse LLM output: `{}`", text),
            observation: "Invalid Format: Missing 'Action:' after 'Thought:'".to_string(),
        });
    }
    if !ACTION_INPUT_RE.is_match(text) {
        return Err(ParseFailure {
            message: format!("Could not parse LLM output: `{}`", text),
            observation: "Invalid Format: Missing 'Action Input:' after 'Action:'".to_string(),
        });
    }
    Err(ParseFailure {
        message: format!("Could not parse LLM output: `{}`", text),
        observation: "Invalid or incomplete response".to_string(),
    })
}

/// Cut a completion at the first `Observation:` the model invented itself
pub fn truncate_at_observation(text: &str) -> &str {
    match text.find("\nObservation") {
        Some(pos) => &text[..pos],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action() {
        let text = "Thought: Do I need to use a tool? Yes\nAction: sql_db_query\nAction Input: SELECT count(*) FROM dresses";
        assert_eq!(
            parse_react_output(text).unwrap(),
            ReactStep::Action {
                tool: "sql_db_query".to_string(),
                input: "SELECT count(*) FROM dresses".to_string(),
                log: text.to_string(),
            }
        );
    }

    #[test]
    fn test_parse_action_with_empty_input() {
        let text = "Thought: list first\nAction: sql_db_list_tables\nAction Input: \"\"";
        match parse_react_output(text).unwrap() {
            ReactStep::Action { tool, input, .. } => {
                assert_eq!(tool, "sql_db_list_tables");
                assert_eq!(input, "");
            }
            other => panic!("expected action, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_final_answer() {
        let text = "Thought: Do I need to use a tool? No\nFinal Answer: There are 4 dresses.";
        match parse_react_output(text).unwrap() {
            ReactStep::Finish { answer, .. } => assert_eq!(answer, "There are 4 dresses."),
            other => panic!("expected finish, got {other:?}"),
        }
    }

    #[test]
    fn test_both_action_and_answer_is_error() {
        let text = "Action: sql_db_query\nAction Input: SELECT 1\nFinal Answer: 1";
        let err = parse_react_output(text).unwrap_err();
        assert!(err.message.contains("both a final answer"));
    }

    #[test]
    fn test_answer_before_action_finishes() {
        let text = "Thought: Do I need to use a tool? No\nFinal Answer: There are 4 dresses.\n\
                    Thought: Do I need to use a tool? Yes\nAction: sql_db_query\nAction Input: SELECT 1";
        match parse_react_output(text).unwrap() {
            ReactStep::Finish { answer, .. } => assert_eq!(answer, "There are 4 dresses."),
            other => panic!("expected finish, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_action() {
        let err = parse_react_output("Hello there!").unwrap_err();
        assert_eq!(err.observation, "Invalid Format: Missing 'Action:' after 'Thought:'");
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn test_missing_action_input() {
        let err = parse_react_output("Thought: yes\nAction: sql_db_query").unwrap_err();
        assert_eq!(
            err.observation,
            "Invalid Format: Missing 'Action Input:' after 'Action:'"
        );
    }

    #[test]
    fn test_truncate_at_observation() {
        let text = "Action: sql_db_query\nAction Input: SELECT 1\nObservation: [(1,)]";
        assert_eq!(
            truncate_at_observation(text),
            "Action: sql_db_query\nAction Input: SELECT 1"
        );
        assert_eq!(truncate_at_observation("Final Answer: x"), "Final Answer: x");
    }
}
