//! Prompt templates for the SQL agent
//!
//! The base template is the `hwchase17/react-chat` ReAct layout. It is
//! either pulled from a prompt hub over HTTP or taken from the bundled copy,
//! then `compose_prompt` prepends the analyst rules for the chosen output
//! language. Composition is pure so it can be tested without a network.

use async_trait::async_trait;

/// Marker the agent must start its terminal output with
pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";

/// Identifier of the base ReAct chat template
pub const DEFAULT_PROMPT_ID: &str = "hwchase17/react-chat";

/// Variables every agent template must contain
pub const REQUIRED_VARIABLES: &[&str] = &["tools", "tool_names", "input", "agent_scratchpad"];

const KNOWN_VARIABLES: &[&str] = &[
    "tools",
    "tool_names",
    "chat_history",
    "input",
    "agent_scratchpad",
];

/// Bundled copy of `hwchase17/react-chat`
pub const REACT_CHAT_TEMPLATE: &str = r#"Assistant is a large language model trained by OpenAI.

Assistant is designed to be able to assist with a wide range of tasks, from answering simple questions to providing in-depth explanations and discussions on a wide range of topics. As a language model, Assistant is able to generate human-like text based on the input it receives, allowing it to engage in natural-sounding conversations and provide responses that are coherent and relevant to the topic at hand.

Assistant is constantly learning and improving, and its capabilities are constantly evolving. It is able to process and understand large amounts of text, and can use this knowledge to provide accurate and informative responses to a wide range of questions. Additionally, Assistant is able to generate its own text based on the input it receives, allowing it to engage in discussions and provide explanations and descriptions on a wide range of topics.

Overall, Assistant is a powerful tool that can help with a wide range of tasks and provide valuable insights and information on a wide range of topics. Whether you need help with a specific question or just want to have a conversation about a particular topic, Assistant is here to assist.

TOOLS:
------

Assistant has access to the following tools:

{tools}

To use a tool, please use the following format:

```
Thought: Do I need to use a tool? Yes
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
```

When you have a response to say to the Human, or if you do not need to use a tool, you MUST use the format:

```
Thought: Do I need to use a tool? No
Final Answer: [your response here]
```

Begin!

Previous conversation history:
{chat_history}

New input: {input}
{agent_scratchpad}"#;

/// Rule block placed ahead of the base template
pub fn rule_block(language: &str) -> String {
    format!(
        r#"You are an expert Data Analyst and SQL Analyst.
Your goal is to answer user questions by querying a database.

RULES:
1. ALWAYS start by checking the list of tables ('sql_db_list_tables').
2. Then, check the schema of the relevant table ('sql_db_schema').
3. Construct a syntactically correct, read-only SQL query.
4. Execute the query using 'sql_db_query'.
5. If you get an error, check your query and try again.
6. DO NOT execute DML statements (INSERT, UPDATE, DELETE) or change the database in any way.
7. CRITICAL LANGUAGE OUTPUT RULE: When you have the answer, you MUST strictly use the format: "{marker} [Your answer in {language}]".
   - The user's chosen output language is: "{language}".
   - IGNORE the user's language for the final output; IT MUST BE IN {language}.
   - If the user writes in another language, translate your answer into {language} before giving the final answer.
   - DO NOT mimic the user's language. STICK TO "{language}".
   - If you do not start your final response with "{marker}", the system cannot read it.
   - Provide context and reasoning in your answer, not just numbers.
8. SPECIAL RULE FOR CASUAL CHAT (NO TOOL USED):
   - Even if you do not use a tool (e.g., greetings like "Halo", "Hi"), you MUST STILL answer in "{language}" and still start with "{marker}".
   - NEVER reply in the user's language just to be polite. Stick to the target language."#,
        marker = FINAL_ANSWER_MARKER,
        language = language,
    )
}

/// Prepend the analyst rules for `language` to a base template
pub fn compose_prompt(template: &str, language: &str) -> String {
    format!("{}\n\n{}", rule_block(language), template)
}

/// Values substituted into a template
#[derive(Debug, Clone, Default)]
pub struct PromptVars<'a> {
    pub tools: &'a str,
    pub tool_names: &'a str,
    pub chat_history: &'a str,
    pub input: &'a str,
    pub agent_scratchpad: &'a str,
}

impl<'a> PromptVars<'a> {
    fn lookup(&self, name: &str) -> Option<&'a str> {
        match name {
            "tools" => Some(self.tools),
            "tool_names" => Some(self.tool_names),
            "chat_history" => Some(self.chat_history),
            "input" => Some(self.input),
            "agent_scratchpad" => Some(self.agent_scratchpad),
            _ => None,
        }
    }
}

/// A validated agent template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Validate that all required variables are present
    pub fn new(template: impl Into<String>) -> Result<Self, PromptError> {
        let template = template.into();
        for var in REQUIRED_VARIABLES {
            if !template.contains(&format!("{{{}}}", var)) {
                return Err(PromptError::MissingVariable(var.to_string()));
            }
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute variables in one pass
    ///
    /// Substituted text is never rescanned, so user input containing
    /// `{tools}` stays literal. Unknown `{...}` groups are left as-is.
    pub fn render(&self, vars: &PromptVars<'_>) -> String {
        let mut out = String::with_capacity(self.template.len() + vars.input.len() + 256);
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let replaced = after.find('}').and_then(|close| {
                let name = &after[..close];
                if KNOWN_VARIABLES.contains(&name) {
                    vars.lookup(name).map(|value| (value, close))
                } else {
                    None
                }
            });
            match replaced {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Error type for prompt retrieval and validation
#[derive(Debug)]
pub enum PromptError {
    /// Hub could not be reached
    Network(reqwest::Error),
    /// Hub answered but has no such template
    NotFound { id: String, status: u16 },
    /// Template lacks a required `{variable}`
    MissingVariable(String),
}

impl std::fmt::Display for PromptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptError::Network(e) => {
                write!(f, "Failed to establish connection to prompt hub: {}", e)
            }
            PromptError::NotFound { id, status } => {
                write!(f, "Prompt hub returned HTTP {} for '{}'", status, id)
            }
            PromptError::MissingVariable(var) => {
                write!(f, "Prompt template is missing variable '{{{}}}'", var)
            }
        }
    }
}

impl std::error::Error for PromptError {}

impl From<reqwest::Error> for PromptError {
    fn from(e: reqwest::Error) -> Self {
        PromptError::Network(e)
    }
}

/// Supplies base agent templates by identifier
#[async_trait]
pub trait PromptSource: Send + Sync {
    async fn pull(&self, id: &str) -> Result<String, PromptError>;
}

/// Serves the bundled `hwchase17/react-chat` template, offline
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledPromptSource;

#[async_trait]
impl PromptSource for BundledPromptSource {
    async fn pull(&self, _id: &str) -> Result<String, PromptError> {
        Ok(REACT_CHAT_TEMPLATE.to_string())
    }
}

/// Pulls templates from `{base_url}/{id}`
///
/// The body may be the raw template or JSON with a `template` field.
#[derive(Clone)]
pub struct HttpPromptSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPromptSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PromptSource for HttpPromptSource {
    async fn pull(&self, id: &str) -> Result<String, PromptError> {
        let url = format!("{}/{}", self.base_url, id.trim_start_matches('/'));
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PromptError::NotFound {
                id: id.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => match value.get("template").and_then(|t| t.as_str()) {
                Some(template) => Ok(template.to_string()),
                None => Ok(body),
            },
            Err(_) => Ok(body),
        }
    }
}
