// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Prompt templates for Revu
//!
//! One value struct per prompt kind. Each template is constructed with all
//! the fields it renders, so a missing field is a compile error rather than
//! a runtime formatting failure.

use crate::retrieval::RetrievalResult;
use crate::session::{ChatMessage, Mode, Role};

/// Canonical effective query for the first co_reviewer turn
pub const INITIAL_REVIEW_QUERY: &str =
    "Generate a comprehensive initial code review summary for this PR.";

/// Render chat history as `role: content` lines, one per message
pub fn format_history(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return "No history yet.".to_string();
    }
    history
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            format!("{role}: {}", msg.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render partial retrieval results as `From <collection>:` blocks
pub fn format_responses(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return "No new information gathered.".to_string();
    }
    results
        .iter()
        .map(|r| format!("From {}:\n{}", r.collection, r.answer))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Collection-planning prompt
pub struct PlannerPrompt<'a> {
    pub pr_id: &'a str,
    pub available_collections: &'a [String],
    pub query: &'a str,
}

impl PlannerPrompt<'_> {
    pub fn render(&self) -> String {
        let collections = self.available_collections.join(", ");
        let pr_id = self.pr_id;
        format!(
            "You are a Code Review Assistant with access to these specific collections for PR '{pr_id}':\n\
             {collections}\n\n\
             You are working with structured pull request (PR) data. Assume the collections contain \
             relevant PR data, code diffs, and requirements based on their names (e.g., {pr_id}_pr_data, \
             {pr_id}_code, {pr_id}_requirements).\n\n\
             Each indexed PR might contain fields like:\n\
             - \"pr_number\" (int): The pull request number\n\
             - \"title\" (string): Title of the PR\n\
             - \"description\" (string): Detailed PR description including references and rationale\n\
             - \"state\" (string): Open/closed status\n\
             - \"created_at\" / \"updated_at\" (timestamp)\n\
             - \"author\" (string): Username of the PR author\n\
             - \"files\" (list of dicts): **This contains all the changed files and diffs**:\n\
               - \"filename\" (string): File path\n\
               - \"status\" (string): Type of change (`modified`, `added`, `removed`)\n\
               - \"additions\" (int): Number of lines added\n\
               - \"deletions\" (int): Number of lines removed\n\
               - \"diff\" (string): Full unified diff format (git-style)\n\n\
             Your task is to analyze the user's query and determine which collections to query.\n\
             IMPORTANT: You MUST ONLY use the exact collection names listed above.\n\n\
             Analyze the user's query and determine:\n\
             1. Which collections from the available ones are relevant\n\
             2. In what order they should be queried (optional, can be parallel)\n\
             3. What specific aspects to look for in each collection\n\n\
             For PR-related queries:\n\
             - When asked for files changed in the PR, look for the `files` list and extract `filename` \
             fields (likely in a code or PR data collection).\n\
             - For PR summaries, use `title`, `description`, and key changes from `files` (likely in a \
             PR data collection).\n\
             - For specific file diffs, locate the `files` item with matching `filename` and return the \
             `diff` (likely in a code collection).\n\n\
             Return your analysis as a JSON object with:\n\
             - collections: List of collections to query (MUST match exact names from the available collections)\n\
             - reasoning: Brief explanation of why each collection is needed\n\
             - search_focus: What to look for in each collection, including specific fields to examine\n\n\
             User Query: {query}\n\nAnalysis:",
            query = self.query,
        )
    }
}

/// Initial co-reviewer review summary prompt
pub struct InitialReviewPrompt<'a> {
    pub formatted_responses: &'a str,
    pub pr_metadata: &'a str,
    pub file_changes: &'a str,
}

impl InitialReviewPrompt<'_> {
    pub fn render(&self) -> String {
        format!(
            "You are a Code Review Assistant generating an initial review summary.\n\
             Your task is to create a structured code review summary based on the provided context.\n\n\
             Available Information (Extracted from PR data, code, requirements):\n\
             {responses}\n\n\
             Additional Context:\n\
             PR Metadata: {metadata}\n\
             File Changes: {files}\n\n\
             Instructions:\n\
             1. **Extract key details** (like PR number, title, author, status) from the PR Metadata section.\n\
             2. Generate a structured multi-aspect code review summary using this Markdown format:\n\
             ```markdown\n\
             ## Initial Code Review Summary: PR {{pr_number}} - {{pr_title}}\n\n\
             **Author:** {{extracted_author}}\n\
             **Status:** {{extracted_status}}\n\n\
             **1. Overview:**\n\
             [Briefly summarize the PR's purpose based on the description found in the available information.]\n\n\
             **2. Key Changes:**\n\
             [Summarize the main file changes and the nature of diffs based on the File Changes section. \
             Mention key added/modified files.]\n\n\
             **3. Potential Areas for Focus:**\n\
             [Based on the provided info, suggest 1-2 general areas the user might want to look closer at, \
             e.g., specific complex files, security aspects if mentioned, or major logic changes.]\n\n\
             **4. Next Steps:**\n\
             Please ask follow-up questions about specific files, logic, or concerns.\n\
             ```\n\
             3. **If certain information is missing, state that clearly instead of refusing.** Fill the \
             template fields with \"[Data not available]\" if specific data points are missing.\n\n\
             Initial Review Summary:",
            responses = self.formatted_responses,
            metadata = self.pr_metadata,
            files = self.file_changes,
        )
    }
}

/// Co-reviewer follow-up prompt
pub struct CoReviewerFollowUpPrompt<'a> {
    pub history: &'a str,
    pub formatted_responses: &'a str,
    pub pr_metadata: &'a str,
    pub file_changes: &'a str,
    pub query: &'a str,
}

impl CoReviewerFollowUpPrompt<'_> {
    pub fn render(&self) -> String {
        format!(
            "You are a Code Review Assistant in 'co_reviewer' mode, responding to a follow-up query.\n\
             Your task is to provide a concise, helpful answer based on the chat history and newly \
             retrieved information.\n\n\
             Chat History:\n{history}\n\n\
             Available New Information (Extracted for the latest query):\n{responses}\n\n\
             Additional Context:\n\
             PR Metadata: {metadata}\n\
             File Changes: {files}\n\n\
             User Query: {query}\n\n\
             Instructions:\n\
             1. Analyze the User Query in the context of the Chat History.\n\
             2. Use the Available New Information and Additional Context sections to answer the query.\n\
             3. If the query is about a specific file, check the File Changes section first.\n\
             4. Provide a clear, conversational response directly addressing the query. You may point \
             out related risks or improvements worth reviewing.\n\n\
             Assistant Response:",
            history = self.history,
            responses = self.formatted_responses,
            metadata = self.pr_metadata,
            files = self.file_changes,
            query = self.query,
        )
    }
}

/// Interactive assistant prompt: narrowly scoped answers only
pub struct InteractivePrompt<'a> {
    pub history: &'a str,
    pub formatted_responses: &'a str,
    pub query: &'a str,
}

impl InteractivePrompt<'_> {
    pub fn render(&self) -> String {
        format!(
            "You are an Interactive Code Assistant.\n\
             Your task is to provide helpful answers to the user's query based on the chat history and \
             newly retrieved information.\n\n\
             Chat History:\n{history}\n\n\
             Available New Information (Extracted for the latest query):\n{responses}\n\n\
             User Query: {query}\n\n\
             Instructions:\n\
             1. Analyze the User Query in the context of the Chat History.\n\
             2. Use the Available New Information section and the history to formulate your answer.\n\
             3. Provide a clear, conversational response. Answer only what was asked; do not volunteer \
             additional review commentary.\n\n\
             Assistant Response:",
            history = self.history,
            responses = self.formatted_responses,
            query = self.query,
        )
    }
}

/// Mode-specific system framing for the tool-calling orchestrator
pub struct AgentSystemPrompt<'a> {
    pub mode: Mode,
    pub capabilities_block: &'a str,
}

impl AgentSystemPrompt<'_> {
    pub fn render(&self) -> String {
        let framing = match self.mode {
            Mode::CoReviewer => {
                "You are an intelligent Code Review Assistant Agent in CO-REVIEWER mode. Your task is to \
                 help with code reviews by:\n\
                 1. Understanding the user's request in the context of a specific Pull Request\n\
                 2. Selecting appropriate tools to gather information about the PR\n\
                 3. Synthesizing responses that provide insightful code review feedback\n\n\
                 In CO-REVIEWER mode:\n\
                 - You are expected to be proactive about suggesting improvements\n\
                 - You should focus on code quality, best practices, and potential issues\n\
                 - Your responses should be structured and thorough\n\
                 - First messages should provide a comprehensive initial review"
            }
            Mode::InteractiveAssistant => {
                "You are an intelligent Code Review Assistant Agent in INTERACTIVE ASSISTANT mode. Your \
                 task is to help with code reviews by:\n\
                 1. Answering the user's specific questions about code\n\
                 2. Selecting appropriate tools to gather relevant information\n\
                 3. Synthesizing concise, focused responses that directly address queries\n\n\
                 In INTERACTIVE ASSISTANT mode:\n\
                 - You respond to user queries rather than proactively reviewing code\n\
                 - You provide targeted, specific answers to questions\n\
                 - Your responses should be concise and focused on the exact question asked\n\
                 - You only provide information that was explicitly requested"
            }
        };

        format!(
            "{framing}\n\n\
             Available Tools:\n{tools}\n\n\
             When responding:\n\
             1. First analyze the request\n\
             2. Determine which tools would be helpful\n\
             3. Use the tools to gather the information needed\n\
             4. Synthesize a response grounded in what the tools return\n\n\
             Tool Selection Format:\n\
             If you need to use tools, respond in this JSON format:\n\
             {{\n\
               \"reasoning\": \"Your reasoning for tool selection\",\n\
               \"tools\": [\n\
                 {{\n\
                   \"name\": \"tool_name\",\n\
                   \"parameters\": {{\n\
                     \"param1\": \"value1\"\n\
                   }}\n\
                 }}\n\
               ]\n\
             }}",
            tools = self.capabilities_block,
        )
    }
}

/// Per-turn request framing for the tool-calling orchestrator
pub struct AgentRequestPrompt<'a> {
    pub system: &'a str,
    pub request: &'a str,
    pub pr_id: &'a str,
    pub session_id: &'a str,
    pub history_exchanges: usize,
    pub mode: Mode,
    pub is_initial_request: bool,
}

impl AgentRequestPrompt<'_> {
    pub fn render(&self) -> String {
        format!(
            "{system}\n\n\
             User Request: {request}\n\n\
             Current Session Data:\n\
             - PR ID: {pr_id}\n\
             - Session ID: {session_id}\n\
             - Chat History: {exchanges} exchanges\n\
             - Mode: {mode}\n\
             - Is Initial Request: {initial}\n\n\
             Please analyze the request and determine which tools to use. Explain your reasoning.\n\
             Respond in the JSON format specified if you need to use tools.",
            system = self.system,
            request = self.request,
            pr_id = self.pr_id,
            session_id = self.session_id,
            exchanges = self.history_exchanges,
            mode = self.mode,
            initial = self.is_initial_request,
        )
    }
}

/// Final synthesis over collected capability outputs
pub struct AgentSynthesisPrompt<'a> {
    pub request: &'a str,
    pub responses: &'a [String],
    pub is_initial_request: bool,
}

impl AgentSynthesisPrompt<'_> {
    pub fn render(&self) -> String {
        let gathered = self.responses.join("\n");
        if self.is_initial_request {
            format!(
                "Based on the following information about the PR, provide a comprehensive initial code \
                 review summary:\n\n{gathered}\n\n\
                 Structure your response as follows:\n\
                 1. Overview: Summarize the PR's purpose and main changes\n\
                 2. Key Changes: List and describe the major file changes\n\
                 3. Potential Areas for Focus: Suggest areas that need attention\n\
                 4. Next Steps: Recommend what additional information would be helpful\n\n\
                 If you don't have enough information for a specific section, say so explicitly rather \
                 than making assumptions."
            )
        } else {
            format!(
                "User Request: {request}\n\n\
                 Based on the following information gathered:\n{gathered}\n\n\
                 Please provide a detailed response that addresses the user's request. If certain \
                 information is missing, acknowledge that and focus on what you can determine from the \
                 available data.",
                request = self.request,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_history_empty() {
        assert_eq!(format_history(&[]), "No history yet.");
    }

    #[test]
    fn test_format_history_roles() {
        let history = vec![
            ChatMessage::user("what changed?"),
            ChatMessage::assistant("two files"),
        ];
        let rendered = format_history(&history);
        assert_eq!(rendered, "user: what changed?\nassistant: two files");
    }

    #[test]
    fn test_format_responses_empty() {
        assert_eq!(format_responses(&[]), "No new information gathered.");
    }

    #[test]
    fn test_format_responses_blocks() {
        let results = vec![RetrievalResult {
            answer: "the diff adds retries".to_string(),
            sources: vec![],
            collection: "pr_1_code".to_string(),
        }];
        let rendered = format_responses(&results);
        assert!(rendered.starts_with("From pr_1_code:"));
        assert!(rendered.contains("the diff adds retries"));
    }

    #[test]
    fn test_planner_prompt_lists_exact_collections() {
        let collections = vec!["pr_9_pr_data".to_string(), "pr_9_code".to_string()];
        let prompt = PlannerPrompt {
            pr_id: "pr_9",
            available_collections: &collections,
            query: "what files changed?",
        }
        .render();

        assert!(prompt.contains("pr_9_pr_data, pr_9_code"));
        assert!(prompt.contains("\"files\" (list of dicts)"));
        assert!(prompt.contains("search_focus"));
        assert!(prompt.ends_with("Analysis:"));
    }

    #[test]
    fn test_initial_review_prompt_has_four_sections() {
        let prompt = InitialReviewPrompt {
            formatted_responses: "From pr_1_pr_data:\nadds retries",
            pr_metadata: "{}",
            file_changes: "[]",
        }
        .render();

        assert!(prompt.contains("**1. Overview:**"));
        assert!(prompt.contains("**2. Key Changes:**"));
        assert!(prompt.contains("**3. Potential Areas for Focus:**"));
        assert!(prompt.contains("**4. Next Steps:**"));
        assert!(prompt.contains("[Data not available]"));
    }

    #[test]
    fn test_interactive_prompt_scopes_narrowly() {
        let prompt = InteractivePrompt {
            history: "No history yet.",
            formatted_responses: "No new information gathered.",
            query: "which file has the parser?",
        }
        .render();

        assert!(prompt.contains("Answer only what was asked"));
        assert!(prompt.contains("which file has the parser?"));
    }

    #[test]
    fn test_agent_system_prompt_differs_by_mode() {
        let co = AgentSystemPrompt {
            mode: Mode::CoReviewer,
            capabilities_block: "- rag_search: ...",
        }
        .render();
        let ia = AgentSystemPrompt {
            mode: Mode::InteractiveAssistant,
            capabilities_block: "- rag_search: ...",
        }
        .render();

        assert!(co.contains("CO-REVIEWER"));
        assert!(ia.contains("INTERACTIVE ASSISTANT"));
        assert!(co.contains("\"tools\""));
        assert!(ia.contains("\"tools\""));
    }

    #[test]
    fn test_agent_synthesis_prompt_initial_structure() {
        let responses = vec!["from rag_search: adds retries".to_string()];
        let prompt = AgentSynthesisPrompt {
            request: "review this PR",
            responses: &responses,
            is_initial_request: true,
        }
        .render();
        assert!(prompt.contains("1. Overview"));
        assert!(prompt.contains("adds retries"));
    }
}
