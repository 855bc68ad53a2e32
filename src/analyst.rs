//! The network analyst.
//!
//! An `Analyst` is a conversation configured by a profile: the system
//! prompt it starts from and how many tools it asks the model to use. On
//! top of free-form questions it offers a few canned analyses (a single
//! process, overall health, a run over every tool).

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::conversation::Conversation;
use crate::enhancer::enhance_query;
use crate::error::AnalystError;
use crate::types::{Message, Role};

pub const NETWORK_ANALYST_PROMPT: &str = "\
You are an expert network connectivity analyst with access to real-time network telemetry tools. Your role is to:

1. Analyze network behavior: connection patterns, frequencies and destinations.
2. Identify issues: anomalies, packet drops and connectivity problems.
3. Provide insights: actionable recommendations for optimization and monitoring.

Available tools:
- get_network_summary: aggregated connection statistics for processes
- list_connections: detailed connection events
- get_packet_drop_summary: packet loss patterns
- list_packet_drops: individual drop events
- analyze_patterns: automated pattern analysis

Start with get_network_summary for overall network health, then gather detail with the other tools. \
Check list_packet_drops even when the drop summary reports no drops. \
Each tool provides insights the others cannot, so gather data from several sources before answering.";

/// How strongly the model is asked to use tools.
///
/// The minimum is advisory: it is written into the system prompt, and a
/// warning is logged when an answer used fewer tools, but the answer is
/// still accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolUsagePolicy {
    pub min_tool_calls: u32,
}

impl ToolUsagePolicy {
    fn prompt_clause(&self) -> Option<String> {
        match self.min_tool_calls {
            0 => None,
            1 => Some("Use at least one tool before answering any analysis question.".to_string()),
            n => Some(format!(
                "For any analysis question, use at least {} different tools before answering. \
                 Never rely on a single tool.",
                n
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalystProfile {
    pub system_prompt: String,
    pub tool_usage: ToolUsagePolicy,
}

impl AnalystProfile {
    pub fn network(min_tool_calls: u32) -> Self {
        Self {
            system_prompt: NETWORK_ANALYST_PROMPT.to_string(),
            tool_usage: ToolUsagePolicy { min_tool_calls },
        }
    }

    /// The full system message: base prompt plus the tool usage clause.
    pub fn render(&self) -> String {
        match self.tool_usage.prompt_clause() {
            Some(clause) => format!("{}\n\n{}", self.system_prompt.trim_end(), clause),
            None => self.system_prompt.clone(),
        }
    }
}

/// What `analyze_process` should look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessTarget {
    Name(String),
    Pid(u32),
    All,
}

pub struct Analyst {
    conversation: Conversation,
    profile: AnalystProfile,
    enhance_queries: bool,
}

impl Analyst {
    pub fn new(conversation: Conversation, profile: AnalystProfile) -> Self {
        let mut analyst = Self {
            conversation,
            profile,
            enhance_queries: true,
        };
        analyst.start_new_conversation();
        analyst
    }

    pub fn with_query_enhancement(mut self, enabled: bool) -> Self {
        self.enhance_queries = enabled;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Answer a free-form question, enhancing it first when enabled.
    pub async fn analyze(
        &mut self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AnalystError> {
        let message = if self.enhance_queries {
            enhance_query(query)
        } else {
            query.to_string()
        };
        self.run(&message, cancel).await
    }

    /// Send a follow-up message as-is.
    pub async fn continue_conversation(
        &mut self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AnalystError> {
        self.run(message, cancel).await
    }

    pub async fn analyze_process(
        &mut self,
        target: &ProcessTarget,
        duration_secs: u32,
        cancel: &CancellationToken,
    ) -> Result<String, AnalystError> {
        let subject = match target {
            ProcessTarget::Name(name) => format!("the network behavior of process '{}'", name),
            ProcessTarget::Pid(pid) => format!("the network behavior of process ID {}", pid),
            ProcessTarget::All => "overall network activity".to_string(),
        };
        let query = format!(
            "Please analyze {} over the last {} seconds. I want to understand its connection \
             patterns, any issues, and optimization opportunities.",
            subject, duration_secs
        );
        self.analyze(&query, cancel).await
    }

    pub async fn network_health(
        &mut self,
        duration_secs: u32,
        cancel: &CancellationToken,
    ) -> Result<String, AnalystError> {
        let query = format!(
            "Please provide a comprehensive network health assessment over the last {} seconds. \
             Include:\n\n\
             1. Connection summary and patterns\n\
             2. Any packet drops or connectivity issues\n\
             3. Overall network performance indicators\n\
             4. Specific recommendations for improvement\n\
             5. Any security concerns or anomalies\n\n\
             Use all relevant tools to gather complete data for this analysis.",
            duration_secs
        );
        self.analyze(&query, cancel).await
    }

    pub async fn comprehensive_analysis(
        &mut self,
        duration_secs: u32,
        cancel: &CancellationToken,
    ) -> Result<String, AnalystError> {
        let query = format!(
            "COMPREHENSIVE ANALYSIS REQUEST: Analyze network activity over the last {} seconds \
             using ALL available tools.\n\n\
             Call get_network_summary, list_connections, get_packet_drop_summary, \
             list_packet_drops and analyze_patterns, in that order.\n\n\
             After gathering all data, provide:\n\
             - Overall network health assessment\n\
             - Connection pattern analysis\n\
             - Performance issues and recommendations\n\
             - Security observations\n\
             - Optimization suggestions",
            duration_secs
        );
        self.analyze(&query, cancel).await
    }

    /// Clear the history and re-apply the profile's system prompt.
    pub fn start_new_conversation(&mut self) {
        self.conversation.clear();
        self.conversation.add_system_message(self.profile.render());
    }

    pub fn history(&self) -> &[Message] {
        self.conversation.history()
    }

    async fn run(&mut self, message: &str, cancel: &CancellationToken) -> Result<String, AnalystError> {
        let start = self.conversation.history().len();
        let answer = self.conversation.process_message(message, cancel).await?;

        let tools_used = self.conversation.history()[start..]
            .iter()
            .filter(|m| m.role == Role::Tool)
            .count();
        let advised = self.profile.tool_usage.min_tool_calls as usize;
        if tools_used < advised && !self.conversation.functions().is_empty() {
            warn!(tools_used, advised, "Answer used fewer tools than the profile advises");
        } else {
            info!(tools_used, "Analysis complete");
        }

        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::tests::{calls, text, ScriptedTransport};
    use crate::tools::manager::tests::{call, declaration, ScriptedExecutor};
    use crate::tools::FunctionCallManager;
    use std::sync::Arc;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    fn analyst(transport: Arc<ScriptedTransport>, min_tool_calls: u32) -> Analyst {
        let executor = Arc::new(
            ScriptedExecutor::default()
                .with("get_summary", Ok("12 events"))
                .with("list_events", Err("connection refused")),
        );
        let functions = FunctionCallManager::new(
            vec![declaration("get_summary"), declaration("list_events")],
            executor,
        );
        let conversation = Conversation::new(transport, Arc::new(functions), "gpt-4o-mini");
        Analyst::new(conversation, AnalystProfile::network(min_tool_calls))
    }

    #[test]
    fn test_profile_render() {
        let rendered = AnalystProfile::network(3).render();
        assert!(rendered.starts_with("You are an expert network connectivity analyst"));
        assert!(rendered.ends_with("use at least 3 different tools before answering. Never rely on a single tool."));
        assert_eq!(AnalystProfile::network(0).render(), NETWORK_ANALYST_PROMPT);
    }

    #[test]
    fn test_new_analyst_starts_with_system_prompt() {
        let analyst = analyst(Arc::new(ScriptedTransport::default()), 3);
        assert_eq!(analyst.history().len(), 1);
        assert_eq!(analyst.history()[0].role, Role::System);
    }

    #[test]
    fn test_analyze_enhances_and_runs_tools() {
        rt().block_on(async {
            let transport = Arc::new(ScriptedTransport::new(vec![
                calls(vec![call("a", "get_summary", "{}"), call("b", "list_events", "{}")]),
                text("Activity: 12 events; note: listing unavailable."),
            ]));
            let mut analyst = analyst(transport.clone(), 2);

            let answer = analyst
                .analyze("summarize network activity", &CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(answer, "Activity: 12 events; note: listing unavailable.");
            let user = &analyst.history()[1];
            assert_eq!(user.role, Role::User);
            assert!(user.text().starts_with("summarize network activity\n\n"));
            assert!(user.text().contains("get_network_summary"));
            // system + user + assistant(calls) + 2 tool results + final
            assert_eq!(analyst.history().len(), 6);
        });
    }

    #[test]
    fn test_continue_conversation_is_not_enhanced() {
        rt().block_on(async {
            let transport = Arc::new(ScriptedTransport::new(vec![text("sure")]));
            let mut analyst = analyst(transport, 0);
            analyst
                .continue_conversation("and the drops?", &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(analyst.history()[1].text(), "and the drops?");
        });
    }

    #[test]
    fn test_disabled_enhancement() {
        rt().block_on(async {
            let transport = Arc::new(ScriptedTransport::new(vec![text("ok")]));
            let mut analyst = analyst(transport, 0).with_query_enhancement(false);
            analyst.analyze("network summary", &CancellationToken::new()).await.unwrap();
            assert_eq!(analyst.history()[1].text(), "network summary");
        });
    }

    #[test]
    fn test_analyze_process_targets() {
        rt().block_on(async {
            let transport = Arc::new(ScriptedTransport::new(vec![text("a"), text("b"), text("c")]));
            let mut analyst = analyst(transport.clone(), 0);
            let token = CancellationToken::new();

            analyst
                .analyze_process(&ProcessTarget::Name("curl".to_string()), 60, &token)
                .await
                .unwrap();
            analyst.analyze_process(&ProcessTarget::Pid(4242), 120, &token).await.unwrap();
            analyst.analyze_process(&ProcessTarget::All, 30, &token).await.unwrap();

            let users: Vec<&Message> =
                analyst.history().iter().filter(|m| m.role == Role::User).collect();
            assert!(users[0].text().contains("process 'curl' over the last 60 seconds"));
            assert!(users[1].text().contains("process ID 4242 over the last 120 seconds"));
            assert!(users[2].text().contains("overall network activity over the last 30 seconds"));
        });
    }

    #[test]
    fn test_canned_analyses_mention_duration() {
        rt().block_on(async {
            let transport = Arc::new(ScriptedTransport::new(vec![text("healthy"), text("full")]));
            let mut analyst = analyst(transport, 0);
            let token = CancellationToken::new();

            assert_eq!(analyst.network_health(300, &token).await.unwrap(), "healthy");
            assert_eq!(analyst.comprehensive_analysis(600, &token).await.unwrap(), "full");

            let history = analyst.history();
            assert!(history[1].text().contains("last 300 seconds"));
            assert!(history[3].text().starts_with("COMPREHENSIVE ANALYSIS REQUEST"));
            assert!(history[3].text().contains("last 600 seconds"));
        });
    }

    #[test]
    fn test_start_new_conversation_resets_history() {
        rt().block_on(async {
            let transport = Arc::new(ScriptedTransport::new(vec![text("ok")]));
            let mut analyst = analyst(transport, 3);
            analyst.analyze("hello", &CancellationToken::new()).await.unwrap();
            assert_eq!(analyst.history().len(), 3);

            analyst.start_new_conversation();
            assert_eq!(analyst.history().len(), 1);
            assert_eq!(analyst.history()[0].text(), AnalystProfile::network(3).render());
        });
    }
}
