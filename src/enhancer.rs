//! Query enhancement.
//!
//! Appends a short instruction to the analyst's query, picked by keyword,
//! nudging the model toward the tools that fit the question. Rules are
//! checked in order and the first match wins; a query that matches nothing
//! gets a generic suffix.

struct Rule {
    keywords: &'static [&'static str],
    suffix: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        keywords: &["all available tools", "use all tools"],
        suffix: "IMPORTANT: You MUST use ALL 5 core analysis tools for comprehensive analysis. \
                 Call these tools in this EXACT order: 1) get_network_summary with duration=300, \
                 2) list_connections, 3) get_packet_drop_summary with duration=300, \
                 4) list_packet_drops (MANDATORY even if no drops found), \
                 5) analyze_patterns with duration=300. Do not skip ANY tools. \
                 Each tool provides unique data.",
    },
    Rule {
        keywords: &["comprehensive", "complete analysis"],
        suffix: "Please use multiple tools (at least get_network_summary, list_connections, \
                 get_packet_drop_summary, and analyze_patterns) to provide comprehensive data.",
    },
    Rule {
        keywords: &["summary", "summarize", "overview"],
        suffix: "Please use multiple network analysis tools including get_network_summary, \
                 list_connections, and get_packet_drop_summary to provide comprehensive data.",
    },
    Rule {
        keywords: &["drop", "loss", "packet"],
        suffix: "Please check for packet drops and analyze any connectivity issues using \
                 get_packet_drop_summary and list_packet_drops tools.",
    },
    Rule {
        keywords: &["pattern", "behavior", "behaviour"],
        suffix: "Please analyze connection patterns using get_network_summary, list_connections, \
                 and analyze_patterns tools.",
    },
    Rule {
        keywords: &["connection", "network"],
        suffix: "Please gather network connection data using get_network_summary and \
                 list_connections tools, then analyze the results.",
    },
];

const GENERIC_SUFFIX: &str = "Please use appropriate network analysis tools (at least 2-3 \
                              different tools) to gather relevant data before providing insights.";

/// Return `query` with the matching instructional suffix appended.
pub fn enhance_query(query: &str) -> String {
    format!("{}\n\n{}", query, suffix_for(query))
}

fn suffix_for(query: &str) -> &'static str {
    let lowered = query.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| lowered.contains(k)))
        .map(|rule| rule.suffix)
        .unwrap_or(GENERIC_SUFFIX)
}
