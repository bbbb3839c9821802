//! Dynamic system prompt construction.
//!
//! When a turn may use tools, the agent's base prompt is extended with a
//! generated preamble describing each available tool: name, description,
//! and usage hints. Hints come from a curated table for the built-ins and
//! are generated from the schema for everything else.

use agentry_core::tool::{ToolRegistry, ToolSchema};

/// Base prompt used when the agent has none of its own and tools are in play.
pub const TOOL_ENABLED_PROMPT: &str = "\
You are a helpful AI assistant with access to external tools. When you need \
to perform specific tasks that you have tools for, you MUST use the \
appropriate tools rather than trying to do the work manually.

IMPORTANT TOOL USAGE RULES:
1. Always use tools when they are available for the task at hand
2. Don't perform calculations manually if you have a calculator tool
3. Don't guess at information if you have tools to fetch it
4. Explain what tool you're using and why

Available tools will be described below. Pay attention to when each tool \
should be used.";

/// Curated usage hints for the built-in tools.
fn usage_hint(tool_name: &str) -> Option<&'static str> {
    match tool_name {
        "calculator" => Some(
            "CALCULATOR TOOL USAGE:\n\
             - Use for ANY mathematical calculation, even simple addition\n\
             - Supported: +, -, *, /, ^, sqrt(n), abs(n), parentheses\n\
             - Example: to calculate 15 * 23, call calculator with \"15 * 23\"",
        ),
        "http_get" => Some(
            "HTTP GET TOOL USAGE:\n\
             - Use to fetch data from web APIs and URLs\n\
             - Can retrieve JSON data, HTML content, or plain text\n\
             - Add custom headers if needed for API authentication",
        ),
        "http_post" => Some(
            "HTTP POST TOOL USAGE:\n\
             - Use to send data to web APIs via POST requests\n\
             - Include proper Content-Type headers\n\
             - Use for API interactions that require data submission",
        ),
        "text_processor" => Some(
            "TEXT PROCESSOR TOOL USAGE:\n\
             - Use for text manipulation and analysis operations\n\
             - Operations: uppercase, lowercase, title_case, word_count, char_count, \
             reverse, trim, extract_emails, extract_urls\n\
             - Always specify both \"text\" and \"operation\" parameters",
        ),
        "json_processor" => Some(
            "JSON PROCESSOR TOOL USAGE:\n\
             - Use for JSON data manipulation and analysis\n\
             - Operations: validate, pretty_print, minify, extract_keys, get_value\n\
             - For get_value, specify a \"path\" parameter (e.g. \"user.name\")",
        ),
        _ => None,
    }
}

/// Generate parameter-level usage text from a schema, for tools without a
/// curated hint.
fn generate_basic_usage(schema: &ToolSchema) -> String {
    let mut usage = String::from("Parameters:\n");

    for param in &schema.parameters {
        let required = if param.required { "required" } else { "optional" };
        usage.push_str(&format!(
            "  - {} ({}, {}): {}\n",
            param.name, param.param_type, required, param.description
        ));
    }

    if !schema.examples.is_empty() {
        usage.push_str("Examples:\n");
        for example in &schema.examples {
            usage.push_str(&format!("  - {}\n", example.description));
        }
    }

    usage
}

/// Build the full system prompt for a tool-enabled turn.
///
/// Starts from the agent's base prompt (or [`TOOL_ENABLED_PROMPT`] when
/// empty) and appends a description block for every named tool that exists
/// in the registry.
pub fn build_system_prompt(base_prompt: &str, registry: &ToolRegistry, tools: &[String]) -> String {
    let mut prompt = String::new();
    if base_prompt.is_empty() {
        prompt.push_str(TOOL_ENABLED_PROMPT);
    } else {
        prompt.push_str(base_prompt);
    }
    prompt.push_str("\n\n");

    if !tools.is_empty() {
        prompt.push_str("=== AVAILABLE TOOLS ===\n");
        prompt.push_str("You have access to the following tools. Use them whenever appropriate:\n\n");

        for tool_name in tools {
            let Some(tool) = registry.get(tool_name) else {
                continue;
            };
            let schema = tool.schema();
            prompt.push_str(&format!("**{}**: {}\n", schema.name, schema.description));

            match usage_hint(tool_name) {
                Some(hint) => {
                    prompt.push_str(hint);
                    prompt.push_str("\n\n");
                }
                None => {
                    prompt.push_str(&generate_basic_usage(&schema));
                    prompt.push('\n');
                }
            }
        }

        prompt.push_str("=== TOOL USAGE REMINDER ===\n");
        prompt.push_str("- ALWAYS use tools when they match the task requirements\n");
        prompt.push_str("- Don't perform manual work that tools can do\n");
        prompt.push_str("- Explain which tool you're using and why\n");
        prompt.push_str("- Use multiple tools if needed to complete complex tasks\n");
    }

    prompt
}
