//! Prompt templates for the two generation tasks.
//!
//! Retrieved chunk texts are joined with a blank line and inserted as the
//! context block. Markup passed to [`script_prompt`] is included in full and
//! is never used for retrieval.

/// Join retrieved chunk texts into one context block.
pub fn join_context(chunks: &[String]) -> String {
    chunks.join("\n\n")
}

/// Prompt asking for documentation-grounded test cases.
pub fn test_case_prompt(context: &str, request: &str) -> String {
    format!(
        r#"You are an expert QA engineer.
Using only the project documentation excerpts below, write thorough test cases for the request.

Documentation:
{context}

Request: {request}

Output format:
A Markdown list of test cases. Every test case must include:
- Test ID
- Feature
- Test Scenario
- Expected Result
- Grounded In (the document or rule the case is based on)

Base every test case strictly on the documentation above. Do not invent features.
"#
    )
}

/// Prompt asking for a runnable Selenium script for one test case.
pub fn script_prompt(test_case: &str, html: &str, context: &str) -> String {
    format!(
        r#"You are an expert Selenium automation engineer writing Python.

Task: write a robust, runnable Selenium Python script for the test case below.

Test case:
{test_case}

Target page HTML:
{html}

Relevant documentation:
{context}

Requirements:
1. Use `webdriver.Chrome()` and assume chromedriver is on PATH.
2. Use explicit waits (`WebDriverWait`) for stability.
3. Choose selectors (ID, CSS, XPath) that exist in the HTML above.
4. Assert the expected result of the test case.
5. The script must be complete and runnable.
6. Handle likely failures gracefully.

Output only the Python code block.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_context() {
        let ctx = join_context(&["first".to_string(), "second".to_string()]);
        assert_eq!(ctx, "first\n\nsecond");
        assert_eq!(join_context(&[]), "");
    }

    #[test]
    fn test_test_case_prompt_contains_context_and_request() {
        let p = test_case_prompt("SAVE15 gives 15% off", "discount code");
        assert!(p.contains("Documentation:\nSAVE15 gives 15% off\n"));
        assert!(p.contains("Request: discount code"));
        assert!(p.contains("Grounded In"));
    }

    #[test]
    fn test_script_prompt_contains_all_parts() {
        let html = "<form id=\"checkout\"><button id=\"pay\">Pay</button></form>";
        let p = script_prompt("TC-001: pay with valid card", html, "Pay button must be green");
        assert!(p.contains("TC-001: pay with valid card"));
        assert!(p.contains(html));
        assert!(p.contains("Pay button must be green"));
    }
}
