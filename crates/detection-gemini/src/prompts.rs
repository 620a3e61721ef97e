//! Prompt template for detection reviews

use detection_core::models::DetectionConfig;

/// Opening instructions sent ahead of every detection
pub const REVIEW_INSTRUCTIONS: &str = "I am a cyber security detection engineer developing a new detection using Spark SQL for Databricks to search across a cyber data lake. Review the detection below and give me the three most insightful pieces of feedback you can to improve its coverage and quality and maximize true positive outcomes.

Evaluate it for:
- Coverage: attacker behaviours or variants the search would miss.
- False positive rate: benign activity likely to match, and how to exclude it.
- Query efficiency: how to make the search cheaper or faster on the source table.
- Title clarity: whether the title says plainly what is detected.";

/// Shape of the answer we ask for
pub const RESPONSE_INSTRUCTIONS: &str = "Return exactly three numbered suggestions. Start each one with the area it addresses in brackets, for example [Coverage], and keep each under two sentences. Include a revised title or SQL search where it helps.";

/// Build the single prompt sent for a detection
///
/// Field values are inserted verbatim.
pub fn build_detection_prompt(config: &DetectionConfig) -> String {
    let mut prompt = String::new();

    prompt.push_str(REVIEW_INSTRUCTIONS);
    prompt.push_str("\n\n## Detection\n");
    prompt.push_str(&format!("Title: {}\n", config.title()));
    prompt.push_str(&format!("Description: {}\n", config.description()));
    prompt.push_str(&format!("Source log table: {}\n", config.source_table()));
    prompt.push_str("SQL search:\n```sql\n");
    prompt.push_str(config.sql_search());
    prompt.push_str("\n```\n\n");
    prompt.push_str(RESPONSE_INSTRUCTIONS);
    prompt.push('\n');

    prompt
}
