//! Parsers for the pipe-delimited output contracts.
//!
//! The provider returns free text ending in pipe blocks. Parsing is
//! tolerant by taking the text after the *last* occurrence of each marker,
//! and every parser has a spec'd fallback: selection defaults to the first
//! candidate, extraction failures surface as `None` and the caller
//! substitutes its default.

/// Text after the last occurrence of `marker`.
fn after_last<'a>(content: &'a str, marker: &str) -> Option<&'a str> {
    let index = content.rfind(marker)?;
    Some(&content[index + marker.len()..])
}

fn first_segment(content: &str) -> &str {
    content.split('|').next().unwrap_or(content).trim()
}

fn parse_int_segment(content: &str) -> Option<i64> {
    let cleaned: String = content
        .replace('|', " ")
        .chars()
        .skip_while(|c| !c.is_ascii_digit() && *c != '-')
        .take_while(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    cleaned.parse().ok()
}

/// `| BEST OUTPUT | <k> |`, defaulting to 1 on any parse failure.
pub fn best_output(content: &str) -> usize {
    after_last(content, "BEST OUTPUT |")
        .and_then(parse_int_segment)
        .filter(|k| *k >= 1)
        .map(|k| k as usize)
        .unwrap_or(1)
}

/// `| Final Output | <task> | Value of Task | <value> |`
pub fn final_output(content: &str) -> Option<(String, u64)> {
    let task = first_segment(after_last(content, "Final Output |")?);
    let value = after_last(content, "| Value of Task |").and_then(parse_int_segment)?;
    if task.is_empty() || value < 0 {
        return None;
    }
    Some((task.to_string(), value as u64))
}

/// `| Reward | <n> |` and `| Justification | <text> |`
pub fn initiation_judgment(content: &str) -> Option<(u64, String)> {
    let reward = after_last(content, "| Reward |").and_then(parse_int_segment)?;
    let justification = first_segment(after_last(content, "| Justification |")?);
    if reward < 0 || justification.is_empty() {
        return None;
    }
    Some((reward as u64, justification.to_string()))
}

/// `| Verifying Question | <q> |`
pub fn verifying_question(content: &str) -> Option<String> {
    let question = after_last(content, "Verifying Question |")?
        .replace('|', " ")
        .trim()
        .to_string();
    (!question.is_empty()).then_some(question)
}

/// `| Summary Judgment | <s> |` and `| Total PFT Rewarded | <n> |`
pub fn reward_judgment(content: &str) -> Option<(i64, String)> {
    let total = after_last(content, "| Total PFT Rewarded |").and_then(parse_int_segment)?;
    let summary = first_segment(after_last(content, "| Summary Judgment |")?);
    (!summary.is_empty()).then(|| (total, summary.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_output_parses_and_defaults() {
        assert_eq!(best_output("reasoning...\n| BEST OUTPUT | 2 |"), 2);
        assert_eq!(best_output("| BEST OUTPUT | 3 "), 3);
        assert_eq!(best_output("no marker at all"), 1);
        assert_eq!(best_output("| BEST OUTPUT | garbage |"), 1);
        // Last occurrence wins when the model repeats itself.
        assert_eq!(
            best_output("| BEST OUTPUT | 1 | ... | BEST OUTPUT | 3 |"),
            3
        );
    }

    #[test]
    fn final_output_extracts_task_and_value() {
        let content = "thinking...\n| Final Output | Write report outline covering X and Y. |\n| Value of Task | 60 |";
        let (task, value) = final_output(content).unwrap();
        assert_eq!(task, "Write report outline covering X and Y.");
        assert_eq!(value, 60);
        assert!(final_output("no pipes here").is_none());
    }

    #[test]
    fn initiation_judgment_extracts_both_fields() {
        let content = "discussion\n| Justification | concise, concrete |\n| Reward | 25 |";
        let (reward, justification) = initiation_judgment(content).unwrap();
        assert_eq!(reward, 25);
        assert_eq!(justification, "concise, concrete");
        assert!(initiation_judgment("| Reward | x |").is_none());
    }

    #[test]
    fn verifying_question_trims_pipes() {
        assert_eq!(
            verifying_question("| Verifying Question | show me X |").unwrap(),
            "show me X"
        );
        assert!(verifying_question("nothing").is_none());
    }

    #[test]
    fn reward_judgment_extracts_summary_and_total() {
        let content = "analysis\n| Summary Judgment | good | Total PFT Rewarded | 45 |";
        let (total, summary) = reward_judgment(content).unwrap();
        assert_eq!(total, 45);
        assert_eq!(summary, "good");
    }

    #[test]
    fn reward_judgment_separate_lines() {
        let content =
            "| Summary Judgment | solid work, verified |\n| Total PFT Rewarded | 120 |";
        let (total, summary) = reward_judgment(content).unwrap();
        assert_eq!(total, 120);
        assert_eq!(summary, "solid work, verified");
    }
}
