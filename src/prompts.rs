//! Field prompts for the model-assisted extraction path.

use crate::schema::{Field, Page};

/// Contract text beyond this many characters is not sent to the model.
pub const MAX_CONTEXT_CHARS: usize = 12_000;

const ANSWER_FORMAT: &str = "Answer on a single line. If you can tell which page the answer comes from, \
append it as `ANSWER ||| PAGE=<N>`; otherwise append `||| PAGE=UNKNOWN`.";

/// Output token budget for one field's completion.
pub fn max_output_tokens(field: Field) -> u32 {
    match field {
        Field::StartDate | Field::TerminationNoticePeriod => 50,
        Field::EndDate | Field::RenewalTerms => 150,
    }
}

/// Field-specific instructions.
fn instructions(field: Field) -> &'static str {
    match field {
        Field::StartDate => {
            "You are an expert contract analyst. Read the following contract text and find the start date or term.\n\
             - If a specific start date is mentioned (e.g., 'October 31, 2010'), respond with ONLY that date in 'Month Day, Year' format.\n\
             - If the start date is described as a term (e.g., 'one year from the effective date'), respond with that exact term.\n\
             - If no start date or term is mentioned, respond with 'Not Found'."
        }
        Field::EndDate => {
            "You are an expert contract analyst. Read the following contract text and find the end date or term.\n\
             - If a specific end date is mentioned (e.g., 'October 31, 2010'), respond with ONLY that date in 'Month Day, Year' format.\n\
             - If the end date is described as a term (e.g., 'one year from the effective date'), respond with that exact term.\n\
             - If no end date or term is mentioned, respond with 'Not Found'."
        }
        Field::RenewalTerms => {
            "You are an expert contract analyst. Read the following contract text and analyze the renewal terms. \
             Provide a very concise, one-sentence summary of the renewal terms.\n\
             - If the contract specifies how it renews (e.g., automatically, by mutual agreement), summarize that. \
             For example: 'Renews upon mutual written agreement.' or 'Automatically renews for 1-year periods unless 90 days notice is given.'\n\
             - If the contract is silent on renewal, respond with 'No renewal terms specified'."
        }
        Field::TerminationNoticePeriod => {
            "You are an expert contract analyst. Read the following contract text and analyze the termination notice period. \
             Provide a concise, one-sentence summary of the termination notice period.\n\
             - If a specific notice period is mentioned, state it clearly (e.g., '30 days written notice').\n\
             - If no general notice period is specified, but there are conditions for immediate termination, summarize that \
             (e.g., 'Not specified for general termination, but allows for immediate termination in cases of bankruptcy').\n\
             - If no termination notice period is mentioned at all, respond with 'Not specified'."
        }
    }
}

/// Page-tagged contract text, cut at `max_chars` on a char boundary.
pub fn page_tagged_context(pages: &[Page], max_chars: usize) -> String {
    let tagged = pages
        .iter()
        .filter(|p| !p.text.trim().is_empty())
        .map(|p| format!("--- Page {} ---\n{}", p.page_number, p.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_for_context(&tagged, max_chars).to_string()
}

/// Full prompt for `field` over the given document context.
pub fn build_prompt(field: Field, context: &str) -> String {
    format!(
        "{}\n{}\n\nContract Text:\n{}",
        instructions(field),
        ANSWER_FORMAT,
        context
    )
}

fn truncate_for_context(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
