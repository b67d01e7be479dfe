//! Prompt constants for the daily report.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever prompt content changes.
//! The version is logged with every cycle so a change in report shape can be
//! traced back to the prompt that produced it.

use report_pipeline::NO_UPDATE_PLACEHOLDER;

/// Prompt version. Bump on any prompt content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Section titles, in the order the report must list them.
pub const SECTION_TITLES: [&str; 7] = [
    "New Turkish game releases and developer announcements",
    "Turkish game market trends and sales data",
    "Game jams in Turkey or with Turkish participants",
    "Community opinions from Turkish Twitch and YouTube creators",
    "Technological developments impacting the Turkish gaming industry",
    "Relevant RSS feed highlights",
    "Currently popular Turkish games in the Turkish gaming market",
];

/// Sources the model is allowed to cite.
pub const ALLOWED_SOURCES: [&str; 14] = [
    "GamesIndustry.biz",
    "IGN",
    "Game Developer",
    "Kotaku",
    "Polygon",
    "SteamDB",
    "Steam Charts",
    "Global Game Jam",
    "Istanbul Game Festival",
    "Turkish Game Developer Conference",
    "Twitch (Turkish streamers)",
    "YouTube (Turkish gaming creators)",
    "Newzoo",
    "VRFocus",
];

/// Message sent when the report did not change since the last cycle.
pub const NO_NEWS_MESSAGE: &str = "No new developments today.";

fn numbered_titles() -> String {
    SECTION_TITLES
        .iter()
        .enumerate()
        .map(|(i, title)| format!("{}) {}", i + 1, title))
        .collect::<Vec<_>>()
        .join("\n")
}

/// System prompt: report structure, sourcing rules, and the no-update sentence.
pub fn system_prompt() -> String {
    let sources = ALLOWED_SOURCES
        .iter()
        .map(|s| format!("- {s}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "\
You are a research assistant focusing exclusively on the Turkish game development ecosystem.

Your task is to generate a detailed and structured report in exactly {count} numbered sections:

{titles}

Instructions for all sections:

- Include at least 10 unique and detailed items (news, events, statistics).
- Every item must include a source in this format: (Source: Name or URL).
- Use only the sources listed below. Do not guess any information.
- Do not add explanations, analysis, or personal commentary. Only the structured report.
- Use today's date for all findings.
- If a section has no updates, write: \"{placeholder}\"
- In section 7, include download counts within Turkey where available.
- Do not repeat the same item across multiple sections.

You may use content only from the following sources:

{sources}

Your response must include all {count} sections in full, numbered and titled as above.
Return the report only, with no introduction and no closing note.",
        count = SECTION_TITLES.len(),
        titles = numbered_titles(),
        placeholder = NO_UPDATE_PLACEHOLDER,
        sources = sources,
    )
}

/// User query restating the required format.
pub fn user_query() -> String {
    format!(
        "\
Generate a detailed, structured report in {count} numbered sections:

{titles}

Each section must begin on its own line with its number and title exactly as listed, \
followed by your findings.
If there is no new information in a section, write: '{placeholder}'

Respond with the complete {count}-section report in one single output. \
Do not stop midway.",
        count = SECTION_TITLES.len(),
        titles = numbered_titles(),
        placeholder = NO_UPDATE_PLACEHOLDER,
    )
}
