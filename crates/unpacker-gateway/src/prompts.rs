//! Prompt wording.
//!
//! The core hands over a task tag and a JSON context; this module turns them
//! into a system line and a user message. Every task asks for JSON on the
//! 0-100 scale the core validates against.

use serde_json::Value;
use unpacker_core::{Prompt, Task};

const JSON_ONLY: &str = "Return ONLY valid JSON, no other text.";

/// A rendered prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub system: String,
    pub user: String,
}

/// Render a prompt for its task.
pub fn render(prompt: &Prompt) -> Rendered {
    let ctx = &prompt.context;
    let user = match prompt.task {
        Task::GenerateIdeas => generate_ideas(ctx),
        Task::ScoreIdea => score_idea(ctx),
        Task::FormatCriteria => format_criteria(ctx),
        Task::Draft => draft(ctx),
        Task::Evaluate => evaluate(ctx),
        Task::DiagnoseFailure => diagnose(ctx),
    };
    Rendered {
        system: system_line(prompt.task).to_string(),
        user,
    }
}

fn system_line(task: Task) -> &'static str {
    match task {
        Task::GenerateIdeas => "You find underexplored angles on a topic and name who wrote about them.",
        Task::ScoreIdea => "You are a strict judge of originality.",
        Task::FormatCriteria => "You design the form a short piece of writing should take.",
        Task::Draft => "You write short, dense pieces under a hard word limit.",
        Task::Evaluate => "You are a harsh but fair editor.",
        Task::DiagnoseFailure => "You explain why an iterative writing process stalled.",
    }
}

fn text<'a>(ctx: &'a Value, key: &str) -> &'a str {
    ctx.get(key).and_then(Value::as_str).unwrap_or("")
}

fn optional_line(label: &str, value: &str) -> String {
    if value.trim().is_empty() {
        String::new()
    } else {
        format!("{label}: {value}\n")
    }
}

fn bullets(items: Option<&Value>) -> String {
    items
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| format!("- {s}\n"))
                .collect()
        })
        .unwrap_or_default()
}

fn idea_block(ctx: &Value) -> String {
    let idea = ctx.get("idea").unwrap_or(&Value::Null);
    format!(
        "Idea: {}\nDescription: {}\n{}{}",
        text(idea, "name"),
        text(idea, "description"),
        optional_line("Why underexplored", text(idea, "why_underexplored")),
        optional_line("Source", text(idea, "source")),
    )
}

fn generate_ideas(ctx: &Value) -> String {
    format!(
        "Given this topic and intent, generate 4-5 underexplored angles.\n\n\
         Topic: {}\n{}{}\n\
         Requirements:\n\
         - At least 3 ideas must reference specific authors or thinkers who wrote about related concepts\n\
         - 1-2 ideas can be your own synthesis (mark them model-generated)\n\
         - Focus on angles that are NOT mainstream\n\n\
         Return a JSON array:\n\
         [{{\"name\": \"short angle name\", \"description\": \"one sentence\", \
         \"why_underexplored\": \"one sentence\", \"source\": \"Author Name or model-generated\", \
         \"model_generated\": false}}]\n\n{JSON_ONLY}",
        text(ctx, "topic"),
        optional_line("Intent", text(ctx, "intent")),
        optional_line("Outline", text(ctx, "outline")),
    )
}

fn score_idea(ctx: &Value) -> String {
    format!(
        "Score this idea for ORIGINALITY from 0 to 100.\n\
         High scores mean genuinely novel, underexplored, non-obvious.\n\
         Low scores mean well-trodden, obvious, mainstream.\n\n\
         Topic: {}\n{}\n{}\n\
         Return JSON:\n{{\"score\": 75, \"rationale\": \"one sentence\"}}\n\n{JSON_ONLY}",
        text(ctx, "topic"),
        optional_line("Intent", text(ctx, "intent")),
        idea_block(ctx),
    )
}

fn format_criteria(ctx: &Value) -> String {
    let word_limit = ctx.get("word_limit").and_then(Value::as_u64).unwrap_or(0);
    let revision = match ctx.get("revision") {
        Some(v) if !v.is_null() => format!("\nThe reviewer asked for these changes: {v}\n"),
        _ => String::new(),
    };
    format!(
        "Given this idea and the user's intent, design the output format.\n\n\
         {}User topic: {}\n{}{revision}\n\
         Requirements:\n\
         - Choose a format that EMBODIES the idea, not one that just describes it\n\
         - Formats: poem, quotes, micro_essay, aphorisms, dialogue\n\
         - Define exactly 3 evaluation criteria, including \"surprise_density\" (insight per sentence)\n\
         - Set minimum_bar (0-100) based on topic complexity\n\
         - The piece must fit in {word_limit} words\n\n\
         Return JSON:\n\
         {{\"format\": \"micro_essay\", \"rationale\": \"why this format\", \
         \"criteria\": [\"criterion_1\", \"criterion_2\", \"surprise_density\"], \"minimum_bar\": 70}}\n\n\
         {JSON_ONLY}",
        idea_block(ctx),
        text(ctx, "topic"),
        optional_line("User intent", text(ctx, "intent")),
    )
}

fn draft(ctx: &Value) -> String {
    let criteria = ctx.get("criteria").unwrap_or(&Value::Null);
    let format = text(criteria, "format");
    let word_limit = ctx.get("word_limit").and_then(Value::as_u64).unwrap_or(0);

    let mut out = format!(
        "Create a {format} that embodies this idea.\n\n{}\n\
         HARD CONSTRAINT: Maximum {word_limit} words for the main content.\n\n\
         Format requirements:\n{}\nCriteria:\n{}",
        idea_block(ctx),
        text(criteria, "rationale"),
        bullets(criteria.get("criteria")),
    );

    let previous = text(ctx, "previous_draft");
    if !previous.is_empty() {
        out.push_str(&format!("\nCurrent draft:\n{previous}\n"));
        let critique = bullets(ctx.get("critique"));
        if !critique.is_empty() {
            out.push_str(&format!("\nFeedback to address:\n{critique}"));
        }
        out.push_str("\nImprove the draft. Keep what works.\n");
    }
    if let Some(count) = ctx.get("rejected_word_count").and_then(Value::as_u64) {
        out.push_str(&format!(
            "\nYour last attempt ran to {count} words, over the {word_limit}-word limit. Cut it down.\n"
        ));
    }

    out.push_str(&format!(
        "\nReturn JSON:\n{{\"text\": \"your {format} here\", \
         \"explainer\": \"2 sentences max explaining the core insight\"}}\n\n{JSON_ONLY}"
    ));
    out
}

fn evaluate(ctx: &Value) -> String {
    let criteria = ctx.get("criteria").unwrap_or(&Value::Null);
    let draft = ctx.get("draft").unwrap_or(&Value::Null);
    let bar = criteria
        .get("minimum_bar")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    format!(
        "Evaluate this draft against the criteria.\n\n\
         Draft:\n{}\n\nExplainer:\n{}\n\n\
         Criteria (score each 0-100):\n{}\n\
         Requirements:\n\
         - Be harsh but fair\n\
         - Feedback must be specific and actionable\n\
         - Maximum 3 feedback points\n\
         - pass is true only if the overall score is at least {bar}\n\n\
         Return JSON:\n\
         {{\"criterion_scores\": {{\"criterion_name\": 75}}, \"score\": 70, \"pass\": false, \
         \"critique\": [\"specific improvement 1\", \"specific improvement 2\"]}}\n\n{JSON_ONLY}",
        text(draft, "text"),
        text(draft, "explainer"),
        bullets(criteria.get("criteria")),
    )
}

fn diagnose(ctx: &Value) -> String {
    format!(
        "An iterative writing loop ran out of cycles without reaching its bar.\n\n\
         Score trajectory: {}\nBest score: {}\nMinimum bar: {}\nLikely cause: {}\n\
         Last feedback:\n{}\n\
         In 2-3 sentences, say whether the idea was weak, the format was wrong, \
         the execution fell short, or the bar was unrealistic.\n\n\
         Return JSON: {{\"summary\": \"your diagnosis\"}}",
        ctx.get("score_trajectory").unwrap_or(&Value::Null),
        ctx.get("best_score").unwrap_or(&Value::Null),
        ctx.get("minimum_bar").unwrap_or(&Value::Null),
        text(ctx, "likely_cause"),
        bullets(ctx.get("critiques")),
    )
}
