//! Checkpoint dialogue on the terminal.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use unpacker_core::checkpoint::CheckpointResult;
use unpacker_core::{
    CheckpointError, CheckpointState, CriteriaRevision, Decision, HumanInterface, IdeaId,
    OutputFormat,
};

type Io = (Box<dyn BufRead + Send>, Box<dyn Write + Send>);

/// [`HumanInterface`] that prints the checkpoint state and reads the answer
/// line by line. Reads run on a blocking thread.
pub struct TerminalHuman {
    io: Arc<Mutex<Io>>,
}

impl TerminalHuman {
    /// Prompt on stderr, read from stdin.
    pub fn stdio() -> Self {
        Self::with_io(
            Box::new(io::BufReader::new(io::stdin())),
            Box::new(io::stderr()),
        )
    }

    pub fn with_io(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            io: Arc::new(Mutex::new((input, output))),
        }
    }
}

#[async_trait]
impl HumanInterface for TerminalHuman {
    async fn present(&self, state: &CheckpointState) -> CheckpointResult<Decision> {
        let io = Arc::clone(&self.io);
        let state = state.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = io
                .lock()
                .map_err(|_| CheckpointError::Interface("terminal lock poisoned".to_string()))?;
            let (input, output) = &mut *guard;
            converse(input.as_mut(), output.as_mut(), &state)
                .map_err(|e| CheckpointError::Interface(e.to_string()))
        })
        .await
        .map_err(|e| CheckpointError::Interface(e.to_string()))?
    }
}

fn ask(input: &mut dyn BufRead, output: &mut dyn Write, question: &str) -> io::Result<String> {
    write!(output, "{question}")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed at checkpoint",
        ));
    }
    Ok(line.trim().to_string())
}

fn show(output: &mut dyn Write, state: &CheckpointState) -> io::Result<()> {
    writeln!(output, "\nTopic: {}  (round {})", state.topic.text(), state.round)?;
    for (n, idea) in state.ideas.iter().enumerate() {
        let marker = if idea.id == state.selected { '>' } else { ' ' };
        write!(output, "{marker} {}. {} ({})", n + 1, idea.name, idea.source)?;
        if let Some(summary) = state.summary_for(&idea.id) {
            write!(
                output,
                "  mean {:.1}, spread {:.1}",
                summary.mean_score, summary.divergence
            )?;
            if summary.flagged {
                write!(output, "  [contested]")?;
            }
        }
        writeln!(output)?;
        writeln!(output, "     {}", idea.description)?;
    }
    if let Some(criteria) = &state.pending_criteria {
        writeln!(
            output,
            "\nFormat: {}  bar: {:.1}\nCriteria: {}",
            criteria.format,
            criteria.minimum_bar,
            criteria.criteria.join(", ")
        )?;
    }
    Ok(())
}

/// Run one checkpoint exchange. Unrecognised answers are asked again.
pub fn converse(
    input: &mut dyn BufRead,
    output: &mut dyn Write,
    state: &CheckpointState,
) -> io::Result<Decision> {
    show(output, state)?;
    loop {
        let answer = ask(input, output, "\n[a]pprove, [r]evise or a[b]ort? ")?;
        match answer.to_lowercase().as_str() {
            "a" | "approve" | "" => return Ok(Decision::Approve),
            "b" | "abort" => return Ok(Decision::Abort),
            "r" | "revise" => {
                let revision = ask_revision(input, output, state)?;
                return Ok(Decision::Revise { revision });
            }
            other => writeln!(output, "Unrecognised answer: {other}")?,
        }
    }
}

/// Ask until the answer is blank or names a listed idea.
fn ask_idea(
    input: &mut dyn BufRead,
    output: &mut dyn Write,
    state: &CheckpointState,
) -> io::Result<Option<IdeaId>> {
    loop {
        let answer = ask(input, output, "Idea number (enter to keep): ")?;
        if answer.is_empty() {
            return Ok(None);
        }
        let picked = answer
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| state.ideas.iter().nth(i));
        match picked {
            Some(idea) => return Ok(Some(idea.id.clone())),
            None => writeln!(output, "Pick a number from 1 to {}", state.ideas.len())?,
        }
    }
}

fn ask_revision(
    input: &mut dyn BufRead,
    output: &mut dyn Write,
    state: &CheckpointState,
) -> io::Result<CriteriaRevision> {
    let mut revision = CriteriaRevision::default();

    revision.idea = ask_idea(input, output, state)?;

    let answer = ask(
        input,
        output,
        "Format (poem, quotes, micro_essay, aphorisms, dialogue; enter to keep): ",
    )?;
    if !answer.is_empty() {
        revision.format = serde_json::from_value::<OutputFormat>(serde_json::Value::String(
            answer.to_lowercase(),
        ))
        .ok();
    }

    let answer = ask(input, output, "Criteria, comma separated (enter to keep): ")?;
    revision.criteria = answer
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    let answer = ask(input, output, "Minimum bar 0-100 (enter to keep): ")?;
    revision.minimum_bar = answer.parse::<f64>().ok();

    let answer = ask(input, output, "Guidance for the formatter (optional): ")?;
    if !answer.is_empty() {
        revision.guidance = Some(answer);
    }

    Ok(revision)
}
