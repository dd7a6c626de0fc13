//! Interactive question loop.

use std::io::{BufRead, Write};

use crate::{
    error::Result,
    history::ChatLog,
    pipeline::{AnswerOutcome, RagPipeline},
};

pub const GREETING: &str =
    "Ask about the knowledge base. Type 'exit' or 'quit' to leave, 'history' to review the session.";

const EXIT_COMMANDS: &[&str] = &["exit", "quit"];
const HISTORY_COMMAND: &str = "history";

/// Read questions from `input` until EOF or an exit command.
///
/// Answers go to `output`; the prompt marker, greeting and grounding
/// indicators go to `status`. Degraded answers are printed like any other
/// answer and the loop continues. Returns the session log.
pub fn run<R, W, E>(
    pipeline: &RagPipeline,
    input: R,
    output: &mut W,
    status: &mut E,
) -> Result<ChatLog>
where
    R: BufRead,
    W: Write,
    E: Write,
{
    let mut log = ChatLog::new();
    writeln!(status, "{GREETING}")?;

    let mut lines = input.lines();
    loop {
        write!(status, "> ")?;
        status.flush()?;

        let Some(line) = lines.next() else {
            writeln!(status)?;
            break;
        };
        let line = line?;
        let query = line.trim();

        if query.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&query.to_lowercase().as_str()) {
            break;
        }
        if query.eq_ignore_ascii_case(HISTORY_COMMAND) {
            writeln!(output, "{log}")?;
            continue;
        }

        let answer = pipeline.answer(query);
        match answer.outcome {
            AnswerOutcome::Grounded => {
                let docs: Vec<&str> = answer
                    .context
                    .iter()
                    .map(|c| c.document.as_str())
                    .collect();
                writeln!(status, "[grounded: {}]", docs.join(", "))?;
            }
            AnswerOutcome::Ungrounded => {
                writeln!(status, "[no relevant context found]")?;
            }
            AnswerOutcome::RetrievalFailed | AnswerOutcome::GenerationFailed => {}
        }
        writeln!(output, "{}", answer.text.trim_end())?;
        output.flush()?;

        log.record(query, &answer.text);
    }

    Ok(log)
}
