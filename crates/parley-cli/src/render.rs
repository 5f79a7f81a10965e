use std::io::{self, Write};

use console::style;
use parley::{
    models::role::Role,
    orchestrator::{ConversationEvent, TurnState},
    tool::parse_tool_query,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Idle,
    Reasoning,
    Answer,
}

/// Writes conversation events to a terminal as they arrive
pub struct Renderer<W: Write> {
    out: W,
    section: Section,
}

impl Renderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            section: Section::Idle,
        }
    }

    pub fn render(&mut self, event: &ConversationEvent) -> io::Result<()> {
        match event {
            ConversationEvent::ReasoningAppended { text, .. } => {
                if self.section != Section::Reasoning {
                    self.break_line()?;
                    self.section = Section::Reasoning;
                }
                write!(self.out, "{}", style(text).dim())?;
            }
            ConversationEvent::ContentRevealed { text, .. } => {
                if self.section == Section::Reasoning {
                    writeln!(self.out)?;
                }
                self.section = Section::Answer;
                write!(self.out, "{}", text)?;
            }
            ConversationEvent::ToolCallsRequested { calls, .. } => {
                self.break_line()?;
                for call in calls {
                    let query = parse_tool_query(&call.raw_arguments)
                        .unwrap_or_else(|_| call.raw_arguments.clone());
                    writeln!(
                        self.out,
                        "{} {}",
                        style("searching").dim(),
                        style(query).cyan()
                    )?;
                }
            }
            ConversationEvent::MessageAdded(message) if message.notice => {
                self.break_line()?;
                writeln!(self.out, "{}", style(message.display_text()).yellow())?;
            }
            ConversationEvent::MessageAdded(message) if message.role == Role::Tool => {
                tracing::debug!("Tool result added to the conversation");
            }
            ConversationEvent::StateChanged(TurnState::Idle) => {
                self.break_line()?;
            }
            _ => {}
        }
        self.out.flush()
    }

    /// End a partial line, if one is open
    fn break_line(&mut self) -> io::Result<()> {
        if self.section != Section::Idle {
            writeln!(self.out)?;
            self.section = Section::Idle;
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}
