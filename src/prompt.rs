//! Input sources for the interactive account and credential loops.

use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};

use crate::error::Result;

/// Where answers to interactive questions come from.
pub trait Prompt: Send {
    /// Whether questions can be asked at all.
    fn is_interactive(&self) -> bool;

    /// Ask a question. Returns `None` once the input is exhausted.
    fn ask(&mut self, question: &str) -> Result<Option<String>>;

    /// Show a message to the person answering.
    fn say(&mut self, message: &str);
}

/// Reads answers from stdin when it is attached to a terminal.
pub struct TerminalPrompt {
    interactive: bool,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            interactive: io::stdin().is_terminal(),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompt for TerminalPrompt {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn ask(&mut self, question: &str) -> Result<Option<String>> {
        let mut stderr = io::stderr();
        write!(stderr, "{}", question)?;
        stderr.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn say(&mut self, message: &str) {
        eprintln!("{}", message);
    }
}

/// Answers questions from a fixed list, e.g. input piped from a file.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    interactive: bool,
    transcript: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            interactive: true,
            transcript: Vec::new(),
        }
    }

    /// A prompt that refuses to ask anything.
    pub fn non_interactive() -> Self {
        Self::default()
    }

    /// Questions asked and messages shown, in order.
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// Answers not consumed yet.
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl Prompt for ScriptedPrompt {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn ask(&mut self, question: &str) -> Result<Option<String>> {
        self.transcript.push(question.to_string());
        Ok(self.answers.pop_front())
    }

    fn say(&mut self, message: &str) {
        self.transcript.push(message.to_string());
    }
}
