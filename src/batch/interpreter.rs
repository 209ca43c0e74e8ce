use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info_span, warn, Instrument};

use super::cancel::Cancellation;
use super::context::ArgumentContext;
use super::tokenizer::{tokenize, Tokenized};
use crate::commands::{CommandRegistry, GlobalModifiers};
use crate::error::{CommandError, Result};

/// First word of a line that replaces the batch defaults.
pub const DIRECTIVE: &str = "ARGS";

#[derive(Debug)]
pub enum LineOutcome {
    Skipped,
    DirectiveApplied,
    Succeeded,
    Failed(CommandError),
}

#[derive(Debug)]
pub struct LineRecord {
    /// 1-based position in the input.
    pub number: usize,
    pub outcome: LineOutcome,
}

#[derive(Debug, Default)]
pub struct BatchResult {
    pub records: Vec<LineRecord>,
    /// Input was abandoned between lines because of an interrupt.
    pub cancelled: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub directives: usize,
}

impl BatchResult {
    pub fn failures(&self) -> impl Iterator<Item = (usize, &CommandError)> {
        self.records.iter().filter_map(|record| match &record.outcome {
            LineOutcome::Failed(err) => Some((record.number, err)),
            _ => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for record in &self.records {
            match record.outcome {
                LineOutcome::Skipped => summary.skipped += 1,
                LineOutcome::DirectiveApplied => summary.directives += 1,
                LineOutcome::Succeeded => summary.succeeded += 1,
                LineOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            130
        } else if self.has_failures() {
            1
        } else {
            0
        }
    }
}

/// Runs invocations line by line against a command registry.
///
/// Each call to [`BatchInterpreter::run`] starts from empty defaults, so one
/// interpreter can process several independent inputs.
pub struct BatchInterpreter<'a> {
    registry: &'a CommandRegistry,
    modifiers: GlobalModifiers,
    cancellation: Cancellation,
}

impl<'a> BatchInterpreter<'a> {
    pub fn new(registry: &'a CommandRegistry, modifiers: GlobalModifiers) -> Self {
        Self {
            registry,
            modifiers,
            cancellation: Cancellation::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Process every line of `input`. Only a read error on the input itself
    /// is returned as `Err`; everything a line can do wrong is recorded.
    ///
    /// A cancellation stops the read that is waiting for the next line, but
    /// never a handler that is already running.
    pub async fn run<R>(&self, mut input: R) -> io::Result<BatchResult>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut context = ArgumentContext::new();
        let mut result = BatchResult::default();
        let mut buffer = Vec::new();
        let mut number = 0;

        loop {
            if self.cancellation.is_cancelled() {
                result.cancelled = true;
                break;
            }

            buffer.clear();
            let read = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => {
                    result.cancelled = true;
                    break;
                }
                read = input.read_until(b'\n', &mut buffer) => read?,
            };
            if read == 0 {
                break;
            }
            number += 1;

            let outcome = match decode_line(number, &buffer) {
                Ok(text) => {
                    self.process_line(&mut context, number, text)
                        .instrument(info_span!("line", number))
                        .await
                }
                Err(err) => LineOutcome::Failed(err),
            };

            if let LineOutcome::Failed(err) = &outcome {
                warn!("line {} failed ({}): {}", number, err.kind(), err);
            }
            result.records.push(LineRecord { number, outcome });
        }

        if result.cancelled {
            warn!("Batch cancelled after {} lines", number);
        }
        Ok(result)
    }

    async fn process_line(
        &self,
        context: &mut ArgumentContext,
        number: usize,
        text: &str,
    ) -> LineOutcome {
        let words = match tokenize(number, text) {
            Ok(Tokenized::Words(words)) => words,
            Ok(Tokenized::Blank | Tokenized::Comment) => return LineOutcome::Skipped,
            Err(err) => return LineOutcome::Failed(err),
        };

        let Some((command, rest)) = words.split_first() else {
            return LineOutcome::Skipped;
        };

        if command == DIRECTIVE {
            debug!("Defaults are now {:?}", rest);
            context.set_defaults(rest.to_vec());
            return LineOutcome::DirectiveApplied;
        }

        match self.dispatch(command, &context.merge(rest)).await {
            Ok(()) => LineOutcome::Succeeded,
            Err(err) => LineOutcome::Failed(err),
        }
    }

    /// Run one invocation given on the command line. There are no defaults
    /// here and `ARGS` is just an unknown command name.
    pub async fn run_single(&self, command: &str, args: &[String]) -> Result<()> {
        self.dispatch(command, &ArgumentContext::new().merge(args))
            .await
    }

    async fn dispatch(&self, command: &str, tokens: &[String]) -> Result<()> {
        let handler = self.registry.lookup(command)?;
        if handler.mutating() && self.modifiers.dry_run {
            debug!("Dispatching {} with {:?} (dry run, no remote changes)", command, tokens);
        } else {
            debug!("Dispatching {} with {:?}", command, tokens);
        }
        handler.execute(tokens, &self.modifiers).await
    }
}

/// Strip the line terminator and check the encoding of one raw line.
fn decode_line(number: usize, raw: &[u8]) -> Result<&str> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    std::str::from_utf8(raw).map_err(|_| CommandError::Tokenize {
        line: number,
        message: "invalid UTF-8".to_string(),
    })
}
