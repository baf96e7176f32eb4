//! Operator I/O for the acquisition policy.

use std::io::{self, BufRead, Write};

/// Question asked when the gate is held by someone else.
pub const RETRY_PROMPT: &str = "Do you want to try again? (Y/YES to retry): ";

/// The human (or script) on the other end of the acquisition loop.
pub trait Operator {
    /// Show a line of feedback.
    fn notify(&mut self, message: &str);

    /// Ask whether to retry. Anything but an explicit yes is a no.
    fn confirm_retry(&mut self) -> bool;
}

/// Whether an answer to [`RETRY_PROMPT`] means "retry".
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_uppercase().as_str(), "Y" | "YES")
}

/// Line-oriented operator on any reader/writer pair.
///
/// End of input counts as "no", so a closed stdin never retries forever.
pub struct LineOperator<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LineOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Operator for LineOperator<R, W> {
    fn notify(&mut self, message: &str) {
        let _ = writeln!(self.output, "{}", message);
    }

    fn confirm_retry(&mut self) -> bool {
        let _ = write!(self.output, "{}", RETRY_PROMPT);
        let _ = self.output.flush();

        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(0) => {
                let _ = writeln!(self.output);
                tracing::debug!("operator input closed; treating as decline");
                false
            }
            Ok(_) => is_affirmative(&answer),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read operator answer");
                false
            }
        }
    }
}

/// The terminal operator: stdin for answers, stdout for feedback.
pub type StdinOperator = LineOperator<io::StdinLock<'static>, io::Stdout>;

pub fn stdin_operator() -> StdinOperator {
    LineOperator::new(io::stdin().lock(), io::stdout())
}
