pub mod cancel;
pub mod context;
pub mod interpreter;
pub mod tokenizer;

pub use cancel::Cancellation;
pub use context::ArgumentContext;
pub use interpreter::{BatchInterpreter, BatchResult, BatchSummary, LineOutcome, LineRecord, DIRECTIVE};
pub use tokenizer::{tokenize, Tokenized};
