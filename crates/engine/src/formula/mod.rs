// Formula parsing, evaluation and rewriting

pub mod parser;
pub mod eval;
pub mod refs;
pub mod rewrite;
