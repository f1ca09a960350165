// Precompiled code units.

use std::sync::Arc;

use crate::ast::Block;
use crate::error::ParseError;
use crate::parser;

/// A parsed, reusable unit of source text. Compilation fixes the names the
/// code refers to, not any particular globals snapshot, so one chunk can
/// run against any structurally compatible globals table.
#[derive(Debug, Clone)]
pub struct Chunk {
    block: Arc<Block>,
}

impl Chunk {
    pub fn block(&self) -> &Block {
        &self.block
    }
}

/// Parse source into a chunk. Purely syntactic; no validation beyond what
/// the parser enforces.
pub fn compile(source: &str) -> Result<Chunk, ParseError> {
    parser::parse(source).map(|block| Chunk { block: Arc::new(block) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_accepts_valid_source() {
        assert!(compile("return 7").is_ok());
    }

    #[test]
    fn compile_rejects_bad_syntax() {
        let err = compile("if then").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn chunks_are_cheap_to_clone() {
        let chunk = compile("x = 1").unwrap();
        let copy = chunk.clone();
        assert!(Arc::ptr_eq(&chunk.block, &copy.block));
    }
}
